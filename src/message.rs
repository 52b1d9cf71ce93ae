//! 프로토콜 메시지 정의
//!
//! 모든 데이터그램은 고정 길이 봉투(`MessageHeader`) 뒤에 종류별 본문이 붙는다.
//! 수신측은 봉투의 타입으로 먼저 분기하고, 그 다음 `transfer_id`로 분기한다.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunk::{Chunk, Sequence};
use crate::{Error, Result, MAGIC_NUMBER, PROTOCOL_VERSION};

/// 전송 식별자 (128비트, 전송마다 랜덤)
pub type TransferId = Uuid;

/// 봉투 길이: magic(4) + version(1) + msg_type(1) + payload_len(4)
pub const HEADER_LEN: usize = 10;

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// 전송 시작 (파일 메타데이터)
    Header = 1,

    /// 데이터 청크
    Chunk = 2,

    /// 재전송 요청
    ResendRequest = 3,

    /// 상태 통보
    Status = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(MessageType::Header),
            2 => Ok(MessageType::Chunk),
            3 => Ok(MessageType::ResendRequest),
            4 => Ok(MessageType::Status),
            other => Err(Error::UnknownMessageType(other)),
        }
    }
}

/// 메시지 헤더 (봉투)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    /// 매직 넘버
    pub magic: u32,

    /// 프로토콜 버전
    pub version: u8,

    /// 메시지 타입 (`MessageType`의 u8 값)
    pub msg_type: u8,

    /// 본문 길이 (헤더 제외)
    pub payload_len: u32,
}

impl MessageHeader {
    pub fn new(msg_type: MessageType, payload_len: u32) -> Self {
        Self {
            magic: MAGIC_NUMBER,
            version: PROTOCOL_VERSION,
            msg_type: msg_type as u8,
            payload_len,
        }
    }

    /// 데이터그램 앞부분에서 헤더를 읽고 검증
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Truncated {
                expected: HEADER_LEN,
                got: bytes.len(),
            });
        }

        let header: MessageHeader = bincode::deserialize(&bytes[..HEADER_LEN])?;
        if header.magic != MAGIC_NUMBER {
            return Err(Error::InvalidMagicNumber {
                expected: MAGIC_NUMBER,
                got: header.magic,
            });
        }
        if header.version != PROTOCOL_VERSION {
            return Err(Error::InvalidVersion {
                expected: PROTOCOL_VERSION,
                got: header.version,
            });
        }

        let expected = HEADER_LEN + header.payload_len as usize;
        if bytes.len() < expected {
            return Err(Error::Truncated {
                expected,
                got: bytes.len(),
            });
        }

        Ok(header)
    }
}

/// 전송 헤더 (송신자 → 수신자)
///
/// 청크 분할 전에 생성되며 전송 후에는 변하지 않는다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHeader {
    pub file_name: String,
    pub file_size: u64,
    pub chunk_count: u32,
    pub transfer_id: TransferId,
}

/// 재전송 요청 (수신자 → 송신자)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResendRequest {
    pub transfer_id: TransferId,
    pub sequence: Sequence,
}

impl ResendRequest {
    pub fn new(transfer_id: TransferId, sequence: Sequence) -> Self {
        Self {
            transfer_id,
            sequence,
        }
    }
}

/// 전송 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Status {
    Ready = 0,
    Success = 1,
    Fail = 2,
    Canceled = 3,
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for Status {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Status::Ready),
            1 => Ok(Status::Success),
            2 => Ok(Status::Fail),
            3 => Ok(Status::Canceled),
            other => Err(Error::UnknownStatus(other)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ready => "READY",
            Status::Success => "SUCCESS",
            Status::Fail => "FAIL",
            Status::Canceled => "CANCELED",
        };
        f.write_str(name)
    }
}

/// 상태 메시지 (양방향)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub transfer_id: TransferId,
    pub status: Status,
}

impl StatusMessage {
    pub fn new(transfer_id: TransferId, status: Status) -> Self {
        Self {
            transfer_id,
            status,
        }
    }
}

/// 통합 메시지 enum
#[derive(Debug, Clone)]
pub enum Message {
    Header(TransferHeader),
    Chunk(Chunk),
    ResendRequest(ResendRequest),
    Status(StatusMessage),
}

impl Message {
    /// 메시지 타입 반환
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Header(_) => MessageType::Header,
            Message::Chunk(_) => MessageType::Chunk,
            Message::ResendRequest(_) => MessageType::ResendRequest,
            Message::Status(_) => MessageType::Status,
        }
    }

    /// 메시지가 속한 전송 ID
    pub fn transfer_id(&self) -> TransferId {
        match self {
            Message::Header(header) => header.transfer_id,
            Message::Chunk(chunk) => chunk.header.transfer_id,
            Message::ResendRequest(request) => request.transfer_id,
            Message::Status(status) => status.transfer_id,
        }
    }

    /// 봉투 + 본문으로 직렬화
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = match self {
            Message::Header(header) => bincode::serialize(header)?,
            Message::Chunk(chunk) => chunk.to_bytes()?,
            Message::ResendRequest(request) => bincode::serialize(request)?,
            Message::Status(status) => bincode::serialize(status)?,
        };

        let header = MessageHeader::new(self.msg_type(), payload.len() as u32);
        let header_bytes = bincode::serialize(&header)?;

        let mut buf = Vec::with_capacity(header_bytes.len() + payload.len());
        buf.extend_from_slice(&header_bytes);
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// 데이터그램에서 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = MessageHeader::parse(bytes)?;
        let body = &bytes[HEADER_LEN..HEADER_LEN + header.payload_len as usize];

        let message = match MessageType::try_from(header.msg_type)? {
            MessageType::Header => Message::Header(bincode::deserialize(body)?),
            MessageType::Chunk => Message::Chunk(Chunk::from_bytes(body)?),
            MessageType::ResendRequest => Message::ResendRequest(bincode::deserialize(body)?),
            MessageType::Status => Message::Status(bincode::deserialize(body)?),
        };
        Ok(message)
    }
}

impl From<TransferHeader> for Message {
    fn from(header: TransferHeader) -> Self {
        Message::Header(header)
    }
}

impl From<Chunk> for Message {
    fn from(chunk: Chunk) -> Self {
        Message::Chunk(chunk)
    }
}

impl From<ResendRequest> for Message {
    fn from(request: ResendRequest) -> Self {
        Message::ResendRequest(request)
    }
}

impl From<StatusMessage> for Message {
    fn from(status: StatusMessage) -> Self {
        Message::Status(status)
    }
}
