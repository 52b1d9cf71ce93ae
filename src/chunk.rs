//! 청크 정의와 분할기
//!
//! - Chunk: 데이터그램 하나에 들어가는 파일 조각 (기본 1KB)
//! - ChunkBuilder: 파일 전체를 순서 번호가 붙은 청크들로 분할

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha1::{Digest as _, Sha1};

use crate::message::{TransferHeader, TransferId, HEADER_LEN};
use crate::{Error, Result};

/// 청크 순서 번호 (전송 내 인덱스)
pub type Sequence = u32;

/// 다이제스트 길이 (SHA-1)
pub const DIGEST_LEN: usize = 20;

/// 청크 다이제스트
pub type Digest = [u8; DIGEST_LEN];

/// IPv4 UDP 데이터그램 최대 페이로드
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// 직렬화된 `ChunkHeader` 길이 (길이 접두 2 + UUID 8+16 + 순서 4 + 길이 2 + 다이제스트)
pub const CHUNK_HEADER_LEN: usize = 2 + 24 + 4 + 2 + DIGEST_LEN;

/// 데이터그램 하나에 담을 수 있는 최대 청크 크기
pub const MAX_CHUNK_SIZE: usize = MAX_DATAGRAM_SIZE - HEADER_LEN - CHUNK_HEADER_LEN;

/// 페이로드 다이제스트 계산
pub fn digest(data: &[u8]) -> Digest {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&Sha1::digest(data));
    out
}

/// 청크 헤더
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHeader {
    /// 전송 ID
    pub transfer_id: TransferId,

    /// 순서 번호 `[0, chunk_count)`
    pub sequence: Sequence,

    /// 이 청크의 데이터 길이
    pub data_len: u16,

    /// 데이터의 SHA-1 다이제스트
    pub digest: Digest,
}

/// 청크 (송신 패킷 단위)
///
/// 한 번 생성되면 변하지 않으며, 재전송 시에도 그대로 다시 보낸다.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 청크 헤더
    pub header: ChunkHeader,

    /// 실제 데이터
    pub data: Bytes,
}

impl Chunk {
    /// 새 청크 생성
    ///
    /// 길이 검사는 `ChunkBuilder`가 책임진다.
    pub(crate) fn new(transfer_id: TransferId, sequence: Sequence, data: Bytes) -> Self {
        debug_assert!(data.len() <= MAX_CHUNK_SIZE, "chunk payload too large: {}", data.len());
        Self {
            header: ChunkHeader {
                transfer_id,
                sequence,
                data_len: data.len() as u16,
                digest: digest(&data),
            },
            data,
        }
    }

    /// 순서 번호
    pub fn sequence(&self) -> Sequence {
        self.header.sequence
    }

    /// 청크 본문을 바이트로 직렬화
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header_bytes = bincode::serialize(&self.header)?;
        let header_len = header_bytes.len() as u16;

        let mut buf = Vec::with_capacity(2 + header_bytes.len() + self.data.len());
        buf.extend_from_slice(&header_len.to_le_bytes());
        buf.extend_from_slice(&header_bytes);
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }

    /// 바이트에서 청크 본문 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::Truncated {
                expected: 2,
                got: bytes.len(),
            });
        }

        let header_len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        if bytes.len() < 2 + header_len {
            return Err(Error::Truncated {
                expected: 2 + header_len,
                got: bytes.len(),
            });
        }

        let header: ChunkHeader = bincode::deserialize(&bytes[2..2 + header_len])?;
        let data = &bytes[2 + header_len..];
        if data.len() != header.data_len as usize {
            return Err(Error::Truncated {
                expected: header.data_len as usize,
                got: data.len(),
            });
        }

        Ok(Self {
            header,
            data: Bytes::copy_from_slice(data),
        })
    }

    /// 다이제스트 검증
    pub fn verify(&self) -> bool {
        digest(&self.data) == self.header.digest
    }
}

/// 파일 크기와 청크 크기로 청크 수 계산 (빈 파일도 청크 1개)
pub fn chunk_count(file_size: usize, chunk_size: usize) -> usize {
    if file_size == 0 {
        return 1;
    }
    (file_size + chunk_size - 1) / chunk_size
}

/// 청크 생성기 (송신측)
#[derive(Debug, Clone, Copy)]
pub struct ChunkBuilder {
    chunk_size: usize,
}

impl ChunkBuilder {
    pub fn new(chunk_size: usize) -> Result<Self> {
        // 봉투와 청크 헤더를 합쳐 데이터그램 하나에 들어가야 함
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::InvalidChunkSize(chunk_size));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 데이터를 청크들로 분할
    pub fn prepare(&self, data: &[u8], transfer_id: TransferId) -> Vec<Chunk> {
        if data.is_empty() {
            return vec![Chunk::new(transfer_id, 0, Bytes::new())];
        }

        let data = Bytes::copy_from_slice(data);
        (0..data.len())
            .step_by(self.chunk_size)
            .enumerate()
            .map(|(idx, offset)| {
                let end = (offset + self.chunk_size).min(data.len());
                Chunk::new(transfer_id, idx as Sequence, data.slice(offset..end))
            })
            .collect()
    }

    /// 전송 헤더 생성
    pub fn header(&self, file_name: &str, data: &[u8], transfer_id: TransferId) -> TransferHeader {
        TransferHeader {
            file_name: file_name.to_string(),
            file_size: data.len() as u64,
            chunk_count: chunk_count(data.len(), self.chunk_size) as u32,
            transfer_id,
        }
    }
}

/// 데이터를 `chunk_size` 단위 청크들로 분할
pub fn prepare(data: &[u8], chunk_size: usize, transfer_id: TransferId) -> Result<Vec<Chunk>> {
    Ok(ChunkBuilder::new(chunk_size)?.prepare(data, transfer_id))
}
