//! # UDP Transfer
//!
//! UDP 위에서 체크섬 기반으로 파일을 신뢰성 있게 전송하는 프로토콜
//!
//! ## 핵심 특징
//! - **청크 분할**: 파일을 순서 번호와 SHA-1 다이제스트가 붙은 청크로 분할
//! - **수신자 주도 재전송**: 손상/누락 청크만 수신자가 재전송 요청
//! - **유한 재시도**: 송신자는 전체 시도 횟수, 수신자는 세션별 스윕 횟수 제한
//! - **다중 전송**: 소켓 하나로 여러 송신자의 전송을 전송 ID로 구분해 동시 수신
//! - **장애 주입**: 테스트용 청크 드롭 정책을 송신 경로에 교체 가능

pub mod chunk;
pub mod config;
pub mod error;
pub mod fault;
pub mod message;
pub mod persist;
pub mod progress;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod stats;

pub use chunk::{prepare, Chunk, ChunkBuilder, Sequence};
pub use config::Config;
pub use error::{Error, Result};
pub use fault::{DropPolicy, DropSequences, NeverDrop, RandomDrop};
pub use message::{Message, ResendRequest, Status, StatusMessage, TransferHeader, TransferId};
pub use persist::{CompletedTransfer, DirectoryPersist, MemoryPersist, NullPersist, Persist};
pub use progress::{LogProgress, ProgressEvent, ProgressSink};
pub use receiver::Receiver;
pub use sender::{Sender, SenderState};
pub use session::Session;
pub use stats::{ReceiverStats, SendReport};

/// 프로토콜 버전
pub const PROTOCOL_VERSION: u8 = 1;

/// 기본 포트
pub const DEFAULT_PORT: u16 = 7777;

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// 매직 넘버 (패킷 식별용)
pub const MAGIC_NUMBER: u32 = 0x55445446; // "UDTF"

/// 해석할 수 없는 메시지에 FAIL로 응답할 때 쓰는 전송 ID (모든 비트 1)
pub const SENTINEL_TRANSFER_ID: TransferId = uuid::Uuid::from_u128(u128::MAX);
