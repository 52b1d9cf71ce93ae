//! 에러 타입 정의

use thiserror::Error;
use uuid::Uuid;

/// 전송 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("유효하지 않은 매직 넘버: expected {expected:08X}, got {got:08X}")]
    InvalidMagicNumber { expected: u32, got: u32 },

    #[error("유효하지 않은 프로토콜 버전: expected {expected}, got {got}")]
    InvalidVersion { expected: u8, got: u8 },

    #[error("알 수 없는 메시지 타입: {0}")]
    UnknownMessageType(u8),

    #[error("알 수 없는 상태 값: {0}")]
    UnknownStatus(u8),

    #[error("잘린 메시지: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("유효하지 않은 청크 크기: {0}")]
    InvalidChunkSize(usize),

    #[error("세션 미완료: transfer_id={transfer_id}, missing={missing_count}")]
    SessionIncomplete {
        transfer_id: Uuid,
        missing_count: usize,
    },

    #[error("재시도 한도 초과: {attempts}회 시도")]
    AttemptsExhausted { attempts: u32 },

    #[error("유효하지 않은 인자: {0}")]
    InvalidArgument(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
