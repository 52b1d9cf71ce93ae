//! 진행 상황 통보
//!
//! 관찰 전용이며 프로토콜 동작에 영향을 주지 않는다.

use std::net::SocketAddr;

use tokio::sync::mpsc;
use tracing::debug;

use crate::chunk::Sequence;
use crate::message::TransferId;

/// 진행 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    // 송신측
    HandshakeStarted { transfer_id: TransferId, attempt: u32 },
    Ready { transfer_id: TransferId },
    ChunkSent { transfer_id: TransferId, sequence: Sequence },
    ChunkDropped { transfer_id: TransferId, sequence: Sequence },
    ChunkResent { transfer_id: TransferId, sequence: Sequence },
    AttemptFailed { transfer_id: TransferId, attempt: u32, reason: String },
    Succeeded { transfer_id: TransferId, attempts: u32 },

    // 수신측
    SessionOpened { transfer_id: TransferId, peer: SocketAddr, chunk_count: u32 },
    ChunkAccepted { transfer_id: TransferId, received: usize, total: usize },
    ChunkCorrupt { transfer_id: TransferId, sequence: Sequence },
    SessionCompleted { transfer_id: TransferId, bytes: usize },
    SessionFailed { transfer_id: TransferId, missing: usize },
}

/// 진행 이벤트 수신기
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// tracing으로 기록
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, event: ProgressEvent) {
        debug!(?event, "progress");
    }
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn report(&self, event: ProgressEvent) {
        // 수신측이 닫혀 있으면 무시
        let _ = self.send(event);
    }
}
