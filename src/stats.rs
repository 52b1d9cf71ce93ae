//! 전송 통계

use std::time::Duration;

use crate::message::TransferId;

/// 송신 결과 보고
#[derive(Debug, Clone)]
pub struct SendReport {
    /// 전송 ID
    pub transfer_id: TransferId,

    /// 사용한 시도 횟수 (성공한 시도 포함)
    pub attempts: u32,

    /// 파일 크기 (바이트)
    pub total_bytes: u64,

    /// 청크 수
    pub chunk_count: u32,

    /// TRANSMIT 단계에서 보낸 청크 수 (모든 시도 합계)
    pub chunks_sent: u64,

    /// 장애 주입으로 생략된 청크 수
    pub chunks_dropped: u64,

    /// 재전송 요청에 응답해 보낸 청크 수
    pub chunks_resent: u64,

    /// 전체 소요 시간
    pub elapsed: Duration,
}

impl SendReport {
    pub fn new(transfer_id: TransferId, total_bytes: u64, chunk_count: u32) -> Self {
        Self {
            transfer_id,
            attempts: 0,
            total_bytes,
            chunk_count,
            chunks_sent: 0,
            chunks_dropped: 0,
            chunks_resent: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed.as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 재전송 비율 (재전송 청크 / 전체 청크)
    pub fn resend_ratio(&self) -> f64 {
        if self.chunk_count == 0 {
            return 0.0;
        }
        self.chunks_resent as f64 / self.chunk_count as f64
    }
}

/// 수신자 누적 통계
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// 열린 세션 수
    pub sessions_opened: u64,

    /// 완료된 세션 수
    pub sessions_completed: u64,

    /// 재시도 한도 초과로 폐기된 세션 수
    pub sessions_failed: u64,

    /// 새로 저장된 청크 수
    pub chunks_accepted: u64,

    /// 중복 수신 청크 수
    pub duplicate_chunks: u64,

    /// 다이제스트 불일치 청크 수
    pub corrupt_chunks: u64,

    /// 알 수 없는 전송의 청크 수
    pub unknown_chunks: u64,

    /// 보낸 재전송 요청 수
    pub resend_requests: u64,

    /// 보낸 FAIL 수
    pub fail_replies: u64,

    /// 저장된 총 바이트
    pub bytes_persisted: u64,

    /// 저장 실패 수
    pub persist_errors: u64,
}
