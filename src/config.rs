//! 프로토콜 설정

use std::time::Duration;

use crate::DEFAULT_CHUNK_SIZE;

/// 송신/수신 공통 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 청크 페이로드 크기 (바이트)
    pub chunk_size: usize,

    /// 송신자 전체 시도 횟수 (핸드쉐이크 ~ 완료)
    pub max_attempts: u32,

    /// 핸드쉐이크 응답 대기 타임아웃 (밀리초)
    pub handshake_timeout_ms: u64,

    /// 완료 대기 중 한 번의 수신 대기 타임아웃 (밀리초)
    pub completion_timeout_ms: u64,

    /// 완료 대기 중 연속 무응답 허용 횟수
    /// 초과하면 수신자가 사라진 것으로 보고 이번 시도를 포기
    pub completion_idle_polls: u32,

    /// 진행 중 세션이 있을 때 수신 대기 타임아웃 (밀리초)
    pub sweep_interval_ms: u64,

    /// 스윕 간 최대 간격 (밀리초)
    /// 트래픽이 계속 들어와도 이 간격마다 스윕을 강제
    pub max_sweep_gap_ms: u64,

    /// 세션별 스윕 재시도 한도
    pub session_retry_bound: u32,

    /// 헤더 하나가 요구할 수 있는 최대 청크 수
    pub max_chunk_count: u32,

    /// 수신 버퍼 크기 (한 데이터그램 최대 크기)
    pub recv_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_attempts: 5,
            handshake_timeout_ms: 1000,      // 1초
            completion_timeout_ms: 1000,     // 1초
            completion_idle_polls: 5,
            sweep_interval_ms: 100,          // 100ms
            max_sweep_gap_ms: 1000,          // 1초
            session_retry_bound: 5,
            max_chunk_count: 1 << 20,        // 1KB 청크 기준 1GB
            recv_buffer_size: 64 * 1024,     // 64KB
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 재시도 한도 3의 보수적 설정
    pub fn strict() -> Self {
        Self {
            max_attempts: 3,
            session_retry_bound: 3,
            ..Self::default()
        }
    }

    /// 손실이 많은 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            chunk_size: 512,                 // 작은 청크
            max_attempts: 8,
            handshake_timeout_ms: 2000,
            completion_timeout_ms: 2000,
            completion_idle_polls: 8,
            sweep_interval_ms: 200,
            max_sweep_gap_ms: 2000,
            session_retry_bound: 10,
            max_chunk_count: 1 << 21,
            recv_buffer_size: 64 * 1024,
        }
    }

    /// 청크 크기 지정
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn max_sweep_gap(&self) -> Duration {
        Duration::from_millis(self.max_sweep_gap_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_uses_three_retries() {
        let config = Config::strict();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.session_retry_bound, 3);
        assert_eq!(config.chunk_size, Config::default().chunk_size);
    }

    #[test]
    fn test_default_bounds() {
        let config = Config::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.session_retry_bound, 5);
        assert_eq!(config.chunk_size, 1024);
    }
}
