//! 송신자
//!
//! 전송 하나를 상태 머신으로 진행한다.
//!
//! `INIT → HANDSHAKE → TRANSMIT → AWAIT_COMPLETION → {SUCCEEDED, FAILED}`
//!
//! - 핸드쉐이크: 헤더 전송 후 READY 대기 (타임아웃 시 시도 실패)
//! - 전송: 모든 청크를 무작위 순서로 한 번씩 전송
//! - 완료 대기: 재전송 요청에 응답, SUCCESS면 종료, FAIL이면 처음부터 재시도
//! - 전체 시도 횟수는 `Config::max_attempts`로 제한

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Instant;

use rand::seq::SliceRandom;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunk::{Chunk, ChunkBuilder};
use crate::fault::{DropPolicy, NeverDrop};
use crate::message::{Message, Status, TransferHeader, TransferId};
use crate::progress::{LogProgress, ProgressEvent, ProgressSink};
use crate::stats::SendReport;
use crate::{Config, Error, Result};

/// 송신 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Init,
    Handshake,
    Transmit,
    AwaitCompletion,
    Succeeded,
    Failed,
}

/// 한 번의 시도가 실패한 이유
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptFailure {
    /// 핸드쉐이크 응답 없음
    HandshakeTimeout,

    /// READY가 아닌 상태로 거절됨
    Rejected(Status),

    /// 수신자가 FAIL 통보
    ReceiverFailed,

    /// 완료 대기 중 연속 무응답
    ReceiverSilent,

    /// 예상하지 못한 메시지
    ProtocolViolation(String),

    /// 수신 소켓 에러
    Recv(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::HandshakeTimeout => write!(f, "handshake timed out"),
            AttemptFailure::Rejected(status) => write!(f, "request rejected ({})", status),
            AttemptFailure::ReceiverFailed => write!(f, "receiver reported FAIL"),
            AttemptFailure::ReceiverSilent => write!(f, "receiver went silent"),
            AttemptFailure::ProtocolViolation(detail) => write!(f, "protocol violation: {}", detail),
            AttemptFailure::Recv(detail) => write!(f, "receive error: {}", detail),
        }
    }
}

type AttemptResult = std::result::Result<(), AttemptFailure>;

/// 한 전송 동안 변하지 않는 송신 데이터
struct Outbound {
    header: TransferHeader,
    header_bytes: Vec<u8>,
    chunks: Vec<Chunk>,

    /// 청크별 직렬화 결과 (재전송 시 그대로 사용)
    datagrams: Vec<Vec<u8>>,
}

impl Outbound {
    fn new(builder: &ChunkBuilder, file_name: &str, data: &[u8], transfer_id: TransferId) -> Result<Self> {
        let header = builder.header(file_name, data, transfer_id);
        let header_bytes = Message::from(header.clone()).to_bytes()?;
        let chunks = builder.prepare(data, transfer_id);
        let datagrams = chunks
            .iter()
            .map(|chunk| Message::from(chunk.clone()).to_bytes())
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            header,
            header_bytes,
            chunks,
            datagrams,
        })
    }

    fn transfer_id(&self) -> TransferId {
        self.header.transfer_id
    }
}

/// 송신자
pub struct Sender {
    /// 설정
    config: Config,

    /// 전용 소켓
    socket: UdpSocket,

    /// 청크 분할기
    builder: ChunkBuilder,

    /// 최초 전송 장애 주입 정책
    drop_policy: Box<dyn DropPolicy>,

    /// 진행 이벤트 수신기
    progress: Box<dyn ProgressSink>,

    /// 현재 상태
    state: SenderState,
}

impl Sender {
    /// 새 송신자 생성 (소켓 바인딩)
    pub async fn bind(config: Config, bind_addr: SocketAddr) -> Result<Self> {
        let builder = ChunkBuilder::new(config.chunk_size)?;
        let socket = UdpSocket::bind(bind_addr).await?;
        debug!("Sender bound to {}", socket.local_addr()?);

        Ok(Self {
            config,
            socket,
            builder,
            drop_policy: Box::new(NeverDrop),
            progress: Box::new(LogProgress),
            state: SenderState::Init,
        })
    }

    /// 장애 주입 정책 지정
    pub fn with_drop_policy(mut self, policy: impl DropPolicy + 'static) -> Self {
        self.drop_policy = Box::new(policy);
        self
    }

    /// 진행 이벤트 수신기 지정
    pub fn with_progress(mut self, progress: impl ProgressSink + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    fn set_state(&mut self, state: SenderState) {
        debug!("Sender state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// 디스크의 파일을 읽어 전송
    pub async fn send_file(&mut self, path: impl AsRef<Path>, dest: SocketAddr) -> Result<SendReport> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.send(&file_name, &data, dest).await
    }

    /// 새 전송 ID로 데이터 전송
    pub async fn send(&mut self, file_name: &str, data: &[u8], dest: SocketAddr) -> Result<SendReport> {
        self.send_with_id(file_name, data, dest, Uuid::new_v4()).await
    }

    /// 지정한 전송 ID로 데이터 전송
    pub async fn send_with_id(
        &mut self,
        file_name: &str,
        data: &[u8],
        dest: SocketAddr,
        transfer_id: TransferId,
    ) -> Result<SendReport> {
        self.set_state(SenderState::Init);

        let start = Instant::now();
        let outbound = Outbound::new(&self.builder, file_name, data, transfer_id)?;
        let mut report = SendReport::new(transfer_id, data.len() as u64, outbound.header.chunk_count);
        let mut buf = vec![0u8; self.config.recv_buffer_size];

        info!(
            "Sending {} ({} bytes, {} chunks) to {} as {}",
            file_name,
            data.len(),
            outbound.chunks.len(),
            dest,
            transfer_id
        );

        for attempt in 1..=self.config.max_attempts {
            report.attempts = attempt;

            match self.run_attempt(&outbound, dest, attempt, &mut report, &mut buf).await {
                Ok(Ok(())) => {
                    self.set_state(SenderState::Succeeded);
                    report.elapsed = start.elapsed();
                    self.progress.report(ProgressEvent::Succeeded {
                        transfer_id,
                        attempts: attempt,
                    });
                    info!(
                        "Transfer {} succeeded after {} attempt(s) in {:.2}s ({} resent)",
                        transfer_id,
                        attempt,
                        report.elapsed.as_secs_f64(),
                        report.chunks_resent
                    );
                    return Ok(report);
                }
                Ok(Err(failure)) => {
                    warn!(
                        "Transfer {} attempt {}/{} failed: {}",
                        transfer_id, attempt, self.config.max_attempts, failure
                    );
                    self.progress.report(ProgressEvent::AttemptFailed {
                        transfer_id,
                        attempt,
                        reason: failure.to_string(),
                    });
                }
                Err(e) => {
                    self.set_state(SenderState::Failed);
                    return Err(e);
                }
            }
        }

        self.set_state(SenderState::Failed);
        warn!("Transfer {} failed: attempts exhausted", transfer_id);
        Err(Error::AttemptsExhausted {
            attempts: self.config.max_attempts,
        })
    }

    /// 핸드쉐이크부터 완료까지 한 번의 시도
    ///
    /// 바깥 `Result`는 치명적 에러 (송신 IO), 안쪽은 재시도 가능한 실패.
    async fn run_attempt(
        &mut self,
        outbound: &Outbound,
        dest: SocketAddr,
        attempt: u32,
        report: &mut SendReport,
        buf: &mut [u8],
    ) -> Result<AttemptResult> {
        let transfer_id = outbound.transfer_id();

        self.set_state(SenderState::Handshake);
        self.progress.report(ProgressEvent::HandshakeStarted {
            transfer_id,
            attempt,
        });
        self.socket.send_to(&outbound.header_bytes, dest).await?;

        if let Err(failure) = self.await_ready(transfer_id, buf).await {
            return Ok(Err(failure));
        }
        self.progress.report(ProgressEvent::Ready { transfer_id });

        self.set_state(SenderState::Transmit);
        self.transmit(outbound, dest, report).await?;

        self.set_state(SenderState::AwaitCompletion);
        self.await_completion(outbound, dest, report, buf).await
    }

    /// READY 대기
    ///
    /// 다른 전송의 메시지나 상태가 아닌 메시지는 같은 데드라인 안에서 건너뛴다.
    async fn await_ready(&self, transfer_id: TransferId, buf: &mut [u8]) -> AttemptResult {
        let deadline = Instant::now() + self.config.handshake_timeout();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AttemptFailure::HandshakeTimeout);
            }

            let (len, addr) = match timeout(remaining, self.socket.recv_from(buf)).await {
                Err(_) => return Err(AttemptFailure::HandshakeTimeout),
                Ok(Err(e)) => return Err(AttemptFailure::Recv(e.to_string())),
                Ok(Ok(received)) => received,
            };

            match Message::from_bytes(&buf[..len]) {
                Ok(Message::Status(reply)) if reply.transfer_id == transfer_id => {
                    return match reply.status {
                        Status::Ready => Ok(()),
                        other => Err(AttemptFailure::Rejected(other)),
                    };
                }
                Ok(other) => {
                    debug!("Ignoring {:?} from {} during handshake", other.msg_type(), addr);
                }
                Err(e) => {
                    debug!("Ignoring undecodable datagram from {} during handshake: {}", addr, e);
                }
            }
        }
    }

    /// 모든 청크를 무작위 순서로 한 번씩 전송
    async fn transmit(&self, outbound: &Outbound, dest: SocketAddr, report: &mut SendReport) -> Result<()> {
        let transfer_id = outbound.transfer_id();
        let mut order: Vec<usize> = (0..outbound.chunks.len()).collect();
        order.shuffle(&mut rand::thread_rng());

        for idx in order {
            let chunk = &outbound.chunks[idx];
            let sequence = chunk.sequence();

            if self.drop_policy.should_drop(chunk) {
                debug!("Dropping chunk {} of {} (fault injection)", sequence, transfer_id);
                report.chunks_dropped += 1;
                self.progress.report(ProgressEvent::ChunkDropped {
                    transfer_id,
                    sequence,
                });
                continue;
            }

            self.socket.send_to(&outbound.datagrams[idx], dest).await?;
            report.chunks_sent += 1;
            self.progress.report(ProgressEvent::ChunkSent {
                transfer_id,
                sequence,
            });
        }

        debug!("Transmitted {} chunks of {}", outbound.chunks.len(), transfer_id);
        Ok(())
    }

    /// 재전송 요청 처리 및 최종 상태 대기
    async fn await_completion(
        &self,
        outbound: &Outbound,
        dest: SocketAddr,
        report: &mut SendReport,
        buf: &mut [u8],
    ) -> Result<AttemptResult> {
        let transfer_id = outbound.transfer_id();
        let mut idle_polls = 0u32;

        loop {
            let (len, addr) = match timeout(self.config.completion_timeout(), self.socket.recv_from(buf)).await
            {
                Err(_) => {
                    // 대기 만료는 재폴링 기회
                    idle_polls += 1;
                    debug!(
                        "No reply for {} ({}/{})",
                        transfer_id, idle_polls, self.config.completion_idle_polls
                    );
                    if idle_polls >= self.config.completion_idle_polls {
                        return Ok(Err(AttemptFailure::ReceiverSilent));
                    }
                    continue;
                }
                Ok(Err(e)) => return Ok(Err(AttemptFailure::Recv(e.to_string()))),
                Ok(Ok(received)) => received,
            };

            let message = match Message::from_bytes(&buf[..len]) {
                Ok(message) => message,
                Err(e) => {
                    return Ok(Err(AttemptFailure::ProtocolViolation(format!(
                        "undecodable datagram from {}: {}",
                        addr, e
                    ))));
                }
            };

            if message.transfer_id() != transfer_id {
                debug!("Ignoring {:?} for foreign transfer {}", message.msg_type(), message.transfer_id());
                continue;
            }
            idle_polls = 0;

            match message {
                Message::ResendRequest(request) => {
                    let sequence = request.sequence;
                    match outbound.datagrams.get(sequence as usize) {
                        Some(datagram) => {
                            debug!("Resending chunk {} of {}", sequence, transfer_id);
                            self.socket.send_to(datagram, dest).await?;
                            report.chunks_resent += 1;
                            self.progress.report(ProgressEvent::ChunkResent {
                                transfer_id,
                                sequence,
                            });
                        }
                        None => warn!("Resend request for unknown chunk {} of {}", sequence, transfer_id),
                    }
                }
                Message::Status(reply) => {
                    return Ok(match reply.status {
                        Status::Success => Ok(()),
                        Status::Fail => Err(AttemptFailure::ReceiverFailed),
                        other => Err(AttemptFailure::ProtocolViolation(format!(
                            "unexpected status {}",
                            other
                        ))),
                    });
                }
                other => {
                    return Ok(Err(AttemptFailure::ProtocolViolation(format!(
                        "unexpected {:?} message",
                        other.msg_type()
                    ))));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ResendRequest, StatusMessage};

    fn fast_config() -> Config {
        Config {
            max_attempts: 2,
            handshake_timeout_ms: 100,
            completion_timeout_ms: 100,
            completion_idle_polls: 3,
            ..Config::default()
        }
    }

    async fn peer() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    async fn recv_message(socket: &UdpSocket) -> (Message, SocketAddr) {
        let mut buf = vec![0u8; 65536];
        let (len, addr) = socket.recv_from(&mut buf).await.unwrap();
        (Message::from_bytes(&buf[..len]).unwrap(), addr)
    }

    async fn reply(socket: &UdpSocket, message: impl Into<Message>, to: SocketAddr) {
        let bytes = message.into().to_bytes().unwrap();
        socket.send_to(&bytes, to).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_handshake_consumes_attempts() {
        let (receiver, receiver_addr) = peer().await;
        let mut sender = Sender::bind(fast_config(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let fake_receiver = tokio::spawn(async move {
            let mut headers = 0;
            for _ in 0..2 {
                let (message, from) = recv_message(&receiver).await;
                if let Message::Header(header) = message {
                    headers += 1;
                    reply(&receiver, StatusMessage::new(header.transfer_id, Status::Canceled), from).await;
                }
            }
            headers
        });

        let result = sender.send("a.bin", b"abc", receiver_addr).await;
        assert!(matches!(result, Err(Error::AttemptsExhausted { attempts: 2 })));
        assert_eq!(sender.state(), SenderState::Failed);
        assert_eq!(fake_receiver.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_resend_request_is_answered_without_fault_injection() {
        let (receiver, receiver_addr) = peer().await;
        let mut sender = Sender::bind(fast_config(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
            .with_drop_policy(crate::fault::DropSequences::new([1]));

        let data: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
        let expected = data.clone();

        let fake_receiver = tokio::spawn(async move {
            let (message, from) = recv_message(&receiver).await;
            let Message::Header(header) = message else {
                panic!("헤더가 아님");
            };
            assert_eq!(header.chunk_count, 3);
            reply(&receiver, StatusMessage::new(header.transfer_id, Status::Ready), from).await;

            let mut sequences = Vec::new();
            for _ in 0..2 {
                let (message, _) = recv_message(&receiver).await;
                if let Message::Chunk(chunk) = message {
                    sequences.push(chunk.sequence());
                }
            }
            sequences.sort();
            assert_eq!(sequences, vec![0, 2]);

            reply(&receiver, ResendRequest::new(header.transfer_id, 1), from).await;
            let (message, _) = recv_message(&receiver).await;
            let Message::Chunk(resent) = message else {
                panic!("청크가 아님");
            };
            assert_eq!(resent.sequence(), 1);
            assert!(resent.verify());
            assert_eq!(resent.data.as_ref(), &expected[1024..2048]);

            reply(&receiver, StatusMessage::new(header.transfer_id, Status::Success), from).await;
        });

        let report = sender.send("b.bin", &data, receiver_addr).await.unwrap();
        fake_receiver.await.unwrap();

        assert_eq!(sender.state(), SenderState::Succeeded);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.chunks_sent, 2);
        assert_eq!(report.chunks_dropped, 1);
        assert_eq!(report.chunks_resent, 1);
    }

    #[tokio::test]
    async fn test_fail_restarts_from_handshake() {
        let (receiver, receiver_addr) = peer().await;
        let mut sender = Sender::bind(fast_config(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let fake_receiver = tokio::spawn(async move {
            for round in 0..2 {
                let (message, from) = recv_message(&receiver).await;
                let Message::Header(header) = message else {
                    panic!("헤더가 아님");
                };
                reply(&receiver, StatusMessage::new(header.transfer_id, Status::Ready), from).await;
                let (message, _) = recv_message(&receiver).await;
                assert!(matches!(message, Message::Chunk(_)));

                let status = if round == 0 { Status::Fail } else { Status::Success };
                reply(&receiver, StatusMessage::new(header.transfer_id, status), from).await;
            }
        });

        let report = sender.send("c.bin", b"tiny", receiver_addr).await.unwrap();
        fake_receiver.await.unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(report.chunks_sent, 2);
    }

    #[tokio::test]
    async fn test_protocol_violation_restarts_attempt() {
        let (receiver, receiver_addr) = peer().await;
        let config = Config {
            max_attempts: 4,
            ..fast_config()
        };
        let mut sender = Sender::bind(config, "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        // 시도마다 다른 위반: 예상 밖 종류, 해석 불가, 예상 밖 상태, 마지막은 SUCCESS
        let fake_receiver = tokio::spawn(async move {
            for round in 0..4 {
                let (message, from) = recv_message(&receiver).await;
                let Message::Header(header) = message else {
                    panic!("헤더가 아님");
                };
                reply(&receiver, StatusMessage::new(header.transfer_id, Status::Ready), from).await;
                let (message, _) = recv_message(&receiver).await;
                assert!(matches!(message, Message::Chunk(_)));

                match round {
                    0 => reply(&receiver, header.clone(), from).await,
                    1 => {
                        receiver.send_to(b"not a datagram", from).await.unwrap();
                    }
                    2 => reply(&receiver, StatusMessage::new(header.transfer_id, Status::Ready), from).await,
                    _ => reply(&receiver, StatusMessage::new(header.transfer_id, Status::Success), from).await,
                }
            }
        });

        let report = sender.send("e.bin", b"tiny", receiver_addr).await.unwrap();
        fake_receiver.await.unwrap();

        assert_eq!(sender.state(), SenderState::Succeeded);
        assert_eq!(report.attempts, 4);
        assert_eq!(report.chunks_sent, 4);
    }

    #[tokio::test]
    async fn test_silent_receiver_after_ready() {
        let (receiver, receiver_addr) = peer().await;
        let mut sender = Sender::bind(fast_config(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        // 첫 헤더에만 READY, 이후 무응답
        let fake_receiver = tokio::spawn(async move {
            let (message, from) = recv_message(&receiver).await;
            if let Message::Header(header) = message {
                reply(&receiver, StatusMessage::new(header.transfer_id, Status::Ready), from).await;
            }
            receiver
        });

        let result = sender.send("d.bin", b"data", receiver_addr).await;
        let _receiver = fake_receiver.await.unwrap();
        assert!(matches!(result, Err(Error::AttemptsExhausted { .. })));
    }
}
