//! 수신자 이벤트 루프
//!
//! - 소켓 하나로 여러 송신자의 전송을 동시에 받음 (전송 ID로 구분)
//! - 손상된 청크는 즉시 재전송 요청
//! - 대기 만료 시 스윕: 빈 슬롯 재요청, 재시도 한도 초과 세션은 FAIL 후 폐기
//! - 세션 맵은 이 루프만 접근하므로 잠금이 필요 없음

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::message::{Message, ResendRequest, Status, StatusMessage, TransferHeader, TransferId};
use crate::persist::{CompletedTransfer, Persist};
use crate::progress::{LogProgress, ProgressEvent, ProgressSink};
use crate::session::{Accept, Session};
use crate::stats::ReceiverStats;
use crate::{Config, Result, SENTINEL_TRANSFER_ID};

/// 루프 한 바퀴의 입력
#[derive(Debug)]
enum Event {
    Datagram { len: usize, addr: SocketAddr },
    Sweep,
}

/// 수신자
pub struct Receiver {
    /// 설정
    config: Config,

    /// 수신 소켓
    socket: UdpSocket,

    /// 진행 중인 세션 (전송 ID별)
    sessions: HashMap<TransferId, Session>,

    /// 완료된 전송 저장소
    persist: Arc<dyn Persist>,

    /// 진행 이벤트 수신기
    progress: Box<dyn ProgressSink>,

    /// 누적 통계
    stats: ReceiverStats,

    /// 마지막 스윕 시간
    last_sweep: Instant,
}

impl Receiver {
    /// 새 수신자 생성 (소켓 바인딩)
    pub async fn bind(config: Config, bind_addr: SocketAddr, persist: impl Persist + 'static) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;

        Ok(Self {
            config,
            socket,
            sessions: HashMap::new(),
            persist: Arc::new(persist),
            progress: Box::new(LogProgress),
            stats: ReceiverStats::default(),
            last_sweep: Instant::now(),
        })
    }

    /// 진행 이벤트 수신기 지정
    pub fn with_progress(mut self, progress: impl ProgressSink + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 누적 통계
    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    /// 진행 중인 세션 수
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, transfer_id: &TransferId) -> Option<&Session> {
        self.sessions.get(transfer_id)
    }

    /// 종료 없이 계속 서비스
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// `shutdown`이 완료될 때까지 서비스
    pub async fn run_until(&mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        let mut buf = vec![0u8; self.config.recv_buffer_size];
        info!("Receiver listening on {}", self.socket.local_addr()?);

        loop {
            let event = tokio::select! {
                _ = &mut shutdown => {
                    info!(
                        "Receiver shutting down ({} session(s) in progress)",
                        self.sessions.len()
                    );
                    return Ok(());
                }
                event = self.next_event(&mut buf) => event,
            };

            match event {
                Ok(Event::Datagram { len, addr }) => self.handle_datagram(&buf[..len], addr).await,
                Ok(Event::Sweep) => self.sweep().await,
                Err(e) => warn!("수신 에러: {}", e),
            }
        }
    }

    /// 다음 데이터그램 또는 스윕 시점 대기
    ///
    /// 세션이 없으면 무한 대기, 있으면 `sweep_interval`만큼만 대기한다.
    async fn next_event(&self, buf: &mut [u8]) -> Result<Event> {
        if self.sessions.is_empty() {
            let (len, addr) = self.socket.recv_from(buf).await?;
            return Ok(Event::Datagram { len, addr });
        }

        // 트래픽이 끊이지 않아도 스윕은 주기적으로 실행
        if self.last_sweep.elapsed() >= self.config.max_sweep_gap() {
            return Ok(Event::Sweep);
        }

        match timeout(self.config.sweep_interval(), self.socket.recv_from(buf)).await {
            Err(_) => Ok(Event::Sweep),
            Ok(received) => {
                let (len, addr) = received?;
                Ok(Event::Datagram { len, addr })
            }
        }
    }

    /// 데이터그램 하나 처리
    pub(crate) async fn handle_datagram(&mut self, bytes: &[u8], addr: SocketAddr) {
        match Message::from_bytes(bytes) {
            Ok(Message::Header(header)) => self.handle_header(header, addr).await,
            Ok(Message::Chunk(chunk)) => self.handle_chunk(chunk, addr).await,
            Ok(other) => {
                warn!("Unexpected {:?} message from {}", other.msg_type(), addr);
                self.reply_fail(SENTINEL_TRANSFER_ID, addr).await;
            }
            Err(e) => {
                warn!("Unknown datagram from {} ({} bytes): {}", addr, bytes.len(), e);
                self.reply_fail(SENTINEL_TRANSFER_ID, addr).await;
            }
        }
    }

    async fn handle_header(&mut self, header: TransferHeader, addr: SocketAddr) {
        let transfer_id = header.transfer_id;

        // 같은 전송의 재핸드쉐이크는 진행 상황을 건드리지 않음
        if self.sessions.contains_key(&transfer_id) {
            debug!("Duplicate header for {} from {}, ignoring", transfer_id, addr);
            return;
        }

        if header.chunk_count == 0 || header.chunk_count > self.config.max_chunk_count {
            warn!(
                "Rejecting {} from {}: chunk_count={} out of range",
                transfer_id, addr, header.chunk_count
            );
            self.reply_fail(transfer_id, addr).await;
            return;
        }

        info!(
            "Receiving {} ({} bytes, {} chunks) from {} as {}",
            header.file_name, header.file_size, header.chunk_count, addr, transfer_id
        );

        self.sessions.insert(transfer_id, Session::new(addr, &header));
        self.stats.sessions_opened += 1;
        self.progress.report(ProgressEvent::SessionOpened {
            transfer_id,
            peer: addr,
            chunk_count: header.chunk_count,
        });

        self.send(StatusMessage::new(transfer_id, Status::Ready), addr).await;
    }

    async fn handle_chunk(&mut self, chunk: Chunk, addr: SocketAddr) {
        let transfer_id = chunk.header.transfer_id;
        let sequence = chunk.sequence();

        let Some(session) = self.sessions.get_mut(&transfer_id) else {
            // 핸드쉐이크 전이거나 이미 끝난 전송
            debug!("Chunk {} for unknown transfer {} from {}", sequence, transfer_id, addr);
            self.stats.unknown_chunks += 1;
            return;
        };

        let result = session.accept_chunk(&chunk);
        let received = session.received_count();
        let total = session.chunk_count();
        let complete = session.is_complete();

        match result {
            Accept::OutOfRange => {
                warn!(
                    "Chunk {} out of range for {} ({} chunks), dropping",
                    sequence, transfer_id, total
                );
                return;
            }
            Accept::Corrupt => {
                debug!("Chunk {} of {} is corrupted", sequence, transfer_id);
                self.stats.corrupt_chunks += 1;
                self.progress.report(ProgressEvent::ChunkCorrupt {
                    transfer_id,
                    sequence,
                });
                self.send(ResendRequest::new(transfer_id, sequence), addr).await;
                self.stats.resend_requests += 1;
                return;
            }
            Accept::Duplicate => {
                self.stats.duplicate_chunks += 1;
            }
            Accept::Stored => {
                self.stats.chunks_accepted += 1;
                debug!("Received {}/{} of {}", received, total, transfer_id);
                self.progress.report(ProgressEvent::ChunkAccepted {
                    transfer_id,
                    received,
                    total,
                });
            }
        }

        if complete {
            self.complete_session(transfer_id, addr).await;
        }
    }

    /// 완료된 세션: SUCCESS 통보, 저장, 제거
    async fn complete_session(&mut self, transfer_id: TransferId, addr: SocketAddr) {
        let Some(session) = self.sessions.remove(&transfer_id) else {
            return;
        };

        self.send(StatusMessage::new(transfer_id, Status::Success), addr).await;

        match session.assemble() {
            Ok(data) => {
                if data.len() as u64 != session.file_size {
                    warn!(
                        "Transfer {} assembled {} bytes, header declared {}",
                        transfer_id,
                        data.len(),
                        session.file_size
                    );
                }

                info!(
                    "Received all chunks of {} in {:.2}s",
                    session.file_name,
                    session.created_at.elapsed().as_secs_f64()
                );

                let bytes = data.len();
                let completed = CompletedTransfer {
                    transfer_id,
                    file_name: session.file_name,
                    data,
                };
                // 디스크 쓰기는 블로킹 풀에서 실행
                let persist = Arc::clone(&self.persist);
                match tokio::task::spawn_blocking(move || persist.persist(&completed)).await {
                    Ok(Ok(())) => self.stats.bytes_persisted += bytes as u64,
                    Ok(Err(e)) => {
                        // 세션은 이미 제거됨, 데이터 유실 허용
                        warn!("Failed to persist {}: {}", transfer_id, e);
                        self.stats.persist_errors += 1;
                    }
                    Err(e) => {
                        warn!("Persist task for {} aborted: {}", transfer_id, e);
                        self.stats.persist_errors += 1;
                    }
                }

                self.stats.sessions_completed += 1;
                self.progress.report(ProgressEvent::SessionCompleted { transfer_id, bytes });
            }
            Err(e) => warn!("Failed to assemble {}: {}", transfer_id, e),
        }

        if self.sessions.is_empty() {
            info!(
                "All transfers received (total completed: {})",
                self.stats.sessions_completed
            );
        }
    }

    /// 재시도 스윕
    ///
    /// 최근 `sweep_interval` 안에 청크를 받은 세션은 건너뛴다.
    pub(crate) async fn sweep(&mut self) {
        self.last_sweep = Instant::now();
        let bound = self.config.session_retry_bound;
        let interval = self.config.sweep_interval();

        let expired: Vec<TransferId> = self
            .sessions
            .values()
            .filter(|session| session.retry_count() >= bound)
            .map(|session| session.transfer_id)
            .collect();

        for transfer_id in expired {
            if let Some(session) = self.sessions.remove(&transfer_id) {
                let missing = session.chunk_count() - session.received_count();
                warn!(
                    "Failed to receive all chunks for {} ({:.1}% received)",
                    transfer_id,
                    session.receive_ratio() * 100.0
                );
                self.stats.sessions_failed += 1;
                self.progress.report(ProgressEvent::SessionFailed { transfer_id, missing });
                self.reply_fail(transfer_id, session.peer).await;
            }
        }

        let mut requests = Vec::new();
        for session in self.sessions.values_mut() {
            if session.idle_for() < interval {
                continue;
            }

            let retry = session.bump_retry();
            let missing = session.missing_sequences();
            debug!(
                "Requesting {} missing chunk(s) of {} (retry {}/{})",
                missing.len(),
                session.transfer_id,
                retry,
                bound
            );
            requests.extend(
                missing
                    .into_iter()
                    .map(|sequence| (session.peer, ResendRequest::new(session.transfer_id, sequence))),
            );
        }

        for (peer, request) in requests {
            self.send(request, peer).await;
            self.stats.resend_requests += 1;
        }

        if self.sessions.is_empty() {
            debug!("No sessions in progress, back to idle wait");
        }
    }

    async fn reply_fail(&mut self, transfer_id: TransferId, addr: SocketAddr) {
        self.send(StatusMessage::new(transfer_id, Status::Fail), addr).await;
        self.stats.fail_replies += 1;
    }

    /// 메시지 전송 (실패는 로그만)
    async fn send(&self, message: impl Into<Message>, addr: SocketAddr) {
        let message = message.into();
        let bytes = match message.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode {:?} message: {}", message.msg_type(), e);
                return;
            }
        };

        if let Err(e) = self.socket.send_to(&bytes, addr).await {
            warn!("Failed to send {:?} to {}: {}", message.msg_type(), addr, e);
        }
    }
}
