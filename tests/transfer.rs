//! 루프백 UDP 위의 종단 간 전송 테스트

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use udp_transfer::{
    Config, DirectoryPersist, DropSequences, Error, MemoryPersist, Persist, ProgressEvent, RandomDrop,
    Receiver, Sender, SenderState,
};

/// 테스트용 파일 데이터 (소수 모듈러로 패턴 생성)
fn test_data(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| ((i % 251) as u8).wrapping_add(seed)).collect()
}

fn fast_config() -> Config {
    Config {
        handshake_timeout_ms: 200,
        completion_timeout_ms: 500,
        sweep_interval_ms: 50,
        ..Config::default()
    }
}

struct RunningReceiver {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Receiver>,
}

impl RunningReceiver {
    async fn start(config: Config, persist: impl Persist + 'static) -> Self {
        let mut receiver = Receiver::bind(config, "127.0.0.1:0".parse().unwrap(), persist)
            .await
            .unwrap();
        let addr = receiver.local_addr().unwrap();
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            receiver
                .run_until(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap();
            receiver
        });

        Self {
            addr,
            shutdown,
            handle,
        }
    }

    async fn stop(self) -> Receiver {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap()
    }
}

async fn sender(config: Config) -> Sender {
    Sender::bind(config, "127.0.0.1:0".parse().unwrap()).await.unwrap()
}

#[tokio::test]
async fn transfer_without_loss() {
    let persist = MemoryPersist::new();
    let receiver = RunningReceiver::start(fast_config(), persist.clone()).await;

    let data = test_data(10_000, 0);
    let mut sender = sender(fast_config().with_chunk_size(1024)).await;
    let report = sender.send("scenario1.bin", &data, receiver.addr).await.unwrap();

    assert_eq!(sender.state(), SenderState::Succeeded);
    assert_eq!(report.chunk_count, 10);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.chunks_sent, 10);

    let receiver = receiver.stop().await;
    let completed = persist.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].transfer_id, report.transfer_id);
    assert_eq!(completed[0].data.len(), 10_000);
    assert_eq!(completed[0].data.as_ref(), &data[..]);
    assert_eq!(receiver.session_count(), 0);
    assert_eq!(receiver.stats().sessions_completed, 1);
}

#[tokio::test]
async fn dropped_chunk_is_requested_and_resent() {
    let persist = MemoryPersist::new();
    let receiver = RunningReceiver::start(fast_config(), persist.clone()).await;

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let data = test_data(10_000, 1);
    let mut sender = sender(fast_config())
        .await
        .with_drop_policy(DropSequences::new([3]))
        .with_progress(progress_tx);

    let report = sender.send("scenario2.bin", &data, receiver.addr).await.unwrap();
    assert_eq!(report.attempts, 1);
    assert_eq!(report.chunks_dropped, 1);
    assert!(report.chunks_resent >= 1);

    let mut resent = Vec::new();
    while let Ok(event) = progress_rx.try_recv() {
        if let ProgressEvent::ChunkResent { sequence, .. } = event {
            resent.push(sequence);
        }
    }
    assert!(!resent.is_empty());
    assert!(resent.iter().all(|&sequence| sequence == 3));

    let receiver = receiver.stop().await;
    assert!(receiver.stats().resend_requests >= 1);
    assert_eq!(persist.completed()[0].data.as_ref(), &data[..]);
}

#[tokio::test]
async fn silent_receiver_exhausts_attempts() {
    // 데이터그램을 받기만 하고 절대 응답하지 않는 소켓
    let blackhole = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let config = Config {
        max_attempts: 3,
        handshake_timeout_ms: 100,
        ..Config::default()
    };

    let mut sender = sender(config).await;
    let start = Instant::now();
    let result = sender
        .send("scenario3.bin", &test_data(10_000, 2), blackhole.local_addr().unwrap())
        .await;

    assert!(matches!(result, Err(Error::AttemptsExhausted { attempts: 3 })));
    assert_eq!(sender.state(), SenderState::Failed);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transfers_do_not_cross_talk() {
    let persist = MemoryPersist::new();
    let receiver = RunningReceiver::start(fast_config(), persist.clone()).await;
    let addr = receiver.addr;

    let first = test_data(50_000, 10);
    let second = test_data(30_000, 20);

    let first_task = {
        let data = first.clone();
        tokio::spawn(async move {
            let mut sender = sender(fast_config().with_chunk_size(512)).await;
            sender.send("first.bin", &data, addr).await
        })
    };
    let second_task = {
        let data = second.clone();
        tokio::spawn(async move {
            let mut sender = sender(fast_config())
                .await
                .with_drop_policy(RandomDrop::new(0.2));
            sender.send("second.bin", &data, addr).await
        })
    };

    let first_report = first_task.await.unwrap().unwrap();
    let second_report = second_task.await.unwrap().unwrap();
    assert_ne!(first_report.transfer_id, second_report.transfer_id);

    let receiver = receiver.stop().await;
    assert_eq!(receiver.stats().sessions_completed, 2);

    let completed = persist.completed();
    assert_eq!(completed.len(), 2);
    for transfer in completed {
        match transfer.file_name.as_str() {
            "first.bin" => {
                assert_eq!(transfer.transfer_id, first_report.transfer_id);
                assert_eq!(transfer.data.as_ref(), &first[..]);
            }
            "second.bin" => {
                assert_eq!(transfer.transfer_id, second_report.transfer_id);
                assert_eq!(transfer.data.as_ref(), &second[..]);
            }
            other => panic!("예상하지 못한 파일: {}", other),
        }
    }
}

#[tokio::test]
async fn file_round_trip_through_directory() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.bin");
    let data = test_data(4_321, 3);
    std::fs::write(&input, &data).unwrap();

    let save_dir = dir.path().join("save");
    let receiver = RunningReceiver::start(fast_config(), DirectoryPersist::new(&save_dir)).await;

    let mut sender = sender(fast_config().with_chunk_size(1000)).await;
    let report = sender.send_file(&input, receiver.addr).await.unwrap();
    receiver.stop().await;

    let prefix = &report.transfer_id.simple().to_string()[..6];
    let saved = std::fs::read(save_dir.join(format!("{}-input.bin", prefix))).unwrap();
    assert_eq!(saved, data);
}

#[tokio::test]
async fn missing_source_file_is_reported_immediately() {
    let mut sender = sender(fast_config()).await;
    let result = sender
        .send_file("/nonexistent/definitely/missing.bin", "127.0.0.1:9".parse().unwrap())
        .await;

    assert!(matches!(result, Err(Error::Io(_))));
}
