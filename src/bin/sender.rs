//! UDP 전송 송신자
//!
//! 파일 하나를 수신자에게 전송한다. 재시도를 모두 소진하면 종료 코드 1.
//!
//! 사용법:
//!   cargo run --release --bin udp-sender -- [OPTIONS] <FILE>
//!
//! 예시:
//!   # 기본 전송 (localhost:7777)
//!   cargo run --release --bin udp-sender -- data.bin
//!
//!   # 5% 드롭 시뮬레이션
//!   cargo run --release --bin udp-sender -- -H 192.168.1.10 -P 9000 -d 0.05 data.bin

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use tokio::net::lookup_host;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use udp_transfer::{Config, Error, RandomDrop, Result, Sender, DEFAULT_PORT};

/// 송신자 설정
struct SenderArgs {
    host: String,
    port: u16,
    file_path: PathBuf,
    drop_rate: f64,
    config: Config,
}

const USAGE: &str = r#"UDP Sender - 체크섬 기반 UDP 파일 전송 송신자

사용법:
  udp-sender [OPTIONS] <FILE>

옵션:
  -H, --host <HOST>      수신자 호스트 (기본: localhost)
  -P, --port <PORT>      수신자 포트 (기본: 7777)
  -b <SIZE>              청크 크기 바이트 (기본: 1024)
  -d <RATE>              청크 드롭 확률 0.0~1.0, 테스트용 (기본: 0)
  -a, --attempts <N>     최대 시도 횟수 (기본: 5)
  -h, --help             이 도움말 출력
"#;

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidArgument(format!("{} 값 필요", flag)))
}

fn parse<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::InvalidArgument(format!("{}: 유효하지 않은 값 {:?}", flag, raw)))
}

fn parse_args() -> Result<Option<SenderArgs>> {
    let args: Vec<String> = std::env::args().collect();
    let mut host = "localhost".to_string();
    let mut port = DEFAULT_PORT;
    let mut drop_rate = 0.0;
    let mut file_path = None;
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--host" | "-H" => {
                host = value(&args, i, flag)?.to_string();
                i += 1;
            }
            "--port" | "-P" => {
                port = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "-b" => {
                config.chunk_size = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "-d" => {
                drop_rate = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--attempts" | "-a" => {
                config.max_attempts = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                return Ok(None);
            }
            other if other.starts_with('-') => {
                return Err(Error::InvalidArgument(format!("알 수 없는 옵션: {}", other)));
            }
            other => file_path = Some(PathBuf::from(other)),
        }
        i += 1;
    }

    let file_path = file_path.ok_or_else(|| Error::InvalidArgument("전송할 파일 경로 필요".into()))?;

    Ok(Some(SenderArgs {
        host,
        port,
        file_path,
        drop_rate,
        config,
    }))
}

async fn run(args: SenderArgs) -> Result<()> {
    let dest: SocketAddr = lookup_host((args.host.as_str(), args.port))
        .await?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| Error::InvalidArgument(format!("주소를 찾을 수 없음: {}", args.host)))?;

    info!("Destination: {}", dest);
    info!("Chunk size: {} bytes", args.config.chunk_size);
    if args.drop_rate > 0.0 {
        info!("Drop rate: {:.1}%", args.drop_rate * 100.0);
    }

    let mut sender = Sender::bind(args.config, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
    if args.drop_rate > 0.0 {
        sender = sender.with_drop_policy(RandomDrop::new(args.drop_rate));
    }

    let report = sender.send_file(&args.file_path, dest).await?;

    info!("Success");
    info!("  Attempts: {}", report.attempts);
    info!("  Chunks: {} ({} resent)", report.chunk_count, report.chunks_resent);
    info!("  Time: {:.2}s", report.elapsed.as_secs_f64());
    info!("  Throughput: {:.2} MB/s", report.throughput() / 1_000_000.0);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to send data: {}", e);
            ExitCode::FAILURE
        }
    }
}
