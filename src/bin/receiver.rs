//! UDP 전송 수신자
//!
//! 지정한 포트에서 전송을 받아 저장 디렉터리에 기록한다. Ctrl-C로 종료.
//!
//! 사용법:
//!   cargo run --release --bin udp-receiver -- [OPTIONS] <PORT>
//!
//! 예시:
//!   cargo run --release --bin udp-receiver -- 7777
//!   cargo run --release --bin udp-receiver -- --dir /tmp/incoming 9000

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use udp_transfer::{Config, DirectoryPersist, Error, NullPersist, Persist, Receiver, Result, DEFAULT_PORT};

/// 수신자 설정
struct ReceiverArgs {
    bind_addr: SocketAddr,
    save_dir: PathBuf,
    save: bool,
    config: Config,
}

const USAGE: &str = r#"UDP Receiver - 체크섬 기반 UDP 파일 전송 수신자

사용법:
  udp-receiver [OPTIONS] [PORT]

옵션:
  -b, --bind <IP>        바인드 IP (기본: 127.0.0.1)
  -d, --dir <PATH>       저장 디렉터리 (기본: save)
  --no-save              수신만 하고 저장하지 않음
  --retries <N>          세션별 재시도 한도 (기본: 5)
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

fn parse_args() -> Result<Option<ReceiverArgs>> {
    let args: Vec<String> = std::env::args().collect();
    let mut ip = Ipv4Addr::LOCALHOST;
    let mut port = DEFAULT_PORT;
    let mut save_dir = PathBuf::from("save");
    let mut save = true;
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--bind" | "-b" => {
                ip = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--dir" | "-d" => {
                save_dir = PathBuf::from(value(&args, i, flag)?);
                i += 1;
            }
            "--no-save" => save = false,
            "--retries" => {
                config.session_retry_bound = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                return Ok(None);
            }
            other if other.starts_with('-') => {
                return Err(Error::InvalidArgument(format!("알 수 없는 옵션: {}", other)));
            }
            other => port = parse(other, "PORT")?,
        }
        i += 1;
    }

    Ok(Some(ReceiverArgs {
        bind_addr: SocketAddr::from((ip, port)),
        save_dir,
        save,
        config,
    }))
}

async fn run(args: ReceiverArgs) -> Result<()> {
    let persist: Box<dyn Persist> = if args.save {
        info!("Saving files to {}", args.save_dir.display());
        Box::new(DirectoryPersist::new(args.save_dir))
    } else {
        info!("Saving disabled");
        Box::new(NullPersist)
    };

    let mut receiver = Receiver::bind(args.config, args.bind_addr, persist).await?;
    info!("Server started at {}", receiver.local_addr()?);

    receiver
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let stats = receiver.stats();
    info!("Total files received: {}", stats.sessions_completed);
    info!("  Failed sessions: {}", stats.sessions_failed);
    info!("  Corrupt chunks: {}", stats.corrupt_chunks);
    info!("  Resend requests: {}", stats.resend_requests);
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
            error!("Receiver error: {}", e);
            ExitCode::FAILURE
        }
    }
}
