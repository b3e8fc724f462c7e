//! # Somfy CLI
//!
//! 通过 Somfy Universal RTS Interface 向指定通道发送上升 / 下降 / 停止命令。
//!
//! ```bash
//! # 停止通道 1，然后上升通道 2 和 3（V1 控制器，默认 1.5s 间隔）
//! somfy-cli /dev/ttyUSB0 --stop 1 --up 2 3
//!
//! # V2 控制器，后台线程发送，等待全部发出后退出
//! somfy-cli /dev/ttyUSB0 --cmdver 2 --down 12 16 --threaded
//!
//! # 测试端口：不访问硬件，退出时打印写入的命令
//! somfy-cli TEST --down 1 3 --interval 0
//! ```
//!
//! 命令总是按 stop → up → down 的顺序发送。

use anyhow::{Context, Result, bail};
use clap::Parser;
use somfy_rts::transport::TEST_PORT_NAME;
use somfy_rts::{
    Action, Channel, Direction, DispatchMode, Dispatcher, DispatcherBuilder, MockTransport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{info, warn};

mod config;

use config::{CliConfig, Settings};

/// 下发顺序：停 → 升 → 降
const DIRECTION_ORDER: [Direction; 3] = [Direction::Stop, Direction::Up, Direction::Down];

/// Somfy CLI - RTS 卷帘命令行工具
#[derive(Parser, Debug)]
#[command(name = "somfy-cli")]
#[command(
    about = "Send up, down, and stop commands to specified channels through a Somfy Universal RTS Interface",
    long_about = None
)]
#[command(
    after_help = "Valid channel numbers are 1 through 5 for a version one controller and 1 through 16 \
                  for the version II controller. For testing purposes the port name 'TEST' can be used."
)]
#[command(version)]
struct Cli {
    /// 串口路径（`TEST` 为测试端口，可在配置文件中设置）
    port: Option<String>,

    /// 发送上升命令的通道
    #[arg(long, num_args = 1.., value_name = "#")]
    up: Vec<Channel>,

    /// 发送下降命令的通道
    #[arg(long, num_args = 1.., value_name = "#")]
    down: Vec<Channel>,

    /// 发送停止命令的通道
    #[arg(long, num_args = 1.., value_name = "#")]
    stop: Vec<Channel>,

    /// 控制器协议版本（1 或 2，默认 1）
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    cmdver: Option<u8>,

    /// 命令间隔秒数（默认 1.5）
    #[arg(long, allow_negative_numbers = true)]
    interval: Option<f64>,

    /// 发送第一条命令前先等待一个间隔
    #[arg(long)]
    pause: bool,

    /// 详细日志
    #[arg(short, long)]
    verbose: bool,

    /// 使用后台线程发送，退出前等待队列排空
    #[arg(long)]
    threaded: bool,

    /// 串口波特率（默认 9600）
    #[arg(long)]
    baud_rate: Option<u32>,

    /// 配置文件路径（默认 `<config_dir>/somfy/config.toml`）
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> CliConfig {
        CliConfig {
            port: self.port.clone(),
            interval: self.interval,
            cmdver: self.cmdver,
            baud_rate: self.baud_rate,
        }
    }

    fn channels(&self, direction: Direction) -> &[Channel] {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
            Direction::Stop => &self.stop,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "somfy_cli=debug,somfy_driver=debug,somfy_transport=debug"
    } else {
        "somfy_cli=info,somfy_driver=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    // 日志写 stderr，stdout 只留给测试端口的输出
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let file_config = CliConfig::load(cli.config.as_deref())?;
    let settings = Settings::try_from(cli.overrides().or(file_config))?;

    // 发送任何命令前先校验全部通道
    for direction in DIRECTION_ORDER {
        for &channel in cli.channels(direction) {
            Action::new(direction, channel).validate(settings.version)?;
        }
    }

    run(&cli, &settings)
}

fn run(cli: &Cli, settings: &Settings) -> Result<()> {
    if cli.pause {
        info!("Pausing {:?} before sending first command", settings.interval);
        thread::sleep(settings.interval);
    }

    let mut builder = DispatcherBuilder::new()
        .interval(settings.interval)
        .version(settings.version)
        .mode(DispatchMode::from_threaded(cli.threaded));

    let test_output = if settings.port == TEST_PORT_NAME {
        let mock = MockTransport::new();
        let output = mock.output();
        builder = builder.transport(mock);
        Some(output)
    } else {
        builder = builder.port(settings.port.as_str()).baud_rate(settings.baud_rate);
        None
    };

    let rts = Arc::new(
        builder
            .build()
            .with_context(|| format!("Failed to open port {}", settings.port))?,
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let rts = rts.clone();
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nReceived interrupt signal, discarding pending commands...");
            interrupted.store(true, Ordering::SeqCst);
            if let Ok(dropped) = rts.clear() {
                warn!("Interrupted, {} command(s) not sent", dropped);
            }
        })
        .context("Failed to set Ctrl-C handler")?;
    }

    // 无论发送是否成功都关闭端口
    let sent = send_all(&rts, cli, &interrupted);
    let closed = rts.close().context("Failed to close port");
    sent?;
    closed?;

    if let Some(output) = test_output {
        for bytes in output.writes() {
            println!("{}", bytes.escape_ascii());
        }
    }

    Ok(())
}

fn send_all(rts: &Dispatcher, cli: &Cli, interrupted: &AtomicBool) -> Result<()> {
    for direction in DIRECTION_ORDER {
        if interrupted.load(Ordering::SeqCst) {
            bail!("Interrupted");
        }
        let channels = cli.channels(direction);
        rts.enqueue(direction, channels.iter().copied())
            .with_context(|| format!("Failed to send {} to channels {:?}", direction, channels))?;
    }

    if rts.mode().is_worker() && !rts.flush(None)? {
        bail!("Pending commands were not sent");
    }
    if interrupted.load(Ordering::SeqCst) {
        bail!("Interrupted");
    }

    let metrics = rts.metrics();
    info!(
        "Sent {} command(s), {} dropped",
        metrics.commands_sent, metrics.commands_dropped
    );
    Ok(())
}
