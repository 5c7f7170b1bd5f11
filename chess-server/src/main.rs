use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chess_engine::ProcessLauncher;
use chess_server::{server, Config, ConsoleObserver, Controller, DgtBoard, StateBroadcastHub};
use protocol::{Listener, TcpListener};

/// 电子棋盘对弈服务
#[derive(Parser, Debug)]
#[command(name = "chesspal", version, about)]
struct Cli {
    /// 配置文件
    #[arg(long, default_value = "./configs/chesspal.toml")]
    config: PathBuf,

    /// 在终端显示棋盘
    #[arg(long)]
    console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("chess_server=debug".parse()?))
        .init();

    let cli = Cli::parse();
    info!("电子棋盘对弈服务启动中...");

    let config = Config::load(&cli.config)?;
    let hub = Arc::new(StateBroadcastHub::new());

    let board = config
        .dgt_port
        .as_deref()
        .map(|port| DgtBoard::serial(port, config.dgt_baud_rate, config.settle_window()));

    let address = config.address.clone();
    let controller = Arc::new(Controller::new(
        config,
        hub.clone(),
        board,
        Arc::new(ProcessLauncher),
    ));
    let preview = controller.spawn_preview();

    if cli.console {
        hub.attach(Box::new(ConsoleObserver)).await;
    }

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    tokio::select! {
        result = server::run(listener, controller.clone(), hub) => result?,
        _ = tokio::signal::ctrl_c() => info!("收到退出信号"),
    }

    if let Err(e) = controller.abort().await {
        info!("退出时没有进行中的对局: {}", e);
    }
    if let Some(preview) = preview {
        preview.abort();
    }
    Ok(())
}
