use anyhow::Context;
use clap::Parser;
use minesweeper_server::{Args, MinesweeperServer, loader::build_board};
use tracing::{Level, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config();

    tracing_subscriber::fmt()
        .with_max_level(if config.debug {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();
    info!("💣 Starting Minesweeper server");

    let board = build_board(&config.board, config.probability)
        .await
        .with_context(|| format!("failed to build board from {:?}", config.board))?;
    info!(
        "🗺️ Board ready: {}x{} with {} mines",
        board.height(),
        board.width(),
        board.mine_count()
    );

    let server = MinesweeperServer::bind(config, board)
        .await
        .context("failed to start listener")?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C");
                shutdown.shutdown();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;
    info!("👋 Minesweeper server stopped");
    Ok(())
}
