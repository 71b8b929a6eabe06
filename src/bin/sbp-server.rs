//! sbp-server - shared board server.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use shared_board::board::{DEFAULT_MIN_COLS, DEFAULT_MIN_ROWS};
use shared_board::server::{Server, DEFAULT_BIND_ADDRESS, DEFAULT_PORT};
use shared_board::writer::DEFAULT_CHANNEL_CAPACITY;

/// Shared board server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_BIND_ADDRESS)]
    bind: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Initial and minimum number of board rows
    #[arg(long, default_value_t = DEFAULT_MIN_ROWS)]
    min_rows: usize,

    /// Initial and minimum number of board columns
    #[arg(long, default_value_t = DEFAULT_MIN_COLS)]
    min_cols: usize,

    /// Outbound frames queued per client
    #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    channel_capacity: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sbp_server={0},shared_board={0}", log_level).into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let server = Server::builder()
        .bind_address(&args.bind)
        .port(args.port)
        .min_board_size(args.min_rows, args.min_cols)
        .channel_capacity(args.channel_capacity)
        .bind()
        .await
        .with_context(|| format!("Failed to bind {}:{}", args.bind, args.port))?;

    info!(
        "Board {}x{}, accepting connections on {}",
        args.min_rows,
        args.min_cols,
        server.local_addr()
    );

    server.run().await.context("Server stopped")?;
    Ok(())
}
