//! sbp-client - console client for the shared board.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use shared_board::client::Client;
use shared_board::console::{render, ConsoleCommand};
use shared_board::error::SbpError;
use shared_board::protocol::ProtocolCode;
use shared_board::server::DEFAULT_PORT;

/// Shared board console client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host name or address
    server: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Nickname prefixed to every post (asked for if omitted)
    #[arg(short, long)]
    nickname: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sbp_client={0},shared_board={0}", log_level).into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut client = Client::connect(&args.server, args.port)
        .await
        .with_context(|| format!("Failed to connect to {}:{}", args.server, args.port))?;
    info!("Connected from {}", client.local_addr());

    client.comm_test().await.context("Failed to open session")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let nickname = match args.nickname {
        Some(nickname) => nickname,
        None => {
            println!("Enter your nickname: ");
            lines
                .next_line()
                .await
                .context("Failed to read nickname")?
                .unwrap_or_default()
                .trim()
                .to_string()
        }
    };

    loop {
        tokio::select! {
            frame = client.next_frame() => {
                let Some(frame) = frame else {
                    println!("Client disconnected.");
                    return Ok(());
                };
                if let Some(line) = render(&frame) {
                    println!("{}", line);
                }
                if frame.code() == ProtocolCode::Disconnect {
                    return Ok(());
                }
            }
            line = lines.next_line() => {
                // End of input behaves like `exit`
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };

                match ConsoleCommand::parse(&line, &nickname) {
                    ConsoleCommand::Exit => break,
                    ConsoleCommand::ShowBoard => {
                        client.get_board().await.context("Failed to request board")?;
                    }
                    ConsoleCommand::Post(text) => match client.post_text(&text).await {
                        Ok(()) => debug!("posted {} bytes", text.len()),
                        Err(e @ (SbpError::SessionNotEstablished | SbpError::PayloadTooLarge { .. })) => {
                            println!("ERR: {}", e);
                        }
                        Err(e) => return Err(e).context("Failed to post"),
                    },
                }
            }
        }
    }

    client.disconnect().await.context("Failed to disconnect")?;
    Ok(())
}
