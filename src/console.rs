//! Line-based console front end.
//!
//! Turns typed lines into requests and inbound frames into printable text.
//! Nothing here touches the network; `sbp-client` wires it to a [`Client`].
//!
//! [`Client`]: crate::client::Client

use crate::board::BoardSnapshot;
use crate::protocol::{Frame, ProtocolCode};

/// Typed line that ends the session.
pub const EXIT_COMMAND: &str = "exit";

/// Typed line that requests the board.
pub const BOARD_COMMAND: &str = "SharedBoard";

/// What a typed line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Send `DISCONNECT` and quit.
    Exit,
    /// Send `GET_BOARD`.
    ShowBoard,
    /// Send `POST_TEXT` with this text.
    Post(String),
}

impl ConsoleCommand {
    /// Parse one console line.
    ///
    /// Anything that is not a command is posted as `"(nickname) line"`.
    pub fn parse(line: &str, nickname: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        match line {
            EXIT_COMMAND => ConsoleCommand::Exit,
            BOARD_COMMAND => ConsoleCommand::ShowBoard,
            text => ConsoleCommand::Post(format!("({}) {}", nickname, text)),
        }
    }
}

/// Render an inbound frame for display.
///
/// Returns `None` for frames the console does not show.
pub fn render(frame: &Frame) -> Option<String> {
    let line = match frame.code() {
        ProtocolCode::Disconnect => "DISCONNECT: Disconnected from the server...".to_string(),
        ProtocolCode::SessionEstablished => {
            "COMMTEST: Successfully connected to server...".to_string()
        }
        ProtocolCode::Error => format!("ERR: {}", frame.payload_text_lossy()),
        ProtocolCode::PostText => format!("DATA: {}", frame.payload_text_lossy()),
        ProtocolCode::GetBoard => match BoardSnapshot::from_payload(frame.payload()) {
            Ok(snapshot) => format!(
                "DATA: board {}x{}\n{}",
                snapshot.rows,
                snapshot.cols,
                render_board(&snapshot)
            ),
            Err(e) => {
                tracing::debug!("board payload is not a grid: {}", e);
                format!("DATA: {}", frame.payload_text_lossy())
            }
        },
        ProtocolCode::CommTest | ProtocolCode::Unknown(_) => return None,
    };
    Some(line)
}

/// One line per row, cells separated by ` | `, empty cells as `.`.
pub fn render_board(snapshot: &BoardSnapshot) -> String {
    snapshot
        .cells
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| if cell.is_empty() { "." } else { cell.as_str() })
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
