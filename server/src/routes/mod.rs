mod line;

use std::net::SocketAddr;

use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::watch,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use minesweeper_common::protocol::{Command, Response};

use crate::{
    error::{BoardError, Result, ServerError},
    logic::{Board, DigOutcome, SharedBoard},
    server::{SessionGuard, stopped},
};

pub use line::{Line, LineReader, MAX_LINE_LENGTH};

/// What a session does after answering a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
    /// Stop taking commands but keep the connection until the peer leaves.
    Linger,
}

impl Flow {
    pub fn after(response: &Response, debug: bool) -> Self {
        match response {
            Response::Boom if !debug => Flow::Close,
            Response::Bye { debug: false } => Flow::Close,
            Response::Bye { debug: true } => Flow::Linger,
            _ => Flow::Continue,
        }
    }
}

fn board_or_error(board: &Board, result: std::result::Result<bool, BoardError>) -> Response {
    match result {
        Ok(_) => Response::Board(board.view()),
        Err(e) => Response::Error(e.to_string()),
    }
}

/// Runs one command against the board. The board lock is held for the whole
/// board interaction of the command.
#[instrument(level = "trace", skip(board, debug))]
pub async fn dispatch(board: &SharedBoard, command: Command, debug: bool) -> Response {
    match command {
        Command::Look => Response::Board(board.lock().await.view()),
        Command::Dig(pos) => {
            let mut board = board.lock().await;
            match board.dig(pos) {
                Ok(DigOutcome::Exploded) => Response::Boom,
                Ok(DigOutcome::Revealed { .. } | DigOutcome::Unchanged) => {
                    Response::Board(board.view())
                }
                Err(e) => Response::Error(e.to_string()),
            }
        }
        Command::Flag(pos) => {
            let mut board = board.lock().await;
            let result = board.set_flag(pos);
            board_or_error(&board, result)
        }
        Command::Deflag(pos) => {
            let mut board = board.lock().await;
            let result = board.clear_flag(pos);
            board_or_error(&board, result)
        }
        Command::Help => Response::Help,
        Command::Bye => Response::Bye { debug },
        Command::Invalid(reason) => Response::Error(reason),
    }
}

async fn send(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    writer
        .write_all(response.to_string().as_bytes())
        .await
        .map_err(|e| ServerError::connection("write failed", e))?;
    writer
        .flush()
        .await
        .map_err(|e| ServerError::connection("flush failed", e))
}

/// One connected client.
pub struct Session {
    pub id: Uuid,
    pub peer: SocketAddr,
    pub board: SharedBoard,
    pub debug: bool,
}

impl Session {
    /// Greets the client, then serves commands until the client leaves, a
    /// closing response is sent, or the server shuts down. A shutdown also
    /// interrupts a write to a client that has stopped reading.
    #[instrument(level = "trace", skip_all, fields(session = %self.id, peer = %self.peer))]
    pub async fn run(
        self,
        stream: TcpStream,
        players: usize,
        mut shutdown: watch::Receiver<bool>,
        mut guard: SessionGuard,
    ) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = LineReader::new(reader);

        let welcome = Response::Welcome { players };
        tokio::select! {
            sent = send(&mut writer, &welcome) => sent?,
            _ = stopped(&mut shutdown) => return Ok(()),
        }
        info!("Session {} serving {}", self.id, self.peer);

        loop {
            let line = tokio::select! {
                line = lines.next_line() => {
                    line.map_err(|e| ServerError::connection("read failed", e))?
                }
                _ = stopped(&mut shutdown) => {
                    info!("Closing session {} for shutdown", self.id);
                    break;
                }
            };
            let Some(line) = line else {
                info!("Client {} disconnected", self.peer);
                break;
            };

            let command = match line {
                Line::Text(line) => {
                    let command = Command::parse(&line);
                    if let Command::Invalid(reason) = &command {
                        warn!("Invalid command from {}: {:?} ({})", self.peer, line, reason);
                    } else {
                        debug!("Session {} received: {}", self.id, command);
                    }
                    command
                }
                Line::TooLong => {
                    warn!("Dropped an overlong line from {}", self.peer);
                    Command::Invalid(format!("Line longer than {MAX_LINE_LENGTH} bytes"))
                }
            };

            let response = dispatch(&self.board, command, self.debug).await;
            tokio::select! {
                sent = send(&mut writer, &response) => sent?,
                _ = stopped(&mut shutdown) => {
                    info!("Closing session {} for shutdown during write", self.id);
                    break;
                }
            }

            match Flow::after(&response, self.debug) {
                Flow::Continue => {}
                Flow::Close => {
                    info!(
                        "Closing session {} after {}",
                        self.id,
                        if response.is_boom() { "explosion" } else { "bye" }
                    );
                    break;
                }
                Flow::Linger => {
                    info!("Session {} left, connection kept open", self.id);
                    guard.release();
                    self.linger(&mut lines, &mut shutdown).await;
                    break;
                }
            }
        }

        let _ = writer.shutdown().await;
        Ok(())
    }

    /// Discards input until the peer closes or the server stops.
    async fn linger(
        &self,
        lines: &mut LineReader<OwnedReadHalf>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => debug!("Ignoring {:?} from lingering {}", line, self.peer),
                    Ok(None) | Err(_) => break,
                },
                _ = stopped(shutdown) => break,
            }
        }
        info!("Lingering connection {} closed", self.peer);
    }
}

#[cfg(test)]
mod tests {
    use minesweeper_common::models::{Cell, Pos};

    use super::*;

    fn shared(rows: &[&str]) -> SharedBoard {
        Board::new(
            rows.iter()
                .map(|row| row.chars().map(|c| c == '*').collect())
                .collect(),
        )
        .unwrap()
        .into_shared()
    }

    #[tokio::test]
    async fn test_dispatch_look() {
        let board = shared(&["*.", ".."]);
        assert_eq!(
            dispatch(&board, Command::Look, false).await.to_string(),
            "- -\n- -\n"
        );
    }

    #[tokio::test]
    async fn test_dispatch_dig_and_boom() {
        let board = shared(&["*..", "...", "..."]);

        let response = dispatch(&board, Command::Dig(Pos::new(2, 2)), false).await;
        assert_eq!(response.to_string(), "- 1  \n1 1  \n     \n");

        let response = dispatch(&board, Command::Dig(Pos::new(0, 0)), false).await;
        assert_eq!(response, Response::Boom);

        let response = dispatch(&board, Command::Dig(Pos::new(0, 0)), false).await;
        assert!(matches!(response, Response::Board(_)));
    }

    #[tokio::test]
    async fn test_dispatch_out_of_bounds() {
        let board = shared(&["..", ".."]);
        for command in [
            Command::Dig(Pos::new(2, 0)),
            Command::Flag(Pos::new(0, -1)),
            Command::Deflag(Pos::new(9, 9)),
        ] {
            let response = dispatch(&board, command, false).await;
            assert!(matches!(&response, Response::Error(m) if m.contains("not contained")));
        }
        assert_eq!(board.lock().await.render(), "- -\n- -\n");
    }

    #[tokio::test]
    async fn test_dispatch_flag_deflag() {
        let board = shared(&["*..", "...", "..."]);

        dispatch(&board, Command::Flag(Pos::new(1, 1)), false).await;
        assert_eq!(board.lock().await.cell(Pos::new(1, 1)).unwrap(), Cell::Flagged);

        let response = dispatch(&board, Command::Deflag(Pos::new(1, 1)), false).await;
        let Response::Board(view) = response else {
            panic!("expected a board");
        };
        assert_eq!(view.get(1, 1), Some(Cell::Hidden));
    }

    #[tokio::test]
    async fn test_dispatch_text_commands() {
        let board = shared(&["."]);
        assert_eq!(dispatch(&board, Command::Help, false).await, Response::Help);
        assert_eq!(
            dispatch(&board, Command::Bye, true).await,
            Response::Bye { debug: true }
        );
        assert_eq!(
            dispatch(&board, Command::Invalid("nope".into()), false).await,
            Response::Error("nope".into())
        );
    }

    #[test]
    fn test_flow_after_response() {
        assert_eq!(Flow::after(&Response::Boom, false), Flow::Close);
        assert_eq!(Flow::after(&Response::Boom, true), Flow::Continue);
        assert_eq!(Flow::after(&Response::Bye { debug: false }, false), Flow::Close);
        assert_eq!(Flow::after(&Response::Bye { debug: true }, true), Flow::Linger);
        assert_eq!(Flow::after(&Response::Help, false), Flow::Continue);
        assert_eq!(Flow::after(&Response::Error("x".into()), false), Flow::Continue);
    }
}
