//! Multiplayer minesweeper server.
//!
//! Every connected client plays on one shared [`logic::Board`]. Clients send
//! one command per line (`look`, `dig`, `flag`, `deflag`, `help`, `bye`) and
//! get the board, `BOOM!` or a message back. [`server::MinesweeperServer`]
//! accepts connections, bounds the number of simultaneous players and runs one
//! task per session.

pub mod config;
pub mod data;
pub mod error;
pub mod loader;
pub mod logic;
pub mod routes;
pub mod server;

pub use config::{Args, BoardSource, CapacityPolicy, ServerConfig};
pub use error::{BoardError, Result, ServerError};
pub use logic::{Board, DigOutcome, SharedBoard};
pub use server::{MinesweeperServer, ShutdownHandle};
