//! Shared types for the minesweeper line protocol.
//!
//! `models` describes what a client can see of the board, `protocol` turns
//! text lines into [`protocol::Command`]s and [`protocol::Response`]s back
//! into text.

pub mod models;
pub mod protocol;
