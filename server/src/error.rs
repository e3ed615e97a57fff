//! Error types for the minesweeper server

use thiserror::Error;

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Failures of board construction or board access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    /// Construction input is not a non-empty rectangular grid of mines
    #[error("Invalid board shape: {0}")]
    InvalidShape(String),

    /// Coordinates outside the grid
    #[error("The coordinates {row}, {col} are not contained within the board")]
    OutOfBounds { row: i64, col: i64 },
}

/// Server-level failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listener or startup I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Board could not be built
    #[error(transparent)]
    Board(#[from] BoardError),

    /// No free session slot
    #[error("Capacity exceeded: all {max} session slots are taken")]
    CapacityExceeded { max: usize },

    /// Transport failure on a single session
    #[error("Connection fault: {0}")]
    ConnectionFault(String),
}

impl ServerError {
    pub fn connection(context: &str, err: std::io::Error) -> Self {
        ServerError::ConnectionFault(format!("{context}: {err}"))
    }
}
