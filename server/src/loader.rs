use std::path::Path;

use tracing::info;

use crate::{
    config::{BoardSource, DEFAULT_SIZE},
    error::Result,
    logic::Board,
};

/// Reads a board file: rows of `0`/`1` separated by spaces, `1` for a mine.
pub async fn load_board(path: &Path) -> Result<Board> {
    info!("Loading board from {}", path.display());
    let text = tokio::fs::read_to_string(path).await?;
    Ok(Board::from_text(&text)?)
}

pub async fn build_board(source: &BoardSource, probability: f64) -> Result<Board> {
    let board = match source {
        BoardSource::Default => Board::from_probability(DEFAULT_SIZE, DEFAULT_SIZE, probability)?,
        BoardSource::Size(size) => Board::from_probability(*size, *size, probability)?,
        BoardSource::File(path) => load_board(path).await?,
        BoardSource::Difficulty(difficulty) => Board::from_difficulty(*difficulty)?,
    };
    Ok(board)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use minesweeper_common::models::{Difficulty, Pos};

    use super::*;
    use crate::error::{BoardError, ServerError};

    #[tokio::test]
    async fn test_load_board_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0 1 0").unwrap();
        writeln!(file, "0 0 0").unwrap();
        writeln!(file, "1 0 0").unwrap();

        let board = build_board(&BoardSource::File(file.path().to_path_buf()), 0.5)
            .await
            .unwrap();
        assert_eq!(board.mine_count(), 2);
        assert!(board.has_mine(Pos::new(0, 1)).unwrap());
    }

    #[tokio::test]
    async fn test_load_non_square_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0 1 0").unwrap();
        writeln!(file, "0 0 0").unwrap();

        let err = load_board(file.path()).await.unwrap_err();
        assert!(matches!(err, ServerError::Board(BoardError::InvalidShape(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_board(&dir.path().join("missing.txt")).await.unwrap_err();
        assert!(matches!(err, ServerError::Io(_)));
    }

    #[tokio::test]
    async fn test_generated_sources() {
        let board = build_board(&BoardSource::Default, 0.25).await.unwrap();
        assert_eq!((board.height(), board.width()), (DEFAULT_SIZE, DEFAULT_SIZE));

        let board = build_board(&BoardSource::Size(6), 1.0).await.unwrap();
        assert_eq!(board.mine_count(), 36);

        let board = build_board(&BoardSource::Difficulty(Difficulty::INTERMEDIATE), 0.0)
            .await
            .unwrap();
        assert_eq!(board.mine_count(), 40);
    }
}
