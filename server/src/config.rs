//! Server configuration and the command-line interface that fills it in.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use clap::{Parser, ValueEnum};
use minesweeper_common::models::Difficulty;

pub const DEFAULT_PORT: u16 = 3666;
pub const DEFAULT_MAX_CLIENTS: usize = 4;
pub const DEFAULT_SIZE: usize = 10;
pub const DEFAULT_PROBABILITY: f64 = 0.25;

/// What happens to a connection that arrives while every slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CapacityPolicy {
    /// Stop accepting until a session ends. Pending connections wait in the
    /// listen backlog.
    #[default]
    Wait,
    /// Accept, tell the client the server is full and close.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Easy,
    Intermediate,
    Hard,
}

impl From<Preset> for Difficulty {
    fn from(value: Preset) -> Self {
        match value {
            Preset::Easy => Difficulty::EASY,
            Preset::Intermediate => Difficulty::INTERMEDIATE,
            Preset::Hard => Difficulty::HARD,
        }
    }
}

/// Where the shared board comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardSource {
    /// `DEFAULT_SIZE` square board with random mines.
    Default,
    /// Square board of the given size with random mines.
    Size(usize),
    /// Board file of `0`/`1` rows.
    File(PathBuf),
    /// Exact mine count on a fixed grid.
    Difficulty(Difficulty),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Mines stay non-fatal and `bye` keeps the connection open.
    pub debug: bool,
    pub max_clients: usize,
    pub capacity_policy: CapacityPolicy,
    /// Stop the server once the last session has ended.
    pub exit_when_idle: bool,
    pub board: BoardSource,
    /// Mine probability for randomly filled boards.
    pub probability: f64,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            debug: false,
            max_clients: DEFAULT_MAX_CLIENTS,
            capacity_policy: CapacityPolicy::default(),
            exit_when_idle: false,
            board: BoardSource::Default,
            probability: DEFAULT_PROBABILITY,
        }
    }
}

fn parse_max_clients(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("at least one client must be allowed".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_probability(value: &str) -> Result<f64, String> {
    let p: f64 = value.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(format!("{p} is not within 0..=1"))
    }
}

/// Multiplayer minesweeper over a line-based TCP protocol
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Debug mode: digging a mine does not end the session and `bye` keeps
    /// the connection open. Also enables debug logging.
    #[arg(short, long)]
    pub debug: bool,

    /// Address to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Random square board of this size
    #[arg(short, long, conflicts_with_all = ["file", "difficulty"])]
    pub size: Option<usize>,

    /// Load the board from a file of 0/1 rows
    #[arg(short, long, conflicts_with_all = ["size", "difficulty"])]
    pub file: Option<PathBuf>,

    /// Classic board with an exact number of mines
    #[arg(long, value_enum, conflicts_with_all = ["size", "file"])]
    pub difficulty: Option<Preset>,

    /// Mine probability for random boards
    #[arg(long, default_value_t = DEFAULT_PROBABILITY, value_parser = parse_probability)]
    pub probability: f64,

    /// Maximum number of simultaneous players
    #[arg(short, long, default_value_t = DEFAULT_MAX_CLIENTS, value_parser = parse_max_clients)]
    pub max_clients: usize,

    /// What to do with connections beyond --max-clients
    #[arg(long, value_enum, default_value_t = CapacityPolicy::Wait)]
    pub on_full: CapacityPolicy,

    /// Shut down when the last player leaves
    #[arg(long)]
    pub exit_when_idle: bool,
}

impl Args {
    pub fn into_config(self) -> ServerConfig {
        let board = match (self.size, self.file, self.difficulty) {
            (Some(size), _, _) => BoardSource::Size(size),
            (_, Some(path), _) => BoardSource::File(path),
            (_, _, Some(preset)) => BoardSource::Difficulty(preset.into()),
            _ => BoardSource::Default,
        };

        ServerConfig {
            host: self.host,
            port: self.port,
            debug: self.debug,
            max_clients: self.max_clients,
            capacity_policy: self.on_full,
            exit_when_idle: self.exit_when_idle,
            board,
            probability: self.probability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Args::parse_from(["minesweeper-server"]).into_config();
        assert_eq!(config.port, 3666);
        assert_eq!(config.max_clients, 4);
        assert!(!config.debug);
        assert!(!config.exit_when_idle);
        assert_eq!(config.board, BoardSource::Default);
        assert_eq!(config.capacity_policy, CapacityPolicy::Wait);
        assert_eq!(config.listen_addr().port(), 3666);
    }

    #[test]
    fn test_board_sources() {
        let config = Args::parse_from(["minesweeper-server", "--size", "12"]).into_config();
        assert_eq!(config.board, BoardSource::Size(12));

        let config = Args::parse_from(["minesweeper-server", "-f", "board.txt"]).into_config();
        assert_eq!(config.board, BoardSource::File(PathBuf::from("board.txt")));

        let config =
            Args::parse_from(["minesweeper-server", "--difficulty", "hard"]).into_config();
        assert_eq!(config.board, BoardSource::Difficulty(Difficulty::HARD));
    }

    #[test]
    fn test_board_sources_conflict() {
        assert!(Args::try_parse_from(["minesweeper-server", "-s", "5", "-f", "b.txt"]).is_err());
    }

    #[test]
    fn test_flags() {
        let config = Args::parse_from([
            "minesweeper-server",
            "--debug",
            "-p",
            "4000",
            "--max-clients",
            "2",
            "--on-full",
            "reject",
            "--exit-when-idle",
        ])
        .into_config();
        assert!(config.debug);
        assert_eq!(config.port, 4000);
        assert_eq!(config.max_clients, 2);
        assert_eq!(config.capacity_policy, CapacityPolicy::Reject);
        assert!(config.exit_when_idle);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Args::try_parse_from(["minesweeper-server", "--max-clients", "0"]).is_err());
        assert!(Args::try_parse_from(["minesweeper-server", "--probability", "2"]).is_err());
    }
}
