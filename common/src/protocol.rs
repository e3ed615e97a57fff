use std::fmt;

use thiserror::Error;

use crate::models::{BoardView, Pos};

/// A request read from one client line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Look,
    Dig(Pos),
    Flag(Pos),
    Deflag(Pos),
    Help,
    Bye,
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Empty command. Type 'help' for help.")]
    Empty,
    #[error("Unknown command \"{0}\". Type 'help' for help.")]
    UnknownCommand(String),
    #[error("Invalid arguments for \"{command}\": {reason}")]
    InvalidArguments {
        command: &'static str,
        reason: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Keyword {
    Look,
    Dig,
    Flag,
    Deflag,
    Help,
    Bye,
}

impl Keyword {
    /// Order in which command forms are tried against a line.
    const ORDER: [Keyword; 6] = [
        Keyword::Look,
        Keyword::Dig,
        Keyword::Flag,
        Keyword::Deflag,
        Keyword::Help,
        Keyword::Bye,
    ];

    fn as_str(self) -> &'static str {
        match self {
            Keyword::Look => "look",
            Keyword::Dig => "dig",
            Keyword::Flag => "flag",
            Keyword::Deflag => "deflag",
            Keyword::Help => "help",
            Keyword::Bye => "bye",
        }
    }

    fn parse_args(self, args: &[&str]) -> Result<Command, ParseError> {
        match self {
            Keyword::Look => self.expect_no_args(args).map(|_| Command::Look),
            Keyword::Help => self.expect_no_args(args).map(|_| Command::Help),
            Keyword::Bye => self.expect_no_args(args).map(|_| Command::Bye),
            Keyword::Dig => self.parse_pos(args).map(Command::Dig),
            Keyword::Flag => self.parse_pos(args).map(Command::Flag),
            Keyword::Deflag => self.parse_pos(args).map(Command::Deflag),
        }
    }

    fn expect_no_args(self, args: &[&str]) -> Result<(), ParseError> {
        if args.is_empty() {
            Ok(())
        } else {
            Err(self.invalid(format!("expected no arguments, found {}", args.len())))
        }
    }

    fn parse_pos(self, args: &[&str]) -> Result<Pos, ParseError> {
        let [row, col] = args else {
            return Err(self.invalid(format!(
                "expected <row> <col>, found {} argument(s)",
                args.len()
            )));
        };

        Ok(Pos::new(self.parse_int(row)?, self.parse_int(col)?))
    }

    fn parse_int(self, token: &str) -> Result<i64, ParseError> {
        if !token.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
            return Err(self.invalid(format!("\"{token}\" is not an integer")));
        }
        token
            .parse()
            .map_err(|_| self.invalid(format!("\"{token}\" is not an integer")))
    }

    fn invalid(self, reason: String) -> ParseError {
        ParseError::InvalidArguments {
            command: self.as_str(),
            reason,
        }
    }
}

impl Command {
    /// Parses a line into a command. Malformed input never fails: it becomes
    /// [`Command::Invalid`] carrying a message suitable for the client.
    pub fn parse(line: &str) -> Command {
        Self::try_parse(line).unwrap_or_else(|e| Command::Invalid(e.to_string()))
    }

    pub fn try_parse(line: &str) -> Result<Command, ParseError> {
        let mut tokens = line.split_ascii_whitespace();
        let Some(head) = tokens.next() else {
            return Err(ParseError::Empty);
        };
        let args: Vec<&str> = tokens.collect();

        Keyword::ORDER
            .into_iter()
            .find(|keyword| keyword.as_str() == head)
            .ok_or_else(|| ParseError::UnknownCommand(head.to_string()))?
            .parse_args(&args)
    }
}

/// Serializes a command back into its line form (without newline).
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Look => f.write_str("look"),
            Command::Dig(pos) => write!(f, "dig {} {}", pos.row, pos.col),
            Command::Flag(pos) => write!(f, "flag {} {}", pos.row, pos.col),
            Command::Deflag(pos) => write!(f, "deflag {} {}", pos.row, pos.col),
            Command::Help => f.write_str("help"),
            Command::Bye => f.write_str("bye"),
            Command::Invalid(reason) => write!(f, "<invalid: {reason}>"),
        }
    }
}

pub const HELP_TEXT: &str = "\
Commands:
look
    Show the board. Nothing is changed.
dig <row> <col>
    Dig the square at <row> <col>. Prints the board, or BOOM! if it held a mine.
flag <row> <col>
    Put a flag on an untouched square. Flagging twice keeps the flag.
deflag <row> <col>
    Remove a flag, leaving an unflagged square unchanged.
help
    Show this message.
bye
    Leave the game and close the connection.
";

pub const BYE_TEXT: &str = "Quitting the game. Bye!\n";

pub const BYE_DEBUG_TEXT: &str = "\
Debug mode: your connection stays open and will keep receiving server messages,
but further commands are ignored.
Close the connection yourself (e.g. ^C) to leave.
";

pub const BOOM_TEXT: &str = "BOOM!\n";

/// A message sent from the server to a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Welcome { players: usize },
    Board(BoardView),
    Boom,
    Help,
    Bye { debug: bool },
    Full { max_clients: usize },
    Error(String),
}

impl Response {
    pub fn is_boom(&self) -> bool {
        matches!(self, Response::Boom)
    }
}

/// The exact bytes written to the client, newline terminated.
impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Welcome { players } => write!(
                f,
                "Welcome to Minesweeper. {players} people are playing including you.\nType 'help' for help.\n"
            ),
            Response::Board(view) => write!(f, "{view}"),
            Response::Boom => f.write_str(BOOM_TEXT),
            Response::Help => f.write_str(HELP_TEXT),
            Response::Bye { debug: false } => f.write_str(BYE_TEXT),
            Response::Bye { debug: true } => f.write_str(BYE_DEBUG_TEXT),
            Response::Full { max_clients } => writeln!(
                f,
                "Server is full (no free slot, max {max_clients}). Try again later."
            ),
            Response::Error(message) => writeln!(f, "{message}"),
        }
    }
}
