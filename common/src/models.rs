use std::fmt;

/// A client-visible cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cell {
    Hidden,
    Flagged,
    Revealed { adjacent: u8 },
    Mine,
}

impl Cell {
    pub const HIDDEN: char = '-';
    pub const FLAGGED: char = 'F';
    pub const MINE: char = '*';
    pub const EMPTY: char = ' ';

    pub fn symbol(&self) -> char {
        match self {
            Cell::Hidden => Self::HIDDEN,
            Cell::Flagged => Self::FLAGGED,
            Cell::Mine => Self::MINE,
            Cell::Revealed { adjacent: 0 } => Self::EMPTY,
            Cell::Revealed { adjacent } => char::from(b'0' + (*adjacent).min(8)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pos {
    pub row: i64,
    pub col: i64,
}

impl Pos {
    pub fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Board dimensions together with an exact mine count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Difficulty {
    pub height: usize,
    pub width: usize,
    pub mines: usize,
}

impl Difficulty {
    pub const EASY: Difficulty = Difficulty::new(9, 9, 10);
    pub const INTERMEDIATE: Difficulty = Difficulty::new(16, 16, 40);
    pub const HARD: Difficulty = Difficulty::new(16, 30, 99);

    pub const fn new(height: usize, width: usize, mines: usize) -> Self {
        Self {
            height,
            width,
            mines,
        }
    }

    pub fn cells(&self) -> usize {
        self.height * self.width
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::EASY
    }
}

/// Snapshot of the whole board as a client sees it, row by row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardView {
    pub rows: Vec<Vec<Cell>>,
}

impl BoardView {
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        self.rows.get(row)?.get(col).copied()
    }
}

/// One line per row, cells separated by single spaces, each line newline
/// terminated.
impl fmt::Display for BoardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            let mut first = true;
            for cell in row {
                if !first {
                    f.write_str(" ")?;
                }
                write!(f, "{}", cell.symbol())?;
                first = false;
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_symbols() {
        assert_eq!(Cell::Hidden.symbol(), '-');
        assert_eq!(Cell::Flagged.symbol(), 'F');
        assert_eq!(Cell::Mine.symbol(), '*');
        assert_eq!(Cell::Revealed { adjacent: 0 }.symbol(), ' ');
        assert_eq!(Cell::Revealed { adjacent: 3 }.symbol(), '3');
        assert_eq!(Cell::Revealed { adjacent: 8 }.symbol(), '8');
    }

    #[test]
    fn test_board_view_display() {
        let view = BoardView {
            rows: vec![
                vec![Cell::Hidden, Cell::Revealed { adjacent: 1 }],
                vec![Cell::Flagged, Cell::Revealed { adjacent: 0 }],
            ],
        };

        assert_eq!(view.to_string(), "- 1\nF  \n");
        assert_eq!(view.height(), 2);
        assert_eq!(view.width(), 2);
        assert_eq!(view.get(1, 0), Some(Cell::Flagged));
        assert_eq!(view.get(2, 0), None);
    }

    #[test]
    fn test_difficulty_presets() {
        assert_eq!(Difficulty::EASY.cells(), 81);
        assert_eq!(Difficulty::INTERMEDIATE.mines, 40);
        assert_eq!(Difficulty::HARD, Difficulty::new(16, 30, 99));
        assert_eq!(Difficulty::default(), Difficulty::EASY);
    }
}
