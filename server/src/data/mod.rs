#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    Flagged,
    Revealed,
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub mine: bool,
    /// Mines among the up to eight surrounding cells.
    pub adjacent: u8,
    pub visibility: Visibility,
}

impl Cell {
    pub fn is_revealed(&self) -> bool {
        self.visibility == Visibility::Revealed
    }

    /// A revealed cell with nothing around it opens up its neighbours.
    pub fn spreads(&self) -> bool {
        self.is_revealed() && !self.mine && self.adjacent == 0
    }
}

/// Row-major grid storage: the cell at `(row, col)` lives at
/// `row * width + col`.
#[derive(Debug)]
pub struct Field {
    pub width: usize,
    pub height: usize,
    pub mines: usize,
    pub cells: Vec<Cell>,
}
