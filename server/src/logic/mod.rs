use std::sync::Arc;

use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use minesweeper_common::models::{self, BoardView, Difficulty, Pos};

use crate::{
    data::{Cell, Field, Visibility},
    error::BoardError,
};

/// The one board every session plays on. All access goes through this lock,
/// and a command holds it for its whole board interaction.
pub type SharedBoard = Arc<Mutex<Board>>;

#[derive(Debug)]
pub struct Board {
    field: Field,
}

/// What a dig did to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigOutcome {
    /// The cell held a mine. It has been revealed and defused.
    Exploded,
    /// `cells` cells went from hidden or flagged to revealed.
    Revealed { cells: usize },
    /// The cell was already revealed or is protected by a flag.
    Unchanged,
}

fn generate_mines<R: Rng + ?Sized>(difficulty: &Difficulty, rng: &mut R) -> Vec<bool> {
    let mut mines = Vec::with_capacity(difficulty.cells());

    let mut mines_left = difficulty.mines;
    for cells_left in (1..=difficulty.cells()).rev() {
        let value = rng.random_ratio(mines_left as u32, cells_left as u32);
        mines.push(value);
        if value {
            mines_left -= 1;
        }
    }

    mines
}

fn neighbor_indices(index: usize, width: usize, height: usize) -> impl Iterator<Item = usize> {
    let row = index / width;
    let col = index % width;

    (row.saturating_sub(1)..=(row + 1).min(height - 1)).flat_map(move |r| {
        (col.saturating_sub(1)..=(col + 1).min(width - 1))
            .filter(move |&c| (r, c) != (row, col))
            .map(move |c| r * width + c)
    })
}

fn count_adjacent_mines(mines: &[bool], index: usize, width: usize, height: usize) -> u8 {
    neighbor_indices(index, width, height)
        .filter(|&i| mines[i])
        .count() as u8
}

impl From<&Cell> for models::Cell {
    fn from(value: &Cell) -> Self {
        match value.visibility {
            Visibility::Hidden => Self::Hidden,
            Visibility::Flagged => Self::Flagged,
            Visibility::Revealed if value.mine => Self::Mine,
            Visibility::Revealed => Self::Revealed {
                adjacent: value.adjacent,
            },
        }
    }
}

impl Field {
    fn index(&self, pos: Pos) -> Result<usize, BoardError> {
        if self.contains(pos) {
            Ok(pos.row as usize * self.width + pos.col as usize)
        } else {
            Err(BoardError::OutOfBounds {
                row: pos.row,
                col: pos.col,
            })
        }
    }

    fn contains(&self, pos: Pos) -> bool {
        (0..self.height as i64).contains(&pos.row) && (0..self.width as i64).contains(&pos.col)
    }

    fn pos(&self, index: usize) -> Pos {
        Pos::new((index / self.width) as i64, (index % self.width) as i64)
    }

    fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> + use<> {
        neighbor_indices(index, self.width, self.height)
    }

    /// Reveals the cell if it isn't already. Returns whether it changed.
    fn mark_revealed(&mut self, index: usize) -> bool {
        let cell = &mut self.cells[index];
        if cell.is_revealed() {
            return false;
        }
        cell.visibility = Visibility::Revealed;
        true
    }

    /// Flood fill from already revealed cells. Every cell is pushed at most
    /// once since it is marked revealed before it is pushed.
    fn spread(&mut self, mut stack: Vec<usize>) -> usize {
        let mut revealed = 0;

        while let Some(index) = stack.pop() {
            if !self.cells[index].spreads() {
                continue;
            }
            for neighbor in self.neighbors(index) {
                if self.mark_revealed(neighbor) {
                    revealed += 1;
                    stack.push(neighbor);
                }
            }
        }

        revealed
    }
}

impl Board {
    /// Builds a board where `grid[row][col]` marks a mine.
    #[instrument(level = "trace", skip(grid))]
    pub fn new(grid: Vec<Vec<bool>>) -> Result<Self, BoardError> {
        let height = grid.len();
        let width = grid.first().map_or(0, Vec::len);

        if height == 0 || width == 0 {
            return Err(BoardError::InvalidShape(
                "the grid must have at least one row and one column".to_string(),
            ));
        }
        if let Some((row, cells)) = grid.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(BoardError::InvalidShape(format!(
                "row {} has {} cells, expected {}",
                row,
                cells.len(),
                width
            )));
        }

        let mines: Vec<bool> = grid.into_iter().flatten().collect();
        let cells = (0..mines.len())
            .map(|i| Cell {
                mine: mines[i],
                adjacent: count_adjacent_mines(&mines, i, width, height),
                visibility: Visibility::Hidden,
            })
            .collect();

        let field = Field {
            width,
            height,
            mines: mines.iter().filter(|&&m| m).count(),
            cells,
        };
        info!(
            "Created board: {}x{} with {} mines",
            field.height, field.width, field.mines
        );

        Ok(Self { field })
    }

    /// Places exactly `difficulty.mines` mines uniformly at random. A mine
    /// count larger than the board is clamped to the number of cells.
    pub fn from_difficulty(difficulty: Difficulty) -> Result<Self, BoardError> {
        Self::from_difficulty_with_rng(difficulty, &mut rand::rng())
    }

    pub fn from_difficulty_with_rng<R: Rng + ?Sized>(
        mut difficulty: Difficulty,
        rng: &mut R,
    ) -> Result<Self, BoardError> {
        if difficulty.mines > difficulty.cells() {
            warn!(
                "Requested {} mines on {} cells, clamping",
                difficulty.mines,
                difficulty.cells()
            );
            difficulty.mines = difficulty.cells();
        }

        let mines = generate_mines(&difficulty, rng);
        Self::new(
            mines
                .chunks(difficulty.width.max(1))
                .map(<[bool]>::to_vec)
                .collect(),
        )
    }

    /// Every cell independently holds a mine with probability `probability`.
    pub fn from_probability(
        height: usize,
        width: usize,
        probability: f64,
    ) -> Result<Self, BoardError> {
        Self::from_probability_with_rng(height, width, probability, &mut rand::rng())
    }

    pub fn from_probability_with_rng<R: Rng + ?Sized>(
        height: usize,
        width: usize,
        probability: f64,
        rng: &mut R,
    ) -> Result<Self, BoardError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(BoardError::InvalidShape(format!(
                "mine probability {probability} is not within 0..=1"
            )));
        }

        Self::new(
            (0..height)
                .map(|_| {
                    (0..width)
                        .map(|_| rng.random_bool(probability))
                        .collect::<Vec<bool>>()
                })
                .collect(),
        )
    }

    /// Parses a square grid of `0`/`1` tokens, one row per line.
    pub fn from_text(text: &str) -> Result<Self, BoardError> {
        let grid = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .enumerate()
            .map(|(row, line)| {
                line.split(' ')
                    .map(|token| match token {
                        "0" => Ok(false),
                        "1" => Ok(true),
                        other => Err(BoardError::InvalidShape(format!(
                            "unexpected token \"{other}\" on line {}",
                            row + 1
                        ))),
                    })
                    .collect::<Result<Vec<bool>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        if grid.iter().any(|row| row.len() != grid.len()) {
            return Err(BoardError::InvalidShape(format!(
                "board file must be square, found {} rows",
                grid.len()
            )));
        }

        Self::new(grid)
    }

    pub fn height(&self) -> usize {
        self.field.height
    }

    pub fn width(&self) -> usize {
        self.field.width
    }

    /// Number of mines placed when the board was built. Defusing does not
    /// change it.
    pub fn mine_count(&self) -> usize {
        self.field.mines
    }

    pub fn contains(&self, pos: Pos) -> bool {
        self.field.contains(pos)
    }

    /// The up to eight cells around `pos`, clipped to the board.
    pub fn neighbors(&self, pos: Pos) -> Result<Vec<Pos>, BoardError> {
        let index = self.field.index(pos)?;
        Ok(self
            .field
            .neighbors(index)
            .map(|i| self.field.pos(i))
            .collect())
    }

    pub fn cell(&self, pos: Pos) -> Result<models::Cell, BoardError> {
        let index = self.field.index(pos)?;
        Ok((&self.field.cells[index]).into())
    }

    pub fn has_mine(&self, pos: Pos) -> Result<bool, BoardError> {
        let index = self.field.index(pos)?;
        Ok(self.field.cells[index].mine)
    }

    /// Reveals `pos` and, if it is mine-free with no mined neighbours,
    /// everything connected to it through such cells. Returns the number of
    /// newly revealed cells; revealing a revealed cell is a no-op.
    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    pub fn reveal(&mut self, pos: Pos) -> Result<usize, BoardError> {
        let index = self.field.index(pos)?;
        if !self.field.mark_revealed(index) {
            return Ok(0);
        }

        let revealed = 1 + self.field.spread(vec![index]);
        debug!("Revealed {} cells from {}", revealed, pos);
        Ok(revealed)
    }

    /// Flags a hidden cell. Returns whether anything changed.
    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    pub fn set_flag(&mut self, pos: Pos) -> Result<bool, BoardError> {
        let index = self.field.index(pos)?;
        let cell = &mut self.field.cells[index];
        if cell.visibility != Visibility::Hidden {
            return Ok(false);
        }
        cell.visibility = Visibility::Flagged;
        debug!("Cell {} flagged", pos);
        Ok(true)
    }

    /// Removes a flag. Returns whether anything changed.
    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    pub fn clear_flag(&mut self, pos: Pos) -> Result<bool, BoardError> {
        let index = self.field.index(pos)?;
        let cell = &mut self.field.cells[index];
        if cell.visibility != Visibility::Flagged {
            return Ok(false);
        }
        cell.visibility = Visibility::Hidden;
        debug!("Cell {} deflagged", pos);
        Ok(true)
    }

    /// Removes the mine from a revealed cell so it renders as a plain
    /// numbered cell. Neighbour counts are updated and, when the cell ends up
    /// with nothing around it, the flood fill continues from there.
    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    pub fn defuse(&mut self, pos: Pos) -> Result<bool, BoardError> {
        let index = self.field.index(pos)?;
        let cell = &mut self.field.cells[index];
        if !cell.mine || !cell.is_revealed() {
            return Ok(false);
        }
        cell.mine = false;

        let mut stack = vec![index];
        for neighbor in self.field.neighbors(index) {
            let cell = &mut self.field.cells[neighbor];
            cell.adjacent -= 1;
            if cell.spreads() {
                stack.push(neighbor);
            }
        }

        let revealed = self.field.spread(stack);
        debug!("Defused mine at {}, {} more cells revealed", pos, revealed);
        Ok(true)
    }

    /// Dig as a player does it: flagged cells are left alone, a mine
    /// explodes and is defused in place, anything else is revealed.
    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    pub fn dig(&mut self, pos: Pos) -> Result<DigOutcome, BoardError> {
        let index = self.field.index(pos)?;
        let (visibility, mine) = {
            let cell = &self.field.cells[index];
            (cell.visibility, cell.mine)
        };

        match visibility {
            Visibility::Revealed => Ok(DigOutcome::Unchanged),
            Visibility::Flagged => {
                debug!("Ignoring dig on flagged cell {}", pos);
                Ok(DigOutcome::Unchanged)
            }
            Visibility::Hidden if mine => {
                warn!("Mine hit at {}", pos);
                self.field.mark_revealed(index);
                self.defuse(pos)?;
                Ok(DigOutcome::Exploded)
            }
            Visibility::Hidden => Ok(DigOutcome::Revealed {
                cells: self.reveal(pos)?,
            }),
        }
    }

    pub fn view(&self) -> BoardView {
        BoardView {
            rows: self
                .field
                .cells
                .chunks(self.field.width)
                .map(|chunk| chunk.iter().map(models::Cell::from).collect())
                .collect(),
        }
    }

    pub fn render(&self) -> String {
        self.view().to_string()
    }

    pub fn into_shared(self) -> SharedBoard {
        Arc::new(Mutex::new(self))
    }
}
