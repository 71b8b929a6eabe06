//! Shared board store.
//!
//! The board is a rectangular grid of cells. Each cell is either an empty
//! slot or holds one posted text; an empty text that was posted still
//! occupies its cell. Posts fill the first empty slot in row-major order and
//! grow the grid when it is full.
//!
//! # Growth
//!
//! - If either dimension is below the configured floor, both dimensions are
//!   raised to at least the floor.
//! - Otherwise one row and one column are added.
//!
//! Existing cells keep their coordinates; new cells start empty. The grid
//! never shrinks.
//!
//! # Example
//!
//! ```
//! use shared_board::board::{Board, BoardConfig};
//!
//! let board = Board::new(BoardConfig::default());
//! board.post("hello");
//!
//! let snapshot = board.snapshot();
//! assert_eq!(snapshot.cells[0][0], "hello");
//! assert_eq!(snapshot.rows, 5);
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default minimum number of rows.
pub const DEFAULT_MIN_ROWS: usize = 5;

/// Default minimum number of columns.
pub const DEFAULT_MIN_COLS: usize = 5;

/// Board size settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardConfig {
    /// Row floor; also the initial row count.
    pub min_rows: usize,
    /// Column floor; also the initial column count.
    pub min_cols: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            min_rows: DEFAULT_MIN_ROWS,
            min_cols: DEFAULT_MIN_COLS,
        }
    }
}

/// One slot of the grid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BoardCell {
    #[default]
    Empty,
    Text(String),
}

impl BoardCell {
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, BoardCell::Empty)
    }

    /// Text shown for this cell (empty string for an empty slot).
    pub fn as_str(&self) -> &str {
        match self {
            BoardCell::Empty => "",
            BoardCell::Text(text) => text,
        }
    }
}

/// Read-consistent copy of the board, detached from the live grid.
///
/// Serializes as a bare JSON array of rows; the dimensions are implied by
/// the grid and checked on the way back in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Vec<String>>", try_from = "Vec<Vec<String>>")]
pub struct BoardSnapshot {
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<Vec<String>>,
}

impl From<BoardSnapshot> for Vec<Vec<String>> {
    fn from(snapshot: BoardSnapshot) -> Self {
        snapshot.cells
    }
}

impl TryFrom<Vec<Vec<String>>> for BoardSnapshot {
    type Error = String;

    fn try_from(cells: Vec<Vec<String>>) -> std::result::Result<Self, Self::Error> {
        let rows = cells.len();
        let cols = cells.first().map(|row| row.len()).unwrap_or(0);
        if let Some(r) = cells.iter().position(|row| row.len() != cols) {
            return Err(format!(
                "row {} has {} cells, expected {}",
                r,
                cells[r].len(),
                cols
            ));
        }
        Ok(Self { rows, cols, cells })
    }
}

impl BoardSnapshot {
    /// Serialize for a `GET_BOARD` payload: a JSON array of rows.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a `GET_BOARD` payload back into a snapshot.
    ///
    /// Fails if the payload is not a rectangular array of string rows.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Check whether any cell holds exactly `text`.
    pub fn contains(&self, text: &str) -> bool {
        self.cells.iter().flatten().any(|cell| cell == text)
    }

    /// Text at `(row, col)`, if inside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.cells.get(row)?.get(col).map(String::as_str)
    }
}

/// Grid state guarded by the board's mutex.
#[derive(Debug)]
struct Grid {
    cells: Vec<Vec<BoardCell>>,
    rows: usize,
    cols: usize,
    occupied: usize,
}

impl Grid {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            cells: vec![vec![BoardCell::Empty; cols]; rows],
            rows,
            cols,
            occupied: 0,
        }
    }

    fn first_empty(&self) -> Option<(usize, usize)> {
        self.cells.iter().enumerate().find_map(|(r, row)| {
            row.iter()
                .position(BoardCell::is_empty)
                .map(|c| (r, c))
        })
    }

    fn grow(&mut self, config: &BoardConfig) {
        let (rows, cols) = if self.rows < config.min_rows || self.cols < config.min_cols {
            (self.rows.max(config.min_rows), self.cols.max(config.min_cols))
        } else {
            (self.rows + 1, self.cols + 1)
        };

        for row in &mut self.cells {
            row.resize(cols, BoardCell::Empty);
        }
        self.cells.resize_with(rows, || vec![BoardCell::Empty; cols]);
        self.rows = rows;
        self.cols = cols;
    }
}

/// The shared board.
///
/// All operations take the internal lock for their whole duration, so a
/// post (including any growth it triggers) is atomic with respect to
/// snapshots and other posts.
#[derive(Debug)]
pub struct Board {
    grid: Mutex<Grid>,
    config: BoardConfig,
}

impl Board {
    /// Create a board at the configured minimum size.
    pub fn new(config: BoardConfig) -> Self {
        Self {
            grid: Mutex::new(Grid::new(config.min_rows, config.min_cols)),
            config,
        }
    }

    /// Create a board with explicit starting dimensions.
    ///
    /// The dimensions may be below the floor; the first overflow raises them
    /// to it.
    pub fn with_dimensions(rows: usize, cols: usize, config: BoardConfig) -> Self {
        Self {
            grid: Mutex::new(Grid::new(rows, cols)),
            config,
        }
    }

    /// Store `text` in the first empty cell, growing the grid if full.
    ///
    /// Returns the `(row, col)` where the text was placed.
    pub fn post(&self, text: impl Into<String>) -> (usize, usize) {
        let mut grid = self.grid.lock();

        // Growth never shrinks the grid and ends with a free cell
        let (row, col) = loop {
            match grid.first_empty() {
                Some(slot) => break slot,
                None => grid.grow(&self.config),
            }
        };
        grid.cells[row][col] = BoardCell::Text(text.into());
        grid.occupied += 1;
        (row, col)
    }

    /// Copy the full grid.
    pub fn snapshot(&self) -> BoardSnapshot {
        let grid = self.grid.lock();
        BoardSnapshot {
            rows: grid.rows,
            cols: grid.cols,
            cells: grid
                .cells
                .iter()
                .map(|row| row.iter().map(|c| c.as_str().to_owned()).collect())
                .collect(),
        }
    }

    /// Current `(rows, cols)`.
    pub fn dimensions(&self) -> (usize, usize) {
        let grid = self.grid.lock();
        (grid.rows, grid.cols)
    }

    /// Number of occupied cells.
    pub fn occupied(&self) -> usize {
        self.grid.lock().occupied
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new(BoardConfig::default())
    }
}
