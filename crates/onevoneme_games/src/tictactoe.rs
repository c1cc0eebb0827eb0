//! Tic-tac-toe board as observed by a client.
//!
//! The client never decides wins for this game; the server owns the rules.
//! The board exists so the client can check local move preconditions,
//! render an optimistic mark and notice whether a snapshot moved any pieces.

use crate::PlayerSlot;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A square on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cell {
    /// Nobody has played here.
    #[default]
    Empty,
    /// Marked by a slot.
    Taken(PlayerSlot),
}

/// Zero-based `(row, col)` board coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[display("({row}, {col})")]
pub struct Location {
    row: u8,
    col: u8,
}

impl Location {
    /// Creates a location, rejecting coordinates outside the 3x3 grid.
    pub fn new(row: u8, col: u8) -> Option<Self> {
        (row < 3 && col < 3).then_some(Self { row, col })
    }

    /// Row index (0-2).
    pub fn row(&self) -> u8 {
        self.row
    }

    /// Column index (0-2).
    pub fn col(&self) -> u8 {
        self.col
    }

    /// Wire form `[row, col]` used by the move endpoint.
    pub fn to_wire(self) -> [u8; 2] {
        [self.row, self.col]
    }
}

/// 3x3 tic-tac-toe board in row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Board {
    cells: [[Cell; 3]; 3],
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the server's `int[3][3]` grid.
    ///
    /// `null` cells count as empty. Any other shape, or a value that is not
    /// a valid slot, makes the whole grid unreadable.
    #[instrument(skip_all)]
    pub fn from_wire(grid: &[Vec<Option<i64>>]) -> Option<Self> {
        if grid.len() != 3 {
            return None;
        }
        let mut board = Self::new();
        for (r, row) in grid.iter().enumerate() {
            if row.len() != 3 {
                return None;
            }
            for (c, value) in row.iter().enumerate() {
                board.cells[r][c] = match PlayerSlot::from_wire(value.unwrap_or(0))? {
                    PlayerSlot::Unassigned => Cell::Empty,
                    slot => Cell::Taken(slot),
                };
            }
        }
        Some(board)
    }

    /// Returns the cell at `location`.
    pub fn get(&self, location: Location) -> Cell {
        self.cells[location.row as usize][location.col as usize]
    }

    /// True when nobody has marked `location`.
    pub fn is_empty_at(&self, location: Location) -> bool {
        self.get(location) == Cell::Empty
    }

    /// Returns a copy with `location` marked by `slot`.
    pub fn with_mark(&self, location: Location, slot: PlayerSlot) -> Self {
        let mut next = self.clone();
        next.cells[location.row as usize][location.col as usize] = match slot {
            PlayerSlot::Unassigned => Cell::Empty,
            slot => Cell::Taken(slot),
        };
        next
    }

    /// Formats the board as a human-readable grid.
    ///
    /// Empty cells show their `row col` coordinate so a player can type it.
    pub fn display(&self) -> String {
        let mut result = String::new();
        for (r, row) in self.cells.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let symbol = match cell {
                    Cell::Empty => format!("{r}{c}"),
                    Cell::Taken(PlayerSlot::One) => " X".to_string(),
                    Cell::Taken(PlayerSlot::Two) => " O".to_string(),
                    Cell::Taken(PlayerSlot::Unassigned) => " ?".to_string(),
                };
                result.push_str(&symbol);
                if c < 2 {
                    result.push_str(" |");
                }
            }
            if r < 2 {
                result.push_str("\n---+---+---\n");
            }
        }
        result
    }
}
