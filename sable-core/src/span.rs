//! Source positions.

use std::fmt;

/// A 1-based row/column pair pointing at a character of the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub row: u32,
    pub column: u32,
}

impl Position {
    /// Position of the first character of any source.
    pub const START: Position = Position { row: 1, column: 1 };

    pub fn new(row: u32, column: u32) -> Self {
        Position { row, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::START
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.column)
    }
}
