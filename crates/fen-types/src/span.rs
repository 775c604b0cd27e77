use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location of a decorated node.
///
/// Lines and columns are 1-based. Nodes synthesised by the decorator
/// (desugared pipes, interpolation helpers) carry [`Span::synthetic`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Index of the source file in the module table of the front end.
    pub file_id: u16,
    #[serde(rename = "line")]
    pub start_line: u32,
    #[serde(rename = "column")]
    pub start_col: u32,
    pub end_line: u32,
    #[serde(rename = "end_column")]
    pub end_col: u32,
}

impl Span {
    /// Create a new span in file `0`.
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            file_id: 0,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a zero-width span at a single position.
    pub fn point(line: u32, col: u32) -> Self {
        Self::new(line, col, line, col)
    }

    /// Span for nodes that have no source text of their own.
    pub fn synthetic() -> Self {
        Self::default()
    }

    pub fn is_synthetic(&self) -> bool {
        self.start_line == 0
    }

    /// Same span, attributed to another source file.
    pub fn in_file(mut self, file_id: u16) -> Self {
        self.file_id = file_id;
        self
    }

    /// Merge two spans into one that covers both.
    ///
    /// A synthetic span never widens a real one.
    pub fn merge(self, other: Span) -> Span {
        if other.is_synthetic() {
            return self;
        }
        if self.is_synthetic() {
            return other;
        }

        let (start_line, start_col) =
            (self.start_line, self.start_col).min((other.start_line, other.start_col));
        let (end_line, end_col) = (self.end_line, self.end_col).max((other.end_line, other.end_col));

        Span {
            file_id: self.file_id,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_synthetic() {
            return write!(f, "<generated>");
        }
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}
