//! Human-readable warnings and errors.

use colored::Colorize;
use std::fmt;

/// A non-fatal notice attached to a machine, such as the batching
/// engine falling back to its sequential representation.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Warning {
    pub message: String,
    pub position: Option<Position>,
}

/// An inclusive range used for tracking positions in source code.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Position {
    pub start: usize,
    pub end: usize,
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Render `message` against `source` with the offending span
/// highlighted, for terminal display.
pub fn highlight(source: &str, message: &str, position: Position) -> String {
    let start = position.start.min(source.len());
    let end = (position.end + 1).min(source.len()).max(start);

    match (
        source.get(..start),
        source.get(start..end),
        source.get(end..),
    ) {
        (Some(before), Some(span), Some(after)) => format!(
            "{}: {}\n{}{}{}",
            "error".bright_red().bold(),
            message,
            before,
            span.red().underline(),
            after,
        ),
        // The position does not fall on character boundaries; skip the
        // span rendering.
        _ => format!("{}: {}\n{}", "error".bright_red().bold(), message, source),
    }
}
