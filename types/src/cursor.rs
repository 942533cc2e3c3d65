//! Logical clock cursor: pagination over a node's append-only atom stream.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One page of a forward-only iteration over a node's logical clock.
///
/// A cursor carries the position it was issued for and, when more data is
/// known to exist, a chained cursor for the following page. Two cursors are
/// equal and ordered by `position` alone.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogicalClockCursor {
    position: u64,
    next: Option<Box<LogicalClockCursor>>,
}

impl LogicalClockCursor {
    /// A terminal cursor at `position`.
    pub fn new(position: u64) -> Self {
        Self {
            position,
            next: None,
        }
    }

    /// A cursor at `position` continuing with `next`.
    pub fn with_next(position: u64, next: LogicalClockCursor) -> Self {
        Self {
            position,
            next: Some(Box::new(next)),
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn next(&self) -> Option<&LogicalClockCursor> {
        self.next.as_deref()
    }
}

impl PartialEq for LogicalClockCursor {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
    }
}

impl Eq for LogicalClockCursor {}

impl PartialOrd for LogicalClockCursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogicalClockCursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position.cmp(&other.position)
    }
}

impl Hash for LogicalClockCursor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.position.hash(state);
    }
}

impl fmt::Display for LogicalClockCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.next {
            Some(next) => write!(f, "lc@{} -> lc@{}", self.position, next.position),
            None => write!(f, "lc@{}", self.position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_cursor_has_no_next() {
        let cursor = LogicalClockCursor::new(5);
        assert!(!cursor.has_next());
        assert!(cursor.next().is_none());
        assert_eq!(cursor.position(), 5);
    }

    #[test]
    fn chained_cursor_exposes_next() {
        let cursor = LogicalClockCursor::with_next(5, LogicalClockCursor::new(15));
        assert!(cursor.has_next());
        assert_eq!(cursor.next().map(|c| c.position()), Some(15));
    }

    #[test]
    fn equality_ignores_next() {
        let plain = LogicalClockCursor::new(3);
        let chained = LogicalClockCursor::with_next(3, LogicalClockCursor::new(9));
        assert_eq!(plain, chained);
        assert!(LogicalClockCursor::new(2) < plain);
    }

    #[test]
    fn display_shows_chain() {
        let cursor = LogicalClockCursor::with_next(0, LogicalClockCursor::new(10));
        assert_eq!(cursor.to_string(), "lc@0 -> lc@10");
    }
}
