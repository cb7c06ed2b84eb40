//! Shared error enum and small value types for rxhub-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors produced by rxhub-core.
///
/// Only recoverable conditions live here. Invariant violations (a second
/// subscriber for one message id, `front()` on an empty cache) panic instead.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("packet log is not open")]
    LogNotOpen,
}

pub type Result<T> = std::result::Result<T, CoreError>;

// ---------------------------------------------------------------------------
// Screen geometry
// ---------------------------------------------------------------------------

/// A point in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

/// Axis-aligned rectangle, `left`/`top` inclusive, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Rect {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x < self.right() && p.y >= self.top && p.y < self.bottom()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_contains() {
        let r = Rect::new(10, 20, 30, 40);
        assert!(r.contains(Point::new(10, 20)));
        assert!(r.contains(Point::new(39, 59)));
        assert!(!r.contains(Point::new(40, 20))); // right edge exclusive
        assert!(!r.contains(Point::new(10, 60))); // bottom edge exclusive
        assert!(!r.contains(Point::new(9, 25)));
    }

    #[test]
    fn test_rect_empty() {
        assert!(Rect::new(0, 0, 0, 10).is_empty());
        assert!(!Rect::new(0, 0, 1, 1).is_empty());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            CoreError::Config("bad path".into()).to_string(),
            "config error: bad path"
        );
        assert_eq!(CoreError::LogNotOpen.to_string(), "packet log is not open");
    }
}
