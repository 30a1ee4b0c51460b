//! Grid Primitives
//!
//! Integer cell coordinates and the four cardinal headings.
//! Y grows downward, matching the client's canvas.

use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;

/// A single grid cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Column
    pub x: i32,
    /// Row
    pub y: i32,
}

impl Cell {
    /// Create a cell.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one step in `direction`.
    #[inline]
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self::new(self.x + dx, self.y + dy)
    }

    /// Check whether the cell lies in `[0, width) x [0, height)`.
    #[inline]
    pub fn in_bounds(self, width: u32, height: u32) -> bool {
        self.x >= 0 && self.y >= 0 && (self.x as i64) < width as i64 && (self.y as i64) < height as i64
    }
}

/// Movement heading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Towards row 0
    Up,
    /// Away from row 0
    Down,
    /// Towards column 0
    Left,
    /// Away from column 0
    Right,
}

impl Direction {
    /// All headings, in wire order.
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

    /// The heading that would fold a snake back onto itself.
    #[inline]
    pub const fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Check whether `other` is the reverse of this heading.
    #[inline]
    pub fn is_reverse_of(self, other: Direction) -> bool {
        self.opposite() == other
    }

    /// Unit offset `(dx, dy)` for one step.
    #[inline]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the four cardinal names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown direction: {0:?}")]
pub struct UnknownDirection(pub String);

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            "LEFT" => Ok(Direction::Left),
            "RIGHT" => Ok(Direction::Right),
            other => Err(UnknownDirection(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposites_are_symmetric() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            assert!(d.is_reverse_of(d.opposite()));
            assert!(!d.is_reverse_of(d));
        }
    }

    #[test]
    fn test_step() {
        let c = Cell::new(5, 5);
        assert_eq!(c.step(Direction::Right), Cell::new(6, 5));
        assert_eq!(c.step(Direction::Left), Cell::new(4, 5));
        assert_eq!(c.step(Direction::Up), Cell::new(5, 4));
        assert_eq!(c.step(Direction::Down), Cell::new(5, 6));
    }

    #[test]
    fn test_bounds() {
        assert!(Cell::new(0, 0).in_bounds(10, 10));
        assert!(Cell::new(9, 9).in_bounds(10, 10));
        assert!(!Cell::new(10, 5).in_bounds(10, 10));
        assert!(!Cell::new(-1, 5).in_bounds(10, 10));
        assert!(!Cell::new(5, 10).in_bounds(10, 10));
    }

    #[test]
    fn test_direction_wire_names() {
        assert_eq!(serde_json::to_string(&Direction::Left).unwrap(), "\"LEFT\"");
        let parsed: Direction = serde_json::from_str("\"UP\"").unwrap();
        assert_eq!(parsed, Direction::Up);
        assert_eq!("DOWN".parse::<Direction>(), Ok(Direction::Down));
        assert!("NORTH".parse::<Direction>().is_err());
        assert!("up".parse::<Direction>().is_err());
    }
}
