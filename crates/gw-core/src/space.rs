//! Planar world coordinates.
//!
//! Worlds are flat rectangles; positions are continuous (x, y) pairs plus a
//! named `area` label ("park", "cafe") used in observation text.  Distance is
//! plain Euclidean — areas are labels, not geometry.

use std::fmt;

/// A location within a world.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    /// Human-readable area name.  Free-form; empty means "unnamed".
    #[serde(default)]
    pub area: String,
}

impl Position {
    pub fn new(x: f64, y: f64, area: impl Into<String>) -> Self {
        Self { x, y, area: area.into() }
    }

    /// Euclidean distance to `other`, ignoring area labels.
    #[inline]
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Clamp the coordinates into `[0, width] × [0, height]`.
    pub fn clamp_to(&mut self, width: f64, height: f64) {
        self.x = self.x.clamp(0.0, width);
        self.y = self.y.clamp(0.0, height);
    }
}

impl Default for Position {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, area: String::new() }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.area.is_empty() {
            write!(f, "({:.1}, {:.1})", self.x, self.y)
        } else {
            write!(f, "({:.1}, {:.1}, {})", self.x, self.y, self.area)
        }
    }
}
