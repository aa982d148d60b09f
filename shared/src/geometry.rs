//! Planar geometry used by containment tests and movement.
//!
//! Screen coordinates: x grows to the right, y grows downwards. Angles are
//! radians in `[0, 2π)`, measured the way `atan2` measures them in that space.

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// Axis-aligned rectangle given by its top-left corner and size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when the rectangle has no area. Degenerate rectangles never
    /// contain anything.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0.0 || self.height == 0.0
    }

    /// Inclusive containment test on the closed rectangle.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        if self.is_degenerate() {
            return false;
        }
        self.x <= x && x <= self.x + self.width && self.y <= y && y <= self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Wraps any angle into `[0, 2π)`.
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Heading from `(x1, y1)` towards `(x2, y2)`.
pub fn angle(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    normalize_angle((y2 - y1).atan2(x2 - x1))
}

pub fn distance(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt()
}

/// Moves `(x, y)` by `dist` along heading `rad`.
pub fn project(x: f32, y: f32, rad: f32, dist: f32) -> (f32, f32) {
    (x + dist * rad.cos(), y + dist * rad.sin())
}
