use nalgebra as na;
use serde::{Deserialize, Serialize};

pub type Vector2d = na::Vector2<f64>;
pub type Matrix2d = na::Matrix2<f64>;
pub type Matrixd = na::DMatrix<f64>;

/// Integer pixel location
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

/// Image dimensions in pixels. Zero before any frame has been seen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: usize,
    pub height: usize,
}

impl Size {
    pub fn new(width: usize, height: usize) -> Self {
        Size { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Axis-aligned integer rectangle, origin at the top-left corner
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// Square of side `size` centered at `p`
    pub fn centered_at(p: Point, size: i32) -> Self {
        Rect::new(p.x - size / 2, p.y - size / 2, size, size)
    }

    /// Center, rounded down
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Half-open containment: `x <= p.x < x + width`, same for y.
    pub fn contains(&self, p: &Vector2d) -> bool {
        let (x, y) = (self.x as f64, self.y as f64);
        x <= p.x && p.x < x + self.width as f64 && y <= p.y && p.y < y + self.height as f64
    }
}
