//! Object placement: where an object sits and how it is scaled and rotated.
//!
//! `left`/`top` locate the object's origin point, which is chosen by
//! `origin_x`/`origin_y` (a circle drawn by drag is anchored at its center,
//! a rectangle at its top-left corner). Rotation and scaling happen around
//! that origin.

use serde::{Deserialize, Serialize};

use crate::{Bounds, Point};

/// Horizontal anchor of an object's origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginX {
    #[default]
    Left,
    Center,
    Right,
}

/// Vertical anchor of an object's origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginY {
    #[default]
    Top,
    Center,
    Bottom,
}

fn unit_scale() -> f64 {
    1.0
}

/// Position, scale, rotation and origin of an object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub top: f64,
    #[serde(default = "unit_scale")]
    pub scale_x: f64,
    #[serde(default = "unit_scale")]
    pub scale_y: f64,
    /// Rotation in degrees
    #[serde(default)]
    pub angle: f64,
    #[serde(default)]
    pub origin_x: OriginX,
    #[serde(default)]
    pub origin_y: OriginY,
}

impl Default for Placement {
    fn default() -> Self {
        Self::at(0.0, 0.0)
    }
}

impl Placement {
    /// Unscaled, unrotated placement anchored top-left at (left, top)
    pub fn at(left: f64, top: f64) -> Self {
        Self {
            left,
            top,
            scale_x: 1.0,
            scale_y: 1.0,
            angle: 0.0,
            origin_x: OriginX::Left,
            origin_y: OriginY::Top,
        }
    }

    /// Unscaled, unrotated placement anchored at its center
    pub fn centered(center: Point) -> Self {
        Self {
            origin_x: OriginX::Center,
            origin_y: OriginY::Center,
            ..Self::at(center.x, center.y)
        }
    }

    pub fn anchor(&self) -> Point {
        Point::new(self.left, self.top)
    }

    /// Corners of a `width` x `height` box placed by self, clockwise from
    /// the box's own top-left
    pub fn corners(&self, width: f64, height: f64) -> [Point; 4] {
        let w = width * self.scale_x;
        let h = height * self.scale_y;
        let ax = match self.origin_x {
            OriginX::Left => 0.0,
            OriginX::Center => w / 2.0,
            OriginX::Right => w,
        };
        let ay = match self.origin_y {
            OriginY::Top => 0.0,
            OriginY::Center => h / 2.0,
            OriginY::Bottom => h,
        };
        let anchor = self.anchor();
        [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)].map(|(x, y)| {
            Point::new(anchor.x + x - ax, anchor.y + y - ay).rotated_about(anchor, self.angle)
        })
    }

    /// Axis-aligned bounds of a placed `width` x `height` box
    pub fn bounds(&self, width: f64, height: f64) -> Bounds {
        let [a, b, c, d] = self.corners(width, height);
        Bounds::from_corners(a, c).union(&Bounds::from_corners(b, d))
    }
}
