//! Drag gestures: turning a pointer-down origin and the current pointer
//! position into the geometry of the shape being drawn.

use crate::Point;

/// Axis-aligned rectangle produced by a drag
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Circle produced by a drag: centered between the two points, with a
/// radius of half the distance between them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragCircle {
    pub center: Point,
    pub radius: f64,
}

/// Rectangle spanning the drag origin and the current point.
///
/// Dragging up or to the left normalizes to the top-left corner.
pub fn drag_rect(origin: Point, current: Point) -> DragRect {
    DragRect {
        left: origin.x.min(current.x),
        top: origin.y.min(current.y),
        width: (current.x - origin.x).abs(),
        height: (current.y - origin.y).abs(),
    }
}

pub fn drag_circle(origin: Point, current: Point) -> DragCircle {
    DragCircle {
        center: origin.midpoint(current),
        radius: origin.distance_to(current) / 2.0,
    }
}
