//! Keyframe anchor point with interpolation and handle metadata.
//!
//! A `Point` pins a value (`co.y`) to a position on the timeline (`co.x`).
//! Timeline code strings Points together into a [`Keyframe`](crate::keyframe::Keyframe)
//! curve; the cache engine itself never reads them, it only hands frames to
//! a reader that does.

use serde::{Deserialize, Serialize};

/// Handle offset applied on construction: handles start at `(x ± 1.0, y)`
/// in timeline units, which yields a near-linear default Bezier segment.
pub const DEFAULT_HANDLE_OFFSET: f64 = 1.0;

/// X/Y pair in timeline units (X = frame position, Y = value).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// How the segment ENDING at a point is interpolated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpolationType {
    /// Cubic curve through the anchor handles.
    #[default]
    Bezier,
    /// Straight line between anchors.
    Linear,
    /// Hold the previous value until this point.
    Constant,
}

/// Whether curve handles follow the anchor automatically or were placed
/// by hand in a curve editor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandleType {
    #[default]
    Auto,
    Manual,
}

/// A single keyframe anchor: coordinate, interpolation mode, and the two
/// Bezier handles flanking it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub co: Coordinate,
    pub interpolation: InterpolationType,
    pub handle_type: HandleType,
    pub handle_left: Coordinate,
    pub handle_right: Coordinate,
}

impl Point {
    /// Point at `(x, y)` with Bezier interpolation and auto handles.
    pub fn new(x: f64, y: f64) -> Self {
        Self::with_handle_type(
            Coordinate::new(x, y),
            InterpolationType::Bezier,
            HandleType::Auto,
        )
    }

    /// Point from an existing coordinate.
    pub fn from_co(co: Coordinate) -> Self {
        Self::with_handle_type(co, InterpolationType::Bezier, HandleType::Auto)
    }

    /// Point with an explicit interpolation mode.
    pub fn with_interpolation(co: Coordinate, interpolation: InterpolationType) -> Self {
        Self::with_handle_type(co, interpolation, HandleType::Auto)
    }

    /// Fully specified point.
    pub fn with_handle_type(
        co: Coordinate,
        interpolation: InterpolationType,
        handle_type: HandleType,
    ) -> Self {
        let mut point = Self {
            co,
            interpolation,
            handle_type,
            handle_left: Coordinate::default(),
            handle_right: Coordinate::default(),
        };
        point.initialize_handles(DEFAULT_HANDLE_OFFSET);
        point
    }

    /// Reset both handles to `(x ± offset, y)`.
    pub fn initialize_handles(&mut self, offset: f64) {
        self.handle_left = Coordinate::new(self.co.x - offset, self.co.y);
        self.handle_right = Coordinate::new(self.co.x + offset, self.co.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handles_flank_the_anchor() {
        let p = Point::new(10.0, 5.0);
        assert_eq!(p.handle_left, Coordinate::new(9.0, 5.0));
        assert_eq!(p.handle_right, Coordinate::new(11.0, 5.0));
        assert_eq!(p.interpolation, InterpolationType::Bezier);
        assert_eq!(p.handle_type, HandleType::Auto);
    }

    #[test]
    fn test_reinitialize_handles_custom_offset() {
        let mut p = Point::new(0.0, 2.0);
        p.initialize_handles(4.0);
        assert_eq!(p.handle_left.x, -4.0);
        assert_eq!(p.handle_right.x, 4.0);
        assert_eq!(p.handle_left.y, 2.0);
    }

    #[test]
    fn test_constructor_forms_agree() {
        let a = Point::new(3.0, 7.0);
        let b = Point::from_co(Coordinate::new(3.0, 7.0));
        let c = Point::with_interpolation(Coordinate::new(3.0, 7.0), InterpolationType::Bezier);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }
}
