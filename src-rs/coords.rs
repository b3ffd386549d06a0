//! Percentage coordinates for placements.
//!
//! Placements store every spatial field as a percentage of the base image's
//! rendered box, so the same record is valid for the on-screen canvas, the
//! preview render and the full-resolution composite.

use serde::{Deserialize, Serialize};

/// Smallest width/height a resize gesture may produce, in percent.
pub const MIN_SIZE_PERCENT: f64 = 5.0;

/// Largest width/height a committed placement may have, in percent.
pub const MAX_SIZE_PERCENT: f64 = 100.0;

/// The rotate handle rests straight above the center; `atan2` reports that
/// direction as -90 degrees.
pub const ROTATE_HANDLE_OFFSET_DEG: f64 = 90.0;

pub fn to_percent(pixel_delta: f64, extent: f64) -> f64 {
    if extent <= 0.0 {
        return 0.0;
    }
    pixel_delta / extent * 100.0
}

pub fn to_pixels(percent: f64, extent: f64) -> f64 {
    percent / 100.0 * extent
}

pub fn clamp_size(value: f64) -> f64 {
    value.max(MIN_SIZE_PERCENT)
}

pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

pub fn normalize_degrees(deg: f64) -> f64 {
    if !deg.is_finite() {
        return 0.0;
    }
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Angle of the vector from a placement center to the pointer, shifted so the
/// rotate handle's resting position reads as 0.
pub fn rotation_from_vector(dx: f64, dy: f64) -> f64 {
    normalize_degrees(dy.atan2(dx).to_degrees() + ROTATE_HANDLE_OFFSET_DEG)
}

/// Bounding rectangle of the element that displays the base image, in the
/// same client coordinates as pointer events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContainerRect {
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ContainerRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn sized(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Client point → (x%, y%) relative to the container.
    pub fn percent_of(&self, client_x: f64, client_y: f64) -> (f64, f64) {
        (
            to_percent(client_x - self.left, self.width),
            to_percent(client_y - self.top, self.height),
        )
    }

    /// Pointer delta → percent delta.
    pub fn delta_percent(&self, dx: f64, dy: f64) -> (f64, f64) {
        (to_percent(dx, self.width), to_percent(dy, self.height))
    }

    /// (x%, y%) → client point.
    pub fn client_of(&self, x_percent: f64, y_percent: f64) -> (f64, f64) {
        (
            self.left + to_pixels(x_percent, self.width),
            self.top + to_pixels(y_percent, self.height),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_round_trip_reproduces_pixels() {
        let rect = ContainerRect::new(12.5, 40.0, 733.0, 421.0);
        for (px, py) in [(12.5, 40.0), (100.25, 77.0), (745.5, 461.0), (-30.0, 900.0)] {
            let (xp, yp) = rect.percent_of(px, py);
            let (bx, by) = rect.client_of(xp, yp);
            assert!((bx - px).abs() < 1e-9, "x {px} -> {bx}");
            assert!((by - py).abs() < 1e-9, "y {py} -> {by}");
        }
    }

    #[test]
    fn zero_extent_does_not_produce_nan() {
        assert_eq!(to_percent(10.0, 0.0), 0.0);
    }

    #[test]
    fn size_floor_is_five_percent() {
        assert_eq!(clamp_size(-400.0), MIN_SIZE_PERCENT);
        assert_eq!(clamp_size(4.99), MIN_SIZE_PERCENT);
        assert_eq!(clamp_size(30.0), 30.0);
    }

    #[test]
    fn rotate_handle_rest_position_is_zero_degrees() {
        // pointer straight above the center (screen y grows downwards)
        assert!(rotation_from_vector(0.0, -50.0).abs() < 1e-9);
        assert!((rotation_from_vector(50.0, 0.0) - 90.0).abs() < 1e-9);
        assert!((rotation_from_vector(0.0, 50.0) - 180.0).abs() < 1e-9);
        assert!((rotation_from_vector(-50.0, 0.0) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn degrees_stay_in_half_open_range() {
        for deg in [-720.0, -1e-15, 0.0, 359.999, 360.0, 1080.5] {
            let n = normalize_degrees(deg);
            assert!((0.0..360.0).contains(&n), "{deg} -> {n}");
        }
    }
}
