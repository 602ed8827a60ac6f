use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A point in frame pixel space (z is the provider-native depth estimate).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in the image plane, ignoring depth.
    pub fn distance_2d(&self, other: &Point3) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    /// Componentwise midpoint, depth included.
    pub fn midpoint(&self, other: &Point3) -> Point3 {
        Point3 {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
            z: (self.z + other.z) / 2.0,
        }
    }
}

/// The canonical six-point landmark set every provider is normalized into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Landmarks {
    pub left_eye: Point3,
    pub right_eye: Point3,
    pub nose_tip: Point3,
    pub nose_bridge: Point3,
    pub forehead: Point3,
    pub chin: Point3,
}

/// Measurements derived from the canonical landmarks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Measurements {
    pub eye_distance: f64,
    pub face_width: f64,
    pub face_height: f64,
    pub eye_center: Point3,
    pub aspect_ratio: f64,
}

/// Head pose angles. Degrees are always derived from the radian fields,
/// so construct via [`Orientation::from_radians`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Orientation {
    pub roll: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll_degrees: f64,
    pub yaw_degrees: f64,
    pub pitch_degrees: f64,
}

impl Orientation {
    pub fn from_radians(roll: f64, yaw: f64, pitch: f64) -> Self {
        Self {
            roll,
            yaw,
            pitch,
            roll_degrees: roll.to_degrees(),
            yaw_degrees: yaw.to_degrees(),
            pitch_degrees: pitch.to_degrees(),
        }
    }
}

/// Provider-precomputed anchor for one accessory category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccessoryPlacement {
    pub position: Point3,
    pub scale: f64,
    pub width: f64,
    pub height: f64,
}

/// Precomputed anchors for the supported accessory categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccessoryPositions {
    pub glasses: AccessoryPlacement,
    pub hat: AccessoryPlacement,
}

/// Which provider produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Local,
    Remote,
}

/// One normalized face detection. Immutable once produced; a provider's
/// next detection supersedes it as a whole value.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub landmarks: Landmarks,
    pub measurements: Measurements,
    pub orientation: Orientation,
    /// Provider certainty in [0, 1].
    pub confidence: f64,
    pub source: DetectionSource,
    pub accessory_positions: Option<AccessoryPositions>,
    /// When this result was produced, so callers can detect staleness.
    #[serde(skip_serializing)]
    pub produced_at: Instant,
}

impl DetectionResult {
    /// Age of this result relative to now.
    pub fn age(&self) -> std::time::Duration {
        self.produced_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_2d_ignores_depth() {
        let a = Point3::new(0.0, 0.0, 5.0);
        let b = Point3::new(3.0, 4.0, -5.0);
        assert!((a.distance_2d(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_midpoint_includes_depth() {
        let a = Point3::new(100.0, 200.0, 2.0);
        let b = Point3::new(300.0, 200.0, 4.0);
        let m = a.midpoint(&b);
        assert!((m.x - 200.0).abs() < 1e-12);
        assert!((m.y - 200.0).abs() < 1e-12);
        assert!((m.z - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_orientation_degrees_exact() {
        let o = Orientation::from_radians(std::f64::consts::PI, 0.123, -0.456);
        assert_eq!(o.roll_degrees, std::f64::consts::PI.to_degrees());
        assert_eq!(o.yaw_degrees, 0.123f64.to_degrees());
        assert_eq!(o.pitch_degrees, (-0.456f64).to_degrees());
    }
}
