//! Accessory Positioning Engine — maps a [`DetectionResult`] into a 3D
//! placement transform for a virtual accessory on a mirrored video feed.
//!
//! Two screen→world mappings coexist because different embedding renderers
//! expose different visible ranges; both are preserved as selectable
//! strategies rather than collapsed into one.

use crate::types::{DetectionResult, Point3};
use serde::{Deserialize, Serialize};

// --- Linear strategy: world = (screen/dim) * 4 - 2, far fixed depth ---
const LINEAR_RANGE: f64 = 4.0;
const LINEAR_OFFSET: f64 = 2.0;
const LINEAR_GLASSES_Z: f64 = -2.5;
const LINEAR_HAT_Z: f64 = -3.0;
const LINEAR_MIN_SCALE: f64 = 0.5;

// --- Centered strategy: world = (screen/dim - 0.5) * 3, closer depth ---
const CENTERED_RANGE: f64 = 3.0;
const CENTERED_GLASSES_Z: f64 = -1.0;
const CENTERED_HAT_Z: f64 = -1.2;
const CENTERED_MIN_SCALE: f64 = 0.1;

// Derived-scale divisors, matching the normalizer's anchor formulas.
const GLASSES_SCALE_DIVISOR: f64 = 120.0;
const HAT_SCALE_DIVISOR: f64 = 200.0;

/// Default per-axis rotation attenuation, to keep accessories from
/// over-reacting to frame-to-frame pose jitter.
const DEFAULT_DAMPING: f64 = 0.6;

/// Accessory category being placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessoryCategory {
    Glasses,
    Hat,
}

/// Screen→world coordinate mapping variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingStrategy {
    #[default]
    Linear,
    Centered,
}

impl MappingStrategy {
    fn world_z(&self, category: AccessoryCategory) -> f64 {
        match (self, category) {
            (MappingStrategy::Linear, AccessoryCategory::Glasses) => LINEAR_GLASSES_Z,
            (MappingStrategy::Linear, AccessoryCategory::Hat) => LINEAR_HAT_Z,
            (MappingStrategy::Centered, AccessoryCategory::Glasses) => CENTERED_GLASSES_Z,
            (MappingStrategy::Centered, AccessoryCategory::Hat) => CENTERED_HAT_Z,
        }
    }

    /// Minimum visible scale floor for this strategy.
    fn min_scale(&self) -> f64 {
        match self {
            MappingStrategy::Linear => LINEAR_MIN_SCALE,
            MappingStrategy::Centered => CENTERED_MIN_SCALE,
        }
    }

    fn to_world_x(&self, screen_x: f64, width: f64) -> f64 {
        match self {
            MappingStrategy::Linear => (screen_x / width) * LINEAR_RANGE - LINEAR_OFFSET,
            MappingStrategy::Centered => ((screen_x / width) - 0.5) * CENTERED_RANGE,
        }
    }

    fn to_world_y(&self, screen_y: f64, height: f64) -> f64 {
        // Screen y grows downward, world y grows upward.
        match self {
            MappingStrategy::Linear => -((screen_y / height) * LINEAR_RANGE - LINEAR_OFFSET),
            MappingStrategy::Centered => -(((screen_y / height) - 0.5) * CENTERED_RANGE),
        }
    }
}

/// Canvas dimensions of the rendering surface, in pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

/// Per-axis rotation attenuation factors in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Damping {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Default for Damping {
    fn default() -> Self {
        Self {
            pitch: DEFAULT_DAMPING,
            yaw: DEFAULT_DAMPING,
            roll: DEFAULT_DAMPING,
        }
    }
}

/// Placement policy knobs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PlacementOptions {
    pub strategy: MappingStrategy,
    /// The video feed is displayed mirrored: flip every landmark x as
    /// `width - x` before it participates in any position or distance.
    pub mirrored: bool,
    pub damping: Damping,
}

/// Rotation applied to an accessory, in radians per axis.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// Ephemeral placement transform, recomputed per detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccessoryTransform {
    pub position: Point3,
    pub scale: f64,
    pub rotation: Rotation,
}

/// Compute the placement transform for one accessory category.
///
/// Precedence is strict: when the result carries provider-precomputed
/// accessory anchors, their position and scale are used ("precision" mode);
/// otherwise position falls back to a single landmark and scale is derived
/// from the face measurements.
pub fn compute_transform(
    result: &DetectionResult,
    category: AccessoryCategory,
    canvas: CanvasSize,
    options: &PlacementOptions,
) -> AccessoryTransform {
    let flip = |x: f64| {
        if options.mirrored {
            canvas.width - x
        } else {
            x
        }
    };

    let (anchor, raw_scale) = match &result.accessory_positions {
        Some(anchors) => {
            let placement = match category {
                AccessoryCategory::Glasses => &anchors.glasses,
                AccessoryCategory::Hat => &anchors.hat,
            };
            (placement.position, placement.scale)
        }
        None => fallback_anchor(result, category, flip),
    };

    let screen_x = flip(anchor.x);
    let position = Point3::new(
        options.strategy.to_world_x(screen_x, canvas.width),
        options.strategy.to_world_y(anchor.y, canvas.height),
        options.strategy.world_z(category),
    );

    let scale = raw_scale.max(options.strategy.min_scale());

    let o = &result.orientation;
    let rotation = Rotation {
        pitch: o.pitch * options.damping.pitch,
        yaw: o.yaw * options.damping.yaw,
        roll: o.roll * options.damping.roll,
    };

    AccessoryTransform {
        position,
        scale,
        rotation,
    }
}

/// Fallback anchor and scale when no provider anchors are available.
///
/// Distances are computed from flipped endpoints so mirroring never
/// corrupts a two-landmark measurement (the flip cancels in the norm).
fn fallback_anchor(
    result: &DetectionResult,
    category: AccessoryCategory,
    flip: impl Fn(f64) -> f64,
) -> (Point3, f64) {
    let lm = &result.landmarks;
    match category {
        AccessoryCategory::Glasses => {
            let left = Point3::new(flip(lm.left_eye.x), lm.left_eye.y, lm.left_eye.z);
            let right = Point3::new(flip(lm.right_eye.x), lm.right_eye.y, lm.right_eye.z);
            let eye_distance = left.distance_2d(&right);
            (result.measurements.eye_center, eye_distance / GLASSES_SCALE_DIVISOR)
        }
        AccessoryCategory::Hat => {
            // face_width is 2.5 × the eye distance; derive it from flipped
            // endpoints like any other two-landmark measurement.
            let left = Point3::new(flip(lm.left_eye.x), lm.left_eye.y, lm.left_eye.z);
            let right = Point3::new(flip(lm.right_eye.x), lm.right_eye.y, lm.right_eye.z);
            let face_width = left.distance_2d(&right) * 2.5;
            (lm.forehead, face_width / HAT_SCALE_DIVISOR)
        }
    }
}
