//! Landmark Normalizer — converts provider-specific raw landmark payloads
//! into canonical [`DetectionResult`] values.
//!
//! The local provider hands over a face-mesh point array indexed by a fixed
//! schema with normalized [0,1] coordinates; the remote provider hands over
//! a structured JSON document in pixel space. Both paths funnel through the
//! same derivation math so the numeric invariants (non-negative distances,
//! exact radian/degree correspondence) hold regardless of source.

use crate::types::{
    AccessoryPlacement, AccessoryPositions, DetectionResult, DetectionSource, Landmarks,
    Measurements, Orientation, Point3,
};
use serde::Deserialize;
use std::time::Instant;
use thiserror::Error;

// --- Face-mesh landmark indices (fixed provider schema) ---
pub const MESH_LEFT_EYE: usize = 33;
pub const MESH_RIGHT_EYE: usize = 362;
pub const MESH_NOSE_TIP: usize = 1;
pub const MESH_NOSE_BRIDGE: usize = 6;
pub const MESH_FOREHEAD: usize = 10;
pub const MESH_CHIN: usize = 175;

/// Minimum mesh length that covers every canonical index.
const MESH_MIN_POINTS: usize = MESH_RIGHT_EYE + 1;

/// Confidence assumed for the local provider, which has no explicit signal.
pub const DEFAULT_LOCAL_CONFIDENCE: f64 = 0.9;

// --- Derivation constants ---
const FACE_WIDTH_PER_EYE_DISTANCE: f64 = 2.5;
/// Normalizing divisor for the yaw/pitch small-angle estimate.
const POSE_OFFSET_DIVISOR: f64 = 100.0;
const GLASSES_SCALE_DIVISOR: f64 = 120.0;
const GLASSES_WIDTH_FACTOR: f64 = 1.4;
const GLASSES_HEIGHT_FACTOR: f64 = 0.6;
const HAT_SCALE_DIVISOR: f64 = 200.0;
const HAT_HEIGHT_FACTOR: f64 = 0.6;
const HAT_LIFT_FACTOR: f64 = 0.2;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("landmark payload too short: need {needed} mesh points, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("missing required landmark: {0}")]
    MissingLandmark(&'static str),
}

/// Normalize a face-mesh point array ([0,1] coordinates) from the local
/// provider. `confidence` is the provider's score when it has one; absent,
/// the fixed local default applies.
pub fn from_mesh(
    points: &[[f32; 3]],
    width: u32,
    height: u32,
    confidence: Option<f64>,
) -> Result<DetectionResult, NormalizeError> {
    if points.len() < MESH_MIN_POINTS {
        return Err(NormalizeError::TooFewPoints {
            needed: MESH_MIN_POINTS,
            got: points.len(),
        });
    }

    let w = width as f64;
    let h = height as f64;
    // Depth follows the mesh convention: normalized z scales with width.
    let to_px = |p: &[f32; 3]| Point3::new(p[0] as f64 * w, p[1] as f64 * h, p[2] as f64 * w);

    let landmarks = Landmarks {
        left_eye: to_px(&points[MESH_LEFT_EYE]),
        right_eye: to_px(&points[MESH_RIGHT_EYE]),
        nose_tip: to_px(&points[MESH_NOSE_TIP]),
        nose_bridge: to_px(&points[MESH_NOSE_BRIDGE]),
        forehead: to_px(&points[MESH_FOREHEAD]),
        chin: to_px(&points[MESH_CHIN]),
    };

    Ok(build_result(
        landmarks,
        confidence.unwrap_or(DEFAULT_LOCAL_CONFIDENCE),
        DetectionSource::Local,
        None,
    ))
}

/// Normalize a successful remote detection payload (pixel-space landmarks).
///
/// Measurements and orientation are re-derived locally from the wire
/// landmarks rather than trusted as sent, so every result in the system
/// satisfies the same derivation contract.
pub fn from_remote(payload: &RemotePayload) -> Result<DetectionResult, NormalizeError> {
    let lm = payload
        .landmarks
        .as_ref()
        .ok_or(NormalizeError::MissingLandmark("landmarks"))?;

    let require = |p: &Option<RemotePoint>, name: &'static str| {
        p.as_ref()
            .map(|p| Point3::new(p.x, p.y, p.z))
            .ok_or(NormalizeError::MissingLandmark(name))
    };

    let landmarks = Landmarks {
        left_eye: require(&lm.left_eye_center, "left_eye_center")?,
        right_eye: require(&lm.right_eye_center, "right_eye_center")?,
        nose_tip: require(&lm.nose_tip, "nose_tip")?,
        nose_bridge: require(&lm.nose_bridge, "nose_bridge")?,
        forehead: require(&lm.forehead_center, "forehead_center")?,
        chin: require(&lm.chin_center, "chin_center")?,
    };

    let accessory = payload.accessory_positions.as_ref().and_then(|a| {
        let glasses = a.glasses.as_ref()?;
        let hat = a.hat.as_ref()?;
        Some(AccessoryPositions {
            glasses: glasses.to_placement(),
            hat: hat.to_placement(),
        })
    });
    if accessory.is_none() {
        tracing::debug!("remote payload carries no accessory anchors; deriving locally");
    }

    let confidence = payload.confidence.unwrap_or(0.0);

    Ok(build_result(
        landmarks,
        confidence,
        DetectionSource::Remote,
        accessory,
    ))
}

fn build_result(
    landmarks: Landmarks,
    confidence: f64,
    source: DetectionSource,
    accessory_positions: Option<AccessoryPositions>,
) -> DetectionResult {
    let measurements = derive_measurements(&landmarks);
    let orientation = derive_orientation(&landmarks, &measurements);
    let accessory_positions =
        accessory_positions.or_else(|| Some(accessory_anchors(&landmarks, &measurements)));

    DetectionResult {
        landmarks,
        measurements,
        orientation,
        confidence: confidence.clamp(0.0, 1.0),
        source,
        accessory_positions,
        produced_at: Instant::now(),
    }
}

fn derive_measurements(lm: &Landmarks) -> Measurements {
    let eye_distance = lm.left_eye.distance_2d(&lm.right_eye);
    let face_height = lm.forehead.distance_2d(&lm.chin);
    // Ear-to-ear approximation from interocular distance.
    let face_width = eye_distance * FACE_WIDTH_PER_EYE_DISTANCE;
    let eye_center = lm.left_eye.midpoint(&lm.right_eye);
    let aspect_ratio = if face_height > 0.0 {
        face_width / face_height
    } else {
        1.0
    };

    Measurements {
        eye_distance,
        face_width,
        face_height,
        eye_center,
        aspect_ratio,
    }
}

fn derive_orientation(lm: &Landmarks, m: &Measurements) -> Orientation {
    let roll = (lm.right_eye.y - lm.left_eye.y).atan2(lm.right_eye.x - lm.left_eye.x);
    let yaw = ((lm.nose_tip.x - m.eye_center.x) / POSE_OFFSET_DIVISOR).atan();
    let pitch = ((lm.nose_tip.y - m.eye_center.y) / POSE_OFFSET_DIVISOR).atan();
    Orientation::from_radians(roll, yaw, pitch)
}

fn accessory_anchors(lm: &Landmarks, m: &Measurements) -> AccessoryPositions {
    AccessoryPositions {
        glasses: AccessoryPlacement {
            position: m.eye_center,
            scale: m.eye_distance / GLASSES_SCALE_DIVISOR,
            width: m.eye_distance * GLASSES_WIDTH_FACTOR,
            height: m.eye_distance * GLASSES_HEIGHT_FACTOR,
        },
        hat: AccessoryPlacement {
            position: Point3::new(
                lm.forehead.x,
                lm.forehead.y - m.face_height * HAT_LIFT_FACTOR,
                lm.forehead.z,
            ),
            scale: m.face_width / HAT_SCALE_DIVISOR,
            width: m.face_width,
            height: m.face_width * HAT_HEIGHT_FACTOR,
        },
    }
}

// --- Remote wire format ---

/// One landmark point as sent by the remote detection service.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

/// Canonical landmark keys of the remote response. The service sends more
/// keys than these; unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteLandmarks {
    pub left_eye_center: Option<RemotePoint>,
    pub right_eye_center: Option<RemotePoint>,
    pub nose_tip: Option<RemotePoint>,
    pub nose_bridge: Option<RemotePoint>,
    pub forehead_center: Option<RemotePoint>,
    pub chin_center: Option<RemotePoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemotePlacement {
    pub position: RemotePoint,
    pub scale: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl RemotePlacement {
    fn to_placement(&self) -> AccessoryPlacement {
        AccessoryPlacement {
            position: Point3::new(self.position.x, self.position.y, self.position.z),
            scale: self.scale,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteAccessoryPositions {
    pub glasses: Option<RemotePlacement>,
    pub hat: Option<RemotePlacement>,
}

/// Top-level remote detection response body.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePayload {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub landmarks: Option<RemoteLandmarks>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub accessory_positions: Option<RemoteAccessoryPositions>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mesh array with the canonical indices filled in and everything else
    /// at the origin.
    fn mesh_with(canon: [(usize, [f32; 3]); 6]) -> Vec<[f32; 3]> {
        let mut points = vec![[0.0f32; 3]; MESH_MIN_POINTS];
        for (idx, p) in canon {
            points[idx] = p;
        }
        points
    }

    fn fixture_mesh() -> Vec<[f32; 3]> {
        // Dyadic coordinates, exactly representable in f32. On a 1000x1000
        // frame: left eye (125,250), right eye (375,250), nose tip
        // (250,312.5), forehead (250,125), chin (250,500).
        mesh_with([
            (MESH_LEFT_EYE, [0.125, 0.25, 0.0]),
            (MESH_RIGHT_EYE, [0.375, 0.25, 0.0]),
            (MESH_NOSE_TIP, [0.25, 0.3125, 0.0]),
            (MESH_NOSE_BRIDGE, [0.25, 0.265625, 0.0]),
            (MESH_FOREHEAD, [0.25, 0.125, 0.0]),
            (MESH_CHIN, [0.25, 0.5, 0.0]),
        ])
    }

    #[test]
    fn test_mesh_pixel_conversion_and_measurements() {
        let result = from_mesh(&fixture_mesh(), 1000, 1000, None).unwrap();
        let m = &result.measurements;
        assert!((m.eye_distance - 250.0).abs() < 1e-9);
        assert!((m.face_width - 625.0).abs() < 1e-9);
        assert!((m.face_height - 375.0).abs() < 1e-9);
        assert!((m.eye_center.x - 250.0).abs() < 1e-9);
        assert!((m.eye_center.y - 250.0).abs() < 1e-9);
        assert!((m.aspect_ratio - 625.0 / 375.0).abs() < 1e-9);
    }

    #[test]
    fn test_pixel_space_fixture_measurements() {
        // Pixel-space fixture through the remote path: eyes at (100,200)
        // and (300,200), forehead (200,100), chin (200,400).
        let json = serde_json::json!({
            "success": true,
            "landmarks": {
                "left_eye_center": {"x": 100.0, "y": 200.0},
                "right_eye_center": {"x": 300.0, "y": 200.0},
                "nose_tip": {"x": 200.0, "y": 260.0},
                "nose_bridge": {"x": 200.0, "y": 210.0},
                "forehead_center": {"x": 200.0, "y": 100.0},
                "chin_center": {"x": 200.0, "y": 400.0}
            },
            "confidence": 0.9
        });
        let payload: RemotePayload = serde_json::from_value(json).unwrap();
        let m = from_remote(&payload).unwrap().measurements;
        assert!((m.eye_distance - 200.0).abs() < 1e-9);
        assert!((m.face_width - 500.0).abs() < 1e-9);
        assert!((m.face_height - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_level_eyes_give_zero_roll() {
        let result = from_mesh(&fixture_mesh(), 1000, 1000, None).unwrap();
        assert!(result.orientation.roll.abs() < 1e-12);
    }

    #[test]
    fn test_yaw_pitch_small_angle_estimate() {
        let result = from_mesh(&fixture_mesh(), 1000, 1000, None).unwrap();
        // Nose is centered horizontally (yaw 0) and 62.5px below the eye line.
        assert!(result.orientation.yaw.abs() < 1e-12);
        assert!((result.orientation.pitch - (62.5f64 / 100.0).atan()).abs() < 1e-9);
    }

    #[test]
    fn test_degrees_match_radians_exactly() {
        let o = from_mesh(&fixture_mesh(), 1000, 1000, None).unwrap().orientation;
        assert_eq!(o.roll_degrees, o.roll.to_degrees());
        assert_eq!(o.yaw_degrees, o.yaw.to_degrees());
        assert_eq!(o.pitch_degrees, o.pitch.to_degrees());
    }

    #[test]
    fn test_local_confidence_defaults() {
        let result = from_mesh(&fixture_mesh(), 1000, 1000, None).unwrap();
        assert_eq!(result.confidence, DEFAULT_LOCAL_CONFIDENCE);
        assert_eq!(result.source, DetectionSource::Local);

        let scored = from_mesh(&fixture_mesh(), 1000, 1000, Some(0.42)).unwrap();
        assert!((scored.confidence - 0.42).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_clamped_to_unit_interval() {
        let result = from_mesh(&fixture_mesh(), 1000, 1000, Some(3.0)).unwrap();
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_accessory_anchor_formulas() {
        let result = from_mesh(&fixture_mesh(), 1000, 1000, None).unwrap();
        let acc = result.accessory_positions.unwrap();

        assert!((acc.glasses.position.x - 250.0).abs() < 1e-9);
        assert!((acc.glasses.position.y - 250.0).abs() < 1e-9);
        assert!((acc.glasses.scale - 250.0 / 120.0).abs() < 1e-9);
        assert!((acc.glasses.width - 350.0).abs() < 1e-9);
        assert!((acc.glasses.height - 150.0).abs() < 1e-9);

        // Hat rides face_height * 0.2 above the forehead point.
        assert!((acc.hat.position.x - 250.0).abs() < 1e-9);
        assert!((acc.hat.position.y - (125.0 - 375.0 * 0.2)).abs() < 1e-9);
        assert!((acc.hat.scale - 625.0 / 200.0).abs() < 1e-9);
        assert!((acc.hat.width - 625.0).abs() < 1e-9);
        assert!((acc.hat.height - 375.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_mesh_rejected() {
        let err = from_mesh(&[[0.0; 3]; 10], 640, 480, None).unwrap_err();
        assert!(matches!(err, NormalizeError::TooFewPoints { got: 10, .. }));
    }

    #[test]
    fn test_remote_payload_roundtrip() {
        let json = serde_json::json!({
            "success": true,
            "landmarks": {
                "left_eye_center": {"x": 100.0, "y": 200.0},
                "right_eye_center": {"x": 300.0, "y": 200.0},
                "nose_tip": {"x": 200.0, "y": 260.0},
                "nose_bridge": {"x": 200.0, "y": 210.0},
                "forehead_center": {"x": 200.0, "y": 100.0},
                "chin_center": {"x": 200.0, "y": 400.0},
                "left_cheek": {"x": 120.0, "y": 280.0}
            },
            "confidence": 0.83,
            "orientation": {"roll": 0.0, "yaw": 0.0, "pitch": 0.5,
                            "roll_degrees": 0.0, "yaw_degrees": 0.0, "pitch_degrees": 28.6}
        });
        let payload: RemotePayload = serde_json::from_value(json).unwrap();
        let result = from_remote(&payload).unwrap();

        assert_eq!(result.source, DetectionSource::Remote);
        assert!((result.confidence - 0.83).abs() < 1e-12);
        assert!((result.measurements.eye_distance - 200.0).abs() < 1e-9);
        assert!((result.measurements.face_width - 500.0).abs() < 1e-9);
        // Orientation is re-derived, not taken from the wire.
        assert!((result.orientation.pitch - (60.0f64 / 100.0).atan()).abs() < 1e-9);
        // Anchors computed when the service did not send them.
        assert!(result.accessory_positions.is_some());
    }

    #[test]
    fn test_remote_missing_landmark_is_malformed() {
        let json = serde_json::json!({
            "success": true,
            "landmarks": {
                "left_eye_center": {"x": 100.0, "y": 200.0},
                "right_eye_center": {"x": 300.0, "y": 200.0},
                "nose_tip": {"x": 200.0, "y": 260.0},
                "nose_bridge": {"x": 200.0, "y": 210.0},
                "forehead_center": {"x": 200.0, "y": 100.0}
            },
            "confidence": 0.9
        });
        let payload: RemotePayload = serde_json::from_value(json).unwrap();
        let err = from_remote(&payload).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingLandmark("chin_center")));
    }

    #[test]
    fn test_remote_precomputed_anchors_kept() {
        let json = serde_json::json!({
            "success": true,
            "landmarks": {
                "left_eye_center": {"x": 100.0, "y": 200.0},
                "right_eye_center": {"x": 300.0, "y": 200.0},
                "nose_tip": {"x": 200.0, "y": 260.0},
                "nose_bridge": {"x": 200.0, "y": 210.0},
                "forehead_center": {"x": 200.0, "y": 100.0},
                "chin_center": {"x": 200.0, "y": 400.0}
            },
            "confidence": 0.9,
            "accessory_positions": {
                "glasses": {"position": {"x": 1.0, "y": 2.0}, "scale": 9.0,
                            "width": 10.0, "height": 4.0},
                "hat": {"position": {"x": 3.0, "y": 4.0}, "scale": 7.0,
                        "width": 20.0, "height": 12.0}
            }
        });
        let payload: RemotePayload = serde_json::from_value(json).unwrap();
        let result = from_remote(&payload).unwrap();
        let acc = result.accessory_positions.unwrap();
        assert_eq!(acc.glasses.scale, 9.0);
        assert_eq!(acc.hat.position.x, 3.0);
    }

    #[test]
    fn test_eye_distance_never_negative() {
        // Swapped eyes still yield a non-negative norm.
        let mesh = mesh_with([
            (MESH_LEFT_EYE, [0.3, 0.2, 0.0]),
            (MESH_RIGHT_EYE, [0.1, 0.2, 0.0]),
            (MESH_NOSE_TIP, [0.2, 0.26, 0.0]),
            (MESH_NOSE_BRIDGE, [0.2, 0.21, 0.0]),
            (MESH_FOREHEAD, [0.2, 0.1, 0.0]),
            (MESH_CHIN, [0.2, 0.4, 0.0]),
        ]);
        let result = from_mesh(&mesh, 1000, 1000, None).unwrap();
        assert!(result.measurements.eye_distance >= 0.0);
    }

    #[test]
    fn test_degenerate_face_height_aspect_ratio() {
        // Forehead and chin coincide: aspect ratio falls back to 1.0.
        let mesh = mesh_with([
            (MESH_LEFT_EYE, [0.1, 0.2, 0.0]),
            (MESH_RIGHT_EYE, [0.3, 0.2, 0.0]),
            (MESH_NOSE_TIP, [0.2, 0.26, 0.0]),
            (MESH_NOSE_BRIDGE, [0.2, 0.21, 0.0]),
            (MESH_FOREHEAD, [0.2, 0.25, 0.0]),
            (MESH_CHIN, [0.2, 0.25, 0.0]),
        ]);
        let result = from_mesh(&mesh, 1000, 1000, None).unwrap();
        assert_eq!(result.measurements.aspect_ratio, 1.0);
    }
}
