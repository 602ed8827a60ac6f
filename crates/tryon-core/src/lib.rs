//! tryon-core — canonical face-landmark types, the Landmark Normalizer, and
//! the Accessory Positioning Engine.
//!
//! Pure computation only: providers, polling, and transports live in the
//! `tryon-providers` and `tryon-tracker` crates.

pub mod normalize;
pub mod placement;
pub mod types;

pub use normalize::{NormalizeError, RemotePayload, DEFAULT_LOCAL_CONFIDENCE};
pub use placement::{
    compute_transform, AccessoryCategory, AccessoryTransform, CanvasSize, MappingStrategy,
    PlacementOptions,
};
pub use types::{
    AccessoryPlacement, AccessoryPositions, DetectionResult, DetectionSource, Landmarks,
    Measurements, Orientation, Point3,
};
