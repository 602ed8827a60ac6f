//! tryon-providers — face-detection providers and frame contracts.
//!
//! Two provider variants sit behind one [`DetectionProvider`] trait: a
//! low-latency in-process face-mesh model and a higher-latency remote
//! detection service. Both enforce the single-flight busy-guard.

pub mod frame;
pub mod local;
pub mod provider;
pub mod remote;

pub use frame::{FrameSource, RawFrame, StaticFrameSource};
pub use local::LocalProvider;
pub use provider::{DetectionProvider, ProviderError};
pub use remote::RemoteProvider;
