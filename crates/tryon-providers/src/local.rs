//! Local provider — in-process face-mesh inference via ONNX Runtime.
//!
//! Low latency, no round trip: one forward pass produces a 468-point face
//! mesh plus a face-presence score. The mesh is converted to normalized
//! [0,1] coordinates and handed to the landmark normalizer.

use crate::frame::RawFrame;
use crate::provider::{settle, DetectionProvider, ProviderError, ProviderState};
use async_trait::async_trait;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tryon_core::{normalize, DetectionResult, DetectionSource};

// --- Named constants (face-mesh model contract) ---
const MESH_INPUT_SIZE: usize = 192;
const MESH_POINT_COUNT: usize = 468;
/// Output tensor order: [0] = landmarks (468 × 3), [1] = face presence logit.
const MESH_OUTPUT: usize = 0;
const PRESENCE_OUTPUT: usize = 1;
/// Minimum sigmoid(presence) to accept that a face is in frame.
const FACE_PRESENCE_THRESHOLD: f32 = 0.5;

/// In-process face-mesh detection provider.
pub struct LocalProvider {
    session: Arc<Mutex<Session>>,
    state: ProviderState,
}

impl LocalProvider {
    /// Load the face-mesh ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ProviderError> {
        if !Path::new(model_path).exists() {
            return Err(ProviderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            outputs = ?session.outputs().iter().map(|o| o.name().to_string()).collect::<Vec<_>>(),
            "loaded face-mesh model"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            state: ProviderState::new(),
        })
    }

    async fn run_detection(&self, frame: &RawFrame) -> Result<DetectionResult, ProviderError> {
        let input = preprocess(&frame.data, frame.width as usize, frame.height as usize);

        // Inference is CPU-bound; keep it off the async timeline.
        let session = Arc::clone(&self.session);
        let (points, presence) = tokio::task::spawn_blocking(move || {
            let mut session = session.lock().map_err(|_| ProviderError::Unavailable)?;
            run_mesh(&mut session, input)
        })
        .await
        .map_err(|e| ProviderError::Detection(format!("inference task failed: {e}")))??;

        if presence < FACE_PRESENCE_THRESHOLD {
            return Err(ProviderError::NoFace);
        }

        Ok(normalize::from_mesh(&points, frame.width, frame.height, None)?)
    }
}

#[async_trait]
impl DetectionProvider for LocalProvider {
    fn source(&self) -> DetectionSource {
        DetectionSource::Local
    }

    async fn detect(&self, frame: &RawFrame) -> Option<DetectionResult> {
        let Some(_busy) = self.state.try_begin() else {
            tracing::trace!("local detect while outstanding; returning cached result");
            return self.state.last();
        };
        if !frame.is_ready() {
            return None;
        }
        let outcome = self.run_detection(frame).await;
        settle(&self.state, DetectionSource::Local, outcome)
    }

    fn last_result(&self) -> Option<DetectionResult> {
        self.state.last()
    }

    fn is_busy(&self) -> bool {
        self.state.is_busy()
    }
}

/// One forward pass: landmarks tensor + presence logit.
fn run_mesh(session: &mut Session, input: Array4<f32>) -> Result<(Vec<[f32; 3]>, f32), ProviderError> {
    let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

    let (_, mesh) = outputs[MESH_OUTPUT]
        .try_extract_tensor::<f32>()
        .map_err(|e| ProviderError::Detection(format!("mesh output: {e}")))?;
    let (_, presence) = outputs[PRESENCE_OUTPUT]
        .try_extract_tensor::<f32>()
        .map_err(|e| ProviderError::Detection(format!("presence output: {e}")))?;

    let points = decode_mesh(mesh)?;
    let logit = presence.first().copied().unwrap_or(f32::NEG_INFINITY);
    Ok((points, sigmoid(logit)))
}

/// Decode the raw landmark tensor (input-pixel coordinates) into the
/// normalized [0,1] point array the normalizer expects.
fn decode_mesh(mesh: &[f32]) -> Result<Vec<[f32; 3]>, ProviderError> {
    if mesh.len() < MESH_POINT_COUNT * 3 {
        return Err(ProviderError::Detection(format!(
            "mesh tensor too short: need {} values, got {}",
            MESH_POINT_COUNT * 3,
            mesh.len()
        )));
    }

    let inv = 1.0 / MESH_INPUT_SIZE as f32;
    Ok((0..MESH_POINT_COUNT)
        .map(|i| {
            [
                mesh[i * 3] * inv,
                mesh[i * 3 + 1] * inv,
                mesh[i * 3 + 2] * inv,
            ]
        })
        .collect())
}

/// Bilinear-resize an RGB frame to the model input and scale to [0,1].
///
/// The frame is squashed to a square; that is fine because the mesh output
/// is re-projected through the original frame dimensions downstream.
fn preprocess(rgb: &[u8], width: usize, height: usize) -> Array4<f32> {
    let size = MESH_INPUT_SIZE;
    // NHWC, matching the face-mesh model's input layout.
    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));

    let scale_x = width as f32 / size as f32;
    let scale_y = height as f32 / size as f32;

    for y in 0..size {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..size {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..3 {
                let tl = rgb[(y0 * width + x0) * 3 + c] as f32;
                let tr = rgb[(y0 * width + x1) * 3 + c] as f32;
                let bl = rgb[(y1 * width + x0) * 3 + c] as f32;
                let br = rgb[(y1 * width + x1) * 3 + c] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                tensor[[0, y, x, c]] = val / 255.0;
            }
        }
    }

    tensor
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_uniform_frame() {
        let frame = vec![255u8; 64 * 48 * 3];
        let tensor = preprocess(&frame, 64, 48);
        assert_eq!(tensor.shape(), &[1, MESH_INPUT_SIZE, MESH_INPUT_SIZE, 3]);
        assert!(tensor.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_decode_mesh_normalizes_by_input_size() {
        let mut mesh = vec![0.0f32; MESH_POINT_COUNT * 3];
        mesh[0] = 96.0; // x of point 0 → 0.5
        mesh[1] = 192.0; // y of point 0 → 1.0
        mesh[2] = -19.2; // z of point 0 → -0.1
        let points = decode_mesh(&mesh).unwrap();
        assert_eq!(points.len(), MESH_POINT_COUNT);
        assert!((points[0][0] - 0.5).abs() < 1e-6);
        assert!((points[0][1] - 1.0).abs() < 1e-6);
        assert!((points[0][2] + 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_decode_mesh_rejects_short_tensor() {
        let mesh = vec![0.0f32; 30];
        assert!(decode_mesh(&mesh).is_err());
    }

    #[test]
    fn test_sigmoid_midpoint_and_saturation() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }
}
