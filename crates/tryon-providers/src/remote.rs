//! Remote provider — round-trip detection over HTTP.
//!
//! Sends the frame as a JPEG multipart upload and parses the detection
//! service's JSON response. Higher latency than the local provider, but
//! carries the service's own confidence and accessory anchors.

use crate::frame::RawFrame;
use crate::provider::{settle, DetectionProvider, ProviderError, ProviderState};
use async_trait::async_trait;
use tryon_core::{normalize, DetectionResult, DetectionSource, RemotePayload};

const JPEG_QUALITY: u8 = 85;
const UPLOAD_FIELD: &str = "image";
const NO_FACE_CODE: &str = "NO_FACE_DETECTED";

/// HTTP detection provider.
pub struct RemoteProvider {
    client: reqwest::Client,
    endpoint: String,
    state: ProviderState,
}

impl RemoteProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            state: ProviderState::new(),
        }
    }

    async fn run_detection(&self, frame: &RawFrame) -> Result<DetectionResult, ProviderError> {
        let jpeg = encode_jpeg(frame)?;
        let part = reqwest::multipart::Part::bytes(jpeg)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = reqwest::multipart::Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let payload: RemotePayload = response.json().await?;

        if !payload.success {
            return match payload.code.as_deref() {
                Some(NO_FACE_CODE) | None => Err(ProviderError::NoFace),
                Some(code) => Err(ProviderError::Detection(format!(
                    "service rejected frame: {code}"
                ))),
            };
        }

        Ok(normalize::from_remote(&payload)?)
    }
}

#[async_trait]
impl DetectionProvider for RemoteProvider {
    fn source(&self) -> DetectionSource {
        DetectionSource::Remote
    }

    async fn detect(&self, frame: &RawFrame) -> Option<DetectionResult> {
        let Some(_busy) = self.state.try_begin() else {
            tracing::trace!("remote detect while outstanding; returning cached result");
            return self.state.last();
        };
        if !frame.is_ready() {
            return None;
        }
        let outcome = self.run_detection(frame).await;
        settle(&self.state, DetectionSource::Remote, outcome)
    }

    fn last_result(&self) -> Option<DetectionResult> {
        self.state.last()
    }

    fn is_busy(&self) -> bool {
        self.state.is_busy()
    }
}

/// JPEG-encode an RGB frame for upload.
fn encode_jpeg(frame: &RawFrame) -> Result<Vec<u8>, ProviderError> {
    let mut buf = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    encoder.encode(
        &frame.data,
        frame.width,
        frame.height,
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_frame() -> RawFrame {
        RawFrame::rgb(vec![127u8; 8 * 8 * 3], 8, 8)
    }

    #[test]
    fn test_encode_jpeg_produces_jpeg_magic() {
        let jpeg = encode_jpeg(&small_frame()).unwrap();
        assert!(jpeg.len() > 2);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_transport_failure_yields_none_and_releases_guard() {
        // Connection refused: the error path must clear the busy flag.
        let provider = RemoteProvider::new("http://127.0.0.1:9/api/detect/");
        let result = provider.detect(&small_frame()).await;
        assert!(result.is_none());
        assert!(!provider.is_busy());
        assert!(provider.last_result().is_none());
    }
}
