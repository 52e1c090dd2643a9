//! Photograph → signature pipeline backed by ONNX models.

use crate::detector::{DetectorError, FaceDetector};
use crate::error::Error;
use crate::recognizer::{FaceRecognizer, RecognizerError, FACENET_MODEL_VERSION};
use crate::types::{FaceRegion, Signature};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbImage};
use std::path::Path;

/// Tuning knobs for [`FaceEncoder`].
#[derive(Debug, Clone, Copy)]
pub struct EncoderOptions {
    /// Minimum SCRFD score for a face to count.
    pub detection_threshold: f32,
    /// Integer factor the photograph is shrunk by before detection (1 = none).
    pub downscale: u32,
    /// Pixels added around the detected box before cropping.
    pub face_margin: u32,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            detection_threshold: 0.5,
            downscale: 3,
            face_margin: 0,
        }
    }
}

/// Detects the most confident face and computes its signature.
///
/// Holds both ONNX sessions, which need exclusive access while running, so
/// every call takes `&mut self`. Callers that share an encoder put it behind
/// a worker thread or a lock.
pub struct FaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    options: EncoderOptions,
}

/// Per-request mapping: only a missing model means the extractor is unavailable.
impl From<DetectorError> for Error {
    fn from(e: DetectorError) -> Self {
        match e {
            DetectorError::ModelNotFound(_) => Error::ExtractorUnavailable(e.to_string()),
            DetectorError::InferenceFailed(_) | DetectorError::Ort(_) => {
                Error::ExtractionFailed(e.to_string())
            }
        }
    }
}

impl From<RecognizerError> for Error {
    fn from(e: RecognizerError) -> Self {
        match e {
            RecognizerError::ModelNotFound(_) => Error::ExtractorUnavailable(e.to_string()),
            RecognizerError::InferenceFailed(_) | RecognizerError::Ort(_) => {
                Error::ExtractionFailed(e.to_string())
            }
        }
    }
}

fn load_failed(e: impl std::fmt::Display) -> Error {
    Error::ExtractorUnavailable(e.to_string())
}

impl FaceEncoder {
    /// Load both models. Any failure here is `ExtractorUnavailable`.
    pub fn load(
        detector_path: &Path,
        recognizer_path: &Path,
        options: EncoderOptions,
    ) -> Result<Self, Error> {
        let detector =
            FaceDetector::load(detector_path, options.detection_threshold).map_err(load_failed)?;
        let recognizer = FaceRecognizer::load(recognizer_path).map_err(load_failed)?;
        Ok(Self {
            detector,
            recognizer,
            options,
        })
    }

    pub fn version(&self) -> &'static str {
        FACENET_MODEL_VERSION
    }

    /// `Ok(None)` when the photograph contains no detectable face.
    pub fn encode(&mut self, image: &DynamicImage) -> Result<Option<Signature>, Error> {
        let rgb = shrink(image, self.options.downscale);
        let faces = self.detector.detect(&rgb)?;
        let Some(face) = faces.first() else {
            return Ok(None);
        };

        tracing::debug!(
            confidence = face.confidence,
            x = face.x,
            y = face.y,
            width = face.width,
            height = face.height,
            "encoding most confident face"
        );

        let Some(crop) = crop_face(&rgb, face, self.options.face_margin) else {
            // Box entirely outside the frame after clamping.
            return Ok(None);
        };
        Ok(Some(self.recognizer.embed(&crop)?))
    }
}

fn shrink(image: &DynamicImage, factor: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if factor <= 1 || w < factor || h < factor {
        return image.to_rgb8();
    }
    image
        .resize_exact(w / factor, h / factor, FilterType::Triangle)
        .to_rgb8()
}

/// Cut the face box (plus margin) out of the image, clamped to its bounds.
fn crop_face(image: &RgbImage, face: &FaceRegion, margin: u32) -> Option<RgbImage> {
    let (w, h) = image.dimensions();
    let margin = margin as f32;

    let left = (face.x - margin / 2.0).max(0.0) as u32;
    let top = (face.y - margin / 2.0).max(0.0) as u32;
    let right = ((face.x + face.width + margin / 2.0).min(w as f32)).max(0.0) as u32;
    let bottom = ((face.y + face.height + margin / 2.0).min(h as f32)).max(0.0) as u32;

    if right <= left || bottom <= top {
        return None;
    }
    Some(imageops::crop_imm(image, left, top, right - left, bottom - top).to_image())
}
