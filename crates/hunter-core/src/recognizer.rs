//! FaceNet (InceptionResnetV1) face recognizer via ONNX Runtime.
//!
//! Turns a square face crop into a 512-dimensional, L2-normalized signature.

use crate::types::Signature;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

pub const FACENET_INPUT_SIZE: u32 = 160;
const FACENET_MEAN: f32 = 127.5;
const FACENET_STD: f32 = 128.0;
pub const FACENET_SIGNATURE_DIM: usize = 512;
pub const FACENET_MODEL_VERSION: &str = "facenet-vggface2";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognition model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the FaceNet ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded FaceNet model"
        );

        Ok(Self { session })
    }

    /// Compute the signature of a face crop. The crop is resized to 160×160.
    pub fn embed(&mut self, face: &RgbImage) -> Result<Signature, RecognizerError> {
        let input = preprocess(face);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("signature extraction: {e}")))?;

        if raw.len() != FACENET_SIGNATURE_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {FACENET_SIGNATURE_DIM}-dim signature, got {}",
                raw.len()
            )));
        }

        Ok(Signature::new(FACENET_MODEL_VERSION, l2_normalize(raw)))
    }
}

/// Resize to the FaceNet input size and apply fixed image standardization.
fn preprocess(face: &RgbImage) -> Array4<f32> {
    let size = FACENET_INPUT_SIZE;
    let crop = if face.dimensions() == (size, size) {
        face.clone()
    } else {
        imageops::resize(face, size, size, FilterType::Triangle)
    };

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel.0[c] as f32 - FACENET_MEAN) / FACENET_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
