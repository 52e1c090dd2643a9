//! hunter-core: face signature matching for persons of interest.
//!
//! Enrolls photographs as face signatures, answers "does this photograph
//! match someone on file?" with a cosine-similarity scan, and records every
//! confirmed match in an append-only audit log. Signatures come from SCRFD
//! detection plus FaceNet embedding, both running via ONNX Runtime.

pub mod detector;
pub mod encoder;
pub mod error;
pub mod extractor;
pub mod policy;
pub mod recognizer;
pub mod service;
pub mod similarity;
pub mod store;
pub mod types;

pub use encoder::{EncoderOptions, FaceEncoder};
pub use error::{Error, Result};
pub use extractor::{decode_image, SignatureExtractor};
pub use policy::{Decision, MatchPolicy};
pub use service::{EnrollOutcome, Hunter, MatchPayload, QueryOutcome};
pub use similarity::{BestMatch, CosineMatcher, Matcher, Ranking};
pub use store::{AuditLog, MemoryAuditLog, MemoryStore, RecordScan, SignatureStore};
pub use types::{
    FaceRegion, MatchRecord, NewPerson, PersonId, PersonMetadata, PersonRecord, PersonSummary,
    Provenance, Signature,
};

/// Default location of the ONNX model files.
pub fn default_model_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("/usr/share/hunter/models")
}

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";

/// FaceNet recognition model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "facenet_vggface2.onnx";
