use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a stored person (UUID v4, rendered as a string).
pub type PersonId = String;

/// Axis-aligned face region reported by the detector, in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceRegion {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another region.
    pub fn iou(&self, other: &FaceRegion) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let inter = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Face signature: an embedding vector tagged with the model that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    /// Model version that produced the vector (e.g., "facenet-vggface2").
    pub version: String,
    pub values: Vec<f32>,
}

#[derive(Error, Debug, PartialEq)]
pub enum BlobError {
    #[error("empty signature blob")]
    Empty,
    #[error("blob length {0} is not a multiple of 4")]
    Misaligned(usize),
    #[error("non-finite value at index {0}")]
    NonFinite(usize),
}

impl Signature {
    pub fn new(version: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            version: version.into(),
            values,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    ///
    /// Zero-norm vectors score 0. The computation is symmetric bit-for-bit:
    /// `a.similarity(&b) == b.similarity(&a)`. Sums run in `f64` so large
    /// finite components cannot overflow. Non-finite components yield NaN.
    pub fn similarity(&self, other: &Signature) -> f32 {
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (&a, &b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (f64::from(a), f64::from(b));
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            (dot / denom).clamp(-1.0, 1.0) as f32
        } else if dot.is_nan() {
            f32::NAN
        } else {
            0.0
        }
    }

    /// Index of the first NaN or infinite component, if any.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.values.iter().position(|v| !v.is_finite())
    }

    /// Serialize the vector as packed little-endian `f32`s.
    ///
    /// The version travels separately (its own column in every store).
    pub fn to_blob(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn from_blob(version: impl Into<String>, blob: &[u8]) -> Result<Self, BlobError> {
        if blob.is_empty() {
            return Err(BlobError::Empty);
        }
        if blob.len() % 4 != 0 {
            return Err(BlobError::Misaligned(blob.len()));
        }

        let mut values = Vec::with_capacity(blob.len() / 4);
        for (i, chunk) in blob.chunks_exact(4).enumerate() {
            let v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if !v.is_finite() {
                return Err(BlobError::NonFinite(i));
            }
            values.push(v);
        }

        Ok(Self {
            version: version.into(),
            values,
        })
    }
}

/// Display metadata for a person of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonMetadata {
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub description: String,
    /// Category tag, e.g. "wanted", "criminal" or "missing". Matched exactly.
    pub category: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub ethnicity: Option<String>,
}

/// Input to [`SignatureStore::enroll`](crate::SignatureStore::enroll).
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub metadata: PersonMetadata,
    /// Reference to the uploaded photograph, owned by external file storage.
    pub image_ref: String,
    pub signature: Signature,
}

/// A stored enrollment. Never mutated; only deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: PersonId,
    pub metadata: PersonMetadata,
    pub signature: Signature,
    pub image_ref: String,
    pub created_at: DateTime<Utc>,
}

impl PersonRecord {
    pub fn summary(&self) -> PersonSummary {
        PersonSummary {
            id: self.id.clone(),
            metadata: self.metadata.clone(),
            image_ref: self.image_ref.clone(),
            created_at: self.created_at,
        }
    }
}

/// Listing view of a [`PersonRecord`] without its signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonSummary {
    pub id: PersonId,
    #[serde(flatten)]
    pub metadata: PersonMetadata,
    pub image_ref: String,
    pub created_at: DateTime<Utc>,
}

/// Where a query photograph came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Reference to the submitted photograph.
    pub image_ref: String,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
}

/// Audit entry for a confirmed match.
///
/// Carries a copy of the person's display fields rather than a reference, so
/// the entry stays meaningful after the person record is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: String,
    pub person: PersonMetadata,
    /// Image reference of the matched enrollment.
    pub person_image_ref: String,
    pub confidence: f32,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn new(person: &PersonRecord, confidence: f32, provenance: Provenance) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            person: person.metadata.clone(),
            person_image_ref: person.image_ref.clone(),
            confidence,
            provenance,
            created_at: Utc::now(),
        }
    }
}
