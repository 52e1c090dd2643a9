//! Enrollment, query, listing and deletion boundaries.
//!
//! [`Hunter`] wires the extractor, the similarity engine, the match policy
//! and both stores together. It keeps no state of its own between calls, so
//! one instance can serve any number of concurrent callers.

use crate::error::Result;
use crate::extractor::{decode_image, SignatureExtractor};
use crate::policy::{Decision, MatchPolicy};
use crate::similarity::{CosineMatcher, Matcher};
use crate::store::{AuditLog, SignatureStore};
use crate::types::{
    MatchRecord, NewPerson, PersonId, PersonMetadata, PersonRecord, PersonSummary, Provenance,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrollOutcome {
    Enrolled { id: PersonId },
    NoFaceDetected,
}

/// What a successful match reports back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPayload {
    pub person_id: PersonId,
    #[serde(flatten)]
    pub person: PersonMetadata,
    pub image_ref: String,
    pub confidence: f32,
    /// Id of the audit entry written for this match.
    pub match_id: String,
}

/// Result of a query.
///
/// "Empty reference set" and "best candidate below threshold" are both
/// `Unmatched`; they differ only in whether `best_score` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Matched(MatchPayload),
    Unmatched { best_score: Option<f32> },
    NoFaceDetected,
}

pub struct Hunter<E, S, A> {
    extractor: E,
    store: S,
    audit: A,
    policy: MatchPolicy,
}

impl<E, S, A> Hunter<E, S, A>
where
    E: SignatureExtractor,
    S: SignatureStore,
    A: AuditLog,
{
    pub fn new(extractor: E, store: S, audit: A, policy: MatchPolicy) -> Self {
        Self {
            extractor,
            store,
            audit,
            policy,
        }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn extractor_version(&self) -> &str {
        self.extractor.version()
    }

    /// Extract a signature from `image` and store it under `metadata`.
    ///
    /// A photograph without a face is reported as
    /// [`EnrollOutcome::NoFaceDetected`] and nothing is stored.
    pub fn enroll(
        &self,
        metadata: PersonMetadata,
        image: &[u8],
        image_ref: &str,
    ) -> Result<EnrollOutcome> {
        let decoded = decode_image(image)?;
        let Some(signature) = self.extractor.extract(&decoded)? else {
            tracing::info!(name = %metadata.name, "enroll: no face detected");
            return Ok(EnrollOutcome::NoFaceDetected);
        };

        let category = metadata.category.clone();
        let id = self.store.enroll(NewPerson {
            metadata,
            image_ref: image_ref.to_string(),
            signature,
        })?;
        tracing::info!(%id, %category, "enrolled person");

        Ok(EnrollOutcome::Enrolled { id })
    }

    /// Compare `image` against every stored person and decide.
    pub fn search(&self, image: &[u8], provenance: Provenance) -> Result<QueryOutcome> {
        let decoded = decode_image(image)?;
        let Some(query) = self.extractor.extract(&decoded)? else {
            tracing::info!(image_ref = %provenance.image_ref, "search: no face detected");
            return Ok(QueryOutcome::NoFaceDetected);
        };

        let ranking = CosineMatcher.rank(&query, self.store.scan()?)?;

        match self.policy.decide(ranking.best, provenance, &self.audit)? {
            Decision::Matched { person_id, entry } => Ok(QueryOutcome::Matched(MatchPayload {
                person_id,
                person: entry.person,
                image_ref: entry.person_image_ref,
                confidence: entry.confidence,
                match_id: entry.id,
            })),
            Decision::Unmatched { best_score } => Ok(QueryOutcome::Unmatched { best_score }),
        }
    }

    pub fn get(&self, id: &str) -> Result<PersonRecord> {
        self.store.get(id)
    }

    /// Persons tagged `category`, in enrollment order, without signatures.
    pub fn list_persons(&self, category: &str) -> Result<Vec<PersonSummary>> {
        Ok(self
            .store
            .list_by_category(category)?
            .iter()
            .map(PersonRecord::summary)
            .collect())
    }

    /// Audit entries in insertion order.
    pub fn list_matches(&self) -> Result<Vec<MatchRecord>> {
        self.audit.list()
    }

    /// Idempotent: deleting an unknown id succeeds.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id)?;
        tracing::info!(%id, "deleted person");
        Ok(())
    }
}
