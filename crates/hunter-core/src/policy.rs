//! Threshold-based match decisions.

use crate::error::Result;
use crate::similarity::BestMatch;
use crate::store::AuditLog;
use crate::types::{MatchRecord, PersonId, Provenance};

/// Terminal state of a query.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Best candidate reached the threshold; `entry` has been written to the audit log.
    Matched { person_id: PersonId, entry: MatchRecord },
    /// No candidate, or the best one scored below the threshold.
    /// `best_score` is `None` when the reference set was empty.
    Unmatched { best_score: Option<f32> },
}

/// Decides match vs no match with a fixed similarity threshold.
///
/// The comparison is inclusive: a score equal to the threshold matches.
/// A NaN score never matches.
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    threshold: f32,
}

impl MatchPolicy {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_match(&self, score: f32) -> bool {
        score >= self.threshold
    }

    /// Decide on the best candidate and, on a match, append one entry to `audit`.
    ///
    /// The audit append is the only side effect.
    pub fn decide<A: AuditLog + ?Sized>(
        &self,
        best: Option<BestMatch>,
        provenance: Provenance,
        audit: &A,
    ) -> Result<Decision> {
        match best {
            Some(best) if self.is_match(best.score) => {
                let entry = MatchRecord::new(&best.record, best.score, provenance);
                audit.append(entry.clone())?;
                tracing::info!(
                    person = %best.record.id,
                    category = %best.record.metadata.category,
                    confidence = best.score,
                    threshold = self.threshold,
                    "match recorded"
                );
                Ok(Decision::Matched {
                    person_id: best.record.id,
                    entry,
                })
            }
            Some(best) => {
                tracing::debug!(
                    best_score = best.score,
                    threshold = self.threshold,
                    "best candidate below threshold"
                );
                Ok(Decision::Unmatched {
                    best_score: Some(best.score),
                })
            }
            None => Ok(Decision::Unmatched { best_score: None }),
        }
    }
}
