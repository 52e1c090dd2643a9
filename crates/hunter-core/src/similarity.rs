//! Nearest-neighbor search over stored signatures.
//!
//! A query is compared against every stored record in a single linear pass:
//! O(n) comparisons of O(d) each. There is no index; the reference sets this
//! system serves are small enough that a full scan is the simpler and always
//! fresh option.

use crate::error::{Error, Result};
use crate::types::{PersonId, PersonRecord, Signature};

/// Best candidate of a scan.
#[derive(Debug, Clone)]
pub struct BestMatch {
    pub record: PersonRecord,
    /// Cosine similarity of the query against `record` [-1, 1].
    pub score: f32,
}

impl BestMatch {
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// Outcome of ranking a query against the reference set.
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    /// `None` only when the reference set was empty.
    pub best: Option<BestMatch>,
    /// Every candidate's score, in scan order. Diagnostics only.
    pub scores: Vec<(PersonId, f32)>,
}

/// Strategy for ranking stored records against a query signature.
pub trait Matcher {
    fn rank<I>(&self, query: &Signature, candidates: I) -> Result<Ranking>
    where
        I: IntoIterator<Item = Result<PersonRecord>>;
}

/// Id reported in errors about the query signature itself.
pub const QUERY_ID: &str = "<query>";

/// Exhaustive cosine-similarity matcher.
///
/// Ties on the maximum score resolve to the first candidate seen, so results
/// are reproducible for a fixed scan order. Any error from the scan aborts the
/// ranking: there are no partial results. A candidate whose score is NaN is
/// reported as corrupt rather than ranked.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn rank<I>(&self, query: &Signature, candidates: I) -> Result<Ranking>
    where
        I: IntoIterator<Item = Result<PersonRecord>>,
    {
        if let Some(i) = query.first_non_finite() {
            return Err(Error::CorruptSignature {
                id: QUERY_ID.into(),
                reason: format!("non-finite value at index {i}"),
            });
        }

        let mut ranking = Ranking::default();

        for candidate in candidates {
            let record = candidate?;
            check_comparable(query, &record)?;

            let score = query.similarity(&record.signature);
            if score.is_nan() {
                return Err(Error::CorruptSignature {
                    id: record.id,
                    reason: "similarity is undefined (non-finite values)".into(),
                });
            }
            ranking.scores.push((record.id.clone(), score));

            let is_better = match &ranking.best {
                None => true,
                Some(best) => score > best.score,
            };
            if is_better {
                ranking.best = Some(BestMatch { record, score });
            }
        }

        tracing::debug!(
            candidates = ranking.scores.len(),
            best_score = ranking.best.as_ref().map(|b| b.score),
            "ranked query signature"
        );

        Ok(ranking)
    }
}

fn check_comparable(query: &Signature, record: &PersonRecord) -> Result<()> {
    let stored = &record.signature;
    if stored.version != query.version {
        return Err(Error::VersionMismatch {
            expected: query.version.clone(),
            found: stored.version.clone(),
        });
    }
    if stored.dim() != query.dim() {
        return Err(Error::CorruptSignature {
            id: record.id.clone(),
            reason: format!(
                "expected {}-dim signature, found {}",
                query.dim(),
                stored.dim()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PersonMetadata;
    use chrono::Utc;

    fn record(id: &str, values: &[f32]) -> PersonRecord {
        PersonRecord {
            id: id.into(),
            metadata: PersonMetadata {
                name: format!("person-{id}"),
                age: None,
                description: String::new(),
                category: "wanted".into(),
                gender: None,
                ethnicity: None,
            },
            signature: Signature::new("v1", values.to_vec()),
            image_ref: String::new(),
            created_at: Utc::now(),
        }
    }

    fn query(values: &[f32]) -> Signature {
        Signature::new("v1", values.to_vec())
    }

    #[test]
    fn test_best_match_is_last_entry() {
        let gallery = vec![
            Ok(record("1", &[0.0, 1.0, 0.0])),
            Ok(record("2", &[0.0, 0.0, 1.0])),
            Ok(record("3", &[1.0, 0.0, 0.0])),
        ];
        let ranking = CosineMatcher.rank(&query(&[1.0, 0.0, 0.0]), gallery).unwrap();
        let best = ranking.best.unwrap();
        assert_eq!(best.id(), "3");
        assert!((best.score - 1.0).abs() < 1e-6);
        assert_eq!(ranking.scores.len(), 3);
    }

    #[test]
    fn test_empty_gallery_has_no_candidate() {
        let ranking = CosineMatcher.rank(&query(&[1.0, 0.0]), Vec::new()).unwrap();
        assert!(ranking.best.is_none());
        assert!(ranking.scores.is_empty());
    }

    #[test]
    fn test_tie_first_seen_wins() {
        let gallery = vec![
            Ok(record("first", &[2.0, 0.0])),
            Ok(record("second", &[1.0, 0.0])),
        ];
        let ranking = CosineMatcher.rank(&query(&[1.0, 0.0]), gallery).unwrap();
        assert_eq!(ranking.best.unwrap().id(), "first");
    }

    #[test]
    fn test_negative_scores_still_rank() {
        let gallery = vec![
            Ok(record("a", &[-1.0, 0.0])),
            Ok(record("b", &[-1.0, 1.0])),
        ];
        let ranking = CosineMatcher.rank(&query(&[1.0, 0.0]), gallery).unwrap();
        let best = ranking.best.unwrap();
        assert_eq!(best.id(), "b");
        assert!(best.score < 0.0);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut other = record("1", &[1.0, 0.0]);
        other.signature.version = "v0".into();
        let err = CosineMatcher.rank(&query(&[1.0, 0.0]), vec![Ok(other)]).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { .. }));
    }

    #[test]
    fn test_dimension_mismatch_is_corrupt() {
        let err = CosineMatcher
            .rank(&query(&[1.0, 0.0]), vec![Ok(record("1", &[1.0, 0.0, 0.0]))])
            .unwrap_err();
        assert!(matches!(err, Error::CorruptSignature { id, .. } if id == "1"));
    }

    #[test]
    fn test_nan_candidate_before_exact_match_is_corrupt() {
        let gallery = vec![
            Ok(record("broken", &[f32::NAN, 0.0])),
            Ok(record("exact", &[1.0, 0.0])),
        ];
        let err = CosineMatcher.rank(&query(&[1.0, 0.0]), gallery).unwrap_err();
        assert!(matches!(err, Error::CorruptSignature { id, .. } if id == "broken"));
    }

    #[test]
    fn test_huge_finite_candidate_still_ranks() {
        let gallery = vec![
            Ok(record("huge", &[3e38, 3e38])),
            Ok(record("exact", &[1.0, 0.0])),
        ];
        let ranking = CosineMatcher.rank(&query(&[1.0, 0.0]), gallery).unwrap();
        let best = ranking.best.unwrap();
        assert_eq!(best.id(), "exact");
        assert!((best.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_non_finite_query_rejected() {
        let gallery = vec![Ok(record("1", &[1.0, 0.0]))];
        let err = CosineMatcher
            .rank(&query(&[f32::INFINITY, 0.0]), gallery)
            .unwrap_err();
        assert!(matches!(err, Error::CorruptSignature { id, .. } if id == QUERY_ID));
    }

    #[test]
    fn test_scan_error_aborts_ranking() {
        let gallery = vec![
            Ok(record("1", &[1.0, 0.0])),
            Err(Error::CorruptSignature { id: "2".into(), reason: "bad blob".into() }),
            Ok(record("3", &[1.0, 0.0])),
        ];
        assert!(CosineMatcher.rank(&query(&[1.0, 0.0]), gallery).is_err());
    }
}
