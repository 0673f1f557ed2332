//! Similarity scoring and best-match selection over stored embeddings.
//!
//! Every stored embedding competes on its own: a person enrolled at five
//! angles has five independent chances to be the best match. Scores are not
//! pooled per person.
//!
//! The threshold is always supplied by the caller. Practical values for
//! unit-normalized embeddings compared by cosine similarity lie roughly in
//! `[0.5, 0.9]` and must be tuned per embedding model.

use std::sync::Arc;

use crate::codec;
use crate::error::EmbeddingError;
use crate::types::{Angle, Embedding, MatchResult, PersonId, StoredEmbedding};

/// Cosine similarity of two embeddings, clamped to `[-1, 1]`.
///
/// Reduces to the dot product when both sides are unit-normalized.
/// Returns `0.0` if either side is degenerate.
pub fn similarity(a: &Embedding, b: &Embedding) -> Result<f32, EmbeddingError> {
    if a.dimension() != b.dimension() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.dimension(),
            found: b.dimension(),
        });
    }
    if a.is_degenerate() || b.is_degenerate() {
        return Ok(0.0);
    }

    let score = if a.is_unit() && b.is_unit() {
        dot(a.values(), b.values())
    } else {
        let denom = a.norm() * b.norm();
        if denom == 0.0 || !denom.is_finite() {
            return Ok(0.0);
        }
        (dot_f64(a.values(), b.values()) / denom) as f32
    };

    Ok(score.clamp(-1.0, 1.0))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn dot_f64(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

/// Scan the whole corpus and return the single best entry.
///
/// Ties keep the entry encountered first, so callers should supply the
/// corpus in a deterministic order. Any entry whose dimension differs from
/// the query fails the whole search, degenerate query or not. An empty
/// corpus or a degenerate query yields a non-match with similarity `0.0`.
/// Degenerate corpus entries score `0.0` and are never selected.
pub fn find_best_match(
    query: &Embedding,
    corpus: &[StoredEmbedding],
    threshold: f32,
) -> Result<MatchResult, EmbeddingError> {
    if corpus.is_empty() {
        return Ok(MatchResult::no_match(0.0));
    }
    if let Some(entry) = corpus
        .iter()
        .find(|e| e.embedding.dimension() != query.dimension())
    {
        return Err(EmbeddingError::DimensionMismatch {
            expected: query.dimension(),
            found: entry.embedding.dimension(),
        });
    }
    if query.is_degenerate() {
        tracing::warn!("query embedding is degenerate; not matchable");
        return Ok(MatchResult::no_match(0.0));
    }

    let mut best: Option<(f32, &StoredEmbedding)> = None;
    for entry in corpus {
        let score = similarity(query, &entry.embedding)?;
        tracing::debug!(
            person_id = entry.person_id,
            angle = %entry.angle,
            similarity = score,
            "compared corpus entry"
        );
        if entry.embedding.is_degenerate() {
            continue;
        }
        let is_better = match best {
            None => true,
            Some((best_score, _)) => score > best_score,
        };
        if is_better {
            best = Some((score, entry));
        }
    }

    let Some((score, entry)) = best else {
        return Ok(MatchResult::no_match(0.0));
    };

    if score >= threshold {
        Ok(MatchResult {
            matched: true,
            person_id: Some(entry.person_id),
            angle: Some(entry.angle.clone()),
            similarity: score,
        })
    } else {
        Ok(MatchResult::no_match(score))
    }
}

/// A corpus row before its embedding bytes are decoded.
#[derive(Debug, Clone)]
pub struct EncodedEmbedding {
    pub person_id: PersonId,
    pub angle: Angle,
    pub bytes: Vec<u8>,
}

/// Decode corpus rows, dropping unreadable ones.
///
/// A malformed row is logged and skipped so one bad record cannot abort a
/// whole search. Order is preserved.
pub fn decode_corpus<I>(records: I) -> Vec<StoredEmbedding>
where
    I: IntoIterator<Item = EncodedEmbedding>,
{
    records
        .into_iter()
        .filter_map(|record| match codec::deserialize(&record.bytes) {
            Ok(embedding) => Some(StoredEmbedding {
                person_id: record.person_id,
                angle: record.angle,
                embedding,
            }),
            Err(e) => {
                tracing::warn!(
                    person_id = record.person_id,
                    angle = %record.angle,
                    error = %e,
                    "skipping unreadable corpus entry"
                );
                None
            }
        })
        .collect()
}

/// Immutable view of the stored embeddings, taken once per verification
/// attempt. Cloning shares the underlying slice.
#[derive(Debug, Clone)]
pub struct CorpusSnapshot {
    entries: Arc<[StoredEmbedding]>,
}

impl CorpusSnapshot {
    pub fn new(entries: Vec<StoredEmbedding>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn entries(&self) -> &[StoredEmbedding] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<StoredEmbedding>> for CorpusSnapshot {
    fn from(entries: Vec<StoredEmbedding>) -> Self {
        Self::new(entries)
    }
}

/// Strategy for comparing a query against a corpus.
pub trait Matcher: Send + Sync {
    fn compare(
        &self,
        query: &Embedding,
        corpus: &[StoredEmbedding],
        threshold: f32,
    ) -> Result<MatchResult, EmbeddingError>;
}

/// Best single entry by cosine similarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(
        &self,
        query: &Embedding,
        corpus: &[StoredEmbedding],
        threshold: f32,
    ) -> Result<MatchResult, EmbeddingError> {
        find_best_match(query, corpus, threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{normalize, serialize};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_unit(dimension: usize, seed: u64) -> Embedding {
        let mut rng = StdRng::seed_from_u64(seed);
        normalize((0..dimension).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
    }

    fn entry(person_id: PersonId, angle: Angle, embedding: Embedding) -> StoredEmbedding {
        StoredEmbedding {
            person_id,
            angle,
            embedding,
        }
    }

    #[test]
    fn test_self_similarity_is_one() {
        for dimension in [1, 128, 512] {
            let e = random_unit(dimension, 3);
            let s = similarity(&e, &e).unwrap();
            assert!((s - 1.0).abs() < 1e-4, "similarity {s}");
        }
    }

    #[test]
    fn test_similarity_bounded() {
        for seed in 0..20 {
            let a = random_unit(64, seed);
            let b = random_unit(64, seed + 100);
            let s = similarity(&a, &b).unwrap();
            assert!((-1.0..=1.0).contains(&s));
        }
        let a = normalize(vec![1.0, 0.0]);
        let b = normalize(vec![-1.0, 0.0]);
        assert_eq!(similarity(&a, &b).unwrap(), -1.0);
    }

    #[test]
    fn test_raw_vectors_use_true_cosine() {
        let a = Embedding::new(vec![3.0, 4.0]);
        let b = Embedding::new(vec![6.0, 8.0]);
        assert!(!a.is_unit());
        assert!((similarity(&a, &b).unwrap() - 1.0).abs() < 1e-6);

        let c = Embedding::new(vec![0.0, 2.0]);
        assert!((similarity(&a, &c).unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_raw_cosine_with_huge_components() {
        let a = Embedding::new(vec![f32::MAX, 0.0]);
        let b = Embedding::new(vec![f32::MAX, f32::MAX]);
        assert!((similarity(&a, &a).unwrap() - 1.0).abs() < 1e-6);
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((similarity(&a, &b).unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_dimension_mismatch() {
        let a = random_unit(512, 1);
        let b = random_unit(128, 2);
        assert_eq!(
            similarity(&a, &b).unwrap_err(),
            EmbeddingError::DimensionMismatch {
                expected: 512,
                found: 128
            }
        );
    }

    #[test]
    fn test_similarity_degenerate_is_zero() {
        let a = random_unit(8, 1);
        let zero = normalize(vec![0.0; 8]);
        assert_eq!(similarity(&a, &zero).unwrap(), 0.0);
        assert_eq!(similarity(&zero, &zero).unwrap(), 0.0);
    }

    #[test]
    fn test_empty_corpus_is_no_match() {
        let query = random_unit(128, 1);
        let result = find_best_match(&query, &[], 0.8).unwrap();
        assert!(!result.matched);
        assert_eq!(result.person_id, None);
    }

    #[test]
    fn test_exact_vector_matches() {
        let query = random_unit(128, 9);
        let corpus = vec![
            entry(1, Angle::Front, random_unit(128, 10)),
            entry(2, Angle::Left, query.clone()),
            entry(3, Angle::Right, random_unit(128, 11)),
        ];
        let result = find_best_match(&query, &corpus, 0.8).unwrap();
        assert!(result.matched);
        assert_eq!(result.person_id, Some(2));
        assert_eq!(result.angle, Some(Angle::Left));
        assert!((result.similarity - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_below_threshold_reports_best_score() {
        let query = normalize(vec![1.0, 0.0]);
        let corpus = vec![
            entry(1, Angle::Front, normalize(vec![0.0, 1.0])),
            entry(2, Angle::Front, normalize(vec![1.0, 1.0])),
        ];
        let result = find_best_match(&query, &corpus, 0.9).unwrap();
        assert!(!result.matched);
        assert_eq!(result.person_id, None);
        assert!((result.similarity - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn test_tie_keeps_first_entry() {
        let query = normalize(vec![1.0, 0.0]);
        let same = normalize(vec![1.0, 0.0]);
        let corpus = vec![
            entry(7, Angle::Front, same.clone()),
            entry(8, Angle::Front, same),
        ];
        let result = find_best_match(&query, &corpus, 0.5).unwrap();
        assert_eq!(result.person_id, Some(7));
    }

    #[test]
    fn test_angles_compete_independently() {
        // Person 1 has one strong angle among weak ones; person 2 is uniformly
        // mediocre. Pooling by mean would favour person 2.
        let query = normalize(vec![1.0, 0.0, 0.0]);
        let corpus = vec![
            entry(1, Angle::Front, normalize(vec![1.0, 0.0, 0.0])),
            entry(1, Angle::Left, normalize(vec![0.0, 1.0, 0.0])),
            entry(1, Angle::Right, normalize(vec![0.0, 0.0, 1.0])),
            entry(2, Angle::Front, normalize(vec![0.9, 0.44, 0.0])),
            entry(2, Angle::Left, normalize(vec![0.9, 0.0, 0.44])),
        ];
        let result = find_best_match(&query, &corpus, 0.8).unwrap();
        assert_eq!(result.person_id, Some(1));
        assert_eq!(result.angle, Some(Angle::Front));
    }

    #[test]
    fn test_dimension_mismatch_in_corpus_is_error() {
        let query = random_unit(512, 1);
        let corpus = vec![
            entry(1, Angle::Front, random_unit(512, 2)),
            entry(2, Angle::Front, random_unit(128, 3)),
        ];
        let err = find_best_match(&query, &corpus, 0.8).unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_degenerate_entries_never_match() {
        let query = normalize(vec![1.0, 0.0]);
        let corpus = vec![entry(1, Angle::Front, normalize(vec![0.0, 0.0]))];
        // Even a threshold that a 0.0 score would satisfy must not match.
        let result = find_best_match(&query, &corpus, -1.0).unwrap();
        assert!(!result.matched);
        assert_eq!(result.similarity, 0.0);
    }

    #[test]
    fn test_degenerate_query_never_matches() {
        let query = normalize(vec![0.0, 0.0]);
        let corpus = vec![entry(1, Angle::Front, normalize(vec![1.0, 0.0]))];
        let result = find_best_match(&query, &corpus, -1.0).unwrap();
        assert!(!result.matched);
        assert_eq!(result.similarity, 0.0);
    }

    #[test]
    fn test_degenerate_query_still_checks_dimension() {
        let query = normalize(vec![0.0; 512]);
        let corpus = vec![entry(1, Angle::Front, random_unit(128, 4))];
        assert_eq!(
            find_best_match(&query, &corpus, 0.8).unwrap_err(),
            EmbeddingError::DimensionMismatch {
                expected: 512,
                found: 128
            }
        );
        assert_eq!(
            similarity(&query, &corpus[0].embedding).unwrap_err(),
            EmbeddingError::DimensionMismatch {
                expected: 512,
                found: 128
            }
        );
    }

    #[test]
    fn test_decode_corpus_skips_malformed_rows() {
        let good = normalize(vec![1.0, 0.0]);
        let rows = vec![
            EncodedEmbedding {
                person_id: 1,
                angle: Angle::Front,
                bytes: serialize(&good),
            },
            EncodedEmbedding {
                person_id: 2,
                angle: Angle::Front,
                bytes: vec![1, 2, 3],
            },
            EncodedEmbedding {
                person_id: 3,
                angle: Angle::Up,
                bytes: serialize(&good),
            },
        ];
        let corpus = decode_corpus(rows);
        let ids: Vec<_> = corpus.iter().map(|e| e.person_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_cosine_matcher_delegates() {
        let query = random_unit(16, 4);
        let snapshot = CorpusSnapshot::new(vec![entry(5, Angle::Down, query.clone())]);
        let shared = snapshot.clone();
        let result = CosineMatcher
            .compare(&query, shared.entries(), 0.8)
            .unwrap();
        assert!(result.matched);
        assert_eq!(result.person_id, Some(5));
        assert_eq!(snapshot.len(), 1);
    }
}
