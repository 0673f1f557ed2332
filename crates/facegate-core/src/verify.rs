//! One verification attempt: identity matching plus liveness.
//!
//! The two pipelines run side by side on every frame and stay independent.
//! An attempt is verified once the best match so far clears the threshold
//! and the liveness session reports a live subject.

use image::RgbImage;
use serde::Serialize;

use crate::liveness::{LivenessConfig, LivenessSession, LivenessVerdict};
use crate::matcher::{CorpusSnapshot, CosineMatcher, Matcher};
use crate::model::{extract_embedding, EmbeddingModel, ModelError};
use crate::types::{FaceObservation, MatchResult};

/// Per-frame result of [`VerificationSession::process`].
#[derive(Debug, Clone, Serialize)]
pub struct FrameDecision {
    pub timestamp_ms: u64,
    pub liveness: LivenessVerdict,
    /// Best match across all frames so far.
    pub best_match: Option<MatchResult>,
    pub verified: bool,
}

/// State for one attempt on a single tracked face.
pub struct VerificationSession {
    liveness: LivenessSession,
    corpus: CorpusSnapshot,
    threshold: f32,
    matcher: Box<dyn Matcher>,
    best_match: Option<MatchResult>,
    frames: u64,
}

impl VerificationSession {
    /// Start an attempt at `now_ms` against an immutable corpus snapshot.
    pub fn new(
        corpus: CorpusSnapshot,
        threshold: f32,
        liveness: LivenessConfig,
        now_ms: u64,
    ) -> Self {
        let mut session = LivenessSession::new(liveness);
        session.reset(now_ms);
        Self {
            liveness: session,
            corpus,
            threshold,
            matcher: Box::new(CosineMatcher),
            best_match: None,
            frames: 0,
        }
    }

    pub fn with_matcher(mut self, matcher: Box<dyn Matcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn best_match(&self) -> Option<&MatchResult> {
        self.best_match.as_ref()
    }

    pub fn is_matched(&self) -> bool {
        self.best_match.as_ref().is_some_and(|m| m.matched)
    }

    /// Evaluate one frame.
    ///
    /// The embedding is only extracted while no frame has matched yet. Once
    /// a match is held, later frames feed liveness only and are never
    /// compared against the corpus again. Callers must therefore keep one
    /// session per tracked face: a different face appearing mid-attempt
    /// needs a new session, or it inherits the earlier identity. A
    /// dimension mismatch between the model and the corpus aborts the
    /// attempt.
    pub fn process<M>(
        &mut self,
        model: &mut M,
        obs: &FaceObservation,
        crop: &RgbImage,
    ) -> Result<FrameDecision, ModelError>
    where
        M: EmbeddingModel + ?Sized,
    {
        self.frames += 1;
        let liveness = self.liveness.step(obs, Some(crop));

        if !self.is_matched() {
            let embedding = extract_embedding(model, crop)?;
            let result = self
                .matcher
                .compare(&embedding, self.corpus.entries(), self.threshold)?;
            let is_better = match &self.best_match {
                None => true,
                Some(prev) => result.similarity > prev.similarity,
            };
            if is_better {
                self.best_match = Some(result);
            }
        }

        let verified = liveness.is_live && self.is_matched();
        if verified {
            tracing::info!(
                person_id = ?self.best_match.as_ref().and_then(|m| m.person_id),
                score = liveness.score,
                frames = self.frames,
                "verification succeeded"
            );
        }

        Ok(FrameDecision {
            timestamp_ms: obs.timestamp_ms,
            liveness,
            best_match: self.best_match.clone(),
            verified,
        })
    }
}
