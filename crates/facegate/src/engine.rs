use std::sync::Arc;
use std::time::Duration;

use facegate_core::{
    EmbeddingModel, FaceObservation, FrameDecision, MatchResult, ModelError, VerificationSession,
};
use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("verification timed out after {0:?}")]
    Timeout(Duration),
    #[error("verification worker failed: {0}")]
    Worker(String),
}

/// One analysed frame: detector output plus the padded face crop.
#[derive(Debug)]
pub struct Frame {
    pub observation: FaceObservation,
    pub crop: RgbImage,
}

struct Submitted {
    seq: u64,
    frame: Frame,
}

/// Final state of a verification attempt.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub verified: bool,
    pub frames_processed: u64,
    /// Frames replaced by a newer one before the worker got to them.
    pub frames_dropped: u64,
    pub best_match: Option<MatchResult>,
    pub last_decision: Option<FrameDecision>,
}

/// Handle to a running verification worker.
///
/// Frames are handed over through a single-slot channel: submitting while
/// the worker is busy replaces the frame still waiting, so at most one frame
/// is ever queued.
pub struct VerifierHandle {
    tx: watch::Sender<Option<Arc<Submitted>>>,
    task: JoinHandle<Result<VerifyOutcome, EngineError>>,
    submitted: u64,
}

impl VerifierHandle {
    /// Offer a frame. Returns `false` once the worker has stopped accepting
    /// frames (verified, or failed).
    pub fn submit(&mut self, frame: Frame) -> bool {
        if self.tx.is_closed() {
            return false;
        }
        self.submitted += 1;
        self.tx.send_replace(Some(Arc::new(Submitted {
            seq: self.submitted,
            frame,
        })));
        true
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop submitting and wait for the worker to drain the pending frame.
    ///
    /// The worker is aborted if it has not finished within `timeout`.
    pub async fn finish(self, timeout: Duration) -> Result<VerifyOutcome, EngineError> {
        let Self { tx, mut task, .. } = self;
        drop(tx);

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => joined.map_err(|e| EngineError::Worker(e.to_string()))?,
            Err(_) => {
                task.abort();
                tracing::warn!(?timeout, "verification timed out");
                Err(EngineError::Timeout(timeout))
            }
        }
    }
}

/// Spawn a keep-latest verification worker for one attempt.
///
/// Each frame is processed on the blocking pool. The worker ends on the
/// first verified frame, on a model error, or once the handle is finished
/// and no frame is pending.
pub fn spawn_verifier<M>(model: M, session: VerificationSession) -> VerifierHandle
where
    M: EmbeddingModel + 'static,
{
    let (tx, rx) = watch::channel(None);
    let task = tokio::spawn(run_verifier(model, session, rx));
    VerifierHandle {
        tx,
        task,
        submitted: 0,
    }
}

async fn run_verifier<M>(
    mut model: M,
    mut session: VerificationSession,
    mut rx: watch::Receiver<Option<Arc<Submitted>>>,
) -> Result<VerifyOutcome, EngineError>
where
    M: EmbeddingModel + 'static,
{
    tracing::debug!("verification worker started");
    let mut last_seq = 0u64;
    let mut dropped = 0u64;
    let mut last_decision: Option<FrameDecision> = None;

    // `changed` still yields an unseen value after the sender is dropped.
    while rx.changed().await.is_ok() {
        let Some(submitted) = rx.borrow_and_update().clone() else {
            continue;
        };

        let skipped = submitted.seq.saturating_sub(last_seq + 1);
        if skipped > 0 {
            tracing::debug!(skipped, seq = submitted.seq, "dropped stale frames");
            dropped += skipped;
        }
        last_seq = submitted.seq;

        let (returned_model, returned_session, decision) =
            tokio::task::spawn_blocking(move || {
                let decision = session.process(
                    &mut model,
                    &submitted.frame.observation,
                    &submitted.frame.crop,
                );
                (model, session, decision)
            })
            .await
            .map_err(|e| EngineError::Worker(e.to_string()))?;
        model = returned_model;
        session = returned_session;

        let decision = decision?;
        tracing::debug!(
            seq = last_seq,
            score = decision.liveness.score,
            is_live = decision.liveness.is_live,
            verified = decision.verified,
            "frame processed"
        );
        let verified = decision.verified;
        last_decision = Some(decision);
        if verified {
            break;
        }
    }

    let outcome = VerifyOutcome {
        verified: last_decision.as_ref().is_some_and(|d| d.verified),
        frames_processed: session.frames_processed(),
        frames_dropped: dropped,
        best_match: session.best_match().cloned(),
        last_decision,
    };
    tracing::info!(
        verified = outcome.verified,
        frames = outcome.frames_processed,
        dropped = outcome.frames_dropped,
        "verification worker finished"
    );
    Ok(outcome)
}

/// Admits frames no closer together than a fixed interval.
pub struct FrameThrottle {
    interval_ms: u64,
    last_admitted: Option<u64>,
}

impl FrameThrottle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_admitted: None,
        }
    }

    /// Return `true` if a frame at `timestamp_ms` should be analysed.
    pub fn admit(&mut self, timestamp_ms: u64) -> bool {
        let ready = match self.last_admitted {
            None => true,
            Some(at) => timestamp_ms.saturating_sub(at) >= self.interval_ms,
        };
        if ready {
            self.last_admitted = Some(timestamp_ms);
        }
        ready
    }
}
