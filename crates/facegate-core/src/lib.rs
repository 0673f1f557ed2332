//! facegate-core: face matching and liveness verification engine.
//!
//! Embeddings are produced by an injected [`EmbeddingModel`], normalized and
//! encoded by [`codec`], and compared against stored embeddings by
//! [`matcher`]. Liveness is decided per verification attempt by a
//! [`LivenessSession`] fed with per-frame detector observations.

pub mod codec;
pub mod error;
pub mod liveness;
pub mod matcher;
pub mod model;
pub mod texture;
pub mod types;
pub mod verify;

pub use error::EmbeddingError;
pub use liveness::{LivenessConfig, LivenessPolicy, LivenessSession, LivenessVerdict, Signal};
pub use matcher::{CorpusSnapshot, CosineMatcher, Matcher};
pub use model::{EmbeddingModel, FnModel, ModelError};
pub use types::{Angle, BoundingBox, Embedding, FaceObservation, MatchResult, StoredEmbedding};
pub use verify::{FrameDecision, VerificationSession};
