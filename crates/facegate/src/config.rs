use std::path::PathBuf;

use facegate_core::{LivenessConfig, LivenessPolicy};

/// Host configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Embedding model file. Its manifest lives beside it.
    pub model_path: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    pub liveness_policy: LivenessPolicy,
    /// Timeout in seconds for one verification attempt.
    pub verify_timeout_secs: u64,
    /// Minimum spacing between analysed frames.
    pub frame_interval_ms: u64,
    /// Pixels added around the detector box before embedding.
    pub crop_padding: u32,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let db_path = std::env::var("FACEGATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("faces.db"));

        let model_path = std::env::var("FACEGATE_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models").join("facenet.onnx"));

        let liveness_policy = match std::env::var("FACEGATE_LIVENESS_POLICY") {
            Ok(v) => v.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "falling back to default liveness policy");
                LivenessPolicy::default()
            }),
            Err(_) => LivenessPolicy::default(),
        };

        Self {
            db_path,
            model_path,
            similarity_threshold: env_f32("FACEGATE_SIMILARITY_THRESHOLD", 0.8),
            liveness_policy,
            verify_timeout_secs: env_u64("FACEGATE_VERIFY_TIMEOUT_SECS", 10),
            frame_interval_ms: env_u64("FACEGATE_FRAME_INTERVAL_MS", 300),
            crop_padding: env_u32("FACEGATE_CROP_PADDING", 20),
        }
    }

    pub fn liveness(&self) -> LivenessConfig {
        LivenessConfig {
            policy: self.liveness_policy,
            ..LivenessConfig::default()
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
