use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use facegate_core::matcher::find_best_match;
use facegate_core::model::{crop_face, extract_embedding};
use facegate_core::types::PersonId;
use facegate_core::{codec, Angle, BoundingBox, EmbeddingModel, VerificationSession};
use image::RgbImage;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod replay;
mod store;

use config::Config;
use engine::{spawn_verifier, FrameThrottle};
use store::FaceStore;

#[derive(Parser)]
#[command(name = "facegate", version, about = "Face enrollment and verification")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll a new person from one image per capture angle
    Enroll {
        #[arg(long)]
        name: String,
        /// `<angle>=<image>`, repeatable
        #[arg(long = "face", value_parser = parse_face, required = true)]
        faces: Vec<(Angle, PathBuf)>,
        /// Face box `x,y,w,h` within every image (default: whole image)
        #[arg(long, value_parser = parse_bbox)]
        bbox: Option<BoundingBox>,
    },
    /// Attach a precomputed embedding (raw little-endian f32) to a person
    Import {
        #[arg(long)]
        person: PersonId,
        #[arg(long)]
        angle: Angle,
        #[arg(long)]
        file: PathBuf,
    },
    /// Find the best match for a face image or an embedding file
    #[command(group(ArgGroup::new("query").required(true).args(["image", "embedding"])))]
    Identify {
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long)]
        embedding: Option<PathBuf>,
        #[arg(long, value_parser = parse_bbox)]
        bbox: Option<BoundingBox>,
        /// Overrides FACEGATE_SIMILARITY_THRESHOLD
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Replay a recorded detector session through identity and liveness checks
    Verify {
        #[arg(long)]
        session: PathBuf,
    },
    /// List enrolled persons, or the stored angles of one person
    Persons {
        #[arg(long)]
        person: Option<PersonId>,
    },
    /// Remove a person and all their embeddings
    Remove {
        #[arg(long)]
        person: PersonId,
    },
    /// Verify the embedding model against its manifest
    CheckModel,
}

fn parse_face(s: &str) -> Result<(Angle, PathBuf), String> {
    let (angle, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <angle>=<image>, got '{s}'"))?;
    if angle.trim().is_empty() || path.is_empty() {
        return Err(format!("expected <angle>=<image>, got '{s}'"));
    }
    Ok((Angle::from(angle), PathBuf::from(path)))
}

fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid bounding box '{s}': {e}"))?;
    match parts.as_slice() {
        [x, y, w, h] if *w > 0.0 && *h > 0.0 => Ok(BoundingBox::new(*x, *y, *w, *h)),
        _ => Err(format!("expected x,y,w,h with positive size, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Command::Enroll { name, faces, bbox } => enroll(&config, &name, &faces, bbox).await,
        Command::Import {
            person,
            angle,
            file,
        } => import(&config, person, &angle, &file).await,
        Command::Identify {
            image,
            embedding,
            bbox,
            threshold,
        } => {
            identify(
                &config,
                image.as_deref(),
                embedding.as_deref(),
                bbox,
                threshold.unwrap_or(config.similarity_threshold),
            )
            .await
        }
        Command::Verify { session } => verify(&config, &session).await,
        Command::Persons { person } => {
            let store = open_store(&config).await?;
            print_json(&persons_report(&store, person).await?)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Remove { person } => {
            let store = open_store(&config).await?;
            let (removed, report) = remove_report(&store, person).await?;
            print_json(&report)?;
            Ok(if removed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::CheckModel => {
            let manifest = facegate_models::verify_model(&config.model_path)
                .context("model integrity check failed")?;
            print_json(&manifest)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn open_store(config: &Config) -> Result<FaceStore> {
    FaceStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open database {}", config.db_path.display()))
}

async fn persons_report(
    store: &FaceStore,
    person: Option<PersonId>,
) -> Result<serde_json::Value> {
    let Some(person_id) = person else {
        let persons = store.list_persons().await?;
        let total = store.count_embeddings().await?;
        return Ok(serde_json::json!({ "persons": persons, "total_embeddings": total }));
    };

    let embeddings: Vec<_> = store
        .embeddings_for_person(person_id)
        .await?
        .iter()
        .map(|e| {
            serde_json::json!({
                "angle": e.angle,
                "dimension": e.embedding.dimension(),
                "form": e.embedding.form(),
            })
        })
        .collect();
    Ok(serde_json::json!({ "person_id": person_id, "embeddings": embeddings }))
}

/// Delete a person. The report counts every embedding row that went with
/// them, including rows that no longer decode.
async fn remove_report(store: &FaceStore, person: PersonId) -> Result<(bool, serde_json::Value)> {
    let before = store.count_embeddings().await?;
    let removed = store.remove_person(person).await?;
    let after = store.count_embeddings().await?;
    let report = serde_json::json!({
        "person_id": person,
        "removed": removed,
        "embeddings_removed": before.saturating_sub(after),
    });
    Ok((removed, report))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(feature = "onnx")]
fn load_model(config: &Config) -> Result<Box<dyn EmbeddingModel>> {
    use facegate_core::model::onnx::OnnxEmbeddingModel;

    let manifest = facegate_models::verify_model(&config.model_path)
        .context("model integrity check failed")?;
    let model = OnnxEmbeddingModel::load(
        &config.model_path,
        manifest.input_size,
        manifest.embedding_dim,
    )?;
    Ok(Box::new(model))
}

#[cfg(not(feature = "onnx"))]
fn load_model(_config: &Config) -> Result<Box<dyn EmbeddingModel>> {
    bail!("facegate was built without the `onnx` feature; no embedding model is available")
}

fn load_face(path: &Path, bbox: Option<BoundingBox>, padding: u32) -> Result<RgbImage> {
    let frame = image::open(path)
        .with_context(|| format!("failed to load image {}", path.display()))?
        .to_rgb8();
    match bbox {
        Some(bbox) => crop_face(&frame, &bbox, padding)
            .with_context(|| format!("bad face box for {}", path.display())),
        None => Ok(frame),
    }
}

#[derive(Serialize)]
struct EnrolledEmbedding {
    angle: Angle,
    embedding_id: i64,
}

async fn enroll(
    config: &Config,
    name: &str,
    faces: &[(Angle, PathBuf)],
    bbox: Option<BoundingBox>,
) -> Result<ExitCode> {
    let mut model = load_model(config)?;

    // Embed everything before touching the database.
    let mut embeddings = Vec::with_capacity(faces.len());
    for (angle, path) in faces {
        let face = load_face(path, bbox, config.crop_padding)?;
        let embedding = extract_embedding(&mut model, &face)
            .with_context(|| format!("failed to embed {}", path.display()))?;
        if embedding.is_degenerate() {
            bail!("model produced a zero embedding for {}", path.display());
        }
        embeddings.push((angle.clone(), embedding));
    }

    let store = open_store(config).await?;
    let person_id = store.add_person(name).await?;
    let mut enrolled = Vec::with_capacity(embeddings.len());
    for (angle, embedding) in embeddings {
        let embedding_id = store.add_embedding(person_id, &angle, &embedding).await?;
        enrolled.push(EnrolledEmbedding {
            angle,
            embedding_id,
        });
    }

    print_json(&serde_json::json!({
        "person_id": person_id,
        "name": name,
        "embeddings": enrolled,
    }))?;
    Ok(ExitCode::SUCCESS)
}

async fn import(config: &Config, person: PersonId, angle: &Angle, file: &Path) -> Result<ExitCode> {
    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let embedding = codec::deserialize(&bytes)
        .with_context(|| format!("invalid embedding file {}", file.display()))?;
    let embedding = codec::normalize(embedding.into_values());

    let store = open_store(config).await?;
    let corpus = store.load_corpus().await?;
    if let Some(existing) = corpus.entries().first() {
        if existing.embedding.dimension() != embedding.dimension() {
            bail!(
                "embedding has {} dimensions but enrolled embeddings have {}",
                embedding.dimension(),
                existing.embedding.dimension()
            );
        }
    }

    let embedding_id = store.add_embedding(person, angle, &embedding).await?;
    print_json(&serde_json::json!({
        "person_id": person,
        "angle": angle,
        "embedding_id": embedding_id,
    }))?;
    Ok(ExitCode::SUCCESS)
}

async fn identify(
    config: &Config,
    image: Option<&Path>,
    embedding: Option<&Path>,
    bbox: Option<BoundingBox>,
    threshold: f32,
) -> Result<ExitCode> {
    let query = match (image, embedding) {
        (Some(path), _) => {
            let mut model = load_model(config)?;
            let face = load_face(path, bbox, config.crop_padding)?;
            extract_embedding(&mut model, &face)?
        }
        (None, Some(path)) => {
            let bytes =
                std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            codec::normalize(codec::deserialize(&bytes)?.into_values())
        }
        (None, None) => bail!("either --image or --embedding is required"),
    };

    let store = open_store(config).await?;
    let corpus = store.load_corpus().await?;
    let result = find_best_match(&query, corpus.entries(), threshold)?;
    tracing::info!(
        matched = result.matched,
        similarity = result.similarity,
        "identify finished"
    );

    print_json(&result)?;
    Ok(if result.matched {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn verify(config: &Config, session_path: &Path) -> Result<ExitCode> {
    let frames = replay::load_session(session_path)?;
    let Some(first) = frames.first() else {
        bail!("session {} has no frames", session_path.display());
    };
    let base_ts = first.observation.timestamp_ms;
    let base_dir = session_path.parent().unwrap_or(Path::new("."));

    let model = load_model(config)?;
    let store = open_store(config).await?;
    let corpus = store.load_corpus().await?;
    tracing::info!(
        embeddings = corpus.len(),
        policy = %config.liveness_policy,
        "starting verification"
    );

    let session = VerificationSession::new(
        corpus,
        config.similarity_threshold,
        config.liveness(),
        base_ts,
    );
    let mut handle = spawn_verifier(model, session);
    let mut throttle = FrameThrottle::new(config.frame_interval_ms);

    let timeout = Duration::from_secs(config.verify_timeout_secs);
    let started = Instant::now();
    let deadline = started + timeout;

    for recorded in &frames {
        let ts = recorded.observation.timestamp_ms;
        let due = started + Duration::from_millis(ts.saturating_sub(base_ts));
        if due >= deadline {
            tracing::warn!(timestamp_ms = ts, "session timeout reached during replay");
            break;
        }
        tokio::time::sleep_until(due.into()).await;

        if handle.is_finished() {
            break;
        }
        if !throttle.admit(ts) {
            continue;
        }
        let frame = recorded.load(base_dir, config.crop_padding)?;
        if !handle.submit(frame) {
            break;
        }
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    let outcome = handle.finish(remaining).await?;
    print_json(&outcome)?;
    Ok(if outcome.verified {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
