use std::path::Path;

use facegate_core::codec;
use facegate_core::matcher::{decode_corpus, EncodedEmbedding};
use facegate_core::types::PersonId;
use facegate_core::{Angle, CorpusSnapshot, Embedding, EmbeddingError, StoredEmbedding};
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("embedding rejected: {0}")]
    Codec(#[from] EmbeddingError),
    #[error("unknown person id {0}")]
    UnknownPerson(PersonId),
}

/// SQLite-backed store of enrolled persons and their face embeddings.
///
/// Embeddings are stored as raw little-endian `f32` blobs, one row per
/// enrolled angle. Deleting a person cascades to their embeddings.
#[derive(Clone)]
pub struct FaceStore {
    conn: Connection,
}

impl FaceStore {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if db_path != Path::new(":memory:") {
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 CREATE TABLE IF NOT EXISTS persons (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     name TEXT NOT NULL,
                     created_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS face_embeddings (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     person_id INTEGER NOT NULL
                         REFERENCES persons(id) ON DELETE CASCADE,
                     angle TEXT NOT NULL,
                     embedding BLOB NOT NULL,
                     created_at TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_face_embeddings_person
                     ON face_embeddings(person_id);",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Insert a new person. Returns the generated id.
    pub async fn add_person(&self, name: &str) -> Result<PersonId, StoreError> {
        let name = name.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();

        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO persons (name, created_at) VALUES (?1, ?2)",
                    rusqlite::params![name, created_at],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        tracing::info!(person_id = id, "person added");
        Ok(id)
    }

    /// Attach an embedding to an existing person. Degenerate embeddings are
    /// refused since they can never match.
    pub async fn add_embedding(
        &self,
        person_id: PersonId,
        angle: &Angle,
        embedding: &Embedding,
    ) -> Result<i64, StoreError> {
        if embedding.is_degenerate() {
            return Err(EmbeddingError::DegenerateEmbedding.into());
        }
        let blob = codec::serialize(embedding);
        let angle = angle.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();

        let inserted = self
            .conn
            .call(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM persons WHERE id = ?1)",
                    [person_id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Ok(None);
                }
                conn.execute(
                    "INSERT INTO face_embeddings (person_id, angle, embedding, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![person_id, angle, blob, created_at],
                )?;
                Ok(Some(conn.last_insert_rowid()))
            })
            .await?;

        let id = inserted.ok_or(StoreError::UnknownPerson(person_id))?;
        tracing::info!(
            person_id,
            embedding_id = id,
            dimension = embedding.dimension(),
            "embedding enrolled"
        );
        Ok(id)
    }

    /// All persons with their embedding counts, oldest first.
    pub async fn list_persons(&self) -> Result<Vec<PersonInfo>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT p.id, p.name, p.created_at, COUNT(e.id)
                     FROM persons p
                     LEFT JOIN face_embeddings e ON e.person_id = p.id
                     GROUP BY p.id
                     ORDER BY p.id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(PersonInfo {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                        embeddings: row.get(3)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Decoded embeddings of one person in insertion order.
    pub async fn embeddings_for_person(
        &self,
        person_id: PersonId,
    ) -> Result<Vec<StoredEmbedding>, StoreError> {
        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT person_id, angle, embedding FROM face_embeddings
                     WHERE person_id = ?1 ORDER BY id",
                )?;
                let rows = stmt.query_map([person_id], encoded_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        Ok(decode_corpus(records))
    }

    /// Snapshot of every stored embedding in insertion order. Unreadable rows
    /// are skipped.
    pub async fn load_corpus(&self) -> Result<CorpusSnapshot, StoreError> {
        let records = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT person_id, angle, embedding FROM face_embeddings ORDER BY id",
                )?;
                let rows = stmt.query_map([], encoded_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;

        let total = records.len();
        let snapshot = CorpusSnapshot::new(decode_corpus(records));
        tracing::debug!(
            rows = total,
            usable = snapshot.len(),
            "corpus snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Remove a person and their embeddings. Returns whether anything was deleted.
    pub async fn remove_person(&self, person_id: PersonId) -> Result<bool, StoreError> {
        self.conn
            .call(move |conn| {
                let affected = conn.execute("DELETE FROM persons WHERE id = ?1", [person_id])?;
                Ok(affected > 0)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Count stored embeddings across all persons.
    pub async fn count_embeddings(&self) -> Result<u64, StoreError> {
        self.conn
            .call(|conn| {
                let count: u64 =
                    conn.query_row("SELECT COUNT(*) FROM face_embeddings", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map_err(StoreError::from)
    }
}

// ── Row helpers ───────────────────────────────────────────────────────────────

fn encoded_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EncodedEmbedding> {
    Ok(EncodedEmbedding {
        person_id: row.get(0)?,
        angle: Angle::from(row.get::<_, String>(1)?),
        bytes: row.get(2)?,
    })
}

// ── Public types ──────────────────────────────────────────────────────────────

/// An enrolled person (no embedding data).
#[derive(Debug, Clone, serde::Serialize)]
pub struct PersonInfo {
    pub id: PersonId,
    pub name: String,
    pub created_at: String,
    pub embeddings: u64,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
