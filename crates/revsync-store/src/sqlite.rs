//! SQLite implementation of the Repository trait.
//!
//! The persistent backend for revsync servers and clients. Uses rusqlite
//! with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use rusqlite::{params, Connection, OptionalExtension};

use revsync_core::{codec, Annotation, CommitInfo, Digest, Document, References, DIGEST_LEN};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::Repository;

/// SQLite-based repository.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(format!("spawn_blocking failed: {}", e))))?
    }
}

fn digest_from_blob(bytes: Vec<u8>, column: &str) -> Result<Digest> {
    Digest::try_from(bytes.as_slice()).map_err(|_| {
        StoreError::Serialization(format!("column {} holds {} bytes, not a digest", column, bytes.len()))
    })
}

fn encode_parents(parents: &[Digest]) -> Vec<u8> {
    parents.iter().flat_map(|p| p.as_bytes().iter().copied()).collect()
}

fn decode_parents(blob: &[u8]) -> Result<Vec<Digest>> {
    if blob.len() % DIGEST_LEN != 0 {
        return Err(StoreError::Serialization(format!(
            "parents column length {} is not a multiple of {}",
            blob.len(),
            DIGEST_LEN
        )));
    }
    blob.chunks_exact(DIGEST_LEN)
        .map(|chunk| digest_from_blob(chunk.to_vec(), "parents"))
        .collect()
}

struct CommitRow {
    hash: Vec<u8>,
    revision: Vec<u8>,
    parents: Vec<u8>,
    author: String,
    message: String,
    date: i64,
    user_data: Vec<u8>,
}

impl CommitRow {
    fn into_commit(self) -> Result<CommitInfo> {
        Ok(CommitInfo {
            hash: digest_from_blob(self.hash, "hash")?,
            revision: digest_from_blob(self.revision, "revision")?,
            parents: decode_parents(&self.parents)?,
            annotation: Annotation {
                author: self.author,
                message: self.message,
                date: self.date,
                user_data: Bytes::from(self.user_data),
            },
        })
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn get_commit_info(&self, digest: &Digest) -> Result<Option<CommitInfo>> {
        let digest = *digest;
        self.blocking(move |conn| {
            let row = conn
                .query_row(
                    "SELECT hash, revision, parents, author, message, date, user_data
                     FROM commits WHERE hash = ?1",
                    params![digest.as_bytes().as_slice()],
                    |row| {
                        Ok(CommitRow {
                            hash: row.get(0)?,
                            revision: row.get(1)?,
                            parents: row.get(2)?,
                            author: row.get(3)?,
                            message: row.get(4)?,
                            date: row.get(5)?,
                            user_data: row.get(6)?,
                        })
                    },
                )
                .optional()?;
            row.map(CommitRow::into_commit).transpose()
        })
        .await
    }

    async fn put_commit(&self, info: &CommitInfo) -> Result<()> {
        let info = info.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO commits
                 (hash, revision, parents, author, message, date, user_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    info.hash.as_bytes().as_slice(),
                    info.revision.as_bytes().as_slice(),
                    encode_parents(&info.parents),
                    info.annotation.author,
                    info.annotation.message,
                    info.annotation.date,
                    info.annotation.user_data.as_ref(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_revision(&self, digest: &Digest) -> Result<Option<Document>> {
        let digest = *digest;
        self.blocking(move |conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT document FROM revisions WHERE digest = ?1",
                    params![digest.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            match blob {
                Some(blob) => Ok(Some(codec::decode_document(&mut blob.as_slice())?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put_revision(&self, digest: &Digest, document: &Document) -> Result<()> {
        let digest = *digest;
        let mut buf = BytesMut::new();
        codec::encode_document(&mut buf, document);
        let blob = buf.freeze();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO revisions (digest, document) VALUES (?1, ?2)",
                params![digest.as_bytes().as_slice(), blob.as_ref()],
            )?;
            Ok(())
        })
        .await
    }

    async fn has_revision(&self, digest: &Digest) -> Result<bool> {
        let digest = *digest;
        self.blocking(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM revisions WHERE digest = ?1",
                    params![digest.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn get_reference(&self, name: &str) -> Result<Option<Digest>> {
        let name = name.to_string();
        self.blocking(move |conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT digest FROM refs WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            blob.map(|b| digest_from_blob(b, "digest")).transpose()
        })
        .await
    }

    async fn set_reference(&self, name: &str, digest: &Digest) -> Result<()> {
        let name = name.to_string();
        let digest = *digest;
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO refs (name, digest) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET digest = excluded.digest",
                params![name, digest.as_bytes().as_slice()],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_references(&self) -> Result<References> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT name, digest FROM refs ORDER BY name")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut refs = References::new();
            for (name, blob) in rows {
                refs.insert(name, digest_from_blob(blob, "digest")?);
            }
            Ok(refs)
        })
        .await
    }
}
