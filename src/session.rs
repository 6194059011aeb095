//! Session records and a file-backed session store.
//!
//! A session ties a working directory to a transcript file under the
//! user's home directory, so a conversation can be resumed later.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use uuid::Uuid;

/// A user session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub workdir: PathBuf,
    pub transcript_file: PathBuf,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Session {
    /// Provision a new session rooted at `workdir` (the current directory
    /// when empty), with its transcript under the data directory.
    ///
    /// # Errors
    /// Fails when the data directories cannot be created.
    pub fn create(workdir: Option<PathBuf>) -> Result<Self> {
        let workdir = match workdir {
            Some(dir) => dir,
            None => std::env::current_dir().context("failed to get current directory")?,
        };

        let base = data_dir()?;
        let sessions_dir = base.join("sessions");
        let transcripts_dir = base.join("transcripts");
        for dir in [&sessions_dir, &transcripts_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }

        let id = Uuid::new_v4().to_string();
        let now = OffsetDateTime::now_utc();
        Ok(Self {
            transcript_file: transcripts_dir.join(format!("{id}.json")),
            id,
            workdir,
            created_at: now,
            updated_at: now,
        })
    }

    /// Load an existing session by id from the default store.
    ///
    /// # Errors
    /// Fails when the session does not exist or cannot be parsed.
    pub fn resume(id: &str) -> Result<Self> {
        let store = FileSessionStore::open(data_dir()?.join("sessions"))?;
        store.load(id)
    }

    /// Persist this session in the default store, bumping `updated_at`.
    ///
    /// # Errors
    /// Fails when the session file cannot be written.
    pub fn save(&mut self) -> Result<()> {
        self.updated_at = OffsetDateTime::now_utc();
        let store = FileSessionStore::open(data_dir()?.join("sessions"))?;
        store.save(self)
    }
}

/// Stores sessions as `<base>/<id>.json`.
pub struct FileSessionStore {
    base_dir: PathBuf,
}

impl FileSessionStore {
    /// Open (and create) the store directory.
    ///
    /// # Errors
    /// Fails when the directory cannot be created.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)
            .with_context(|| format!("failed to create sessions directory {}", base_dir.display()))?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{id}.json"))
    }

    /// # Errors
    /// Fails when the session cannot be serialized or written.
    pub fn save(&self, session: &Session) -> Result<()> {
        let data = serde_json::to_vec_pretty(session).context("failed to encode session")?;
        std::fs::write(self.path_for(&session.id), data)
            .with_context(|| format!("failed to write session {}", session.id))?;
        Ok(())
    }

    /// # Errors
    /// Fails when the session is missing or malformed.
    pub fn load(&self, id: &str) -> Result<Session> {
        let path = self.path_for(id);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                bail!("session not found: {id}")
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        serde_json::from_slice(&data).with_context(|| format!("failed to parse session {id}"))
    }

    /// # Errors
    /// Fails on I/O errors other than the file already being gone.
    pub fn delete(&self, id: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to delete session {id}")),
        }
    }

    /// All readable sessions, newest first. Unparseable entries are
    /// skipped.
    ///
    /// # Errors
    /// Fails when the store directory cannot be listed.
    pub fn list(&self) -> Result<Vec<Session>> {
        let entries = std::fs::read_dir(&self.base_dir)
            .with_context(|| format!("failed to read {}", self.base_dir.display()))?;

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(id) = name.to_string_lossy().strip_suffix(".json").map(String::from) else {
                continue;
            };
            if let Ok(session) = self.load(&id) {
                sessions.push(session);
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }
}

fn data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("failed to get home directory")?;
    Ok(home.join(".tandem"))
}
