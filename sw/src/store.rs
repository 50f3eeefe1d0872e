//! Board document persistence
//!
//! The board lives in a single YAML document (`.swell.yaml` by default).
//! It is rewritten after every state transition, atomically (write to a
//! sibling temp file, then rename), so a crash between transitions never
//! leaves a torn document. Legacy field migration happens on load via the
//! domain serde definitions.

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tokio::fs;
use tracing::debug;

use crate::domain::Board;

/// Default board file name, searched for upward from the working directory
pub const BOARD_FILE_NAME: &str = ".swell.yaml";

/// Handle to the durable board document
#[derive(Debug, Clone)]
pub struct BoardStore {
    path: PathBuf,
}

impl BoardStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Locate the board file: walk up from `start` looking for
    /// `.swell.yaml`; fall back to `start/.swell.yaml` if none exists yet.
    pub fn discover(start: &Path) -> Self {
        let mut current = start.to_path_buf();
        loop {
            let candidate = current.join(BOARD_FILE_NAME);
            if candidate.exists() {
                debug!(path = %candidate.display(), "discover: found board file");
                return Self::new(candidate);
            }
            if !current.pop() {
                break;
            }
        }
        Self::new(start.join(BOARD_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the board file lives in; artifact paths resolve against it
    pub fn project_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub async fn load(&self) -> Result<Board> {
        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read board file {}", self.path.display()))?;
        let board: Board = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse board file {}", self.path.display()))?;
        debug!(board_id = %board.id, tasks = board.tasks.len(), "load: board loaded");
        Ok(board)
    }

    /// Persist the board. The write is atomic: serialize, write a temp
    /// sibling, rename over the target.
    pub async fn save(&self, board: &Board) -> Result<()> {
        let yaml = serde_yaml::to_string(board).context("Failed to serialize board")?;

        let tmp = self.path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!(board_id = %board.id, path = %self.path.display(), "save: board persisted");
        Ok(())
    }
}
