//! Plain-text file checkpoint
//!
//! The file holds one decimal integer and nothing else. Writes go through a
//! sibling temp file that is renamed over the target.

use crate::checkpoint::CheckpointStore;
use crate::HarvestError;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Checkpoint stored as a UTF-8 integer in a file
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store backed by `path`; the file need not exist yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the checkpoint file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn checkpoint_error(&self, source: std::io::Error) -> HarvestError {
        HarvestError::Checkpoint {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> u64 {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No checkpoint at {}, starting from 0", self.path.display());
                return 0;
            }
            Err(e) => {
                tracing::warn!(
                    "Unreadable checkpoint at {} ({}), starting from 0",
                    self.path.display(),
                    e
                );
                return 0;
            }
        };

        match content.trim().parse::<u64>() {
            Ok(offset) => offset,
            Err(_) => {
                tracing::warn!(
                    "Corrupt checkpoint at {} ({:?}), starting from 0",
                    self.path.display(),
                    content.trim()
                );
                0
            }
        }
    }

    fn save(&mut self, offset: u64) -> Result<(), HarvestError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.checkpoint_error(e))?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path).map_err(|e| self.checkpoint_error(e))?;
            write!(file, "{}", offset).map_err(|e| self.checkpoint_error(e))?;
            file.sync_all().map_err(|e| self.checkpoint_error(e))?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| self.checkpoint_error(e))?;

        tracing::debug!("Checkpoint {} written to {}", offset, self.path.display());
        Ok(())
    }
}
