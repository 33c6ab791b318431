/// Per-request workspace management
///
/// A [`Workspace`] is a scoped acquisition: it owns a uniquely named
/// directory under the scratch root and removes it on `release()` or, failing
/// that, on drop. Release is total and idempotent.
use crate::config::types::{PipelineError, Result};
use crate::safety::cleanup;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Attempts at finding an unused directory name before giving up
const CREATE_ATTEMPTS: usize = 8;

/// Exclusively owned scratch directory for one pipeline run
#[derive(Debug)]
pub struct Workspace {
    /// Unique run ID (also the directory suffix)
    run_id: String,
    scratch_root: PathBuf,
    dir: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path of a named artifact inside the workspace
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write an artifact into the workspace
    pub async fn write_artifact(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.artifact(name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| PipelineError::workspace_io("write", &path, e))?;
        Ok(path)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Remove the workspace directory. Never fails; errors are logged.
    /// Returns whether the directory is gone.
    pub async fn release(&mut self) -> bool {
        if self.released {
            return true;
        }
        self.released = true;

        let root = self.scratch_root.clone();
        let dir = self.dir.clone();
        let removed = tokio::task::spawn_blocking(move || {
            cleanup::remove_tree_best_effort(&root, &dir)
        })
        .await
        .unwrap_or(false);

        if removed {
            log::debug!("Released workspace {}", self.dir.display());
        }
        removed
    }

    fn release_blocking(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        cleanup::remove_tree_best_effort(&self.scratch_root, &self.dir);
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // Covers early returns, panics and cancelled futures
        self.release_blocking();
    }
}

/// Creates workspaces under a single scratch root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    scratch_root: PathBuf,
    prefix: String,
}

impl WorkspaceManager {
    /// Create the manager, making sure the scratch root exists
    pub fn new(scratch_root: PathBuf, prefix: impl Into<String>) -> Result<Self> {
        std::fs::create_dir_all(&scratch_root).map_err(|e| {
            PipelineError::workspace_io("create scratch root", &scratch_root, e)
        })?;

        Ok(Self {
            scratch_root,
            prefix: prefix.into(),
        })
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Create a fresh, empty workspace.
    ///
    /// `create_dir` (not `create_dir_all`) fails on an existing name, so a
    /// collision with a live workspace is detected by the filesystem itself
    /// and retried with a new id.
    pub async fn create(&self) -> Result<Workspace> {
        for _ in 0..CREATE_ATTEMPTS {
            let run_id = Uuid::new_v4().simple().to_string();
            let dir = self.scratch_root.join(format!("{}{}", self.prefix, run_id));

            match tokio::fs::create_dir(&dir).await {
                Ok(()) => {
                    return Ok(Workspace {
                        run_id,
                        scratch_root: self.scratch_root.clone(),
                        dir,
                        released: false,
                    })
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    log::warn!("Workspace name collision at {}, retrying", dir.display());
                    continue;
                }
                Err(e) => return Err(PipelineError::workspace_io("create", &dir, e)),
            }
        }

        Err(PipelineError::Workspace(format!(
            "could not allocate a unique workspace under {} after {} attempts",
            self.scratch_root.display(),
            CREATE_ATTEMPTS
        )))
    }

    /// Remove workspaces older than `max_age`, e.g. left behind by a crash.
    /// Only directories carrying our prefix are considered.
    pub fn sweep_stale(&self, max_age: Duration) -> Result<usize> {
        let mut cleaned = 0;
        let now = SystemTime::now();

        let entries = std::fs::read_dir(&self.scratch_root).map_err(|e| {
            PipelineError::workspace_io("read scratch root", &self.scratch_root, e)
        })?;

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let owned = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(&self.prefix))
                .unwrap_or(false);
            if !owned {
                continue;
            }

            let metadata = match entry.path().symlink_metadata() {
                Ok(m) if m.is_dir() => m,
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("Failed to get metadata for {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            let age = match metadata.modified().ok().and_then(|m| now.duration_since(m).ok()) {
                Some(age) => age,
                None => continue,
            };

            if age >= max_age {
                log::info!("Sweeping stale workspace: {}", entry.path().display());
                if cleanup::remove_tree_best_effort(&self.scratch_root, &entry.path()) {
                    cleaned += 1;
                }
            }
        }

        Ok(cleaned)
    }
}
