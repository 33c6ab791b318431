/// Confined, idempotent tree removal for workspace teardown
///
/// Removal is restricted to direct children of a scratch root and never
/// follows symlinks: a symlink planted inside a workspace is unlinked, not
/// traversed.
use crate::config::types::{PipelineError, Result};
use log::{debug, warn};
use std::io::ErrorKind;
use std::path::{Component, Path};

/// Check that `path` names a direct child of `scratch_root`.
pub fn ensure_confined(scratch_root: &Path, path: &Path) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        PipelineError::Workspace(format!("refusing to remove {}: no parent", path.display()))
    })?;
    let name_ok = matches!(
        path.components().next_back(),
        Some(Component::Normal(_))
    );
    if parent != scratch_root || !name_ok {
        return Err(PipelineError::Workspace(format!(
            "refusing to remove {}: not a direct child of scratch root {}",
            path.display(),
            scratch_root.display()
        )));
    }
    Ok(())
}

/// Remove `path` and everything below it. Missing paths are success.
pub fn remove_tree(scratch_root: &Path, path: &Path) -> Result<()> {
    ensure_confined(scratch_root, path)?;

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Already removed: {}", path.display());
            return Ok(());
        }
        Err(e) => return Err(PipelineError::workspace_io("stat", path, e)),
    };

    let removal = if metadata.is_dir() {
        // remove_dir_all does not follow symlinks found inside the tree
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match removal {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::workspace_io("remove", path, e)),
    }
}

/// Total variant of [`remove_tree`]: failures are logged and swallowed.
/// Returns whether the path is gone afterwards.
pub fn remove_tree_best_effort(scratch_root: &Path, path: &Path) -> bool {
    match remove_tree(scratch_root, path) {
        Ok(()) => true,
        Err(e) => {
            warn!("Workspace cleanup failed for {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_nested_tree() {
        let root = tempfile::tempdir().unwrap();
        let ws = root.path().join("tmp-one");
        std::fs::create_dir_all(ws.join("a/b")).unwrap();
        std::fs::write(ws.join("a/b/file.s"), "ret").unwrap();

        remove_tree(root.path(), &ws).unwrap();
        assert!(!ws.exists());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let ws = root.path().join("tmp-two");
        std::fs::create_dir(&ws).unwrap();

        remove_tree(root.path(), &ws).unwrap();
        remove_tree(root.path(), &ws).unwrap();
        assert!(remove_tree_best_effort(root.path(), &ws));
    }

    #[test]
    fn test_refuses_paths_outside_scratch_root() {
        let root = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let victim = other.path().join("keep");
        std::fs::create_dir(&victim).unwrap();

        assert!(remove_tree(root.path(), &victim).is_err());
        assert!(!remove_tree_best_effort(root.path(), &victim));
        assert!(victim.exists());

        let nested = root.path().join("tmp-x/inner");
        assert!(ensure_confined(root.path(), &nested).is_err());
        assert!(ensure_confined(root.path(), &root.path().join("..")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let precious = outside.path().join("precious.txt");
        std::fs::write(&precious, "keep me").unwrap();

        let ws = root.path().join("tmp-link");
        std::fs::create_dir(&ws).unwrap();
        std::os::unix::fs::symlink(outside.path(), ws.join("escape")).unwrap();

        remove_tree(root.path(), &ws).unwrap();
        assert!(!ws.exists());
        assert!(precious.exists());
    }
}
