use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

/// Creates `path` and its parents; an existing directory is fine.
pub fn create_folder(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        debug!("Folder {} already exists", path.display());
        return Ok(());
    }
    fs::create_dir_all(path)?;
    info!("Folder {} was created", path.display());
    Ok(())
}

/// Moves a file, falling back to copy + delete across filesystems.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

/// Resolves `path` against `base` without touching the filesystem, folding
/// `.` and `..` so that containment can be checked with `starts_with`.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in base.join(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

/// Scratch directories owned by one run. They are removed by `close`, or on
/// drop if `close` was never reached.
pub struct WorkDir {
    paths: Vec<PathBuf>,
    closed: bool,
}

impl WorkDir {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            closed: false,
        }
    }

    pub fn create(&self) -> io::Result<()> {
        for path in &self.paths {
            create_folder(path)?;
        }
        Ok(())
    }

    pub fn close(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for path in &self.paths {
            if !path.exists() {
                continue;
            }
            match fs::remove_dir_all(path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) => warn!("Could not remove {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        self.remove();
    }
}
