use log::info;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use super::error::StartupError;

const INDEX_FILE: &str = "index.html";

/// The canonical directory every request is confined to.
///
/// Built once at startup and shared read-only between workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedRoot {
    path: PathBuf,
}

impl ServedRoot {
    /// Discovers the root starting from the process working directory.
    pub fn resolve() -> Result<Self, StartupError> {
        let cwd = std::env::current_dir().map_err(StartupError::WorkingDir)?;
        Self::resolve_from(&cwd).map_err(StartupError::WorkingDir)
    }

    /// Picks `cwd` when it holds an `index.html`, else its parent when the
    /// parent does, else `cwd` itself.
    pub fn resolve_from(cwd: &Path) -> io::Result<Self> {
        let cwd = cwd.canonicalize()?;
        let parent = cwd.parent();

        let chosen = if cwd.join(INDEX_FILE).exists() {
            cwd.as_path()
        } else {
            match parent {
                Some(parent) if parent.join(INDEX_FILE).exists() => parent,
                _ => cwd.as_path(),
            }
        };

        let root = Self {
            path: chosen.canonicalize()?,
        };
        info!("Serving portal root: {}", root);
        Ok(root)
    }

    /// Uses an explicitly configured directory, skipping discovery.
    pub fn from_dir(dir: &Path) -> Result<Self, StartupError> {
        let invalid = |source: io::Error| StartupError::InvalidRoot {
            path: dir.to_path_buf(),
            source,
        };

        let path = dir.canonicalize().map_err(invalid)?;
        if !path.is_dir() {
            return Err(invalid(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a directory",
            )));
        }

        info!("Serving configured root: {}", path.display());
        Ok(Self { path })
    }

    /// Fails listing every relative path that has no file under the root.
    pub fn verify_required(&self, required: &[PathBuf]) -> Result<(), StartupError> {
        let missing: Vec<String> = required
            .iter()
            .filter(|rel| !self.path.join(rel).is_file())
            .map(|rel| rel.display().to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(StartupError::MissingFiles {
                root: self.path.clone(),
                missing,
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn new_unchecked(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl fmt::Display for ServedRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
