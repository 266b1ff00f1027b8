use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use super::root::ServedRoot;

/// A request path that normalizes to somewhere outside the served root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request path {requested} escapes the served root")]
pub struct PathEscape {
    pub requested: String,
}

/// Filesystem location a request maps to, confined to the served root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub path: PathBuf,
    /// Request path as the client sent it (after percent-decoding).
    pub requested: String,
}

/// Maps a decoded request path onto the served root.
///
/// Purely lexical: nothing is stat'ed or opened here, so a rejected path is
/// never touched on disk. Symlinks inside the root are followed later as-is.
pub fn map(root: &ServedRoot, request_path: &str) -> Result<ResolvedTarget, PathEscape> {
    let request_path = if request_path == "/" {
        "/index.html"
    } else {
        request_path
    };

    let fragment = request_path.strip_prefix('/').unwrap_or(request_path);
    let candidate = normalize(&root.path().join(fragment));

    // Path::starts_with compares whole components, so `/root-evil` is not under `/root`.
    if !candidate.starts_with(root.path()) {
        return Err(PathEscape {
            requested: request_path.to_string(),
        });
    }

    Ok(ResolvedTarget {
        path: candidate,
        requested: request_path.to_string(),
    })
}

/// Resolves `.` and `..` without touching the filesystem. `..` at the
/// filesystem root stays at the root.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => {
                normalized = PathBuf::from(prefix.as_os_str());
            }
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(segment) => normalized.push(segment),
        }
    }

    normalized
}
