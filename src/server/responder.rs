use log::{debug, warn};
use std::fs;

use super::mime::content_type_for;
use super::path_mapper::ResolvedTarget;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Success {
        body: Vec<u8>,
        content_type: &'static str,
    },
    Forbidden,
    NotFound {
        requested: String,
    },
}

/// Reads the target into memory. Directories are never listed.
pub fn respond(target: &ResolvedTarget) -> ResponseOutcome {
    let not_found = || ResponseOutcome::NotFound {
        requested: target.requested.clone(),
    };

    if !target.path.exists() || target.path.is_dir() {
        return not_found();
    }

    match fs::read(&target.path) {
        Ok(body) => {
            let content_type = content_type_for(&target.path);
            debug!(
                "Read {:?} ({} bytes, {})",
                target.path,
                body.len(),
                content_type
            );
            ResponseOutcome::Success { body, content_type }
        }
        Err(e) => {
            warn!("Error reading {:?}: {}", target.path, e);
            not_found()
        }
    }
}
