use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop the server before it starts accepting connections.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot determine the working directory: {0}")]
    WorkingDir(#[source] io::Error),

    #[error("root {} is not a usable directory: {source}", .path.display())]
    InvalidRoot { path: PathBuf, source: io::Error },

    #[error("files missing under {}: {}", .root.display(), .missing.join(", "))]
    MissingFiles { root: PathBuf, missing: Vec<String> },

    #[error("cannot open log file {}: {source}", .path.display())]
    Logger { path: PathBuf, source: io::Error },

    #[error("cannot listen on {addr}: {source}")]
    Bind { addr: String, source: io::Error },
}
