use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// An editor event arrived for a path the file store does not track.
    /// Editor events are only submitted after the store update, so this is a
    /// broken precondition rather than a race.
    #[error("editor event for untracked document {0}")]
    UntrackedDocument(Utf8PathBuf),
    #[error("workspace root is not a directory: {0}")]
    InvalidRoot(Utf8PathBuf),
    #[error("cannot resolve workspace root {path}: {source}")]
    Root {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to start filesystem watcher")]
    Watch(#[from] notify::Error),
    #[error("workspace event loop has stopped")]
    Closed,
}
