//! Workspace synchronization for the Faust language server.
//!
//! Keeps the on-disk tree, editor buffers and a private mirror directory
//! consistent. Each [`Workspace`] runs one event loop that serializes disk
//! and editor events into a single mutation sequence over the shared
//! [`FileStore`].

mod diagnostics;
mod disk;
mod editor;
mod error;
mod event_loop;
mod file;
mod mirror;
pub mod paths;
mod store;
mod walk;
mod watcher;
mod workspace;

pub use diagnostics::CompileRequest;
pub use diagnostics::CompilerChecker;
pub use diagnostics::Diagnostics;
pub use diagnostics::SyntaxChecker;
pub use editor::EditorEvent;
pub use error::WorkspaceError;
pub use event_loop::WorkspaceHandle;
pub use file::File;
pub use mirror::Mirror;
pub use mirror::MirrorError;
pub use store::FileStore;
pub use store::StoreError;
pub use watcher::DirectoryWatcher;
pub use watcher::DiskEvent;
pub use watcher::DiskEventKind;
pub use watcher::WatchDirs;
pub use workspace::Workspace;
