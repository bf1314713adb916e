//! Filesystem watching.
//!
//! Every directory under a workspace root is watched non-recursively and
//! added explicitly, so directories created later have to be registered by
//! the event loop as it sees them.

use camino::Utf8Path;
use camino::Utf8PathBuf;
use notify::event::ModifyKind;
use notify::event::RenameMode;
use notify::Config;
use notify::Event;
use notify::EventKind;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use tokio::sync::mpsc::UnboundedSender;

use crate::walk::walk_tree;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskEventKind {
    Create,
    Write,
    Remove,
}

/// One normalized filesystem change.
///
/// A rename arrives as a `Create` of the new path carrying the old path in
/// `renamed_from`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskEvent {
    pub path: Utf8PathBuf,
    pub kind: DiskEventKind,
    pub renamed_from: Option<Utf8PathBuf>,
}

impl DiskEvent {
    #[must_use]
    pub fn created(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: DiskEventKind::Create,
            renamed_from: None,
        }
    }

    #[must_use]
    pub fn written(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: DiskEventKind::Write,
            renamed_from: None,
        }
    }

    #[must_use]
    pub fn removed(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: DiskEventKind::Remove,
            renamed_from: None,
        }
    }

    #[must_use]
    pub fn renamed(from: impl Into<Utf8PathBuf>, to: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: to.into(),
            kind: DiskEventKind::Create,
            renamed_from: Some(from.into()),
        }
    }
}

/// Set of directories the event loop can extend at runtime.
pub trait WatchDirs: Send {
    fn watch_dir(&mut self, path: &Utf8Path);
}

/// `notify` watcher feeding normalized [`DiskEvent`]s into a channel.
///
/// Dropping it stops the underlying watcher thread.
pub struct DirectoryWatcher {
    watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    pub fn new(tx: UnboundedSender<notify::Result<DiskEvent>>) -> notify::Result<Self> {
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for disk_event in convert_notify_event(event) {
                        let _ = tx.send(Ok(disk_event));
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err));
                }
            },
            Config::default(),
        )?;
        Ok(Self { watcher })
    }

    /// Watch `root` and every directory below it.
    pub fn watch_tree(&mut self, root: &Utf8Path) -> notify::Result<()> {
        self.watcher
            .watch(root.as_std_path(), RecursiveMode::NonRecursive)?;
        for dir in walk_tree(root).dirs.iter().filter(|dir| dir.as_path() != root) {
            self.watch_dir(dir);
        }
        Ok(())
    }
}

impl WatchDirs for DirectoryWatcher {
    fn watch_dir(&mut self, path: &Utf8Path) {
        if let Err(err) = self
            .watcher
            .watch(path.as_std_path(), RecursiveMode::NonRecursive)
        {
            tracing::error!(%path, error = %err, "Failed to watch directory");
        }
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher").finish_non_exhaustive()
    }
}

/// Convert a [`notify::Event`] into zero or more [`DiskEvent`]s.
pub(crate) fn convert_notify_event(event: Event) -> Vec<DiskEvent> {
    let paths: Vec<Utf8PathBuf> = event
        .paths
        .into_iter()
        .filter_map(|path| Utf8PathBuf::from_path_buf(path).ok())
        .collect();

    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.as_slice() {
            [from, to] => vec![DiskEvent::renamed(from.clone(), to.clone())],
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From))
        | EventKind::Remove(_) => paths.into_iter().map(DiskEvent::removed).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) | EventKind::Create(_) => {
            paths.into_iter().map(DiskEvent::created).collect()
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => paths.into_iter().map(DiskEvent::written).collect(),
        _ => Vec::new(),
    }
}
