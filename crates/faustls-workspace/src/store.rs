use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use faustls_source::apply_change;
use faustls_source::LineCol;
use faustls_source::PositionEncoding;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tower_lsp_server::ls_types::Uri;

use crate::file::File;
use crate::paths::path_to_uri;
use crate::paths::relative_to;
use crate::paths::uri_to_path;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("file not in file store: {0}")]
    Untracked(Utf8PathBuf),
}

/// Process-wide registry of every tracked file, keyed by absolute path.
///
/// Create one before any workspace starts and share it behind an `Arc`.
/// Each operation holds the lock only for the map update itself; disk reads
/// happen before the lock is taken, so a slow read never blocks lookups.
#[derive(Debug)]
pub struct FileStore {
    files: Mutex<FxHashMap<Utf8PathBuf, File>>,
    encoding: PositionEncoding,
}

impl FileStore {
    #[must_use]
    pub fn new(encoding: PositionEncoding) -> Self {
        Self {
            files: Mutex::new(FxHashMap::default()),
            encoding,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<Utf8PathBuf, File>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Position encoding incremental edits are expressed in.
    #[must_use]
    pub fn encoding(&self) -> PositionEncoding {
        self.encoding
    }

    /// Start tracking `path`, reading its content from disk.
    ///
    /// Returns `false` without touching anything when the path is already
    /// tracked. An unreadable file is tracked with empty content.
    pub fn open_from_path(
        &self,
        path: &Utf8Path,
        root: &Utf8Path,
        editor_open: bool,
        uri: Option<Uri>,
        mirror_path: Utf8PathBuf,
    ) -> bool {
        if self.contains(path) {
            tracing::debug!(%path, "File already in store");
            return false;
        }

        tracing::debug!(%path, "Reading contents of file");
        let content = read_content(path);

        let file = File {
            path: path.to_path_buf(),
            relative_path: relative_to(path, root),
            mirror_path,
            uri: uri.or_else(|| path_to_uri(path)),
            content,
            open: editor_open,
            has_syntax_errors: false,
        };

        let mut files = self.lock();
        if files.contains_key(path) {
            return false;
        }
        files.insert(path.to_path_buf(), file);
        true
    }

    pub fn open_from_uri(
        &self,
        uri: &Uri,
        root: &Utf8Path,
        editor_open: bool,
        mirror_path: Utf8PathBuf,
    ) -> bool {
        let Some(path) = uri_to_path(uri) else {
            tracing::error!(uri = uri.as_str(), "Cannot open non-file URI");
            return false;
        };
        self.open_from_path(&path, root, editor_open, Some(uri.clone()), mirror_path)
    }

    #[must_use]
    pub fn get(&self, path: &Utf8Path) -> Option<File> {
        self.lock().get(path).cloned()
    }

    #[must_use]
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.lock().contains_key(path)
    }

    #[must_use]
    pub fn is_open(&self, path: &Utf8Path) -> bool {
        self.lock().get(path).is_some_and(|file| file.open)
    }

    /// Replace the whole content of a tracked file.
    pub fn modify_full(&self, path: &Utf8Path, content: &str) -> Result<(), StoreError> {
        self.update(path, "modify", |file| {
            file.content = Arc::from(content);
        })
    }

    /// Replace the range `[start, end)` of a tracked file's content.
    ///
    /// Both positions are resolved against the content as it was before this
    /// edit, in the store's position encoding.
    pub fn modify_incremental(
        &self,
        path: &Utf8Path,
        start: LineCol,
        end: LineCol,
        text: &str,
    ) -> Result<(), StoreError> {
        let encoding = self.encoding;
        tracing::debug!(%path, ?start, ?end, "Applying incremental change");
        self.update(path, "modify", |file| {
            let updated = apply_change(&file.content, start, end, text, encoding);
            file.content = Arc::from(updated);
        })
    }

    /// Mark a tracked file as owned by the editor.
    pub fn reopen(&self, path: &Utf8Path) -> Result<(), StoreError> {
        self.update(path, "reopen", |file| file.open = true)
    }

    /// Clear the editor-open flag. The record and its content stay.
    pub fn close(&self, path: &Utf8Path) -> Result<(), StoreError> {
        self.update(path, "close", |file| file.open = false)
    }

    /// Refresh a tracked file from disk, discarding any editor content.
    pub fn reload_from_disk(&self, path: &Utf8Path) -> Result<(), StoreError> {
        let content = read_content(path);
        self.update(path, "reload", |file| {
            file.content = content;
            file.open = false;
        })
    }

    pub fn set_syntax_errors(&self, path: &Utf8Path, has_errors: bool) -> Result<(), StoreError> {
        self.update(path, "record diagnostics for", |file| {
            file.has_syntax_errors = has_errors;
        })
    }

    pub fn remove(&self, path: &Utf8Path) -> Option<File> {
        self.lock().remove(path)
    }

    /// All tracked paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<Utf8PathBuf> {
        let mut paths: Vec<_> = self.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn update(
        &self,
        path: &Utf8Path,
        operation: &'static str,
        f: impl FnOnce(&mut File),
    ) -> Result<(), StoreError> {
        let mut files = self.lock();
        let Some(file) = files.get_mut(path) else {
            tracing::error!(%path, "Cannot {operation} file not in file store");
            return Err(StoreError::Untracked(path.to_path_buf()));
        };
        f(file);
        Ok(())
    }
}

fn read_content(path: &Utf8Path) -> Arc<str> {
    match std::fs::read(path) {
        Ok(bytes) => Arc::from(String::from_utf8_lossy(&bytes).as_ref()),
        Err(err) => {
            tracing::error!(%path, error = %err, "Failed to read file");
            Arc::from("")
        }
    }
}
