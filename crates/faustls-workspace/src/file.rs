use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use faustls_source::FileKind;
use tower_lsp_server::ls_types::Uri;

/// One tracked source file.
///
/// Values handed out by the [`FileStore`](crate::FileStore) are snapshots:
/// the content is shared through an `Arc<str>`, so taking one does not copy
/// the text, and later store mutations do not affect it.
#[derive(Clone, Debug)]
pub struct File {
    pub(crate) path: Utf8PathBuf,
    pub(crate) relative_path: Utf8PathBuf,
    pub(crate) mirror_path: Utf8PathBuf,
    pub(crate) uri: Option<Uri>,
    pub(crate) content: Arc<str>,
    pub(crate) open: bool,
    pub(crate) has_syntax_errors: bool,
}

impl File {
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Path relative to the workspace root, empty for files outside any
    /// workspace.
    #[must_use]
    pub fn relative_path(&self) -> &Utf8Path {
        &self.relative_path
    }

    #[must_use]
    pub fn mirror_path(&self) -> &Utf8Path {
        &self.mirror_path
    }

    #[must_use]
    pub fn uri(&self) -> Option<&Uri> {
        self.uri.as_ref()
    }

    #[must_use]
    pub fn content(&self) -> &Arc<str> {
        &self.content
    }

    /// Whether an editor currently owns this file's content.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub fn has_syntax_errors(&self) -> bool {
        self.has_syntax_errors
    }

    #[must_use]
    pub fn kind(&self) -> FileKind {
        FileKind::from_path(&self.path)
    }
}
