use camino::Utf8Path;
use camino::Utf8PathBuf;

use crate::error::WorkspaceError;
use crate::workspace::Workspace;

/// Document lifecycle notification from the editor.
///
/// The producer applies the matching [`FileStore`](crate::FileStore) update
/// before submitting the event, so the handler only deals with the mirror,
/// the scoped map and diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditorEvent {
    Open(Utf8PathBuf),
    Change(Utf8PathBuf),
    Close(Utf8PathBuf),
}

impl EditorEvent {
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::Open(path) | Self::Change(path) | Self::Close(path) => path,
        }
    }
}

impl Workspace {
    pub(crate) fn handle_editor_event(&self, event: &EditorEvent) -> Result<(), WorkspaceError> {
        let path = event.path();
        if !self.store().contains(path) {
            tracing::error!(%path, ?event, "Editor event for file not in file store");
            return Err(WorkspaceError::UntrackedDocument(path.to_path_buf()));
        }
        tracing::debug!(?event, "Editor event");

        match event {
            EditorEvent::Open(path) => self.editor_opened(path),
            EditorEvent::Change(path) => self.editor_changed(path),
            EditorEvent::Close(path) => self.editor_closed(path),
        }

        if Self::is_config_file(path) && !matches!(event, EditorEvent::Open(_)) {
            self.reload_config();
        }
        Ok(())
    }

    fn editor_opened(&self, path: &Utf8Path) {
        self.add_file(path);
        let mirror_path = self.mirror_path(path);
        let created = self
            .mirror()
            .ensure_parent(&mirror_path)
            .and_then(|()| self.mirror().create_empty_file(&mirror_path, None));
        if let Err(err) = created {
            tracing::error!(%path, error = %err, "Failed to create mirror file");
        }
    }

    fn editor_changed(&self, path: &Utf8Path) {
        let Some(file) = self.store().get(path) else {
            return;
        };
        if let Err(err) = self
            .mirror()
            .write(&self.mirror_path(path), file.content().as_bytes())
        {
            tracing::error!(%path, error = %err, "Failed to write mirror file");
        }
        self.diagnose_file(path);
    }

    fn editor_closed(&self, path: &Utf8Path) {
        // The editor may have reopened the file after queueing this close.
        if self.store().is_open(path) {
            tracing::debug!(%path, "Closed file was reopened, keeping buffer");
            return;
        }
        let mirror_path = self.mirror_path(path);

        if !path.exists() {
            tracing::debug!(%path, "Closed file does not exist on disk, untracking");
            self.remove_file(path);
            if let Some(file) = self.store().remove(path) {
                self.diagnostics().clear(&file);
            }
            if let Err(err) = self.mirror().remove(&mirror_path) {
                tracing::error!(%path, error = %err, "Failed to remove mirror file");
            }
            return;
        }

        if self.store().reload_from_disk(path).is_err() {
            return;
        }
        self.add_file(path);
        if let Some(file) = self.store().get(path) {
            if let Err(err) = self.mirror().write(&mirror_path, file.content().as_bytes()) {
                tracing::error!(%path, error = %err, "Failed to write mirror file");
            }
        }
        self.diagnose_file(path);
    }
}
