use std::sync::Arc;

use anyhow::anyhow;
use anyhow::Context;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use dashmap::DashMap;
use faustls_conf::Settings;
use faustls_source::PositionEncoding;
use faustls_workspace::paths;
use faustls_workspace::CompilerChecker;
use faustls_workspace::Diagnostics;
use faustls_workspace::EditorEvent;
use faustls_workspace::FileStore;
use faustls_workspace::SyntaxChecker;
use faustls_workspace::Workspace;
use faustls_workspace::WorkspaceHandle;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower_lsp_server::ls_types::InitializeParams;
use tower_lsp_server::ls_types::PositionEncodingKind;
use tower_lsp_server::ls_types::PublishDiagnosticsParams;
use tower_lsp_server::ls_types::TextDocumentContentChangeEvent;

use crate::ext::negotiate_position_encoding;
use crate::ext::PositionEncodingExt;
use crate::ext::PositionExt;
use crate::ext::UriExt;

/// Server state shared by every request handler.
///
/// Owns the process-wide [`FileStore`], the mirror root and one
/// [`WorkspaceHandle`] per open project root. Editor notifications update the
/// store here, then get queued on the owning workspace's event loop.
pub struct Session {
    settings: Settings,
    store: Arc<FileStore>,
    diagnostics: Diagnostics,
    workspaces: DashMap<Utf8PathBuf, WorkspaceHandle>,
    mirror_root: Utf8PathBuf,
    /// Removed from disk when the session drops.
    _mirror_dir: TempDir,
}

impl Session {
    /// Create a session and the channel on which it publishes diagnostics.
    pub fn new(
        settings: Settings,
        encoding: PositionEncoding,
        syntax: Arc<dyn SyntaxChecker>,
        compiler: Arc<dyn CompilerChecker>,
    ) -> anyhow::Result<(Self, mpsc::UnboundedReceiver<PublishDiagnosticsParams>)> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("faustlsp-");
        let mirror_dir = match &settings.mirror_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .context("Failed to create mirror directory")?;
        let mirror_root = Utf8PathBuf::from_path_buf(mirror_dir.path().to_path_buf())
            .map_err(|path| anyhow!("Mirror directory is not UTF-8: {}", path.display()))?;
        tracing::info!(%mirror_root, %encoding, "Session started");

        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            settings,
            store: Arc::new(FileStore::new(encoding)),
            diagnostics: Diagnostics::new(syntax, compiler, tx),
            workspaces: DashMap::new(),
            mirror_root,
            _mirror_dir: mirror_dir,
        };
        Ok((session, rx))
    }

    /// Create a session from the client's `initialize` request.
    ///
    /// Negotiates the position encoding, loads settings for the first
    /// workspace folder and opens every workspace folder. Must be called from
    /// within a tokio runtime.
    pub fn from_initialize(
        params: &InitializeParams,
        syntax: Arc<dyn SyntaxChecker>,
        compiler: Arc<dyn CompilerChecker>,
    ) -> anyhow::Result<(Self, mpsc::UnboundedReceiver<PublishDiagnosticsParams>)> {
        let encoding = negotiate_position_encoding(params);
        let roots: Vec<Utf8PathBuf> = params
            .workspace_folders
            .iter()
            .flatten()
            .filter_map(|folder| folder.uri.to_utf8_path_buf())
            .collect();

        let settings = match roots.first() {
            Some(root) => Settings::new(root.as_std_path()).unwrap_or_else(|err| {
                tracing::warn!(%root, error = %err, "Failed to load settings, using defaults");
                Settings::default()
            }),
            None => Settings::default(),
        };

        let (session, rx) = Self::new(settings, encoding, syntax, compiler)?;
        for root in &roots {
            session.open_workspace(root)?;
        }
        Ok((session, rx))
    }

    /// The negotiated encoding, for the server capabilities reply.
    #[must_use]
    pub fn position_encoding(&self) -> PositionEncodingKind {
        self.store.encoding().to_lsp()
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    #[must_use]
    pub fn mirror_root(&self) -> &Utf8Path {
        &self.mirror_root
    }

    /// Roots of all open workspaces, sorted.
    #[must_use]
    pub fn workspace_roots(&self) -> Vec<Utf8PathBuf> {
        let mut roots: Vec<_> = self.workspaces.iter().map(|entry| entry.key().clone()).collect();
        roots.sort();
        roots
    }

    /// Open the project at `root`, returning its resolved root.
    ///
    /// Opening an already open root is a no-op. Must be called from within a
    /// tokio runtime.
    pub fn open_workspace(&self, root: &Utf8Path) -> anyhow::Result<Utf8PathBuf> {
        if let Ok(resolved) = paths::canonicalize(root) {
            if self.workspaces.contains_key(&resolved) {
                tracing::debug!(root = %resolved, "Workspace already open");
                return Ok(resolved);
            }
        }

        let handle = Workspace::open(
            root,
            &self.mirror_root,
            self.store.clone(),
            self.diagnostics.clone(),
        )
        .with_context(|| format!("Failed to open workspace {root}"))?;
        let resolved = handle.root().to_path_buf();
        self.workspaces.insert(resolved.clone(), handle);
        Ok(resolved)
    }

    /// The workspace whose root is the longest prefix of `path`.
    fn workspace_for(
        &self,
        path: &Utf8Path,
    ) -> Option<(Arc<Workspace>, mpsc::Sender<EditorEvent>)> {
        self.workspaces
            .iter()
            .filter(|entry| path.starts_with(entry.key()))
            .max_by_key(|entry| entry.key().as_str().len())
            .map(|entry| (entry.workspace().clone(), entry.sender()))
    }

    /// Queue an editor event on the workspace owning its path.
    ///
    /// Events for paths outside every workspace are dropped.
    pub async fn submit_editor_event(&self, event: EditorEvent) -> anyhow::Result<()> {
        let Some((workspace, sender)) = self.workspace_for(event.path()) else {
            tracing::debug!(path = %event.path(), "No workspace for editor event");
            return Ok(());
        };
        sender.send(event).await.map_err(|_| {
            anyhow!(
                "Workspace event loop for {} has stopped",
                workspace.root()
            )
        })
    }

    /// Re-derive and publish diagnostics for `path`.
    pub fn diagnose_file(&self, path: &Utf8Path) {
        match self.workspace_for(path) {
            Some((workspace, _)) => workspace.diagnose_file(path),
            None => {
                self.diagnostics.syntax(&self.store, path);
            }
        }
    }

    pub async fn did_open(&self, path: &Utf8Path, text: &str) -> anyhow::Result<()> {
        let workspace = self.workspace_for(path);
        let (root, mirror_path) = match &workspace {
            Some((workspace, _)) => (workspace.root().to_path_buf(), workspace.mirror_path(path)),
            None => (Utf8PathBuf::new(), Utf8PathBuf::new()),
        };

        if !self
            .store
            .open_from_path(path, &root, true, None, mirror_path)
        {
            self.store.reopen(path)?;
        }
        self.store.modify_full(path, text)?;

        if workspace.is_none() {
            self.diagnostics.syntax(&self.store, path);
            return Ok(());
        }
        self.submit_editor_event(EditorEvent::Open(path.to_path_buf()))
            .await?;
        self.submit_editor_event(EditorEvent::Change(path.to_path_buf()))
            .await
    }

    /// Apply content changes in order, then queue one `Change` event.
    ///
    /// A change without a range replaces the whole document.
    pub async fn did_change(
        &self,
        path: &Utf8Path,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) -> anyhow::Result<()> {
        for change in changes {
            match change.range {
                Some(range) => self.store.modify_incremental(
                    path,
                    range.start.to_line_col(),
                    range.end.to_line_col(),
                    &change.text,
                )?,
                None => self.store.modify_full(path, &change.text)?,
            }
        }

        if self.workspace_for(path).is_none() {
            self.diagnostics.syntax(&self.store, path);
            return Ok(());
        }
        self.submit_editor_event(EditorEvent::Change(path.to_path_buf()))
            .await
    }

    pub async fn did_close(&self, path: &Utf8Path) -> anyhow::Result<()> {
        self.store.close(path)?;

        if self.workspace_for(path).is_none() {
            if let Some(file) = self.store.remove(path) {
                self.diagnostics.clear(&file);
            }
            return Ok(());
        }
        self.submit_editor_event(EditorEvent::Close(path.to_path_buf()))
            .await
    }

    /// Stop every workspace event loop and wait for them.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let mut first_error = None;
        for root in self.workspace_roots() {
            let Some((root, handle)) = self.workspaces.remove(&root) else {
                continue;
            };
            if let Err(err) = handle.shutdown().await {
                tracing::error!(%root, error = %err, "Workspace ended with an error");
                first_error.get_or_insert(anyhow::Error::new(err).context(format!(
                    "Workspace {root} ended with an error"
                )));
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
