use std::sync::Arc;

use camino::Utf8Path;
use faustls_conf::ProjectConfig;
use tokio::sync::mpsc::UnboundedSender;
use tower_lsp_server::ls_types::Diagnostic;
use tower_lsp_server::ls_types::PublishDiagnosticsParams;
use tower_lsp_server::ls_types::Uri;

use crate::file::File;
use crate::store::FileStore;

/// Produces syntax diagnostics for one file's content.
///
/// Implementations own any parse tree they build; nothing outlives the call.
pub trait SyntaxChecker: Send + Sync {
    fn check(&self, path: &Utf8Path, content: &str) -> Vec<Diagnostic>;
}

/// Runs the external compiler over one process file of a workspace.
pub trait CompilerChecker: Send + Sync {
    fn check(&self, request: &CompileRequest<'_>) -> Vec<Diagnostic>;
}

/// Everything a [`CompilerChecker`] needs to compile one process file.
#[derive(Debug)]
pub struct CompileRequest<'a> {
    /// Real location of the file, as the editor knows it.
    pub path: &'a Utf8Path,
    /// Location of the file inside the mirror tree. The compiler reads this
    /// copy so that unsaved editor content is what gets compiled.
    pub mirror_path: &'a Utf8Path,
    /// Mirror directory of the workspace, for resolving includes.
    pub mirror_dir: &'a Utf8Path,
    pub config: &'a ProjectConfig,
}

/// Diagnostics dispatch: runs the checkers and publishes their results on the
/// outbound channel.
#[derive(Clone)]
pub struct Diagnostics {
    syntax: Arc<dyn SyntaxChecker>,
    compiler: Arc<dyn CompilerChecker>,
    sink: UnboundedSender<PublishDiagnosticsParams>,
}

impl Diagnostics {
    pub fn new(
        syntax: Arc<dyn SyntaxChecker>,
        compiler: Arc<dyn CompilerChecker>,
        sink: UnboundedSender<PublishDiagnosticsParams>,
    ) -> Self {
        Self {
            syntax,
            compiler,
            sink,
        }
    }

    /// Syntax-check a tracked file, record the outcome on its store entry and
    /// publish the result.
    ///
    /// Returns `false` when the path is not tracked or is not a Faust file.
    pub fn syntax(&self, store: &FileStore, path: &Utf8Path) -> bool {
        let Some(file) = store.get(path) else {
            tracing::debug!(%path, "Skipping diagnostics for untracked file");
            return false;
        };
        if !file.kind().is_faust() {
            return false;
        }

        let diagnostics = self.syntax.check(path, file.content());
        let has_errors = !diagnostics.is_empty();
        if store.set_syntax_errors(path, has_errors).is_err() {
            return false;
        }

        if let Some(uri) = file.uri() {
            self.publish(uri.clone(), diagnostics);
        }
        true
    }

    /// Compile every syntax-clean process file of a workspace and publish
    /// what the compiler reports. An empty report is still published so
    /// stale compiler errors clear.
    pub fn compiler(
        &self,
        store: &FileStore,
        root: &Utf8Path,
        mirror_dir: &Utf8Path,
        config: &ProjectConfig,
    ) {
        if !config.compiler_diagnostics {
            return;
        }

        for path in config.process_paths(root) {
            let Some(file) = store.get(&path) else {
                tracing::debug!(%path, "Process file not tracked");
                continue;
            };
            if file.has_syntax_errors() {
                tracing::debug!(%path, "Skipping compiler diagnostics, file has syntax errors");
                continue;
            }

            let request = CompileRequest {
                path: &path,
                mirror_path: file.mirror_path(),
                mirror_dir,
                config,
            };
            let diagnostics = self.compiler.check(&request);
            tracing::debug!(%path, count = diagnostics.len(), "Compiler diagnostics");

            if let Some(uri) = file.uri() {
                self.publish(uri.clone(), diagnostics);
            }
        }
    }

    /// Publish an empty list for a file that is no longer tracked.
    pub fn clear(&self, file: &File) {
        if !file.kind().is_faust() {
            return;
        }
        if let Some(uri) = file.uri() {
            self.publish(uri.clone(), Vec::new());
        }
    }

    fn publish(&self, uri: Uri, diagnostics: Vec<Diagnostic>) {
        let params = PublishDiagnosticsParams {
            uri,
            diagnostics,
            version: None,
        };
        if self.sink.send(params).is_err() {
            tracing::warn!("Diagnostics receiver dropped");
        }
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}
