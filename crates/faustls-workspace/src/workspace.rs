use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::RwLock;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use faustls_conf::ProjectConfig;
use faustls_conf::CONFIG_FILE_NAME;
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

use crate::diagnostics::Diagnostics;
use crate::error::WorkspaceError;
use crate::event_loop;
use crate::event_loop::WorkspaceHandle;
use crate::file::File;
use crate::mirror::Mirror;
use crate::paths::canonicalize;
use crate::paths::relative_to;
use crate::store::FileStore;
use crate::walk::walk_tree;
use crate::watcher::DirectoryWatcher;

/// One open project root.
///
/// The workspace only holds path keys into the shared [`FileStore`]; content
/// always lives in the store. All mutations go through the workspace's event
/// loop, see [`WorkspaceHandle`].
#[derive(Debug)]
pub struct Workspace {
    root: Utf8PathBuf,
    mirror: Mirror,
    store: Arc<FileStore>,
    files: Mutex<FxHashSet<Utf8PathBuf>>,
    config: RwLock<Arc<ProjectConfig>>,
    diagnostics: Diagnostics,
}

impl Workspace {
    /// Open the project at `root` and start its event loop.
    ///
    /// The tree is scanned, mirrored under `mirror_root` and diagnosed before
    /// this returns; the event loop is spawned on the current tokio runtime
    /// and runs until the handle is shut down or dropped.
    pub fn open(
        root: &Utf8Path,
        mirror_root: &Utf8Path,
        store: Arc<FileStore>,
        diagnostics: Diagnostics,
    ) -> Result<WorkspaceHandle, WorkspaceError> {
        let workspace = Self::create(root, mirror_root, store, diagnostics)?;

        let (disk_tx, disk_rx) = mpsc::unbounded_channel();
        let mut watcher = DirectoryWatcher::new(disk_tx)?;
        watcher.watch_tree(workspace.root())?;

        tracing::info!(root = %workspace.root(), "Workspace opened");
        Ok(event_loop::spawn(workspace, watcher, disk_rx))
    }

    /// Resolve the root and run the initial scan, without any watcher.
    pub(crate) fn create(
        root: &Utf8Path,
        mirror_root: &Utf8Path,
        store: Arc<FileStore>,
        diagnostics: Diagnostics,
    ) -> Result<Arc<Self>, WorkspaceError> {
        let root = canonicalize(root).map_err(|source| WorkspaceError::Root {
            path: root.to_path_buf(),
            source,
        })?;
        if !root.is_dir() {
            return Err(WorkspaceError::InvalidRoot(root));
        }

        let workspace = Self {
            mirror: Mirror::for_workspace(mirror_root, &root),
            root,
            store,
            files: Mutex::new(FxHashSet::default()),
            config: RwLock::new(Arc::new(ProjectConfig::default())),
            diagnostics,
        };
        workspace.initialize();
        Ok(Arc::new(workspace))
    }

    fn initialize(&self) {
        let failures = self.mirror.replicate(&self.root);
        if failures > 0 {
            tracing::warn!(root = %self.root, failures, "Workspace mirror is incomplete");
        }

        for path in walk_tree(&self.root).files {
            let mirror_path = self.mirror_path(&path);
            if self
                .store
                .open_from_path(&path, &self.root, false, None, mirror_path)
            {
                self.add_file(&path);
                self.diagnostics.syntax(&self.store, &path);
            }
        }

        self.load_config();
        self.run_compiler();
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    #[must_use]
    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    #[must_use]
    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    pub(crate) fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Current project configuration.
    #[must_use]
    pub fn config(&self) -> Arc<ProjectConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn files(&self) -> MutexGuard<'_, FxHashSet<Utf8PathBuf>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.files().contains(path)
    }

    /// Paths in this workspace's scoped map, sorted.
    #[must_use]
    pub fn tracked_files(&self) -> Vec<Utf8PathBuf> {
        let mut files: Vec<_> = self.files().iter().cloned().collect();
        files.sort();
        files
    }

    pub(crate) fn add_file(&self, path: &Utf8Path) {
        self.files().insert(path.to_path_buf());
    }

    pub(crate) fn remove_file(&self, path: &Utf8Path) -> bool {
        self.files().remove(path)
    }

    /// Drop `path` and everything below it from the scoped map and the
    /// store, returning the removed records.
    ///
    /// Editor-open files are kept: their buffers stay authoritative until
    /// the editor closes them.
    pub(crate) fn untrack(&self, path: &Utf8Path) -> Vec<File> {
        let keys: Vec<Utf8PathBuf> = {
            let mut files = self.files();
            let keys: Vec<_> = files
                .iter()
                .filter(|key| key.starts_with(path) && !self.store.is_open(key))
                .cloned()
                .collect();
            for key in &keys {
                files.remove(key);
            }
            keys
        };

        let mut removed: Vec<File> = keys.iter().filter_map(|key| self.store.remove(key)).collect();
        if !self.store.is_open(path) {
            if let Some(file) = self.store.remove(path) {
                removed.push(file);
            }
        }
        removed
    }

    /// Location of `path` inside the mirror tree.
    #[must_use]
    pub fn mirror_path(&self, path: &Utf8Path) -> Utf8PathBuf {
        self.mirror.path_for(&relative_to(path, &self.root))
    }

    pub(crate) fn is_config_file(path: &Utf8Path) -> bool {
        path.file_name() == Some(CONFIG_FILE_NAME)
    }

    /// Re-read the project config from the store entry of
    /// `<root>/.faustcfg.json`.
    pub(crate) fn load_config(&self) {
        let config_path = self.root.join(CONFIG_FILE_NAME);
        let content = self.store.get(&config_path).map(|file| file.content().clone());

        let config = ProjectConfig::load(content.as_deref(), || {
            self.tracked_files()
                .iter()
                .filter(|path| path.extension() == Some("dsp"))
                .map(|path| relative_to(path, &self.root))
                .collect()
        });
        tracing::debug!(root = %self.root, ?config, "Loaded project config");

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

    pub(crate) fn reload_config(&self) {
        tracing::info!(root = %self.root, "Project config changed, reloading");
        self.load_config();
        self.rediagnose_all();
    }

    /// Syntax-check `path`, then compile the workspace's process files.
    pub fn diagnose_file(&self, path: &Utf8Path) {
        if !self.diagnostics.syntax(&self.store, path) {
            return;
        }
        self.run_compiler();
    }

    /// Syntax-check every tracked Faust file, then compile once.
    pub fn rediagnose_all(&self) {
        for path in self.tracked_files() {
            self.diagnostics.syntax(&self.store, &path);
        }
        self.run_compiler();
    }

    pub(crate) fn run_compiler(&self) {
        let config = self.config();
        self.diagnostics
            .compiler(&self.store, &self.root, self.mirror.dir(), &config);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use camino::Utf8PathBuf;
    use faustls_source::PositionEncoding;
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tower_lsp_server::ls_types::PublishDiagnosticsParams;

    use super::*;
    use crate::diagnostics::testing::FakeSyntax;
    use crate::diagnostics::testing::RecordingCompiler;
    use crate::watcher::WatchDirs;

    /// Directories the handlers asked to watch.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingWatch(pub(crate) Arc<Mutex<Vec<Utf8PathBuf>>>);

    impl RecordingWatch {
        pub(crate) fn watched(&self) -> Vec<Utf8PathBuf> {
            self.0.lock().unwrap().clone()
        }
    }

    impl WatchDirs for RecordingWatch {
        fn watch_dir(&mut self, path: &Utf8Path) {
            self.0.lock().unwrap().push(path.to_path_buf());
        }
    }

    pub(crate) struct Fixture {
        _project: TempDir,
        _mirror: TempDir,
        pub(crate) root: Utf8PathBuf,
        pub(crate) mirror_root: Utf8PathBuf,
        pub(crate) store: Arc<FileStore>,
        pub(crate) compiler: Arc<RecordingCompiler>,
        pub(crate) published: UnboundedReceiver<PublishDiagnosticsParams>,
        pub(crate) diagnostics: Diagnostics,
    }

    impl Fixture {
        /// A project directory named `synth` holding `files`.
        pub(crate) fn new(files: &[(&str, &str)]) -> Self {
            let project = tempfile::tempdir().unwrap();
            let mirror = tempfile::tempdir().unwrap();
            let root = Utf8PathBuf::from_path_buf(project.path().join("synth"))
                .unwrap();
            std::fs::create_dir_all(&root).unwrap();
            let root = canonicalize(&root).unwrap();
            for (name, content) in files {
                let path = root.join(name);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, content).unwrap();
            }

            let compiler = Arc::new(RecordingCompiler::default());
            let (tx, published) = mpsc::unbounded_channel();
            let diagnostics = Diagnostics::new(Arc::new(FakeSyntax), compiler.clone(), tx);

            Self {
                mirror_root: Utf8PathBuf::from_path_buf(mirror.path().to_path_buf()).unwrap(),
                _project: project,
                _mirror: mirror,
                root,
                store: Arc::new(FileStore::new(PositionEncoding::Utf16)),
                compiler,
                published,
                diagnostics,
            }
        }

        pub(crate) fn workspace(&self) -> Arc<Workspace> {
            Workspace::create(
                &self.root,
                &self.mirror_root,
                self.store.clone(),
                self.diagnostics.clone(),
            )
            .unwrap()
        }

        pub(crate) fn path(&self, relative: &str) -> Utf8PathBuf {
            self.root.join(relative)
        }

        pub(crate) fn mirror_path(&self, relative: &str) -> Utf8PathBuf {
            self.mirror_root.join("synth").join(relative)
        }

        pub(crate) fn drain_published(&mut self) -> Vec<PublishDiagnosticsParams> {
            let mut published = Vec::new();
            while let Ok(params) = self.published.try_recv() {
                published.push(params);
            }
            published
        }
    }
}
