use std::fs;

use camino::Utf8Path;

use crate::mirror::permissions;
use crate::walk::walk_tree;
use crate::watcher::DiskEvent;
use crate::watcher::DiskEventKind;
use crate::watcher::WatchDirs;
use crate::workspace::Workspace;

impl Workspace {
    /// Apply one filesystem change to the store, the scoped map and the
    /// mirror tree.
    ///
    /// Events for files an editor currently owns are dropped: the editor
    /// buffer is authoritative until the file is closed.
    pub(crate) fn handle_disk_event(&self, event: DiskEvent, watch: &mut dyn WatchDirs) {
        let DiskEvent {
            path,
            kind,
            renamed_from,
        } = event;

        if self.store().is_open(&path) {
            tracing::debug!(%path, ?kind, "Ignoring disk event for open file");
            return;
        }
        tracing::debug!(%path, ?kind, ?renamed_from, "Disk event");

        match (kind, renamed_from.as_deref()) {
            (DiskEventKind::Create, Some(from)) => self.disk_renamed(from, &path, watch),
            (DiskEventKind::Create, None) => self.disk_created(&path, watch),
            (DiskEventKind::Write, _) => self.disk_written(&path),
            (DiskEventKind::Remove, _) => self.disk_removed(&path),
        }

        let config_touched = Self::is_config_file(&path)
            || renamed_from.as_deref().is_some_and(Self::is_config_file);
        if config_touched {
            self.reload_config();
        }
    }

    fn disk_created(&self, path: &Utf8Path, watch: &mut dyn WatchDirs) {
        let Ok(metadata) = fs::metadata(path) else {
            tracing::debug!(%path, "Created path no longer exists");
            return;
        };

        if metadata.is_dir() {
            self.track_dir(path, watch);
            return;
        }

        self.track_file(path);
        let mirror_path = self.mirror_path(path);
        if let Err(err) = self
            .mirror()
            .ensure_parent(&mirror_path)
            .and_then(|()| {
                self.mirror()
                    .create_empty_file(&mirror_path, Some(metadata.permissions()))
            })
        {
            tracing::error!(%path, error = %err, "Failed to create mirror file");
            return;
        }
        self.sync_mirror(path);
        self.diagnose_file(path);
    }

    fn disk_renamed(&self, from: &Utf8Path, to: &Utf8Path, watch: &mut dyn WatchDirs) {
        if !to.exists() {
            tracing::debug!(%from, %to, "Rename target no longer exists");
            return;
        }

        let from_mirror = self.mirror_path(from);
        if from_mirror.exists() {
            if let Err(err) = self.mirror().rename(&from_mirror, &self.mirror_path(to)) {
                tracing::error!(%from, %to, error = %err, "Failed to rename mirror entry");
            }
        }

        for file in self.untrack(from) {
            self.diagnostics().clear(&file);
        }

        if to.is_dir() {
            self.track_dir(to, watch);
        } else {
            self.track_file(to);
            self.sync_mirror(to);
            self.diagnose_file(to);
        }
        self.resync_open_under(from);
    }

    fn disk_removed(&self, path: &Utf8Path) {
        for file in self.untrack(path) {
            tracing::debug!(path = %file.path(), "Untracked removed file");
            self.diagnostics().clear(&file);
        }
        if let Err(err) = self.mirror().remove(&self.mirror_path(path)) {
            tracing::error!(%path, error = %err, "Failed to remove mirror entry");
        }
        self.resync_open_under(path);
        self.run_compiler();
    }

    fn disk_written(&self, path: &Utf8Path) {
        if path.is_dir() {
            return;
        }
        let content = match fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                tracing::debug!(%path, error = %err, "Written file could not be read");
                return;
            }
        };

        // A write can arrive for a file whose creation was never reported.
        if !self.store().contains(path) {
            self.track_file(path);
        }

        if let Err(err) = self.mirror().write(&self.mirror_path(path), content.as_bytes()) {
            tracing::error!(%path, error = %err, "Failed to write mirror file");
        }
        if self.store().modify_full(path, &content).is_ok() {
            self.diagnose_file(path);
        }
    }

    /// Open `path` into the store and the scoped map.
    ///
    /// A record that already exists and is not editor-open is re-read from
    /// disk.
    fn track_file(&self, path: &Utf8Path) {
        let mirror_path = self.mirror_path(path);
        let inserted = self
            .store()
            .open_from_path(path, self.root(), false, None, mirror_path);
        if !inserted && !self.store().is_open(path) {
            let _ = self.store().reload_from_disk(path);
        }
        self.add_file(path);
    }

    /// Mirror, watch and track a directory that appeared with its contents.
    fn track_dir(&self, dir: &Utf8Path, watch: &mut dyn WatchDirs) {
        let tree = walk_tree(dir);

        for sub in &tree.dirs {
            let created = permissions(sub)
                .and_then(|perms| self.mirror().create_dir(&self.mirror_path(sub), perms));
            if let Err(err) = created {
                tracing::error!(path = %sub, error = %err, "Failed to mirror directory");
            }
            watch.watch_dir(sub);
        }

        for file in &tree.files {
            self.track_file(file);
            self.sync_mirror(file);
            self.diagnostics().syntax(self.store(), file);
        }
        if !tree.files.is_empty() {
            self.run_compiler();
        }
    }

    /// Rewrite the mirror files of editor-open files under `path`, which
    /// survive a removal or rename of their directory.
    fn resync_open_under(&self, path: &Utf8Path) {
        for file in self.tracked_files() {
            if file.starts_with(path) && self.store().is_open(&file) {
                self.sync_mirror(&file);
            }
        }
    }

    /// Copy the store content of `path` into its mirror file.
    fn sync_mirror(&self, path: &Utf8Path) {
        let Some(file) = self.store().get(path) else {
            return;
        };
        if let Err(err) = self
            .mirror()
            .write(&self.mirror_path(path), file.content().as_bytes())
        {
            tracing::error!(%path, error = %err, "Failed to write mirror file");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::workspace::testing::Fixture;
    use crate::workspace::testing::RecordingWatch;

    #[test]
    fn test_write_updates_store_mirror_and_diagnostics() {
        let mut fx = Fixture::new(&[("a.dsp", "process = +;")]);
        let ws = fx.workspace();
        fx.drain_published();

        let path = fx.path("a.dsp");
        fs::write(&path, "process = ERROR;").unwrap();
        ws.handle_disk_event(DiskEvent::written(&path), &mut RecordingWatch::default());

        assert_eq!(
            fx.store.get(&path).unwrap().content().as_ref(),
            "process = ERROR;"
        );
        assert_eq!(
            fs::read_to_string(fx.mirror_path("a.dsp")).unwrap(),
            "process = ERROR;"
        );
        let published = fx.drain_published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].diagnostics.len(), 1);
    }

    #[test]
    fn test_write_for_open_file_is_ignored() {
        let fx = Fixture::new(&[("a.dsp", "process = +;")]);
        let ws = fx.workspace();

        let path = fx.path("a.dsp");
        fx.store.reopen(&path).unwrap();
        fx.store.modify_full(&path, "process = *;").unwrap();
        fs::write(&path, "process = -;").unwrap();

        ws.handle_disk_event(DiskEvent::written(&path), &mut RecordingWatch::default());

        assert_eq!(fx.store.get(&path).unwrap().content().as_ref(), "process = *;");
        assert_eq!(
            fs::read_to_string(fx.mirror_path("a.dsp")).unwrap(),
            "process = +;"
        );
    }

    #[test]
    fn test_remove_untracks_and_deletes_mirror() {
        let mut fx = Fixture::new(&[("a.dsp", "process = +;")]);
        let ws = fx.workspace();
        fx.drain_published();

        let path = fx.path("a.dsp");
        fs::remove_file(&path).unwrap();
        ws.handle_disk_event(DiskEvent::removed(&path), &mut RecordingWatch::default());

        assert!(!fx.store.contains(&path));
        assert!(!ws.contains(&path));
        assert!(!fx.mirror_path("a.dsp").exists());
        let published = fx.drain_published();
        assert_eq!(published.len(), 1);
        assert!(published[0].diagnostics.is_empty());
    }

    #[test]
    fn test_remove_directory_untracks_children() {
        let fx = Fixture::new(&[("sub/a.dsp", ""), ("sub/b.lib", ""), ("c.dsp", "")]);
        let ws = fx.workspace();

        let dir = fx.path("sub");
        fs::remove_dir_all(&dir).unwrap();
        ws.handle_disk_event(DiskEvent::removed(&dir), &mut RecordingWatch::default());

        assert_eq!(ws.tracked_files(), vec![fx.path("c.dsp")]);
        assert!(!fx.mirror_path("sub").exists());
    }

    #[test]
    fn test_create_file() {
        let fx = Fixture::new(&[]);
        let ws = fx.workspace();

        let path = fx.path("new.dsp");
        fs::write(&path, "process = _;").unwrap();
        ws.handle_disk_event(DiskEvent::created(&path), &mut RecordingWatch::default());

        assert!(ws.contains(&path));
        let file = fx.store.get(&path).unwrap();
        assert_eq!(file.content().as_ref(), "process = _;");
        assert_eq!(file.relative_path(), "new.dsp");
        assert!(fx.mirror_path("new.dsp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_create_file_copies_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new(&[]);
        let ws = fx.workspace();

        let path = fx.path("x.lib");
        fs::write(&path, "").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        ws.handle_disk_event(DiskEvent::created(&path), &mut RecordingWatch::default());

        let mode = fs::metadata(fx.mirror_path("x.lib")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn test_create_vanished_path_is_skipped() {
        let fx = Fixture::new(&[]);
        let ws = fx.workspace();

        let path = fx.path("gone.dsp");
        ws.handle_disk_event(DiskEvent::created(&path), &mut RecordingWatch::default());

        assert!(!fx.store.contains(&path));
        assert!(!fx.mirror_path("gone.dsp").exists());
    }

    #[test]
    fn test_create_directory_is_watched_and_mirrored() {
        let fx = Fixture::new(&[]);
        let ws = fx.workspace();
        let watch = RecordingWatch::default();

        let dir = fx.path("libs");
        fs::create_dir_all(dir.join("inner")).unwrap();
        fs::write(dir.join("inner/f.lib"), "f = _;").unwrap();
        ws.handle_disk_event(DiskEvent::created(&dir), &mut watch.clone());

        assert_eq!(watch.watched(), vec![dir.clone(), dir.join("inner")]);
        assert!(fx.mirror_path("libs/inner").is_dir());
        assert_eq!(
            fs::read_to_string(fx.mirror_path("libs/inner/f.lib")).unwrap(),
            "f = _;"
        );
        assert!(ws.contains(&dir.join("inner/f.lib")));
    }

    #[test]
    fn test_rename_moves_record_and_mirror() {
        let mut fx = Fixture::new(&[("a.dsp", "process = +;")]);
        let ws = fx.workspace();
        fx.drain_published();

        let from = fx.path("a.dsp");
        let to = fx.path("b.dsp");
        fs::rename(&from, &to).unwrap();
        ws.handle_disk_event(DiskEvent::renamed(&from, &to), &mut RecordingWatch::default());

        assert!(!fx.store.contains(&from));
        assert!(!ws.contains(&from));
        assert!(ws.contains(&to));
        let file = fx.store.get(&to).unwrap();
        assert_eq!(file.content().as_ref(), "process = +;");
        assert_eq!(file.relative_path(), "b.dsp");
        assert!(!fx.mirror_path("a.dsp").exists());
        assert_eq!(
            fs::read_to_string(fx.mirror_path("b.dsp")).unwrap(),
            "process = +;"
        );

        let cleared: Vec<_> = fx
            .drain_published()
            .into_iter()
            .filter(|params| params.uri.as_str().ends_with("/a.dsp"))
            .collect();
        assert_eq!(cleared.len(), 1);
        assert!(cleared[0].diagnostics.is_empty());
    }

    #[test]
    fn test_rename_directory() {
        let fx = Fixture::new(&[("old/a.dsp", "process = +;")]);
        let ws = fx.workspace();
        let watch = RecordingWatch::default();

        let from = fx.path("old");
        let to = fx.path("new");
        fs::rename(&from, &to).unwrap();
        ws.handle_disk_event(DiskEvent::renamed(&from, &to), &mut watch.clone());

        assert_eq!(ws.tracked_files(), vec![to.join("a.dsp")]);
        assert_eq!(watch.watched(), vec![to.clone()]);
        assert_eq!(
            fs::read_to_string(fx.mirror_path("new/a.dsp")).unwrap(),
            "process = +;"
        );
        assert!(!fx.mirror_path("old").exists());
    }

    #[test]
    fn test_rename_over_tracked_file_refreshes_content() {
        let fx = Fixture::new(&[("a.dsp", "process = +;")]);
        let ws = fx.workspace();

        let path = fx.path("a.dsp");
        let tmp = fx.path(".a.dsp.swp");
        fs::write(&tmp, "process = -;").unwrap();
        fs::rename(&tmp, &path).unwrap();
        ws.handle_disk_event(DiskEvent::renamed(&tmp, &path), &mut RecordingWatch::default());

        assert_eq!(fx.store.get(&path).unwrap().content().as_ref(), "process = -;");
        assert_eq!(
            fs::read_to_string(fx.mirror_path("a.dsp")).unwrap(),
            "process = -;"
        );
        assert!(!fx.store.contains(&tmp));
    }

    #[test]
    fn test_split_rename_over_tracked_file_refreshes_content() {
        let fx = Fixture::new(&[("a.dsp", "process = +;")]);
        let ws = fx.workspace();
        let mut watch = RecordingWatch::default();

        let path = fx.path("a.dsp");
        let tmp = fx.path("a.dsp.tmp");
        fs::write(&tmp, "process = -;").unwrap();
        ws.handle_disk_event(DiskEvent::created(&tmp), &mut watch);
        assert!(ws.contains(&tmp));

        fs::rename(&tmp, &path).unwrap();
        ws.handle_disk_event(DiskEvent::removed(&tmp), &mut watch);
        ws.handle_disk_event(DiskEvent::created(&path), &mut watch);
        ws.handle_disk_event(DiskEvent::renamed(&tmp, &path), &mut watch);

        assert_eq!(fx.store.get(&path).unwrap().content().as_ref(), "process = -;");
        assert_eq!(
            fs::read_to_string(fx.mirror_path("a.dsp")).unwrap(),
            "process = -;"
        );
        assert!(!fx.store.contains(&tmp));
        assert!(!ws.contains(&tmp));
        assert!(!fx.mirror_path("a.dsp.tmp").exists());
    }

    #[test]
    fn test_create_over_tracked_file_refreshes_content() {
        let fx = Fixture::new(&[("a.dsp", "process = +;")]);
        let ws = fx.workspace();

        let path = fx.path("a.dsp");
        fs::write(&path, "process = *;").unwrap();
        ws.handle_disk_event(DiskEvent::created(&path), &mut RecordingWatch::default());

        assert_eq!(fx.store.get(&path).unwrap().content().as_ref(), "process = *;");
        assert_eq!(
            fs::read_to_string(fx.mirror_path("a.dsp")).unwrap(),
            "process = *;"
        );
    }

    #[test]
    fn test_remove_directory_keeps_open_files() {
        let fx = Fixture::new(&[("sub/a.dsp", "process = +;"), ("sub/b.dsp", "")]);
        let ws = fx.workspace();

        let open = fx.path("sub/a.dsp");
        fx.store.reopen(&open).unwrap();
        fx.store.modify_full(&open, "unsaved").unwrap();

        let dir = fx.path("sub");
        fs::remove_dir_all(&dir).unwrap();
        ws.handle_disk_event(DiskEvent::removed(&dir), &mut RecordingWatch::default());

        assert_eq!(ws.tracked_files(), vec![open.clone()]);
        let file = fx.store.get(&open).unwrap();
        assert!(file.is_open());
        assert_eq!(file.content().as_ref(), "unsaved");
        assert!(!fx.store.contains(&fx.path("sub/b.dsp")));
        assert_eq!(
            fs::read_to_string(fx.mirror_path("sub/a.dsp")).unwrap(),
            "unsaved"
        );
        assert!(!fx.mirror_path("sub/b.dsp").exists());
    }

    #[test]
    fn test_rename_directory_keeps_open_files() {
        let fx = Fixture::new(&[("old/a.dsp", "process = +;")]);
        let ws = fx.workspace();

        let open = fx.path("old/a.dsp");
        fx.store.reopen(&open).unwrap();
        fx.store.modify_full(&open, "unsaved").unwrap();

        let from = fx.path("old");
        let to = fx.path("new");
        fs::rename(&from, &to).unwrap();
        ws.handle_disk_event(DiskEvent::renamed(&from, &to), &mut RecordingWatch::default());

        assert_eq!(ws.tracked_files(), vec![to.join("a.dsp"), open.clone()]);
        assert!(fx.store.is_open(&open));
        assert_eq!(
            fs::read_to_string(fx.mirror_path("old/a.dsp")).unwrap(),
            "unsaved"
        );
        assert_eq!(
            fs::read_to_string(fx.mirror_path("new/a.dsp")).unwrap(),
            "process = +;"
        );
    }

    #[test]
    fn test_write_for_vanished_file_is_skipped() {
        let mut fx = Fixture::new(&[("a.dsp", "process = +;")]);
        let ws = fx.workspace();
        fx.drain_published();

        let gone = fx.path("gone.dsp");
        ws.handle_disk_event(DiskEvent::written(&gone), &mut RecordingWatch::default());

        assert!(!fx.store.contains(&gone));
        assert!(!ws.contains(&gone));
        assert!(fx.drain_published().is_empty());
    }

    #[test]
    fn test_config_change_reloads() {
        let fx = Fixture::new(&[("a.dsp", "process = +;"), ("b.dsp", "process = -;")]);
        let ws = fx.workspace();
        assert!(ws.config().compiler_diagnostics);
        let compiled_before = fx.compiler.compiled().len();

        let config = fx.path(".faustcfg.json");
        fs::write(
            &config,
            r#"{"process_files":["a.dsp"],"compiler_diagnostics":false}"#,
        )
        .unwrap();
        ws.handle_disk_event(DiskEvent::created(&config), &mut RecordingWatch::default());

        let loaded = ws.config();
        assert!(!loaded.compiler_diagnostics);
        assert_eq!(loaded.process_files, vec![Utf8PathBuf::from("a.dsp")]);

        fs::write(fx.path("a.dsp"), "process = *;").unwrap();
        ws.handle_disk_event(DiskEvent::written(fx.path("a.dsp")), &mut RecordingWatch::default());
        assert_eq!(fx.compiler.compiled().len(), compiled_before);
    }
}
