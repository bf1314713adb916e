use std::fs;
use std::fs::Permissions;
use std::io;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use thiserror::Error;

use crate::walk::walk_tree;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("failed to {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MirrorError {
    fn io<'a>(op: &'static str, path: &'a Utf8Path) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Private on-disk replica of one workspace, rooted at
/// `mirror_root/<workspace base name>`.
///
/// External tools (the Faust compiler) read this tree instead of the real
/// one, so it always reflects editor buffers rather than saved content.
#[derive(Clone, Debug)]
pub struct Mirror {
    dir: Utf8PathBuf,
}

impl Mirror {
    #[must_use]
    pub fn new(dir: Utf8PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn for_workspace(mirror_root: &Utf8Path, workspace_root: &Utf8Path) -> Self {
        let folder = workspace_root.file_name().unwrap_or("workspace");
        Self::new(mirror_root.join(folder))
    }

    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Mirror location of a workspace-relative path.
    #[must_use]
    pub fn path_for(&self, relative: &Utf8Path) -> Utf8PathBuf {
        if relative.as_str().is_empty() {
            self.dir.clone()
        } else {
            self.dir.join(relative)
        }
    }

    /// Copy the whole tree under `source` into the mirror directory,
    /// preserving permission bits.
    ///
    /// A directory or file that cannot be copied is logged and skipped; the
    /// rest of the tree is still mirrored. Returns the number of failures.
    #[must_use]
    pub fn replicate(&self, source: &Utf8Path) -> usize {
        let tree = walk_tree(source);
        let mut failures = 0;
        for dir in &tree.dirs {
            let relative = dir.strip_prefix(source).unwrap_or(Utf8Path::new(""));
            let created =
                permissions(dir).and_then(|perms| self.create_dir(&self.path_for(relative), perms));
            if let Err(err) = created {
                tracing::error!(path = %dir, error = %err, "Failed to mirror directory");
                failures += 1;
            }
        }
        for file in &tree.files {
            let relative = file.strip_prefix(source).unwrap_or(Utf8Path::new(""));
            let target = self.path_for(relative);
            if let Err(err) = fs::copy(file, &target) {
                tracing::error!(path = %file, %target, error = %err, "Failed to mirror file");
                failures += 1;
            }
        }
        tracing::debug!(
            %source,
            mirror = %self.dir,
            files = tree.files.len(),
            failures,
            "Replicated workspace"
        );
        failures
    }

    /// Create (or truncate) an empty file carrying `perms`.
    pub fn create_empty_file(
        &self,
        path: &Utf8Path,
        perms: Option<Permissions>,
    ) -> Result<(), MirrorError> {
        fs::write(path, b"").map_err(MirrorError::io("create", path))?;
        if let Some(perms) = perms {
            fs::set_permissions(path, perms).map_err(MirrorError::io("set permissions on", path))?;
        }
        Ok(())
    }

    /// Create a directory and any missing parents, applying `perms` to the
    /// leaf. An existing directory is not an error.
    pub fn create_dir(&self, path: &Utf8Path, perms: Permissions) -> Result<(), MirrorError> {
        fs::create_dir_all(path).map_err(MirrorError::io("create directory", path))?;
        fs::set_permissions(path, perms).map_err(MirrorError::io("set permissions on", path))
    }

    /// Overwrite a mirror file, creating missing parent directories.
    pub fn write(&self, path: &Utf8Path, content: &[u8]) -> Result<(), MirrorError> {
        self.ensure_parent(path)?;
        fs::write(path, content).map_err(MirrorError::io("write", path))
    }

    pub fn ensure_parent(&self, path: &Utf8Path) -> Result<(), MirrorError> {
        match path.parent() {
            Some(parent) if !parent.exists() => {
                fs::create_dir_all(parent).map_err(MirrorError::io("create directory", parent))
            }
            _ => Ok(()),
        }
    }

    /// Delete a mirror file or directory tree. A missing entry is not an
    /// error.
    pub fn remove(&self, path: &Utf8Path) -> Result<(), MirrorError> {
        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Err(err) if err.kind() != io::ErrorKind::NotFound => {
                Err(MirrorError::io("remove", path)(err))
            }
            _ => Ok(()),
        }
    }

    pub fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), MirrorError> {
        self.ensure_parent(to)?;
        fs::rename(from, to).map_err(MirrorError::io("rename", from))
    }
}

pub(crate) fn permissions(path: &Utf8Path) -> Result<Permissions, MirrorError> {
    fs::metadata(path)
        .map(|meta| meta.permissions())
        .map_err(MirrorError::io("stat", path))
}
