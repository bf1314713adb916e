use camino::Utf8Path;
use camino::Utf8PathBuf;
use ignore::WalkBuilder;

/// Entries found under a workspace root.
///
/// Hidden entries are included and ignore files are not honored: the mirror
/// has to be a structural copy of the whole tree, `.faustcfg.json` included.
#[derive(Debug, Default)]
pub(crate) struct Tree {
    /// Directories, parents before children. Includes the root itself.
    pub(crate) dirs: Vec<Utf8PathBuf>,
    /// Regular files, sorted.
    pub(crate) files: Vec<Utf8PathBuf>,
}

pub(crate) fn walk_tree(root: &Utf8Path) -> Tree {
    let mut tree = Tree::default();

    let walker = WalkBuilder::new(root.as_std_path())
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(%root, error = %err, "Skipping unreadable entry");
                continue;
            }
        };
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.into_path()) else {
            tracing::warn!(%root, "Skipping non UTF-8 path");
            continue;
        };
        if path.is_dir() {
            tree.dirs.push(path);
        } else if path.is_file() {
            tree.files.push(path);
        }
    }

    tree.dirs.sort();
    tree.files.sort();
    tree
}
