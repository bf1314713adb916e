use camino::Utf8Path;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum FileKind {
    /// A top-level compilable unit (`.dsp`)
    Dsp,
    /// A library unit pulled in with `import`/`library` (`.lib`)
    Lib,
    Other,
}

impl FileKind {
    /// Determine [`FileKind`] from a file path extension.
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Self {
        match path.extension() {
            Some("dsp") => FileKind::Dsp,
            Some("lib") => FileKind::Lib,
            _ => FileKind::Other,
        }
    }

    #[must_use]
    pub fn is_faust(self) -> bool {
        matches!(self, FileKind::Dsp | FileKind::Lib)
    }
}
