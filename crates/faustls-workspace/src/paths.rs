//! Conversions between `file://` URIs and filesystem paths.

use camino::Utf8Path;
use camino::Utf8PathBuf;
use percent_encoding::percent_decode_str;
use percent_encoding::utf8_percent_encode;
use percent_encoding::AsciiSet;
use percent_encoding::CONTROLS;
use tower_lsp_server::ls_types::Uri;

/// Characters escaped in the path component of a `file://` URI.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Build the `file://` URI of an absolute path.
#[must_use]
pub fn path_to_uri(path: &Utf8Path) -> Option<Uri> {
    #[cfg(windows)]
    let path = format!("/{}", path.as_str().replace('\\', "/"));
    #[cfg(windows)]
    let path = path.as_str();
    #[cfg(not(windows))]
    let path = path.as_str();

    let encoded = utf8_percent_encode(path, PATH);
    format!("file://{encoded}").parse().ok()
}

/// Convert a `file://` URI into an absolute path.
///
/// Returns `None` for any other scheme.
#[must_use]
pub fn uri_to_path(uri: &Uri) -> Option<Utf8PathBuf> {
    let encoded = uri.as_str().strip_prefix("file://")?;
    let decoded = percent_decode_str(encoded).decode_utf8().ok()?;

    #[cfg(windows)]
    let decoded = {
        // Remove leading '/' for paths like /C:/...
        decoded.strip_prefix('/').unwrap_or(&decoded).to_string()
    };

    Some(Utf8PathBuf::from(decoded.to_string()))
}

/// Canonicalize `path`, without the `\\?\` prefix on Windows.
pub fn canonicalize(path: &Utf8Path) -> std::io::Result<Utf8PathBuf> {
    let canonical = path.as_std_path().canonicalize()?;
    #[cfg(windows)]
    let canonical = dunce::simplified(&canonical).to_path_buf();
    Utf8PathBuf::from_path_buf(canonical)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "non-UTF-8 path"))
}

/// `path` relative to `root`, or an empty path when `root` is empty or is not
/// a prefix of `path`.
#[must_use]
pub fn relative_to(path: &Utf8Path, root: &Utf8Path) -> Utf8PathBuf {
    if root.as_str().is_empty() {
        return Utf8PathBuf::new();
    }
    path.strip_prefix(root)
        .map(Utf8Path::to_path_buf)
        .unwrap_or_default()
}
