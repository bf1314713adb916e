use camino::Utf8PathBuf;
use faustls_source::LineCol;
use faustls_source::PositionEncoding;
use faustls_workspace::paths;
use tower_lsp_server::ls_types;

/// Negotiate the position encoding with the client.
///
/// Prefers UTF-8 > UTF-32 > UTF-16, falling back to UTF-16 when the client
/// advertises nothing we know.
#[must_use]
pub fn negotiate_position_encoding(params: &ls_types::InitializeParams) -> PositionEncoding {
    let client_encodings: &[ls_types::PositionEncodingKind] = params
        .capabilities
        .general
        .as_ref()
        .and_then(|general| general.position_encodings.as_ref())
        .map_or(&[], |encodings| encodings.as_slice());

    for preferred in [
        PositionEncoding::Utf8,
        PositionEncoding::Utf32,
        PositionEncoding::Utf16,
    ] {
        if client_encodings
            .iter()
            .any(|kind| kind.to_position_encoding() == Some(preferred))
        {
            return preferred;
        }
    }

    PositionEncoding::Utf16
}

pub trait PositionExt {
    fn to_line_col(&self) -> LineCol;
}

impl PositionExt for ls_types::Position {
    fn to_line_col(&self) -> LineCol {
        LineCol::new(self.line, self.character)
    }
}

pub trait PositionEncodingExt {
    fn to_lsp(&self) -> ls_types::PositionEncodingKind;
}

impl PositionEncodingExt for PositionEncoding {
    fn to_lsp(&self) -> ls_types::PositionEncodingKind {
        ls_types::PositionEncodingKind::new(self.as_str())
    }
}

pub trait PositionEncodingKindExt {
    fn to_position_encoding(&self) -> Option<PositionEncoding>;
}

impl PositionEncodingKindExt for ls_types::PositionEncodingKind {
    fn to_position_encoding(&self) -> Option<PositionEncoding> {
        self.as_str().parse().ok()
    }
}

pub trait UriExt {
    /// Convert a `file://` URI to `Utf8PathBuf`
    fn to_utf8_path_buf(&self) -> Option<Utf8PathBuf>;
}

impl UriExt for ls_types::Uri {
    fn to_utf8_path_buf(&self) -> Option<Utf8PathBuf> {
        let path = paths::uri_to_path(self);
        if path.is_none() {
            tracing::trace!("URI conversion to path failed for: {}", self.as_str());
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use tower_lsp_server::ls_types::ClientCapabilities;
    use tower_lsp_server::ls_types::GeneralClientCapabilities;

    use super::*;

    fn params_with(encodings: Option<Vec<&'static str>>) -> ls_types::InitializeParams {
        ls_types::InitializeParams {
            capabilities: ClientCapabilities {
                general: Some(GeneralClientCapabilities {
                    position_encodings: encodings.map(|encodings| {
                        encodings
                            .into_iter()
                            .map(ls_types::PositionEncodingKind::new)
                            .collect()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_lsp_type_conversions() {
        for encoding in [
            PositionEncoding::Utf8,
            PositionEncoding::Utf16,
            PositionEncoding::Utf32,
        ] {
            assert_eq!(encoding.to_lsp().to_position_encoding(), Some(encoding));
        }
        assert_eq!(PositionEncoding::Utf8.to_lsp().as_str(), "utf-8");
        assert_eq!(
            ls_types::PositionEncodingKind::new("unknown").to_position_encoding(),
            None
        );
    }

    #[test]
    fn test_negotiate_prefers_utf8_when_all_available() {
        let params = params_with(Some(vec!["utf-16", "utf-8", "utf-32"]));
        assert_eq!(negotiate_position_encoding(&params), PositionEncoding::Utf8);
    }

    #[test]
    fn test_negotiate_prefers_utf32_over_utf16() {
        let params = params_with(Some(vec!["utf-16", "utf-32"]));
        assert_eq!(negotiate_position_encoding(&params), PositionEncoding::Utf32);
    }

    #[test]
    fn test_negotiate_fallback() {
        assert_eq!(
            negotiate_position_encoding(&params_with(None)),
            PositionEncoding::Utf16
        );
        assert_eq!(
            negotiate_position_encoding(&params_with(Some(vec!["latin-1"]))),
            PositionEncoding::Utf16
        );
        assert_eq!(
            negotiate_position_encoding(&ls_types::InitializeParams::default()),
            PositionEncoding::Utf16
        );
    }

    #[test]
    fn test_position_to_line_col() {
        let position = ls_types::Position::new(3, 7);
        assert_eq!(position.to_line_col(), LineCol::new(3, 7));
    }

    #[test]
    fn test_non_file_uri_returns_none() {
        let uri = ls_types::Uri::from_str("untitled:Untitled-1").unwrap();
        assert!(uri.to_utf8_path_buf().is_none());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_uri_round_trip() {
        let path = camino::Utf8Path::new("/home/user/synth/main.dsp");
        let uri = paths::path_to_uri(path).unwrap();
        assert_eq!(uri.to_utf8_path_buf().unwrap(), path);
    }
}
