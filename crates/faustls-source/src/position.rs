use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// The unit in which editor positions count characters within a line.
///
/// Negotiated with the client at initialization. UTF-16 is the protocol
/// default and what every client supports.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[default]
    #[serde(rename = "utf-16")]
    Utf16,
    #[serde(rename = "utf-32")]
    Utf32,
}

impl PositionEncoding {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PositionEncoding::Utf8 => "utf-8",
            PositionEncoding::Utf16 => "utf-16",
            PositionEncoding::Utf32 => "utf-32",
        }
    }

    /// Number of code units `c` occupies in this encoding.
    ///
    /// Characters outside the Basic Multilingual Plane are a surrogate pair
    /// (two units) in UTF-16 and a single unit in UTF-32.
    #[must_use]
    pub fn units(self, c: char) -> u32 {
        let units = match self {
            PositionEncoding::Utf8 => c.len_utf8(),
            PositionEncoding::Utf16 => c.len_utf16(),
            PositionEncoding::Utf32 => 1,
        };
        u32::try_from(units).unwrap_or(1)
    }
}

impl fmt::Display for PositionEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionEncoding {
    type Err = PositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "utf-8" => Ok(PositionEncoding::Utf8),
            "utf-16" => Ok(PositionEncoding::Utf16),
            "utf-32" => Ok(PositionEncoding::Utf32),
            other => Err(PositionError::UnknownEncoding(other.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PositionError {
    #[error("line {line} is out of range for a document with {line_count} lines")]
    LineOutOfRange { line: u32, line_count: usize },
    #[error("unknown position encoding '{0}'")]
    UnknownEncoding(String),
}

/// A line and column position within a text document.
///
/// The column is measured in the units of whatever [`PositionEncoding`] the
/// position was produced under.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineCol {
    line: u32,
    column: u32,
}

impl LineCol {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[must_use]
    pub fn column(&self) -> u32 {
        self.column
    }
}

/// Pre-computed line start byte offsets for a piece of text.
///
/// Position to offset conversion jumps straight to the line start and only
/// walks the characters of that one line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    length: usize,
}

impl LineIndex {
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, byte)| *byte == b'\n')
                .map(|(i, _)| i + 1),
        );

        Self {
            line_starts,
            length: text.len(),
        }
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    #[must_use]
    pub fn line_starts(&self) -> &[usize] {
        &self.line_starts
    }

    /// Byte offset where the content of `line` ends, excluding its newline.
    fn line_content_end(&self, line: usize) -> usize {
        self.line_starts
            .get(line + 1)
            .map_or(self.length, |next| next.saturating_sub(1))
    }

    /// Convert a position into a byte offset of `text`.
    ///
    /// A line equal to the line count addresses the end of the document. A
    /// column past the end of its line stops at the line end, and a column
    /// landing inside a multi-unit character rounds forward past it.
    pub fn offset(
        &self,
        position: LineCol,
        text: &str,
        encoding: PositionEncoding,
    ) -> Result<usize, PositionError> {
        if text.is_empty() {
            return Ok(0);
        }

        let line = position.line() as usize;
        let line_count = self.line_count();
        if line > line_count {
            return Err(PositionError::LineOutOfRange {
                line: position.line(),
                line_count,
            });
        }
        if line == line_count {
            return Ok(text.len());
        }

        let line_start = self.line_starts[line];
        let line_end = self.line_content_end(line);
        let Some(line_text) = text.get(line_start..line_end) else {
            return Ok(text.len());
        };

        let mut offset = line_start;
        let mut units = 0;
        for c in line_text.chars() {
            if units >= position.column() {
                break;
            }
            units += encoding.units(c);
            offset += c.len_utf8();
        }

        Ok(offset)
    }

    /// Like [`LineIndex::offset`], but out-of-range lines resolve to the end
    /// of the document instead of failing.
    #[must_use]
    pub fn offset_clamped(&self, position: LineCol, text: &str, encoding: PositionEncoding) -> usize {
        self.offset(position, text, encoding)
            .unwrap_or(text.len())
    }

    /// Convert a byte offset of `text` into a position.
    #[must_use]
    pub fn position(&self, offset: usize, text: &str, encoding: PositionEncoding) -> LineCol {
        if text.is_empty() || offset == 0 {
            return LineCol::new(0, 0);
        }

        let offset = offset.min(text.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };
        let line_start = self.line_starts[line];

        let column = text
            .get(line_start..)
            .unwrap_or_default()
            .char_indices()
            .take_while(|(i, _)| line_start + i < offset)
            .map(|(_, c)| encoding.units(c))
            .sum();

        LineCol::new(u32::try_from(line).unwrap_or(u32::MAX), column)
    }

    /// Position of the very end of the document.
    #[must_use]
    pub fn end_position(&self, text: &str, encoding: PositionEncoding) -> LineCol {
        self.position(text.len(), text, encoding)
    }
}

/// Replace the range `[start, end)` of `text` with `new_text`.
///
/// Both positions are resolved against the unmodified `text`. Positions
/// beyond the last line resolve to the end of the document, and a reversed
/// range is treated as if its endpoints were swapped.
#[must_use]
pub fn apply_change(
    text: &str,
    start: LineCol,
    end: LineCol,
    new_text: &str,
    encoding: PositionEncoding,
) -> String {
    let index = LineIndex::from_text(text);
    let start = index.offset_clamped(start, text, encoding);
    let end = index.offset_clamped(end, text, encoding);
    let (start, end) = if start <= end { (start, end) } else { (end, start) };

    let mut result = String::with_capacity(text.len() - (end - start) + new_text.len());
    result.push_str(&text[..start]);
    result.push_str(new_text);
    result.push_str(&text[end..]);
    result
}
