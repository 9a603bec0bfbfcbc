use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A fragment of a source file. Lines are 1-based, columns are 0-based byte
/// offsets within their line, and the end position is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub file: Utf8PathBuf,
    pub line_nr: usize,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Location {
    pub fn new(
        file: impl Into<Utf8PathBuf>,
        (start_line, start_column): (usize, usize),
        (end_line, end_column): (usize, usize),
    ) -> Self {
        Self {
            file: file.into(),
            line_nr: start_line,
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    pub fn nr_lines(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    pub fn contains_line(&self, line: usize) -> bool {
        line >= self.start_line && line <= self.end_line
    }

    /// Byte range of this location within `source`, if it fits.
    pub fn byte_range(&self, source: &str) -> Option<(usize, usize)> {
        let start = byte_offset(source, self.start_line, self.start_column)?;
        let end = byte_offset(source, self.end_line, self.end_column)?;
        (start <= end).then_some((start, end))
    }
}

fn byte_offset(source: &str, line: usize, column: usize) -> Option<usize> {
    if line == 0 {
        return None;
    }
    let mut line_start = 0;
    for _ in 1..line {
        line_start += source[line_start..].find('\n')? + 1;
    }
    let line_len = source[line_start..].find('\n').unwrap_or(source.len() - line_start);
    if column > line_len {
        return None;
    }
    let offset = line_start + column;
    source.is_char_boundary(offset).then_some(offset)
}

/// Replace the fragment at `location` with `replacement`.
pub fn splice(source: &str, location: &Location, replacement: &str) -> Option<String> {
    let (start, end) = location.byte_range(source)?;
    let mut result = String::with_capacity(source.len() + replacement.len());
    result.push_str(&source[..start]);
    result.push_str(replacement);
    result.push_str(&source[end..]);
    Some(result)
}

/// The original text covered by `location`.
pub fn fragment<'a>(source: &'a str, location: &Location) -> Option<&'a str> {
    let (start, end) = location.byte_range(source)?;
    Some(&source[start..end])
}
