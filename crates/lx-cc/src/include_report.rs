//! Parser for the compiler's include report
//!
//! In include-listing mode the preprocessor emits one line per file it
//! opens:
//!
//! ```text
//! Note: including file: C:\project\geometry.h
//! Note: including file:  C:\project\detail\simd.h
//! ```
//!
//! Nested includes are indented with extra spaces after the marker, so
//! the remainder is trimmed before use. Every other line on the stream is
//! compiler chatter and is ignored.
//!
//! Paths are returned as the compiler printed them. Canonicalization and
//! project-root filtering are the tracker's business, not the parser's.

use std::collections::HashSet;

/// Marker prefix carried by every include-report line
pub const INCLUDE_PREFIX: &str = "Note: including file: ";

/// Extract the reported path from a single line, if it is one.
pub fn included_file(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(INCLUDE_PREFIX)?.trim();
    (!rest.is_empty()).then_some(rest)
}

/// Collect every reported path from a line stream.
///
/// Deduplicated, first-seen order preserved. A header pulled in by several
/// translation units of the same source shows up once.
pub fn included_files<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    lines
        .filter_map(included_file)
        .filter(|path| seen.insert(*path))
        .collect()
}
