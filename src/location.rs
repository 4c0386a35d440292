//! Source locations.
//!
//! A [`Location`] is a (file, line, column, byte-offset) tuple; a
//! [`LocationRange`] pairs two locations in the same file. Both are cheap to
//! copy and compare, and are threaded through every token and AST node for
//! error reporting.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// Identifies a loaded source file without borrowing from it.
///
/// Two handles compare equal iff they name the same file; comparing
/// handles from different `InputFile`s is a logic error callers must not
/// make (locations are only ever compared within one file).
#[derive(Debug, Clone)]
pub struct FileHandle(pub Rc<str>);

impl FileHandle {
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        FileHandle(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl PartialEq for FileHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}
impl Eq for FileHandle {}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single point in a source file.
#[derive(Debug, Clone)]
pub struct Location {
    pub file: FileHandle,
    pub line: u32,
    pub column: u32,
    pub byte: usize,
}

impl Location {
    pub fn new(file: FileHandle, line: u32, column: u32, byte: usize) -> Self {
        Self { file, line, column, byte }
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file && self.byte == other.byte
    }
}
impl Eq for Location {}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.file != other.file {
            return None;
        }
        Some(self.byte.cmp(&other.byte))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A half-open range `[begin, end)` within a single file.
#[derive(Debug, Clone)]
pub struct LocationRange {
    pub begin: Location,
    pub end: Location,
}

impl LocationRange {
    pub fn new(begin: Location, end: Location) -> Self {
        debug_assert_eq!(begin.file, end.file, "range spans two files");
        Self { begin, end }
    }

    /// A zero-width range at a single point, for synthetic/host-origin blame.
    pub fn point(loc: Location) -> Self {
        let end = loc.clone();
        Self { begin: loc, end }
    }

    pub fn file(&self) -> &FileHandle {
        &self.begin.file
    }

    /// True if both endpoints fall on the same source line.
    pub fn is_single_line(&self) -> bool {
        self.begin.line == self.end.line
    }

    /// Union of two ranges in the same file; used when merging a node's
    /// range into its container during comment attachment.
    pub fn union(&self, other: &LocationRange) -> LocationRange {
        let begin = if self.begin.byte <= other.begin.byte {
            self.begin.clone()
        } else {
            other.begin.clone()
        };
        let end = if self.end.byte >= other.end.byte {
            self.end.clone()
        } else {
            other.end.clone()
        };
        LocationRange::new(begin, end)
    }
}

impl fmt::Display for LocationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.begin)
    }
}

/// Immutable, fully loaded source file: owns the text and the byte offsets
/// needed to turn a byte position into a line/column pair.
///
/// Lifetime invariant (see spec): text outlives tokens outlives AST. In this
/// Rust port, an `InputFile` is constructed once, wrapped in an `Rc`, and
/// tokens/AST nodes hold `Location`s that reference it by `FileHandle`
/// rather than borrowing the text directly — this sidesteps self-referential
/// structs while keeping the same ownership story.
pub struct InputFile {
    pub handle: FileHandle,
    pub contents: String,
    /// Byte offset of the start of each line, line 0 implicit at offset 0.
    line_starts: Vec<usize>,
}

impl InputFile {
    pub fn new(name: impl Into<Rc<str>>, contents: String) -> Self {
        let mut line_starts = vec![0usize];
        for (i, b) in contents.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { handle: FileHandle::new(name), contents, line_starts }
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Convert a byte offset into a 1-based `Location`.
    pub fn location_for_byte(&self, byte: usize) -> Location {
        let line_idx = match self.line_starts.binary_search(&byte) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[line_idx];
        let column = self.contents[line_start..byte].chars().count() + 1;
        Location::new(self.handle.clone(), (line_idx + 1) as u32, column as u32, byte)
    }

    /// The full text of the line containing `byte`, without its trailing
    /// newline — used to render the caret snippet in error messages.
    pub fn line_text(&self, line: u32) -> &str {
        let idx = (line - 1) as usize;
        let start = self.line_starts[idx];
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&e| e.saturating_sub(1))
            .unwrap_or(self.contents.len());
        self.contents[start..end.max(start)].trim_end_matches('\r')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> InputFile {
        InputFile::new("//test.gn", "a = 1\nb = 2\n\nc = 3\n".to_string())
    }

    #[test]
    fn location_for_byte_first_line() {
        let f = file();
        let loc = f.location_for_byte(0);
        assert_eq!(loc.line, 1);
        assert_eq!(loc.column, 1);
    }

    #[test]
    fn location_for_byte_second_line() {
        let f = file();
        let loc = f.location_for_byte(6); // 'b' of "b = 2"
        assert_eq!(loc.line, 2);
        assert_eq!(loc.column, 1);
    }

    #[test]
    fn line_text_strips_newline() {
        let f = file();
        assert_eq!(f.line_text(1), "a = 1");
        assert_eq!(f.line_text(3), "");
        assert_eq!(f.line_text(4), "c = 3");
    }

    #[test]
    fn range_union_takes_outer_bounds() {
        let f = file();
        let a = LocationRange::new(f.location_for_byte(0), f.location_for_byte(1));
        let b = LocationRange::new(f.location_for_byte(4), f.location_for_byte(5));
        let u = a.union(&b);
        assert_eq!(u.begin.byte, 0);
        assert_eq!(u.end.byte, 5);
    }
}
