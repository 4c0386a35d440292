//! Rich error values.
//!
//! Every failure path in the interpreter produces an [`Err`] rather than a
//! bare string: a primary [`LocationRange`], a short title, optional help
//! text, and a chain of "also see here" sub-errors (nested non-nestable
//! blocks, template redefinition, and the like). [`Kind`] names the one
//! taxonomy from the error-handling design; `Err::to_string()` renders the
//! `<file>:<line>:<col>: <title>` form, but tests should match on `kind`
//! and `message` rather than the rendered snippet.

use std::fmt;

use crate::location::LocationRange;

/// The error taxonomy. One kind per failure category; each variant is
/// produced by exactly the subsystem named in its doc comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Kind {
    #[error("load error")]
    Load,
    #[error("lex error")]
    Lex,
    #[error("parse error")]
    Parse,
    #[error("type error")]
    Type,
    #[error("name error")]
    Name,
    #[error("arity error")]
    Arity,
    #[error("unused variable")]
    UnusedVariable,
    #[error("nesting error")]
    Nesting,
    #[error("context error")]
    Context,
    #[error("assertion failed")]
    AssertionFailed,
}

/// A single error, optionally chained to related sub-errors.
#[derive(Debug, Clone)]
pub struct Err {
    pub kind: Kind,
    pub range: Option<LocationRange>,
    pub message: String,
    pub help: Option<String>,
    pub sub_errors: Vec<Err>,
}

impl Err {
    pub fn new(kind: Kind, range: Option<LocationRange>, message: impl Into<String>) -> Self {
        Self { kind, range, message: message.into(), help: None, sub_errors: Vec::new() }
    }

    pub fn at(kind: Kind, range: LocationRange, message: impl Into<String>) -> Self {
        Self::new(kind, Some(range), message)
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_sub_error(mut self, sub: Err) -> Self {
        self.sub_errors.push(sub);
        self
    }

    /// The `<file>:<line>:<col>: <title>` line used at the top of the
    /// rendered message; `None` when the error carries no location (e.g. a
    /// `LoadError` for a file that was never tokenized).
    fn location_prefix(&self) -> Option<String> {
        self.range.as_ref().map(|r| format!("{}: ", r.begin))
    }

    /// Full human-readable rendering: location prefix, title, help text,
    /// a caret-annotated source snippet, and any sub-error chain. Hosts
    /// display this; tests should not assert on its exact text.
    pub fn format_with_source(&self, input: &crate::location::InputFile) -> String {
        let mut out = String::new();
        if let Some(prefix) = self.location_prefix() {
            out.push_str(&prefix);
        }
        out.push_str(&self.message);
        out.push('\n');
        if let Some(help) = &self.help {
            out.push_str(help);
            out.push('\n');
        }
        if let Some(range) = &self.range {
            out.push('\n');
            let line = input.line_text(range.begin.line);
            out.push_str(line);
            out.push('\n');
            let col = range.begin.column.saturating_sub(1) as usize;
            out.push_str(&" ".repeat(col));
            out.push('^');
            out.push('\n');
        }
        for sub in &self.sub_errors {
            out.push_str("--- also: ");
            out.push_str(&sub.message);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Err {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = self.location_prefix() {
            write!(f, "{}", prefix)?;
        }
        write!(f, "{}", self.message)?;
        for sub in &self.sub_errors {
            write!(f, "\n--- also: {}", sub.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for Err {}

pub type Result<T> = std::result::Result<T, Err>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::InputFile;

    #[test]
    fn display_includes_location_prefix() {
        let input = InputFile::new("//x.gn", "x = 1\n".to_string());
        let loc = input.location_for_byte(0);
        let range = LocationRange::point(loc);
        let e = Err::at(Kind::Name, range, "undefined identifier `x`");
        assert!(e.to_string().starts_with("//x.gn:1:1: undefined identifier"));
    }

    #[test]
    fn sub_errors_are_chained_in_display() {
        let input = InputFile::new("//x.gn", "x = 1\n".to_string());
        let loc = input.location_for_byte(0);
        let range = LocationRange::point(loc);
        let sub = Err::new(Kind::Nesting, None, "first definition here");
        let e = Err::at(Kind::Nesting, range, "can't nest these things").with_sub_error(sub);
        let rendered = e.to_string();
        assert!(rendered.contains("also: first definition here"));
    }
}
