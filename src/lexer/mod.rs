//! Tokenizer.
//!
//! Turns an [`InputFile`]'s source text into a flat token stream, including
//! comment tokens (spec §4.1). The parser strips non-real tokens
//! (`LineComment`/`SuffixComment`) from the stream before parsing but keeps
//! `BlockComment` tokens in place since they stand as their own statements.

use crate::ast::{Token, TokenKind};
use crate::error::{Err, Kind, Result};
use crate::location::{FileHandle, InputFile, Location};

struct Lexer {
    chars: Vec<char>,
    file: FileHandle,
    pos: usize,
    line: u32,
    col: u32,
    byte: usize,
}

impl Lexer {
    fn new(input: &InputFile) -> Self {
        Self {
            chars: input.contents.chars().collect(),
            file: input.handle.clone(),
            pos: 0,
            line: 1,
            col: 1,
            byte: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn here(&self) -> Location {
        Location::new(self.file.clone(), self.line, self.col, self.byte)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        self.byte += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    /// Whether the characters on the current line strictly before `pos`
    /// are all whitespace (used to classify `#` as a line- vs.
    /// suffix-comment, spec §4.1).
    fn only_whitespace_before_on_line(&self) -> bool {
        let mut i = self.pos;
        while i > 0 {
            i -= 1;
            match self.chars[i] {
                '\n' => return true,
                ' ' | '\t' | '\r' => continue,
                _ => return false,
            }
        }
        true
    }

    /// Whether the line ending at `pos` (exclusive) was blank, used for
    /// block-comment promotion.
    fn line_before_is_blank(&self, start_pos: usize) -> bool {
        if start_pos == 0 {
            return true;
        }
        let mut i = start_pos;
        // Walk back over the newline that ends the previous line.
        if self.chars[i - 1] != '\n' {
            return false;
        }
        i -= 1;
        if i == 0 {
            return true;
        }
        // Walk back over that previous line's content.
        let mut j = i;
        while j > 0 && self.chars[j - 1] != '\n' {
            j -= 1;
        }
        self.chars[j..i].iter().all(|c| c.is_whitespace())
    }

    fn line_after_is_blank_or_eof(&self) -> bool {
        let mut i = self.pos;
        while i < self.chars.len() && self.chars[i] != '\n' {
            i += 1;
        }
        if i >= self.chars.len() {
            return true;
        }
        i += 1; // past the newline ending the comment line
        let mut j = i;
        while j < self.chars.len() && self.chars[j] != '\n' {
            if !self.chars[j].is_whitespace() {
                return false;
            }
            j += 1;
        }
        true
    }
}

/// Tokenize `input`'s contents, returning the flat token stream including
/// comment tokens (spec §4.1).
pub fn tokenize(input: &InputFile) -> Result<Vec<Token>> {
    let mut lx = Lexer::new(input);
    let mut tokens = Vec::new();

    while let Some(c) = lx.peek() {
        let start = lx.here();
        let start_pos = lx.pos;

        match c {
            ' ' | '\t' | '\r' | '\n' => {
                lx.advance();
                continue;
            }
            '#' => {
                let is_line_comment = lx.only_whitespace_before_on_line();
                while let Some(ch) = lx.peek() {
                    if ch == '\n' {
                        break;
                    }
                    lx.advance();
                }
                let text: String = lx.chars[start_pos..lx.pos].iter().collect();
                let kind = if is_line_comment {
                    if lx.line_before_is_blank(start_pos) && lx.line_after_is_blank_or_eof() {
                        TokenKind::BlockComment
                    } else {
                        TokenKind::LineComment
                    }
                } else {
                    TokenKind::SuffixComment
                };
                tokens.push(Token { kind, text, location: start });
                continue;
            }
            '"' => {
                lx.advance();
                loop {
                    match lx.peek() {
                        None => {
                            return lex_err(Kind::Lex, &lx, start.clone(), "unterminated string literal");
                        }
                        Some('\n') => {
                            return lex_err(Kind::Lex, &lx, start.clone(), "newline in string literal");
                        }
                        Some('\\') => {
                            lx.advance();
                            if lx.peek().is_none() {
                                return lex_err(Kind::Lex, &lx, start.clone(), "unterminated string literal");
                            }
                            lx.advance();
                        }
                        Some('"') => {
                            lx.advance();
                            break;
                        }
                        Some(_) => {
                            lx.advance();
                        }
                    }
                }
                // Raw text without the surrounding quotes.
                let text: String = lx.chars[start_pos + 1..lx.pos - 1].iter().collect();
                tokens.push(Token { kind: TokenKind::String, text, location: start });
                continue;
            }
            c if c.is_ascii_digit() => {
                while let Some(d) = lx.peek() {
                    if d.is_ascii_digit() {
                        lx.advance();
                    } else {
                        break;
                    }
                }
                let text: String = lx.chars[start_pos..lx.pos].iter().collect();
                if text.len() > 1 && text.starts_with('0') {
                    return lex_err(Kind::Lex, &lx, start, "integer literal has a leading zero");
                }
                tokens.push(Token { kind: TokenKind::Integer, text, location: start });
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while let Some(d) = lx.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        lx.advance();
                    } else {
                        break;
                    }
                }
                let text: String = lx.chars[start_pos..lx.pos].iter().collect();
                let kind = match text.as_str() {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "if" => TokenKind::If,
                    "else" => TokenKind::Else,
                    _ => TokenKind::Identifier,
                };
                tokens.push(Token { kind, text, location: start });
                continue;
            }
            _ => {
                let (kind, len) = match (c, lx.peek_at(1)) {
                    ('=', Some('=')) => (TokenKind::EqualsEquals, 2),
                    ('!', Some('=')) => (TokenKind::NotEquals, 2),
                    ('<', Some('=')) => (TokenKind::LessEquals, 2),
                    ('>', Some('=')) => (TokenKind::GreaterEquals, 2),
                    ('+', Some('=')) => (TokenKind::PlusEquals, 2),
                    ('-', Some('=')) => (TokenKind::MinusEquals, 2),
                    ('&', Some('&')) => (TokenKind::AndAnd, 2),
                    ('|', Some('|')) => (TokenKind::OrOr, 2),
                    ('=', _) => (TokenKind::Equals, 1),
                    ('+', _) => (TokenKind::Plus, 1),
                    ('-', _) => (TokenKind::Minus, 1),
                    ('<', _) => (TokenKind::Less, 1),
                    ('>', _) => (TokenKind::Greater, 1),
                    ('!', _) => (TokenKind::Bang, 1),
                    ('.', _) => (TokenKind::Dot, 1),
                    ('(', _) => (TokenKind::LeftParen, 1),
                    (')', _) => (TokenKind::RightParen, 1),
                    ('[', _) => (TokenKind::LeftBracket, 1),
                    (']', _) => (TokenKind::RightBracket, 1),
                    ('{', _) => (TokenKind::LeftBrace, 1),
                    ('}', _) => (TokenKind::RightBrace, 1),
                    (',', _) => (TokenKind::Comma, 1),
                    _ => {
                        return lex_err(
                            Kind::Lex,
                            &lx,
                            start,
                            format!("unrecognized character '{}'", c),
                        );
                    }
                };
                for _ in 0..len {
                    lx.advance();
                }
                let text: String = lx.chars[start_pos..lx.pos].iter().collect();
                tokens.push(Token { kind, text, location: start });
            }
        }
    }

    tokens.push(Token { kind: TokenKind::Eof, text: String::new(), location: lx.here() });
    Ok(tokens)
}

fn lex_err(kind: Kind, _lx: &Lexer, loc: Location, message: impl Into<String>) -> Result<Vec<Token>> {
    let range = crate::location::LocationRange::point(loc);
    std::result::Result::Err(Err::at(kind, range, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        let input = InputFile::new("//t.gn", src.to_string());
        tokenize(&input).expect("should tokenize")
    }

    #[test]
    fn tokenizes_assignment() {
        let t = toks("a = 1\n");
        let kinds: Vec<_> = t.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::Identifier, TokenKind::Equals, TokenKind::Integer, TokenKind::Eof]
        );
    }

    #[test]
    fn greedy_two_char_operators() {
        let t = toks("a += 1\nb -= 2\nc == d != e\n");
        let kinds: Vec<_> = t.iter().map(|t| t.kind.clone()).collect();
        assert!(kinds.contains(&TokenKind::PlusEquals));
        assert!(kinds.contains(&TokenKind::MinusEquals));
        assert!(kinds.contains(&TokenKind::EqualsEquals));
        assert!(kinds.contains(&TokenKind::NotEquals));
    }

    #[test]
    fn rejects_leading_zero_integer() {
        let input = InputFile::new("//t.gn", "x = 007\n".to_string());
        assert!(tokenize(&input).is_err());
    }

    #[test]
    fn rejects_newline_in_string() {
        let input = InputFile::new("//t.gn", "x = \"a\nb\"\n".to_string());
        assert!(tokenize(&input).is_err());
    }

    #[test]
    fn string_escape_does_not_terminate() {
        let t = toks(r#"x = "a\"b""#);
        let s = t.iter().find(|t| t.kind == TokenKind::String).unwrap();
        assert_eq!(s.text, r#"a\"b"#);
    }

    #[test]
    fn classifies_line_vs_suffix_comment() {
        let t = toks("# leading\nx = 1 # suffix\n");
        let comment_kinds: Vec<_> = t.iter().filter(|t| !t.kind.is_real()).map(|t| t.kind.clone()).collect();
        assert!(comment_kinds.contains(&TokenKind::SuffixComment));
    }

    #[test]
    fn promotes_isolated_comment_to_block_comment() {
        let t = toks("x = 1\n\n# standalone\n\ny = 2\n");
        assert!(t.iter().any(|t| t.kind == TokenKind::BlockComment));
    }
}
