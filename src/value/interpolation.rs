//! String literal interpolation (spec §4.4).
//!
//! Expansion happens lazily, when a string literal token is realized as a
//! [`Value`] — not at lex or parse time — so variable lookups see the
//! scope active at the point of evaluation.

use crate::error::{Err, Kind, Result};
use crate::location::LocationRange;

use super::Value;

/// Resolves the scope-dependent parts of `${...}`/`$ident` expansion.
/// Implemented by the evaluator so this module has no dependency on the
/// interpreter; `member`/`index` reuse exactly the accessor semantics
/// `a.b`/`a[i]` use elsewhere (spec §4.5).
pub trait Interpolator {
    fn lookup(&mut self, name: &str, origin: &LocationRange) -> Result<Value>;
    fn member(&mut self, base: &Value, name: &str, origin: &LocationRange) -> Result<Value>;
    fn index(&mut self, base: &Value, index: i64, origin: &LocationRange) -> Result<Value>;
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Expand `raw` (a string literal's body, quotes already stripped) against
/// `interp`, blaming any error on `origin` (the literal's own range).
pub fn expand_string(raw: &str, origin: &LocationRange, interp: &mut dyn Interpolator) -> Result<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::new();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                if i + 1 >= chars.len() {
                    out.push('\\');
                    i += 1;
                    continue;
                }
                match chars[i + 1] {
                    '\\' => {
                        out.push('\\');
                        i += 2;
                    }
                    '"' => {
                        out.push('"');
                        i += 2;
                    }
                    '$' => {
                        out.push('$');
                        i += 2;
                    }
                    other => {
                        // Not a recognized escape: both characters are literal.
                        out.push('\\');
                        out.push(other);
                        i += 2;
                    }
                }
            }
            '$' => {
                i += 1;
                if i >= chars.len() {
                    return Err(expand_err(origin, "dangling `$` at end of string"));
                }
                let c2 = chars[i];
                if c2 == '{' {
                    i += 1;
                    let (value, consumed) = expand_braced(&chars[i..], origin, interp)?;
                    i += consumed;
                    out.push_str(&value.display_unquoted());
                } else if is_ident_start(c2) {
                    let start = i;
                    while i < chars.len() && is_ident_continue(chars[i]) {
                        i += 1;
                    }
                    let name: String = chars[start..i].iter().collect();
                    let value = interp.lookup(&name, origin)?;
                    out.push_str(&value.display_unquoted());
                } else if c2 == '0' && chars.get(i + 1) == Some(&'x') {
                    let hex: String = chars[i + 2..(i + 4).min(chars.len())].iter().collect();
                    if hex.len() != 2 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                        return Err(expand_err(origin, "expected two hex digits after `$0x`"));
                    }
                    let byte = u8::from_str_radix(&hex, 16).unwrap();
                    out.push(byte as char);
                    i += 4;
                } else {
                    return Err(expand_err(origin, format!("invalid `$` escape before '{}'", c2)));
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok(out)
}

/// Parses and evaluates the inside of `${...}`. `rest` starts just past the
/// `{`; returns the resolved value and how many chars (including the
/// closing `}`) were consumed from `rest`.
fn expand_braced(rest: &[char], origin: &LocationRange, interp: &mut dyn Interpolator) -> Result<(Value, usize)> {
    let mut i = 0usize;
    if i >= rest.len() || !is_ident_start(rest[i]) {
        return Err(expand_err(origin, "expected identifier inside `${...}`"));
    }
    let start = i;
    while i < rest.len() && is_ident_continue(rest[i]) {
        i += 1;
    }
    let name: String = rest[start..i].iter().collect();
    let mut value = interp.lookup(&name, origin)?;

    if i < rest.len() && rest[i] == '.' {
        i += 1;
        let mstart = i;
        while i < rest.len() && is_ident_continue(rest[i]) {
            i += 1;
        }
        if i == mstart {
            return Err(expand_err(origin, "expected member name after `.` inside `${...}`"));
        }
        let member: String = rest[mstart..i].iter().collect();
        value = interp.member(&value, &member, origin)?;
    } else if i < rest.len() && rest[i] == '[' {
        i += 1;
        let istart = i;
        while i < rest.len() && rest[i].is_ascii_digit() {
            i += 1;
        }
        if i == istart || i >= rest.len() || rest[i] != ']' {
            return Err(expand_err(origin, "expected `[<integer>]` inside `${...}`"));
        }
        let idx: i64 = rest[istart..i].iter().collect::<String>().parse().unwrap();
        i += 1; // consume ']'
        value = interp.index(&value, idx, origin)?;
    }

    if i >= rest.len() || rest[i] != '}' {
        return Err(expand_err(origin, "expected `}` to close `${...}`"));
    }
    i += 1;

    Ok((value, i))
}

fn expand_err(origin: &LocationRange, message: impl Into<String>) -> Err {
    Err::at(Kind::Lex, origin.clone(), message.into())
}
