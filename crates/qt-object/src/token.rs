//! Reference tokenizer.
//!
//! A reference is `<p>4_<name>` with `p` one of `m i l t r`, not preceded
//! by an ASCII alphanumeric. Name grammar per kind:
//!
//! - `m4_`, `i4_`, `t4_`: `[A-Za-z][A-Za-z0-9]*`
//! - `r4_`: `[a-z][a-z0-9_]*`
//! - `l4_`: `[modifier_]name` with modifier `[A-Za-z0-9]+` and name as above

use std::collections::BTreeSet;

use qt_types::{ObjectKind, ObjectName};

/// One reference found in a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: ObjectKind,
    /// Bare name; for registry tokens the raw key with underscores.
    pub name: String,
    /// Language render modifier (`"Ejs"` in `l4_Ejs_warn`).
    pub modifier: Option<String>,
    /// The exact text the token was read from.
    pub text: String,
}

impl Token {
    /// Canonical object name, or `None` for registry keys that are not valid
    /// object names.
    pub fn object_name(&self) -> Option<ObjectName> {
        ObjectName::new(self.kind, &self.name).ok()
    }
}

/// Alternating literals and tokens: `literals.len() == tokens.len() + 1`,
/// token `i` sits between `literals[i]` and `literals[i + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split<'a> {
    pub literals: Vec<&'a str>,
    pub tokens: Vec<Token>,
}

/// Quick test for any reference marker.
pub fn has_marker(text: &str) -> bool {
    text.contains("4_")
}

/// Split `text` into literals and tokens.
pub fn split(text: &str) -> Split<'_> {
    let bytes = text.as_bytes();
    let mut literals = Vec::new();
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;
    while i + 2 < bytes.len() {
        if let Some((token, end)) = token_at(text, i) {
            literals.push(&text[literal_start..i]);
            tokens.push(token);
            literal_start = end;
            i = end;
        } else {
            i += 1;
        }
    }
    literals.push(&text[literal_start..]);
    Split { literals, tokens }
}

/// Distinct stored-object names referenced by `text`.
pub fn references(text: &str) -> BTreeSet<ObjectName> {
    if !has_marker(text) {
        return BTreeSet::new();
    }
    split(text)
        .tokens
        .iter()
        .filter(|t| t.kind.is_stored())
        .filter_map(Token::object_name)
        .collect()
}

fn token_at(text: &str, start: usize) -> Option<(Token, usize)> {
    let bytes = text.as_bytes();
    if !bytes.get(start).is_some_and(|b| b"milrt".contains(b)) {
        return None;
    }
    if bytes.get(start + 1) != Some(&b'4') || bytes.get(start + 2) != Some(&b'_') {
        return None;
    }
    if start > 0 && bytes[start - 1].is_ascii_alphanumeric() {
        return None;
    }
    let kind = ObjectKind::from_prefix(&text[start..start + 2])?;
    let body = start + 3;
    let (name, modifier, end) = match kind {
        ObjectKind::Registry => {
            let end = scan(bytes, body, |b| {
                b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_'
            });
            if !bytes.get(body).is_some_and(u8::is_ascii_lowercase) {
                return None;
            }
            (&text[body..end], None, end)
        }
        ObjectKind::Lgcode => {
            let first = scan(bytes, body, |b| b.is_ascii_alphanumeric());
            if first == body {
                return None;
            }
            let second_start = first + 1;
            let second_ok = bytes.get(first) == Some(&b'_')
                && bytes.get(second_start).is_some_and(u8::is_ascii_alphabetic);
            if second_ok {
                let second = scan(bytes, second_start, |b| b.is_ascii_alphanumeric());
                (
                    &text[second_start..second],
                    Some(text[body..first].to_string()),
                    second,
                )
            } else if bytes[body].is_ascii_alphabetic() {
                (&text[body..first], None, first)
            } else {
                return None;
            }
        }
        _ => {
            if !bytes.get(body).is_some_and(u8::is_ascii_alphabetic) {
                return None;
            }
            let end = scan(bytes, body, |b| b.is_ascii_alphanumeric());
            (&text[body..end], None, end)
        }
    };
    let token = Token {
        kind,
        name: name.to_string(),
        modifier,
        text: text[start..end].to_string(),
    };
    Some((token, end))
}

fn scan(bytes: &[u8], from: usize, accept: impl Fn(u8) -> bool) -> usize {
    let mut end = from;
    while end < bytes.len() && accept(bytes[end]) {
        end += 1;
    }
    end
}
