//! Call-argument parsing for macro invocations and declarations.
//!
//! Rules:
//!
//! - The text must start with `(`; parsing ends at the matching `)`.
//! - Commas at nesting depth one separate arguments; inner `( … )` nest.
//! - `"…"`, `«…»` and `⟦…⟧` quote: commas and parentheses inside are data.
//! - `()` is an empty list; `(a,)` has two arguments, the second empty.

use crate::error::{ObjectError, ObjectResult};

/// Parse a parenthesized argument list at the start of `text`.
///
/// Returns the raw (trimmed, still quoted) arguments and the number of
/// bytes consumed including both parentheses.
pub fn build_args(text: &str) -> ObjectResult<(Vec<String>, usize)> {
    if !text.starts_with('(') {
        return Err(ObjectError::ArgsNotCall);
    }
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut arg_start = 1;

    for (idx, c) in text.char_indices() {
        if let Some(close) = quote {
            if c == close {
                quote = None;
            }
            continue;
        }
        match c {
            '"' => quote = Some('"'),
            '«' => quote = Some('»'),
            '⟦' => quote = Some('⟧'),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let last = text[arg_start..idx].trim();
                    if !(args.is_empty() && last.is_empty()) {
                        args.push(last.to_string());
                    }
                    return Ok((args, idx + 1));
                }
            }
            ',' if depth == 1 => {
                args.push(text[arg_start..idx].trim().to_string());
                arg_start = idx + 1;
            }
            _ => {}
        }
    }
    Err(ObjectError::ArgsUnclosed)
}

/// Trim an argument and strip one enclosing `«»`, `⟦⟧` or `""` pair.
pub fn clean_arg(raw: &str) -> String {
    let arg = raw.trim();
    for (open, close) in [('«', '»'), ('⟦', '⟧'), ('"', '"')] {
        if arg.len() >= open.len_utf8() + close.len_utf8() {
            if let Some(inner) = arg
                .strip_prefix(open)
                .and_then(|rest| rest.strip_suffix(close))
            {
                return inner.to_string();
            }
        }
    }
    arg.to_string()
}

/// Split `name=value` when `name` is a plain identifier (optionally `$`
/// prefixed). Returns `None` for positional arguments.
pub fn split_named(raw: &str) -> Option<(&str, &str)> {
    let (name, value) = raw.split_once('=')?;
    let name = name.trim();
    let bare = name.strip_prefix('$').unwrap_or(name);
    let mut chars = bare.chars();
    let ident = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    ident.then_some((bare, value.trim()))
}
