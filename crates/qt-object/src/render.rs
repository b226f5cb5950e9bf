//! Language selection and render algorithms for `l4_` and `r4_` output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ObjectError;

/// The five language bodies of an lgcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// Dutch.
    N,
    /// English.
    E,
    /// French.
    F,
    /// German.
    D,
    /// Universal.
    U,
}

impl Language {
    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'N' => Some(Self::N),
            'E' => Some(Self::E),
            'F' => Some(Self::F),
            'D' => Some(Self::D),
            'U' => Some(Self::U),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::N => 'N',
            Self::E => 'E',
            Self::F => 'F',
            Self::D => 'D',
            Self::U => 'U',
        }
    }
}

/// Post-processing applied to rendered language or registry text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderAlgo {
    #[default]
    Plain,
    /// Escape for a JavaScript string literal.
    Js,
    /// Escape for a Python string literal.
    Py,
    /// Escape for a PHP double-quoted string.
    Php,
    /// XML character references.
    Xml,
    /// Identity, kept for records that name it explicitly.
    Null,
    /// Backslash-escape template metacharacters.
    T,
}

impl RenderAlgo {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Plain => "",
            Self::Js => "js",
            Self::Py => "py",
            Self::Php => "php",
            Self::Xml => "xml",
            Self::Null => "null",
            Self::T => "t",
        }
    }

    pub fn apply(self, data: &str) -> String {
        match self {
            Self::Plain | Self::Null => data.to_string(),
            Self::Js => escape(data, JS_SAFE, |c, out| push_utf16(c, out)),
            Self::Py => escape(data, PY_SAFE, |c, out| {
                if (c as u32) > 0xFFFF {
                    out.push_str(&format!("\\U{:08x}", c as u32));
                } else {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                }
            }),
            Self::Php => escape(data, PHP_SAFE, |c, out| {
                out.push_str(&format!("\\u{{{:x}}}", c as u32));
            }),
            Self::Xml => data
                .chars()
                .map(|c| {
                    if PHP_SAFE.contains(c) {
                        c.to_string()
                    } else {
                        format!("&#x{:x};", c as u32)
                    }
                })
                .collect(),
            Self::T => {
                let mut out = String::with_capacity(data.len());
                for c in data.chars() {
                    if "\\{}$@%|".contains(c) {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out
            }
        }
    }
}

impl FromStr for RenderAlgo {
    type Err = ObjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::Plain),
            "js" => Ok(Self::Js),
            "py" => Ok(Self::Py),
            "php" => Ok(Self::Php),
            "xml" => Ok(Self::Xml),
            "null" => Ok(Self::Null),
            "t" => Ok(Self::T),
            other => Err(ObjectError::UnknownAlgo(other.to_string())),
        }
    }
}

/// A language token modifier such as `Ejs`: language letter plus algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LgModifier {
    pub language: Language,
    pub algo: RenderAlgo,
}

impl LgModifier {
    pub fn plain(language: Language) -> Self {
        Self {
            language,
            algo: RenderAlgo::Plain,
        }
    }
}

impl FromStr for LgModifier {
    type Err = ObjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let language = chars
            .next()
            .and_then(Language::from_letter)
            .ok_or_else(|| ObjectError::UnknownLanguage(s.to_string()))?;
        Ok(Self {
            language,
            algo: chars.as_str().parse()?,
        })
    }
}

impl fmt::Display for LgModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.language.letter(), self.algo.suffix())
    }
}

const JS_SAFE: &str =
    " 1234567890abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ$-+_.!*(),@#{}|[]:;?=^~";
const PY_SAFE: &str =
    " 1234567890abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ$-+_.!*(),|[]:;?=^~";
const PHP_SAFE: &str =
    " 1234567890abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ-+_.!*(),|[]:;?=^~";

fn escape(data: &str, safe: &str, wide: impl Fn(char, &mut String)) -> String {
    let mut out = String::with_capacity(data.len());
    for c in data.chars() {
        if safe.contains(c) {
            out.push(c);
        } else if c.is_ascii() {
            out.push_str(&format!("\\x{:02x}", c as u32));
        } else {
            wide(c, &mut out);
        }
    }
    out
}

fn push_utf16(c: char, out: &mut String) {
    let mut units = [0u16; 2];
    for unit in c.encode_utf16(&mut units) {
        out.push_str(&format!("\\u{unit:04x}"));
    }
}
