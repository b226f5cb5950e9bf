use std::fmt;
use std::str::FromStr;

use qt_types::{Diagnostic, ObjectKind};
use serde::{Deserialize, Serialize};

use crate::render::Language;

/// How the text of an lgcode is meant to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LgNature {
    #[default]
    #[serde(rename = "")]
    Plain,
    Markdown,
    Rest,
    /// Executable target code.
    Mumps,
    /// Deliberately empty in every language.
    Empty,
}

impl FromStr for LgNature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "plain" => Ok(Self::Plain),
            "markdown" => Ok(Self::Markdown),
            "rest" => Ok(Self::Rest),
            "mumps" => Ok(Self::Mumps),
            "empty" => Ok(Self::Empty),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for LgNature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Markdown => "markdown",
            Self::Rest => "rest",
            Self::Mumps => "mumps",
            Self::Empty => "empty",
        })
    }
}

/// A language translation entry (`l4_NAME`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Lgcode {
    pub id: String,
    #[serde(default, rename = "N")]
    pub n: String,
    #[serde(default, rename = "E")]
    pub e: String,
    #[serde(default, rename = "F")]
    pub f: String,
    #[serde(default, rename = "D")]
    pub d: String,
    #[serde(default, rename = "U")]
    pub u: String,
    /// Name of another lgcode this one redirects to (without `l4_`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub nature: LgNature,
    /// `"xml"` when the bodies are XML fragments.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encoding: String,
}

impl Lgcode {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn text(&self, language: Language) -> &str {
        match language {
            Language::N => &self.n,
            Language::E => &self.e,
            Language::F => &self.f,
            Language::D => &self.d,
            Language::U => &self.u,
        }
    }

    pub fn text_mut(&mut self, language: Language) -> &mut String {
        match language {
            Language::N => &mut self.n,
            Language::E => &mut self.e,
            Language::F => &mut self.f,
            Language::D => &mut self.d,
            Language::U => &mut self.u,
        }
    }

    pub fn has_text(&self) -> bool {
        [&self.n, &self.e, &self.f, &self.d, &self.u]
            .iter()
            .any(|t| !t.trim().is_empty())
    }

    /// Text whose references are the lgcode's dependencies.
    pub fn deps_text(&self) -> String {
        let mut text = [&self.n, &self.e, &self.f, &self.d, &self.u]
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if let Some(alias) = &self.alias {
            text.push_str("\nl4_");
            text.push_str(alias);
        }
        text
    }

    pub fn lint(&self) -> Vec<Diagnostic> {
        let object = format!("l4_{}", self.id);
        let mut found = Vec::new();
        if let Some(alias) = &self.alias {
            if self.has_text() {
                found.push(
                    Diagnostic::new(
                        "lgcode.lint.alias.nonempty",
                        "an lgcode with an alias carries no text",
                    )
                    .with_object(object.clone()),
                );
            }
            if !ObjectKind::Lgcode.accepts(alias) || *alias == self.id {
                found.push(
                    Diagnostic::new(
                        "lgcode.lint.alias.form",
                        format!("alias `{alias}` is not another lgcode name"),
                    )
                    .with_object(object),
                );
            }
        }
        found
    }
}
