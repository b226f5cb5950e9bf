use std::collections::BTreeMap;

use qt_types::Diagnostic;
use serde::{Deserialize, Serialize};

use crate::args::{clean_arg, split_named};
use crate::error::{ObjectError, ObjectResult};

/// One declared macro parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Name without the `$` sigil.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
    /// Keyword-only: must be passed as `name=value`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub named: bool,
}

impl Param {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default: None,
            doc: String::new(),
            named: false,
        }
    }
}

/// A parametrized text object (`m4_NAME`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macro {
    pub id: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    #[serde(default)]
    pub body: String,
}

impl Macro {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            synopsis: String::new(),
            params: Vec::new(),
            examples: Vec::new(),
            body: String::new(),
        }
    }

    fn object(&self) -> String {
        format!("m4_{}", self.id)
    }

    /// Bind raw call arguments to parameters.
    ///
    /// Positional arguments bind in declaration order; `name=value` binds by
    /// name when `name` is a declared parameter. Unbound parameters take
    /// their default, or the empty string.
    pub fn bind(&self, raw_args: &[String]) -> ObjectResult<BTreeMap<String, String>> {
        let mut bound: BTreeMap<String, String> = BTreeMap::new();
        let mut position = 0;
        for raw in raw_args {
            let keyword = split_named(raw)
                .filter(|(name, _)| self.params.iter().any(|p| p.name == *name));
            let (param, value) = match keyword {
                Some((name, value)) => (name.to_string(), value),
                None => {
                    let param = self.params.get(position).ok_or_else(|| {
                        ObjectError::TooManyArgs {
                            object: self.object(),
                            given: raw_args.len(),
                            max: self.params.len(),
                        }
                    })?;
                    if param.named {
                        return Err(ObjectError::NamedOnly {
                            object: self.object(),
                            param: param.name.clone(),
                        });
                    }
                    position += 1;
                    (param.name.clone(), raw.as_str())
                }
            };
            if bound.contains_key(&param) {
                return Err(ObjectError::DuplicateArg {
                    object: self.object(),
                    param,
                });
            }
            bound.insert(param, clean_arg(value));
        }
        for param in &self.params {
            bound
                .entry(param.name.clone())
                .or_insert_with(|| param.default.clone().unwrap_or_default());
        }
        Ok(bound)
    }

    /// Render the body: `$param` takes the bound value, `%key` the value of
    /// `key` in `env`. Longer names win over their prefixes.
    pub fn render(&self, bound: &BTreeMap<String, String>, env: &BTreeMap<String, String>) -> String {
        let mut table: Vec<(String, &str)> = bound
            .iter()
            .map(|(k, v)| (format!("${k}"), v.as_str()))
            .chain(env.iter().map(|(k, v)| (format!("%{k}"), v.as_str())))
            .collect();
        table.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let body = self.body.as_str();
        let mut out = String::with_capacity(body.len());
        let mut rest = body;
        while let Some(idx) = rest.find(['$', '%']) {
            out.push_str(&rest[..idx]);
            let tail = &rest[idx..];
            match table.iter().find(|(pattern, _)| tail.starts_with(pattern.as_str())) {
                Some((pattern, value)) => {
                    out.push_str(value);
                    rest = &tail[pattern.len()..];
                }
                None => {
                    out.push_str(&tail[..1]);
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Text whose references are the macro's dependencies.
    pub fn deps_text(&self) -> String {
        let mut text = self.body.clone();
        for default in self.params.iter().filter_map(|p| p.default.as_deref()) {
            text.push('\n');
            text.push_str(default);
        }
        text
    }

    pub fn lint(&self) -> Vec<Diagnostic> {
        let mut found = Vec::new();
        if self.synopsis.trim().is_empty() {
            found.push(
                Diagnostic::new("macro.lint.synopsis", "synopsis is missing")
                    .with_object(self.object()),
            );
        }
        for param in self.params.iter().filter(|p| p.doc.trim().is_empty()) {
            found.push(
                Diagnostic::new(
                    "macro.lint.paramdoc",
                    format!("parameter `{}` is not documented", param.name),
                )
                .with_object(self.object()),
            );
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greet() -> Macro {
        let mut m = Macro::new("GREET");
        m.synopsis = "Greets".into();
        let mut name = Param::new("name");
        name.default = Some("Friend".into());
        name.doc = "who".into();
        m.params.push(name);
        m.body = "Hi, $name!".into();
        m
    }

    fn two_params() -> Macro {
        let mut m = Macro::new("PAIR");
        m.params.push(Param::new("a"));
        let mut b = Param::new("b");
        b.default = Some("X".into());
        m.params.push(b);
        m.body = "$a-$b".into();
        m
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // ----- Binding -----

    #[test]
    fn positional_then_defaults() {
        let bound = two_params().bind(&args(&["1"])).unwrap();
        assert_eq!(bound["a"], "1");
        assert_eq!(bound["b"], "X");
    }

    #[test]
    fn too_many_arguments_fail() {
        let err = two_params().bind(&args(&["1", "2", "3"])).unwrap_err();
        assert_eq!(err.code(), "macro.args.toomany");
    }

    #[test]
    fn missing_without_default_is_empty() {
        let bound = two_params().bind(&[]).unwrap();
        assert_eq!(bound["a"], "");
        assert_eq!(bound["b"], "X");
    }

    #[test]
    fn keyword_binding() {
        let bound = two_params().bind(&args(&["b=«y, z»", "1"])).unwrap();
        assert_eq!(bound["a"], "1");
        assert_eq!(bound["b"], "y, z");
    }

    #[test]
    fn keyword_for_unknown_name_is_positional() {
        let bound = two_params().bind(&args(&["c=1"])).unwrap();
        assert_eq!(bound["a"], "c=1");
    }

    #[test]
    fn duplicate_binding_fails() {
        let err = two_params().bind(&args(&["1", "a=2"])).unwrap_err();
        assert_eq!(err.code(), "macro.args.twice");
    }

    #[test]
    fn named_only_parameter() {
        let mut m = two_params();
        m.params[0].named = true;
        assert_eq!(m.bind(&args(&["1"])).unwrap_err().code(), "macro.args.named");
        assert_eq!(m.bind(&args(&["a=1"])).unwrap()["a"], "1");
    }

    // ----- Rendering -----

    #[test]
    fn render_substitutes_params() {
        let m = greet();
        let bound = m.bind(&args(&["World"])).unwrap();
        assert_eq!(m.render(&bound, &BTreeMap::new()), "Hi, World!");
    }

    #[test]
    fn render_prefers_longest_name_and_env() {
        let mut m = Macro::new("X");
        m.params = vec![Param::new("n"), Param::new("name")];
        m.body = "$name/$n in %qpath, 100% $other".into();
        let bound = m.bind(&args(&["1", "2"])).unwrap();
        let env = BTreeMap::from([("qpath".to_string(), "/a/b.m".to_string())]);
        assert_eq!(m.render(&bound, &env), "2/1 in /a/b.m, 100% $other");
    }

    #[test]
    fn deps_text_includes_defaults() {
        let mut m = two_params();
        m.params[1].default = Some("m4_OTHER".into());
        assert!(m.deps_text().contains("m4_OTHER"));
    }

    // ----- Lint -----

    #[test]
    fn lint_flags_missing_docs() {
        assert!(greet().lint().is_empty());
        let codes: Vec<String> = two_params().lint().into_iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec!["macro.lint.synopsis", "macro.lint.paramdoc", "macro.lint.paramdoc"]
        );
    }
}
