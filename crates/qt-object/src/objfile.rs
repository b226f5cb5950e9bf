//! Object-file parser and lint.
//!
//! ```text
//! // preamble
//! macro GREET(name="Friend"):
//!     $synopsis: Greets someone
//!     $name: who to greet
//!         $$named: no
//!     $body: «Hi, $name!»
//!
//! lgcode warn:
//!     $N: Let op
//!     $E: Warning
//! ```
//!
//! Each block is parsed on its own; diagnostics from all blocks are
//! returned together.

use std::collections::BTreeMap;

use qt_types::{Diagnostic, Diagnostics, ObjectKind, QPath, ReleaseId};

use crate::args::{build_args, clean_arg};
use crate::include::Include;
use crate::lgcode::{LgNature, Lgcode};
use crate::macros::{Macro, Param};
use crate::object::{Object, ObjectBody};
use crate::render::Language;

/// The three object-file flavours, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// `.d`: macro definitions.
    D,
    /// `.i`: includes.
    I,
    /// `.l`: language codes.
    L,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "d" => Some(Self::D),
            "i" => Some(Self::I),
            "l" => Some(Self::L),
            _ => None,
        }
    }

    /// The only block keyword accepted in this kind of file.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::D => "macro",
            Self::I => "include",
            Self::L => "lgcode",
        }
    }
}

/// A parsed object file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectFile {
    pub source: QPath,
    pub preamble: String,
    pub objects: Vec<Object>,
}

impl ObjectFile {
    /// Parse raw bytes of `source`.
    pub fn parse(
        release: &ReleaseId,
        source: &QPath,
        kind: FileKind,
        data: &[u8],
    ) -> Result<Self, Diagnostics> {
        let text = std::str::from_utf8(data).map_err(|e| {
            let line = data[..e.valid_up_to()].iter().filter(|b| **b == b'\n').count() + 1;
            Diagnostics::from(
                Diagnostic::new("objfile.lint.utf8", "file is not valid UTF-8")
                    .with_file(source.as_str())
                    .with_line(line),
            )
        })?;

        let mut diags = Diagnostics::new();
        let (preamble, blocks) = scan(text, &mut diags);
        let mut objects = Vec::new();
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();

        for block in blocks {
            if block.keyword != kind.keyword() {
                diags.push(
                    Diagnostic::new(
                        "objfile.parse.keyword",
                        format!("`{}` blocks are not allowed here", block.keyword),
                    )
                    .with_line(block.line),
                );
                continue;
            }
            let body = match build(&block) {
                Ok(body) => body,
                Err(found) => {
                    diags.extend(found);
                    continue;
                }
            };
            let object = match Object::new(release.clone(), source.clone(), block.line, body) {
                Ok(object) => object,
                Err(e) => {
                    diags.push(Diagnostic::new("objfile.parse.name", e.to_string()).with_line(block.line));
                    continue;
                }
            };
            let name = object.name().to_string();
            if let Some(first) = seen.get(&name) {
                diags.push(
                    Diagnostic::new(
                        "objfile.lint.double",
                        format!("`{name}` found at {first} and {}", block.line),
                    )
                    .with_line(block.line)
                    .with_object(name),
                );
                continue;
            }
            seen.insert(name, block.line);
            objects.push(object);
        }

        diags.in_file(source.as_str()).into_result()?;
        Ok(Self {
            source: source.clone(),
            preamble,
            objects,
        })
    }

    /// Style checks that do not prevent loading.
    pub fn lint(&self) -> Diagnostics {
        let mut found = Diagnostics::new();
        if self.preamble.trim().is_empty() {
            found.push(Diagnostic::new("objfile.lint.preamble", "preamble comment is missing").with_line(1));
        }
        for object in &self.objects {
            for d in object.body.lint() {
                found.push(d.with_line(object.line));
            }
        }
        found.in_file(self.source.as_str())
    }
}

// ----- Scanning -----

/// One `$key: value` (or `$$key: value`) entry.
#[derive(Debug)]
struct Field {
    line: usize,
    key: String,
    value: String,
    attrs: Vec<Field>,
}

#[derive(Debug)]
struct Block {
    line: usize,
    keyword: String,
    header: String,
    fields: Vec<Field>,
}

const KEYWORDS: [&str; 3] = ["macro", "include", "lgcode"];

fn header(trimmed: &str) -> Option<(&str, &str)> {
    let (keyword, rest) = trimmed.split_once(char::is_whitespace)?;
    if !KEYWORDS.contains(&keyword) {
        return None;
    }
    let rest = rest.trim().strip_suffix(':')?;
    Some((keyword, rest.trim_end()))
}

fn closing(open: char) -> Option<char> {
    match open {
        '«' => Some('»'),
        '⟦' => Some('⟧'),
        _ => None,
    }
}

fn scan(text: &str, diags: &mut Diagnostics) -> (String, Vec<Block>) {
    let mut preamble = Vec::new();
    let mut blocks: Vec<Block> = Vec::new();
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l));
    // Set while the last field may still take continuation lines.
    let mut open_field = false;

    while let Some((lineno, raw)) = lines.next() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with("//") {
            if blocks.is_empty() {
                preamble.push(trimmed.trim_start_matches('/').trim().to_string());
            }
            continue;
        }
        if let Some((keyword, head)) = header(trimmed) {
            blocks.push(Block {
                line: lineno,
                keyword: keyword.to_string(),
                header: head.to_string(),
                fields: Vec::new(),
            });
            open_field = false;
            continue;
        }
        let Some(block) = blocks.last_mut() else {
            diags.push(Diagnostic::new("objfile.parse.outside", "text outside a block").with_line(lineno));
            continue;
        };

        if let Some(entry) = trimmed.strip_prefix('$') {
            let (is_attr, entry) = match entry.strip_prefix('$') {
                Some(attr) => (true, attr),
                None => (false, entry),
            };
            let Some((key, value)) = entry.split_once(':') else {
                diags.push(Diagnostic::new("objfile.parse.field", "expected `$key: value`").with_line(lineno));
                open_field = false;
                continue;
            };
            let mut value = value.trim().to_string();
            open_field = true;
            if let Some(close) = value.chars().next().and_then(closing) {
                let open_len = value.chars().next().map_or(0, char::len_utf8);
                let mut collected = value[open_len..].to_string();
                let mut end = collected.find(close);
                while end.is_none() {
                    match lines.next() {
                        Some((_, more)) => {
                            collected.push('\n');
                            collected.push_str(more);
                            end = collected.find(close);
                        }
                        None => break,
                    }
                }
                match end {
                    Some(idx) => {
                        if !collected[idx + close.len_utf8()..].trim().is_empty() {
                            diags.push(
                                Diagnostic::new("objfile.parse.field", "text after closing delimiter")
                                    .with_line(lineno),
                            );
                        }
                        collected.truncate(idx);
                        value = collected;
                    }
                    None => {
                        diags.push(
                            Diagnostic::new("objfile.parse.unclosed", format!("`{close}` is missing"))
                                .with_line(lineno),
                        );
                        continue;
                    }
                }
                open_field = false;
            }
            let field = Field {
                line: lineno,
                key: key.trim().to_string(),
                value,
                attrs: Vec::new(),
            };
            if is_attr {
                match block.fields.last_mut() {
                    Some(owner) => owner.attrs.push(field),
                    None => diags.push(
                        Diagnostic::new("objfile.parse.attribute", "attribute without a field")
                            .with_line(lineno),
                    ),
                }
                // Continuation lines belong to fields, not attributes.
                open_field = false;
            } else {
                block.fields.push(field);
            }
            continue;
        }

        match block.fields.last_mut() {
            Some(field) if open_field => {
                if !field.value.is_empty() {
                    field.value.push('\n');
                }
                field.value.push_str(trimmed);
            }
            _ => diags.push(Diagnostic::new("objfile.parse.stray", "line belongs to no field").with_line(lineno)),
        }
    }
    (preamble.join("\n"), blocks)
}

// ----- Building -----

fn build(block: &Block) -> Result<ObjectBody, Diagnostics> {
    match block.keyword.as_str() {
        "macro" => build_macro(block).map(ObjectBody::Macro),
        "include" => build_include(block).map(ObjectBody::Include),
        _ => build_lgcode(block).map(ObjectBody::Lgcode),
    }
}

fn bad(code: &str, line: usize, object: &str, message: String) -> Diagnostic {
    Diagnostic::new(code, message).with_line(line).with_object(object)
}

fn set_once(slot: &mut Option<String>, field: &Field, object: &str, diags: &mut Diagnostics) {
    if slot.is_some() {
        diags.push(bad(
            "objfile.parse.field.twice",
            field.line,
            object,
            format!("field `${}` occurs twice", field.key),
        ));
    } else {
        *slot = Some(field.value.clone());
    }
}

fn no_attrs(field: &Field, object: &str, diags: &mut Diagnostics) {
    for attr in &field.attrs {
        diags.push(bad(
            "objfile.parse.attribute",
            attr.line,
            object,
            format!("`$${}` is not allowed on `${}`", attr.key, field.key),
        ));
    }
}

fn build_macro(block: &Block) -> Result<Macro, Diagnostics> {
    let mut diags = Diagnostics::new();
    let (id, param_text) = match block.header.find('(') {
        Some(idx) => (block.header[..idx].trim(), Some(&block.header[idx..])),
        None => (block.header.trim(), None),
    };
    let object = format!("m4_{id}");
    let mut mac = Macro::new(id);

    if let Some(param_text) = param_text {
        match build_args(param_text) {
            Ok((raw, used)) => {
                if !param_text[used..].trim().is_empty() {
                    diags.push(bad("objfile.parse.header", block.line, &object, "text after parameter list".into()));
                }
                for item in raw {
                    let (name, default) = match item.split_once('=') {
                        Some((name, default)) => (name.trim(), Some(clean_arg(default))),
                        None => (item.trim(), None),
                    };
                    let name = name.strip_prefix('$').unwrap_or(name);
                    let reserved = ["synopsis", "body", "example"].contains(&name);
                    if !ObjectKind::Macro.accepts(name) || reserved {
                        diags.push(bad("macro.parse.param", block.line, &object, format!("invalid parameter `{name}`")));
                    } else if mac.params.iter().any(|p| p.name == name) {
                        diags.push(bad(
                            "macro.parse.param.twice",
                            block.line,
                            &object,
                            format!("parameter `{name}` occurs twice"),
                        ));
                    } else {
                        let mut param = Param::new(name);
                        param.default = default;
                        mac.params.push(param);
                    }
                }
            }
            Err(e) => diags.push(bad(e.code(), block.line, &object, e.to_string())),
        }
    }

    let mut synopsis = None;
    let mut body = None;
    let mut docs: BTreeMap<&str, usize> = BTreeMap::new();
    for field in &block.fields {
        match field.key.as_str() {
            "synopsis" => {
                set_once(&mut synopsis, field, &object, &mut diags);
                no_attrs(field, &object, &mut diags);
            }
            "body" => {
                set_once(&mut body, field, &object, &mut diags);
                no_attrs(field, &object, &mut diags);
            }
            "example" => {
                mac.examples.push(field.value.clone());
                no_attrs(field, &object, &mut diags);
            }
            key => {
                let key = key.strip_prefix('$').unwrap_or(key);
                let Some(idx) = mac.params.iter().position(|p| p.name == key) else {
                    diags.push(bad("objfile.parse.field", field.line, &object, format!("unknown field `${key}`")));
                    continue;
                };
                if docs.insert(key, field.line).is_some() {
                    diags.push(bad(
                        "objfile.parse.field.twice",
                        field.line,
                        &object,
                        format!("field `${key}` occurs twice"),
                    ));
                }
                let param = &mut mac.params[idx];
                param.doc = field.value.clone();
                for attr in &field.attrs {
                    match (attr.key.as_str(), attr.value.as_str()) {
                        ("named", "yes") => param.named = true,
                        ("named", "no") => param.named = false,
                        _ => diags.push(bad(
                            "objfile.parse.attribute",
                            attr.line,
                            &object,
                            format!("unknown attribute `$${}: {}`", attr.key, attr.value),
                        )),
                    }
                }
            }
        }
    }
    mac.synopsis = synopsis.unwrap_or_default();
    mac.body = body.unwrap_or_default();
    diags.into_result().map(|()| mac)
}

fn build_include(block: &Block) -> Result<Include, Diagnostics> {
    let mut diags = Diagnostics::new();
    let object = format!("i4_{}", block.header);
    let mut content = None;
    for field in &block.fields {
        no_attrs(field, &object, &mut diags);
        match field.key.as_str() {
            "content" => set_once(&mut content, field, &object, &mut diags),
            key => diags.push(bad("objfile.parse.field", field.line, &object, format!("unknown field `${key}`"))),
        }
    }
    diags
        .into_result()
        .map(|()| Include::new(&block.header, &content.unwrap_or_default()))
}

fn build_lgcode(block: &Block) -> Result<Lgcode, Diagnostics> {
    let mut diags = Diagnostics::new();
    let object = format!("l4_{}", block.header);
    let mut lg = Lgcode::new(&block.header);
    let mut slots: BTreeMap<String, Option<String>> = BTreeMap::new();
    for field in &block.fields {
        no_attrs(field, &object, &mut diags);
        let key = field.key.as_str();
        let language = (key.len() == 1)
            .then(|| key.chars().next().and_then(Language::from_letter))
            .flatten();
        let known = language.is_some() || ["alias", "nature", "encoding"].contains(&key);
        if !known {
            diags.push(bad("objfile.parse.field", field.line, &object, format!("unknown field `${key}`")));
            continue;
        }
        let slot = slots.entry(key.to_string()).or_default();
        set_once(slot, field, &object, &mut diags);
        let value = field.value.clone();
        match key {
            "alias" => lg.alias = Some(value.trim().to_string()).filter(|a| !a.is_empty()),
            "nature" => match value.parse::<LgNature>() {
                Ok(nature) => lg.nature = nature,
                Err(other) => diags.push(bad(
                    "lgcode.parse.nature",
                    field.line,
                    &object,
                    format!("unknown nature `{other}`"),
                )),
            },
            "encoding" => match value.trim() {
                "" | "xml" => lg.encoding = value.trim().to_string(),
                other => diags.push(bad(
                    "lgcode.parse.encoding",
                    field.line,
                    &object,
                    format!("unknown encoding `{other}`"),
                )),
            },
            _ => {
                if let Some(language) = language {
                    *lg.text_mut(language) = value;
                }
            }
        }
    }
    diags.into_result().map(|()| lg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(kind: FileKind, text: &str) -> Result<ObjectFile, Diagnostics> {
        let release = ReleaseId::parse("1.00").unwrap();
        let path = match kind {
            FileKind::D => "/app/m.d",
            FileKind::I => "/app/i.i",
            FileKind::L => "/app/l.l",
        };
        ObjectFile::parse(&release, &QPath::parse(path).unwrap(), kind, text.as_bytes())
    }

    fn only_macro(file: &ObjectFile) -> &Macro {
        match &file.objects[0].body {
            ObjectBody::Macro(m) => m,
            other => panic!("expected macro, got {other:?}"),
        }
    }

    const GREET: &str = "// Greeting macros
macro GREET(name=\"Friend\", $greeting=«Hi, there»):
    $synopsis: Greets someone
    $name: who to greet
        $$named: yes
    $greeting: the salutation
    $example: m4_GREET(World)
    $body: Hi, $name!
";

    // ----- Macros -----

    #[test]
    fn parses_macro_block() {
        let file = parse(FileKind::D, GREET).unwrap();
        assert_eq!(file.preamble, "Greeting macros");
        let m = only_macro(&file);
        assert_eq!(m.id, "GREET");
        assert_eq!(m.synopsis, "Greets someone");
        assert_eq!(m.body, "Hi, $name!");
        assert_eq!(m.examples, vec!["m4_GREET(World)"]);
        assert_eq!(m.params.len(), 2);
        assert_eq!(m.params[0].default.as_deref(), Some("Friend"));
        assert!(m.params[0].named);
        assert_eq!(m.params[1].name, "greeting");
        assert_eq!(m.params[1].default.as_deref(), Some("Hi, there"));
        assert_eq!(file.objects[0].line, 2);
        assert!(file.lint().is_empty());
    }

    #[test]
    fn delimited_values_span_lines() {
        let text = "macro BOX:\n    $synopsis: x\n    $body: «line one\n  $notafield: kept\nmacro inside»\n";
        let file = parse(FileKind::D, text).unwrap();
        assert_eq!(only_macro(&file).body, "line one\n  $notafield: kept\nmacro inside");
    }

    #[test]
    fn undelimited_values_continue() {
        let text = "macro X:\n    $synopsis: first\n        second\n    $body: b\n";
        let file = parse(FileKind::D, text).unwrap();
        assert_eq!(only_macro(&file).synopsis, "first\nsecond");
    }

    #[test]
    fn unclosed_delimiter() {
        let err = parse(FileKind::D, "macro X:\n    $body: «never closed\n").unwrap_err();
        assert_eq!(err.codes(), vec!["objfile.parse.unclosed"]);
    }

    #[test]
    fn duplicate_parameter() {
        let err = parse(FileKind::D, "macro X(a, $a):\n    $body: b\n").unwrap_err();
        assert_eq!(err.codes(), vec!["macro.parse.param.twice"]);
    }

    #[test]
    fn unknown_attribute() {
        let text = "macro X(a):\n    $a: doc\n        $$color: red\n    $body: b\n";
        let err = parse(FileKind::D, text).unwrap_err();
        assert_eq!(err.codes(), vec!["objfile.parse.attribute"]);
    }

    // ----- Whole file -----

    #[test]
    fn duplicate_blocks_report_both_lines() {
        let text = "// dup\nmacro X:\n    $body: one\n\nmacro X:\n    $body: two\n";
        let err = parse(FileKind::D, text).unwrap_err();
        let d = err.iter().next().unwrap();
        assert_eq!(d.code, "objfile.lint.double");
        assert_eq!(d.line, Some(5));
        assert_eq!(d.message, "`m4_X` found at 2 and 5");
        assert_eq!(d.file.as_deref(), Some("/app/m.d"));
    }

    #[test]
    fn bad_blocks_do_not_hide_others() {
        let text = "macro A:\n    $bogus: 1\nmacro 9B:\n    $body: x\nmacro C:\n    $body: fine\nmacro C:\n    $body: again\n";
        let err = parse(FileKind::D, text).unwrap_err();
        assert_eq!(
            err.codes(),
            vec!["objfile.parse.field", "objfile.parse.name", "objfile.lint.double"]
        );
    }

    #[test]
    fn keyword_must_match_file_kind() {
        let err = parse(FileKind::L, "macro X:\n    $body: b\n").unwrap_err();
        assert_eq!(err.codes(), vec!["objfile.parse.keyword"]);
    }

    #[test]
    fn text_outside_blocks() {
        let err = parse(FileKind::I, "stray\ninclude a:\n    $content: c\n").unwrap_err();
        assert_eq!(err.codes(), vec!["objfile.parse.outside"]);
    }

    #[test]
    fn invalid_utf8_reports_line() {
        let release = ReleaseId::parse("1.00").unwrap();
        let path = QPath::parse("/a.i").unwrap();
        let err = ObjectFile::parse(&release, &path, FileKind::I, b"// ok\n\xff\n").unwrap_err();
        let d = err.iter().next().unwrap();
        assert_eq!(d.code, "objfile.lint.utf8");
        assert_eq!(d.line, Some(2));
    }

    #[test]
    fn lint_wants_preamble() {
        let file = parse(FileKind::I, "include a:\n    $content: c\n").unwrap();
        assert_eq!(file.lint().codes(), vec!["objfile.lint.preamble"]);
    }

    // ----- Includes and lgcodes -----

    #[test]
    fn parses_include() {
        let file = parse(FileKind::I, "// i\ninclude hdr:\n    $content: ⟦<b>m4_X</b>⟧\n").unwrap();
        match &file.objects[0].body {
            ObjectBody::Include(i) => assert_eq!(i.content, "<b>m4_X</b>"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_lgcode() {
        let text = "// l\nlgcode warn:\n    $N: Let op\n    $E: Warning\n    $nature: markdown\n";
        let file = parse(FileKind::L, text).unwrap();
        match &file.objects[0].body {
            ObjectBody::Lgcode(lg) => {
                assert_eq!(lg.text(Language::N), "Let op");
                assert_eq!(lg.text(Language::E), "Warning");
                assert_eq!(lg.nature, LgNature::Markdown);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lgcode_field_errors() {
        let text = "lgcode w:\n    $N: a\n    $N: b\n    $nature: html\n    $encoding: utf16\n";
        let err = parse(FileKind::L, text).unwrap_err();
        assert_eq!(
            err.codes(),
            vec!["objfile.parse.field.twice", "lgcode.parse.nature", "lgcode.parse.encoding"]
        );
    }

    #[test]
    fn alias_lint_surfaces_through_file() {
        let text = "// l\nlgcode a:\n    $alias: b\n    $E: text\n";
        let file = parse(FileKind::L, text).unwrap();
        let lint = file.lint();
        assert_eq!(lint.codes(), vec!["lgcode.lint.alias.nonempty"]);
        assert_eq!(lint.iter().next().unwrap().line, Some(2));
    }
}
