use std::fmt;

use qt_object::FileKind;
use qt_types::QPath;
use serde::{Deserialize, Serialize};

use crate::project::{Project, PROJECT_FILE};

/// Object-family file kind, from the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    B,
    D,
    I,
    L,
    M,
    X,
}

impl SourceKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "b" => Some(Self::B),
            "d" => Some(Self::D),
            "i" => Some(Self::I),
            "l" => Some(Self::L),
            "m" => Some(Self::M),
            "x" => Some(Self::X),
            _ => None,
        }
    }

    /// Extensions holding routine code.
    pub fn is_mumps(self) -> bool {
        matches!(self, Self::B | Self::L | Self::M | Self::X)
    }

    /// Object-file kind for `.d`, `.i` and `.l`.
    pub fn object_file(self) -> Option<FileKind> {
        match self {
            Self::D => Some(FileKind::D),
            Self::I => Some(FileKind::I),
            Self::L => Some(FileKind::L),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::B => "bfile",
            Self::D => "dfile",
            Self::I => "ifile",
            Self::L => "lfile",
            Self::M => "mfile",
            Self::X => "xfile",
        }
    }
}

/// Classification tags of a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nature {
    pub text: bool,
    pub binary: bool,
    pub config: bool,
    pub objectfile: bool,
    pub auto: bool,
    pub mumps: bool,
    pub nolint: bool,
    pub kind: Option<SourceKind>,
}

impl Nature {
    /// Classify `path` given the project it belongs to, if any.
    ///
    /// A `project.json` is configuration unless the enclosing project lists
    /// it under `notconfig`; `enclosing` is the project strictly above the
    /// file's own directory.
    pub fn compute(path: &QPath, project: Option<&Project>, enclosing: Option<&Project>) -> Self {
        let mut nature = Nature {
            text: true,
            ..Self::default()
        };

        if path.base_name() == PROJECT_FILE {
            let excluded = enclosing
                .and_then(|p| p.relative(path).map(|rel| p.is_not_config(rel)))
                .unwrap_or(false);
            if !excluded {
                nature.config = true;
                return nature;
            }
        }

        let rel = project.and_then(|p| p.relative(path).map(|rel| (p, rel)));
        if let Some((p, rel)) = rel {
            if p.is_binary(rel) {
                nature.text = false;
                nature.binary = true;
                return nature;
            }
        }

        let Some(kind) = path.extension().and_then(SourceKind::from_extension) else {
            return nature;
        };
        if let Some((p, rel)) = rel {
            if p.is_not_brocade(rel) {
                nature.nolint = true;
                return nature;
            }
        }
        nature.kind = Some(kind);
        nature.auto = true;
        nature.mumps = kind.is_mumps();
        nature.objectfile = kind.object_file().is_some();
        nature
    }

    /// Object-file kind when this is an object file.
    pub fn object_file(&self) -> Option<FileKind> {
        if !self.objectfile {
            return None;
        }
        self.kind.and_then(SourceKind::object_file)
    }

    /// Names of the set tags, in a fixed order.
    pub fn tags(&self) -> Vec<&'static str> {
        let flags = [
            (self.text, "text"),
            (self.binary, "binary"),
            (self.config, "config"),
            (self.objectfile, "objectfile"),
            (self.auto, "auto"),
            (self.mumps, "mumps"),
            (self.nolint, "nolint"),
        ];
        let mut tags: Vec<&'static str> = flags
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, tag)| *tag)
            .collect();
        if let Some(kind) = self.kind {
            tags.push(kind.tag());
        }
        tags
    }
}

impl fmt::Display for Nature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tags().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectConfig;

    fn path(s: &str) -> QPath {
        QPath::parse(s).unwrap()
    }

    fn project(root: &str, json: &str) -> Project {
        Project::new(path(root), ProjectConfig::parse(json.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn plain_text_without_project() {
        let n = Nature::compute(&path("/app/readme.txt"), None, None);
        assert_eq!(n.tags(), vec!["text"]);
    }

    #[test]
    fn object_files() {
        let p = project("/app", "{}");
        let n = Nature::compute(&path("/app/lib/objects.d"), Some(&p), None);
        assert!(n.text && n.objectfile && n.auto && !n.mumps);
        assert_eq!(n.object_file(), Some(FileKind::D));
        assert_eq!(n.kind, Some(SourceKind::D));

        let n = Nature::compute(&path("/app/lib/words.l"), Some(&p), None);
        assert!(n.objectfile && n.mumps);
        assert_eq!(n.object_file(), Some(FileKind::L));
    }

    #[test]
    fn routines_are_mumps_but_not_object_files() {
        let n = Nature::compute(&path("/app/run.m"), None, None);
        assert!(n.mumps && n.auto && !n.objectfile);
        assert_eq!(n.to_string(), "text auto mumps mfile");
    }

    #[test]
    fn config_file() {
        let n = Nature::compute(&path("/app/project.json"), None, None);
        assert!(n.config && n.text);
        assert!(!n.objectfile);
    }

    #[test]
    fn notconfig_in_enclosing_project() {
        let outer = project("/app", r#"{"notconfig": ["fixtures/*"]}"#);
        let n = Nature::compute(&path("/app/fixtures/project.json"), Some(&outer), Some(&outer));
        assert!(!n.config);
        let n = Nature::compute(&path("/app/sub/project.json"), Some(&outer), Some(&outer));
        assert!(n.config);
    }

    #[test]
    fn binary_and_notbrocade_rules() {
        let p = project("/app", r#"{"binary": ["*.png"], "notbrocade": ["vendor/*"]}"#);
        let n = Nature::compute(&path("/app/logo.png"), Some(&p), None);
        assert!(n.binary && !n.text);
        let n = Nature::compute(&path("/app/vendor/objects.d"), Some(&p), None);
        assert!(n.text && n.nolint && !n.objectfile && n.kind.is_none());
    }
}
