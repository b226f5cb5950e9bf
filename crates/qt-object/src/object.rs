use std::collections::BTreeSet;

use qt_types::{Diagnostic, ObjectKind, ObjectName, QPath, ReleaseId, TypeError};
use serde_json::Value;

use crate::error::{ObjectError, ObjectResult};
use crate::include::Include;
use crate::lgcode::Lgcode;
use crate::macros::Macro;
use crate::token;

/// The closed set of object variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectBody {
    Macro(Macro),
    Include(Include),
    Lgcode(Lgcode),
}

impl ObjectBody {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Macro(_) => ObjectKind::Macro,
            Self::Include(_) => ObjectKind::Include,
            Self::Lgcode(_) => ObjectKind::Lgcode,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Macro(m) => &m.id,
            Self::Include(i) => &i.id,
            Self::Lgcode(l) => &l.id,
        }
    }

    /// Text whose references are this object's dependencies.
    pub fn deps_text(&self) -> String {
        match self {
            Self::Macro(m) => m.deps_text(),
            Self::Include(i) => i.content.clone(),
            Self::Lgcode(l) => l.deps_text(),
        }
    }

    pub fn lint(&self) -> Vec<Diagnostic> {
        match self {
            Self::Macro(m) => m.lint(),
            Self::Include(_) => Vec::new(),
            Self::Lgcode(l) => l.lint(),
        }
    }

    fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Self::Macro(m) => serde_json::to_value(m),
            Self::Include(i) => serde_json::to_value(i),
            Self::Lgcode(l) => serde_json::to_value(l),
        }
    }

    fn from_value(kind: ObjectKind, value: Value) -> serde_json::Result<Option<Self>> {
        Ok(match kind {
            ObjectKind::Macro => Some(Self::Macro(serde_json::from_value(value)?)),
            ObjectKind::Include => Some(Self::Include(serde_json::from_value(value)?)),
            ObjectKind::Lgcode => Some(Self::Lgcode(serde_json::from_value(value)?)),
            ObjectKind::Text | ObjectKind::Registry => None,
        })
    }
}

/// A stored object: a body plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    name: ObjectName,
    pub release: ReleaseId,
    /// The object file that defines it.
    pub source: QPath,
    /// Line of the defining block header.
    pub line: usize,
    pub body: ObjectBody,
}

impl Object {
    pub fn new(
        release: ReleaseId,
        source: QPath,
        line: usize,
        body: ObjectBody,
    ) -> Result<Self, TypeError> {
        let name = ObjectName::new(body.kind(), body.id())?;
        Ok(Self {
            name,
            release,
            source,
            line,
            body,
        })
    }

    pub fn name(&self) -> &ObjectName {
        &self.name
    }

    /// Names this object refers to, excluding itself.
    pub fn references(&self) -> BTreeSet<ObjectName> {
        let mut refs = token::references(&self.body.deps_text());
        refs.remove(&self.name);
        refs
    }

    /// Serialize to the on-disk JSON record.
    pub fn to_record(&self) -> ObjectResult<Vec<u8>> {
        let corrupt = |e: serde_json::Error| ObjectError::Corrupt {
            object: self.name.to_string(),
            reason: e.to_string(),
        };
        let mut value = self.body.to_value().map_err(corrupt)?;
        if let Value::Object(map) = &mut value {
            map.insert("source".into(), Value::String(self.source.to_string()));
            map.insert("line".into(), Value::from(self.line));
        }
        serde_json::to_vec_pretty(&value).map_err(corrupt)
    }

    /// Decode a record stored under `name` in `release`.
    pub fn from_record(name: &ObjectName, release: ReleaseId, data: &[u8]) -> ObjectResult<Self> {
        let corrupt = |reason: String| ObjectError::Corrupt {
            object: name.to_string(),
            reason,
        };
        let mut value: Value = serde_json::from_slice(data).map_err(|e| corrupt(e.to_string()))?;
        let map = value
            .as_object_mut()
            .ok_or_else(|| corrupt("record is not a JSON object".into()))?;
        let source = map
            .remove("source")
            .and_then(|v| v.as_str().map(QPath::parse))
            .ok_or_else(|| corrupt("missing `source`".into()))?
            .map_err(|e| corrupt(e.to_string()))?;
        let line = map.remove("line").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let body = ObjectBody::from_value(name.kind(), value)
            .map_err(|e| corrupt(e.to_string()))?
            .ok_or_else(|| corrupt("kind is not stored".into()))?;
        if body.id() != name.name() {
            return Err(corrupt(format!("record holds `{}`", body.id())));
        }
        Ok(Self {
            name: name.clone(),
            release,
            source,
            line,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::Param;

    fn release() -> ReleaseId {
        ReleaseId::parse("1.00").unwrap()
    }

    fn source() -> QPath {
        QPath::parse("/app/macros.d").unwrap()
    }

    fn greet() -> Object {
        let mut m = Macro::new("GREET");
        m.params.push(Param::new("name"));
        m.body = "Hi, $name! m4_OTHER i4_hdr m4_GREET".into();
        Object::new(release(), source(), 3, ObjectBody::Macro(m)).unwrap()
    }

    #[test]
    fn name_follows_variant() {
        let obj = greet();
        assert_eq!(obj.name().to_string(), "m4_GREET");
        let lg = Object::new(release(), source(), 1, ObjectBody::Lgcode(Lgcode::new("w"))).unwrap();
        assert_eq!(lg.name().to_string(), "l4_w");
    }

    #[test]
    fn invalid_id_is_rejected() {
        let bad = Object::new(release(), source(), 1, ObjectBody::Include(Include::new("9x", "")));
        assert!(bad.is_err());
    }

    #[test]
    fn references_exclude_self() {
        let refs: Vec<String> = greet().references().iter().map(ToString::to_string).collect();
        assert_eq!(refs, vec!["m4_OTHER", "i4_hdr"]);
    }

    #[test]
    fn record_roundtrip() {
        let obj = greet();
        let data = obj.to_record().unwrap();
        let back = Object::from_record(obj.name(), release(), &data).unwrap();
        assert_eq!(back, obj);
    }

    #[test]
    fn record_is_stable() {
        assert_eq!(greet().to_record().unwrap(), greet().to_record().unwrap());
    }

    #[test]
    fn corrupt_records_are_reported() {
        let name = ObjectName::parse("m4_GREET").unwrap();
        for data in [&b"not json"[..], b"[1]", br#"{"id": "GREET"}"#, br#"{"id": "X", "source": "/a"}"#] {
            let err = Object::from_record(&name, release(), data).unwrap_err();
            assert_eq!(err.code(), "object.record.corrupt");
        }
    }
}
