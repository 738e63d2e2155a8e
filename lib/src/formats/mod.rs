//! Datatype/value formatters shared by both conversion directions.
//!
//! Parsing turns a CSV cell into the canonical XSD lexical form of its datatype (or a message
//! explaining why it is invalid); formatting renders a canonical lexical value back into the
//! textual `format` a column declares. The builtin datatype hierarchy used for inference lives
//! here as well.

pub mod boolean;
pub mod datetime;
pub mod duration;
pub mod numeric;
pub mod other;

use crate::consts::{CSVW_NS, RDF_NS, XSD_NS};
use serde_json::Value;
use std::cmp::Ordering;

pub const ROOT_DATATYPE: &str = "anyAtomicType";

/// Builtin datatypes and their parent in the derivation hierarchy.
const HIERARCHY: &[(&str, &str)] = &[
    ("anyURI", ROOT_DATATYPE),
    ("base64Binary", ROOT_DATATYPE),
    ("boolean", ROOT_DATATYPE),
    ("date", ROOT_DATATYPE),
    ("dateTime", ROOT_DATATYPE),
    ("dateTimeStamp", "dateTime"),
    ("decimal", ROOT_DATATYPE),
    ("integer", "decimal"),
    ("long", "integer"),
    ("int", "long"),
    ("short", "int"),
    ("byte", "short"),
    ("nonNegativeInteger", "integer"),
    ("positiveInteger", "nonNegativeInteger"),
    ("unsignedLong", "nonNegativeInteger"),
    ("unsignedInt", "unsignedLong"),
    ("unsignedShort", "unsignedInt"),
    ("unsignedByte", "unsignedShort"),
    ("nonPositiveInteger", "integer"),
    ("negativeInteger", "nonPositiveInteger"),
    ("double", ROOT_DATATYPE),
    ("float", ROOT_DATATYPE),
    ("duration", ROOT_DATATYPE),
    ("dayTimeDuration", "duration"),
    ("yearMonthDuration", "duration"),
    ("gDay", ROOT_DATATYPE),
    ("gMonth", ROOT_DATATYPE),
    ("gMonthDay", ROOT_DATATYPE),
    ("gYear", ROOT_DATATYPE),
    ("gYearMonth", ROOT_DATATYPE),
    ("hexBinary", ROOT_DATATYPE),
    ("QName", ROOT_DATATYPE),
    ("string", ROOT_DATATYPE),
    ("normalizedString", "string"),
    ("token", "normalizedString"),
    ("language", "token"),
    ("Name", "token"),
    ("NCName", "Name"),
    ("NMTOKEN", "token"),
    ("xml", "string"),
    ("html", "string"),
    ("json", "string"),
    ("time", ROOT_DATATYPE),
];

/// Maps the CSVW datatype aliases to the name used everywhere else.
pub fn canonical_name(name: &str) -> &str {
    match name {
        "number" => "double",
        "binary" => "base64Binary",
        "datetime" => "dateTime",
        "any" => ROOT_DATATYPE,
        other => other,
    }
}

pub fn is_builtin(name: &str) -> bool {
    let name = canonical_name(name);
    name == ROOT_DATATYPE || HIERARCHY.iter().any(|(n, _)| *n == name)
}

pub fn parent_of(name: &str) -> Option<&'static str> {
    let name = canonical_name(name);
    HIERARCHY
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, parent)| *parent)
}

/// Path from the root to `name`, both included.
fn path_from_root(name: &str) -> Vec<&'static str> {
    let mut path = vec![];
    let mut current = HIERARCHY
        .iter()
        .find(|(n, _)| *n == canonical_name(name))
        .map(|(n, _)| *n);
    while let Some(dt) = current {
        path.push(dt);
        current = parent_of(dt);
    }
    path.push(ROOT_DATATYPE);
    path.reverse();
    path
}

/// True when `name` is `ancestor` or derives from it.
pub fn derives_from(name: &str, ancestor: &str) -> bool {
    path_from_root(name).contains(&canonical_name(ancestor))
}

/// Least common ancestor of two builtin datatypes.
pub fn join_datatypes(a: &str, b: &str) -> &'static str {
    let mut pa = path_from_root(a);
    let mut pb = path_from_root(b);
    let len = pa.len().min(pb.len());
    pa.truncate(len);
    pb.truncate(len);
    while let (Some(x), Some(y)) = (pa.last(), pb.last()) {
        if x == y {
            return *x;
        }
        pa.pop();
        pb.pop();
    }
    ROOT_DATATYPE
}

/// IRI of a builtin datatype.
pub fn datatype_iri(name: &str) -> String {
    match canonical_name(name) {
        "xml" => format!("{RDF_NS}XMLLiteral"),
        "html" => format!("{RDF_NS}HTML"),
        "json" => format!("{CSVW_NS}JSON"),
        other => format!("{XSD_NS}{other}"),
    }
}

/// Inverse of [`datatype_iri`]; `None` for IRIs that are not builtin datatypes.
pub fn datatype_from_iri(iri: &str) -> Option<&'static str> {
    let local = if let Some(local) = iri.strip_prefix(XSD_NS) {
        local
    } else {
        match iri.strip_prefix(RDF_NS) {
            Some("XMLLiteral") => "xml",
            Some("HTML") => "html",
            Some(_) => return None,
            None if iri == format!("{CSVW_NS}JSON") => "json",
            None => return None,
        }
    };
    if local == ROOT_DATATYPE || local == "anySimpleType" {
        return Some(ROOT_DATATYPE);
    }
    HIERARCHY.iter().find(|(n, _)| *n == local).map(|(n, _)| *n)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    Boolean,
    Numeric,
    DateTime,
    Duration,
    Other,
}

pub fn shape_of(base: &str) -> ValueShape {
    let base = canonical_name(base);
    if base == "boolean" {
        ValueShape::Boolean
    } else if derives_from(base, "decimal") || base == "double" || base == "float" {
        ValueShape::Numeric
    } else if derives_from(base, "duration") {
        ValueShape::Duration
    } else if datetime::is_datetime_type(base) {
        ValueShape::DateTime
    } else {
        ValueShape::Other
    }
}

/// The `format` annotation of a datatype. For numbers it may carry a pattern plus decimal and
/// grouping characters; for every other shape only the pattern is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatSpec {
    pub pattern: Option<String>,
    pub decimal_char: Option<String>,
    pub group_char: Option<String>,
}

impl FormatSpec {
    pub fn pattern(pattern: &str) -> Self {
        Self {
            pattern: Some(pattern.to_string()),
            ..Self::default()
        }
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::pattern(s)),
            Value::Object(map) => {
                let get = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
                Some(Self {
                    pattern: get("pattern"),
                    decimal_char: get("decimalChar"),
                    group_char: get("groupChar"),
                })
            }
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        if self.decimal_char.is_none() && self.group_char.is_none() {
            if let Some(p) = &self.pattern {
                return Value::String(p.clone());
            }
        }
        let mut map = serde_json::Map::new();
        if let Some(p) = &self.pattern {
            map.insert("pattern".into(), Value::String(p.clone()));
        }
        if let Some(d) = &self.decimal_char {
            map.insert("decimalChar".into(), Value::String(d.clone()));
        }
        if let Some(g) = &self.group_char {
            map.insert("groupChar".into(), Value::String(g.clone()));
        }
        Value::Object(map)
    }
}

/// Whitespace handling that precedes parsing: preserved for `string` and its non-token
/// descendants, tabs and line breaks replaced for `normalizedString`, collapsed otherwise.
pub fn normalize_whitespace(base: &str, value: &str) -> String {
    match canonical_name(base) {
        "string" | "json" | "xml" | "html" | ROOT_DATATYPE => value.to_string(),
        "normalizedString" => value.replace(['\t', '\r', '\n'], " "),
        _ => value.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

/// Parses a cell value into the canonical lexical form of `base`. `Err` carries a message
/// describing why the value is invalid.
pub fn parse_value(base: &str, format: Option<&FormatSpec>, value: &str) -> Result<String, String> {
    let base = canonical_name(base);
    match shape_of(base) {
        ValueShape::Boolean => boolean::parse(value, format),
        ValueShape::Numeric => numeric::parse(base, value, format),
        ValueShape::DateTime => datetime::parse(base, value, format),
        ValueShape::Duration => duration::parse(base, value, format),
        ValueShape::Other => other::parse(base, value, format),
    }
}

/// Renders a canonical lexical value with the column's format. Values the formatter cannot
/// handle are returned unchanged.
pub fn format_value(base: &str, format: Option<&FormatSpec>, lexical: &str) -> String {
    let base = canonical_name(base);
    let Some(format) = format else {
        return lexical.to_string();
    };
    match shape_of(base) {
        ValueShape::Boolean => boolean::format(lexical, format),
        ValueShape::Numeric => numeric::format(lexical, format),
        ValueShape::DateTime => datetime::format(base, lexical, format),
        ValueShape::Duration | ValueShape::Other => lexical.to_string(),
    }
}

/// Orders two canonical values of the same datatype, when they are comparable.
pub fn compare_values(base: &str, a: &str, b: &str) -> Option<Ordering> {
    let base = canonical_name(base);
    match shape_of(base) {
        ValueShape::Numeric => numeric::compare(a, b),
        ValueShape::DateTime => datetime::compare(base, a, b),
        ValueShape::Duration => duration::compare(a, b),
        ValueShape::Boolean | ValueShape::Other => None,
    }
}

/// Length used by the `length`/`minLength`/`maxLength` constraints: bytes for binary types,
/// characters otherwise.
pub fn value_length(base: &str, lexical: &str) -> usize {
    match canonical_name(base) {
        "hexBinary" => lexical.len() / 2,
        "base64Binary" => {
            let data = lexical.trim_end_matches('=');
            data.len() * 3 / 4
        }
        _ => lexical.chars().count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_datatypes() {
        assert_eq!(join_datatypes("int", "decimal"), "decimal");
        assert_eq!(join_datatypes("int", "string"), ROOT_DATATYPE);
        assert_eq!(join_datatypes("byte", "long"), "long");
        assert_eq!(join_datatypes("positiveInteger", "negativeInteger"), "integer");
        assert_eq!(join_datatypes("string", "string"), "string");
        assert_eq!(join_datatypes("dateTimeStamp", "date"), ROOT_DATATYPE);
    }

    #[test]
    fn test_datatype_iris() {
        assert_eq!(datatype_iri("number"), format!("{XSD_NS}double"));
        assert_eq!(datatype_iri("json"), format!("{CSVW_NS}JSON"));
        assert_eq!(datatype_from_iri(&format!("{XSD_NS}int")), Some("int"));
        assert_eq!(datatype_from_iri(&format!("{RDF_NS}HTML")), Some("html"));
        assert_eq!(datatype_from_iri("http://ex.org/custom"), None);
    }

    #[test]
    fn test_shapes() {
        assert_eq!(shape_of("unsignedByte"), ValueShape::Numeric);
        assert_eq!(shape_of("number"), ValueShape::Numeric);
        assert_eq!(shape_of("gYearMonth"), ValueShape::DateTime);
        assert_eq!(shape_of("dayTimeDuration"), ValueShape::Duration);
        assert_eq!(shape_of("NCName"), ValueShape::Other);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("string", " a  b "), " a  b ");
        assert_eq!(normalize_whitespace("normalizedString", "a\tb\n"), "a b ");
        assert_eq!(normalize_whitespace("integer", "  1 "), "1");
    }

    #[test]
    fn test_format_spec_from_json() {
        let spec = FormatSpec::from_json(&serde_json::json!({"pattern": "#,##0.0", "groupChar": "."}))
            .unwrap();
        assert_eq!(spec.group_char.as_deref(), Some("."));
        assert_eq!(spec.to_json(), serde_json::json!({"pattern": "#,##0.0", "groupChar": "."}));
    }
}
