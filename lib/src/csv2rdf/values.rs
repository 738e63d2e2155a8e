//! Cell decoding: whitespace normalization, defaults, null matching, list splitting, datatype
//! parsing and constraint checks.

use super::table::ColumnContext;
use crate::consts::INVALID_VALUE_PREFIX;
use crate::descriptor::Datatype;
use crate::formats;
use crate::issues::{IssueTracker, Location};
use crate::template::TemplateValue;
use oxigraph::model::{Literal, NamedNode};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Null,
    Single(String),
    List(Vec<String>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// The value as seen by URI templates; invalid markers are removed.
    pub fn template_value(&self) -> Option<TemplateValue> {
        match self {
            CellValue::Null => None,
            CellValue::Single(s) => Some(TemplateValue::from(strip_invalid(s))),
            CellValue::List(items) => Some(TemplateValue::List(
                items.iter().map(|i| strip_invalid(i).to_string()).collect(),
            )),
        }
    }

    /// Canonical text used to compare key values across rows.
    pub fn key_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Single(s) => Some(strip_invalid(s).to_string()),
            CellValue::List(items) => Some(
                items
                    .iter()
                    .map(|i| strip_invalid(i))
                    .collect::<Vec<_>>()
                    .join("\u{1f}"),
            ),
        }
    }

    pub fn items(&self) -> Vec<&str> {
        match self {
            CellValue::Null => vec![],
            CellValue::Single(s) => vec![s.as_str()],
            CellValue::List(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

pub fn strip_invalid(lexical: &str) -> &str {
    lexical.strip_prefix(INVALID_VALUE_PREFIX).unwrap_or(lexical)
}

fn mark_invalid(value: &str) -> String {
    format!("{INVALID_VALUE_PREFIX}{value}")
}

/// Decodes one raw cell of `column`.
pub fn decode_cell(
    raw: &str,
    column: &ColumnContext,
    issues: &IssueTracker,
    location: &Location,
) -> CellValue {
    let base = column.base();
    let mut value = formats::normalize_whitespace(base, raw);
    if value.is_empty() {
        value = column.default.clone();
    }
    if column.null.contains(&value) {
        return CellValue::Null;
    }
    let Some(separator) = &column.separator else {
        return CellValue::Single(decode_item(&value, column, issues, location));
    };
    if value.is_empty() {
        return CellValue::List(vec![]);
    }
    let items = value
        .split(separator.as_str())
        .map(|item| formats::normalize_whitespace(base, item))
        .filter(|item| !column.null.contains(item))
        .map(|item| decode_item(&item, column, issues, location))
        .collect();
    CellValue::List(items)
}

fn decode_item(value: &str, column: &ColumnContext, issues: &IssueTracker, location: &Location) -> String {
    let base = column.base();
    let tolerant = base == "string";
    let lexical = match formats::parse_value(base, column.format.as_ref(), value) {
        Ok(lexical) => lexical,
        Err(_) if tolerant => value.to_string(),
        Err(message) => {
            issues.warning(
                format!("Invalid value '{value}' for datatype {base}: {message}"),
                Some(location.clone()),
            );
            return mark_invalid(value);
        }
    };
    match check_constraints(&lexical, &column.datatype) {
        Err(_) if tolerant => lexical,
        Err(message) => {
            issues.warning(
                format!("Value '{value}' violates its datatype: {message}"),
                Some(location.clone()),
            );
            mark_invalid(value)
        }
        Ok(()) => lexical,
    }
}

/// Length and range constraints of a datatype.
pub fn check_constraints(lexical: &str, datatype: &Datatype) -> Result<(), String> {
    let base = datatype.base_name();
    let length = formats::value_length(base, lexical);
    if let Some(expected) = datatype.length {
        if length != expected {
            return Err(format!("length {length} is not {expected}"));
        }
    }
    if let Some(min) = datatype.min_length {
        if length < min {
            return Err(format!("length {length} is below minLength {min}"));
        }
    }
    if let Some(max) = datatype.max_length {
        if length > max {
            return Err(format!("length {length} exceeds maxLength {max}"));
        }
    }
    let checks: [(&Option<serde_json::Value>, &str, fn(Ordering) -> bool); 6] = [
        (&datatype.minimum, "minimum", |o| o != Ordering::Less),
        (&datatype.min_inclusive, "minInclusive", |o| o != Ordering::Less),
        (&datatype.maximum, "maximum", |o| o != Ordering::Greater),
        (&datatype.max_inclusive, "maxInclusive", |o| o != Ordering::Greater),
        (&datatype.min_exclusive, "minExclusive", |o| o == Ordering::Greater),
        (&datatype.max_exclusive, "maxExclusive", |o| o == Ordering::Less),
    ];
    for (bound, label, accept) in checks {
        let Some(bound) = Datatype::bound(bound) else {
            continue;
        };
        if let Some(ordering) = formats::compare_values(base, lexical, &bound) {
            if !accept(ordering) {
                return Err(format!("{lexical} violates {label} {bound}"));
            }
        }
    }
    Ok(())
}

/// The RDF literal for one decoded value of `column`.
pub fn make_literal(lexical: &str, column: &ColumnContext) -> Literal {
    let datatype = &column.datatype;
    if datatype.id.is_none() && column.base() == "string" {
        if let Some(lang) = column.lang.as_deref().filter(|l| *l != "und") {
            if let Ok(literal) = Literal::new_language_tagged_literal(lexical, lang) {
                return literal;
            }
        }
        return Literal::new_simple_literal(lexical);
    }
    match NamedNode::new(datatype.iri()) {
        Ok(iri) => Literal::new_typed_literal(lexical, iri),
        Err(_) => Literal::new_simple_literal(lexical),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv2rdf::table::ColumnContext;
    use crate::formats::FormatSpec;

    fn column(base: &str) -> ColumnContext {
        ColumnContext {
            index: 0,
            source_column: Some(1),
            name: "c".into(),
            titles: vec![],
            is_virtual: false,
            suppress: false,
            about_url: None,
            property_url: None,
            value_url: None,
            datatype: Datatype::builtin(base),
            format: None,
            default: String::new(),
            null: vec![String::new()],
            lang: None,
            separator: None,
            ordered: false,
            required: false,
        }
    }

    #[test]
    fn test_null_and_default() {
        let issues = IssueTracker::collecting();
        let loc = Location::default();
        let mut col = column("integer");
        assert_eq!(decode_cell("", &col, &issues, &loc), CellValue::Null);
        col.default = "7".into();
        assert_eq!(decode_cell("  ", &col, &issues, &loc), CellValue::Single("7".into()));
        col.null = vec!["-".into()];
        assert_eq!(decode_cell("-", &col, &issues, &loc), CellValue::Null);
    }

    #[test]
    fn test_invalid_values_are_marked() {
        let issues = IssueTracker::collecting();
        let loc = Location::default();
        let col = column("integer");
        let value = decode_cell("abc", &col, &issues, &loc);
        assert_eq!(value, CellValue::Single("@@invalid@@abc".into()));
        assert_eq!(issues.get_warnings().len(), 1);
        assert_eq!(value.template_value(), Some(TemplateValue::from("abc")));
    }

    #[test]
    fn test_lists_and_ranges() {
        let issues = IssueTracker::collecting();
        let loc = Location::default();
        let mut col = column("integer");
        col.separator = Some(" ".into());
        col.datatype.maximum = Some(serde_json::json!(10));
        let value = decode_cell("1 5 12", &col, &issues, &loc);
        assert_eq!(
            value,
            CellValue::List(vec!["1".into(), "5".into(), "@@invalid@@12".into()])
        );
    }

    #[test]
    fn test_string_format_mismatch_is_tolerated() {
        let issues = IssueTracker::collecting();
        let mut col = column("string");
        col.format = Some(FormatSpec::pattern("[a-z]+"));
        col.datatype.max_length = Some(2);
        let value = decode_cell("ABC", &col, &issues, &Location::default());
        assert_eq!(value, CellValue::Single("ABC".into()));
        assert!(issues.get_warnings().is_empty());
    }

    #[test]
    fn test_literals() {
        let mut col = column("string");
        col.lang = Some("en".into());
        assert_eq!(make_literal("x", &col).language(), Some("en"));
        let col = column("integer");
        assert_eq!(
            make_literal("1", &col).datatype().as_str(),
            "http://www.w3.org/2001/XMLSchema#integer"
        );
    }
}
