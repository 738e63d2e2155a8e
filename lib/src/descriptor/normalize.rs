//! Turns a raw CSVW metadata document into the canonical form the convertors consume.
//!
//! The pipeline validates JSON-LD keywords and language tags, inlines referenced
//! `tableSchema`/`dialect` documents, normalizes property values (link properties resolved,
//! natural language properties turned into language maps, datatypes turned into objects) and
//! moves every non-CSVW property into a side channel keyed by a synthetic id.

use super::jsonld::{expand_iri, expand_key, is_external_key, Context};
use super::lang::is_valid_language_tag;
use super::model::{Descriptor, Table, TableGroup};
use super::{DescriptorWrapper, ExternalProperties};
use crate::formats;
use crate::io::Fetcher;
use crate::issues::IssueTracker;
use anyhow::{anyhow, Result};
use log::debug;
use serde_json::{Map, Value};

/// A descriptor as text or as already parsed JSON.
#[derive(Debug, Clone)]
pub enum DescriptorInput {
    Text(String),
    Json(Value),
}

impl From<&str> for DescriptorInput {
    fn from(s: &str) -> Self {
        DescriptorInput::Text(s.to_string())
    }
}

impl From<String> for DescriptorInput {
    fn from(s: String) -> Self {
        DescriptorInput::Text(s)
    }
}

impl From<Value> for DescriptorInput {
    fn from(v: Value) -> Self {
        DescriptorInput::Json(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Group,
    Table,
    Schema,
    Column,
    Dialect,
    Datatype,
}

const INHERITED: &[&str] = &[
    "aboutUrl",
    "datatype",
    "default",
    "lang",
    "null",
    "ordered",
    "propertyUrl",
    "required",
    "separator",
    "textDirection",
    "valueUrl",
];

impl Kind {
    fn type_name(self) -> &'static str {
        match self {
            Kind::Group => "TableGroup",
            Kind::Table => "Table",
            Kind::Schema => "Schema",
            Kind::Column => "Column",
            Kind::Dialect => "Dialect",
            Kind::Datatype => "Datatype",
        }
    }

    fn own_keys(self) -> &'static [&'static str] {
        match self {
            Kind::Group => &["tables", "tableSchema", "dialect", "tableDirection", "transformations"],
            Kind::Table => &[
                "url",
                "tableSchema",
                "dialect",
                "suppressOutput",
                "tableDirection",
                "transformations",
            ],
            Kind::Schema => &["columns", "primaryKey", "rowTitles", "foreignKeys"],
            Kind::Column => &["name", "titles", "suppressOutput", "virtual"],
            Kind::Dialect => &[
                "commentPrefix",
                "delimiter",
                "doubleQuote",
                "encoding",
                "header",
                "headerRowCount",
                "lineTerminators",
                "quoteChar",
                "skipBlankRows",
                "skipColumns",
                "skipInitialSpace",
                "skipRows",
                "trim",
            ],
            Kind::Datatype => &[
                "base",
                "format",
                "length",
                "minLength",
                "maxLength",
                "minimum",
                "maximum",
                "minInclusive",
                "maxInclusive",
                "minExclusive",
                "maxExclusive",
            ],
        }
    }

    fn inherits(self) -> bool {
        matches!(self, Kind::Group | Kind::Table | Kind::Schema | Kind::Column)
    }

    fn knows(self, key: &str) -> bool {
        matches!(key, "@id" | "@type")
            || self.own_keys().contains(&key)
            || (self.inherits() && INHERITED.contains(&key))
    }
}

const ALLOWED_KEYWORDS: &[&str] = &["@id", "@type", "@value", "@language", "@list", "@set"];

const BOOLEAN_KEYS: &[&str] = &[
    "ordered",
    "required",
    "suppressOutput",
    "virtual",
    "doubleQuote",
    "header",
    "skipBlankRows",
    "skipInitialSpace",
];

const COUNT_KEYS: &[&str] = &[
    "headerRowCount",
    "skipRows",
    "skipColumns",
    "length",
    "minLength",
    "maxLength",
];

const STRING_KEYS: &[&str] = &[
    "aboutUrl",
    "propertyUrl",
    "valueUrl",
    "default",
    "lang",
    "textDirection",
    "tableDirection",
    "name",
    "url",
    "commentPrefix",
    "delimiter",
    "encoding",
    "base",
];

struct Normalizer<'a> {
    fetcher: &'a Fetcher,
    issues: &'a IssueTracker,
    context: Context,
    base: Option<String>,
    externals: ExternalProperties,
}

/// Normalizes a descriptor. `url` is the location the descriptor was retrieved from; it is
/// the base for relative links and replaces an invalid `@id`.
pub fn normalize(
    input: impl Into<DescriptorInput>,
    fetcher: &Fetcher,
    issues: &IssueTracker,
    url: Option<&str>,
) -> Result<DescriptorWrapper> {
    let value = match input.into() {
        DescriptorInput::Text(text) => serde_json::from_str(&text)?,
        DescriptorInput::Json(value) => value,
    };
    let Value::Object(mut root) = value else {
        return Err(anyhow!("A CSVW descriptor must be a JSON object"));
    };

    if let Some(id) = root.get("@id") {
        if !id.is_string() {
            issues.warning(
                format!("@id of the descriptor must be a string, found {id}"),
                None,
            );
            match url {
                Some(u) => {
                    root.insert("@id".to_string(), Value::String(u.to_string()));
                }
                None => {
                    root.remove("@id");
                }
            }
        }
    }

    let mut context = match root.remove("@context") {
        Some(ctx) => match Context::from_value(&ctx) {
            Some(c) => c,
            None => {
                issues.error(format!("Invalid @context {ctx}"), None)?;
                Context::default()
            }
        },
        None => {
            issues.warning("Descriptor has no @context", None);
            Context::default()
        }
    };
    if let Some(lang) = &context.language {
        if !is_valid_language_tag(lang) {
            issues.warning(format!("Invalid @language '{lang}' in @context, ignoring"), None);
            context.language = None;
        }
    }
    let base = match &context.base {
        Some(b) => Some(crate::util::resolve_url(b, url)),
        None => url.map(str::to_string),
    };

    let mut normalizer = Normalizer {
        fetcher,
        issues,
        context,
        base,
        externals: ExternalProperties::new(),
    };

    let is_group = root.contains_key("tables");
    normalizer.validate_node(&mut root)?;
    let kind = if is_group { Kind::Group } else { Kind::Table };
    normalizer.normalize_object(&mut root, kind)?;

    let descriptor = if is_group {
        let group: TableGroup = serde_json::from_value(Value::Object(root.clone()))
            .map_err(|e| anyhow!("Invalid table group descriptor: {e}"))?;
        if group.tables.is_empty() {
            issues.error("A table group must contain at least one table", None)?;
        }
        Descriptor::Group(group)
    } else {
        let table: Table = serde_json::from_value(Value::Object(root.clone()))
            .map_err(|e| anyhow!("Invalid table descriptor: {e}"))?;
        Descriptor::Table(table)
    };
    debug!(
        "Normalized descriptor {} ({} external property sets)",
        url.unwrap_or("<inline>"),
        normalizer.externals.len()
    );
    Ok(DescriptorWrapper::new(
        descriptor,
        root,
        normalizer.externals,
        normalizer.context,
        url.map(str::to_string),
    ))
}

fn is_blank_id(s: &str) -> bool {
    s.starts_with("_:")
}

impl Normalizer<'_> {
    /// Keyword and language map validation, applied to every object of the tree.
    fn validate_node(&self, obj: &mut Map<String, Value>) -> Result<()> {
        let keys: Vec<String> = obj.keys().cloned().collect();
        for key in keys {
            match key.as_str() {
                "@id" => match obj.get("@id") {
                    Some(Value::String(s)) if !is_blank_id(s) => {}
                    Some(other) => {
                        self.issues
                            .error(format!("Invalid @id {other}: must be an IRI string"), None)?;
                        obj.remove("@id");
                    }
                    None => {}
                },
                "@type" => {
                    let valid = match obj.get("@type") {
                        Some(Value::String(s)) => !is_blank_id(s),
                        Some(Value::Array(items)) => items
                            .iter()
                            .all(|t| t.as_str().is_some_and(|s| !is_blank_id(s))),
                        _ => false,
                    };
                    if !valid {
                        self.issues.error(
                            format!("Invalid @type {}: must be a string", obj["@type"]),
                            None,
                        )?;
                        obj.remove("@type");
                    }
                }
                "@language" => {
                    if !obj.contains_key("@value") {
                        self.issues
                            .error("@language is only allowed together with @value", None)?;
                        obj.remove("@language");
                    } else if let Some(Value::String(lang)) = obj.get("@language") {
                        if !is_valid_language_tag(lang) {
                            self.issues
                                .warning(format!("Invalid language tag '{lang}', ignoring"), None);
                            obj.remove("@language");
                        }
                    }
                }
                "titles" => {
                    let titles = obj.remove("titles").unwrap_or(Value::Null);
                    if let Some(map) = self.language_map(&titles) {
                        obj.insert("titles".to_string(), map);
                    }
                }
                k if k.starts_with('@') && !ALLOWED_KEYWORDS.contains(&k) => {
                    self.issues
                        .error(format!("Unknown keyword {k} in descriptor"), None)?;
                    obj.remove(k);
                }
                _ => {}
            }
        }
        for value in obj.values_mut() {
            self.validate_value(value)?;
        }
        Ok(())
    }

    fn validate_value(&self, value: &mut Value) -> Result<()> {
        match value {
            Value::Object(map) => self.validate_node(map),
            Value::Array(items) => {
                for item in items {
                    self.validate_value(item)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Normalizes a natural language property into `{lang: [titles]}`. Invalid entries are
    /// dropped with a warning.
    fn language_map(&self, value: &Value) -> Option<Value> {
        let default_lang = self.context.language.as_deref().unwrap_or("und");
        let strings = |v: &Value| -> Option<Vec<Value>> {
            match v {
                Value::String(s) => Some(vec![Value::String(s.clone())]),
                Value::Array(items) => Some(
                    items
                        .iter()
                        .filter(|item| {
                            let ok = item.is_string();
                            if !ok {
                                self.issues
                                    .warning(format!("Ignoring non-string title {item}"), None);
                            }
                            ok
                        })
                        .cloned()
                        .collect(),
                ),
                _ => None,
            }
        };
        let mut map = Map::new();
        match value {
            Value::String(_) | Value::Array(_) => {
                map.insert(default_lang.to_string(), Value::Array(strings(value)?));
            }
            Value::Object(obj) => {
                for (lang, titles) in obj {
                    if !is_valid_language_tag(lang) {
                        self.issues
                            .warning(format!("Invalid language tag '{lang}' in titles"), None);
                        continue;
                    }
                    match strings(titles) {
                        Some(list) => {
                            map.insert(lang.clone(), Value::Array(list));
                        }
                        None => self.issues.warning(
                            format!("Titles for '{lang}' must be strings, found {titles}"),
                            None,
                        ),
                    }
                }
            }
            other => {
                self.issues
                    .warning(format!("Invalid titles {other}, ignoring"), None);
                return None;
            }
        }
        Some(Value::Object(map))
    }

    fn warn_invalid(&self, kind: Kind, key: &str, value: &Value) {
        self.issues.warning(
            format!(
                "Property '{key}' of {} has an invalid value {value}, ignoring",
                kind.type_name()
            ),
            None,
        );
    }

    fn resolve_link(&self, link: &str) -> String {
        expand_iri(link, self.base.as_deref())
    }

    /// Fetches a sub-descriptor referenced by URL (or by an `{"@id": ...}` object).
    fn resolve_reference(&self, value: &Value) -> Result<Option<Value>> {
        let url = match value {
            Value::String(s) => s.clone(),
            Value::Object(obj) if obj.len() == 1 && obj.contains_key("@id") => {
                match obj.get("@id").and_then(Value::as_str) {
                    Some(s) => s.to_string(),
                    None => return Ok(Some(value.clone())),
                }
            }
            _ => return Ok(Some(value.clone())),
        };
        let absolute = self.resolve_link(&url);
        let text = match self.fetcher.jsonld(&absolute, self.base.as_deref()) {
            Ok(text) => text,
            Err(e) => {
                self.issues
                    .error(format!("Could not resolve {absolute}: {e}"), None)?;
                return Ok(None);
            }
        };
        let mut fetched: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                self.issues
                    .error(format!("Could not parse {absolute}: {e}"), None)?;
                return Ok(None);
            }
        };
        let Value::Object(obj) = &mut fetched else {
            self.issues
                .error(format!("{absolute} does not contain a JSON object"), None)?;
            return Ok(None);
        };
        if let Some(ctx) = obj.remove("@context") {
            if Context::from_value(&ctx).is_none() {
                self.issues
                    .warning(format!("Ignoring unexpected @context in {absolute}"), None);
            }
        }
        obj.entry("@id").or_insert(Value::String(absolute));
        self.validate_node(obj)?;
        Ok(Some(fetched))
    }

    fn normalize_object(&mut self, obj: &mut Map<String, Value>, kind: Kind) -> Result<()> {
        if let Some(t) = obj.get("@type").and_then(Value::as_str) {
            if t != kind.type_name() && kind != Kind::Datatype {
                self.issues.error(
                    format!("@type of a {} must be '{}', found '{t}'", kind.type_name(), kind.type_name()),
                    None,
                )?;
            }
        }
        if let Some(Value::String(id)) = obj.get("@id") {
            let resolved = self.resolve_link(id);
            obj.insert("@id".to_string(), Value::String(resolved));
        }

        let mut external = Map::new();
        let keys: Vec<String> = obj.keys().cloned().collect();
        for key in keys {
            if key == "@id" || key == "@type" {
                continue;
            }
            if key == "notes" || is_external_key(&key) {
                if let Some(v) = obj.remove(&key) {
                    external.insert(expand_key(&key), v);
                }
                continue;
            }
            if key == "transformations" {
                debug!("Ignoring transformations of {}", kind.type_name());
                obj.remove(&key);
                continue;
            }
            if !kind.knows(&key) {
                self.issues.warning(
                    format!("Unknown property '{key}' on {}, ignoring", kind.type_name()),
                    None,
                );
                obj.remove(&key);
                continue;
            }
            let Some(value) = obj.remove(&key) else {
                continue;
            };
            if let Some(normalized) = self.normalize_property(kind, &key, value)? {
                obj.insert(key, normalized);
            }
        }

        if !external.is_empty() {
            let id = format!("_:ext{}", self.externals.len());
            self.externals.insert(id.clone(), external);
            obj.insert("notes".to_string(), Value::String(id));
        }
        Ok(())
    }

    fn normalize_children(&mut self, value: Value, kind: Kind) -> Result<Option<Value>> {
        match value {
            Value::Array(items) => {
                let mut out = vec![];
                for item in items {
                    match item {
                        Value::Object(mut map) => {
                            self.normalize_object(&mut map, kind)?;
                            out.push(Value::Object(map));
                        }
                        other => self.issues.warning(
                            format!("Ignoring non-object {} {other}", kind.type_name()),
                            None,
                        ),
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            _ => Ok(None),
        }
    }

    fn normalize_property(&mut self, kind: Kind, key: &str, value: Value) -> Result<Option<Value>> {
        if BOOLEAN_KEYS.contains(&key) {
            if value.is_boolean() {
                return Ok(Some(value));
            }
            self.warn_invalid(kind, key, &value);
            return Ok(None);
        }
        if COUNT_KEYS.contains(&key) {
            if value.as_u64().is_some() {
                return Ok(Some(value));
            }
            self.warn_invalid(kind, key, &value);
            return Ok(None);
        }
        if STRING_KEYS.contains(&key) && !value.is_string() {
            self.warn_invalid(kind, key, &value);
            return Ok(None);
        }
        match key {
            "tables" => {
                if !value.is_array() {
                    self.issues
                        .error("'tables' of a table group must be an array", None)?;
                    return Ok(None);
                }
                self.normalize_children(value, Kind::Table)
            }
            "columns" => match self.normalize_children(value.clone(), Kind::Column)? {
                Some(v) => Ok(Some(v)),
                None => {
                    self.warn_invalid(kind, key, &value);
                    Ok(None)
                }
            },
            "tableSchema" | "dialect" => {
                let child_kind = if key == "dialect" {
                    Kind::Dialect
                } else {
                    Kind::Schema
                };
                match self.resolve_reference(&value)? {
                    Some(Value::Object(mut map)) => {
                        self.normalize_object(&mut map, child_kind)?;
                        Ok(Some(Value::Object(map)))
                    }
                    Some(other) => {
                        self.warn_invalid(kind, key, &other);
                        Ok(None)
                    }
                    None => Ok(None),
                }
            }
            "datatype" => self.normalize_datatype(value),
            "url" => Ok(value.as_str().map(|u| Value::String(self.resolve_link(u)))),
            "lang" => match value.as_str() {
                Some(lang) if is_valid_language_tag(lang) => Ok(Some(value)),
                _ => {
                    self.warn_invalid(kind, key, &value);
                    Ok(None)
                }
            },
            "name" => match value.as_str() {
                Some(name) if !name.starts_with('_') && !name.is_empty() => Ok(Some(value)),
                _ => {
                    self.warn_invalid(kind, key, &value);
                    Ok(None)
                }
            },
            "null" | "lineTerminators" | "primaryKey" | "rowTitles" => match value {
                Value::String(s) => Ok(Some(Value::Array(vec![Value::String(s)]))),
                Value::Array(items) if items.iter().all(Value::is_string) => {
                    Ok(Some(Value::Array(items)))
                }
                other => {
                    self.warn_invalid(kind, key, &other);
                    Ok(None)
                }
            },
            "separator" => match value {
                Value::String(_) => Ok(Some(value)),
                Value::Null => Ok(None),
                other => {
                    self.warn_invalid(kind, key, &other);
                    Ok(None)
                }
            },
            "quoteChar" => match value {
                Value::String(ref s) if s.chars().count() == 1 => Ok(Some(value)),
                Value::Null => Ok(Some(Value::Null)),
                other => {
                    self.warn_invalid(kind, key, &other);
                    Ok(None)
                }
            },
            "trim" => match value {
                Value::Bool(_) => Ok(Some(value)),
                Value::String(ref s) if matches!(s.as_str(), "true" | "false" | "start" | "end") => {
                    Ok(Some(value))
                }
                other => {
                    self.warn_invalid(kind, key, &other);
                    Ok(None)
                }
            },
            "foreignKeys" => self.normalize_foreign_keys(kind, value),
            "format" => match value {
                Value::String(_) | Value::Object(_) => Ok(Some(value)),
                other => {
                    self.warn_invalid(kind, key, &other);
                    Ok(None)
                }
            },
            "minimum" | "maximum" | "minInclusive" | "maxInclusive" | "minExclusive"
            | "maxExclusive" => match value {
                Value::String(_) | Value::Number(_) => Ok(Some(value)),
                other => {
                    self.warn_invalid(kind, key, &other);
                    Ok(None)
                }
            },
            "base" => match value.as_str() {
                Some(b) if formats::is_builtin(b) => {
                    Ok(Some(Value::String(formats::canonical_name(b).to_string())))
                }
                _ => {
                    self.issues.warning(
                        format!("Unknown datatype base {value}, using string"),
                        None,
                    );
                    Ok(Some(Value::String("string".to_string())))
                }
            },
            _ => Ok(Some(value)),
        }
    }

    fn normalize_datatype(&mut self, value: Value) -> Result<Option<Value>> {
        match value {
            Value::String(name) => {
                let mut map = Map::new();
                if formats::is_builtin(&name) {
                    map.insert(
                        "base".to_string(),
                        Value::String(formats::canonical_name(&name).to_string()),
                    );
                } else if name.contains(':') {
                    map.insert("@id".to_string(), Value::String(self.resolve_link(&name)));
                } else {
                    self.issues
                        .warning(format!("Unknown datatype '{name}', using string"), None);
                    map.insert("base".to_string(), Value::String("string".to_string()));
                }
                Ok(Some(Value::Object(map)))
            }
            Value::Object(mut map) => {
                self.normalize_object(&mut map, Kind::Datatype)?;
                Ok(Some(Value::Object(map)))
            }
            other => {
                self.warn_invalid(Kind::Column, "datatype", &other);
                Ok(None)
            }
        }
    }

    fn normalize_foreign_keys(&mut self, kind: Kind, value: Value) -> Result<Option<Value>> {
        let Value::Array(items) = value else {
            self.warn_invalid(kind, "foreignKeys", &value);
            return Ok(None);
        };
        let as_list = |v: Option<&Value>| -> Option<Value> {
            match v? {
                Value::String(s) => Some(Value::Array(vec![Value::String(s.clone())])),
                Value::Array(a) if a.iter().all(Value::is_string) => Some(Value::Array(a.clone())),
                _ => None,
            }
        };
        let mut out = vec![];
        for item in items {
            let Some(fk) = item.as_object() else {
                self.issues
                    .error(format!("Foreign key {item} must be an object"), None)?;
                continue;
            };
            let reference = fk.get("reference").and_then(Value::as_object);
            let columns = as_list(fk.get("columnReference"));
            let referenced = reference.and_then(|r| as_list(r.get("columnReference")));
            let (Some(reference), Some(columns), Some(referenced)) = (reference, columns, referenced)
            else {
                self.issues
                    .error(format!("Foreign key {item} is missing a column reference"), None)?;
                continue;
            };
            let mut ref_out = Map::new();
            ref_out.insert("columnReference".to_string(), referenced);
            let resource = reference.get("resource").and_then(Value::as_str);
            let schema_ref = reference.get("schemaReference").and_then(Value::as_str);
            match (resource, schema_ref) {
                (Some(r), None) => {
                    ref_out.insert("resource".to_string(), Value::String(self.resolve_link(r)));
                }
                (None, Some(s)) => {
                    ref_out.insert(
                        "schemaReference".to_string(),
                        Value::String(self.resolve_link(s)),
                    );
                }
                _ => {
                    self.issues.error(
                        format!("Foreign key {item} must have exactly one of resource and schemaReference"),
                        None,
                    )?;
                    continue;
                }
            }
            let mut fk_out = Map::new();
            fk_out.insert("columnReference".to_string(), columns);
            fk_out.insert("reference".to_string(), Value::Object(ref_out));
            out.push(Value::Object(fk_out));
        }
        Ok(Some(Value::Array(out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionOptions;
    use crate::io::MemoryResolver;
    use serde_json::json;
    use std::sync::Arc;

    fn fetcher(resolver: MemoryResolver) -> Fetcher {
        Fetcher::new(Arc::new(resolver), Arc::new(ConversionOptions::default()))
    }

    #[test]
    fn test_normalizes_values() {
        let issues = IssueTracker::collecting();
        let wrapper = normalize(
            json!({
                "@context": ["http://www.w3.org/ns/csvw", {"@language": "en"}],
                "url": "data.csv",
                "dc:title": "Data",
                "tableSchema": {
                    "columns": [
                        {"name": "id", "titles": "ID", "datatype": "integer", "null": "-"},
                        {"titles": {"en": ["Name", "Label"], "bad tag": "x"}, "required": "yes"}
                    ],
                    "primaryKey": "id"
                }
            }),
            &fetcher(MemoryResolver::new()),
            &issues,
            Some("http://ex.org/meta.json"),
        )
        .unwrap();
        let table = wrapper.tables()[0];
        assert_eq!(table.url, "http://ex.org/data.csv");
        assert!(table.external.is_some());
        let schema = table.table_schema.as_ref().unwrap();
        let columns = schema.columns();
        assert_eq!(columns[0].inherited.datatype.as_ref().unwrap().base_name(), "integer");
        assert_eq!(columns[0].inherited.null, Some(vec!["-".to_string()]));
        assert_eq!(columns[0].first_title("en"), Some("ID"));
        assert_eq!(columns[1].inherited.required, None);
        assert_eq!(schema.primary_key, Some(vec!["id".to_string()]));
        // the invalid language tag and the non-boolean `required`
        assert_eq!(issues.get_warnings().len(), 2);
    }

    #[test]
    fn test_blank_node_id_is_an_error() {
        let issues = IssueTracker::throwing();
        let result = normalize(
            json!({"@context": "http://www.w3.org/ns/csvw", "@id": "_:b0", "url": "a.csv"}),
            &fetcher(MemoryResolver::new()),
            &issues,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_inlines_referenced_schema() {
        let resolver = MemoryResolver::new().with_document(
            "http://ex.org/schema.json",
            r#"{"@context": "http://www.w3.org/ns/csvw", "columns": [{"name": "a"}]}"#,
        );
        let issues = IssueTracker::collecting();
        let wrapper = normalize(
            r#"{"@context": "http://www.w3.org/ns/csvw", "url": "a.csv", "tableSchema": "schema.json"}"#,
            &fetcher(resolver),
            &issues,
            Some("http://ex.org/meta.json"),
        )
        .unwrap();
        let schema = wrapper.tables()[0].table_schema.as_ref().unwrap();
        assert_eq!(schema.id.as_deref(), Some("http://ex.org/schema.json"));
        assert_eq!(schema.columns()[0].name.as_deref(), Some("a"));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let issues = IssueTracker::collecting();
        let f = fetcher(MemoryResolver::new());
        let first = normalize(
            json!({
                "@context": "http://www.w3.org/ns/csvw",
                "tables": [{
                    "url": "a.csv",
                    "notes": [{"@value": "note"}],
                    "tableSchema": {"columns": [{"name": "x", "datatype": "number", "schema:about": {"@id": "x"}}]}
                }]
            }),
            &f,
            &issues,
            Some("http://ex.org/meta.json"),
        )
        .unwrap();
        let once = first.to_json();
        let second = normalize(once.clone(), &f, &issues, Some("http://ex.org/meta.json")).unwrap();
        assert_eq!(
            serde_json::to_string(&second.to_json()).unwrap(),
            serde_json::to_string(&once).unwrap()
        );
        assert_eq!(once["tables"][0]["http://www.w3.org/ns/csvw#note"], json!([{"@value": "note"}]));
        assert_eq!(
            once["tables"][0]["tableSchema"]["columns"][0]["datatype"],
            json!({"base": "double"})
        );
    }
}
