//! Typed view of a normalized CSVW descriptor. Every field is optional because the same types
//! are used for descriptors written by hand and for descriptors generated from RDF.

use crate::formats::{self, FormatSpec};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;

/// A language map: language tag to the titles in that language. `und` holds titles declared
/// without a language.
pub type Titles = BTreeMap<String, Vec<String>>;

/// Properties that cascade Column -> Schema -> Table -> TableGroup.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InheritedProperties {
    pub about_url: Option<String>,
    pub datatype: Option<Datatype>,
    pub default: Option<String>,
    pub lang: Option<String>,
    pub null: Option<Vec<String>>,
    pub ordered: Option<bool>,
    pub property_url: Option<String>,
    pub required: Option<bool>,
    pub separator: Option<String>,
    pub text_direction: Option<String>,
    pub value_url: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Datatype {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    pub base: Option<String>,
    pub format: Option<Value>,
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub minimum: Option<Value>,
    pub maximum: Option<Value>,
    pub min_inclusive: Option<Value>,
    pub max_inclusive: Option<Value>,
    pub min_exclusive: Option<Value>,
    pub max_exclusive: Option<Value>,
    #[serialize_always]
    #[serde(rename = "notes", default, skip_serializing)]
    pub external: Option<String>,
}

impl Datatype {
    pub fn builtin(base: &str) -> Self {
        Self {
            base: Some(base.to_string()),
            ..Self::default()
        }
    }

    /// The builtin datatype this one derives from; `string` when absent.
    pub fn base_name(&self) -> &str {
        match &self.base {
            Some(b) => formats::canonical_name(b),
            None => match self.id.as_deref().and_then(formats::datatype_from_iri) {
                Some(name) => name,
                None => "string",
            },
        }
    }

    /// IRI used for literals of this datatype.
    pub fn iri(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => formats::datatype_iri(self.base_name()),
        }
    }

    pub fn format_spec(&self) -> Option<FormatSpec> {
        self.format.as_ref().and_then(FormatSpec::from_json)
    }

    /// Lexical value of a range constraint (`minimum`, `maxExclusive`, ...).
    pub fn bound(value: &Option<Value>) -> Option<String> {
        match value {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    #[serde(rename = "@type")]
    pub type_: Option<String>,
    pub name: Option<String>,
    pub titles: Option<Titles>,
    pub suppress_output: Option<bool>,
    #[serde(rename = "virtual")]
    pub virtual_: Option<bool>,
    #[serde(flatten)]
    pub inherited: InheritedProperties,
    #[serialize_always]
    #[serde(rename = "notes", default, skip_serializing)]
    pub external: Option<String>,
}

impl Column {
    pub fn is_virtual(&self) -> bool {
        self.virtual_.unwrap_or(false)
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppress_output.unwrap_or(false)
    }

    /// First title in `lang`, falling back to the first title in any language.
    pub fn first_title(&self, lang: &str) -> Option<&str> {
        let titles = self.titles.as_ref()?;
        titles
            .get(lang)
            .and_then(|t| t.first())
            .or_else(|| titles.get("und").and_then(|t| t.first()))
            .or_else(|| titles.values().flat_map(|t| t.first()).next())
            .map(String::as_str)
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub resource: Option<String>,
    pub schema_reference: Option<String>,
    pub column_reference: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub column_reference: Vec<String>,
    pub reference: Reference,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    #[serde(rename = "@type")]
    pub type_: Option<String>,
    pub columns: Option<Vec<Column>>,
    pub primary_key: Option<Vec<String>>,
    pub row_titles: Option<Vec<String>>,
    pub foreign_keys: Option<Vec<ForeignKey>>,
    #[serde(flatten)]
    pub inherited: InheritedProperties,
    #[serialize_always]
    #[serde(rename = "notes", default, skip_serializing)]
    pub external: Option<String>,
}

impl Schema {
    pub fn columns(&self) -> &[Column] {
        self.columns.as_deref().unwrap_or_default()
    }
}

fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dialect {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    #[serde(rename = "@type")]
    pub type_: Option<String>,
    pub comment_prefix: Option<String>,
    pub delimiter: Option<String>,
    pub double_quote: Option<bool>,
    pub encoding: Option<String>,
    pub header: Option<bool>,
    pub header_row_count: Option<usize>,
    pub line_terminators: Option<Vec<String>>,
    /// `Some(None)` is an explicit `null`, which disables quoting.
    #[serde(default, deserialize_with = "explicit_null")]
    pub quote_char: Option<Option<String>>,
    pub skip_blank_rows: Option<bool>,
    pub skip_columns: Option<usize>,
    pub skip_initial_space: Option<bool>,
    pub skip_rows: Option<usize>,
    pub trim: Option<Value>,
    #[serialize_always]
    #[serde(rename = "notes", default, skip_serializing)]
    pub external: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    #[serde(rename = "@type")]
    pub type_: Option<String>,
    #[serde(default)]
    pub url: String,
    pub table_schema: Option<Schema>,
    pub dialect: Option<Dialect>,
    pub suppress_output: Option<bool>,
    pub table_direction: Option<String>,
    #[serde(flatten)]
    pub inherited: InheritedProperties,
    #[serialize_always]
    #[serde(rename = "notes", default, skip_serializing)]
    pub external: Option<String>,
}

impl Table {
    pub fn is_suppressed(&self) -> bool {
        self.suppress_output.unwrap_or(false)
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableGroup {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    #[serde(rename = "@type")]
    pub type_: Option<String>,
    #[serde(default)]
    pub tables: Vec<Table>,
    pub table_schema: Option<Schema>,
    pub dialect: Option<Dialect>,
    pub table_direction: Option<String>,
    #[serde(flatten)]
    pub inherited: InheritedProperties,
    #[serialize_always]
    #[serde(rename = "notes", default, skip_serializing)]
    pub external: Option<String>,
}

/// Either a table group or a single table; exactly one is active.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Group(TableGroup),
    Table(Table),
}

/// Resolves inherited properties by walking Column -> Schema -> Table -> TableGroup; the
/// first level that defines a property wins.
#[derive(Debug, Clone, Default)]
pub struct InheritanceChain<'a> {
    levels: Vec<&'a InheritedProperties>,
}

impl<'a> InheritanceChain<'a> {
    pub fn new(levels: Vec<&'a InheritedProperties>) -> Self {
        Self { levels }
    }

    /// Returns a chain with `props` consulted before every existing level.
    pub fn with_front(&self, props: &'a InheritedProperties) -> Self {
        let mut levels = vec![props];
        levels.extend(self.levels.iter().copied());
        Self { levels }
    }

    fn find<T: ?Sized>(&self, get: impl Fn(&'a InheritedProperties) -> Option<&'a T>) -> Option<&'a T> {
        self.levels.iter().find_map(|level| get(*level))
    }

    pub fn about_url(&self) -> Option<&'a str> {
        self.find(|p| p.about_url.as_deref())
    }

    pub fn property_url(&self) -> Option<&'a str> {
        self.find(|p| p.property_url.as_deref())
    }

    pub fn value_url(&self) -> Option<&'a str> {
        self.find(|p| p.value_url.as_deref())
    }

    pub fn datatype(&self) -> Option<&'a Datatype> {
        self.find(|p| p.datatype.as_ref())
    }

    pub fn default_value(&self) -> &'a str {
        self.find(|p| p.default.as_deref()).unwrap_or("")
    }

    pub fn lang(&self) -> Option<&'a str> {
        self.find(|p| p.lang.as_deref())
    }

    /// The null values of the column; `[""]` unless declared.
    pub fn null(&self) -> Vec<String> {
        self.find(|p| p.null.as_ref())
            .cloned()
            .unwrap_or_else(|| vec![String::new()])
    }

    pub fn ordered(&self) -> bool {
        self.find(|p| p.ordered.as_ref()).copied().unwrap_or(false)
    }

    pub fn required(&self) -> bool {
        self.find(|p| p.required.as_ref()).copied().unwrap_or(false)
    }

    pub fn separator(&self) -> Option<&'a str> {
        self.find(|p| p.separator.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inheritance_first_defined_wins() {
        let group = InheritedProperties {
            lang: Some("en".into()),
            required: Some(true),
            ..Default::default()
        };
        let column = InheritedProperties {
            lang: Some("de".into()),
            ..Default::default()
        };
        let chain = InheritanceChain::new(vec![&group]).with_front(&column);
        assert_eq!(chain.lang(), Some("de"));
        assert!(chain.required());
        assert_eq!(chain.null(), vec![String::new()]);
        assert!(!chain.ordered());
    }

    #[test]
    fn test_column_deserializes_flattened_properties() {
        let column: Column = serde_json::from_value(json!({
            "name": "id",
            "titles": {"und": ["ID"]},
            "datatype": {"base": "integer"},
            "required": true,
            "notes": "_:ext0"
        }))
        .unwrap();
        assert_eq!(column.name.as_deref(), Some("id"));
        assert_eq!(column.inherited.required, Some(true));
        assert_eq!(column.external.as_deref(), Some("_:ext0"));
        assert_eq!(column.first_title("en"), Some("ID"));
        let value = serde_json::to_value(&column).unwrap();
        assert!(value.get("notes").is_none());
        assert_eq!(value["datatype"], json!({"base": "integer"}));
    }

    #[test]
    fn test_datatype_iri() {
        assert_eq!(
            Datatype::builtin("integer").iri(),
            "http://www.w3.org/2001/XMLSchema#integer"
        );
        let custom = Datatype {
            id: Some("http://ex.org/dt".into()),
            base: Some("string".into()),
            ..Default::default()
        };
        assert_eq!(custom.iri(), "http://ex.org/dt");
        assert_eq!(Datatype::default().base_name(), "string");
    }
}
