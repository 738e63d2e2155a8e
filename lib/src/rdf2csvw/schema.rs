//! The mutable schema built while reading RDF, and its conversion into a CSVW descriptor.

use crate::consts::{compact_iri, TYPE};
use crate::formats::ROOT_DATATYPE;
use crate::descriptor::jsonld::Context;
use crate::descriptor::{
    Column, Datatype, Descriptor, DescriptorWrapper, ForeignKey, InheritedProperties, Reference,
    Schema, Table, TableGroup, Titles,
};
use crate::template::TemplateBuilder;
use anyhow::Result;
use std::collections::BTreeSet;

pub const SUBJECT_COLUMN: &str = "subject_id";
pub const VALUE_COLUMN: &str = "value";

/// What has been observed for one predicate of a table.
#[derive(Debug, Clone, Default)]
pub struct ColumnSchema {
    pub name: String,
    pub property_url: String,
    /// Constant object of the column (the type of the subject column).
    pub fixed_value: Option<String>,
    pub value_template: TemplateBuilder,
    pub datatype: Option<&'static str>,
    pub langs: BTreeSet<String>,
    pub iri_objects: bool,
    pub literal_objects: bool,
    pub blank_objects: bool,
    pub suppress: bool,
}

impl ColumnSchema {
    pub fn new(name: &str, property_url: &str) -> Self {
        Self {
            name: name.to_string(),
            property_url: property_url.to_string(),
            ..Self::default()
        }
    }

    fn value_url(&self) -> Option<String> {
        if let Some(fixed) = &self.fixed_value {
            return Some(compact_iri(fixed));
        }
        if self.iri_objects && !self.literal_objects && !self.blank_objects {
            return self.value_template.template(&self.name);
        }
        None
    }

    fn to_column(&self, about_url: Option<&str>) -> Column {
        let datatype = match self.datatype {
            Some(dt) if self.literal_objects && !self.iri_objects && dt != "string" && dt != ROOT_DATATYPE => {
                Some(Datatype::builtin(dt))
            }
            _ => None,
        };
        let lang = match (self.langs.len(), self.literal_objects) {
            (1, true) => self.langs.iter().next().cloned(),
            _ => None,
        };
        let mut titles = Titles::new();
        titles.insert("und".to_string(), vec![self.name.clone()]);
        Column {
            name: Some(self.name.clone()),
            titles: Some(titles),
            suppress_output: self.suppress.then_some(true),
            inherited: InheritedProperties {
                about_url: about_url.map(str::to_string),
                property_url: (!self.suppress).then(|| compact_iri(&self.property_url)),
                value_url: self.value_url(),
                datatype,
                lang,
                ..InheritedProperties::default()
            },
            ..Column::default()
        }
    }
}

/// The parent table and predicate a join table was split from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinInfo {
    pub parent: String,
    pub predicate: String,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub type_iri: Option<String>,
    pub subject: TemplateBuilder,
    /// The subject column comes first.
    pub columns: Vec<ColumnSchema>,
    pub primary_key: Vec<String>,
    pub join: Option<JoinInfo>,
    pub locked: bool,
}

impl TableSchema {
    fn subject_column(type_iri: Option<&str>) -> ColumnSchema {
        match type_iri {
            Some(t) => ColumnSchema {
                fixed_value: Some(t.to_string()),
                iri_objects: true,
                ..ColumnSchema::new(SUBJECT_COLUMN, TYPE.as_str())
            },
            None => ColumnSchema {
                suppress: true,
                ..ColumnSchema::new(SUBJECT_COLUMN, TYPE.as_str())
            },
        }
    }

    pub fn for_type(name: &str, type_iri: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            type_iri: type_iri.map(str::to_string),
            subject: TemplateBuilder::new(),
            columns: vec![Self::subject_column(type_iri)],
            primary_key: vec![SUBJECT_COLUMN.to_string()],
            join: None,
            locked: false,
        }
    }

    /// A `{subject_id, value}` table holding a multi-valued predicate of `parent`.
    pub fn join_table(name: &str, parent: &TableSchema, predicate: &str, value: ColumnSchema) -> Self {
        Self {
            name: name.to_string(),
            type_iri: parent.type_iri.clone(),
            subject: parent.subject.clone(),
            columns: vec![
                Self::subject_column(parent.type_iri.as_deref()),
                ColumnSchema {
                    name: VALUE_COLUMN.to_string(),
                    property_url: predicate.to_string(),
                    ..value
                },
            ],
            primary_key: vec![SUBJECT_COLUMN.to_string(), VALUE_COLUMN.to_string()],
            join: Some(JoinInfo {
                parent: parent.name.clone(),
                predicate: predicate.to_string(),
            }),
            locked: false,
        }
    }

    pub fn column_for(&self, predicate: &str) -> Option<usize> {
        self.columns
            .iter()
            .skip(1)
            .position(|c| c.property_url == predicate)
            .map(|i| i + 1)
    }

    pub fn has_column_named(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn to_table(&self, parent_url: Option<&str>) -> Table {
        let about = self.subject.template(SUBJECT_COLUMN);
        let columns = self
            .columns
            .iter()
            .map(|c| c.to_column(about.as_deref()))
            .collect();
        let foreign_keys = parent_url.map(|url| {
            vec![ForeignKey {
                column_reference: vec![SUBJECT_COLUMN.to_string()],
                reference: Reference {
                    resource: Some(url.to_string()),
                    schema_reference: None,
                    column_reference: vec![SUBJECT_COLUMN.to_string()],
                },
            }]
        });
        Table {
            url: self.name.clone(),
            table_schema: Some(Schema {
                columns: Some(columns),
                primary_key: Some(self.primary_key.clone()),
                foreign_keys,
                ..Schema::default()
            }),
            ..Table::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableGroupSchema {
    pub tables: Vec<TableSchema>,
    pub locked: bool,
}

impl TableGroupSchema {
    pub fn table_named(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|t| t.name == name)
    }

    /// The main table of a type (not a join table).
    pub fn table_for_type(&self, type_iri: Option<&str>) -> Option<usize> {
        self.tables
            .iter()
            .position(|t| t.join.is_none() && t.type_iri.as_deref() == type_iri)
    }

    pub fn join_table_for(&self, parent: &str, predicate: &str) -> Option<usize> {
        self.tables.iter().position(|t| {
            t.join
                .as_ref()
                .is_some_and(|j| j.parent == parent && j.predicate == predicate)
        })
    }

    /// Returns `base` or `base_2`, `base_3`, ... so table names stay unique.
    pub fn unique_name(&self, base: &str) -> String {
        let mut candidate = format!("{base}.csv");
        let mut n = 2;
        while self.table_named(&candidate).is_some() {
            candidate = format!("{base}_{n}.csv");
            n += 1;
        }
        candidate
    }

    pub fn to_descriptor(&self) -> Result<DescriptorWrapper> {
        let tables = self
            .tables
            .iter()
            .map(|t| t.to_table(t.join.as_ref().map(|j| j.parent.as_str())))
            .collect();
        let group = TableGroup {
            tables,
            ..TableGroup::default()
        };
        DescriptorWrapper::from_descriptor(Descriptor::Group(group), Context::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_descriptor() {
        let mut person = TableSchema::for_type("Person.csv", Some("http://ex.org/Person"));
        person.subject.add("http://ex.org/people/1");
        person.subject.add("http://ex.org/people/2");
        let mut name = ColumnSchema::new("name", "http://ex.org/name");
        name.literal_objects = true;
        name.datatype = Some("string");
        person.columns.push(name);
        let table = person.to_table(None);
        let columns = table.table_schema.as_ref().unwrap().columns();
        assert_eq!(columns[0].name.as_deref(), Some("subject_id"));
        assert_eq!(
            columns[0].inherited.about_url.as_deref(),
            Some("http://ex.org/people/{subject_id}")
        );
        assert_eq!(columns[0].inherited.property_url.as_deref(), Some("rdf:type"));
        assert_eq!(columns[0].inherited.value_url.as_deref(), Some("http://ex.org/Person"));
        assert_eq!(columns[1].inherited.datatype, None);
        assert_eq!(columns[1].inherited.about_url, columns[0].inherited.about_url);
    }

    #[test]
    fn test_unique_names() {
        let mut group = TableGroupSchema::default();
        group.tables.push(TableSchema::for_type("Person.csv", None));
        assert_eq!(group.unique_name("Person"), "Person_2.csv");
        assert_eq!(group.unique_name("Place"), "Place.csv");
    }
}
