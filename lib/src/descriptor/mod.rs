//! CSVW descriptors: the typed model, normalization of raw metadata documents and the
//! structural checks run before conversion.

pub mod checks;
pub mod jsonld;
pub mod lang;
pub mod model;
pub mod normalize;

pub use model::{
    Column, Datatype, Descriptor, Dialect, ForeignKey, InheritanceChain, InheritedProperties,
    Reference, Schema, Table, TableGroup, Titles,
};
pub use normalize::{normalize, DescriptorInput};

use anyhow::Result;
use jsonld::{Context, ValueConverter};
use oxigraph::model::{NamedOrBlankNode, Quad};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Properties outside the CSVW vocabulary, keyed by the synthetic id stored in the `notes`
/// field of the object that carried them.
pub type ExternalProperties = BTreeMap<String, Map<String, Value>>;

/// A normalized descriptor together with the side channel of external properties.
#[derive(Debug, Clone)]
pub struct DescriptorWrapper {
    pub descriptor: Descriptor,
    normalized: Map<String, Value>,
    externals: ExternalProperties,
    context: Context,
    url: Option<String>,
}

impl DescriptorWrapper {
    pub(crate) fn new(
        descriptor: Descriptor,
        normalized: Map<String, Value>,
        externals: ExternalProperties,
        context: Context,
        url: Option<String>,
    ) -> Self {
        Self {
            descriptor,
            normalized,
            externals,
            context,
            url,
        }
    }

    /// Wraps a descriptor built in code, e.g. one inferred from RDF.
    pub fn from_descriptor(descriptor: Descriptor, context: Context) -> Result<Self> {
        let value = match &descriptor {
            Descriptor::Group(g) => serde_json::to_value(g)?,
            Descriptor::Table(t) => serde_json::to_value(t)?,
        };
        let normalized = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(Self::new(
            descriptor,
            normalized,
            ExternalProperties::new(),
            context,
            None,
        ))
    }

    pub fn is_table_group(&self) -> bool {
        matches!(self.descriptor, Descriptor::Group(_))
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn group(&self) -> Option<&TableGroup> {
        match &self.descriptor {
            Descriptor::Group(g) => Some(g),
            Descriptor::Table(_) => None,
        }
    }

    /// The single table, or every table of the group.
    pub fn tables(&self) -> Vec<&Table> {
        match &self.descriptor {
            Descriptor::Group(g) => g.tables.iter().collect(),
            Descriptor::Table(t) => vec![t],
        }
    }

    pub fn id(&self) -> Option<&str> {
        match &self.descriptor {
            Descriptor::Group(g) => g.id.as_deref(),
            Descriptor::Table(_) => None,
        }
    }

    pub fn group_external(&self) -> Option<&str> {
        self.group().and_then(|g| g.external.as_deref())
    }

    /// The table's schema, inherited from the group when the table has none.
    pub fn schema_of<'a>(&'a self, table: &'a Table) -> Option<&'a Schema> {
        table
            .table_schema
            .as_ref()
            .or_else(|| self.group().and_then(|g| g.table_schema.as_ref()))
    }

    pub fn dialect_of<'a>(&'a self, table: &'a Table) -> Option<&'a Dialect> {
        table
            .dialect
            .as_ref()
            .or_else(|| self.group().and_then(|g| g.dialect.as_ref()))
    }

    /// Inherited property lookup for the columns of `table`: schema, table, then group.
    pub fn chain<'a>(&'a self, table: &'a Table) -> InheritanceChain<'a> {
        let mut levels = vec![];
        if let Some(schema) = self.schema_of(table) {
            levels.push(&schema.inherited);
        }
        levels.push(&table.inherited);
        if let Some(group) = self.group() {
            levels.push(&group.inherited);
        }
        InheritanceChain::new(levels)
    }

    /// Converts the external properties recorded under `source_id` into quads about
    /// `subject`.
    pub fn setup_external_props(
        &self,
        source_id: Option<&str>,
        subject: &NamedOrBlankNode,
    ) -> Vec<Quad> {
        let Some(props) = source_id.and_then(|id| self.externals.get(id)) else {
            return vec![];
        };
        let base = self.context.base.as_deref().or(self.url.as_deref());
        let mut converter = ValueConverter::new(&self.context, base);
        converter.add_properties(subject, props);
        converter.into_quads()
    }

    /// Canonical JSON form: the normalized tree with external properties re-attached under
    /// their expanded keys.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("@context".to_string(), self.context.to_value());
        let mut tree = Value::Object(self.normalized.clone());
        reattach_externals(&mut tree, &self.externals);
        if let Value::Object(map) = tree {
            out.extend(map);
        }
        Value::Object(out)
    }
}

fn reattach_externals(value: &mut Value, externals: &ExternalProperties) {
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                reattach_externals(child, externals);
            }
            let id = match map.get("notes") {
                Some(Value::String(id)) if externals.contains_key(id) => id.clone(),
                _ => return,
            };
            map.remove("notes");
            if let Some(props) = externals.get(&id) {
                for (key, v) in props {
                    map.insert(key.clone(), v.clone());
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                reattach_externals(item, externals);
            }
        }
        _ => {}
    }
}
