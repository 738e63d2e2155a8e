//! Infers a table group schema from the quads of an RDF stream: one table per `rdf:type`,
//! one column per single-valued predicate, and `{subject_id, value}` join tables for
//! predicates that occur more than once on a subject.

use super::schema::{ColumnSchema, TableGroupSchema, TableSchema};
use super::vocab::VocabularyLabels;
use crate::config::ConversionOptions;
use crate::consts::TYPE;
use crate::formats::{datatype_from_iri, join_datatypes};
use crate::io::Fetcher;
use anyhow::Result;
use log::{debug, info};
use oxigraph::model::{NamedOrBlankNode, Quad, Term};
use oxigraph::store::Store;
use std::collections::HashSet;

pub struct SchemaInferrer {
    schema: TableGroupSchema,
    vocab: VocabularyLabels,
    unknown_type_table: bool,
    freeze_on_lock: bool,
    /// Subjects whose properties were seen before any of their types.
    untyped: HashSet<NamedOrBlankNode>,
}

/// A name usable as a CSVW column name or file stem.
fn sanitize(label: &str) -> String {
    let mut out = String::new();
    for c in label.chars() {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "column".to_string()
    } else {
        trimmed.to_string()
    }
}

impl SchemaInferrer {
    /// `fetcher` is only used to look up labels when `use_vocab_metadata` is set.
    pub fn new(options: &ConversionOptions, fetcher: Option<Fetcher>) -> Self {
        let fetcher = fetcher.filter(|_| options.use_vocab_metadata);
        Self {
            schema: TableGroupSchema::default(),
            vocab: VocabularyLabels::new(fetcher, &options.preferred_language),
            unknown_type_table: options.unknown_type_table,
            freeze_on_lock: options.freeze_templates_on_lock,
            untyped: HashSet::new(),
        }
    }

    pub fn schema(&self) -> &TableGroupSchema {
        &self.schema
    }

    pub fn is_locked(&self) -> bool {
        self.schema.locked
    }

    /// Folds every quad currently in `store` into the schema.
    pub fn infer_schema(&mut self, store: &Store) -> Result<bool> {
        let mut changed = false;
        for quad in store.iter() {
            changed |= self.add_quad_to_schema(&quad?, store)?;
        }
        Ok(changed)
    }

    /// Marks the current tables as final: their columns are no longer restructured and,
    /// when configured, their templates stop widening.
    pub fn lock_current_schema(&mut self) {
        if self.schema.locked {
            return;
        }
        info!("Locking schema with {} tables", self.schema.tables.len());
        self.schema.locked = true;
        for table in &mut self.schema.tables {
            table.locked = true;
            if self.freeze_on_lock {
                table.subject.freeze();
                for column in &mut table.columns {
                    column.value_template.freeze();
                }
            }
        }
    }

    /// Updates the schema for one quad, using `store` to look up the subject's types and
    /// whether the predicate repeats. Returns true when the schema changed.
    pub fn add_quad_to_schema(&mut self, quad: &Quad, store: &Store) -> Result<bool> {
        let subject_iri = match &quad.subject {
            NamedOrBlankNode::NamedNode(n) => Some(n.as_str().to_string()),
            _ => None,
        };
        if quad.predicate == TYPE {
            let Term::NamedNode(type_iri) = &quad.object else {
                return Ok(false);
            };
            let (idx, mut changed) = self.table_for_type(Some(type_iri.as_str()));
            changed |= self.widen_subject(idx, subject_iri.as_deref());
            if self.untyped.remove(&quad.subject) {
                for other in store.quads_for_pattern(Some(quad.subject.as_ref()), None, None, None) {
                    let other = other?;
                    if other.predicate != TYPE {
                        changed |= self.add_property(idx, &other, store)?;
                    }
                }
            }
            return Ok(changed);
        }

        let mut types = vec![];
        for typed in store.quads_for_pattern(Some(quad.subject.as_ref()), Some(TYPE), None, None) {
            if let Term::NamedNode(t) = typed?.object {
                let t = t.into_string();
                if !types.contains(&t) {
                    types.push(t);
                }
            }
        }
        let mut changed = false;
        let mut tables = vec![];
        if types.is_empty() {
            if !self.unknown_type_table {
                self.untyped.insert(quad.subject.clone());
                return Ok(false);
            }
            let (idx, created) = self.table_for_type(None);
            changed |= created;
            tables.push(idx);
        }
        for t in &types {
            let (idx, created) = self.table_for_type(Some(t));
            changed |= created;
            tables.push(idx);
        }
        for idx in tables {
            changed |= self.widen_subject(idx, subject_iri.as_deref());
            changed |= self.add_property(idx, quad, store)?;
        }
        Ok(changed)
    }

    /// Index of the main table for `type_iri`, creating it when needed.
    fn table_for_type(&mut self, type_iri: Option<&str>) -> (usize, bool) {
        if let Some(idx) = self.schema.table_for_type(type_iri) {
            return (idx, false);
        }
        let label = match type_iri {
            Some(t) => self.vocab.label(t),
            None => "Thing".to_string(),
        };
        let name = self.schema.unique_name(&sanitize(&label));
        debug!("New table {name} for type {}", type_iri.unwrap_or("(none)"));
        self.schema.tables.push(TableSchema::for_type(&name, type_iri));
        (self.schema.tables.len() - 1, true)
    }

    fn widen_subject(&mut self, idx: usize, subject_iri: Option<&str>) -> bool {
        let Some(iri) = subject_iri else {
            return false;
        };
        let changed = self.schema.tables[idx].subject.add(iri);
        // join tables share the subject template of their parent
        if changed {
            let parent = self.schema.tables[idx].name.clone();
            let subject = self.schema.tables[idx].subject.clone();
            for table in &mut self.schema.tables {
                if table.join.as_ref().is_some_and(|j| j.parent == parent) {
                    table.subject = subject.clone();
                }
            }
        }
        changed
    }

    fn add_property(&mut self, idx: usize, quad: &Quad, store: &Store) -> Result<bool> {
        let predicate = quad.predicate.as_str();
        let repeated = store
            .quads_for_pattern(Some(quad.subject.as_ref()), Some(quad.predicate.as_ref()), None, None)
            .take(2)
            .count()
            > 1;
        let (parent, locked, existing) = {
            let table = &self.schema.tables[idx];
            (table.name.clone(), table.locked, table.column_for(predicate))
        };

        if let Some(join) = self.schema.join_table_for(&parent, predicate) {
            return Ok(observe(&mut self.schema.tables[join].columns[1], &quad.object));
        }
        let value_column = match existing {
            Some(col) if !repeated => {
                return Ok(observe(&mut self.schema.tables[idx].columns[col], &quad.object));
            }
            Some(col) if !locked => {
                debug!("Moving {predicate} of {parent} to a join table");
                self.schema.tables[idx].columns.remove(col)
            }
            // a locked column keeps its first value; further values go to a side table
            Some(_) => ColumnSchema::new("value", predicate),
            None if repeated || locked => ColumnSchema::new("value", predicate),
            None => {
                let label = self.vocab.label(predicate);
                let table = &self.schema.tables[idx];
                let base = sanitize(&label);
                let mut name = base.clone();
                let mut n = 2;
                while table.has_column_named(&name) {
                    name = format!("{base}_{n}");
                    n += 1;
                }
                debug!("New column {name} in {parent} for {predicate}");
                let mut column = ColumnSchema::new(&name, predicate);
                observe(&mut column, &quad.object);
                self.schema.tables[idx].columns.push(column);
                return Ok(true);
            }
        };
        let join = self.create_join_table(idx, predicate, value_column);
        observe(&mut self.schema.tables[join].columns[1], &quad.object);
        Ok(true)
    }

    fn create_join_table(&mut self, parent: usize, predicate: &str, value: ColumnSchema) -> usize {
        let label = self.vocab.label(predicate);
        let parent_table = &self.schema.tables[parent];
        let type_label = parent_table.name.trim_end_matches(".csv").to_string();
        let name = self
            .schema
            .unique_name(&format!("{type_label}_{}", sanitize(&label)));
        let table = TableSchema::join_table(&name, parent_table, predicate, value);
        debug!("New join table {name} for {predicate}");
        self.schema.tables.push(table);
        self.schema.tables.len() - 1
    }
}

/// Records one object of a column. Returns true when the column's derived annotations change.
fn observe(column: &mut ColumnSchema, object: &Term) -> bool {
    match object {
        Term::NamedNode(iri) => {
            let first = !column.iri_objects;
            column.iri_objects = true;
            column.value_template.add(iri.as_str()) || first
        }
        Term::BlankNode(_) => {
            let first = !column.blank_objects;
            column.blank_objects = true;
            first
        }
        Term::Literal(literal) => {
            let mut changed = !column.literal_objects;
            column.literal_objects = true;
            let datatype = match literal.language() {
                Some(lang) => {
                    changed |= column.langs.insert(lang.to_string());
                    "string"
                }
                None => datatype_from_iri(literal.datatype().as_str()).unwrap_or("string"),
            };
            let joined = match column.datatype {
                Some(current) => join_datatypes(current, datatype),
                None => datatype,
            };
            if column.datatype != Some(joined) {
                column.datatype = Some(joined);
                changed = true;
            }
            changed
        }
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::{GraphName, Literal, NamedNode};

    fn quad(s: &str, p: &str, o: Term) -> Quad {
        Quad::new(
            NamedNode::new(s).unwrap(),
            NamedNode::new(p).unwrap(),
            o,
            GraphName::DefaultGraph,
        )
    }

    fn iri(s: &str) -> Term {
        NamedNode::new(s).unwrap().into()
    }

    fn feed(inferrer: &mut SchemaInferrer, store: &Store, quads: &[Quad]) -> bool {
        let mut changed = false;
        for q in quads {
            store.insert(q).unwrap();
            changed |= inferrer.add_quad_to_schema(q, store).unwrap();
        }
        changed
    }

    const TYPE_IRI: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

    #[test]
    fn test_person_table() {
        let store = Store::new().unwrap();
        let mut inferrer = SchemaInferrer::new(&ConversionOptions::default(), None);
        let changed = feed(
            &mut inferrer,
            &store,
            &[
                quad("http://ex.org/1", TYPE_IRI, iri("http://ex.org/Person")),
                quad("http://ex.org/1", "http://ex.org/name", Literal::new_simple_literal("Alice").into()),
            ],
        );
        assert!(changed);
        let schema = inferrer.schema();
        assert_eq!(schema.tables.len(), 1);
        let table = &schema.tables[0];
        assert_eq!(table.name, "Person.csv");
        let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["subject_id", "name"]);
        assert_eq!(table.subject.template("subject_id").unwrap(), "http://ex.org/{subject_id}");
    }

    #[test]
    fn test_properties_before_type() {
        let store = Store::new().unwrap();
        let mut inferrer = SchemaInferrer::new(&ConversionOptions::default(), None);
        feed(
            &mut inferrer,
            &store,
            &[
                quad("http://ex.org/1", "http://ex.org/age", Literal::from(42).into()),
                quad("http://ex.org/1", TYPE_IRI, iri("http://ex.org/Person")),
            ],
        );
        let table = &inferrer.schema().tables[0];
        assert_eq!(table.columns[1].name, "age");
        assert_eq!(table.columns[1].datatype, Some("int"));
    }

    #[test]
    fn test_multi_valued_predicate_becomes_join_table() {
        let store = Store::new().unwrap();
        let mut inferrer = SchemaInferrer::new(&ConversionOptions::default(), None);
        feed(
            &mut inferrer,
            &store,
            &[
                quad("http://ex.org/1", TYPE_IRI, iri("http://ex.org/Person")),
                quad("http://ex.org/1", "http://ex.org/knows", iri("http://ex.org/2")),
                quad("http://ex.org/1", "http://ex.org/knows", iri("http://ex.org/3")),
            ],
        );
        let schema = inferrer.schema();
        assert_eq!(schema.tables.len(), 2);
        assert_eq!(schema.tables[0].columns.len(), 1);
        let join = &schema.tables[1];
        assert_eq!(join.name, "Person_knows.csv");
        assert_eq!(join.primary_key, vec!["subject_id", "value"]);
        assert_eq!(join.columns[1].property_url, "http://ex.org/knows");
        assert!(join.columns[1].iri_objects);
    }

    #[test]
    fn test_datatypes_join() {
        let decimal = NamedNode::new("http://www.w3.org/2001/XMLSchema#decimal").unwrap();
        let store = Store::new().unwrap();
        let mut inferrer = SchemaInferrer::new(&ConversionOptions::default(), None);
        feed(
            &mut inferrer,
            &store,
            &[
                quad("http://ex.org/1", TYPE_IRI, iri("http://ex.org/T")),
                quad("http://ex.org/1", "http://ex.org/v", Literal::from(1).into()),
                quad("http://ex.org/1", "http://ex.org/w", Literal::from(1).into()),
                quad("http://ex.org/2", TYPE_IRI, iri("http://ex.org/T")),
                quad("http://ex.org/2", "http://ex.org/v", Literal::new_typed_literal("2.5", decimal).into()),
                quad("http://ex.org/2", "http://ex.org/w", Literal::from(1.5).into()),
            ],
        );
        let columns = &inferrer.schema().tables[0].columns;
        assert_eq!(columns[1].datatype, Some("decimal"));
        // integer and double only meet at the root of the datatype hierarchy
        assert_eq!(columns[2].datatype, Some("anyAtomicType"));
        let schema = inferrer.schema().tables[0].to_table(None).table_schema.unwrap();
        assert!(schema.columns.unwrap()[2].inherited.datatype.is_none());
    }

    #[test]
    fn test_untyped_subjects() {
        let store = Store::new().unwrap();
        let q = quad("http://ex.org/x", "http://ex.org/p", Literal::new_simple_literal("v").into());
        let mut dropping = SchemaInferrer::new(&ConversionOptions::default(), None);
        assert!(!feed(&mut dropping, &store, &[q.clone()]));
        assert!(dropping.schema().tables.is_empty());

        let options = ConversionOptions {
            unknown_type_table: true,
            ..ConversionOptions::default()
        };
        let mut keeping = SchemaInferrer::new(&options, None);
        assert!(keeping.add_quad_to_schema(&q, &store).unwrap());
        assert_eq!(keeping.schema().tables[0].name, "Thing.csv");
        assert!(keeping.schema().tables[0].columns[0].suppress);
    }

    #[test]
    fn test_locked_schema_is_not_restructured() {
        let store = Store::new().unwrap();
        let mut inferrer = SchemaInferrer::new(&ConversionOptions::default(), None);
        feed(
            &mut inferrer,
            &store,
            &[
                quad("http://ex.org/people/1", TYPE_IRI, iri("http://ex.org/Person")),
                quad("http://ex.org/people/1", "http://ex.org/name", Literal::new_simple_literal("A").into()),
            ],
        );
        inferrer.lock_current_schema();
        assert!(inferrer.is_locked());
        feed(
            &mut inferrer,
            &store,
            &[
                quad("http://ex.org/people/1", "http://ex.org/name", Literal::new_simple_literal("B").into()),
                quad("http://ex.org/people/1", "http://ex.org/email", Literal::new_simple_literal("a@x").into()),
            ],
        );
        let schema = inferrer.schema();
        assert_eq!(schema.tables[0].columns.len(), 2);
        assert_eq!(schema.tables.len(), 3);
        // frozen subject template
        assert!(!inferrer.schema.tables[0].subject.clone().add("http://other.org/x"));
    }
}
