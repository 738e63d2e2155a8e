//! CSV to RDF conversion.
//!
//! [`Csv2RdfConvertor::convert`] normalizes the descriptor and returns a [`QuadStream`] that a
//! background thread fills. Tables are converted concurrently; each table's quads are
//! forwarded in one block, in the order the tables appear in the descriptor.

pub mod locate;
pub mod reader;
pub mod table;
pub mod values;

use crate::config::ConversionOptions;
use crate::consts::{
    expand_prefixed, COMMENT, DESCRIBES, FIRST, HAS_ROW, HAS_TABLE, NIL, REST, ROW, ROWNUM, TABLE,
    TABLE_GROUP, TITLE, TYPE, URL, XSD_INTEGER,
};
use crate::descriptor::checks::{check_descriptor, resolve_reference_table};
use crate::descriptor::{normalize, DescriptorInput, DescriptorWrapper, Table};
use crate::errors::ConvertorUsedError;
use crate::io::{Fetcher, Resolver};
use crate::issues::{IssueTracker, Location, LocationTracker};
use crate::template::{uri_to_iri, TemplateValue, UriTemplate};
use crate::util::resolve_url;
use anyhow::{anyhow, Error, Result};
use locate::MetadataLocator;
use log::{debug, info};
use oxigraph::model::{BlankNode, GraphName, Literal, NamedNode, NamedOrBlankNode, Quad, Term};
use reader::{CsvReader, CsvRow, DialectSettings};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use table::{ColumnContext, TableContext};
use values::{decode_cell, make_literal, strip_invalid, CellValue};

const CHANNEL_CAPACITY: usize = 1024;

/// Quads produced by a conversion, in emission order. An `Err` item ends the stream.
pub struct QuadStream {
    receiver: Receiver<Result<Quad>>,
    worker: Option<JoinHandle<()>>,
}

impl Iterator for QuadStream {
    type Item = Result<Quad>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.receiver.recv() {
            Ok(item) => Some(item),
            Err(_) => {
                if let Some(worker) = self.worker.take() {
                    if worker.join().is_err() {
                        return Some(Err(anyhow!("Conversion thread panicked")));
                    }
                }
                None
            }
        }
    }
}

/// Sends quads to the consumer; fails once the consumer has gone away.
#[derive(Clone)]
struct Emitter {
    sender: SyncSender<Result<Quad>>,
}

impl Emitter {
    fn emit(
        &self,
        subject: impl Into<NamedOrBlankNode>,
        predicate: impl Into<NamedNode>,
        object: impl Into<Term>,
    ) -> Result<()> {
        let quad = Quad::new(subject, predicate, object, GraphName::DefaultGraph);
        self.send(quad)
    }

    fn send(&self, quad: Quad) -> Result<()> {
        self.sender
            .send(Ok(quad))
            .map_err(|_| anyhow!("Output stream closed"))
    }
}

/// Single-use CSV to RDF convertor.
pub struct Csv2RdfConvertor {
    options: Arc<ConversionOptions>,
    fetcher: Fetcher,
    issues: Arc<IssueTracker>,
    used: AtomicBool,
}

impl Csv2RdfConvertor {
    pub fn new(options: ConversionOptions, resolver: Arc<dyn Resolver>) -> Self {
        let issues = Arc::new(IssueTracker::new(options.issue_policy, options.log_level));
        Self::with_issues(options, resolver, issues)
    }

    pub fn with_issues(
        options: ConversionOptions,
        resolver: Arc<dyn Resolver>,
        issues: Arc<IssueTracker>,
    ) -> Self {
        let options = Arc::new(options);
        Self {
            fetcher: Fetcher::new(resolver, options.clone()),
            options,
            issues,
            used: AtomicBool::new(false),
        }
    }

    pub fn issues(&self) -> Arc<IssueTracker> {
        self.issues.clone()
    }

    fn mark_used(&self) -> Result<()> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(Error::new(ConvertorUsedError));
        }
        Ok(())
    }

    /// Converts the tables described by a metadata document. `url` is where the document was
    /// loaded from.
    pub fn convert(&self, descriptor: impl Into<DescriptorInput>, url: Option<&str>) -> Result<QuadStream> {
        self.mark_used()?;
        let wrapper = normalize(descriptor, &self.fetcher, &self.issues, url)?;
        self.start(wrapper)
    }

    /// Loads the metadata document at `url` and converts it.
    pub fn convert_url(&self, url: &str) -> Result<QuadStream> {
        self.mark_used()?;
        let text = self.fetcher.jsonld(url, None)?;
        let wrapper = normalize(text, &self.fetcher, &self.issues, Some(url))?;
        self.start(wrapper)
    }

    /// Converts a bare CSV file, locating its metadata first.
    pub fn convert_csv(&self, csv_url: &str) -> Result<QuadStream> {
        self.mark_used()?;
        let (wrapper, metadata_url) = MetadataLocator::new(&self.fetcher, &self.issues).locate(csv_url)?;
        debug!("Converting {csv_url} with metadata {metadata_url}");
        self.start(wrapper)
    }

    /// Converts an already normalized descriptor.
    pub fn convert_descriptor(&self, wrapper: DescriptorWrapper) -> Result<QuadStream> {
        self.mark_used()?;
        self.start(wrapper)
    }

    fn start(&self, wrapper: DescriptorWrapper) -> Result<QuadStream> {
        let (sender, receiver) = sync_channel(CHANNEL_CAPACITY);
        let job = Job {
            wrapper,
            fetcher: self.fetcher.clone(),
            issues: self.issues.clone(),
            options: self.options.clone(),
        };
        let worker = thread::Builder::new()
            .name("csv2rdf".to_string())
            .spawn(move || {
                let emitter = Emitter { sender };
                if let Err(e) = job.run(&emitter) {
                    let _ = emitter.sender.send(Err(e));
                }
            })?;
        Ok(QuadStream {
            receiver,
            worker: Some(worker),
        })
    }
}

struct Job {
    wrapper: DescriptorWrapper,
    fetcher: Fetcher,
    issues: Arc<IssueTracker>,
    options: Arc<ConversionOptions>,
}

/// Decoded key values of one table, for primary and foreign key checks.
#[derive(Debug, Default)]
struct TableKeys {
    // column names -> (row, key text) for every row; `None` when a component is null
    keys: HashMap<Vec<String>, Vec<(u64, Option<String>)>>,
}

fn node_for(id: Option<&str>) -> Result<NamedOrBlankNode> {
    Ok(match id {
        Some(id) => NamedNode::new(id)?.into(),
        None => BlankNode::default().into(),
    })
}

impl Job {
    fn run(&self, emitter: &Emitter) -> Result<()> {
        check_descriptor(&self.wrapper, &self.issues)?;
        let minimal = self.options.minimal;
        let group_node = node_for(self.wrapper.id())?;
        if !minimal {
            emitter.emit(group_node.clone(), TYPE, TABLE_GROUP)?;
            for quad in self
                .wrapper
                .setup_external_props(self.wrapper.group_external(), &group_node)
            {
                emitter.send(quad)?;
            }
        }

        let key_plan = self.key_plan();
        let tables: Vec<&Table> = self
            .wrapper
            .tables()
            .into_iter()
            .filter(|t| !t.is_suppressed())
            .collect();
        info!("Converting {} table(s)", tables.len());

        let mut collected: HashMap<String, TableKeys> = HashMap::new();
        thread::scope(|scope| -> Result<()> {
            let mut workers = vec![];
            for table in &tables {
                let (sender, receiver) = sync_channel(CHANNEL_CAPACITY);
                let table_emitter = Emitter { sender };
                let group_node = &group_node;
                let wanted = key_plan.get(&table.url).cloned().unwrap_or_default();
                let handle = scope.spawn(move || {
                    self.convert_table(table, group_node, &table_emitter, &wanted)
                });
                workers.push((table.url.clone(), receiver, handle));
            }
            let mut first_error = None;
            for (url, receiver, handle) in workers {
                for item in receiver {
                    if first_error.is_some() {
                        break;
                    }
                    if let Err(e) = emitter.sender.send(item) {
                        first_error = Some(anyhow!("Output stream closed: {e}"));
                    }
                }
                match handle.join() {
                    Ok(Ok(keys)) => {
                        collected.insert(url, keys);
                    }
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        first_error.get_or_insert(anyhow!("Conversion of {url} panicked"));
                    }
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })?;

        self.check_keys(&collected)
    }

    /// The column lists whose values must be remembered per table.
    fn key_plan(&self) -> HashMap<String, Vec<Vec<String>>> {
        let mut plan: HashMap<String, Vec<Vec<String>>> = HashMap::new();
        for table in self.wrapper.tables() {
            let Some(schema) = self.wrapper.schema_of(table) else {
                continue;
            };
            if let Some(pk) = &schema.primary_key {
                plan.entry(table.url.clone()).or_default().push(pk.clone());
            }
            for fk in schema.foreign_keys.iter().flatten() {
                plan.entry(table.url.clone())
                    .or_default()
                    .push(fk.column_reference.clone());
                if let Some(target) = resolve_reference_table(
                    &self.wrapper,
                    fk.reference.resource.as_deref(),
                    fk.reference.schema_reference.as_deref(),
                ) {
                    plan.entry(target.url.clone())
                        .or_default()
                        .push(fk.reference.column_reference.clone());
                }
            }
        }
        plan
    }

    fn check_keys(&self, collected: &HashMap<String, TableKeys>) -> Result<()> {
        for table in self.wrapper.tables() {
            let Some(schema) = self.wrapper.schema_of(table) else {
                continue;
            };
            let Some(keys) = collected.get(&table.url) else {
                continue;
            };
            let location = |row: u64| {
                Some(Location {
                    table: Some(table.url.clone()),
                    row: Some(row),
                    column: None,
                })
            };
            if let Some(rows) = schema.primary_key.as_ref().and_then(|pk| keys.keys.get(pk)) {
                let mut seen = HashSet::new();
                for (row, key) in rows {
                    if let Some(key) = key {
                        if !seen.insert(key) {
                            self.issues.error(
                                format!("Duplicate primary key value '{key}'"),
                                location(*row),
                            )?;
                        }
                    }
                }
            }
            for fk in schema.foreign_keys.iter().flatten() {
                let Some(target) = resolve_reference_table(
                    &self.wrapper,
                    fk.reference.resource.as_deref(),
                    fk.reference.schema_reference.as_deref(),
                ) else {
                    continue;
                };
                let Some(available) = collected
                    .get(&target.url)
                    .and_then(|k| k.keys.get(&fk.reference.column_reference))
                else {
                    continue;
                };
                let available: HashSet<&String> = available.iter().filter_map(|(_, k)| k.as_ref()).collect();
                for (row, key) in keys.keys.get(&fk.column_reference).into_iter().flatten() {
                    if let Some(key) = key {
                        if !available.contains(key) {
                            self.issues.error(
                                format!("Foreign key value '{key}' has no match in {}", target.url),
                                location(*row),
                            )?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn convert_table(
        &self,
        table: &Table,
        group_node: &NamedOrBlankNode,
        emitter: &Emitter,
        wanted_keys: &[Vec<String>],
    ) -> Result<TableKeys> {
        let minimal = self.options.minimal;
        let mut location = LocationTracker::for_table(&table.url);
        let settings = DialectSettings::from_dialect(
            self.wrapper.dialect_of(table),
            &self.issues,
            Some(location.location()),
        );
        let stream = match self.fetcher.csv_stream(&table.url, None) {
            Ok(stream) => stream,
            Err(e) => {
                self.issues
                    .error(format!("Could not read {}: {e}", table.url), Some(location.location()))?;
                return Ok(TableKeys::default());
            }
        };
        let table_node = node_for(table.id.as_deref())?;
        if !minimal {
            emitter.emit(group_node.clone(), HAS_TABLE, table_node.clone())?;
            emitter.emit(table_node.clone(), TYPE, TABLE)?;
            emitter.emit(table_node.clone(), URL, NamedNode::new(table.url.as_str())?)?;
            for quad in self
                .wrapper
                .setup_external_props(table.external.as_deref(), &table_node)
            {
                emitter.send(quad)?;
            }
        }

        let header_rows = settings.header_row_count;
        let mut reader =
            CsvReader::new(stream, settings.clone()).reporting(self.issues.clone(), location.location());
        let mut comments = vec![];
        let mut headers = vec![];
        let mut pending = None;
        while headers.len() < header_rows {
            match reader.next().transpose()? {
                Some(CsvRow::Record { cells, .. }) => headers.push(cells),
                Some(CsvRow::Comment { text, .. }) => comments.push(text),
                None => break,
            }
        }
        let declared = self
            .wrapper
            .schema_of(table)
            .map(|s| s.columns().len())
            .unwrap_or(0);
        if headers.is_empty() && declared == 0 {
            // only the width of the first data row tells how many columns there are
            loop {
                match reader.next().transpose()? {
                    Some(CsvRow::Record { line, cells }) => {
                        pending = Some((line, cells));
                        break;
                    }
                    Some(CsvRow::Comment { text, .. }) => comments.push(text),
                    None => break,
                }
            }
        }
        let context = TableContext::build(
            &self.wrapper,
            table,
            settings,
            &headers,
            pending.as_ref().map(|(_, cells): &(u64, Vec<String>)| cells.len()),
            &self.issues,
        )?;
        debug!(
            "Table {}: {} columns, {} header rows",
            table.url,
            context.columns.len(),
            headers.len()
        );
        if !minimal {
            for text in comments.drain(..) {
                emitter.emit(table_node.clone(), COMMENT, Literal::new_simple_literal(text))?;
            }
        }

        let mut converter = RowConverter {
            job: self,
            context: &context,
            emitter,
            table_node: &table_node,
            keys: TableKeys::default(),
            wanted_keys,
            row: 0,
        };
        if let Some((line, cells)) = pending {
            converter.convert_row(line, &cells, &mut location)?;
        }
        for item in reader {
            match item? {
                CsvRow::Record { line, cells } => converter.convert_row(line, &cells, &mut location)?,
                CsvRow::Comment { text, .. } => {
                    if !minimal {
                        emitter.emit(table_node.clone(), COMMENT, Literal::new_simple_literal(text))?;
                    }
                }
            }
        }
        debug!("Table {}: converted {} rows", table.url, converter.row);
        Ok(converter.keys)
    }
}

struct RowConverter<'a> {
    job: &'a Job,
    context: &'a TableContext,
    emitter: &'a Emitter,
    table_node: &'a NamedOrBlankNode,
    keys: TableKeys,
    wanted_keys: &'a [Vec<String>],
    row: u64,
}

impl RowConverter<'_> {
    fn convert_row(&mut self, line: u64, cells: &[String], location: &mut LocationTracker) -> Result<()> {
        self.row += 1;
        location.set_row(Some(self.row));
        let issues = &self.job.issues;
        let physical = self.context.physical_columns();
        if cells.len() > physical {
            issues.warning(
                format!("Row has {} cells but the table has {physical} columns", cells.len()),
                Some(location.location()),
            );
        }

        // every cell is decoded before anything is emitted, templates may refer to any of them
        let mut values = Vec::with_capacity(self.context.columns.len());
        for column in &self.context.columns {
            location.set_column(Some(column.index + 1));
            let value = if column.is_virtual {
                CellValue::Null
            } else {
                let raw = cells.get(column.index).map(String::as_str).unwrap_or("");
                decode_cell(raw, column, issues, &location.location())
            };
            values.push(value);
        }
        let mut record: HashMap<String, TemplateValue> = HashMap::new();
        for (column, value) in self.context.columns.iter().zip(&values) {
            if let Some(v) = value.template_value() {
                record.insert(column.name.clone(), v);
            }
        }
        record.insert("_row".to_string(), TemplateValue::from(self.row.to_string()));
        record.insert("_sourceRow".to_string(), TemplateValue::from(line.to_string()));

        for names in self.wanted_keys {
            let mut parts = vec![];
            for name in names {
                let part = self
                    .context
                    .columns
                    .iter()
                    .position(|c| &c.name == name)
                    .and_then(|i| values[i].key_text());
                parts.push(part);
            }
            let key: Option<Vec<String>> = parts.into_iter().collect();
            self.keys
                .keys
                .entry(names.clone())
                .or_default()
                .push((self.row, key.map(|k| k.join("\u{1e}"))));
        }

        let default_subject: NamedOrBlankNode = BlankNode::default().into();
        let mut described: Vec<NamedOrBlankNode> = vec![];
        for (column, value) in self.context.columns.iter().zip(&values) {
            location.set_column(Some(column.index + 1));
            if value.is_null() && !column.is_virtual {
                if column.required {
                    issues.warning(
                        format!("Required column '{}' has no value", column.name),
                        Some(location.location()),
                    );
                }
                continue;
            }
            if column.suppress {
                continue;
            }
            let mut vars = record.clone();
            vars.insert("_column".to_string(), TemplateValue::from((column.index + 1).to_string()));
            if let Some(source) = column.source_column {
                vars.insert("_sourceColumn".to_string(), TemplateValue::from(source.to_string()));
            }
            vars.insert("_name".to_string(), TemplateValue::from(decoded_name(&column.name)));

            let subject = match &column.about_url {
                Some(template) => match self.expand(template, &vars, location)? {
                    Some(node) => NamedOrBlankNode::from(node),
                    None => continue,
                },
                None => default_subject.clone(),
            };
            let predicate = match &column.property_url {
                Some(template) => match self.expand(template, &vars, location)? {
                    Some(node) => node,
                    None => continue,
                },
                None => NamedNode::new(format!("{}#{}", self.context.url, column.name))?,
            };
            let objects: Vec<Term> = match &column.value_url {
                Some(template) => {
                    let items = value.items();
                    if items.len() <= 1 || column.separator.is_none() {
                        self.expand(template, &vars, location)?
                            .into_iter()
                            .map(Term::from)
                            .collect()
                    } else {
                        let mut nodes = vec![];
                        for item in items {
                            vars.insert(column.name.clone(), TemplateValue::from(strip_invalid(item)));
                            if let Some(node) = self.expand(template, &vars, location)? {
                                nodes.push(Term::from(node));
                            }
                        }
                        nodes
                    }
                }
                None => value
                    .items()
                    .into_iter()
                    .map(|item| Term::from(make_literal(item, column)))
                    .collect(),
            };
            if objects.is_empty() {
                continue;
            }
            if !described.contains(&subject) {
                described.push(subject.clone());
            }
            self.emit_objects(&subject, &predicate, objects, column)?;
        }

        if !self.job.options.minimal {
            self.emit_row_metadata(line, &described, &values)?;
        }
        Ok(())
    }

    fn emit_objects(
        &self,
        subject: &NamedOrBlankNode,
        predicate: &NamedNode,
        objects: Vec<Term>,
        column: &ColumnContext,
    ) -> Result<()> {
        if column.ordered && column.separator.is_some() {
            let head = BlankNode::default();
            self.emitter.emit(subject.clone(), predicate.clone(), head.clone())?;
            let mut current = head;
            let count = objects.len();
            for (i, object) in objects.into_iter().enumerate() {
                self.emitter.emit(current.clone(), FIRST, object)?;
                if i + 1 == count {
                    self.emitter.emit(current.clone(), REST, NIL)?;
                } else {
                    let next = BlankNode::default();
                    self.emitter.emit(current, REST, next.clone())?;
                    current = next;
                }
            }
            return Ok(());
        }
        for object in objects {
            self.emitter.emit(subject.clone(), predicate.clone(), object)?;
        }
        Ok(())
    }

    fn emit_row_metadata(&self, line: u64, described: &[NamedOrBlankNode], values: &[CellValue]) -> Result<()> {
        let row_node = BlankNode::default();
        self.emitter.emit(self.table_node.clone(), HAS_ROW, row_node.clone())?;
        self.emitter.emit(row_node.clone(), TYPE, ROW)?;
        self.emitter.emit(
            row_node.clone(),
            ROWNUM,
            Literal::new_typed_literal(self.row.to_string(), XSD_INTEGER),
        )?;
        self.emitter.emit(
            row_node.clone(),
            URL,
            NamedNode::new(format!("{}#row={line}", self.context.url))?,
        )?;
        for &index in &self.context.row_titles {
            let column = &self.context.columns[index];
            for item in values[index].items() {
                self.emitter.emit(row_node.clone(), TITLE, make_literal(item, column))?;
            }
        }
        for subject in described {
            self.emitter.emit(row_node.clone(), DESCRIBES, subject.clone())?;
        }
        Ok(())
    }

    /// Expands a URI template into an absolute IRI. Unusable results are reported and skipped.
    fn expand(
        &self,
        template: &UriTemplate,
        vars: &HashMap<String, TemplateValue>,
        location: &LocationTracker,
    ) -> Result<Option<NamedNode>> {
        let expanded = template.expand(vars);
        let expanded = expand_prefixed(&expanded).unwrap_or(expanded);
        let mut iri = resolve_url(&expanded, Some(&self.context.url));
        if self.job.options.template_iris {
            iri = uri_to_iri(&iri);
        }
        match NamedNode::new(iri.as_str()) {
            Ok(node) => Ok(Some(node)),
            Err(e) => {
                self.job.issues.warning(
                    format!("Template {} produced an invalid IRI '{iri}': {e}", template.as_str()),
                    Some(location.location()),
                );
                Ok(None)
            }
        }
    }
}

pub(crate) fn decoded_name(name: &str) -> String {
    urlencoding::decode(name)
        .map(|n| n.into_owned())
        .unwrap_or_else(|_| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryResolver;
    use serde_json::json;

    fn convertor(resolver: MemoryResolver, minimal: bool) -> Csv2RdfConvertor {
        let options = ConversionOptions {
            minimal,
            ..ConversionOptions::default()
        };
        Csv2RdfConvertor::new(options, Arc::new(resolver))
    }

    fn triples(stream: QuadStream) -> Vec<String> {
        stream
            .map(|q| q.unwrap().to_string())
            .collect::<Vec<_>>()
    }

    #[test]
    fn test_second_convert_fails() {
        let resolver = MemoryResolver::new().with_document("http://ex.org/t.csv", "a\n1\n");
        let conv = convertor(resolver, true);
        let stream = conv.convert_csv("http://ex.org/t.csv").unwrap();
        assert_eq!(triples(stream).len(), 1);
        let err = conv.convert_csv("http://ex.org/t.csv").err().unwrap();
        assert!(err.downcast_ref::<ConvertorUsedError>().is_some());
    }

    #[test]
    fn test_default_predicates_and_blank_subjects() {
        let resolver = MemoryResolver::new().with_document("http://ex.org/t.csv", "first name,age\nAda,36\n");
        let out = triples(convertor(resolver, true).convert_csv("http://ex.org/t.csv").unwrap());
        assert_eq!(out.len(), 2);
        assert!(out.iter().any(|t| t.contains("<http://ex.org/t.csv#first%20name> \"Ada\"")));
        assert!(out.iter().all(|t| t.starts_with("_:")));
    }

    #[test]
    fn test_virtual_columns_and_lists() {
        let resolver = MemoryResolver::new().with_document("http://ex.org/t.csv", "id,tags\n1,a b\n");
        let descriptor = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "t.csv",
            "aboutUrl": "#{id}",
            "tableSchema": {"columns": [
                {"name": "id", "titles": "id", "suppressOutput": true},
                {"name": "tags", "titles": "tags", "separator": " ", "ordered": true, "propertyUrl": "http://ex.org/tags"},
                {"virtual": true, "propertyUrl": "rdf:type", "valueUrl": "schema:Thing"}
            ]}
        });
        let out = triples(
            convertor(resolver, true)
                .convert(descriptor, Some("http://ex.org/meta.json"))
                .unwrap(),
        );
        assert!(out.contains(
            &"<http://ex.org/t.csv#1> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://schema.org/Thing>".to_string()
        ));
        // one list head, two rdf:first, two rdf:rest
        assert_eq!(out.len(), 6);
        assert!(out.iter().any(|t| t.contains("rdf-syntax-ns#nil")));
    }

    #[test]
    fn test_comments_and_row_metadata() {
        let resolver = MemoryResolver::new().with_document("http://ex.org/t.csv", "# generated\nid\n1\n");
        let out = triples(convertor(resolver, false).convert_csv("http://ex.org/t.csv").unwrap());
        assert!(out.iter().any(|t| t.contains("rdf-schema#comment> \"generated\"")));
        assert!(out.iter().any(|t| t.contains("<http://ex.org/t.csv#row=3>")));
        assert!(out
            .iter()
            .any(|t| t.contains("#rownum> \"1\"^^<http://www.w3.org/2001/XMLSchema#integer>")));
    }

    #[test]
    fn test_primary_key_duplicates_are_reported() {
        let resolver = MemoryResolver::new().with_document("http://ex.org/t.csv", "id\n1\n1\n");
        let descriptor = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "t.csv",
            "tableSchema": {"columns": [{"name": "id", "titles": "id"}], "primaryKey": "id"}
        });
        let conv = convertor(resolver, true);
        let out: Vec<_> = conv
            .convert(descriptor, Some("http://ex.org/meta.json"))
            .unwrap()
            .collect();
        assert!(out.iter().all(|q| q.is_ok()));
        assert_eq!(conv.issues().get_errors().len(), 1);
    }
}
