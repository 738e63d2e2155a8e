//! RDF to CSVW conversion.
//!
//! Quads flow through a bounded [`WindowStore`]. On every cycle the schema is updated from the
//! quads added by the previous window move (unless a descriptor was supplied), the table
//! queries run against the window, the window moves, and the solutions whose subject has just
//! left the window (or whose terms will not be seen again) are emitted as rows. Once the
//! input is exhausted every remaining solution is emitted.
//!
//! Rows already emitted are remembered per subject only while that subject is resident.

pub mod format;
pub mod inferrer;
pub mod query;
pub mod schema;
pub mod vocab;
pub mod window_store;

use crate::config::ConversionOptions;
use crate::descriptor::{normalize, DescriptorInput, DescriptorWrapper};
use crate::errors::ConvertorUsedError;
use crate::fetch::{detect_format_from_url, sniff_format};
use crate::io::{Fetcher, Resolver};
use crate::issues::IssueTracker;
use crate::util::parse_rdf;
use anyhow::Result;
use format::{bound_terms, merge_list_rows, quad_terms, reconstruct_row, Binding};
use inferrer::SchemaInferrer;
use log::{debug, info};
use oxigraph::io::RdfFormat;
use oxigraph::model::{Quad, Term};
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;
use query::{create_query, TableQuery};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use window_store::{QuadSource, WindowStore};

/// Query index, binding and reconstructed cells of one result.
type Solution = (usize, Binding, Vec<String>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<String>,
}

/// One CSV row together with the table and the descriptor it belongs to.
#[derive(Debug, Clone)]
pub struct CsvwRow {
    pub descriptor: Arc<DescriptorWrapper>,
    pub table: TableInfo,
    pub row: HashMap<String, String>,
}

impl CsvwRow {
    /// Cells in column order.
    pub fn cells(&self) -> Vec<&str> {
        self.table
            .columns
            .iter()
            .map(|c| self.row.get(c).map(String::as_str).unwrap_or_default())
            .collect()
    }
}

pub struct Rdf2CsvwConvertor {
    options: Arc<ConversionOptions>,
    fetcher: Fetcher,
    issues: Arc<IssueTracker>,
    used: AtomicBool,
}

impl Rdf2CsvwConvertor {
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
            return Err(ConvertorUsedError.into());
        }
        Ok(())
    }

    /// Converts a stream of quads. Without `descriptor` the schema is inferred from the data.
    pub fn convert(&self, quads: QuadSource, descriptor: Option<DescriptorInput>) -> Result<RowStream> {
        self.mark_used()?;
        let fixed = match descriptor {
            Some(input) => {
                let base = self.options.base_iri.clone();
                let wrapper = normalize(input, &self.fetcher, &self.issues, base.as_deref())?;
                Some(wrapper)
            }
            None => None,
        };
        RowStream::new(quads, fixed, &self.options, self.fetcher.clone(), self.issues.clone())
    }

    /// Loads RDF from `url`, guessing its format from the extension or the content.
    pub fn convert_url(&self, url: &str, descriptor: Option<DescriptorInput>) -> Result<RowStream> {
        let mut bytes = vec![];
        self.fetcher.rdf(url, None)?.read_to_end(&mut bytes)?;
        let format = detect_format_from_url(url)
            .or_else(|| sniff_format(&bytes))
            .unwrap_or(RdfFormat::Turtle);
        info!("Reading {url} as {format}");
        let quads = parse_rdf(Cursor::new(bytes), format, Some(url))?;
        let quads: Vec<Result<Quad>> = quads.collect();
        self.convert(Box::new(quads.into_iter()), descriptor)
    }
}

/// Pull iterator over the converted rows.
pub struct RowStream {
    window: WindowStore,
    inferrer: Option<SchemaInferrer>,
    descriptor: Option<Arc<DescriptorWrapper>>,
    queries: Vec<TableQuery>,
    pending: VecDeque<CsvwRow>,
    /// Rows emitted for subjects still in the window, keyed by subject.
    emitted: HashMap<Option<Term>, HashSet<(String, Vec<String>)>>,
    last_added: Vec<Quad>,
    issues: Arc<IssueTracker>,
    finished: bool,
}

impl RowStream {
    fn new(
        quads: QuadSource,
        fixed: Option<DescriptorWrapper>,
        options: &ConversionOptions,
        fetcher: Fetcher,
        issues: Arc<IssueTracker>,
    ) -> Result<Self> {
        let inferrer = match fixed {
            Some(_) => None,
            None => Some(SchemaInferrer::new(options, Some(fetcher))),
        };
        let mut stream = Self {
            window: WindowStore::new(quads, options.window_size, options.window_step)?,
            inferrer,
            descriptor: None,
            queries: vec![],
            pending: VecDeque::new(),
            emitted: HashMap::new(),
            last_added: vec![],
            issues,
            finished: false,
        };
        if let Some(wrapper) = fixed {
            stream.set_descriptor(wrapper)?;
        }
        Ok(stream)
    }

    /// The descriptor rows are currently produced for.
    pub fn descriptor(&self) -> Option<Arc<DescriptorWrapper>> {
        self.descriptor.clone()
    }

    pub fn issues(&self) -> Arc<IssueTracker> {
        self.issues.clone()
    }

    fn set_descriptor(&mut self, wrapper: DescriptorWrapper) -> Result<()> {
        let mut queries = vec![];
        for table in wrapper.tables() {
            match create_query(&wrapper, table)? {
                Some(query) => queries.push(query),
                None => debug!("Table {} declares no columns, skipping", table.url),
            }
        }
        self.queries = queries;
        self.descriptor = Some(Arc::new(wrapper));
        Ok(())
    }

    /// Folds the quads of the last window move into the inferred schema.
    fn update_schema(&mut self, lock: bool) -> Result<()> {
        let Some(inferrer) = &mut self.inferrer else {
            return Ok(());
        };
        let had_quads = !self.last_added.is_empty();
        let mut changed = false;
        for quad in self.last_added.drain(..) {
            changed |= inferrer.add_quad_to_schema(&quad, self.window.store())?;
        }
        if (lock || (had_quads && !changed)) && !inferrer.is_locked() {
            inferrer.lock_current_schema();
        }
        if changed || self.descriptor.is_none() {
            let wrapper = inferrer.schema().to_descriptor()?;
            self.set_descriptor(wrapper)?;
        }
        Ok(())
    }

    /// Runs every table query and reconstructs the cells while the matched quads are resident.
    fn solutions(&self) -> Result<Vec<Solution>> {
        let mut out = vec![];
        for (idx, query) in self.queries.iter().enumerate() {
            for binding in run_query(self.window.store(), &query.sparql)? {
                let cells = reconstruct_row(query, &binding, self.window.store())?;
                out.push((idx, binding, cells));
            }
        }
        Ok(out)
    }

    fn emit(&mut self, solutions: Vec<Solution>) -> Result<()> {
        let Some(descriptor) = self.descriptor.clone() else {
            return Ok(());
        };
        let mut groups: Vec<(usize, Option<Term>, Vec<Vec<String>>)> = vec![];
        let mut index: HashMap<(usize, Option<Term>), usize> = HashMap::new();
        for (idx, binding, cells) in solutions {
            let subject = self.queries[idx]
                .subject_var()
                .and_then(|v| binding.get(v))
                .cloned();
            let slot = *index.entry((idx, subject.clone())).or_insert_with(|| {
                groups.push((idx, subject, vec![]));
                groups.len() - 1
            });
            groups[slot].2.push(cells);
        }
        for (idx, subject, rows) in groups {
            let query = &self.queries[idx];
            let columns = query.output_columns();
            let seen = self.emitted.entry(subject).or_default();
            for cells in merge_list_rows(query, rows) {
                if !seen.insert((query.name.clone(), cells.clone())) {
                    continue;
                }
                self.pending.push_back(CsvwRow {
                    descriptor: descriptor.clone(),
                    table: TableInfo {
                        name: query.name.clone(),
                        columns: columns.clone(),
                    },
                    row: columns.iter().cloned().zip(cells).collect(),
                });
            }
        }
        Ok(())
    }

    /// Drops what was remembered about subjects that left the window. Rows without a bound
    /// subject are only remembered until the next eviction.
    fn forget(&mut self, departed: &HashSet<Term>) {
        if departed.is_empty() {
            return;
        }
        self.emitted.retain(|subject, _| match subject {
            Some(subject) => !departed.contains(subject),
            None => false,
        });
    }

    fn cycle(&mut self) -> Result<()> {
        self.update_schema(false)?;
        let solutions = self.solutions()?;
        let moved = self.window.move_window()?;
        if self.issues.level().is_debug() {
            debug!(
                "Window moved: {} quads added, {} removed, {} resident",
                moved.added.len(),
                moved.removed.len(),
                self.window.len()
            );
        }

        let terms = |quads: &[Quad]| -> HashSet<Term> { quads.iter().flat_map(quad_terms).collect() };
        let prev_added = terms(&moved.prev_added);
        let added = terms(&moved.added);
        let removed = terms(&moved.removed);
        let departed: HashSet<Term> = moved.removed.iter().map(|q| quad_terms(q)[0].clone()).collect();
        let stable: Vec<Solution> = solutions
            .into_iter()
            .filter(|(idx, binding, _)| {
                let left = self.queries[*idx]
                    .subject_var()
                    .and_then(|v| binding.get(v))
                    .is_some_and(|s| departed.contains(s));
                left || bound_terms(binding)
                    .all(|t| prev_added.contains(t) && (removed.contains(t) || !added.contains(t)))
            })
            .collect();
        self.emit(stable)?;
        self.forget(&departed);
        self.last_added = moved.added;

        if self.window.is_done() {
            self.update_schema(true)?;
            let remaining = self.solutions()?;
            self.emit(remaining)?;
            self.finished = true;
            debug!("RDF input exhausted, {} rows pending", self.pending.len());
        }
        Ok(())
    }
}

impl Iterator for RowStream {
    type Item = Result<CsvwRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Some(Ok(row));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.cycle() {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}

fn run_query(store: &Store, sparql: &str) -> Result<Vec<Binding>> {
    let results = SparqlEvaluator::new()
        .parse_query(sparql)?
        .on_store(store)
        .execute()?;
    let mut bindings = vec![];
    if let QueryResults::Solutions(solutions) = results {
        for solution in solutions {
            let solution = solution?;
            let binding: Binding = solution
                .iter()
                .map(|(var, term)| (var.as_str().to_string(), term.clone()))
                .collect();
            bindings.push(binding);
        }
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryResolver;
    use serde_json::json;

    const PEOPLE: &str = r#"
@prefix ex: <http://ex.org/> .
ex:1 a ex:Person ; ex:name "Alice" ; ex:age 30 .
ex:2 a ex:Person ; ex:name "Bob" .
"#;

    fn convertor(options: ConversionOptions) -> Rdf2CsvwConvertor {
        let resolver = MemoryResolver::new().with_document("http://ex.org/people.ttl", PEOPLE);
        Rdf2CsvwConvertor::new(options, Arc::new(resolver))
    }

    fn sorted_cells(rows: &[CsvwRow]) -> Vec<Vec<String>> {
        let mut cells: Vec<Vec<String>> = rows
            .iter()
            .map(|r| r.cells().into_iter().map(str::to_string).collect())
            .collect();
        cells.sort();
        cells
    }

    #[test]
    fn test_inferred_tables() {
        let rows: Vec<CsvwRow> = convertor(ConversionOptions::default())
            .convert_url("http://ex.org/people.ttl", None)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].table.name, "Person.csv");
        assert_eq!(rows[0].table.columns, vec!["subject_id", "name", "age"]);
        assert_eq!(
            sorted_cells(&rows),
            vec![vec!["1", "Alice", "30"], vec!["2", "Bob", ""]]
        );
    }

    #[test]
    fn test_small_windows_keep_late_columns() {
        let options = ConversionOptions {
            window_size: 3,
            window_step: 2,
            ..ConversionOptions::default()
        };
        let rows: Vec<CsvwRow> = convertor(options)
            .convert_url("http://ex.org/people.ttl", None)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.table.name, "Person.csv");
            assert_eq!(row.table.columns, vec!["subject_id", "name", "age"]);
        }
        assert_eq!(
            sorted_cells(&rows),
            vec![vec!["1", "Alice", "30"], vec!["2", "Bob", ""]]
        );
    }

    #[test]
    fn test_emitted_rows_are_forgotten_with_their_subject() {
        let people: String = (0..50)
            .map(|i| format!("<http://ex.org/p{i}> a <http://ex.org/Person> ; <http://ex.org/name> \"N{i}\" .\n"))
            .collect();
        let resolver = MemoryResolver::new().with_document("http://ex.org/many.ttl", people.as_str());
        let options = ConversionOptions {
            window_size: 6,
            window_step: 3,
            ..ConversionOptions::default()
        };
        let mut stream = Rdf2CsvwConvertor::new(options, Arc::new(resolver))
            .convert_url("http://ex.org/many.ttl", None)
            .unwrap();
        let mut rows = vec![];
        let mut remembered = 0;
        while let Some(row) = stream.next() {
            rows.push(row.unwrap());
            remembered = remembered.max(stream.emitted.values().map(HashSet::len).sum::<usize>());
        }
        assert!(remembered <= 9, "remembered {remembered} rows");
        let mut expected: Vec<Vec<String>> = (0..50).map(|i| vec![format!("p{i}"), format!("N{i}")]).collect();
        expected.sort();
        assert_eq!(sorted_cells(&rows), expected);
    }

    #[test]
    fn test_supplied_descriptor() {
        let descriptor = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "http://ex.org/people.csv",
            "aboutUrl": "http://ex.org/{id}",
            "tableSchema": {"columns": [
                {"name": "id", "suppressOutput": true},
                {"name": "name", "propertyUrl": "http://ex.org/name", "required": true}
            ]}
        });
        let rows: Vec<CsvwRow> = convertor(ConversionOptions::default())
            .convert_url("http://ex.org/people.ttl", Some(descriptor.into()))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows[0].table.name, "http://ex.org/people.csv");
        assert_eq!(
            sorted_cells(&rows),
            vec![vec!["1", "Alice"], vec!["2", "Bob"]]
        );
    }

    #[test]
    fn test_second_convert_fails() {
        let c = convertor(ConversionOptions::default());
        let _ = c.convert(Box::new(std::iter::empty()), None).unwrap();
        let err = c.convert(Box::new(std::iter::empty()), None).err().unwrap();
        assert!(err.downcast_ref::<ConvertorUsedError>().is_some());
    }
}
