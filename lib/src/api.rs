//! One-call entry points over the convertors, plus logging bootstrap and output writers used
//! by the command line tool.

use crate::config::ConversionOptions;
use crate::csv2rdf::{Csv2RdfConvertor, QuadStream};
use crate::descriptor::DescriptorInput;
use crate::io::{DefaultResolver, Resolver};
use crate::issues::{Issue, IssueTracker};
use crate::rdf2csvw::{CsvwRow, Rdf2CsvwConvertor, RowStream};
use crate::util::{is_metadata_url, last_segment};
use crate::validate::{ValidationInput, Validator};
use anyhow::{Context, Result};
use log::info;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Initializes logging for the csvw-rdf library.
///
/// This function checks for the `CSVW_LOG` environment variable. If it is set,
/// `RUST_LOG` is set to its value. `CSVW_LOG` takes precedence over `RUST_LOG`.
/// The logger initialization (e.g., `env_logger::init()`) must be called after
/// this function for the log level to take effect.
pub fn init_logging() {
    if let Ok(log_level) = std::env::var("CSVW_LOG") {
        std::env::set_var("RUST_LOG", log_level);
    }
}

fn resolver_or_default(resolver: Option<Arc<dyn Resolver>>) -> Arc<dyn Resolver> {
    resolver.unwrap_or_else(|| Arc::new(DefaultResolver::new()))
}

/// Converts a metadata document or a CSV file (whose metadata is then located) to RDF.
pub fn csvw_to_rdf(
    url: &str,
    options: ConversionOptions,
    resolver: Option<Arc<dyn Resolver>>,
) -> Result<(QuadStream, Arc<IssueTracker>)> {
    let convertor = Csv2RdfConvertor::new(options, resolver_or_default(resolver));
    let issues = convertor.issues();
    let stream = if is_metadata_url(url) {
        convertor.convert_url(url)?
    } else {
        convertor.convert_csv(url)?
    };
    Ok((stream, issues))
}

/// Converts the RDF document at `url` into CSVW rows, inferring the schema unless
/// `descriptor` is given.
pub fn rdf_to_csvw(
    url: &str,
    descriptor: Option<DescriptorInput>,
    options: ConversionOptions,
    resolver: Option<Arc<dyn Resolver>>,
) -> Result<RowStream> {
    let convertor = Rdf2CsvwConvertor::new(options, resolver_or_default(resolver));
    convertor.convert_url(url, descriptor)
}

/// Validates a metadata document or CSV file and returns every issue found.
pub fn validate(
    url: &str,
    options: ConversionOptions,
    resolver: Option<Arc<dyn Resolver>>,
) -> Result<Vec<Issue>> {
    let validator = Validator::new(options, resolver_or_default(resolver));
    Ok(validator.validate(ValidationInput::from_url(url))?.collect())
}

/// Files written by [`write_tables`].
#[derive(Debug, Default)]
pub struct WrittenTables {
    /// CSV file per table name.
    pub tables: BTreeMap<String, PathBuf>,
    pub rows: usize,
    pub metadata: Option<PathBuf>,
}

/// File name for a table: the last URL segment, with a `.csv` extension.
pub fn table_file_name(table_name: &str) -> String {
    let segment = last_segment(table_name);
    let segment = if segment.is_empty() { "table" } else { segment };
    if segment.ends_with(".csv") {
        segment.to_string()
    } else {
        format!("{segment}.csv")
    }
}

/// Writes the rows to one CSV file per table in `outdir`, plus the final descriptor as
/// `csv-metadata.json`. Rows are buffered per table because inferred tables may still gain
/// columns while the stream runs.
pub fn write_tables<I>(rows: I, outdir: &Path) -> Result<WrittenTables>
where
    I: IntoIterator<Item = Result<CsvwRow>>,
{
    fs::create_dir_all(outdir)
        .with_context(|| format!("Failed to create {}", outdir.display()))?;
    let mut buffered: BTreeMap<String, (Vec<String>, Vec<CsvwRow>)> = BTreeMap::new();
    let mut last_descriptor = None;
    let mut written = WrittenTables::default();
    for row in rows {
        let row = row?;
        last_descriptor = Some(row.descriptor.clone());
        let entry = buffered
            .entry(row.table.name.clone())
            .or_insert_with(|| (vec![], vec![]));
        entry.0 = row.table.columns.clone();
        entry.1.push(row);
        written.rows += 1;
    }
    for (name, (columns, rows)) in buffered {
        let path = outdir.join(table_file_name(&name));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(&columns)?;
        for row in rows {
            let record: Vec<&str> = columns
                .iter()
                .map(|c| row.row.get(c).map(String::as_str).unwrap_or_default())
                .collect();
            writer.write_record(&record)?;
        }
        writer.flush()?;
        info!("Wrote table {name} to {}", path.display());
        written.tables.insert(name, path);
    }
    if let Some(descriptor) = last_descriptor {
        let path = outdir.join("csv-metadata.json");
        fs::write(&path, serde_json::to_string_pretty(&descriptor.to_json())?)?;
        written.metadata = Some(path);
    }
    Ok(written)
}
