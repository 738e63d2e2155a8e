//! Per-table conversion state: the resolved columns (declared, discovered from the header and
//! virtual) with their inherited annotations and compiled URI templates.

use super::reader::DialectSettings;
use crate::descriptor::{Column, Datatype, DescriptorWrapper, InheritanceChain, Table};
use crate::formats::FormatSpec;
use crate::issues::{IssueTracker, Location};
use crate::template::UriTemplate;
use anyhow::Result;

/// A column with every inherited annotation resolved.
#[derive(Debug, Clone)]
pub struct ColumnContext {
    /// 0-based logical index.
    pub index: usize,
    /// 1-based index in the source file; `None` for virtual columns.
    pub source_column: Option<usize>,
    pub name: String,
    pub titles: Vec<String>,
    pub is_virtual: bool,
    pub suppress: bool,
    pub about_url: Option<UriTemplate>,
    pub property_url: Option<UriTemplate>,
    pub value_url: Option<UriTemplate>,
    pub datatype: Datatype,
    pub format: Option<FormatSpec>,
    pub default: String,
    pub null: Vec<String>,
    pub lang: Option<String>,
    pub separator: Option<String>,
    pub ordered: bool,
    pub required: bool,
}

impl ColumnContext {
    pub fn base(&self) -> &str {
        self.datatype.base_name()
    }
}

/// Name derived from a title: percent-encoded, with `-` escaped as well.
pub fn name_from_title(title: &str) -> String {
    urlencoding::encode(title).replace('-', "%2D")
}

pub struct TableContext {
    pub url: String,
    pub columns: Vec<ColumnContext>,
    pub settings: DialectSettings,
    /// Indices of the columns named by `rowTitles`.
    pub row_titles: Vec<usize>,
    physical: usize,
}

struct ColumnSource<'a> {
    declared: Option<&'a Column>,
    index: usize,
    source_column: Option<usize>,
    titles: Vec<String>,
}

impl TableContext {
    /// Resolves the columns of `table`. `headers` are the header rows already read from the
    /// file; `first_row_width` is the width of the first data row when neither a header nor a
    /// declared column tells how many columns there are.
    pub fn build(
        wrapper: &DescriptorWrapper,
        table: &Table,
        settings: DialectSettings,
        headers: &[Vec<String>],
        first_row_width: Option<usize>,
        issues: &IssueTracker,
    ) -> Result<Self> {
        let location = Location {
            table: Some(table.url.clone()),
            row: None,
            column: None,
        };
        let declared: &[Column] = wrapper.schema_of(table).map(|s| s.columns()).unwrap_or_default();
        let physical: Vec<&Column> = declared.iter().filter(|c| !c.is_virtual()).collect();
        let virtuals: Vec<&Column> = declared.iter().filter(|c| c.is_virtual()).collect();

        let header_width = headers.iter().map(Vec::len).max().unwrap_or(0);
        let mut header_titles: Vec<Vec<String>> = vec![vec![]; header_width];
        for row in headers {
            for (i, cell) in row.iter().enumerate() {
                if !cell.is_empty() && !header_titles[i].contains(cell) {
                    header_titles[i].push(cell.clone());
                }
            }
        }
        if !physical.is_empty() && header_width > physical.len() {
            issues.warning(
                format!(
                    "Header has {header_width} columns but the schema declares {}",
                    physical.len()
                ),
                Some(location.clone()),
            );
        }

        let mut width = physical.len().max(header_width);
        if width == 0 {
            width = first_row_width.unwrap_or(0);
        }
        let mut sources = vec![];
        for i in 0..width {
            let column = physical.get(i).copied();
            let found = header_titles.get(i).cloned().unwrap_or_default();
            let mut titles: Vec<String> = column
                .and_then(|c| c.titles.as_ref())
                .map(|t| t.values().flatten().cloned().collect())
                .unwrap_or_default();
            if !titles.is_empty() && !found.is_empty() && !found.iter().any(|f| titles.contains(f)) {
                issues.warning(
                    format!(
                        "Header title '{}' does not match the declared titles {:?}",
                        found.join(" "),
                        titles
                    ),
                    Some(Location {
                        column: Some(i + 1),
                        ..location.clone()
                    }),
                );
            }
            for title in found {
                if !titles.contains(&title) {
                    titles.push(title);
                }
            }
            sources.push(ColumnSource {
                declared: column,
                index: i,
                source_column: Some(i + 1 + settings.skip_columns),
                titles,
            });
        }
        for (offset, column) in virtuals.into_iter().enumerate() {
            sources.push(ColumnSource {
                declared: Some(column),
                index: width + offset,
                source_column: None,
                titles: column
                    .titles
                    .as_ref()
                    .map(|t| t.values().flatten().cloned().collect())
                    .unwrap_or_default(),
            });
        }

        let table_chain = wrapper.chain(table);
        let mut columns = vec![];
        for source in sources {
            let chain = match source.declared {
                Some(c) => table_chain.with_front(&c.inherited),
                None => table_chain.clone(),
            };
            let column_location = Location {
                column: Some(source.index + 1),
                ..location.clone()
            };
            columns.push(resolve_column(source, &chain, issues, column_location)?);
        }

        let row_titles = wrapper
            .schema_of(table)
            .and_then(|s| s.row_titles.as_ref())
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| columns.iter().position(|c| &c.name == n))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            url: table.url.clone(),
            columns,
            settings,
            row_titles,
            physical: width,
        })
    }

    /// Number of columns backed by cells of the file.
    pub fn physical_columns(&self) -> usize {
        self.physical
    }
}

fn compile(
    template: Option<&str>,
    issues: &IssueTracker,
    location: &Location,
) -> Result<Option<UriTemplate>> {
    let Some(source) = template else {
        return Ok(None);
    };
    match UriTemplate::parse(source) {
        Ok(t) => Ok(Some(t)),
        Err(e) => {
            issues.error(format!("Invalid URI template: {e}"), Some(location.clone()))?;
            Ok(None)
        }
    }
}

fn resolve_column(
    source: ColumnSource<'_>,
    chain: &InheritanceChain<'_>,
    issues: &IssueTracker,
    location: Location,
) -> Result<ColumnContext> {
    let name = source
        .declared
        .and_then(|c| c.name.clone())
        .or_else(|| source.titles.first().map(|t| name_from_title(t)))
        .unwrap_or_else(|| format!("_col.{}", source.index + 1));
    let datatype = chain.datatype().cloned().unwrap_or_default();
    let format = datatype.format_spec();
    Ok(ColumnContext {
        index: source.index,
        source_column: source.source_column,
        name,
        titles: source.titles,
        is_virtual: source.declared.is_some_and(Column::is_virtual),
        suppress: source.declared.is_some_and(Column::is_suppressed),
        about_url: compile(chain.about_url(), issues, &location)?,
        property_url: compile(chain.property_url(), issues, &location)?,
        value_url: compile(chain.value_url(), issues, &location)?,
        datatype,
        format,
        default: chain.default_value().to_string(),
        null: chain.null(),
        lang: chain.lang().map(str::to_string),
        separator: chain.separator().map(str::to_string),
        ordered: chain.ordered(),
        required: chain.required(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionOptions;
    use crate::descriptor::normalize;
    use crate::io::{Fetcher, MemoryResolver};
    use serde_json::json;
    use std::sync::Arc;

    fn wrapper(value: serde_json::Value) -> DescriptorWrapper {
        let fetcher = Fetcher::new(
            Arc::new(MemoryResolver::new()),
            Arc::new(ConversionOptions::default()),
        );
        normalize(value, &fetcher, &IssueTracker::collecting(), Some("http://ex.org/m.json")).unwrap()
    }

    #[test]
    fn test_names_from_headers() {
        let w = wrapper(json!({"@context": "http://www.w3.org/ns/csvw", "url": "t.csv"}));
        let table = w.tables()[0];
        let issues = IssueTracker::collecting();
        let ctx = TableContext::build(
            &w,
            table,
            DialectSettings::default(),
            &[vec!["first-name".into(), "".into()]],
            None,
            &issues,
        )
        .unwrap();
        assert_eq!(ctx.columns[0].name, "first%2Dname");
        assert_eq!(ctx.columns[1].name, "_col.2");
        assert_eq!(ctx.columns[0].null, vec![String::new()]);
    }

    #[test]
    fn test_declared_and_virtual_columns() {
        let w = wrapper(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "t.csv",
            "aboutUrl": "#{id}",
            "tableSchema": {"columns": [
                {"name": "id", "titles": "ID", "datatype": "integer"},
                {"name": "kind", "virtual": true, "propertyUrl": "rdf:type", "valueUrl": "http://ex.org/Thing"}
            ]}
        }));
        let issues = IssueTracker::collecting();
        let ctx = TableContext::build(
            &w,
            w.tables()[0],
            DialectSettings::default(),
            &[vec!["Identifier".into()]],
            None,
            &issues,
        )
        .unwrap();
        assert_eq!(ctx.columns.len(), 2);
        assert_eq!(ctx.physical_columns(), 1);
        assert!(ctx.columns[1].is_virtual);
        assert_eq!(ctx.columns[1].source_column, None);
        assert_eq!(ctx.columns[0].about_url.as_ref().unwrap().as_str(), "#{id}");
        assert_eq!(ctx.columns[0].base(), "integer");
        // the header title differs from the declared one
        assert_eq!(issues.get_warnings().len(), 1);
    }
}
