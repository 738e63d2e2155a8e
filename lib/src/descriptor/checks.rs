//! Structural checks over a normalized descriptor. They never modify it; every problem is
//! reported through the issue tracker.

use super::model::{Column, Datatype, Table};
use super::DescriptorWrapper;
use crate::formats::{self, ValueShape};
use crate::issues::{IssueTracker, Location};
use anyhow::Result;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;

fn table_location(table: &Table) -> Option<Location> {
    Some(Location {
        table: Some(table.url.clone()),
        row: None,
        column: None,
    })
}

fn column_location(table: &Table, index: usize) -> Option<Location> {
    Some(Location {
        table: Some(table.url.clone()),
        row: None,
        column: Some(index + 1),
    })
}

/// Runs every structural check of the descriptor.
pub fn check_descriptor(wrapper: &DescriptorWrapper, issues: &IssueTracker) -> Result<()> {
    let tables = wrapper.tables();
    if wrapper.is_table_group() {
        if tables.len() > 1 && tables.iter().any(|t| t.url.is_empty()) {
            issues.error("Every table of a table group with several tables needs a url", None)?;
        }
        let mut urls = HashSet::new();
        for table in &tables {
            if !table.url.is_empty() && !urls.insert(table.url.as_str()) {
                issues.error(format!("Table url {} is used more than once", table.url), None)?;
            }
        }
    }
    for table in &tables {
        check_table(wrapper, table, issues)?;
    }
    Ok(())
}

fn check_table(wrapper: &DescriptorWrapper, table: &Table, issues: &IssueTracker) -> Result<()> {
    let Some(schema) = wrapper.schema_of(table) else {
        return Ok(());
    };
    let columns = schema.columns();
    let mut names = HashSet::new();
    let mut seen_virtual = false;
    for (index, column) in columns.iter().enumerate() {
        if let Some(name) = &column.name {
            if !names.insert(name.as_str()) {
                issues.error(
                    format!("Duplicate column name '{name}'"),
                    column_location(table, index),
                )?;
            }
        }
        if column.is_virtual() {
            seen_virtual = true;
        } else if seen_virtual {
            issues.error(
                "A non-virtual column must not follow a virtual column",
                column_location(table, index),
            )?;
        }
        let chain = wrapper.chain(table).with_front(&column.inherited);
        if let Some(datatype) = chain.datatype() {
            check_datatype(datatype, table, index, issues)?;
        }
    }

    let has_column = |name: &str| columns.iter().any(|c| c.name.as_deref() == Some(name));
    for key in schema.primary_key.iter().flatten() {
        if !has_column(key) {
            issues.error(
                format!("Primary key references unknown column '{key}'"),
                table_location(table),
            )?;
        }
    }
    for title in schema.row_titles.iter().flatten() {
        if !has_column(title) {
            issues.warning(
                format!("rowTitles references unknown column '{title}'"),
                table_location(table),
            );
        }
    }
    for fk in schema.foreign_keys.iter().flatten() {
        for name in &fk.column_reference {
            if !has_column(name) {
                issues.error(
                    format!("Foreign key references unknown column '{name}'"),
                    table_location(table),
                )?;
            }
        }
        let referenced = resolve_reference_table(wrapper, fk.reference.resource.as_deref(), fk.reference.schema_reference.as_deref());
        let Some(target) = referenced else {
            issues.error(
                format!(
                    "Foreign key references a table that is not described: {}",
                    fk.reference
                        .resource
                        .as_deref()
                        .or(fk.reference.schema_reference.as_deref())
                        .unwrap_or_default()
                ),
                table_location(table),
            )?;
            continue;
        };
        let target_columns: &[Column] = wrapper
            .schema_of(target)
            .map(|s| s.columns())
            .unwrap_or_default();
        for name in &fk.reference.column_reference {
            if !target_columns.iter().any(|c| c.name.as_deref() == Some(name.as_str())) {
                issues.error(
                    format!("Foreign key references unknown column '{name}' of {}", target.url),
                    table_location(table),
                )?;
            }
        }
        if fk.reference.column_reference.len() != fk.column_reference.len() {
            issues.error(
                "Foreign key column lists have different lengths",
                table_location(table),
            )?;
        }
    }
    Ok(())
}

/// Finds the table a foreign key points to, by `resource` url or by `schemaReference`.
pub fn resolve_reference_table<'a>(
    wrapper: &'a DescriptorWrapper,
    resource: Option<&str>,
    schema_reference: Option<&str>,
) -> Option<&'a Table> {
    let tables = wrapper.tables();
    if let Some(resource) = resource {
        return tables.into_iter().find(|t| t.url == resource);
    }
    let schema_reference = schema_reference?;
    tables.into_iter().find(|t| {
        wrapper
            .schema_of(t)
            .and_then(|s| s.id.as_deref())
            .is_some_and(|id| id == schema_reference)
    })
}

fn check_datatype(datatype: &Datatype, table: &Table, index: usize, issues: &IssueTracker) -> Result<()> {
    let loc = || column_location(table, index);
    let base = datatype.base_name();
    if let (Some(min), Some(max)) = (datatype.min_length, datatype.max_length) {
        if min > max {
            issues.error(format!("minLength {min} is greater than maxLength {max}"), loc())?;
        }
    }
    if let Some(length) = datatype.length {
        if datatype.min_length.is_some_and(|min| min > length)
            || datatype.max_length.is_some_and(|max| max < length)
        {
            issues.error("length conflicts with minLength or maxLength", loc())?;
        }
    }
    let lower = Datatype::bound(&datatype.minimum)
        .or_else(|| Datatype::bound(&datatype.min_inclusive))
        .or_else(|| Datatype::bound(&datatype.min_exclusive));
    let upper = Datatype::bound(&datatype.maximum)
        .or_else(|| Datatype::bound(&datatype.max_inclusive))
        .or_else(|| Datatype::bound(&datatype.max_exclusive));
    if let (Some(lower), Some(upper)) = (lower, upper) {
        if formats::compare_values(base, &lower, &upper) == Some(Ordering::Greater) {
            issues.error(format!("Lower bound {lower} exceeds upper bound {upper}"), loc())?;
        }
    }
    if let Some(spec) = datatype.format_spec() {
        if let (ValueShape::Other, Some(pattern)) = (formats::shape_of(base), &spec.pattern) {
            if let Err(e) = Regex::new(pattern) {
                issues.warning(format!("Invalid format regex '{pattern}': {e}"), loc());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionOptions;
    use crate::descriptor::normalize;
    use crate::io::{Fetcher, MemoryResolver};
    use serde_json::json;
    use std::sync::Arc;

    fn run(descriptor: serde_json::Value) -> IssueTracker {
        let fetcher = Fetcher::new(
            Arc::new(MemoryResolver::new()),
            Arc::new(ConversionOptions::default()),
        );
        let issues = IssueTracker::collecting();
        let wrapper = normalize(descriptor, &fetcher, &issues, Some("http://ex.org/m.json")).unwrap();
        check_descriptor(&wrapper, &issues).unwrap();
        issues
    }

    #[test]
    fn test_duplicate_names_and_virtual_order() {
        let issues = run(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "t.csv",
            "tableSchema": {"columns": [
                {"name": "a"},
                {"name": "v", "virtual": true},
                {"name": "a"}
            ]}
        }));
        assert_eq!(issues.get_errors().len(), 2);
    }

    #[test]
    fn test_foreign_key_targets() {
        let issues = run(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "tables": [
                {"url": "a.csv", "tableSchema": {
                    "columns": [{"name": "id"}, {"name": "ref"}],
                    "primaryKey": "id",
                    "foreignKeys": [{"columnReference": "ref", "reference": {"resource": "b.csv", "columnReference": "id"}}]
                }},
                {"url": "b.csv", "tableSchema": {"columns": [{"name": "id"}]}}
            ]
        }));
        assert!(issues.get_errors().is_empty(), "{:?}", issues.get_errors());

        let issues = run(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "tables": [
                {"url": "a.csv", "tableSchema": {
                    "columns": [{"name": "ref"}],
                    "foreignKeys": [{"columnReference": "ref", "reference": {"resource": "missing.csv", "columnReference": "id"}}]
                }}
            ]
        }));
        assert_eq!(issues.get_errors().len(), 1);
    }

    #[test]
    fn test_length_bounds() {
        let issues = run(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "t.csv",
            "tableSchema": {"columns": [
                {"name": "a", "datatype": {"base": "string", "minLength": 5, "maxLength": 2}},
                {"name": "b", "datatype": {"base": "integer", "minimum": 10, "maximum": 1}}
            ]}
        }));
        assert_eq!(issues.get_errors().len(), 2);
    }
}
