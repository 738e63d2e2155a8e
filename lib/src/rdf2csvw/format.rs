//! Turns query solutions back into CSV cells.

use super::query::{QueryColumn, TableQuery};
use crate::consts::{FIRST, NIL, REST};
use crate::formats::format_value;
use anyhow::Result;
use oxigraph::model::{NamedOrBlankNode, NamedOrBlankNodeRef, Term};
use oxigraph::store::Store;
use std::collections::HashMap;

pub type Binding = HashMap<String, Term>;

fn term_text(term: &Term) -> String {
    match term {
        Term::NamedNode(n) => n.as_str().to_string(),
        Term::BlankNode(b) => format!("_:{}", b.as_str()),
        Term::Literal(l) => l.value().to_string(),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}

fn literal_text(column: &QueryColumn, term: &Term) -> String {
    match term {
        Term::Literal(l) => {
            let ctx = &column.context;
            format_value(ctx.base(), ctx.format.as_ref(), l.value())
        }
        other => term_text(other),
    }
}

/// Items of the `rdf:List` starting at `head`, or `None` when it is not a well-formed list.
fn read_list(store: &Store, head: &Term) -> Result<Option<Vec<Term>>> {
    let mut items = vec![];
    let mut node = head.clone();
    let mut seen = 0;
    loop {
        let subject: NamedOrBlankNodeRef<'_> = match &node {
            Term::NamedNode(n) if n.as_ref() == NIL => return Ok(Some(items)),
            Term::NamedNode(n) => n.as_ref().into(),
            Term::BlankNode(b) => b.as_ref().into(),
            _ => return Ok(None),
        };
        let first = store
            .quads_for_pattern(Some(subject), Some(FIRST), None, None)
            .next()
            .transpose()?;
        let rest = store
            .quads_for_pattern(Some(subject), Some(REST), None, None)
            .next()
            .transpose()?;
        let (Some(first), Some(rest)) = (first, rest) else {
            return Ok(None);
        };
        items.push(first.object);
        node = rest.object;
        seen += 1;
        if seen > store.len()? {
            return Ok(None);
        }
    }
}

/// Values recovered from the IRIs a solution binds, keyed by template variable name.
fn harvest(query: &TableQuery, binding: &Binding) -> HashMap<String, String> {
    let mut found = HashMap::new();
    for column in &query.columns {
        let value_var = column.value.as_ref().and_then(|v| v.var());
        let sources = [
            (column.about_template.as_ref(), Some(column.about_var.as_str())),
            (column.value_template.as_ref(), value_var),
        ];
        for (template, var) in sources {
            let (Some(template), Some(var)) = (template, var) else {
                continue;
            };
            let Some(Term::NamedNode(iri)) = binding.get(var) else {
                continue;
            };
            if let Some(values) = template.match_iri(iri.as_str()) {
                for (name, value) in values {
                    found.entry(name).or_insert(value);
                }
            }
        }
    }
    found
}

/// The cells of one output row, in [`TableQuery::output_columns`] order.
pub fn reconstruct_row(query: &TableQuery, binding: &Binding, store: &Store) -> Result<Vec<String>> {
    let harvested = harvest(query, binding);
    let mut cells = vec![];
    for column in query.columns.iter().filter(|c| !c.context.is_virtual) {
        let ctx = &column.context;
        let bound = column
            .value
            .as_ref()
            .and_then(|v| v.var())
            .and_then(|var| binding.get(var));
        let cell = match bound {
            Some(term) if column.value_template.is_none() => {
                let list = match (&ctx.separator, ctx.ordered) {
                    (Some(_), true) => read_list(store, term)?,
                    _ => None,
                };
                match (list, &ctx.separator) {
                    (Some(items), Some(separator)) => items
                        .iter()
                        .map(|item| literal_text(column, item))
                        .collect::<Vec<_>>()
                        .join(separator),
                    _ => literal_text(column, term),
                }
            }
            _ => match harvested.get(ctx.name.as_str()) {
                Some(value) => value.clone(),
                None => match bound {
                    Some(term) => term_text(term),
                    None => ctx.null.first().cloned().unwrap_or_default(),
                },
            },
        };
        cells.push(cell);
    }
    Ok(cells)
}

/// Merges rows that differ only in list-valued columns, joining those values with the
/// column separator.
pub fn merge_list_rows(query: &TableQuery, rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let separators: Vec<Option<&str>> = query
        .columns
        .iter()
        .filter(|c| !c.context.is_virtual)
        .map(|c| match (&c.context.separator, c.context.ordered) {
            (Some(s), false) => Some(s.as_str()),
            _ => None,
        })
        .collect();
    if separators.iter().all(Option::is_none) {
        return rows;
    }
    let mut merged: Vec<Vec<String>> = vec![];
    let mut items: Vec<Vec<Vec<String>>> = vec![];
    for row in rows {
        let position = merged.iter().position(|m| {
            m.iter()
                .zip(&row)
                .zip(&separators)
                .all(|((a, b), sep)| sep.is_some() || a == b)
        });
        let idx = match position {
            Some(idx) => idx,
            None => {
                merged.push(row.clone());
                items.push(vec![vec![]; row.len()]);
                merged.len() - 1
            }
        };
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_some() && !row[i].is_empty() && !items[idx][i].contains(&row[i]) {
                items[idx][i].push(row[i].clone());
            }
        }
    }
    for (row, values) in merged.iter_mut().zip(items) {
        for (i, sep) in separators.iter().enumerate() {
            if let Some(sep) = sep {
                row[i] = values[i].join(sep);
            }
        }
    }
    merged
}

/// Every term a solution binds, except the graph name.
pub fn bound_terms(binding: &Binding) -> impl Iterator<Item = &Term> {
    binding
        .iter()
        .filter(|(var, _)| var.as_str() != super::query::GRAPH_VAR)
        .map(|(_, term)| term)
}

/// Subject and object of a quad as terms.
pub fn quad_terms(quad: &oxigraph::model::Quad) -> [Term; 2] {
    let subject: Term = match &quad.subject {
        NamedOrBlankNode::NamedNode(n) => n.clone().into(),
        NamedOrBlankNode::BlankNode(b) => b.clone().into(),
        #[allow(unreachable_patterns)]
        _ => quad.object.clone(),
    };
    [subject, quad.object.clone()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionOptions;
    use crate::descriptor::normalize;
    use crate::io::{Fetcher, MemoryResolver};
    use crate::issues::IssueTracker;
    use crate::rdf2csvw::query::create_query;
    use oxigraph::model::{Literal, NamedNode};
    use serde_json::json;
    use std::sync::Arc;

    fn query(value: serde_json::Value) -> TableQuery {
        let fetcher = Fetcher::new(
            Arc::new(MemoryResolver::new()),
            Arc::new(ConversionOptions::default()),
        );
        let w = normalize(value, &fetcher, &IssueTracker::collecting(), Some("http://ex.org/m.json")).unwrap();
        create_query(&w, w.tables()[0]).unwrap().unwrap()
    }

    #[test]
    fn test_values_from_templates_and_literals() {
        let q = query(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "t.csv",
            "aboutUrl": "http://ex.org/person/{id}",
            "tableSchema": {"columns": [
                {"name": "id", "suppressOutput": true},
                {"name": "score", "propertyUrl": "http://ex.org/score", "datatype": {"base": "decimal", "format": {"decimalChar": ","}}},
                {"name": "city", "propertyUrl": "http://ex.org/city", "null": "-"}
            ]}
        }));
        let mut binding = Binding::new();
        binding.insert(
            q.columns[1].about_var.clone(),
            NamedNode::new("http://ex.org/person/7").unwrap().into(),
        );
        let score_var = q.columns[1].value.as_ref().unwrap().var().unwrap().to_string();
        binding.insert(
            score_var,
            Literal::new_typed_literal("1.5", NamedNode::new("http://www.w3.org/2001/XMLSchema#decimal").unwrap()).into(),
        );
        let store = Store::new().unwrap();
        let row = reconstruct_row(&q, &binding, &store).unwrap();
        assert_eq!(row, vec!["7", "1,5", "-"]);
    }

    #[test]
    fn test_merge_list_rows() {
        let q = query(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "t.csv",
            "tableSchema": {"columns": [{"name": "id"}, {"name": "tags", "separator": ";"}]}
        }));
        let rows = vec![
            vec!["1".to_string(), "a".to_string()],
            vec!["1".to_string(), "b".to_string()],
            vec!["2".to_string(), "c".to_string()],
        ];
        let merged = merge_list_rows(&q, rows);
        assert_eq!(merged, vec![vec!["1", "a;b"], vec!["2", "c"]]);
    }

    #[test]
    fn test_read_list() {
        let store = Store::new().unwrap();
        let data = r#"<http://ex.org/s> <http://ex.org/p> ( "a" "b" ) ."#;
        store
            .load_from_reader(oxigraph::io::RdfFormat::Turtle, data.as_bytes())
            .unwrap();
        let head = store
            .quads_for_pattern(None, Some(NamedNode::new("http://ex.org/p").unwrap().as_ref()), None, None)
            .next()
            .unwrap()
            .unwrap()
            .object;
        let items = read_list(&store, &head).unwrap().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(term_text(&items[1]), "b");
    }
}
