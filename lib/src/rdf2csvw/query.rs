//! Builds the SPARQL query that reads the rows of one CSVW table back out of a store.
//!
//! Every distinct IRI template gets one variable, so a column whose `valueUrl` equals another
//! column's `aboutUrl` joins onto that column's subject. Patterns are nested from the columns
//! whose subject is not the object of another column, and each column sits in an
//! `OPTIONAL` block unless it is required or pins a constant object (such as `rdf:type`).

use crate::consts::{expand_prefixed, XSD_NS};
use crate::csv2rdf::decoded_name;
use crate::csv2rdf::reader::DialectSettings;
use crate::csv2rdf::table::{ColumnContext, TableContext};
use crate::descriptor::{DescriptorWrapper, Table};
use crate::formats::{shape_of, ValueShape};
use crate::issues::IssueTracker;
use crate::template::{TemplateValue, UriTemplate};
use crate::util::{is_absolute_url, resolve_url, strip_query_fragment};
use oxigraph::model::NamedNode;
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

lazy_static! {
    static ref EXPRESSION: Regex = Regex::new(r"\{[^}]*\}").unwrap();
}

/// Variable bound to the named graph of a solution.
pub const GRAPH_VAR: &str = "_g";

#[derive(Debug, Clone)]
pub enum Node {
    Var(String),
    Iri(String),
}

impl Node {
    /// An IRI constant, rejected unless it parses as an absolute IRI.
    fn iri(iri: impl Into<String>) -> Result<Self> {
        let iri = iri.into();
        let node = NamedNode::new(iri.as_str()).with_context(|| format!("Cannot query for IRI <{iri}>"))?;
        Ok(Node::Iri(node.into_string()))
    }

    fn render(&self) -> String {
        match self {
            Node::Var(v) => format!("?{v}"),
            Node::Iri(i) => format!("<{i}>"),
        }
    }

    pub fn var(&self) -> Option<&str> {
        match self {
            Node::Var(v) => Some(v),
            Node::Iri(_) => None,
        }
    }
}

/// A column with the variables that carry its subject and value.
#[derive(Debug, Clone)]
pub struct QueryColumn {
    pub context: ColumnContext,
    pub about_var: String,
    /// `None` when the column produces no triple.
    pub value: Option<Node>,
    pub property: Option<Node>,
    /// `aboutUrl` resolved against the table URL.
    pub about_template: Option<UriTemplate>,
    /// `valueUrl` resolved against the table URL, unless it is a constant.
    pub value_template: Option<UriTemplate>,
}

impl QueryColumn {
    pub fn name(&self) -> &str {
        &self.context.name
    }

    fn pins_constant(&self) -> bool {
        matches!(self.value, Some(Node::Iri(_)))
    }

    fn is_optional(&self) -> bool {
        !(self.context.required || self.pins_constant())
    }

    fn value_var(&self) -> Option<&str> {
        self.value.as_ref().and_then(Node::var)
    }
}

#[derive(Debug, Clone)]
pub struct TableQuery {
    /// Table URL without query or fragment.
    pub name: String,
    pub columns: Vec<QueryColumn>,
    pub sparql: String,
}

impl TableQuery {
    /// Names of the columns that appear in the CSV output.
    pub fn output_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.context.is_virtual)
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Variable holding the subject a row describes.
    pub fn subject_var(&self) -> Option<&str> {
        self.columns.first().map(|c| c.about_var.as_str())
    }
}

/// Resolves a template against `base` the way expanded IRIs are resolved, leaving its
/// expressions untouched.
pub fn resolve_template(template: &UriTemplate, base: &str) -> Option<UriTemplate> {
    let source = template.as_str();
    let expanded = expand_prefixed(source).unwrap_or_else(|| source.to_string());
    if is_absolute_url(&expanded) {
        return UriTemplate::parse(&expanded).ok();
    }
    let expressions: Vec<String> = EXPRESSION
        .find_iter(&expanded)
        .map(|m| m.as_str().to_string())
        .collect();
    let mut masked = expanded.clone();
    for (i, expr) in expressions.iter().enumerate() {
        masked = masked.replacen(expr.as_str(), &format!("tplexpr{i}x"), 1);
    }
    let mut resolved = resolve_url(&masked, Some(base));
    for (i, expr) in expressions.iter().enumerate() {
        resolved = resolved.replacen(&format!("tplexpr{i}x"), expr, 1);
    }
    UriTemplate::parse(&resolved).ok()
}

fn sparql_string(value: &str) -> String {
    let mut out = String::from("\"");
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

struct VarAllocator {
    nodes: HashMap<String, String>,
    count: usize,
}

impl VarAllocator {
    fn node(&mut self, key: &str) -> String {
        if let Some(v) = self.nodes.get(key) {
            return v.clone();
        }
        let v = format!("n{}", self.nodes.len());
        self.nodes.insert(key.to_string(), v.clone());
        v
    }

    fn fresh(&mut self, prefix: &str) -> String {
        self.count += 1;
        format!("{prefix}{}", self.count)
    }
}

/// Builds the query for `table`. Returns `None` when the table declares no columns.
pub fn create_query(wrapper: &DescriptorWrapper, table: &Table) -> Result<Option<TableQuery>> {
    let issues = IssueTracker::collecting();
    let context = TableContext::build(wrapper, table, DialectSettings::default(), &[], None, &issues)?;
    if context.columns.is_empty() {
        return Ok(None);
    }
    let base = context.url.clone();
    let mut vars = VarAllocator {
        nodes: HashMap::new(),
        count: 0,
    };
    let mut columns = vec![];
    for column in &context.columns {
        let about_template = column
            .about_url
            .as_ref()
            .and_then(|t| resolve_template(t, &base));
        let about_var = match &about_template {
            Some(t) => vars.node(t.as_str()),
            None => vars.node(""),
        };
        let (property, value, value_template) = if column.suppress {
            (None, None, None)
        } else {
            let property = match &column.property_url {
                Some(t) => property_node(t, column, &base, &mut vars)?,
                None => Node::iri(format!("{base}#{}", column.name))?,
            };
            let resolved = column
                .value_url
                .as_ref()
                .and_then(|t| resolve_template(t, &base));
            match resolved {
                Some(t) if t.is_literal() => (Some(property), Some(Node::iri(t.as_str())?), None),
                Some(t) => (Some(property), Some(Node::Var(vars.node(t.as_str()))), Some(t)),
                None => (Some(property), Some(Node::Var(vars.fresh("v"))), None),
            }
        };
        columns.push(QueryColumn {
            context: column.clone(),
            about_var,
            value,
            property,
            about_template,
            value_template,
        });
    }
    let body = build_body(&columns);
    let sparql = format!(
        "PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>\n\
         PREFIX xsd: <{XSD_NS}>\n\
         SELECT DISTINCT * WHERE {{\n{{\n{body}}}\nUNION\n{{ GRAPH ?{GRAPH_VAR} {{\n{body}}} }}\n}}\n"
    );
    Ok(Some(TableQuery {
        name: strip_query_fragment(&table.url).to_string(),
        columns,
        sparql,
    }))
}

fn property_node(
    template: &UriTemplate,
    column: &ColumnContext,
    base: &str,
    vars: &mut VarAllocator,
) -> Result<Node> {
    let known = ["_name", "_column", "_sourceColumn"];
    if template.variables().iter().any(|v| !known.contains(v)) {
        return Ok(Node::Var(vars.fresh("p")));
    }
    let mut values = HashMap::new();
    values.insert("_name".to_string(), TemplateValue::from(decoded_name(&column.name)));
    values.insert("_column".to_string(), TemplateValue::from((column.index + 1).to_string()));
    if let Some(source) = column.source_column {
        values.insert("_sourceColumn".to_string(), TemplateValue::from(source.to_string()));
    }
    let expanded = template.expand(&values);
    let expanded = expand_prefixed(&expanded).unwrap_or(expanded);
    Node::iri(resolve_url(&expanded, Some(base)))
}

fn value_filters(column: &QueryColumn) -> Vec<String> {
    let Some(var) = column.value_var() else {
        return vec![];
    };
    if let Some(template) = &column.value_template {
        let mut filters = vec![format!("isIRI(?{var})")];
        let prefix = template.literal_prefix();
        if !prefix.is_empty() {
            filters.push(format!("STRSTARTS(STR(?{var}), {})", sparql_string(prefix)));
        }
        return filters;
    }
    let ctx = &column.context;
    if ctx.separator.is_some() && ctx.ordered {
        // rdf:List heads are read separately
        return vec![];
    }
    let base = ctx.base();
    let datatype_is = |iri: String| format!("DATATYPE(?{var}) = <{iri}>");
    match shape_of(base) {
        ValueShape::Numeric => vec![format!("isNumeric(?{var})")],
        ValueShape::Boolean | ValueShape::DateTime | ValueShape::Duration => {
            vec![datatype_is(ctx.datatype.iri())]
        }
        ValueShape::Other if ctx.datatype.id.is_none() && base == "string" => {
            let mut filters = vec![format!("isLiteral(?{var})")];
            if let Some(lang) = ctx.lang.as_deref().filter(|l| *l != "und") {
                filters.push(format!("LANGMATCHES(LANG(?{var}), {})", sparql_string(lang)));
            }
            if let Some(pattern) = ctx.format.as_ref().and_then(|f| f.pattern.as_deref()) {
                filters.push(format!(
                    "REGEX(STR(?{var}), {})",
                    sparql_string(&format!("^(?:{pattern})$"))
                ));
            }
            filters
        }
        ValueShape::Other => vec![datatype_is(ctx.datatype.iri())],
    }
}

fn about_filters(column: &QueryColumn) -> Vec<String> {
    match &column.about_template {
        Some(t) if !t.literal_prefix().is_empty() => vec![
            format!("isIRI(?{})", column.about_var),
            format!(
                "STRSTARTS(STR(?{}), {})",
                column.about_var,
                sparql_string(t.literal_prefix())
            ),
        ],
        _ => vec![],
    }
}

fn triple(column: &QueryColumn) -> Option<String> {
    let property = column.property.as_ref()?;
    let value = column.value.as_ref()?;
    Some(format!("?{} {} {} .", column.about_var, property.render(), value.render()))
}

struct BodyBuilder<'a> {
    columns: &'a [QueryColumn],
    visited: HashSet<usize>,
}

impl BodyBuilder<'_> {
    fn children(&self, idx: usize) -> Vec<usize> {
        let Some(var) = self.columns[idx].value_var() else {
            return vec![];
        };
        (0..self.columns.len())
            .filter(|&i| i != idx && self.columns[i].about_var == var)
            .collect()
    }

    fn block(&mut self, idx: usize, top_level: bool, out: &mut String) {
        self.visited.insert(idx);
        let column = &self.columns[idx];
        let Some(pattern) = triple(column) else {
            return;
        };
        let mut filters = value_filters(column);
        if top_level {
            filters.extend(about_filters(column));
        }
        let optional = column.is_optional();
        if optional {
            out.push_str("OPTIONAL {\n");
        }
        let _ = writeln!(out, "{pattern}");
        for filter in filters {
            let _ = writeln!(out, "FILTER({filter})");
        }
        for child in self.children(idx) {
            if !self.visited.contains(&child) {
                self.block(child, false, out);
            }
        }
        if optional {
            out.push_str("}\n");
        }
    }
}

fn build_body(columns: &[QueryColumn]) -> String {
    let value_vars: HashSet<&str> = columns.iter().filter_map(QueryColumn::value_var).collect();
    let mut roots: Vec<usize> = (0..columns.len())
        .filter(|&i| triple(&columns[i]).is_some())
        .filter(|&i| {
            let about = columns[i].about_var.as_str();
            !value_vars.contains(about) || columns[i].value_var() == Some(about)
        })
        .collect();
    if roots.is_empty() {
        roots = (0..columns.len()).filter(|&i| triple(&columns[i]).is_some()).take(1).collect();
    }

    let mut out = String::new();
    // subjects whose every root column is optional are bound by a union of their patterns
    let mut subjects: Vec<&str> = vec![];
    for &i in &roots {
        let about = columns[i].about_var.as_str();
        if !subjects.contains(&about) {
            subjects.push(about);
        }
    }
    for subject in subjects {
        let of_subject: Vec<usize> = roots
            .iter()
            .copied()
            .filter(|&i| columns[i].about_var == subject)
            .collect();
        if of_subject.iter().any(|&i| !columns[i].is_optional()) {
            continue;
        }
        let branches: Vec<String> = of_subject
            .iter()
            .filter_map(|&i| {
                let column = &columns[i];
                let property = column.property.as_ref()?.render();
                let mut branch = format!("?{subject} {property} [] .");
                for filter in about_filters(column) {
                    let _ = write!(branch, " FILTER({filter})");
                }
                Some(format!("{{ {branch} }}"))
            })
            .collect();
        let _ = writeln!(
            out,
            "{{ SELECT DISTINCT ?{subject} WHERE {{ {} }} }}",
            branches.join(" UNION ")
        );
    }

    let mut builder = BodyBuilder {
        columns,
        visited: HashSet::new(),
    };
    for &root in &roots {
        builder.block(root, true, &mut out);
    }
    // columns only reachable through a cycle
    for i in 0..columns.len() {
        if !builder.visited.contains(&i) && triple(&columns[i]).is_some() {
            builder.block(i, true, &mut out);
        }
    }
    out
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
    fn test_resolve_template() {
        let t = UriTemplate::parse("#{id}").unwrap();
        assert_eq!(
            resolve_template(&t, "http://ex.org/t.csv").unwrap().as_str(),
            "http://ex.org/t.csv#{id}"
        );
        let t = UriTemplate::parse("people/{id}").unwrap();
        assert_eq!(
            resolve_template(&t, "http://ex.org/t.csv").unwrap().as_str(),
            "http://ex.org/people/{id}"
        );
    }

    #[test]
    fn test_shared_subject_and_types() {
        let w = wrapper(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "people.csv",
            "aboutUrl": "http://ex.org/person/{id}",
            "tableSchema": {"columns": [
                {"name": "id", "suppressOutput": true},
                {"name": "name", "propertyUrl": "http://ex.org/name", "required": true},
                {"name": "age", "propertyUrl": "http://ex.org/age", "datatype": "integer"},
                {"name": "type", "virtual": true, "propertyUrl": "rdf:type", "valueUrl": "http://ex.org/Person"}
            ]}
        }));
        let query = create_query(&w, w.tables()[0]).unwrap().unwrap();
        assert_eq!(query.name, "http://ex.org/people.csv");
        assert_eq!(query.output_columns(), vec!["id", "name", "age"]);
        let subject = &query.columns[1].about_var;
        assert!(query.columns.iter().all(|c| &c.about_var == subject));
        assert!(query.columns[0].value.is_none());
        assert!(query.sparql.contains(&format!("?{subject} <http://ex.org/name> ?v")));
        assert!(query.sparql.contains("<http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://ex.org/Person>"));
        assert!(query.sparql.contains("OPTIONAL"));
        assert!(query.sparql.contains("isNumeric"));
        assert!(query.sparql.contains("STRSTARTS"));
        assert!(query.sparql.contains("GRAPH ?_g"));
        assert!(!query.sparql.contains("SELECT DISTINCT ?"));
    }

    #[test]
    fn test_all_optional_uses_union() {
        let w = wrapper(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "t.csv",
            "tableSchema": {"columns": [{"name": "a"}, {"name": "b"}]}
        }));
        let query = create_query(&w, w.tables()[0]).unwrap().unwrap();
        assert!(query.sparql.contains("SELECT DISTINCT ?n0"));
        assert!(query.sparql.contains("<http://ex.org/t.csv#a>"));
        assert!(query.sparql.contains(" UNION "));
    }

    #[test]
    fn test_constant_iris_must_parse() {
        let w = wrapper(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "t.csv",
            "aboutUrl": "http://ex.org/{id}",
            "tableSchema": {"columns": [
                {"name": "id", "suppressOutput": true},
                {"name": "kind", "propertyUrl": "rdf:type", "valueUrl": "http://ex.org/A> . ?s ?p ?o"}
            ]}
        }));
        let err = create_query(&w, w.tables()[0]).unwrap_err();
        assert!(err.to_string().contains("Cannot query for IRI"));
        assert!(Node::iri("http://ex.org/A").is_ok());
        assert!(Node::iri("not an iri").is_err());
    }

    #[test]
    fn test_references_are_nested() {
        let w = wrapper(json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "t.csv",
            "tableSchema": {"columns": [
                {"name": "id", "aboutUrl": "http://ex.org/{id}", "propertyUrl": "http://ex.org/knows",
                 "valueUrl": "http://ex.org/{friend}", "required": true},
                {"name": "friend", "aboutUrl": "http://ex.org/{friend}", "propertyUrl": "http://ex.org/label"}
            ]}
        }));
        let query = create_query(&w, w.tables()[0]).unwrap().unwrap();
        assert_eq!(
            query.columns[0].value.as_ref().and_then(Node::var),
            Some(query.columns[1].about_var.as_str())
        );
        let knows = query.sparql.find("<http://ex.org/knows>").unwrap();
        let label = query.sparql.find("<http://ex.org/label>").unwrap();
        assert!(knows < label);
    }

    #[test]
    fn test_no_columns() {
        let w = wrapper(json!({"@context": "http://www.w3.org/ns/csvw", "url": "t.csv"}));
        assert!(create_query(&w, w.tables()[0]).unwrap().is_none());
    }
}
