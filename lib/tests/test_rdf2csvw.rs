use csvw_rdf::api::{rdf_to_csvw, write_tables};
use csvw_rdf::config::ConversionOptions;
use csvw_rdf::csv2rdf::Csv2RdfConvertor;
use csvw_rdf::io::{MemoryResolver, Resolver};
use csvw_rdf::rdf2csvw::{CsvwRow, Rdf2CsvwConvertor};
use csvw_rdf::util::write_quads;
use oxigraph::io::RdfFormat;
use serde_json::json;
use std::sync::Arc;

const PEOPLE: &str = r#"
@prefix ex: <http://ex.org/> .
ex:p1 a ex:Person ; ex:name "Alice" .
ex:p2 a ex:Person ; ex:name "Bob" .
"#;

fn sorted_cells(rows: &[CsvwRow]) -> Vec<Vec<String>> {
    let mut cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| r.cells().into_iter().map(str::to_string).collect())
        .collect();
    cells.sort();
    cells
}

#[test]
fn test_person_table_is_inferred() {
    let resolver: Arc<dyn Resolver> =
        Arc::new(MemoryResolver::new().with_document("http://ex.org/people.ttl", PEOPLE));
    let rows: Vec<CsvwRow> = rdf_to_csvw(
        "http://ex.org/people.ttl",
        None,
        ConversionOptions::default(),
        Some(resolver),
    )
    .unwrap()
    .collect::<anyhow::Result<_>>()
    .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].table.name, "Person.csv");
    assert_eq!(rows[0].table.columns, vec!["subject_id", "name"]);
    assert_eq!(
        sorted_cells(&rows),
        vec![vec!["p1", "Alice"], vec!["p2", "Bob"]]
    );
}

#[test]
fn test_round_trip_through_rdf() {
    let descriptor = json!({
        "@context": "http://www.w3.org/ns/csvw",
        "url": "people.csv",
        "aboutUrl": "http://ex.org/person/{id}",
        "tableSchema": {"columns": [
            {"name": "id", "titles": "id", "suppressOutput": true},
            {"name": "name", "titles": "name", "propertyUrl": "http://ex.org/name"},
            {"virtual": true, "propertyUrl": "rdf:type", "valueUrl": "http://ex.org/Person"}
        ]}
    });
    let resolver = Arc::new(
        MemoryResolver::new().with_document("http://ex.org/people.csv", "id,name\n1,Alice\n2,Bob\n"),
    );
    let options = ConversionOptions {
        minimal: true,
        ..ConversionOptions::default()
    };
    let to_rdf = Csv2RdfConvertor::new(options.clone(), resolver.clone());
    let mut ntriples = vec![];
    write_quads(
        to_rdf
            .convert(descriptor, Some("http://ex.org/metadata.json"))
            .unwrap(),
        RdfFormat::NTriples,
        &mut ntriples,
    )
    .unwrap();
    resolver.add_document("http://ex.org/people.nt", ntriples);

    let rows: Vec<CsvwRow> = Rdf2CsvwConvertor::new(options, resolver)
        .convert_url("http://ex.org/people.nt", None)
        .unwrap()
        .collect::<anyhow::Result<_>>()
        .unwrap();
    assert_eq!(sorted_cells(&rows), vec![vec!["1", "Alice"], vec!["2", "Bob"]]);
}

#[test]
fn test_supplied_descriptor_drives_the_output() {
    let descriptor = json!({
        "@context": "http://www.w3.org/ns/csvw",
        "url": "http://ex.org/names.csv",
        "aboutUrl": "http://ex.org/{id}",
        "tableSchema": {"columns": [
            {"name": "id", "suppressOutput": true},
            {"name": "label", "propertyUrl": "http://ex.org/name"}
        ]}
    });
    let resolver = Arc::new(MemoryResolver::new().with_document("http://ex.org/people.ttl", PEOPLE));
    let rows: Vec<CsvwRow> = Rdf2CsvwConvertor::new(ConversionOptions::default(), resolver)
        .convert_url("http://ex.org/people.ttl", Some(descriptor.into()))
        .unwrap()
        .collect::<anyhow::Result<_>>()
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].table.columns, vec!["id", "label"]);
    assert_eq!(sorted_cells(&rows), vec![vec!["p1", "Alice"], vec!["p2", "Bob"]]);
}

#[test]
fn test_write_tables() {
    let resolver: Arc<dyn Resolver> =
        Arc::new(MemoryResolver::new().with_document("http://ex.org/people.ttl", PEOPLE));
    let rows = rdf_to_csvw(
        "http://ex.org/people.ttl",
        None,
        ConversionOptions::default(),
        Some(resolver),
    )
    .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let written = write_tables(rows, dir.path()).unwrap();
    assert_eq!(written.rows, 2);
    let person = written.tables.get("Person.csv").unwrap();
    let content = std::fs::read_to_string(person).unwrap();
    let mut lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.remove(0), "subject_id,name");
    lines.sort();
    assert_eq!(lines, vec!["p1,Alice", "p2,Bob"]);

    let metadata = written.metadata.unwrap();
    let descriptor: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(metadata).unwrap()).unwrap();
    assert!(descriptor.get("tables").is_some());
}
