use csvw_rdf::config::ConversionOptions;
use csvw_rdf::csv2rdf::Csv2RdfConvertor;
use csvw_rdf::io::MemoryResolver;
use csvw_rdf::options::IssuePolicy;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

const PEOPLE_CSV: &str = "id,name\n1,Alice\n2,Bob\n";

fn people_descriptor() -> serde_json::Value {
    json!({
        "@context": "http://www.w3.org/ns/csvw",
        "url": "table.csv",
        "aboutUrl": "#{id}",
        "propertyUrl": "http://ex.org/{_name}"
    })
}

fn convert(options: ConversionOptions, csv: &str, descriptor: serde_json::Value) -> (Vec<String>, Csv2RdfConvertor) {
    let _ = env_logger::builder().is_test(true).try_init();
    let resolver = MemoryResolver::new().with_document("http://ex.org/table.csv", csv);
    let convertor = Csv2RdfConvertor::new(options, Arc::new(resolver));
    let triples = convertor
        .convert(descriptor, Some("http://ex.org/metadata.json"))
        .unwrap()
        .map(|q| q.unwrap().to_string())
        .collect();
    (triples, convertor)
}

#[test]
fn test_standard_mode_has_bookkeeping() {
    let (triples, _) = convert(ConversionOptions::default(), PEOPLE_CSV, people_descriptor());
    assert!(triples.contains(&"<http://ex.org/table.csv#1> <http://ex.org/name> \"Alice\"".to_string()));
    for kind in ["TableGroup", "Table", "Row"] {
        let expected = format!(
            "<http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/ns/csvw#{kind}>"
        );
        assert!(triples.iter().any(|t| t.ends_with(&expected)), "missing csvw:{kind}");
    }
}

#[test]
fn test_minimal_mode_only_has_data() {
    let options = ConversionOptions {
        minimal: true,
        ..ConversionOptions::default()
    };
    let (triples, _) = convert(options, PEOPLE_CSV, people_descriptor());
    assert!(triples.contains(&"<http://ex.org/table.csv#1> <http://ex.org/name> \"Alice\"".to_string()));
    assert!(triples.contains(&"<http://ex.org/table.csv#2> <http://ex.org/name> \"Bob\"".to_string()));
    assert_eq!(triples.len(), 4);
    assert!(triples.iter().all(|t| !t.contains("http://www.w3.org/ns/csvw#")));
}

#[test]
fn test_output_is_deterministic() {
    let first: HashSet<String> = convert(ConversionOptions::default(), PEOPLE_CSV, people_descriptor())
        .0
        .into_iter()
        .filter(|t| !t.starts_with("_:"))
        .collect();
    let second: HashSet<String> = convert(ConversionOptions::default(), PEOPLE_CSV, people_descriptor())
        .0
        .into_iter()
        .filter(|t| !t.starts_with("_:"))
        .collect();
    assert_eq!(first, second);
}

#[test]
fn test_null_values_emit_nothing() {
    let descriptor = json!({
        "@context": "http://www.w3.org/ns/csvw",
        "url": "table.csv",
        "aboutUrl": "#{id}",
        "tableSchema": {"columns": [
            {"name": "id", "titles": "id"},
            {"name": "name", "titles": "name", "propertyUrl": "http://ex.org/name", "null": "-", "required": true}
        ]}
    });
    let options = ConversionOptions {
        minimal: true,
        ..ConversionOptions::default()
    };
    let (triples, convertor) = convert(options, "id,name\n1,-\n2,Bob\n", descriptor);
    assert!(!triples.iter().any(|t| t.starts_with("<http://ex.org/table.csv#1> <http://ex.org/name>")));
    assert!(triples.contains(&"<http://ex.org/table.csv#2> <http://ex.org/name> \"Bob\"".to_string()));
    assert!(!convertor.issues().get_warnings().is_empty());
}

#[test]
fn test_invalid_values_keep_a_marked_literal() {
    let descriptor = json!({
        "@context": "http://www.w3.org/ns/csvw",
        "url": "table.csv",
        "aboutUrl": "#{id}",
        "tableSchema": {"columns": [
            {"name": "id", "titles": "id"},
            {"name": "age", "titles": "age", "propertyUrl": "http://ex.org/age", "datatype": "integer"}
        ]}
    });
    let options = ConversionOptions {
        minimal: true,
        ..ConversionOptions::default()
    };
    let (triples, convertor) = convert(options, "id,age\n1,old\n", descriptor);
    assert!(triples
        .iter()
        .any(|t| t.contains("\"@@invalid@@old\"^^<http://www.w3.org/2001/XMLSchema#integer>")));
    assert_eq!(convertor.issues().get_warnings().len(), 1);
}

#[test]
fn test_throwing_policy_aborts_on_structural_errors() {
    let descriptor = json!({
        "@context": "http://www.w3.org/ns/csvw",
        "url": "table.csv",
        "tableSchema": {"columns": [{"name": "a"}, {"name": "a"}]}
    });
    let options = ConversionOptions {
        issue_policy: IssuePolicy::Throw,
        ..ConversionOptions::default()
    };
    let resolver = MemoryResolver::new().with_document("http://ex.org/table.csv", "a,a\n1,2\n");
    let convertor = Csv2RdfConvertor::new(options, Arc::new(resolver));
    let failed = match convertor.convert(descriptor, Some("http://ex.org/metadata.json")) {
        Err(_) => true,
        Ok(stream) => stream.into_iter().any(|q| q.is_err()),
    };
    assert!(failed);
}

#[test]
fn test_located_metadata() {
    let resolver = MemoryResolver::new()
        .with_document("http://ex.org/data.csv", "id,name\n1,Alice\n")
        .with_document(
            "http://ex.org/data.csv-metadata.json",
            r#"{"@context": "http://www.w3.org/ns/csvw", "url": "data.csv", "aboutUrl": "people/{id}"}"#,
        );
    let options = ConversionOptions {
        minimal: true,
        ..ConversionOptions::default()
    };
    let convertor = Csv2RdfConvertor::new(options, Arc::new(resolver));
    let triples: Vec<String> = convertor
        .convert_csv("http://ex.org/data.csv")
        .unwrap()
        .map(|q| q.unwrap().to_string())
        .collect();
    assert!(triples.contains(&"<http://ex.org/people/1> <http://ex.org/data.csv#name> \"Alice\"".to_string()));
}
