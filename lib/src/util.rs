use anyhow::{anyhow, Result};
use log::{debug, info};
use oxigraph::io::{RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::Quad;
use std::io::{Read, Write};
use std::path::Path;
use url::Url;

/// Returns true for strings that parse as an absolute URL. Single-letter schemes are treated
/// as Windows drive letters, not URLs.
pub fn is_absolute_url(s: &str) -> bool {
    match Url::parse(s) {
        Ok(u) => u.scheme().len() > 1,
        Err(_) => false,
    }
}

/// Converts a filesystem path into a `file:` URL, making it absolute first.
pub fn path_to_url(path: &Path) -> Result<String> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&abs)
        .map(|u| u.to_string())
        .map_err(|_| anyhow!("Cannot convert {} to a file URL", abs.display()))
}

/// Accepts either a URL or a filesystem path and returns a URL.
pub fn location_to_url(location: &str) -> Result<String> {
    if is_absolute_url(location) {
        Ok(location.to_string())
    } else {
        path_to_url(Path::new(location))
    }
}

/// Resolves `url` against `base`. Relative references without a usable base are returned
/// unchanged.
pub fn resolve_url(url: &str, base: Option<&str>) -> String {
    if is_absolute_url(url) {
        return url.to_string();
    }
    match base.and_then(|b| Url::parse(b).ok()) {
        Some(base_url) => base_url
            .join(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string()),
        None => url.to_string(),
    }
}

/// Removes the query and fragment of a URL.
pub fn strip_query_fragment(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// True when `url` names a metadata document rather than a CSV file.
pub fn is_metadata_url(url: &str) -> bool {
    let path = strip_query_fragment(url);
    path.ends_with(".json") || path.ends_with(".jsonld")
}

/// Last path (or fragment) segment of an IRI, used as a human readable fallback label.
pub fn last_segment(iri: &str) -> &str {
    let trimmed = iri.trim_end_matches(['/', '#']);
    match trimmed.rfind(['/', '#', ':']) {
        Some(idx) if idx + 1 < trimmed.len() => &trimmed[idx + 1..],
        _ => trimmed,
    }
}

/// Namespace of an IRI: everything up to and including the last `#` or `/`.
pub fn namespace_of(iri: &str) -> &str {
    match iri.rfind(['#', '/']) {
        Some(idx) => &iri[..=idx],
        None => iri,
    }
}

pub fn read_file(file: &Path) -> Result<Vec<u8>> {
    debug!("Reading file: {}", file.display());
    let mut content = vec![];
    std::fs::File::open(file)?.read_to_end(&mut content)?;
    Ok(content)
}

/// Parses RDF from a reader into a quad iterator. Parse errors are yielded as items.
pub fn parse_rdf<R: Read + 'static>(
    reader: R,
    format: RdfFormat,
    base_iri: Option<&str>,
) -> Result<Box<dyn Iterator<Item = Result<Quad>>>> {
    let mut parser = RdfParser::from_format(format);
    if let Some(base) = base_iri {
        parser = parser.with_base_iri(base)?;
    }
    Ok(Box::new(
        parser
            .for_reader(reader)
            .map(|quad| quad.map_err(anyhow::Error::from)),
    ))
}

/// Serializes quads to `writer` in the given format.
pub fn write_quads<W, I>(quads: I, format: RdfFormat, writer: W) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = Result<Quad>>,
{
    let mut serializer = RdfSerializer::from_format(format).for_writer(writer);
    let mut count = 0;
    for quad in quads {
        serializer.serialize_quad(&quad?)?;
        count += 1;
    }
    serializer.finish()?;
    info!("Wrote {} quads", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::{GraphName, Literal, NamedNode};

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("b.csv", Some("http://ex.org/dir/a.json")),
            "http://ex.org/dir/b.csv"
        );
        assert_eq!(
            resolve_url("http://other.org/x", Some("http://ex.org/")),
            "http://other.org/x"
        );
        assert_eq!(resolve_url("b.csv", None), "b.csv");
    }

    #[test]
    fn test_segments() {
        assert_eq!(last_segment("http://ex.org/vocab#Person"), "Person");
        assert_eq!(last_segment("http://ex.org/people/"), "people");
        assert_eq!(namespace_of("http://ex.org/vocab#Person"), "http://ex.org/vocab#");
        assert_eq!(strip_query_fragment("http://ex.org/t.csv?x=1#row=2"), "http://ex.org/t.csv");
    }

    #[test]
    fn test_metadata_urls() {
        assert!(is_metadata_url("http://ex.org/csv-metadata.json"));
        assert!(is_metadata_url("file:///tmp/m.jsonld?x=1"));
        assert!(!is_metadata_url("http://ex.org/data.csv"));
    }

    #[test]
    fn test_is_absolute_url() {
        assert!(is_absolute_url("http://ex.org"));
        assert!(is_absolute_url("file:///tmp/a.csv"));
        assert!(!is_absolute_url("a.csv"));
        assert!(!is_absolute_url("C:\\data\\a.csv"));
    }

    #[test]
    fn test_write_and_parse_quads() {
        let quad = Quad::new(
            NamedNode::new("http://ex.org/s").unwrap(),
            NamedNode::new("http://ex.org/p").unwrap(),
            Literal::new_simple_literal("o"),
            GraphName::DefaultGraph,
        );
        let mut out = Vec::new();
        let count = write_quads(vec![Ok(quad.clone())], RdfFormat::NTriples, &mut out).unwrap();
        assert_eq!(count, 1);
        let parsed: Vec<Quad> = parse_rdf(std::io::Cursor::new(out), RdfFormat::NTriples, None)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(parsed, vec![quad]);
    }
}
