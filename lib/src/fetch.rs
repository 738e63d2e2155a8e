//! Facilities for retrieving remote CSV files, CSVW descriptors and RDF documents over HTTP.
//!
//! The helpers implement weighted content negotiation, inspect HTTP `Link` headers for
//! `describedby` metadata, and fall back to light-weight content sniffing when a server does
//! not advertise a usable media type.

use crate::errors::RetrievalError;
use anyhow::{anyhow, Result};
use oxigraph::io::RdfFormat;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE, LINK};
use reqwest::Url;
use std::path::Path;
use std::time::Duration;

/// Options that control how remote resources are fetched.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Overall network timeout applied to individual HTTP requests.
    pub timeout: Duration,
    /// Ordered list of media types to negotiate, highest priority first.
    pub accept_order: Vec<&'static str>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            accept_order: vec![],
        }
    }
}

impl FetchOptions {
    pub fn for_csv() -> Self {
        Self {
            accept_order: vec!["text/csv", "text/tab-separated-values", "text/plain"],
            ..Self::default()
        }
    }

    pub fn for_jsonld() -> Self {
        Self {
            accept_order: vec![
                "application/csvm+json",
                "application/ld+json",
                "application/json",
            ],
            ..Self::default()
        }
    }

    pub fn for_rdf() -> Self {
        Self {
            accept_order: vec![
                "text/turtle",
                "application/n-quads",
                "application/n-triples",
                "application/trig",
                "application/rdf+xml",
                "application/ld+json",
                "text/n3",
            ],
            ..Self::default()
        }
    }
}

/// Successful network fetch including bytes and response metadata.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub bytes: Vec<u8>,
    pub final_url: String,
    pub content_type: Option<String>,
    pub link: Option<String>,
}

/// Builds a weighted `Accept` header string honoring the provided priority order.
fn build_accept(accept_order: &[&'static str]) -> String {
    if accept_order.is_empty() {
        return "*/*".to_string();
    }
    let mut parts = Vec::new();
    let mut q = 1.0f32;
    for t in accept_order {
        parts.push(format!("{t}; q={:.2}", q));
        q = (q - 0.1f32).max(0.1f32);
    }
    parts.push("*/*; q=0.05".to_string());
    parts.join(", ")
}

/// Extracts the targets of `Link` header entries with the given relation, together with their
/// advertised media type.
pub fn parse_link_header(link_str: &str, rel: &str) -> Vec<(String, Option<String>)> {
    let mut out = Vec::new();
    for part in link_str.split(',') {
        let part = part.trim();
        let part_lower = part.to_ascii_lowercase();
        let rel_double = format!("rel=\"{rel}\"");
        let rel_single = format!("rel='{rel}'");
        let rel_bare = format!("rel={rel}");
        if !part_lower.contains(&rel_double)
            && !part_lower.contains(&rel_single)
            && !part_lower.split(';').any(|p| p.trim() == rel_bare)
        {
            continue;
        }
        let media_type = part.split(';').find_map(|param| {
            let (key, value) = param.trim().split_once('=')?;
            if key.trim().eq_ignore_ascii_case("type") {
                Some(value.trim().trim_matches(['"', '\'']).to_string())
            } else {
                None
            }
        });
        if let Some(start) = part.find('<') {
            if let Some(end) = part[start + 1..].find('>') {
                let url = &part[start + 1..start + 1 + end];
                out.push((url.to_string(), media_type));
            }
        }
    }
    out
}

pub fn resolve_relative(base: &str, candidate: &str) -> String {
    if candidate.starts_with("http://") || candidate.starts_with("https://") {
        return candidate.to_string();
    }
    match Url::parse(base) {
        Ok(base_url) => base_url
            .join(candidate)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| candidate.to_string()),
        Err(_) => candidate.to_string(),
    }
}

/// Fetches `url` with a weighted `Accept` header. Non-success statuses are errors.
pub fn fetch(url: &str, opts: &FetchOptions) -> Result<FetchResult> {
    let client = Client::builder().timeout(opts.timeout).build()?;
    let resp = client
        .get(url)
        .header(ACCEPT, build_accept(&opts.accept_order))
        .send()?;
    let status = resp.status();
    if !status.is_success() {
        return Err(anyhow!(RetrievalError {
            url: url.to_string(),
            reason: format!("HTTP status {status}"),
        }));
    }
    let final_url = resp.url().to_string();
    let headers: &HeaderMap = resp.headers();
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let link = headers
        .get(LINK)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = resp.bytes()?.to_vec();
    Ok(FetchResult {
        bytes,
        final_url,
        content_type,
        link,
    })
}

/// Issues a `HEAD` request and returns the metadata document the server links to the resource
/// with `rel="describedby"`, when present.
pub fn head_describedby(url: &str, opts: &FetchOptions) -> Result<Option<String>> {
    let client = Client::builder().timeout(opts.timeout).build()?;
    let resp = client
        .head(url)
        .header(ACCEPT, build_accept(&opts.accept_order))
        .send()?;
    if !resp.status().is_success() {
        return Ok(None);
    }
    let Some(link) = resp.headers().get(LINK).and_then(|h| h.to_str().ok()) else {
        return Ok(None);
    };
    let candidates = parse_link_header(link, "describedby");
    // prefer links that advertise a JSON flavoured media type
    let chosen = candidates
        .iter()
        .find(|(_, ty)| {
            ty.as_deref()
                .map(|t| t.contains("json"))
                .unwrap_or(false)
        })
        .or_else(|| candidates.first());
    Ok(chosen.map(|(target, _)| resolve_relative(url, target)))
}

/// Attempts to infer an RDF format from the URL path extension.
pub fn detect_format_from_url(url: &str) -> Option<RdfFormat> {
    let trimmed = url.split('#').next().unwrap_or(url);
    let path = trimmed.split('?').next().unwrap_or(trimmed);
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| match ext {
            "n3" => Some(RdfFormat::N3),
            "xml" | "owl" => Some(RdfFormat::RdfXml),
            other => RdfFormat::from_extension(other),
        })
}

/// Provides a last-resort guess at the RDF serialization by peeking at the payload.
pub fn sniff_format(bytes: &[u8]) -> Option<RdfFormat> {
    let sample_len = bytes.len().min(4096);
    let sample = String::from_utf8_lossy(&bytes[..sample_len]);
    let trimmed = sample.trim_start();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return RdfFormat::from_media_type("application/ld+json");
    }
    if trimmed.starts_with('<') && (sample.contains("<rdf:RDF") || sample.contains("xmlns:rdf")) {
        return Some(RdfFormat::RdfXml);
    }
    if sample.contains("@prefix") || sample.contains("@base") || sample.contains("PREFIX ") {
        return Some(RdfFormat::Turtle);
    }
    if sample.contains("GRAPH") && sample.contains('{') {
        return Some(RdfFormat::TriG);
    }
    if trimmed.starts_with('<') || trimmed.starts_with("_:") {
        return Some(RdfFormat::NQuads);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_link_header() {
        let header = r#"<meta.json>; rel="describedby"; type="application/csvm+json", <other.ttl>; rel="alternate""#;
        let links = parse_link_header(header, "describedby");
        assert_eq!(
            links,
            vec![(
                "meta.json".to_string(),
                Some("application/csvm+json".to_string())
            )]
        );
        assert!(parse_link_header(header, "license").is_empty());
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_relative("http://ex.org/dir/data.csv", "meta.json"),
            "http://ex.org/dir/meta.json"
        );
        assert_eq!(
            resolve_relative("http://ex.org/a", "https://other.org/b"),
            "https://other.org/b"
        );
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            detect_format_from_url("http://ex.org/a.ttl?x=1"),
            Some(RdfFormat::Turtle)
        );
        assert_eq!(detect_format_from_url("data.nt"), Some(RdfFormat::NTriples));
        assert_eq!(
            sniff_format(b"@prefix ex: <http://ex.org/> ."),
            Some(RdfFormat::Turtle)
        );
        assert_eq!(
            sniff_format(b"<http://a> <http://b> <http://c> ."),
            Some(RdfFormat::NQuads)
        );
    }

    #[test]
    fn test_build_accept() {
        let accept = build_accept(&["text/csv", "text/plain"]);
        assert!(accept.starts_with("text/csv; q=1.00, text/plain; q=0.90"));
        assert_eq!(build_accept(&[]), "*/*");
    }
}
