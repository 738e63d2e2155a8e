//! Defines the `Resolver` trait, the only I/O boundary the conversion engine depends on, and
//! its implementations: filesystem + HTTP (`DefaultResolver`) and a map of in-memory documents
//! (`MemoryResolver`) used for sandboxing and tests.

use crate::config::ConversionOptions;
use crate::errors::RetrievalError;
use crate::fetch::{self, FetchOptions};
use crate::util::{is_absolute_url, read_file, resolve_url};
use anyhow::{anyhow, Error, Result};
use log::debug;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use url::Url;

pub type ByteStream = Box<dyn Read + Send>;

pub trait Resolver: Send + Sync {
    /// Returns the text of a JSON-LD (CSVW descriptor) document.
    fn resolve_jsonld(&self, url: &str, base: &str) -> Result<String>;

    /// Opens a CSV file for streaming.
    fn resolve_csv_stream(&self, url: &str, base: &str) -> Result<ByteStream>;

    /// Opens an RDF document for streaming.
    fn resolve_rdf(&self, url: &str, base: &str) -> Result<ByteStream>;

    /// Returns the text of a `/.well-known/csvm` file.
    fn resolve_wkf(&self, url: &str, base: &str) -> Result<String>;

    /// Returns a metadata URL linked to the given CSV (e.g. through an HTTP `Link` header).
    fn resolve_linked_metadata(&self, _url: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Returns the type of the resolver (e.g., "default", "memory")
    fn resolver_type(&self) -> &'static str;
}

/// Resolves `file:` URLs and plain paths from the filesystem and `http(s):` URLs over HTTP.
#[derive(Debug, Default, Clone)]
pub struct DefaultResolver {
    pub fetch_options: FetchOptions,
}

enum Target {
    File(PathBuf),
    Http(String),
}

impl DefaultResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn target(&self, url: &str, base: &str) -> Result<Target> {
        let base = if base.is_empty() { None } else { Some(base) };
        let resolved = resolve_url(url, base);
        if resolved.starts_with("http://") || resolved.starts_with("https://") {
            return Ok(Target::Http(resolved));
        }
        if resolved.starts_with("file:") {
            let parsed = Url::parse(&resolved)?;
            let path = parsed
                .to_file_path()
                .map_err(|_| anyhow!("Invalid file URL: {resolved}"))?;
            return Ok(Target::File(path));
        }
        if is_absolute_url(&resolved) {
            return Err(anyhow!("Unsupported URL scheme: {resolved}"));
        }
        Ok(Target::File(PathBuf::from(resolved)))
    }

    fn bytes(&self, url: &str, base: &str, opts: FetchOptions) -> Result<Vec<u8>> {
        match self.target(url, base)? {
            Target::File(path) => read_file(&path).map_err(|e| {
                Error::new(RetrievalError {
                    url: path.display().to_string(),
                    reason: e.to_string(),
                })
            }),
            Target::Http(url) => {
                let opts = FetchOptions {
                    timeout: self.fetch_options.timeout,
                    ..opts
                };
                Ok(fetch::fetch(&url, &opts)?.bytes)
            }
        }
    }
}

impl Resolver for DefaultResolver {
    fn resolve_jsonld(&self, url: &str, base: &str) -> Result<String> {
        let bytes = self.bytes(url, base, FetchOptions::for_jsonld())?;
        Ok(String::from_utf8(bytes)?)
    }

    fn resolve_csv_stream(&self, url: &str, base: &str) -> Result<ByteStream> {
        match self.target(url, base)? {
            Target::File(path) => {
                let file = std::fs::File::open(&path).map_err(|e| {
                    Error::new(RetrievalError {
                        url: path.display().to_string(),
                        reason: e.to_string(),
                    })
                })?;
                Ok(Box::new(std::io::BufReader::new(file)))
            }
            Target::Http(url) => {
                let fetched = fetch::fetch(&url, &FetchOptions::for_csv())?;
                Ok(Box::new(Cursor::new(fetched.bytes)))
            }
        }
    }

    fn resolve_rdf(&self, url: &str, base: &str) -> Result<ByteStream> {
        let bytes = self.bytes(url, base, FetchOptions::for_rdf())?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn resolve_wkf(&self, url: &str, base: &str) -> Result<String> {
        let bytes = self.bytes(url, base, FetchOptions::default())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn resolve_linked_metadata(&self, url: &str) -> Result<Option<String>> {
        match self.target(url, "")? {
            Target::Http(url) => fetch::head_describedby(&url, &FetchOptions::for_jsonld()),
            Target::File(_) => Ok(None),
        }
    }

    fn resolver_type(&self) -> &'static str {
        "default"
    }
}

/// Serves documents registered under absolute URLs from memory.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    documents: RwLock<HashMap<String, Vec<u8>>>,
    links: RwLock<HashMap<String, String>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, url: &str, content: impl Into<Vec<u8>>) -> Self {
        self.add_document(url, content);
        self
    }

    pub fn add_document(&self, url: &str, content: impl Into<Vec<u8>>) {
        let mut docs = self.documents.write().unwrap_or_else(|e| e.into_inner());
        docs.insert(url.to_string(), content.into());
    }

    /// Registers `metadata_url` as the metadata linked to `csv_url`.
    pub fn add_link(&self, csv_url: &str, metadata_url: &str) {
        let mut links = self.links.write().unwrap_or_else(|e| e.into_inner());
        links.insert(csv_url.to_string(), metadata_url.to_string());
    }

    fn get(&self, url: &str, base: &str) -> Result<Vec<u8>> {
        let base = if base.is_empty() { None } else { Some(base) };
        let resolved = resolve_url(url, base);
        let docs = self.documents.read().unwrap_or_else(|e| e.into_inner());
        match docs.get(&resolved) {
            Some(content) => {
                debug!("Serving {} from memory", resolved);
                Ok(content.clone())
            }
            None => Err(Error::new(RetrievalError {
                url: resolved,
                reason: "not found".to_string(),
            })),
        }
    }
}

impl Resolver for MemoryResolver {
    fn resolve_jsonld(&self, url: &str, base: &str) -> Result<String> {
        Ok(String::from_utf8(self.get(url, base)?)?)
    }

    fn resolve_csv_stream(&self, url: &str, base: &str) -> Result<ByteStream> {
        Ok(Box::new(Cursor::new(self.get(url, base)?)))
    }

    fn resolve_rdf(&self, url: &str, base: &str) -> Result<ByteStream> {
        Ok(Box::new(Cursor::new(self.get(url, base)?)))
    }

    fn resolve_wkf(&self, url: &str, base: &str) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.get(url, base)?).into_owned())
    }

    fn resolve_linked_metadata(&self, url: &str) -> Result<Option<String>> {
        let links = self.links.read().unwrap_or_else(|e| e.into_inner());
        Ok(links.get(url).cloned())
    }

    fn resolver_type(&self) -> &'static str {
        "memory"
    }
}

/// Couples a resolver with the conversion options: URLs are resolved against their base and
/// rewritten by the path overrides before the resolver sees them.
#[derive(Clone)]
pub struct Fetcher {
    resolver: Arc<dyn Resolver>,
    options: Arc<ConversionOptions>,
}

impl Fetcher {
    pub fn new(resolver: Arc<dyn Resolver>, options: Arc<ConversionOptions>) -> Self {
        Self { resolver, options }
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    fn prepare(&self, url: &str, base: Option<&str>) -> (String, String) {
        let base = base.or(self.options.base_iri.as_deref());
        let absolute = resolve_url(url, base);
        let rewritten = self.options.rewrite_url(&absolute);
        if rewritten != absolute {
            debug!("Rewrote {} to {}", absolute, rewritten);
        }
        (rewritten, base.unwrap_or_default().to_string())
    }

    pub fn jsonld(&self, url: &str, base: Option<&str>) -> Result<String> {
        let (url, base) = self.prepare(url, base);
        self.resolver.resolve_jsonld(&url, &base)
    }

    pub fn csv_stream(&self, url: &str, base: Option<&str>) -> Result<ByteStream> {
        let (url, base) = self.prepare(url, base);
        self.resolver.resolve_csv_stream(&url, &base)
    }

    pub fn rdf(&self, url: &str, base: Option<&str>) -> Result<ByteStream> {
        let (url, base) = self.prepare(url, base);
        self.resolver.resolve_rdf(&url, &base)
    }

    pub fn wkf(&self, url: &str, base: Option<&str>) -> Result<String> {
        let (url, base) = self.prepare(url, base);
        self.resolver.resolve_wkf(&url, &base)
    }

    pub fn linked_metadata(&self, url: &str) -> Result<Option<String>> {
        let (url, _) = self.prepare(url, None);
        self.resolver.resolve_linked_metadata(&url)
    }
}
