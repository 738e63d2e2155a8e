//! Finding the metadata that describes a CSV file: a linked metadata document, then the
//! locations listed by `/.well-known/csvm`, then a synthesized descriptor.

use crate::descriptor::jsonld::Context;
use crate::descriptor::{normalize, Descriptor, DescriptorWrapper, Table};
use crate::io::Fetcher;
use crate::issues::IssueTracker;
use crate::template::{TemplateValue, UriTemplate};
use crate::util::{resolve_url, strip_query_fragment};
use anyhow::Result;
use log::{debug, info};
use std::collections::HashMap;

/// Templates used when the server provides no `/.well-known/csvm`.
pub const DEFAULT_WELL_KNOWN: [&str; 2] = ["{+url}-metadata.json", "csv-metadata.json"];

pub struct MetadataLocator<'a> {
    fetcher: &'a Fetcher,
    issues: &'a IssueTracker,
}

impl<'a> MetadataLocator<'a> {
    pub fn new(fetcher: &'a Fetcher, issues: &'a IssueTracker) -> Self {
        Self { fetcher, issues }
    }

    /// Returns the descriptor for `csv_url` and the URL it was loaded from (the CSV URL itself
    /// for a synthesized descriptor).
    pub fn locate(&self, csv_url: &str) -> Result<(DescriptorWrapper, String)> {
        match self.fetcher.linked_metadata(csv_url) {
            Ok(Some(metadata_url)) => {
                let metadata_url = resolve_url(&metadata_url, Some(csv_url));
                if let Some(found) = self.try_candidate(csv_url, &metadata_url)? {
                    return Ok(found);
                }
            }
            Ok(None) => {}
            Err(e) => debug!("No linked metadata for {csv_url}: {e}"),
        }

        for template in self.well_known_templates(csv_url) {
            let Ok(parsed) = UriTemplate::parse(&template) else {
                debug!("Ignoring invalid well-known template {template}");
                continue;
            };
            let mut vars = HashMap::new();
            vars.insert("url".to_string(), TemplateValue::from(csv_url));
            let candidate = resolve_url(&parsed.expand(&vars), Some(csv_url));
            if let Some(found) = self.try_candidate(csv_url, &candidate)? {
                return Ok(found);
            }
        }

        info!("No metadata found for {csv_url}, using an empty schema");
        let table = Table {
            url: csv_url.to_string(),
            ..Table::default()
        };
        let wrapper = DescriptorWrapper::from_descriptor(Descriptor::Table(table), Context::default())?;
        Ok((wrapper, csv_url.to_string()))
    }

    fn well_known_templates(&self, csv_url: &str) -> Vec<String> {
        let listed = match self.fetcher.wkf("/.well-known/csvm", Some(csv_url)) {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                debug!("No /.well-known/csvm for {csv_url}: {e}");
                vec![]
            }
        };
        if listed.is_empty() {
            DEFAULT_WELL_KNOWN.iter().map(|t| t.to_string()).collect()
        } else {
            listed
        }
    }

    /// Fetches and normalizes a candidate. `None` when it cannot be loaded or does not
    /// describe `csv_url`.
    fn try_candidate(&self, csv_url: &str, metadata_url: &str) -> Result<Option<(DescriptorWrapper, String)>> {
        let text = match self.fetcher.jsonld(metadata_url, None) {
            Ok(text) => text,
            Err(e) => {
                debug!("Metadata candidate {metadata_url} not available: {e}");
                return Ok(None);
            }
        };
        // candidates are probed with a collecting tracker so a broken one is just skipped
        let probe = IssueTracker::new(crate::options::IssuePolicy::Collect, self.issues.level());
        let Ok(wrapper) = normalize(text.as_str(), self.fetcher, &probe, Some(metadata_url)) else {
            debug!("Metadata candidate {metadata_url} could not be parsed");
            return Ok(None);
        };
        let target = strip_query_fragment(csv_url);
        let describes = wrapper
            .tables()
            .iter()
            .any(|t| t.url.is_empty() || strip_query_fragment(&t.url) == target);
        if !describes {
            self.issues.warning(
                format!("Metadata {metadata_url} does not describe {csv_url}"),
                None,
            );
            return Ok(None);
        }
        info!("Using metadata {metadata_url} for {csv_url}");
        let wrapper = normalize(text, self.fetcher, self.issues, Some(metadata_url))?;
        Ok(Some((wrapper, metadata_url.to_string())))
    }
}
