//! Defines the configuration shared by both conversion directions: `ConversionOptions` and the
//! URL rewriting rules (`PathOverride`) applied before any resource is fetched.

use crate::options::{IssuePolicy, LogLevel};
use anyhow::{anyhow, Result};
use derive_builder::Builder;
use globset::{Glob, GlobMatcher};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufReader, Write};
use std::path::Path;

#[derive(Debug, Clone)]
enum OverridePattern {
    Prefix(String),
    Regex(Regex),
    Glob { source: String, matcher: GlobMatcher },
}

/// Rewrites resolved URLs before they are fetched, e.g. to map a remote namespace onto a
/// local directory.
///
/// Pattern syntax: `re:<regex>` replaces regex matches (captures available as `$1`), a pattern
/// containing `*`, `?` or `[` is a glob and replaces the whole URL when it matches, anything
/// else is a literal prefix.
#[derive(Debug, Clone)]
pub struct PathOverride {
    pattern: OverridePattern,
    replacement: String,
}

impl PathOverride {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        let pattern = if let Some(re) = pattern.strip_prefix("re:") {
            OverridePattern::Regex(Regex::new(re)?)
        } else if pattern.contains(['*', '?', '[']) {
            OverridePattern::Glob {
                source: pattern.to_string(),
                matcher: Glob::new(pattern)?.compile_matcher(),
            }
        } else {
            OverridePattern::Prefix(pattern.to_string())
        };
        Ok(Self {
            pattern,
            replacement: replacement.to_string(),
        })
    }

    /// Parses the CLI form `pattern=replacement`.
    pub fn parse(spec: &str) -> Result<Self> {
        let (pattern, replacement) = spec
            .rsplit_once('=')
            .ok_or_else(|| anyhow!("Path override must have the form PATTERN=REPLACEMENT"))?;
        Self::new(pattern, replacement)
    }

    pub fn pattern_str(&self) -> String {
        match &self.pattern {
            OverridePattern::Prefix(p) => p.clone(),
            OverridePattern::Regex(re) => format!("re:{}", re.as_str()),
            OverridePattern::Glob { source, .. } => source.clone(),
        }
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Returns the rewritten URL, or `None` if this override does not apply.
    pub fn apply(&self, url: &str) -> Option<String> {
        match &self.pattern {
            OverridePattern::Prefix(prefix) => url
                .strip_prefix(prefix.as_str())
                .map(|rest| format!("{}{}", self.replacement, rest)),
            OverridePattern::Regex(re) => {
                if re.is_match(url) {
                    Some(re.replace(url, self.replacement.as_str()).into_owned())
                } else {
                    None
                }
            }
            OverridePattern::Glob { matcher, .. } => {
                if matcher.is_match(url) {
                    Some(self.replacement.clone())
                } else {
                    None
                }
            }
        }
    }
}

impl PartialEq for PathOverride {
    fn eq(&self, other: &Self) -> bool {
        self.pattern_str() == other.pattern_str() && self.replacement == other.replacement
    }
}

impl Serialize for PathOverride {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        (self.pattern_str(), &self.replacement).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PathOverride {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let (pattern, replacement): (String, String) = Deserialize::deserialize(deserializer)?;
        PathOverride::new(&pattern, &replacement).map_err(serde::de::Error::custom)
    }
}

fn default_window_size() -> usize {
    10_000
}

fn default_window_step() -> usize {
    5_000
}

fn default_language() -> String {
    "en".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Builder)]
#[builder(default, setter(into))]
#[serde(rename_all = "camelCase")]
pub struct ConversionOptions {
    /// Base IRI used when a descriptor or CSV location is relative.
    #[serde(default)]
    pub base_iri: Option<String>,
    #[serde(default)]
    pub path_overrides: Vec<PathOverride>,
    /// Only emit the data triples; suppresses table group, table and row bookkeeping.
    #[serde(default)]
    pub minimal: bool,
    /// Produce IRIs (percent-decoded) instead of ASCII-only URIs from templates.
    #[serde(default)]
    pub template_iris: bool,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub issue_policy: IssuePolicy,
    /// Number of quads kept resident in the RDF window store.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Number of quads read from the RDF input on each window move.
    #[serde(default = "default_window_step")]
    pub window_step: usize,
    /// Fetch vocabularies to label inferred tables and columns.
    #[serde(default)]
    pub use_vocab_metadata: bool,
    #[serde(default = "default_language")]
    pub preferred_language: String,
    /// Put subjects without an `rdf:type` into a shared table instead of dropping them.
    #[serde(default)]
    pub unknown_type_table: bool,
    #[serde(default = "default_true")]
    pub freeze_templates_on_lock: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            base_iri: None,
            path_overrides: vec![],
            minimal: false,
            template_iris: false,
            log_level: LogLevel::default(),
            issue_policy: IssuePolicy::default(),
            window_size: default_window_size(),
            window_step: default_window_step(),
            use_vocab_metadata: false,
            preferred_language: default_language(),
            unknown_type_table: false,
            freeze_templates_on_lock: true,
        }
    }
}

impl ConversionOptions {
    pub fn builder() -> ConversionOptionsBuilder {
        ConversionOptionsBuilder::default()
    }

    /// Applies the first matching path override, if any.
    pub fn rewrite_url(&self, url: &str) -> String {
        for path_override in &self.path_overrides {
            if let Some(rewritten) = path_override.apply(url) {
                return rewritten;
            }
        }
        url.to_string()
    }

    pub fn save_to_file(&self, file: &Path) -> Result<()> {
        let config_str = serde_json::to_string_pretty(&self)?;
        let mut file = std::fs::File::create(file)?;
        file.write_all(config_str.as_bytes())?;
        Ok(())
    }

    pub fn from_file(file: &Path) -> Result<Self> {
        let file = std::fs::File::open(file)?;
        let reader = BufReader::new(file);
        let options: ConversionOptions = serde_json::from_reader(reader)?;
        if options.window_step == 0 || options.window_step > options.window_size {
            return Err(anyhow!(
                "windowStep must be between 1 and windowSize ({})",
                options.window_size
            ));
        }
        Ok(options)
    }

    /// Prints out the current options in a clear and readable way for command line output.
    pub fn print(&self) {
        println!("{self}");
    }
}

impl fmt::Display for ConversionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Conversion options:")?;
        writeln!(
            f,
            "  Base IRI: {}",
            self.base_iri.as_deref().unwrap_or("(none)")
        )?;
        if !self.path_overrides.is_empty() {
            writeln!(f, "  Path overrides:")?;
            for o in &self.path_overrides {
                writeln!(f, "    - {} => {}", o.pattern_str(), o.replacement())?;
            }
        }
        writeln!(f, "  Minimal: {}", self.minimal)?;
        writeln!(f, "  Template IRIs: {}", self.template_iris)?;
        writeln!(f, "  Log level: {}", self.log_level)?;
        writeln!(f, "  Throw on errors: {}", self.issue_policy.throws())?;
        writeln!(
            f,
            "  Window: {} quads, step {}",
            self.window_size, self.window_step
        )?;
        writeln!(f, "  Vocabulary metadata: {}", self.use_vocab_metadata)?;
        writeln!(f, "  Preferred language: {}", self.preferred_language)?;
        write!(f, "  Unknown type table: {}", self.unknown_type_table)
    }
}
