//! Dialect-aware CSV reading on top of the `csv` crate.

use crate::descriptor::Dialect;
use crate::io::ByteStream;
use crate::issues::{IssueTracker, Location};
use anyhow::Result;
use csv::{ByteRecord, Reader, ReaderBuilder, Terminator};
use serde_json::Value;
use std::cell::Cell;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimMode {
    None,
    Start,
    End,
    Both,
}

impl TrimMode {
    fn apply<'a>(self, s: &'a str) -> &'a str {
        match self {
            TrimMode::None => s,
            TrimMode::Start => s.trim_start(),
            TrimMode::End => s.trim_end(),
            TrimMode::Both => s.trim(),
        }
    }
}

/// A dialect with every default filled in.
#[derive(Debug, Clone)]
pub struct DialectSettings {
    pub delimiter: u8,
    pub quote: Option<u8>,
    pub double_quote: bool,
    pub terminator: Option<u8>,
    pub comment_prefix: Option<String>,
    pub header_row_count: usize,
    pub skip_rows: usize,
    pub skip_columns: usize,
    pub skip_blank_rows: bool,
    pub trim: TrimMode,
}

impl Default for DialectSettings {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: Some(b'"'),
            double_quote: true,
            terminator: None,
            comment_prefix: Some("#".to_string()),
            header_row_count: 1,
            skip_rows: 0,
            skip_columns: 0,
            skip_blank_rows: false,
            trim: TrimMode::Both,
        }
    }
}

fn single_byte(value: &str) -> Option<u8> {
    match value.as_bytes() {
        [b] => Some(*b),
        _ => None,
    }
}

impl DialectSettings {
    pub fn from_dialect(dialect: Option<&Dialect>, issues: &IssueTracker, location: Option<Location>) -> Self {
        let mut settings = Self::default();
        let Some(d) = dialect else {
            return settings;
        };
        if let Some(delimiter) = &d.delimiter {
            match single_byte(delimiter) {
                Some(b) => settings.delimiter = b,
                None => issues.warning(
                    format!("Unsupported delimiter '{delimiter}', using ','"),
                    location.clone(),
                ),
            }
        }
        match &d.quote_char {
            Some(None) => settings.quote = None,
            Some(Some(q)) => match single_byte(q) {
                Some(b) => settings.quote = Some(b),
                None => issues.warning(format!("Unsupported quoteChar '{q}'"), location.clone()),
            },
            None => {}
        }
        if let Some(double_quote) = d.double_quote {
            settings.double_quote = double_quote;
        }
        if let Some(terminators) = &d.line_terminators {
            // the csv crate handles \n, \r and \r\n natively
            let custom: Vec<&String> = terminators
                .iter()
                .filter(|t| !matches!(t.as_str(), "\n" | "\r\n" | "\r"))
                .collect();
            match custom.as_slice() {
                [] => {}
                [t] if single_byte(t).is_some() => settings.terminator = single_byte(t),
                _ => issues.warning(
                    format!("Unsupported lineTerminators {terminators:?}"),
                    location.clone(),
                ),
            }
        }
        if let Some(prefix) = &d.comment_prefix {
            settings.comment_prefix = if prefix.is_empty() {
                None
            } else {
                Some(prefix.clone())
            };
        }
        if d.header == Some(false) {
            settings.header_row_count = 0;
        }
        if let Some(count) = d.header_row_count {
            settings.header_row_count = count;
        }
        settings.skip_rows = d.skip_rows.unwrap_or(0);
        settings.skip_columns = d.skip_columns.unwrap_or(0);
        settings.skip_blank_rows = d.skip_blank_rows.unwrap_or(false);
        settings.trim = match &d.trim {
            Some(Value::Bool(true)) => TrimMode::Both,
            Some(Value::Bool(false)) => TrimMode::None,
            Some(Value::String(s)) => match s.as_str() {
                "true" => TrimMode::Both,
                "false" => TrimMode::None,
                "start" => TrimMode::Start,
                "end" => TrimMode::End,
                _ => TrimMode::Both,
            },
            _ if d.skip_initial_space == Some(true) => TrimMode::Start,
            _ => TrimMode::Both,
        };
        if let Some(encoding) = &d.encoding {
            let enc = encoding.to_ascii_lowercase();
            if enc != "utf-8" && enc != "utf8" {
                issues.warning(
                    format!("Encoding {encoding} is not supported, reading as UTF-8"),
                    location,
                );
            }
        }
        settings
    }
}

/// One physical record of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvRow {
    /// A skipped or comment row, with its text.
    Comment { line: u64, text: String },
    Record { line: u64, cells: Vec<String> },
}

pub struct CsvReader {
    inner: Reader<ByteStream>,
    settings: DialectSettings,
    record: ByteRecord,
    read: usize,
    issues: Option<(Arc<IssueTracker>, Location)>,
    lossy: Cell<bool>,
}

impl CsvReader {
    pub fn new(stream: ByteStream, settings: DialectSettings) -> Self {
        let mut builder = ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(settings.delimiter)
            .double_quote(settings.double_quote);
        match settings.quote {
            Some(q) => {
                builder.quote(q);
            }
            None => {
                builder.quoting(false);
            }
        }
        if !settings.double_quote {
            builder.escape(Some(b'\\'));
        }
        if let Some(t) = settings.terminator {
            builder.terminator(Terminator::Any(t));
        }
        Self {
            inner: builder.from_reader(stream),
            settings,
            record: ByteRecord::new(),
            read: 0,
            issues: None,
            lossy: Cell::new(false),
        }
    }

    /// Reports invalid UTF-8 to `issues`, once per reader.
    pub fn reporting(mut self, issues: Arc<IssueTracker>, location: Location) -> Self {
        self.issues = Some((issues, location));
        self
    }

    pub fn settings(&self) -> &DialectSettings {
        &self.settings
    }

    fn decode(&self, bytes: &[u8]) -> String {
        match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(e) => {
                if !self.lossy.replace(true) {
                    if let Some((issues, location)) = &self.issues {
                        let line = self.record.position().map(|p| p.line()).unwrap_or(0);
                        issues.warning(
                            format!("Invalid UTF-8 on line {line} ({e}), replacing the bad bytes"),
                            Some(location.clone()),
                        );
                    }
                }
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }

    fn raw_text(&self) -> String {
        let delimiter = (self.settings.delimiter as char).to_string();
        self.record
            .iter()
            .map(|f| self.decode(f))
            .collect::<Vec<_>>()
            .join(&delimiter)
    }
}

impl Iterator for CsvReader {
    type Item = Result<CsvRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.read_byte_record(&mut self.record) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => return Some(Err(e.into())),
            }
            let line = self.record.position().map(|p| p.line()).unwrap_or(0);
            self.read += 1;
            if self.read <= self.settings.skip_rows {
                return Some(Ok(CsvRow::Comment {
                    line,
                    text: self.raw_text(),
                }));
            }
            if let Some(prefix) = &self.settings.comment_prefix {
                if self.record.get(0).is_some_and(|f| f.starts_with(prefix.as_bytes())) {
                    let text = self.raw_text();
                    let text = text
                        .strip_prefix(prefix.as_str())
                        .unwrap_or(&text)
                        .trim()
                        .to_string();
                    return Some(Ok(CsvRow::Comment { line, text }));
                }
            }
            let cells: Vec<String> = self
                .record
                .iter()
                .skip(self.settings.skip_columns)
                .map(|f| self.settings.trim.apply(&self.decode(f)).to_string())
                .collect();
            if self.settings.skip_blank_rows && cells.iter().all(String::is_empty) {
                continue;
            }
            return Some(Ok(CsvRow::Record { line, cells }));
        }
    }
}
