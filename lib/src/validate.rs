//! Validation of CSVW data: a full CSV to RDF pass whose quads are discarded, reporting every
//! issue found along the way.

use crate::config::ConversionOptions;
use crate::csv2rdf::Csv2RdfConvertor;
use crate::descriptor::DescriptorInput;
use crate::io::Resolver;
use crate::issues::{Issue, IssueTracker, IssueType};
use crate::options::IssuePolicy;
use crate::util::is_metadata_url;
use anyhow::Result;
use log::info;
use std::sync::Arc;

/// What to validate.
pub enum ValidationInput {
    /// A metadata document, with the URL it was loaded from.
    Descriptor(DescriptorInput, Option<String>),
    /// URL of a metadata document.
    MetadataUrl(String),
    /// URL of a CSV file; its metadata is located first.
    CsvUrl(String),
}

impl ValidationInput {
    /// Picks metadata or CSV handling from the URL's extension.
    pub fn from_url(url: &str) -> Self {
        if is_metadata_url(url) {
            ValidationInput::MetadataUrl(url.to_string())
        } else {
            ValidationInput::CsvUrl(url.to_string())
        }
    }
}

pub struct Validator {
    options: ConversionOptions,
    resolver: Arc<dyn Resolver>,
}

impl Validator {
    pub fn new(options: ConversionOptions, resolver: Arc<dyn Resolver>) -> Self {
        Self { options, resolver }
    }

    /// Runs the validation. Issues are always collected, whatever policy the options name.
    pub fn validate(&self, input: ValidationInput) -> Result<std::vec::IntoIter<Issue>> {
        let options = ConversionOptions {
            issue_policy: IssuePolicy::Collect,
            ..self.options.clone()
        };
        let issues = Arc::new(IssueTracker::new(IssuePolicy::Collect, options.log_level));
        let convertor = Csv2RdfConvertor::with_issues(options, self.resolver.clone(), issues.clone());
        let started = match input {
            ValidationInput::Descriptor(descriptor, url) => convertor.convert(descriptor, url.as_deref()),
            ValidationInput::MetadataUrl(url) => convertor.convert_url(&url),
            ValidationInput::CsvUrl(url) => convertor.convert_csv(&url),
        };
        let mut fatal = vec![];
        match started {
            Ok(stream) => {
                let mut quads = 0usize;
                for quad in stream {
                    if let Err(e) = quad {
                        fatal.push(e);
                        break;
                    }
                    quads += 1;
                }
                info!("Validation converted {quads} quads");
            }
            Err(e) => fatal.push(e),
        }
        let mut report = issues.get_errors();
        for e in fatal {
            let message = format!("{e:#}");
            if !report.iter().any(|i| i.message == message) {
                report.push(Issue {
                    kind: IssueType::Error,
                    message,
                    location: None,
                });
            }
        }
        report.extend(issues.get_warnings());
        Ok(report.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryResolver;
    use serde_json::json;

    fn validator(resolver: MemoryResolver) -> Validator {
        Validator::new(ConversionOptions::default(), Arc::new(resolver))
    }

    #[test]
    fn test_valid_table_has_no_errors() {
        let resolver = MemoryResolver::new().with_document("http://ex.org/t.csv", "id,age\n1,30\n2,40\n");
        let descriptor = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "t.csv",
            "tableSchema": {"columns": [{"name": "id"}, {"name": "age", "datatype": "integer"}]}
        });
        let issues: Vec<Issue> = validator(resolver)
            .validate(ValidationInput::Descriptor(
                descriptor.into(),
                Some("http://ex.org/m.json".to_string()),
            ))
            .unwrap()
            .collect();
        assert!(issues.iter().all(|i| i.kind != IssueType::Error), "{issues:?}");
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let resolver = MemoryResolver::new().with_document("http://ex.org/t.csv", "id,age\n1,thirty\n");
        let descriptor = json!({
            "@context": "http://www.w3.org/ns/csvw",
            "url": "t.csv",
            "tableSchema": {"columns": [{"name": "id"}, {"name": "age", "datatype": "integer"}]}
        });
        let issues: Vec<Issue> = validator(resolver)
            .validate(ValidationInput::Descriptor(
                descriptor.into(),
                Some("http://ex.org/m.json".to_string()),
            ))
            .unwrap()
            .collect();
        assert!(issues
            .iter()
            .any(|i| i.kind == IssueType::Warning && i.message.contains("thirty")));
    }

    #[test]
    fn test_missing_metadata_is_an_error() {
        let issues: Vec<Issue> = validator(MemoryResolver::new())
            .validate(ValidationInput::from_url("http://ex.org/missing.json"))
            .unwrap()
            .collect();
        assert!(issues.iter().any(|i| i.kind == IssueType::Error));
    }
}
