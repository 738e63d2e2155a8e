//! Human readable names for inferred tables and columns, looked up in the vocabulary that
//! defines a type or predicate.

use crate::consts::{LABEL, PREF_LABEL};
use crate::fetch::{detect_format_from_url, sniff_format};
use crate::io::Fetcher;
use crate::util::{last_segment, namespace_of, parse_rdf};
use anyhow::Result;
use log::debug;
use oxigraph::io::RdfFormat;
use oxigraph::model::{NamedOrBlankNode, Term};
use std::collections::HashMap;
use std::io::{Cursor, Read};

#[derive(Debug, Default, Clone)]
struct Labels {
    /// Language tag ("" when untagged) to label.
    by_lang: HashMap<String, String>,
    pref: bool,
}

pub struct VocabularyLabels {
    fetcher: Option<Fetcher>,
    preferred_language: String,
    /// Labels per namespace; an empty map for namespaces that could not be loaded.
    cache: HashMap<String, HashMap<String, Labels>>,
}

impl VocabularyLabels {
    /// Without a fetcher every label falls back to the last IRI segment.
    pub fn new(fetcher: Option<Fetcher>, preferred_language: &str) -> Self {
        Self {
            fetcher,
            preferred_language: preferred_language.to_string(),
            cache: HashMap::new(),
        }
    }

    pub fn label(&mut self, iri: &str) -> String {
        if self.fetcher.is_some() {
            let namespace = namespace_of(iri).to_string();
            if !self.cache.contains_key(&namespace) {
                let loaded = self.load(&namespace).unwrap_or_else(|e| {
                    debug!("Could not load vocabulary {namespace}: {e}");
                    HashMap::new()
                });
                self.cache.insert(namespace.clone(), loaded);
            }
            let found = self
                .cache
                .get(&namespace)
                .and_then(|labels| labels.get(iri))
                .and_then(|labels| self.pick(labels));
            if let Some(label) = found {
                return label;
            }
        }
        last_segment(iri).to_string()
    }

    fn pick(&self, labels: &Labels) -> Option<String> {
        let primary = self.preferred_language.split('-').next().unwrap_or_default();
        labels
            .by_lang
            .get(&self.preferred_language)
            .or_else(|| {
                labels
                    .by_lang
                    .iter()
                    .find(|(lang, _)| lang.split('-').next() == Some(primary))
                    .map(|(_, l)| l)
            })
            .or_else(|| labels.by_lang.get(""))
            .or_else(|| labels.by_lang.values().min())
            .cloned()
    }

    fn load(&self, namespace: &str) -> Result<HashMap<String, Labels>> {
        let Some(fetcher) = &self.fetcher else {
            return Ok(HashMap::new());
        };
        let url = namespace.trim_end_matches('#');
        let mut bytes = vec![];
        fetcher.rdf(url, None)?.read_to_end(&mut bytes)?;
        let format = detect_format_from_url(url)
            .or_else(|| sniff_format(&bytes))
            .unwrap_or(RdfFormat::Turtle);
        debug!("Loaded vocabulary {url} as {format}");
        let mut labels: HashMap<String, Labels> = HashMap::new();
        for quad in parse_rdf(Cursor::new(bytes), format, Some(url))? {
            let quad = quad?;
            let is_pref = quad.predicate == PREF_LABEL;
            if !is_pref && quad.predicate != LABEL {
                continue;
            }
            let (NamedOrBlankNode::NamedNode(subject), Term::Literal(literal)) = (&quad.subject, &quad.object)
            else {
                continue;
            };
            let entry = labels.entry(subject.as_str().to_string()).or_default();
            // skos:prefLabel wins over rdfs:label
            if is_pref && !entry.pref {
                entry.by_lang.clear();
                entry.pref = true;
            } else if !is_pref && entry.pref {
                continue;
            }
            entry
                .by_lang
                .entry(literal.language().unwrap_or_default().to_string())
                .or_insert_with(|| literal.value().to_string());
        }
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionOptions;
    use crate::io::MemoryResolver;
    use std::sync::Arc;

    const VOCAB: &str = r#"
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
@prefix skos: <http://www.w3.org/2004/02/skos/core#> .
<http://ex.org/vocab#Person> rdfs:label "Person"@en, "Persoon"@nl .
<http://ex.org/vocab#name> rdfs:label "label" ; skos:prefLabel "Full name"@en .
"#;

    fn labels(lang: &str) -> VocabularyLabels {
        let resolver = MemoryResolver::new().with_document("http://ex.org/vocab", VOCAB);
        let fetcher = Fetcher::new(Arc::new(resolver), Arc::new(ConversionOptions::default()));
        VocabularyLabels::new(Some(fetcher), lang)
    }

    #[test]
    fn test_preferred_language() {
        assert_eq!(labels("nl").label("http://ex.org/vocab#Person"), "Persoon");
        assert_eq!(labels("en-GB").label("http://ex.org/vocab#Person"), "Person");
    }

    #[test]
    fn test_pref_label_wins() {
        assert_eq!(labels("en").label("http://ex.org/vocab#name"), "Full name");
    }

    #[test]
    fn test_fallbacks() {
        let mut vocab = labels("en");
        assert_eq!(vocab.label("http://ex.org/vocab#unknown"), "unknown");
        assert_eq!(vocab.label("http://missing.org/ns/Thing"), "Thing");
        let mut offline = VocabularyLabels::new(None, "en");
        assert_eq!(offline.label("http://ex.org/vocab#Person"), "Person");
    }
}
