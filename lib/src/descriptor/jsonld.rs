//! The slice of JSON-LD that CSVW metadata relies on: the `@context` of a descriptor, term
//! and IRI expansion with the CSVW initial context, and the conversion of common (non-CSVW)
//! properties into RDF.

use crate::consts::{expand_prefixed, CSVW_CONTEXT, CSVW_NS, TYPE, XSD_BOOLEAN, XSD_DOUBLE, XSD_INTEGER};
use crate::util::{is_absolute_url, resolve_url};
use oxigraph::model::{
    BlankNode, GraphName, Literal, NamedNode, NamedOrBlankNode, Quad, Term,
};
use serde_json::{Map, Value};

/// The parts of a descriptor's `@context` that influence interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    pub language: Option<String>,
    pub base: Option<String>,
}

impl Context {
    /// Reads `@context`. Returns `None` when it is not a CSVW context.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if is_csvw_context(s) => Some(Self::default()),
            Value::Array(items) if items.len() == 2 => {
                let first = items[0].as_str()?;
                if !is_csvw_context(first) {
                    return None;
                }
                let obj = items[1].as_object()?;
                Some(Self {
                    language: obj.get("@language").and_then(Value::as_str).map(str::to_string),
                    base: obj.get("@base").and_then(Value::as_str).map(str::to_string),
                })
            }
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        if self.language.is_none() && self.base.is_none() {
            return Value::String(CSVW_CONTEXT.to_string());
        }
        let mut obj = Map::new();
        if let Some(lang) = &self.language {
            obj.insert("@language".into(), Value::String(lang.clone()));
        }
        if let Some(base) = &self.base {
            obj.insert("@base".into(), Value::String(base.clone()));
        }
        Value::Array(vec![Value::String(CSVW_CONTEXT.to_string()), Value::Object(obj)])
    }
}

fn is_csvw_context(s: &str) -> bool {
    s.trim_end_matches('#') == CSVW_CONTEXT
}

/// True for keys that name properties outside the CSVW vocabulary (prefixed names and
/// absolute IRIs).
pub fn is_external_key(key: &str) -> bool {
    !key.starts_with('@') && key.contains(':')
}

/// Expands a prefixed name or resolves a relative IRI against `base`.
pub fn expand_iri(value: &str, base: Option<&str>) -> String {
    if let Some(expanded) = expand_prefixed(value) {
        return expanded;
    }
    if is_absolute_url(value) {
        return value.to_string();
    }
    resolve_url(value, base)
}

/// Expands the key of an external property.
pub fn expand_key(key: &str) -> String {
    if key == "notes" {
        return format!("{CSVW_NS}note");
    }
    expand_prefixed(key).unwrap_or_else(|| key.to_string())
}

/// Converts JSON-LD values of common properties into quads.
pub struct ValueConverter<'a> {
    context: &'a Context,
    base: Option<&'a str>,
    quads: Vec<Quad>,
}

impl<'a> ValueConverter<'a> {
    pub fn new(context: &'a Context, base: Option<&'a str>) -> Self {
        Self {
            context,
            base,
            quads: vec![],
        }
    }

    pub fn into_quads(self) -> Vec<Quad> {
        self.quads
    }

    fn push(&mut self, subject: &NamedOrBlankNode, predicate: &NamedNode, object: Term) {
        self.quads.push(Quad::new(
            subject.clone(),
            predicate.clone(),
            object,
            GraphName::DefaultGraph,
        ));
    }

    /// Emits every `(key, value)` of `properties` on `subject`.
    pub fn add_properties(&mut self, subject: &NamedOrBlankNode, properties: &Map<String, Value>) {
        for (key, value) in properties {
            if key.starts_with('@') {
                continue;
            }
            let Ok(predicate) = NamedNode::new(expand_key(key)) else {
                continue;
            };
            self.add_value(subject, &predicate, value);
        }
    }

    pub fn add_value(&mut self, subject: &NamedOrBlankNode, predicate: &NamedNode, value: &Value) {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    self.add_value(subject, predicate, item);
                }
            }
            Value::String(s) => {
                let literal = match &self.context.language {
                    Some(lang) => Literal::new_language_tagged_literal(s, lang)
                        .unwrap_or_else(|_| Literal::new_simple_literal(s)),
                    None => Literal::new_simple_literal(s),
                };
                self.push(subject, predicate, literal.into());
            }
            Value::Bool(b) => {
                let literal = Literal::new_typed_literal(b.to_string(), XSD_BOOLEAN);
                self.push(subject, predicate, literal.into());
            }
            Value::Number(n) => {
                let datatype = if n.is_i64() || n.is_u64() {
                    XSD_INTEGER
                } else {
                    XSD_DOUBLE
                };
                let literal = Literal::new_typed_literal(n.to_string(), datatype);
                self.push(subject, predicate, literal.into());
            }
            Value::Object(obj) => {
                if let Some(object) = self.object_term(obj) {
                    self.push(subject, predicate, object);
                }
            }
        }
    }

    fn object_term(&mut self, obj: &Map<String, Value>) -> Option<Term> {
        if let Some(value) = obj.get("@value") {
            let lexical = match value {
                Value::String(s) => s.clone(),
                Value::Null => return None,
                other => other.to_string(),
            };
            if let Some(datatype) = obj.get("@type").and_then(Value::as_str) {
                let datatype = NamedNode::new(expand_iri(datatype, self.base)).ok()?;
                return Some(Literal::new_typed_literal(lexical, datatype).into());
            }
            if let Some(lang) = obj.get("@language").and_then(Value::as_str) {
                return Literal::new_language_tagged_literal(lexical, lang)
                    .ok()
                    .map(Term::from);
            }
            return Some(match value {
                Value::Bool(_) => Literal::new_typed_literal(lexical, XSD_BOOLEAN).into(),
                Value::Number(n) if n.is_i64() || n.is_u64() => {
                    Literal::new_typed_literal(lexical, XSD_INTEGER).into()
                }
                Value::Number(_) => Literal::new_typed_literal(lexical, XSD_DOUBLE).into(),
                _ => Literal::new_simple_literal(lexical).into(),
            });
        }
        let node: NamedOrBlankNode = match obj.get("@id").and_then(Value::as_str) {
            Some(id) => NamedNode::new(expand_iri(id, self.base)).ok()?.into(),
            None => BlankNode::default().into(),
        };
        match obj.get("@type") {
            Some(Value::String(t)) => self.add_type(&node, t),
            Some(Value::Array(types)) => {
                for t in types.iter().filter_map(Value::as_str) {
                    self.add_type(&node, t);
                }
            }
            _ => {}
        }
        self.add_properties(&node, obj);
        Some(match node {
            NamedOrBlankNode::NamedNode(n) => n.into(),
            NamedOrBlankNode::BlankNode(b) => b.into(),
        })
    }

    fn add_type(&mut self, node: &NamedOrBlankNode, t: &str) {
        if let Ok(class) = NamedNode::new(expand_iri(t, self.base)) {
            self.push(node, &TYPE.into_owned(), class.into());
        }
    }
}
