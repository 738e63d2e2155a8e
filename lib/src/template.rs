//! RFC 6570 URI templates (levels 1-4, without associative arrays), as used by the `aboutUrl`,
//! `propertyUrl` and `valueUrl` column properties, and the inverse direction used when
//! reconstructing cell values from IRIs.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Value bound to a template variable. Unbound variables are simply absent from the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    Str(String),
    List(Vec<String>),
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        TemplateValue::Str(s.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        TemplateValue::Str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Simple,
    Reserved,
    Fragment,
    Label,
    Path,
    PathParam,
    Query,
    QueryCont,
}

impl Operator {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Operator::Reserved),
            '#' => Some(Operator::Fragment),
            '.' => Some(Operator::Label),
            '/' => Some(Operator::Path),
            ';' => Some(Operator::PathParam),
            '?' => Some(Operator::Query),
            '&' => Some(Operator::QueryCont),
            _ => None,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Operator::Simple => "",
            Operator::Reserved => "+",
            Operator::Fragment => "#",
            Operator::Label => ".",
            Operator::Path => "/",
            Operator::PathParam => ";",
            Operator::Query => "?",
            Operator::QueryCont => "&",
        }
    }

    fn first(self) -> &'static str {
        match self {
            Operator::Simple | Operator::Reserved => "",
            other => other.symbol(),
        }
    }

    fn separator(self) -> &'static str {
        match self {
            Operator::Simple | Operator::Reserved | Operator::Fragment => ",",
            Operator::Label => ".",
            Operator::Path => "/",
            Operator::PathParam => ";",
            Operator::Query | Operator::QueryCont => "&",
        }
    }

    fn named(self) -> bool {
        matches!(
            self,
            Operator::PathParam | Operator::Query | Operator::QueryCont
        )
    }

    fn if_empty(self) -> &'static str {
        match self {
            Operator::Query | Operator::QueryCont => "=",
            _ => "",
        }
    }

    fn allows_reserved(self) -> bool {
        matches!(self, Operator::Reserved | Operator::Fragment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VarSpec {
    name: String,
    explode: bool,
    prefix: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Expression {
    op: Operator,
    vars: Vec<VarSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Expr(Expression),
}

#[derive(Debug, Clone)]
pub struct UriTemplate {
    source: String,
    parts: Vec<Part>,
}

impl PartialEq for UriTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn parse_expression(body: &str) -> Result<Expression> {
    let mut chars = body.chars();
    let (op, rest) = match chars.next().and_then(Operator::from_char) {
        Some(op) => (op, chars.as_str()),
        None => (Operator::Simple, body),
    };
    let mut vars = vec![];
    for raw in rest.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(anyhow!("Empty variable in template expression {{{body}}}"));
        }
        let spec = if let Some(name) = raw.strip_suffix('*') {
            VarSpec {
                name: name.to_string(),
                explode: true,
                prefix: None,
            }
        } else if let Some((name, len)) = raw.split_once(':') {
            let len: usize = len
                .parse()
                .map_err(|_| anyhow!("Invalid prefix modifier in {{{body}}}"))?;
            VarSpec {
                name: name.to_string(),
                explode: false,
                prefix: Some(len),
            }
        } else {
            VarSpec {
                name: raw.to_string(),
                explode: false,
                prefix: None,
            }
        };
        if !spec
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '%'))
        {
            return Err(anyhow!("Invalid variable name '{}' in template", spec.name));
        }
        vars.push(spec);
    }
    Ok(Expression { op, vars })
}

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

fn is_reserved(c: char) -> bool {
    matches!(
        c,
        ':' | '/' | '?' | '#' | '[' | ']' | '@' | '!' | '$' | '&' | '\'' | '(' | ')' | '*' | '+'
            | ',' | ';' | '='
    )
}

fn encode(value: &str, allow_reserved: bool) -> String {
    if !allow_reserved {
        return urlencoding::encode(value).into_owned();
    }
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    for (idx, c) in value.char_indices() {
        let pct_triplet = c == '%'
            && bytes.len() > idx + 2
            && bytes[idx + 1].is_ascii_hexdigit()
            && bytes[idx + 2].is_ascii_hexdigit();
        if is_unreserved(c) || is_reserved(c) || pct_triplet {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            out.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
    }
    out
}

fn truncate(value: &str, prefix: Option<usize>) -> &str {
    match prefix {
        Some(len) => match value.char_indices().nth(len) {
            Some((idx, _)) => &value[..idx],
            None => value,
        },
        None => value,
    }
}

impl UriTemplate {
    pub fn parse(source: &str) -> Result<Self> {
        let mut parts = vec![];
        let mut rest = source;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                parts.push(Part::Literal(rest[..open].to_string()));
            }
            let close = rest[open..]
                .find('}')
                .ok_or_else(|| anyhow!("Unterminated expression in template '{source}'"))?;
            let body = &rest[open + 1..open + close];
            parts.push(Part::Expr(parse_expression(body)?));
            rest = &rest[open + close + 1..];
        }
        if rest.contains('}') {
            return Err(anyhow!("Unbalanced '}}' in template '{source}'"));
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names of the variables referenced by the template, in order of appearance.
    pub fn variables(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Expr(e) => Some(e.vars.iter().map(|v| v.name.as_str())),
                Part::Literal(_) => None,
            })
            .flatten()
            .collect()
    }

    /// True when the template contains no expression at all.
    pub fn is_literal(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Literal(_)))
    }

    /// The literal text preceding the first expression.
    pub fn literal_prefix(&self) -> &str {
        match self.parts.first() {
            Some(Part::Literal(l)) => l,
            _ => "",
        }
    }

    pub fn expand(&self, vars: &HashMap<String, TemplateValue>) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(l) => out.push_str(l),
                Part::Expr(expr) => expand_expression(expr, vars, &mut out),
            }
        }
        out
    }

    /// Builds an anchored regex with one lazy capture group per variable.
    fn matcher(&self) -> Result<(Regex, Vec<(String, Operator)>)> {
        let mut pattern = String::from("^");
        let mut names = vec![];
        for part in &self.parts {
            match part {
                Part::Literal(l) => pattern.push_str(&regex::escape(l)),
                Part::Expr(expr) => {
                    pattern.push_str("(?:");
                    pattern.push_str(&regex::escape(expr.op.first()));
                    for (i, var) in expr.vars.iter().enumerate() {
                        if i > 0 {
                            pattern.push_str(&format!("(?:{})?", regex::escape(expr.op.separator())));
                        }
                        if expr.op.named() {
                            pattern.push_str(&format!("(?:{}=?)?", regex::escape(&var.name)));
                        }
                        pattern.push_str("(.*?)");
                        names.push((var.name.clone(), expr.op));
                    }
                    pattern.push_str(")?");
                }
            }
        }
        pattern.push('$');
        Ok((Regex::new(&pattern)?, names))
    }

    /// Inverse of [`expand`](Self::expand): recovers variable values from an expanded IRI.
    /// Values of operators that percent-encode are decoded again.
    pub fn match_iri(&self, iri: &str) -> Option<HashMap<String, String>> {
        let (re, names) = self.matcher().ok()?;
        let caps = re.captures(iri)?;
        let mut out = HashMap::new();
        for (idx, (name, op)) in names.into_iter().enumerate() {
            let Some(m) = caps.get(idx + 1) else {
                continue;
            };
            let raw = m.as_str();
            let value = if op.allows_reserved() {
                raw.to_string()
            } else {
                urlencoding::decode(raw)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| raw.to_string())
            };
            out.entry(name).or_insert(value);
        }
        Some(out)
    }
}

fn expand_expression(expr: &Expression, vars: &HashMap<String, TemplateValue>, out: &mut String) {
    let op = expr.op;
    let allow = op.allows_reserved();
    let mut first = true;
    for var in &expr.vars {
        let Some(value) = vars.get(&var.name) else {
            continue;
        };
        if let TemplateValue::List(items) = value {
            if items.is_empty() {
                continue;
            }
        }
        out.push_str(if first { op.first() } else { op.separator() });
        first = false;
        match value {
            TemplateValue::Str(s) => {
                if op.named() {
                    out.push_str(&var.name);
                    if s.is_empty() {
                        out.push_str(op.if_empty());
                        continue;
                    }
                    out.push('=');
                }
                out.push_str(&encode(truncate(s, var.prefix), allow));
            }
            TemplateValue::List(items) => {
                if var.explode {
                    let joined: Vec<String> = items
                        .iter()
                        .map(|item| {
                            if !op.named() {
                                encode(item, allow)
                            } else if item.is_empty() {
                                format!("{}{}", var.name, op.if_empty())
                            } else {
                                format!("{}={}", var.name, encode(item, allow))
                            }
                        })
                        .collect();
                    out.push_str(&joined.join(op.separator()));
                } else {
                    if op.named() {
                        out.push_str(&var.name);
                        out.push('=');
                    }
                    let joined: Vec<String> = items.iter().map(|i| encode(i, allow)).collect();
                    out.push_str(&joined.join(","));
                }
            }
        }
    }
}

/// Replaces percent-encoded non-ASCII UTF-8 sequences with the characters they encode,
/// turning a URI into an IRI. ASCII escapes are kept.
pub fn uri_to_iri(uri: &str) -> String {
    let bytes = uri.as_bytes();
    let mut out = String::with_capacity(uri.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let mut run = vec![];
            let mut j = i;
            while j + 3 <= bytes.len() && bytes[j] == b'%' {
                let Some(byte) = std::str::from_utf8(&bytes[j + 1..j + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                else {
                    break;
                };
                if byte < 0x80 {
                    break;
                }
                run.push(byte);
                j += 3;
            }
            if !run.is_empty() {
                if let Ok(decoded) = String::from_utf8(run) {
                    out.push_str(&decoded);
                    i = j;
                    continue;
                }
            }
        }
        let ch_len = uri[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        out.push_str(&uri[i..i + ch_len]);
        i += ch_len;
    }
    out
}

const UNSAFE_CHARS: [char; 9] = ['/', '?', '&', '=', '#', '[', ']', '{', '}'];

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .take_while(|((_, x), y)| x == y)
        .last()
        .map(|((idx, c), _)| idx + c.len_utf8())
        .unwrap_or(0)
}

fn common_suffix_len(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum()
}

/// Progressively generalises the IRIs observed for one column into a template of the form
/// `prefix{var}suffix`, where the prefix and suffix are common to every observed IRI.
#[derive(Debug, Clone, Default)]
pub struct TemplateBuilder {
    first: Option<String>,
    distinct: bool,
    prefix: String,
    suffix: String,
    min_len: usize,
    unsafe_middle: bool,
    frozen: bool,
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    /// Stops any further generalisation.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Widens the template so it also covers `iri`. Returns true when the template changed.
    pub fn add(&mut self, iri: &str) -> bool {
        if self.frozen {
            return false;
        }
        let Some(first) = &self.first else {
            let split = iri.rfind(['/', '#']).map(|i| i + 1).unwrap_or(0);
            self.prefix = iri[..split].to_string();
            self.suffix = String::new();
            self.min_len = iri.len();
            self.unsafe_middle = iri[split..].contains(UNSAFE_CHARS);
            self.first = Some(iri.to_string());
            return true;
        };
        if !self.distinct && first == iri {
            return false;
        }
        if self.distinct && self.matches(iri) {
            return false;
        }
        let old_prefix = self.prefix.clone();
        let old_suffix = self.suffix.clone();
        let (mut prefix_len, mut suffix_len) = if self.distinct {
            (
                common_prefix_len(&self.prefix, iri),
                common_suffix_len(&self.suffix, iri),
            )
        } else {
            (common_prefix_len(first, iri), common_suffix_len(first, iri))
        };
        self.min_len = self.min_len.min(iri.len());
        // back off into the previous delimiter so partial tokens stay in the variable part
        let prefix_candidate = &iri[..prefix_len];
        prefix_len -= prefix_candidate
            .chars()
            .rev()
            .take_while(|c| c.is_alphanumeric())
            .map(char::len_utf8)
            .sum::<usize>();
        if prefix_len + suffix_len > self.min_len {
            suffix_len = self.min_len.saturating_sub(prefix_len);
            while !iri.is_char_boundary(iri.len() - suffix_len) {
                suffix_len -= 1;
            }
        }
        let leading_alnum: usize = iri[iri.len() - suffix_len..]
            .chars()
            .take_while(|c| c.is_alphanumeric())
            .map(char::len_utf8)
            .sum();
        suffix_len -= leading_alnum;
        self.prefix = iri[..prefix_len].to_string();
        self.suffix = iri[iri.len() - suffix_len..].to_string();
        self.distinct = true;

        let middle = &iri[prefix_len..iri.len() - suffix_len];
        let first_middle = &first[prefix_len..first.len() - suffix_len];
        let widened = format!(
            "{}{}",
            old_prefix.get(prefix_len..).unwrap_or_default(),
            old_suffix
                .get(..old_suffix.len().saturating_sub(suffix_len))
                .unwrap_or_default()
        );
        if middle.contains(UNSAFE_CHARS)
            || first_middle.contains(UNSAFE_CHARS)
            || widened.contains(UNSAFE_CHARS)
        {
            self.unsafe_middle = true;
        }
        self.prefix != old_prefix || self.suffix != old_suffix
    }

    /// True when `iri` is covered by the current template.
    pub fn matches(&self, iri: &str) -> bool {
        if !self.distinct {
            return self.first.as_deref() == Some(iri)
                || (iri.starts_with(&self.prefix)
                    && (self.unsafe_middle || !iri[self.prefix.len()..].contains(UNSAFE_CHARS)));
        }
        iri.len() >= self.prefix.len() + self.suffix.len()
            && iri.starts_with(&self.prefix)
            && iri.ends_with(&self.suffix)
            && (self.unsafe_middle
                || !iri[self.prefix.len()..iri.len() - self.suffix.len()].contains(UNSAFE_CHARS))
    }

    /// Renders the template for the given variable name.
    pub fn template(&self, var: &str) -> Option<String> {
        self.first.as_ref()?;
        let op = if self.unsafe_middle { "+" } else { "" };
        Some(format!("{}{{{op}{var}}}{}", self.prefix, self.suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, TemplateValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), TemplateValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_simple_expansion_encodes() {
        let t = UriTemplate::parse("http://ex.org/{name}").unwrap();
        assert_eq!(
            t.expand(&vars(&[("name", "Hello World/x")])),
            "http://ex.org/Hello%20World%2Fx"
        );
    }

    #[test]
    fn test_operators() {
        let v = vars(&[("x", "1024"), ("y", "768"), ("path", "/foo/bar"), ("empty", "")]);
        let cases = [
            ("{+path}/here", "/foo/bar/here"),
            ("{#path}", "#/foo/bar"),
            ("X{.x,y}", "X.1024.768"),
            ("{/x,y}", "/1024/768"),
            ("{;x,empty}", ";x=1024;empty"),
            ("{?x,y,empty}", "?x=1024&y=768&empty="),
            ("?fixed=yes{&x}", "?fixed=yes&x=1024"),
            ("{x:2}", "10"),
            ("{undef}", ""),
        ];
        for (template, expected) in cases {
            assert_eq!(UriTemplate::parse(template).unwrap().expand(&v), expected, "{template}");
        }
    }

    #[test]
    fn test_list_expansion() {
        let mut v = HashMap::new();
        v.insert(
            "list".to_string(),
            TemplateValue::List(vec!["red".into(), "green".into()]),
        );
        assert_eq!(UriTemplate::parse("{list}").unwrap().expand(&v), "red,green");
        assert_eq!(UriTemplate::parse("{/list*}").unwrap().expand(&v), "/red/green");
        assert_eq!(
            UriTemplate::parse("{?list*}").unwrap().expand(&v),
            "?list=red&list=green"
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(UriTemplate::parse("http://ex.org/{id").is_err());
        assert!(UriTemplate::parse("http://ex.org/id}").is_err());
        assert!(UriTemplate::parse("{}").is_err());
    }

    #[test]
    fn test_match_iri() {
        let t = UriTemplate::parse("http://ex.org/people/{id}.json").unwrap();
        let m = t.match_iri("http://ex.org/people/a%20b.json").unwrap();
        assert_eq!(m.get("id").map(String::as_str), Some("a b"));
        assert!(t.match_iri("http://other.org/x").is_none());

        let t = UriTemplate::parse("http://ex.org/{+rest}").unwrap();
        let m = t.match_iri("http://ex.org/a/b%20c").unwrap();
        assert_eq!(m.get("rest").map(String::as_str), Some("a/b%20c"));
    }

    #[test]
    fn test_uri_to_iri() {
        assert_eq!(uri_to_iri("http://ex.org/caf%C3%A9"), "http://ex.org/café");
        assert_eq!(uri_to_iri("http://ex.org/a%20b"), "http://ex.org/a%20b");
    }

    #[test]
    fn test_generalize_numeric_suffix() {
        let mut b = TemplateBuilder::new();
        b.add("http://ex.org/1");
        b.add("http://ex.org/2");
        assert_eq!(b.template("col").unwrap(), "http://ex.org/{col}");
        assert!(b.matches("http://ex.org/300"));
    }

    #[test]
    fn test_generalize_unsafe_middle() {
        let mut b = TemplateBuilder::new();
        b.add("http://ex.org/a/1");
        b.add("http://ex.org/b/2");
        assert_eq!(b.template("col").unwrap(), "http://ex.org/{+col}");
    }

    #[test]
    fn test_generalize_common_suffix_and_partial_token() {
        let mut b = TemplateBuilder::new();
        b.add("http://ex.org/p10.json");
        b.add("http://ex.org/p11.json");
        assert_eq!(b.template("id").unwrap(), "http://ex.org/{id}.json");
    }

    #[test]
    fn test_single_iri_splits_at_last_segment() {
        let mut b = TemplateBuilder::new();
        b.add("http://ex.org/vocab#thing");
        assert_eq!(b.template("v").unwrap(), "http://ex.org/vocab#{v}");
        b.freeze();
        assert!(!b.add("http://other.org/x"));
        assert_eq!(b.template("v").unwrap(), "http://ex.org/vocab#{v}");
    }
}
