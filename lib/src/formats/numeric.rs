//! Numeric parsing and formatting following the LDML number pattern subset used by CSVW
//! (`#`, `0`, grouping, decimal separator, exponent, percent and per-mille signs).

use super::{derives_from, FormatSpec};
use regex::Regex;
use std::cmp::Ordering;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct NumberPattern {
    prefix: String,
    suffix: String,
    int_min: usize,
    primary_group: Option<usize>,
    secondary_group: Option<usize>,
    frac_min: usize,
    frac_max: usize,
    exp_min: Option<usize>,
}

fn is_number_char(c: char) -> bool {
    matches!(c, '#' | '0' | ',' | '.' | 'E' | '+')
}

impl NumberPattern {
    fn parse(pattern: &str) -> Result<Self, String> {
        let start = pattern
            .find(|c: char| matches!(c, '#' | '0'))
            .ok_or_else(|| format!("invalid number pattern '{pattern}'"))?;
        let end = pattern[start..]
            .find(|c: char| !is_number_char(c))
            .map(|i| start + i)
            .unwrap_or(pattern.len());
        let body = &pattern[start..end];
        let (mantissa, exponent) = match body.split_once('E') {
            Some((m, e)) => (m, Some(e.trim_start_matches('+'))),
            None => (body, None),
        };
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        let groups: Vec<&str> = int_part.split(',').collect();
        let (primary_group, secondary_group) = match groups.len() {
            0 | 1 => (None, None),
            2 => (Some(groups[1].len()), None),
            n => (Some(groups[n - 1].len()), Some(groups[n - 2].len())),
        };
        if primary_group == Some(0) {
            return Err(format!("invalid grouping in number pattern '{pattern}'"));
        }
        let frac_digits: String = frac_part.chars().filter(|c| *c != ',').collect();
        if frac_digits.contains('0') && frac_digits.trim_start_matches('0').contains('0') {
            return Err(format!("invalid fraction in number pattern '{pattern}'"));
        }
        Ok(Self {
            prefix: pattern[..start].to_string(),
            suffix: pattern[end..].to_string(),
            int_min: int_part.chars().filter(|c| *c == '0').count(),
            primary_group,
            secondary_group,
            frac_min: frac_digits.chars().filter(|c| *c == '0').count(),
            frac_max: frac_digits.len(),
            exp_min: exponent.map(|e| e.len()),
        })
    }

    fn scale(&self) -> i32 {
        if self.prefix.contains('%') || self.suffix.contains('%') {
            2
        } else if self.prefix.contains('‰') || self.suffix.contains('‰') {
            3
        } else {
            0
        }
    }

    fn regex(&self, decimal: &str, group: Option<&str>) -> Result<Regex, String> {
        let d = regex::escape(decimal);
        let int_re = match (self.primary_group, group) {
            (Some(p), Some(g)) => {
                let g = regex::escape(g);
                let s = self.secondary_group.unwrap_or(p);
                format!(r"(?:\d{{1,{s}}}(?:{g}\d{{{s}}})*{g}\d{{{p}}}|\d{{1,{p}}})?")
            }
            _ => r"\d*".to_string(),
        };
        let frac_re = if self.frac_max == 0 {
            String::new()
        } else if self.frac_min == 0 {
            format!(r"(?:{d}(\d{{0,{}}}))?", self.frac_max)
        } else {
            format!(r"{d}(\d{{{},{}}})", self.frac_min, self.frac_max)
        };
        let exp_re = match self.exp_min {
            Some(min) => format!(r"E([+-]?\d{{{min},}})"),
            None => String::new(),
        };
        let sign_re = if self.prefix.contains(['+', '-']) {
            ""
        } else {
            "([+-])?"
        };
        let pattern = format!(
            "^{}{sign_re}({int_re}){frac_re}{exp_re}{}$",
            regex::escape(&self.prefix),
            regex::escape(&self.suffix)
        );
        Regex::new(&pattern).map_err(|e| e.to_string())
    }
}

/// Moves the decimal point of a plain decimal string `places` digits to the left.
fn shift_left(value: &str, places: usize) -> String {
    let (sign, digits) = match value.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", value),
    };
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
    let padded = format!("{:0>width$}", int, width = places + 1);
    let split = padded.len() - places;
    let new_int = padded[..split].trim_start_matches('0');
    let new_frac = format!("{}{}", &padded[split..], frac);
    let new_frac = new_frac.trim_end_matches('0');
    let new_int = if new_int.is_empty() { "0" } else { new_int };
    if new_frac.is_empty() {
        format!("{sign}{new_int}")
    } else {
        format!("{sign}{new_int}.{new_frac}")
    }
}

/// Moves the decimal point of a plain decimal string `places` digits to the right.
fn shift_right(value: &str, places: usize) -> String {
    let (sign, digits) = match value.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", value),
    };
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
    let padded = format!("{:0<width$}", frac, width = places);
    let new_int = format!("{int}{}", &padded[..places]);
    let new_int = new_int.trim_start_matches('0');
    let new_int = if new_int.is_empty() { "0" } else { new_int };
    let rest = padded[places..].trim_end_matches('0');
    if rest.is_empty() {
        format!("{sign}{new_int}")
    } else {
        format!("{sign}{new_int}.{rest}")
    }
}

lazy_static::lazy_static! {
    static ref DECIMAL_RE: Regex = Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").unwrap();
    static ref DOUBLE_RE: Regex =
        Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").unwrap();
}

fn integer_bounds(base: &str) -> (Option<i128>, Option<i128>) {
    match base {
        "long" => (Some(i64::MIN as i128), Some(i64::MAX as i128)),
        "int" => (Some(i32::MIN as i128), Some(i32::MAX as i128)),
        "short" => (Some(i16::MIN as i128), Some(i16::MAX as i128)),
        "byte" => (Some(i8::MIN as i128), Some(i8::MAX as i128)),
        "unsignedLong" => (Some(0), Some(u64::MAX as i128)),
        "unsignedInt" => (Some(0), Some(u32::MAX as i128)),
        "unsignedShort" => (Some(0), Some(u16::MAX as i128)),
        "unsignedByte" => (Some(0), Some(u8::MAX as i128)),
        "nonNegativeInteger" => (Some(0), None),
        "positiveInteger" => (Some(1), None),
        "nonPositiveInteger" => (None, Some(0)),
        "negativeInteger" => (None, Some(-1)),
        _ => (None, None),
    }
}

fn canonical_integer(value: &str) -> String {
    let (sign, digits) = match value.as_bytes().first() {
        Some(b'-') => ("-", &value[1..]),
        Some(b'+') => ("", &value[1..]),
        _ => ("", value),
    };
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        "0".to_string()
    } else {
        format!("{sign}{digits}")
    }
}

/// Extracts a plain XSD numeric lexical form from `value`, honouring the format if present.
fn normalize(value: &str, format: Option<&FormatSpec>) -> Result<String, String> {
    let decimal = format
        .and_then(|f| f.decimal_char.as_deref())
        .unwrap_or(".");
    let group = format.and_then(|f| f.group_char.as_deref());
    if let Some(pattern) = format.and_then(|f| f.pattern.as_deref()) {
        let parsed = NumberPattern::parse(pattern)?;
        let re = parsed.regex(decimal, group)?;
        let caps = re
            .captures(value)
            .ok_or_else(|| format!("'{value}' does not match the pattern '{pattern}'"))?;
        // groups: sign?, integer, fraction?, exponent?
        let mut idx = 1;
        let sign = if parsed.prefix.contains('-') {
            "-".to_string()
        } else if parsed.prefix.contains(['+', '-']) {
            String::new()
        } else {
            idx += 1;
            caps.get(1)
                .map(|m| m.as_str().trim_start_matches('+').to_string())
                .unwrap_or_default()
        };
        let int: String = caps
            .get(idx)
            .map(|m| m.as_str().chars().filter(char::is_ascii_digit).collect())
            .unwrap_or_default();
        idx += 1;
        let frac = if parsed.frac_max > 0 {
            let f = caps.get(idx).map(|m| m.as_str()).unwrap_or_default();
            idx += 1;
            f.to_string()
        } else {
            String::new()
        };
        let exp = if parsed.exp_min.is_some() {
            caps.get(idx).map(|m| m.as_str().to_string())
        } else {
            None
        };
        if int.len() < parsed.int_min || (int.is_empty() && frac.is_empty()) {
            return Err(format!("'{value}' does not match the pattern '{pattern}'"));
        }
        let mut out = format!("{sign}{}", if int.is_empty() { "0" } else { &int });
        if !frac.is_empty() {
            out.push('.');
            out.push_str(&frac);
        }
        let scale = parsed.scale();
        if scale > 0 {
            out = shift_left(&out, scale as usize);
        }
        if let Some(exp) = exp {
            out.push('E');
            out.push_str(&exp);
        }
        return Ok(out);
    }

    let mut text = value.to_string();
    if let Some(g) = group {
        text = text.replace(g, "");
    }
    if decimal != "." {
        if text.contains('.') {
            return Err(format!("'{value}' contains an unexpected '.'"));
        }
        text = text.replace(decimal, ".");
    }
    let scale = if let Some(t) = text.strip_suffix('%') {
        text = t.to_string();
        2
    } else if let Some(t) = text.strip_suffix('‰') {
        text = t.to_string();
        3
    } else {
        0
    };
    if scale > 0 {
        if !DECIMAL_RE.is_match(&text) {
            return Err(format!("'{value}' is not a number"));
        }
        text = shift_left(&text, scale);
    }
    Ok(text)
}

pub fn parse(base: &str, value: &str, format: Option<&FormatSpec>) -> Result<String, String> {
    if matches!(base, "double" | "float") && matches!(value, "NaN" | "INF" | "-INF") {
        return Ok(value.to_string());
    }
    let text = normalize(value, format)?;
    if derives_from(base, "integer") {
        if !text.trim_start_matches(['+', '-']).chars().all(|c| c.is_ascii_digit())
            || text.trim_start_matches(['+', '-']).is_empty()
        {
            return Err(format!("'{value}' is not a valid {base}"));
        }
        let canonical = canonical_integer(&text);
        let (min, max) = integer_bounds(base);
        if min.is_some() || max.is_some() {
            let parsed: i128 = canonical
                .parse()
                .map_err(|_| format!("'{value}' is out of range for {base}"))?;
            if min.is_some_and(|m| parsed < m) || max.is_some_and(|m| parsed > m) {
                return Err(format!("'{value}' is out of range for {base}"));
            }
        }
        return Ok(canonical);
    }
    if base == "decimal" {
        if !DECIMAL_RE.is_match(&text) {
            return Err(format!("'{value}' is not a valid decimal"));
        }
        return Ok(text.trim_start_matches('+').to_string());
    }
    if !DOUBLE_RE.is_match(&text) {
        return Err(format!("'{value}' is not a valid {base}"));
    }
    let number: f64 = text
        .parse()
        .map_err(|_| format!("'{value}' is not a valid {base}"))?;
    if base == "float" && number.is_finite() && number.abs() > f32::MAX as f64 {
        return Err(format!("'{value}' is out of range for float"));
    }
    Ok(text.trim_start_matches('+').to_string())
}

fn group_digits(int: &str, primary: usize, secondary: usize, sep: &str) -> String {
    if int.len() <= primary {
        return int.to_string();
    }
    let (head, tail) = int.split_at(int.len() - primary);
    let mut chunks = vec![tail.to_string()];
    let mut rest = head;
    while rest.len() > secondary {
        let (h, t) = rest.split_at(rest.len() - secondary);
        chunks.push(t.to_string());
        rest = h;
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks.reverse();
    chunks.join(sep)
}

/// Renders a canonical numeric value with the column format.
pub fn format(lexical: &str, format: &FormatSpec) -> String {
    if matches!(lexical, "NaN" | "INF" | "-INF") {
        return lexical.to_string();
    }
    let decimal = format.decimal_char.as_deref().unwrap_or(".");
    let Some(pattern) = format
        .pattern
        .as_deref()
        .and_then(|p| NumberPattern::parse(p).ok())
    else {
        return lexical.replace('.', decimal);
    };
    let (mantissa, exponent) = match lexical.split_once(['e', 'E']) {
        Some((m, e)) => (m, Some(e)),
        None => (lexical, None),
    };
    let mut mantissa = mantissa.to_string();
    let scale = pattern.scale();
    if scale > 0 {
        mantissa = shift_right(&mantissa, scale as usize);
    }
    let negative = mantissa.starts_with('-');
    let digits = mantissa.trim_start_matches(['+', '-']);
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
    let int = int.trim_start_matches('0');
    let int = format!("{:0>width$}", int, width = pattern.int_min.max(1));
    let mut frac = frac.to_string();
    frac.truncate(pattern.frac_max);
    while frac.len() < pattern.frac_min {
        frac.push('0');
    }
    let frac = if frac.len() > pattern.frac_min {
        frac.trim_end_matches('0').to_string()
    } else {
        frac
    };
    let frac = if frac.len() < pattern.frac_min {
        format!("{:0<width$}", frac, width = pattern.frac_min)
    } else {
        frac
    };
    let int = match (pattern.primary_group, format.group_char.as_deref()) {
        (Some(p), Some(g)) => group_digits(&int, p, pattern.secondary_group.unwrap_or(p), g),
        (Some(p), None) => group_digits(&int, p, pattern.secondary_group.unwrap_or(p), ","),
        _ => int,
    };
    let mut out = String::new();
    out.push_str(&pattern.prefix);
    if negative && !pattern.prefix.contains('-') {
        out.push('-');
    }
    out.push_str(&int);
    if !frac.is_empty() {
        out.push_str(decimal);
        out.push_str(&frac);
    }
    if let (Some(_), Some(exp)) = (pattern.exp_min, exponent) {
        out.push('E');
        out.push_str(exp);
    }
    out.push_str(&pattern.suffix);
    out
}

pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    let x: f64 = a.parse().ok().or_else(|| special(a))?;
    let y: f64 = b.parse().ok().or_else(|| special(b))?;
    x.partial_cmp(&y)
}

fn special(v: &str) -> Option<f64> {
    match v {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(pattern: Option<&str>, decimal: Option<&str>, group: Option<&str>) -> FormatSpec {
        FormatSpec {
            pattern: pattern.map(str::to_string),
            decimal_char: decimal.map(str::to_string),
            group_char: group.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_plain() {
        assert_eq!(parse("integer", "+007", None).unwrap(), "7");
        assert_eq!(parse("decimal", "1.50", None).unwrap(), "1.50");
        assert_eq!(parse("double", "1.5E3", None).unwrap(), "1.5E3");
        assert_eq!(parse("double", "NaN", None).unwrap(), "NaN");
        assert!(parse("integer", "1.5", None).is_err());
        assert!(parse("integer", "abc", None).is_err());
        assert!(parse("decimal", "NaN", None).is_err());
    }

    #[test]
    fn test_ranges() {
        assert!(parse("byte", "127", None).is_ok());
        assert!(parse("byte", "128", None).is_err());
        assert!(parse("unsignedShort", "-1", None).is_err());
        assert!(parse("positiveInteger", "0", None).is_err());
        assert_eq!(
            parse("integer", "123456789012345678901234567890123456789012", None).unwrap(),
            "123456789012345678901234567890123456789012"
        );
    }

    #[test]
    fn test_group_and_decimal_chars() {
        let f = spec(None, Some(","), Some("."));
        assert_eq!(parse("decimal", "1.234,5", Some(&f)).unwrap(), "1234.5");
        assert_eq!(parse("decimal", "50%", None).unwrap(), "0.5");
        assert_eq!(parse("decimal", "5‰", None).unwrap(), "0.005");
    }

    #[test]
    fn test_patterns() {
        let f = spec(Some("#,##0.00"), None, Some(","));
        assert_eq!(parse("decimal", "1,234.50", Some(&f)).unwrap(), "1234.50");
        assert!(parse("decimal", "1234.5", Some(&f)).is_err());
        let f = spec(Some("000"), None, None);
        assert_eq!(parse("integer", "012", Some(&f)).unwrap(), "12");
        assert!(parse("integer", "12", Some(&f)).is_err());
        let f = spec(Some("#0.0#E0"), None, None);
        assert_eq!(parse("double", "1.25E3", Some(&f)).unwrap(), "1.25E3");
        let f = spec(Some("#0%"), None, None);
        assert_eq!(parse("decimal", "25%", Some(&f)).unwrap(), "0.25");
    }

    #[test]
    fn test_format_roundtrip_with_pattern() {
        let f = spec(Some("#,##0.00"), None, Some(","));
        assert_eq!(format("1234.5", &f), "1,234.50");
        let f = spec(Some("#0%"), None, None);
        assert_eq!(format("0.25", &f), "25%");
        let f = spec(None, Some(","), None);
        assert_eq!(format("3.5", &f), "3,5");
    }

    #[test]
    fn test_shift() {
        assert_eq!(shift_left("5", 2), "0.05");
        assert_eq!(shift_left("-125.5", 2), "-1.255");
        assert_eq!(shift_right("0.25", 2), "25");
        assert_eq!(shift_right("1.2345", 2), "123.45");
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare("2", "10"), Some(Ordering::Less));
        assert_eq!(compare("INF", "10"), Some(Ordering::Greater));
    }
}
