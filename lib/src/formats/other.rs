//! String-like and miscellaneous datatypes. Their `format` is a regular expression the whole
//! value must match.

use super::FormatSpec;
use regex::Regex;

lazy_static::lazy_static! {
    static ref LANGUAGE_RE: Regex = Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap();
    static ref NAME_RE: Regex = Regex::new(r"^[\p{L}_:][\p{L}\p{N}._:\-]*$").unwrap();
    static ref NCNAME_RE: Regex = Regex::new(r"^[\p{L}_][\p{L}\p{N}._\-]*$").unwrap();
    static ref NMTOKEN_RE: Regex = Regex::new(r"^[\p{L}\p{N}._:\-]+$").unwrap();
    static ref QNAME_RE: Regex =
        Regex::new(r"^(?:[\p{L}_][\p{L}\p{N}._\-]*:)?[\p{L}_][\p{L}\p{N}._\-]*$").unwrap();
    static ref HEX_RE: Regex = Regex::new(r"^(?:[0-9a-fA-F]{2})*$").unwrap();
    static ref BASE64_RE: Regex =
        Regex::new(r"^(?:[A-Za-z0-9+/]{4})*(?:[A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$").unwrap();
}

fn check_lexical(base: &str, value: &str) -> Result<(), String> {
    let ok = match base {
        "normalizedString" => !value.contains(['\t', '\r', '\n']),
        "token" => {
            !value.contains(['\t', '\r', '\n'])
                && !value.starts_with(' ')
                && !value.ends_with(' ')
                && !value.contains("  ")
        }
        "language" => LANGUAGE_RE.is_match(value),
        "Name" => NAME_RE.is_match(value),
        "NCName" => NCNAME_RE.is_match(value),
        "NMTOKEN" => NMTOKEN_RE.is_match(value),
        "QName" => QNAME_RE.is_match(value),
        "hexBinary" => HEX_RE.is_match(value),
        "base64Binary" => BASE64_RE.is_match(value),
        "json" => serde_json::from_str::<serde_json::Value>(value).is_ok(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("'{value}' is not a valid {base}"))
    }
}

pub fn parse(base: &str, value: &str, format: Option<&FormatSpec>) -> Result<String, String> {
    check_lexical(base, value)?;
    if let Some(pattern) = format.and_then(|f| f.pattern.as_deref()) {
        let re = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| format!("invalid format '{pattern}': {e}"))?;
        if !re.is_match(value) {
            return Err(format!("'{value}' does not match the format '{pattern}'"));
        }
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical_checks() {
        assert!(parse("token", "a b", None).is_ok());
        assert!(parse("token", " a", None).is_err());
        assert!(parse("language", "en-GB", None).is_ok());
        assert!(parse("NCName", "a:b", None).is_err());
        assert!(parse("hexBinary", "0FB7", None).is_ok());
        assert!(parse("hexBinary", "0FB", None).is_err());
        assert!(parse("base64Binary", "aGk=", None).is_ok());
        assert!(parse("json", "{\"a\": 1}", None).is_ok());
        assert!(parse("json", "{a}", None).is_err());
        assert!(parse("string", "anything\tgoes", None).is_ok());
    }

    #[test]
    fn test_regex_format() {
        let f = FormatSpec::pattern("[A-Z]{3}");
        assert!(parse("string", "ABC", Some(&f)).is_ok());
        assert!(parse("string", "ABCD", Some(&f)).is_err());
    }
}
