use super::FormatSpec;

/// Splits a `true|false` style format into its true and false representations.
fn split_format(format: &FormatSpec) -> Option<(&str, &str)> {
    format.pattern.as_deref()?.split_once('|')
}

pub fn parse(value: &str, format: Option<&FormatSpec>) -> Result<String, String> {
    if let Some((t, f)) = format.and_then(split_format) {
        return if value == t {
            Ok("true".to_string())
        } else if value == f {
            Ok("false".to_string())
        } else {
            Err(format!("'{value}' is neither '{t}' nor '{f}'"))
        };
    }
    match value {
        "true" | "1" => Ok("true".to_string()),
        "false" | "0" => Ok("false".to_string()),
        _ => Err(format!("'{value}' is not a valid boolean")),
    }
}

pub fn format(lexical: &str, format: &FormatSpec) -> String {
    match split_format(format) {
        Some((t, _)) if lexical == "true" || lexical == "1" => t.to_string(),
        Some((_, f)) if lexical == "false" || lexical == "0" => f.to_string(),
        _ => lexical.to_string(),
    }
}
