use super::FormatSpec;
use regex::Regex;
use std::cmp::Ordering;

lazy_static::lazy_static! {
    static ref DURATION_RE: Regex = Regex::new(
        r"^(-)?P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)D)?(T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$"
    )
    .unwrap();
}

/// A duration split into its month and second components, which are not comparable with
/// each other.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Components {
    months: i64,
    seconds: f64,
}

fn components(lexical: &str) -> Option<(Components, bool, bool)> {
    let caps = DURATION_RE.captures(lexical)?;
    let int = |i: usize| -> Option<i64> { caps.get(i).and_then(|m| m.as_str().parse().ok()) };
    let has_date = caps.get(2).is_some() || caps.get(3).is_some() || caps.get(4).is_some();
    let has_time = caps.get(6).is_some() || caps.get(7).is_some() || caps.get(8).is_some();
    if !has_date && !has_time {
        return None;
    }
    // a 'T' must be followed by at least one time component
    if caps.get(5).is_some() && !has_time {
        return None;
    }
    let sign = if caps.get(1).is_some() { -1 } else { 1 };
    let months = int(2).unwrap_or(0) * 12 + int(3).unwrap_or(0);
    let seconds = int(4).unwrap_or(0) as f64 * 86_400.0
        + int(6).unwrap_or(0) as f64 * 3_600.0
        + int(7).unwrap_or(0) as f64 * 60.0
        + caps
            .get(8)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0);
    let year_month = caps.get(2).is_some() || caps.get(3).is_some();
    let day_time = caps.get(4).is_some() || has_time;
    Some((
        Components {
            months: sign * months,
            seconds: sign as f64 * seconds,
        },
        year_month,
        day_time,
    ))
}

pub fn parse(base: &str, value: &str, format: Option<&FormatSpec>) -> Result<String, String> {
    if let Some(pattern) = format.and_then(|f| f.pattern.as_deref()) {
        let re = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| e.to_string())?;
        if !re.is_match(value) {
            return Err(format!("'{value}' does not match the format '{pattern}'"));
        }
    }
    let (_, year_month, day_time) =
        components(value).ok_or_else(|| format!("'{value}' is not a valid {base}"))?;
    match base {
        "dayTimeDuration" if year_month => Err(format!(
            "'{value}' is not a valid dayTimeDuration: year or month component present"
        )),
        "yearMonthDuration" if day_time => Err(format!(
            "'{value}' is not a valid yearMonthDuration: day or time component present"
        )),
        _ => Ok(value.to_string()),
    }
}

pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    let (x, _, _) = components(a)?;
    let (y, _, _) = components(b)?;
    if x.months == y.months {
        x.seconds.partial_cmp(&y.seconds)
    } else if x.seconds == y.seconds {
        Some(x.months.cmp(&y.months))
    } else {
        let months = x.months.cmp(&y.months);
        let seconds = x.seconds.partial_cmp(&y.seconds)?;
        if months == seconds {
            Some(months)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert!(parse("duration", "P1Y2M3DT4H5M6.5S", None).is_ok());
        assert!(parse("duration", "-PT1S", None).is_ok());
        assert!(parse("duration", "P", None).is_err());
        assert!(parse("duration", "P1DT", None).is_err());
        assert!(parse("dayTimeDuration", "P1M", None).is_err());
        assert!(parse("yearMonthDuration", "P1Y6M", None).is_ok());
        assert!(parse("yearMonthDuration", "P1D", None).is_err());
    }

    #[test]
    fn test_parse_with_format() {
        let f = FormatSpec::pattern(r"P\d+D");
        assert!(parse("duration", "P3D", Some(&f)).is_ok());
        assert!(parse("duration", "PT3H", Some(&f)).is_err());
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare("PT1H", "PT30M"), Some(Ordering::Greater));
        assert_eq!(compare("P1Y", "P12M"), Some(Ordering::Equal));
        assert_eq!(compare("P1M", "P30D"), None);
    }
}
