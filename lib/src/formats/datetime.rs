//! Date and time values: XSD lexical validation, UAX #35 style `format` patterns
//! (`yyyy-MM-dd`, `HH:mm:ss.SSS`, `X`/`x` time zones, ...) and comparisons for range checks.

use super::FormatSpec;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::cmp::Ordering;

pub fn is_datetime_type(base: &str) -> bool {
    matches!(
        base,
        "date"
            | "dateTime"
            | "dateTimeStamp"
            | "time"
            | "gYear"
            | "gYearMonth"
            | "gMonth"
            | "gMonthDay"
            | "gDay"
    )
}

/// Components of a date/time value; absent fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Parts {
    year: Option<String>,
    month: Option<u32>,
    day: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
    fraction: Option<String>,
    tz: Option<String>,
}

const TZ: &str = r"(?P<tz>Z|[+-]\d{2}:\d{2})?";

lazy_static::lazy_static! {
    static ref XSD_FORMS: Vec<(&'static str, Regex)> = [
        ("date", format!(r"^(?P<year>-?\d{{4,}})-(?P<month>\d{{2}})-(?P<day>\d{{2}}){TZ}$")),
        ("dateTime", format!(r"^(?P<year>-?\d{{4,}})-(?P<month>\d{{2}})-(?P<day>\d{{2}})T(?P<hour>\d{{2}}):(?P<minute>\d{{2}}):(?P<second>\d{{2}})(?:\.(?P<fraction>\d+))?{TZ}$")),
        ("time", format!(r"^(?P<hour>\d{{2}}):(?P<minute>\d{{2}}):(?P<second>\d{{2}})(?:\.(?P<fraction>\d+))?{TZ}$")),
        ("gYear", format!(r"^(?P<year>-?\d{{4,}}){TZ}$")),
        ("gYearMonth", format!(r"^(?P<year>-?\d{{4,}})-(?P<month>\d{{2}}){TZ}$")),
        ("gMonth", format!(r"^--(?P<month>\d{{2}}){TZ}$")),
        ("gMonthDay", format!(r"^--(?P<month>\d{{2}})-(?P<day>\d{{2}}){TZ}$")),
        ("gDay", format!(r"^---(?P<day>\d{{2}}){TZ}$")),
    ]
    .into_iter()
    .map(|(name, re)| (name, Regex::new(&re).unwrap()))
    .collect();
}

fn xsd_form(base: &str) -> Option<&'static Regex> {
    let key = if base == "dateTimeStamp" { "dateTime" } else { base };
    XSD_FORMS.iter().find(|(n, _)| *n == key).map(|(_, re)| re)
}

fn parts_from_captures(caps: &regex::Captures) -> Result<Parts, String> {
    let num = |name: &str| -> Result<Option<u32>, String> {
        caps.name(name)
            .map(|m| m.as_str().parse::<u32>().map_err(|e| e.to_string()))
            .transpose()
    };
    Ok(Parts {
        year: caps.name("year").map(|m| m.as_str().to_string()),
        month: num("month")?,
        day: num("day")?,
        hour: num("hour")?,
        minute: num("minute")?,
        second: num("second")?,
        fraction: caps.name("fraction").map(|m| m.as_str().to_string()),
        tz: caps.name("tz").map(|m| normalize_tz(m.as_str())),
    })
}

/// Normalises `+hh`, `+hhmm` and `+hh:mm` offsets to `+hh:mm`; `Z` is kept.
fn normalize_tz(tz: &str) -> String {
    if tz == "Z" {
        return tz.to_string();
    }
    let (sign, rest) = tz.split_at(1);
    let digits: String = rest.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        2 => format!("{sign}{digits}:00"),
        4 => format!("{sign}{}:{}", &digits[..2], &digits[2..]),
        _ => tz.to_string(),
    }
}

fn validate(parts: &Parts) -> Result<(), String> {
    let year: i32 = match &parts.year {
        Some(y) => y.parse().map_err(|_| format!("invalid year '{y}'"))?,
        None => 2000,
    };
    if let Some(month) = parts.month {
        if !(1..=12).contains(&month) {
            return Err(format!("invalid month {month}"));
        }
        if let Some(day) = parts.day {
            if NaiveDate::from_ymd_opt(year, month, day).is_none() {
                return Err(format!("invalid day {day} for month {month}"));
            }
        }
    } else if let Some(day) = parts.day {
        if !(1..=31).contains(&day) {
            return Err(format!("invalid day {day}"));
        }
    }
    if let (Some(h), Some(m)) = (parts.hour, parts.minute) {
        let s = parts.second.unwrap_or(0);
        let midnight = h == 24 && m == 0 && s == 0;
        if !midnight && NaiveTime::from_hms_opt(h, m, s).is_none() {
            return Err(format!("invalid time {h:02}:{m:02}:{s:02}"));
        }
    }
    if let Some(tz) = &parts.tz {
        if tz != "Z" {
            let hours: u32 = tz[1..3].parse().unwrap_or(99);
            let minutes: u32 = tz[4..].parse().unwrap_or(99);
            if hours > 14 || minutes > 59 || (hours == 14 && minutes > 0) {
                return Err(format!("invalid time zone {tz}"));
            }
        }
    }
    Ok(())
}

fn to_lexical(base: &str, p: &Parts) -> Result<String, String> {
    let year = || {
        p.year
            .clone()
            .ok_or_else(|| format!("missing year for {base}"))
    };
    let two = |v: Option<u32>, what: &str| -> Result<String, String> {
        v.map(|v| format!("{v:02}"))
            .ok_or_else(|| format!("missing {what} for {base}"))
    };
    let time = || -> Result<String, String> {
        let mut t = format!(
            "{}:{}:{}",
            two(p.hour, "hour")?,
            two(p.minute, "minute")?,
            two(Some(p.second.unwrap_or(0)), "second")?
        );
        if let Some(f) = &p.fraction {
            t.push('.');
            t.push_str(f);
        }
        Ok(t)
    };
    let mut out = match base {
        "date" => format!("{}-{}-{}", year()?, two(p.month, "month")?, two(p.day, "day")?),
        "dateTime" | "dateTimeStamp" => format!(
            "{}-{}-{}T{}",
            year()?,
            two(p.month, "month")?,
            two(p.day, "day")?,
            time()?
        ),
        "time" => time()?,
        "gYear" => year()?,
        "gYearMonth" => format!("{}-{}", year()?, two(p.month, "month")?),
        "gMonth" => format!("--{}", two(p.month, "month")?),
        "gMonthDay" => format!("--{}-{}", two(p.month, "month")?, two(p.day, "day")?),
        "gDay" => format!("---{}", two(p.day, "day")?),
        other => return Err(format!("{other} is not a date/time type")),
    };
    if let Some(tz) = &p.tz {
        out.push_str(tz);
    } else if base == "dateTimeStamp" {
        return Err("dateTimeStamp requires a time zone".to_string());
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Field(char, usize),
    Literal(String),
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = vec![];
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            let mut lit = String::new();
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                lit.push(chars[i]);
                i += 1;
            }
            i += 1;
            tokens.push(Token::Literal(lit));
        } else if "yMdHmsSXx".contains(c) {
            let mut n = 1;
            while i + n < chars.len() && chars[i + n] == c {
                n += 1;
            }
            tokens.push(Token::Field(c, n));
            i += n;
        } else {
            match tokens.last_mut() {
                Some(Token::Literal(l)) => l.push(c),
                _ => tokens.push(Token::Literal(c.to_string())),
            }
            i += 1;
        }
    }
    tokens
}

fn pattern_regex(tokens: &[Token]) -> Result<Regex, String> {
    let mut re = String::from("^");
    for token in tokens {
        match token {
            Token::Literal(l) => re.push_str(&regex::escape(l)),
            Token::Field(c, n) => {
                let part = match (c, n) {
                    ('y', _) => r"(?P<year>-?\d{4,})".to_string(),
                    ('M', 1) => r"(?P<month>\d{1,2})".to_string(),
                    ('M', _) => r"(?P<month>\d{2})".to_string(),
                    ('d', 1) => r"(?P<day>\d{1,2})".to_string(),
                    ('d', _) => r"(?P<day>\d{2})".to_string(),
                    ('H', 1) => r"(?P<hour>\d{1,2})".to_string(),
                    ('H', _) => r"(?P<hour>\d{2})".to_string(),
                    ('m', _) => r"(?P<minute>\d{2})".to_string(),
                    ('s', _) => r"(?P<second>\d{2})".to_string(),
                    ('S', n) => format!(r"(?P<fraction>\d{{1,{n}}})"),
                    ('X', 1) => r"(?P<tz>Z|[+-]\d{2}(?:\d{2})?)".to_string(),
                    ('X', 2) => r"(?P<tz>Z|[+-]\d{4})".to_string(),
                    ('X', _) => r"(?P<tz>Z|[+-]\d{2}:\d{2})".to_string(),
                    ('x', 1) => r"(?P<tz>[+-]\d{2}(?:\d{2})?)".to_string(),
                    ('x', 2) => r"(?P<tz>[+-]\d{4})".to_string(),
                    ('x', _) => r"(?P<tz>[+-]\d{2}:\d{2})".to_string(),
                    (other, _) => return Err(format!("unsupported date field '{other}'")),
                };
                re.push_str(&part);
            }
        }
    }
    // a time zone may be appended to any pattern that does not declare one
    if !tokens
        .iter()
        .any(|t| matches!(t, Token::Field('X', _) | Token::Field('x', _)))
    {
        re.push_str(r"(?P<tz>Z|[+-]\d{2}:\d{2})?");
    }
    re.push('$');
    Regex::new(&re).map_err(|e| e.to_string())
}

pub fn parse(base: &str, value: &str, format: Option<&FormatSpec>) -> Result<String, String> {
    let parts = match format.and_then(|f| f.pattern.as_deref()) {
        Some(pattern) => {
            let re = pattern_regex(&tokenize(pattern))?;
            let caps = re
                .captures(value)
                .ok_or_else(|| format!("'{value}' does not match the format '{pattern}'"))?;
            parts_from_captures(&caps)?
        }
        None => {
            let re = xsd_form(base).ok_or_else(|| format!("{base} is not a date/time type"))?;
            let caps = re
                .captures(value)
                .ok_or_else(|| format!("'{value}' is not a valid {base}"))?;
            parts_from_captures(&caps)?
        }
    };
    validate(&parts).map_err(|e| format!("'{value}' is not a valid {base}: {e}"))?;
    to_lexical(base, &parts)
}

/// Renders a canonical value with a UAX #35 pattern.
pub fn format(base: &str, lexical: &str, format: &FormatSpec) -> String {
    let Some(pattern) = format.pattern.as_deref() else {
        return lexical.to_string();
    };
    let Some(parts) = xsd_form(base)
        .and_then(|re| re.captures(lexical))
        .and_then(|caps| parts_from_captures(&caps).ok())
    else {
        return lexical.to_string();
    };
    let mut out = String::new();
    for token in tokenize(pattern) {
        match token {
            Token::Literal(l) => out.push_str(&l),
            Token::Field(c, n) => {
                let text = match c {
                    'y' => parts.year.clone().unwrap_or_default(),
                    'M' => pad(parts.month, n),
                    'd' => pad(parts.day, n),
                    'H' => pad(parts.hour, n),
                    'm' => pad(parts.minute, n),
                    's' => pad(parts.second, n),
                    'S' => {
                        let mut f = parts.fraction.clone().unwrap_or_default();
                        f.truncate(n);
                        f
                    }
                    'X' | 'x' => render_tz(parts.tz.as_deref(), c, n),
                    _ => String::new(),
                };
                out.push_str(&text);
            }
        }
    }
    out
}

fn pad(v: Option<u32>, n: usize) -> String {
    match v {
        Some(v) if n >= 2 => format!("{v:02}"),
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

fn render_tz(tz: Option<&str>, c: char, n: usize) -> String {
    let Some(tz) = tz else {
        return String::new();
    };
    let tz = if tz == "Z" {
        if c == 'X' {
            return "Z".to_string();
        }
        "+00:00"
    } else {
        tz
    };
    match n {
        1 if tz.ends_with(":00") => tz[..3].to_string(),
        1 | 2 => tz.replace(':', ""),
        _ => tz.to_string(),
    }
}

fn offset_seconds(tz: &str) -> i64 {
    if tz == "Z" || tz.len() < 6 {
        return 0;
    }
    let sign = if tz.starts_with('-') { -1 } else { 1 };
    let hours: i64 = tz[1..3].parse().unwrap_or(0);
    let minutes: i64 = tz[4..6].parse().unwrap_or(0);
    sign * (hours * 3600 + minutes * 60)
}

fn comparable(base: &str, lexical: &str) -> Option<NaiveDateTime> {
    match base {
        "dateTime" | "dateTimeStamp" => DateTime::parse_from_rfc3339(lexical)
            .map(|dt| dt.naive_utc())
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(lexical, "%Y-%m-%dT%H:%M:%S%.f").ok()
            }),
        "date" => {
            let parts = parts_from_captures(&xsd_form(base)?.captures(lexical)?).ok()?;
            let date = NaiveDate::parse_from_str(&lexical[..10.min(lexical.len())], "%Y-%m-%d").ok()?;
            let midnight = date.and_hms_opt(0, 0, 0)?;
            Some(midnight - chrono::Duration::seconds(offset_seconds(parts.tz.as_deref().unwrap_or("Z"))))
        }
        "time" => {
            let parts = parts_from_captures(&xsd_form(base)?.captures(lexical)?).ok()?;
            let time = NaiveTime::from_hms_opt(parts.hour?, parts.minute?, parts.second?)?;
            let base_date = NaiveDate::from_ymd_opt(2000, 1, 1)?;
            Some(
                base_date.and_time(time)
                    - chrono::Duration::seconds(offset_seconds(parts.tz.as_deref().unwrap_or("Z"))),
            )
        }
        _ => None,
    }
}

pub fn compare(base: &str, a: &str, b: &str) -> Option<Ordering> {
    match (comparable(base, a), comparable(base, b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ if base.starts_with('g') => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_xsd_forms() {
        assert_eq!(parse("date", "2015-03-22", None).unwrap(), "2015-03-22");
        assert_eq!(
            parse("dateTime", "2015-03-22T10:20:30.5Z", None).unwrap(),
            "2015-03-22T10:20:30.5Z"
        );
        assert_eq!(parse("gMonthDay", "--02-29", None).unwrap(), "--02-29");
        assert!(parse("date", "2015-02-30", None).is_err());
        assert!(parse("time", "25:00:00", None).is_err());
        assert!(parse("dateTimeStamp", "2015-03-22T10:20:30", None).is_err());
    }

    #[test]
    fn test_parse_with_pattern() {
        let f = FormatSpec::pattern("dd.MM.yyyy");
        assert_eq!(parse("date", "22.03.2015", Some(&f)).unwrap(), "2015-03-22");
        let f = FormatSpec::pattern("M/d/yyyy");
        assert_eq!(parse("date", "3/7/2015", Some(&f)).unwrap(), "2015-03-07");
        let f = FormatSpec::pattern("yyyy-MM-dd HH:mm:ss.SSSX");
        assert_eq!(
            parse("dateTime", "2015-03-22 10:20:30.123+0100", Some(&f)).unwrap(),
            "2015-03-22T10:20:30.123+01:00"
        );
        let f = FormatSpec::pattern("HHmm");
        assert_eq!(parse("time", "0930", Some(&f)).unwrap(), "09:30:00");
        assert!(parse("date", "2015-03-22", Some(&FormatSpec::pattern("dd.MM.yyyy"))).is_err());
    }

    #[test]
    fn test_format_with_pattern() {
        let f = FormatSpec::pattern("dd.MM.yyyy");
        assert_eq!(format("date", "2015-03-22", &f), "22.03.2015");
        let f = FormatSpec::pattern("yyyy-MM-dd'T'HH:mmXXX");
        assert_eq!(
            format("dateTime", "2015-03-22T10:20:00+01:00", &f),
            "2015-03-22T10:20+01:00"
        );
    }

    #[test]
    fn test_compare() {
        assert_eq!(
            compare("date", "2015-01-01", "2016-01-01"),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare("dateTime", "2015-01-01T10:00:00+01:00", "2015-01-01T09:00:00Z"),
            Some(Ordering::Equal)
        );
    }
}
