//! Prometheus text exposition parsing
//!
//! Parses single sample lines of the form
//! `name{key="value",...} value [timestamp]`. Comment lines, blank lines
//! and anything malformed yield `None` so a scrape can skip them and
//! carry on.

use std::collections::HashMap;

/// One parsed exposition sample
#[derive(Debug, Clone, PartialEq)]
pub struct ExpositionSample {
    pub metric: String,
    pub labels: HashMap<String, String>,
    pub value: f64,
    /// Milliseconds since the epoch
    pub timestamp_ms: i64,
}

impl ExpositionSample {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Parse one exposition line
///
/// `default_timestamp_ms` is used when the line carries no timestamp.
pub fn parse_line(line: &str, default_timestamp_ms: i64) -> Option<ExpositionSample> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let brace = line.find('{')?;
    let metric = line[..brace].trim();
    if metric.is_empty() || !metric.chars().all(is_metric_char) {
        return None;
    }

    let (labels, rest) = parse_labels(&line[brace + 1..])?;

    let mut fields = rest.split_whitespace();
    let value = parse_value(fields.next()?)?;
    let timestamp_ms = match fields.next() {
        Some(ts) => ts.parse::<i64>().ok()?,
        None => default_timestamp_ms,
    };
    if fields.next().is_some() {
        return None;
    }

    Some(ExpositionSample {
        metric: metric.to_string(),
        labels,
        value,
        timestamp_ms,
    })
}

fn is_metric_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

/// Parse `key="value",...}` and return the labels plus the text after `}`
fn parse_labels(input: &str) -> Option<(HashMap<String, String>, &str)> {
    let mut labels = HashMap::new();
    let mut rest = input.trim_start();

    loop {
        if let Some(after) = rest.strip_prefix('}') {
            return Some((labels, after));
        }

        let eq = rest.find('=')?;
        let key = rest[..eq].trim();
        if key.is_empty() {
            return None;
        }

        let (value, after) = parse_quoted(rest[eq + 1..].trim_start())?;
        labels.insert(key.to_string(), value);

        rest = after.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after.trim_start();
        } else if !rest.starts_with('}') {
            return None;
        }
    }
}

/// Parse a double-quoted label value with `\"`, `\\` and `\n` escapes
fn parse_quoted(input: &str) -> Option<(String, &str)> {
    let body = input.strip_prefix('"')?;
    let mut value = String::new();
    let mut chars = body.char_indices();

    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Some((value, &body[idx + 1..])),
            '\\' => match chars.next()?.1 {
                'n' => value.push('\n'),
                escaped => value.push(escaped),
            },
            _ => value.push(c),
        }
    }

    None
}

fn parse_value(raw: &str) -> Option<f64> {
    match raw {
        "+Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        _ => raw.parse().ok(),
    }
}
