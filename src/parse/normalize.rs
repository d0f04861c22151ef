//! Strip the punctuation left behind by the extractor and settle the value type.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{ParseError, Stage};
use crate::parse::extract::{ExtractedFields, QuoteStyle};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Numeric,
    Text,
}


#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFields {
    pub host: String,
    pub timestamp: DateTime<Utc>,
    pub value: String,
    pub key: String,
    pub server: String,
    pub kind: ValueKind,
}


pub fn normalize(fields: ExtractedFields) -> Result<NormalizedFields, ParseError> {
    let style = fields.quote_style;

    // `: 42.5, ` -> `42.5`, `: 'cpu.idle', ` -> `cpu.idle`
    let value = unify_quotes(trim_outer(&fields.value, 2, "value")?, style);
    let key = trim_outer(&fields.key, 3, "key")?.to_string();
    if key.is_empty() {
        return Err(ParseError::malformed(Stage::Normalize, "empty key"));
    }

    let host = clean_quoted(&unify_quotes(&fields.host, style), "host")?;
    let server = clean_quoted(&unify_quotes(&fields.server, style), "server")?;
    let timestamp = clean_clock(&unify_quotes(&fields.clock, style))?;

    let kind = if value.contains('\'') {
        ValueKind::Text
    } else {
        ValueKind::Numeric
    };

    Ok(NormalizedFields { host, timestamp, value, key, server, kind })
}

/// Translate double-quoted text into the single-quoted form the rest of the
/// normalizer works with.
fn unify_quotes(raw: &str, style: QuoteStyle) -> String {
    match style {
        QuoteStyle::Double => raw.replace('"', "'"),
        QuoteStyle::Single => raw.to_string(),
    }
}

/// Drop `n` characters from each end of `raw`.
fn trim_outer<'a>(raw: &'a str, n: usize, what: &str) -> Result<&'a str, ParseError> {
    let too_short = || ParseError::malformed(Stage::Normalize, format!("{} substring {:?} too short", what, raw));

    let start = raw.char_indices().nth(n).map(|(i, _)| i).unwrap_or_else(|| raw.len());
    let end = if n == 0 {
        raw.len()
    } else {
        raw.char_indices().rev().nth(n - 1).map(|(i, _)| i).ok_or_else(too_short)?
    };
    if raw.chars().count() < 2 * n || start > end {
        return Err(too_short());
    }
    Ok(&raw[start..end])
}

/// Text between the first pair of single quotes.
fn clean_quoted(raw: &str, what: &str) -> Result<String, ParseError> {
    raw.split('\'')
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| ParseError::malformed(Stage::Normalize, format!("{} substring {:?} is not quoted", what, raw)))
}

fn clean_clock(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    let digits = trim_outer(raw, 2, "clock")?;
    let digits = if digits.len() >= 2 && digits.starts_with('\'') && digits.ends_with('\'') {
        &digits[1..digits.len() - 1]
    } else {
        digits
    };

    let secs = digits.parse::<i64>().map_err(|e| ParseError::Timestamp {
        input: digits.to_string(),
        reason: e.to_string(),
    })?;
    Utc.timestamp_opt(secs, 0).single().ok_or_else(|| ParseError::Timestamp {
        input: digits.to_string(),
        reason: "out of range for a timestamp".to_string(),
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::extract::extract;

    fn normalized(payload: &str) -> Result<NormalizedFields, ParseError> {
        normalize(extract(payload.as_bytes())?)
    }

    #[test]
    fn trims_fixed_offsets() {
        assert_eq!(trim_outer(": 42.5, ", 2, "value").unwrap(), "42.5");
        assert_eq!(trim_outer(": 'a.b', ", 3, "key").unwrap(), "a.b");
        assert_eq!(trim_outer("abcd", 2, "value").unwrap(), "");
        assert!(trim_outer("abc", 2, "value").is_err());
        assert!(trim_outer("", 3, "key").is_err());
    }

    #[test]
    fn trims_by_character_not_byte() {
        assert_eq!(trim_outer(": é, ", 2, "value").unwrap(), "é");
    }

    #[test]
    fn numeric_single_quoted() {
        let n = normalized(
            "{'host': 'web01', 'clock': 1600000000, 'value': 42.5, 'key': 'cpu.idle', 'server': 'zbx01'}",
        )
        .unwrap();
        assert_eq!(n.host, "web01");
        assert_eq!(n.server, "zbx01");
        assert_eq!(n.key, "cpu.idle");
        assert_eq!(n.value, "42.5");
        assert_eq!(n.kind, ValueKind::Numeric);
        assert_eq!(n.timestamp.timestamp(), 1_600_000_000);
    }

    #[test]
    fn text_value_keeps_its_quotes() {
        let n = normalized(
            "{'host': 'web01', 'clock': 1600000000, 'value': 'up', 'key': 'agent.ping', 'server': 'zbx01'}",
        )
        .unwrap();
        assert_eq!(n.value, "'up'");
        assert_eq!(n.kind, ValueKind::Text);
    }

    #[test]
    fn double_quoted_text_value_is_unified() {
        let n = normalized(
            r#"{"host": "web01", "clock": 1600000000, "value": "up", "key": "agent.ping", "server": "zbx01"}"#,
        )
        .unwrap();
        assert_eq!(n.value, "'up'");
        assert_eq!(n.kind, ValueKind::Text);
        assert_eq!(n.server, "zbx01");
    }

    #[test]
    fn quoted_clock_is_accepted() {
        let n = normalized(
            "{'host': 'web01', 'clock': '1600000000', 'value': 1, 'key': 'cpu.idle', 'server': 'zbx01'}",
        )
        .unwrap();
        assert_eq!(n.timestamp.timestamp(), 1_600_000_000);
    }

    #[test]
    fn non_numeric_clock_fails() {
        let err = normalized(
            "{'host': 'web01', 'clock': soon, 'value': 1, 'key': 'cpu.idle', 'server': 'zbx01'}",
        )
        .unwrap_err();
        match err {
            ParseError::Timestamp { input, .. } => assert_eq!(input, "soon"),
            other => panic!("expected timestamp error, got {:?}", other),
        }
    }

    #[test]
    fn unquoted_host_is_malformed() {
        let err = normalized(
            "{'host': web01, 'clock': 1600000000, 'value': 1, 'key': 'cpu.idle', 'server': 'zbx01'}",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::MalformedPayload { stage: Stage::Normalize, .. }));
    }

    #[test]
    fn empty_key_is_malformed() {
        let err = normalized(
            "{'host': 'web01', 'clock': 1600000000, 'value': 1, 'key': '', 'server': 'zbx01'}",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::MalformedPayload { stage: Stage::Normalize, .. }));
    }
}
