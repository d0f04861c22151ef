//! Split a raw payload into its five labelled substrings.

use crate::error::{ParseError, Stage};


/// Quote character the payload wraps its labels and string values in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    Single,
    Double,
}

impl QuoteStyle {
    /// Double-quoted payloads are recognised by a literal `"host"` label;
    /// anything else is treated as single-quoted.
    pub fn detect(text: &str) -> Self {
        if text.contains("\"host\"") {
            QuoteStyle::Double
        } else {
            QuoteStyle::Single
        }
    }

    pub fn quote(self) -> char {
        match self {
            QuoteStyle::Single => '\'',
            QuoteStyle::Double => '"',
        }
    }

    fn marker(self, label: &str) -> String {
        let q = self.quote();
        format!("{}{}{}", q, label, q)
    }
}


/// The raw substrings between the labels, punctuation still attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFields {
    pub host: String,
    pub clock: String,
    pub value: String,
    pub key: String,
    pub server: String,
    pub quote_style: QuoteStyle,
}


const LABELS: [&str; 5] = ["host", "clock", "value", "key", "server"];


pub fn extract(payload: &[u8]) -> Result<ExtractedFields, ParseError> {
    let text = String::from_utf8_lossy(payload);
    let quote_style = QuoteStyle::detect(&text);

    // Walk the labels in order; each search starts after the previous label.
    let mut rest: &str = &text;
    let mut parts: Vec<&str> = Vec::with_capacity(LABELS.len());
    for label in LABELS.iter() {
        let marker = quote_style.marker(label);
        let (before, after) = split_at_marker(rest, &marker)?;
        parts.push(before);
        rest = after;
    }
    parts.push(rest);

    // parts[0] is whatever preceded the host label.
    Ok(ExtractedFields {
        host: parts[1].to_string(),
        clock: parts[2].to_string(),
        value: parts[3].to_string(),
        key: parts[4].to_string(),
        server: parts[5].to_string(),
        quote_style,
    })
}

fn split_at_marker<'a>(text: &'a str, marker: &str) -> Result<(&'a str, &'a str), ParseError> {
    match text.find(marker) {
        Some(idx) => Ok((&text[..idx], &text[idx + marker.len()..])),
        None => Err(ParseError::malformed(Stage::Extract, format!("missing {} marker", marker))),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: &str = "{'host': 'web01', 'clock': 1600000000, 'value': 42.5, \
                          'key': 'system.cpu.util[,idle]', 'server': 'zbx01'}";

    #[test]
    fn detects_quote_style() {
        assert_eq!(QuoteStyle::detect(SINGLE), QuoteStyle::Single);
        assert_eq!(QuoteStyle::detect(r#"{"host": "a"}"#), QuoteStyle::Double);
        assert_eq!(QuoteStyle::detect("no labels at all"), QuoteStyle::Single);
    }

    #[test]
    fn splits_single_quoted() {
        let fields = extract(SINGLE.as_bytes()).unwrap();
        assert_eq!(fields.host, ": 'web01', ");
        assert_eq!(fields.clock, ": 1600000000, ");
        assert_eq!(fields.value, ": 42.5, ");
        assert_eq!(fields.key, ": 'system.cpu.util[,idle]', ");
        assert_eq!(fields.server, ": 'zbx01'}");
        assert_eq!(fields.quote_style, QuoteStyle::Single);
    }

    #[test]
    fn splits_double_quoted() {
        let payload = r#"{"host": "web01", "clock": 1600000000, "value": 1, "key": "cpu.idle", "server": "zbx01"}"#;
        let fields = extract(payload.as_bytes()).unwrap();
        assert_eq!(fields.host, r#": "web01", "#);
        assert_eq!(fields.key, r#": "cpu.idle", "#);
        assert_eq!(fields.quote_style, QuoteStyle::Double);
    }

    #[test]
    fn missing_marker_is_malformed() {
        let payload = "{'host': 'web01', 'value': 1, 'key': 'cpu.idle', 'server': 'zbx01'}";
        match extract(payload.as_bytes()) {
            Err(ParseError::MalformedPayload { stage, reason }) => {
                assert_eq!(stage, Stage::Extract);
                assert!(reason.contains("'clock'"));
            }
            other => panic!("expected malformed payload, got {:?}", other),
        }
    }

    #[test]
    fn out_of_order_marker_is_malformed() {
        let payload = "{'host': 'web01', 'value': 1, 'clock': 1600000000, 'key': 'cpu.idle', 'server': 'zbx01'}";
        assert!(matches!(extract(payload.as_bytes()), Err(ParseError::MalformedPayload { .. })));
    }

    #[test]
    fn invalid_utf8_is_tolerated() {
        let mut payload = SINGLE.as_bytes().to_vec();
        payload.insert(0, 0xff);
        assert!(extract(&payload).is_ok());
    }
}
