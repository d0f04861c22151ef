//! Finished time-series points and their InfluxDB line protocol encoding.
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```
//!
//! See <https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/>

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::classify::{classify, FieldValue, StructuredKey};
use crate::error::ParseError;
use crate::parse::message::TypedMetricMessage;


#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}


/// Classify the message's key and attach host, server and timestamp.
pub fn assemble(message: TypedMetricMessage) -> Result<MetricPoint, ParseError> {
    let structured = classify(message.key(), message.field_value());
    assemble_with(&message, structured)
}

/// Build a point from a message and an already classified key.
///
/// `host` and `server` always overwrite tags of the same name. Tags with an
/// empty value are dropped since line protocol cannot carry them. The
/// timestamp must fit in `i64` nanoseconds, so every point returned here can
/// be encoded.
pub fn assemble_with(message: &TypedMetricMessage, structured: StructuredKey) -> Result<MetricPoint, ParseError> {
    let StructuredKey { measurement, mut tags, fields, .. } = structured;

    if message.timestamp().timestamp_nanos_opt().is_none() {
        return Err(ParseError::point(format!(
            "timestamp {} out of range for nanosecond precision",
            message.timestamp()
        )));
    }

    if measurement.is_empty() {
        return Err(ParseError::point(format!("empty measurement for key {:?}", message.key())));
    }
    if fields.is_empty() {
        return Err(ParseError::point(format!("no fields for key {:?}", message.key())));
    }
    for (name, value) in &fields {
        if name.is_empty() {
            return Err(ParseError::point(format!("empty field name for key {:?}", message.key())));
        }
        if let FieldValue::Float(v) = value {
            if !v.is_finite() {
                return Err(ParseError::point(format!("unsupported value {} for field {:?}", v, name)));
            }
        }
    }

    tags.insert("host".to_string(), message.host().to_string());
    tags.insert("server".to_string(), message.server().to_string());
    tags.retain(|name, value| !name.is_empty() && !value.is_empty());

    Ok(MetricPoint {
        measurement,
        tags,
        fields,
        timestamp: message.timestamp(),
    })
}


impl FieldValue {
    /// Format this value for line protocol: floats as-is, strings double quoted
    /// with `\` and `"` escaped.
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::Text(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\"", escaped)
            }
        }
    }
}

impl MetricPoint {
    /// Nanoseconds since the Unix epoch, if representable.
    pub fn timestamp_nanos(&self) -> Option<i64> {
        self.timestamp.timestamp_nanos_opt()
    }

    /// Comma separated `key=value` tag set, escaped, in key order.
    pub fn tag_set(&self) -> String {
        self.tags
            .iter()
            .map(|(k, v)| format!("{}={}", escape_key(k), escape_key(v)))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Comma separated `key=value` field set, escaped, in key order.
    pub fn field_set(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", escape_key(k), v.to_line_protocol()))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn to_line_protocol(&self) -> Option<String> {
        let nanos = self.timestamp_nanos()?;
        let mut line = escape_measurement(&self.measurement);
        if !self.tags.is_empty() {
            line.push(',');
            line.push_str(&self.tag_set());
        }
        line.push(' ');
        line.push_str(&self.field_set());
        line.push(' ');
        line.push_str(&nanos.to_string());
        Some(line)
    }
}

/// Spaces and commas must be escaped.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Commas, equals signs, and spaces must be escaped in tag keys, tag values
/// and field keys.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}
