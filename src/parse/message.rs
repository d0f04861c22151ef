//! Typed metric messages: a float or a string reading with its metadata.

use chrono::{DateTime, Utc};

use crate::classify::FieldValue;
use crate::error::ParseError;
use crate::parse::normalize::{NormalizedFields, ValueKind};


#[derive(Debug, Clone, PartialEq)]
pub struct FloatMetric {
    pub host: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub key: String,
    pub server: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringMetric {
    pub host: String,
    pub timestamp: DateTime<Utc>,
    pub value: String,
    pub key: String,
    pub server: String,
}


/// A metric reading. The variant is chosen once by [`build`] and never changes.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedMetricMessage {
    Float(FloatMetric),
    Text(StringMetric),
}

impl TypedMetricMessage {
    pub fn host(&self) -> &str {
        match self {
            TypedMetricMessage::Float(m) => &m.host,
            TypedMetricMessage::Text(m) => &m.host,
        }
    }

    pub fn server(&self) -> &str {
        match self {
            TypedMetricMessage::Float(m) => &m.server,
            TypedMetricMessage::Text(m) => &m.server,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            TypedMetricMessage::Float(m) => &m.key,
            TypedMetricMessage::Text(m) => &m.key,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TypedMetricMessage::Float(m) => m.timestamp,
            TypedMetricMessage::Text(m) => m.timestamp,
        }
    }

    pub fn field_value(&self) -> FieldValue {
        match self {
            TypedMetricMessage::Float(m) => FieldValue::Float(m.value),
            TypedMetricMessage::Text(m) => FieldValue::Text(m.value.clone()),
        }
    }
}


pub fn build(fields: NormalizedFields) -> Result<TypedMetricMessage, ParseError> {
    let NormalizedFields { host, timestamp, value, key, server, kind } = fields;
    match kind {
        ValueKind::Numeric => {
            let parsed = value
                .parse::<f64>()
                .map_err(|source| ParseError::Value { input: value.clone(), source })?;
            Ok(TypedMetricMessage::Float(FloatMetric { host, timestamp, value: parsed, key, server }))
        }
        ValueKind::Text => {
            Ok(TypedMetricMessage::Text(StringMetric { host, timestamp, value, key, server }))
        }
    }
}
