//! Parse Zabbix history payloads into metric points.
//!
//! A payload is a dict-like text record with the labels `host`, `clock`,
//! `value`, `key` and `server`, quoted either with `'` or `"`:
//!
//! ```text
//! {'host': 'web01', 'clock': 1600000000, 'value': 42.5, 'key': 'net.if.in[eth0,bytes]', 'server': 'zbx01'}
//! ```
//!
//! Parsing runs in stages, each taking ownership of the previous stage's
//! output: [`extract`] → [`normalize`] → [`build`] → [`assemble`].

pub mod extract;
pub mod message;
pub mod normalize;

use log::trace;

pub use self::extract::{extract, ExtractedFields, QuoteStyle};
pub use self::message::{build, FloatMetric, StringMetric, TypedMetricMessage};
pub use self::normalize::{normalize, NormalizedFields, ValueKind};

use crate::error::ParseError;
use crate::point::{assemble, MetricPoint};


/// Parse a payload into a typed message, without classifying its key.
pub fn parse_message(payload: &[u8]) -> Result<TypedMetricMessage, ParseError> {
    let extracted = extract(payload)?;
    let normalized = normalize(extracted)?;
    build(normalized)
}

/// Parse a payload all the way to a point.
pub fn parse_payload(payload: &[u8]) -> Result<MetricPoint, ParseError> {
    let message = parse_message(payload)?;
    let point = assemble(message)?;
    trace!("Parsed point:  {:?}", point);
    Ok(point)
}
