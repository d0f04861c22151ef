//! Converts Zabbix history payloads into time-series points.
//!
//! ```text
//! payload --> extract --> normalize --> build --> classify/assemble --> MetricPoint --> MetricSink
//! ```
//!
//! The parsing core ([`parse`], [`classify`], [`point`]) is pure. The
//! [`dispatch`] worker pool runs it once per [`delivery::Delivery`] and
//! acknowledges every delivery after handling it, whatever the outcome.

pub mod classify;
pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod parse;
pub mod point;
pub mod replay;
pub mod server;
pub mod sink;
pub mod write_to_db;

pub use classify::{classify, FieldValue, StructuredKey};
pub use error::{ParseError, Stage};
pub use parse::{parse_message, parse_payload, TypedMetricMessage};
pub use point::MetricPoint;
