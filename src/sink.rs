//! Destinations for finished points.

use std::io::Write;

use log::debug;

use crate::error::SinkError;
use crate::point::MetricPoint;


/// Receives batches of finished points. Owned by a single writer thread.
pub trait MetricSink: Send {
    /// Write a batch, returning the number of points written.
    fn write(&mut self, points: &[MetricPoint]) -> Result<usize, SinkError>;
}

impl<S: MetricSink + ?Sized> MetricSink for Box<S> {
    fn write(&mut self, points: &[MetricPoint]) -> Result<usize, SinkError> {
        (**self).write(points)
    }
}


/// Writes points as InfluxDB line protocol, one per line.
pub struct LineProtocolSink<W> {
    out: W,
}

impl<W: Write + Send> LineProtocolSink<W> {
    pub fn new(out: W) -> Self {
        LineProtocolSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> MetricSink for LineProtocolSink<W> {
    fn write(&mut self, points: &[MetricPoint]) -> Result<usize, SinkError> {
        let mut buf = String::new();
        for point in points {
            let line = point.to_line_protocol().ok_or_else(|| {
                SinkError::Encoding(format!("timestamp of {:?} out of range", point.measurement))
            })?;
            buf.push_str(&line);
            buf.push('\n');
        }
        self.out.write_all(buf.as_bytes())?;
        self.out.flush()?;
        debug!("Wrote {} point(s).", points.len());
        Ok(points.len())
    }
}
