//! Replay a file of captured payloads, one per line, through the parser.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use itertools::Itertools;
use log::{error, info, warn};
use rayon::prelude::*;

use crate::parse::parse_payload;
use crate::sink::MetricSink;


#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub lines: u64,
    pub parsed: u64,
    pub failed: u64,
    pub written: u64,
    pub write_errors: u64,
}


pub fn run(path: &Path, sink: &mut dyn MetricSink, batch_size: usize) -> io::Result<ReplayReport> {
    info!("Replaying payloads from {}...", path.display());
    // Payloads are not guaranteed to be UTF-8; the extractor decodes lossily.
    let reader = BufReader::new(File::open(path)?);
    let lines = reader
        .split(b'\n')
        .map(|line| line.map(|bytes| String::from_utf8_lossy(&bytes).trim_end_matches('\r').to_string()))
        .collect::<io::Result<Vec<String>>>()?;
    let report = replay_lines(&lines, sink, batch_size);
    info!(
        "Replayed {} line(s):  {} parsed, {} failed, {} written.",
        report.lines, report.parsed, report.failed, report.written
    );
    Ok(report)
}

/// Parse `lines` in parallel and write the points, in input order, in
/// batches of `batch_size`. Blank lines are skipped.
pub fn replay_lines(lines: &[String], sink: &mut dyn MetricSink, batch_size: usize) -> ReplayReport {
    let results: Vec<_> = lines
        .par_iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| (idx + 1, parse_payload(line.as_bytes())))
        .collect();

    let mut report = ReplayReport { lines: results.len() as u64, ..ReplayReport::default() };
    let mut points = Vec::with_capacity(results.len());
    for (line_no, result) in results {
        match result {
            Ok(point) => points.push(point),
            Err(e) => {
                report.failed += 1;
                warn!("Line {} - Skipping payload at {} stage:  {}", line_no, e.stage(), e);
            }
        }
    }
    report.parsed = points.len() as u64;

    for chunk in &points.into_iter().chunks(batch_size.max(1)) {
        let batch: Vec<_> = chunk.collect();
        match sink.write(&batch) {
            Ok(written) => report.written += written as u64,
            Err(e) => {
                report.write_errors += 1;
                error!("Failed to write {} point(s):  {}", batch.len(), e);
            }
        }
    }
    report
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::point::MetricPoint;
    use crate::sink::LineProtocolSink;

    #[derive(Default)]
    struct BatchRecorder {
        batches: Vec<Vec<String>>,
    }

    impl MetricSink for BatchRecorder {
        fn write(&mut self, points: &[MetricPoint]) -> Result<usize, SinkError> {
            self.batches.push(points.iter().map(|p| p.measurement.clone()).collect());
            Ok(points.len())
        }
    }

    fn line(key: &str) -> String {
        format!("{{'host': 'h', 'clock': 1, 'value': 1, 'key': '{}', 'server': 's'}}", key)
    }

    #[test]
    fn keeps_input_order_and_batches() {
        let lines = vec![
            line("a.x"),
            String::new(),
            line("b.x"),
            "garbage".to_string(),
            line("c.x"),
            line("d.x"),
        ];
        let mut sink = BatchRecorder::default();
        let report = replay_lines(&lines, &mut sink, 2);

        assert_eq!(report, ReplayReport { lines: 5, parsed: 4, failed: 1, written: 4, write_errors: 0 });
        assert_eq!(sink.batches, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn far_future_clock_does_not_spoil_its_batch() {
        let lines = vec![
            line("a.x"),
            "{'host': 'h', 'clock': 10000000000, 'value': 1, 'key': 'b.x', 'server': 's'}".to_string(),
            line("c.x"),
        ];
        let mut sink = LineProtocolSink::new(Vec::new());
        let report = replay_lines(&lines, &mut sink, 10);

        assert_eq!(report, ReplayReport { lines: 3, parsed: 2, failed: 1, written: 2, write_errors: 0 });
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn invalid_utf8_lines_are_replayed() {
        let path = std::env::temp_dir().join(format!("zabbix-ingest-replay-{}.txt", std::process::id()));
        let mut contents = b"\xff{'host': 'h', 'clock': 1, 'value': 1, 'key': 'a.x', 'server': 's'}\r\n".to_vec();
        contents.extend_from_slice(line("b.x").as_bytes());
        contents.push(b'\n');
        std::fs::write(&path, &contents).unwrap();

        let mut sink = BatchRecorder::default();
        let report = run(&path, &mut sink, 10);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(report.unwrap().parsed, 2);
        assert_eq!(sink.batches, vec![vec!["a", "b"]]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut sink = BatchRecorder::default();
        assert!(run(Path::new("/nonexistent/payloads.txt"), &mut sink, 10).is_err());
    }
}
