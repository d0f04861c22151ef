//! Bounded worker pool that turns deliveries into points.
//!
//! Deliveries queue on a bounded channel, so sources block once
//! `channel_capacity` deliveries are waiting. Each worker parses one delivery
//! at a time, hands the point to the sink writer and acknowledges the
//! delivery, whether or not it parsed. A bad payload is logged and dropped
//! without affecting any other delivery.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::delivery::Delivery;
use crate::error::DispatchError;
use crate::parse::parse_payload;
use crate::point::MetricPoint;
use crate::sink::MetricSink;


#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Prefix for worker thread names.
    pub name: String,
    pub workers: usize,
    pub channel_capacity: usize,
    pub batch_size: usize,
}

impl From<&Config> for DispatchSettings {
    fn from(config: &Config) -> Self {
        DispatchSettings {
            name: config.queue_name.clone(),
            workers: config.workers,
            channel_capacity: config.channel_capacity,
            batch_size: config.batch_size,
        }
    }
}


#[derive(Debug, Default)]
struct Counters {
    parsed: AtomicU64,
    failed: AtomicU64,
    written: AtomicU64,
    write_errors: AtomicU64,
}

/// Totals collected over the lifetime of a [`Dispatcher`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub parsed: u64,
    pub failed: u64,
    pub written: u64,
    pub write_errors: u64,
}

impl Counters {
    fn report(&self) -> DispatchReport {
        DispatchReport {
            parsed: self.parsed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}


/// Cloneable handle sources use to submit deliveries.
#[derive(Clone)]
pub struct DispatchHandle {
    sender: Sender<Delivery>,
}

impl DispatchHandle {
    /// Queue a delivery, blocking while the channel is full.
    pub fn submit(&self, delivery: Delivery) -> Result<(), DispatchError> {
        self.sender.send(delivery).map_err(|_| DispatchError::Closed)
    }
}


pub struct Dispatcher {
    handle: DispatchHandle,
    workers: Vec<JoinHandle<()>>,
    writer: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    pub fn start(settings: DispatchSettings, sink: Box<dyn MetricSink>) -> io::Result<Self> {
        let (sender, receiver) = bounded::<Delivery>(settings.channel_capacity);
        let (point_sender, point_receiver) = bounded::<MetricPoint>(settings.channel_capacity);
        let counters = Arc::new(Counters::default());

        let writer_counters = counters.clone();
        let batch_size = settings.batch_size.max(1);
        let writer = thread::Builder::new()
            .name(format!("{}-writer", settings.name))
            .spawn(move || sink_writer(sink, point_receiver, batch_size, writer_counters))?;

        let mut workers = Vec::with_capacity(settings.workers);
        for i in 0..settings.workers {
            let con_receiver = receiver.clone();
            let con_points = point_sender.clone();
            let con_counters = counters.clone();
            let worker = thread::Builder::new()
                .name(format!("{}-{}", settings.name, i))
                .spawn(move || delivery_consumer(con_receiver, con_points, con_counters))?;
            workers.push(worker);
        }
        info!("Started {} worker(s) for `{}`.", workers.len(), settings.name);

        Ok(Dispatcher {
            handle: DispatchHandle { sender },
            workers,
            writer,
            counters,
        })
    }

    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    pub fn submit(&self, delivery: Delivery) -> Result<(), DispatchError> {
        self.handle.submit(delivery)
    }

    /// Stop accepting deliveries, drain what is queued, and wait for the
    /// workers and the sink writer to finish.
    ///
    /// Handles cloned from this dispatcher keep the channel open; drop them
    /// first or this blocks until they are gone.
    pub fn shutdown(self) -> DispatchReport {
        let Dispatcher { handle, workers, writer, counters } = self;
        drop(handle);

        for worker in workers {
            if worker.join().is_err() {
                error!("A worker thread panicked.");
            }
        }
        if writer.join().is_err() {
            error!("The sink writer thread panicked.");
        }

        let report = counters.report();
        info!(
            "Dispatcher stopped:  {} parsed, {} failed, {} written, {} write error(s).",
            report.parsed, report.failed, report.written, report.write_errors
        );
        report
    }
}


fn delivery_consumer(recv: Receiver<Delivery>, points: Sender<MetricPoint>, counters: Arc<Counters>) {
    let thread_name = thread::current().name().unwrap_or("worker").to_string();
    for delivery in recv.iter() {
        handle_delivery(&thread_name, delivery, &points, &counters);
    }
    debug!("{} - Delivery channel closed.", thread_name);
}

fn handle_delivery(thread_name: &str, delivery: Delivery, points: &Sender<MetricPoint>, counters: &Counters) {
    match parse_payload(delivery.body()) {
        Ok(point) => {
            trace!("{} - Parsed point:  {:?}", thread_name, point);
            counters.parsed.fetch_add(1, Ordering::Relaxed);
            if points.send(point).is_err() {
                error!("{} - Sink writer is gone, dropping point from delivery {}.", thread_name, delivery.tag());
            }
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                "{} - Skipping delivery {} at {} stage:  {}; payload:  {}",
                thread_name,
                delivery.tag(),
                e.stage(),
                e,
                String::from_utf8_lossy(delivery.body())
            );
        }
    }
    delivery.ack();
}

fn sink_writer(mut sink: Box<dyn MetricSink>, recv: Receiver<MetricPoint>, batch_size: usize, counters: Arc<Counters>) {
    let mut batch: Vec<MetricPoint> = Vec::with_capacity(batch_size);
    while let Ok(point) = recv.recv() {
        batch.push(point);
        batch.extend(recv.try_iter().take(batch_size - 1));

        match sink.write(&batch) {
            Ok(written) => {
                counters.written.fetch_add(written as u64, Ordering::Relaxed);
            }
            Err(e) => {
                counters.write_errors.fetch_add(1, Ordering::Relaxed);
                error!("Failed to write {} point(s):  {}", batch.len(), e);
            }
        }
        batch.clear();
    }
    debug!("Point channel closed.");
}
