use std::error::Error;
use std::io;
use std::process;
use std::sync::Arc;

use log::error;
use simplelog::WriteLogger;

use zabbix_ingest::config::{Config, SinkKind};
use zabbix_ingest::error::SinkError;
use zabbix_ingest::sink::{LineProtocolSink, MetricSink};
use zabbix_ingest::write_to_db::TimescaleSink;
use zabbix_ingest::{replay, server};


#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;


fn main() {
    let config = Arc::new(Config::new());
    // Points may go to stdout, so logs go to stderr.
    WriteLogger::init(config.log_level, simplelog::Config::default(), io::stderr())
        .expect("Failed to initialize logging.");

    if let Err(e) = run(config) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(config: Arc<Config>) -> Result<(), Box<dyn Error>> {
    let mut sink = open_sink(&config)?;
    match &config.replay {
        Some(path) => {
            replay::run(path, &mut *sink, config.batch_size)?;
        },
        None => server::run(config.clone(), sink)?,
    }
    Ok(())
}

fn open_sink(config: &Config) -> Result<Box<dyn MetricSink>, SinkError> {
    match config.sink {
        SinkKind::Stdout => Ok(Box::new(LineProtocolSink::new(io::stdout()))),
        SinkKind::TimescaleDb => Ok(Box::new(TimescaleSink::connect(config)?)),
    }
}
