use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{value_t, App, Arg, ArgMatches};
use simplelog::LevelFilter;

use crate::error::ConfigError;
use crate::write_to_db::WriteStrategy;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Stdout,
    TimescaleDb,
}

impl FromStr for SinkKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdout" => Ok(SinkKind::Stdout),
            "timescaledb" => Ok(SinkKind::TimescaleDb),
            other => Err(ConfigError::Invalid(format!("unknown sink `{}`", other))),
        }
    }
}


#[derive(Debug, Clone)]
pub struct Config {
    // Source
    pub listen_ip_addr: IpAddr,
    pub listen_port: u16,
    pub queue_name: String,
    // Dispatch
    pub workers: usize,
    pub channel_capacity: usize,
    pub batch_size: usize,
    // Sink
    pub sink: SinkKind,
    // Database
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_username: String,
    pub db_password: String,
    pub db_strategy: WriteStrategy,
    // Replay a file of payloads instead of listening.
    pub replay: Option<PathBuf>,
    pub log_level: LevelFilter,
}


impl Config {
    /// Read the configuration from the process arguments, exiting with a
    /// usage message on bad input.
    pub fn new() -> Self {
        let matches = app().get_matches();
        match Self::from_matches(&matches) {
            Ok(config) => config,
            Err(ConfigError::Args(e)) => e.exit(),
            Err(e) => clap::Error::with_description(&e.to_string(), clap::ErrorKind::InvalidValue).exit(),
        }
    }

    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = app().get_matches_from_safe(args)?;
        Self::from_matches(&matches)
    }

    fn from_matches(matches: &ArgMatches<'_>) -> Result<Self, ConfigError> {
        let log_level = if matches.is_present("quiet") {
            LevelFilter::Warn
        } else {
            match matches.occurrences_of("verbose") {
                0 => LevelFilter::Info,
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        };

        let config = Config {
            listen_ip_addr: value_t!(matches, "listen-ip", IpAddr)?,
            listen_port: value_t!(matches, "listen-port", u16)?,
            queue_name: value_t!(matches, "queue", String)?,
            workers: positive(value_t!(matches, "workers", usize)?, "workers")?,
            channel_capacity: positive(value_t!(matches, "channel-capacity", usize)?, "channel-capacity")?,
            batch_size: positive(value_t!(matches, "batch-size", usize)?, "batch-size")?,
            sink: value_t!(matches, "sink", String)?.parse()?,
            db_host: value_t!(matches, "db-host", String)?,
            db_port: value_t!(matches, "db-port", u16)?,
            db_name: value_t!(matches, "db-name", String)?,
            db_username: value_t!(matches, "db-username", String)?,
            db_password: matches.value_of("db-password").unwrap_or("").to_string(),
            db_strategy: value_t!(matches, "db-strategy", String)?.parse()?,
            replay: matches.value_of("replay").map(PathBuf::from),
            log_level,
        };
        Ok(config)
    }
}

fn positive(value: usize, name: &str) -> Result<usize, ConfigError> {
    if value == 0 {
        Err(ConfigError::Invalid(format!("--{} must be greater than zero", name)))
    } else {
        Ok(value)
    }
}

fn app() -> App<'static, 'static> {
    App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about("Converts Zabbix history payloads into time-series points.")
        .arg(Arg::with_name("listen-ip")
            .long("listen-ip")
            .value_name("IP")
            .default_value("0.0.0.0")
            .help("Address to accept payload connections on"))
        .arg(Arg::with_name("listen-port")
            .long("listen-port")
            .value_name("PORT")
            .default_value("10051"))
        .arg(Arg::with_name("queue")
            .long("queue")
            .value_name("NAME")
            .default_value("task_queue")
            .help("Name of the queue the payloads come from, used to label worker threads"))
        .arg(Arg::with_name("workers")
            .long("workers")
            .value_name("N")
            .default_value("4"))
        .arg(Arg::with_name("channel-capacity")
            .long("channel-capacity")
            .value_name("N")
            .default_value("1000")
            .help("Deliveries buffered before readers block"))
        .arg(Arg::with_name("batch-size")
            .long("batch-size")
            .value_name("N")
            .default_value("100")
            .help("Maximum points per sink write"))
        .arg(Arg::with_name("sink")
            .long("sink")
            .value_name("SINK")
            .possible_values(&["stdout", "timescaledb"])
            .default_value("stdout"))
        .arg(Arg::with_name("db-host").long("db-host").value_name("HOST").default_value("localhost"))
        .arg(Arg::with_name("db-port").long("db-port").value_name("PORT").default_value("5432"))
        .arg(Arg::with_name("db-name").long("db-name").value_name("NAME").default_value("metrics"))
        .arg(Arg::with_name("db-username").long("db-username").value_name("USER").default_value("postgres"))
        .arg(Arg::with_name("db-password").long("db-password").value_name("PASSWORD"))
        .arg(Arg::with_name("db-strategy")
            .long("db-strategy")
            .value_name("STRATEGY")
            .possible_values(&["multi", "single"])
            .default_value("multi")
            .help("Insert each batch as one multi-row INSERT, or call insert_point once per point"))
        .arg(Arg::with_name("replay")
            .long("replay")
            .value_name("FILE")
            .help("Parse payloads from FILE, one per line, then exit"))
        .arg(Arg::with_name("verbose")
            .short("v")
            .multiple(true)
            .help("Increase log verbosity"))
        .arg(Arg::with_name("quiet")
            .short("q")
            .long("quiet")
            .conflicts_with("verbose")
            .help("Only log warnings and errors"))
}
