use std::io;
use std::io::prelude::*;
use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use log::{debug, error, info, warn};

use crate::config::Config;
use crate::delivery::{AckCounter, Delivery};
use crate::dispatch::{DispatchHandle, DispatchSettings, Dispatcher};
use crate::sink::MetricSink;


/// Accept payload connections and feed every line to a dispatcher.
pub fn run(config: Arc<Config>, sink: Box<dyn MetricSink>) -> io::Result<()> {
    let addr = SocketAddr::new(config.listen_ip_addr, config.listen_port);
    let listener = TcpListener::bind(addr)?;
    let dispatcher = Dispatcher::start(DispatchSettings::from(&*config), sink)?;
    info!("Listening on {}:{} for queue `{}`...", addr.ip(), addr.port(), config.queue_name);

    serve(&listener, &dispatcher);

    dispatcher.shutdown();
    Ok(())
}

/// Spawn a reader thread per accepted connection. Returns only if the
/// listener stops yielding connections.
pub fn serve(listener: &TcpListener, dispatcher: &Dispatcher) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let handle = dispatcher.handle();
                let spawned = thread::Builder::new()
                    .name("reader".to_string())
                    .spawn(move || { handle_stream(stream, handle); });
                if let Err(e) = spawned {
                    error!("Could not spawn a reader thread:  {}", e);
                }
            },
            Err(e) => error!("Client connection failed:  {}", e),
        }
    }
}

/// Read one payload per line until the client disconnects.
///
/// Lines are passed on as raw bytes; invalid UTF-8 is left for the parser to
/// reject or tolerate. Returns the number of deliveries submitted.
fn handle_stream(stream: TcpStream, dispatcher: DispatchHandle) -> u64 {
    let client = match stream.peer_addr() {
        Ok(addr) => addr.to_string(),
        Err(_) => "unknown peer".to_string(),
    };
    info!("Client connected from {}", client);

    let acks = Arc::new(AckCounter::new());
    let mut submitted = 0;
    let buf = BufReader::new(stream);
    for line in buf.split(b'\n') {
        match line {
            Ok(mut data) => {
                if data.last() == Some(&b'\r') {
                    data.pop();
                }
                if data.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                submitted += 1;
                debug!("Read payload {} from {}", submitted, client);
                let delivery = Delivery::new(submitted, data, acks.clone());
                if dispatcher.submit(delivery).is_err() {
                    warn!("Dispatcher is shut down; dropping connection from {}.", client);
                    break;
                }
            },
            Err(e) => {
                error!("Error reading stream from {}:  {}", client, e);
                break;
            },
        }
    }
    info!(
        "Client from {} disconnected after {} payload(s), {} acknowledged so far.",
        client, submitted, acks.acked()
    );
    submitted
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Shutdown;
    use std::sync::Mutex;

    use crate::error::SinkError;
    use crate::point::MetricPoint;

    struct MemorySink {
        points: Arc<Mutex<Vec<MetricPoint>>>,
    }

    impl MetricSink for MemorySink {
        fn write(&mut self, points: &[MetricPoint]) -> Result<usize, SinkError> {
            self.points.lock().unwrap().extend_from_slice(points);
            Ok(points.len())
        }
    }

    #[test]
    fn each_line_is_a_delivery() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server_side, _) = listener.accept().unwrap();

        client
            .write_all(
                b"{'host': 'h', 'clock': 1, 'value': 1, 'key': 'cpu.idle', 'server': 's'}\n\
                  \n\
                  {'host': 'h', 'value': 1}\n\
                  {\"host\": \"h\", \"clock\": 2, \"value\": 2, \"key\": \"net.if.in[eth0,bytes]\", \"server\": \"s\"}\n",
            )
            .unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        let stored = Arc::new(Mutex::new(Vec::new()));
        let settings = DispatchSettings {
            name: "tcp".to_string(),
            workers: 2,
            channel_capacity: 8,
            batch_size: 10,
        };
        let dispatcher = Dispatcher::start(settings, Box::new(MemorySink { points: stored.clone() })).unwrap();

        let submitted = handle_stream(server_side, dispatcher.handle());
        let report = dispatcher.shutdown();

        assert_eq!(submitted, 3);
        assert_eq!(report.parsed, 2);
        assert_eq!(report.failed, 1);
        let mut measurements: Vec<String> = stored.lock().unwrap().iter().map(|p| p.measurement.clone()).collect();
        measurements.sort();
        assert_eq!(measurements, vec!["cpu", "net"]);
    }

    #[test]
    fn invalid_utf8_line_keeps_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server_side, _) = listener.accept().unwrap();

        client
            .write_all(
                b"\xff\xfe\n\
                  {'host': 'h', 'clock': 1, 'value': 1, 'key': 'cpu.idle', 'server': 's'}\r\n\
                  {'host': 'h', 'clock': 2, 'value': 3, 'key': 'cpu.user', 'server': 's'}\n",
            )
            .unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        let stored = Arc::new(Mutex::new(Vec::new()));
        let settings = DispatchSettings {
            name: "tcp".to_string(),
            workers: 1,
            channel_capacity: 4,
            batch_size: 10,
        };
        let dispatcher = Dispatcher::start(settings, Box::new(MemorySink { points: stored.clone() })).unwrap();

        let submitted = handle_stream(server_side, dispatcher.handle());
        let report = dispatcher.shutdown();

        assert_eq!(submitted, 3);
        assert_eq!(report.parsed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(stored.lock().unwrap().len(), 2);
    }
}
