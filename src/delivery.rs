//! Received payloads and their acknowledgment handles.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::trace;


/// Something that can be told a delivery has been handled.
pub trait Acknowledge: Send + Sync {
    fn ack(&self, tag: u64);
}


/// One payload as delivered by a source.
///
/// [`Delivery::ack`] takes the delivery by value, so a delivery cannot be
/// acknowledged twice.
pub struct Delivery {
    tag: u64,
    body: Vec<u8>,
    acker: Arc<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(tag: u64, body: Vec<u8>, acker: Arc<dyn Acknowledge>) -> Self {
        Delivery { tag, body, acker }
    }

    pub fn tag(&self) -> u64 {
        self.tag
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn ack(self) {
        self.acker.ack(self.tag);
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("tag", &self.tag)
            .field("body", &String::from_utf8_lossy(&self.body))
            .finish()
    }
}


/// Counts acknowledgments for a single source connection.
#[derive(Debug, Default)]
pub struct AckCounter {
    acked: AtomicU64,
}

impl AckCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }
}

impl Acknowledge for AckCounter {
    fn ack(&self, tag: u64) {
        trace!("Acknowledged delivery {}", tag);
        self.acked.fetch_add(1, Ordering::Relaxed);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_reaches_the_acker() {
        let counter = Arc::new(AckCounter::new());
        let first = Delivery::new(1, b"a".to_vec(), counter.clone());
        let second = Delivery::new(2, b"b".to_vec(), counter.clone());
        assert_eq!(first.tag(), 1);
        assert_eq!(first.body(), b"a");

        first.ack();
        assert_eq!(counter.acked(), 1);
        second.ack();
        assert_eq!(counter.acked(), 2);
    }

    #[test]
    fn debug_shows_body_text() {
        let delivery = Delivery::new(7, b"cpu".to_vec(), Arc::new(AckCounter::new()));
        assert!(format!("{:?}", delivery).contains("\"cpu\""));
    }
}
