//! Response correlation
//!
//! Every write issues a ticket carrying the command text. The read loop takes
//! tickets in FIFO order, one per received line, so a response arriving for
//! command N is paired with command N even when command N+1 was already
//! written. Tickets older than the TTL are treated as stale and skipped,
//! which keeps an unanswered command from shifting every later pairing.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// One outstanding command awaiting its response line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Sequence number, unique per correlator
    pub seq: u64,
    /// Command text as written to the transport
    pub command: String,
    /// When the command was handed to the transport
    pub issued_at: Instant,
}

#[derive(Debug)]
struct Inner {
    queue: VecDeque<Ticket>,
    next_seq: u64,
}

/// Bounded FIFO queue of correlation tickets
#[derive(Debug)]
pub struct Correlator {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl Correlator {
    /// Create a correlator holding at most `capacity` tickets, each valid for `ttl`
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                next_seq: 0,
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Queue a ticket for `command` and return its sequence number
    ///
    /// When the queue is full the oldest ticket is dropped.
    pub fn issue(&self, command: &str) -> u64 {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq = inner.next_seq.wrapping_add(1);

        if inner.queue.len() >= self.capacity {
            if let Some(dropped) = inner.queue.pop_front() {
                warn!(command = %dropped.command, seq = dropped.seq, "correlation queue full, dropping oldest ticket");
            }
        }

        inner.queue.push_back(Ticket {
            seq,
            command: command.to_string(),
            issued_at: Instant::now(),
        });
        seq
    }

    /// Take the oldest live ticket, discarding expired ones on the way
    pub fn take(&self) -> Option<Ticket> {
        let mut inner = self.inner.lock();
        while let Some(ticket) = inner.queue.pop_front() {
            if ticket.issued_at.elapsed() <= self.ttl {
                return Some(ticket);
            }
            trace!(command = %ticket.command, seq = ticket.seq, "ticket expired");
        }
        None
    }

    /// Remove a ticket whose write never reached the device
    pub fn retract(&self, seq: u64) -> bool {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.queue.iter().position(|t| t.seq == seq) {
            inner.queue.remove(pos);
            true
        } else {
            false
        }
    }

    /// Drop all outstanding tickets
    pub fn clear(&self) {
        self.inner.lock().queue.clear();
    }

    /// Number of tickets currently queued (expired ones included)
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(64, Duration::from_secs(2))
    }
}
