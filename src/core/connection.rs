//! Connection lifecycle
//!
//! A [`DeviceConnection`] owns the transport, the correlation queue and two
//! worker tasks per open connection:
//!
//! - the reader blocks on [`LineTransport::read_line`], pairs every line with
//!   the oldest live correlation ticket and queues the pair;
//! - the dispatcher drains that queue into the [`ProtocolHandler`], which is
//!   the only place device state changes.
//!
//! Both workers stop only when the connection's cancellation token fires.
//! Read timeouts are expected while the device is idle and are ignored;
//! other transport faults are logged and the reader keeps going.

use crate::core::correlator::{Correlator, Ticket};
use crate::core::error::{DeviceError, Result};
use crate::core::history::TrafficLog;
use crate::core::protocol::{ProtocolHandler, Response};
use crate::core::readiness::Readiness;
use crate::core::transport::{LineTransport, TransportType};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport closed, no workers
    Closed,
    /// Transport open, identify not sent yet
    Open,
    /// Identify sent, bootstrap in progress
    Identifying,
    /// Bootstrap finished, cached state is trustworthy
    Ready,
}

/// Tunables for a connection
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Most correlation tickets held at once
    pub ticket_capacity: usize,
    /// Age after which an unanswered ticket is discarded
    pub ticket_ttl: Duration,
    /// Traffic history entries kept
    pub history_capacity: usize,
    /// Bound of the reader to dispatcher queue
    pub line_queue: usize,
    /// Pause after a transport fault before reading again
    pub fault_backoff: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ticket_capacity: 64,
            ticket_ttl: Duration::from_secs(2),
            history_capacity: 256,
            line_queue: 256,
            fault_backoff: Duration::from_millis(100),
        }
    }
}

/// Transport plus everything a write has to touch
struct Wire {
    transport: Arc<dyn LineTransport>,
    correlator: Correlator,
    write_lock: Mutex<()>,
    history: TrafficLog,
    readiness: Readiness,
}

impl Wire {
    async fn send(&self, command: &str) -> Result<()> {
        if !self.transport.is_open() {
            return Err(DeviceError::NotOpen);
        }

        // Ticket order must equal write order.
        let _guard = self.write_lock.lock().await;
        let seq = self.correlator.issue(command);
        if let Err(e) = self.transport.write(command).await {
            self.correlator.retract(seq);
            error!(command, error = %e, "write failed");
            return Err(e.into());
        }

        self.history.record_sent(command);
        debug!(command, seq, "sent");
        Ok(())
    }
}

/// Handle given to protocol handlers for writing back to the device
#[derive(Clone)]
pub struct CommandLink {
    wire: Arc<Wire>,
    cancel: CancellationToken,
}

impl CommandLink {
    /// Write a command, issuing its correlation ticket
    pub async fn send(&self, command: &str) -> Result<()> {
        self.wire.send(command).await
    }

    /// Readiness flag of the connection
    pub fn readiness(&self) -> &Readiness {
        &self.wire.readiness
    }

    /// Token cancelled when the connection closes
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

struct Inbound {
    ticket: Option<Ticket>,
    line: String,
}

struct Workers {
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl Workers {
    fn is_alive(&self) -> bool {
        !self.reader.is_finished() || !self.dispatcher.is_finished()
    }

    async fn join(self) {
        let (reader, dispatcher) = futures::join!(self.reader, self.dispatcher);
        if let Err(e) = reader {
            warn!(error = %e, "reader task ended abnormally");
        }
        if let Err(e) = dispatcher {
            warn!(error = %e, "dispatcher task ended abnormally");
        }
    }
}

/// Open/close lifecycle around one transport and one protocol
pub struct DeviceConnection<H: ProtocolHandler> {
    id: Uuid,
    wire: Arc<Wire>,
    handler: Arc<H>,
    settings: ConnectionSettings,
    phase: RwLock<ConnectionState>,
    workers: Mutex<Option<Workers>>,
}

impl<H: ProtocolHandler> DeviceConnection<H> {
    /// Wrap a transport with a protocol handler
    pub fn new(transport: Arc<dyn LineTransport>, handler: H, settings: ConnectionSettings) -> Self {
        let wire = Wire {
            transport,
            correlator: Correlator::new(settings.ticket_capacity, settings.ticket_ttl),
            write_lock: Mutex::new(()),
            history: TrafficLog::new(settings.history_capacity),
            readiness: Readiness::new(),
        };

        Self {
            id: Uuid::new_v4(),
            wire: Arc::new(wire),
            handler: Arc::new(handler),
            settings,
            phase: RwLock::new(ConnectionState::Closed),
            workers: Mutex::new(None),
        }
    }

    /// Open the transport, start the workers and send the identify command
    ///
    /// Fails with [`DeviceError::AlreadyOpen`] when the transport is open or
    /// workers from a previous open are still running.
    pub async fn open(&self) -> Result<()> {
        let mut workers = self.workers.lock().await;
        if self.wire.transport.is_open() || workers.as_ref().is_some_and(Workers::is_alive) {
            return Err(DeviceError::AlreadyOpen);
        }

        self.wire.readiness.set(false);
        self.wire.correlator.clear();
        self.wire.transport.open().await?;
        *self.phase.write() = ConnectionState::Open;

        let cancel = CancellationToken::new();
        let link = CommandLink {
            wire: Arc::clone(&self.wire),
            cancel: cancel.clone(),
        };
        self.handler.on_open(&link);

        let (tx, rx) = mpsc::channel(self.settings.line_queue.max(1));
        let reader = tokio::spawn(read_loop(
            Arc::clone(&self.wire),
            tx,
            cancel.clone(),
            self.settings.fault_backoff,
        ));
        let dispatcher = tokio::spawn(dispatch_loop(
            Arc::clone(&self.handler),
            link.clone(),
            rx,
        ));
        *workers = Some(Workers {
            cancel,
            reader,
            dispatcher,
        });
        drop(workers);

        info!(
            id = %self.id,
            transport = %self.wire.transport.transport_type(),
            info = %self.wire.transport.connection_info(),
            "connection opened"
        );

        *self.phase.write() = ConnectionState::Identifying;
        link.send(self.handler.identify_command()).await
    }

    /// Cancel the workers, close the transport and wait for the workers to stop
    ///
    /// Closing an already closed connection is a no-op.
    pub async fn close(&self) -> Result<()> {
        let workers = self.workers.lock().await.take();
        if let Some(w) = &workers {
            w.cancel.cancel();
        }
        self.wire.readiness.set(false);

        let closed = if self.wire.transport.is_open() {
            self.wire.transport.close().await
        } else {
            Ok(())
        };

        if let Some(w) = workers {
            w.join().await;
            info!(id = %self.id, "connection closed");
        }
        self.wire.correlator.clear();
        *self.phase.write() = ConnectionState::Closed;

        closed.map_err(Into::into)
    }

    /// Write a command to the device
    pub async fn send(&self, command: &str) -> Result<()> {
        self.wire.send(command).await
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        let phase = *self.phase.read();
        if phase != ConnectionState::Closed && self.wire.readiness.is_ready() {
            ConnectionState::Ready
        } else {
            phase
        }
    }

    /// Whether the transport is open
    pub fn is_open(&self) -> bool {
        self.wire.transport.is_open()
    }

    /// Unique connection id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Readiness flag
    pub fn readiness(&self) -> &Readiness {
        &self.wire.readiness
    }

    /// Recent traffic
    pub fn history(&self) -> &TrafficLog {
        &self.wire.history
    }

    /// Protocol handler
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Correlation tickets currently queued
    pub fn pending_tickets(&self) -> usize {
        self.wire.correlator.pending()
    }

    /// Transport kind
    pub fn transport_type(&self) -> TransportType {
        self.wire.transport.transport_type()
    }

    /// Human-readable transport description
    pub fn connection_info(&self) -> String {
        self.wire.transport.connection_info()
    }
}

impl<H: ProtocolHandler> Drop for DeviceConnection<H> {
    fn drop(&mut self) {
        if let Ok(mut workers) = self.workers.try_lock() {
            if let Some(w) = workers.take() {
                w.cancel.cancel();
            }
        }
    }
}

async fn read_loop(
    wire: Arc<Wire>,
    tx: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
    backoff: Duration,
) {
    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = wire.transport.read_line() => result,
        };

        match result {
            Ok(line) => {
                wire.history.record_received(&line);
                let ticket = wire.correlator.take();
                debug!(
                    line = %line,
                    pending = ?ticket.as_ref().map(|t| t.command.as_str()),
                    "received"
                );
                if tx.send(Inbound { ticket, line }).await.is_err() {
                    break;
                }
            }
            Err(e) if e.is_timeout() => {
                trace!("read timeout");
                tokio::task::yield_now().await;
            }
            Err(e) => {
                error!(error = %e, "transport read failed");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }
    debug!("reader stopped");
}

async fn dispatch_loop<H: ProtocolHandler>(
    handler: Arc<H>,
    link: CommandLink,
    mut rx: mpsc::Receiver<Inbound>,
) {
    loop {
        let inbound = tokio::select! {
            () = link.cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(inbound) => inbound,
                None => break,
            },
        };

        let pending = inbound.ticket.as_ref().map(|t| t.command.as_str());
        handler.handle(&Response::new(pending, &inbound.line), &link);
    }
    debug!("dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{MockLineTransport, TransportError};
    use parking_lot::Mutex as SyncMutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::result::Result;

    #[derive(Default)]
    struct Recorder {
        seen: SyncMutex<Vec<(Option<String>, String)>>,
        opens: AtomicUsize,
    }

    impl ProtocolHandler for Arc<Recorder> {
        fn on_open(&self, _link: &CommandLink) {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }

        fn handle(&self, response: &Response<'_>, link: &CommandLink) {
            self.seen
                .lock()
                .push((response.pending.map(str::to_string), response.line.to_string()));
            if response.line == "READY" {
                link.readiness().set(true);
            }
        }
    }

    // Ok lines are released one per write so replies never overtake their command.
    fn scripted_transport(lines: Vec<Result<String, TransportError>>) -> MockLineTransport {
        let open = Arc::new(AtomicBool::new(false));
        let credits = Arc::new(AtomicUsize::new(0));
        let script = Arc::new(SyncMutex::new(VecDeque::from(lines)));
        let mut mock = MockLineTransport::new();

        let flag = Arc::clone(&open);
        mock.expect_is_open().returning(move || flag.load(Ordering::SeqCst));
        let flag = Arc::clone(&open);
        mock.expect_open().returning(move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        let flag = Arc::clone(&open);
        mock.expect_close().returning(move || {
            flag.store(false, Ordering::SeqCst);
            Ok(())
        });
        let granted = Arc::clone(&credits);
        mock.expect_write().returning(move |_| {
            granted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        mock.expect_read_line().returning(move || {
            let idle = Err(TransportError::Timeout(Duration::from_millis(1)));
            let mut script = script.lock();
            match script.front() {
                Some(Ok(_)) if credits.load(Ordering::SeqCst) == 0 => idle,
                Some(Ok(_)) => {
                    credits.fetch_sub(1, Ordering::SeqCst);
                    script.pop_front().unwrap_or(idle)
                }
                Some(Err(_)) => script.pop_front().unwrap_or(idle),
                None => idle,
            }
        });
        mock.expect_transport_type().return_const(TransportType::Simulated);
        mock.expect_connection_info().returning(|| "mock".to_string());
        mock
    }

    async fn eventually(check: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_open_sends_identify_and_rejects_second_open() {
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(scripted_transport(vec![Ok("READY".into())]));
        let conn = DeviceConnection::new(transport, Arc::clone(&recorder), ConnectionSettings::default());

        assert_eq!(conn.state(), ConnectionState::Closed);
        conn.open().await.unwrap();
        assert!(matches!(conn.open().await, Err(DeviceError::AlreadyOpen)));
        assert_eq!(recorder.opens.load(Ordering::SeqCst), 1);

        assert!(eventually(|| conn.state() == ConnectionState::Ready).await);
        let seen = recorder.seen.lock().clone();
        assert_eq!(seen, vec![(Some("I".to_string()), "READY".to_string())]);

        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_read_loop_survives_faults() {
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(scripted_transport(vec![
            Err(TransportError::ReceiveError("framing".into())),
            Err(TransportError::Timeout(Duration::from_millis(1))),
            Ok("PING".into()),
        ]));
        let settings = ConnectionSettings {
            fault_backoff: Duration::from_millis(5),
            ..ConnectionSettings::default()
        };
        let conn = DeviceConnection::new(transport, Arc::clone(&recorder), settings);

        conn.open().await.unwrap();
        assert!(eventually(|| !recorder.seen.lock().is_empty()).await);
        assert_eq!(recorder.seen.lock()[0].1, "PING");
        assert_eq!(conn.history().len(), 2);

        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_requires_open_transport() {
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(scripted_transport(Vec::new()));
        let conn = DeviceConnection::new(transport, recorder, ConnectionSettings::default());

        assert!(matches!(conn.send("1!").await, Err(DeviceError::NotOpen)));
        assert_eq!(conn.pending_tickets(), 0);
    }
}
