//! TCP transport implementation
//!
//! Network-attached switchers speak the same line protocol as the serial
//! port. When a password is configured it is sent as the very first line,
//! before any protocol traffic.

use super::{LineBuffer, LineTransport, TransportError, TransportType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

const LINE_ENDING: &str = "\r\n";

/// TCP connection configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Connection timeout in seconds
    pub timeout_secs: u64,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Password written as the first line after connecting
    pub password: Option<String>,
}

impl std::fmt::Debug for TcpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout_secs", &self.timeout_secs)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl TcpConfig {
    /// Create a new TCP configuration
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout_secs: 10,
            read_timeout_ms: 1000,
            password: None,
        }
    }

    /// Set timeout
    #[must_use]
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the login password
    #[must_use]
    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Set read timeout
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self::new("192.168.254.254", 23)
    }
}

/// TCP transport
pub struct TcpTransport {
    config: TcpConfig,
    reader: Mutex<Option<(OwnedReadHalf, LineBuffer)>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    open: AtomicBool,
}

impl TcpTransport {
    /// Create a new TCP transport
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            open: AtomicBool::new(false),
        }
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.config.read_timeout_ms)
    }
}

#[async_trait]
impl LineTransport for TcpTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn open(&self) -> Result<(), TransportError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let stream = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            TcpStream::connect(&addr),
        )
        .await
        .map_err(|_| TransportError::Timeout(Duration::from_secs(self.config.timeout_secs)))?
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        stream.set_nodelay(true).map_err(TransportError::IoError)?;

        let (read_half, mut write_half) = stream.into_split();

        if let Some(password) = &self.config.password {
            write_half
                .write_all(format!("{password}{LINE_ENDING}").as_bytes())
                .await?;
            write_half.flush().await?;
            debug!(addr = %addr, "password sent");
        }

        *self.reader.lock().await = Some((read_half, LineBuffer::new()));
        *self.writer.lock().await = Some(write_half);
        self.open.store(true, Ordering::Release);

        info!(addr = %addr, "tcp connection opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::Release);
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.shutdown().await.ok();
        }
        self.reader.lock().await.take();
        info!(host = %self.config.host, port = self.config.port, "tcp connection closed");
        Ok(())
    }

    async fn write(&self, text: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;

        writer
            .write_all(format!("{text}{LINE_ENDING}").as_bytes())
            .await?;
        writer.flush().await?;

        trace!(text, "tcp write");
        Ok(())
    }

    async fn read_line(&self) -> Result<String, TransportError> {
        let timeout = self.read_timeout();
        let mut guard = self.reader.lock().await;
        let (reader, lines) = guard.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            if let Some(line) = lines.next_line() {
                return Ok(line);
            }
            // read_buf is cancel safe, partial lines stay in the buffer
            match tokio::time::timeout(timeout, reader.read_buf(lines.buf_mut())).await {
                Err(_) => return Err(TransportError::Timeout(timeout)),
                Ok(Ok(0)) => return Err(TransportError::Disconnected),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(TransportError::IoError(e)),
            }
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Tcp
    }

    fn connection_info(&self) -> String {
        format!("tcp://{}:{}", self.config.host, self.config.port)
    }
}
