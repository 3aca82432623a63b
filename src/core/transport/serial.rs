//! Serial port transport implementation

use super::{LineBuffer, LineTransport, TransportError, TransportType};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Serial port flow control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialFlowControl {
    /// No flow control
    #[default]
    None,
    /// Hardware flow control (RTS/CTS)
    Hardware,
    /// Software flow control (XON/XOFF)
    Software,
}

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

/// Serial port configuration
///
/// Defaults match the switcher's RS-232 port: 9600 baud, 8 data bits, no
/// parity, 1 stop bit, no handshake, DTR asserted and RTS released.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Flow control
    pub flow_control: SerialFlowControl,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
    /// Assert DTR after opening
    pub dtr: bool,
    /// Assert RTS after opening
    pub rts: bool,
}

impl SerialConfig {
    /// Create a new serial configuration with the switcher defaults
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: SerialFlowControl::None,
            read_timeout_ms: 1000,
            write_timeout_ms: 1000,
            dtr: true,
            rts: false,
        }
    }

    /// Set baud rate
    #[must_use]
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set read timeout
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set write timeout
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

impl SerialConfig {
    fn builder(&self) -> serialport::SerialPortBuilder {
        let data_bits = match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };
        let stop_bits = if self.stop_bits == 2 { StopBits::Two } else { StopBits::One };

        serialport::new(&self.port, self.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(self.parity.into())
            .flow_control(self.flow_control.into())
            .timeout(Duration::from_millis(self.read_timeout_ms))
    }

    // Short frame notation such as `8N1`.
    fn frame(&self) -> String {
        let parity = match self.parity {
            SerialParity::None => 'N',
            SerialParity::Odd => 'O',
            SerialParity::Even => 'E',
        };
        format!("{}{parity}{}", self.data_bits, self.stop_bits)
    }
}

impl From<SerialParity> for Parity {
    fn from(parity: SerialParity) -> Self {
        match parity {
            SerialParity::None => Parity::None,
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
        }
    }
}

impl From<SerialFlowControl> for FlowControl {
    fn from(flow: SerialFlowControl) -> Self {
        match flow {
            SerialFlowControl::None => FlowControl::None,
            SerialFlowControl::Hardware => FlowControl::Hardware,
            SerialFlowControl::Software => FlowControl::Software,
        }
    }
}

fn open_error(port: &str, e: &serialport::Error) -> TransportError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => TransportError::PortNotFound(port.to_string()),
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            TransportError::PermissionDenied(port.to_string())
        }
        _ => TransportError::ConnectionFailed(e.to_string()),
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("/dev/ttyUSB0")
    }
}

struct SerialReader {
    port: Box<dyn SerialPort>,
    lines: LineBuffer,
}

/// Serial port transport
///
/// The port handle is cloned after opening so reads (which block up to the
/// read timeout) never hold up writes.
pub struct SerialTransport {
    config: SerialConfig,
    reader: Arc<Mutex<Option<SerialReader>>>,
    writer: Mutex<Option<Box<dyn SerialPort>>>,
}

impl SerialTransport {
    /// Create a new serial transport
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            reader: Arc::new(Mutex::new(None)),
            writer: Mutex::new(None),
        }
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.config.read_timeout_ms)
    }

    fn read_blocking(
        reader: &Mutex<Option<SerialReader>>,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let mut guard = reader.lock();
        let reader = guard.as_mut().ok_or(TransportError::NotConnected)?;
        let mut chunk = [0u8; 256];

        loop {
            if let Some(line) = reader.lines.next_line() {
                return Ok(line);
            }
            match reader.port.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Disconnected),
                Ok(n) => reader.lines.extend(&chunk[..n]),
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(TransportError::Timeout(timeout));
                }
                Err(e) => return Err(TransportError::IoError(e)),
            }
        }
    }
}

#[async_trait]
impl LineTransport for SerialTransport {
    fn is_open(&self) -> bool {
        self.reader.lock().is_some()
    }

    async fn open(&self) -> Result<(), TransportError> {
        let mut port = self
            .config
            .builder()
            .open()
            .map_err(|e| open_error(&self.config.port, &e))?;

        port.write_data_terminal_ready(self.config.dtr)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        port.write_request_to_send(self.config.rts)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let mut writer = port
            .try_clone()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        writer
            .set_timeout(Duration::from_millis(self.config.write_timeout_ms))
            .map_err(|e| TransportError::ConfigError(e.to_string()))?;

        *self.reader.lock() = Some(SerialReader {
            port,
            lines: LineBuffer::new(),
        });
        *self.writer.lock() = Some(writer);

        info!(port = %self.config.port, "serial port opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.writer.lock().take();
        self.reader.lock().take();
        info!(port = %self.config.port, "serial port closed");
        Ok(())
    }

    async fn write(&self, text: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock();
        let port = guard.as_mut().ok_or(TransportError::NotConnected)?;

        port.write_all(text.as_bytes())?;
        port.flush()?;

        trace!(port = %self.config.port, text, "serial write");
        Ok(())
    }

    async fn read_line(&self) -> Result<String, TransportError> {
        let reader = Arc::clone(&self.reader);
        let timeout = self.read_timeout();

        let line = tokio::task::spawn_blocking(move || Self::read_blocking(&reader, timeout))
            .await
            .map_err(|e| TransportError::ReceiveError(e.to_string()))??;

        debug!(port = %self.config.port, line = %line, "serial line");
        Ok(line)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Serial
    }

    fn connection_info(&self) -> String {
        format!(
            "{} @ {} baud ({})",
            self.config.port,
            self.config.baud_rate,
            self.config.frame()
        )
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_line_settings() {
        let config = SerialConfig::new("COM5");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.data_bits, 8);
        assert_eq!(config.stop_bits, 1);
        assert_eq!(config.parity, SerialParity::None);
        assert_eq!(config.flow_control, SerialFlowControl::None);
        assert!(config.dtr);
        assert!(!config.rts);
    }

    #[test]
    fn test_connection_info() {
        let transport = SerialTransport::new(SerialConfig::new("/dev/ttyUSB1"));
        assert_eq!(transport.connection_info(), "/dev/ttyUSB1 @ 9600 baud (8N1)");
        assert!(!transport.is_open());

        let config = SerialConfig {
            data_bits: 7,
            parity: SerialParity::Even,
            stop_bits: 2,
            ..SerialConfig::new("COM1").baud_rate(19200)
        };
        let transport = SerialTransport::new(config);
        assert_eq!(transport.connection_info(), "COM1 @ 19200 baud (7E2)");
    }

    #[tokio::test]
    async fn test_write_before_open_fails() {
        let transport = SerialTransport::new(SerialConfig::default());
        let err = transport.write("I").await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }
}
