//! Simulated switchers
//!
//! In-process devices implementing [`LineTransport`], used by the tests and
//! by the CLI's `--simulate` flag. A [`DeviceModel`] turns every written
//! command into zero or more response lines, which are queued for
//! [`LineTransport::read_line`] exactly as a real device would send them.

use crate::core::state::MappingType;
use crate::core::transport::{LineTransport, TransportError, TransportType};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

/// Command-to-response behaviour of a simulated device
pub trait DeviceModel: Send + 'static {
    /// Lines the device answers `command` with
    fn respond(&mut self, command: &str) -> Vec<String>;
}

/// Line transport backed by a [`DeviceModel`]
pub struct SimulatedDevice<M: DeviceModel> {
    name: String,
    model: Mutex<M>,
    open: AtomicBool,
    tx: mpsc::UnboundedSender<String>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    written: Mutex<Vec<String>>,
    read_timeout: Duration,
}

impl<M: DeviceModel> SimulatedDevice<M> {
    /// Create a closed device
    pub fn new(name: &str, model: M) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            model: Mutex::new(model),
            open: AtomicBool::new(false),
            tx,
            rx: tokio::sync::Mutex::new(rx),
            written: Mutex::new(Vec::new()),
            read_timeout: Duration::from_millis(100),
        }
    }

    /// Set how long `read_line` waits before reporting a timeout
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Queue an unsolicited line
    pub fn inject(&self, line: &str) {
        let _ = self.tx.send(line.to_string());
    }

    /// Every command written so far
    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    /// Forget recorded commands
    pub fn clear_written(&self) {
        self.written.lock().clear();
    }

    /// Run `f` against the model
    pub fn with_model<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.model.lock())
    }
}

#[async_trait]
impl<M: DeviceModel> LineTransport for SimulatedDevice<M> {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn open(&self) -> Result<(), TransportError> {
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    async fn write(&self, text: &str) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        self.written.lock().push(text.to_string());

        let replies = self.model.lock().respond(text);
        trace!(device = %self.name, command = text, ?replies, "simulated exchange");
        for reply in replies {
            self.tx
                .send(reply)
                .map_err(|e| TransportError::SendError(e.to_string()))?;
        }
        Ok(())
    }

    async fn read_line(&self) -> Result<String, TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(self.read_timeout, rx.recv()).await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(TransportError::Disconnected),
            Err(_) => Err(TransportError::Timeout(self.read_timeout)),
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Simulated
    }

    fn connection_info(&self) -> String {
        format!("sim://{}", self.name)
    }
}

// `<n><suffix>` such as `3!` or `12$`.
fn numbered(command: &str) -> Option<(u16, char)> {
    let suffix = command.chars().last()?;
    let number = command[..command.len() - suffix.len_utf8()].parse().ok()?;
    Some((number, suffix))
}

fn flag(on: bool) -> char {
    if on {
        '1'
    } else {
        '0'
    }
}

/// Linear channel switcher with an optional projector controller
#[derive(Debug, Clone)]
pub struct SwitcherModel {
    /// Selectable channels
    pub channels: u16,
    /// Active video channel
    pub video_channel: u16,
    /// Active audio channel
    pub audio_channel: u16,
    /// Reported video type number
    pub video_type: u8,
    /// Whether a projector is attached to the control port
    pub projector_attached: bool,
    /// Projector power
    pub projector_powered: bool,
    /// Projector display mute
    pub projector_muted: bool,
    /// Audio mute
    pub audio_muted: bool,
    /// RGB mute
    pub rgb_muted: bool,
    /// Switcher firmware
    pub switcher_firmware: String,
    /// Projector controller firmware
    pub projector_firmware: String,
}

impl Default for SwitcherModel {
    fn default() -> Self {
        Self {
            channels: 4,
            video_channel: 1,
            audio_channel: 1,
            video_type: 1,
            projector_attached: false,
            projector_powered: false,
            projector_muted: false,
            audio_muted: false,
            rgb_muted: false,
            switcher_firmware: "1.11".to_string(),
            projector_firmware: "1.11".to_string(),
        }
    }
}

impl SwitcherModel {
    /// Identify report for the current state
    pub fn identify_line(&self) -> String {
        format!(
            "V{} A{} T{} P{} S{} Z{} R{} QSC{} QPC{} M{}",
            self.video_channel,
            self.audio_channel,
            self.video_type,
            flag(self.projector_powered),
            flag(self.projector_muted),
            flag(self.audio_muted),
            flag(self.rgb_muted),
            self.switcher_firmware,
            self.projector_firmware,
            self.channels,
        )
    }

    fn projector(&mut self, apply: impl FnOnce(&mut Self) -> String) -> Vec<String> {
        if self.projector_attached {
            vec![apply(self)]
        } else {
            vec!["E04".to_string()]
        }
    }
}

impl DeviceModel for SwitcherModel {
    fn respond(&mut self, command: &str) -> Vec<String> {
        match command {
            "I" | "i" => vec![self.identify_line()],
            "q" | "Q" => vec![
                format!("QSC{}", self.switcher_firmware),
                format!("QPC{}", self.projector_firmware),
            ],
            "[" | "]" => self.projector(|m| {
                m.projector_powered = command == "[";
                format!("PR{}", flag(m.projector_powered))
            }),
            ")" | "(" => self.projector(|m| {
                m.projector_muted = command == "(";
                format!("M{}", flag(m.projector_muted))
            }),
            "b" | "B" => {
                self.rgb_muted = command == "B";
                vec![format!("B{}", flag(self.rgb_muted))]
            }
            "+" | "-" => {
                self.audio_muted = command == "+";
                vec![format!("AMUT{}", flag(self.audio_muted))]
            }
            _ => match numbered(command) {
                Some((n, _)) if n > self.channels => vec!["E01".to_string()],
                Some((n, '!')) => {
                    self.video_channel = n;
                    self.audio_channel = n;
                    vec![format!("C{n}")]
                }
                Some((n, '&')) => {
                    self.video_channel = n;
                    vec![format!("V{n}")]
                }
                Some((n, '$')) => {
                    self.audio_channel = n;
                    vec![format!("A{n}")]
                }
                _ => Vec::new(),
            },
        }
    }
}

/// Matrix crosspoint switcher
#[derive(Debug, Clone)]
pub struct MatrixModel {
    /// Input ports
    pub inputs: u16,
    /// Output ports
    pub outputs: u16,
    /// `(video, audio)` input per output, index 0 is output 1
    pub ties: Vec<(u16, u16)>,
    /// Firmware version
    pub firmware: String,
    /// Front panel lock mode number
    pub lock_mode: u8,
    /// Confirm ties with a bare input number instead of `Out<o> In<i> <type>`
    pub terse: bool,
}

impl MatrixModel {
    /// Untied matrix with the given port counts
    pub fn new(inputs: u16, outputs: u16) -> Self {
        Self {
            inputs,
            outputs,
            ties: vec![(0, 0); usize::from(outputs)],
            firmware: "1.23".to_string(),
            lock_mode: 0,
            terse: false,
        }
    }

    /// Use terse tie confirmations
    #[must_use]
    pub fn terse(mut self, terse: bool) -> Self {
        self.terse = terse;
        self
    }

    /// Preset one output's ties
    #[must_use]
    pub fn with_tie(mut self, output: u16, video: u16, audio: u16) -> Self {
        if let Some(slot) = self.slot(output) {
            *slot = (video, audio);
        }
        self
    }

    fn slot(&mut self, output: u16) -> Option<&mut (u16, u16)> {
        let idx = usize::from(output.checked_sub(1)?);
        self.ties.get_mut(idx)
    }

    fn tie(&mut self, input: u16, output: u16, kind: MappingType) -> String {
        if input > self.inputs {
            return "E01".to_string();
        }
        let terse = self.terse;
        let Some(slot) = self.slot(output) else {
            return "E12".to_string();
        };
        if kind.has_video() {
            slot.0 = input;
        }
        if kind.has_audio() {
            slot.1 = input;
        }
        if terse {
            input.to_string()
        } else {
            format!("Out{output} In{input} {kind}")
        }
    }

    fn query(&mut self, output: u16, kind: MappingType) -> String {
        match self.slot(output).copied() {
            Some((video, _)) if kind == MappingType::Video => video.to_string(),
            Some((_, audio)) => audio.to_string(),
            None => "E12".to_string(),
        }
    }
}

impl DeviceModel for MatrixModel {
    fn respond(&mut self, command: &str) -> Vec<String> {
        let reply = match command {
            "I" | "i" => format!(
                "V{i}X{o} A{i}X{o}",
                i = self.inputs,
                o = self.outputs
            ),
            "Q" | "q" => self.firmware.clone(),
            "X" | "x" => self.lock_mode.to_string(),
            _ => {
                if let Some((input, rest)) = command.split_once('*') {
                    match (input.parse::<u16>(), numbered(rest)) {
                        (Ok(input), Some((output, c))) => match MappingType::from_command_char(c) {
                            Some(kind) => self.tie(input, output, kind),
                            None => "E10".to_string(),
                        },
                        _ => "E10".to_string(),
                    }
                } else {
                    match numbered(command) {
                        Some((output, '%' | '&')) => self.query(output, MappingType::Video),
                        Some((output, '$')) => self.query(output, MappingType::Audio),
                        _ => "E10".to_string(),
                    }
                }
            }
        };
        vec![reply]
    }
}

/// Simulated linear switcher
pub type SimulatedSwitcher = SimulatedDevice<SwitcherModel>;

/// Simulated matrix switcher
pub type SimulatedMatrix = SimulatedDevice<MatrixModel>;
