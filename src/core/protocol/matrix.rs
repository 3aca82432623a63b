//! Matrix crosspoint protocol
//!
//! Identify reports the port counts as `V{in}X{out} A{in}X{out}`. Ties are
//! confirmed in one of two grammars:
//!
//! - verbose `Out<o> In<i> <All|RGB|Vid|Aud>`, self-contained;
//! - terse, a bare input number. Output and tie type then come from the
//!   correlation ticket, which must end in `!`, `&`, `%` or `$`.
//!
//! After identify every output is queried for its video and audio tie, with
//! a settle delay between commands. The connection becomes ready once all
//! queries were written and every answer arrived.

use super::{DeviceErrorCode, ProtocolHandler, Response, RuleTable};
use crate::core::callbacks::ErrorCallbacks;
use crate::core::connection::CommandLink;
use crate::core::state::{LockMode, MappingType, MatrixState, Topology};
use parking_lot::Mutex;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

static IDENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"V(\d+)X(\d+) A(\d+)X(\d+)").expect("identity pattern"));

static VERBOSE_TIE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Out(\d+) In(\d+) (All|RGB|Vid|Aud)").expect("tie pattern")
});

static ERROR_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[Ee]\d+$").expect("error code pattern"));

/// Error messages reported by the matrix switcher
pub const ERROR_CODES: &[(&str, &str)] = &[
    ("E01", "Invalid input channel number"),
    ("E10", "Invalid command"),
    ("E11", "Invalid preset number"),
    ("E12", "Invalid output number"),
    ("E13", "Invalid value"),
    ("E14", "Illegal command for this configuration"),
    ("E22", "Busy"),
    ("E24", "Privilege violation"),
];

/// Default pause between bootstrap queries
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(150);

/// Parsed matrix response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixEvent {
    /// Port counts
    Identified(Topology),
    /// Tie confirmed or reported
    Tie {
        /// Output port
        output: u16,
        /// Input port, 0 when untied
        input: u16,
        /// Media carried
        kind: MappingType,
    },
    /// Firmware version
    Firmware(String),
    /// Front panel lock mode
    LockMode(LockMode),
    /// Device error code
    DeviceError(DeviceErrorCode),
}

/// Outbound matrix command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixCommand {
    /// Request port counts
    Identify,
    /// Route `input` to `output`
    Tie {
        /// Input port, 0 unties
        input: u16,
        /// Output port
        output: u16,
        /// Media carried
        kind: MappingType,
    },
    /// Ask which input feeds an output's video
    QueryVideo(u16),
    /// Ask which input feeds an output's audio
    QueryAudio(u16),
    /// Request the firmware version
    QueryFirmware,
    /// Request the front panel lock mode
    QueryLockMode,
}

impl MatrixCommand {
    /// Wire text
    pub fn encode(&self) -> String {
        match self {
            Self::Identify => "I".to_string(),
            Self::Tie {
                input,
                output,
                kind,
            } => format!("{input}*{output}{}", kind.command_char()),
            Self::QueryVideo(output) => format!("{output}%"),
            Self::QueryAudio(output) => format!("{output}$"),
            Self::QueryFirmware => "Q".to_string(),
            Self::QueryLockMode => "X".to_string(),
        }
    }
}

fn is_number(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

// Output and tie type carried by a tie or query ticket.
fn ticket_context(ticket: &str) -> Option<(u16, MappingType)> {
    let suffix = ticket.chars().last()?;
    let kind = MappingType::from_command_char(suffix)?;
    let body = &ticket[..ticket.len() - suffix.len_utf8()];
    let output = match body.split_once('*') {
        Some((_, output)) => output,
        None => body,
    };
    Some((output.trim().parse().ok()?, kind))
}

fn parse_identity(r: &Response<'_>) -> Option<MatrixEvent> {
    let caps = IDENTITY.captures(r.line)?;
    Some(MatrixEvent::Identified(Topology {
        inputs: caps[1].parse().ok()?,
        outputs: caps[2].parse().ok()?,
    }))
}

fn parse_verbose_tie(r: &Response<'_>) -> Option<MatrixEvent> {
    let caps = VERBOSE_TIE.captures(r.line)?;
    Some(MatrixEvent::Tie {
        output: caps[1].parse().ok()?,
        input: caps[2].parse().ok()?,
        kind: MappingType::from_token(&caps[3])?,
    })
}

fn parse_terse_tie(r: &Response<'_>) -> Option<MatrixEvent> {
    let (output, kind) = ticket_context(r.pending?)?;
    Some(MatrixEvent::Tie {
        output,
        input: r.line.parse().ok()?,
        kind,
    })
}

/// Response parser for matrix switchers
pub struct MatrixParser {
    rules: RuleTable<MatrixEvent>,
}

impl MatrixParser {
    /// Build the rule table
    pub fn new() -> Self {
        let rules = RuleTable::new()
            .rule(
                "error",
                |r| ERROR_CODE.is_match(r.line),
                |r| Some(MatrixEvent::DeviceError(DeviceErrorCode::lookup(r.line, ERROR_CODES))),
            )
            .rule("identify", |r| IDENTITY.is_match(r.line), parse_identity)
            .rule(
                "firmware",
                |r| r.answers("Q"),
                |r| Some(MatrixEvent::Firmware(r.line.to_string())),
            )
            .rule(
                "lock-mode",
                |r| r.answers("X") && is_number(r.line),
                |r| {
                    r.line
                        .parse()
                        .ok()
                        .and_then(LockMode::from_number)
                        .map(MatrixEvent::LockMode)
                },
            )
            .rule("tie-verbose", |r| VERBOSE_TIE.is_match(r.line), parse_verbose_tie)
            .rule(
                "tie-terse",
                |r| r.pending.is_some_and(|p| ticket_context(p).is_some()) && is_number(r.line),
                parse_terse_tie,
            );

        Self { rules }
    }

    /// Parse one response line
    pub fn parse(&self, response: &Response<'_>) -> Option<MatrixEvent> {
        if response.line.is_empty() {
            return None;
        }
        self.rules.dispatch(response)
    }
}

impl Default for MatrixParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Protocol handler wiring the parser to matrix state
pub struct MatrixProtocol {
    parser: MatrixParser,
    state: Arc<MatrixState>,
    callbacks: ErrorCallbacks,
    settle_delay: Duration,
    bootstrap: Mutex<Option<CancellationToken>>,
}

impl MatrixProtocol {
    /// Create a handler writing into `state` and reporting through `callbacks`
    pub fn new(state: Arc<MatrixState>, callbacks: ErrorCallbacks, settle_delay: Duration) -> Self {
        Self {
            parser: MatrixParser::new(),
            state,
            callbacks,
            settle_delay,
            bootstrap: Mutex::new(None),
        }
    }

    /// Shared state
    pub fn state(&self) -> &Arc<MatrixState> {
        &self.state
    }

    /// Error callbacks
    pub fn callbacks(&self) -> &ErrorCallbacks {
        &self.callbacks
    }

    fn cancel_bootstrap(&self) {
        if let Some(token) = self.bootstrap.lock().take() {
            token.cancel();
        }
    }

    fn start_bootstrap(&self, topology: Topology, link: &CommandLink) {
        self.cancel_bootstrap();
        link.readiness().set(false);
        let generation = self.state.begin_bootstrap(topology);

        let cancel = link.cancellation().child_token();
        *self.bootstrap.lock() = Some(cancel.clone());

        info!(
            inputs = topology.inputs,
            outputs = topology.outputs,
            "matrix identified, querying ties"
        );
        tokio::spawn(query_ties(
            link.clone(),
            Arc::clone(&self.state),
            generation,
            topology.outputs,
            self.settle_delay,
            cancel,
        ));
    }
}

async fn query_ties(
    link: CommandLink,
    state: Arc<MatrixState>,
    generation: u64,
    outputs: u16,
    settle: Duration,
    cancel: CancellationToken,
) {
    for output in 1..=outputs {
        for command in [MatrixCommand::QueryVideo(output), MatrixCommand::QueryAudio(output)] {
            if let Err(e) = link.send(&command.encode()).await {
                warn!(output, error = %e, "bootstrap query failed");
            }
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(generation, "bootstrap cancelled");
                    return;
                }
                () = tokio::time::sleep(settle) => {}
            }
        }
    }

    if state.finish_queries(generation) {
        link.readiness().set(true);
        info!(outputs, "matrix ready");
    } else {
        debug!(outstanding = state.outstanding(), "bootstrap queries sent, awaiting answers");
    }
}

impl ProtocolHandler for MatrixProtocol {
    fn on_open(&self, _link: &CommandLink) {
        self.cancel_bootstrap();
        self.state.reset();
    }

    fn handle(&self, response: &Response<'_>, link: &CommandLink) {
        let Some(event) = self.parser.parse(response) else {
            debug!(line = response.line, pending = ?response.pending, "unhandled matrix response");
            return;
        };

        match event {
            MatrixEvent::DeviceError(code) => {
                warn!(code = %code.code, message = %code.message, "device error");
                self.callbacks.invoke(&code.message);
            }
            MatrixEvent::Identified(topology) => self.start_bootstrap(topology, link),
            MatrixEvent::Tie {
                output,
                input,
                kind,
            } => {
                if output == 0 || usize::from(output) > self.state.table().len() {
                    debug!(output, input, %kind, "tie for unknown output ignored");
                } else if self.state.apply_tie(output, input, kind) {
                    link.readiness().set(true);
                    info!(outputs = self.state.outputs(), "matrix ready");
                }
            }
            MatrixEvent::Firmware(version) => self.state.set_firmware(&version),
            MatrixEvent::LockMode(mode) => self.state.set_lock_mode(mode),
        }
    }
}

impl Drop for MatrixProtocol {
    fn drop(&mut self) {
        self.cancel_bootstrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(pending: Option<&str>, line: &str) -> Option<MatrixEvent> {
        MatrixParser::new().parse(&Response::new(pending, line))
    }

    #[test]
    fn test_identity() {
        assert_eq!(
            parse(Some("I"), "V8X4 A8X4"),
            Some(MatrixEvent::Identified(Topology { inputs: 8, outputs: 4 }))
        );
    }

    #[test]
    fn test_verbose_ties() {
        assert_eq!(
            parse(None, "Out2 In3 Vid"),
            Some(MatrixEvent::Tie { output: 2, input: 3, kind: MappingType::Video })
        );
        assert_eq!(
            parse(Some("5*1!"), "out1 in5 all"),
            Some(MatrixEvent::Tie { output: 1, input: 5, kind: MappingType::All })
        );
        assert_eq!(
            parse(None, "Out4 In0 RGB"),
            Some(MatrixEvent::Tie { output: 4, input: 0, kind: MappingType::Video })
        );
        assert_eq!(
            parse(None, "Out3 In1 Aud"),
            Some(MatrixEvent::Tie { output: 3, input: 1, kind: MappingType::Audio })
        );
    }

    #[test]
    fn test_terse_ties_take_context_from_ticket() {
        assert_eq!(
            parse(Some("2%"), "7"),
            Some(MatrixEvent::Tie { output: 2, input: 7, kind: MappingType::Video })
        );
        assert_eq!(
            parse(Some("12$"), "0"),
            Some(MatrixEvent::Tie { output: 12, input: 0, kind: MappingType::Audio })
        );
        assert_eq!(
            parse(Some("3*2!"), "3"),
            Some(MatrixEvent::Tie { output: 2, input: 3, kind: MappingType::All })
        );
        assert_eq!(parse(None, "3"), None);
        assert_eq!(parse(Some("I"), "3"), None);
    }

    #[test]
    fn test_firmware_and_lock_mode() {
        assert_eq!(
            parse(Some("Q"), "1.23"),
            Some(MatrixEvent::Firmware("1.23".into()))
        );
        assert_eq!(
            parse(Some("x"), "2"),
            Some(MatrixEvent::LockMode(LockMode::Advanced))
        );
        assert_eq!(parse(Some("X"), "9"), None);
    }

    #[test]
    fn test_error_codes() {
        match parse(Some("9*1!"), "E01") {
            Some(MatrixEvent::DeviceError(code)) => {
                assert_eq!(code.message, "Invalid input channel number");
            }
            other => panic!("unexpected {other:?}"),
        }
        match parse(None, "e12") {
            Some(MatrixEvent::DeviceError(code)) => assert_eq!(code.code, "E12"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_encode() {
        let tie = MatrixCommand::Tie { input: 3, output: 2, kind: MappingType::Video };
        assert_eq!(tie.encode(), "3*2%");
        let tie = MatrixCommand::Tie { input: 1, output: 4, kind: MappingType::All };
        assert_eq!(tie.encode(), "1*4!");
        assert_eq!(MatrixCommand::QueryVideo(3).encode(), "3%");
        assert_eq!(MatrixCommand::QueryAudio(3).encode(), "3$");
        assert_eq!(MatrixCommand::QueryFirmware.encode(), "Q");
        assert_eq!(MatrixCommand::QueryLockMode.encode(), "X");
    }
}
