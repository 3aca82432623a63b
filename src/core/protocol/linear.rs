//! Linear channel switcher protocol
//!
//! One active channel per medium. Responses are dispatched on their leading
//! character, case-insensitive:
//!
//! | Line | Meaning |
//! |---|---|
//! | `E<nn>` | device error code |
//! | `AMUT<0/1>` | audio mute |
//! | `A<n>` | audio channel |
//! | `C<n>` | audio and video channel |
//! | `V<n> A<n> T<n> ... M<n>` | identify report |
//! | `V<n>` | video channel |
//! | `B<0/1>` | RGB mute |
//! | `QSC<ver>` / `Q..<ver>` | switcher / projector firmware |
//! | `M<0/1>` | projector display mute |
//! | `PR<0/1>` | projector power |

use super::{DeviceErrorCode, ProtocolHandler, Response, RuleTable};
use crate::core::callbacks::ErrorCallbacks;
use crate::core::connection::CommandLink;
use crate::core::state::{SwitcherState, VideoType};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Error messages reported by the switcher
pub const ERROR_CODES: &[(&str, &str)] = &[
    ("E01", "Invalid Channel Number"),
    ("E02", "Slave Communication Error"),
    ("E03", "Projector is powered OFF"),
    ("E04", "Projector Communication Error"),
    ("E06", "VLB switch enabled & last input selected"),
];

/// Fields decoded from an identify report
///
/// A token that fails to parse leaves its field `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifyReport {
    /// `V` token
    pub video_channel: Option<u16>,
    /// `A` token
    pub audio_channel: Option<u16>,
    /// `T` token
    pub video_type: Option<VideoType>,
    /// `P` token
    pub projector_powered: Option<bool>,
    /// `S` token
    pub projector_muted: Option<bool>,
    /// `Z` token
    pub audio_muted: Option<bool>,
    /// `R` token
    pub rgb_muted: Option<bool>,
    /// `QSC` token
    pub switcher_firmware: Option<String>,
    /// `QPC` token
    pub projector_firmware: Option<String>,
    /// `M` token
    pub channels: Option<u16>,
}

impl IdentifyReport {
    /// Decode the positional token list `V A T P S Z R QSC QPC M`
    pub fn parse(line: &str) -> Self {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let number = |idx: usize, prefix: &str| report_token(&tokens, idx, prefix)?.parse::<u16>().ok();
        let flag = |idx: usize, prefix: &str| number(idx, prefix).map(|v| v == 1);

        Self {
            video_channel: number(0, "V"),
            audio_channel: number(1, "A"),
            video_type: report_token(&tokens, 2, "T")
                .and_then(|v| v.parse::<u8>().ok())
                .map(VideoType::from),
            projector_powered: flag(3, "P"),
            projector_muted: flag(4, "S"),
            audio_muted: flag(5, "Z"),
            rgb_muted: flag(6, "R"),
            switcher_firmware: report_token(&tokens, 7, "QSC").map(str::to_string),
            projector_firmware: report_token(&tokens, 8, "QPC").map(str::to_string),
            channels: number(9, "M"),
        }
    }
}

// Value of the token at `idx` if it carries the expected prefix.
fn report_token<'a>(tokens: &[&'a str], idx: usize, prefix: &str) -> Option<&'a str> {
    let tok = *tokens.get(idx)?;
    let head = tok.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &tok[prefix.len()..])
}

/// Parsed switcher response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitcherEvent {
    /// Audio and video switched together
    Channel(u16),
    /// Audio switched
    AudioChannel(u16),
    /// Video switched
    VideoChannel(u16),
    /// Audio mute changed
    AudioMute(bool),
    /// RGB mute changed
    RgbMute(bool),
    /// Switcher firmware reported
    SwitcherFirmware(String),
    /// Projector firmware reported
    ProjectorFirmware(String),
    /// Projector display mute changed
    ProjectorMute(bool),
    /// Projector power changed
    ProjectorPower(bool),
    /// Identify report
    Identified(IdentifyReport),
    /// Device error code
    DeviceError(DeviceErrorCode),
}

/// Outbound switcher command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitcherCommand {
    /// Request the identify report
    Identify,
    /// Switch audio and video
    Channel(u16),
    /// Switch video only
    VideoChannel(u16),
    /// Switch audio only
    AudioChannel(u16),
    /// Request firmware versions
    SoftwareVersions,
    /// Projector power on/off
    ProjectorPower(bool),
    /// Projector picture visible/blanked
    ProjectorVisibility(bool),
    /// RGB visible/muted
    RgbVisibility(bool),
    /// Audio muted/unmuted
    AudioMute(bool),
}

impl SwitcherCommand {
    /// Wire text
    pub fn encode(&self) -> String {
        match self {
            Self::Identify => "I".to_string(),
            Self::Channel(n) => format!("{n}!"),
            Self::VideoChannel(n) => format!("{n}&"),
            Self::AudioChannel(n) => format!("{n}$"),
            Self::SoftwareVersions => "q".to_string(),
            Self::ProjectorPower(on) => toggle(*on, "[", "]"),
            Self::ProjectorVisibility(visible) => toggle(*visible, ")", "("),
            Self::RgbVisibility(visible) => toggle(*visible, "b", "B"),
            Self::AudioMute(muted) => toggle(*muted, "+", "-"),
        }
    }
}

fn toggle(flag: bool, on: &str, off: &str) -> String {
    if flag { on } else { off }.to_string()
}

fn lead_is(r: &Response<'_>, c: char) -> bool {
    r.lead() == Some(c)
}

fn number_after(r: &Response<'_>, skip: usize) -> Option<u16> {
    r.line.get(skip..)?.trim().parse().ok()
}

fn suffix_after(r: &Response<'_>, skip: usize) -> Option<String> {
    r.line.get(skip..).map(str::to_string)
}

/// Response parser for linear switchers
pub struct SwitcherParser {
    rules: RuleTable<SwitcherEvent>,
}

impl SwitcherParser {
    /// Build the rule table
    pub fn new() -> Self {
        let rules = RuleTable::new()
            .rule(
                "error",
                |r| lead_is(r, 'E'),
                |r| Some(SwitcherEvent::DeviceError(DeviceErrorCode::lookup(r.line, ERROR_CODES))),
            )
            .rule(
                "audio-mute",
                |r| r.line.len() > 3 && r.starts_with_ignore_case("AMUT"),
                |r| Some(SwitcherEvent::AudioMute(r.trailing_flag())),
            )
            .rule(
                "audio",
                |r| lead_is(r, 'A'),
                |r| number_after(r, 1).map(SwitcherEvent::AudioChannel),
            )
            .rule(
                "channel",
                |r| lead_is(r, 'C'),
                |r| number_after(r, 1).map(SwitcherEvent::Channel),
            )
            .rule(
                "identify",
                |r| lead_is(r, 'V') && r.line.split_whitespace().count() > 1,
                |r| Some(SwitcherEvent::Identified(IdentifyReport::parse(r.line))),
            )
            .rule(
                "video",
                |r| lead_is(r, 'V'),
                |r| number_after(r, 1).map(SwitcherEvent::VideoChannel),
            )
            .rule(
                "rgb-mute",
                |r| lead_is(r, 'B'),
                |r| Some(SwitcherEvent::RgbMute(r.trailing_flag())),
            )
            .rule(
                "switcher-firmware",
                |r| r.starts_with_ignore_case("QSC"),
                |r| suffix_after(r, 3).map(SwitcherEvent::SwitcherFirmware),
            )
            .rule(
                "projector-firmware",
                |r| lead_is(r, 'Q'),
                |r| suffix_after(r, 3).map(SwitcherEvent::ProjectorFirmware),
            )
            .rule(
                "projector-mute",
                |r| lead_is(r, 'M'),
                |r| Some(SwitcherEvent::ProjectorMute(r.trailing_flag())),
            )
            .rule(
                "projector-power",
                |r| r.starts_with_ignore_case("PR"),
                |r| Some(SwitcherEvent::ProjectorPower(r.trailing_flag())),
            );

        Self { rules }
    }

    /// Parse one response line
    pub fn parse(&self, response: &Response<'_>) -> Option<SwitcherEvent> {
        if response.line.is_empty() {
            return None;
        }
        self.rules.dispatch(response)
    }
}

impl Default for SwitcherParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Protocol handler wiring the parser to switcher state
pub struct SwitcherProtocol {
    parser: SwitcherParser,
    state: Arc<SwitcherState>,
    callbacks: ErrorCallbacks,
}

impl SwitcherProtocol {
    /// Create a handler writing into `state` and reporting through `callbacks`
    pub fn new(state: Arc<SwitcherState>, callbacks: ErrorCallbacks) -> Self {
        Self {
            parser: SwitcherParser::new(),
            state,
            callbacks,
        }
    }

    /// Shared state
    pub fn state(&self) -> &Arc<SwitcherState> {
        &self.state
    }

    /// Error callbacks
    pub fn callbacks(&self) -> &ErrorCallbacks {
        &self.callbacks
    }
}

impl ProtocolHandler for SwitcherProtocol {
    fn on_open(&self, _link: &CommandLink) {
        self.state.reset();
    }

    fn handle(&self, response: &Response<'_>, link: &CommandLink) {
        let Some(event) = self.parser.parse(response) else {
            debug!(line = response.line, "unhandled switcher response");
            return;
        };

        match &event {
            SwitcherEvent::DeviceError(code) => {
                warn!(code = %code.code, message = %code.message, "device error");
                self.callbacks.invoke(&code.message);
            }
            SwitcherEvent::Identified(report) => {
                self.state.apply(&event);
                info!(channels = ?report.channels, "switcher identified");
                link.readiness().set(true);
            }
            _ => self.state.apply(&event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<SwitcherEvent> {
        SwitcherParser::new().parse(&Response::unsolicited(line))
    }

    #[test]
    fn test_identify_report() {
        let report = IdentifyReport::parse("V4 A4 T1 P0 S0 Z0 R0 QSC1.11 QPC1.11 M4");
        assert_eq!(report.channels, Some(4));
        assert_eq!(report.video_channel, Some(4));
        assert_eq!(report.audio_channel, Some(4));
        assert_eq!(report.video_type, Some(VideoType::Rgbs));
        assert_eq!(report.projector_powered, Some(false));
        assert_eq!(report.switcher_firmware.as_deref(), Some("1.11"));
        assert_eq!(report.projector_firmware.as_deref(), Some("1.11"));
    }

    #[test]
    fn test_identify_bad_token_leaves_field_unset() {
        let report = IdentifyReport::parse("V2 Ax T9 P1 S1 Z1 R1 QSC2.00 QPC1.05 M8");
        assert_eq!(report.video_channel, Some(2));
        assert_eq!(report.audio_channel, None);
        assert_eq!(report.video_type, Some(VideoType::Unknown));
        assert_eq!(report.rgb_muted, Some(true));
        assert_eq!(report.channels, Some(8));

        let short = IdentifyReport::parse("V2 A3");
        assert_eq!(short.audio_channel, Some(3));
        assert_eq!(short.channels, None);
        assert_eq!(short.switcher_firmware, None);
    }

    #[test]
    fn test_dispatch_order() {
        assert_eq!(parse("AMUT1"), Some(SwitcherEvent::AudioMute(true)));
        assert_eq!(parse("amut0"), Some(SwitcherEvent::AudioMute(false)));
        assert_eq!(parse("A3"), Some(SwitcherEvent::AudioChannel(3)));
        assert_eq!(parse("C7"), Some(SwitcherEvent::Channel(7)));
        assert_eq!(parse("v2"), Some(SwitcherEvent::VideoChannel(2)));
        assert_eq!(parse("B1"), Some(SwitcherEvent::RgbMute(true)));
        assert_eq!(parse("b"), Some(SwitcherEvent::RgbMute(false)));
        assert_eq!(parse("M1"), Some(SwitcherEvent::ProjectorMute(true)));
        assert_eq!(parse("PR1"), Some(SwitcherEvent::ProjectorPower(true)));
        assert_eq!(parse("P1"), None);
        assert!(matches!(parse("V4 A4 T1"), Some(SwitcherEvent::Identified(_))));
    }

    #[test]
    fn test_firmware() {
        assert_eq!(parse("QSC1.11"), Some(SwitcherEvent::SwitcherFirmware("1.11".into())));
        assert_eq!(parse("qpc2.04"), Some(SwitcherEvent::ProjectorFirmware("2.04".into())));
    }

    #[test]
    fn test_error_codes() {
        let expected = [
            ("E01", "Invalid Channel Number"),
            ("E02", "Slave Communication Error"),
            ("E03", "Projector is powered OFF"),
            ("E04", "Projector Communication Error"),
            ("E06", "VLB switch enabled & last input selected"),
            ("E99", "unknown error code E99"),
        ];
        for (code, message) in expected {
            match parse(code) {
                Some(SwitcherEvent::DeviceError(err)) => assert_eq!(err.message, message),
                other => panic!("{code}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_encode() {
        assert_eq!(SwitcherCommand::Channel(3).encode(), "3!");
        assert_eq!(SwitcherCommand::VideoChannel(2).encode(), "2&");
        assert_eq!(SwitcherCommand::AudioChannel(1).encode(), "1$");
        assert_eq!(SwitcherCommand::SoftwareVersions.encode(), "q");
        assert_eq!(SwitcherCommand::ProjectorPower(true).encode(), "[");
        assert_eq!(SwitcherCommand::ProjectorPower(false).encode(), "]");
        assert_eq!(SwitcherCommand::ProjectorVisibility(true).encode(), ")");
        assert_eq!(SwitcherCommand::RgbVisibility(false).encode(), "B");
        assert_eq!(SwitcherCommand::AudioMute(true).encode(), "+");
        assert_eq!(SwitcherCommand::AudioMute(false).encode(), "-");
    }
}
