//! Linear-channel switcher state

use crate::core::protocol::linear::{IdentifyReport, SwitcherEvent};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Signal type of the active video output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoType {
    /// Not reported yet or unrecognised
    #[default]
    Unknown = 0,
    /// RGBS
    Rgbs = 1,
    /// RGsB
    RgsB = 2,
    /// Composite video
    Composite = 3,
    /// S-Video
    SVideo = 4,
}

impl From<u8> for VideoType {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Rgbs,
            2 => Self::RgsB,
            3 => Self::Composite,
            4 => Self::SVideo,
            _ => Self::Unknown,
        }
    }
}

/// Point-in-time copy of every switcher field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitcherSnapshot {
    /// Number of selectable channels
    pub channels: u16,
    /// Active video channel
    pub video_channel: u16,
    /// Active audio channel
    pub audio_channel: u16,
    /// Output signal type
    pub video_type: VideoType,
    /// Projector power
    pub projector_powered: bool,
    /// Projector display mute
    pub projector_muted: bool,
    /// Audio mute
    pub audio_muted: bool,
    /// RGB mute
    pub rgb_muted: bool,
    /// Switcher firmware version
    pub switcher_firmware: Option<String>,
    /// Projector controller firmware version
    pub projector_firmware: Option<String>,
}

/// Shared switcher state, written by the dispatcher only
#[derive(Debug, Default)]
pub struct SwitcherState {
    inner: RwLock<SwitcherSnapshot>,
}

impl SwitcherState {
    /// Create zeroed state
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one parsed event into the state
    pub fn apply(&self, event: &SwitcherEvent) {
        let mut s = self.inner.write();
        match event {
            SwitcherEvent::Channel(n) => {
                s.video_channel = *n;
                s.audio_channel = *n;
            }
            SwitcherEvent::AudioChannel(n) => s.audio_channel = *n,
            SwitcherEvent::VideoChannel(n) => s.video_channel = *n,
            SwitcherEvent::AudioMute(on) => s.audio_muted = *on,
            SwitcherEvent::RgbMute(on) => s.rgb_muted = *on,
            SwitcherEvent::ProjectorMute(on) => s.projector_muted = *on,
            SwitcherEvent::ProjectorPower(on) => s.projector_powered = *on,
            SwitcherEvent::SwitcherFirmware(v) => s.switcher_firmware = Some(v.clone()),
            SwitcherEvent::ProjectorFirmware(v) => s.projector_firmware = Some(v.clone()),
            SwitcherEvent::Identified(report) => Self::apply_identify(&mut s, report),
            SwitcherEvent::DeviceError(_) => {}
        }
    }

    // Fields the report could not parse keep their previous value.
    fn apply_identify(s: &mut SwitcherSnapshot, report: &IdentifyReport) {
        if let Some(v) = report.channels {
            s.channels = v;
        }
        if let Some(v) = report.video_channel {
            s.video_channel = v;
        }
        if let Some(v) = report.audio_channel {
            s.audio_channel = v;
        }
        if let Some(v) = report.video_type {
            s.video_type = v;
        }
        if let Some(v) = report.projector_powered {
            s.projector_powered = v;
        }
        if let Some(v) = report.projector_muted {
            s.projector_muted = v;
        }
        if let Some(v) = report.audio_muted {
            s.audio_muted = v;
        }
        if let Some(v) = report.rgb_muted {
            s.rgb_muted = v;
        }
        if let Some(v) = &report.switcher_firmware {
            s.switcher_firmware = Some(v.clone());
        }
        if let Some(v) = &report.projector_firmware {
            s.projector_firmware = Some(v.clone());
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SwitcherSnapshot {
        self.inner.read().clone()
    }

    /// Reset to zeroed state
    pub fn reset(&self) {
        *self.inner.write() = SwitcherSnapshot::default();
    }

    /// Number of selectable channels
    pub fn channels(&self) -> u16 {
        self.inner.read().channels
    }

    /// Active video channel
    pub fn video_channel(&self) -> u16 {
        self.inner.read().video_channel
    }

    /// Active audio channel
    pub fn audio_channel(&self) -> u16 {
        self.inner.read().audio_channel
    }

    /// Output signal type
    pub fn video_type(&self) -> VideoType {
        self.inner.read().video_type
    }

    /// Projector power
    pub fn is_projector_powered(&self) -> bool {
        self.inner.read().projector_powered
    }

    /// Projector display mute
    pub fn is_projector_muted(&self) -> bool {
        self.inner.read().projector_muted
    }

    /// Audio mute
    pub fn is_audio_muted(&self) -> bool {
        self.inner.read().audio_muted
    }

    /// RGB mute
    pub fn is_rgb_muted(&self) -> bool {
        self.inner.read().rgb_muted
    }

    /// Switcher firmware version
    pub fn switcher_firmware(&self) -> Option<String> {
        self.inner.read().switcher_firmware.clone()
    }

    /// Projector controller firmware version
    pub fn projector_firmware(&self) -> Option<String> {
        self.inner.read().projector_firmware.clone()
    }
}
