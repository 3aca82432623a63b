//! Output-indexed tie table for matrix switchers
//!
//! Outputs are dense, numbered `1..=outputs`. An input of `0` means the
//! output is untied for that medium.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which media a tie carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingType {
    /// Audio and video together
    All,
    /// Video (RGB) only
    Video,
    /// Audio only
    Audio,
}

impl MappingType {
    /// Suffix character used in tie and query commands
    pub fn command_char(self) -> char {
        match self {
            Self::All => '!',
            Self::Video => '%',
            Self::Audio => '$',
        }
    }

    /// Parse a verbose type word (`All`, `RGB`, `Vid`, `Aud`) or a command suffix
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "all" | "!" => Some(Self::All),
            "rgb" | "vid" | "&" | "%" => Some(Self::Video),
            "aud" | "$" => Some(Self::Audio),
            _ => None,
        }
    }

    /// Parse a command suffix character
    pub fn from_command_char(c: char) -> Option<Self> {
        match c {
            '!' => Some(Self::All),
            '&' | '%' => Some(Self::Video),
            '$' => Some(Self::Audio),
            _ => None,
        }
    }

    /// Whether the tie touches video
    pub fn has_video(self) -> bool {
        matches!(self, Self::All | Self::Video)
    }

    /// Whether the tie touches audio
    pub fn has_audio(self) -> bool {
        matches!(self, Self::All | Self::Audio)
    }
}

impl fmt::Display for MappingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::Video => write!(f, "Vid"),
            Self::Audio => write!(f, "Aud"),
        }
    }
}

/// Current inputs routed to one output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTie {
    /// Output port number
    pub output: u16,
    /// Video input, 0 when untied
    pub video_input: u16,
    /// Audio input, 0 when untied
    pub audio_input: u16,
}

impl OutputTie {
    /// Untied entry for `output`
    pub fn new(output: u16) -> Self {
        Self {
            output,
            video_input: 0,
            audio_input: 0,
        }
    }
}

/// Tie table with one lock per output entry
///
/// The outer lock is only taken for writing when the table is reallocated;
/// each tie update locks its own entry, so the video and audio halves of an
/// `All` tie change together while other outputs stay untouched.
#[derive(Debug, Default)]
pub struct MappingTable {
    entries: RwLock<Vec<Mutex<OutputTie>>>,
}

impl MappingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table with `outputs` untied entries
    pub fn allocate(&self, outputs: u16) {
        let fresh = (1..=outputs).map(|o| Mutex::new(OutputTie::new(o))).collect();
        *self.entries.write() = fresh;
    }

    /// Apply one tie update; returns `false` when `output` is not in the table
    pub fn apply(&self, output: u16, input: u16, kind: MappingType) -> bool {
        let entries = self.entries.read();
        let Some(entry) = output
            .checked_sub(1)
            .and_then(|idx| entries.get(usize::from(idx)))
        else {
            return false;
        };

        let mut tie = entry.lock();
        if kind.has_video() {
            tie.video_input = input;
        }
        if kind.has_audio() {
            tie.audio_input = input;
        }
        true
    }

    /// Entry for `output`
    pub fn get(&self, output: u16) -> Option<OutputTie> {
        let entries = self.entries.read();
        let idx = usize::from(output.checked_sub(1)?);
        entries.get(idx).map(|entry| *entry.lock())
    }

    /// Copy of every entry, ordered by output
    pub fn snapshot(&self) -> Vec<OutputTie> {
        self.entries.read().iter().map(|entry| *entry.lock()).collect()
    }

    /// Number of outputs in the table
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the table has been allocated
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_zeroed() {
        let table = MappingTable::new();
        table.allocate(4);
        assert_eq!(table.len(), 4);
        for (i, tie) in table.snapshot().iter().enumerate() {
            assert_eq!(usize::from(tie.output), i + 1);
            assert_eq!((tie.video_input, tie.audio_input), (0, 0));
        }
    }

    #[test]
    fn test_apply_by_kind() {
        let table = MappingTable::new();
        table.allocate(2);

        assert!(table.apply(2, 5, MappingType::All));
        assert_eq!(table.get(2).unwrap(), OutputTie { output: 2, video_input: 5, audio_input: 5 });

        assert!(table.apply(2, 3, MappingType::Video));
        assert!(table.apply(2, 0, MappingType::Audio));
        assert_eq!(table.get(2).unwrap(), OutputTie { output: 2, video_input: 3, audio_input: 0 });

        assert!(!table.apply(0, 1, MappingType::All));
        assert!(!table.apply(3, 1, MappingType::All));
    }

    #[test]
    fn test_mapping_tokens() {
        assert_eq!(MappingType::from_token("RGB"), Some(MappingType::Video));
        assert_eq!(MappingType::from_token("vid"), Some(MappingType::Video));
        assert_eq!(MappingType::from_token("Aud"), Some(MappingType::Audio));
        assert_eq!(MappingType::from_token("ALL"), Some(MappingType::All));
        assert_eq!(MappingType::from_token("xyz"), None);
        assert_eq!(MappingType::from_command_char('&'), Some(MappingType::Video));
        assert_eq!(MappingType::Audio.command_char(), '$');
    }
}
