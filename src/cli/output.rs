//! Command output formatting

use serde::Serialize;

/// How command results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Render `value` as text (via `text`) or JSON
pub fn format_output<T, F>(value: &T, format: OutputFormat, text: F) -> Result<String, serde_json::Error>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Text => Ok(text(value)),
        OutputFormat::Json => serde_json::to_string_pretty(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::OutputTie;

    #[test]
    fn test_json_and_text() {
        let ties = vec![OutputTie { output: 1, video_input: 3, audio_input: 0 }];
        let json = format_output(&ties, OutputFormat::Json, |_| String::new()).unwrap();
        assert!(json.contains("\"video_input\": 3"));

        let text = format_output(&ties, OutputFormat::Text, |t| format!("{} ties", t.len())).unwrap();
        assert_eq!(text, "1 ties");
    }
}
