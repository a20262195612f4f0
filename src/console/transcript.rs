//! Append-only console transcript for a single run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of console history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    /// Text produced by the program (or by the backend about the program).
    Output {
        text: String,
        /// Error-flavored output (backend failures, faults).
        #[serde(default)]
        error: bool,
        at: DateTime<Utc>,
    },
    /// A value the user typed in response to an input request.
    Input { text: String, at: DateTime<Utc> },
}

impl TranscriptEntry {
    pub fn output(text: impl Into<String>) -> Self {
        Self::Output {
            text: text.into(),
            error: false,
            at: Utc::now(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Output {
            text: text.into(),
            error: true,
            at: Utc::now(),
        }
    }

    pub fn input(text: impl Into<String>) -> Self {
        Self::Input {
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Output { text, .. } | Self::Input { text, .. } => text,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Output { error: true, .. })
    }
}

/// Ordered console history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// True when the most recent entry is plain output with exactly `text`.
    pub fn ends_with_output(&self, text: &str) -> bool {
        matches!(self.entries.last(), Some(TranscriptEntry::Output { text: t, error: false, .. }) if t == text)
    }

    /// Console text: output verbatim, each input value on its own line.
    pub fn render(&self) -> String {
        let mut rendered = String::new();
        for entry in &self.entries {
            match entry {
                TranscriptEntry::Output { text, error, .. } => {
                    if *error {
                        rendered.push_str("\nERROR: ");
                    }
                    rendered.push_str(text);
                }
                TranscriptEntry::Input { text, .. } => {
                    rendered.push_str(text);
                    rendered.push('\n');
                }
            }
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_interleaves_prompt_and_input() {
        let mut t = Transcript::new();
        t.push(TranscriptEntry::output("Enter your name: "));
        t.push(TranscriptEntry::input("Ada"));
        t.push(TranscriptEntry::output("Hello, Ada\n"));
        assert_eq!(t.render(), "Enter your name: Ada\nHello, Ada\n");
    }

    #[test]
    fn render_marks_errors() {
        let mut t = Transcript::new();
        t.push(TranscriptEntry::error("boom"));
        assert_eq!(t.render(), "\nERROR: boom");
    }

    #[test]
    fn ends_with_output_ignores_inputs_and_errors() {
        let mut t = Transcript::new();
        assert!(!t.ends_with_output(""));
        t.push(TranscriptEntry::output("> "));
        assert!(t.ends_with_output("> "));
        t.push(TranscriptEntry::error("> "));
        assert!(!t.ends_with_output("> "));
        t.push(TranscriptEntry::input("> "));
        assert!(!t.ends_with_output("> "));
    }

    #[test]
    fn entry_serializes_with_kind_tag() {
        let json = serde_json::to_value(TranscriptEntry::input("42")).unwrap();
        assert_eq!(json["kind"], "input");
        assert_eq!(json["text"], "42");
    }
}
