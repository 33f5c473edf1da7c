//! Append-only transcript and the flat files it is written to.
//!
//! The conversation log holds exactly one line per turn:
//!
//! ```text
//! **AI A** (2026-10-18 14:02:11): Hello there!<br>How are you?
//! **AI B** (2026-10-18 14:02:13): Doing well.
//! ```
//!
//! Line breaks inside a reply are folded to `<br>`, which Markdown renders
//! as a break, so the file's line count always equals the number of turns.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use thiserror::Error;

use crate::types::{Speaker, Turn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("Turn out of order: expected speaker {expected}, got {got}")]
    OutOfTurn { expected: Speaker, got: Speaker },

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Refusing to write an empty summary")]
    EmptySummary,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> TranscriptError + '_ {
    move |source| TranscriptError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Ordered, append-only sequence of turns with strict A/B alternation.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Speaker allowed to take the next turn. A always opens.
    pub fn next_speaker(&self) -> Speaker {
        self.turns
            .last()
            .map(|t| t.speaker.other())
            .unwrap_or(Speaker::A)
    }

    /// Append a turn stamped with the current time
    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) -> Result<&Turn, TranscriptError> {
        self.push_at(speaker, text, Utc::now())
    }

    /// Append a turn with an explicit timestamp
    pub fn push_at(
        &mut self,
        speaker: Speaker,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<&Turn, TranscriptError> {
        let expected = self.next_speaker();
        if speaker != expected {
            return Err(TranscriptError::OutOfTurn {
                expected,
                got: speaker,
            });
        }

        self.turns.push(Turn {
            index: self.turns.len(),
            speaker,
            text: text.into(),
            timestamp,
        });

        Ok(&self.turns[self.turns.len() - 1])
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Fold every line break in `text` to `<br>` so a turn occupies one line.
pub fn fold_line_breaks(text: &str) -> String {
    text.trim()
        .replace("\r\n", "<br>")
        .replace(['\n', '\r'], "<br>")
}

/// Writes turns to the conversation log as they happen.
///
/// The file is opened, appended and closed for every turn, so a crash
/// mid-run leaves every completed turn on disk.
#[derive(Debug, Clone)]
pub struct TranscriptWriter {
    path: PathBuf,
    label_a: String,
    label_b: String,
}

impl TranscriptWriter {
    pub fn new(path: impl Into<PathBuf>, label_a: impl Into<String>, label_b: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            label_a: label_a.into(),
            label_b: label_b.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn label(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::A => &self.label_a,
            Speaker::B => &self.label_b,
        }
    }

    /// Create the log (and its directory), truncating any previous run.
    pub fn create(&self) -> Result<(), TranscriptError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        fs::File::create(&self.path).map_err(io_error(&self.path))?;
        Ok(())
    }

    /// Render a turn as its log line, without the trailing newline.
    pub fn format_turn(&self, turn: &Turn) -> String {
        format!(
            "**{}** ({}): {}",
            self.label(turn.speaker),
            turn.timestamp.with_timezone(&Local).format(TIMESTAMP_FORMAT),
            fold_line_breaks(&turn.text)
        )
    }

    /// Append one turn to the log.
    pub fn append(&self, turn: &Turn) -> Result<(), TranscriptError> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(io_error(&self.path))?;

        writeln!(file, "{}", self.format_turn(turn)).map_err(io_error(&self.path))?;
        file.flush().map_err(io_error(&self.path))?;
        Ok(())
    }

    /// Read the whole log back.
    pub fn read_all(&self) -> Result<String, TranscriptError> {
        fs::read_to_string(&self.path).map_err(io_error(&self.path))
    }
}

/// Write the final summary file, replacing any previous one.
pub fn write_summary(
    path: &Path,
    summary: &str,
    generated_at: DateTime<Local>,
) -> Result<(), TranscriptError> {
    let summary = summary.trim();
    if summary.is_empty() {
        return Err(TranscriptError::EmptySummary);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let contents = format!(
        "# Conversation Summary\n\n**Generated:** {}\n\n---\n\n{}\n",
        generated_at.format(TIMESTAMP_FORMAT),
        summary
    );
    fs::write(path, contents).map_err(io_error(path))
}
