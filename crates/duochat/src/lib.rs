pub mod transcript;
pub mod types;

pub use transcript::{Transcript, TranscriptError, TranscriptWriter, write_summary};
pub use types::*;
