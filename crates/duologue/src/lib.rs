//! duologue - two LLM sessions talking to each other.
//!
//! A run asks both speakers for consent, records A's opening line, then
//! alternates B and A for the configured number of rounds. Every turn is
//! appended to a Markdown log as it happens and a summary is generated once
//! the loop is over.

pub mod conversation;
pub mod models;
pub mod provider;
pub mod session;
pub mod summary;
pub mod telemetry;

pub use conversation::{is_refusal, Conversation, ConversationOutcome, Progress};
pub use models::{check_model_access, ModelReport};
pub use provider::{
    backend_from_config, BackendError, ChatBackend, CompletionRequest, GeminiBackend, ModelInfo,
    OpenAiCompatBackend, Sampling,
};
pub use session::ModelSession;
pub use summary::Summarizer;
