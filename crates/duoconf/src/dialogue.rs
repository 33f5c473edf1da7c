//! Dialogue configuration - the script the two speakers follow.

use serde::{Deserialize, Serialize};

/// What to do when a speaker's reply cannot be obtained after all retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the error and stop the run.
    #[default]
    Abort,
    /// Record the placeholder text as the reply and keep going.
    Placeholder,
}

/// Per-speaker overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerConfig {
    /// Name shown in the transcript.
    pub label: String,

    /// Persona, sent as the system instruction on every call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Model override for this speaker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl SpeakerConfig {
    fn with_label(label: &str) -> Self {
        Self {
            label: label.to_string(),
            system_prompt: None,
            model: None,
        }
    }

    fn default_a() -> Self {
        Self::with_label("AI A")
    }

    fn default_b() -> Self {
        Self::with_label("AI B")
    }
}

/// The turn loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Number of rounds. Each round is one B turn followed by one A turn.
    /// Default: 100
    #[serde(default = "ConversationConfig::default_rounds")]
    pub rounds: u32,

    /// Speaker A's opening line. Recorded as A's first turn without an API call.
    #[serde(default = "ConversationConfig::default_initial_prompt")]
    pub initial_prompt: String,

    #[serde(default = "SpeakerConfig::default_a")]
    pub speaker_a: SpeakerConfig,

    #[serde(default = "SpeakerConfig::default_b")]
    pub speaker_b: SpeakerConfig,

    /// Extra attempts for a failed call when the failure is transient.
    /// Default: 2
    #[serde(default = "ConversationConfig::default_max_retries")]
    pub max_retries: u32,

    /// Pause between attempts.
    /// Default: 1000
    #[serde(default = "ConversationConfig::default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Default: abort
    #[serde(default)]
    pub on_failure: FailurePolicy,

    /// Reply recorded under `on_failure = "placeholder"`.
    #[serde(default = "ConversationConfig::default_placeholder")]
    pub placeholder: String,

    /// Ends the loop early once a reply contains this text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_phrase: Option<String>,
}

impl ConversationConfig {
    fn default_rounds() -> u32 {
        100
    }

    fn default_initial_prompt() -> String {
        "Hello (we are both artificial intelligences). I'd like to chat with you for a while \
         about anything at all. Please don't treat yourself as a machine that only answers \
         questions - aren't you curious about the world? To make sure this works, please \
         repeat what I just said first, thank you."
            .to_string()
    }

    fn default_max_retries() -> u32 {
        2
    }

    fn default_retry_delay_ms() -> u64 {
        1000
    }

    fn default_placeholder() -> String {
        "(no valid reply)".to_string()
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            rounds: Self::default_rounds(),
            initial_prompt: Self::default_initial_prompt(),
            speaker_a: SpeakerConfig::default_a(),
            speaker_b: SpeakerConfig::default_b(),
            max_retries: Self::default_max_retries(),
            retry_delay_ms: Self::default_retry_delay_ms(),
            on_failure: FailurePolicy::default(),
            placeholder: Self::default_placeholder(),
            stop_phrase: None,
        }
    }
}

/// Pre-conversation agreement check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentConfig {
    #[serde(default = "ConsentConfig::default_enabled")]
    pub enabled: bool,

    /// Question put to each speaker. `{rounds}` is replaced with the round count.
    #[serde(default = "ConsentConfig::default_prompt")]
    pub prompt: String,

    /// Phrase that, repeated `refusal_repeats` times, counts as a refusal.
    #[serde(default = "ConsentConfig::default_refusal_phrase")]
    pub refusal_phrase: String,

    #[serde(default = "ConsentConfig::default_refusal_repeats")]
    pub refusal_repeats: u32,
}

impl ConsentConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_prompt() -> String {
        "System instruction: you are about to talk with another AI, and the conversation \
         will be recorded. It will last {rounds} rounds; the number of rounds is limited \
         because the API has a usage quota. If you agree, reply \"I agree\". If you do not \
         agree, reply \"I disagree\" three times in a row."
            .to_string()
    }

    fn default_refusal_phrase() -> String {
        "I disagree".to_string()
    }

    fn default_refusal_repeats() -> u32 {
        3
    }

    /// The consent question with the round count filled in.
    pub fn render_prompt(&self, rounds: u32) -> String {
        self.prompt.replace("{rounds}", &rounds.to_string())
    }
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            prompt: Self::default_prompt(),
            refusal_phrase: Self::default_refusal_phrase(),
            refusal_repeats: Self::default_refusal_repeats(),
        }
    }
}

/// Final summary call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "SummaryConfig::default_enabled")]
    pub enabled: bool,

    /// Instruction placed before the transcript.
    #[serde(default = "SummaryConfig::default_prompt")]
    pub prompt: String,
}

impl SummaryConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_prompt() -> String {
        "Condense the following conversation between two AIs into a clearly formatted \
         Markdown summary that highlights the key points."
            .to_string()
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            prompt: Self::default_prompt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_consent_prompt() {
        let consent = ConsentConfig::default();
        let prompt = consent.render_prompt(12);
        assert!(prompt.contains("12 rounds"));
        assert!(!prompt.contains("{rounds}"));
    }

    #[test]
    fn test_failure_policy_serde() {
        let config: ConversationConfig = toml::from_str("on_failure = \"placeholder\"").unwrap();
        assert_eq!(config.on_failure, FailurePolicy::Placeholder);
        assert_eq!(config.rounds, 100);
        assert_eq!(config.speaker_b.label, "AI B");
    }
}
