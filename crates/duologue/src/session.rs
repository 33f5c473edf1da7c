use duochat::{ChatMessage, Speaker};

use crate::provider::CompletionRequest;

/// Rolling context for one speaker. Lives for a single run.
///
/// Each session sees its own lines as `assistant` and the other speaker's
/// lines as `user`, so both models believe they are the assistant.
#[derive(Debug, Clone)]
pub struct ModelSession {
    speaker: Speaker,
    model: String,
    system_prompt: Option<String>,
    history: Vec<ChatMessage>,
}

impl ModelSession {
    pub fn new(speaker: Speaker, model: impl Into<String>, system_prompt: Option<String>) -> Self {
        Self {
            speaker,
            model: model.into(),
            system_prompt: system_prompt.filter(|p| !p.trim().is_empty()),
            history: Vec::new(),
        }
    }

    pub fn speaker(&self) -> Speaker {
        self.speaker
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Record a line this speaker said without asking the model for it
    pub fn seed_own(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::assistant(text));
    }

    /// Record a line from the other speaker
    pub fn hear(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::user(text));
    }

    /// Record the model's reply to the last thing it heard
    pub fn remember_reply(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::assistant(text));
    }

    /// Borrow the whole history as the next call's input
    pub fn request(&self) -> CompletionRequest<'_> {
        CompletionRequest {
            model: &self.model,
            system_prompt: self.system_prompt.as_deref(),
            messages: &self.history,
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duochat::Role;

    #[test]
    fn test_histories_mirror_each_other() {
        let mut a = ModelSession::new(Speaker::A, "m", None);
        let mut b = ModelSession::new(Speaker::B, "m", Some("Be terse.".to_string()));

        a.seed_own("hello");
        b.hear("hello");
        b.remember_reply("hi");
        a.hear("hi");

        let roles = |s: &ModelSession| s.history().iter().map(|m| m.role).collect::<Vec<_>>();
        assert_eq!(roles(&a), vec![Role::Assistant, Role::User]);
        assert_eq!(roles(&b), vec![Role::User, Role::Assistant]);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_request_borrows_history() {
        let mut b = ModelSession::new(Speaker::B, "gemini-test", Some("Be terse.".to_string()));
        b.hear("hello");

        let request = b.request();
        assert_eq!(request.model, "gemini-test");
        assert_eq!(request.system_prompt, Some("Be terse."));
        assert_eq!(request.messages, &[ChatMessage::user("hello")]);
    }

    #[test]
    fn test_blank_persona_dropped() {
        let session = ModelSession::new(Speaker::A, "m", Some("  ".to_string()));
        assert!(session.request().system_prompt.is_none());
        assert!(session.is_empty());
    }
}
