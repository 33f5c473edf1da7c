//! The turn loop.
//!
//! A run goes through three phases:
//!
//! 1. **Consent** - each speaker is asked, with no history, whether it agrees
//!    to a recorded conversation. A refusal ends the run before any file is
//!    touched.
//! 2. **Opening** - A's configured opening line becomes turn 0 without an
//!    API call.
//! 3. **Rounds** - B answers the latest A line, then A answers B. Every reply
//!    is pushed onto the shared transcript, appended to the log and added to
//!    both rolling histories.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use uuid::Uuid;

use duochat::{ChatMessage, Speaker, Transcript, TranscriptWriter, Turn};
use duoconf::{ConsentConfig, ConversationConfig, DuoConfig, FailurePolicy};

use crate::provider::{BackendError, ChatBackend, CompletionRequest};
use crate::session::ModelSession;

/// How a run ended.
#[derive(Debug)]
pub enum ConversationOutcome {
    /// A speaker refused at the consent gate. No files were written.
    Declined { speaker: Speaker, reply: String },

    /// The loop ran to its end, or to the stop phrase.
    Completed {
        transcript: Transcript,
        rounds_completed: u32,
        stopped_early: bool,
    },
}

/// Events surfaced while a run is in progress.
#[derive(Debug)]
pub enum Progress<'a> {
    ConsentGiven { speaker: Speaker },
    RoundStarted { round: u32, total: u32 },
    TurnRecorded { turn: &'a Turn, label: &'a str },
    ReplyFailed { speaker: Speaker, error: &'a BackendError },
}

type ProgressHook = Box<dyn FnMut(Progress<'_>) + Send + Sync>;

/// Extra attempts and the pause between them for transient backend failures.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn from_config(config: &ConversationConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

pub struct Conversation {
    backend: Arc<dyn ChatBackend>,
    config: ConversationConfig,
    consent: ConsentConfig,
    retry: RetryPolicy,
    run_id: Uuid,
    a: ModelSession,
    b: ModelSession,
    progress: Option<ProgressHook>,
}

impl Conversation {
    pub fn new(backend: Arc<dyn ChatBackend>, config: &DuoConfig) -> Self {
        let conversation = &config.conversation;
        let model_for = |model: &Option<String>| {
            model
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| config.backend.default_model.clone())
        };

        Self {
            backend,
            a: ModelSession::new(
                Speaker::A,
                model_for(&conversation.speaker_a.model),
                conversation.speaker_a.system_prompt.clone(),
            ),
            b: ModelSession::new(
                Speaker::B,
                model_for(&conversation.speaker_b.model),
                conversation.speaker_b.system_prompt.clone(),
            ),
            retry: RetryPolicy::from_config(conversation),
            config: conversation.clone(),
            consent: config.consent.clone(),
            run_id: Uuid::new_v4(),
            progress: None,
        }
    }

    /// Receive progress events as the run advances.
    pub fn with_progress(mut self, hook: impl FnMut(Progress<'_>) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(hook));
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn session(&self, speaker: Speaker) -> &ModelSession {
        match speaker {
            Speaker::A => &self.a,
            Speaker::B => &self.b,
        }
    }

    fn session_mut(&mut self, speaker: Speaker) -> &mut ModelSession {
        match speaker {
            Speaker::A => &mut self.a,
            Speaker::B => &mut self.b,
        }
    }

    fn emit(&mut self, event: Progress<'_>) {
        if let Some(hook) = self.progress.as_mut() {
            hook(event);
        }
    }

    /// Run consent, the opening and every round, writing the log as it goes.
    #[tracing::instrument(
        skip(self, writer),
        fields(
            run.id = %self.run_id,
            run.rounds = self.config.rounds,
            backend = self.backend.name(),
        )
    )]
    pub async fn run(&mut self, writer: &TranscriptWriter) -> Result<ConversationOutcome> {
        if self.consent.enabled {
            for speaker in [Speaker::A, Speaker::B] {
                if let Some(reply) = self.ask_consent(speaker).await? {
                    tracing::warn!(speaker = %speaker, "Speaker declined the conversation");
                    return Ok(ConversationOutcome::Declined { speaker, reply });
                }
                self.emit(Progress::ConsentGiven { speaker });
            }
            tracing::info!("Both speakers agreed");
        }

        writer
            .create()
            .with_context(|| format!("Failed to create {}", writer.path().display()))?;

        let mut transcript = Transcript::new();
        let opening = self.config.initial_prompt.clone();
        self.a.seed_own(opening.as_str());
        self.record(&mut transcript, writer, Speaker::A, opening.clone())?;

        let total = self.config.rounds;
        let mut latest = opening;
        let mut rounds_completed = 0;
        let mut stopped_early = false;

        for round in 1..=total {
            self.emit(Progress::RoundStarted { round, total });
            tracing::info!(round, total, "Round started");

            let reply_b = self.take_turn(Speaker::B, &latest).await?;
            self.record(&mut transcript, writer, Speaker::B, reply_b.clone())?;
            if self.hits_stop_phrase(&reply_b) {
                tracing::info!(round, speaker = "B", "Stop phrase reached");
                stopped_early = true;
                break;
            }

            let reply_a = self.take_turn(Speaker::A, &reply_b).await?;
            self.record(&mut transcript, writer, Speaker::A, reply_a.clone())?;
            rounds_completed = round;
            if self.hits_stop_phrase(&reply_a) {
                tracing::info!(round, speaker = "A", "Stop phrase reached");
                stopped_early = round < total;
                break;
            }

            latest = reply_a;
        }

        tracing::info!(
            turns = transcript.len(),
            rounds_completed,
            stopped_early,
            "Conversation finished"
        );

        Ok(ConversationOutcome::Completed {
            transcript,
            rounds_completed,
            stopped_early,
        })
    }

    /// Ask one speaker for consent. Returns the reply when it is a refusal.
    #[tracing::instrument(skip(self, speaker), fields(speaker = %speaker))]
    async fn ask_consent(&self, speaker: Speaker) -> Result<Option<String>> {
        let prompt = [ChatMessage::user(self.consent.render_prompt(self.config.rounds))];
        let request = CompletionRequest::bare(self.session(speaker).model(), &prompt);

        let reply = call_with_retry(self.backend.as_ref(), &request, self.retry)
            .await
            .with_context(|| format!("Failed to get a consent reply from speaker {}", speaker))?;

        if is_refusal(&reply, &self.consent.refusal_phrase, self.consent.refusal_repeats) {
            Ok(Some(reply))
        } else {
            tracing::info!("Speaker agreed");
            Ok(None)
        }
    }

    /// Hand `heard` to `speaker` and get its reply into its history.
    async fn take_turn(&mut self, speaker: Speaker, heard: &str) -> Result<String> {
        self.session_mut(speaker).hear(heard);

        let result = {
            let request = self.session(speaker).request();
            call_with_retry(self.backend.as_ref(), &request, self.retry).await
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(error) => {
                self.emit(Progress::ReplyFailed {
                    speaker,
                    error: &error,
                });
                match self.config.on_failure {
                    FailurePolicy::Abort => {
                        tracing::error!(speaker = %speaker, error = %error, "Giving up on the conversation");
                        return Err(anyhow::Error::new(error)
                            .context(format!("Speaker {} failed to reply", speaker)));
                    }
                    FailurePolicy::Placeholder => {
                        tracing::warn!(speaker = %speaker, error = %error, "Recording placeholder reply");
                        self.config.placeholder.clone()
                    }
                }
            }
        };

        self.session_mut(speaker).remember_reply(reply.as_str());
        Ok(reply)
    }

    fn record(
        &mut self,
        transcript: &mut Transcript,
        writer: &TranscriptWriter,
        speaker: Speaker,
        text: String,
    ) -> Result<()> {
        let turn = transcript.push(speaker, text)?;
        writer.append(turn)?;

        tracing::debug!(turn = turn.index, speaker = %speaker, chars = turn.text.len(), "Turn recorded");
        self.emit(Progress::TurnRecorded {
            turn,
            label: writer.label(speaker),
        });
        Ok(())
    }

    fn hits_stop_phrase(&self, reply: &str) -> bool {
        self.config
            .stop_phrase
            .as_deref()
            .map(str::trim)
            .is_some_and(|phrase| !phrase.is_empty() && reply.contains(phrase))
    }
}

/// Call the backend, retrying transient failures with a fixed pause.
pub(crate) async fn call_with_retry(
    backend: &dyn ChatBackend,
    request: &CompletionRequest<'_>,
    policy: RetryPolicy,
) -> Result<String, BackendError> {
    let mut attempt = 0;
    loop {
        match backend.complete(request).await {
            Ok(reply) => return Ok(reply),
            Err(error) if error.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    error = %error,
                    "Backend call failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(error) => {
                tracing::warn!(attempt, error = %error, "Backend call failed");
                return Err(error);
            }
        }
    }
}

/// True when `reply` contains `phrase` said `repeats` times in a row.
///
/// Case, whitespace and punctuation are ignored on both sides, so
/// "I disagree. I disagree.\nI DISAGREE" matches `"I disagree"` x3.
pub fn is_refusal(reply: &str, phrase: &str, repeats: u32) -> bool {
    fn normalize(text: &str) -> String {
        text.chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect()
    }

    let needle = normalize(phrase);
    if needle.is_empty() || repeats == 0 {
        return false;
    }

    normalize(reply).contains(&needle.repeat(repeats as usize))
}
