use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use rand::seq::SliceRandom;
use serde::Serialize;
use uuid::Uuid;

use crate::avatar::{blink_suppressed, render, AvatarInput, AvatarPose, BlinkTimer};
use crate::conversation::{Conversation, Message};
use crate::credential::{is_valid_key_format, looks_like_credential, CredentialStore};
use crate::emotion::{parse_emotion_tag, Emotion};
use crate::error::{classify, ChatError};
use crate::persona::{INITIAL_GREETING, LUCKY_PROMPTS, PASTED_KEY_WARNING, RECHARGED_GREETING, REDACTED_KEY};
use crate::session::SessionClient;

const SUGGESTION_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UiState {
    pub emotion: Emotion,
    pub loading: bool,
    pub streaming: bool,
    pub credential_prompt_open: bool,
    pub has_credential: bool,
}

impl UiState {
    pub fn is_busy(&self) -> bool {
        self.loading || self.streaming
    }
}

/// Everything a surface needs to draw one frame.
pub struct ChatView<'a> {
    pub messages: &'a [Message],
    pub ui: UiState,
    pub avatar: AvatarPose,
    pub scroll_to: Option<Uuid>,
    pub suggestions: bool,
}

pub trait Surface {
    fn repaint(&mut self, view: &ChatView<'_>);
}

fn suggestions_visible(conversation: &Conversation, ui: &UiState) -> bool {
    conversation.len() < SUGGESTION_LIMIT && !ui.is_busy()
}

fn repaint<S: Surface>(surface: &mut S, conversation: &Conversation, ui: &UiState, blink: &mut BlinkTimer) {
    let blinking = blink.is_closed(Instant::now(), blink_suppressed(ui.emotion, ui.loading));
    let avatar = render(&AvatarInput {
        emotion: ui.emotion,
        loading: ui.loading,
        streaming: ui.streaming,
        blinking,
        ..Default::default()
    });
    surface.repaint(&ChatView {
        messages: conversation.messages(),
        ui: *ui,
        avatar,
        scroll_to: conversation.last_id(),
        suggestions: suggestions_visible(conversation, ui),
    });
}

/// Drives the transcript and UI flags. Every mutation ends in a repaint.
pub struct ChatController<S: Surface> {
    sessions: SessionClient,
    store: Arc<dyn CredentialStore>,
    conversation: Conversation,
    ui: UiState,
    surface: S,
    blink: BlinkTimer,
}

impl<S: Surface> ChatController<S> {
    pub fn new(sessions: SessionClient, store: Arc<dyn CredentialStore>, surface: S) -> Self {
        let greeting = parse_emotion_tag(INITIAL_GREETING);
        Self {
            sessions,
            store,
            conversation: Conversation::with_greeting(greeting.clean_text),
            ui: UiState { emotion: greeting.emotion.unwrap_or(Emotion::Happy), ..Default::default() },
            surface,
            blink: BlinkTimer::new(Instant::now()),
        }
    }

    #[cfg(test)]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    #[cfg(test)]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn suggestions_visible(&self) -> bool {
        suggestions_visible(&self.conversation, &self.ui)
    }

    pub fn refresh(&mut self) {
        repaint(&mut self.surface, &self.conversation, &self.ui, &mut self.blink);
    }

    /// Probes for a usable credential and opens the prompt when none exists.
    pub async fn bootstrap(&mut self) {
        self.probe_credential().await;
        self.refresh();
    }

    async fn probe_credential(&mut self) {
        match self.sessions.get_or_create_session().await {
            Ok(session) => tracing::debug!(session_id = %session.id, "credential resolved"),
            Err(ChatError::MissingCredential) => {}
            Err(e) => tracing::warn!(error = %e, "credential probe failed"),
        }
        self.ui.has_credential = self.sessions.has_client();
        if !self.ui.has_credential {
            self.ui.credential_prompt_open = true;
        }
    }

    pub async fn send_message(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() || self.ui.is_busy() {
            return;
        }

        if looks_like_credential(text) {
            self.conversation.push(Message::user(REDACTED_KEY));
            self.conversation.push(Message::assistant(parse_emotion_tag(PASTED_KEY_WARNING).clean_text));
            self.ui.emotion = Emotion::Angry;
            tracing::warn!("credential pasted into chat input, not sent");
            self.refresh();
            return;
        }

        self.conversation.push(Message::user(text));
        self.ui.loading = true;
        self.ui.streaming = false;
        self.ui.emotion = Emotion::Neutral;
        self.refresh();

        let mut placeholder = None;
        if let Err(err) = self.stream_reply(text, &mut placeholder).await {
            self.record_failure(placeholder, &err);
        }

        self.ui.loading = false;
        self.ui.streaming = false;
        self.refresh();
    }

    async fn stream_reply(&mut self, text: &str, placeholder: &mut Option<Uuid>) -> Result<(), ChatError> {
        let Self { sessions, conversation, ui, surface, blink, .. } = self;

        let session = sessions.get_or_create_session().await?;
        let id = conversation.push(Message::placeholder());
        *placeholder = Some(id);
        repaint(surface, conversation, ui, blink);

        let mut stream = session.send_streaming(text).await?;
        ui.loading = false;
        ui.streaming = true;
        repaint(surface, conversation, ui, blink);

        let mut raw = String::new();
        let mut committed = false;
        while let Some(chunk) = stream.next().await {
            raw.push_str(&chunk?);
            let parsed = parse_emotion_tag(&raw);
            if !committed {
                if let Some(emotion) = parsed.emotion {
                    ui.emotion = emotion;
                    committed = true;
                }
            }
            conversation.replace_streaming_content(id, parsed.clean_text)?;
            repaint(surface, conversation, ui, blink);
        }

        conversation.finalize(id)?;
        session.record_exchange(text, &raw);
        Ok(())
    }

    fn record_failure(&mut self, placeholder: Option<Uuid>, err: &ChatError) {
        let raw = err.to_string();
        let kind = classify(&raw);
        tracing::warn!(kind = ?kind, error = %raw, "chat turn failed");

        if let Some(id) = placeholder {
            if let Err(e) = self.conversation.abandon(id) {
                tracing::debug!(error = %e, "placeholder already settled");
            }
        }
        self.conversation.push(Message::error(kind.error_content(&raw)));
        self.ui.emotion = kind.emotion();
        if kind.reopens_credential_prompt() {
            self.ui.credential_prompt_open = true;
        }
    }

    /// Validates, persists and activates a credential. `Ok(false)` when the
    /// text does not look like a key.
    pub async fn save_credential(&mut self, key: &str) -> Result<bool, ChatError> {
        let key = key.trim();
        if !is_valid_key_format(key) {
            return Ok(false);
        }
        self.store.save(key).await.map_err(|e| ChatError::Store(e.to_string()))?;
        self.sessions.initialize(key);
        tracing::info!("credential saved");

        self.ui.has_credential = true;
        self.ui.credential_prompt_open = false;
        self.conversation.reset(parse_emotion_tag(RECHARGED_GREETING).clean_text);
        self.ui.emotion = Emotion::Happy;
        self.refresh();
        Ok(true)
    }

    pub async fn remove_credential(&mut self) -> Result<(), ChatError> {
        let removed = self.store.remove().await.map_err(|e| ChatError::Store(e.to_string()))?;
        self.sessions.discard();
        tracing::info!(removed, "credential removed");
        self.probe_credential().await;
        self.refresh();
        Ok(())
    }

    pub async fn reset_conversation(&mut self) {
        self.sessions.reset().await;
        let greeting = parse_emotion_tag(INITIAL_GREETING);
        self.conversation.reset(greeting.clean_text);
        self.ui.emotion = greeting.emotion.unwrap_or(Emotion::Happy);
        self.ui.loading = false;
        self.ui.streaming = false;
        self.refresh();
    }

    /// Sends a random fortune request. Returns the prompt used, or `None`
    /// while a reply is in flight.
    pub async fn lucky_draw(&mut self) -> Option<&'static str> {
        if self.ui.is_busy() {
            return None;
        }
        let prompt = *LUCKY_PROMPTS.choose(&mut rand::thread_rng())?;
        self.send_message(prompt).await;
        Some(prompt)
    }

    pub fn open_credential_prompt(&mut self) {
        self.ui.credential_prompt_open = true;
        self.refresh();
    }

    /// The prompt can only be dismissed once some credential is usable.
    pub fn close_credential_prompt(&mut self) -> bool {
        if !self.ui.has_credential {
            return false;
        }
        self.ui.credential_prompt_open = false;
        self.refresh();
        true
    }
}
