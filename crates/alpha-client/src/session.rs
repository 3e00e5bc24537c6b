//! One chat session: the visible transcript, the conversation it is saved
//! under and the system prompt sent with every turn.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use alpha_core::conversation::derive_title;
use alpha_core::prompt::restamp;
use alpha_core::wire::{ChatRequest, ChatTurn};
use alpha_core::{
    ContextRecord, ConversationDraft, ConversationId, ConversationRecord, Message, MessageId,
    PromptCompiler,
};
use alpha_store::{ContextStore, ConversationStore, Origin, StoreError};

use crate::assembler::{AssemblyOutcome, StreamAssembler};
use crate::autosave::{AutoSaver, SaveTarget};
use crate::chat::ChatProvider;
use crate::error::ClientError;
use crate::transcribe::{AudioClip, Transcriber};

/// Handle to the conversation the session is currently saved under, shared
/// between the session and its auto-saver.
#[derive(Clone, Default)]
pub struct ActiveConversation(Arc<Mutex<Option<ConversationRecord>>>);

impl ActiveConversation {
    pub fn id(&self) -> Option<ConversationId> {
        self.0.lock().as_ref().map(|c| c.id.clone())
    }

    pub fn get(&self) -> Option<ConversationRecord> {
        self.0.lock().clone()
    }

    pub fn set(&self, record: Option<ConversationRecord>) {
        *self.0.lock() = record;
    }

    pub fn is(&self, id: &ConversationId) -> bool {
        self.0.lock().as_ref().is_some_and(|c| &c.id == id)
    }
}

/// What the auto-saver persists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub messages: Vec<Message>,
    pub system_prompt: String,
}

/// Creates the conversation on first save, updates it afterwards.
pub struct ConversationSaver {
    store: ConversationStore,
    active: ActiveConversation,
}

impl ConversationSaver {
    pub fn new(store: ConversationStore, active: ActiveConversation) -> Self {
        Self { store, active }
    }
}

#[async_trait]
impl SaveTarget for ConversationSaver {
    type Payload = Snapshot;

    async fn save(&self, snapshot: Snapshot) {
        if snapshot.messages.is_empty() {
            return;
        }

        match self.active.get() {
            None => {
                let draft = ConversationDraft::new(snapshot.messages, snapshot.system_prompt);
                match self.store.create(draft).await {
                    Ok(record) => {
                        debug!(conversation_id = %record.id, "conversation created");
                        self.active.set(Some(record));
                    }
                    Err(e) => warn!(error = %e, "failed to create conversation"),
                }
            }
            Some(mut record) => {
                record.title = derive_title(&snapshot.messages);
                record.messages = snapshot.messages;
                record.system_prompt = snapshot.system_prompt;
                match self.store.update(&record).await {
                    Ok(stored) => self.active.set(Some(stored)),
                    Err(e) => warn!(error = %e, conversation_id = %record.id, "failed to save conversation"),
                }
            }
        }
    }
}

#[derive(Default)]
struct SessionState {
    messages: Vec<Message>,
    system_prompt: String,
    input: String,
}

/// Collaborators a [`ChatSession`] is built from.
pub struct SessionParts {
    pub context: ContextStore,
    pub conversations: ConversationStore,
    pub compiler: PromptCompiler,
    pub chat: Arc<dyn ChatProvider>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub autosave_delay: std::time::Duration,
    pub model: Option<String>,
}

pub struct ChatSession {
    context: ContextStore,
    conversations: ConversationStore,
    compiler: PromptCompiler,
    chat: Arc<dyn ChatProvider>,
    transcriber: Option<Arc<dyn Transcriber>>,
    model: Option<String>,
    assembler: StreamAssembler,
    saver: AutoSaver<ConversationSaver>,
    active: ActiveConversation,
    state: Mutex<SessionState>,
}

/// Append dictated text to a draft on its own line.
pub fn append_dictation(input: &str, text: &str) -> String {
    if input.is_empty() {
        text.to_string()
    } else {
        format!("{input}\n{text}")
    }
}

impl ChatSession {
    pub fn new(parts: SessionParts) -> Self {
        let active = ActiveConversation::default();
        let saver = AutoSaver::new(
            ConversationSaver::new(parts.conversations.clone(), active.clone()),
            parts.autosave_delay,
        );
        Self {
            context: parts.context,
            conversations: parts.conversations,
            compiler: parts.compiler,
            chat: parts.chat,
            transcriber: parts.transcriber,
            model: parts.model,
            assembler: StreamAssembler::new(),
            saver,
            active,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    pub fn system_prompt(&self) -> String {
        self.state.lock().system_prompt.clone()
    }

    pub fn input(&self) -> String {
        self.state.lock().input.clone()
    }

    pub fn set_input(&self, input: impl Into<String>) {
        self.state.lock().input = input.into();
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.active.id()
    }

    pub fn is_streaming(&self) -> bool {
        self.assembler.is_active()
    }

    pub fn set_system_prompt(&self, prompt: impl Into<String>) {
        self.state.lock().system_prompt = prompt.into();
    }

    /// Load the context record and compile it into the system prompt.
    #[instrument(skip(self))]
    pub async fn refresh_prompt(&self) -> String {
        let record = self.context.load().await;
        let prompt = self
            .compiler
            .compile(&record, &Local::now().naive_local());
        self.state.lock().system_prompt = prompt.clone();
        prompt
    }

    pub async fn context(&self) -> ContextRecord {
        self.context.load().await
    }

    /// Persist a new context record and recompile the prompt from it.
    pub async fn update_context(&self, record: &ContextRecord) -> Origin {
        let origin = self.context.save(record).await;
        let prompt = self
            .compiler
            .compile(record, &Local::now().naive_local());
        self.state.lock().system_prompt = prompt;
        origin
    }

    fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        Snapshot {
            messages: state.messages.clone(),
            system_prompt: state.system_prompt.clone(),
        }
    }

    fn set_content(&self, id: &MessageId, content: &str) {
        let mut state = self.state.lock();
        if let Some(message) = state.messages.iter_mut().rev().find(|m| &m.id == id) {
            message.content = content.to_string();
        }
    }

    /// Send `input` as the next user turn and stream the answer into the
    /// transcript. `observer` sees the whole answer text after every change.
    /// Returns `None` for blank input.
    #[instrument(skip(self, input, observer))]
    pub async fn submit(
        &self,
        input: &str,
        mut observer: impl FnMut(&str),
    ) -> Option<AssemblyOutcome> {
        let text = input.trim();
        if text.is_empty() {
            return None;
        }

        let ticket = self.assembler.begin();
        let placeholder = Message::assistant_placeholder();
        let answer_id = placeholder.id.clone();

        let request = {
            let mut state = self.state.lock();
            state.input.clear();
            state.messages.push(Message::user(text));
            let turns = state.messages.iter().map(ChatTurn::from).collect();
            state.messages.push(placeholder);
            ChatRequest {
                messages: turns,
                system_prompt: restamp(&state.system_prompt, &Local::now().naive_local()),
                model: self.model.clone(),
            }
        };
        self.saver.schedule(self.snapshot());

        let opened = tokio::select! {
            biased;
            _ = ticket.token().cancelled() => Err(ClientError::Cancelled),
            opened = self.chat.stream(&request) => opened,
        };

        let mut publish = |content: &str| {
            self.set_content(&answer_id, content);
            observer(content);
        };
        let outcome = match opened {
            Ok(lines) => self.assembler.run(ticket, lines, &mut publish).await,
            Err(e) => self.assembler.fail(ticket, &e, &mut publish),
        };

        self.saver.schedule(self.snapshot());
        Some(outcome)
    }

    /// Stop the answer currently streaming. Its partial text stays.
    pub fn cancel(&self) -> bool {
        self.assembler.cancel()
    }

    /// Save whatever is pending now.
    pub async fn flush(&self) -> bool {
        self.saver.flush().await
    }

    /// Start an empty conversation. The current one is saved first.
    #[instrument(skip(self))]
    pub async fn new_chat(&self) {
        self.assembler.cancel();
        self.saver.flush().await;
        self.state.lock().messages.clear();
        self.active.set(None);
    }

    /// Make `record` the active conversation, saving the current one first.
    #[instrument(skip(self, record), fields(conversation_id = %record.id))]
    pub async fn load_conversation(&self, record: ConversationRecord) {
        self.assembler.cancel();
        self.saver.flush().await;
        {
            let mut state = self.state.lock();
            state.messages = record.messages.clone();
            if !record.system_prompt.is_empty() {
                state.system_prompt = record.system_prompt.clone();
            }
        }
        self.active.set(Some(record));
    }

    pub async fn open_conversation(&self, id: &ConversationId) -> Result<(), StoreError> {
        let record = self.conversations.get(id).await?;
        self.load_conversation(record).await;
        Ok(())
    }

    pub async fn list_conversations(&self) -> Vec<ConversationRecord> {
        self.conversations.list().await
    }

    /// Delete a conversation. Deleting the active one also clears the
    /// transcript, drops its pending save and waits out a save already in
    /// flight, so nothing writes the record back afterwards.
    #[instrument(skip(self), fields(conversation_id = %id))]
    pub async fn delete_conversation(&self, id: &ConversationId) -> Result<(), StoreError> {
        let was_active = self.active.is(id);
        if was_active {
            self.assembler.cancel();
            self.saver.cancel_and_wait().await;
        }

        self.conversations.delete(id).await?;

        if was_active {
            self.state.lock().messages.clear();
            self.active.set(None);
        }
        info!("conversation deleted");
        Ok(())
    }

    /// Transcribe `clip` and append the text to the draft input on a new
    /// line. On failure the input is left as it was.
    #[instrument(skip(self, clip))]
    pub async fn dictate(&self, clip: AudioClip) -> Result<String, ClientError> {
        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or_else(|| ClientError::Transcription("transcription is not configured".into()))?;
        let transcription = transcriber.transcribe(clip).await?;

        let mut state = self.state.lock();
        let updated = append_dictation(&state.input, &transcription.text);
        state.input = updated.clone();
        Ok(updated)
    }
}
