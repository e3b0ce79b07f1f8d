//! The session store.
//!
//! [`ChatStore`] exclusively owns every session and message. Each mutation
//! is applied in full before the durable projection is mirrored, and a
//! failed mirror is logged rather than surfaced.

use chatline_core::{
    default_models, CoreError, Message, MessageId, MessageUpdate, ModelDescriptor, NewMessage,
    Session, SessionId, DEFAULT_MODEL,
};

use crate::persist::{PersistedChat, Persistence};

/// Everything the store holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    /// Sessions, newest-created first.
    pub sessions: Vec<Session>,
    /// Selected session.
    pub current_session_id: Option<SessionId>,
    /// Model catalog.
    pub models: Vec<ModelDescriptor>,
    /// Selected model name.
    pub current_model: String,
    /// A request is being prepared. Not persisted.
    pub is_loading: bool,
    /// An assistant reply is streaming. Not persisted.
    pub is_streaming: bool,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
            current_session_id: None,
            models: default_models(),
            current_model: DEFAULT_MODEL.to_string(),
            is_loading: false,
            is_streaming: false,
        }
    }
}

impl From<PersistedChat> for ChatState {
    fn from(chat: PersistedChat) -> Self {
        Self {
            sessions: chat.sessions,
            current_session_id: chat.current_session_id,
            models: chat.models,
            current_model: chat.current_model,
            is_loading: false,
            is_streaming: false,
        }
    }
}

/// In-memory session store with optional durable mirroring.
#[derive(Debug, Default)]
pub struct ChatStore {
    state: ChatState,
    persistence: Option<Persistence>,
}

impl ChatStore {
    /// Create an empty store that is never persisted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store backed by `persistence`, restoring any saved state.
    ///
    /// If the saved record cannot be read the store starts empty and is not
    /// mirrored, so the record is left intact for a later run.
    #[must_use]
    pub fn with_persistence(persistence: Persistence) -> Self {
        match persistence.load_chat() {
            Ok(chat) => {
                let state = chat.map(ChatState::from).unwrap_or_default();
                tracing::debug!(
                    sessions = state.sessions.len(),
                    model = %state.current_model,
                    "Restored chat state"
                );
                Self {
                    state,
                    persistence: Some(persistence),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read chat state, not persisting this run");
                Self::new()
            }
        }
    }

    /// Whether mutations are mirrored to durable storage.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.persistence.is_some()
    }

    /// The full state.
    #[must_use]
    pub fn state(&self) -> &ChatState {
        &self.state
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Create a session at the front of the list and select it.
    pub fn create_session(&mut self, title: Option<&str>) -> SessionId {
        let session = Session::new(title);
        let id = session.id;
        self.state.sessions.insert(0, session);
        self.state.current_session_id = Some(id);
        tracing::debug!(session_id = %id, "Created session");
        self.mirror();
        id
    }

    /// Remove a session.
    ///
    /// If it was selected, the first remaining session becomes current, or
    /// nothing when the list is now empty. Refusing to delete the last
    /// session is up to the caller.
    pub fn delete_session(&mut self, session_id: &SessionId) {
        let before = self.state.sessions.len();
        self.state.sessions.retain(|s| s.id != *session_id);
        if self.state.sessions.len() == before {
            return;
        }
        if self.state.current_session_id == Some(*session_id) {
            self.state.current_session_id = self.state.sessions.first().map(|s| s.id);
        }
        tracing::debug!(session_id = %session_id, "Deleted session");
        self.mirror();
    }

    /// Select a session.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::SessionNotFound` and keeps the current selection
    /// if no session has this id.
    pub fn set_current_session(&mut self, session_id: &SessionId) -> chatline_core::Result<()> {
        if self.session(session_id).is_none() {
            return Err(CoreError::SessionNotFound(*session_id));
        }
        self.state.current_session_id = Some(*session_id);
        self.mirror();
        Ok(())
    }

    /// Rename a session. Does nothing if the id is unknown.
    pub fn update_session_title(&mut self, session_id: &SessionId, title: &str) {
        let Some(session) = self.session_mut(session_id) else {
            return;
        };
        session.title = title.to_string();
        session.touch();
        self.mirror();
    }

    /// Return the current session, selecting or creating one if needed.
    pub fn ensure_session(&mut self) -> SessionId {
        if let Some(session) = self.current_session() {
            return session.id;
        }
        match self.state.sessions.first().map(|s| s.id) {
            Some(id) => {
                self.state.current_session_id = Some(id);
                self.mirror();
                id
            }
            None => self.create_session(None),
        }
    }

    // =========================================================================
    // Message Operations
    // =========================================================================

    /// Append a message and return its new id, or `None` if the session is
    /// unknown.
    pub fn add_message(&mut self, session_id: &SessionId, message: NewMessage) -> Option<MessageId> {
        let session = self.session_mut(session_id)?;
        let id = MessageId::generate();
        session.messages.push(message.with_id(id));
        session.touch();
        self.mirror();
        Some(id)
    }

    /// Merge `update` into a message.
    ///
    /// Returns `false` and changes nothing if either id is unknown.
    pub fn update_message(
        &mut self,
        session_id: &SessionId,
        message_id: &MessageId,
        update: MessageUpdate,
    ) -> bool {
        let Some(session) = self.session_mut(session_id) else {
            return false;
        };
        let Some(message) = session.message_mut(message_id) else {
            return false;
        };
        update.apply_to(message);
        session.touch();
        self.mirror();
        true
    }

    /// Remove one message. Does nothing if either id is unknown.
    pub fn delete_message(&mut self, session_id: &SessionId, message_id: &MessageId) {
        let Some(session) = self.session_mut(session_id) else {
            return;
        };
        let before = session.messages.len();
        session.messages.retain(|m| m.id != *message_id);
        if session.messages.len() == before {
            return;
        }
        session.touch();
        self.mirror();
    }

    /// Remove every message of a session.
    pub fn clear_messages(&mut self, session_id: &SessionId) {
        let Some(session) = self.session_mut(session_id) else {
            return;
        };
        session.messages.clear();
        session.touch();
        self.mirror();
    }

    // =========================================================================
    // Model Operations
    // =========================================================================

    /// Select a model by name.
    pub fn set_current_model(&mut self, name: &str) {
        self.state.current_model = name.to_string();
        self.mirror();
    }

    /// Replace the model catalog.
    pub fn update_models(&mut self, models: Vec<ModelDescriptor>) {
        self.state.models = models;
        self.mirror();
    }

    // =========================================================================
    // Transient Flags
    // =========================================================================

    /// Set the loading flag.
    pub fn set_loading(&mut self, loading: bool) {
        self.state.is_loading = loading;
    }

    /// Set the streaming flag.
    pub fn set_streaming(&mut self, streaming: bool) {
        self.state.is_streaming = streaming;
    }

    /// Whether a request is being prepared.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.is_loading
    }

    /// Whether a reply is streaming.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// All sessions, newest-created first.
    #[must_use]
    pub fn sessions(&self) -> &[Session] {
        &self.state.sessions
    }

    /// Selected session id, which always names an existing session.
    #[must_use]
    pub fn current_session_id(&self) -> Option<SessionId> {
        self.state.current_session_id
    }

    /// The selected session.
    #[must_use]
    pub fn current_session(&self) -> Option<&Session> {
        self.state
            .current_session_id
            .and_then(|id| self.session(&id))
    }

    /// Look up a session.
    #[must_use]
    pub fn session(&self, session_id: &SessionId) -> Option<&Session> {
        self.state.sessions.iter().find(|s| s.id == *session_id)
    }

    /// Look up a message.
    ///
    /// # Errors
    ///
    /// Returns an error naming whichever id could not be found.
    pub fn message(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
    ) -> chatline_core::Result<&Message> {
        let session = self
            .session(session_id)
            .ok_or(CoreError::SessionNotFound(*session_id))?;
        session
            .message(message_id)
            .ok_or(CoreError::MessageNotFound {
                session_id: *session_id,
                message_id: *message_id,
            })
    }

    /// The model catalog.
    #[must_use]
    pub fn models(&self) -> &[ModelDescriptor] {
        &self.state.models
    }

    /// Selected model name.
    #[must_use]
    pub fn current_model(&self) -> &str {
        &self.state.current_model
    }

    fn session_mut(&mut self, session_id: &SessionId) -> Option<&mut Session> {
        self.state.sessions.iter_mut().find(|s| s.id == *session_id)
    }

    fn mirror(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(e) = persistence.save_chat(&self.state) {
            tracing::error!(error = %e, "Failed to persist chat state");
        }
    }
}
