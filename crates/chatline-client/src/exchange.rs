//! Drives one request/reply exchange against the session store.
//!
//! The controller never owns message data. It remembers which placeholder
//! it is filling and the raw text received so far, and rewrites the
//! placeholder from the whole accumulated text on every fragment.

use chatline_core::{extract_image_marker, Message, MessageId, MessageUpdate, NewMessage, SessionId};
use chatline_store::ChatStore;

use crate::transport::{ChatRequest, StreamEvent, Transport};

/// Where an exchange is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangePhase {
    /// Nothing in flight.
    #[default]
    Idle,
    /// The user's message is in the store.
    UserMessageAppended,
    /// The empty assistant reply is in the store.
    AssistantPlaceholderCreated,
    /// At least one fragment has arrived.
    Streaming,
    /// The reply finished.
    Completed,
    /// The transport failed.
    Failed,
}

/// Errors that prevent an exchange from starting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// There is no selected session to write into.
    #[error("no current session")]
    NoCurrentSession,
}

/// Messages created by [`ExchangeController::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeTarget {
    /// Session receiving the exchange.
    pub session_id: SessionId,
    /// The user's message.
    pub user_message_id: MessageId,
    /// The assistant placeholder being filled.
    pub message_id: MessageId,
}

/// The exchange currently streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveExchange {
    /// Session receiving the reply.
    pub session_id: SessionId,
    /// Placeholder being filled.
    pub message_id: MessageId,
    /// Raw text received so far.
    pub accumulated: String,
}

/// Streaming update controller.
#[derive(Debug, Default)]
pub struct ExchangeController {
    active: Option<ActiveExchange>,
    phase: ExchangePhase,
}

impl ExchangeController {
    /// Create an idle controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    /// The in-flight exchange, if any.
    #[must_use]
    pub fn active(&self) -> Option<&ActiveExchange> {
        self.active.as_ref()
    }

    /// Append the user's message and an empty assistant placeholder to the
    /// current session, and mark the store as streaming.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::NoCurrentSession` if nothing is selected.
    pub fn begin(
        &mut self,
        store: &mut ChatStore,
        text: &str,
        image_url: Option<String>,
    ) -> Result<ExchangeTarget, ExchangeError> {
        let session_id = store
            .current_session_id()
            .ok_or(ExchangeError::NoCurrentSession)?;

        let user_message_id = store
            .add_message(&session_id, NewMessage::user(text, image_url))
            .ok_or(ExchangeError::NoCurrentSession)?;
        self.phase = ExchangePhase::UserMessageAppended;

        let message_id = store
            .add_message(&session_id, NewMessage::assistant_placeholder())
            .ok_or(ExchangeError::NoCurrentSession)?;
        self.phase = ExchangePhase::AssistantPlaceholderCreated;

        store.set_streaming(true);
        self.active = Some(ActiveExchange {
            session_id,
            message_id,
            accumulated: String::new(),
        });
        tracing::debug!(session_id = %session_id, message_id = %message_id, "Exchange started");

        Ok(ExchangeTarget {
            session_id,
            user_message_id,
            message_id,
        })
    }

    /// Apply one stream event to the placeholder.
    ///
    /// Returns `true` if the store changed and the view should redraw.
    pub fn apply(&mut self, store: &mut ChatStore, event: StreamEvent) -> bool {
        match event {
            StreamEvent::Fragment(text) => {
                let Some(active) = self.active.as_mut() else {
                    tracing::debug!("Fragment with no active exchange");
                    return false;
                };
                active.accumulated.push_str(&text);
                self.phase = ExchangePhase::Streaming;

                let derived = extract_image_marker(&active.accumulated);
                store.update_message(
                    &active.session_id,
                    &active.message_id,
                    MessageUpdate {
                        content: Some(derived.content),
                        image_url: Some(derived.image_url),
                        is_streaming: Some(Some(true)),
                    },
                )
            }
            StreamEvent::Complete => {
                let Some(active) = self.active.take() else {
                    return false;
                };
                let derived = extract_image_marker(&active.accumulated);
                let changed = store.update_message(
                    &active.session_id,
                    &active.message_id,
                    MessageUpdate {
                        content: Some(derived.content),
                        image_url: Some(derived.image_url),
                        is_streaming: Some(Some(false)),
                    },
                );
                store.set_streaming(false);
                self.phase = ExchangePhase::Completed;
                tracing::debug!(
                    message_id = %active.message_id,
                    chars = active.accumulated.len(),
                    "Exchange completed"
                );
                changed
            }
            StreamEvent::Error(message) => {
                let Some(active) = self.active.take() else {
                    return false;
                };
                tracing::warn!(message_id = %active.message_id, error = %message, "Exchange failed");
                let changed = store.update_message(
                    &active.session_id,
                    &active.message_id,
                    MessageUpdate {
                        content: Some(format!("Error: {message}")),
                        is_streaming: Some(Some(false)),
                        ..Default::default()
                    },
                );
                store.set_streaming(false);
                self.phase = ExchangePhase::Failed;
                changed
            }
        }
    }

    /// Run a whole exchange: begin, send, and apply every event until the
    /// reply ends.
    ///
    /// `model` defaults to the store's selected model. `on_update` is called
    /// with the placeholder after every change.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::NoCurrentSession` if nothing is selected.
    /// Transport failures are written into the reply instead.
    pub async fn run<F>(
        &mut self,
        store: &mut ChatStore,
        transport: &dyn Transport,
        text: &str,
        image_url: Option<String>,
        model: Option<&str>,
        mut on_update: F,
    ) -> Result<ExchangePhase, ExchangeError>
    where
        F: FnMut(&Message),
    {
        let model = model.unwrap_or(store.current_model()).to_string();
        let target = self.begin(store, text, image_url.clone())?;
        notify(store, &target, &mut on_update);

        let request = ChatRequest::new(text)
            .with_image(image_url)
            .with_model(model);

        let mut events = match transport.send_request(request).await {
            Ok(events) => events,
            Err(e) => {
                if self.apply(store, StreamEvent::Error(e.to_string())) {
                    notify(store, &target, &mut on_update);
                }
                return Ok(self.phase);
            }
        };

        while let Some(event) = events.recv().await {
            let terminal = event.is_terminal();
            if self.apply(store, event) {
                notify(store, &target, &mut on_update);
            }
            if terminal {
                return Ok(self.phase);
            }
        }

        // The sender went away without a terminal event.
        if self.apply(store, StreamEvent::Complete) {
            notify(store, &target, &mut on_update);
        }
        Ok(self.phase)
    }
}

fn notify<F: FnMut(&Message)>(store: &ChatStore, target: &ExchangeTarget, on_update: &mut F) {
    if let Ok(message) = store.message(&target.session_id, &target.message_id) {
        on_update(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClientError, Result as ClientResult};
    use async_trait::async_trait;
    use chatline_core::MessageRole;
    use tokio::sync::mpsc;

    /// Replays a fixed list of events, then closes the channel.
    struct ScriptedTransport {
        events: Vec<StreamEvent>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send_request(
            &self,
            _request: ChatRequest,
        ) -> ClientResult<mpsc::Receiver<StreamEvent>> {
            let (tx, rx) = mpsc::channel(self.events.len().max(1));
            for event in &self.events {
                tx.send(event.clone()).await.unwrap();
            }
            Ok(rx)
        }
    }

    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn send_request(
            &self,
            _request: ChatRequest,
        ) -> ClientResult<mpsc::Receiver<StreamEvent>> {
            Err(ClientError::Api {
                status: 503,
                message: String::new(),
            })
        }
    }

    fn fragment(text: &str) -> StreamEvent {
        StreamEvent::Fragment(text.to_string())
    }

    fn store_with_session() -> ChatStore {
        let mut store = ChatStore::new();
        store.create_session(None);
        store
    }

    #[test]
    fn begin_requires_current_session() {
        let mut store = ChatStore::new();
        let mut controller = ExchangeController::new();
        assert_eq!(
            controller.begin(&mut store, "hi", None),
            Err(ExchangeError::NoCurrentSession)
        );
        assert_eq!(controller.phase(), ExchangePhase::Idle);
        assert!(!store.is_streaming());
    }

    #[test]
    fn begin_appends_user_message_and_placeholder() {
        let mut store = store_with_session();
        let mut controller = ExchangeController::new();

        let target = controller
            .begin(&mut store, "hello", Some("http://x/in.png".to_string()))
            .unwrap();

        let session = store.current_session().unwrap();
        assert_eq!(session.messages.len(), 2);

        let user = &session.messages[0];
        assert_eq!(user.id, target.user_message_id);
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.image_url.as_deref(), Some("http://x/in.png"));
        assert_eq!(user.is_streaming, None);

        let placeholder = &session.messages[1];
        assert_eq!(placeholder.id, target.message_id);
        assert!(placeholder.content.is_empty());
        assert!(placeholder.streaming());

        assert!(store.is_streaming());
        assert_eq!(controller.phase(), ExchangePhase::AssistantPlaceholderCreated);
        assert_eq!(controller.active().unwrap().message_id, target.message_id);
    }

    #[test]
    fn fragments_rederive_from_accumulated_text() {
        let mut store = store_with_session();
        let mut controller = ExchangeController::new();
        let target = controller.begin(&mut store, "draw", None).unwrap();

        assert!(controller.apply(&mut store, fragment("Here is your result.\n[IMA")));
        let message = store.message(&target.session_id, &target.message_id).unwrap();
        assert_eq!(message.content, "Here is your result.\n[IMA");
        assert_eq!(message.image_url, None);

        assert!(controller.apply(&mut store, fragment("GE:http://x/y.png]")));
        let message = store.message(&target.session_id, &target.message_id).unwrap();
        assert_eq!(message.content, "Here is your result.");
        assert_eq!(message.image_url.as_deref(), Some("http://x/y.png"));
        assert!(message.streaming());
        assert_eq!(controller.phase(), ExchangePhase::Streaming);
    }

    #[test]
    fn complete_freezes_message_and_clears_flags() {
        let mut store = store_with_session();
        let mut controller = ExchangeController::new();
        let target = controller.begin(&mut store, "hi", None).unwrap();

        controller.apply(&mut store, fragment("Hel"));
        controller.apply(&mut store, fragment("lo"));
        assert!(controller.apply(&mut store, StreamEvent::Complete));

        let message = store.message(&target.session_id, &target.message_id).unwrap();
        assert_eq!(message.content, "Hello");
        assert_eq!(message.is_streaming, Some(false));
        assert!(!store.is_streaming());
        assert!(controller.active().is_none());
        assert_eq!(controller.phase(), ExchangePhase::Completed);

        // Late events are ignored.
        assert!(!controller.apply(&mut store, fragment("late")));
        assert_eq!(
            store
                .message(&target.session_id, &target.message_id)
                .unwrap()
                .content,
            "Hello"
        );
    }

    #[test]
    fn error_replaces_accumulated_text() {
        let mut store = store_with_session();
        let mut controller = ExchangeController::new();
        let target = controller.begin(&mut store, "hi", None).unwrap();

        controller.apply(&mut store, fragment("partial answer"));
        assert!(controller.apply(&mut store, StreamEvent::Error("connection reset".to_string())));

        let message = store.message(&target.session_id, &target.message_id).unwrap();
        assert_eq!(message.content, "Error: connection reset");
        assert_eq!(message.is_streaming, Some(false));
        assert!(!store.is_streaming());
        assert_eq!(controller.phase(), ExchangePhase::Failed);
    }

    #[tokio::test]
    async fn run_drives_full_exchange() {
        let mut store = store_with_session();
        let transport = ScriptedTransport {
            events: vec![fragment("Hel"), fragment("lo"), StreamEvent::Complete],
        };
        let mut controller = ExchangeController::new();
        let mut seen = Vec::new();

        let phase = controller
            .run(&mut store, &transport, "hi", None, None, |m| {
                seen.push((m.content.clone(), m.streaming()));
            })
            .await
            .unwrap();

        assert_eq!(phase, ExchangePhase::Completed);
        assert_eq!(
            seen,
            vec![
                (String::new(), true),
                ("Hel".to_string(), true),
                ("Hello".to_string(), true),
                ("Hello".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn closed_channel_counts_as_completion() {
        let mut store = store_with_session();
        let transport = ScriptedTransport {
            events: vec![fragment("cut short")],
        };
        let mut controller = ExchangeController::new();

        let phase = controller
            .run(&mut store, &transport, "hi", None, None, |_| {})
            .await
            .unwrap();

        assert_eq!(phase, ExchangePhase::Completed);
        let reply = store.current_session().unwrap().messages.last().unwrap();
        assert_eq!(reply.content, "cut short");
        assert_eq!(reply.is_streaming, Some(false));
    }

    #[tokio::test]
    async fn refused_request_fails_exchange() {
        let mut store = store_with_session();
        let mut controller = ExchangeController::new();

        let phase = controller
            .run(&mut store, &RefusingTransport, "hi", None, None, |_| {})
            .await
            .unwrap();

        assert_eq!(phase, ExchangePhase::Failed);
        let reply = store.current_session().unwrap().messages.last().unwrap();
        assert_eq!(reply.content, "Error: HTTP error! status: 503");
        assert!(!store.is_streaming());
    }
}
