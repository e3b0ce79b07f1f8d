//! Durable mirroring of chat and settings state.
//!
//! Chat state is written as a storage-safe projection: inline `data:` image
//! URLs are elided, and when the backend is near its quota the projection is
//! cut down to the most recently updated sessions and their latest messages.
//! Records that fail to decode on load are discarded whole.

use std::fmt;
use std::sync::Arc;

use chatline_core::{
    default_models, AppSettings, Message, ModelDescriptor, Session, SessionId, DEFAULT_MODEL,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::chat::ChatState;
use crate::error::{Result, StoreError};
use crate::keys;
use crate::KeyValueStore;

/// Marker placed in front of an elided inline image.
pub const IMAGE_REMOVED_MARKER: &str = "[IMAGE_DATA_REMOVED_FOR_STORAGE]";

/// Characters of an inline image kept after the marker.
pub const IMAGE_PREFIX_CHARS: usize = 100;

/// Sessions retained when degrading.
pub const MAX_DEGRADED_SESSIONS: usize = 10;

/// Messages retained per session when degrading.
pub const MAX_DEGRADED_MESSAGES: usize = 20;

const INLINE_DATA_PREFIX: &str = "data:";
const RECORD_VERSION: u32 = 0;

/// Versioned wrapper around every durable record.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    state: T,
    #[serde(default)]
    version: u32,
}

/// The durable projection of [`ChatState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedChat {
    /// Sessions, newest first.
    #[serde(default)]
    pub sessions: Vec<Session>,
    /// Selected session.
    #[serde(default)]
    pub current_session_id: Option<SessionId>,
    /// Selected model name.
    #[serde(default = "default_current_model")]
    pub current_model: String,
    /// Model catalog.
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

fn default_current_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl PersistedChat {
    /// Sanitized projection of the live state.
    #[must_use]
    pub fn project(state: &ChatState) -> Self {
        Self {
            sessions: state.sessions.iter().map(sanitize_session).collect(),
            current_session_id: state.current_session_id,
            current_model: state.current_model.clone(),
            models: state.models.clone(),
        }
    }

    /// Cut the projection down to the most recently updated sessions and
    /// their latest messages.
    #[must_use]
    pub fn degraded(&self) -> Self {
        let mut sessions = self.sessions.clone();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.truncate(MAX_DEGRADED_SESSIONS);
        for session in &mut sessions {
            let excess = session.messages.len().saturating_sub(MAX_DEGRADED_MESSAGES);
            session.messages.drain(..excess);
        }

        Self {
            sessions: sessions.iter().map(sanitize_session).collect(),
            current_session_id: self.current_session_id,
            current_model: self.current_model.clone(),
            models: self.models.clone(),
        }
    }

    /// Last-resort projection: no history, default catalog.
    #[must_use]
    pub fn minimal(&self) -> Self {
        Self {
            sessions: Vec::new(),
            current_session_id: None,
            current_model: self.current_model.clone(),
            models: default_models(),
        }
    }

    /// Fix up a freshly decoded record so it is safe to adopt.
    fn repair(&mut self) {
        if self.models.is_empty() {
            self.models = default_models();
        }
        if !self.models.iter().any(|m| m.name == self.current_model) {
            tracing::debug!(model = %self.current_model, "Persisted model not in catalog");
            self.current_model = self.models[0].name.clone();
        }
        if let Some(current) = self.current_session_id {
            if !self.sessions.iter().any(|s| s.id == current) {
                self.current_session_id = self.sessions.first().map(|s| s.id);
            }
        }
        for message in self.sessions.iter_mut().flat_map(|s| s.messages.iter_mut()) {
            if message.streaming() {
                message.is_streaming = Some(false);
            }
        }
    }
}

/// Elide an inline image URL, leaving other URLs untouched.
///
/// The result never starts with `data:`, so applying this twice is the same
/// as applying it once.
#[must_use]
pub fn sanitize_image_url(url: &str) -> String {
    if !url.starts_with(INLINE_DATA_PREFIX) {
        return url.to_string();
    }
    let prefix: String = url.chars().take(IMAGE_PREFIX_CHARS).collect();
    format!("{IMAGE_REMOVED_MARKER}{prefix}...")
}

fn sanitize_message(message: &Message) -> Message {
    let mut message = message.clone();
    if let Some(url) = message.image_url.as_deref() {
        message.image_url = Some(sanitize_image_url(url));
    }
    message
}

fn sanitize_session(session: &Session) -> Session {
    Session {
        messages: session.messages.iter().map(sanitize_message).collect(),
        ..session.clone()
    }
}

/// How much of the chat state made it to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The whole projection was written.
    Full,
    /// The capacity check failed and a trimmed projection was written.
    Degraded,
    /// Only the model selection survived.
    Minimal,
}

/// Storage consumption summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageUsage {
    /// Bytes in use.
    pub used: usize,
    /// Byte budget, if the backend has one.
    pub total: Option<usize>,
}

impl StorageUsage {
    /// Bytes still free, if the backend has a budget.
    #[must_use]
    pub fn available(&self) -> Option<usize> {
        self.total.map(|total| total.saturating_sub(self.used))
    }
}

impl fmt::Display for StorageUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.available(), self.total) {
            (Some(available), Some(total)) => write!(
                f,
                "Used: {}, Available: {}, Total: {}",
                format_bytes(self.used),
                format_bytes(available),
                format_bytes(total)
            ),
            _ => write!(
                f,
                "Used: {}, Available: unlimited, Total: unlimited",
                format_bytes(self.used)
            ),
        }
    }
}

/// Render a byte count as B, KB or MB with at most two decimals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 3] = ["B", "KB", "MB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

/// Reads and writes the durable records on top of a [`KeyValueStore`].
#[derive(Clone)]
pub struct Persistence {
    kv: Arc<dyn KeyValueStore>,
}

impl fmt::Debug for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persistence")
            .field("quota", &self.kv.quota())
            .finish_non_exhaustive()
    }
}

impl Persistence {
    /// Wrap a backend.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// The underlying backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    /// Mirror chat state to storage, degrading when space runs out.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails for a reason other than quota,
    /// or if even the minimal projection does not fit.
    pub fn save_chat(&self, state: &ChatState) -> Result<SaveOutcome> {
        let full = PersistedChat::project(state);
        let encoded = encode(&full)?;

        let (projection, outcome) = match self.check_capacity(&encoded) {
            Ok(()) => (None, SaveOutcome::Full),
            Err(e) if e.is_quota() => {
                tracing::warn!(error = %e, "Storage quota exceeded, trimming old sessions");
                (Some(full.degraded()), SaveOutcome::Degraded)
            }
            Err(e) => return Err(e),
        };

        let encoded = match &projection {
            Some(degraded) => encode(degraded)?,
            None => encoded,
        };

        match self.kv.put(keys::CHAT, &encoded) {
            Ok(()) => {
                tracing::debug!(?outcome, bytes = encoded.len(), "Saved chat state");
                Ok(outcome)
            }
            Err(e) if e.is_quota() => {
                tracing::error!(error = %e, "Chat state does not fit, keeping model selection only");
                self.kv.put(keys::CHAT, &encode(&full.minimal())?)?;
                Ok(SaveOutcome::Minimal)
            }
            Err(e) => Err(e),
        }
    }

    /// Load chat state, discarding the record if it does not decode.
    ///
    /// The returned state has a non-empty catalog, a current model present in
    /// it, a current session that exists (if any), and no streaming messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read. A missing or
    /// undecodable record is `Ok(None)`.
    pub fn load_chat(&self) -> Result<Option<PersistedChat>> {
        let Some(mut chat) = self.load::<PersistedChat>(keys::CHAT)? else {
            return Ok(None);
        };
        chat.repair();
        Ok(Some(chat))
    }

    /// Write settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    pub fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        self.kv.put(keys::SETTINGS, &encode(settings)?)?;
        tracing::debug!("Saved settings");
        Ok(())
    }

    /// Load settings, discarding the record if it does not decode.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn load_settings(&self) -> Result<Option<AppSettings>> {
        self.load(keys::SETTINGS)
    }

    /// Remove every application record that no longer decodes.
    ///
    /// Returns the keys that were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or written.
    pub fn cleanup_corrupted(&self) -> Result<Vec<&'static str>> {
        let mut removed = Vec::new();
        for key in keys::app_keys() {
            let Some(raw) = self.kv.get(key)? else {
                continue;
            };
            let valid = match key {
                keys::CHAT => decode::<PersistedChat>(&raw).is_ok(),
                _ => decode::<AppSettings>(&raw).is_ok(),
            };
            if !valid {
                tracing::warn!(key, "Removing corrupted storage key");
                self.kv.remove(key)?;
                removed.push(key);
            }
        }
        Ok(removed)
    }

    /// Remove all application records.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn force_clean(&self) -> Result<()> {
        for key in keys::app_keys() {
            self.kv.remove(key)?;
        }
        tracing::info!("Storage cleaned");
        Ok(())
    }

    /// Current storage consumption.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn usage(&self) -> Result<StorageUsage> {
        Ok(StorageUsage {
            used: self.kv.used_bytes()?,
            total: self.kv.quota(),
        })
    }

    /// Check that `encoded` would fit by writing and removing the capacity key.
    fn check_capacity(&self, encoded: &str) -> Result<()> {
        self.kv.put(keys::CAPACITY_CHECK, encoded)?;
        self.kv.remove(keys::CAPACITY_CHECK)
    }

    /// Read and decode `key`. Only a record that fails to decode is removed;
    /// read failures leave the stored value alone.
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.kv.get(key)? else {
            return Ok(None);
        };

        match decode(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding corrupted storage record");
                if let Err(e) = self.kv.remove(key) {
                    tracing::error!(key, error = %e, "Failed to remove corrupted record");
                }
                Ok(None)
            }
        }
    }
}

fn encode<T: Serialize>(state: &T) -> Result<String> {
    Ok(serde_json::to_string(&Envelope {
        state,
        version: RECORD_VERSION,
    })?)
}

fn decode<T: DeserializeOwned>(raw: &str) -> std::result::Result<T, StoreError> {
    let envelope: Envelope<T> = serde_json::from_str(raw)?;
    Ok(envelope.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKv;
    use chatline_core::{MessageId, NewMessage};
    use chrono::{Duration, Utc};

    fn persistence(kv: MemoryKv) -> (Persistence, Arc<MemoryKv>) {
        let kv = Arc::new(kv);
        (Persistence::new(kv.clone()), kv)
    }

    fn session_with_messages(title: &str, count: usize, body: &str, age_minutes: i64) -> Session {
        let mut session = Session::new(Some(title));
        for i in 0..count {
            let image = (i % 3 == 0).then(|| format!("data:image/png;base64,{}", "A".repeat(300)));
            session
                .messages
                .push(NewMessage::user(body, image).with_id(MessageId::generate()));
        }
        session.updated_at = Utc::now() - Duration::minutes(age_minutes);
        session
    }

    fn state_with(sessions: Vec<Session>) -> ChatState {
        ChatState {
            current_session_id: sessions.first().map(|s| s.id),
            sessions,
            ..ChatState::default()
        }
    }

    fn stored_chat(kv: &MemoryKv) -> PersistedChat {
        decode(&kv.get(keys::CHAT).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn sanitize_elides_inline_images_only() {
        let inline = format!("data:image/png;base64,{}", "B".repeat(500));
        let sanitized = sanitize_image_url(&inline);
        assert!(sanitized.starts_with(IMAGE_REMOVED_MARKER));
        assert!(sanitized.contains(&inline[..IMAGE_PREFIX_CHARS]));
        assert!(sanitized.len() < inline.len());
        assert_eq!(sanitize_image_url(&sanitized), sanitized);

        assert_eq!(sanitize_image_url("http://x/y.png"), "http://x/y.png");
    }

    #[test]
    fn projection_leaves_live_state_untouched() {
        let state = state_with(vec![session_with_messages("a", 3, "hi", 0)]);
        let projected = PersistedChat::project(&state);

        let live = state.sessions[0].messages[0].image_url.as_deref().unwrap();
        let stored = projected.sessions[0].messages[0].image_url.as_deref().unwrap();
        assert!(live.starts_with("data:"));
        assert!(stored.starts_with(IMAGE_REMOVED_MARKER));
    }

    #[test]
    fn save_and_load_round_trip() {
        let (persistence, kv) = persistence(MemoryKv::new());
        let state = state_with(vec![session_with_messages("a", 2, "hello", 0)]);

        assert_eq!(persistence.save_chat(&state).unwrap(), SaveOutcome::Full);
        // Capacity key is cleaned up.
        assert!(kv.get(keys::CAPACITY_CHECK).unwrap().is_none());

        let raw = kv.get(keys::CHAT).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["version"], 0);
        assert!(json["state"]["currentSessionId"].is_string());

        let loaded = persistence.load_chat().unwrap().unwrap();
        assert_eq!(loaded.sessions.len(), 1);
        assert_eq!(loaded.sessions[0].messages[1].content, "hello");
        assert_eq!(loaded.current_session_id, state.current_session_id);
        assert_eq!(loaded.current_model, DEFAULT_MODEL);
    }

    #[test]
    fn degrade_caps_sessions_and_messages() {
        let (persistence, kv) = persistence(MemoryKv::with_quota(200_000));
        let body = "x".repeat(500);
        let sessions: Vec<_> = (0..15)
            .map(|i| session_with_messages(&format!("s{i}"), 30, &body, i))
            .collect();
        let newest: Vec<_> = sessions.iter().take(10).map(|s| s.id).collect();
        let state = state_with(sessions);

        assert_eq!(persistence.save_chat(&state).unwrap(), SaveOutcome::Degraded);

        let stored = stored_chat(&kv);
        assert!(stored.sessions.len() <= MAX_DEGRADED_SESSIONS);
        assert_eq!(
            stored.sessions.iter().map(|s| s.id).collect::<Vec<_>>(),
            newest
        );
        for session in &stored.sessions {
            assert!(session.messages.len() <= MAX_DEGRADED_MESSAGES);
            for message in &session.messages {
                assert!(!message
                    .image_url
                    .as_deref()
                    .is_some_and(|u| u.starts_with("data:")));
            }
        }
    }

    #[test]
    fn degrade_keeps_latest_messages() {
        let mut session = session_with_messages("a", 30, "x", 0);
        for (i, message) in session.messages.iter_mut().enumerate() {
            message.content = i.to_string();
        }
        let degraded = PersistedChat::project(&state_with(vec![session])).degraded();
        let contents: Vec<_> = degraded.sessions[0]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents.first(), Some(&"10"));
        assert_eq!(contents.last(), Some(&"29"));
    }

    #[test]
    fn minimal_projection_when_nothing_fits() {
        let (persistence, kv) = persistence(MemoryKv::with_quota(1_500));
        let body = "y".repeat(2_000);
        let mut state = state_with(vec![session_with_messages("big", 1, &body, 0)]);
        state.current_model = "gpt-4o-mini".to_string();

        assert_eq!(persistence.save_chat(&state).unwrap(), SaveOutcome::Minimal);
        let stored = stored_chat(&kv);
        assert!(stored.sessions.is_empty());
        assert_eq!(stored.current_session_id, None);
        assert_eq!(stored.current_model, "gpt-4o-mini");
        assert_eq!(stored.models, default_models());
    }

    #[test]
    fn corrupted_chat_record_is_discarded() {
        let (persistence, kv) = persistence(MemoryKv::new());
        kv.insert_raw(keys::CHAT, "{not json");

        assert!(persistence.load_chat().unwrap().is_none());
        assert!(kv.get(keys::CHAT).unwrap().is_none());
    }

    #[test]
    fn load_repairs_catalog_and_selection() {
        let (persistence, kv) = persistence(MemoryKv::new());
        let mut session = session_with_messages("a", 1, "hi", 0);
        session.messages[0].is_streaming = Some(true);
        let chat = PersistedChat {
            sessions: vec![session.clone()],
            current_session_id: Some(SessionId::generate()),
            current_model: "retired-model".to_string(),
            models: Vec::new(),
        };
        kv.insert_raw(keys::CHAT, &encode(&chat).unwrap());

        let loaded = persistence.load_chat().unwrap().unwrap();
        assert_eq!(loaded.models, default_models());
        assert_eq!(loaded.current_model, default_models()[0].name);
        assert_eq!(loaded.current_session_id, Some(session.id));
        assert_eq!(loaded.sessions[0].messages[0].is_streaming, Some(false));
    }

    #[test]
    fn load_keeps_custom_catalog_first_entry() {
        let (persistence, kv) = persistence(MemoryKv::new());
        let custom = ModelDescriptor {
            name: "local-llm".to_string(),
            display_name: "Local".to_string(),
            max_tokens: 2048,
            supports_vision: false,
        };
        let chat = PersistedChat {
            sessions: Vec::new(),
            current_session_id: None,
            current_model: "gpt-4o".to_string(),
            models: vec![custom],
        };
        kv.insert_raw(keys::CHAT, &encode(&chat).unwrap());

        assert_eq!(persistence.load_chat().unwrap().unwrap().current_model, "local-llm");
    }

    #[test]
    fn settings_round_trip_and_corruption() {
        let (persistence, kv) = persistence(MemoryKv::new());
        assert!(persistence.load_settings().unwrap().is_none());

        let mut settings = AppSettings::default();
        settings.api_endpoint = "http://example.test".to_string();
        persistence.save_settings(&settings).unwrap();
        assert_eq!(persistence.load_settings().unwrap().unwrap(), settings);

        kv.insert_raw(keys::SETTINGS, "]]");
        assert!(persistence.load_settings().unwrap().is_none());
        assert!(kv.get(keys::SETTINGS).unwrap().is_none());
    }

    #[test]
    fn cleanup_removes_only_corrupted_keys() {
        let (persistence, kv) = persistence(MemoryKv::new());
        persistence.save_settings(&AppSettings::default()).unwrap();
        kv.insert_raw(keys::CHAT, "garbage");
        kv.insert_raw("unrelated", "garbage");

        assert_eq!(persistence.cleanup_corrupted().unwrap(), vec![keys::CHAT]);
        assert!(kv.get(keys::SETTINGS).unwrap().is_some());
        assert!(kv.get("unrelated").unwrap().is_some());
    }

    #[test]
    fn read_failure_is_reported_and_keeps_record() {
        let kv = Arc::new(crate::testing::UnreadableKv::default());
        let persistence = Persistence::new(kv.clone());
        persistence.save_settings(&AppSettings::default()).unwrap();

        kv.fail_reads(1);
        assert!(matches!(persistence.load_settings(), Err(StoreError::Io(_))));
        assert!(persistence.load_settings().unwrap().is_some());
    }

    #[test]
    fn force_clean_removes_app_keys() {
        let (persistence, kv) = persistence(MemoryKv::new());
        persistence.save_settings(&AppSettings::default()).unwrap();
        persistence.save_chat(&ChatState::default()).unwrap();
        kv.insert_raw("unrelated", "kept");

        persistence.force_clean().unwrap();
        assert_eq!(kv.keys().unwrap(), vec!["unrelated".to_string()]);
    }

    #[test]
    fn usage_reports_quota() {
        let (persistence, kv) = persistence(MemoryKv::with_quota(4096));
        kv.put("k", &"z".repeat(1535)).unwrap();

        let usage = persistence.usage().unwrap();
        assert_eq!(usage.used, 1536);
        assert_eq!(usage.available(), Some(2560));
        assert_eq!(
            usage.to_string(),
            "Used: 1.5 KB, Available: 2.5 KB, Total: 4 KB"
        );
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_bytes(1234), "1.21 KB");
    }
}
