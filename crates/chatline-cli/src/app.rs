//! Application state and the line-oriented chat loop.
//!
//! Replies are printed as they stream: each update writes only the text
//! added since the previous one, and falls back to reprinting the whole
//! message when the content was re-derived (for example, when an image
//! marker arrives and the text collapses to a label).

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chatline_client::{
    image_data_url, ExchangeController, ExchangePhase, SpeechRequest, SpeechService, Transport,
};
use chatline_core::models::find_model;
use chatline_core::settings::{SettingsUpdate, VoiceConfigUpdate};
use chatline_core::{Message, MessageRole};
use chatline_store::{ChatStore, Persistence, SettingsStore};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::command::{Command, CommandError, SettingChange, HELP};

/// Prompt printed before each input line.
pub const PROMPT: &str = "> ";

/// File that `/tts` and autoplay write to when no path is given.
pub const DEFAULT_SPEECH_FILE: &str = "reply.mp3";

/// Remote services the app talks to.
pub struct Services {
    /// Chat replies.
    pub transport: Arc<dyn Transport>,
    /// Transcription and synthesis.
    pub speech: Arc<dyn SpeechService>,
}

/// Application state.
pub struct App {
    store: ChatStore,
    settings: SettingsStore,
    persistence: Option<Persistence>,
    services: Services,
    controller: ExchangeController,
    speech_file: PathBuf,
    /// Set by `/quit`.
    pub should_quit: bool,
}

impl App {
    /// Create an app, making sure a session is selected.
    pub fn new(
        mut store: ChatStore,
        settings: SettingsStore,
        persistence: Option<Persistence>,
        services: Services,
    ) -> Self {
        store.ensure_session();
        Self {
            store,
            settings,
            persistence,
            services,
            controller: ExchangeController::new(),
            speech_file: PathBuf::from(DEFAULT_SPEECH_FILE),
            should_quit: false,
        }
    }

    /// Write synthesized speech to `path` by default.
    #[must_use]
    pub fn with_speech_file(mut self, path: PathBuf) -> Self {
        self.speech_file = path;
        self
    }

    /// The session store.
    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    /// The settings store.
    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Read lines from `input` until it ends or `/quit` is entered.
    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        self.print_current(out)?;
        let mut lines = input.lines();
        loop {
            write!(out, "{PROMPT}")?;
            out.flush()?;

            let Some(line) = lines.next_line().await? else {
                writeln!(out)?;
                break;
            };
            self.handle_line(&line, out).await?;
            if self.should_quit {
                break;
            }
        }
        Ok(())
    }

    /// Handle one input line.
    ///
    /// # Errors
    ///
    /// Only output failures are returned; command problems are printed.
    pub async fn handle_line<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<()> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(CommandError::Empty) => return Ok(()),
            Err(e) => return writeln!(out, "error: {e}"),
        };

        match command {
            Command::Send(text) => self.send(&text, None, out).await,
            Command::Image { path, text } => {
                match image_data_url(&path, &self.settings.settings().image) {
                    Ok(url) => self.send(&text, Some(url), out).await,
                    Err(e) => writeln!(out, "error: {e}"),
                }
            }
            Command::New(title) => {
                self.store.create_session(title.as_deref());
                self.print_current(out)
            }
            Command::Sessions => self.print_sessions(out),
            Command::Switch(n) => {
                let Some(id) = self.session_at(n) else {
                    return writeln!(out, "error: no session {n}");
                };
                match self.store.set_current_session(&id) {
                    Ok(()) => self.print_history(out),
                    Err(e) => writeln!(out, "error: {e}"),
                }
            }
            Command::Rename(title) => {
                if let Some(id) = self.store.current_session_id() {
                    self.store.update_session_title(&id, &title);
                }
                self.print_current(out)
            }
            Command::Delete(n) => self.delete(n, out),
            Command::Clear => {
                if let Some(id) = self.store.current_session_id() {
                    self.store.clear_messages(&id);
                }
                writeln!(out, "Cleared.")
            }
            Command::Models => self.print_models(out),
            Command::Model(name) => {
                if find_model(self.store.models(), &name).is_none() {
                    return writeln!(out, "error: unknown model {name} (see /models)");
                }
                self.store.set_current_model(&name);
                writeln!(out, "Model: {name}")
            }
            Command::Usage => match &self.persistence {
                Some(persistence) => match persistence.usage() {
                    Ok(usage) => writeln!(out, "{usage}"),
                    Err(e) => writeln!(out, "error: {e}"),
                },
                None => writeln!(out, "Storage is disabled."),
            },
            Command::Stt(path) => self.transcribe_and_send(&path, out).await,
            Command::Tts(path) => {
                let path = path.unwrap_or_else(|| self.speech_file.clone());
                self.speak_last_reply(&path, out).await
            }
            Command::Settings => self.print_settings(out),
            Command::Set(change) => self.apply_setting(change, out),
            Command::ResetSettings => {
                self.settings.reset();
                writeln!(out, "Settings restored to defaults.")
            }
            Command::Help => writeln!(out, "{HELP}"),
            Command::Quit => {
                self.should_quit = true;
                Ok(())
            }
        }
    }

    async fn send<W: Write>(
        &mut self,
        text: &str,
        image_url: Option<String>,
        out: &mut W,
    ) -> io::Result<()> {
        if self.store.is_streaming() {
            return writeln!(out, "error: a reply is still streaming");
        }
        if image_url.is_some() && !self.current_model_supports_vision() {
            return writeln!(
                out,
                "error: {} does not accept images (see /models)",
                self.store.current_model()
            );
        }

        let session_id = self.store.ensure_session();
        tracing::debug!(session_id = %session_id, "Sending message");

        let mut printer = StreamPrinter::default();
        write!(out, "assistant> ")?;
        let result = self
            .controller
            .run(
                &mut self.store,
                self.services.transport.as_ref(),
                text,
                image_url,
                None,
                |message| {
                    if let Err(e) = printer.render(message, out) {
                        tracing::warn!(error = %e, "Failed to write reply");
                    }
                },
            )
            .await;

        match result {
            Ok(ExchangePhase::Failed) => tracing::debug!("Exchange failed"),
            Ok(ExchangePhase::Completed) => {
                let voice = &self.settings.settings().voice;
                if voice.enabled && voice.auto_play {
                    let path = self.speech_file.clone();
                    self.speak_last_reply(&path, out).await?;
                }
            }
            Ok(_) => {}
            Err(e) => writeln!(out, "error: {e}")?,
        }
        Ok(())
    }

    async fn transcribe_and_send<W: Write>(&mut self, path: &Path, out: &mut W) -> io::Result<()> {
        if !self.settings.settings().voice.enabled {
            return writeln!(out, "error: voice mode is disabled (/set voice-mode on)");
        }
        let audio = match std::fs::read(path) {
            Ok(audio) => audio,
            Err(e) => return writeln!(out, "error: failed to read {}: {e}", path.display()),
        };
        let file_name = path
            .file_name()
            .map_or_else(|| "audio".to_string(), |n| n.to_string_lossy().into_owned());
        let language = self.settings.settings().language.as_str();

        let text = match self
            .services
            .speech
            .transcribe(audio, &file_name, Some(language))
            .await
        {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => return writeln!(out, "error: no speech recognized"),
            Err(e) => return writeln!(out, "error: {e}"),
        };
        writeln!(out, "user> {text}")?;
        self.send(&text, None, out).await
    }

    async fn speak_last_reply<W: Write>(&self, path: &Path, out: &mut W) -> io::Result<()> {
        let voice = self.settings.settings().voice.clone();
        if !voice.enabled {
            return writeln!(out, "error: voice mode is disabled (/set voice-mode on)");
        }
        let Some(text) = self.last_reply() else {
            return writeln!(out, "error: no reply to speak");
        };

        let request = SpeechRequest::new(text, voice.voice);
        match self
            .services
            .speech
            .synthesize(&request, voice.streaming_mode)
            .await
        {
            Ok(audio) => match std::fs::write(path, &audio) {
                Ok(()) => writeln!(out, "Saved speech ({} bytes) to {}", audio.len(), path.display()),
                Err(e) => writeln!(out, "error: failed to write {}: {e}", path.display()),
            },
            Err(e) => writeln!(out, "error: {e}"),
        }
    }

    fn last_reply(&self) -> Option<String> {
        self.store
            .current_session()?
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant && !m.streaming())
            .map(|m| m.content.clone())
            .filter(|text| !text.trim().is_empty())
    }

    fn apply_setting<W: Write>(&mut self, change: SettingChange, out: &mut W) -> io::Result<()> {
        match change {
            SettingChange::Endpoint(endpoint) => {
                self.settings.update(SettingsUpdate {
                    api_endpoint: Some(endpoint),
                    ..Default::default()
                });
                return writeln!(out, "Endpoint saved; it is used from the next start.");
            }
            SettingChange::Theme(theme) => self.settings.update(SettingsUpdate {
                theme: Some(theme),
                ..Default::default()
            }),
            SettingChange::Language(language) => self.settings.update(SettingsUpdate {
                language: Some(language),
                ..Default::default()
            }),
            SettingChange::Voice(voice) => self.settings.update_voice(VoiceConfigUpdate {
                voice: Some(voice),
                ..Default::default()
            }),
            SettingChange::Speed(speed) => self.settings.update_voice(VoiceConfigUpdate {
                speed: Some(speed),
                ..Default::default()
            }),
            SettingChange::VoiceEnabled(enabled) => self.settings.update_voice(VoiceConfigUpdate {
                enabled: Some(enabled),
                ..Default::default()
            }),
            SettingChange::AutoPlay(auto_play) => self.settings.update_voice(VoiceConfigUpdate {
                auto_play: Some(auto_play),
                ..Default::default()
            }),
            SettingChange::VoiceStreaming(streaming) => {
                self.settings.update_voice(VoiceConfigUpdate {
                    streaming_mode: Some(streaming),
                    ..Default::default()
                });
            }
        }
        writeln!(out, "Saved.")
    }

    fn delete<W: Write>(&mut self, n: Option<usize>, out: &mut W) -> io::Result<()> {
        if self.store.sessions().len() <= 1 {
            return writeln!(out, "error: cannot delete the only session");
        }
        let target = match n {
            Some(n) => self.session_at(n),
            None => self.store.current_session_id(),
        };
        let Some(id) = target else {
            return writeln!(out, "error: no such session");
        };
        self.store.delete_session(&id);
        self.store.ensure_session();
        self.print_current(out)
    }

    fn session_at(&self, n: usize) -> Option<chatline_core::SessionId> {
        self.store.sessions().get(n.checked_sub(1)?).map(|s| s.id)
    }

    fn current_model_supports_vision(&self) -> bool {
        find_model(self.store.models(), self.store.current_model())
            .is_some_and(|m| m.supports_vision)
    }

    fn print_current<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if let Some(session) = self.store.current_session() {
            writeln!(
                out,
                "Session: {} ({} messages) | Model: {}",
                session.title,
                session.messages.len(),
                self.store.current_model()
            )?;
        }
        Ok(())
    }

    fn print_sessions<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let current = self.store.current_session_id();
        for (i, session) in self.store.sessions().iter().enumerate() {
            let marker = if Some(session.id) == current { '*' } else { ' ' };
            writeln!(
                out,
                "{marker} {}. {} ({} messages)",
                i + 1,
                session.title,
                session.messages.len()
            )?;
        }
        Ok(())
    }

    fn print_history<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_current(out)?;
        let Some(session) = self.store.current_session() else {
            return Ok(());
        };
        for message in &session.messages {
            writeln!(out, "{}> {}", message.role.as_str(), message.content)?;
            if let Some(url) = &message.image_url {
                writeln!(out, "  [image] {url}")?;
            }
        }
        Ok(())
    }

    fn print_settings<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let settings = self.settings.settings();
        let on_off = |flag: bool| if flag { "on" } else { "off" };
        writeln!(out, "endpoint:        {}", settings.api_endpoint)?;
        writeln!(out, "theme:           {}", settings.theme.as_str())?;
        writeln!(out, "language:        {}", settings.language.as_str())?;
        writeln!(out, "voice-mode:      {}", on_off(settings.voice.enabled))?;
        writeln!(out, "voice:           {}", settings.voice.voice)?;
        writeln!(out, "speed:           {}x", settings.voice.speed)?;
        writeln!(out, "autoplay:        {}", on_off(settings.voice.auto_play))?;
        writeln!(out, "voice-streaming: {}", on_off(settings.voice.streaming_mode))?;
        if !self.settings.is_persisted() {
            writeln!(out, "(settings are not being saved)")?;
        }
        Ok(())
    }

    fn print_models<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for model in self.store.models() {
            let marker = if model.name == self.store.current_model() { '*' } else { ' ' };
            let vision = if model.supports_vision { ", vision" } else { "" };
            writeln!(
                out,
                "{marker} {} - {} ({} tokens{vision})",
                model.name, model.display_name, model.max_tokens
            )?;
        }
        Ok(())
    }
}

/// Writes a streaming message incrementally.
#[derive(Debug, Default)]
struct StreamPrinter {
    shown: String,
}

impl StreamPrinter {
    fn render<W: Write>(&mut self, message: &Message, out: &mut W) -> io::Result<()> {
        match message.content.strip_prefix(self.shown.as_str()) {
            Some(delta) => write!(out, "{delta}")?,
            None => write!(out, "\n{}", message.content)?,
        }
        self.shown.clone_from(&message.content);

        if !message.streaming() {
            if let Some(url) = &message.image_url {
                write!(out, "\n  [image] {url}")?;
            }
            writeln!(out)?;
        }
        out.flush()
    }
}
