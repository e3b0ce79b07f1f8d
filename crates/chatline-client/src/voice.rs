//! Speech routes of the chat service.
//!
//! - POST `/speech_to_text`: multipart `audio` file plus optional `language`,
//!   answered with `{ "code": 0, "text": "..." }`
//! - POST `/text_to_speech`: `{ "text", "voice" }`, answered with audio bytes
//! - POST `/text_to_speech_stream`: same body, answered with `data: ` lines
//!   carrying `{ "code", "message", "chunk"?, "audio_data"? }` and ending
//!   with `[DONE]`

use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::client::ChatClient;
use crate::error::{ClientError, Result};
use crate::sse::{spawn_lines, LineEvent};

/// Route for transcription.
pub const SPEECH_TO_TEXT_ROUTE: &str = "/speech_to_text";

/// Route for whole-reply synthesis.
pub const TEXT_TO_SPEECH_ROUTE: &str = "/text_to_speech";

/// Route for streamed synthesis.
pub const TEXT_TO_SPEECH_STREAM_ROUTE: &str = "/text_to_speech_stream";

/// Body of both synthesis routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeechRequest {
    /// Text to speak.
    pub text: String,
    /// Voice preset.
    pub voice: String,
}

impl SpeechRequest {
    /// Speak `text` with `voice`.
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Transcription {
    code: i64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    message: Option<String>,
}

/// One accepted line of a synthesis stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpeechChunk {
    /// Status code; only `0` lines are delivered.
    pub code: i64,
    /// Status text.
    #[serde(default)]
    pub message: String,
    /// Text that the audio covers.
    #[serde(default)]
    pub chunk: Option<String>,
    /// Base64-encoded audio.
    #[serde(default)]
    pub audio_data: Option<String>,
}

impl SpeechChunk {
    /// Decode the audio payload, if the line carries one.
    ///
    /// # Errors
    ///
    /// Returns an error if `audio_data` is not valid base64.
    pub fn audio(&self) -> std::result::Result<Option<Vec<u8>>, base64::DecodeError> {
        self.audio_data
            .as_deref()
            .map(|data| STANDARD.decode(data))
            .transpose()
    }
}

/// Events of one synthesis stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// A successful line.
    Chunk(SpeechChunk),
    /// The stream finished normally.
    Complete,
    /// The stream failed.
    Error(String),
}

impl LineEvent for SpeechEvent {
    fn complete() -> Self {
        Self::Complete
    }

    fn error(message: String) -> Self {
        Self::Error(message)
    }
}

fn parse_speech_line(payload: &str) -> Option<SpeechEvent> {
    match serde_json::from_str::<SpeechChunk>(payload) {
        Ok(chunk) if chunk.code == 0 => Some(SpeechEvent::Chunk(chunk)),
        Ok(chunk) => {
            tracing::debug!(code = chunk.code, message = %chunk.message, "Skipping speech line");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed speech line");
            None
        }
    }
}

/// MIME type implied by an audio file name.
#[must_use]
pub fn audio_mime_type(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("m4a" | "mp4") => "audio/mp4",
        _ => "application/octet-stream",
    }
}

impl ChatClient {
    /// Transcribe an audio recording.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Service`] when the service reports a non-zero
    /// code, and transport errors as for chat requests.
    pub async fn speech_to_text(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        language: Option<&str>,
    ) -> Result<String> {
        let part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(audio_mime_type(file_name))?;
        let mut form = Form::new().part("audio", part);
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }

        let url = self.config().url(SPEECH_TO_TEXT_ROUTE);
        tracing::debug!(url = %url, file_name, "Sending speech recognition request");
        let response = self.send(self.client.post(&url).multipart(form)).await?;

        let transcription: Transcription = response.json().await?;
        if transcription.code == 0 {
            Ok(transcription.text)
        } else {
            Err(ClientError::Service(
                transcription
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Speech recognition failed".to_string()),
            ))
        }
    }

    /// Synthesize `request` and return the whole audio body.
    ///
    /// # Errors
    ///
    /// Returns transport errors as for chat requests.
    pub async fn text_to_speech(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        let url = self.config().url(TEXT_TO_SPEECH_ROUTE);
        tracing::debug!(url = %url, voice = %request.voice, "Sending speech synthesis request");
        let response = self.send(self.client.post(&url).json(request)).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Synthesize `request` as a stream of audio chunks.
    ///
    /// The channel receives chunks with code `0`, then exactly one
    /// `Complete` or `Error`.
    ///
    /// # Errors
    ///
    /// Returns transport errors for the initial request.
    pub async fn text_to_speech_stream(
        &self,
        request: &SpeechRequest,
    ) -> Result<mpsc::Receiver<SpeechEvent>> {
        let url = self.config().url(TEXT_TO_SPEECH_STREAM_ROUTE);
        tracing::debug!(url = %url, voice = %request.voice, "Sending streamed synthesis request");
        let response = self.send(self.client.post(&url).json(request)).await?;
        Ok(spawn_lines(
            response,
            self.config().channel_capacity,
            parse_speech_line,
        ))
    }
}

/// Speech operations used by front ends.
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Transcribe a recording.
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        language: Option<&str>,
    ) -> Result<String>;

    /// Synthesize `request`, using the streaming route when `streaming`.
    async fn synthesize(&self, request: &SpeechRequest, streaming: bool) -> Result<Vec<u8>>;
}

#[async_trait]
impl SpeechService for ChatClient {
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        language: Option<&str>,
    ) -> Result<String> {
        self.speech_to_text(audio, file_name, language).await
    }

    async fn synthesize(&self, request: &SpeechRequest, streaming: bool) -> Result<Vec<u8>> {
        if streaming {
            collect_audio(self.text_to_speech_stream(request).await?).await
        } else {
            self.text_to_speech(request).await
        }
    }
}

/// Concatenate the audio of a synthesis stream.
///
/// # Errors
///
/// Returns [`ClientError::Service`] if the stream fails or a chunk carries
/// audio that is not valid base64.
pub async fn collect_audio(mut events: mpsc::Receiver<SpeechEvent>) -> Result<Vec<u8>> {
    let mut audio = Vec::new();
    while let Some(event) = events.recv().await {
        match event {
            SpeechEvent::Chunk(chunk) => {
                let bytes = chunk
                    .audio()
                    .map_err(|e| ClientError::Service(format!("invalid audio data: {e}")))?;
                audio.extend(bytes.unwrap_or_default());
            }
            SpeechEvent::Complete => return Ok(audio),
            SpeechEvent::Error(message) => return Err(ClientError::Service(message)),
        }
    }
    Ok(audio)
}
