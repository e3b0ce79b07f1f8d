//! Streaming transport and exchange controller for chatline.
//!
//! - [`sse`]: incremental decoding of the `data: ` line stream
//! - [`transport`]: the [`Transport`] seam and its event type
//! - [`client`]: the reqwest-backed [`ChatClient`]
//! - [`exchange`]: the [`ExchangeController`] that writes a streaming reply
//!   into a [`chatline_store::ChatStore`]
//! - [`attachment`]: local image files as inline `data:` URLs
//! - [`voice`]: speech-to-text and text-to-speech routes

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod attachment;
pub mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod sse;
pub mod transport;
pub mod voice;

pub use attachment::{image_data_url, AttachmentError};
pub use client::ChatClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use exchange::{ActiveExchange, ExchangeController, ExchangeError, ExchangePhase, ExchangeTarget};
pub use sse::{stream_events, DataLine, DataLines, SseDecoder, SseEvent};
pub use transport::{ChatRequest, StreamEvent, Transport};
pub use voice::{collect_audio, SpeechChunk, SpeechEvent, SpeechRequest, SpeechService};
