//! Core types and utilities for chatline.
//!
//! This crate provides the foundational types shared by the store, the
//! streaming client and the command-line front end:
//!
//! - **Identifiers**: strongly-typed IDs for sessions and messages
//! - **Domain types**: sessions, messages and partial message updates
//! - **Model catalog**: the static list of selectable models
//! - **Settings**: user preferences persisted next to chat state
//! - **Image markers**: derivation of display content from streamed text
//!
//! # Example
//!
//! ```
//! use chatline_core::marker::extract_image_marker;
//!
//! let derived = extract_image_marker("Done.\n[IMAGE:http://x/y.png]");
//! assert_eq!(derived.content, "Done.");
//! assert_eq!(derived.image_url.as_deref(), Some("http://x/y.png"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod marker;
pub mod models;
pub mod settings;
pub mod types;

pub use error::{CoreError, Result};
pub use ids::{IdError, MessageId, SessionId};
pub use marker::{extract_image_marker, DerivedContent};
pub use models::{default_models, ModelDescriptor, DEFAULT_MODEL};
pub use settings::AppSettings;
pub use types::{Message, MessageRole, MessageUpdate, NewMessage, Session};
