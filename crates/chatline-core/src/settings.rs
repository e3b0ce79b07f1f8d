//! Application settings.
//!
//! Settings are persisted independently of chat state. Every field carries a
//! serde default so records written by older builds, or only partially
//! written, still decode.

use serde::{Deserialize, Serialize};

/// Color theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light background.
    #[default]
    Light,
    /// Dark background.
    Dark,
}

impl Theme {
    /// Name as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

/// Interface language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Chinese.
    #[default]
    Zh,
    /// English.
    En,
}

impl Language {
    /// Name as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::En => "en",
        }
    }
}

/// Message list background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    /// Gradient fill.
    #[default]
    Gradient,
    /// Flat color.
    Solid,
    /// Background picture.
    Image,
}

/// Text size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    /// Small text.
    Small,
    /// Medium text.
    #[default]
    Medium,
    /// Large text.
    Large,
}

/// Spacing between messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    /// Tight spacing.
    Compact,
    /// Default spacing.
    #[default]
    Comfortable,
    /// Loose spacing.
    Spacious,
}

/// Text-to-speech preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceConfig {
    /// Whether voice features are enabled.
    pub enabled: bool,
    /// Voice preset name.
    pub voice: String,
    /// Play assistant replies automatically once they finish.
    pub auto_play: bool,
    /// Playback speed multiplier.
    pub speed: f32,
    /// Request audio as a stream instead of a single blob.
    pub streaming_mode: bool,
}

impl VoiceConfig {
    /// Voice presets offered by the speech service.
    pub const VOICES: [&'static str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

    /// Slowest playback speed.
    pub const MIN_SPEED: f32 = 0.5;

    /// Fastest playback speed.
    pub const MAX_SPEED: f32 = 2.0;
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            voice: "alloy".to_string(),
            auto_play: false,
            speed: 1.0,
            streaming_mode: false,
        }
    }
}

/// Limits for image attachments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageConfig {
    /// Maximum attachment size in bytes.
    pub max_size: u64,
    /// Accepted MIME types.
    pub allowed_types: Vec<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_size: 5 * 1024 * 1024,
            allowed_types: ["image/jpeg", "image/png", "image/gif", "image/webp"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Presentation preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UiConfig {
    /// Background style.
    pub background: Background,
    /// Background picture used with [`Background::Image`].
    pub background_image: String,
    /// Text size.
    pub font_size: FontSize,
    /// Message spacing.
    pub density: Density,
    /// Show message timestamps.
    pub show_timestamp: bool,
    /// Animate streaming output.
    pub enable_animations: bool,
    /// Condensed layout.
    pub compact_mode: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            background: Background::Gradient,
            background_image: "/backgrounds/anime_sakura.jpg".to_string(),
            font_size: FontSize::Medium,
            density: Density::Comfortable,
            show_timestamp: true,
            enable_animations: true,
            compact_mode: false,
        }
    }
}

/// All user-adjustable settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Color theme.
    pub theme: Theme,
    /// Interface language.
    pub language: Language,
    /// Base URL of the chat endpoint.
    pub api_endpoint: String,
    /// Voice preferences.
    pub voice: VoiceConfig,
    /// Attachment limits.
    pub image: ImageConfig,
    /// Presentation preferences.
    pub ui: UiConfig,
}

impl AppSettings {
    /// Endpoint used when nothing has been configured.
    pub const DEFAULT_ENDPOINT: &'static str = "http://127.0.0.1:9200";

    /// Apply a top-level partial update.
    pub fn update(&mut self, update: SettingsUpdate) {
        if let Some(theme) = update.theme {
            self.theme = theme;
        }
        if let Some(language) = update.language {
            self.language = language;
        }
        if let Some(endpoint) = update.api_endpoint {
            self.api_endpoint = endpoint;
        }
    }

    /// Apply a partial voice update.
    pub fn update_voice(&mut self, update: VoiceConfigUpdate) {
        let voice = &mut self.voice;
        if let Some(enabled) = update.enabled {
            voice.enabled = enabled;
        }
        if let Some(name) = update.voice {
            voice.voice = name;
        }
        if let Some(auto_play) = update.auto_play {
            voice.auto_play = auto_play;
        }
        if let Some(speed) = update.speed {
            voice.speed = speed;
        }
        if let Some(streaming_mode) = update.streaming_mode {
            voice.streaming_mode = streaming_mode;
        }
    }

    /// Apply a partial image update.
    pub fn update_image(&mut self, update: ImageConfigUpdate) {
        if let Some(max_size) = update.max_size {
            self.image.max_size = max_size;
        }
        if let Some(allowed_types) = update.allowed_types {
            self.image.allowed_types = allowed_types;
        }
    }

    /// Apply a partial UI update.
    pub fn update_ui(&mut self, update: UiConfigUpdate) {
        let ui = &mut self.ui;
        if let Some(background) = update.background {
            ui.background = background;
        }
        if let Some(image) = update.background_image {
            ui.background_image = image;
        }
        if let Some(font_size) = update.font_size {
            ui.font_size = font_size;
        }
        if let Some(density) = update.density {
            ui.density = density;
        }
        if let Some(show) = update.show_timestamp {
            ui.show_timestamp = show;
        }
        if let Some(enable) = update.enable_animations {
            ui.enable_animations = enable;
        }
        if let Some(compact) = update.compact_mode {
            ui.compact_mode = compact;
        }
    }

    /// Restore every setting to its default.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            language: Language::Zh,
            api_endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            voice: VoiceConfig::default(),
            image: ImageConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

/// Partial update of the top-level settings.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    /// New theme.
    pub theme: Option<Theme>,
    /// New language.
    pub language: Option<Language>,
    /// New endpoint.
    pub api_endpoint: Option<String>,
}

/// Partial update of [`VoiceConfig`].
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct VoiceConfigUpdate {
    pub enabled: Option<bool>,
    pub voice: Option<String>,
    pub auto_play: Option<bool>,
    pub speed: Option<f32>,
    pub streaming_mode: Option<bool>,
}

/// Partial update of [`ImageConfig`].
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct ImageConfigUpdate {
    pub max_size: Option<u64>,
    pub allowed_types: Option<Vec<String>>,
}

/// Partial update of [`UiConfig`].
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct UiConfigUpdate {
    pub background: Option<Background>,
    pub background_image: Option<String>,
    pub font_size: Option<FontSize>,
    pub density: Option<Density>,
    pub show_timestamp: Option<bool>,
    pub enable_animations: Option<bool>,
    pub compact_mode: Option<bool>,
}
