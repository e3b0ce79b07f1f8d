//! Settings store, mirrored to its own durable key.

use chatline_core::settings::{
    ImageConfigUpdate, SettingsUpdate, UiConfigUpdate, VoiceConfigUpdate,
};
use chatline_core::AppSettings;

use crate::persist::Persistence;

/// Owns the user's settings and writes them back after every change.
#[derive(Debug, Default)]
pub struct SettingsStore {
    settings: AppSettings,
    persistence: Option<Persistence>,
}

impl SettingsStore {
    /// Settings that are never persisted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings backed by `persistence`, restoring any saved record.
    ///
    /// A record that cannot be read is left alone: defaults are used and
    /// changes are not written back.
    #[must_use]
    pub fn with_persistence(persistence: Persistence) -> Self {
        match persistence.load_settings() {
            Ok(settings) => Self {
                settings: settings.unwrap_or_default(),
                persistence: Some(persistence),
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to read settings, not persisting this run");
                Self::new()
            }
        }
    }

    /// Whether changes are written to durable storage.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.persistence.is_some()
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Apply a top-level update.
    pub fn update(&mut self, update: SettingsUpdate) {
        self.settings.update(update);
        self.mirror();
    }

    /// Apply a voice update.
    pub fn update_voice(&mut self, update: VoiceConfigUpdate) {
        self.settings.update_voice(update);
        self.mirror();
    }

    /// Apply an image update.
    pub fn update_image(&mut self, update: ImageConfigUpdate) {
        self.settings.update_image(update);
        self.mirror();
    }

    /// Apply a UI update.
    pub fn update_ui(&mut self, update: UiConfigUpdate) {
        self.settings.update_ui(update);
        self.mirror();
    }

    /// Restore defaults.
    pub fn reset(&mut self) {
        self.settings.reset();
        self.mirror();
    }

    fn mirror(&self) {
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save_settings(&self.settings) {
                tracing::error!(error = %e, "Failed to persist settings");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chatline_core::settings::Theme;

    use super::*;
    use crate::memory::MemoryKv;
    use crate::testing::UnreadableKv;

    #[test]
    fn updates_survive_reload() {
        let persistence = Persistence::new(Arc::new(MemoryKv::new()));
        let mut store = SettingsStore::with_persistence(persistence.clone());
        store.update(SettingsUpdate {
            theme: Some(Theme::Dark),
            api_endpoint: Some("http://localhost:9999".to_string()),
            ..Default::default()
        });
        store.update_voice(VoiceConfigUpdate {
            speed: Some(1.5),
            ..Default::default()
        });

        let reloaded = SettingsStore::with_persistence(persistence);
        assert_eq!(reloaded.settings().theme, Theme::Dark);
        assert_eq!(reloaded.settings().api_endpoint, "http://localhost:9999");
        assert!((reloaded.settings().voice.speed - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn unreadable_record_is_not_overwritten() {
        let kv = Arc::new(UnreadableKv::default());
        let persistence = Persistence::new(kv.clone());
        SettingsStore::with_persistence(persistence.clone()).update(SettingsUpdate {
            theme: Some(Theme::Dark),
            ..Default::default()
        });

        kv.fail_reads(1);
        let mut store = SettingsStore::with_persistence(persistence.clone());
        assert!(!store.is_persisted());
        assert_eq!(store.settings(), &AppSettings::default());
        store.update(SettingsUpdate {
            api_endpoint: Some("http://elsewhere".to_string()),
            ..Default::default()
        });

        let reloaded = SettingsStore::with_persistence(persistence);
        assert!(reloaded.is_persisted());
        assert_eq!(reloaded.settings().theme, Theme::Dark);
        assert_eq!(reloaded.settings().api_endpoint, AppSettings::DEFAULT_ENDPOINT);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut store = SettingsStore::new();
        store.update_ui(UiConfigUpdate {
            compact_mode: Some(true),
            ..Default::default()
        });
        store.reset();
        assert_eq!(store.settings(), &AppSettings::default());
    }
}
