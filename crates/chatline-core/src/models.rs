//! Model catalog.

use serde::{Deserialize, Serialize};

/// Name of the model selected when nothing else is known.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// A selectable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    /// Identifier sent to the endpoint.
    pub name: String,
    /// Label shown to the user.
    pub display_name: String,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// Whether image attachments are accepted.
    pub supports_vision: bool,
}

impl ModelDescriptor {
    fn new(name: &str, display_name: &str, max_tokens: u32, supports_vision: bool) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            max_tokens,
            supports_vision,
        }
    }
}

/// The static default catalog.
#[must_use]
pub fn default_models() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new("gpt-4o", "GPT-4o", 4096, true),
        ModelDescriptor::new("gpt-4-turbo", "GPT-4 Turbo", 8192, true),
        ModelDescriptor::new("gpt-4o-mini", "GPT-4o Mini", 4096, true),
        ModelDescriptor::new("gpt-3.5-turbo", "GPT-3.5 Turbo", 4096, false),
    ]
}

/// Look up a model by name.
#[must_use]
pub fn find_model<'a>(models: &'a [ModelDescriptor], name: &str) -> Option<&'a ModelDescriptor> {
    models.iter().find(|m| m.name == name)
}
