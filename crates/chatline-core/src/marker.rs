//! Image marker extraction for streamed assistant text.
//!
//! The endpoint announces generated images inline as `[IMAGE:<url>]`. The
//! derivation runs over the whole accumulated text on every fragment, so it
//! must not depend on anything but its input.

use std::sync::LazyLock;

use regex::Regex;

/// Label that replaces verbose descriptions accompanying an image.
pub const IMAGE_GENERATED_LABEL: &str = "Image generated";

/// Remainder length (in characters) above which text counts as verbose.
const VERBOSE_THRESHOLD: usize = 100;

/// Phrases that mark the remainder as an auto-generated description.
const DESCRIPTION_PHRASES: &[&str] = &["Description:", "I've generated an image for you"];

static IMAGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[IMAGE:([^\]]+)\]").expect("image marker pattern is valid"));

/// Display payload derived from accumulated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedContent {
    /// Text to show.
    pub content: String,
    /// Image extracted from a marker, if any.
    pub image_url: Option<String>,
}

impl DerivedContent {
    /// Whether a marker was found.
    #[must_use]
    pub fn has_image(&self) -> bool {
        self.image_url.is_some()
    }
}

/// Derive display content from the text accumulated so far.
///
/// Without a marker the text passes through unchanged. With one, the first
/// marker's URL becomes the image, every marker is stripped, and the trimmed
/// remainder is kept unless it looks like a verbose description.
#[must_use]
pub fn extract_image_marker(text: &str) -> DerivedContent {
    let Some(captures) = IMAGE_MARKER.captures(text) else {
        return DerivedContent {
            content: text.to_string(),
            image_url: None,
        };
    };

    let image_url = captures[1].to_string();
    let stripped = IMAGE_MARKER.replace_all(text, "");
    let remainder = stripped.trim();

    let content = if is_verbose_description(remainder) {
        IMAGE_GENERATED_LABEL.to_string()
    } else {
        remainder.to_string()
    };

    DerivedContent {
        content,
        image_url: Some(image_url),
    }
}

fn is_verbose_description(text: &str) -> bool {
    DESCRIPTION_PHRASES.iter().any(|p| text.contains(p))
        || text.chars().count() > VERBOSE_THRESHOLD
}
