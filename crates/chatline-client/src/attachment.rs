//! Turning local image files into inline `data:` URLs.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chatline_core::settings::ImageConfig;

/// Errors that can occur while preparing an attachment.
#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file type is not accepted.
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),

    /// The file exceeds the configured limit.
    #[error("image is {size} bytes, limit is {max}")]
    TooLarge {
        /// File size.
        size: u64,
        /// Configured maximum.
        max: u64,
    },
}

/// MIME type implied by a file extension.
#[must_use]
pub fn mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Read an image and encode it as a `data:<mime>;base64,...` URL.
///
/// # Errors
///
/// Returns an error if the file type is not in `config.allowed_types`, the
/// file is larger than `config.max_size`, or it cannot be read.
pub fn image_data_url(path: &Path, config: &ImageConfig) -> Result<String, AttachmentError> {
    let mime = mime_type(path)
        .filter(|mime| config.allowed_types.iter().any(|t| t == mime))
        .ok_or_else(|| AttachmentError::UnsupportedType(path.display().to_string()))?;

    let read_err = |source| AttachmentError::Read {
        path: path.to_path_buf(),
        source,
    };
    let size = std::fs::metadata(path).map_err(read_err)?.len();
    if size > config.max_size {
        return Err(AttachmentError::TooLarge {
            size,
            max: config.max_size,
        });
    }

    let bytes = std::fs::read(path).map_err(read_err)?;
    tracing::debug!(path = %path.display(), mime, size, "Encoded image attachment");
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}
