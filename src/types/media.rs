//! Media sources for image prompt components.

use serde::{Deserialize, Serialize};

/// Image data source - unified way to represent image data across providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum ImageSource {
    /// URL (http, https, gs, data URLs, etc.)
    Url { url: String },
    /// Base64-encoded data with its media type
    Base64 { data: String, media_type: String },
    /// Raw binary data (encoded by the vendor adapter when needed)
    #[serde(skip)]
    Binary { data: Vec<u8>, media_type: String },
}

impl ImageSource {
    /// Create from URL string
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    /// Create from base64 string
    pub fn base64(data: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self::Base64 {
            data: data.into(),
            media_type: media_type.into(),
        }
    }

    /// Create from binary data
    pub fn binary(data: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self::Binary {
            data,
            media_type: media_type.into(),
        }
    }

    /// Get as URL if available
    pub fn as_url(&self) -> Option<&str> {
        match self {
            Self::Url { url } => Some(url),
            _ => None,
        }
    }

    /// Check if this is a URL
    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url { .. })
    }
}
