//! Content payloads carried by a broadcast.
//!
//! Every published item is one `Content` value. The engine has a single
//! publish path and a single transport dispatch over this union, rather than
//! parallel per-type entry points.

use serde::{Deserialize, Serialize};

/// Reference to an asset held by the delivery collaborator.
///
/// Assets are uploaded once by the publisher; recipients fetch them by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    /// Asset key assigned at upload time.
    pub key: String,
    /// Access token, when the asset is not public.
    pub token: Option<String>,
    /// MIME type of the asset.
    pub mime: String,
    /// Size in bytes.
    pub size: u64,
}

impl AssetRef {
    /// Create a public asset reference.
    #[must_use]
    pub fn new(key: impl Into<String>, mime: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            token: None,
            mime: mime.into(),
            size,
        }
    }

    /// Attach an access token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// A resolved link preview.
///
/// Produced by the preview resolver and memoized by the content cache so a
/// repeatedly shared URL is only scraped and uploaded once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreview {
    /// The shared URL.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Preview image, when the page offers one.
    pub image: Option<AssetRef>,
}

/// One published content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    /// Plain text post.
    Text {
        /// Message body.
        body: String,
    },
    /// Image post.
    Image {
        /// The uploaded image.
        asset: AssetRef,
        /// Pixel width.
        width: u32,
        /// Pixel height.
        height: u32,
    },
    /// Audio post.
    Audio {
        /// The uploaded clip.
        asset: AssetRef,
        /// Display name of the clip.
        name: String,
        /// Duration in milliseconds.
        duration_ms: u64,
    },
    /// Video post.
    Video {
        /// The uploaded clip.
        asset: AssetRef,
        /// Display name of the clip.
        name: String,
        /// Duration in milliseconds.
        duration_ms: u64,
        /// Pixel width.
        width: u32,
        /// Pixel height.
        height: u32,
    },
    /// A shared link, rendered to recipients as a preview card.
    Link {
        /// The shared URL.
        url: String,
    },
}

impl Content {
    /// Create a text post.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    /// Create a link post.
    #[must_use]
    pub fn link(url: impl Into<String>) -> Self {
        Self::Link { url: url.into() }
    }

    /// Short variant name, for logs and metric labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Audio { .. } => "audio",
            Self::Video { .. } => "video",
            Self::Link { .. } => "link",
        }
    }

    /// Whether this content needs link-preview resolution before dispatch.
    #[must_use]
    pub fn is_link(&self) -> bool {
        matches!(self, Self::Link { .. })
    }

    /// The asset carried by this content, if any.
    #[must_use]
    pub fn asset(&self) -> Option<&AssetRef> {
        match self {
            Self::Image { asset, .. } | Self::Audio { asset, .. } | Self::Video { asset, .. } => {
                Some(asset)
            }
            Self::Text { .. } | Self::Link { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind() {
        assert_eq!(Content::text("hi").kind(), "text");
        assert_eq!(Content::link("https://example.com").kind(), "link");
        assert!(Content::link("https://example.com").is_link());
        assert!(!Content::text("hi").is_link());
    }

    #[test]
    fn test_content_tagged_encoding() {
        let json = serde_json::to_value(Content::text("Hi there!")).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["body"], "Hi there!");

        let decoded: Content =
            serde_json::from_str(r#"{"kind":"link","url":"https://example.com"}"#).unwrap();
        assert_eq!(decoded, Content::link("https://example.com"));
    }

    #[test]
    fn test_content_asset() {
        let asset = AssetRef::new("key-1", "image/png", 512).with_token("tok");
        let content = Content::Image {
            asset: asset.clone(),
            width: 100,
            height: 80,
        };
        assert_eq!(content.asset(), Some(&asset));
        assert!(Content::text("x").asset().is_none());
    }
}
