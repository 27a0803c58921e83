//! Outbound media attachments carried by `medias` events.

use serde::{Deserialize, Serialize};

/// Media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Attachment,
    Image,
    Link,
    Video,
}

/// A media item sent to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl Media {
    pub fn attachment(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Attachment,
            url: url.into(),
            filename: Some(filename.into()),
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::plain(MediaKind::Image, url)
    }

    pub fn link(url: impl Into<String>) -> Self {
        Self::plain(MediaKind::Link, url)
    }

    pub fn video(url: impl Into<String>) -> Self {
        Self::plain(MediaKind::Video, url)
    }

    fn plain(kind: MediaKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            filename: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_medias_event_shape() {
        let event = Event::medias(&[
            Media::image("https://cdn.example/a.png"),
            Media::attachment("https://cdn.example/r.pdf", "report.pdf"),
        ])
        .unwrap();

        assert_eq!(
            event.get("medias").cloned().unwrap(),
            json!([
                {"type": "image", "url": "https://cdn.example/a.png"},
                {"type": "attachment", "url": "https://cdn.example/r.pdf", "filename": "report.pdf"},
            ])
        );
    }
}
