//! Action results and their protocol-facing projection.
//!
//! Screenshots travel as raw bytes until the moment a result is shaped
//! for the model protocol; base64 happens here and nowhere else.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// MIME type of screenshot payloads.
pub const IMAGE_MIME_TYPE: &str = "image/png";

/// Outcome of one dispatched action, before protocol shaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    Text(String),
    Image { bytes: Vec<u8> },
}

impl ActionResult {
    pub fn text(value: impl Into<String>) -> Self {
        ActionResult::Text(value.into())
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        ActionResult::Image { bytes }
    }
}

/// Content in the shape the model protocol accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(rename_all = "camelCase")]
    Image { data: String, mime_type: String },
}

impl ContentBlock {
    pub fn text(value: impl Into<String>) -> Self {
        ContentBlock::Text { text: value.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Image { .. } => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentBlock::Image { .. })
    }
}

impl From<ActionResult> for ContentBlock {
    fn from(result: ActionResult) -> Self {
        match result {
            ActionResult::Text(text) => ContentBlock::Text { text },
            ActionResult::Image { bytes } => ContentBlock::Image {
                data: BASE64.encode(bytes),
                mime_type: IMAGE_MIME_TYPE.to_string(),
            },
        }
    }
}
