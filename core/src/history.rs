//! Conversation history and screenshot pruning.
//!
//! History is the client-facing message shape: ordered messages, each a
//! list of parts. Tool calls and their results live together in a single
//! part, which is what makes pruning a local rewrite.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::tools::COMPUTER_TOOL_NAME;
use crate::content::ContentBlock;

/// Replaces redacted screenshot results.
pub const REDACTED_IMAGE_TEXT: &str = "Image redacted to save input tokens";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    ToolInvocation {
        id: String,
        tool_name: String,
        args: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<ContentBlock>,
    },
}

impl Part {
    pub fn text(value: impl Into<String>) -> Self {
        Part::Text { text: value.into() }
    }

    pub fn tool_invocation(id: impl Into<String>, tool_name: impl Into<String>, args: Value) -> Self {
        Part::ToolInvocation {
            id: id.into(),
            tool_name: tool_name.into(),
            args,
            result: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![Part::text(text)])
    }
}

/// Returns a copy of the history with screenshot results replaced by a
/// short text placeholder.
///
/// When the last message is from the assistant the interaction is being
/// replayed for a final render and the history comes back unchanged.
/// Otherwise every screenshot invocation of the desktop-action tool,
/// resolved or not, has its result overwritten. The input is never
/// mutated.
pub fn prune(messages: &[Message]) -> Vec<Message> {
    if matches!(messages.last(), Some(last) if last.role == Role::Assistant) {
        return messages.to_vec();
    }
    messages
        .iter()
        .map(|message| Message {
            role: message.role,
            parts: message.parts.iter().map(prune_part).collect(),
        })
        .collect()
}

fn prune_part(part: &Part) -> Part {
    match part {
        Part::ToolInvocation {
            id,
            tool_name,
            args,
            ..
        } if tool_name == COMPUTER_TOOL_NAME
            && args.get("action").and_then(Value::as_str) == Some("screenshot") =>
        {
            Part::ToolInvocation {
                id: id.clone(),
                tool_name: tool_name.clone(),
                args: args.clone(),
                result: Some(ContentBlock::text(REDACTED_IMAGE_TEXT)),
            }
        }
        other => other.clone(),
    }
}
