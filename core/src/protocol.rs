//! Wire protocol between a UI client and the server.
//!
//! Both directions are tagged JSON enums. `session_id` names the client's
//! conversation; `interaction_id` names one orchestrated response run
//! within it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::content::ContentBlock;
use crate::history::Message;
use crate::llm::TokenUsage;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start an interaction for the given conversation against a desktop
    /// sandbox. One interaction may be in flight per connection.
    Chat {
        session_id: Uuid,
        sandbox_id: String,
        messages: Vec<Message>,
    },
    /// Cancel the in-flight interaction of this conversation.
    Abort {
        session_id: Uuid,
    },
    /// Request the most recent server log lines.
    Logs {
        lines: usize,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Started {
        session_id: Uuid,
        interaction_id: Uuid,
    },
    TokenDelta {
        session_id: Uuid,
        interaction_id: Uuid,
        seq: u64,
        text: String,
    },
    ToolCall {
        session_id: Uuid,
        interaction_id: Uuid,
        call_id: String,
        tool: String,
        input: Value,
    },
    ToolResult {
        session_id: Uuid,
        interaction_id: Uuid,
        call_id: String,
        tool: String,
        ok: bool,
        content: ContentBlock,
    },
    MessageFinal {
        session_id: Uuid,
        interaction_id: Uuid,
        text: String,
        usage: TokenUsage,
    },
    Logs {
        lines: Vec<String>,
    },
    Error {
        code: String,
        message: String,
    },
}
