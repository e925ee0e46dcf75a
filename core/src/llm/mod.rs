//! Model streaming interface.
//!
//! Defines the provider-neutral request/event types plus the streaming
//! seam the orchestrator drives. The concrete Anthropic client lives in
//! [`client`].

pub mod client;

pub use client::AnthropicClient;

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::history::Message;

/// Model provider connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Marks the system prompt cacheable on providers that support it.
    #[serde(default = "default_prompt_cache")]
    pub prompt_cache: bool,
}

impl ModelConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            prompt_cache: default_prompt_cache(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_prompt_cache() -> bool {
    true
}

/// Declared tool, in the provider's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolSpec {
    /// Provider-defined tool addressed by a versioned type tag.
    Builtin {
        #[serde(rename = "type")]
        kind: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_width_px: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_height_px: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_number: Option<u32>,
    },
    /// Schema-described tool.
    Custom {
        name: String,
        description: String,
        input_schema: Value,
    },
}

impl ToolSpec {
    /// The provider's desktop-control tool, bound to a display geometry.
    pub fn computer(width: u32, height: u32, display_number: u32) -> Self {
        ToolSpec::Builtin {
            kind: "computer_20250124".to_string(),
            name: "computer".to_string(),
            display_width_px: Some(width),
            display_height_px: Some(height),
            display_number: Some(display_number),
        }
    }

    /// The provider's shell tool.
    pub fn bash() -> Self {
        ToolSpec::Builtin {
            kind: "bash_20250124".to_string(),
            name: "bash".to_string(),
            display_width_px: None,
            display_height_px: None,
            display_number: None,
        }
    }

    pub fn custom(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        ToolSpec::Custom {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ToolSpec::Builtin { name, .. } => name,
            ToolSpec::Custom { name, .. } => name,
        }
    }
}

/// One full request to the streaming endpoint.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub max_tokens: Option<u32>,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            system: system.into(),
            messages,
            tools: Vec::new(),
            max_tokens: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Completed tool-use block from the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseEvent {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    #[serde(other)]
    Other,
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl std::fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tokens: {} (input: {}, output: {})",
            self.total(),
            self.input_tokens,
            self.output_tokens
        )
    }
}

/// Incremental events produced by a model stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Text token delta.
    Content(String),
    /// Completed tool-use block, input fully assembled.
    ToolUse(ToolUseEvent),
    /// Usage counters; may arrive more than once per response.
    Usage(TokenUsage),
    /// Terminal event.
    Done(StopReason),
}

/// Streaming seam between the orchestrator and a concrete provider.
pub trait ModelStream: Send + Sync {
    fn stream<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_computer_tool_wire_shape() {
        let spec = ToolSpec::computer(1024, 768, 1);
        assert_eq!(spec.name(), "computer");
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({
                "type": "computer_20250124",
                "name": "computer",
                "display_width_px": 1024,
                "display_height_px": 768,
                "display_number": 1,
            })
        );
    }

    #[test]
    fn test_bash_tool_wire_shape() {
        assert_eq!(
            serde_json::to_value(ToolSpec::bash()).unwrap(),
            json!({
                "type": "bash_20250124",
                "name": "bash",
            })
        );
    }

    #[test]
    fn test_custom_tool_wire_shape() {
        let spec = ToolSpec::custom(
            "lookup",
            "Looks things up",
            json!({"type": "object", "properties": {}}),
        );
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({
                "name": "lookup",
                "description": "Looks things up",
                "input_schema": {"type": "object", "properties": {}},
            })
        );
    }

    #[test]
    fn test_usage_accumulates() {
        let mut usage = TokenUsage::new(120, 0);
        usage.add(&TokenUsage::new(0, 48));
        usage.add(&TokenUsage::new(30, 12));
        assert_eq!(usage.input_tokens, 150);
        assert_eq!(usage.output_tokens, 60);
        assert_eq!(usage.total(), 210);
        assert_eq!(usage.to_string(), "Tokens: 210 (input: 150, output: 60)");
    }

    #[test]
    fn test_stop_reason_parses_unknown() {
        let known: StopReason = serde_json::from_str(r#""end_turn""#).unwrap();
        assert_eq!(known, StopReason::EndTurn);
        let unknown: StopReason = serde_json::from_str(r#""pause_turn""#).unwrap();
        assert_eq!(unknown, StopReason::Other);
    }
}
