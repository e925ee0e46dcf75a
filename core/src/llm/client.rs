//! Anthropic Messages API client.
//!
//! Streaming-only: every request goes to `/v1/messages` with `stream`
//! set, and the SSE response is decoded incrementally into
//! [`StreamEvent`]s. Tool-use inputs arrive as JSON fragments spread over
//! many deltas; [`EventDecoder`] reassembles them per block index and
//! emits one completed event per tool call.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use futures_util::StreamExt;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;

use crate::content::ContentBlock;
use crate::error::{DeskpilotError, OptionExt, Result};
use crate::history::{Message, Part, Role};

use super::{
    ModelConfig, ModelRequest, ModelStream, StopReason, StreamEvent, TokenUsage, ToolSpec,
    ToolUseEvent,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_RETRIES: u32 = 5;

pub struct AnthropicClient {
    config: ModelConfig,
    http_client: HttpClient,
}

impl AnthropicClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("deskpilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeskpilotError::InvalidConfig {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Build headers for API requests
    fn build_headers(&self) -> Result<HeaderMap> {
        let api_key = self.config.api_key.as_deref().ok_or_missing("model.api_key")?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        let key_value =
            HeaderValue::from_str(api_key).map_err(|_| DeskpilotError::InvalidConfig {
                message: "model API key contains invalid header characters".to_string(),
            })?;
        headers.insert("x-api-key", key_value);
        Ok(headers)
    }

    fn build_body(&self, request: &ModelRequest) -> ApiRequest {
        let (extra_system, messages) = to_wire(&request.messages);
        let mut system_text = request.system.clone();
        for fragment in extra_system {
            if !system_text.is_empty() {
                system_text.push_str("\n\n");
            }
            system_text.push_str(&fragment);
        }
        let cache_control = self
            .config
            .prompt_cache
            .then_some(CacheControl { kind: "ephemeral" });
        ApiRequest {
            model: self.config.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            stream: true,
            system: vec![SystemBlock {
                kind: "text",
                text: system_text,
                cache_control,
            }],
            messages,
            tools: request.tools.clone(),
        }
    }

    /// Sends with jittered backoff, honoring Retry-After on 429 and
    /// retrying server errors and network failures.
    async fn send_with_backoff(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &ApiRequest,
    ) -> Result<Response> {
        let mut attempt = 0;
        let mut delay = Duration::from_secs(3);

        loop {
            let result = self
                .http_client
                .post(url)
                .headers(headers.clone())
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        if attempt >= MAX_RETRIES {
                            log::error!(
                                "rate limit (429) exceeded max retries ({MAX_RETRIES}), giving up"
                            );
                            return Ok(response);
                        }
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .map(Duration::from_secs);
                        let wait = retry_after.unwrap_or(delay);
                        log::warn!(
                            "rate limited (429), waiting {:?} before retry (attempt {}/{})",
                            wait,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        sleep(wait).await;
                    } else if status.is_server_error() && attempt < MAX_RETRIES {
                        log::warn!("provider error {status}, retrying in {delay:?}");
                        sleep(delay).await;
                    } else {
                        return Ok(response);
                    }
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(e.into());
                    }
                    log::warn!("network error ({e}), retrying in {delay:?}");
                    sleep(delay).await;
                }
            }

            attempt += 1;
            delay *= 2;
            // Jitter: +/- 500ms
            let jitter_ms = rand::thread_rng().gen_range(-500..=500);
            delay = Duration::from_millis((delay.as_millis() as i64 + jitter_ms).max(0) as u64);
        }
    }
}

impl ModelStream for AnthropicClient {
    fn stream<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'a>> {
        let url = format!(
            "{}/v1/messages",
            self.config.base_url.trim_end_matches('/')
        );
        let body = self.build_body(request);
        let headers_res = self.build_headers();

        Box::pin(async_stream::try_stream! {
            let headers = headers_res?;
            let response = self.send_with_backoff(&url, headers, &body).await?;

            let status = response.status();
            if !status.is_success() {
                let message = api_error_message(response).await;
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    Err(DeskpilotError::Unauthorized { message })?;
                } else {
                    Err(DeskpilotError::Provider {
                        status: status.as_u16(),
                        message,
                    })?;
                }
            } else {
                let mut decoder = EventDecoder::default();
                let mut stream = response.bytes_stream();

                while let Some(chunk_res) = stream.next().await {
                    let chunk = chunk_res.map_err(|e| DeskpilotError::StreamDisconnected {
                        reason: e.to_string(),
                    })?;
                    for event in decoder.push(&chunk)? {
                        yield event;
                    }
                }

                if let Some(event) = decoder.finish() {
                    yield event;
                }
            }
        })
    }
}

/// Pulls the provider's own message out of an error response body.
async fn api_error_message(response: Response) -> String {
    let raw = match response.text().await {
        Ok(text) => text,
        Err(_) => return "Unknown error".to_string(),
    };
    if let Ok(value) = serde_json::from_str::<Value>(&raw) {
        if let Some(message) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
        {
            return message.to_string();
        }
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        "Unknown error".to_string()
    } else {
        trimmed.to_string()
    }
}

// =============================================================================
// Request wire shapes
// =============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    stream: bool,
    system: Vec<SystemBlock>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
}

#[derive(Debug, Serialize)]
struct SystemBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Vec<ResultBlock>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResultBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

fn result_block(block: &ContentBlock) -> ResultBlock {
    match block {
        ContentBlock::Text { text } => ResultBlock::Text { text: text.clone() },
        ContentBlock::Image { data, mime_type } => ResultBlock::Image {
            source: ImageSource {
                kind: "base64",
                media_type: mime_type.clone(),
                data: data.clone(),
            },
        },
    }
}

/// Translates history into the provider's alternating-turn shape.
///
/// Tool results ride inside assistant messages in history; on the wire
/// they become a user turn of `tool_result` blocks directly after the
/// assistant turn that issued the calls. Consecutive same-role turns are
/// merged, and system-role messages are lifted out for the system field.
fn to_wire(messages: &[Message]) -> (Vec<String>, Vec<WireMessage>) {
    let mut extra_system = Vec::new();
    let mut wire: Vec<WireMessage> = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {
                for part in &message.parts {
                    if let Part::Text { text } = part {
                        extra_system.push(text.clone());
                    }
                }
            }
            Role::User => {
                let blocks: Vec<WireBlock> = message
                    .parts
                    .iter()
                    .filter_map(|part| match part {
                        Part::Text { text } => Some(WireBlock::Text { text: text.clone() }),
                        Part::ToolInvocation { .. } => None,
                    })
                    .collect();
                push_blocks(&mut wire, "user", blocks);
            }
            Role::Assistant => {
                let mut blocks = Vec::new();
                let mut results = Vec::new();
                for part in &message.parts {
                    match part {
                        Part::Text { text } => {
                            blocks.push(WireBlock::Text { text: text.clone() });
                        }
                        Part::ToolInvocation {
                            id,
                            tool_name,
                            args,
                            result,
                        } => {
                            blocks.push(WireBlock::ToolUse {
                                id: id.clone(),
                                name: tool_name.clone(),
                                input: args.clone(),
                            });
                            if let Some(block) = result {
                                results.push(WireBlock::ToolResult {
                                    tool_use_id: id.clone(),
                                    content: vec![result_block(block)],
                                });
                            }
                        }
                    }
                }
                push_blocks(&mut wire, "assistant", blocks);
                push_blocks(&mut wire, "user", results);
            }
        }
    }

    // The endpoint requires the first turn to be a user turn.
    while !wire.is_empty() && wire[0].role != "user" {
        log::debug!("dropping leading {} turn for wire shape", wire[0].role);
        wire.remove(0);
    }

    (extra_system, wire)
}

fn push_blocks(wire: &mut Vec<WireMessage>, role: &'static str, blocks: Vec<WireBlock>) {
    if blocks.is_empty() {
        return;
    }
    match wire.last_mut() {
        Some(last) if last.role == role => last.content.extend(blocks),
        _ => wire.push(WireMessage {
            role,
            content: blocks,
        }),
    }
}

// =============================================================================
// Response SSE shapes
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SseEvent {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockStart {
        index: usize,
        content_block: BlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: DeltaBody,
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ErrorBody,
    },
}

#[derive(Debug, Deserialize)]
struct StartMessage {
    #[serde(default)]
    usage: Option<StartUsage>,
}

#[derive(Debug, Deserialize)]
struct StartUsage {
    #[serde(default)]
    input_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct DeltaBody {
    #[serde(default)]
    stop_reason: Option<StopReason>,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

struct PendingTool {
    id: String,
    name: String,
    partial_json: String,
}

/// Incremental SSE decoder.
///
/// Buffers bytes until full lines are available, parses `data:` payloads,
/// and assembles tool-use inputs per block index. Unrecognized payloads
/// are skipped so protocol additions do not break the stream.
#[derive(Default)]
struct EventDecoder {
    buffer: String,
    pending_tools: HashMap<usize, PendingTool>,
    stop_reason: Option<StopReason>,
    done: bool,
}

impl EventDecoder {
    /// Feeds raw bytes, returning the events completed by this chunk.
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos]
                .trim_end_matches('\r')
                .to_string();
            self.buffer = self.buffer[newline_pos + 1..].to_string();
            if let Some(data) = line.strip_prefix("data: ") {
                self.decode_data(data, &mut events)?;
            }
        }
        Ok(events)
    }

    /// Terminal event for streams that end without a message_stop.
    fn finish(&mut self) -> Option<StreamEvent> {
        if self.done {
            return None;
        }
        self.done = true;
        Some(StreamEvent::Done(
            self.stop_reason.take().unwrap_or(StopReason::EndTurn),
        ))
    }

    fn decode_data(&mut self, data: &str, events: &mut Vec<StreamEvent>) -> Result<()> {
        let event: SseEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                log::debug!("skipping unrecognized stream payload: {e}");
                return Ok(());
            }
        };
        match event {
            SseEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    events.push(StreamEvent::Usage(TokenUsage::new(usage.input_tokens, 0)));
                }
            }
            SseEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                BlockStart::Text { text } => {
                    if !text.is_empty() {
                        events.push(StreamEvent::Content(text));
                    }
                }
                BlockStart::ToolUse { id, name } => {
                    self.pending_tools.insert(
                        index,
                        PendingTool {
                            id,
                            name,
                            partial_json: String::new(),
                        },
                    );
                }
                BlockStart::Other => {}
            },
            SseEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => {
                    events.push(StreamEvent::Content(text));
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(pending) = self.pending_tools.get_mut(&index) {
                        pending.partial_json.push_str(&partial_json);
                    }
                }
                BlockDelta::Other => {}
            },
            SseEvent::ContentBlockStop { index } => {
                if let Some(pending) = self.pending_tools.remove(&index) {
                    let input = if pending.partial_json.trim().is_empty() {
                        Value::Object(Default::default())
                    } else {
                        serde_json::from_str(&pending.partial_json).map_err(|e| {
                            DeskpilotError::MalformedResponse {
                                detail: format!("tool input for {}: {e}", pending.name),
                            }
                        })?
                    };
                    events.push(StreamEvent::ToolUse(ToolUseEvent {
                        id: pending.id,
                        name: pending.name,
                        input,
                    }));
                }
            }
            SseEvent::MessageDelta { delta, usage } => {
                if let Some(stop_reason) = delta.stop_reason {
                    self.stop_reason = Some(stop_reason);
                }
                if let Some(usage) = usage {
                    events.push(StreamEvent::Usage(TokenUsage::new(0, usage.output_tokens)));
                }
            }
            SseEvent::MessageStop => {
                self.done = true;
                events.push(StreamEvent::Done(
                    self.stop_reason.take().unwrap_or(StopReason::EndTurn),
                ));
            }
            SseEvent::Ping => {}
            SseEvent::Error { error } => {
                return Err(DeskpilotError::ApiError {
                    kind: error.kind,
                    message: error.message,
                });
            }
        }
        Ok(())
    }
}
