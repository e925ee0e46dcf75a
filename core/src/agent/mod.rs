//! Interaction orchestration.
//!
//! Prunes incoming history, declares the desktop and shell tools, drives
//! the model stream, and executes emitted tool calls one at a time in
//! emission order. Any failure of streaming, tool execution, deadline, or
//! abort destroys the remote session exactly once before surfacing.

pub mod tools;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

pub use tokio_util::sync::CancellationToken;

use crate::content::ContentBlock;
use crate::desktop::DesktopSession;
use crate::error::{DeskpilotError, Result};
use crate::history::{prune, Message, Part, Role};
use crate::llm::{ModelRequest, ModelStream, StreamEvent, TokenUsage, ToolSpec, ToolUseEvent};
use crate::protocol::ServerEvent;

use tools::{BashTool, ComputerTool, Tool};

/// Operator prompt used when the configuration does not override it.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to a computer. \
Use the computer tool to help the user with their requests. \
Use the bash tool to execute commands on the computer. \
You can create files and folders using the bash tool. \
Always prefer the bash tool where it is viable for the task. \
Be sure to advise the user when waiting is necessary. \
If the browser opens with a setup wizard, YOU MUST IGNORE IT and move straight to the next step \
(e.g. input the url in the search bar).";

const ABORTED_MESSAGE: &str = "User aborted";

/// Orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub system_prompt: String,
    /// Whole-interaction deadline in seconds.
    pub max_duration_secs: u64,
    /// Upper bound on model rounds per interaction.
    pub max_turns: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_duration_secs: 300,
            max_turns: 30,
        }
    }
}

/// Drives one interaction between the model and a remote desktop session.
pub struct Orchestrator {
    session: Arc<dyn DesktopSession>,
    model: Arc<dyn ModelStream>,
    tools: Vec<Box<dyn Tool>>,
    config: AgentConfig,
}

impl Orchestrator {
    pub fn new(
        session: Arc<dyn DesktopSession>,
        model: Arc<dyn ModelStream>,
        config: AgentConfig,
    ) -> Self {
        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(ComputerTool::new(session.clone())),
            Box::new(BashTool::new(session.clone())),
        ];
        Self {
            session,
            model,
            tools,
            config,
        }
    }

    /// Runs the interaction to completion, forwarding progress over `events`.
    ///
    /// Returns the conversation extended with the assistant's turns. On any
    /// failure the remote session is destroyed exactly once and the error is
    /// returned; on success the session stays alive for the next request.
    pub async fn run(
        &self,
        session_id: Uuid,
        interaction_id: Uuid,
        messages: Vec<Message>,
        events: mpsc::Sender<ServerEvent>,
        cancel: CancellationToken,
    ) -> Result<Vec<Message>> {
        let deadline = Duration::from_secs(self.config.max_duration_secs);
        let outcome = tokio::select! {
            result = timeout(deadline, self.drive(session_id, interaction_id, messages, &events)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(DeskpilotError::Deadline {
                        seconds: self.config.max_duration_secs,
                    }),
                }
            }
            _ = cancel.cancelled() => Err(DeskpilotError::Aborted {
                reason: ABORTED_MESSAGE.to_string(),
            }),
        };

        match outcome {
            Ok(conversation) => Ok(conversation),
            Err(err) => {
                log::error!("interaction {interaction_id} failed: {err}");
                if let Err(teardown) = self.session.destroy().await {
                    log::error!(
                        "failed to destroy desktop session {}: {teardown}",
                        self.session.id()
                    );
                }
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        session_id: Uuid,
        interaction_id: Uuid,
        messages: Vec<Message>,
        events: &mpsc::Sender<ServerEvent>,
    ) -> Result<Vec<Message>> {
        use futures_util::StreamExt;

        let mut conversation = prune(&messages);
        let specs: Vec<ToolSpec> = self.tools.iter().map(|t| t.spec()).collect();
        let mut usage = TokenUsage::default();
        let mut seq: u64 = 0;

        send(
            events,
            ServerEvent::Started {
                session_id,
                interaction_id,
            },
        )
        .await?;

        for turn in 0..self.config.max_turns {
            let request =
                ModelRequest::new(self.config.system_prompt.clone(), conversation.clone())
                    .with_tools(specs.clone());
            let mut stream = self.model.stream(&request);

            let mut text = String::new();
            let mut calls: Vec<ToolUseEvent> = Vec::new();

            while let Some(event) = stream.next().await {
                match event? {
                    StreamEvent::Content(delta) => {
                        text.push_str(&delta);
                        send(
                            events,
                            ServerEvent::TokenDelta {
                                session_id,
                                interaction_id,
                                seq,
                                text: delta,
                            },
                        )
                        .await?;
                        seq += 1;
                    }
                    StreamEvent::ToolUse(call) => calls.push(call),
                    StreamEvent::Usage(turn_usage) => usage.add(&turn_usage),
                    StreamEvent::Done(reason) => {
                        log::debug!("model turn {turn} stopped: {reason:?}");
                        break;
                    }
                }
            }

            if calls.is_empty() {
                if !text.is_empty() {
                    conversation.push(Message::assistant(text.clone()));
                }
                log::info!("interaction {interaction_id} finished after {} turns, {usage}", turn + 1);
                send(
                    events,
                    ServerEvent::MessageFinal {
                        session_id,
                        interaction_id,
                        text,
                        usage,
                    },
                )
                .await?;
                return Ok(conversation);
            }

            let mut parts: Vec<Part> = Vec::new();
            if !text.is_empty() {
                parts.push(Part::text(text));
            }

            for call in calls {
                send(
                    events,
                    ServerEvent::ToolCall {
                        session_id,
                        interaction_id,
                        call_id: call.id.clone(),
                        tool: call.name.clone(),
                        input: call.input.clone(),
                    },
                )
                .await?;

                let tool = self
                    .tools
                    .iter()
                    .find(|t| t.name() == call.name)
                    .ok_or_else(|| DeskpilotError::ToolNotFound {
                        tool_name: call.name.clone(),
                    })?;

                // Validation failures go back to the model as a tool result
                // so it can retry with corrected arguments; everything else
                // ends the interaction.
                let (ok, content) = match tool.call(&call.input).await {
                    Ok(content) => (true, content),
                    Err(err) if err.is_action_validation() => {
                        log::warn!("rejected {} call: {err}", call.name);
                        (false, ContentBlock::text(err.to_string()))
                    }
                    Err(err) => return Err(err),
                };

                send(
                    events,
                    ServerEvent::ToolResult {
                        session_id,
                        interaction_id,
                        call_id: call.id.clone(),
                        tool: call.name.clone(),
                        ok,
                        content: content.clone(),
                    },
                )
                .await?;

                parts.push(Part::ToolInvocation {
                    id: call.id,
                    tool_name: call.name,
                    args: call.input,
                    result: Some(content),
                });
            }

            conversation.push(Message::new(Role::Assistant, parts));
        }

        Err(DeskpilotError::TurnLimitReached {
            max_turns: self.config.max_turns,
        })
    }
}

async fn send(events: &mpsc::Sender<ServerEvent>, event: ServerEvent) -> Result<()> {
    events.send(event).await.map_err(|_| DeskpilotError::Aborted {
        reason: "event channel closed".to_string(),
    })
}
