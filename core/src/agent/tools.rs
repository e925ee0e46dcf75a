//! Tools the model can invoke during an interaction.
//!
//! Both tools wrap the same desktop session: `computer` takes the tagged
//! `action` argument shape and `bash` takes a bare command string.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::action::ActionRequest;
use crate::content::ContentBlock;
use crate::desktop::{DesktopSession, DISPLAY_HEIGHT, DISPLAY_NUMBER, DISPLAY_WIDTH};
use crate::dispatch;
use crate::error::{DeskpilotError, Result};
use crate::llm::ToolSpec;

pub const COMPUTER_TOOL_NAME: &str = "computer";
pub const BASH_TOOL_NAME: &str = "bash";

/// A tool the model can call by name with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Wire declaration sent to the provider.
    fn spec(&self) -> ToolSpec;

    async fn call(&self, args: &Value) -> Result<ContentBlock>;
}

/// Screenshots, pointer, keyboard, and shell access on the remote desktop.
pub struct ComputerTool {
    session: Arc<dyn DesktopSession>,
}

impl ComputerTool {
    pub fn new(session: Arc<dyn DesktopSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for ComputerTool {
    fn name(&self) -> &'static str {
        COMPUTER_TOOL_NAME
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::computer(DISPLAY_WIDTH, DISPLAY_HEIGHT, DISPLAY_NUMBER)
    }

    async fn call(&self, args: &Value) -> Result<ContentBlock> {
        let action = ActionRequest::from_args(args)?;
        let result = dispatch::execute(&action, self.session.as_ref()).await?;
        Ok(result.into())
    }
}

#[derive(Deserialize)]
struct BashArgs {
    command: String,
}

/// Shell commands on the remote desktop, outside the `action` shape.
pub struct BashTool {
    session: Arc<dyn DesktopSession>,
}

impl BashTool {
    pub fn new(session: Arc<dyn DesktopSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &'static str {
        BASH_TOOL_NAME
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::bash()
    }

    async fn call(&self, args: &Value) -> Result<ContentBlock> {
        let args: BashArgs = serde_json::from_value(args.clone()).map_err(|e| {
            DeskpilotError::InvalidToolArguments {
                tool_name: BASH_TOOL_NAME.to_string(),
                reason: e.to_string(),
            }
        })?;
        let output = dispatch::run_shell(self.session.as_ref(), &args.command).await;
        Ok(ContentBlock::text(output))
    }
}
