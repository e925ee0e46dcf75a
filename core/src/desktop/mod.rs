//! Remote desktop session interface.

pub mod remote;

pub use remote::RemoteDesktop;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::{Point, ScrollDirection};
use crate::error::Result;

/// Virtual display geometry advertised to the model.
pub const DISPLAY_WIDTH: u32 = 1024;
pub const DISPLAY_HEIGHT: u32 = 768;
pub const DISPLAY_NUMBER: u32 = 1;

/// Captured output of a completed remote shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellOutput {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: i32,
}

/// Automation primitives of one live remote desktop and shell.
///
/// Implementations resolve the underlying session lazily, so any
/// primitive may fail with a session-resolution error on first use.
/// `destroy` must work without a prior resolution.
#[async_trait]
pub trait DesktopSession: Send + Sync {
    /// Identifier the session is addressed by.
    fn id(&self) -> &str;

    /// Captures the current screen as PNG bytes.
    async fn capture(&self) -> Result<Vec<u8>>;

    async fn move_pointer(&self, x: i32, y: i32) -> Result<()>;
    async fn left_click(&self) -> Result<()>;
    async fn double_click(&self) -> Result<()>;
    async fn right_click(&self) -> Result<()>;
    async fn drag(&self, from: Point, to: Point) -> Result<()>;
    async fn type_text(&self, text: &str) -> Result<()>;

    /// Presses a single key by its backend name.
    async fn press_key(&self, key: &str) -> Result<()>;

    async fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<()>;

    /// Runs a shell command to completion and captures its output.
    async fn run_command(&self, command: &str) -> Result<ShellOutput>;

    /// Tears the remote session down.
    async fn destroy(&self) -> Result<()>;
}

/// Connection settings for the desktop backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesktopConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token, sent when present.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8333".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}
