//! Mock implementations of the trait seams, shared by inline tests.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;

use crate::action::{Point, ScrollDirection};
use crate::desktop::{DesktopSession, ShellOutput};
use crate::error::{DeskpilotError, Result};
use crate::llm::{ModelRequest, ModelStream, StreamEvent};

/// Desktop session that records primitive calls instead of performing them.
pub struct RecordingSession {
    calls: Mutex<Vec<String>>,
    shell_results: Mutex<VecDeque<Result<ShellOutput>>>,
    destroy_count: Mutex<usize>,
    failing: bool,
}

impl RecordingSession {
    /// PNG magic, stands in for a captured frame.
    pub const SCREENSHOT_BYTES: &'static [u8] =
        &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];

    pub fn new() -> Arc<Self> {
        Self::build(false)
    }

    /// Session whose primitives all fail with a transport error.
    pub fn failing() -> Arc<Self> {
        Self::build(true)
    }

    fn build(failing: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            shell_results: Mutex::new(VecDeque::new()),
            destroy_count: Mutex::new(0),
            failing,
        })
    }

    /// Primitive invocations in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn destroy_count(&self) -> usize {
        *self.destroy_count.lock()
    }

    /// Queues the next `run_command` outcome; empty queue yields success
    /// with no output.
    pub fn push_shell(&self, result: Result<ShellOutput>) {
        self.shell_results.lock().push_back(result);
    }

    fn record(&self, call: impl Into<String>) -> Result<()> {
        self.calls.lock().push(call.into());
        if self.failing {
            return Err(DeskpilotError::DesktopRequest {
                message: "simulated transport failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DesktopSession for RecordingSession {
    fn id(&self) -> &str {
        "test-session"
    }

    async fn capture(&self) -> Result<Vec<u8>> {
        self.record("capture")?;
        Ok(Self::SCREENSHOT_BYTES.to_vec())
    }

    async fn move_pointer(&self, x: i32, y: i32) -> Result<()> {
        self.record(format!("move_pointer({x},{y})"))
    }

    async fn left_click(&self) -> Result<()> {
        self.record("left_click")
    }

    async fn double_click(&self) -> Result<()> {
        self.record("double_click")
    }

    async fn right_click(&self) -> Result<()> {
        self.record("right_click")
    }

    async fn drag(&self, from: Point, to: Point) -> Result<()> {
        self.record(format!("drag({},{}->{},{})", from.0, from.1, to.0, to.1))
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.record(format!("type_text({text})"))
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.record(format!("press_key({key})"))
    }

    async fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<()> {
        self.record(format!("scroll({direction},{amount})"))
    }

    async fn run_command(&self, command: &str) -> Result<ShellOutput> {
        self.record(format!("run_command({command})"))?;
        self.shell_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ShellOutput::default()))
    }

    async fn destroy(&self) -> Result<()> {
        *self.destroy_count.lock() += 1;
        Ok(())
    }
}

/// Model stream replaying scripted event sequences, one script per turn.
///
/// Captures every request so tests can inspect what the orchestrator sent.
/// Turns past the last script end immediately with no events.
pub struct ScriptedModel {
    scripts: Mutex<VecDeque<Vec<Result<StreamEvent>>>>,
    requests: Mutex<Vec<ModelRequest>>,
    stalled: bool,
}

impl ScriptedModel {
    pub fn new(scripts: Vec<Vec<Result<StreamEvent>>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            stalled: false,
        })
    }

    /// Model whose stream never yields.
    pub fn stalled() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            stalled: true,
        })
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().clone()
    }
}

impl ModelStream for ScriptedModel {
    fn stream<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'a>> {
        self.requests.lock().push(request.clone());
        if self.stalled {
            return Box::pin(futures::stream::pending());
        }
        let script = self.scripts.lock().pop_front().unwrap_or_default();
        Box::pin(futures::stream::iter(script))
    }
}
