//! Typed requests for the desktop-action tool.
//!
//! Tool-call arguments arrive as loose JSON; [`ActionRequest::from_args`]
//! turns them into a closed sum type. Every variant that reaches the
//! dispatcher already carries everything it needs, so malformed requests
//! fail here and never touch the remote session.

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DeskpilotError, Result};

/// Screen position, serialized as the wire's `[x, y]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point(pub i32, pub i32);

impl Point {
    pub fn x(&self) -> i32 {
        self.0
    }

    pub fn y(&self) -> i32 {
        self.1
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.0, self.1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrollDirection::Up => write!(f, "up"),
            ScrollDirection::Down => write!(f, "down"),
        }
    }
}

/// One desktop or shell operation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    Screenshot,
    Wait {
        duration: f64,
    },
    LeftClick {
        coordinate: Point,
    },
    DoubleClick {
        coordinate: Point,
    },
    RightClick {
        coordinate: Point,
    },
    MouseMove {
        coordinate: Point,
    },
    Type {
        text: String,
    },
    Key {
        text: String,
    },
    Scroll {
        scroll_direction: ScrollDirection,
        scroll_amount: NonZeroU32,
    },
    LeftClickDrag {
        start_coordinate: Point,
        coordinate: Point,
    },
    RunCommand {
        command: String,
    },
}

/// Action kinds the dispatcher understands, as they appear on the wire.
const KNOWN_KINDS: [&str; 11] = [
    "screenshot",
    "wait",
    "left_click",
    "double_click",
    "right_click",
    "mouse_move",
    "type",
    "key",
    "scroll",
    "left_click_drag",
    "run_command",
];

impl ActionRequest {
    /// Parses a tool-call argument object.
    ///
    /// Unknown kinds come back as `UnsupportedAction`; known kinds with
    /// missing or malformed fields come back as `InvalidAction` naming
    /// the action, so the model can correct and retry.
    pub fn from_args(args: &Value) -> Result<Self> {
        let kind = match args.get("action").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => {
                return Err(DeskpilotError::UnsupportedAction {
                    action: "(missing)".to_string(),
                })
            }
        };
        if !KNOWN_KINDS.contains(&kind.as_str()) {
            return Err(DeskpilotError::UnsupportedAction { action: kind });
        }
        serde_json::from_value(args.clone()).map_err(|e| DeskpilotError::InvalidAction {
            action: kind,
            detail: e.to_string(),
        })
    }

    /// Wire name of this action's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionRequest::Screenshot => "screenshot",
            ActionRequest::Wait { .. } => "wait",
            ActionRequest::LeftClick { .. } => "left_click",
            ActionRequest::DoubleClick { .. } => "double_click",
            ActionRequest::RightClick { .. } => "right_click",
            ActionRequest::MouseMove { .. } => "mouse_move",
            ActionRequest::Type { .. } => "type",
            ActionRequest::Key { .. } => "key",
            ActionRequest::Scroll { .. } => "scroll",
            ActionRequest::LeftClickDrag { .. } => "left_click_drag",
            ActionRequest::RunCommand { .. } => "run_command",
        }
    }
}
