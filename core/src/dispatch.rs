//! Action dispatch against a live desktop session.
//!
//! Takes an already-validated [`ActionRequest`], drives the matching
//! session primitives, and shapes the human-readable confirmation the
//! model sees. Pointer, keyboard, screenshot and wait failures propagate;
//! shell failures fold into the returned text so the model can react.

use std::time::Duration;

use crate::action::ActionRequest;
use crate::content::ActionResult;
use crate::desktop::DesktopSession;
use crate::error::{DeskpilotError, Result};

/// Longest pause a single `wait` action may request, in seconds.
pub const MAX_WAIT_SECS: f64 = 2.0;

/// Stands in for empty stdout so the model never sees a blank result.
pub const EMPTY_OUTPUT_PLACEHOLDER: &str = "(Command executed successfully with no output)";

/// Executes one action and returns its result.
pub async fn execute(action: &ActionRequest, session: &dyn DesktopSession) -> Result<ActionResult> {
    log::debug!("dispatching {} on session {}", action.kind(), session.id());
    match action {
        ActionRequest::Screenshot => {
            let bytes = session.capture().await?;
            Ok(ActionResult::image(bytes))
        }
        ActionRequest::Wait { duration } => {
            let actual = duration.clamp(0.0, MAX_WAIT_SECS);
            tokio::time::sleep(Duration::from_secs_f64(actual)).await;
            Ok(ActionResult::text(format!("Waited for {actual} seconds")))
        }
        ActionRequest::LeftClick { coordinate } => {
            session.move_pointer(coordinate.x(), coordinate.y()).await?;
            session.left_click().await?;
            Ok(ActionResult::text(format!("Left clicked at {coordinate}")))
        }
        ActionRequest::DoubleClick { coordinate } => {
            session.move_pointer(coordinate.x(), coordinate.y()).await?;
            session.double_click().await?;
            Ok(ActionResult::text(format!("Double clicked at {coordinate}")))
        }
        ActionRequest::RightClick { coordinate } => {
            session.move_pointer(coordinate.x(), coordinate.y()).await?;
            session.right_click().await?;
            Ok(ActionResult::text(format!("Right clicked at {coordinate}")))
        }
        ActionRequest::MouseMove { coordinate } => {
            session.move_pointer(coordinate.x(), coordinate.y()).await?;
            Ok(ActionResult::text(format!("Moved mouse to {coordinate}")))
        }
        ActionRequest::Type { text } => {
            session.type_text(text).await?;
            Ok(ActionResult::text(format!("Typed: {text}")))
        }
        ActionRequest::Key { text } => {
            // common alias from X11-style key names
            let key = if text == "Return" { "enter" } else { text.as_str() };
            session.press_key(key).await?;
            Ok(ActionResult::text(format!("Pressed key: {text}")))
        }
        ActionRequest::Scroll {
            scroll_direction,
            scroll_amount,
        } => {
            session.scroll(*scroll_direction, scroll_amount.get()).await?;
            Ok(ActionResult::text(format!("Scrolled {scroll_direction}")))
        }
        ActionRequest::LeftClickDrag {
            start_coordinate,
            coordinate,
        } => {
            session.drag(*start_coordinate, *coordinate).await?;
            Ok(ActionResult::text(format!(
                "Dragged mouse from {start_coordinate} to {coordinate}"
            )))
        }
        ActionRequest::RunCommand { command } => {
            Ok(ActionResult::text(run_shell(session, command).await))
        }
    }
}

/// Runs a shell command, folding every failure into the returned text.
pub async fn run_shell(session: &dyn DesktopSession, command: &str) -> String {
    match session.run_command(command).await {
        Ok(output) => {
            if output.exit_code != 0 {
                let detail = if output.stderr.trim().is_empty() {
                    format!("exit status {}", output.exit_code)
                } else {
                    output.stderr.trim().to_string()
                };
                format!("Error executing command: {detail}")
            } else if output.stdout.is_empty() {
                EMPTY_OUTPUT_PLACEHOLDER.to_string()
            } else {
                output.stdout
            }
        }
        Err(err) => {
            log::error!("shell command failed on session {}: {err}", session.id());
            format!("Error executing command: {}", shell_error_message(&err))
        }
    }
}

/// Prefers the backend's own message over the transport wrapper.
fn shell_error_message(err: &DeskpilotError) -> String {
    match err {
        DeskpilotError::DesktopBackend { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Point, ScrollDirection};
    use crate::desktop::ShellOutput;
    use crate::testing::RecordingSession;
    use serde_json::json;
    use std::num::NonZeroU32;

    #[tokio::test]
    async fn test_screenshot_returns_raw_bytes() {
        let session = RecordingSession::new();
        let result = execute(&ActionRequest::Screenshot, session.as_ref())
            .await
            .unwrap();
        assert_eq!(
            result,
            ActionResult::image(RecordingSession::SCREENSHOT_BYTES.to_vec())
        );
        assert_eq!(session.calls(), vec!["capture"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_clamps_to_two_seconds() {
        let session = RecordingSession::new();
        let start = tokio::time::Instant::now();
        let result = execute(&ActionRequest::Wait { duration: 10.0 }, session.as_ref())
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(result, ActionResult::text("Waited for 2 seconds"));
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn test_wait_short_duration_passes_through() {
        let session = RecordingSession::new();
        let result = execute(&ActionRequest::Wait { duration: 0.01 }, session.as_ref())
            .await
            .unwrap();
        assert_eq!(result, ActionResult::text("Waited for 0.01 seconds"));
    }

    #[tokio::test]
    async fn test_left_click_moves_then_clicks() {
        let session = RecordingSession::new();
        let action = ActionRequest::LeftClick {
            coordinate: Point(100, 200),
        };
        let result = execute(&action, session.as_ref()).await.unwrap();
        assert_eq!(result, ActionResult::text("Left clicked at 100, 200"));
        assert_eq!(session.calls(), vec!["move_pointer(100,200)", "left_click"]);
    }

    #[tokio::test]
    async fn test_double_and_right_click() {
        let session = RecordingSession::new();
        let double = execute(
            &ActionRequest::DoubleClick {
                coordinate: Point(5, 6),
            },
            session.as_ref(),
        )
        .await
        .unwrap();
        assert_eq!(double, ActionResult::text("Double clicked at 5, 6"));

        let right = execute(
            &ActionRequest::RightClick {
                coordinate: Point(7, 8),
            },
            session.as_ref(),
        )
        .await
        .unwrap();
        assert_eq!(right, ActionResult::text("Right clicked at 7, 8"));
        assert_eq!(
            session.calls(),
            vec![
                "move_pointer(5,6)",
                "double_click",
                "move_pointer(7,8)",
                "right_click"
            ]
        );
    }

    #[tokio::test]
    async fn test_mouse_move_and_type() {
        let session = RecordingSession::new();
        let moved = execute(
            &ActionRequest::MouseMove {
                coordinate: Point(640, 480),
            },
            session.as_ref(),
        )
        .await
        .unwrap();
        assert_eq!(moved, ActionResult::text("Moved mouse to 640, 480"));

        let typed = execute(
            &ActionRequest::Type {
                text: "hello world".to_string(),
            },
            session.as_ref(),
        )
        .await
        .unwrap();
        assert_eq!(typed, ActionResult::text("Typed: hello world"));
        assert_eq!(
            session.calls(),
            vec!["move_pointer(640,480)", "type_text(hello world)"]
        );
    }

    #[tokio::test]
    async fn test_return_key_normalizes_but_echo_keeps_name() {
        let session = RecordingSession::new();
        let result = execute(
            &ActionRequest::Key {
                text: "Return".to_string(),
            },
            session.as_ref(),
        )
        .await
        .unwrap();
        assert_eq!(result, ActionResult::text("Pressed key: Return"));
        assert_eq!(session.calls(), vec!["press_key(enter)"]);
    }

    #[tokio::test]
    async fn test_other_keys_pass_through() {
        let session = RecordingSession::new();
        execute(
            &ActionRequest::Key {
                text: "Escape".to_string(),
            },
            session.as_ref(),
        )
        .await
        .unwrap();
        assert_eq!(session.calls(), vec!["press_key(Escape)"]);
    }

    #[tokio::test]
    async fn test_scroll_reports_direction() {
        let session = RecordingSession::new();
        let result = execute(
            &ActionRequest::Scroll {
                scroll_direction: ScrollDirection::Down,
                scroll_amount: NonZeroU32::new(3).unwrap(),
            },
            session.as_ref(),
        )
        .await
        .unwrap();
        assert_eq!(result, ActionResult::text("Scrolled down"));
        assert_eq!(session.calls(), vec!["scroll(down,3)"]);
    }

    #[tokio::test]
    async fn test_drag_result_spacing() {
        let session = RecordingSession::new();
        let result = execute(
            &ActionRequest::LeftClickDrag {
                start_coordinate: Point(100, 100),
                coordinate: Point(200, 250),
            },
            session.as_ref(),
        )
        .await
        .unwrap();
        assert_eq!(
            result,
            ActionResult::text("Dragged mouse from 100, 100 to 200, 250")
        );
        assert_eq!(session.calls(), vec!["drag(100,100->200,250)"]);
    }

    #[tokio::test]
    async fn test_pointer_failure_propagates() {
        let session = RecordingSession::failing();
        let err = execute(
            &ActionRequest::LeftClick {
                coordinate: Point(1, 1),
            },
            session.as_ref(),
        )
        .await
        .unwrap_err();
        assert!(!err.is_action_validation());
    }

    #[tokio::test]
    async fn test_shell_stdout_passes_through() {
        let session = RecordingSession::new();
        session.push_shell(Ok(ShellOutput {
            stdout: "total 0\n".to_string(),
            ..Default::default()
        }));
        let text = run_shell(session.as_ref(), "ls -l").await;
        assert_eq!(text, "total 0\n");
        assert_eq!(session.calls(), vec!["run_command(ls -l)"]);
    }

    #[tokio::test]
    async fn test_shell_empty_stdout_placeholder() {
        let session = RecordingSession::new();
        session.push_shell(Ok(ShellOutput::default()));
        let text = run_shell(session.as_ref(), "touch /tmp/x").await;
        assert_eq!(text, "(Command executed successfully with no output)");
    }

    #[tokio::test]
    async fn test_shell_nonzero_exit_becomes_text() {
        let session = RecordingSession::new();
        session.push_shell(Ok(ShellOutput {
            stdout: String::new(),
            stderr: "ls: /nope: No such file or directory\n".to_string(),
            exit_code: 2,
        }));
        let text = run_shell(session.as_ref(), "ls /nope").await;
        assert_eq!(
            text,
            "Error executing command: ls: /nope: No such file or directory"
        );
    }

    #[tokio::test]
    async fn test_shell_transport_failure_becomes_text() {
        let session = RecordingSession::new();
        session.push_shell(Err(DeskpilotError::DesktopRequest {
            message: "connection reset".to_string(),
        }));
        let text = run_shell(session.as_ref(), "uname -a").await;
        assert_eq!(
            text,
            "Error executing command: desktop request failed: connection reset"
        );
    }

    #[tokio::test]
    async fn test_shell_backend_message_preferred() {
        let session = RecordingSession::new();
        session.push_shell(Err(DeskpilotError::DesktopBackend {
            status: 422,
            message: "command rejected".to_string(),
        }));
        let text = run_shell(session.as_ref(), "rm -rf /").await;
        assert_eq!(text, "Error executing command: command rejected");
    }

    #[tokio::test]
    async fn test_run_command_action_never_errors() {
        let session = RecordingSession::new();
        session.push_shell(Err(DeskpilotError::DesktopRequest {
            message: "boom".to_string(),
        }));
        let action = ActionRequest::from_args(&json!({
            "action": "run_command",
            "command": "whoami",
        }))
        .unwrap();
        let result = execute(&action, session.as_ref()).await.unwrap();
        assert_eq!(
            result,
            ActionResult::text("Error executing command: desktop request failed: boom")
        );
    }
}
