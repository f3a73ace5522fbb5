//! CLI process runtime: spawns the external sub-agent binary and classifies its
//! NDJSON stdout into a typed event bus.
//!
//! Process management (spawn, non-blocking completion check, cancellation, defensive
//! `Drop`) is grounded on `ebbfdf26_oddurs-prime-hunter`'s `AgentManager`. That example
//! fans eight event kinds out through direct per-call database writes; here they are
//! collapsed into one tagged-union `RuntimeEvent` delivered over an mpsc channel instead.

use crate::error::OrchestratorError;
use crate::model::{Model, SubAgentId};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Sentinel error string used for `RuntimeEvent::Failed` when cancellation caused it.
pub const CANCELLED_SENTINEL: &str = "cancelled";

/// Opaque identity for one spawned process, used to correlate events and to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle(pub SubAgentId);

/// Single tagged-union event emitted by the CLI process runtime, replacing an
/// eight-callback closure tuple with one typed channel.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Lifecycle-relevant status observed in the stream (e.g. "init", "thinking").
    StatusChange { process: ProcessHandle, status: String },
    /// Fractional progress estimate, when the stream carries one.
    Progress { process: ProcessHandle, fraction: f64 },
    /// Terminal success with the final result text.
    Completed { process: ProcessHandle, result: String },
    /// Terminal failure, including cancellation (see `CANCELLED_SENTINEL`).
    Failed { process: ProcessHandle, error: String },
    /// A guarded operation requires user confirmation before it proceeds.
    DangerousCommand {
        process: ProcessHandle,
        tool: String,
        input: Value,
        reason: String,
    },
    /// The sub-agent surfaced a structured question for the user.
    AskUserQuestion {
        process: ProcessHandle,
        session_id: String,
        input: Value,
    },
    /// The sub-agent surfaced a plan awaiting approval.
    PlanReview {
        process: ProcessHandle,
        session_id: String,
        input: Value,
    },
    /// A raw streaming log line that didn't classify as any of the above.
    Output { process: ProcessHandle, entry: String },
}

struct RunningProcess {
    child: Child,
    reader_handle: JoinHandle<()>,
    cancelled: bool,
}

/// Manages spawned sub-agent processes and classifies their stdout into `RuntimeEvent`s
/// delivered over a single shared channel.
pub struct CliRuntime {
    binary: String,
    processes: HashMap<ProcessHandle, RunningProcess>,
    events_tx: mpsc::UnboundedSender<RuntimeEvent>,
}

impl CliRuntime {
    /// Create a runtime invoking `binary` (e.g. "claude"), returning the receiving
    /// half of the event channel the caller should drain continuously.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<RuntimeEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                binary: binary.into(),
                processes: HashMap::new(),
                events_tx,
            },
            events_rx,
        )
    }

    /// Number of currently tracked (not yet completed/failed) processes.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.processes.len()
    }

    /// Spawn the sub-agent binary against `workspace` with `prompt` and `model`,
    /// returning a handle used to correlate events and to cancel.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError::WorkspaceMissing` if `workspace` is not a directory,
    /// or `OrchestratorError::SpawnFailed` if the binary could not be started. Both are
    /// fatal spawn errors: the caller should synthesize an immediate
    /// `RuntimeEvent::Failed` rather than expect one from this runtime.
    pub fn spawn(
        &mut self,
        agent: SubAgentId,
        workspace: &Path,
        prompt: &str,
        model: Model,
        max_turns: u32,
    ) -> Result<ProcessHandle, OrchestratorError> {
        if !workspace.is_dir() {
            return Err(OrchestratorError::WorkspaceMissing(
                workspace.display().to_string(),
            ));
        }

        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(workspace)
            .arg("-p")
            .arg(prompt)
            .arg("--model")
            .arg(model.to_string())
            .arg("--output-format")
            .arg("stream-json")
            .arg("--max-turns")
            .arg(max_turns.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| OrchestratorError::SpawnFailed {
            binary: self.binary.clone(),
            source,
        })?;

        #[allow(clippy::expect_used)] // stdout() was configured with Stdio::piped() above
        let stdout = child.stdout.take().expect("piped stdout is always present");
        let handle = ProcessHandle(agent);
        let tx = self.events_tx.clone();
        let reader_handle = tokio::spawn(read_stdout(handle, stdout, tx));

        self.processes.insert(
            handle,
            RunningProcess {
                child,
                reader_handle,
                cancelled: false,
            },
        );

        Ok(handle)
    }

    /// Non-blocking poll: reap any processes whose child has exited. For each, emits
    /// `Completed`/`Failed` only if the process was not already cancelled (a cancelled
    /// process already emitted its `Failed(cancelled)` event synchronously).
    pub async fn poll_exited(&mut self) {
        let mut exited = Vec::new();
        for (&handle, running) in &mut self.processes {
            if let Ok(Some(status)) = running.child.try_wait() {
                exited.push((handle, status.success(), running.cancelled));
            }
        }

        for (handle, success, cancelled) in exited {
            if let Some(running) = self.processes.remove(&handle) {
                running.reader_handle.abort();
                if !cancelled && !success {
                    let _ = self.events_tx.send(RuntimeEvent::Failed {
                        process: handle,
                        error: "sub-agent process exited with non-zero status".to_string(),
                    });
                }
            }
        }
    }

    /// Terminate the process for `handle`, firing `Failed` with the cancel sentinel.
    /// Any later `Completed`/`Failed` from its reader task is suppressed because the
    /// process entry is removed immediately.
    ///
    /// Returns `true` if a running process was found and cancelled.
    pub fn cancel(&mut self, handle: ProcessHandle) -> bool {
        let Some(mut running) = self.processes.remove(&handle) else {
            return false;
        };
        running.cancelled = true;
        let _ = running.child.start_kill();
        running.reader_handle.abort();
        let _ = self.events_tx.send(RuntimeEvent::Failed {
            process: handle,
            error: CANCELLED_SENTINEL.to_string(),
        });
        true
    }

    /// Cancel every currently running process (used on full shutdown).
    pub fn cancel_all(&mut self) -> Vec<ProcessHandle> {
        let handles: Vec<ProcessHandle> = self.processes.keys().copied().collect();
        for &handle in &handles {
            self.cancel(handle);
        }
        handles
    }
}

impl Drop for CliRuntime {
    fn drop(&mut self) {
        for running in self.processes.values_mut() {
            let _ = running.child.start_kill();
            running.reader_handle.abort();
        }
    }
}

/// Working directory used by tests and the planner/synthesis calls that don't need a
/// dedicated per-sub-task workspace.
#[must_use]
pub fn shared_workspace_root(base: &Path) -> PathBuf {
    base.to_path_buf()
}

async fn read_stdout(
    process: ProcessHandle,
    stdout: tokio::process::ChildStdout,
    tx: mpsc::UnboundedSender<RuntimeEvent>,
) {
    let mut reader = BufReader::new(stdout).lines();

    while let Ok(Some(line)) = reader.next_line().await {
        let Ok(parsed) = serde_json::from_str::<Value>(&line) else {
            let _ = tx.send(RuntimeEvent::Output { process, entry: line });
            continue;
        };

        let event = classify(process, &parsed).unwrap_or(RuntimeEvent::Output {
            process,
            entry: line,
        });
        let _ = tx.send(event);
    }
}

/// Classify one parsed NDJSON line into a `RuntimeEvent`, or `None` if it carries no
/// information the runtime cares about (caller falls back to `Output`).
fn classify(process: ProcessHandle, parsed: &Value) -> Option<RuntimeEvent> {
    let msg_type = parsed.get("type").and_then(Value::as_str).unwrap_or("");

    match msg_type {
        "system" => {
            let subtype = parsed.get("subtype").and_then(Value::as_str).unwrap_or("unknown");
            Some(RuntimeEvent::StatusChange {
                process,
                status: subtype.to_string(),
            })
        }
        "assistant" => {
            let content = parsed.get("content")?.as_array()?;
            for block in content {
                let block_type = block.get("type").and_then(Value::as_str).unwrap_or("");
                if block_type == "tool_use" {
                    let tool = block.get("name").and_then(Value::as_str).unwrap_or("unknown");
                    if is_dangerous_tool(tool) {
                        return Some(RuntimeEvent::DangerousCommand {
                            process,
                            tool: tool.to_string(),
                            input: block.get("input").cloned().unwrap_or(Value::Null),
                            reason: format!("tool {tool} requires confirmation"),
                        });
                    }
                }
            }
            None
        }
        "ask_user_question" => {
            let session_id = parsed.get("session_id").and_then(Value::as_str).unwrap_or("").to_string();
            Some(RuntimeEvent::AskUserQuestion {
                process,
                session_id,
                input: parsed.get("input").cloned().unwrap_or(Value::Null),
            })
        }
        "plan_review" => {
            let session_id = parsed.get("session_id").and_then(Value::as_str).unwrap_or("").to_string();
            Some(RuntimeEvent::PlanReview {
                process,
                session_id,
                input: parsed.get("input").cloned().unwrap_or(Value::Null),
            })
        }
        "result" => {
            let is_error = parsed.get("is_error").and_then(Value::as_bool).unwrap_or(false);
            let text = parsed.get("result").and_then(Value::as_str).unwrap_or("").to_string();
            Some(if is_error {
                RuntimeEvent::Failed { process, error: text }
            } else {
                RuntimeEvent::Completed { process, result: text }
            })
        }
        _ => None,
    }
}

fn is_dangerous_tool(tool: &str) -> bool {
    matches!(tool, "Bash" | "Write" | "Edit" | "NotebookEdit")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handle() -> ProcessHandle {
        ProcessHandle(SubAgentId::new())
    }

    #[test]
    fn classifies_system_init_as_status_change() {
        let h = handle();
        let line = json!({"type": "system", "subtype": "init"});
        match classify(h, &line) {
            Some(RuntimeEvent::StatusChange { status, .. }) => assert_eq!(status, "init"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn classifies_bash_tool_use_as_dangerous() {
        let h = handle();
        let line = json!({
            "type": "assistant",
            "content": [{"type": "tool_use", "name": "Bash", "input": {"command": "rm -rf /"}}]
        });
        match classify(h, &line) {
            Some(RuntimeEvent::DangerousCommand { tool, .. }) => assert_eq!(tool, "Bash"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn classifies_read_tool_use_as_none() {
        let h = handle();
        let line = json!({
            "type": "assistant",
            "content": [{"type": "tool_use", "name": "Read", "input": {}}]
        });
        assert!(classify(h, &line).is_none());
    }

    #[test]
    fn classifies_successful_result_as_completed() {
        let h = handle();
        let line = json!({"type": "result", "is_error": false, "result": "done"});
        match classify(h, &line) {
            Some(RuntimeEvent::Completed { result, .. }) => assert_eq!(result, "done"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn classifies_error_result_as_failed() {
        let h = handle();
        let line = json!({"type": "result", "is_error": true, "result": "boom"});
        match classify(h, &line) {
            Some(RuntimeEvent::Failed { error, .. }) => assert_eq!(error, "boom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn classifies_plan_review() {
        let h = handle();
        let line = json!({"type": "plan_review", "session_id": "s1", "input": {"plan": "x"}});
        match classify(h, &line) {
            Some(RuntimeEvent::PlanReview { session_id, .. }) => assert_eq!(session_id, "s1"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn spawn_against_missing_workspace_errors() {
        let (mut runtime, _rx) = CliRuntime::new("claude");
        let agent = SubAgentId::new();
        let result = runtime.spawn(
            agent,
            Path::new("/nonexistent/workspace/path"),
            "prompt",
            Model::Haiku,
            10,
        );
        assert!(matches!(result, Err(OrchestratorError::WorkspaceMissing(_))));
    }

    #[test]
    fn cancel_unknown_handle_returns_false() {
        let (mut runtime, _rx) = CliRuntime::new("claude");
        assert!(!runtime.cancel(handle()));
    }
}
