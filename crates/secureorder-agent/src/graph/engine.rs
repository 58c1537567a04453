use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use secureorder_core::config::EngineConfig;
use secureorder_core::error::{Result, SecureOrderError};
use secureorder_core::event::EventBus;
use secureorder_core::state::ConversationState;
use secureorder_core::traits::DecisionGenerator;
use secureorder_core::types::*;
use secureorder_tools::ToolRegistry;

use crate::checkpoint::CheckpointStore;
use crate::router;
use crate::session::SessionLocks;
use crate::steps::{self, analyzer, researcher, tool_exec};

/// Resumable Researcher → Router → ToolExecution/Analyzer state machine.
///
/// Every completed step is checkpointed before the next one starts, so a run
/// can stop (suspension, cancellation, crash) and be picked up later by a
/// fresh invocation, possibly in another process.
pub struct GraphEngine {
    config: EngineConfig,
    generator: Arc<dyn DecisionGenerator>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn CheckpointStore>,
    event_bus: Arc<EventBus>,
    locks: SessionLocks,
    researcher_instruction: String,
    analyzer_instruction: String,
}

impl GraphEngine {
    pub fn new(
        config: EngineConfig,
        generator: Arc<dyn DecisionGenerator>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let researcher_instruction = config
            .researcher_prompt
            .clone()
            .unwrap_or_else(|| steps::RESEARCHER_INSTRUCTION.to_string());
        let analyzer_instruction = config
            .analyzer_prompt
            .clone()
            .unwrap_or_else(|| steps::ANALYZER_INSTRUCTION.to_string());
        Self {
            config,
            generator,
            tools,
            store,
            event_bus: Arc::new(EventBus::default()),
            locks: SessionLocks::new(),
            researcher_instruction,
            analyzer_instruction,
        }
    }

    /// Publish progress on a shared bus instead of the engine's own.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Append caller entries to a session and run it until it completes or suspends.
    pub async fn run(&self, session_id: &SessionId, entries: Vec<Entry>) -> Result<RunResult> {
        self.run_with_cancel(session_id, entries, CancellationToken::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        session_id: &SessionId,
        entries: Vec<Entry>,
        cancel: CancellationToken,
    ) -> Result<RunResult> {
        validate_caller_entries(&entries)?;

        let _guard = self.locks.acquire(session_id).await;

        let existing = self.store.load(session_id)?;
        let is_new = existing.is_none();
        let mut session = match existing {
            Some(session) => session,
            None if entries.is_empty() => {
                return Err(SecureOrderError::MalformedEntry(
                    "a new session needs at least one entry".into(),
                ));
            }
            None => Session::new(session_id.clone()),
        };

        if session.is_suspended() {
            return Err(SecureOrderError::AwaitingApproval {
                session_id: session_id.to_string(),
            });
        }

        if entries.is_empty() {
            return match (session.status, session.next_step) {
                (SessionStatus::Running, Some(step)) => {
                    info!(session_id = %session_id, step = %step, "Continuing interrupted run");
                    self.execute(&mut session, step, &cancel).await
                }
                _ => Err(SecureOrderError::MalformedEntry(format!(
                    "session {} is {} and no new entries were given",
                    session_id, session.status
                ))),
            };
        }

        // Unapproved calls are only ever checkpointed together with the
        // suspended status, so a pending batch seen here was approved by an
        // invocation that stopped before its results were saved.
        if !is_new && session.state.has_pending_tool_calls() {
            warn!(
                session_id = %session_id,
                status = %session.status,
                "Settling approved tool calls before new input"
            );
            if let Err(e) = self.settle_pending(&mut session).await {
                return Err(self.fail(&mut session, e));
            }
        }

        let appended = entries.len();
        session.state = session.state.append(entries)?;
        session.status = SessionStatus::Running;
        session.pending_step = None;
        session.next_step = Some(StepName::Researcher);
        session.last_error = None;
        session.touch();
        self.store.save(&session)?;
        debug!(session_id = %session_id, appended, "Appended caller entries");

        self.execute(&mut session, StepName::Researcher, &cancel).await
    }

    /// Approve the pending tool batch of a suspended session and continue the run.
    pub async fn resume(&self, session_id: &SessionId) -> Result<RunResult> {
        self.resume_with_cancel(session_id, CancellationToken::new())
            .await
    }

    pub async fn resume_with_cancel(
        &self,
        session_id: &SessionId,
        cancel: CancellationToken,
    ) -> Result<RunResult> {
        let _guard = self.locks.acquire(session_id).await;

        let mut session = self
            .store
            .load(session_id)?
            .ok_or_else(|| SecureOrderError::SessionNotFound(session_id.to_string()))?;

        if !session.is_suspended() {
            return Err(SecureOrderError::NotSuspended {
                session_id: session_id.to_string(),
                status: session.status.to_string(),
            });
        }

        let step = match session.pending_step {
            Some(StepName::ToolExecution) => StepName::ToolExecution,
            other => {
                return Err(SecureOrderError::InvariantViolation(format!(
                    "suspended session {} has pending step {:?}",
                    session_id, other
                )))
            }
        };
        info!(session_id = %session_id, step = %step, "Resuming suspended session");

        session.pending_step = None;
        session.status = SessionStatus::Running;
        session.next_step = Some(step);
        session.touch();
        self.store.save(&session)?;

        self.execute(&mut session, step, &cancel).await
    }

    /// Read-only snapshot of a stored session.
    pub fn get_session_state(&self, session_id: &SessionId) -> Result<Session> {
        self.store
            .load(session_id)?
            .ok_or_else(|| SecureOrderError::SessionNotFound(session_id.to_string()))
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.store.list()
    }

    /// Delete a stored session, waiting for any invocation in flight on it.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        let _guard = self.locks.acquire(session_id).await;
        if !self.store.delete(session_id)? {
            return Err(SecureOrderError::SessionNotFound(session_id.to_string()));
        }
        info!(session_id = %session_id, "Deleted session");
        Ok(())
    }

    /// Drive the session from `from`, turning any failure other than
    /// cancellation into a persisted `failed` status.
    async fn execute(
        &self,
        session: &mut Session,
        from: StepName,
        cancel: &CancellationToken,
    ) -> Result<RunResult> {
        self.event_bus.publish(EngineEvent::RunStarted {
            session_id: session.session_id.clone(),
            from,
        });

        match self.drive(session, from, cancel).await {
            Ok(result) => Ok(result),
            Err(SecureOrderError::Cancelled) => {
                info!(session_id = %session.session_id, "Run cancelled");
                Err(SecureOrderError::Cancelled)
            }
            Err(e) => Err(self.fail(session, e)),
        }
    }

    fn fail(&self, session: &mut Session, e: SecureOrderError) -> SecureOrderError {
        error!(
            session_id = %session.session_id,
            kind = e.kind(),
            error = %e,
            "Run failed"
        );
        session.status = SessionStatus::Failed;
        session.pending_step = None;
        session.next_step = None;
        session.last_error = Some(RunFailure::from(&e));
        session.touch();
        if let Err(save_err) = self.store.save(session) {
            error!(session_id = %session.session_id, error = %save_err, "Failed to record run failure");
        }
        self.event_bus.publish(EngineEvent::RunFailed {
            session_id: session.session_id.clone(),
            kind: e.kind().to_string(),
            message: e.to_string(),
        });
        e
    }

    async fn drive(
        &self,
        session: &mut Session,
        from: StepName,
        cancel: &CancellationToken,
    ) -> Result<RunResult> {
        let session_id = session.session_id.clone();
        let mut step = from;
        let mut executed = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(SecureOrderError::Cancelled);
            }
            if executed >= self.config.max_steps {
                return Err(SecureOrderError::MaxStepsExceeded(self.config.max_steps));
            }
            executed += 1;

            self.event_bus.publish(EngineEvent::StepStarted {
                session_id: session_id.clone(),
                step,
            });
            info!(session_id = %session_id, step = %step, "Step started");
            let started = Instant::now();

            match step {
                StepName::Researcher => {
                    let entry = self
                        .guarded(
                            cancel,
                            researcher::run(
                                self.generator.as_ref(),
                                &self.researcher_instruction,
                                &session.state,
                                self.tools.definitions(),
                            ),
                        )
                        .await?;
                    let mut staged = session.clone();
                    staged.state = session.state.append(vec![entry])?;
                    let next = router::route(&staged.state)?;

                    if next == StepName::ToolExecution && self.config.suspend_before_tools {
                        let pending_calls = staged.state.pending_tool_calls().to_vec();
                        staged.status = SessionStatus::Suspended;
                        staged.pending_step = Some(StepName::ToolExecution);
                        staged.next_step = None;
                        self.commit(session, staged)?;
                        self.step_completed(&session_id, step, 1, started);

                        info!(
                            session_id = %session_id,
                            calls = pending_calls.len(),
                            "Suspended before tool execution"
                        );
                        self.event_bus.publish(EngineEvent::Suspended {
                            session_id: session_id.clone(),
                            pending_calls: pending_calls.clone(),
                        });
                        return Ok(RunResult::Suspended {
                            session_id,
                            pending_calls,
                        });
                    }

                    staged.next_step = Some(next);
                    self.commit(session, staged)?;
                    self.step_completed(&session_id, step, 1, started);
                    step = next;
                }
                StepName::ToolExecution => {
                    let state = self.run_tools(session).await?;
                    let appended = state.len() - session.state.len();

                    let next = router::successor(step).unwrap_or(StepName::Researcher);
                    let mut staged = session.clone();
                    staged.state = state;
                    staged.next_step = Some(next);
                    self.commit(session, staged)?;
                    self.step_completed(&session_id, step, appended, started);
                    step = next;
                }
                StepName::Analyzer => {
                    let answer = self
                        .guarded(
                            cancel,
                            analyzer::run(
                                self.generator.as_ref(),
                                &self.analyzer_instruction,
                                &session.state,
                            ),
                        )
                        .await?;
                    let mut staged = session.clone();
                    staged.state = session.state.append(vec![answer.clone()])?;
                    staged.status = SessionStatus::Completed;
                    staged.next_step = None;
                    self.commit(session, staged)?;
                    self.step_completed(&session_id, step, 1, started);

                    info!(session_id = %session_id, steps = executed, "Run completed");
                    self.event_bus.publish(EngineEvent::RunCompleted {
                        session_id: session_id.clone(),
                        steps: executed,
                    });
                    return Ok(RunResult::Completed {
                        session_id,
                        answer,
                    });
                }
            }
        }
    }

    /// Execute the pending batch and return the log with its results appended.
    async fn run_tools(&self, session: &Session) -> Result<ConversationState> {
        let calls = session.state.pending_tool_calls().to_vec();
        if calls.is_empty() {
            return Err(SecureOrderError::InvariantViolation(
                "tool execution reached with no pending tool calls".into(),
            ));
        }
        let results = tool_exec::run(
            &self.tools,
            &calls,
            self.config.tool_fan_out,
            &session.session_id,
            &self.event_bus,
        )
        .await;
        session.state.append(results)
    }

    async fn settle_pending(&self, session: &mut Session) -> Result<()> {
        let state = self.run_tools(session).await?;
        let mut staged = session.clone();
        staged.state = state;
        self.commit(session, staged)
    }

    /// Persist `staged` and only then make it the live session, so a failed
    /// save leaves the caller holding the last checkpointed state.
    fn commit(&self, session: &mut Session, mut staged: Session) -> Result<()> {
        staged.touch();
        self.store.save(&staged)?;
        *session = staged;
        Ok(())
    }

    fn step_completed(&self, session_id: &SessionId, step: StepName, appended: usize, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(session_id = %session_id, step = %step, appended, elapsed_ms, "Step completed");
        self.event_bus.publish(EngineEvent::StepCompleted {
            session_id: session_id.clone(),
            step,
            appended,
            elapsed_ms,
        });
    }

    /// Apply the step timeout and the cancellation token to a generator call.
    async fn guarded<T>(
        &self,
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let secs = self.config.step_timeout_secs;
        tokio::select! {
            res = tokio::time::timeout(Duration::from_secs(secs), fut) => match res {
                Ok(result) => result,
                Err(_) => Err(SecureOrderError::Generator(format!(
                    "step timed out after {}s",
                    secs
                ))),
            },
            _ = cancel.cancelled() => Err(SecureOrderError::Cancelled),
        }
    }
}

/// Callers may only contribute user entries and plain assistant entries.
fn validate_caller_entries(entries: &[Entry]) -> Result<()> {
    for entry in entries {
        entry.validate()?;
        match entry.role {
            Role::User => {}
            Role::Assistant if entry.tool_calls.is_empty() && entry.tool_call_id.is_none() => {}
            Role::Assistant => {
                return Err(SecureOrderError::MalformedEntry(
                    "caller assistant entries must not carry tool calls".into(),
                ))
            }
            Role::Tool => {
                return Err(SecureOrderError::MalformedEntry(
                    "tool entries are produced by the engine, not the caller".into(),
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_entry_rules() {
        assert!(validate_caller_entries(&[Entry::user("hi"), Entry::assistant_text("ok")]).is_ok());

        let call = ToolCall::with_json("fetch_order_status", serde_json::json!({}));
        let err = validate_caller_entries(&[Entry::assistant_tool_calls("", vec![call])]);
        assert!(matches!(err, Err(SecureOrderError::MalformedEntry(_))));

        let tool = Entry::tool_result("call_1", &ToolResult::success(serde_json::json!({})));
        let err = validate_caller_entries(&[tool]);
        assert!(matches!(err, Err(SecureOrderError::MalformedEntry(_))));
    }
}
