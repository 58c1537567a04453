//! Scripted generators, test tools and fixtures shared by the SecureOrder test suites.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use secureorder_core::error::{Result, SecureOrderError};
use secureorder_core::traits::{DecisionGenerator, GenerationRequest, Tool};
use secureorder_core::types::{Entry, ParamSpec, ParamType, StepName, ToolCall};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Generators ──────────────────────────────────────────────────

/// Replays a fixed queue of responses and records every request it sees.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<Entry>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<Entry>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self::new(entries.into_iter().map(Ok).collect())
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn steps_seen(&self) -> Vec<StepName> {
        lock(&self.requests).iter().map(|r| r.step).collect()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }
}

impl DecisionGenerator for ScriptedGenerator {
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, Result<Entry>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            lock(&self.requests).push(request);
            lock(&self.responses)
                .pop_front()
                .unwrap_or_else(|| Err(SecureOrderError::Generator("script exhausted".into())))
        })
    }
}

/// Answers every request with a closure over the request.
pub struct FnGenerator<F> {
    f: F,
    calls: AtomicUsize,
}

impl<F> FnGenerator<F>
where
    F: Fn(&GenerationRequest) -> Result<Entry> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F> DecisionGenerator for FnGenerator<F>
where
    F: Fn(&GenerationRequest) -> Result<Entry> + Send + Sync + 'static,
{
    fn generate(&self, request: GenerationRequest) -> BoxFuture<'_, Result<Entry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let out = (self.f)(&request);
        Box::pin(async move { out })
    }
}

/// Never answers. Useful for cancellation and timeout tests.
pub struct PendingGenerator;

impl DecisionGenerator for PendingGenerator {
    fn generate(&self, _request: GenerationRequest) -> BoxFuture<'_, Result<Entry>> {
        Box::pin(futures::future::pending())
    }
}

// ── Tools ───────────────────────────────────────────────────────

/// Returns a fixed payload, echoing its arguments under `"args"` when the payload is an object.
pub struct StaticTool {
    name: String,
    params: Vec<ParamSpec>,
    payload: Value,
}

impl StaticTool {
    pub fn new(name: &str, payload: Value) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            payload,
        }
    }

    pub fn with_param(mut self, name: &str, kind: ParamType) -> Self {
        self.params
            .push(ParamSpec::required(name, kind, format!("{} parameter", name)));
        self
    }
}

impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Static test tool"
    }

    fn params(&self) -> Vec<ParamSpec> {
        self.params.clone()
    }

    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let mut payload = self.payload.clone();
            if let Value::Object(map) = &mut payload {
                map.insert("args".into(), Value::Object(args));
            }
            Ok(payload)
        })
    }
}

/// Always fails with a `ToolExecution` error.
pub struct FailingTool {
    name: String,
    message: String,
}

impl FailingTool {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Failing test tool"
    }

    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    fn execute(&self, _args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            Err(SecureOrderError::ToolExecution {
                tool: self.name.clone(),
                message: self.message.clone(),
            })
        })
    }
}

/// Sleeps before answering with `{"slept_ms": ..}`.
pub struct SlowTool {
    name: String,
    delay: Duration,
    timeout_secs: Option<u64>,
}

impl SlowTool {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Slow test tool"
    }

    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }

    fn execute(&self, _args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(serde_json::json!({ "slept_ms": self.delay.as_millis() as u64 }))
        })
    }
}

/// Counts executions and tracks how many run at once, holding each for `hold`.
pub struct GaugeTool {
    name: String,
    hold: Duration,
    gauge: Arc<Gauge>,
}

/// Shared counters behind a [`GaugeTool`].
#[derive(Default)]
pub struct Gauge {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of executions observed running at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl GaugeTool {
    pub fn new(name: &str, hold: Duration) -> Self {
        Self {
            name: name.to_string(),
            hold,
            gauge: Arc::new(Gauge::default()),
        }
    }

    pub fn gauge(&self) -> Arc<Gauge> {
        self.gauge.clone()
    }
}

impl Tool for GaugeTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Counting test tool"
    }

    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    fn execute(&self, _args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let gauge = &self.gauge;
            gauge.calls.fetch_add(1, Ordering::SeqCst);
            let now = gauge.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            gauge.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.hold).await;
            gauge.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(serde_json::json!({ "in_flight": now }))
        })
    }
}

/// Panics inside its body.
pub struct PanickingTool;

impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "panicking_tool"
    }

    fn description(&self) -> &str {
        "Panicking test tool"
    }

    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    fn execute(&self, _args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move { explode() })
    }
}

fn explode() -> Result<Value> {
    panic!("tool body exploded")
}

// ── Fixtures ────────────────────────────────────────────────────

/// A tool call with a fixed id, for assertions on `tool_call_id`.
pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    let mut call = ToolCall::with_json(name, arguments);
    call.id = id.to_string();
    call
}

/// A Researcher reply that requests `calls`.
pub fn requests_tools(calls: Vec<ToolCall>) -> Entry {
    Entry::assistant_tool_calls("", calls)
}

/// A reply with no tool calls.
pub fn answer(text: &str) -> Entry {
    Entry::assistant_text(text)
}
