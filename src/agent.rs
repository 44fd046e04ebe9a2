//! Agent runtime: mailbox, worker task and lifecycle.
//!
//! An [`Agent`] is the live handle for one actor. The concrete behavior
//! is supplied through [`AgentBehavior`]; the handle owns the inbound
//! mailbox, the worker task that drains it, and the lifecycle state.
//!
//! Lifecycle:
//! - `start`: any non-running state -> `Running`, spawns the worker
//! - `stop`: `Running` -> `Stopped`, waits a bounded time for the worker
//! - `reset`: stops if needed, discards queued messages, -> `Initialized`

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::AgentSettings;
use crate::context::ContextStore;
use crate::core::registry::Registry;
use crate::protocol::envelope::current_timestamp;
use crate::protocol::mailbox::{Mailbox, MailboxStats, DEFAULT_CAPACITY};
use crate::protocol::{Message, MessageKind, Payload, Priority};

/// Agent lifecycle state.
///
/// `Paused` and `Error` are never entered by the runtime itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Initialized,
    Running,
    Paused,
    Stopped,
    Error,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Initialized => write!(f, "initialized"),
            AgentState::Running => write!(f, "running"),
            AgentState::Paused => write!(f, "paused"),
            AgentState::Stopped => write!(f, "stopped"),
            AgentState::Error => write!(f, "error"),
        }
    }
}

/// Failure reported by an agent's `process` implementation.
///
/// The message becomes the `error` field of the automatic response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ProcessError(String);

impl ProcessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = panic.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self(format!("process panicked: {}", detail))
    }
}

impl From<String> for ProcessError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ProcessError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<crate::error::ContextError> for ProcessError {
    fn from(err: crate::error::ContextError) -> Self {
        Self(err.to_string())
    }
}

impl From<serde_json::Error> for ProcessError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

/// What a concrete agent does with its messages.
#[async_trait]
pub trait AgentBehavior: Send + Sync + 'static {
    /// Capabilities this agent provides. Read once, at construction.
    fn capabilities(&self) -> Vec<String>;

    /// Handle a request payload.
    ///
    /// May read or write the shared context through `agent.context()` and
    /// may send further messages through `agent`.
    async fn process(&self, agent: &Agent, input: Payload) -> Result<Value, ProcessError>;

    /// Called for every inbound response.
    async fn on_response(&self, agent: &Agent, message: &Message) {
        let status = message.payload_field("status").cloned().unwrap_or_default();
        tracing::info!(agent_id = %agent.id(), "Received response: {}", status);
    }

    /// Called for every inbound notification.
    async fn on_notification(&self, agent: &Agent, message: &Message) {
        tracing::info!(agent_id = %agent.id(), "Received notification: {}", message.payload);
    }
}

/// Per-agent runtime parameters.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_queue_size: usize,
    /// Upper bound on how long the worker waits before re-checking for a stop.
    pub poll_interval: Duration,
    /// Bounded wait used by `reset`.
    pub stop_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_CAPACITY,
            poll_interval: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&AgentSettings> for AgentConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_queue_size: settings.max_queue_size,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            stop_timeout: settings.stop_timeout(),
        }
    }
}

/// Directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub state: AgentState,
    pub capabilities: Vec<String>,
}

/// Runtime counters for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStats {
    pub state: AgentState,
    pub mailbox: MailboxStats,
    /// Messages fully handled by the worker.
    pub processed: u64,
}

#[derive(Default)]
struct Worker {
    handle: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

/// Live handle for one agent.
pub struct Agent {
    id: String,
    agent_type: String,
    capabilities: Vec<String>,
    created_at: String,
    config: AgentConfig,
    context: Arc<ContextStore>,
    behavior: Arc<dyn AgentBehavior>,
    mailbox: Mailbox,
    state: RwLock<AgentState>,
    worker: Mutex<Worker>,
    registry: RwLock<Option<Weak<Registry>>>,
    processed: AtomicU64,
}

impl Agent {
    /// Create an agent with default runtime parameters.
    pub fn new(
        id: impl Into<String>,
        agent_type: impl Into<String>,
        context: Arc<ContextStore>,
        behavior: impl AgentBehavior,
    ) -> Arc<Self> {
        Self::with_config(id, agent_type, context, behavior, AgentConfig::default())
    }

    pub fn with_config(
        id: impl Into<String>,
        agent_type: impl Into<String>,
        context: Arc<ContextStore>,
        behavior: impl AgentBehavior,
        config: AgentConfig,
    ) -> Arc<Self> {
        let id = id.into();
        let agent_type = agent_type.into();
        let capabilities = behavior.capabilities();

        tracing::info!("Agent {} ({}) initialized", id, agent_type);

        Arc::new(Self {
            mailbox: Mailbox::new(id.clone(), config.max_queue_size),
            id,
            agent_type,
            capabilities,
            created_at: current_timestamp(),
            config,
            context,
            behavior: Arc::new(behavior),
            state: RwLock::new(AgentState::Initialized),
            worker: Mutex::new(Worker::default()),
            registry: RwLock::new(None),
            processed: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    /// The shared context store.
    pub fn context(&self) -> &Arc<ContextStore> {
        &self.context
    }

    pub fn state(&self) -> AgentState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            id: self.id.clone(),
            agent_type: self.agent_type.clone(),
            state: self.state(),
            capabilities: self.capabilities.clone(),
        }
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            state: self.state(),
            mailbox: self.mailbox.stats(),
            processed: self.processed.load(Ordering::SeqCst),
        }
    }

    /// Build a message and hand it to the registry.
    ///
    /// Without an attached registry the message is only logged. Routing
    /// failures are logged by the registry and not reported here.
    pub async fn send_message(
        &self,
        receiver_id: &str,
        payload: Payload,
        kind: MessageKind,
        priority: Priority,
        correlation_id: Option<String>,
    ) -> Message {
        let message = Message::create(
            self.id.clone(),
            receiver_id,
            kind,
            payload,
            priority,
            correlation_id,
        );
        self.dispatch(message.clone()).await;
        message
    }

    /// Send a medium-priority request.
    pub async fn send_request(&self, receiver_id: &str, payload: Payload) -> Message {
        self.send_message(receiver_id, payload, MessageKind::Request, Priority::Medium, None)
            .await
    }

    /// Send a medium-priority notification.
    pub async fn notify(&self, receiver_id: &str, payload: Payload) -> Message {
        self.send_message(receiver_id, payload, MessageKind::Notification, Priority::Medium, None)
            .await
    }

    async fn dispatch(&self, message: Message) {
        tracing::debug!(agent_id = %self.id, "Sending {} to {}", message.kind, message.receiver_id);

        match self.registry() {
            Some(registry) => {
                // The registry logs unknown receivers.
                let _ = registry.route_message(message).await;
            }
            None => {
                tracing::warn!(agent_id = %self.id, "No registry available, message not sent");
            }
        }
    }

    /// Enqueue an inbound message. A full mailbox drops it.
    pub(crate) fn receive_message(&self, message: Message) {
        self.mailbox.deliver(message);
    }

    pub(crate) fn set_registry(&self, registry: Weak<Registry>) {
        *self.registry.write().unwrap_or_else(PoisonError::into_inner) = Some(registry);
    }

    pub(crate) fn clear_registry(&self) {
        *self.registry.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn registry(&self) -> Option<Arc<Registry>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn set_state(&self, state: AgentState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Start the worker. No-op if already running.
    pub async fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().await;

        if self.state() == AgentState::Running {
            tracing::warn!(agent_id = %self.id, "Agent already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let agent = Arc::clone(self);
        let span = tracing::info_span!("agent", agent_id = %self.id);
        worker.handle = Some(tokio::spawn(agent.run(shutdown_rx).instrument(span)));
        worker.shutdown = Some(shutdown_tx);
        self.set_state(AgentState::Running);

        tracing::info!("Agent {} started", self.id);
    }

    /// Stop the worker, waiting at most `timeout` for it to finish the
    /// message in hand. No-op if not running.
    pub async fn stop(&self, timeout: Duration) {
        let mut worker = self.worker.lock().await;
        self.stop_locked(&mut worker, timeout).await;
    }

    /// Stop if running, discard queued messages, return to `Initialized`.
    pub async fn reset(&self) {
        let mut worker = self.worker.lock().await;
        self.stop_locked(&mut worker, self.config.stop_timeout).await;

        let discarded = self.mailbox.clear();
        self.set_state(AgentState::Initialized);
        tracing::info!("Agent {} reset ({} queued messages discarded)", self.id, discarded);
    }

    async fn stop_locked(&self, worker: &mut Worker, timeout: Duration) {
        if self.state() != AgentState::Running {
            return;
        }

        tracing::info!("Stopping agent {}", self.id);
        if let Some(shutdown) = worker.shutdown.take() {
            let _ = shutdown.send(true);
        }

        if let Some(handle) = worker.handle.take() {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(agent_id = %self.id, "Worker ended abnormally: {}", e);
                }
                Err(_) => {
                    // Dropping the handle detaches the task; it exits after
                    // its current message.
                    tracing::warn!(
                        agent_id = %self.id,
                        "Worker did not exit within {:?}, abandoning it",
                        timeout
                    );
                }
            }
        }

        self.set_state(AgentState::Stopped);
        tracing::info!("Agent {} stopped", self.id);
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("Worker loop started");

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = tokio::time::timeout(self.config.poll_interval, self.mailbox.next()) => next,
            };

            let Ok(message) = next else {
                continue;
            };

            tracing::info!("Processing message {} from {}", message.id, message.sender_id);
            if AssertUnwindSafe(self.handle(message))
                .catch_unwind()
                .await
                .is_err()
            {
                tracing::error!("Message handler panicked");
            }
            self.processed.fetch_add(1, Ordering::SeqCst);
        }

        tracing::debug!("Worker loop exited");
    }

    async fn handle(&self, message: Message) {
        match message.kind {
            MessageKind::Request => self.handle_request(message).await,
            MessageKind::Response => self.behavior.on_response(self, &message).await,
            MessageKind::Notification => self.behavior.on_notification(self, &message).await,
        }
    }

    async fn handle_request(&self, message: Message) {
        let outcome = match message.payload_map() {
            Some(input) => AssertUnwindSafe(self.behavior.process(self, input.clone()))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(ProcessError::from_panic(panic))),
            None => Err(ProcessError::new("payload must be a mapping")),
        };

        let body = match outcome {
            Ok(result) => json!({"status": "success", "result": result}),
            Err(e) => {
                tracing::error!("Error handling request {}: {}", message.id, e);
                json!({"status": "error", "error": e.to_string()})
            }
        };

        let payload = match body {
            Value::Object(map) => map,
            _ => Payload::new(),
        };
        self.dispatch(message.create_response(self.id.clone(), payload)).await;
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Agent id={} type={} state={}>",
            self.id,
            self.agent_type,
            self.state()
        )
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("agent_type", &self.agent_type)
            .field("capabilities", &self.capabilities)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct Recorder {
        seen: Arc<StdMutex<Vec<Payload>>>,
    }

    #[async_trait]
    impl AgentBehavior for Recorder {
        fn capabilities(&self) -> Vec<String> {
            vec!["test_processing".to_string()]
        }

        async fn process(&self, _agent: &Agent, input: Payload) -> Result<Value, ProcessError> {
            self.seen.lock().unwrap().push(input.clone());
            Ok(Value::Object(input))
        }
    }

    fn recorder() -> (Recorder, Arc<StdMutex<Vec<Payload>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        (Recorder { seen: seen.clone() }, seen)
    }

    fn fast_config() -> AgentConfig {
        AgentConfig {
            max_queue_size: 4,
            poll_interval: Duration::from_millis(10),
            stop_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (behavior, _) = recorder();
        let agent = Agent::with_config(
            "test_agent",
            "test",
            Arc::new(ContextStore::new()),
            behavior,
            fast_config(),
        );

        assert_eq!(agent.state(), AgentState::Initialized);
        assert_eq!(agent.capabilities(), ["test_processing".to_string()]);

        agent.start().await;
        assert_eq!(agent.state(), AgentState::Running);
        agent.start().await;
        assert_eq!(agent.state(), AgentState::Running);

        agent.stop(Duration::from_secs(1)).await;
        assert_eq!(agent.state(), AgentState::Stopped);
        agent.stop(Duration::from_secs(1)).await;
        assert_eq!(agent.state(), AgentState::Stopped);

        agent.start().await;
        assert_eq!(agent.state(), AgentState::Running);
        agent.reset().await;
        assert_eq!(agent.state(), AgentState::Initialized);
    }

    #[tokio::test]
    async fn test_reset_discards_queue() {
        let (behavior, seen) = recorder();
        let agent = Agent::with_config(
            "test_agent",
            "test",
            Arc::new(ContextStore::new()),
            behavior,
            fast_config(),
        );

        agent.receive_message(Message::request("other", "test_agent", Payload::new()));
        agent.receive_message(Message::request("other", "test_agent", Payload::new()));
        assert_eq!(agent.stats().mailbox.pending, 2);

        agent.reset().await;
        assert_eq!(agent.stats().mailbox.pending, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_without_registry_is_noop() {
        let (behavior, _) = recorder();
        let agent = Agent::new("loner", "test", Arc::new(ContextStore::new()), behavior);

        let message = agent.send_request("nobody", Payload::new()).await;
        assert_eq!(message.sender_id, "loner");
        assert_eq!(message.receiver_id, "nobody");
        assert_eq!(message.kind, MessageKind::Request);
        assert_eq!(message.priority, Priority::Medium);
    }

    #[tokio::test]
    async fn test_worker_processes_requests() {
        let (behavior, seen) = recorder();
        let agent = Agent::with_config(
            "worker",
            "test",
            Arc::new(ContextStore::new()),
            behavior,
            fast_config(),
        );
        agent.start().await;

        let mut payload = Payload::new();
        payload.insert("data".to_string(), json!(1));
        agent.receive_message(Message::request("client", "worker", payload));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while agent.stats().processed < 1 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        agent.stop(Duration::from_secs(1)).await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("data"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_default_hooks_accept_any_payload() {
        let (behavior, seen) = recorder();
        let agent = Agent::new("hooks", "test", Arc::new(ContextStore::new()), recorder().0);

        let request = Message::request("hooks", "peer", Payload::new());
        let mut body = Payload::new();
        body.insert("status".to_string(), json!("success"));
        behavior
            .on_response(&agent, &request.create_response("peer", body))
            .await;
        behavior
            .on_response(&agent, &request.create_response("peer", Payload::new()))
            .await;
        behavior
            .on_notification(&agent, &Message::notification("peer", "hooks", Payload::new()))
            .await;

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_process_error_from_panic() {
        let err = ProcessError::from_panic(Box::new("boom"));
        assert_eq!(err.to_string(), "process panicked: boom");
        let err = ProcessError::from_panic(Box::new(42_u8));
        assert_eq!(err.to_string(), "process panicked: unknown panic");
    }

    #[test]
    fn test_info_serializes_type_field() {
        let (behavior, _) = recorder();
        let agent = Agent::new("a", "analysis", Arc::new(ContextStore::new()), behavior);
        let value = serde_json::to_value(agent.info()).unwrap();
        assert_eq!(value["type"], json!("analysis"));
        assert_eq!(value["state"], json!("initialized"));
        assert_eq!(agent.to_string(), "<Agent id=a type=analysis state=initialized>");
    }
}
