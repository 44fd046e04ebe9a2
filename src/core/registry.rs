//! Agent directory and message router.
//!
//! The registry owns the id -> agent map and the delivery statistics.
//! Both live under one async mutex so a delivery and its accounting are
//! a single step, and bulk start/stop see a consistent directory.
//!
//! Lifecycle calls made while the directory is locked wait on agent
//! workers. A worker that tries to route a message during `stop_all`
//! blocks on the same lock, so its stop times out and it is abandoned.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::agent::{Agent, AgentInfo};
use crate::core::routing::RouteTable;
use crate::error::RegistryError;
use crate::protocol::Message;

pub type Result<T> = std::result::Result<T, RegistryError>;

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Directory statistics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_agents: usize,
    pub agents_by_type: BTreeMap<String, usize>,
    pub total_messages: u64,
    pub message_routes: BTreeMap<String, u64>,
}

#[derive(Default)]
struct Directory {
    agents: BTreeMap<String, Arc<Agent>>,
    routes: RouteTable,
}

/// Agent registry.
pub struct Registry {
    directory: Mutex<Directory>,
    stop_timeout: Duration,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_stop_timeout(DEFAULT_STOP_TIMEOUT)
    }

    /// Registry whose `unregister` waits at most `stop_timeout` per agent.
    pub fn with_stop_timeout(stop_timeout: Duration) -> Self {
        Self {
            directory: Mutex::new(Directory::default()),
            stop_timeout,
        }
    }

    /// Add an agent and attach this registry to it.
    pub async fn register(self: &Arc<Self>, agent: Arc<Agent>) -> Result<()> {
        let mut directory = self.directory.lock().await;

        if directory.agents.contains_key(agent.id()) {
            tracing::warn!("Agent {} already registered", agent.id());
            return Err(RegistryError::AlreadyRegistered(agent.id().to_string()));
        }

        agent.set_registry(Arc::downgrade(self));
        tracing::info!("Registered agent {} ({})", agent.id(), agent.agent_type());
        directory.agents.insert(agent.id().to_string(), agent);
        Ok(())
    }

    /// Stop and remove an agent.
    pub async fn unregister(&self, agent_id: &str) -> Result<()> {
        let mut directory = self.directory.lock().await;

        let Some(agent) = directory.agents.get(agent_id).cloned() else {
            tracing::warn!("Agent {} not found", agent_id);
            return Err(RegistryError::NotFound(agent_id.to_string()));
        };

        agent.stop(self.stop_timeout).await;
        agent.clear_registry();
        directory.agents.remove(agent_id);

        tracing::info!("Unregistered agent {}", agent_id);
        Ok(())
    }

    /// Live handle to a registered agent, not a copy. Its state and
    /// mailbox are guarded internally, so the handle may be used freely
    /// while the agent runs.
    pub async fn get_agent(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.directory.lock().await.agents.get(agent_id).cloned()
    }

    /// Live handles of agents whose type matches exactly.
    pub async fn get_agents_by_type(&self, agent_type: &str) -> Vec<Arc<Agent>> {
        self.directory
            .lock()
            .await
            .agents
            .values()
            .filter(|a| a.agent_type() == agent_type)
            .cloned()
            .collect()
    }

    pub async fn all_agents(&self) -> Vec<Arc<Agent>> {
        self.directory.lock().await.agents.values().cloned().collect()
    }

    /// Deliver a message to its receiver's mailbox and count it.
    ///
    /// An unknown receiver is logged, counted nowhere and reported as an
    /// error. A full receiver mailbox still counts as routed.
    pub async fn route_message(&self, message: Message) -> Result<()> {
        let mut directory = self.directory.lock().await;

        let Some(receiver) = directory.agents.get(&message.receiver_id).cloned() else {
            tracing::error!(
                "Receiver {} not found for message {}",
                message.receiver_id,
                message.id
            );
            return Err(RegistryError::UnknownReceiver {
                receiver_id: message.receiver_id,
                message_id: message.id,
            });
        };

        directory.routes.record(&message);
        tracing::debug!(
            "Routing {} {} from {} to {}",
            message.kind,
            message.id,
            message.sender_id,
            message.receiver_id
        );
        receiver.receive_message(message);
        Ok(())
    }

    pub async fn start_all(&self) {
        let directory = self.directory.lock().await;
        for agent in directory.agents.values() {
            agent.start().await;
        }
        tracing::info!("Started {} agents", directory.agents.len());
    }

    /// Stop every agent, waiting at most `timeout` for each.
    pub async fn stop_all(&self, timeout: Duration) {
        let directory = self.directory.lock().await;
        for agent in directory.agents.values() {
            agent.stop(timeout).await;
        }
        tracing::info!("Stopped {} agents", directory.agents.len());
    }

    pub async fn get_statistics(&self) -> RegistryStats {
        let directory = self.directory.lock().await;

        let mut agents_by_type = BTreeMap::new();
        for agent in directory.agents.values() {
            *agents_by_type.entry(agent.agent_type().to_string()).or_insert(0) += 1;
        }

        RegistryStats {
            total_agents: directory.agents.len(),
            agents_by_type,
            total_messages: directory.routes.total_messages(),
            message_routes: directory.routes.routes().clone(),
        }
    }

    pub async fn list_agents(&self) -> Vec<AgentInfo> {
        self.directory
            .lock()
            .await
            .agents
            .values()
            .map(|a| a.info())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.directory.lock().await.agents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.directory.lock().await.agents.is_empty()
    }
}

impl std::fmt::Display for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.directory.try_lock() {
            Ok(directory) => write!(f, "<Registry agents={}>", directory.agents.len()),
            Err(_) => write!(f, "<Registry busy>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentBehavior, ProcessError};
    use crate::context::ContextStore;
    use crate::protocol::Payload;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Echo;

    #[async_trait]
    impl AgentBehavior for Echo {
        fn capabilities(&self) -> Vec<String> {
            vec!["echo".to_string()]
        }

        async fn process(&self, _agent: &Agent, input: Payload) -> std::result::Result<Value, ProcessError> {
            Ok(Value::Object(input))
        }
    }

    fn agent(id: &str, agent_type: &str) -> Arc<Agent> {
        Agent::new(id, agent_type, Arc::new(ContextStore::new()), Echo)
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = Arc::new(Registry::new());
        registry.register(agent("a1", "analysis")).await.unwrap();
        registry.register(agent("a2", "analysis")).await.unwrap();
        registry.register(agent("o1", "optimization")).await.unwrap();

        assert_eq!(registry.len().await, 3);
        assert!(registry.get_agent("a1").await.is_some());
        assert!(registry.get_agent("missing").await.is_none());
        assert_eq!(registry.get_agents_by_type("analysis").await.len(), 2);
        assert!(registry.get_agents_by_type("none").await.is_empty());

        let stats = registry.get_statistics().await;
        assert_eq!(stats.total_agents, 3);
        assert_eq!(stats.agents_by_type.get("analysis"), Some(&2));
        assert_eq!(stats.total_messages, 0);
        assert_eq!(registry.to_string(), "<Registry agents=3>");
    }

    #[tokio::test]
    async fn test_get_agent_returns_live_handle() {
        let registry = Arc::new(Registry::new());
        let original = agent("live", "analysis");
        registry.register(original.clone()).await.unwrap();

        let handle = registry.get_agent("live").await.unwrap();
        assert!(Arc::ptr_eq(&handle, &original));

        original.start().await;
        assert_eq!(handle.state(), crate::agent::AgentState::Running);
        handle.stop(Duration::from_secs(1)).await;
        assert_eq!(original.state(), crate::agent::AgentState::Stopped);
    }

    #[tokio::test]
    async fn test_duplicate_register_keeps_original() {
        let registry = Arc::new(Registry::new());
        let original = agent("dup", "analysis");
        registry.register(original.clone()).await.unwrap();

        let err = registry.register(agent("dup", "verification")).await.unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered("dup".to_string()));

        let kept = registry.get_agent("dup").await.unwrap();
        assert!(Arc::ptr_eq(&kept, &original));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = Arc::new(Registry::with_stop_timeout(Duration::from_secs(1)));
        let a = agent("a1", "analysis");
        registry.register(a.clone()).await.unwrap();
        a.start().await;

        registry.unregister("a1").await.unwrap();
        assert_eq!(a.state(), crate::agent::AgentState::Stopped);
        assert!(registry.is_empty().await);
        assert_eq!(
            registry.unregister("a1").await,
            Err(RegistryError::NotFound("a1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_route_unknown_receiver() {
        let registry = Arc::new(Registry::new());
        registry.register(agent("a1", "analysis")).await.unwrap();

        let result = registry
            .route_message(Message::request("a1", "ghost", Payload::new()))
            .await;
        assert!(matches!(result, Err(RegistryError::UnknownReceiver { .. })));
        assert_eq!(registry.get_statistics().await.total_messages, 0);
    }

    #[tokio::test]
    async fn test_route_counts_and_delivers() {
        let registry = Arc::new(Registry::new());
        let a = agent("a1", "analysis");
        let b = agent("b1", "analysis");
        registry.register(a.clone()).await.unwrap();
        registry.register(b.clone()).await.unwrap();

        registry
            .route_message(Message::request("a1", "b1", Payload::new()))
            .await
            .unwrap();
        registry
            .route_message(Message::notification("b1", "a1", Payload::new()))
            .await
            .unwrap();

        let stats = registry.get_statistics().await;
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.message_routes.get("a1->b1"), Some(&1));
        assert_eq!(stats.message_routes.get("b1->a1"), Some(&1));
        assert_eq!(b.stats().mailbox.pending, 1);
        assert_eq!(a.stats().mailbox.pending, 1);
    }

    #[tokio::test]
    async fn test_start_and_stop_all() {
        let registry = Arc::new(Registry::new());
        registry.register(agent("a1", "analysis")).await.unwrap();
        registry.register(agent("a2", "verification")).await.unwrap();

        registry.start_all().await;
        for info in registry.list_agents().await {
            assert_eq!(info.state, crate::agent::AgentState::Running);
        }

        registry.stop_all(Duration::from_secs(1)).await;
        for info in registry.list_agents().await {
            assert_eq!(info.state, crate::agent::AgentState::Stopped);
        }
    }
}
