//! Shared state for the two HTTP servers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use parley_core::chat::{ChatOrchestrator, ChatSettings};
use parley_core::directory::UserDirectory;
use parley_core::llm::LlmProvider;
use parley_core::session::{HubSettings, SessionHub};
use parley_core::tools::{ToolBridge, ToolCatalog, register_user_tools};
use parley_infra::directory::HttpUserDirectory;
use parley_infra::mcp::SseToolConnector;
use parley_types::config::{BridgeConfig, ChatConfig, DirectoryConfig};

/// State of the tool bridge server.
#[derive(Clone)]
pub struct BridgeState {
    pub hub: SessionHub,
}

impl BridgeState {
    /// Build the bridge against the configured HTTP user directory.
    pub fn init(bridge: &BridgeConfig, directory: &DirectoryConfig) -> Result<Self> {
        let directory = HttpUserDirectory::new(directory).context("invalid [directory] configuration")?;
        Ok(Self::with_directory(bridge, Arc::new(directory)))
    }

    pub fn with_directory<D: UserDirectory>(bridge: &BridgeConfig, directory: Arc<D>) -> Self {
        let mut catalog = ToolCatalog::new();
        register_user_tools(&mut catalog, directory);
        let handler = ToolBridge::new(catalog, bridge.server_name.clone());
        Self {
            hub: SessionHub::new(Arc::new(handler), HubSettings::from(bridge)),
        }
    }
}

/// State of the chat API server.
pub struct ChatState<C> {
    pub orchestrator: ChatOrchestrator<C>,
}

impl<C> Clone for ChatState<C> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
        }
    }
}

impl ChatState<SseToolConnector> {
    /// Build the orchestrator: bridge connector plus generation provider.
    pub fn init(config: &ChatConfig, provider: Arc<dyn LlmProvider>) -> Result<Self> {
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs.max(1));
        let connector =
            SseToolConnector::new(&config.bridge_url, connect_timeout, config.tool_call_timeout())
            .context("invalid chat.bridge_url")?;
        Ok(Self {
            orchestrator: ChatOrchestrator::new(
                Arc::new(connector),
                provider,
                ChatSettings::from(config),
            ),
        })
    }
}
