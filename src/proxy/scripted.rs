//! Proxy driven by external command lines.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::{ProxyError, ProxyResult};
use super::Proxy;
use crate::crm::CommandExecutor;

/// Placeholder replaced by the new host in `generate_config`
pub const HOST_PLACEHOLDER: &str = "{host}";

/// Argument vectors for each proxy action. An empty vector means the action
/// is not configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyCommands {
    pub pause: Vec<String>,
    pub resume: Vec<String>,
    pub reload: Vec<String>,
    pub generate_config: Vec<String>,
}

/// Runs the configured command for every proxy action
pub struct ScriptedProxy {
    executor: Arc<dyn CommandExecutor>,
    commands: ProxyCommands,
}

impl ScriptedProxy {
    pub fn new(executor: Arc<dyn CommandExecutor>, commands: ProxyCommands) -> Self {
        Self { executor, commands }
    }

    async fn execute(&self, action: &'static str, argv: &[String], host: Option<&str>) -> ProxyResult<()> {
        let (program, args) = argv
            .split_first()
            .ok_or(ProxyError::NotConfigured(action))?;

        let args: Vec<String> = args
            .iter()
            .map(|arg| match host {
                Some(host) => arg.replace(HOST_PLACEHOLDER, host),
                None => arg.clone(),
            })
            .collect();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        self.executor
            .combined_output(program, &args)
            .await
            .map(|_| ())
            .map_err(|source| ProxyError::Command { action, source })
    }
}

#[async_trait]
impl Proxy for ScriptedProxy {
    async fn pause(&self) -> ProxyResult<()> {
        self.execute("pause", &self.commands.pause, None).await
    }

    async fn resume(&self) -> ProxyResult<()> {
        self.execute("resume", &self.commands.resume, None).await
    }

    async fn generate_config(&self, host: &str) -> ProxyResult<()> {
        self.execute("generate_config", &self.commands.generate_config, Some(host))
            .await
    }

    async fn reload(&self) -> ProxyResult<()> {
        self.execute("reload", &self.commands.reload, None).await
    }
}
