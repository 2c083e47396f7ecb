mod api;

pub use api::{AppError, ChannelMember, CommandArgs, PluginApi, Post, User};

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[async_trait]
pub trait Plugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn help(&self) -> &'static str;

    /// Default spec for this plugin, carrying `config` through unchanged.
    fn spec(&self, config: serde_yaml::Value) -> PluginSpec;

    /// Called once at startup and whenever the plugin's config changes.
    async fn on_configuration_change(&self, _spec: &PluginSpec) -> Result<()> {
        Ok(())
    }

    async fn execute_command(&self, args: &CommandArgs) -> Result<()>;
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PluginTriggers {
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginSpec {
    pub id: String,
    #[serde(default = "enabled_true")]
    pub enabled: bool,
    #[serde(default)]
    pub triggers: PluginTriggers,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

const fn enabled_true() -> bool {
    true
}

#[derive(Clone)]
pub struct PluginEntry {
    pub spec: PluginSpec,
    pub plugin: Arc<dyn Plugin>,
}

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<String, PluginEntry>,
    by_command: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct PluginRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl core::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PluginRegistry").finish_non_exhaustive()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, spec: PluginSpec, plugin: Arc<dyn Plugin>) -> Option<PluginEntry> {
        let mut inner = self.inner.write().await;
        let id = spec.id.clone();
        let previous = inner.by_id.insert(
            id.clone(),
            PluginEntry {
                spec: spec.clone(),
                plugin,
            },
        );
        inner.by_command.retain(|_, existing| existing != &id);
        for cmd in &spec.triggers.commands {
            inner.by_command.insert(normalize_cmd(cmd), id.clone());
        }
        previous
    }

    pub async fn entry(&self, id: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner.by_id.get(id).cloned()
    }

    /// Looks up the enabled plugin registered for a command token such as
    /// `!webex`.
    pub async fn entry_by_command(&self, token: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner
            .by_command
            .get(&normalize_cmd(token))
            .and_then(|id| inner.by_id.get(id))
            .filter(|entry| entry.spec.enabled)
            .cloned()
    }
}

/// Command tokens are matched case-insensitively and default to the `!`
/// sigil; `/` triggers are kept as given.
fn normalize_cmd(s: &str) -> String {
    let lower = s.to_lowercase();
    if lower.starts_with('!') || lower.starts_with('/') {
        lower
    } else {
        format!("!{lower}")
    }
}

#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
