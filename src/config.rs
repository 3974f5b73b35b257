use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::state::AgentRole;

/// Name of the per-project config file, looked up in the working directory.
pub const CONFIG_FILE: &str = "orchestra.toml";

/// Agent CLI settings for one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Executable looked up on PATH by `orchestra check`.
    pub binary: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Orchestra configuration read from `<workdir>/orchestra.toml`.
///
/// Every field is optional in the file; missing values take the defaults
/// below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestraConfig {
    /// State directory, relative to the working directory unless absolute.
    pub state_dir: PathBuf,
    /// Longest a writer waits for the store lock before reporting busy.
    pub lock_timeout_ms: u64,
    /// Interval between lock attempts while waiting.
    pub lock_poll_ms: u64,
    /// Write attempts the CLI makes against a busy store before escalating.
    pub escalate_after_failures: u32,
    /// Base delay between those attempts; grows linearly per attempt.
    pub retry_backoff_ms: u64,
    /// Agent CLI settings keyed by role name.
    pub agents: HashMap<String, AgentConfig>,
}

impl Default for OrchestraConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".orchestra"),
            lock_timeout_ms: 2000,
            lock_poll_ms: 20,
            escalate_after_failures: 3,
            retry_backoff_ms: 100,
            agents: default_agents(),
        }
    }
}

fn default_agents() -> HashMap<String, AgentConfig> {
    AgentRole::ALL
        .iter()
        .map(|role| {
            (
                role.to_string(),
                AgentConfig {
                    binary: default_binary(*role).to_string(),
                    enabled: true,
                },
            )
        })
        .collect()
}

/// CLI that plays each role unless overridden in config.
pub fn default_binary(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Orchestrator => "claude",
        AgentRole::Researcher => "gemini",
        AgentRole::EngineerA => "codex",
        AgentRole::EngineerB => "copilot",
    }
}

impl OrchestraConfig {
    /// Path of the config file for a working directory.
    pub fn config_path(workdir: &Path) -> PathBuf {
        workdir.join(CONFIG_FILE)
    }

    /// Load configuration for a working directory.
    ///
    /// A missing file yields defaults. `ORCHESTRA_STATE_DIR` overrides
    /// `state_dir`.
    pub fn load(workdir: &Path) -> anyhow::Result<Self> {
        let path = Self::config_path(workdir);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(dir) = std::env::var("ORCHESTRA_STATE_DIR") {
            if !dir.is_empty() {
                config.state_dir = PathBuf::from(dir);
            }
        }
        Ok(config)
    }

    /// Parse config text, filling in any agent roles the file leaves out.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        for (role, agent) in default_agents() {
            config.agents.entry(role).or_insert(agent);
        }
        Ok(config)
    }

    /// Write this config as TOML.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Absolute state directory for a working directory.
    pub fn resolve_state_dir(&self, workdir: &Path) -> PathBuf {
        if self.state_dir.is_absolute() {
            self.state_dir.clone()
        } else {
            workdir.join(&self.state_dir)
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms.max(1))
    }

    pub fn agent(&self, role: AgentRole) -> Option<&AgentConfig> {
        self.agents.get(role.as_str())
    }
}

/// Sender identity for this process, from `ORCHESTRA_AGENT`.
pub fn current_agent() -> anyhow::Result<AgentRole> {
    match std::env::var("ORCHESTRA_AGENT") {
        Ok(name) if !name.is_empty() => Ok(name.parse()?),
        _ => Ok(AgentRole::Orchestrator),
    }
}
