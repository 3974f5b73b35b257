//! Host integration document produced by `orchestra setup`.

use std::path::Path;

use serde_json::{json, Map, Value};

use crate::state::AgentRole;

/// MCP server launched for each worker role.
fn agent_server(role: AgentRole) -> Option<(&'static str, Value)> {
    let (name, package) = match role {
        AgentRole::Researcher => ("gemini-cli", "gemini-mcp-tool"),
        AgentRole::EngineerA => ("codex-cli", "codex-cli-mcp-tool"),
        AgentRole::EngineerB => ("copilot", "@willianpaiva/copilot-mcp-server"),
        AgentRole::Orchestrator => return None,
    };
    Some((name, json!({ "command": "npx", "args": ["-y", package] })))
}

/// Build the MCP configuration wiring each agent server to the store at
/// `state_dir`.
///
/// Every server gets `ORCHESTRA_STATE_DIR` and its own `ORCHESTRA_AGENT`, so
/// `orchestra` commands it runs write to the shared store under its role.
pub fn mcp_config(state_dir: &Path) -> Value {
    let state_dir = state_dir.display().to_string();
    let mut servers = Map::new();

    for role in AgentRole::WORKERS {
        if let Some((name, mut server)) = agent_server(role) {
            server["env"] = json!({
                "ORCHESTRA_STATE_DIR": state_dir,
                "ORCHESTRA_AGENT": role.as_str(),
            });
            servers.insert(name.to_string(), server);
        }
    }

    json!({
        "mcpServers": servers,
        "orchestra": {
            "stateDir": state_dir,
            "agent": AgentRole::Orchestrator.as_str(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcp_config_wires_each_worker() {
        let config = mcp_config(Path::new("/work/.orchestra"));
        let servers = config["mcpServers"].as_object().unwrap();
        assert_eq!(servers.len(), 3);

        let codex = &servers["codex-cli"];
        assert_eq!(codex["command"], "npx");
        assert_eq!(codex["env"]["ORCHESTRA_AGENT"], "engineer-a");
        assert_eq!(codex["env"]["ORCHESTRA_STATE_DIR"], "/work/.orchestra");
        assert_eq!(config["orchestra"]["agent"], "orchestrator");
    }
}
