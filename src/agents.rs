//! Reachability of the agent CLIs behind each role.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::OrchestraConfig;
use crate::state::AgentRole;

/// Whether one role's CLI can be launched from this environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Availability {
    pub role: AgentRole,
    pub binary: String,
    pub enabled: bool,
    /// Resolved executable, if found.
    pub path: Option<PathBuf>,
}

impl Availability {
    pub fn is_available(&self) -> bool {
        self.enabled && self.path.is_some()
    }
}

/// Check every role's configured CLI against `PATH`.
pub fn check_availability(config: &OrchestraConfig) -> Vec<Availability> {
    let path_var = std::env::var_os("PATH");
    check_availability_in(config, path_var.as_deref())
}

pub fn check_availability_in(
    config: &OrchestraConfig,
    path_var: Option<&OsStr>,
) -> Vec<Availability> {
    AgentRole::ALL
        .iter()
        .map(|&role| {
            let (binary, enabled) = match config.agent(role) {
                Some(agent) => (agent.binary.clone(), agent.enabled),
                None => (crate::config::default_binary(role).to_string(), true),
            };
            let path = if enabled {
                find_executable(&binary, path_var)
            } else {
                None
            };
            Availability {
                role,
                binary,
                enabled,
                path,
            }
        })
        .collect()
}

/// Resolve `binary` the way a shell would: paths are checked directly, bare
/// names are searched in each `PATH` entry.
pub fn find_executable(binary: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    std::env::split_paths(path_var?)
        .flat_map(|dir| executable_names(binary).map(move |name| dir.join(name)))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn executable_names(binary: &str) -> impl Iterator<Item = String> {
    std::iter::once(binary.to_string())
}

#[cfg(not(unix))]
fn executable_names(binary: &str) -> impl Iterator<Item = String> {
    let binary = binary.to_string();
    ["", ".exe", ".cmd", ".bat"]
        .into_iter()
        .map(move |ext| format!("{}{}", binary, ext))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn install(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_find_executable_on_path() {
        let dir = TempDir::new().unwrap();
        let gemini = install(dir.path(), "gemini", 0o755);
        install(dir.path(), "codex", 0o644);

        let path_var = dir.path().as_os_str();
        assert_eq!(find_executable("gemini", Some(path_var)), Some(gemini));
        assert_eq!(find_executable("codex", Some(path_var)), None);
        assert_eq!(find_executable("copilot", Some(path_var)), None);
        assert_eq!(find_executable("gemini", None), None);
    }

    #[test]
    fn test_find_executable_explicit_path() {
        let dir = TempDir::new().unwrap();
        let tool = install(dir.path(), "tool", 0o755);
        let found = find_executable(tool.to_str().unwrap(), None);
        assert_eq!(found, Some(tool));
    }

    #[test]
    fn test_check_availability_respects_enabled() {
        let dir = TempDir::new().unwrap();
        install(dir.path(), "gemini", 0o755);
        install(dir.path(), "codex", 0o755);

        let mut config = OrchestraConfig::default();
        config.agents.get_mut("engineer-a").unwrap().enabled = false;

        let report = check_availability_in(&config, Some(dir.path().as_os_str()));
        let by_role = |role| report.iter().find(|a| a.role == role).unwrap();

        assert!(by_role(AgentRole::Researcher).is_available());
        assert!(!by_role(AgentRole::EngineerA).is_available());
        assert!(by_role(AgentRole::EngineerA).path.is_none());
        assert!(!by_role(AgentRole::EngineerB).is_available());
        assert_eq!(report.len(), 4);
    }
}
