use std::path::Path;

use anyhow::Context;
use orchestra::config::OrchestraConfig;
use orchestra::setup::mcp_config;

pub fn run(cwd: &Path) -> anyhow::Result<u8> {
    let cwd = cwd
        .canonicalize()
        .with_context(|| format!("working directory not found: {}", cwd.display()))?;
    let config = OrchestraConfig::load(&cwd)?;
    let document = mcp_config(&config.resolve_state_dir(&cwd));
    println!("{}", serde_json::to_string_pretty(&document)?);

    let path = OrchestraConfig::config_path(&cwd);
    if path.exists() {
        eprintln!("Keeping existing {}", path.display());
    } else {
        OrchestraConfig::default().save(&path)?;
        eprintln!("Created {} with default settings", path.display());
    }
    Ok(0)
}
