use std::path::Path;

use anyhow::{Context, Result};

use crate::config::ModeConfig;

/// Load and validate a mode config JSON file (§7 `ConfigError`: "mode
/// config fails validation at construction"), printing a readable report.
pub fn run(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mode: ModeConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing {} as a mode config", path.display()))?;

    match mode.validate() {
        Ok(()) => {
            println!("OK: {} config is valid ({})", mode.name(), path.display());
            Ok(())
        }
        Err(errors) => {
            println!("INVALID: {} config has {} error(s):", mode.name(), errors.len());
            for e in &errors {
                println!("  - {e}");
            }
            std::process::exit(1);
        }
    }
}
