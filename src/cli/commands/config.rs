//! `initrepo config`

use anyhow::Result;
use serde_json::json;

use super::output::emit_json;
use crate::{Config, ExitCode};

/// Print every effective key with its value and source.
pub fn show(config: &Config, json: bool) -> Result<ExitCode> {
    let effective = config.effective_config();

    if json {
        let entries: serde_json::Map<_, _> = effective
            .iter()
            .map(|(key, (value, source))| (key.clone(), json!({"value": value, "source": source})))
            .collect();
        println!("{}", emit_json(&entries)?);
        return Ok(ExitCode::SUCCESS);
    }

    match &config.config_path {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none, using defaults)"),
    }
    let width = effective.keys().map(String::len).max().unwrap_or(0);
    for (key, (value, source)) in &effective {
        println!("  {key:<width$} = {value}  [{source}]");
    }
    Ok(ExitCode::SUCCESS)
}
