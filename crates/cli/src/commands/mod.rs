//! CLI subcommand implementations.

pub mod create;
pub mod index;
pub mod locker;

use anyhow::Result;
use serde::Serialize;

/// Render a config struct as commented default TOML, leaving table headers
/// uncommented so the output pastes into a real file.
pub fn config_comment<T: Serialize>(value: &T) -> Result<String> {
    let body = toml::to_string(value)?;
    let mut out = String::from("# Default config:\n");
    for line in body.lines() {
        if !line.starts_with('[') {
            out.push('#');
        }
        out.push_str(line);
        out.push('\n');
    }
    Ok(out)
}

pub fn print_worker_default_config() -> Result<()> {
    let config = fca_core::ExportWorkerConfig::default();
    print!("{}", config_comment(&config)?);
    Ok(())
}
