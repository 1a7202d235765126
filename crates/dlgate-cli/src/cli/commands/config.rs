//! `dlgate config` – show where the config lives and what is in effect.

use anyhow::Result;
use dlgate_core::config::{self, DispatchConfig};

pub fn run_config(cfg: &DispatchConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
