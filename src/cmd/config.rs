//! `hubkit config`: print the effective configuration.

use std::path::Path;

use anyhow::Result;
use hubkit::config::{CliOverrides, DEFAULT_CONFIG_FILE, HubConfig};

pub fn cmd_config(config_path: Option<&Path>) -> Result<()> {
    let source = match config_path {
        Some(path) => path.display().to_string(),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => DEFAULT_CONFIG_FILE.to_string(),
        None => "defaults".to_string(),
    };
    let config = HubConfig::resolve(config_path, &CliOverrides::default())?;
    let backend = config.backend_config(|key| std::env::var(key).ok()).redacted();

    println!();
    println!("hubkit configuration (from {})", source);
    println!("============================");
    println!();
    print!("{}", config.to_redacted_toml()?);
    println!();
    println!("Effective backend (with env overrides):");
    println!("  url = \"{}\"", backend.url);
    println!("  anon_key = \"{}\"", backend.anon_key);
    println!("  public_url = \"{}\"", config.public_url());
    println!();
    Ok(())
}
