//! `hubkit services`: list the registry.

use anyhow::{Context, Result};
use console::style;
use hub_services::{Service, get_ready_services, services};

pub fn cmd_services(ready_only: bool, json: bool) -> Result<()> {
    let listed: Vec<&Service> = if ready_only {
        get_ready_services()
    } else {
        services().iter().collect()
    };

    if json {
        let out = serde_json::to_string_pretty(&listed).context("Failed to serialize services")?;
        println!("{}", out);
        return Ok(());
    }

    for service in listed {
        let status = if service.ready {
            style("ready").green()
        } else {
            style("soon").dim()
        };
        println!(
            "{} {:<10} {:<16} {:<6} {}",
            service.icon,
            service.id,
            service.name,
            status,
            service.description
        );
    }
    Ok(())
}
