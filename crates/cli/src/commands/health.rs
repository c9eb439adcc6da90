//! `rsz health`

use anyhow::{bail, Result};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use crate::client::{ApiClient, HealthSummary};
use crate::output::{color_status, print_json, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

fn component_rows(health: &HealthSummary) -> Vec<ComponentRow> {
    health
        .components
        .iter()
        .map(|(name, component)| ComponentRow {
            name: name.clone(),
            status: color_status(&component.status),
            message: component.message.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect()
}

/// Print service health; exits non-zero when the service is unhealthy
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("{} {}", "Status:".bold(), color_status(&health.status));
            let rows = component_rows(&health);
            if !rows.is_empty() {
                let table = Table::new(rows).with(Style::rounded()).to_string();
                println!("{}", table);
            }
        }
    }

    if health.status.eq_ignore_ascii_case("unhealthy") {
        bail!("service is unhealthy");
    }
    Ok(())
}
