//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde_json::Value;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any JSON value pretty-printed
pub fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: f64) -> String {
    const KI: f64 = 1024.0;
    const MI: f64 = KI * 1024.0;
    const GI: f64 = MI * 1024.0;

    if bytes >= GI {
        format!("{:.2}Gi", bytes / GI)
    } else if bytes >= MI {
        format!("{:.0}Mi", bytes / MI)
    } else if bytes >= KI {
        format!("{:.0}Ki", bytes / KI)
    } else {
        format!("{:.0}", bytes)
    }
}

/// Format cores as a Kubernetes-style CPU quantity
pub fn format_cores(cores: f64) -> String {
    if cores >= 1.0 {
        format!("{:.2}", cores)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        format!("{:.0}m", cores * 1000.0)
    }
}

/// Format a monthly cost
pub fn format_currency(amount: f64) -> String {
    format!("${:.2}", amount)
}

/// Plain text for a scalar JSON value; `-` for null or absent
pub fn format_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => format!("{:.0}", f),
            Some(f) => format!("{:.2}", f),
            None => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Savings in green, extra cost in red
pub fn color_savings(savings: f64) -> String {
    let formatted = format_currency(savings.abs());
    if savings > 0.0 {
        formatted.green().bold().to_string()
    } else if savings < 0.0 {
        format!("-{}", formatted).red().to_string()
    } else {
        formatted
    }
}
