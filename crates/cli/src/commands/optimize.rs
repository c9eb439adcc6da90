//! `rsz optimize`: submit one request and render the result

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use serde_json::{Map, Value};
use std::io::Read;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

use crate::client::ApiClient;
use crate::output::{
    color_savings, format_bytes, format_cores, format_currency, format_value, print_info,
    print_json, print_success, print_warning, OutputFormat,
};

/// Resource kinds accepted by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceKindArg {
    Ec2Instance,
    Ec2InstanceWithVolumes,
    EbsVolume,
    RdsInstance,
    GcpInstance,
    GcpInstanceWithDisks,
    GcpDisk,
    KubernetesPod,
    KubernetesWorkload,
}

impl ResourceKindArg {
    /// Path segment under `/api/v1/optimize/`
    pub fn route(&self) -> &'static str {
        match self {
            Self::Ec2Instance => "ec2-instance",
            Self::Ec2InstanceWithVolumes => "ec2-instance-with-volumes",
            Self::EbsVolume => "ebs-volume",
            Self::RdsInstance => "rds-instance",
            Self::GcpInstance => "gcp-instance",
            Self::GcpInstanceWithDisks => "gcp-instance-with-disks",
            Self::GcpDisk => "gcp-disk",
            Self::KubernetesPod => "kubernetes-pod",
            Self::KubernetesWorkload => "kubernetes-workload",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Ec2Instance | Self::Ec2InstanceWithVolumes => "EC2 instance",
            Self::EbsVolume => "EBS volume",
            Self::RdsInstance => "RDS instance",
            Self::GcpInstance | Self::GcpInstanceWithDisks => "GCP instance",
            Self::GcpDisk => "GCP disk",
            Self::KubernetesPod => "Pod",
            Self::KubernetesWorkload => "Workload",
        }
    }
}

/// Row of a Current vs Recommended table
#[derive(Tabled)]
struct ComparisonRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Recommended")]
    recommended: String,
}

/// Row of a container sizing table
#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Container")]
    name: String,
    #[tabled(rename = "CPU Request")]
    cpu_request: String,
    #[tabled(rename = "CPU Limit")]
    cpu_limit: String,
    #[tabled(rename = "Memory Request")]
    memory_request: String,
    #[tabled(rename = "Memory Limit")]
    memory_limit: String,
}

/// Read the request body from a file (`-` for stdin) and stamp a request id.
///
/// An explicit `request_id` wins over one in the file; without either a
/// timestamp-based id is generated.
pub fn load_request(input: &Path, request_id: Option<String>) -> Result<Value> {
    let content = if input == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read request from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?
    };

    let mut body: Value = serde_json::from_str(&content).context("Request is not valid JSON")?;
    let Some(object) = body.as_object_mut() else {
        bail!("Request must be a JSON object");
    };

    match request_id {
        Some(id) => {
            object.insert("request_id".to_string(), Value::String(id));
        }
        None if object.get("request_id").and_then(Value::as_str).is_some() => {}
        None => {
            let generated = format!("rsz-{}", chrono::Utc::now().timestamp_millis());
            object.insert("request_id".to_string(), Value::String(generated));
        }
    }
    Ok(body)
}

/// Submit a request and print the recommendation
pub async fn optimize(
    client: &ApiClient,
    kind: ResourceKindArg,
    input: &Path,
    request_id: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let body = load_request(input, request_id)?;
    let response = client.optimize(kind.route(), &body).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => render(kind, &response),
    }
    Ok(())
}

fn render(kind: ResourceKindArg, response: &Value) {
    println!(
        "{} {}",
        "Request".bold(),
        format_value(response.get("request_id")).cyan()
    );
    println!();

    match kind {
        ResourceKindArg::Ec2InstanceWithVolumes => {
            render_priced(kind.title(), &response["instance"]);
            for volume in response["volumes"].as_array().into_iter().flatten() {
                render_priced("EBS volume", volume);
            }
            render_failures(&response["failures"]);
        }
        ResourceKindArg::GcpInstanceWithDisks => {
            render_priced(kind.title(), &response["instance"]);
            for disk in response["disks"].as_array().into_iter().flatten() {
                render_priced("GCP disk", disk);
            }
            render_failures(&response["failures"]);
        }
        ResourceKindArg::KubernetesPod => {
            println!(
                "{} {}/{}",
                kind.title().bold(),
                format_value(response.get("namespace")),
                format_value(response.get("name"))
            );
            render_containers(&response["containers"]);
        }
        ResourceKindArg::KubernetesWorkload => {
            println!(
                "{} {} {}/{}",
                kind.title().bold(),
                format_value(response.get("kind")),
                format_value(response.get("namespace")),
                format_value(response.get("name"))
            );
            render_containers(&response["containers"]);
            let replicas = response["replicas"].as_array().map_or(0, Vec::len);
            print_info(&format!("Recommendation applies to {} replica(s)", replicas));
            render_failures(&response["failures"]);
        }
        _ => render_priced(kind.title(), response),
    }
}

/// Scalar fields of a profile, nested objects flattened as `outer.inner`
fn flatten(prefix: &str, map: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) => flatten(&name, inner, out),
            other => out.push((name, other.clone())),
        }
    }
}

fn comparison_rows(current: &Value, recommended: &Value) -> Vec<ComparisonRow> {
    let mut fields = Vec::new();
    if let Some(map) = current.as_object() {
        flatten("", map, &mut fields);
    }
    let mut recommended_fields = Vec::new();
    if let Some(map) = recommended.as_object() {
        flatten("", map, &mut recommended_fields);
    }

    let mut rows: Vec<ComparisonRow> = fields
        .iter()
        .filter(|(name, _)| name != "cost")
        .map(|(name, value)| ComparisonRow {
            field: name.clone(),
            current: format_value(Some(value)),
            recommended: format_value(
                recommended_fields
                    .iter()
                    .find(|(other, _)| other == name)
                    .map(|(_, v)| v),
            ),
        })
        .collect();

    let cost = |v: &Value| v["cost"].as_f64().map_or_else(|| "-".to_string(), format_currency);
    rows.push(ComparisonRow {
        field: "monthly cost".to_string(),
        current: cost(current),
        recommended: cost(recommended),
    });
    rows
}

fn render_priced(title: &str, recommendation: &Value) {
    println!("{}", title.bold());

    let current = &recommendation["current"];
    let recommended = &recommendation["recommended"];
    let table = Table::new(comparison_rows(current, recommended))
        .with(Style::rounded())
        .to_string();
    println!("{}", table);

    match (current["cost"].as_f64(), recommended["cost"].as_f64()) {
        (Some(now), Some(next)) => {
            println!("{} {}", "Monthly savings:".bold(), color_savings(now - next));
        }
        _ => print_warning("No configuration in the catalog fits observed usage and preferences"),
    }

    if let Some(description) = recommendation["description"].as_str().filter(|d| !d.is_empty()) {
        print_info(description);
    }
    println!();
}

/// `current → recommended`, or just `current` when there is nothing to change to
fn change(current: &Value, recommended: &Value, field: &str, format: fn(f64) -> String) -> String {
    let show = |v: &Value| v[field].as_f64().map_or_else(|| "-".to_string(), format);
    if recommended.is_null() {
        show(current)
    } else {
        format!("{} → {}", show(current), show(recommended).green())
    }
}

fn render_containers(containers: &Value) {
    let rows: Vec<ContainerRow> = containers
        .as_array()
        .into_iter()
        .flatten()
        .map(|c| {
            let current = &c["current"];
            let recommended = &c["recommended"];
            ContainerRow {
                name: format_value(c.get("name")),
                cpu_request: change(current, recommended, "cpu_request", format_cores),
                cpu_limit: change(current, recommended, "cpu_limit", format_cores),
                memory_request: change(current, recommended, "memory_request", format_bytes),
                memory_limit: change(current, recommended, "memory_limit", format_bytes),
            }
        })
        .collect();

    if rows.is_empty() {
        print_warning("No containers in response");
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);

    let unsized_count = containers
        .as_array()
        .into_iter()
        .flatten()
        .filter(|c| c["recommended"].is_null())
        .count();
    if unsized_count > 0 {
        print_warning(&format!(
            "{} container(s) had no usage samples and were left unchanged",
            unsized_count
        ));
    }
    for description in containers
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|c| c["description"].as_str())
        .filter(|d| !d.is_empty())
    {
        print_info(description);
    }
}

fn render_failures(failures: &Value) {
    let failures = failures.as_array().map(Vec::as_slice).unwrap_or(&[]);
    if failures.is_empty() {
        print_success("All attached resources processed");
        return;
    }
    for failure in failures {
        print_warning(&format!(
            "{}: {}",
            format_value(failure.get("id")),
            format_value(failure.get("error"))
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn request_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_load_request_keeps_file_request_id() {
        let file = request_file(r#"{"request_id":"from-file","volume_id":"vol-1"}"#);
        let body = load_request(file.path(), None).unwrap();
        assert_eq!(body["request_id"], "from-file");
        assert_eq!(body["volume_id"], "vol-1");
    }

    #[test]
    fn test_load_request_explicit_id_wins() {
        let file = request_file(r#"{"request_id":"from-file"}"#);
        let body = load_request(file.path(), Some("cli".to_string())).unwrap();
        assert_eq!(body["request_id"], "cli");
    }

    #[test]
    fn test_load_request_generates_id() {
        let file = request_file(r#"{"instance_id":"i-1"}"#);
        let body = load_request(file.path(), None).unwrap();
        assert!(body["request_id"].as_str().unwrap().starts_with("rsz-"));
    }

    #[test]
    fn test_load_request_rejects_non_object() {
        let file = request_file("[1, 2, 3]");
        assert!(load_request(file.path(), None).is_err());
    }

    #[test]
    fn test_comparison_rows_flatten_nested_profiles() {
        let current = json!({
            "instance_class": "db.m5.large",
            "storage": {"storage_type": "gp2", "size_gb": 100.0},
            "cost": 150.0
        });
        let recommended = json!({
            "instance_class": "db.t3.small",
            "storage": {"storage_type": "gp3", "size_gb": 40.0},
            "cost": 40.0
        });

        let rows = comparison_rows(&current, &recommended);
        let storage = rows.iter().find(|r| r.field == "storage.storage_type").unwrap();
        assert_eq!(storage.current, "gp2");
        assert_eq!(storage.recommended, "gp3");
        let cost = rows.last().unwrap();
        assert_eq!(cost.field, "monthly cost");
        assert_eq!(cost.recommended, "$40.00");
    }

    #[test]
    fn test_comparison_rows_without_recommendation() {
        let rows = comparison_rows(&json!({"volume_type": "gp2", "cost": 10.0}), &Value::Null);
        assert_eq!(rows[0].recommended, "-");
        assert_eq!(rows.last().unwrap().recommended, "-");
    }

    #[test]
    fn test_routes_match_service() {
        assert_eq!(ResourceKindArg::KubernetesWorkload.route(), "kubernetes-workload");
        assert_eq!(
            ResourceKindArg::from_str("gcp-instance-with-disks", false).unwrap(),
            ResourceKindArg::GcpInstanceWithDisks
        );
    }
}
