//! Kubernetes container sizing
//!
//! Containers are not priced and never touch the catalog. Requests follow
//! the trimmed mean of observed usage and limits follow the peak:
//!
//! ```text
//! cpu request    = trimmed_mean(cpu, 10%) × (1 + CPUBreathingRoom) × (1 + CpuRequestBreathingRoom)
//! cpu limit      = max(cpu)               × (1 + CPUBreathingRoom) × (1 + CpuLimitBreathingRoom)
//! memory request = trimmed_mean(memory, 10%) × ...
//! memory limit   = max(memory) × ...
//! ```
//!
//! Floors are applied next (0.1 core, and 100 MiB for memory that computed
//! to exactly zero), then the user's `Min*` preferences.

use super::RightsizingEngine;
use crate::error::{EngineError, Result};
use crate::models::{MetricSeries, ResourceKind, Usage};
use crate::preferences::{PreferenceKey, Preferences};
use crate::services::ExplainRequest;
use crate::timeseries::{max_sample, sample_values, trimmed_mean, UsagePolicy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Container metric names: CPU in cores, memory in bytes
pub mod metrics {
    pub const CPU: &str = "cpu";
    pub const MEMORY: &str = "memory";
}

const TRIM_FRACTION: f64 = 0.1;
const MIN_CPU_CORES: f64 = 0.1;
const DEFAULT_MEMORY_BYTES: f64 = 100.0 * 1024.0 * 1024.0;

static CPU_QUANTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?|\.\d+)(m)?$").unwrap());

static MEMORY_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?|\.\d+)(Ki|Mi|Gi|Ti|Pi|Ei|k|K|M|G|T|P|E)?$").unwrap()
});

/// Parse a CPU quantity to cores.
///
/// - `"500m"` -> 0.5
/// - `"2"` -> 2.0
/// - `"1.5"` -> 1.5
pub fn parse_cpu_quantity(quantity: &str) -> Option<f64> {
    let caps = CPU_QUANTITY.captures(quantity.trim())?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some(if caps.get(2).is_some() {
        value / 1000.0
    } else {
        value
    })
}

/// Parse a memory quantity to bytes.
///
/// - `"256Mi"` -> 268435456
/// - `"1G"` -> 1000000000
/// - `"1024"` -> 1024
pub fn parse_memory_quantity(quantity: &str) -> Option<f64> {
    let caps = MEMORY_QUANTITY.captures(quantity.trim())?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str()).unwrap_or("") {
        "" => 1.0,
        "Ki" => 1024f64,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        "k" | "K" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        _ => return None,
    };
    Some(value * multiplier)
}

fn format_cores(cores: Option<f64>) -> String {
    match cores {
        Some(c) => format!("{}m", (c * 1000.0).round()),
        None => "-".to_string(),
    }
}

fn format_bytes(bytes: Option<f64>) -> String {
    match bytes {
        Some(b) => format!("{}Mi", (b / (1024.0 * 1024.0)).round()),
        None => "-".to_string(),
    }
}

/// Requests and limits of one container: CPU in cores, memory in bytes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerProfile {
    pub cpu_request: Option<f64>,
    pub cpu_limit: Option<f64>,
    pub memory_request: Option<f64>,
    pub memory_limit: Option<f64>,
}

impl ContainerProfile {
    fn from_container(container: &KubernetesContainer) -> Result<Self> {
        let parse = |field: &str, value: &Option<String>, parser: fn(&str) -> Option<f64>| {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .map(|v| {
                    parser(v).ok_or_else(|| {
                        EngineError::InvalidInput(format!(
                            "container {}: invalid {} quantity {:?}",
                            container.name, field, v
                        ))
                    })
                })
                .transpose()
        };

        Ok(Self {
            cpu_request: parse("cpu_request", &container.cpu_request, parse_cpu_quantity)?,
            cpu_limit: parse("cpu_limit", &container.cpu_limit, parse_cpu_quantity)?,
            memory_request: parse("memory_request", &container.memory_request, parse_memory_quantity)?,
            memory_limit: parse("memory_limit", &container.memory_limit, parse_memory_quantity)?,
        })
    }

    pub fn label(&self) -> String {
        format!(
            "cpu {}/{} memory {}/{}",
            format_cores(self.cpu_request),
            format_cores(self.cpu_limit),
            format_bytes(self.memory_request),
            format_bytes(self.memory_limit)
        )
    }
}

/// One container of a pod, with its current settings and observed usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesContainer {
    pub name: String,
    #[serde(default)]
    pub cpu_request: Option<String>,
    #[serde(default)]
    pub cpu_limit: Option<String>,
    #[serde(default)]
    pub memory_request: Option<String>,
    #[serde(default)]
    pub memory_limit: Option<String>,
    #[serde(default)]
    pub metrics: MetricSeries,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesPodRequest {
    pub namespace: String,
    pub name: String,
    pub containers: Vec<KubernetesContainer>,
    #[serde(default)]
    pub preferences: HashMap<String, Option<String>>,
}

impl KubernetesPodRequest {
    pub fn resource_id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub cpu: Usage,
    pub memory: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecommendation {
    pub name: String,
    pub current: ContainerProfile,
    pub recommended: Option<ContainerProfile>,
    pub usage: ContainerUsage,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodRecommendation {
    pub namespace: String,
    pub name: String,
    pub containers: Vec<ContainerRecommendation>,
}

impl super::Recommendation for PodRecommendation {
    fn has_recommendation(&self) -> bool {
        self.containers.iter().any(|c| c.recommended.is_some())
    }
}

/// Minimum from a `Min*` preference; derive means "at least the current value"
fn minimum(
    prefs: &Preferences,
    key: PreferenceKey,
    current: Option<f64>,
    parser: fn(&str) -> Option<f64>,
) -> Result<Option<f64>> {
    match prefs.literal(key) {
        Some(raw) => parser(raw)
            .map(Some)
            .ok_or_else(|| EngineError::invalid_preference(key.name(), format!("invalid quantity {:?}", raw))),
        None if prefs.is_set(key) => Ok(current),
        None => Ok(None),
    }
}

fn raise_to(value: Option<f64>, min: Option<f64>) -> Option<f64> {
    match (value, min) {
        (Some(v), Some(m)) => Some(v.max(m)),
        (None, Some(m)) => Some(m),
        (v, None) => v,
    }
}

/// Recommended requests and limits, `None` when the container has no samples
fn size_container(
    series: &MetricSeries,
    current: &ContainerProfile,
    prefs: &Preferences,
) -> Result<Option<ContainerProfile>> {
    use PreferenceKey as K;

    let cpu = sample_values(series.get(metrics::CPU));
    let memory = sample_values(series.get(metrics::MEMORY));
    if cpu.is_empty() && memory.is_empty() {
        return Ok(None);
    }

    let room = |key| 1.0 + prefs.breathing_room(key);
    let mut sized = current.clone();

    if !cpu.is_empty() {
        let request = trimmed_mean(&cpu, TRIM_FRACTION)? * room(K::CpuBreathingRoom) * room(K::CpuRequestBreathingRoom);
        let peak = max_sample(series.get(metrics::CPU)).unwrap_or(request);
        let limit = peak * room(K::CpuBreathingRoom) * room(K::CpuLimitBreathingRoom);
        sized.cpu_request = Some(request.max(MIN_CPU_CORES));
        sized.cpu_limit = Some(limit.max(MIN_CPU_CORES));
    }

    if !memory.is_empty() {
        let floor = |bytes: f64| if bytes == 0.0 { DEFAULT_MEMORY_BYTES } else { bytes };
        let request =
            trimmed_mean(&memory, TRIM_FRACTION)? * room(K::MemoryBreathingRoom) * room(K::MemoryRequestBreathingRoom);
        let peak = max_sample(series.get(metrics::MEMORY)).unwrap_or(request);
        let limit = peak * room(K::MemoryBreathingRoom) * room(K::MemoryLimitBreathingRoom);
        sized.memory_request = Some(floor(request));
        sized.memory_limit = Some(floor(limit));
    }

    sized.cpu_request = raise_to(
        sized.cpu_request,
        minimum(prefs, K::MinCpuRequest, current.cpu_request, parse_cpu_quantity)?,
    );
    sized.cpu_limit = raise_to(
        sized.cpu_limit,
        minimum(prefs, K::MinCpuLimit, current.cpu_limit, parse_cpu_quantity)?,
    );
    sized.memory_request = raise_to(
        sized.memory_request,
        minimum(prefs, K::MinMemoryRequest, current.memory_request, parse_memory_quantity)?,
    );
    sized.memory_limit = raise_to(
        sized.memory_limit,
        minimum(prefs, K::MinMemoryLimit, current.memory_limit, parse_memory_quantity)?,
    );

    // A limit below its request is rejected by the API server
    sized.cpu_limit = raise_to(sized.cpu_limit, sized.cpu_request.filter(|_| sized.cpu_limit.is_some()));
    sized.memory_limit = raise_to(
        sized.memory_limit,
        sized.memory_request.filter(|_| sized.memory_limit.is_some()),
    );

    Ok(Some(sized))
}

impl RightsizingEngine {
    /// Requests and limits for every container of one pod
    pub async fn optimize_kubernetes_pod(
        &self,
        request: &KubernetesPodRequest,
    ) -> Result<PodRecommendation> {
        self.observe(
            ResourceKind::KubernetesPod,
            &request.resource_id(),
            self.recommend_pod(request, ResourceKind::KubernetesPod, true),
        )
        .await
    }

    /// Size every container; `explain` is off for replicas whose text is
    /// overwritten by the workload-level result anyway
    pub(super) async fn recommend_pod(
        &self,
        request: &KubernetesPodRequest,
        kind: ResourceKind,
        explain: bool,
    ) -> Result<PodRecommendation> {
        let prefs = Preferences::parse(&request.preferences)?;
        let resource_id = request.resource_id();

        let mut containers = Vec::with_capacity(request.containers.len());
        for container in &request.containers {
            let current = ContainerProfile::from_container(container)?;
            let usage = ContainerUsage {
                cpu: container.metrics.usage(metrics::CPU, UsagePolicy::Max),
                memory: container.metrics.usage(metrics::MEMORY, UsagePolicy::Max),
            };
            let recommended = size_container(&container.metrics, &current, &prefs)?;

            self.logger.log_container_sizing(
                &resource_id,
                &container.name,
                &current.label(),
                recommended.as_ref().map(ContainerProfile::label).as_deref(),
            );

            let description = if explain {
                self.explain(ExplainRequest {
                    resource_kind: kind,
                    resource_id: format!("{}/{}", resource_id, container.name),
                    current: serde_json::to_value(&current).unwrap_or_default(),
                    recommended: recommended
                        .as_ref()
                        .map(|r| serde_json::to_value(r).unwrap_or_default()),
                    usage_narrative: super::narrative([
                        super::narrate("cpu", &usage.cpu, "cores"),
                        super::narrate("memory", &usage.memory, "bytes"),
                    ]),
                    honored_preferences: prefs.honored(),
                })
                .await
            } else {
                String::new()
            };

            containers.push(ContainerRecommendation {
                name: container.name.clone(),
                current,
                recommended,
                usage,
                description,
            });
        }

        Ok(PodRecommendation {
            namespace: request.namespace.clone(),
            name: request.name.clone(),
            containers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Datapoint;
    use chrono::{DateTime, Duration};

    fn series(name: &str, values: &[f64]) -> MetricSeries {
        let start = DateTime::from_timestamp(0, 0).unwrap();
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| Datapoint::average(start + Duration::minutes(i as i64), *v))
            .collect();
        MetricSeries::new().with(name, points)
    }

    #[test]
    fn test_parse_cpu_quantity() {
        assert_eq!(parse_cpu_quantity("500m"), Some(0.5));
        assert_eq!(parse_cpu_quantity("2"), Some(2.0));
        assert_eq!(parse_cpu_quantity(" 1.5 "), Some(1.5));
        assert_eq!(parse_cpu_quantity("lots"), None);
        assert_eq!(parse_cpu_quantity(""), None);
    }

    #[test]
    fn test_parse_memory_quantity() {
        assert_eq!(parse_memory_quantity("256Mi"), Some(268_435_456.0));
        assert_eq!(parse_memory_quantity("1G"), Some(1e9));
        assert_eq!(parse_memory_quantity("1024"), Some(1024.0));
        assert_eq!(parse_memory_quantity("12Q"), None);
    }

    #[test]
    fn test_invalid_quantity_names_container() {
        let container = KubernetesContainer {
            name: "web".to_string(),
            cpu_request: Some("a lot".to_string()),
            cpu_limit: None,
            memory_request: None,
            memory_limit: None,
            metrics: MetricSeries::new(),
        };
        let err = ContainerProfile::from_container(&container).unwrap_err();
        assert!(err.is_input());
        assert!(err.to_string().contains("web"));
    }

    #[test]
    fn test_no_metrics_means_no_recommendation() {
        let sized = size_container(&MetricSeries::new(), &ContainerProfile::default(), &Preferences::new()).unwrap();
        assert!(sized.is_none());
    }

    #[test]
    fn test_cpu_request_is_trimmed_mean_and_limit_is_peak() {
        let mut values = vec![0.5; 18];
        values.push(0.0);
        values.push(4.0);
        let sized = size_container(&series(metrics::CPU, &values), &ContainerProfile::default(), &Preferences::new())
            .unwrap()
            .unwrap();

        assert!((sized.cpu_request.unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(sized.cpu_limit, Some(4.0));
        assert_eq!(sized.memory_request, None);
    }

    #[test]
    fn test_floors() {
        let cpu = series(metrics::CPU, &[0.01, 0.02]);
        let sized = size_container(&cpu, &ContainerProfile::default(), &Preferences::new())
            .unwrap()
            .unwrap();
        assert_eq!(sized.cpu_request, Some(MIN_CPU_CORES));
        assert_eq!(sized.cpu_limit, Some(MIN_CPU_CORES));

        let memory = series(metrics::MEMORY, &[0.0, 0.0]);
        let sized = size_container(&memory, &ContainerProfile::default(), &Preferences::new())
            .unwrap()
            .unwrap();
        assert_eq!(sized.memory_request, Some(DEFAULT_MEMORY_BYTES));
        assert_eq!(sized.memory_limit, Some(DEFAULT_MEMORY_BYTES));
    }

    #[test]
    fn test_breathing_rooms_multiply() {
        let prefs = Preferences::new()
            .pin(PreferenceKey::CpuBreathingRoom, "100")
            .unwrap()
            .pin(PreferenceKey::CpuRequestBreathingRoom, "50")
            .unwrap();
        let sized = size_container(&series(metrics::CPU, &[1.0, 1.0]), &ContainerProfile::default(), &prefs)
            .unwrap()
            .unwrap();

        assert!((sized.cpu_request.unwrap() - 3.0).abs() < 1e-9);
        // Peak with room is 2.0, lifted to the request
        assert!((sized.cpu_limit.unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_minimums_apply_last() {
        let prefs = Preferences::new()
            .pin(PreferenceKey::MinCpuRequest, "250m")
            .unwrap()
            .pin(PreferenceKey::MinMemoryLimit, "1Gi")
            .unwrap();
        let mut metrics_in = series(metrics::CPU, &[0.01]);
        metrics_in.insert(metrics::MEMORY, series(metrics::MEMORY, &[1024.0]).get(metrics::MEMORY).to_vec());

        let sized = size_container(&metrics_in, &ContainerProfile::default(), &prefs)
            .unwrap()
            .unwrap();
        assert_eq!(sized.cpu_request, Some(0.25));
        assert_eq!(sized.cpu_limit, Some(0.25));
        assert_eq!(sized.memory_limit, Some(1024f64.powi(3)));
    }

    #[test]
    fn test_invalid_minimum_names_key() {
        let prefs = Preferences::new()
            .pin(PreferenceKey::MinCpuLimit, "fast")
            .unwrap();
        let err = size_container(&series(metrics::CPU, &[1.0]), &ContainerProfile::default(), &prefs).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPreference { ref key, .. } if key == "MinCpuLimit"));
    }

    #[test]
    fn test_label() {
        let profile = ContainerProfile {
            cpu_request: Some(0.5),
            cpu_limit: None,
            memory_request: Some(256.0 * 1024.0 * 1024.0),
            memory_limit: None,
        };
        assert_eq!(profile.label(), "cpu 500m/- memory 256Mi/-");
    }
}
