//! Core data models shared by every recommender

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One sampled observation of a metric.
///
/// Every statistic is optional: telemetry sources frequently report only
/// some of them, and a missing field must stay missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<f64>,
}

impl Datapoint {
    /// Datapoint carrying only an average, the common shape for gauges
    pub fn average(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            average: Some(value),
            minimum: None,
            maximum: None,
            sum: None,
            sample_count: None,
        }
    }

    /// Datapoint carrying average, minimum and maximum
    pub fn stats(timestamp: DateTime<Utc>, average: f64, minimum: f64, maximum: f64) -> Self {
        Self {
            timestamp,
            average: Some(average),
            minimum: Some(minimum),
            maximum: Some(maximum),
            sum: None,
            sample_count: None,
        }
    }
}

/// Named metric streams for one resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSeries(BTreeMap<String, Vec<Datapoint>>);

impl MetricSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, datapoints: Vec<Datapoint>) {
        self.0.insert(name.into(), datapoints);
    }

    pub fn with(mut self, name: impl Into<String>, datapoints: Vec<Datapoint>) -> Self {
        self.insert(name, datapoints);
        self
    }

    /// Datapoints of one stream, empty when the stream is absent
    pub fn get(&self, name: &str) -> &[Datapoint] {
        self.0.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

impl FromIterator<(String, Vec<Datapoint>)> for MetricSeries {
    fn from_iter<I: IntoIterator<Item = (String, Vec<Datapoint>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Summary of a metric stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub min: Option<f64>,
    pub avg: Option<f64>,
    pub max: Option<f64>,
    /// Most recent raw datapoint, kept for traceability
    pub last: Option<Datapoint>,
}

impl Usage {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.avg.is_none() && self.max.is_none() && self.last.is_none()
    }
}

/// Resource kinds the engine can rightsize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Ec2Instance,
    EbsVolume,
    RdsInstance,
    GcpInstance,
    GcpDisk,
    KubernetesPod,
    KubernetesDeployment,
    KubernetesStatefulSet,
    KubernetesDaemonSet,
    KubernetesJob,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ec2Instance => "ec2_instance",
            Self::EbsVolume => "ebs_volume",
            Self::RdsInstance => "rds_instance",
            Self::GcpInstance => "gcp_instance",
            Self::GcpDisk => "gcp_disk",
            Self::KubernetesPod => "kubernetes_pod",
            Self::KubernetesDeployment => "kubernetes_deployment",
            Self::KubernetesStatefulSet => "kubernetes_statefulset",
            Self::KubernetesDaemonSet => "kubernetes_daemonset",
            Self::KubernetesJob => "kubernetes_job",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A technical profile together with its quoted cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedProfile<P> {
    #[serde(flatten)]
    pub profile: P,
    pub cost: f64,
}

/// Outcome of one rightsizing call.
///
/// `recommended` is absent when no cheaper or better fitting configuration
/// was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RightsizingRecommendation<P, U> {
    pub current: PricedProfile<P>,
    pub recommended: Option<PricedProfile<P>>,
    pub usage: U,
    pub description: String,
}

impl<P, U> RightsizingRecommendation<P, U> {
    pub fn has_recommendation(&self) -> bool {
        self.recommended.is_some()
    }

    /// Cost difference between current and recommended, zero without a recommendation
    pub fn savings(&self) -> f64 {
        self.recommended
            .as_ref()
            .map(|r| self.current.cost - r.cost)
            .unwrap_or(0.0)
    }
}
