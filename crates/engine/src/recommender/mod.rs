//! Per-resource recommenders
//!
//! Every catalog-backed recommender runs the same four stages:
//!
//! 1. extract usage from the metric series (sum-merging read/write and
//!    in/out pairs first)
//! 2. compute needed capacity: `current × observed fraction × (1 + breathing room)`
//! 3. assemble constraints: explicit preferences first, then implicit
//!    capacity constraints for fields the user did not pin
//! 4. search the catalog, quote current and recommended configurations, and
//!    ask for a best-effort explanation
//!
//! Kubernetes containers skip the catalog and are sized from their own
//! samples (see [`kubernetes`]).

mod batch;
mod ebs;
mod ec2;
mod gcp;
mod kubernetes;
mod rds;
mod workload;


pub use batch::{
    BatchOutcome, Ec2WithVolumesRecommendation, Ec2WithVolumesRequest,
    GcpInstanceWithDisksRecommendation, GcpInstanceWithDisksRequest, ItemFailure,
};
pub use ebs::{
    volume_baseline, EbsVolumeProfile, EbsVolumeRecommendation, EbsVolumeRequest, EbsVolumeUsage,
    VolumeBaseline,
};
pub use ec2::{
    is_burstable, BurstablePolicy, Ec2InstanceProfile, Ec2InstanceRecommendation,
    Ec2InstanceRequest, Ec2InstanceUsage,
};
pub use gcp::{
    GcpDiskProfile, GcpDiskRecommendation, GcpDiskRequest, GcpDiskUsage, GcpInstanceProfile,
    GcpInstanceRecommendation, GcpInstanceRequest, GcpInstanceUsage,
};
pub use kubernetes::{
    parse_cpu_quantity, parse_memory_quantity, ContainerProfile, ContainerRecommendation,
    ContainerUsage, KubernetesContainer, KubernetesPodRequest, PodRecommendation,
};
pub use rds::{
    RdsInstanceProfile, RdsInstanceRecommendation, RdsInstanceRequest, RdsInstanceUsage,
    RdsStorageProfile,
};
pub use workload::{KubernetesWorkloadRequest, WorkloadKind, WorkloadRecommendation};

use crate::catalog::{CapacityFloor, CatalogEntry, CatalogKind, CatalogRepository, ConstraintSet};
use crate::error::{EngineError, Result};
use crate::health::{components, HealthRegistry};
use crate::limits::GcpDiskLimits;
use crate::models::{PricedProfile, ResourceKind, RightsizingRecommendation, Usage};
use crate::observability::{EngineMetrics, Outcome, RecommendationLogger};
use crate::preferences::{PreferenceKey, Preferences};
use crate::services::{CostQuery, CostQuoter, DisabledExplainer, ExplainRequest, Explainer};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Engine-wide settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for one explanation call
    pub explain_timeout: Duration,
    /// Reported in structured log events
    pub node_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            explain_timeout: Duration::from_secs(10),
            node_name: "unknown".to_string(),
        }
    }
}

/// Stateless rightsizing engine.
///
/// Holds read-only collaborators behind `Arc`; cloning is cheap and every
/// clone can serve requests concurrently.
#[derive(Clone)]
pub struct RightsizingEngine {
    catalog: Arc<dyn CatalogRepository>,
    cost: Arc<dyn CostQuoter>,
    explainer: Arc<dyn Explainer>,
    disk_limits: Arc<GcpDiskLimits>,
    config: EngineConfig,
    metrics: EngineMetrics,
    logger: RecommendationLogger,
    health: HealthRegistry,
}

/// Builder for [`RightsizingEngine`]
#[derive(Default)]
pub struct EngineBuilder {
    catalog: Option<Arc<dyn CatalogRepository>>,
    cost: Option<Arc<dyn CostQuoter>>,
    explainer: Option<Arc<dyn Explainer>>,
    disk_limits: Option<Arc<GcpDiskLimits>>,
    config: EngineConfig,
    health: Option<HealthRegistry>,
}

impl EngineBuilder {
    pub fn catalog(mut self, catalog: Arc<dyn CatalogRepository>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn cost_quoter(mut self, cost: Arc<dyn CostQuoter>) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Defaults to [`DisabledExplainer`]
    pub fn explainer(mut self, explainer: Arc<dyn Explainer>) -> Self {
        self.explainer = Some(explainer);
        self
    }

    /// Defaults to [`GcpDiskLimits::builtin`]
    pub fn disk_limits(mut self, limits: Arc<GcpDiskLimits>) -> Self {
        self.disk_limits = Some(limits);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn health_registry(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<RightsizingEngine> {
        let catalog = self
            .catalog
            .ok_or_else(|| EngineError::InvalidInput("engine requires a catalog".to_string()))?;
        let cost = self
            .cost
            .ok_or_else(|| EngineError::InvalidInput("engine requires a cost quoter".to_string()))?;

        Ok(RightsizingEngine {
            catalog,
            cost,
            explainer: self.explainer.unwrap_or_else(|| Arc::new(DisabledExplainer)),
            disk_limits: self
                .disk_limits
                .unwrap_or_else(|| Arc::new(GcpDiskLimits::builtin())),
            logger: RecommendationLogger::new(self.config.node_name.clone()),
            config: self.config,
            metrics: EngineMetrics::new(),
            health: self.health.unwrap_or_default(),
        })
    }
}

/// A priced technical profile that the cost service understands
pub trait PricedResource: Clone + Serialize + Send + Sync {
    /// Short human label, e.g. the instance type
    fn label(&self) -> String;

    fn cost_query(&self) -> CostQuery;
}

/// Anything that may or may not carry a recommended configuration
pub trait Recommendation {
    fn has_recommendation(&self) -> bool;
}

impl<P, U> Recommendation for RightsizingRecommendation<P, U> {
    fn has_recommendation(&self) -> bool {
        self.recommended.is_some()
    }
}

impl RightsizingEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn disk_limits(&self) -> &GcpDiskLimits {
        &self.disk_limits
    }

    /// Time a call and count its outcome
    async fn observe<T, F>(&self, kind: ResourceKind, resource_id: &str, call: F) -> Result<T>
    where
        T: Recommendation,
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = call.await;
        self.metrics
            .observe_latency(kind.as_str(), started.elapsed().as_secs_f64());

        match &result {
            Ok(rec) if rec.has_recommendation() => {
                self.metrics.inc_recommendation(kind.as_str(), Outcome::Recommended)
            }
            Ok(_) => self
                .metrics
                .inc_recommendation(kind.as_str(), Outcome::CurrentOnly),
            Err(e) => {
                self.metrics.inc_recommendation(kind.as_str(), Outcome::Failed);
                self.logger
                    .log_failure(kind.as_str(), resource_id, &e.to_string());
            }
        }
        result
    }

    /// Cheapest-fit search; a miss is counted, not raised
    async fn search(
        &self,
        kind: CatalogKind,
        constraints: &ConstraintSet,
        floor: Option<&CapacityFloor>,
    ) -> Result<Option<CatalogEntry>> {
        let result = self.catalog.cheapest_fit(kind, constraints, floor).await;
        self.health
            .record(components::CATALOG, result.as_ref().err())
            .await;

        let found = result?;
        if found.is_none() {
            self.metrics.inc_catalog_miss(kind.as_str());
            debug!(catalog = %kind, constraints = %constraints, "No catalog entry fits");
        }
        Ok(found)
    }

    /// Technical profile of the current resource
    async fn lookup_current(
        &self,
        kind: CatalogKind,
        constraints: &ConstraintSet,
        resource: &str,
        id: &str,
    ) -> Result<CatalogEntry> {
        let result = self.catalog.find_first(kind, constraints).await;
        self.health
            .record(components::CATALOG, result.as_ref().err())
            .await;

        result?.ok_or_else(|| EngineError::UnknownResourceType {
            kind: resource.to_string(),
            id: id.to_string(),
        })
    }

    async fn quote<P: PricedResource>(&self, profile: &P) -> Result<f64> {
        let result = self.cost.quote(&profile.cost_query()).await;
        self.health
            .record(components::COST_SERVICE, result.as_ref().err())
            .await;
        result
    }

    /// Best-effort explanation; any failure yields an empty description
    async fn explain(&self, request: ExplainRequest) -> String {
        let kind = request.resource_kind.as_str();
        let outcome =
            match tokio::time::timeout(self.config.explain_timeout, self.explainer.explain(&request))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(EngineError::Timeout("explanation".to_string())),
            };

        match outcome {
            Ok(text) => {
                self.health.record(components::EXPLAINER, None).await;
                text
            }
            Err(e) => {
                self.metrics.inc_explanation_failure();
                self.health.record(components::EXPLAINER, Some(&e)).await;
                self.logger
                    .log_explanation_failure(kind, &request.resource_id, &e.to_string());
                String::new()
            }
        }
    }

    /// Quote both configurations, request an explanation and assemble the result
    #[allow(clippy::too_many_arguments)]
    async fn assemble<P, U>(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        current: P,
        recommended: Option<P>,
        usage: U,
        narrative: String,
        prefs: &Preferences,
    ) -> Result<RightsizingRecommendation<P, U>>
    where
        P: PricedResource,
    {
        let current_cost = self.quote(&current).await?;
        let recommended = match recommended {
            Some(profile) => {
                let cost = self.quote(&profile).await?;
                Some(PricedProfile { profile, cost })
            }
            None => None,
        };

        self.logger.log_recommendation(
            kind.as_str(),
            resource_id,
            &current.label(),
            recommended.as_ref().map(|r| r.profile.label()).as_deref(),
            current_cost,
            recommended.as_ref().map(|r| r.cost),
        );

        let description = self
            .explain(ExplainRequest {
                resource_kind: kind,
                resource_id: resource_id.to_string(),
                current: serde_json::to_value(&current).unwrap_or_default(),
                recommended: recommended
                    .as_ref()
                    .map(|r| serde_json::to_value(&r.profile).unwrap_or_default()),
                usage_narrative: narrative,
                honored_preferences: prefs.honored(),
            })
            .await;

        Ok(RightsizingRecommendation {
            current: PricedProfile {
                profile: current,
                cost: current_cost,
            },
            recommended,
            usage,
            description,
        })
    }
}

/// `current × observed fraction × (1 + breathing room)`
pub(crate) fn needed_capacity(current: f64, observed_fraction: f64, breathing_room: f64) -> f64 {
    with_headroom(current * observed_fraction, breathing_room)
}

pub(crate) fn with_headroom(value: f64, breathing_room: f64) -> f64 {
    value * (1.0 + breathing_room)
}

/// A preference that maps to a catalog column, with the current resource's value
pub(crate) struct ColumnMapping {
    pub key: PreferenceKey,
    pub column: &'static str,
    pub current: Option<String>,
}

impl ColumnMapping {
    pub fn new(key: PreferenceKey, column: &'static str, current: Option<String>) -> Self {
        Self {
            key,
            column,
            current,
        }
    }

    pub fn number(key: PreferenceKey, column: &'static str, current: Option<f64>) -> Self {
        Self::new(key, column, current.map(crate::catalog::format_number))
    }
}

/// Constrain every mapped preference the user set.
///
/// Literal values are used as given, derive resolves to the current value.
/// A value the column cannot take is reported against the preference key.
pub(crate) fn apply_preferences(
    prefs: &Preferences,
    mappings: &[ColumnMapping],
    constraints: &mut ConstraintSet,
) -> Result<()> {
    for mapping in mappings {
        if let Some(value) = prefs.resolve(mapping.key, mapping.current.clone()) {
            constraints
                .set(mapping.column, value)
                .map_err(|e| EngineError::invalid_preference(mapping.key.name(), e.to_string()))?;
        }
    }
    Ok(())
}

/// Implicit capacity constraint, skipped when the user pinned the field
pub(crate) fn constrain_unless_pinned(
    prefs: &Preferences,
    key: PreferenceKey,
    column: &str,
    needed: Option<f64>,
    constraints: &mut ConstraintSet,
) -> Result<()> {
    match needed {
        Some(value) if !prefs.is_set(key) => constraints.set_number(column, value),
        _ => Ok(()),
    }
}

/// A numeric preference: literal parsed, derive resolved to `current`
pub(crate) fn numeric_preference(
    prefs: &Preferences,
    key: PreferenceKey,
    current: Option<f64>,
) -> Result<Option<f64>> {
    match prefs.literal(key) {
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(Some)
            .ok_or_else(|| EngineError::invalid_preference(key.name(), format!("not a number: {:?}", raw))),
        None if prefs.is_set(key) => Ok(current),
        None => Ok(None),
    }
}

/// One line of the usage narrative handed to the explainer
pub(crate) fn narrate(label: &str, usage: &Usage, unit: &str) -> Option<String> {
    if usage.min.is_none() && usage.avg.is_none() && usage.max.is_none() {
        return None;
    }
    let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v));
    Some(format!(
        "{}: min {}, avg {}, max {} {}",
        label,
        fmt(usage.min),
        fmt(usage.avg),
        fmt(usage.max),
        unit
    ))
}

pub(crate) fn narrative(lines: impl IntoIterator<Item = Option<String>>) -> String {
    let lines: Vec<String> = lines.into_iter().flatten().collect();
    if lines.is_empty() {
        return "no usage data".to_string();
    }
    lines.join("; ")
}
