//! RDS instance recommender
//!
//! Sizes the instance class from CPU and free memory, and the storage from
//! free space and I/O. Aurora engines keep their storage as is: Aurora
//! storage is cluster-managed and has no per-instance size to pick.

use super::{
    apply_preferences, constrain_unless_pinned, narrate, narrative, needed_capacity,
    numeric_preference, volume_baseline, with_headroom, ColumnMapping, PricedResource,
    RightsizingEngine,
};
use crate::catalog::{columns, CatalogEntry, CatalogKind, ConstraintSet, Operator};
use crate::error::{EngineError, Result};
use crate::models::{MetricSeries, ResourceKind, RightsizingRecommendation, Usage};
use crate::preferences::{PreferenceKey, Preferences};
use crate::services::CostQuery;
use crate::timeseries::{extract_usage, UsagePolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// CloudWatch metric names read by this recommender
pub mod metrics {
    /// Percent of allocated vCPU
    pub const CPU_UTILIZATION: &str = "CPUUtilization";
    /// Bytes
    pub const FREEABLE_MEMORY: &str = "FreeableMemory";
    /// Bytes
    pub const FREE_STORAGE_SPACE: &str = "FreeStorageSpace";
    /// Operations per second
    pub const READ_IOPS: &str = "ReadIOPS";
    pub const WRITE_IOPS: &str = "WriteIOPS";
    /// Bytes per second
    pub const READ_THROUGHPUT: &str = "ReadThroughput";
    pub const WRITE_THROUGHPUT: &str = "WriteThroughput";
    pub const NETWORK_RECEIVE_THROUGHPUT: &str = "NetworkReceiveThroughput";
    pub const NETWORK_TRANSMIT_THROUGHPUT: &str = "NetworkTransmitThroughput";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RdsStorageProfile {
    pub storage_type: String,
    pub size_gb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_iops: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_throughput_mbps: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RdsInstanceProfile {
    pub instance_class: String,
    pub engine: String,
    pub deployment_option: String,
    pub region: String,
    pub vcpu: f64,
    pub memory_gb: f64,
    pub storage: RdsStorageProfile,
}

impl PricedResource for RdsInstanceProfile {
    fn label(&self) -> String {
        format!(
            "{} {} {}GB",
            self.instance_class, self.storage.storage_type, self.storage.size_gb
        )
    }

    fn cost_query(&self) -> CostQuery {
        CostQuery::RdsInstance(self.clone())
    }
}

/// One RDS instance to rightsize
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RdsInstanceRequest {
    pub db_instance_id: String,
    pub instance_class: String,
    pub engine: String,
    /// `Single-AZ` or `Multi-AZ`
    #[serde(default = "default_deployment_option")]
    pub deployment_option: String,
    pub region: String,
    pub storage_type: String,
    pub storage_size_gb: f64,
    #[serde(default)]
    pub storage_iops: Option<f64>,
    #[serde(default)]
    pub storage_throughput_mbps: Option<f64>,
    #[serde(default)]
    pub metrics: MetricSeries,
    #[serde(default)]
    pub preferences: HashMap<String, Option<String>>,
}

fn default_deployment_option() -> String {
    "Single-AZ".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RdsInstanceUsage {
    pub cpu: Usage,
    pub freeable_memory: Usage,
    pub free_storage: Usage,
    pub iops: Usage,
    pub throughput: Usage,
    pub network: Usage,
}

pub type RdsInstanceRecommendation = RightsizingRecommendation<RdsInstanceProfile, RdsInstanceUsage>;

/// Lowest observed value: per-datapoint minima when reported, else averages
fn lowest(series: &MetricSeries, name: &str) -> Option<f64> {
    series
        .usage(name, UsagePolicy::Max)
        .min
        .or_else(|| series.usage(name, UsagePolicy::Average).min)
}

fn is_aurora(engine: &str) -> bool {
    engine.trim().to_ascii_lowercase().starts_with("aurora")
}

impl RightsizingEngine {
    /// Cheapest instance class and storage covering observed demand
    pub async fn optimize_rds_instance(
        &self,
        request: &RdsInstanceRequest,
    ) -> Result<RdsInstanceRecommendation> {
        self.observe(
            ResourceKind::RdsInstance,
            &request.db_instance_id,
            self.recommend_rds_instance(request),
        )
        .await
    }

    async fn recommend_rds_instance(
        &self,
        request: &RdsInstanceRequest,
    ) -> Result<RdsInstanceRecommendation> {
        use PreferenceKey as K;

        let prefs = Preferences::parse(&request.preferences)?;

        let mut lookup = ConstraintSet::new();
        lookup.set(columns::INSTANCE_TYPE, request.instance_class.as_str())?;
        lookup.set(columns::REGION, request.region.as_str())?;
        lookup.set(columns::DATABASE_ENGINE, request.engine.as_str())?;
        let entry = self
            .lookup_current(
                CatalogKind::RdsInstanceTypes,
                &lookup,
                "rds instance",
                &request.instance_class,
            )
            .await?;

        let baseline = volume_baseline(&request.storage_type, request.storage_size_gb);
        let current_storage = RdsStorageProfile {
            storage_type: request.storage_type.clone(),
            size_gb: request.storage_size_gb,
            provisioned_iops: baseline.provisioned_iops(request.storage_iops.unwrap_or(0.0)),
            provisioned_throughput_mbps: baseline
                .provisioned_throughput(request.storage_throughput_mbps.unwrap_or(0.0)),
        };
        let current = instance_profile(&entry, request, current_storage.clone())?;

        let m = &request.metrics;
        let usage = RdsInstanceUsage {
            cpu: m.usage(metrics::CPU_UTILIZATION, UsagePolicy::Max),
            freeable_memory: m.usage(metrics::FREEABLE_MEMORY, UsagePolicy::Max),
            free_storage: m.usage(metrics::FREE_STORAGE_SPACE, UsagePolicy::Max),
            iops: extract_usage(
                &m.merged_sum(&[metrics::READ_IOPS, metrics::WRITE_IOPS]),
                UsagePolicy::Average,
            ),
            throughput: extract_usage(
                &m.merged_sum(&[metrics::READ_THROUGHPUT, metrics::WRITE_THROUGHPUT]),
                UsagePolicy::Average,
            ),
            network: extract_usage(
                &m.merged_sum(&[
                    metrics::NETWORK_RECEIVE_THROUGHPUT,
                    metrics::NETWORK_TRANSMIT_THROUGHPUT,
                ]),
                UsagePolicy::Average,
            ),
        };

        let needed_vcpu = usage
            .cpu
            .avg
            .map(|pct| needed_capacity(current.vcpu, pct / 100.0, prefs.breathing_room(K::CpuBreathingRoom)))
            .unwrap_or(current.vcpu);
        // Absolute subtraction: lowest free memory observed is the peak in use
        let needed_memory = lowest(m, metrics::FREEABLE_MEMORY)
            .map(|free_bytes| {
                let used = (current.memory_gb - free_bytes / BYTES_PER_GB).max(0.0);
                with_headroom(used, prefs.breathing_room(K::MemoryBreathingRoom))
            })
            .unwrap_or(current.memory_gb);

        let mut constraints = ConstraintSet::new()
            .with_operator(columns::VCPU, Operator::Gte)
            .with_operator(columns::MEMORY_GB, Operator::Gte)
            .with_operator(columns::NETWORK_THROUGHPUT_BPS, Operator::Gte);

        apply_preferences(
            &prefs,
            &[
                ColumnMapping::new(K::Region, columns::REGION, Some(request.region.clone())),
                ColumnMapping::new(K::Engine, columns::DATABASE_ENGINE, Some(request.engine.clone())),
                ColumnMapping::new(
                    K::ClusterType,
                    columns::DEPLOYMENT_OPTION,
                    Some(request.deployment_option.clone()),
                ),
                ColumnMapping::new(
                    K::InstanceFamily,
                    columns::INSTANCE_FAMILY,
                    entry.text(columns::INSTANCE_FAMILY),
                ),
                ColumnMapping::new(
                    K::ProcessorArchitecture,
                    columns::PROCESSOR_ARCHITECTURE,
                    entry.text(columns::PROCESSOR_ARCHITECTURE),
                ),
                ColumnMapping::new(K::LicenseModel, columns::LICENSE_MODEL, entry.text(columns::LICENSE_MODEL)),
                ColumnMapping::new(
                    K::CurrentGeneration,
                    columns::CURRENT_GENERATION,
                    entry.text(columns::CURRENT_GENERATION),
                ),
                ColumnMapping::number(K::Vcpu, columns::VCPU, Some(current.vcpu)),
                ColumnMapping::number(K::MemoryGb, columns::MEMORY_GB, Some(current.memory_gb)),
            ],
            &mut constraints,
        )?;
        if !prefs.is_set(K::Region) {
            constraints.set(columns::REGION, request.region.as_str())?;
        }
        if !prefs.is_set(K::Engine) {
            constraints.set(columns::DATABASE_ENGINE, request.engine.as_str())?;
        }
        if !prefs.is_set(K::ClusterType) {
            constraints.set(columns::DEPLOYMENT_OPTION, request.deployment_option.as_str())?;
        }
        constrain_unless_pinned(&prefs, K::Vcpu, columns::VCPU, Some(needed_vcpu), &mut constraints)?;
        constrain_unless_pinned(&prefs, K::MemoryGb, columns::MEMORY_GB, Some(needed_memory), &mut constraints)?;
        let network_bps = usage
            .network
            .avg
            .map(|bytes| with_headroom(bytes * 8.0, prefs.breathing_room(K::NetworkBreathingRoom)));
        constrain_unless_pinned(
            &prefs,
            K::NetworkThroughput,
            columns::NETWORK_THROUGHPUT_BPS,
            network_bps.filter(|bps| *bps > 0.0),
            &mut constraints,
        )?;

        debug!(
            db_instance_id = %request.db_instance_id,
            needed_vcpu = needed_vcpu,
            needed_memory_gb = needed_memory,
            "Computed RDS instance needs"
        );

        let Some(found) = self
            .search(CatalogKind::RdsInstanceTypes, &constraints, None)
            .await?
        else {
            return self
                .finish_rds(request, current, None, usage, &prefs)
                .await;
        };

        let storage = if is_aurora(&request.engine) {
            debug!(engine = %request.engine, "Aurora storage is cluster-managed, keeping current");
            current_storage
        } else {
            self.recommend_rds_storage(request, &usage, &prefs)
                .await?
                .unwrap_or(current_storage)
        };
        let recommended = instance_profile(&found, request, storage)?;

        self.finish_rds(request, current, Some(recommended), usage, &prefs)
            .await
    }

    /// Cheapest storage type for the needed size and I/O; `None` on a miss
    async fn recommend_rds_storage(
        &self,
        request: &RdsInstanceRequest,
        usage: &RdsInstanceUsage,
        prefs: &Preferences,
    ) -> Result<Option<RdsStorageProfile>> {
        use PreferenceKey as K;

        let needed_size = match numeric_preference(prefs, K::StorageSize, Some(request.storage_size_gb))? {
            Some(pinned) => pinned,
            None => lowest(&request.metrics, metrics::FREE_STORAGE_SPACE)
                .map(|free_bytes| {
                    let used = (request.storage_size_gb - free_bytes / BYTES_PER_GB).max(0.0);
                    with_headroom(used, prefs.breathing_room(K::SizeBreathingRoom))
                })
                .unwrap_or(request.storage_size_gb),
        }
        .ceil()
        .max(1.0);
        let needed_iops = with_headroom(
            usage.iops.avg.unwrap_or(0.0),
            prefs.breathing_room(K::IopsBreathingRoom),
        );
        let needed_throughput = with_headroom(
            usage.throughput.avg.unwrap_or(0.0) / 1_000_000.0,
            prefs.breathing_room(K::ThroughputBreathingRoom),
        );

        let mut constraints = ConstraintSet::new()
            .with_operator(columns::MAX_SIZE_GB, Operator::Gte)
            .with_operator(columns::MIN_SIZE_GB, Operator::Lte)
            .with_operator(columns::MAX_IOPS, Operator::Gte)
            .with_operator(columns::MAX_THROUGHPUT_MBPS, Operator::Gte);
        apply_preferences(
            prefs,
            &[
                ColumnMapping::new(K::Region, columns::REGION, Some(request.region.clone())),
                ColumnMapping::new(K::StorageType, columns::VOLUME_TYPE, Some(request.storage_type.clone())),
            ],
            &mut constraints,
        )?;
        if !prefs.is_set(K::Region) {
            constraints.set(columns::REGION, request.region.as_str())?;
        }
        constraints.set_number(columns::MAX_SIZE_GB, needed_size)?;
        constraints.set_number(columns::MIN_SIZE_GB, needed_size)?;
        if needed_iops > 0.0 {
            constraints.set_number(columns::MAX_IOPS, needed_iops)?;
        }
        if needed_throughput > 0.0 {
            constraints.set_number(columns::MAX_THROUGHPUT_MBPS, needed_throughput)?;
        }

        let found = self
            .search(CatalogKind::RdsStorageTypes, &constraints, None)
            .await?;
        Ok(found.map(|entry| {
            let storage_type = entry
                .text(columns::VOLUME_TYPE)
                .unwrap_or_else(|| entry.id.clone());
            let baseline = volume_baseline(&storage_type, needed_size);
            RdsStorageProfile {
                provisioned_iops: baseline.provisioned_iops(needed_iops),
                provisioned_throughput_mbps: baseline.provisioned_throughput(needed_throughput),
                storage_type,
                size_gb: needed_size,
            }
        }))
    }

    async fn finish_rds(
        &self,
        request: &RdsInstanceRequest,
        current: RdsInstanceProfile,
        recommended: Option<RdsInstanceProfile>,
        usage: RdsInstanceUsage,
        prefs: &Preferences,
    ) -> Result<RdsInstanceRecommendation> {
        let story = narrative([
            narrate("CPU", &usage.cpu, "%"),
            narrate("freeable memory", &usage.freeable_memory, "bytes"),
            narrate("free storage", &usage.free_storage, "bytes"),
            narrate("IOPS", &usage.iops, "ops/s"),
            narrate("throughput", &usage.throughput, "bytes/s"),
            narrate("network", &usage.network, "bytes/s"),
        ]);
        self.assemble(
            ResourceKind::RdsInstance,
            &request.db_instance_id,
            current,
            recommended,
            usage,
            story,
            prefs,
        )
        .await
    }
}

fn instance_profile(
    entry: &CatalogEntry,
    request: &RdsInstanceRequest,
    storage: RdsStorageProfile,
) -> Result<RdsInstanceProfile> {
    let number = |column: &str| {
        entry.number(column).ok_or_else(|| {
            EngineError::CatalogUnavailable(format!("entry {} has no {}", entry.id, column))
        })
    };
    Ok(RdsInstanceProfile {
        instance_class: entry
            .text(columns::INSTANCE_TYPE)
            .unwrap_or_else(|| entry.id.clone()),
        engine: entry
            .text(columns::DATABASE_ENGINE)
            .unwrap_or_else(|| request.engine.clone()),
        deployment_option: entry
            .text(columns::DEPLOYMENT_OPTION)
            .unwrap_or_else(|| request.deployment_option.clone()),
        region: entry
            .text(columns::REGION)
            .unwrap_or_else(|| request.region.clone()),
        vcpu: number(columns::VCPU)?,
        memory_gb: number(columns::MEMORY_GB)?,
        storage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::Datapoint;
    use chrono::DateTime;

    #[test]
    fn test_lowest_prefers_reported_minimum() {
        let t = DateTime::from_timestamp(0, 0).unwrap();
        let series = MetricSeries::new()
            .with(metrics::FREEABLE_MEMORY, vec![Datapoint::stats(t, 4.0, 1.0, 6.0)])
            .with(metrics::FREE_STORAGE_SPACE, vec![
                Datapoint::average(t, 30.0),
                Datapoint::average(t + chrono::Duration::minutes(5), 20.0),
            ]);
        assert_eq!(lowest(&series, metrics::FREEABLE_MEMORY), Some(1.0));
        assert_eq!(lowest(&series, metrics::FREE_STORAGE_SPACE), Some(20.0));
        assert_eq!(lowest(&series, "missing"), None);
    }

    #[test]
    fn test_is_aurora() {
        assert!(is_aurora("aurora-postgresql"));
        assert!(is_aurora("Aurora-MySQL"));
        assert!(!is_aurora("postgres"));
    }
}
