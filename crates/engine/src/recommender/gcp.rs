//! GCP Compute instance and persistent-disk recommenders
//!
//! Instances go through the machine-type catalog like EC2. Disks do not use
//! a catalog: the tier is picked by [`crate::limits::GcpDiskLimits::classify`] from the
//! attached VM's physical caps.

use super::{
    apply_preferences, constrain_unless_pinned, narrate, narrative, needed_capacity,
    numeric_preference, with_headroom, ColumnMapping, PricedResource, RightsizingEngine,
};
use crate::catalog::{columns, CatalogEntry, CatalogKind, ConstraintSet, Operator};
use crate::error::{EngineError, Result};
use crate::limits::{machine_family, DiskCaps, DiskQuery, DiskTier};
use crate::models::{MetricSeries, ResourceKind, RightsizingRecommendation, Usage};
use crate::preferences::{PreferenceKey, Preferences};
use crate::services::CostQuery;
use crate::timeseries::UsagePolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Cloud Monitoring metric names read by these recommenders
pub mod metrics {
    /// Fraction of allocated vCPU, 0.0 to 1.0
    pub const CPU_UTILIZATION: &str = "cpu_utilization";
    /// Percent of memory, reported by the Ops Agent
    pub const MEMORY_USED_PERCENT: &str = "memory_used_percent";
    /// Bytes per second
    pub const RECEIVED_BYTES: &str = "received_bytes_count";
    pub const SENT_BYTES: &str = "sent_bytes_count";

    /// Operations per second
    pub const DISK_READ_OPS: &str = "disk_read_ops_count";
    pub const DISK_WRITE_OPS: &str = "disk_write_ops_count";
    /// Bytes per second
    pub const DISK_READ_BYTES: &str = "disk_read_bytes_count";
    pub const DISK_WRITE_BYTES: &str = "disk_write_bytes_count";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcpInstanceProfile {
    pub machine_type: String,
    pub machine_family: String,
    pub region: String,
    pub vcpu: f64,
    pub memory_gb: f64,
}

impl GcpInstanceProfile {
    fn from_entry(entry: &CatalogEntry, region: &str) -> Result<Self> {
        let number = |column: &str| {
            entry.number(column).ok_or_else(|| {
                EngineError::CatalogUnavailable(format!("entry {} has no {}", entry.id, column))
            })
        };
        let machine_type = entry
            .text(columns::MACHINE_TYPE)
            .unwrap_or_else(|| entry.id.clone());

        Ok(Self {
            machine_family: entry
                .text(columns::MACHINE_FAMILY)
                .unwrap_or_else(|| machine_family(&machine_type).to_string()),
            region: entry
                .text(columns::REGION)
                .unwrap_or_else(|| region.to_string()),
            vcpu: number(columns::VCPU)?,
            memory_gb: number(columns::MEMORY_GB)?,
            machine_type,
        })
    }

    /// vCPU count as the limit tables index it
    fn vcpu_count(&self) -> u32 {
        self.vcpu.round().max(0.0) as u32
    }
}

impl PricedResource for GcpInstanceProfile {
    fn label(&self) -> String {
        self.machine_type.clone()
    }

    fn cost_query(&self) -> CostQuery {
        CostQuery::GcpInstance(self.clone())
    }
}

/// One Compute Engine instance to rightsize
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpInstanceRequest {
    pub instance_id: String,
    pub machine_type: String,
    pub region: String,
    #[serde(default)]
    pub metrics: MetricSeries,
    #[serde(default)]
    pub preferences: HashMap<String, Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcpInstanceUsage {
    pub cpu: Usage,
    pub memory: Usage,
    pub network: Usage,
}

pub type GcpInstanceRecommendation = RightsizingRecommendation<GcpInstanceProfile, GcpInstanceUsage>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcpDiskProfile {
    pub disk_type: DiskTier,
    pub size_gb: f64,
    pub region: String,
}

impl PricedResource for GcpDiskProfile {
    fn label(&self) -> String {
        format!("{} {}GB", self.disk_type, self.size_gb)
    }

    fn cost_query(&self) -> CostQuery {
        CostQuery::GcpDisk(self.clone())
    }
}

/// One persistent disk to rightsize, with the machine it is attached to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpDiskRequest {
    pub disk_id: String,
    pub disk_type: DiskTier,
    pub size_gb: f64,
    pub machine_type: String,
    pub region: String,
    #[serde(default)]
    pub metrics: MetricSeries,
    #[serde(default)]
    pub preferences: HashMap<String, Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcpDiskUsage {
    pub read_iops: Usage,
    pub write_iops: Usage,
    pub read_throughput: Usage,
    pub write_throughput: Usage,
}

pub type GcpDiskRecommendation = RightsizingRecommendation<GcpDiskProfile, GcpDiskUsage>;

impl GcpDiskUsage {
    fn from_metrics(m: &MetricSeries) -> Self {
        Self {
            read_iops: m.usage(metrics::DISK_READ_OPS, UsagePolicy::Average),
            write_iops: m.usage(metrics::DISK_WRITE_OPS, UsagePolicy::Average),
            read_throughput: m.usage(metrics::DISK_READ_BYTES, UsagePolicy::Average),
            write_throughput: m.usage(metrics::DISK_WRITE_BYTES, UsagePolicy::Average),
        }
    }

    /// Demand with headroom; absent streams need nothing
    fn needed(&self, prefs: &Preferences) -> DiskCaps {
        let iops_room = prefs.breathing_room(PreferenceKey::IopsBreathingRoom);
        let throughput_room = prefs.breathing_room(PreferenceKey::ThroughputBreathingRoom);
        let ops = |u: &Usage| with_headroom(u.avg.unwrap_or(0.0), iops_room);
        let mbps = |u: &Usage| with_headroom(u.avg.unwrap_or(0.0) / 1_000_000.0, throughput_room);

        DiskCaps::new(
            ops(&self.read_iops),
            ops(&self.write_iops),
            mbps(&self.read_throughput),
            mbps(&self.write_throughput),
        )
    }
}

impl RightsizingEngine {
    /// Cheapest machine type covering observed CPU and memory
    pub async fn optimize_gcp_instance(
        &self,
        request: &GcpInstanceRequest,
    ) -> Result<GcpInstanceRecommendation> {
        self.observe(
            ResourceKind::GcpInstance,
            &request.instance_id,
            self.recommend_gcp_instance(request),
        )
        .await
    }

    /// Cheapest disk tier the attached machine can drive at observed demand
    pub async fn optimize_gcp_disk(&self, request: &GcpDiskRequest) -> Result<GcpDiskRecommendation> {
        self.observe(
            ResourceKind::GcpDisk,
            &request.disk_id,
            self.recommend_gcp_disk(request, &request.machine_type),
        )
        .await
    }

    async fn gcp_machine(&self, machine_type: &str, region: &str) -> Result<GcpInstanceProfile> {
        let mut lookup = ConstraintSet::new();
        lookup.set(columns::MACHINE_TYPE, machine_type)?;
        lookup.set(columns::REGION, region)?;
        let entry = self
            .lookup_current(CatalogKind::GcpMachineTypes, &lookup, "gcp machine", machine_type)
            .await?;
        GcpInstanceProfile::from_entry(&entry, region)
    }

    async fn recommend_gcp_instance(
        &self,
        request: &GcpInstanceRequest,
    ) -> Result<GcpInstanceRecommendation> {
        use PreferenceKey as K;

        let prefs = Preferences::parse(&request.preferences)?;
        let current = self.gcp_machine(&request.machine_type, &request.region).await?;

        let m = &request.metrics;
        let usage = GcpInstanceUsage {
            cpu: m.usage(metrics::CPU_UTILIZATION, UsagePolicy::Max),
            memory: m.usage(metrics::MEMORY_USED_PERCENT, UsagePolicy::Max),
            network: crate::timeseries::extract_usage(
                &m.merged_sum(&[metrics::RECEIVED_BYTES, metrics::SENT_BYTES]),
                UsagePolicy::Average,
            ),
        };

        let needed_vcpu = usage
            .cpu
            .avg
            .map(|fraction| needed_capacity(current.vcpu, fraction, prefs.breathing_room(K::CpuBreathingRoom)))
            .unwrap_or(current.vcpu);
        let needed_memory = usage
            .memory
            .max
            .map(|pct| {
                needed_capacity(current.memory_gb, pct / 100.0, prefs.breathing_room(K::MemoryBreathingRoom))
            });

        let mut constraints = ConstraintSet::new()
            .with_operator(columns::VCPU, Operator::Gte)
            .with_operator(columns::MEMORY_GB, Operator::Gte);
        apply_preferences(
            &prefs,
            &[
                ColumnMapping::new(K::Region, columns::REGION, Some(request.region.clone())),
                ColumnMapping::new(
                    K::MachineFamily,
                    columns::MACHINE_FAMILY,
                    Some(current.machine_family.clone()),
                ),
                ColumnMapping::new(K::MachineType, columns::MACHINE_TYPE, Some(current.machine_type.clone())),
                ColumnMapping::number(K::Vcpu, columns::VCPU, Some(current.vcpu)),
                ColumnMapping::number(K::MemoryGb, columns::MEMORY_GB, Some(current.memory_gb)),
            ],
            &mut constraints,
        )?;
        if !prefs.is_set(K::Region) {
            constraints.set(columns::REGION, request.region.as_str())?;
        }
        constrain_unless_pinned(&prefs, K::Vcpu, columns::VCPU, Some(needed_vcpu), &mut constraints)?;
        constrain_unless_pinned(&prefs, K::MemoryGb, columns::MEMORY_GB, needed_memory, &mut constraints)?;

        debug!(
            instance_id = %request.instance_id,
            needed_vcpu = needed_vcpu,
            needed_memory_gb = ?needed_memory,
            "Computed GCP instance needs"
        );

        let recommended = match self
            .search(CatalogKind::GcpMachineTypes, &constraints, None)
            .await?
        {
            Some(found) => Some(GcpInstanceProfile::from_entry(&found, &request.region)?),
            None => None,
        };

        let story = narrative([
            narrate("CPU", &usage.cpu, "fraction"),
            narrate("memory", &usage.memory, "%"),
            narrate("network", &usage.network, "bytes/s"),
        ]);
        self.assemble(
            ResourceKind::GcpInstance,
            &request.instance_id,
            current,
            recommended,
            usage,
            story,
            &prefs,
        )
        .await
    }

    /// Disk recommendation against `machine_type`, which may differ from the
    /// request's when the machine itself is being resized
    pub(super) async fn recommend_gcp_disk(
        &self,
        request: &GcpDiskRequest,
        machine_type: &str,
    ) -> Result<GcpDiskRecommendation> {
        use PreferenceKey as K;

        let prefs = Preferences::parse(&request.preferences)?;
        let usage = GcpDiskUsage::from_metrics(&request.metrics);
        let needed = usage.needed(&prefs);
        let size_gb = numeric_preference(&prefs, K::DiskSize, Some(request.size_gb))?
            .unwrap_or(request.size_gb);

        let tier = match prefs.resolve(K::DiskType, Some(request.disk_type.to_string())) {
            Some(pinned) => pinned
                .parse::<DiskTier>()
                .map_err(|e| EngineError::invalid_preference(K::DiskType.name(), e.to_string()))?,
            None => {
                let machine = self.gcp_machine(machine_type, &request.region).await?;
                self.disk_limits.classify(&DiskQuery {
                    machine_family: machine.machine_family.clone(),
                    machine_type: machine.machine_type.clone(),
                    vcpu: machine.vcpu_count(),
                    needed,
                    size_gb,
                })?
            }
        };

        debug!(
            disk_id = %request.disk_id,
            machine_type = %machine_type,
            tier = %tier,
            "Classified GCP disk"
        );

        let current = GcpDiskProfile {
            disk_type: request.disk_type,
            size_gb: request.size_gb,
            region: request.region.clone(),
        };
        let recommended = GcpDiskProfile {
            disk_type: tier,
            size_gb,
            region: request.region.clone(),
        };

        let story = narrative([
            narrate("read IOPS", &usage.read_iops, "ops/s"),
            narrate("write IOPS", &usage.write_iops, "ops/s"),
            narrate("read throughput", &usage.read_throughput, "bytes/s"),
            narrate("write throughput", &usage.write_throughput, "bytes/s"),
        ]);
        self.assemble(
            ResourceKind::GcpDisk,
            &request.disk_id,
            current,
            Some(recommended),
            usage,
            story,
            &prefs,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Datapoint;
    use chrono::DateTime;

    #[test]
    fn test_disk_needs_absent_streams_need_nothing() {
        let needed = GcpDiskUsage::default().needed(&Preferences::new());
        assert_eq!(needed, DiskCaps::new(0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_disk_needs_apply_breathing_room() {
        let t = DateTime::from_timestamp(0, 0).unwrap();
        let series = MetricSeries::new()
            .with(metrics::DISK_READ_OPS, vec![Datapoint::average(t, 100.0)])
            .with(metrics::DISK_WRITE_BYTES, vec![Datapoint::average(t, 10_000_000.0)]);
        let prefs = Preferences::new()
            .pin(PreferenceKey::IopsBreathingRoom, "50")
            .unwrap();

        let needed = GcpDiskUsage::from_metrics(&series).needed(&prefs);
        assert!((needed.read_iops - 150.0).abs() < 1e-9);
        assert_eq!(needed.write_iops, 0.0);
        assert!((needed.write_throughput_mbps - 10.0).abs() < 1e-9);
    }
}
