//! EC2 instance recommender

use super::{
    apply_preferences, constrain_unless_pinned, narrate, narrative, needed_capacity,
    with_headroom, ColumnMapping, PricedResource, RightsizingEngine,
};
use crate::catalog::{columns, CapacityFloor, CatalogEntry, CatalogKind, ConstraintSet, Operator};
use crate::error::{EngineError, Result};
use crate::models::{MetricSeries, ResourceKind, RightsizingRecommendation, Usage};
use crate::preferences::{PreferenceKey, Preferences};
use crate::services::CostQuery;
use crate::timeseries::{extract_usage, UsagePolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// CloudWatch metric names read by this recommender
pub mod metrics {
    /// Percent of allocated vCPU
    pub const CPU_UTILIZATION: &str = "CPUUtilization";
    /// Percent of memory, reported by the CloudWatch agent
    pub const MEMORY_USED_PERCENT: &str = "mem_used_percent";
    /// Bytes per second
    pub const NETWORK_IN: &str = "NetworkIn";
    pub const NETWORK_OUT: &str = "NetworkOut";
    /// Operations per second
    pub const EBS_READ_OPS: &str = "EBSReadOps";
    pub const EBS_WRITE_OPS: &str = "EBSWriteOps";
    /// Bytes per second
    pub const EBS_READ_BYTES: &str = "EBSReadBytes";
    pub const EBS_WRITE_BYTES: &str = "EBSWriteBytes";
}

const NO_PRE_INSTALLED_SOFTWARE: &str = "NA";

/// Technical profile of an instance type in one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ec2InstanceProfile {
    pub instance_type: String,
    pub region: String,
    pub vcpu: f64,
    pub memory_gb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_throughput_bps: Option<f64>,
    pub tenancy: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_model: Option<String>,
}

impl Ec2InstanceProfile {
    fn from_entry(entry: &CatalogEntry, fallback: &Ec2InstanceProfile) -> Result<Self> {
        let number = |column: &str| {
            entry.number(column).ok_or_else(|| {
                EngineError::CatalogUnavailable(format!("entry {} has no {}", entry.id, column))
            })
        };

        Ok(Self {
            instance_type: entry
                .text(columns::INSTANCE_TYPE)
                .unwrap_or_else(|| entry.id.clone()),
            region: entry
                .text(columns::REGION)
                .unwrap_or_else(|| fallback.region.clone()),
            vcpu: number(columns::VCPU)?,
            memory_gb: number(columns::MEMORY_GB)?,
            network_throughput_bps: entry.number(columns::NETWORK_THROUGHPUT_BPS),
            tenancy: entry
                .text(columns::TENANCY)
                .unwrap_or_else(|| fallback.tenancy.clone()),
            operation: entry
                .text(columns::OPERATION)
                .unwrap_or_else(|| fallback.operation.clone()),
            operating_system: entry
                .text(columns::OPERATING_SYSTEM)
                .or_else(|| fallback.operating_system.clone()),
            license_model: entry
                .text(columns::LICENSE_MODEL)
                .or_else(|| fallback.license_model.clone()),
        })
    }
}

impl PricedResource for Ec2InstanceProfile {
    fn label(&self) -> String {
        self.instance_type.clone()
    }

    fn cost_query(&self) -> CostQuery {
        CostQuery::Ec2Instance(self.clone())
    }
}

/// One EC2 instance to rightsize
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ec2InstanceRequest {
    pub instance_id: String,
    pub instance_type: String,
    pub region: String,
    /// `default`, `dedicated` or `host`
    #[serde(default = "default_tenancy")]
    pub tenancy: String,
    /// Billing operation code, e.g. `RunInstances:0002` for Windows
    #[serde(default = "default_usage_operation")]
    pub usage_operation: String,
    #[serde(default)]
    pub metrics: MetricSeries,
    #[serde(default)]
    pub preferences: HashMap<String, Option<String>>,
}

fn default_tenancy() -> String {
    "default".to_string()
}

fn default_usage_operation() -> String {
    "RunInstances".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ec2InstanceUsage {
    pub cpu: Usage,
    pub memory: Usage,
    pub network: Usage,
    pub ebs_iops: Usage,
    pub ebs_throughput: Usage,
}

pub type Ec2InstanceRecommendation = RightsizingRecommendation<Ec2InstanceProfile, Ec2InstanceUsage>;

/// Whether burstable (`t*`) families may be recommended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstablePolicy {
    /// `Yes`: never recommend burstable types
    Exclude,
    /// `No`: burstable types compete like any other
    Allow,
    /// `IfCurrentIsNotBurstable`: keep burstable instances burstable-eligible
    ExcludeUnlessCurrentIs,
}

impl BurstablePolicy {
    fn from_preferences(prefs: &Preferences) -> Result<Self> {
        let key = PreferenceKey::ExcludeBurstableInstances;
        match prefs.literal(key) {
            None if prefs.is_set(key) => Ok(Self::ExcludeUnlessCurrentIs),
            None => Ok(Self::Allow),
            Some(v) if v.eq_ignore_ascii_case("yes") => Ok(Self::Exclude),
            Some(v) if v.eq_ignore_ascii_case("no") => Ok(Self::Allow),
            Some(v) if v.eq_ignore_ascii_case("ifcurrentisnotburstable") => {
                Ok(Self::ExcludeUnlessCurrentIs)
            }
            Some(v) => Err(EngineError::invalid_preference(
                key.name(),
                format!("expected Yes, No or IfCurrentIsNotBurstable, got {:?}", v),
            )),
        }
    }

    pub fn excludes_burstable(&self, current_type: &str) -> bool {
        match self {
            Self::Exclude => true,
            Self::Allow => false,
            Self::ExcludeUnlessCurrentIs => !is_burstable(current_type),
        }
    }
}

/// `t2.micro`, `t3a.large`, `t4g.nano` and friends
pub fn is_burstable(instance_type: &str) -> bool {
    let mut chars = instance_type.chars();
    chars.next() == Some('t') && chars.next().map_or(false, |c| c.is_ascii_digit())
}

/// Catalog wording for the EC2 API tenancy values
fn catalog_tenancy(tenancy: &str) -> String {
    match tenancy.to_ascii_lowercase().as_str() {
        "default" | "" => "Shared".to_string(),
        "dedicated" => "Dedicated".to_string(),
        "host" => "Host".to_string(),
        _ => tenancy.to_string(),
    }
}

struct Ec2Needs {
    vcpu: f64,
    /// Absent without agent memory metrics; the search then leaves memory open
    memory_gb: Option<f64>,
    network_bps: Option<f64>,
    ebs_iops: Option<f64>,
    ebs_throughput_mbps: Option<f64>,
}

impl Ec2Needs {
    fn compute(current: &Ec2InstanceProfile, usage: &Ec2InstanceUsage, prefs: &Preferences) -> Self {
        let room = |key| prefs.breathing_room(key);
        Self {
            vcpu: usage
                .cpu
                .avg
                .map(|pct| needed_capacity(current.vcpu, pct / 100.0, room(PreferenceKey::CpuBreathingRoom)))
                .unwrap_or(current.vcpu),
            memory_gb: usage
                .memory
                .max
                .map(|pct| {
                    needed_capacity(current.memory_gb, pct / 100.0, room(PreferenceKey::MemoryBreathingRoom))
                }),
            network_bps: usage
                .network
                .avg
                .map(|bytes| with_headroom(bytes * 8.0, room(PreferenceKey::NetworkBreathingRoom))),
            ebs_iops: usage
                .ebs_iops
                .avg
                .map(|ops| with_headroom(ops, room(PreferenceKey::IopsBreathingRoom))),
            ebs_throughput_mbps: usage.ebs_throughput.avg.map(|bytes| {
                with_headroom(bytes / 1_000_000.0, room(PreferenceKey::ThroughputBreathingRoom))
            }),
        }
    }
}

impl RightsizingEngine {
    /// Cheapest instance type that still covers observed demand
    pub async fn optimize_ec2_instance(
        &self,
        request: &Ec2InstanceRequest,
    ) -> Result<Ec2InstanceRecommendation> {
        self.observe(
            ResourceKind::Ec2Instance,
            &request.instance_id,
            self.recommend_ec2_instance(request),
        )
        .await
    }

    async fn recommend_ec2_instance(
        &self,
        request: &Ec2InstanceRequest,
    ) -> Result<Ec2InstanceRecommendation> {
        let prefs = Preferences::parse(&request.preferences)?;
        let burstable = BurstablePolicy::from_preferences(&prefs)?;

        let mut lookup = ConstraintSet::new();
        lookup.set(columns::INSTANCE_TYPE, request.instance_type.as_str())?;
        lookup.set(columns::REGION, request.region.as_str())?;
        let entry = self
            .lookup_current(
                CatalogKind::Ec2InstanceTypes,
                &lookup,
                "ec2 instance",
                &request.instance_type,
            )
            .await?;

        let seed = Ec2InstanceProfile {
            instance_type: request.instance_type.clone(),
            region: request.region.clone(),
            vcpu: 0.0,
            memory_gb: 0.0,
            network_throughput_bps: None,
            tenancy: catalog_tenancy(&request.tenancy),
            operation: request.usage_operation.clone(),
            operating_system: None,
            license_model: None,
        };
        let mut current = Ec2InstanceProfile::from_entry(&entry, &seed)?;
        current.tenancy = seed.tenancy.clone();
        current.operation = seed.operation.clone();

        let m = &request.metrics;
        let usage = Ec2InstanceUsage {
            cpu: m.usage(metrics::CPU_UTILIZATION, UsagePolicy::Max),
            memory: m.usage(metrics::MEMORY_USED_PERCENT, UsagePolicy::Max),
            network: extract_usage(
                &m.merged_sum(&[metrics::NETWORK_IN, metrics::NETWORK_OUT]),
                UsagePolicy::Average,
            ),
            ebs_iops: extract_usage(
                &m.merged_sum(&[metrics::EBS_READ_OPS, metrics::EBS_WRITE_OPS]),
                UsagePolicy::Average,
            ),
            ebs_throughput: extract_usage(
                &m.merged_sum(&[metrics::EBS_READ_BYTES, metrics::EBS_WRITE_BYTES]),
                UsagePolicy::Average,
            ),
        };
        let needs = Ec2Needs::compute(&current, &usage, &prefs);

        let mut constraints = ConstraintSet::new()
            .with_operator(columns::VCPU, Operator::Gte)
            .with_operator(columns::MEMORY_GB, Operator::Gte)
            .with_operator(columns::NETWORK_THROUGHPUT_BPS, Operator::Gte)
            .with_operator(columns::EBS_BASELINE_IOPS, Operator::Gte)
            .with_operator(columns::EBS_BASELINE_THROUGHPUT_MBPS, Operator::Gte)
            .with_operator(columns::CLOCK_SPEED_GHZ, Operator::Gte);

        use PreferenceKey as K;
        apply_preferences(
            &prefs,
            &[
                ColumnMapping::new(K::Region, columns::REGION, Some(current.region.clone())),
                ColumnMapping::new(K::Tenancy, columns::TENANCY, Some(current.tenancy.clone())),
                ColumnMapping::new(
                    K::OperatingSystem,
                    columns::OPERATING_SYSTEM,
                    current.operating_system.clone(),
                ),
                ColumnMapping::new(K::LicenseModel, columns::LICENSE_MODEL, current.license_model.clone()),
                ColumnMapping::new(
                    K::ProcessorArchitecture,
                    columns::PROCESSOR_ARCHITECTURE,
                    entry.text(columns::PROCESSOR_ARCHITECTURE),
                ),
                ColumnMapping::new(
                    K::CurrentGeneration,
                    columns::CURRENT_GENERATION,
                    entry.text(columns::CURRENT_GENERATION),
                ),
                ColumnMapping::new(K::EnaSupported, columns::ENA_SUPPORT, entry.text(columns::ENA_SUPPORT)),
                ColumnMapping::new(
                    K::PhysicalProcessor,
                    columns::PHYSICAL_PROCESSOR,
                    entry.text(columns::PHYSICAL_PROCESSOR),
                ),
                ColumnMapping::number(K::ClockSpeed, columns::CLOCK_SPEED_GHZ, entry.number(columns::CLOCK_SPEED_GHZ)),
                ColumnMapping::new(
                    K::InstanceFamily,
                    columns::INSTANCE_FAMILY,
                    entry.text(columns::INSTANCE_FAMILY),
                ),
                ColumnMapping::number(K::Vcpu, columns::VCPU, Some(current.vcpu)),
                ColumnMapping::number(K::MemoryGb, columns::MEMORY_GB, Some(current.memory_gb)),
                ColumnMapping::number(
                    K::NetworkThroughput,
                    columns::NETWORK_THROUGHPUT_BPS,
                    current.network_throughput_bps,
                ),
                ColumnMapping::number(K::Iops, columns::EBS_BASELINE_IOPS, entry.number(columns::EBS_BASELINE_IOPS)),
                ColumnMapping::number(
                    K::Throughput,
                    columns::EBS_BASELINE_THROUGHPUT_MBPS,
                    entry.number(columns::EBS_BASELINE_THROUGHPUT_MBPS),
                ),
                ColumnMapping::new(
                    K::PreInstalledSw,
                    columns::PRE_INSTALLED_SW,
                    entry.text(columns::PRE_INSTALLED_SW),
                ),
            ],
            &mut constraints,
        )?;

        if !prefs.is_set(K::Region) {
            constraints.set(columns::REGION, current.region.as_str())?;
        }
        if !prefs.is_set(K::PreInstalledSw) {
            constraints.set(columns::PRE_INSTALLED_SW, NO_PRE_INSTALLED_SOFTWARE)?;
        }
        constraints.set(columns::OPERATION, current.operation.as_str())?;

        constrain_unless_pinned(&prefs, K::Vcpu, columns::VCPU, Some(needs.vcpu), &mut constraints)?;
        constrain_unless_pinned(&prefs, K::MemoryGb, columns::MEMORY_GB, needs.memory_gb, &mut constraints)?;
        constrain_unless_pinned(&prefs, K::Iops, columns::EBS_BASELINE_IOPS, needs.ebs_iops, &mut constraints)?;
        constrain_unless_pinned(
            &prefs,
            K::Throughput,
            columns::EBS_BASELINE_THROUGHPUT_MBPS,
            needs.ebs_throughput_mbps,
            &mut constraints,
        )?;

        if burstable.excludes_burstable(&current.instance_type) {
            constraints.add_predicate("exclude-burstable", |entry| {
                let instance_type = entry
                    .text(columns::INSTANCE_TYPE)
                    .unwrap_or_else(|| entry.id.clone());
                !is_burstable(&instance_type)
            });
        }

        let floor = match needs.network_bps {
            Some(bps) if !prefs.is_set(K::NetworkThroughput) => {
                Some(CapacityFloor::new(columns::NETWORK_THROUGHPUT_BPS, bps))
            }
            _ => None,
        };

        debug!(
            instance_id = %request.instance_id,
            needed_vcpu = needs.vcpu,
            needed_memory_gb = ?needs.memory_gb,
            needed_network_bps = ?needs.network_bps,
            "Computed EC2 needs"
        );

        let recommended = self
            .search(CatalogKind::Ec2InstanceTypes, &constraints, floor.as_ref())
            .await?
            .map(|found| Ec2InstanceProfile::from_entry(&found, &current))
            .transpose()?;

        let story = narrative([
            narrate("CPU", &usage.cpu, "%"),
            narrate("memory", &usage.memory, "%"),
            narrate("network", &usage.network, "bytes/s"),
            narrate("EBS IOPS", &usage.ebs_iops, "ops/s"),
            narrate("EBS throughput", &usage.ebs_throughput, "bytes/s"),
        ]);

        self.assemble(
            ResourceKind::Ec2Instance,
            &request.instance_id,
            current,
            recommended,
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

    #[test]
    fn test_is_burstable() {
        assert!(is_burstable("t3.micro"));
        assert!(is_burstable("t4g.nano"));
        assert!(is_burstable("t2.large"));
        assert!(!is_burstable("m5.large"));
        assert!(!is_burstable("trn1.2xlarge"));
    }

    #[test]
    fn test_burstable_policy_values() {
        let prefs = |v: Option<&str>| {
            let raw: HashMap<String, Option<String>> = [(
                "ExcludeBurstableInstances".to_string(),
                v.map(str::to_string),
            )]
            .into_iter()
            .collect();
            Preferences::parse(&raw).unwrap()
        };

        let yes = BurstablePolicy::from_preferences(&prefs(Some("Yes"))).unwrap();
        assert!(yes.excludes_burstable("t3.micro"));
        assert!(yes.excludes_burstable("m5.large"));

        let no = BurstablePolicy::from_preferences(&prefs(Some("no"))).unwrap();
        assert!(!no.excludes_burstable("m5.large"));

        let conditional =
            BurstablePolicy::from_preferences(&prefs(Some("IfCurrentIsNotBurstable"))).unwrap();
        assert!(conditional.excludes_burstable("m5.large"));
        assert!(!conditional.excludes_burstable("t3.micro"));

        assert!(BurstablePolicy::from_preferences(&prefs(Some("sometimes"))).is_err());
        assert_eq!(
            BurstablePolicy::from_preferences(&Preferences::new()).unwrap(),
            BurstablePolicy::Allow
        );
    }

    #[test]
    fn test_catalog_tenancy() {
        assert_eq!(catalog_tenancy("default"), "Shared");
        assert_eq!(catalog_tenancy("dedicated"), "Dedicated");
        assert_eq!(catalog_tenancy("host"), "Host");
    }

    #[test]
    fn test_needs_without_metrics() {
        let current = Ec2InstanceProfile {
            instance_type: "m5.large".to_string(),
            region: "us-east-1".to_string(),
            vcpu: 2.0,
            memory_gb: 8.0,
            network_throughput_bps: None,
            tenancy: "Shared".to_string(),
            operation: "RunInstances".to_string(),
            operating_system: None,
            license_model: None,
        };
        let needs = Ec2Needs::compute(&current, &Ec2InstanceUsage::default(), &Preferences::new());
        assert_eq!(needs.vcpu, 2.0);
        assert!(needs.memory_gb.is_none());
        assert!(needs.network_bps.is_none());
        assert!(needs.ebs_iops.is_none());
    }
}
