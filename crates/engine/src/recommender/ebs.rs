//! EBS volume recommender

use super::{
    apply_preferences, narrate, narrative, needed_capacity, numeric_preference, with_headroom,
    ColumnMapping, PricedResource, RightsizingEngine,
};
use crate::catalog::{columns, CatalogKind, ConstraintSet, Operator};
use crate::error::{EngineError, Result};
use crate::models::{MetricSeries, ResourceKind, RightsizingRecommendation, Usage};
use crate::preferences::{PreferenceKey, Preferences};
use crate::services::CostQuery;
use crate::timeseries::{extract_usage, UsagePolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// CloudWatch metric names read by this recommender
pub mod metrics {
    /// Operations per second
    pub const VOLUME_READ_OPS: &str = "VolumeReadOps";
    pub const VOLUME_WRITE_OPS: &str = "VolumeWriteOps";
    /// Bytes per second
    pub const VOLUME_READ_BYTES: &str = "VolumeReadBytes";
    pub const VOLUME_WRITE_BYTES: &str = "VolumeWriteBytes";
    /// Percent of the filesystem in use, reported by the CloudWatch agent
    pub const DISK_USED_PERCENT: &str = "disk_used_percent";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EbsVolumeProfile {
    pub volume_type: String,
    pub size_gb: f64,
    /// Billable IOPS above the type's included baseline; `None` when the
    /// type cannot be provisioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_iops: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_throughput_mbps: Option<f64>,
    pub region: String,
}

impl PricedResource for EbsVolumeProfile {
    fn label(&self) -> String {
        format!("{} {}GB", self.volume_type, self.size_gb)
    }

    fn cost_query(&self) -> CostQuery {
        CostQuery::EbsVolume(self.clone())
    }
}

/// One EBS volume to rightsize
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EbsVolumeRequest {
    pub volume_id: String,
    pub volume_type: String,
    pub size_gb: f64,
    /// Total IOPS currently configured, if the type has a setting
    #[serde(default)]
    pub iops: Option<f64>,
    #[serde(default)]
    pub throughput_mbps: Option<f64>,
    pub region: String,
    #[serde(default)]
    pub metrics: MetricSeries,
    #[serde(default)]
    pub preferences: HashMap<String, Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EbsVolumeUsage {
    pub iops: Usage,
    pub throughput: Usage,
    pub disk_used: Usage,
}

pub type EbsVolumeRecommendation = RightsizingRecommendation<EbsVolumeProfile, EbsVolumeUsage>;

/// Capacity a volume type includes at a given size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeBaseline {
    pub iops: f64,
    pub throughput_mbps: f64,
    pub provisionable_iops: bool,
    pub provisionable_throughput: bool,
}

impl VolumeBaseline {
    /// Billable IOPS: `max(needed - baseline, 0)` for provisionable types
    pub fn provisioned_iops(&self, needed: f64) -> Option<f64> {
        self.provisionable_iops
            .then(|| (needed - self.iops).max(0.0))
    }

    pub fn provisioned_throughput(&self, needed_mbps: f64) -> Option<f64> {
        self.provisionable_throughput
            .then(|| (needed_mbps - self.throughput_mbps).max(0.0))
    }
}

/// Included IOPS and throughput of a volume type at `size_gb`
pub fn volume_baseline(volume_type: &str, size_gb: f64) -> VolumeBaseline {
    let fixed = |iops: f64, throughput_mbps: f64| VolumeBaseline {
        iops,
        throughput_mbps,
        provisionable_iops: false,
        provisionable_throughput: false,
    };

    match volume_type.to_ascii_lowercase().as_str() {
        "gp2" => fixed(
            (3.0 * size_gb).clamp(100.0, 16_000.0),
            if size_gb <= 170.0 { 128.0 } else { 250.0 },
        ),
        "gp3" => VolumeBaseline {
            iops: 3_000.0,
            throughput_mbps: 125.0,
            provisionable_iops: true,
            provisionable_throughput: true,
        },
        "io1" | "io2" => VolumeBaseline {
            iops: 0.0,
            throughput_mbps: 1_000.0,
            provisionable_iops: true,
            provisionable_throughput: false,
        },
        "st1" => fixed(500.0, 40.0 * size_gb / 1_000.0),
        "sc1" => fixed(250.0, 12.0 * size_gb / 1_000.0),
        "standard" => fixed(100.0, 90.0),
        _ => fixed(0.0, 0.0),
    }
}

/// Concrete volume types behind a volume-family preference
fn family_candidates(family: &str) -> Option<&'static [&'static str]> {
    let normalized: String = family
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();

    match normalized.as_str() {
        "generalpurpose" | "ssd" => Some(&["gp2", "gp3"][..]),
        "iooptimized" | "provisionediops" => Some(&["io1", "io2"][..]),
        "hdd" => Some(&["st1", "sc1"][..]),
        "magnetic" => Some(&["standard"][..]),
        _ => None,
    }
}

fn family_of(volume_type: &str) -> Option<&'static str> {
    match volume_type.to_ascii_lowercase().as_str() {
        "gp2" | "gp3" => Some("General Purpose"),
        "io1" | "io2" => Some("IO Optimized"),
        "st1" | "sc1" => Some("HDD"),
        "standard" => Some("Magnetic"),
        _ => None,
    }
}

impl RightsizingEngine {
    /// Cheapest volume type and size covering observed IOPS, throughput and space
    pub async fn optimize_ebs_volume(
        &self,
        request: &EbsVolumeRequest,
    ) -> Result<EbsVolumeRecommendation> {
        self.observe(
            ResourceKind::EbsVolume,
            &request.volume_id,
            self.recommend_ebs_volume(request),
        )
        .await
    }

    async fn recommend_ebs_volume(
        &self,
        request: &EbsVolumeRequest,
    ) -> Result<EbsVolumeRecommendation> {
        use PreferenceKey as K;

        let prefs = Preferences::parse(&request.preferences)?;
        let m = &request.metrics;
        let usage = EbsVolumeUsage {
            iops: extract_usage(
                &m.merged_sum(&[metrics::VOLUME_READ_OPS, metrics::VOLUME_WRITE_OPS]),
                UsagePolicy::Average,
            ),
            throughput: extract_usage(
                &m.merged_sum(&[metrics::VOLUME_READ_BYTES, metrics::VOLUME_WRITE_BYTES]),
                UsagePolicy::Average,
            ),
            disk_used: m.usage(metrics::DISK_USED_PERCENT, UsagePolicy::Max),
        };

        let needed_iops = match numeric_preference(&prefs, K::Iops, request.iops)? {
            Some(pinned) => pinned,
            None => with_headroom(
                usage.iops.avg.unwrap_or(0.0),
                prefs.breathing_room(K::IopsBreathingRoom),
            ),
        };
        let needed_throughput = match numeric_preference(&prefs, K::Throughput, request.throughput_mbps)? {
            Some(pinned) => pinned,
            None => with_headroom(
                usage.throughput.avg.unwrap_or(0.0) / 1_000_000.0,
                prefs.breathing_room(K::ThroughputBreathingRoom),
            ),
        };
        let needed_size = match numeric_preference(&prefs, K::VolumeSize, Some(request.size_gb))? {
            Some(pinned) => pinned,
            None => usage
                .disk_used
                .max
                .map(|pct| {
                    needed_capacity(request.size_gb, pct / 100.0, prefs.breathing_room(K::SizeBreathingRoom))
                })
                .unwrap_or(request.size_gb),
        }
        .ceil()
        .max(1.0);

        let mut constraints = ConstraintSet::new()
            .with_operator(columns::MAX_SIZE_GB, Operator::Gte)
            .with_operator(columns::MIN_SIZE_GB, Operator::Lte)
            .with_operator(columns::MAX_IOPS, Operator::Gte)
            .with_operator(columns::MAX_THROUGHPUT_MBPS, Operator::Gte);

        apply_preferences(
            &prefs,
            &[
                ColumnMapping::new(K::Region, columns::REGION, Some(request.region.clone())),
                ColumnMapping::new(K::VolumeType, columns::VOLUME_TYPE, Some(request.volume_type.clone())),
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

        let current_family = family_of(&request.volume_type).map(str::to_string);
        if let Some(family) = prefs.resolve(K::VolumeFamily, current_family) {
            let candidates = family_candidates(&family).ok_or_else(|| {
                EngineError::invalid_preference(
                    K::VolumeFamily.name(),
                    format!("unknown volume family {:?}", family),
                )
            })?;
            constraints.add_predicate(&format!("volume-family:{}", family), move |entry| {
                let volume_type = entry
                    .text(columns::VOLUME_TYPE)
                    .unwrap_or_else(|| entry.id.clone());
                candidates
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(&volume_type))
            });
        }

        let current_baseline = volume_baseline(&request.volume_type, request.size_gb);
        let current = EbsVolumeProfile {
            volume_type: request.volume_type.clone(),
            size_gb: request.size_gb,
            provisioned_iops: current_baseline.provisioned_iops(request.iops.unwrap_or(0.0)),
            provisioned_throughput_mbps: current_baseline
                .provisioned_throughput(request.throughput_mbps.unwrap_or(0.0)),
            region: request.region.clone(),
        };

        let recommended = self
            .search(CatalogKind::EbsVolumeTypes, &constraints, None)
            .await?
            .map(|found| {
                let volume_type = found
                    .text(columns::VOLUME_TYPE)
                    .unwrap_or_else(|| found.id.clone());
                let baseline = volume_baseline(&volume_type, needed_size);
                EbsVolumeProfile {
                    provisioned_iops: baseline.provisioned_iops(needed_iops),
                    provisioned_throughput_mbps: baseline.provisioned_throughput(needed_throughput),
                    volume_type,
                    size_gb: needed_size,
                    region: found
                        .text(columns::REGION)
                        .unwrap_or_else(|| request.region.clone()),
                }
            });

        let story = narrative([
            narrate("IOPS", &usage.iops, "ops/s"),
            narrate("throughput", &usage.throughput, "bytes/s"),
            narrate("disk used", &usage.disk_used, "%"),
        ]);

        self.assemble(
            ResourceKind::EbsVolume,
            &request.volume_id,
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
    fn test_gp2_baseline_scales_with_size() {
        assert_eq!(volume_baseline("gp2", 10.0).iops, 100.0);
        assert_eq!(volume_baseline("gp2", 1_000.0).iops, 3_000.0);
        assert_eq!(volume_baseline("gp2", 10_000.0).iops, 16_000.0);
        assert_eq!(volume_baseline("gp2", 100.0).throughput_mbps, 128.0);
        assert_eq!(volume_baseline("gp2", 500.0).throughput_mbps, 250.0);
    }

    #[test]
    fn test_provisioned_iops_never_negative() {
        for volume_type in ["gp2", "gp3", "io1", "io2", "st1", "sc1", "standard", "mystery"] {
            for size in [1.0, 100.0, 16_384.0] {
                let baseline = volume_baseline(volume_type, size);
                for needed in [0.0, 50.0, 2_999.0, 3_000.0, 64_000.0] {
                    if let Some(p) = baseline.provisioned_iops(needed) {
                        assert!(p >= 0.0, "{} {} {}", volume_type, size, needed);
                    }
                    if let Some(p) = baseline.provisioned_throughput(needed / 10.0) {
                        assert!(p >= 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_gp3_provisions_above_baseline_only() {
        let gp3 = volume_baseline("gp3", 100.0);
        assert_eq!(gp3.provisioned_iops(1_000.0), Some(0.0));
        assert_eq!(gp3.provisioned_iops(5_000.0), Some(2_000.0));
        assert_eq!(gp3.provisioned_throughput(200.0), Some(75.0));
        assert_eq!(volume_baseline("gp2", 100.0).provisioned_iops(5_000.0), None);
        assert_eq!(volume_baseline("io2", 100.0).provisioned_iops(5_000.0), Some(5_000.0));
    }

    #[test]
    fn test_family_candidates() {
        assert_eq!(family_candidates("General Purpose"), Some(&["gp2", "gp3"][..]));
        assert_eq!(family_candidates("SSD"), Some(&["gp2", "gp3"][..]));
        assert_eq!(family_candidates("IO Optimized"), Some(&["io1", "io2"][..]));
        assert_eq!(family_candidates("io-optimized"), Some(&["io1", "io2"][..]));
        assert_eq!(family_candidates("HDD"), Some(&["st1", "sc1"][..]));
        assert_eq!(family_candidates("tape"), None);
    }

    #[test]
    fn test_family_of_round_trips_through_candidates() {
        for volume_type in ["gp2", "gp3", "io1", "io2", "st1", "sc1", "standard"] {
            let family = family_of(volume_type).unwrap();
            assert!(family_candidates(family).unwrap().contains(&volume_type));
        }
    }
}
