//! GCP persistent-disk physical limits
//!
//! A GCP VM caps the IOPS and throughput each attached persistent disk can
//! reach, and each disk tier additionally scales its caps with provisioned
//! size. [`GcpDiskLimits`] holds the per-VM tables and picks the cheapest
//! tier whose effective cap covers the observed demand.
//!
//! Lookup order for per-VM caps: exact machine type, then exact vCPU count,
//! then vCPU range. Family `n2` takes PD-Extreme from the machine-type table
//! and every other tier from the range table.

mod tables;

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Persistent-disk tiers in ascending price order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiskTier {
    #[serde(rename = "pd-standard")]
    Standard,
    #[serde(rename = "pd-balanced")]
    Balanced,
    #[serde(rename = "pd-extreme")]
    Extreme,
    #[serde(rename = "pd-ssd")]
    Ssd,
}

impl DiskTier {
    /// Every tier, cheapest first
    pub const ASCENDING_PRICE: [DiskTier; 4] = [
        DiskTier::Standard,
        DiskTier::Balanced,
        DiskTier::Extreme,
        DiskTier::Ssd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "pd-standard",
            Self::Balanced => "pd-balanced",
            Self::Extreme => "pd-extreme",
            Self::Ssd => "pd-ssd",
        }
    }

    /// Size-proportional caps. PD-Extreme is provisioned and only VM-bound.
    fn scaling(&self) -> Option<PerGbScaling> {
        match self {
            Self::Standard => Some(PerGbScaling {
                read_iops_per_gb: 0.75,
                write_iops_per_gb: 1.5,
                throughput_mbps_per_gb: 0.12,
                iops_offset: 0.0,
                throughput_offset_mbps: 0.0,
            }),
            Self::Balanced => Some(PerGbScaling {
                read_iops_per_gb: 6.0,
                write_iops_per_gb: 6.0,
                throughput_mbps_per_gb: 0.28,
                iops_offset: 3_000.0,
                throughput_offset_mbps: 140.0,
            }),
            Self::Ssd => Some(PerGbScaling {
                read_iops_per_gb: 30.0,
                write_iops_per_gb: 30.0,
                throughput_mbps_per_gb: 0.48,
                iops_offset: 6_000.0,
                throughput_offset_mbps: 240.0,
            }),
            Self::Extreme => None,
        }
    }
}

impl fmt::Display for DiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiskTier {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pd-standard" | "standard" => Ok(Self::Standard),
            "pd-balanced" | "balanced" => Ok(Self::Balanced),
            "pd-extreme" | "extreme" => Ok(Self::Extreme),
            "pd-ssd" | "ssd" => Ok(Self::Ssd),
            other => Err(EngineError::InvalidInput(format!("unknown disk type {:?}", other))),
        }
    }
}

/// Read/write IOPS and throughput (MB/s), used both for caps and for demand
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskCaps {
    pub read_iops: f64,
    pub write_iops: f64,
    pub read_throughput_mbps: f64,
    pub write_throughput_mbps: f64,
}

impl DiskCaps {
    pub fn new(read_iops: f64, write_iops: f64, read_mbps: f64, write_mbps: f64) -> Self {
        Self {
            read_iops,
            write_iops,
            read_throughput_mbps: read_mbps,
            write_throughput_mbps: write_mbps,
        }
    }

    /// True when every figure of `needed` fits under these caps
    pub fn covers(&self, needed: &DiskCaps) -> bool {
        needed.read_iops <= self.read_iops
            && needed.write_iops <= self.write_iops
            && needed.read_throughput_mbps <= self.read_throughput_mbps
            && needed.write_throughput_mbps <= self.write_throughput_mbps
    }

    fn min(&self, other: &DiskCaps) -> DiskCaps {
        DiskCaps {
            read_iops: self.read_iops.min(other.read_iops),
            write_iops: self.write_iops.min(other.write_iops),
            read_throughput_mbps: self.read_throughput_mbps.min(other.read_throughput_mbps),
            write_throughput_mbps: self.write_throughput_mbps.min(other.write_throughput_mbps),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PerGbScaling {
    read_iops_per_gb: f64,
    write_iops_per_gb: f64,
    throughput_mbps_per_gb: f64,
    iops_offset: f64,
    throughput_offset_mbps: f64,
}

impl PerGbScaling {
    fn caps_for(&self, size_gb: f64) -> DiskCaps {
        DiskCaps {
            read_iops: self.read_iops_per_gb * size_gb + self.iops_offset,
            write_iops: self.write_iops_per_gb * size_gb + self.iops_offset,
            read_throughput_mbps: self.throughput_mbps_per_gb * size_gb
                + self.throughput_offset_mbps,
            write_throughput_mbps: self.throughput_mbps_per_gb * size_gb
                + self.throughput_offset_mbps,
        }
    }
}

/// Per-VM caps for each tier; `None` means the tier cannot attach
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TierLimits {
    pub standard: Option<DiskCaps>,
    pub balanced: Option<DiskCaps>,
    pub extreme: Option<DiskCaps>,
    pub ssd: Option<DiskCaps>,
}

impl TierLimits {
    pub fn get(&self, tier: DiskTier) -> Option<&DiskCaps> {
        match tier {
            DiskTier::Standard => self.standard.as_ref(),
            DiskTier::Balanced => self.balanced.as_ref(),
            DiskTier::Extreme => self.extreme.as_ref(),
            DiskTier::Ssd => self.ssd.as_ref(),
        }
    }
}

/// vCPU bracket of the range table: `"16-31"` or open-ended `"32-"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcpuRange {
    Between(u32, u32),
    AtLeast(u32),
}

impl VcpuRange {
    pub fn contains(&self, vcpu: u32) -> bool {
        match *self {
            VcpuRange::Between(low, high) => (low..=high).contains(&vcpu),
            VcpuRange::AtLeast(low) => vcpu >= low,
        }
    }
}

impl FromStr for VcpuRange {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || EngineError::InvalidInput(format!("invalid vCPU range {:?}", s));
        let parse = |part: &str| part.trim().parse::<u32>().map_err(|_| invalid());

        match s.split_once('-') {
            Some((low, "")) => Ok(VcpuRange::AtLeast(parse(low)?)),
            Some((low, high)) => {
                let (low, high) = (parse(low)?, parse(high)?);
                if low > high {
                    return Err(invalid());
                }
                Ok(VcpuRange::Between(low, high))
            }
            None => {
                let exact = parse(s)?;
                Ok(VcpuRange::Between(exact, exact))
            }
        }
    }
}

/// What a disk needs and what it is attached to
#[derive(Debug, Clone, PartialEq)]
pub struct DiskQuery {
    pub machine_family: String,
    pub machine_type: String,
    pub vcpu: u32,
    pub needed: DiskCaps,
    pub size_gb: f64,
}

/// Immutable per-VM disk limit tables, built once and shared
#[derive(Debug, Clone, Default)]
pub struct GcpDiskLimits {
    by_machine_type: HashMap<String, HashMap<String, TierLimits>>,
    by_vcpu: HashMap<String, BTreeMap<u32, TierLimits>>,
    by_vcpu_range: HashMap<String, Vec<(VcpuRange, TierLimits)>>,
}

impl GcpDiskLimits {
    /// Tables bundled with the engine
    pub fn builtin() -> Self {
        let mut limits = Self::default();
        for (family, machine_type, tiers) in tables::machine_type_limits() {
            limits.insert_machine_type(family, machine_type, tiers);
        }
        for (family, vcpu, tiers) in tables::vcpu_limits() {
            limits.insert_vcpu(family, vcpu, tiers);
        }
        for (family, range, tiers) in tables::vcpu_range_limits() {
            // Bundled ranges are literals checked by the tests below
            if let Ok(range) = range.parse() {
                limits.insert_vcpu_range(family, range, tiers);
            }
        }
        limits
    }

    pub fn insert_machine_type(&mut self, family: &str, machine_type: &str, tiers: TierLimits) {
        self.by_machine_type
            .entry(family.to_string())
            .or_default()
            .insert(machine_type.to_string(), tiers);
    }

    pub fn insert_vcpu(&mut self, family: &str, vcpu: u32, tiers: TierLimits) {
        self.by_vcpu
            .entry(family.to_string())
            .or_default()
            .insert(vcpu, tiers);
    }

    /// Ranges are searched in insertion order
    pub fn insert_vcpu_range(&mut self, family: &str, range: VcpuRange, tiers: TierLimits) {
        self.by_vcpu_range
            .entry(family.to_string())
            .or_default()
            .push((range, tiers));
    }

    fn machine_type_entry(&self, family: &str, machine_type: &str) -> Option<&TierLimits> {
        self.by_machine_type.get(family)?.get(machine_type)
    }

    fn vcpu_entry(&self, family: &str, vcpu: u32) -> Option<&TierLimits> {
        self.by_vcpu.get(family)?.get(&vcpu)
    }

    fn range_entry(&self, family: &str, vcpu: u32) -> Option<&TierLimits> {
        self.by_vcpu_range
            .get(family)?
            .iter()
            .find(|(range, _)| range.contains(vcpu))
            .map(|(_, tiers)| tiers)
    }

    /// Per-VM caps for a machine, following the lookup precedence
    pub fn vm_limits(&self, family: &str, machine_type: &str, vcpu: u32) -> Option<TierLimits> {
        if family == "n2" {
            let mut tiers = *self.range_entry(family, vcpu)?;
            tiers.extreme = self
                .machine_type_entry(family, machine_type)
                .and_then(|t| t.extreme);
            return Some(tiers);
        }

        self.machine_type_entry(family, machine_type)
            .or_else(|| self.vcpu_entry(family, vcpu))
            .or_else(|| self.range_entry(family, vcpu))
            .copied()
    }

    /// Effective caps of one tier at one size: min(per-VM, per-GB × size + offset)
    pub fn effective_caps(tier: DiskTier, vm_caps: &DiskCaps, size_gb: f64) -> DiskCaps {
        match tier.scaling() {
            Some(scaling) => vm_caps.min(&scaling.caps_for(size_gb)),
            None => *vm_caps,
        }
    }

    /// Cheapest tier whose effective cap covers every needed figure
    pub fn classify(&self, query: &DiskQuery) -> Result<DiskTier> {
        let tiers = self
            .vm_limits(&query.machine_family, &query.machine_type, query.vcpu)
            .ok_or_else(|| EngineError::UnknownResourceType {
                kind: "gcp machine".to_string(),
                id: query.machine_type.clone(),
            })?;

        DiskTier::ASCENDING_PRICE
            .into_iter()
            .find(|tier| {
                tiers
                    .get(*tier)
                    .map(|vm_caps| {
                        Self::effective_caps(*tier, vm_caps, query.size_gb).covers(&query.needed)
                    })
                    .unwrap_or(false)
            })
            .ok_or_else(|| EngineError::NoFeasibleDiskType {
                machine_type: query.machine_type.clone(),
                size_gb: query.size_gb,
            })
    }
}

/// Family prefix of a machine type: `n2-standard-8` → `n2`
pub fn machine_family(machine_type: &str) -> &str {
    machine_type.split('-').next().unwrap_or(machine_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(machine_type: &str, vcpu: u32, needed: DiskCaps, size_gb: f64) -> DiskQuery {
        DiskQuery {
            machine_family: machine_family(machine_type).to_string(),
            machine_type: machine_type.to_string(),
            vcpu,
            needed,
            size_gb,
        }
    }

    #[test]
    fn test_bundled_ranges_parse() {
        for (family, range, _) in tables::vcpu_range_limits() {
            assert!(range.parse::<VcpuRange>().is_ok(), "{} {}", family, range);
        }
    }

    #[test]
    fn test_every_bundled_machine_supports_standard() {
        let limits = GcpDiskLimits::builtin();
        for (family, machine_type, _) in tables::machine_type_limits() {
            if family == "n2" {
                continue;
            }
            let tiers = limits.vm_limits(family, machine_type, 0).unwrap();
            assert!(tiers.standard.is_some(), "{}", machine_type);
        }
        for (family, vcpu, _) in tables::vcpu_limits() {
            let tiers = limits.vm_limits(family, "", vcpu).unwrap();
            assert!(tiers.standard.is_some(), "{} {}", family, vcpu);
        }
    }

    #[test]
    fn test_zero_demand_selects_standard() {
        let limits = GcpDiskLimits::builtin();
        let machines = [
            ("e2-medium", 2),
            ("e2-standard-8", 8),
            ("n1-standard-1", 1),
            ("n2-standard-2", 2),
            ("n2-highmem-128", 128),
            ("n2d-standard-48", 48),
            ("c2-standard-30", 30),
            ("c2d-highcpu-112", 112),
            ("c3-standard-176", 176),
            ("t2d-standard-4", 4),
            ("m1-ultramem-40", 40),
            ("a2-highgpu-8g", 96),
            ("g2-standard-4", 4),
        ];
        for (machine_type, vcpu) in machines {
            for size in [10.0, 500.0, 64_000.0] {
                let tier = limits
                    .classify(&query(machine_type, vcpu, DiskCaps::default(), size))
                    .unwrap();
                assert_eq!(tier, DiskTier::Standard, "{} at {} GB", machine_type, size);
            }
        }
    }

    #[test]
    fn test_iops_demand_escalates_tier() {
        let limits = GcpDiskLimits::builtin();
        // 100 GB standard gives 75 read IOPS; balanced gives 3600
        let needed = DiskCaps::new(2_000.0, 500.0, 10.0, 10.0);
        let tier = limits
            .classify(&query("n2-standard-8", 8, needed, 100.0))
            .unwrap();
        assert_eq!(tier, DiskTier::Balanced);
    }

    #[test]
    fn test_ssd_when_balanced_insufficient() {
        let limits = GcpDiskLimits::builtin();
        // 100 GB balanced: 3600 IOPS; ssd: 9000 IOPS; no extreme on n2-standard-8
        let needed = DiskCaps::new(8_000.0, 1_000.0, 10.0, 10.0);
        let tier = limits
            .classify(&query("n2-standard-8", 8, needed, 100.0))
            .unwrap();
        assert_eq!(tier, DiskTier::Ssd);
    }

    #[test]
    fn test_n2_extreme_comes_from_machine_type_table() {
        let limits = GcpDiskLimits::builtin();
        let big = limits.vm_limits("n2", "n2-standard-80", 80).unwrap();
        assert!(big.extreme.is_some());
        assert!(big.balanced.is_some(), "balanced comes from the range table");

        let small = limits.vm_limits("n2", "n2-standard-8", 8).unwrap();
        assert!(small.extreme.is_none());

        // Extreme beats SSD when available: it is earlier in price order
        let needed = DiskCaps::new(90_000.0, 90_000.0, 100.0, 100.0);
        let tier = limits
            .classify(&query("n2-standard-80", 80, needed, 1_000.0))
            .unwrap();
        assert_eq!(tier, DiskTier::Extreme);
    }

    #[test]
    fn test_machine_type_precedes_vcpu_tables() {
        let mut limits = GcpDiskLimits::default();
        let low = TierLimits {
            standard: Some(DiskCaps::new(1.0, 1.0, 1.0, 1.0)),
            ..TierLimits::default()
        };
        let high = TierLimits {
            standard: Some(DiskCaps::new(9e9, 9e9, 9e9, 9e9)),
            ..TierLimits::default()
        };
        limits.insert_vcpu_range("x1", "1-".parse().unwrap(), high);
        limits.insert_vcpu("x1", 4, high);
        limits.insert_machine_type("x1", "x1-special-4", low);

        assert_eq!(limits.vm_limits("x1", "x1-special-4", 4), Some(low));
        assert_eq!(limits.vm_limits("x1", "x1-other-4", 4), Some(high));
    }

    #[test]
    fn test_no_feasible_disk_is_explicit() {
        let limits = GcpDiskLimits::builtin();
        let needed = DiskCaps::new(1e9, 1e9, 1e9, 1e9);
        let err = limits
            .classify(&query("e2-standard-2", 2, needed, 100.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::NoFeasibleDiskType { .. }));
    }

    #[test]
    fn test_unknown_machine() {
        let limits = GcpDiskLimits::builtin();
        let err = limits
            .classify(&query("zz-standard-2", 2, DiskCaps::default(), 10.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownResourceType { .. }));
    }

    #[test]
    fn test_vcpu_range_parsing() {
        assert_eq!("16-31".parse::<VcpuRange>().unwrap(), VcpuRange::Between(16, 31));
        assert_eq!("32-".parse::<VcpuRange>().unwrap(), VcpuRange::AtLeast(32));
        assert_eq!("1".parse::<VcpuRange>().unwrap(), VcpuRange::Between(1, 1));
        assert!("31-16".parse::<VcpuRange>().is_err());
        assert!("a-b".parse::<VcpuRange>().is_err());
        assert!(VcpuRange::AtLeast(32).contains(400));
        assert!(!VcpuRange::Between(16, 31).contains(32));
    }

    #[test]
    fn test_effective_caps_scale_with_size() {
        let vm = DiskCaps::new(15_000.0, 15_000.0, 240.0, 240.0);
        let small = GcpDiskLimits::effective_caps(DiskTier::Ssd, &vm, 10.0);
        assert_eq!(small.read_iops, 6_300.0);
        let large = GcpDiskLimits::effective_caps(DiskTier::Ssd, &vm, 10_000.0);
        assert_eq!(large.read_iops, 15_000.0);
        let extreme = GcpDiskLimits::effective_caps(DiskTier::Extreme, &vm, 10.0);
        assert_eq!(extreme, vm);
    }
}
