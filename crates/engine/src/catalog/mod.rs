//! Resource-type catalog and cheapest-fit search
//!
//! The catalog is a read-only snapshot of purchasable configurations
//! (instance types, volume types, machine types). Recommenders describe what
//! they need as a [`ConstraintSet`] and ask for the cheapest entry that fits.

mod constraints;
mod memory;

pub use constraints::{CapacityFloor, Constraint, ConstraintSet, Operator};
pub(crate) use constraints::format_number;
pub use memory::InMemoryCatalog;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Column names shared by the catalog snapshot and the recommenders
pub mod columns {
    pub const INSTANCE_TYPE: &str = "instance_type";
    pub const INSTANCE_FAMILY: &str = "instance_family";
    pub const VCPU: &str = "vcpu";
    pub const MEMORY_GB: &str = "memory_gb";
    pub const NETWORK_THROUGHPUT_BPS: &str = "network_throughput_bps";
    pub const EBS_BASELINE_IOPS: &str = "ebs_baseline_iops";
    pub const EBS_BASELINE_THROUGHPUT_MBPS: &str = "ebs_baseline_throughput_mbps";
    pub const REGION: &str = "region";
    pub const TENANCY: &str = "tenancy";
    pub const OPERATION: &str = "operation";
    pub const PRE_INSTALLED_SW: &str = "pre_installed_sw";
    pub const OPERATING_SYSTEM: &str = "operating_system";
    pub const LICENSE_MODEL: &str = "license_model";
    pub const PROCESSOR_ARCHITECTURE: &str = "processor_architecture";
    pub const CURRENT_GENERATION: &str = "current_generation";
    pub const ENA_SUPPORT: &str = "ena_support";
    pub const PHYSICAL_PROCESSOR: &str = "physical_processor";
    pub const CLOCK_SPEED_GHZ: &str = "clock_speed_ghz";

    pub const VOLUME_TYPE: &str = "volume_type";
    pub const MIN_SIZE_GB: &str = "min_size_gb";
    pub const MAX_SIZE_GB: &str = "max_size_gb";
    pub const MAX_IOPS: &str = "max_iops";
    pub const MAX_THROUGHPUT_MBPS: &str = "max_throughput_mbps";

    pub const DATABASE_ENGINE: &str = "database_engine";
    pub const DEPLOYMENT_OPTION: &str = "deployment_option";

    pub const MACHINE_TYPE: &str = "machine_type";
    pub const MACHINE_FAMILY: &str = "machine_family";
}

/// The catalog tables the engine queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Ec2InstanceTypes,
    EbsVolumeTypes,
    RdsInstanceTypes,
    RdsStorageTypes,
    GcpMachineTypes,
}

impl CatalogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ec2InstanceTypes => "ec2_instance_types",
            Self::EbsVolumeTypes => "ebs_volume_types",
            Self::RdsInstanceTypes => "rds_instance_types",
            Self::RdsStorageTypes => "rds_storage_types",
            Self::GcpMachineTypes => "gcp_machine_types",
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog cell: numbers stay numbers so that `>=` comparisons work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One row of a catalog table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Stable identifier, also the price tie-breaker
    pub id: String,
    /// Relative price used for ordering (e.g. on-demand hourly)
    pub price: f64,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            price,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(column.to_string(), value.into());
        self
    }

    pub fn attribute(&self, column: &str) -> Option<&AttributeValue> {
        self.attributes.get(column)
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        self.attribute(column).and_then(AttributeValue::as_number)
    }

    /// Attribute rendered as text, `None` when absent or blank
    pub fn text(&self, column: &str) -> Option<String> {
        self.attribute(column)
            .map(|v| v.to_string())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Read-only query interface over a catalog snapshot
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Cheapest entry satisfying every constraint and the optional capacity floor.
    ///
    /// `Ok(None)` is a normal "no match"; `Err` means the catalog itself failed.
    async fn cheapest_fit(
        &self,
        kind: CatalogKind,
        constraints: &ConstraintSet,
        floor: Option<&CapacityFloor>,
    ) -> Result<Option<CatalogEntry>>;

    /// First entry, in identifier order, satisfying every constraint
    async fn find_first(
        &self,
        kind: CatalogKind,
        constraints: &ConstraintSet,
    ) -> Result<Option<CatalogEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_value_untagged_json() {
        let entry: CatalogEntry = serde_json::from_str(
            r#"{"id":"m5.large","price":0.096,"attributes":{"vcpu":2,"region":"us-east-1"}}"#,
        )
        .unwrap();
        assert_eq!(entry.number(columns::VCPU), Some(2.0));
        assert_eq!(entry.text(columns::REGION).as_deref(), Some("us-east-1"));
        assert_eq!(entry.text(columns::TENANCY), None);
    }

    #[test]
    fn test_blank_text_is_absent() {
        let entry = CatalogEntry::new("x", 1.0).with(columns::LICENSE_MODEL, "  ");
        assert_eq!(entry.text(columns::LICENSE_MODEL), None);
    }
}
