//! In-memory catalog snapshot loaded once at startup

use super::{CapacityFloor, CatalogEntry, CatalogKind, CatalogRepository, ConstraintSet};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Catalog snapshot held in memory.
///
/// Tables are sorted by entry id so iteration order, and therefore price
/// tie-breaking, is deterministic.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    tables: HashMap<CatalogKind, Vec<CatalogEntry>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) one table
    pub fn with_table(mut self, kind: CatalogKind, mut entries: Vec<CatalogEntry>) -> Self {
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        self.tables.insert(kind, entries);
        self
    }

    /// Parse a JSON snapshot: an object with one array per catalog kind
    pub fn from_json(content: &str) -> Result<Self> {
        let tables: HashMap<CatalogKind, Vec<CatalogEntry>> = serde_json::from_str(content)
            .map_err(|e| EngineError::CatalogUnavailable(format!("invalid catalog snapshot: {}", e)))?;

        let catalog = tables
            .into_iter()
            .fold(Self::new(), |catalog, (kind, entries)| catalog.with_table(kind, entries));
        Ok(catalog)
    }

    /// Load a JSON snapshot from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::CatalogUnavailable(format!("failed to read {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json(&content)?;
        info!(
            path = %path.display(),
            tables = catalog.tables.len(),
            entries = catalog.entry_count(),
            "Loaded catalog snapshot"
        );
        Ok(catalog)
    }

    pub fn entry_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    fn table(&self, kind: CatalogKind) -> Result<&[CatalogEntry]> {
        self.tables
            .get(&kind)
            .map(Vec::as_slice)
            .ok_or_else(|| EngineError::CatalogUnavailable(format!("table {} not loaded", kind)))
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn cheapest_fit(
        &self,
        kind: CatalogKind,
        constraints: &ConstraintSet,
        floor: Option<&CapacityFloor>,
    ) -> Result<Option<CatalogEntry>> {
        let table = self.table(kind)?;

        let best = table
            .iter()
            .filter(|entry| constraints.matches(entry))
            .filter(|entry| floor.map_or(true, |f| f.admits(entry)))
            .min_by(|a, b| a.price.total_cmp(&b.price).then_with(|| a.id.cmp(&b.id)))
            .cloned();

        debug!(
            catalog = %kind,
            constraints = %constraints,
            floor = ?floor.map(|f| (&f.column, f.minimum)),
            found = ?best.as_ref().map(|e| &e.id),
            "Cheapest-fit search"
        );
        Ok(best)
    }

    async fn find_first(
        &self,
        kind: CatalogKind,
        constraints: &ConstraintSet,
    ) -> Result<Option<CatalogEntry>> {
        let table = self.table(kind)?;
        Ok(table.iter().find(|entry| constraints.matches(entry)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{columns, Operator};
    use std::io::Write;

    fn instance(id: &str, price: f64, vcpu: f64, memory: f64) -> CatalogEntry {
        CatalogEntry::new(id, price)
            .with(columns::INSTANCE_TYPE, id)
            .with(columns::VCPU, vcpu)
            .with(columns::MEMORY_GB, memory)
            .with(columns::REGION, "us-east-1")
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new().with_table(
            CatalogKind::Ec2InstanceTypes,
            vec![
                instance("m5.xlarge", 0.192, 4.0, 16.0),
                instance("m5.large", 0.096, 2.0, 8.0),
                instance("c5.large", 0.085, 2.0, 4.0),
                instance("t3.small", 0.0208, 2.0, 2.0),
            ],
        )
    }

    fn sizing(vcpu: f64, memory: f64) -> ConstraintSet {
        let mut set = ConstraintSet::new()
            .with_operator(columns::VCPU, Operator::Gte)
            .with_operator(columns::MEMORY_GB, Operator::Gte);
        set.set_number(columns::VCPU, vcpu).unwrap();
        set.set_number(columns::MEMORY_GB, memory).unwrap();
        set
    }

    #[tokio::test]
    async fn test_cheapest_fit_picks_lowest_price() {
        let found = catalog()
            .cheapest_fit(CatalogKind::Ec2InstanceTypes, &sizing(1.0, 3.0), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "c5.large");
    }

    #[tokio::test]
    async fn test_result_satisfies_every_constraint() {
        let catalog = catalog();
        for (vcpu, memory) in [(0.2, 0.5), (2.0, 6.0), (3.0, 1.0), (1.0, 16.0)] {
            let set = sizing(vcpu, memory);
            if let Some(found) = catalog
                .cheapest_fit(CatalogKind::Ec2InstanceTypes, &set, None)
                .await
                .unwrap()
            {
                assert!(set.constraints().all(|c| c.matches(&found)));
                assert!(found.number(columns::VCPU).unwrap() >= vcpu);
                assert!(found.number(columns::MEMORY_GB).unwrap() >= memory);
            }
        }
    }

    #[tokio::test]
    async fn test_no_match_is_not_an_error() {
        let found = catalog()
            .cheapest_fit(CatalogKind::Ec2InstanceTypes, &sizing(64.0, 1.0), None)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_missing_table_is_hard_error() {
        let err = catalog()
            .cheapest_fit(CatalogKind::GcpMachineTypes, &ConstraintSet::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CatalogUnavailable(_)));
    }

    #[tokio::test]
    async fn test_equal_price_breaks_on_id() {
        let catalog = InMemoryCatalog::new().with_table(
            CatalogKind::Ec2InstanceTypes,
            vec![instance("z1.large", 0.1, 2.0, 8.0), instance("a1.large", 0.1, 2.0, 8.0)],
        );
        let found = catalog
            .cheapest_fit(CatalogKind::Ec2InstanceTypes, &ConstraintSet::new(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "a1.large");
    }

    #[tokio::test]
    async fn test_capacity_floor_excludes_slow_entries() {
        let catalog = InMemoryCatalog::new().with_table(
            CatalogKind::Ec2InstanceTypes,
            vec![
                instance("slow", 0.01, 2.0, 8.0).with(columns::NETWORK_THROUGHPUT_BPS, 1e8),
                instance("fast", 0.02, 2.0, 8.0).with(columns::NETWORK_THROUGHPUT_BPS, 1e9),
            ],
        );
        let floor = CapacityFloor::new(columns::NETWORK_THROUGHPUT_BPS, 5e8);
        let found = catalog
            .cheapest_fit(CatalogKind::Ec2InstanceTypes, &ConstraintSet::new(), Some(&floor))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "fast");
    }

    #[tokio::test]
    async fn test_find_first_in_id_order() {
        let mut set = ConstraintSet::new();
        set.set(columns::VCPU, "2").unwrap();
        let found = catalog()
            .find_first(CatalogKind::Ec2InstanceTypes, &set)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "c5.large");
    }

    #[test]
    fn test_from_path_loads_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"gcp_machine_types":[{{"id":"e2-small","price":0.0168,"attributes":{{"vcpu":2,"memory_gb":2}}}}]}}"#
        )
        .unwrap();
        let catalog = InMemoryCatalog::from_path(file.path()).unwrap();
        assert_eq!(catalog.entry_count(), 1);
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = InMemoryCatalog::from_path("/nonexistent/catalog.json").unwrap_err();
        assert!(matches!(err, EngineError::CatalogUnavailable(_)));
    }
}
