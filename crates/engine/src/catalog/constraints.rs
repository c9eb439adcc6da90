//! Constraint sets evaluated against catalog entries

use super::CatalogEntry;
use crate::error::{EngineError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

const NUMERIC_EPSILON: f64 = 1e-9;

/// Comparison applied between a catalog column and a constraint value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Gte,
    Lte,
}

impl Operator {
    fn is_ordering(&self) -> bool {
        matches!(self, Operator::Gte | Operator::Lte)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
        };
        f.write_str(symbol)
    }
}

/// One (column, operator, value) triple
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub column: String,
    pub op: Operator,
    pub value: String,
}

impl Constraint {
    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        let Some(actual) = entry.attribute(&self.column) else {
            return self.op == Operator::NotEq;
        };

        match self.op {
            Operator::Eq | Operator::NotEq => {
                let equal = match (actual.as_number(), self.value.trim().parse::<f64>()) {
                    (Some(a), Ok(v)) => (a - v).abs() < NUMERIC_EPSILON,
                    _ => actual.to_string().eq_ignore_ascii_case(self.value.trim()),
                };
                equal == (self.op == Operator::Eq)
            }
            Operator::Gte | Operator::Lte => {
                match (actual.as_number(), self.value.trim().parse::<f64>()) {
                    (Some(a), Ok(v)) if self.op == Operator::Gte => a + NUMERIC_EPSILON >= v,
                    (Some(a), Ok(v)) => a <= v + NUMERIC_EPSILON,
                    _ => false,
                }
            }
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op, self.value)
    }
}

/// Named custom predicate, for rules a column comparison cannot express
#[derive(Clone)]
pub struct Predicate {
    pub name: String,
    test: Arc<dyn Fn(&CatalogEntry) -> bool + Send + Sync>,
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("name", &self.name).finish()
    }
}

/// Minimum secondary capacity (e.g. network throughput) an entry must offer
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityFloor {
    pub column: String,
    pub minimum: f64,
}

impl CapacityFloor {
    pub fn new(column: &str, minimum: f64) -> Self {
        Self {
            column: column.to_string(),
            minimum,
        }
    }

    pub fn admits(&self, entry: &CatalogEntry) -> bool {
        if self.minimum <= 0.0 {
            return true;
        }
        entry
            .number(&self.column)
            .map(|capacity| capacity + NUMERIC_EPSILON >= self.minimum)
            .unwrap_or(false)
    }
}

/// A set of constraints keyed by column.
///
/// Equality is the default operator; columns registered with
/// [`ConstraintSet::with_operator`] always use their override. Values that are
/// effectively empty are never stored.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    constraints: BTreeMap<String, Constraint>,
    overrides: HashMap<String, Operator>,
    predicates: Vec<Predicate>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an override operator for a column
    pub fn with_operator(mut self, column: &str, op: Operator) -> Self {
        self.overrides.insert(column.to_string(), op);
        self
    }

    /// Constrain a column using its default or override operator
    pub fn set(&mut self, column: &str, value: impl Into<String>) -> Result<()> {
        let op = self.overrides.get(column).copied().unwrap_or(Operator::Eq);
        self.set_with(column, op, value)
    }

    /// Constrain a column with an explicit operator
    pub fn set_with(&mut self, column: &str, op: Operator, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        if op.is_ordering() && trimmed.parse::<f64>().is_err() {
            return Err(EngineError::InvalidInput(format!(
                "column {} expects a number, got {:?}",
                column, trimmed
            )));
        }
        self.constraints.insert(
            column.to_string(),
            Constraint {
                column: column.to_string(),
                op,
                value: trimmed.to_string(),
            },
        );
        Ok(())
    }

    /// Numeric constraint; non-finite values are dropped like empty ones
    pub fn set_number(&mut self, column: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Ok(());
        }
        self.set(column, format_number(value))
    }

    pub fn add_predicate<F>(&mut self, name: &str, test: F)
    where
        F: Fn(&CatalogEntry) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Predicate {
            name: name.to_string(),
            test: Arc::new(test),
        });
    }

    pub fn contains(&self, column: &str) -> bool {
        self.constraints.contains_key(column)
    }

    pub fn get(&self, column: &str) -> Option<&Constraint> {
        self.constraints.get(column)
    }

    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.values()
    }

    pub fn predicate_names(&self) -> impl Iterator<Item = &str> {
        self.predicates.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.constraints.len() + self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        self.constraints.values().all(|c| c.matches(entry))
            && self.predicates.iter().all(|p| (p.test)(entry))
    }
}

impl fmt::Display for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.constraints.values().map(|c| c.to_string()).collect();
        parts.extend(self.predicates.iter().map(|p| format!("<{}>", p.name)));
        f.write_str(&parts.join(", "))
    }
}

/// Render a number without trailing noise (2 rather than 2.000000)
pub(crate) fn format_number(value: f64) -> String {
    let rounded = (value * 1_000_000.0).round() / 1_000_000.0;
    format!("{}", rounded)
}
