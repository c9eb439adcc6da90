//! Resource rightsizing recommendation engine
//!
//! This crate provides:
//! - Time-series utilities for merging and summarising telemetry
//! - Cheapest-fit search over in-memory resource catalogs
//! - Recommenders for EC2 instances, EBS volumes, RDS instances, GCP
//!   instances and persistent disks, Kubernetes pods and workloads
//! - Health checks and observability for the engine's collaborators

pub mod catalog;
pub mod error;
pub mod health;
pub mod limits;
pub mod models;
pub mod observability;
pub mod preferences;
pub mod recommender;
pub mod services;
pub mod timeseries;

pub use catalog::{CatalogEntry, CatalogKind, CatalogRepository, InMemoryCatalog};
pub use error::{EngineError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use limits::{DiskTier, GcpDiskLimits};
pub use models::*;
pub use observability::{EngineMetrics, RecommendationLogger};
pub use preferences::{PreferenceKey, Preferences};
pub use recommender::*;
pub use services::{
    CostQuery, CostQuoter, DisabledExplainer, ExplainRequest, Explainer, HttpCostQuoter,
    HttpExplainer,
};
