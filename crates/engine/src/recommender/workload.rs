//! Kubernetes workload aggregation
//!
//! All replicas of a workload share one pod template, so they must receive
//! the same recommendation. Per-container series of every replica are folded
//! with a point-wise max and sized once at workload level; each replica is
//! then sized on its own for visibility and has its current, recommended and
//! description fields overwritten with the workload-level result.

use super::{
    ContainerRecommendation, ItemFailure, KubernetesContainer, KubernetesPodRequest,
    PodRecommendation, RightsizingEngine,
};
use crate::error::{EngineError, Result};
use crate::models::{MetricSeries, ResourceKind};
use crate::timeseries::merge_max;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
}

impl WorkloadKind {
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            Self::Deployment => ResourceKind::KubernetesDeployment,
            Self::StatefulSet => ResourceKind::KubernetesStatefulSet,
            Self::DaemonSet => ResourceKind::KubernetesDaemonSet,
            Self::Job => ResourceKind::KubernetesJob,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesWorkloadRequest {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
    pub replicas: Vec<KubernetesPodRequest>,
    /// Applied to the workload and to replicas that carry none of their own
    #[serde(default)]
    pub preferences: HashMap<String, Option<String>>,
}

impl KubernetesWorkloadRequest {
    pub fn resource_id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// One synthetic pod whose container series are the replicas' point-wise max.
    ///
    /// Containers keep first-seen order; current settings come from the first
    /// replica that runs the container.
    fn merged_pod(&self) -> KubernetesPodRequest {
        let mut containers: Vec<KubernetesContainer> = Vec::new();
        for replica in &self.replicas {
            for container in &replica.containers {
                match containers.iter_mut().find(|c| c.name == container.name) {
                    Some(merged) => merged.metrics = merge_series(&merged.metrics, &container.metrics),
                    None => containers.push(container.clone()),
                }
            }
        }

        KubernetesPodRequest {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            containers,
            preferences: self.preferences.clone(),
        }
    }
}

fn merge_series(a: &MetricSeries, b: &MetricSeries) -> MetricSeries {
    let mut names: Vec<&str> = a.names().chain(b.names()).collect();
    names.sort_unstable();
    names.dedup();
    names
        .into_iter()
        .map(|name| (name.to_string(), merge_max(a.get(name), b.get(name))))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadRecommendation {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
    /// Workload-level result, one entry per container
    pub containers: Vec<ContainerRecommendation>,
    /// Per-replica results carrying the workload-level recommendation
    pub replicas: Vec<PodRecommendation>,
    pub failures: Vec<ItemFailure>,
}

impl super::Recommendation for WorkloadRecommendation {
    fn has_recommendation(&self) -> bool {
        self.containers.iter().any(|c| c.recommended.is_some())
    }
}

impl RightsizingEngine {
    /// One recommendation per container, shared by every replica
    pub async fn optimize_kubernetes_workload(
        &self,
        request: &KubernetesWorkloadRequest,
    ) -> Result<WorkloadRecommendation> {
        self.observe(
            request.kind.resource_kind(),
            &request.resource_id(),
            self.recommend_workload(request),
        )
        .await
    }

    async fn recommend_workload(
        &self,
        request: &KubernetesWorkloadRequest,
    ) -> Result<WorkloadRecommendation> {
        if request.replicas.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "workload {} has no replicas",
                request.resource_id()
            )));
        }
        let kind = request.kind.resource_kind();

        let merged = request.merged_pod();
        debug!(
            workload = %request.resource_id(),
            replicas = request.replicas.len(),
            containers = merged.containers.len(),
            "Merged replica series"
        );
        let workload = self.recommend_pod(&merged, kind, true).await?;

        let replicas: Vec<KubernetesPodRequest> = request
            .replicas
            .iter()
            .cloned()
            .map(|mut replica| {
                if replica.preferences.is_empty() {
                    replica.preferences = request.preferences.clone();
                }
                replica
            })
            .collect();
        let mut sized = self
            .run_batch(
                ResourceKind::KubernetesPod,
                replicas,
                KubernetesPodRequest::resource_id,
                |engine, replica| async move {
                    engine
                        .recommend_pod(&replica, ResourceKind::KubernetesPod, false)
                        .await
                },
            )
            .await;

        for replica in &mut sized.results {
            for container in &mut replica.containers {
                if let Some(shared) = workload.containers.iter().find(|c| c.name == container.name) {
                    container.current = shared.current.clone();
                    container.recommended = shared.recommended.clone();
                    container.description = shared.description.clone();
                }
            }
        }

        Ok(WorkloadRecommendation {
            kind: request.kind,
            namespace: request.namespace.clone(),
            name: request.name.clone(),
            containers: workload.containers,
            replicas: sized.results,
            failures: sized.failures,
        })
    }
}
