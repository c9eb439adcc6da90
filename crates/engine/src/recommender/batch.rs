//! Multi-resource requests
//!
//! Sibling resources of one request (volumes of an instance, disks of a VM,
//! replicas of a workload) run concurrently on a [`JoinSet`]. A failed item
//! becomes an [`ItemFailure`] and never cancels its siblings.

use super::{
    EbsVolumeRecommendation, EbsVolumeRequest, Ec2InstanceRecommendation, Ec2InstanceRequest,
    GcpDiskRecommendation, GcpDiskRequest, GcpInstanceRecommendation, GcpInstanceRequest,
    RightsizingEngine,
};
use crate::error::{EngineError, Result};
use crate::models::ResourceKind;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::task::JoinSet;
use tracing::warn;

/// Why one item of a batch produced no recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub id: String,
    pub error: String,
    /// True when the caller's input was at fault rather than a dependency
    pub input_error: bool,
}

impl ItemFailure {
    fn new(id: impl Into<String>, error: &EngineError) -> Self {
        Self {
            id: id.into(),
            error: error.to_string(),
            input_error: error.is_input(),
        }
    }
}

/// Partial results plus one diagnostic per failed item, both in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome<T> {
    pub results: Vec<T>,
    pub failures: Vec<ItemFailure>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> BatchOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ec2WithVolumesRequest {
    pub instance: Ec2InstanceRequest,
    #[serde(default)]
    pub volumes: Vec<EbsVolumeRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ec2WithVolumesRecommendation {
    pub instance: Ec2InstanceRecommendation,
    pub volumes: Vec<EbsVolumeRecommendation>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpInstanceWithDisksRequest {
    pub instance: GcpInstanceRequest,
    #[serde(default)]
    pub disks: Vec<GcpDiskRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcpInstanceWithDisksRecommendation {
    pub instance: GcpInstanceRecommendation,
    pub disks: Vec<GcpDiskRecommendation>,
    pub failures: Vec<ItemFailure>,
}

impl super::Recommendation for Ec2WithVolumesRecommendation {
    fn has_recommendation(&self) -> bool {
        self.instance.recommended.is_some() || self.volumes.iter().any(|v| v.recommended.is_some())
    }
}

impl super::Recommendation for GcpInstanceWithDisksRecommendation {
    fn has_recommendation(&self) -> bool {
        self.instance.recommended.is_some() || self.disks.iter().any(|d| d.recommended.is_some())
    }
}

impl RightsizingEngine {
    /// Run `run` over every item concurrently, keeping input order
    pub(super) async fn run_batch<I, T, F, Fut>(
        &self,
        kind: ResourceKind,
        items: Vec<I>,
        id_of: impl Fn(&I) -> String,
        run: F,
    ) -> BatchOutcome<T>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(RightsizingEngine, I) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let ids: Vec<String> = items.iter().map(&id_of).collect();
        let mut tasks = JoinSet::new();
        for (index, item) in items.into_iter().enumerate() {
            let call = run(self.clone(), item);
            tasks.spawn(async move { (index, call.await) });
        }

        let mut slots: Vec<Option<Result<T>>> = ids.iter().map(|_| None).collect();
        let mut aborted = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "Batch task did not complete");
                    aborted.push(e.to_string());
                }
            }
        }

        let mut outcome = BatchOutcome::default();
        for (id, slot) in ids.into_iter().zip(slots) {
            match slot {
                Some(Ok(result)) => outcome.results.push(result),
                Some(Err(e)) => {
                    self.metrics.inc_batch_failure(kind.as_str());
                    outcome.failures.push(ItemFailure::new(id, &e));
                }
                // Reported below with the join error text
                None => {}
            }
        }
        for error in aborted {
            self.metrics.inc_batch_failure(kind.as_str());
            outcome.failures.push(ItemFailure {
                id: "<aborted>".to_string(),
                error,
                input_error: false,
            });
        }
        outcome
    }

    /// Independent EBS volumes
    pub async fn optimize_ebs_volumes(
        &self,
        requests: Vec<EbsVolumeRequest>,
    ) -> BatchOutcome<EbsVolumeRecommendation> {
        self.run_batch(
            ResourceKind::EbsVolume,
            requests,
            |r| r.volume_id.clone(),
            |engine, request| async move { engine.optimize_ebs_volume(&request).await },
        )
        .await
    }

    /// An instance and its attached volumes; only the instance can fail the call
    pub async fn optimize_ec2_with_volumes(
        &self,
        request: Ec2WithVolumesRequest,
    ) -> Result<Ec2WithVolumesRecommendation> {
        let volumes = self.optimize_ebs_volumes(request.volumes);
        let (instance, volumes) = tokio::join!(self.optimize_ec2_instance(&request.instance), volumes);

        Ok(Ec2WithVolumesRecommendation {
            instance: instance?,
            volumes: volumes.results,
            failures: volumes.failures,
        })
    }

    /// A VM and its persistent disks.
    ///
    /// Disks are classified against the recommended machine type when there
    /// is one, since that is the VM they will be attached to.
    pub async fn optimize_gcp_instance_with_disks(
        &self,
        request: GcpInstanceWithDisksRequest,
    ) -> Result<GcpInstanceWithDisksRecommendation> {
        let instance = self.optimize_gcp_instance(&request.instance).await?;
        let machine_type = instance
            .recommended
            .as_ref()
            .map(|r| r.profile.machine_type.clone())
            .unwrap_or_else(|| instance.current.profile.machine_type.clone());

        let disks = self
            .run_batch(
                ResourceKind::GcpDisk,
                request.disks,
                |d| d.disk_id.clone(),
                move |engine, disk| {
                    let machine_type = machine_type.clone();
                    async move {
                        engine
                            .observe(
                                ResourceKind::GcpDisk,
                                &disk.disk_id,
                                engine.recommend_gcp_disk(&disk, &machine_type),
                            )
                            .await
                    }
                },
            )
            .await;

        Ok(GcpInstanceWithDisksRecommendation {
            instance,
            disks: disks.results,
            failures: disks.failures,
        })
    }
}
