//! Traffic routing seam between the rollout controller and a service mesh
//!
//! The rollout controller decides *what* the canary weight should be; a
//! `TrafficRouter` makes the mesh agree with it.

use async_trait::async_trait;
use thiserror::Error;

/// Failure of a mesh object store call
///
/// `kind` is the Kubernetes kind of the object, e.g. "VirtualRouter".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{namespace}/{name}' not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("{kind} '{namespace}/{name}' was modified concurrently")]
    Conflict {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("{kind} object missing name in metadata")]
    MissingName { kind: &'static str },

    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Errors surfaced to the rollout controller by traffic routing
///
/// Every variant is terminal for the call. Retrying is the caller's job.
#[derive(Debug, Error)]
pub enum TrafficRoutingError {
    #[error("VirtualService '{name}' is missing: {source}")]
    VirtualServiceMissing {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("VirtualService '{name}' must use a virtual router provider")]
    VirtualServiceNotUsingVirtualRouter { name: String },

    #[error("VirtualRouter '{name}' is missing")]
    VirtualRouterMissing { name: String },

    #[error("{kind} '{name}' is not well formed: {reason}")]
    NotWellFormed {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("Desired weight must be 0-100, got {0}")]
    InvalidWeight(i32),

    #[error("Invalid traffic routing config: {0}")]
    InvalidConfig(String),

    #[error("Failed to {verb} {kind} '{name}': {source}")]
    Store {
        verb: &'static str,
        kind: &'static str,
        name: String,
        #[source]
        source: StoreError,
    },
}

impl TrafficRoutingError {
    /// True when the failure comes down to an object that does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            TrafficRoutingError::VirtualRouterMissing { .. } => true,
            TrafficRoutingError::VirtualServiceMissing { source, .. }
            | TrafficRoutingError::Store { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True when a write lost an optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            TrafficRoutingError::Store {
                source: StoreError::Conflict { .. },
                ..
            }
        )
    }
}

/// A mesh integration the rollout controller can shift traffic with
///
/// Implementations hold no state between calls and are safe to call from
/// concurrent reconciles of different rollouts.
#[async_trait]
pub trait TrafficRouter: Send + Sync {
    /// Integration name for logging (e.g. "appmesh")
    fn name(&self) -> &'static str;

    /// Route `desired_weight` percent of traffic to canary and the rest to stable
    async fn set_weight(&self, desired_weight: i32) -> Result<(), TrafficRoutingError>;

    /// Point the canary and stable backends at the given pod template hashes
    async fn update_hash(
        &self,
        canary_hash: &str,
        stable_hash: &str,
    ) -> Result<(), TrafficRoutingError>;

    /// Check the mesh serves `desired_weight`
    ///
    /// `Ok(None)` means the integration cannot verify weights.
    async fn verify_weight(&self, desired_weight: i32)
        -> Result<Option<bool>, TrafficRoutingError>;
}
