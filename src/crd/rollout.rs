use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Rollout is a Custom Resource for managing progressive delivery
///
/// Only the fields App Mesh traffic routing reads are modelled here.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "kulta.io",
    version = "v1alpha1",
    kind = "Rollout",
    namespaced,
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct RolloutSpec {
    /// Number of desired pods
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Label selector for pods
    pub selector: LabelSelector,

    /// Template describes the pods that will be created
    pub template: PodTemplateSpec,

    /// Deployment strategy
    pub strategy: RolloutStrategy,
}

fn default_replicas() -> i32 {
    1
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct RolloutStrategy {
    /// Canary deployment strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canary: Option<CanaryStrategy>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct CanaryStrategy {
    /// Steps define the canary rollout progression
    #[serde(default)]
    pub steps: Vec<CanaryStep>,

    /// Traffic routing configuration
    #[serde(rename = "trafficRouting", skip_serializing_if = "Option::is_none")]
    pub traffic_routing: Option<TrafficRouting>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct CanaryStep {
    /// Set the percentage of traffic to route to canary
    #[serde(rename = "setWeight", skip_serializing_if = "Option::is_none")]
    pub set_weight: Option<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct TrafficRouting {
    /// AWS App Mesh configuration
    #[serde(rename = "appMesh", skip_serializing_if = "Option::is_none")]
    pub app_mesh: Option<AppMeshTrafficRouting>,
}

/// App Mesh traffic routing
///
/// Names the virtual service whose router gets its weights shifted, and the
/// pair of virtual nodes that front the canary and stable pods.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct AppMeshTrafficRouting {
    /// Virtual service (and routes) to manipulate
    #[serde(rename = "virtualService")]
    pub virtual_service: AppMeshVirtualService,

    /// Canary and stable virtual nodes
    #[serde(rename = "virtualNodeGroup")]
    pub virtual_node_group: AppMeshVirtualNodeGroup,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct AppMeshVirtualService {
    /// Name of the VirtualService (must use a virtual router provider)
    pub name: String,

    /// Routes of the virtual router to update. Empty means every route.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct AppMeshVirtualNodeGroup {
    /// Virtual node selecting canary pods
    #[serde(rename = "canaryVirtualNodeRef")]
    pub canary_virtual_node_ref: AppMeshVirtualNodeReference,

    /// Virtual node selecting stable pods
    #[serde(rename = "stableVirtualNodeRef")]
    pub stable_virtual_node_ref: AppMeshVirtualNodeReference,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct AppMeshVirtualNodeReference {
    /// Name of the VirtualNode in the rollout's namespace
    pub name: String,
}

impl Rollout {
    /// App Mesh routing of the canary strategy, if configured
    pub fn app_mesh_routing(&self) -> Option<&AppMeshTrafficRouting> {
        self.spec
            .strategy
            .canary
            .as_ref()?
            .traffic_routing
            .as_ref()?
            .app_mesh
            .as_ref()
    }
}

#[cfg(test)]
#[path = "rollout_test.rs"]
mod tests;
