use crate::controller::events::{EventRecorder, RolloutEvent};
use crate::controller::traffic::{StoreError, TrafficRouter, TrafficRoutingError};
use crate::controller::validation::validate_rollout;
use crate::crd::appmesh::{
    MeshResource, VirtualNodeSpec, VirtualRouterSpec, VirtualServiceProvider, VirtualServiceSpec,
};
use crate::crd::rollout::{AppMeshTrafficRouting, Rollout};
use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::hash::{resolve_selector_hashes, set_selector_hash, ROLLOUT_HASH_LABEL_KEY};
use super::router::{set_route_weights, WeightedBackends};
use super::store::MeshStore;

/// Collaborators for an App Mesh reconciler
pub struct ReconcilerConfig {
    pub rollout: Arc<Rollout>,
    pub store: Arc<dyn MeshStore>,
    pub recorder: Arc<dyn EventRecorder>,
}

/// Shifts traffic for one Rollout through AWS App Mesh
///
/// Edits the weighted targets of the virtual router behind the rollout's
/// virtual service, and the pod selectors of its canary/stable virtual nodes.
/// Objects are re-read on every call; nothing is cached.
pub struct AppMeshReconciler {
    rollout_name: String,
    namespace: String,
    routing: AppMeshTrafficRouting,
    store: Arc<dyn MeshStore>,
    recorder: Arc<dyn EventRecorder>,
}

impl std::fmt::Debug for AppMeshReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppMeshReconciler")
            .field("rollout_name", &self.rollout_name)
            .field("namespace", &self.namespace)
            .field("routing", &self.routing)
            .finish_non_exhaustive()
    }
}

impl AppMeshReconciler {
    /// Create a reconciler for the rollout in `config`
    ///
    /// # Errors
    /// `InvalidConfig` if the rollout has no namespace, no App Mesh traffic
    /// routing, or fails validation.
    pub fn new(config: ReconcilerConfig) -> Result<Self, TrafficRoutingError> {
        let rollout = config.rollout;

        let namespace = rollout
            .namespace()
            .ok_or_else(|| TrafficRoutingError::InvalidConfig("Rollout missing namespace".into()))?;

        let routing = rollout.app_mesh_routing().cloned().ok_or_else(|| {
            TrafficRoutingError::InvalidConfig(
                "spec.strategy.canary.trafficRouting.appMesh is not set".into(),
            )
        })?;

        validate_rollout(&rollout).map_err(TrafficRoutingError::InvalidConfig)?;

        Ok(AppMeshReconciler {
            rollout_name: rollout.name_any(),
            namespace,
            routing,
            store: config.store,
            recorder: config.recorder,
        })
    }

    /// Fetch the virtual service and return the router it points at
    ///
    /// Returns (router namespace, router name).
    async fn resolve_virtual_router(&self) -> Result<(String, String), TrafficRoutingError> {
        let vsvc_name = &self.routing.virtual_service.name;

        let vsvc = match self
            .store
            .get(MeshResource::VirtualService, &self.namespace, vsvc_name)
            .await
        {
            Ok(object) => object,
            Err(source) => {
                warn!(
                    rollout = %self.rollout_name,
                    virtual_service = %vsvc_name,
                    error = %source,
                    "VirtualService lookup failed"
                );
                let event = if source.is_not_found() {
                    RolloutEvent::warning(
                        "VirtualServiceNotFound",
                        format!("VirtualService `{}` not found", vsvc_name),
                    )
                } else {
                    RolloutEvent::warning(
                        "VirtualServiceLookupFailed",
                        format!("Failed to get VirtualService `{}`: {}", vsvc_name, source),
                    )
                };
                self.recorder.record(event).await;
                return Err(TrafficRoutingError::VirtualServiceMissing {
                    name: vsvc_name.clone(),
                    source,
                });
            }
        };

        let spec: VirtualServiceSpec = decode_spec(&vsvc, MeshResource::VirtualService)?;
        match spec.provider {
            VirtualServiceProvider::VirtualRouter(provider) => {
                // A router given only by ARN can't be looked up in the cluster
                let Some(router_ref) = provider.virtual_router_ref else {
                    let arn = provider
                        .extra
                        .get("virtualRouterARN")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    warn!(
                        rollout = %self.rollout_name,
                        virtual_service = %vsvc_name,
                        virtual_router_arn = %arn,
                        "VirtualService has no virtualRouterRef"
                    );
                    self.recorder
                        .record(RolloutEvent::warning(
                            "VirtualRouterNotFound",
                            format!(
                                "VirtualService `{}` has no virtualRouterRef to resolve",
                                vsvc_name
                            ),
                        ))
                        .await;
                    return Err(TrafficRoutingError::VirtualRouterMissing { name: arn });
                };

                // Router may live in another namespace
                let namespace = router_ref
                    .namespace
                    .unwrap_or_else(|| self.namespace.clone());
                Ok((namespace, router_ref.name))
            }
            VirtualServiceProvider::VirtualNode(_) => {
                Err(TrafficRoutingError::VirtualServiceNotUsingVirtualRouter {
                    name: vsvc_name.clone(),
                })
            }
        }
    }

    async fn fetch_virtual_router(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, TrafficRoutingError> {
        match self
            .store
            .get(MeshResource::VirtualRouter, namespace, name)
            .await
        {
            Ok(object) => Ok(object),
            Err(StoreError::NotFound { .. }) => {
                warn!(
                    rollout = %self.rollout_name,
                    virtual_router = %name,
                    namespace = %namespace,
                    "VirtualRouter not found"
                );
                self.recorder
                    .record(RolloutEvent::warning(
                        "VirtualRouterNotFound",
                        format!("VirtualRouter `{}` not found", name),
                    ))
                    .await;
                Err(TrafficRoutingError::VirtualRouterMissing {
                    name: name.to_string(),
                })
            }
            Err(source) => Err(TrafficRoutingError::Store {
                verb: "get",
                kind: MeshResource::VirtualRouter.kind(),
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Set the rollout hash label on one virtual node and write it back
    async fn update_virtual_node_hash(
        &self,
        name: &str,
        hash: &str,
    ) -> Result<(), TrafficRoutingError> {
        let mut vnode = self
            .store
            .get(MeshResource::VirtualNode, &self.namespace, name)
            .await
            .map_err(|source| TrafficRoutingError::Store {
                verb: "get",
                kind: MeshResource::VirtualNode.kind(),
                name: name.to_string(),
                source,
            })?;

        // Set the label on the typed spec, then write it back into the object
        let mut spec: VirtualNodeSpec = decode_spec(&vnode, MeshResource::VirtualNode)?;
        let previous = set_selector_hash(&mut spec, hash);
        encode_spec(&mut vnode, MeshResource::VirtualNode, &spec)?;

        self.store
            .replace(MeshResource::VirtualNode, &self.namespace, &vnode)
            .await
            .map_err(|source| {
                error!(
                    rollout = %self.rollout_name,
                    virtual_node = %name,
                    error = %source,
                    "Failed to update VirtualNode"
                );
                TrafficRoutingError::Store {
                    verb: "update",
                    kind: MeshResource::VirtualNode.kind(),
                    name: name.to_string(),
                    source,
                }
            })?;

        info!(
            rollout = %self.rollout_name,
            virtual_node = %name,
            previous = ?previous,
            hash = %hash,
            "VirtualNode pod selector updated"
        );
        self.recorder
            .record(RolloutEvent::normal(
                "VirtualNodeUpdated",
                format!(
                    "VirtualNode `{}` set to `{}: {}`",
                    name, ROLLOUT_HASH_LABEL_KEY, hash
                ),
            ))
            .await;
        Ok(())
    }
}

#[async_trait]
impl TrafficRouter for AppMeshReconciler {
    fn name(&self) -> &'static str {
        "appmesh"
    }

    async fn set_weight(&self, desired_weight: i32) -> Result<(), TrafficRoutingError> {
        // Validate weight before touching the store
        if !(0..=100).contains(&desired_weight) {
            return Err(TrafficRoutingError::InvalidWeight(desired_weight));
        }

        // VirtualService -> VirtualRouter
        let (router_namespace, router_name) = self.resolve_virtual_router().await?;
        let mut vrouter = self
            .fetch_virtual_router(&router_namespace, &router_name)
            .await?;

        // Edit canary/stable targets of the configured routes
        let mut spec: VirtualRouterSpec = decode_spec(&vrouter, MeshResource::VirtualRouter)?;
        let group = &self.routing.virtual_node_group;
        let backends = WeightedBackends {
            canary: &group.canary_virtual_node_ref.name,
            stable: &group.stable_virtual_node_ref.name,
        };
        let edit = set_route_weights(
            &mut spec,
            &self.routing.virtual_service.routes,
            backends,
            desired_weight,
        );

        for route in &edit.unmatched_routes {
            warn!(
                rollout = %self.rollout_name,
                virtual_router = %router_name,
                route = %route,
                "Configured route not found in VirtualRouter, skipping"
            );
        }

        // Skip the write when nothing changed
        if !edit.changed {
            debug!(
                rollout = %self.rollout_name,
                virtual_router = %router_name,
                weight = desired_weight,
                "VirtualRouter already at desired weight"
            );
            return Ok(());
        }

        // Whole-object replace; resourceVersion guards concurrent edits
        encode_spec(&mut vrouter, MeshResource::VirtualRouter, &spec)?;
        self.store
            .replace(MeshResource::VirtualRouter, &router_namespace, &vrouter)
            .await
            .map_err(|source| {
                error!(
                    rollout = %self.rollout_name,
                    virtual_router = %router_name,
                    error = %source,
                    "Failed to update VirtualRouter"
                );
                TrafficRoutingError::Store {
                    verb: "update",
                    kind: MeshResource::VirtualRouter.kind(),
                    name: router_name.clone(),
                    source,
                }
            })?;

        info!(
            rollout = %self.rollout_name,
            virtual_router = %router_name,
            routes = ?edit.matched_routes,
            canary_weight = desired_weight,
            stable_weight = 100 - desired_weight,
            "VirtualRouter weights updated"
        );
        self.recorder
            .record(RolloutEvent::normal(
                "VirtualRouterUpdated",
                format!(
                    "VirtualRouter `{}` set to canary weight {}",
                    router_name, desired_weight
                ),
            ))
            .await;
        Ok(())
    }

    async fn update_hash(
        &self,
        canary_hash: &str,
        stable_hash: &str,
    ) -> Result<(), TrafficRoutingError> {
        let hashes = resolve_selector_hashes(canary_hash, stable_hash);
        let group = &self.routing.virtual_node_group;

        // Stable first: it is the fallback and must stay selectable
        self.update_virtual_node_hash(&group.stable_virtual_node_ref.name, &hashes.stable)
            .await?;
        self.update_virtual_node_hash(&group.canary_virtual_node_ref.name, &hashes.canary)
            .await
    }

    async fn verify_weight(
        &self,
        _desired_weight: i32,
    ) -> Result<Option<bool>, TrafficRoutingError> {
        // App Mesh exposes no applied-weight status to check against
        Ok(None)
    }
}

/// Decode `spec` of a dynamic App Mesh object into its typed form
fn decode_spec<T: DeserializeOwned>(
    object: &DynamicObject,
    resource: MeshResource,
) -> Result<T, TrafficRoutingError> {
    let not_well_formed = |reason: String| TrafficRoutingError::NotWellFormed {
        kind: resource.kind(),
        name: object.name_any(),
        reason,
    };

    let spec = object
        .data
        .get("spec")
        .cloned()
        .ok_or_else(|| not_well_formed("missing spec".to_string()))?;

    serde_json::from_value(spec).map_err(|e| not_well_formed(e.to_string()))
}

/// Write a typed spec back into a dynamic App Mesh object
fn encode_spec<T: Serialize>(
    object: &mut DynamicObject,
    resource: MeshResource,
    spec: &T,
) -> Result<(), TrafficRoutingError> {
    let name = object.name_any();
    let not_well_formed = |reason: String| TrafficRoutingError::NotWellFormed {
        kind: resource.kind(),
        name: name.clone(),
        reason,
    };

    let value = serde_json::to_value(spec).map_err(|e| not_well_formed(e.to_string()))?;
    let data = object
        .data
        .as_object_mut()
        .ok_or_else(|| not_well_formed("object body is not a map".to_string()))?;
    data.insert("spec".to_string(), value);
    Ok(())
}
