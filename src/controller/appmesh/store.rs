//! Access to App Mesh objects in the Kubernetes API
//!
//! `MeshStore` is the narrow get / replace / probe surface the reconciler
//! needs. Production code uses `KubeMeshStore` backed by `Api<DynamicObject>`.
//! Tests use `MockMeshStore` which keeps objects in memory and records every call.

use crate::controller::traffic::StoreError;
use crate::crd::appmesh::{MeshResource, DEFAULT_APP_MESH_VERSION};
use async_trait::async_trait;
use kube::api::{Api, ListParams, PostParams};
use kube::core::DynamicObject;
use tracing::debug;

/// Get the App Mesh API version from env (default: v1beta2)
pub fn app_mesh_api_version() -> String {
    std::env::var("KULTA_APPMESH_API_VERSION")
        .unwrap_or_else(|_| DEFAULT_APP_MESH_VERSION.to_string())
}

/// Keyed object store for the App Mesh kinds
#[async_trait]
pub trait MeshStore: Send + Sync {
    /// Fetch one object by namespace and name
    async fn get(
        &self,
        resource: MeshResource,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, StoreError>;

    /// Replace a whole object
    ///
    /// The object's resourceVersion is sent along, so the write fails with
    /// `StoreError::Conflict` if the object changed since it was read.
    async fn replace(
        &self,
        resource: MeshResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// List at most one object of a kind. Succeeds iff the kind is served.
    async fn probe(&self, resource: MeshResource, namespace: &str) -> Result<(), StoreError>;
}

/// MeshStore backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeMeshStore {
    client: kube::Client,
    version: String,
}

impl KubeMeshStore {
    /// Create a store using the App Mesh version from `KULTA_APPMESH_API_VERSION`
    pub fn new(client: kube::Client) -> Self {
        Self::with_version(client, app_mesh_api_version())
    }

    pub fn with_version(client: kube::Client, version: impl Into<String>) -> Self {
        KubeMeshStore {
            client,
            version: version.into(),
        }
    }

    fn api(&self, resource: MeshResource, namespace: &str) -> Api<DynamicObject> {
        let ar = resource.api_resource(&self.version);
        Api::namespaced_with(self.client.clone(), namespace, &ar)
    }
}

#[async_trait]
impl MeshStore for KubeMeshStore {
    async fn get(
        &self,
        resource: MeshResource,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, StoreError> {
        match self.api(resource, namespace).get(name).await {
            Ok(object) => Ok(object),
            Err(kube::Error::Api(err)) if err.code == 404 => Err(StoreError::NotFound {
                kind: resource.kind(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace(
        &self,
        resource: MeshResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let name = object
            .metadata
            .name
            .as_deref()
            .ok_or(StoreError::MissingName {
                kind: resource.kind(),
            })?;

        match self
            .api(resource, namespace)
            .replace(name, &PostParams::default(), object)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(kube::Error::Api(err)) if err.code == 404 => Err(StoreError::NotFound {
                kind: resource.kind(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(kube::Error::Api(err)) if err.code == 409 => Err(StoreError::Conflict {
                kind: resource.kind(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn probe(&self, resource: MeshResource, namespace: &str) -> Result<(), StoreError> {
        self.api(resource, namespace)
            .list(&ListParams::default().limit(1))
            .await?;
        Ok(())
    }
}

/// Check whether App Mesh is installed for `namespace`
///
/// Lists at most one VirtualService. Any error (CRD not installed, RBAC,
/// connectivity) is treated as "not present".
pub async fn does_app_mesh_exist(store: &dyn MeshStore, namespace: &str) -> bool {
    match store.probe(MeshResource::VirtualService, namespace).await {
        Ok(()) => true,
        Err(e) => {
            debug!(namespace = %namespace, error = %e, "App Mesh not available");
            false
        }
    }
}

/// Verb of a recorded store call
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVerb {
    Get,
    Update,
    List,
}

/// A call made against `MockMeshStore`
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAction {
    pub verb: StoreVerb,
    pub resource: MeshResource,
    pub namespace: String,
    pub name: String,
}

#[cfg(test)]
impl StoreAction {
    pub fn matches(&self, verb: StoreVerb, resource: MeshResource) -> bool {
        self.verb == verb && self.resource == resource
    }
}

#[cfg(test)]
type ObjectKey = (MeshResource, String, String);

/// Mock mesh store for testing - keeps objects in memory and records calls
#[cfg(test)]
#[derive(Default)]
pub struct MockMeshStore {
    objects: std::sync::Mutex<std::collections::HashMap<ObjectKey, DynamicObject>>,
    actions: std::sync::Mutex<Vec<StoreAction>>,
    conflicting: std::collections::HashSet<(MeshResource, String)>,
    unreachable: std::collections::HashSet<(MeshResource, String)>,
    app_mesh_missing: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
impl MockMeshStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding the given YAML manifests
    pub fn from_yaml(manifests: &[&str]) -> Self {
        let store = Self::new();
        for manifest in manifests {
            let object: DynamicObject =
                serde_yaml::from_str(manifest).expect("fixture should be a valid object");
            store.insert(object);
        }
        store
    }

    pub fn insert(&self, object: DynamicObject) {
        let kind = object
            .types
            .as_ref()
            .map(|t| t.kind.clone())
            .expect("fixture needs a kind");
        let resource = MeshResource::from_kind(&kind).expect("fixture must be an App Mesh kind");
        let key = (
            resource,
            object.metadata.namespace.clone().unwrap_or_default(),
            object.metadata.name.clone().expect("fixture needs a name"),
        );
        self.objects.lock().unwrap().insert(key, object);
    }

    /// Make every update of the named object fail with a conflict
    pub fn with_conflict(mut self, resource: MeshResource, name: &str) -> Self {
        self.conflicting.insert((resource, name.to_string()));
        self
    }

    /// Make every get of the named object fail with a transport error
    pub fn with_get_failure(mut self, resource: MeshResource, name: &str) -> Self {
        self.unreachable.insert((resource, name.to_string()));
        self
    }

    /// Make the existence probe fail as if the CRDs were not installed
    pub fn without_app_mesh(mut self) -> Self {
        self.app_mesh_missing = true;
        self
    }

    pub fn actions(&self) -> Vec<StoreAction> {
        self.actions.lock().unwrap().clone()
    }

    pub fn object(&self, resource: MeshResource, namespace: &str, name: &str) -> Option<DynamicObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(resource, namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn record(&self, verb: StoreVerb, resource: MeshResource, namespace: &str, name: &str) {
        self.actions.lock().unwrap().push(StoreAction {
            verb,
            resource,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[async_trait]
impl MeshStore for MockMeshStore {
    async fn get(
        &self,
        resource: MeshResource,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, StoreError> {
        self.record(StoreVerb::Get, resource, namespace, name);
        if self.unreachable.contains(&(resource, name.to_string())) {
            return Err(kube::Error::Service("connection refused".into()).into());
        }
        self.object(resource, namespace, name)
            .ok_or_else(|| StoreError::NotFound {
                kind: resource.kind(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn replace(
        &self,
        resource: MeshResource,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let name = object
            .metadata
            .name
            .clone()
            .ok_or(StoreError::MissingName {
                kind: resource.kind(),
            })?;
        self.record(StoreVerb::Update, resource, namespace, &name);

        if self.conflicting.contains(&(resource, name.clone())) {
            return Err(StoreError::Conflict {
                kind: resource.kind(),
                namespace: namespace.to_string(),
                name,
            });
        }

        let key = (resource, namespace.to_string(), name.clone());
        let mut objects = self.objects.lock().unwrap();
        if !objects.contains_key(&key) {
            return Err(StoreError::NotFound {
                kind: resource.kind(),
                namespace: namespace.to_string(),
                name,
            });
        }
        objects.insert(key, object.clone());
        Ok(object.clone())
    }

    async fn probe(&self, resource: MeshResource, namespace: &str) -> Result<(), StoreError> {
        self.record(StoreVerb::List, resource, namespace, "");
        if self.app_mesh_missing {
            return Err(StoreError::NotFound {
                kind: resource.kind(),
                namespace: namespace.to_string(),
                name: resource.plural().to_string(),
            });
        }
        Ok(())
    }
}
