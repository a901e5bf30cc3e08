//! Typed views of the AWS App Mesh custom resources
//!
//! App Mesh objects are fetched as `DynamicObject`s and their `spec` is decoded
//! into the types below. Only the fields KULTA edits are modelled; everything
//! else is carried in flattened `extra` maps so that writing an object back
//! never drops fields we don't know about.

use kube::api::GroupVersionKind;
use kube::discovery::ApiResource;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// API group of the App Mesh controller CRDs
pub const APP_MESH_GROUP: &str = "appmesh.k8s.aws";

/// App Mesh API version used when none is configured
pub const DEFAULT_APP_MESH_VERSION: &str = "v1beta2";

/// The three App Mesh kinds this crate reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshResource {
    VirtualService,
    VirtualRouter,
    VirtualNode,
}

impl MeshResource {
    pub fn kind(&self) -> &'static str {
        match self {
            MeshResource::VirtualService => "VirtualService",
            MeshResource::VirtualRouter => "VirtualRouter",
            MeshResource::VirtualNode => "VirtualNode",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            MeshResource::VirtualService => "virtualservices",
            MeshResource::VirtualRouter => "virtualrouters",
            MeshResource::VirtualNode => "virtualnodes",
        }
    }

    /// Look up a resource by its Kubernetes kind
    #[cfg(test)]
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "VirtualService" => Some(MeshResource::VirtualService),
            "VirtualRouter" => Some(MeshResource::VirtualRouter),
            "VirtualNode" => Some(MeshResource::VirtualNode),
            _ => None,
        }
    }

    /// Build the dynamic ApiResource for this kind at the given App Mesh version
    pub fn api_resource(&self, version: &str) -> ApiResource {
        let gvk = GroupVersionKind::gvk(APP_MESH_GROUP, version, self.kind());
        ApiResource::from_gvk_with_plural(&gvk, self.plural())
    }
}

impl fmt::Display for MeshResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

// ---------------------------------------------------------------------------
// VirtualService
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VirtualServiceSpec {
    pub provider: VirtualServiceProvider,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Provider of a virtual service
///
/// App Mesh allows exactly one of `virtualNode` or `virtualRouter`. Only the
/// router provider has weighted routes that can be shifted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum VirtualServiceProvider {
    VirtualNode(VirtualNodeProvider),
    VirtualRouter(VirtualRouterProvider),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VirtualNodeProvider {
    #[serde(rename = "virtualNodeRef", skip_serializing_if = "Option::is_none")]
    pub virtual_node_ref: Option<MeshReference>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VirtualRouterProvider {
    /// Unset when the router is given by `virtualRouterARN` (kept in `extra`)
    #[serde(rename = "virtualRouterRef", skip_serializing_if = "Option::is_none")]
    pub virtual_router_ref: Option<MeshReference>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference to another App Mesh object, optionally in another namespace
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MeshReference {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

// ---------------------------------------------------------------------------
// VirtualRouter
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VirtualRouterSpec {
    pub routes: Vec<Route>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Protocol of a route, i.e. which payload key it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Http,
    Tcp,
    Http2,
    Grpc,
}

impl RouteKind {
    pub const ALL: [RouteKind; 4] = [
        RouteKind::Http,
        RouteKind::Tcp,
        RouteKind::Http2,
        RouteKind::Grpc,
    ];

    /// Field name of this payload inside a route
    pub fn field_name(&self) -> &'static str {
        match self {
            RouteKind::Http => "httpRoute",
            RouteKind::Tcp => "tcpRoute",
            RouteKind::Http2 => "http2Route",
            RouteKind::Grpc => "grpcRoute",
        }
    }
}

/// Populated payload of a route. Exactly one per route.
#[derive(Clone, Debug, PartialEq)]
pub enum RoutePayload {
    Http(RouteRule),
    Tcp(RouteRule),
    Http2(RouteRule),
    Grpc(RouteRule),
}

impl RoutePayload {
    pub fn new(kind: RouteKind, rule: RouteRule) -> Self {
        match kind {
            RouteKind::Http => RoutePayload::Http(rule),
            RouteKind::Tcp => RoutePayload::Tcp(rule),
            RouteKind::Http2 => RoutePayload::Http2(rule),
            RouteKind::Grpc => RoutePayload::Grpc(rule),
        }
    }

    pub fn kind(&self) -> RouteKind {
        match self {
            RoutePayload::Http(_) => RouteKind::Http,
            RoutePayload::Tcp(_) => RouteKind::Tcp,
            RoutePayload::Http2(_) => RouteKind::Http2,
            RoutePayload::Grpc(_) => RouteKind::Grpc,
        }
    }

    pub fn rule(&self) -> &RouteRule {
        match self {
            RoutePayload::Http(rule)
            | RoutePayload::Tcp(rule)
            | RoutePayload::Http2(rule)
            | RoutePayload::Grpc(rule) => rule,
        }
    }

    pub fn rule_mut(&mut self) -> &mut RouteRule {
        match self {
            RoutePayload::Http(rule)
            | RoutePayload::Tcp(rule)
            | RoutePayload::Http2(rule)
            | RoutePayload::Grpc(rule) => rule,
        }
    }
}

/// A named route of a virtual router
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(try_from = "RawRoute")]
pub struct Route {
    pub name: String,
    pub payload: RoutePayload,
    pub extra: Map<String, Value>,
}

/// Wire shape of a route before the payload variant is picked out
#[derive(Deserialize)]
struct RawRoute {
    name: String,

    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl TryFrom<RawRoute> for Route {
    type Error = String;

    fn try_from(raw: RawRoute) -> Result<Self, Self::Error> {
        let RawRoute { name, mut fields } = raw;

        let present: Vec<RouteKind> = RouteKind::ALL
            .into_iter()
            .filter(|kind| {
                fields
                    .get(kind.field_name())
                    .is_some_and(|value| !is_empty_payload(value))
            })
            .collect();

        let kind = match present.as_slice() {
            [kind] => *kind,
            [] => {
                return Err(format!(
                    "route '{}' has none of httpRoute, tcpRoute, http2Route, grpcRoute",
                    name
                ))
            }
            [first, second, ..] => {
                return Err(format!(
                    "route '{}' sets both {} and {}",
                    name,
                    first.field_name(),
                    second.field_name()
                ))
            }
        };

        let value = fields.remove(kind.field_name()).unwrap_or(Value::Null);
        let rule: RouteRule = serde_json::from_value(value)
            .map_err(|e| format!("route '{}' {}: {}", name, kind.field_name(), e))?;

        Ok(Route {
            name,
            payload: RoutePayload::new(kind, rule),
            extra: fields,
        })
    }
}

/// `null` and `{}` both mean the payload is not set
fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

impl Serialize for Route {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.extra.len() + 2))?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry(self.payload.kind().field_name(), self.payload.rule())?;
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Body of an httpRoute / tcpRoute / http2Route / grpcRoute
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RouteRule {
    pub action: RouteAction,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RouteAction {
    #[serde(rename = "weightedTargets")]
    pub weighted_targets: Vec<WeightedTarget>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WeightedTarget {
    /// Unset when the target is given by `virtualNodeARN`
    #[serde(rename = "virtualNodeRef", skip_serializing_if = "Option::is_none")]
    pub virtual_node_ref: Option<MeshReference>,

    pub weight: i64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WeightedTarget {
    /// Name of the referenced virtual node, if referenced by name
    pub fn virtual_node_name(&self) -> Option<&str> {
        self.virtual_node_ref.as_ref().map(|r| r.name.as_str())
    }
}

// ---------------------------------------------------------------------------
// VirtualNode
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct VirtualNodeSpec {
    #[serde(rename = "podSelector", skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<PodSelector>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PodSelector {
    #[serde(rename = "matchLabels", skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VirtualNodeSpec {
    /// Pod selector labels, created empty if the node has none yet
    pub fn match_labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        self.pod_selector
            .get_or_insert_with(PodSelector::default)
            .match_labels
            .get_or_insert_with(BTreeMap::new)
    }

    pub fn match_label(&self, key: &str) -> Option<&str> {
        self.pod_selector
            .as_ref()?
            .match_labels
            .as_ref()?
            .get(key)
            .map(String::as_str)
    }
}

#[cfg(test)]
#[path = "appmesh_test.rs"]
mod tests;
