pub mod appmesh;
pub mod events;
pub mod traffic;
pub mod validation;

pub use appmesh::{AppMeshReconciler, ReconcilerConfig};
pub use traffic::{StoreError, TrafficRouter, TrafficRoutingError};
