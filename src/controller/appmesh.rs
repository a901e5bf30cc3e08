pub mod hash;
pub mod reconcile;
pub mod router;
pub mod store;

pub use hash::{DEFAULT_CANARY_HASH, DEFAULT_STABLE_HASH, ROLLOUT_HASH_LABEL_KEY};
pub use reconcile::{AppMeshReconciler, ReconcilerConfig};
pub use store::{does_app_mesh_exist, KubeMeshStore, MeshStore};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "appmesh_test.rs"]
mod tests;
