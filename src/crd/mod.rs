pub mod appmesh;
pub mod rollout;
