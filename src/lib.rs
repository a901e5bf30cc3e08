//! KULTA App Mesh traffic routing
//!
//! Shifts canary/stable traffic weights on AWS App Mesh virtual routers and keeps
//! virtual node pod selectors pointed at the right pod revision.

pub mod controller;
pub mod crd;
