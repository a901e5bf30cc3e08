//! Pod selector hash injection for virtual nodes

use crate::crd::appmesh::VirtualNodeSpec;

/// Pod label carrying the rollout's pod template hash
pub const ROLLOUT_HASH_LABEL_KEY: &str = "rollouts-pod-template-hash";

/// Selector value for the canary node when no canary revision should be selected
pub const DEFAULT_CANARY_HASH: &str = "canary-hash";

/// Selector value for the stable node when no stable revision is known
pub const DEFAULT_STABLE_HASH: &str = "stable-hash";

/// Hash values to write into the canary and stable virtual nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorHashes {
    pub canary: String,
    pub stable: String,
}

/// Resolve the selector values for a pair of pod template hashes
///
/// Empty hashes fall back to the sentinels. A canary hash equal to the stable
/// hash (fully promoted) also falls back, so the canary node never selects
/// the stable pods.
pub fn resolve_selector_hashes(canary_hash: &str, stable_hash: &str) -> SelectorHashes {
    let stable = if stable_hash.is_empty() {
        DEFAULT_STABLE_HASH
    } else {
        stable_hash
    };

    let canary = if canary_hash.is_empty() || canary_hash == stable_hash {
        DEFAULT_CANARY_HASH
    } else {
        canary_hash
    };

    SelectorHashes {
        canary: canary.to_string(),
        stable: stable.to_string(),
    }
}

/// Set the rollout hash label on a virtual node's pod selector
///
/// Creates `podSelector.matchLabels` when missing and leaves other labels as
/// they are. Returns the previous value of the label.
pub fn set_selector_hash(spec: &mut VirtualNodeSpec, hash: &str) -> Option<String> {
    spec.match_labels_mut()
        .insert(ROLLOUT_HASH_LABEL_KEY.to_string(), hash.to_string())
}
