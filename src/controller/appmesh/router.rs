//! Weighted-target editing for virtual router routes

use crate::crd::appmesh::{RouteRule, VirtualRouterSpec};

/// Names of the virtual nodes whose weights are shifted
#[derive(Debug, Clone, Copy)]
pub struct WeightedBackends<'a> {
    pub canary: &'a str,
    pub stable: &'a str,
}

/// Outcome of applying a canary weight to a virtual router
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WeightEdit {
    /// Routes that were considered for editing
    pub matched_routes: Vec<String>,

    /// Configured route names with no route of that name in the router
    pub unmatched_routes: Vec<String>,

    /// Whether any weight actually changed
    pub changed: bool,
}

/// Apply `desired_weight` to the selected routes of a virtual router
///
/// An empty `route_names` selects every route. Configured names the router
/// does not have are reported in `unmatched_routes` and otherwise ignored.
pub fn set_route_weights(
    spec: &mut VirtualRouterSpec,
    route_names: &[String],
    backends: WeightedBackends<'_>,
    desired_weight: i32,
) -> WeightEdit {
    let mut edit = WeightEdit {
        unmatched_routes: route_names
            .iter()
            .filter(|name| !spec.routes.iter().any(|route| &route.name == *name))
            .cloned()
            .collect(),
        ..Default::default()
    };

    for route in spec
        .routes
        .iter_mut()
        .filter(|route| route_names.is_empty() || route_names.contains(&route.name))
    {
        if set_target_weights(route.payload.rule_mut(), backends, desired_weight) {
            edit.changed = true;
        }
        edit.matched_routes.push(route.name.clone());
    }

    edit
}

/// Set canary to `desired_weight` and stable to the remainder
///
/// Targets referencing any other virtual node are left alone.
/// Returns true if a weight changed.
pub fn set_target_weights(
    rule: &mut RouteRule,
    backends: WeightedBackends<'_>,
    desired_weight: i32,
) -> bool {
    let canary_weight = i64::from(desired_weight);
    let stable_weight = 100 - canary_weight;

    let mut changed = false;
    for target in rule.action.weighted_targets.iter_mut() {
        let weight = match target.virtual_node_name() {
            Some(name) if name == backends.canary => canary_weight,
            Some(name) if name == backends.stable => stable_weight,
            _ => continue,
        };
        if target.weight != weight {
            target.weight = weight;
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::appmesh::RouteKind;
    use serde_json::json;

    const BACKENDS: WeightedBackends<'static> = WeightedBackends {
        canary: "mysvc-canary-vn",
        stable: "mysvc-stable-vn",
    };

    fn router(kind: RouteKind, route_names: &[&str]) -> VirtualRouterSpec {
        let routes: Vec<_> = route_names
            .iter()
            .map(|name| {
                json!({
                    "name": name,
                    kind.field_name(): {
                        "action": {
                            "weightedTargets": [
                                { "virtualNodeRef": { "name": "mysvc-canary-vn" }, "weight": 0 },
                                { "virtualNodeRef": { "name": "mysvc-stable-vn" }, "weight": 100 },
                                { "virtualNodeRef": { "name": "mysvc-mirror-vn" }, "weight": 7 }
                            ]
                        }
                    }
                })
            })
            .collect();
        serde_json::from_value(json!({ "routes": routes })).unwrap()
    }

    fn weights(spec: &VirtualRouterSpec, route: &str) -> Vec<i64> {
        spec.routes
            .iter()
            .find(|r| r.name == route)
            .unwrap()
            .payload
            .rule()
            .action
            .weighted_targets
            .iter()
            .map(|t| t.weight)
            .collect()
    }

    #[test]
    fn test_weights_set_for_every_route_kind() {
        for kind in RouteKind::ALL {
            let mut spec = router(kind, &["primary"]);
            let edit = set_route_weights(&mut spec, &["primary".to_string()], BACKENDS, 55);

            assert!(edit.changed);
            assert_eq!(edit.matched_routes, vec!["primary"]);
            assert_eq!(weights(&spec, "primary"), vec![55, 45, 7]);
        }
    }

    #[test]
    fn test_weights_sum_to_100_over_full_range() {
        for kind in RouteKind::ALL {
            for desired in 0..=100 {
                let mut spec = router(kind, &["primary"]);
                set_route_weights(&mut spec, &[], BACKENDS, desired);
                let w = weights(&spec, "primary");
                assert_eq!(w[0], i64::from(desired), "{:?}", kind);
                assert_eq!(w[0] + w[1], 100, "{:?}", kind);
                // Mirror target untouched
                assert_eq!(w[2], 7, "{:?}", kind);
            }
        }
    }

    #[test]
    fn test_unchanged_weights_report_no_change() {
        let mut spec = router(RouteKind::Tcp, &["primary"]);
        let edit = set_route_weights(&mut spec, &["primary".to_string()], BACKENDS, 0);

        assert!(!edit.changed);
        assert_eq!(edit.matched_routes, vec!["primary"]);
    }

    #[test]
    fn test_only_configured_routes_are_edited() {
        let mut spec = router(RouteKind::Http, &["primary", "secondary"]);
        let edit = set_route_weights(&mut spec, &["secondary".to_string()], BACKENDS, 30);

        assert!(edit.changed);
        assert_eq!(weights(&spec, "primary"), vec![0, 100, 7]);
        assert_eq!(weights(&spec, "secondary"), vec![30, 70, 7]);
    }

    #[test]
    fn test_empty_route_list_edits_all_routes() {
        let mut spec = router(RouteKind::Grpc, &["primary", "secondary"]);
        let edit = set_route_weights(&mut spec, &[], BACKENDS, 10);

        assert_eq!(edit.matched_routes, vec!["primary", "secondary"]);
        assert!(edit.unmatched_routes.is_empty());
        assert_eq!(weights(&spec, "primary"), vec![10, 90, 7]);
        assert_eq!(weights(&spec, "secondary"), vec![10, 90, 7]);
    }

    #[test]
    fn test_unknown_route_is_reported_not_edited() {
        let mut spec = router(RouteKind::Http2, &["primary"]);
        let names = vec!["primary".to_string(), "canary-only".to_string()];
        let edit = set_route_weights(&mut spec, &names, BACKENDS, 20);

        assert_eq!(edit.unmatched_routes, vec!["canary-only"]);
        assert_eq!(edit.matched_routes, vec!["primary"]);
        assert_eq!(weights(&spec, "primary"), vec![20, 80, 7]);
    }

    #[test]
    fn test_only_unknown_routes_changes_nothing() {
        let mut spec = router(RouteKind::Http, &["primary"]);
        let original = spec.clone();
        let edit = set_route_weights(&mut spec, &["nope".to_string()], BACKENDS, 50);

        assert!(!edit.changed);
        assert!(edit.matched_routes.is_empty());
        assert_eq!(spec, original);
    }
}
