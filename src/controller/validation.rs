use crate::crd::rollout::{AppMeshTrafficRouting, Rollout};
use std::collections::HashSet;

/// Validate Rollout specification
///
/// Validates runtime constraints that cannot be enforced via CRD schema.
///
/// # Validation Rules
/// - `spec.replicas` must be >= 0
/// - Each canary step's `setWeight` must be 0-100
/// - App Mesh routing (if present) must pass `validate_app_mesh_routing`
///
/// # Returns
/// * `Ok(())` - Validation passed
/// * `Err(String)` - Validation error message
pub fn validate_rollout(rollout: &Rollout) -> Result<(), String> {
    // Validate replicas >= 0
    if rollout.spec.replicas < 0 {
        return Err(format!(
            "spec.replicas must be >= 0, got {}",
            rollout.spec.replicas
        ));
    }

    // Validate canary step weights if present
    if let Some(canary) = &rollout.spec.strategy.canary {
        for (i, step) in canary.steps.iter().enumerate() {
            if let Some(weight) = step.set_weight {
                if !(0..=100).contains(&weight) {
                    return Err(format!(
                        "steps[{}].setWeight must be 0-100, got {}",
                        i, weight
                    ));
                }
            }
        }
    }

    // Validate App Mesh routing if present
    if let Some(app_mesh) = rollout.app_mesh_routing() {
        validate_app_mesh_routing(app_mesh)?;
    }

    Ok(())
}

/// Validate App Mesh traffic routing configuration
///
/// # Validation Rules
/// - `virtualService.name` cannot be empty
/// - Canary and stable virtual node names cannot be empty and must differ
/// - Route names cannot be empty or repeated
pub fn validate_app_mesh_routing(routing: &AppMeshTrafficRouting) -> Result<(), String> {
    const PREFIX: &str = "spec.strategy.canary.trafficRouting.appMesh";

    if routing.virtual_service.name.is_empty() {
        return Err(format!("{}.virtualService.name cannot be empty", PREFIX));
    }

    // Virtual node refs: both set, and distinct
    let group = &routing.virtual_node_group;
    if group.canary_virtual_node_ref.name.is_empty() {
        return Err(format!(
            "{}.virtualNodeGroup.canaryVirtualNodeRef.name cannot be empty",
            PREFIX
        ));
    }
    if group.stable_virtual_node_ref.name.is_empty() {
        return Err(format!(
            "{}.virtualNodeGroup.stableVirtualNodeRef.name cannot be empty",
            PREFIX
        ));
    }
    if group.canary_virtual_node_ref.name == group.stable_virtual_node_ref.name {
        return Err(format!(
            "{}.virtualNodeGroup canary and stable virtual nodes must differ, both are '{}'",
            PREFIX, group.canary_virtual_node_ref.name
        ));
    }

    // Route names: non-empty, no repeats (empty list means all routes)
    let mut seen = HashSet::new();
    for (i, route) in routing.virtual_service.routes.iter().enumerate() {
        if route.is_empty() {
            return Err(format!(
                "{}.virtualService.routes[{}] cannot be empty",
                PREFIX, i
            ));
        }
        if !seen.insert(route.as_str()) {
            return Err(format!(
                "{}.virtualService.routes[{}] duplicates route '{}'",
                PREFIX, i, route
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::rollout::{
        AppMeshVirtualNodeGroup, AppMeshVirtualNodeReference, AppMeshVirtualService,
        CanaryStep, CanaryStrategy, RolloutSpec, RolloutStrategy, TrafficRouting,
    };

    fn routing(routes: &[&str]) -> AppMeshTrafficRouting {
        AppMeshTrafficRouting {
            virtual_service: AppMeshVirtualService {
                name: "mysvc".to_string(),
                routes: routes.iter().map(|r| r.to_string()).collect(),
            },
            virtual_node_group: AppMeshVirtualNodeGroup {
                canary_virtual_node_ref: AppMeshVirtualNodeReference {
                    name: "mysvc-canary-vn".to_string(),
                },
                stable_virtual_node_ref: AppMeshVirtualNodeReference {
                    name: "mysvc-stable-vn".to_string(),
                },
            },
        }
    }

    fn rollout_with(weights: &[i32], app_mesh: Option<AppMeshTrafficRouting>) -> Rollout {
        Rollout::new(
            "rollout",
            RolloutSpec {
                replicas: 1,
                selector: Default::default(),
                template: Default::default(),
                strategy: RolloutStrategy {
                    canary: Some(CanaryStrategy {
                        steps: weights
                            .iter()
                            .map(|w| CanaryStep {
                                set_weight: Some(*w),
                            })
                            .collect(),
                        traffic_routing: Some(TrafficRouting { app_mesh }),
                    }),
                },
            },
        )
    }

    #[test]
    fn test_valid_rollout_passes() {
        let rollout = rollout_with(&[0, 50, 100], Some(routing(&["primary"])));
        assert_eq!(validate_rollout(&rollout), Ok(()));
    }

    #[test]
    fn test_step_weight_out_of_range() {
        let rollout = rollout_with(&[10, 101], Some(routing(&[])));
        let err = validate_rollout(&rollout).unwrap_err();
        assert!(err.contains("steps[1].setWeight"), "{}", err);
    }

    #[test]
    fn test_negative_replicas_rejected() {
        let mut rollout = rollout_with(&[], None);
        rollout.spec.replicas = -1;
        assert!(validate_rollout(&rollout).is_err());
    }

    #[test]
    fn test_empty_virtual_service_name_rejected() {
        let mut app_mesh = routing(&[]);
        app_mesh.virtual_service.name.clear();
        let err = validate_app_mesh_routing(&app_mesh).unwrap_err();
        assert!(err.contains("virtualService.name"), "{}", err);
    }

    #[test]
    fn test_empty_virtual_node_names_rejected() {
        let mut app_mesh = routing(&[]);
        app_mesh.virtual_node_group.stable_virtual_node_ref.name.clear();
        assert!(validate_app_mesh_routing(&app_mesh)
            .unwrap_err()
            .contains("stableVirtualNodeRef"));

        let mut app_mesh = routing(&[]);
        app_mesh.virtual_node_group.canary_virtual_node_ref.name.clear();
        assert!(validate_app_mesh_routing(&app_mesh)
            .unwrap_err()
            .contains("canaryVirtualNodeRef"));
    }

    #[test]
    fn test_same_canary_and_stable_node_rejected() {
        let mut app_mesh = routing(&[]);
        app_mesh.virtual_node_group.canary_virtual_node_ref.name = "mysvc-stable-vn".to_string();
        assert!(validate_app_mesh_routing(&app_mesh)
            .unwrap_err()
            .contains("must differ"));
    }

    #[test]
    fn test_duplicate_and_empty_routes_rejected() {
        let err = validate_app_mesh_routing(&routing(&["primary", "primary"])).unwrap_err();
        assert!(err.contains("duplicates route 'primary'"), "{}", err);

        let err = validate_app_mesh_routing(&routing(&["primary", ""])).unwrap_err();
        assert!(err.contains("routes[1] cannot be empty"), "{}", err);
    }
}
