#![allow(clippy::unwrap_used)] // Tests can use unwrap for brevity
#![allow(clippy::expect_used)] // Tests can use expect for better error messages

use super::*;
use kube::CustomResourceExt;

#[test]
fn test_app_mesh_routing_deserialize_from_yaml() {
    let yaml = r#"
apiVersion: kulta.io/v1alpha1
kind: Rollout
metadata:
  name: rollout
  namespace: myns
spec:
  replicas: 3
  selector:
    matchLabels:
      app: mysvc-pod
  template:
    metadata:
      labels:
        app: mysvc-pod
    spec:
      containers:
      - name: app
        image: nginx:1.0
  strategy:
    canary:
      steps:
      - setWeight: 20
      - setWeight: 50
      trafficRouting:
        appMesh:
          virtualService:
            name: mysvc
            routes:
            - primary
          virtualNodeGroup:
            canaryVirtualNodeRef:
              name: mysvc-canary-vn
            stableVirtualNodeRef:
              name: mysvc-stable-vn
"#;

    let rollout: Rollout = serde_yaml::from_str(yaml).expect("Failed to deserialize Rollout");

    assert_eq!(rollout.metadata.name.as_deref(), Some("rollout"));
    assert_eq!(rollout.spec.replicas, 3);

    let canary = rollout.spec.strategy.canary.as_ref().unwrap();
    assert_eq!(canary.steps.len(), 2);
    assert_eq!(canary.steps[1].set_weight, Some(50));

    let app_mesh = rollout.app_mesh_routing().expect("appMesh should be set");
    assert_eq!(app_mesh.virtual_service.name, "mysvc");
    assert_eq!(app_mesh.virtual_service.routes, vec!["primary".to_string()]);
    assert_eq!(
        app_mesh.virtual_node_group.canary_virtual_node_ref.name,
        "mysvc-canary-vn"
    );
    assert_eq!(
        app_mesh.virtual_node_group.stable_virtual_node_ref.name,
        "mysvc-stable-vn"
    );
}

#[test]
fn test_app_mesh_routes_default_to_empty() {
    let yaml = r#"
virtualService:
  name: mysvc
virtualNodeGroup:
  canaryVirtualNodeRef:
    name: mysvc-canary-vn
  stableVirtualNodeRef:
    name: mysvc-stable-vn
"#;

    let routing: AppMeshTrafficRouting = serde_yaml::from_str(yaml).unwrap();
    assert!(routing.virtual_service.routes.is_empty());

    // Empty route list is omitted on the way back out
    let json = serde_json::to_value(&routing).unwrap();
    assert!(json["virtualService"].get("routes").is_none());
}

#[test]
fn test_app_mesh_routing_absent_without_traffic_routing() {
    let yaml = r#"
apiVersion: kulta.io/v1alpha1
kind: Rollout
metadata:
  name: plain
spec:
  selector:
    matchLabels:
      app: test-app
  template:
    metadata:
      labels:
        app: test-app
  strategy:
    canary:
      steps:
      - setWeight: 10
"#;

    let rollout: Rollout = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(rollout.spec.replicas, 1);
    assert!(rollout.app_mesh_routing().is_none());
}

#[test]
fn test_crd_schema_contains_app_mesh() {
    let crd = Rollout::crd();
    let json = serde_json::to_string(&crd).unwrap();

    assert_eq!(crd.spec.group, "kulta.io");
    assert!(json.contains("appMesh"));
    assert!(json.contains("virtualNodeGroup"));
    assert!(json.contains("canaryVirtualNodeRef"));
}
