use async_trait::async_trait;
use proptest::prelude::*;
use rustle_playbook::resolver::{
    lookup, set_value, Condition, CustomFunction, DataPath, FunctionCall, FunctionRegistry,
    PathExpr, PathResolver, Scope,
};
use rustle_playbook::state::{DeploymentSnapshot, MemoryStore};
use rustle_playbook::types::{Node, RunContext};
use serde_json::{json, Value};
use std::sync::Arc;

const SNAPSHOT: &str = r#"
deployment: lab
attributes:
  storage_category: storage
nodes:
  - id: 3
    name: node3
    roles: [ceph-osd]
    address: { addr: 10.0.0.7, prefix: 24 }
    data:
      ceph: { osd_id: 2 }
  - id: 1
    name: node1
    roles: [ceph-osd, ceph-mon]
    address: { addr: 10.0.0.5, prefix: 24 }
    addresses:
      - { category: storage, addr: 10.1.0.5, prefix: 16 }
    attributes:
      nics:
        lo: { ips: ["127.0.0.1/8"] }
        eth1: { ips: ["10.1.0.5/16", "fe80::1/64"] }
        eth0: { ips: ["10.0.0.5/24"] }
    data:
      ceph: { osd_id: 0 }
  - id: 2
    name: node2
    roles: [ceph-osd]
    address: { addr: 10.0.0.6, prefix: 24 }
"#;

fn resolver() -> (PathResolver, Node) {
    let snapshot: DeploymentSnapshot = serde_yaml::from_str(SNAPSHOT).unwrap();
    let store = Arc::new(MemoryStore::new(snapshot));
    let node = store.node("node1").unwrap();
    (PathResolver::new(store), node)
}

async fn resolve(raw: &str, data: &Value) -> Option<Value> {
    let (resolver, node) = resolver();
    let run = RunContext::new("ceph-osd", node.clone());
    let scope = Scope::new(&node, &run, data);
    resolver.resolve(&scope, &PathExpr::parse(raw)).await
}

async fn condition(raw: &str, data: &Value) -> bool {
    let (resolver, node) = resolver();
    let run = RunContext::new("ceph-osd", node.clone());
    let scope = Scope::new(&node, &run, data);
    resolver.evaluate_condition(&scope, &Condition::parse(raw)).await
}

#[tokio::test]
async fn test_nested_lookup_and_absence() {
    let data = json!({"crowbar": {"network": {"mode": "single", "admin": ["a", "b"]}}});

    assert_eq!(resolve("crowbar/network/mode", &data).await, Some(json!("single")));
    assert_eq!(resolve("crowbar/network/admin[1]", &data).await, Some(json!("b")));
    assert_eq!(resolve("crowbar/network/admin[2]", &data).await, None);
    assert_eq!(resolve("crowbar/missing/mode", &data).await, None);
    assert_eq!(resolve("crowbar/network/mode/deeper", &data).await, None);
}

#[tokio::test]
async fn test_conditions() {
    let data = json!({"a": {"b": 5, "flag": true}});

    assert!(condition("a/b == 5", &data).await);
    assert!(!condition("a/b != 5", &data).await);
    assert!(condition("a/b != 6", &data).await);
    assert!(condition("a/flag == true", &data).await);
    assert!(!condition("a/b <> 5", &data).await);
    assert!(!condition("a/b", &data).await);
    // Absent values compare as the empty string
    assert!(condition("a/missing != 5", &data).await);
    assert!(!condition("a/missing == 5", &data).await);
}

#[tokio::test]
async fn test_ipaddress_accessors() {
    let data = json!({});

    assert_eq!(
        resolve("eval:ipaddress(all,admin).cidr", &data).await,
        Some(json!("10.0.0.5/24"))
    );
    assert_eq!(
        resolve("eval:ipaddress(all,admin).address", &data).await,
        Some(json!("10.0.0.5"))
    );
    assert_eq!(
        resolve("eval:ipaddress(v4_only,storage_category).address", &data).await,
        Some(json!("10.1.0.5"))
    );
    assert_eq!(
        resolve("eval:ipaddress(all,storage_category).ifname", &data).await,
        Some(json!("eth1"))
    );
    assert_eq!(resolve("eval:ipaddress(v6_only,admin).address", &data).await, None);
}

#[tokio::test]
async fn test_category_attribute_defaults_to_admin() {
    assert_eq!(
        resolve("eval:ipaddress(admin,storage).address", &json!({})).await,
        Some(json!("10.0.0.5"))
    );
}

#[tokio::test]
async fn test_nodes_with_role_joins_in_id_order() {
    let data = json!({});

    assert_eq!(
        resolve("eval:nodes_with_role(ceph-osd).ipaddress(all,admin).address", &data).await,
        Some(json!("10.0.0.5 10.0.0.6 10.0.0.7"))
    );
    // Each peer is resolved against its own staged data
    assert_eq!(
        resolve("eval:nodes_with_role(ceph-osd).ceph/osd_id", &data).await,
        Some(json!("0  2"))
    );
    assert_eq!(
        resolve("eval:nodes_with_role(ceph-mds).ceph/osd_id", &data).await,
        Some(json!(""))
    );
}

#[tokio::test]
async fn test_first_node_with_role() {
    let data = json!({});

    assert_eq!(
        resolve("eval:first_node_with_role(ceph-osd).eval:ipaddress(all,admin).cidr", &data).await,
        Some(json!("10.0.0.5/24"))
    );
    assert_eq!(
        resolve("eval:first_node_with_role(ceph-mds).ipaddress(all,admin).cidr", &data).await,
        None
    );
}

#[tokio::test]
async fn test_unknown_function_is_absent() {
    assert_eq!(resolve("eval:hostname().short", &json!({})).await, None);
    assert_eq!(resolve("eval:not a call", &json!({})).await, None);
}

struct NodeNameFunction;

#[async_trait]
impl CustomFunction for NodeNameFunction {
    fn name(&self) -> &'static str {
        "node_name"
    }

    async fn call(
        &self,
        _resolver: &PathResolver,
        scope: &Scope<'_>,
        call: &FunctionCall,
    ) -> Option<Value> {
        let name = scope.node.name.clone();
        match call.subcommand.as_deref() {
            Some("upper") => Some(Value::String(name.to_uppercase())),
            _ => Some(Value::String(name)),
        }
    }
}

#[tokio::test]
async fn test_registered_function_is_dispatched() {
    let snapshot: DeploymentSnapshot = serde_yaml::from_str(SNAPSHOT).unwrap();
    let store = Arc::new(MemoryStore::new(snapshot));
    let node = store.node("node2").unwrap();

    let mut functions = FunctionRegistry::with_builtin_functions();
    functions.register(NodeNameFunction);
    let resolver = PathResolver::with_functions(store, functions);

    let run = RunContext::new("ceph-osd", node.clone());
    let data = json!({});
    let scope = Scope::new(&node, &run, &data);
    assert_eq!(
        resolver.resolve_str(&scope, "eval:node_name().upper").await,
        Some(json!("NODE2"))
    );
    // Also reachable through the peer functions
    assert_eq!(
        resolver
            .resolve_str(&scope, "eval:nodes_with_role(ceph-osd).node_name()")
            .await,
        Some(json!("node1 node2 node3"))
    );
}

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z_]{1,8}",
        ("[a-z]{1,6}", 0usize..4).prop_map(|(key, index)| format!("{key}[{index}]")),
    ]
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[ -~]{0,12}".prop_map(Value::from),
    ]
}

proptest! {
    #[test]
    fn prop_set_then_lookup_returns_value(
        segments in prop::collection::vec(segment(), 1..5),
        value in leaf(),
    ) {
        let path = DataPath::parse(&segments.join("/")).unwrap();
        let mut data = json!({});
        set_value(&mut data, &path, value.clone()).unwrap();
        prop_assert_eq!(lookup(&data, &path), Some(&value));
    }

    #[test]
    fn prop_nested_lookup_follows_segments(
        keys in prop::collection::vec("[a-z]{1,6}", 1..5),
        value in leaf(),
    ) {
        let mut data = value.clone();
        for key in keys.iter().rev() {
            let mut object = serde_json::Map::new();
            object.insert(key.clone(), data);
            data = Value::Object(object);
        }

        let path = DataPath::parse(&keys.join("/")).unwrap();
        prop_assert_eq!(lookup(&data, &path), Some(&value));

        let missing = DataPath::parse(&format!("{}/NOPE", keys.join("/"))).unwrap();
        prop_assert_eq!(lookup(&data, &missing), None);
    }
}
