//! End-to-end dispatch against the counting in-memory broker.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use mcp_kafka_core::{
    ArgumentBag, BrokerConnectionConfig, ErrorKind, NewTopicSpec, OperationSpec, RegistryError,
    ResourceClass, ResultEnvelope, ToolKind, ToolRegistry,
};
use mcp_kafka_server::gateway::{BrokerGateway, Faults, MemoryBroker};
use mcp_kafka_server::service::{Dispatcher, ServerConfig, ALREADY_EXISTS_NOTE};
use proptest::prelude::*;
use serde_json::{json, Value};

fn gateway(broker: &MemoryBroker) -> BrokerGateway {
    let config = BrokerConnectionConfig::plaintext(
        BrokerConnectionConfig::parse_bootstrap("localhost:9092").unwrap(),
    )
    .unwrap();
    BrokerGateway::new(Arc::new(broker.clone()), Arc::new(config))
}

fn dispatcher_with(broker: &MemoryBroker, registry: ToolRegistry) -> Dispatcher {
    Dispatcher::new(
        Arc::new(registry),
        gateway(broker),
        Arc::new(ServerConfig::default()),
    )
}

fn dispatcher(broker: &MemoryBroker) -> Dispatcher {
    dispatcher_with(broker, ToolRegistry::standard())
}

fn args(value: Value) -> ArgumentBag {
    value.as_object().cloned().unwrap()
}

fn seed(broker: &MemoryBroker, name: &str) {
    broker
        .seed_topic(&NewTopicSpec {
            name: name.to_string(),
            num_partitions: 1,
            replication_factor: 1,
            config: Default::default(),
        })
        .unwrap();
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Cheap failures: nothing reaches the broker
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn unknown_operations_never_touch_the_broker(name in "[a-z_]{1,24}") {
        prop_assume!(ToolKind::from_name(&name).is_none());

        let broker = MemoryBroker::new();
        let mut d = dispatcher(&broker);
        let env = runtime().block_on(d.dispatch(&name, &ArgumentBag::new()));

        prop_assert_eq!(env.error_kind(), Some(ErrorKind::UnknownOperation));
        let expected_prefix = format!("Failed to execute tool '{name}': UnknownOperationError - ");
        prop_assert!(env.render().starts_with(&expected_prefix));
        prop_assert_eq!(broker.stats().connect_attempts, 0);
    }

    #[test]
    fn non_positive_partition_counts_rejected_without_connecting(n in i64::MIN..=0) {
        let broker = MemoryBroker::new();
        let mut d = dispatcher(&broker);
        let env = runtime().block_on(
            d.dispatch("create_topic", &args(json!({ "topic": "t", "num_partitions": n }))),
        );

        prop_assert_eq!(env.error_kind(), Some(ErrorKind::InvalidArgument));
        prop_assert!(env.render().contains("'num_partitions'"));
        prop_assert_eq!(broker.stats().connect_attempts, 0);
    }
}

#[tokio::test]
async fn missing_required_field_is_named() {
    let broker = MemoryBroker::new();
    let mut d = dispatcher(&broker);

    let env = d
        .dispatch("publish_message", &args(json!({ "topic": "orders" })))
        .await;
    assert_eq!(env.error_kind(), Some(ErrorKind::InvalidArgument));
    assert!(env.render().contains("'message'"));

    let env = d.dispatch("get_topic_info", &ArgumentBag::new()).await;
    assert!(env.render().contains("'topic'"));

    assert_eq!(broker.stats().connect_attempts, 0);
}

#[tokio::test]
async fn replication_factor_zero_rejected() {
    let broker = MemoryBroker::new();
    let mut d = dispatcher(&broker);
    let env = d
        .dispatch(
            "create_topic",
            &args(json!({ "topic": "t", "replication_factor": 0 })),
        )
        .await;
    assert_eq!(env.error_kind(), Some(ErrorKind::InvalidArgument));
    assert!(env.render().contains("'replication_factor'"));
    assert_eq!(broker.stats().connect_attempts, 0);
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

fn accepted_names(d: &mut Dispatcher, rt: &tokio::runtime::Runtime) -> BTreeSet<String> {
    ToolKind::ALL
        .iter()
        .map(|t| t.name())
        .filter(|name| {
            let env = rt.block_on(d.dispatch(name, &ArgumentBag::new()));
            env.error_kind() != Some(ErrorKind::UnknownOperation)
        })
        .map(str::to_string)
        .collect()
}

#[test]
fn announced_tools_equal_accepted_tools() {
    let rt = runtime();
    let registries = [
        ToolRegistry::standard(),
        ToolRegistry::new(vec![ToolKind::ListTopics.spec()]).unwrap(),
        ToolRegistry::new(vec![ToolKind::CreateTopic.spec(), ToolKind::DeleteTopic.spec()]).unwrap(),
        ToolRegistry::new(Vec::new()).unwrap(),
    ];

    for registry in registries {
        let broker = MemoryBroker::new();
        let mut d = dispatcher_with(&broker, registry);
        let announced: BTreeSet<String> = d.tools().into_iter().map(|t| t.name).collect();
        assert_eq!(announced, accepted_names(&mut d, &rt));
    }
}

#[test]
fn registries_that_would_announce_unexecutable_tools_are_refused() {
    let custom = OperationSpec {
        name: "describe_cluster",
        ..ToolKind::ListTopics.spec()
    };
    assert!(matches!(
        ToolRegistry::new(vec![custom]),
        Err(RegistryError::UnknownOperation(name)) if name == "describe_cluster"
    ));

    let misrouted = OperationSpec {
        resource_class: ResourceClass::Producer,
        ..ToolKind::ListTopics.spec()
    };
    assert!(matches!(
        ToolRegistry::new(vec![ToolKind::PublishMessage.spec(), misrouted]),
        Err(RegistryError::ResourceClassMismatch { name, .. }) if name == "list_topics"
    ));
}

#[test]
fn announced_schemas_come_from_the_registry() {
    let broker = MemoryBroker::new();
    let d = dispatcher(&broker);
    let create = d
        .tools()
        .into_iter()
        .find(|t| t.name == "create_topic")
        .unwrap();
    assert_eq!(create.input_schema["required"], json!(["topic"]));
    assert_eq!(create.input_schema["properties"]["num_partitions"]["minimum"], 1);
}

// ---------------------------------------------------------------------------
// Topic administration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_topic_twice_returns_note_on_second_call() {
    let broker = MemoryBroker::new();
    let mut d = dispatcher(&broker);
    let call = args(json!({ "topic": "orders", "num_partitions": 3 }));

    let first = d.dispatch("create_topic", &call).await;
    assert_eq!(
        first,
        ResultEnvelope::ok(
            "Topic 'orders' created successfully with 3 partition(s) and replication factor 1."
        )
    );

    let second = d.dispatch("create_topic", &call).await;
    assert!(!second.is_err());
    assert_eq!(second.note(), Some(ALREADY_EXISTS_NOTE));
    assert_eq!(
        second.render(),
        "Topic 'orders' already exists; no changes were made.\nNote: topic already exists"
    );

    let stats = broker.stats();
    assert_eq!(stats.admins_opened, 2);
    assert_eq!(stats.admins_closed, 2);
}

#[tokio::test]
async fn missing_topics_are_not_found() {
    let broker = MemoryBroker::new();
    let mut d = dispatcher(&broker);

    let deleted = d
        .dispatch("delete_topic", &args(json!({ "topic": "ghost" })))
        .await;
    assert_eq!(deleted.error_kind(), Some(ErrorKind::NotFound));
    assert!(deleted
        .render()
        .starts_with("Failed to execute tool 'delete_topic': NotFoundError - "));

    let described = d
        .dispatch("get_topic_info", &args(json!({ "topic": "ghost" })))
        .await;
    assert_eq!(described.error_kind(), Some(ErrorKind::NotFound));

    assert_eq!(broker.stats().open_handles(), 0);
}

#[tokio::test]
async fn get_topic_info_renders_partitions_and_config() {
    let broker = MemoryBroker::new();
    let mut d = dispatcher(&broker);
    d.dispatch(
        "create_topic",
        &args(json!({
            "topic": "orders",
            "num_partitions": 2,
            "config": { "retention.ms": "1000" }
        })),
    )
    .await;

    let env = d
        .dispatch("get_topic_info", &args(json!({ "topic": "orders" })))
        .await;
    let info: Value = serde_json::from_str(&env.render()).unwrap();
    assert_eq!(info["topic_name"], "orders");
    assert_eq!(info["is_internal"], false);
    assert_eq!(info["partitions"].as_array().unwrap().len(), 2);
    assert_eq!(info["partitions"][0]["partition_id"], 0);
    assert_eq!(info["configuration"]["retention.ms"], "1000");
}

#[tokio::test]
async fn delete_topic_removes_it() {
    let broker = MemoryBroker::new();
    seed(&broker, "orders");
    let mut d = dispatcher(&broker);

    let env = d
        .dispatch("delete_topic", &args(json!({ "topic": "orders" })))
        .await;
    assert_eq!(
        env.render(),
        "Topic 'orders' deleted successfully. Deletion may take time to complete on the broker."
    );
    assert!(!broker.has_topic("orders"));
}

#[tokio::test]
async fn list_topics_on_empty_cluster_is_empty_success() {
    let broker = MemoryBroker::new();
    let mut d = dispatcher(&broker);
    let env = d.dispatch("list_topics", &ArgumentBag::new()).await;
    assert_eq!(env, ResultEnvelope::ok("[]"));
}

#[tokio::test]
async fn list_topics_is_sorted() {
    let broker = MemoryBroker::new();
    for name in ["zeta", "alpha", "mid"] {
        seed(&broker, name);
    }
    let mut d = dispatcher(&broker);
    let env = d.dispatch("list_topics", &ArgumentBag::new()).await;
    assert_eq!(env.render(), r#"["alpha","mid","zeta"]"#);
}

// ---------------------------------------------------------------------------
// Publishing and handle release
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_succeeds_and_releases_once() {
    let broker = MemoryBroker::new();
    let mut d = dispatcher(&broker);

    let env = d
        .dispatch(
            "publish_message",
            &args(json!({ "topic": "orders", "message": "hello", "key": "k1" })),
        )
        .await;
    assert_eq!(
        env.render(),
        "Message published successfully to topic 'orders' (partition 0, offset 0)."
    );

    let stored = broker.messages("orders");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].payload, b"hello");
    assert_eq!(stored[0].key.as_deref(), Some(&b"k1"[..]));

    let stats = broker.stats();
    assert_eq!(stats.producers_opened, 1);
    assert_eq!(stats.producers_closed, 1);
}

#[tokio::test]
async fn publish_nack_still_releases_once() {
    let broker = MemoryBroker::new();
    broker.set_faults(Faults {
        reject_publish: true,
        ..Faults::default()
    });
    let mut d = dispatcher(&broker);

    let env = d
        .dispatch(
            "publish_message",
            &args(json!({ "topic": "orders", "message": "hello", "key": "k1" })),
        )
        .await;
    assert_eq!(env.error_kind(), Some(ErrorKind::Publish));

    let stats = broker.stats();
    assert_eq!(stats.producers_opened, 1);
    assert_eq!(stats.producers_closed, 1);
    assert!(broker.messages("orders").is_empty());
}

#[tokio::test]
async fn unreachable_broker_is_connection_error_and_loop_recovers() {
    let broker = MemoryBroker::new();
    broker.set_faults(Faults {
        unreachable: true,
        ..Faults::default()
    });
    let mut d = dispatcher(&broker);

    let env = d.dispatch("list_topics", &ArgumentBag::new()).await;
    assert_eq!(env.error_kind(), Some(ErrorKind::Connection));
    assert_eq!(broker.stats().open_handles(), 0);

    broker.set_faults(Faults::default());
    let env = d.dispatch("list_topics", &ArgumentBag::new()).await;
    assert!(!env.is_err());
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stalled_delete_times_out_then_list_succeeds() {
    let broker = MemoryBroker::new();
    seed(&broker, "orders");
    broker.set_faults(Faults {
        stall_acks: true,
        ..Faults::default()
    });
    let mut d = dispatcher(&broker);

    let started = tokio::time::Instant::now();
    let env = d
        .dispatch("delete_topic", &args(json!({ "topic": "orders" })))
        .await;
    assert_eq!(env.error_kind(), Some(ErrorKind::Timeout));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(started.elapsed() < Duration::from_secs(35));
    assert_eq!(broker.stats().admins_closed, 1);

    broker.set_faults(Faults::default());
    let env = d.dispatch("list_topics", &ArgumentBag::new()).await;
    assert_eq!(env, ResultEnvelope::ok(r#"["orders"]"#));
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_publish_is_publish_error_and_releases() {
    let broker = MemoryBroker::new();
    broker.set_faults(Faults {
        stall_acks: true,
        ..Faults::default()
    });
    let mut d = dispatcher(&broker);

    let started = tokio::time::Instant::now();
    let env = d
        .dispatch(
            "publish_message",
            &args(json!({ "topic": "orders", "message": "m" })),
        )
        .await;
    let waited = started.elapsed();

    assert_eq!(env.error_kind(), Some(ErrorKind::Publish));
    assert!(env.render().contains("PublishError - "));
    let config = ServerConfig::default();
    assert!(waited >= config.publish_ack_timeout());
    assert!(waited < Duration::from_millis(config.timeout_for(ToolKind::PublishMessage)));

    // Released in place, not by a cancelled scope.
    let stats = broker.stats();
    assert_eq!(stats.producers_opened, 1);
    assert_eq!(stats.producers_closed, 1);
}
