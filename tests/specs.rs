// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end seed scenarios: a full `Gateway` + `Supervisor` +
//! `InlineSandbox` stack driven the way a real node would, asserting on
//! terminal state, ordering, and side records rather than on internal
//! gateway calls directly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jqm_core::{
    DeploymentBinding, FakeClock, GatewayError, InstanceState, JobDefinition, Node, Queue,
    RunnerError, UserTags,
};
use jqm_engine::{
    epoch_millis_from, Supervisor,
    sandbox::{InlineSandbox, Payload},
    DeploymentRegistry, JobContext,
};
use jqm_storage::{Gateway, MaterializedState};
use tempfile::tempdir;
use tokio::sync::Notify;

fn open_gateway(dir: &std::path::Path) -> Arc<Gateway> {
    Arc::new(Gateway::open(dir.join("events.wal"), 0, MaterializedState::default()).unwrap())
}

fn node_at(dir: &std::path::Path, name: &str) -> Node {
    Node::builder()
        .name(name)
        .repo_path(dir.join("repo"))
        .tmp_path(dir.join("tmp"))
        .build()
}

fn supervisor_for(
    gateway: Arc<Gateway>,
    node: Node,
    sandbox: InlineSandbox,
    deliverable_root: PathBuf,
) -> Arc<Supervisor<InlineSandbox>> {
    let registry = Arc::new(DeploymentRegistry::new(gateway.clone()));
    Arc::new(Supervisor::new(
        gateway,
        registry,
        node,
        Arc::new(sandbox),
        deliverable_root,
        1000,
        epoch_millis_from(FakeClock::new()),
        Duration::from_secs(5),
    ))
}

struct NoopPayload;

#[async_trait]
impl Payload for NoopPayload {
    async fn run(&self, _params: HashMap<String, String>, _ctx: Arc<JobContext>) -> Result<(), RunnerError> {
        Ok(())
    }
}

async fn wait_until_terminal(gateway: &Gateway, id: jqm_core::InstanceId, deadline: Duration) -> InstanceState {
    let start = tokio::time::Instant::now();
    loop {
        if let Some(state) = gateway.get_state(&id) {
            if state.is_terminal() {
                return state;
            }
        }
        if start.elapsed() > deadline {
            panic!("instance {id} did not reach a terminal state within {deadline:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn happy_path_enqueue_ends_with_history_and_parameters() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());

    let queue = Queue::builder().name("VIPQueue").default_priority(42).max_size(100).build();
    let queue_id = queue.id;
    gw.register_queue(queue).unwrap();

    let def = JobDefinition::builder().application_name("TestApp").entry_point_class("noop").default_queue(queue_id).build();
    let def_id = def.id;
    gw.register_job_definition(def).unwrap();

    let node = node_at(dir.path(), "node-a");
    gw.register_node(node.clone()).unwrap();
    gw.upsert_deployment(DeploymentBinding::new(node.id, queue_id, 3, 1000)).unwrap();

    let mut params = HashMap::new();
    params.insert("p1".to_string(), "POUPETTE".to_string());
    let id = gw.enqueue(&def_id, None, None, params, UserTags::default(), None, 1_000).unwrap();

    let mut sandbox = InlineSandbox::new();
    sandbox.register("noop", Arc::new(NoopPayload));
    let supervisor = supervisor_for(gw.clone(), node, sandbox, dir.path().join("deliverables"));

    assert_eq!(supervisor.recover().unwrap(), 0);
    supervisor.reconcile().await;
    let state = wait_until_terminal(&gw, id, Duration::from_secs(5)).await;
    supervisor.shutdown().await;

    assert_eq!(state, InstanceState::Ended);
    let instance = gw.get_instance(&id).unwrap();
    assert_eq!(instance.parameters.get("p1").map(String::as_str), Some("POUPETTE"));
    let history = gw.get_history(&id).expect("history record must exist for a terminal instance");
    assert_eq!(history.final_state, InstanceState::Ended);
}

#[tokio::test]
async fn priority_ordering_reserves_higher_priority_first() {
    // Reservation ordering is guaranteed only within one queue (spec section
    // 5: "across queues ... no global order is promised"), so this drives
    // the property the gateway actually commits to: with concurrency=1 on
    // a single queue, the higher-priority request is attributed first
    // regardless of enqueue order.
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());

    let queue = Queue::builder().name("SharedQueue").build();
    let queue_id = queue.id;
    gw.register_queue(queue).unwrap();
    let def = JobDefinition::builder().entry_point_class("noop").default_queue(queue_id).build();
    let def_id = def.id;
    gw.register_job_definition(def).unwrap();
    let node = node_at(dir.path(), "node-a");
    gw.register_node(node.clone()).unwrap();

    let a = gw.enqueue(&def_id, None, Some(7), HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    let b = gw.enqueue(&def_id, None, Some(42), HashMap::new(), UserTags::default(), None, 1_001).unwrap();

    let reserved = gw.reserve_next(&node.id, &queue_id, 1, 2_000).unwrap();
    assert_eq!(reserved.len(), 1);
    assert_eq!(reserved[0].id, b, "the higher-priority instance must be reserved before the lower-priority one");
    assert_eq!(gw.get_state(&a), Some(InstanceState::Submitted));
}

#[tokio::test]
async fn highlander_allows_only_one_live_instance_at_a_time() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());

    let queue = Queue::builder().name("HQueue").build();
    let queue_id = queue.id;
    gw.register_queue(queue).unwrap();
    let def = JobDefinition::builder().entry_point_class("slow").default_queue(queue_id).highlander_mode(true).build();
    let def_id = def.id;
    gw.register_job_definition(def).unwrap();
    let node = node_at(dir.path(), "node-a");
    gw.register_node(node.clone()).unwrap();
    gw.upsert_deployment(DeploymentBinding::new(node.id, queue_id, 2, 20)).unwrap();

    let release = Arc::new(Notify::new());
    struct GatedPayload(Arc<Notify>);
    #[async_trait]
    impl Payload for GatedPayload {
        async fn run(&self, _params: HashMap<String, String>, ctx: Arc<JobContext>) -> Result<(), RunnerError> {
            self.0.notified().await;
            ctx.yield_now().await?;
            Ok(())
        }
    }

    let first = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    let second = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_001).unwrap();

    let mut sandbox = InlineSandbox::new();
    sandbox.register("slow", Arc::new(GatedPayload(release.clone())));
    let supervisor = supervisor_for(gw.clone(), node, sandbox, dir.path().join("deliverables"));
    supervisor.reconcile().await;

    // Give the poller a few ticks to reserve; with max_concurrent=2 both
    // *could* be admitted if Highlander didn't block the second.
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if gw.get_state(&first) == Some(InstanceState::Running) {
            break;
        }
    }
    assert_eq!(gw.get_state(&first), Some(InstanceState::Running));
    assert_eq!(gw.get_state(&second), Some(InstanceState::Submitted), "second instance must stay SUBMITTED while the first is live");

    release.notify_one();
    let state = wait_until_terminal(&gw, first, Duration::from_secs(5)).await;
    assert_eq!(state, InstanceState::Ended);

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if gw.get_state(&second) == Some(InstanceState::Running) {
            break;
        }
    }
    assert_eq!(gw.get_state(&second), Some(InstanceState::Running), "second instance may only start once the first reached a terminal state");
    release.notify_one();
    let state = wait_until_terminal(&gw, second, Duration::from_secs(5)).await;
    assert_eq!(state, InstanceState::Ended);
    supervisor.shutdown().await;
}

#[tokio::test]
async fn cooperative_kill_only_stops_at_the_next_yield() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());

    let queue = Queue::builder().name("Q").build();
    let queue_id = queue.id;
    gw.register_queue(queue).unwrap();
    let def = JobDefinition::builder().entry_point_class("loop").default_queue(queue_id).build();
    let def_id = def.id;
    gw.register_job_definition(def).unwrap();
    let node = node_at(dir.path(), "node-a");
    gw.register_node(node.clone()).unwrap();
    gw.upsert_deployment(DeploymentBinding::new(node.id, queue_id, 1, 20)).unwrap();

    let started = Arc::new(Notify::new());
    struct LoopingPayload(Arc<Notify>);
    #[async_trait]
    impl Payload for LoopingPayload {
        async fn run(&self, _params: HashMap<String, String>, ctx: Arc<JobContext>) -> Result<(), RunnerError> {
            self.0.notify_one();
            loop {
                ctx.yield_now().await?;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }

    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();

    let mut sandbox = InlineSandbox::new();
    sandbox.register("loop", Arc::new(LoopingPayload(started.clone())));
    let supervisor = supervisor_for(gw.clone(), node, sandbox, dir.path().join("deliverables"));
    supervisor.reconcile().await;

    tokio::time::timeout(Duration::from_secs(2), started.notified()).await.expect("payload never started");
    assert_eq!(gw.get_state(&id), Some(InstanceState::Running));

    gw.kill(&id).unwrap();
    // The CAS-based state field doesn't flip to KILLED the instant kill()
    // is called — only once the running payload observes pending_kill at
    // its next yield_now().
    let state = wait_until_terminal(&gw, id, Duration::from_secs(2)).await;
    assert_eq!(state, InstanceState::Killed);
    supervisor.shutdown().await;
}

#[tokio::test]
async fn crash_recovery_marks_stale_running_instances_before_any_new_reservation() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());

    let queue = Queue::builder().name("Q").build();
    let queue_id = queue.id;
    gw.register_queue(queue).unwrap();
    let def = JobDefinition::builder().entry_point_class("noop").default_queue(queue_id).build();
    let def_id = def.id;
    gw.register_job_definition(def).unwrap();
    let node = node_at(dir.path(), "node-a");
    gw.register_node(node.clone()).unwrap();

    let a = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    let b = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_001).unwrap();
    gw.reserve_next(&node.id, &queue_id, 2, 2_000).unwrap();
    gw.start(&a, 2_100).unwrap();
    gw.start(&b, 2_100).unwrap();
    assert_eq!(gw.get_state(&a), Some(InstanceState::Running));
    assert_eq!(gw.get_state(&b), Some(InstanceState::Running));

    // Simulate restarting node N: a fresh Supervisor over the same Gateway.
    let mut sandbox = InlineSandbox::new();
    sandbox.register("noop", Arc::new(NoopPayload));
    let supervisor = supervisor_for(gw.clone(), node, sandbox, dir.path().join("deliverables"));

    let recovered = supervisor.recover().unwrap();
    assert_eq!(recovered, 2);
    assert_eq!(gw.get_state(&a), Some(InstanceState::Crashed));
    assert_eq!(gw.get_state(&b), Some(InstanceState::Crashed));
}

#[tokio::test]
async fn queue_full_rejects_the_fourth_enqueue_until_capacity_frees_up() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());

    let queue = Queue::builder().name("SlowQueue").max_size(3).build();
    let queue_id = queue.id;
    gw.register_queue(queue).unwrap();
    let def = JobDefinition::builder().entry_point_class("noop").default_queue(queue_id).build();
    let def_id = def.id;
    gw.register_job_definition(def).unwrap();
    let node = node_at(dir.path(), "node-a");
    gw.register_node(node.clone()).unwrap();
    gw.upsert_deployment(DeploymentBinding::new(node.id, queue_id, 3, 1000)).unwrap();

    let mut ids = Vec::new();
    for i in 0..3 {
        ids.push(gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000 + i).unwrap());
    }
    let fourth = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_010);
    assert!(matches!(fourth, Err(GatewayError::QueueFull { max_size: 3, .. })));

    let mut sandbox = InlineSandbox::new();
    sandbox.register("noop", Arc::new(NoopPayload));
    let supervisor = supervisor_for(gw.clone(), node, sandbox, dir.path().join("deliverables"));
    supervisor.reconcile().await;

    for id in ids {
        let state = wait_until_terminal(&gw, id, Duration::from_secs(5)).await;
        assert_eq!(state, InstanceState::Ended);
    }
    supervisor.shutdown().await;
}
