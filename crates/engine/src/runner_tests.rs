// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::epoch_millis_from;
use crate::sandbox::{InlineSandbox, Payload};
use async_trait::async_trait;
use jqm_core::{FakeClock, InstanceState, JobDefinition, Node, Queue, UserTags};
use jqm_storage::{Filters, MaterializedState};
use std::collections::HashMap;
use std::time::Duration;
use tempfile::tempdir;

fn open_gateway(dir: &std::path::Path) -> Gateway {
    Gateway::open(dir.join("events.wal"), 0, MaterializedState::default()).unwrap()
}

fn make_node(dir: &std::path::Path) -> Node {
    Node::builder().tmp_path(dir.join("tmp")).repo_path(dir.join("repo")).build()
}

struct EchoPayload;

#[async_trait]
impl Payload for EchoPayload {
    async fn run(&self, _params: HashMap<String, String>, ctx: Arc<JobContext>) -> Result<(), RunnerError> {
        ctx.send_message("hello").await?;
        ctx.send_progress(50).await?;
        let path = ctx.work_dir().join("out.txt");
        tokio::fs::write(&path, b"data").await.map_err(|e| RunnerError::Payload(e.to_string()))?;
        ctx.add_deliverable(&path, "out").await?;
        Ok(())
    }
}

struct FailingPayload;

#[async_trait]
impl Payload for FailingPayload {
    async fn run(&self, _params: HashMap<String, String>, _ctx: Arc<JobContext>) -> Result<(), RunnerError> {
        Err(RunnerError::Payload("boom".into()))
    }
}

struct WaitForKillPayload;

#[async_trait]
impl Payload for WaitForKillPayload {
    async fn run(&self, _params: HashMap<String, String>, ctx: Arc<JobContext>) -> Result<(), RunnerError> {
        loop {
            ctx.yield_now().await?;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

fn seed(gw: &Gateway, entry_point: &str, can_restart: bool, max_restarts: u32) -> (jqm_core::JobDefId, jqm_core::QueueId) {
    let queue = Queue::builder().name("Q").build();
    let queue_id = queue.id;
    gw.register_queue(queue).unwrap();
    let def = JobDefinition::builder()
        .entry_point_class(entry_point)
        .default_queue(queue_id)
        .can_restart(can_restart)
        .max_restarts(max_restarts)
        .build();
    let def_id = def.id;
    gw.register_job_definition(def).unwrap();
    (def_id, queue_id)
}

#[tokio::test]
async fn happy_path_runner_archives_ended_with_messages_and_deliverable() {
    let dir = tempdir().unwrap();
    let gw = Arc::new(open_gateway(dir.path()));
    let (def_id, queue_id) = seed(&gw, "echo", false, 0);
    let node = make_node(dir.path());
    gw.register_node(node.clone()).unwrap();

    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    let reserved = gw.reserve_next(&node.id, &queue_id, 1, 2_000).unwrap();

    let mut sandbox = InlineSandbox::new();
    sandbox.register("echo", Arc::new(EchoPayload));
    let runner = Runner::new(
        gw.clone(),
        Arc::new(sandbox),
        node,
        dir.path().join("deliverables"),
        1000,
        epoch_millis_from(FakeClock::new()),
    );

    runner.run(reserved.into_iter().next().unwrap()).await;

    assert_eq!(gw.get_state(&id), Some(InstanceState::Ended));
    assert_eq!(gw.get_progress(&id), Some(50));
    assert_eq!(gw.get_messages(&id).len(), 1);
    assert_eq!(gw.get_deliverables(&id).len(), 1);
    assert!(gw.get_history(&id).is_some());
}

#[tokio::test]
async fn missing_payload_crashes_before_running_without_restart() {
    let dir = tempdir().unwrap();
    let gw = Arc::new(open_gateway(dir.path()));
    let (def_id, queue_id) = seed(&gw, "missing", true, 3);
    let node = make_node(dir.path());
    gw.register_node(node.clone()).unwrap();

    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    let reserved = gw.reserve_next(&node.id, &queue_id, 1, 2_000).unwrap();

    let runner = Runner::new(
        gw.clone(),
        Arc::new(InlineSandbox::new()),
        node,
        dir.path().join("deliverables"),
        1000,
        epoch_millis_from(FakeClock::new()),
    );
    runner.run(reserved.into_iter().next().unwrap()).await;

    assert_eq!(gw.get_state(&id), Some(InstanceState::Crashed));
    let all = gw.list_instances(&Filters { job_definition: Some(def_id), ..Default::default() });
    assert_eq!(all.len(), 1, "a prepare failure must not spawn a restart");
}

#[tokio::test]
async fn payload_failure_restarts_up_to_max_restarts() {
    let dir = tempdir().unwrap();
    let gw = Arc::new(open_gateway(dir.path()));
    let (def_id, queue_id) = seed(&gw, "failing", true, 1);
    let node = make_node(dir.path());
    gw.register_node(node.clone()).unwrap();

    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    let reserved = gw.reserve_next(&node.id, &queue_id, 1, 2_000).unwrap();

    let mut sandbox = InlineSandbox::new();
    sandbox.register("failing", Arc::new(FailingPayload));
    let runner = Runner::new(
        gw.clone(),
        Arc::new(sandbox),
        node,
        dir.path().join("deliverables"),
        1000,
        epoch_millis_from(FakeClock::new()),
    );
    runner.run(reserved.into_iter().next().unwrap()).await;

    assert_eq!(gw.get_state(&id), Some(InstanceState::Crashed));
    let all = gw.list_instances(&Filters { job_definition: Some(def_id), ..Default::default() });
    assert_eq!(all.len(), 2, "one restart should have been enqueued");
    let restarted = all.iter().find(|i| i.id != id).unwrap();
    assert_eq!(restarted.restart_count, 1);
    assert_eq!(restarted.parent_instance, Some(id));
}

#[tokio::test]
async fn payload_failure_does_not_restart_past_the_chain_bound() {
    let dir = tempdir().unwrap();
    let gw = Arc::new(open_gateway(dir.path()));
    let (def_id, queue_id) = seed(&gw, "failing", true, 0);
    let node = make_node(dir.path());
    gw.register_node(node.clone()).unwrap();

    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    let reserved = gw.reserve_next(&node.id, &queue_id, 1, 2_000).unwrap();

    let mut sandbox = InlineSandbox::new();
    sandbox.register("failing", Arc::new(FailingPayload));
    let runner = Runner::new(
        gw.clone(),
        Arc::new(sandbox),
        node,
        dir.path().join("deliverables"),
        1000,
        epoch_millis_from(FakeClock::new()),
    );
    runner.run(reserved.into_iter().next().unwrap()).await;

    assert_eq!(gw.get_state(&id), Some(InstanceState::Crashed));
    let all = gw.list_instances(&Filters { job_definition: Some(def_id), ..Default::default() });
    assert_eq!(all.len(), 1, "max_restarts=0 must not spawn a restart chain");
}

#[tokio::test]
async fn cooperative_kill_ends_in_killed() {
    let dir = tempdir().unwrap();
    let gw = Arc::new(open_gateway(dir.path()));
    let (def_id, queue_id) = seed(&gw, "waiter", false, 0);
    let node = make_node(dir.path());
    gw.register_node(node.clone()).unwrap();

    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    let reserved = gw.reserve_next(&node.id, &queue_id, 1, 2_000).unwrap();
    gw.kill(&id).unwrap();

    let mut sandbox = InlineSandbox::new();
    sandbox.register("waiter", Arc::new(WaitForKillPayload));
    let runner = Runner::new(
        gw.clone(),
        Arc::new(sandbox),
        node,
        dir.path().join("deliverables"),
        1000,
        epoch_millis_from(FakeClock::new()),
    );
    runner.run(reserved.into_iter().next().unwrap()).await;

    assert_eq!(gw.get_state(&id), Some(InstanceState::Killed));
    assert!(gw.get_history(&id).is_some());
}
