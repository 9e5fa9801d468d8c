// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::context::JobContext;
use crate::epoch_millis_from;
use crate::registry::DeploymentRegistry;
use crate::sandbox::{InlineSandbox, Payload};
use async_trait::async_trait;
use jqm_core::{FakeClock, InstanceState, JobDefinition, Node, Queue, RunnerError, UserTags};
use jqm_storage::MaterializedState;
use std::collections::HashMap;
use tempfile::tempdir;

struct NoopPayload;

#[async_trait]
impl Payload for NoopPayload {
    async fn run(&self, _params: HashMap<String, String>, _ctx: Arc<JobContext>) -> Result<(), RunnerError> {
        Ok(())
    }
}

fn open_gateway(dir: &std::path::Path) -> Arc<Gateway> {
    Arc::new(Gateway::open(dir.join("events.wal"), 0, MaterializedState::default()).unwrap())
}

#[tokio::test]
async fn reconcile_starts_a_poller_that_drains_submitted_work() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let queue = Queue::builder().name("Q").build();
    let queue_id = queue.id;
    gw.register_queue(queue).unwrap();
    let def = JobDefinition::builder().entry_point_class("noop").default_queue(queue_id).build();
    let def_id = def.id;
    gw.register_job_definition(def).unwrap();
    let node = Node::builder().tmp_path(dir.path().join("tmp")).repo_path(dir.path().join("repo")).build();
    gw.register_node(node.clone()).unwrap();
    gw.upsert_deployment(DeploymentBinding::new(node.id, queue_id, 2, 5)).unwrap();

    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();

    let mut sandbox = InlineSandbox::new();
    sandbox.register("noop", Arc::new(NoopPayload));
    let registry = Arc::new(DeploymentRegistry::new(gw.clone()));
    let supervisor = Arc::new(Supervisor::new(
        gw.clone(),
        registry,
        node,
        Arc::new(sandbox),
        dir.path().join("deliverables"),
        1000,
        epoch_millis_from(FakeClock::new()),
        Duration::from_secs(5),
    ));

    assert_eq!(supervisor.recover().unwrap(), 0);
    supervisor.reconcile().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    supervisor.shutdown().await;

    assert_eq!(gw.get_state(&id), Some(InstanceState::Ended));
}

#[tokio::test]
async fn recover_marks_stale_attributed_instances_as_crashed() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let queue = Queue::builder().name("Q").build();
    let queue_id = queue.id;
    gw.register_queue(queue).unwrap();
    let def = JobDefinition::builder().entry_point_class("noop").default_queue(queue_id).build();
    let def_id = def.id;
    gw.register_job_definition(def).unwrap();
    let node = Node::builder().tmp_path(dir.path().join("tmp")).repo_path(dir.path().join("repo")).build();
    gw.register_node(node.clone()).unwrap();

    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    gw.reserve_next(&node.id, &queue_id, 1, 2_000).unwrap();

    let sandbox = Arc::new(InlineSandbox::new());
    let registry = Arc::new(DeploymentRegistry::new(gw.clone()));
    let supervisor = Arc::new(Supervisor::new(
        gw.clone(),
        registry,
        node,
        sandbox,
        dir.path().join("deliverables"),
        1000,
        epoch_millis_from(FakeClock::new()),
        Duration::from_secs(5),
    ));

    let recovered = supervisor.recover().unwrap();
    assert_eq!(recovered, 1);
    assert_eq!(gw.get_state(&id), Some(InstanceState::Crashed));
}
