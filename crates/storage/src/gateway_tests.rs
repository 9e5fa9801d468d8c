// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use jqm_core::{JobDefinition, Node, Queue};
use tempfile::tempdir;

fn open_gateway(dir: &std::path::Path) -> Gateway {
    Gateway::open(dir.join("events.wal"), 0, MaterializedState::default()).unwrap()
}

fn seed(gw: &Gateway, queue_max: u32, highlander: bool) -> (JobDefId, QueueId) {
    let queue = Queue::builder().name("Q").max_size(queue_max).build();
    let queue_id = queue.id;
    gw.register_queue(queue).unwrap();
    let def = JobDefinition::builder().default_queue(queue_id).highlander_mode(highlander).build();
    let def_id = def.id;
    gw.register_job_definition(def).unwrap();
    (def_id, queue_id)
}

#[test]
fn happy_path_enqueue_and_reserve() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let (def_id, _queue_id) = seed(&gw, 0, false);
    let node = Node::builder().build();
    gw.register_node(node.clone()).unwrap();

    let mut params = HashMap::new();
    params.insert("p1".to_string(), "POUPETTE".to_string());
    let id = gw.enqueue(&def_id, None, None, params, UserTags::default(), None, 1_000).unwrap();

    assert_eq!(gw.get_state(&id), Some(InstanceState::Submitted));
    let instance = gw.get_instance(&id).unwrap();
    assert_eq!(instance.parameters.get("p1").unwrap(), "POUPETTE");
}

#[test]
fn reservation_orders_by_priority_then_enqueue_time_then_id() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let (def_id, queue_id) = seed(&gw, 0, false);
    let node = Node::builder().build();
    gw.register_node(node.clone()).unwrap();

    let low = gw.enqueue(&def_id, None, Some(7), HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    let high = gw.enqueue(&def_id, None, Some(42), HashMap::new(), UserTags::default(), None, 2_000).unwrap();

    let reserved = gw.reserve_next(&node.id, &queue_id, 10, 3_000).unwrap();
    assert_eq!(reserved[0].id, high);
    assert_eq!(reserved[1].id, low);
}

#[test]
fn queue_full_rejects_the_fourth_enqueue() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let (def_id, _) = seed(&gw, 3, false);

    for _ in 0..3 {
        gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    }
    let err = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000);
    assert!(matches!(err, Err(GatewayError::QueueFull { .. })));
}

#[test]
fn highlander_blocks_a_second_concurrent_reservation() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let (def_id, queue_id) = seed(&gw, 0, true);
    let node = Node::builder().build();
    gw.register_node(node.clone()).unwrap();

    gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_001).unwrap();

    let reserved = gw.reserve_next(&node.id, &queue_id, 10, 2_000).unwrap();
    assert_eq!(reserved.len(), 1, "only one highlander instance may be attributed at a time");

    // Still only one in flight even after a second poll attempt.
    let reserved_again = gw.reserve_next(&node.id, &queue_id, 10, 2_001).unwrap();
    assert!(reserved_again.is_empty());
}

#[test]
fn crash_recovery_marks_running_and_attributed_as_crashed() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let (def_id, queue_id) = seed(&gw, 0, false);
    let node = Node::builder().build();
    gw.register_node(node.clone()).unwrap();

    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    gw.reserve_next(&node.id, &queue_id, 1, 2_000).unwrap();
    gw.start(&id, 3_000).unwrap();

    let recovered = gw.recover_crashed(&node.id, 4_000).unwrap();
    assert_eq!(recovered, vec![id]);
    assert_eq!(gw.get_state(&id), Some(InstanceState::Crashed));
    assert!(gw.get_history(&id).is_some());
}

#[test]
fn every_terminal_transition_produces_exactly_one_history_record() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let (def_id, queue_id) = seed(&gw, 0, false);
    let node = Node::builder().build();
    gw.register_node(node.clone()).unwrap();

    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    assert!(gw.get_history(&id).is_none());
    gw.reserve_next(&node.id, &queue_id, 1, 2_000).unwrap();
    gw.start(&id, 3_000).unwrap();
    gw.finish_ended(&id, 4_000).unwrap();

    let record = gw.get_history(&id).unwrap();
    assert_eq!(record.final_state, InstanceState::Ended);
    assert_eq!(record.end_time_ms, 4_000);
}

#[test]
fn dispatcher_reject_requeues_to_submitted() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let (def_id, queue_id) = seed(&gw, 0, false);
    let node = Node::builder().build();
    gw.register_node(node.clone()).unwrap();

    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    gw.reserve_next(&node.id, &queue_id, 1, 2_000).unwrap();
    gw.requeue(&id).unwrap();

    let instance = gw.get_instance(&id).unwrap();
    assert_eq!(instance.state, InstanceState::Submitted);
    assert!(instance.attributed_node.is_none());
}

#[test]
fn kill_sets_pending_marker_without_changing_state() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let (def_id, queue_id) = seed(&gw, 0, false);
    let node = Node::builder().build();
    gw.register_node(node.clone()).unwrap();

    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    gw.reserve_next(&node.id, &queue_id, 1, 2_000).unwrap();
    gw.start(&id, 3_000).unwrap();
    gw.kill(&id).unwrap();

    let instance = gw.get_instance(&id).unwrap();
    assert_eq!(instance.state, InstanceState::Running);
    assert!(instance.pending_kill);
}

#[test]
fn messages_are_truncated_and_ordered() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let (def_id, _) = seed(&gw, 0, false);
    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();

    gw.record_message(&id, "first", 1_100).unwrap();
    gw.record_message(&id, "second", 1_200).unwrap();

    let messages = gw.get_messages(&id);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].text, "first");
    assert_eq!(messages[1].text, "second");
}

#[test]
fn progress_overwrites_and_clamps() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let (def_id, _) = seed(&gw, 0, false);
    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();

    gw.update_progress(&id, 40).unwrap();
    gw.update_progress(&id, 255).unwrap();
    assert_eq!(gw.get_progress(&id), Some(100));
}

#[test]
fn deliverable_ids_are_monotonic_per_gateway() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let (def_id, _) = seed(&gw, 0, false);
    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();

    let first = gw.record_deliverable(&id, "/tmp/a", "out", "hash-a", 10, 1_000).unwrap();
    let second = gw.record_deliverable(&id, "/tmp/b", "out2", "hash-b", 20, 1_001).unwrap();
    assert_eq!(first, 0);
    assert_eq!(second, 1);
    assert_eq!(gw.get_deliverables(&id).len(), 2);
}

#[test]
fn reopening_the_wal_replays_prior_events() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("events.wal");
    let id;
    {
        let gw = Gateway::open(&wal_path, 0, MaterializedState::default()).unwrap();
        let (def_id, _) = seed(&gw, 0, false);
        id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();
    }
    let gw = Gateway::open(&wal_path, 0, MaterializedState::default()).unwrap();
    assert_eq!(gw.get_state(&id), Some(InstanceState::Submitted));
}

#[test]
fn transition_on_wrong_state_is_a_state_conflict() {
    let dir = tempdir().unwrap();
    let gw = open_gateway(dir.path());
    let (def_id, _) = seed(&gw, 0, false);
    let id = gw.enqueue(&def_id, None, None, HashMap::new(), UserTags::default(), None, 1_000).unwrap();

    let err = gw.start(&id, 2_000);
    assert!(matches!(err, Err(GatewayError::StateConflict { .. })));
}
