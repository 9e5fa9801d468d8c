// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use jqm_core::{InstanceId, JobDefId, JobInstance, NodeId, QueueId};

fn instance(queue: QueueId, def: JobDefId, enqueue_time_ms: u64) -> JobInstance {
    JobInstance::new(def, queue, 0, HashMap::new(), enqueue_time_ms)
}

#[test]
fn submitted_count_only_counts_the_given_queue() {
    let mut state = MaterializedState::default();
    let queue_a = QueueId::new();
    let queue_b = QueueId::new();
    let def = JobDefId::new();

    let i1 = instance(queue_a, def, 1);
    let i2 = instance(queue_a, def, 2);
    let i3 = instance(queue_b, def, 3);
    state.apply_event(&JqmEvent::InstanceEnqueued { instance: i1 });
    state.apply_event(&JqmEvent::InstanceEnqueued { instance: i2 });
    state.apply_event(&JqmEvent::InstanceEnqueued { instance: i3 });

    assert_eq!(state.submitted_count(&queue_a), 2);
    assert_eq!(state.submitted_count(&queue_b), 1);
}

#[test]
fn highlander_blocks_only_while_attributed_or_running() {
    let mut state = MaterializedState::default();
    let queue = QueueId::new();
    let def = JobDefId::new();
    let node = NodeId::new();
    let instance = instance(queue, def, 1);
    let id = instance.id;
    state.apply_event(&JqmEvent::InstanceEnqueued { instance });
    assert!(!state.highlander_blocks(&def));

    state.apply_event(&JqmEvent::InstanceReserved { id, node_id: node, at_ms: 2 });
    assert!(state.highlander_blocks(&def));

    state.apply_event(&JqmEvent::InstanceStarted { id, at_ms: 3 });
    assert!(state.highlander_blocks(&def));

    state.apply_event(&JqmEvent::InstanceEnded { id, at_ms: 4 });
    assert!(!state.highlander_blocks(&def));
}

#[test]
fn apply_event_is_idempotent_for_enqueue() {
    let mut state = MaterializedState::default();
    let instance = instance(QueueId::new(), JobDefId::new(), 1);
    let event = JqmEvent::InstanceEnqueued { instance: instance.clone() };

    state.apply_event(&event);
    state.apply_event(&event);

    assert_eq!(state.instances.len(), 1);
    assert_eq!(state.instances.get(&instance.id).unwrap().enqueue_time_ms, 1);
}

#[test]
fn apply_event_is_idempotent_for_reservation() {
    let mut state = MaterializedState::default();
    let instance = instance(QueueId::new(), JobDefId::new(), 1);
    let id = instance.id;
    let node = NodeId::new();
    state.apply_event(&JqmEvent::InstanceEnqueued { instance });

    let reserve = JqmEvent::InstanceReserved { id, node_id: node, at_ms: 5 };
    state.apply_event(&reserve);
    state.apply_event(&reserve);

    let i = state.instances.get(&id).unwrap();
    assert_eq!(i.state, jqm_core::InstanceState::Attributed);
    assert_eq!(i.attribution_time_ms, Some(5));
}

#[test]
fn message_replay_does_not_duplicate_the_same_entry() {
    let mut state = MaterializedState::default();
    let id = InstanceId::new();
    let event = JqmEvent::MessageRecorded { id, text: "hello".into(), at_ms: 10 };

    state.apply_event(&event);
    state.apply_event(&event);

    assert_eq!(state.messages.get(&id).unwrap().len(), 1);
}

#[test]
fn deliverable_replay_does_not_duplicate_and_advances_next_id() {
    let mut state = MaterializedState::default();
    let id = InstanceId::new();
    let deliverable = jqm_core::Deliverable {
        id: 3,
        instance_id: id,
        file_path: "/tmp/x".into(),
        label: "out".into(),
        file_hash: "abc".into(),
        size: 1,
        created_at_ms: 1,
    };
    let event = JqmEvent::DeliverableRecorded { deliverable };

    state.apply_event(&event);
    state.apply_event(&event);

    assert_eq!(state.deliverables.get(&id).unwrap().len(), 1);
    assert_eq!(state.next_deliverable_id, 4);
}

#[test]
fn history_replay_keeps_the_first_record() {
    let mut state = MaterializedState::default();
    let id = InstanceId::new();
    let record = jqm_core::HistoryRecord {
        instance_id: id,
        job_definition: JobDefId::new(),
        final_state: jqm_core::InstanceState::Ended,
        enqueue_time_ms: 1,
        start_time_ms: Some(2),
        end_time_ms: 3,
        termination_reason: None,
    };
    state.apply_event(&JqmEvent::HistoryArchived { record: record.clone() });
    state.apply_event(&JqmEvent::HistoryArchived { record });

    assert_eq!(state.history.len(), 1);
}
