// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn instance() -> JobInstance {
    JobInstance::new(JobDefId::new(), QueueId::new(), 0, HashMap::new(), 1_000)
}

#[test]
fn new_instance_starts_submitted_with_no_attribution() {
    let i = instance();
    assert_eq!(i.state, InstanceState::Submitted);
    assert!(i.attribution_invariant_holds());
    assert!(i.end_time_invariant_holds());
}

#[test]
fn reservation_then_start_then_end_is_legal() {
    use InstanceState::*;
    assert!(Submitted.can_transition_to(Attributed));
    assert!(Attributed.can_transition_to(Running));
    assert!(Running.can_transition_to(Ended));
}

#[test]
fn cannot_skip_attributed_to_reach_running() {
    assert!(!InstanceState::Submitted.can_transition_to(InstanceState::Running));
}

#[test]
fn cannot_leave_a_terminal_state() {
    for terminal in [
        InstanceState::Ended,
        InstanceState::Crashed,
        InstanceState::Killed,
        InstanceState::Cancelled,
    ] {
        assert!(terminal.is_terminal());
        for to in [InstanceState::Submitted, InstanceState::Attributed, InstanceState::Running] {
            assert!(!terminal.can_transition_to(to));
        }
    }
}

#[test]
fn hold_and_resume_round_trip() {
    use InstanceState::*;
    assert!(Submitted.can_transition_to(Hold));
    assert!(Hold.can_transition_to(Submitted));
}

#[test]
fn boot_recovery_crashes_attributed_and_running() {
    use InstanceState::*;
    assert!(Attributed.can_transition_to(Crashed));
    assert!(Running.can_transition_to(Crashed));
}

#[test]
fn dispatcher_reject_requeues_attributed_to_submitted() {
    use InstanceState::*;
    assert!(Attributed.can_transition_to(Submitted));
}

#[test]
fn end_time_invariant_flags_mismatch() {
    let mut i = instance();
    i.state = InstanceState::Ended;
    assert!(!i.end_time_invariant_holds());
    i.end_time_ms = Some(2_000);
    assert!(i.end_time_invariant_holds());
}

#[test]
fn ordering_invariant_rejects_start_before_attribution() {
    let mut i = instance();
    i.attribution_time_ms = Some(500);
    i.start_time_ms = Some(100);
    assert!(!i.ordering_invariant_holds());
}

#[test]
fn message_is_truncated_to_limit() {
    let body: String = std::iter::repeat('x').take(50).collect();
    let msg = Message::new_with_limit(InstanceId::new(), body, 0, 10);
    assert_eq!(msg.text.len(), 10);
}
