// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Instance lifecycle event handlers: every transition in the state
//! machine, plus progress/message/deliverable side records.

use super::MaterializedState;
use crate::event::JqmEvent;
use jqm_core::InstanceState;

pub(crate) fn apply(state: &mut MaterializedState, event: &JqmEvent) {
    match event {
        JqmEvent::InstanceEnqueued { instance } => {
            // Idempotent: a replayed enqueue of an instance already present
            // (from the immediate apply) is a no-op.
            state.instances.entry(instance.id).or_insert_with(|| instance.clone());
        }

        JqmEvent::InstanceReserved { id, node_id, at_ms } => {
            if let Some(inst) = state.instances.get_mut(id) {
                if inst.state == InstanceState::Submitted {
                    inst.state = InstanceState::Attributed;
                    inst.attributed_node = Some(*node_id);
                    inst.attribution_time_ms = Some(*at_ms);
                }
            }
        }

        JqmEvent::InstanceRequeued { id } => {
            if let Some(inst) = state.instances.get_mut(id) {
                if inst.state == InstanceState::Attributed {
                    inst.state = InstanceState::Submitted;
                    inst.attributed_node = None;
                    inst.attribution_time_ms = None;
                }
            }
        }

        JqmEvent::InstanceStarted { id, at_ms } => {
            if let Some(inst) = state.instances.get_mut(id) {
                if inst.state == InstanceState::Attributed {
                    inst.state = InstanceState::Running;
                    inst.start_time_ms = Some(*at_ms);
                }
            }
        }

        JqmEvent::InstanceHeld { id } => {
            if let Some(inst) = state.instances.get_mut(id) {
                if inst.state == InstanceState::Submitted {
                    inst.state = InstanceState::Hold;
                }
            }
        }

        JqmEvent::InstanceResumed { id } => {
            if let Some(inst) = state.instances.get_mut(id) {
                if inst.state == InstanceState::Hold {
                    inst.state = InstanceState::Submitted;
                }
            }
        }

        JqmEvent::InstanceCancelled { id, at_ms, reason } => {
            if let Some(inst) = state.instances.get_mut(id) {
                if matches!(inst.state, InstanceState::Submitted | InstanceState::Hold) {
                    inst.state = InstanceState::Cancelled;
                    inst.end_time_ms = Some(*at_ms);
                    inst.termination_reason = Some(reason.clone());
                }
            }
        }

        JqmEvent::InstanceEnded { id, at_ms } => {
            if let Some(inst) = state.instances.get_mut(id) {
                if inst.state == InstanceState::Running {
                    inst.state = InstanceState::Ended;
                    inst.end_time_ms = Some(*at_ms);
                }
            }
        }

        JqmEvent::InstanceCrashed { id, at_ms, reason } => {
            if let Some(inst) = state.instances.get_mut(id) {
                if matches!(inst.state, InstanceState::Running | InstanceState::Attributed) {
                    inst.state = InstanceState::Crashed;
                    inst.end_time_ms = Some(*at_ms);
                    inst.termination_reason = Some(reason.clone());
                }
            }
        }

        JqmEvent::InstanceKilled { id, at_ms, reason } => {
            if let Some(inst) = state.instances.get_mut(id) {
                if inst.state == InstanceState::Running {
                    inst.state = InstanceState::Killed;
                    inst.end_time_ms = Some(*at_ms);
                    inst.termination_reason = Some(reason.clone());
                }
            }
        }

        JqmEvent::InstancePriorityChanged { id, priority } => {
            if let Some(inst) = state.instances.get_mut(id) {
                inst.priority = *priority;
            }
        }

        JqmEvent::PendingKillSet { id } => {
            if let Some(inst) = state.instances.get_mut(id) {
                inst.pending_kill = true;
            }
        }

        JqmEvent::ProgressUpdated { id, progress } => {
            if let Some(inst) = state.instances.get_mut(id) {
                inst.progress = Some((*progress).min(100));
            }
        }

        JqmEvent::MessageRecorded { id, text, at_ms } => {
            let entries = state.messages.entry(*id).or_default();
            let already_recorded =
                entries.last().is_some_and(|m| m.timestamp_ms == *at_ms && m.text == *text);
            if !already_recorded {
                entries.push(jqm_core::Message::new(*id, text.clone(), *at_ms));
            }
        }

        JqmEvent::DeliverableRecorded { deliverable } => {
            let entries = state.deliverables.entry(deliverable.instance_id).or_default();
            if !entries.iter().any(|d| d.id == deliverable.id) {
                entries.push(deliverable.clone());
                state.next_deliverable_id = state.next_deliverable_id.max(deliverable.id + 1);
            }
        }

        _ => {}
    }
}
