// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Control-socket listener: accept a connection, read exactly one
//! `Request`, dispatch it against the `Gateway`/`Supervisor`, write exactly
//! one `Response`, close. No session state lives across connections —
//! every `jqmctl` invocation opens its own.

use std::sync::Arc;
use std::time::Instant;

use jqm_core::GatewayError;
use jqm_engine::{ProcessSandbox, Supervisor};
use jqm_storage::{Filters, Gateway};
use jqm_wire::{
    read_value_timeout, write_value_timeout, DeliverableEntry, HistoryEntry, InstanceDetail,
    InstanceSummary, MessageEntry, Query, Request, Response, DEFAULT_TIMEOUT,
};
use tokio::net::UnixListener;
use tokio::net::UnixStream;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::ConnectionError;

pub struct ListenCtx {
    pub gateway: Arc<Gateway>,
    #[allow(dead_code)]
    pub supervisor: Arc<Supervisor<ProcessSandbox>>,
    pub start_time: Instant,
    pub node_name: String,
    pub shutdown_tx: watch::Sender<bool>,
}

/// Accept connections until `shutdown` fires, handling each on its own
/// spawned task so one slow client can't stall the others.
pub async fn run(listener: UnixListener, ctx: Arc<ListenCtx>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &ctx).await {
                                log_connection_error(e);
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept error on control socket"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Protocol(jqm_wire::ProtocolError::ConnectionClosed) => {
            debug!("client disconnected before sending a request")
        }
        ConnectionError::Protocol(jqm_wire::ProtocolError::Timeout) => {
            debug!("timed out waiting on client")
        }
        other => error!(error = %other, "connection error"),
    }
}

async fn handle_connection(stream: UnixStream, ctx: &ListenCtx) -> Result<(), ConnectionError> {
    let (mut reader, mut writer) = stream.into_split();
    let request: Request = read_value_timeout(&mut reader, DEFAULT_TIMEOUT).await?;

    if matches!(request, Request::Query { .. }) {
        debug!(request = ?request, "received query");
    } else {
        info!(request = ?request, "received request");
    }

    let response = handle_request(request, ctx);
    write_value_timeout(&mut writer, &response, DEFAULT_TIMEOUT).await?;
    Ok(())
}

fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    let now_ms = jqm_core::Clock::epoch_ms(&jqm_core::SystemClock);
    match request {
        Request::Ping => Response::Pong,
        Request::Shutdown => {
            let _ = ctx.shutdown_tx.send(true);
            Response::Ack
        }

        Request::RegisterJobDefinition { def } => from_result(ctx.gateway.register_job_definition(def)),
        Request::RegisterQueue { queue } => from_result(ctx.gateway.register_queue(queue)),
        Request::RegisterNode { node } => from_result(ctx.gateway.register_node(node)),
        Request::UpsertDeployment { binding } => from_result(ctx.gateway.upsert_deployment(binding)),

        Request::Enqueue { job_definition, queue_override, priority_override, parameters, user_tags } => {
            match ctx.gateway.enqueue(&job_definition, queue_override, priority_override, parameters, user_tags, None, now_ms) {
                Ok(id) => Response::InstanceId { id },
                Err(e) => Response::error(e.to_string()),
            }
        }
        Request::Hold { id } => from_result(ctx.gateway.hold(&id)),
        Request::Resume { id } => from_result(ctx.gateway.resume(&id)),
        Request::Cancel { id } => from_result(ctx.gateway.cancel(&id, now_ms)),
        Request::Kill { id } => from_result(ctx.gateway.kill(&id)),
        Request::SetPriority { id, priority } => from_result(ctx.gateway.set_priority(&id, priority)),

        Request::Query { query } => handle_query(query, ctx),
    }
}

fn handle_query(query: Query, ctx: &ListenCtx) -> Response {
    match query {
        Query::GetState { id } => Response::State { state: ctx.gateway.get_state(&id) },
        Query::GetInstance { id } => {
            Response::Instance { instance: ctx.gateway.get_instance(&id).as_ref().map(InstanceDetail::from) }
        }
        Query::ListInstances { filters } => {
            let filters = Filters {
                queue: filters.queue,
                job_definition: filters.job_definition,
                node: filters.node,
                state: filters.state,
            };
            let instances: Vec<InstanceSummary> =
                ctx.gateway.list_instances(&filters).iter().map(InstanceSummary::from).collect();
            Response::Instances { instances }
        }
        Query::GetMessages { id } => {
            let messages: Vec<MessageEntry> = ctx.gateway.get_messages(&id).iter().map(MessageEntry::from).collect();
            Response::Messages { messages }
        }
        Query::GetProgress { id } => Response::Progress { progress: ctx.gateway.get_progress(&id) },
        Query::GetDeliverables { id } => {
            let deliverables: Vec<DeliverableEntry> =
                ctx.gateway.get_deliverables(&id).iter().map(DeliverableEntry::from).collect();
            Response::Deliverables { deliverables }
        }
        Query::DownloadDeliverable { id, deliverable_id } => {
            match ctx.gateway.get_deliverables(&id).into_iter().find(|d| d.id == deliverable_id) {
                Some(d) => match std::fs::read(&d.file_path) {
                    Ok(bytes) => Response::DeliverableBytes { bytes },
                    Err(e) => Response::error(format!("reading deliverable {deliverable_id}: {e}")),
                },
                None => Response::error(format!("no deliverable {deliverable_id} on instance {id}")),
            }
        }
        Query::GetHistory { id } => {
            Response::History { record: ctx.gateway.get_history(&id).as_ref().map(HistoryEntry::from) }
        }
        Query::ListDeployments { node } => Response::Deployments { deployments: ctx.gateway.list_deployments(&node) },
        Query::Status => Response::Status {
            node: ctx.node_name.clone(),
            uptime_secs: ctx.start_time.elapsed().as_secs(),
        },
    }
}

fn from_result(result: Result<(), GatewayError>) -> Response {
    match result {
        Ok(()) => Response::Ack,
        Err(e) => Response::error(e.to_string()),
    }
}
