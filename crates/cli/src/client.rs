// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! `DaemonClient`: a thin one-request-per-connection client for `jqmd`'s
//! control socket. Every public method round-trips exactly one `Request`
//! (or `Query`) and unwraps the one `Response` variant it expects.

use std::collections::HashMap;
use std::path::PathBuf;

use jqm_core::{
    DeploymentBinding, InstanceId, JobDefId, JobDefinition, Node, Queue, QueueId, UserTags,
};
use jqm_wire::{
    read_value_timeout, write_value_timeout, DeliverableEntry, HistoryEntry, InstanceDetail,
    InstanceState, InstanceSummary, MessageEntry, Query, Request, Response, DEFAULT_TIMEOUT,
};
use thiserror::Error;
use tokio::net::UnixStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to jqmd at {path}: {source}")]
    Connect { path: PathBuf, #[source] source: std::io::Error },
    #[error("protocol error: {0}")]
    Protocol(#[from] jqm_wire::ProtocolError),
    #[error("daemon returned an error: {0}")]
    Daemon(String),
    #[error("unexpected response from daemon: {0:?}")]
    Unexpected(Response),
}

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Resolve the default socket path the same way `jqmd::Config::load_default`
    /// does, without pulling in the daemon crate as a dependency.
    pub fn connect_default() -> Result<Self, ClientError> {
        let state_dir = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|d| d.join("jqm"))
            .unwrap_or_else(|| PathBuf::from("/tmp/jqm"));
        Ok(Self::new(state_dir.join("daemon.sock")))
    }

    async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| ClientError::Connect { path: self.socket_path.clone(), source })?;
        write_value_timeout(&mut stream, request, DEFAULT_TIMEOUT).await?;
        let response: Response = read_value_timeout(&mut stream, DEFAULT_TIMEOUT).await?;
        if let Response::Error { message } = response {
            return Err(ClientError::Daemon(message));
        }
        Ok(response)
    }

    fn reject<T>(response: Response) -> Result<T, ClientError> {
        Err(ClientError::Unexpected(response))
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        match self.send(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn shutdown(&self) -> Result<(), ClientError> {
        match self.send(&Request::Shutdown).await? {
            Response::Ack => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn status(&self) -> Result<(String, u64), ClientError> {
        match self.send(&Request::Query { query: Query::Status }).await? {
            Response::Status { node, uptime_secs } => Ok((node, uptime_secs)),
            other => Self::reject(other),
        }
    }

    pub async fn register_job_definition(&self, def: JobDefinition) -> Result<(), ClientError> {
        match self.send(&Request::RegisterJobDefinition { def }).await? {
            Response::Ack => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn register_queue(&self, queue: Queue) -> Result<(), ClientError> {
        match self.send(&Request::RegisterQueue { queue }).await? {
            Response::Ack => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn register_node(&self, node: Node) -> Result<(), ClientError> {
        match self.send(&Request::RegisterNode { node }).await? {
            Response::Ack => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn upsert_deployment(&self, binding: DeploymentBinding) -> Result<(), ClientError> {
        match self.send(&Request::UpsertDeployment { binding }).await? {
            Response::Ack => Ok(()),
            other => Self::reject(other),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue(
        &self,
        job_definition: JobDefId,
        queue_override: Option<QueueId>,
        priority_override: Option<i32>,
        parameters: HashMap<String, String>,
        user_tags: UserTags,
    ) -> Result<InstanceId, ClientError> {
        let request = Request::Enqueue { job_definition, queue_override, priority_override, parameters, user_tags };
        match self.send(&request).await? {
            Response::InstanceId { id } => Ok(id),
            other => Self::reject(other),
        }
    }

    pub async fn hold(&self, id: InstanceId) -> Result<(), ClientError> {
        match self.send(&Request::Hold { id }).await? {
            Response::Ack => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn resume(&self, id: InstanceId) -> Result<(), ClientError> {
        match self.send(&Request::Resume { id }).await? {
            Response::Ack => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn cancel(&self, id: InstanceId) -> Result<(), ClientError> {
        match self.send(&Request::Cancel { id }).await? {
            Response::Ack => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn kill(&self, id: InstanceId) -> Result<(), ClientError> {
        match self.send(&Request::Kill { id }).await? {
            Response::Ack => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn set_priority(&self, id: InstanceId, priority: i32) -> Result<(), ClientError> {
        match self.send(&Request::SetPriority { id, priority }).await? {
            Response::Ack => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn get_state(&self, id: InstanceId) -> Result<Option<InstanceState>, ClientError> {
        match self.send(&Request::Query { query: Query::GetState { id } }).await? {
            Response::State { state } => Ok(state),
            other => Self::reject(other),
        }
    }

    pub async fn get_instance(&self, id: InstanceId) -> Result<Option<InstanceDetail>, ClientError> {
        match self.send(&Request::Query { query: Query::GetInstance { id } }).await? {
            Response::Instance { instance } => Ok(instance),
            other => Self::reject(other),
        }
    }

    pub async fn list_instances(&self, filters: jqm_wire::InstanceFilters) -> Result<Vec<InstanceSummary>, ClientError> {
        match self.send(&Request::Query { query: Query::ListInstances { filters } }).await? {
            Response::Instances { instances } => Ok(instances),
            other => Self::reject(other),
        }
    }

    pub async fn get_messages(&self, id: InstanceId) -> Result<Vec<MessageEntry>, ClientError> {
        match self.send(&Request::Query { query: Query::GetMessages { id } }).await? {
            Response::Messages { messages } => Ok(messages),
            other => Self::reject(other),
        }
    }

    pub async fn get_progress(&self, id: InstanceId) -> Result<Option<u8>, ClientError> {
        match self.send(&Request::Query { query: Query::GetProgress { id } }).await? {
            Response::Progress { progress } => Ok(progress),
            other => Self::reject(other),
        }
    }

    pub async fn get_deliverables(&self, id: InstanceId) -> Result<Vec<DeliverableEntry>, ClientError> {
        match self.send(&Request::Query { query: Query::GetDeliverables { id } }).await? {
            Response::Deliverables { deliverables } => Ok(deliverables),
            other => Self::reject(other),
        }
    }

    pub async fn download_deliverable(&self, id: InstanceId, deliverable_id: u64) -> Result<Vec<u8>, ClientError> {
        let query = Query::DownloadDeliverable { id, deliverable_id };
        match self.send(&Request::Query { query }).await? {
            Response::DeliverableBytes { bytes } => Ok(bytes),
            other => Self::reject(other),
        }
    }

    pub async fn get_history(&self, id: InstanceId) -> Result<Option<HistoryEntry>, ClientError> {
        match self.send(&Request::Query { query: Query::GetHistory { id } }).await? {
            Response::History { record } => Ok(record),
            other => Self::reject(other),
        }
    }

    pub async fn list_deployments(&self, node: jqm_core::NodeId) -> Result<Vec<DeploymentBinding>, ClientError> {
        match self.send(&Request::Query { query: Query::ListDeployments { node } }).await? {
            Response::Deployments { deployments } => Ok(deployments),
            other => Self::reject(other),
        }
    }
}
