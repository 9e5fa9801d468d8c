// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Subcommand implementations. Each function owns exactly one round trip
//! (or, for `--sync`, a short poll loop) against a `DaemonClient` and
//! prints either human-readable text or JSON.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use jqm_core::{
    DeploymentBinding, InstanceId, JobDefId, JobDefinition, Node, NodeId, Queue, QueueId, UserTags,
};
use jqm_wire::{InstanceFilters, InstanceState};

use crate::client::DaemonClient;

#[derive(Subcommand)]
pub enum Command {
    /// Check that jqmd is reachable.
    Ping,
    /// Print node name and uptime.
    Status,
    /// Ask jqmd to shut down.
    Shutdown,

    /// Register a job definition, queue, node, or deployment binding.
    #[command(subcommand)]
    Register(RegisterCommand),

    /// Submit a new instance of a registered job definition.
    Enqueue(EnqueueArgs),

    /// Instance lifecycle and inspection commands.
    #[command(subcommand)]
    Instance(InstanceCommand),

    /// List deployment bindings for a node.
    Deployments {
        #[arg(long)]
        node: String,
    },
}

#[derive(Subcommand)]
pub enum RegisterCommand {
    JobDefinition {
        #[arg(long)]
        application_name: String,
        #[arg(long)]
        entry_point_class: String,
        #[arg(long)]
        artifact_path: String,
        #[arg(long)]
        default_queue: String,
        #[arg(long)]
        can_restart: bool,
        #[arg(long)]
        highlander_mode: bool,
    },
    Queue {
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 0)]
        default_priority: i32,
        #[arg(long, default_value_t = 0)]
        max_size: u32,
    },
    Node {
        #[arg(long)]
        name: String,
        #[arg(long)]
        repo_path: std::path::PathBuf,
        #[arg(long)]
        tmp_path: std::path::PathBuf,
    },
    Deployment {
        #[arg(long)]
        node: String,
        #[arg(long)]
        queue: String,
        #[arg(long, default_value_t = 1)]
        max_concurrent: u32,
        #[arg(long, default_value_t = 500)]
        poll_interval_ms: u64,
    },
}

#[derive(Args)]
pub struct EnqueueArgs {
    /// Job definition id (`jobd-...`).
    pub job_definition: String,
    #[arg(long)]
    pub queue: Option<String>,
    #[arg(long)]
    pub priority: Option<i32>,
    /// `key=value`, repeatable.
    #[arg(long = "param", value_parser = parse_param)]
    pub parameters: Vec<(String, String)>,
    /// Block and poll until the instance reaches a terminal state.
    #[arg(long)]
    pub sync: bool,
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    s.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())).ok_or_else(|| {
        format!("expected key=value, got {s:?}")
    })
}

#[derive(Subcommand)]
pub enum InstanceCommand {
    Get { id: String },
    List {
        #[arg(long)]
        queue: Option<String>,
        #[arg(long)]
        state: Option<String>,
    },
    Messages { id: String },
    Progress { id: String },
    Deliverables { id: String },
    Download { id: String, deliverable_id: u64, #[arg(long)] out: std::path::PathBuf },
    History { id: String },
    Hold { id: String },
    Resume { id: String },
    Cancel { id: String },
    Kill { id: String },
    SetPriority { id: String, priority: i32 },
}

pub async fn run(command: Command, client: DaemonClient) -> Result<()> {
    match command {
        Command::Ping => {
            client.ping().await?;
            println!("pong");
            Ok(())
        }
        Command::Status => {
            let (node, uptime) = client.status().await?;
            println!("node={node} uptime_secs={uptime}");
            Ok(())
        }
        Command::Shutdown => {
            client.shutdown().await?;
            println!("shutdown requested");
            Ok(())
        }
        Command::Register(cmd) => register(cmd, client).await,
        Command::Enqueue(args) => enqueue(args, client).await,
        Command::Instance(cmd) => instance(cmd, client).await,
        Command::Deployments { node } => {
            let bindings = client.list_deployments(NodeId::from_string(node)).await?;
            print_json(&bindings)
        }
    }
}

async fn register(cmd: RegisterCommand, client: DaemonClient) -> Result<()> {
    match cmd {
        RegisterCommand::JobDefinition {
            application_name,
            entry_point_class,
            artifact_path,
            default_queue,
            can_restart,
            highlander_mode,
        } => {
            let mut def = JobDefinition::new(application_name, QueueId::from_string(default_queue));
            def.entry_point_class = entry_point_class;
            def.artifact_path = artifact_path;
            def.can_restart = can_restart;
            def.highlander_mode = highlander_mode;
            let id = def.id;
            client.register_job_definition(def).await?;
            println!("{id}");
            Ok(())
        }
        RegisterCommand::Queue { name, default_priority, max_size } => {
            let mut queue = Queue::new(name);
            queue.default_priority = default_priority;
            queue.max_size = max_size;
            let id = queue.id;
            client.register_queue(queue).await?;
            println!("{id}");
            Ok(())
        }
        RegisterCommand::Node { name, repo_path, tmp_path } => {
            let node = Node::new(name, repo_path, tmp_path);
            let id = node.id;
            client.register_node(node).await?;
            println!("{id}");
            Ok(())
        }
        RegisterCommand::Deployment { node, queue, max_concurrent, poll_interval_ms } => {
            let binding = DeploymentBinding::new(
                NodeId::from_string(node),
                QueueId::from_string(queue),
                max_concurrent,
                poll_interval_ms,
            );
            let id = binding.id;
            client.upsert_deployment(binding).await?;
            println!("{id}");
            Ok(())
        }
    }
}

async fn enqueue(args: EnqueueArgs, client: DaemonClient) -> Result<()> {
    let parameters: HashMap<String, String> = args.parameters.into_iter().collect();
    let id = client
        .enqueue(
            JobDefId::from_string(args.job_definition),
            args.queue.map(QueueId::from_string),
            args.priority,
            parameters,
            UserTags::default(),
        )
        .await?;

    if !args.sync {
        println!("{id}");
        return Ok(());
    }

    loop {
        let state = client.get_state(id).await?.ok_or_else(|| anyhow!("instance {id} disappeared"))?;
        if state.is_terminal() {
            println!("{id} {state}");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

async fn instance(cmd: InstanceCommand, client: DaemonClient) -> Result<()> {
    match cmd {
        InstanceCommand::Get { id } => print_json(&client.get_instance(parse_id(&id)).await?),
        InstanceCommand::List { queue, state } => {
            let filters = InstanceFilters {
                queue: queue.map(QueueId::from_string),
                job_definition: None,
                node: None,
                state: state.map(|s| parse_state(&s)).transpose()?,
            };
            print_json(&client.list_instances(filters).await?)
        }
        InstanceCommand::Messages { id } => print_json(&client.get_messages(parse_id(&id)).await?),
        InstanceCommand::Progress { id } => print_json(&client.get_progress(parse_id(&id)).await?),
        InstanceCommand::Deliverables { id } => print_json(&client.get_deliverables(parse_id(&id)).await?),
        InstanceCommand::Download { id, deliverable_id, out } => {
            let bytes = client.download_deliverable(parse_id(&id), deliverable_id).await?;
            std::fs::write(&out, bytes)?;
            println!("wrote {}", out.display());
            Ok(())
        }
        InstanceCommand::History { id } => print_json(&client.get_history(parse_id(&id)).await?),
        InstanceCommand::Hold { id } => {
            client.hold(parse_id(&id)).await?;
            Ok(())
        }
        InstanceCommand::Resume { id } => {
            client.resume(parse_id(&id)).await?;
            Ok(())
        }
        InstanceCommand::Cancel { id } => {
            client.cancel(parse_id(&id)).await?;
            Ok(())
        }
        InstanceCommand::Kill { id } => {
            client.kill(parse_id(&id)).await?;
            Ok(())
        }
        InstanceCommand::SetPriority { id, priority } => {
            client.set_priority(parse_id(&id), priority).await?;
            Ok(())
        }
    }
}

fn parse_id(s: &str) -> InstanceId {
    InstanceId::from_string(s)
}

fn parse_state(s: &str) -> Result<InstanceState> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| anyhow!("unrecognized instance state: {s:?}"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
