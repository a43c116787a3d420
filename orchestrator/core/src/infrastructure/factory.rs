// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent factories
//!
//! `InProcessAgentFactory` runs each generated agent as an axum server task
//! inside the node. `SubprocessAgentFactory` writes the blueprint to disk and
//! starts an external host process (normally `synapse agent host`).

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::agent_generator::AgentGenerator;
use super::hosted_agent::HostedAgent;
use crate::domain::archetype::AgentBlueprint;
use crate::domain::runtime::{AgentFactory, InstanceId, RunningInstance, RuntimeError, Slot};

/// How long a stopped in-process agent gets to drain connections
const STOP_GRACE: Duration = Duration::from_secs(5);

struct HostedTask {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct InProcessAgentFactory {
    generator: Arc<AgentGenerator>,
    bind_address: String,
    tasks: DashMap<InstanceId, HostedTask>,
}

impl InProcessAgentFactory {
    pub fn new(generator: Arc<AgentGenerator>) -> Self {
        Self {
            generator,
            bind_address: "0.0.0.0".to_string(),
            tasks: DashMap::new(),
        }
    }

    /// Interface hosted agents listen on; the slot host is only used for addressing
    pub fn with_bind_address(mut self, bind_address: impl Into<String>) -> Self {
        self.bind_address = bind_address.into();
        self
    }

    pub fn running(&self) -> usize {
        self.tasks.len()
    }
}

#[async_trait]
impl AgentFactory for InProcessAgentFactory {
    async fn instantiate(
        &self,
        blueprint: &AgentBlueprint,
        slot: &Slot,
    ) -> Result<RunningInstance, RuntimeError> {
        let addr = format!("{}:{}", self.bind_address, slot.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| RuntimeError::SpawnFailed(format!("bind {}: {}", addr, e)))?;

        let agent = HostedAgent::new(blueprint.clone(), self.generator.clone());
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let name = blueprint.name.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = agent.serve(listener, token).await {
                warn!(agent = %name, error = %e, "Hosted agent exited with error");
            }
        });

        let id = InstanceId::new(format!("inproc-{}", Uuid::new_v4()));
        self.tasks.insert(id.clone(), HostedTask { shutdown, handle });
        info!(agent = %blueprint.name, instance = id.as_str(), port = slot.port, "Started in-process agent");

        Ok(RunningInstance {
            id,
            agent_name: blueprint.name.clone(),
            endpoint: slot.endpoint(),
            port: slot.port,
            started_at: Utc::now(),
        })
    }

    async fn terminate(&self, instance: &RunningInstance) -> Result<(), RuntimeError> {
        let (_, task) = self
            .tasks
            .remove(&instance.id)
            .ok_or_else(|| RuntimeError::InstanceNotFound(instance.id.as_str().to_string()))?;

        task.shutdown.cancel();
        match tokio::time::timeout(STOP_GRACE, task.handle).await {
            Ok(Ok(())) => {
                info!(instance = instance.id.as_str(), "Stopped in-process agent");
                Ok(())
            }
            Ok(Err(e)) => Err(RuntimeError::TerminationFailed(e.to_string())),
            Err(_) => Err(RuntimeError::Timeout(STOP_GRACE)),
        }
    }
}

pub struct SubprocessAgentFactory {
    command: PathBuf,
    args: Vec<String>,
    manifest_dir: PathBuf,
    children: DashMap<InstanceId, (Child, PathBuf)>,
}

impl SubprocessAgentFactory {
    pub fn new(command: impl Into<PathBuf>, args: Vec<String>, manifest_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args,
            manifest_dir: manifest_dir.into(),
            children: DashMap::new(),
        }
    }

    /// Uses the running executable as the agent host command
    pub fn current_exe(args: Vec<String>, manifest_dir: impl Into<PathBuf>) -> Result<Self, RuntimeError> {
        let exe = std::env::current_exe()
            .map_err(|e| RuntimeError::SpawnFailed(format!("cannot locate current executable: {}", e)))?;
        Ok(Self::new(exe, args, manifest_dir))
    }

    async fn write_manifest(&self, blueprint: &AgentBlueprint, port: u16) -> Result<PathBuf, RuntimeError> {
        tokio::fs::create_dir_all(&self.manifest_dir)
            .await
            .map_err(|e| RuntimeError::SpawnFailed(format!("create {:?}: {}", self.manifest_dir, e)))?;

        let path = self
            .manifest_dir
            .join(format!("{}-{}.yaml", blueprint.name.to_lowercase(), port));
        let yaml = serde_yaml::to_string(blueprint)
            .map_err(|e| RuntimeError::SpawnFailed(format!("serialize blueprint: {}", e)))?;
        tokio::fs::write(&path, yaml)
            .await
            .map_err(|e| RuntimeError::SpawnFailed(format!("write {:?}: {}", path, e)))?;
        Ok(path)
    }
}

#[async_trait]
impl AgentFactory for SubprocessAgentFactory {
    async fn instantiate(
        &self,
        blueprint: &AgentBlueprint,
        slot: &Slot,
    ) -> Result<RunningInstance, RuntimeError> {
        let manifest = self.write_manifest(blueprint, slot.port).await?;

        let child = Command::new(&self.command)
            .args(&self.args)
            .arg("--manifest")
            .arg(&manifest)
            .arg("--port")
            .arg(slot.port.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::SpawnFailed(format!("{:?}: {}", self.command, e)))?;

        let id = InstanceId::new(format!(
            "proc-{}",
            child.id().map(|pid| pid.to_string()).unwrap_or_else(|| Uuid::new_v4().to_string())
        ));
        info!(agent = %blueprint.name, instance = id.as_str(), port = slot.port, "Started agent process");
        self.children.insert(id.clone(), (child, manifest));

        Ok(RunningInstance {
            id,
            agent_name: blueprint.name.clone(),
            endpoint: slot.endpoint(),
            port: slot.port,
            started_at: Utc::now(),
        })
    }

    async fn terminate(&self, instance: &RunningInstance) -> Result<(), RuntimeError> {
        let (_, (mut child, manifest)) = self
            .children
            .remove(&instance.id)
            .ok_or_else(|| RuntimeError::InstanceNotFound(instance.id.as_str().to_string()))?;

        child
            .kill()
            .await
            .map_err(|e| RuntimeError::TerminationFailed(e.to_string()))?;
        if let Err(e) = tokio::fs::remove_file(&manifest).await {
            warn!(path = ?manifest, error = %e, "Failed to remove agent manifest");
        }
        info!(instance = instance.id.as_str(), "Stopped agent process");
        Ok(())
    }
}
