// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent host pool
//!
//! A fixed range of ports (`base_port..base_port + size`) that dynamically
//! created agents are bound to. Capacity is a semaphore; the free ports are
//! a plain list next to it. A slot owns one permit until it is dropped;
//! dropping it puts the port back first, then frees the permit.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::domain::config::{AcquireMode, HostPoolConfig};
use crate::domain::runtime::{HealthProbe, HostPoolError, PortReturn, Slot, SlotLease};

/// Bounded health polling of a freshly started agent
#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    pub attempts: u32,
    pub interval: Duration,
    pub probe_timeout: Duration,
}

/// Ports not currently leased, shared with every outstanding slot
struct FreePorts {
    ports: Mutex<VecDeque<u16>>,
    permits: Arc<Semaphore>,
}

impl PortReturn for FreePorts {
    fn return_port(&self, port: u16, permit: OwnedSemaphorePermit) {
        // Port goes back before the permit so a waiter always finds one
        self.ports.lock().push_back(port);
        drop(permit);
        let available = self.permits.available_permits();
        debug!(port, available, "Returned agent host slot");
        metrics::gauge!("synapse_host_pool_available").set(available as f64);
    }
}

pub struct AgentHostPool {
    host: String,
    capacity: usize,
    free: Arc<FreePorts>,
    mode: AcquireMode,
    probe: Arc<dyn HealthProbe>,
}

impl AgentHostPool {
    pub fn new(config: &HostPoolConfig, probe: Arc<dyn HealthProbe>) -> Self {
        let ports: VecDeque<u16> = (0..config.size)
            .filter_map(|offset| config.base_port.checked_add(offset))
            .collect();
        let capacity = ports.len();
        Self {
            host: config.host.clone(),
            capacity,
            free: Arc::new(FreePorts {
                ports: Mutex::new(ports),
                permits: Arc::new(Semaphore::new(capacity)),
            }),
            mode: config.acquire,
            probe,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.free.permits.available_permits()
    }

    /// Reserve a port. Fails fast or waits, depending on the pool's acquire mode.
    pub async fn acquire(&self) -> Result<Slot, HostPoolError> {
        let permit = match self.mode {
            AcquireMode::FailFast => self
                .free
                .permits
                .clone()
                .try_acquire_owned()
                .map_err(|_| HostPoolError::NoCapacity)?,
            AcquireMode::Block { timeout } => {
                match tokio::time::timeout(timeout, self.free.permits.clone().acquire_owned()).await {
                    Ok(Ok(permit)) => permit,
                    _ => return Err(HostPoolError::NoCapacity),
                }
            }
        };

        // One free port exists per available permit
        let port = self
            .free
            .ports
            .lock()
            .pop_front()
            .ok_or(HostPoolError::NoCapacity)?;

        debug!(port, available = self.available(), "Acquired agent host slot");
        metrics::gauge!("synapse_host_pool_available").set(self.available() as f64);
        Ok(Slot {
            host: self.host.clone(),
            port,
            lease: Some(SlotLease {
                pool: self.free.clone(),
                permit,
            }),
        })
    }

    pub async fn health_check(&self, endpoint: &str, timeout: Duration) -> bool {
        self.probe.probe(endpoint, timeout).await
    }

    /// Poll until healthy or `policy.attempts` probes have failed
    pub async fn await_healthy(&self, endpoint: &str, policy: HealthPolicy) -> bool {
        for attempt in 1..=policy.attempts {
            if self.health_check(endpoint, policy.probe_timeout).await {
                debug!(endpoint, attempt, "Agent reported healthy");
                return true;
            }
            if attempt < policy.attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }
        false
    }
}
