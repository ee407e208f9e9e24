//! Endpoint health tracking for search index failover
//!
//! Every call outcome is fed back into a per-endpoint state machine:
//!
//! ```text
//! Endpoint states: Healthy → Degraded → Unavailable
//!
//! Transitions:
//!   any → healthy:              call succeeded
//!   healthy → degraded:         call failed
//!   degraded → unavailable:     consecutive failures reached failure_threshold
//!   unavailable → healthy:      probe succeeded, or cooldown elapsed since last failure
//! ```
//!
//! The registry is created once per process and shared by every request.

use crate::backend::{Endpoint, SearchIndexClient};
use crate::metrics;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    #[default]
    Healthy,
    Degraded,
    Unavailable,
}

impl EndpointState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointState::Healthy => "healthy",
            EndpointState::Degraded => "degraded",
            EndpointState::Unavailable => "unavailable",
        }
    }
}

/// Something observed about an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    CallSucceeded,
    CallFailed,
    ProbeSucceeded,
    CooldownElapsed,
}

/// The endpoint state machine.
///
/// `consecutive_failures` already counts the failure being observed.
pub fn transition(
    state: EndpointState,
    observation: Observation,
    consecutive_failures: u32,
    failure_threshold: u32,
) -> EndpointState {
    use EndpointState::*;
    use Observation::*;

    match (state, observation) {
        (_, CallSucceeded) => Healthy,
        (Unavailable, ProbeSucceeded | CooldownElapsed) => Healthy,
        (current, ProbeSucceeded | CooldownElapsed) => current,
        (Unavailable, CallFailed) => Unavailable,
        (_, CallFailed) if consecutive_failures >= failure_threshold => Unavailable,
        (_, CallFailed) => Degraded,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    pub failure_threshold: u32,
    /// Time since the last failure after which an unavailable endpoint is retried
    pub cooldown: Duration,
    pub probe_interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
            probe_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EndpointHealth {
    pub state: EndpointState,
    pub consecutive_failures: u32,
    pub last_failure: Option<Instant>,
    /// Wall-clock time of the last failure, for reporting
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Serializable view of one endpoint, as reported by `/health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub name: String,
    pub url: String,
    pub state: EndpointState,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Emitted whenever an endpoint changes state
#[derive(Debug, Clone)]
pub struct HealthEvent {
    pub endpoint: String,
    pub previous_state: EndpointState,
    pub new_state: EndpointState,
    pub observation: Observation,
    pub timestamp: Instant,
}

/// Shared health state of the ordered endpoint list
pub struct HealthRegistry {
    config: HealthConfig,
    endpoints: Vec<Endpoint>,
    health: RwLock<Vec<EndpointHealth>>,
    event_tx: broadcast::Sender<HealthEvent>,
}

impl HealthRegistry {
    pub fn new(endpoints: Vec<Endpoint>, config: HealthConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        for endpoint in &endpoints {
            metrics::update_endpoint_state(&endpoint.name, EndpointState::Healthy);
        }
        Self {
            config,
            health: RwLock::new(vec![EndpointHealth::default(); endpoints.len()]),
            endpoints,
            event_tx,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Endpoints in priority order
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.event_tx.subscribe()
    }

    pub fn state(&self, index: usize) -> Option<EndpointState> {
        self.health.read().get(index).map(|h| h.state)
    }

    pub fn health(&self, index: usize) -> Option<EndpointHealth> {
        self.health.read().get(index).cloned()
    }

    pub fn snapshot(&self) -> Vec<EndpointStatus> {
        let health = self.health.read();
        self.endpoints
            .iter()
            .zip(health.iter())
            .map(|(endpoint, info)| EndpointStatus {
                name: endpoint.name.clone(),
                url: endpoint.url.clone(),
                state: info.state,
                consecutive_failures: info.consecutive_failures,
                last_failure: info.last_failure_at,
                last_error: info.last_error.clone(),
            })
            .collect()
    }

    /// Indices of the endpoints to try for one request.
    ///
    /// Priority order, skipping unavailable endpoints. When every endpoint is
    /// unavailable, the one whose last failure is oldest is returned alone.
    pub fn attempt_order(&self) -> Vec<usize> {
        self.expire_cooldowns();

        let health = self.health.read();
        let usable: Vec<usize> = health
            .iter()
            .enumerate()
            .filter(|(_, info)| info.state != EndpointState::Unavailable)
            .map(|(index, _)| index)
            .collect();
        if !usable.is_empty() {
            return usable;
        }

        health
            .iter()
            .enumerate()
            .min_by_key(|(_, info)| info.last_failure)
            .map(|(index, _)| vec![index])
            .unwrap_or_default()
    }

    pub fn record_success(&self, index: usize) {
        self.observe(index, Observation::CallSucceeded, None);
    }

    pub fn record_failure(&self, index: usize, error: &str) {
        self.observe(index, Observation::CallFailed, Some(error));
    }

    pub fn record_probe_success(&self, index: usize) {
        self.observe(index, Observation::ProbeSucceeded, None);
    }

    /// Unavailable endpoints, with their indices
    pub fn unavailable(&self) -> Vec<(usize, Endpoint)> {
        let health = self.health.read();
        health
            .iter()
            .enumerate()
            .filter(|(_, info)| info.state == EndpointState::Unavailable)
            .filter_map(|(index, _)| self.endpoints.get(index).map(|e| (index, e.clone())))
            .collect()
    }

    /// Start the background probe task
    pub fn start_probing(
        self: Arc<Self>,
        client: Arc<dyn SearchIndexClient>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.probe_loop(client).await;
        })
    }

    async fn probe_loop(&self, client: Arc<dyn SearchIndexClient>) {
        let mut ticker = tokio::time::interval(self.config.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Endpoint prober started with {}ms interval, failure threshold: {}, cooldown: {}ms",
            self.config.probe_interval.as_millis(),
            self.config.failure_threshold,
            self.config.cooldown.as_millis()
        );

        loop {
            ticker.tick().await;
            self.probe_unavailable(client.as_ref()).await;
        }
    }

    /// Probe every unavailable endpoint once
    pub async fn probe_unavailable(&self, client: &dyn SearchIndexClient) {
        for (index, endpoint) in self.unavailable() {
            if client.probe(&endpoint).await {
                self.record_probe_success(index);
            } else {
                debug!("Probe failed for endpoint {}", endpoint);
            }
        }
    }

    fn expire_cooldowns(&self) {
        let mut changes = Vec::new();
        {
            let mut health = self.health.write();
            for (index, info) in health.iter_mut().enumerate() {
                let expired = info.state == EndpointState::Unavailable
                    && info
                        .last_failure
                        .map_or(true, |at| at.elapsed() >= self.config.cooldown);
                if expired {
                    if let Some(change) = self.apply(info, Observation::CooldownElapsed, None) {
                        changes.push((index, change));
                    }
                }
            }
        }

        for (index, (previous, new)) in changes {
            self.emit_state_change(index, previous, new, Observation::CooldownElapsed);
        }
    }

    fn observe(&self, index: usize, observation: Observation, error: Option<&str>) {
        let change = {
            let mut health = self.health.write();
            match health.get_mut(index) {
                Some(info) => self.apply(info, observation, error),
                None => return,
            }
        };

        if let Some((previous, new)) = change {
            self.emit_state_change(index, previous, new, observation);
        }
    }

    /// Read-modify-write of one endpoint; caller holds the write lock
    fn apply(
        &self,
        info: &mut EndpointHealth,
        observation: Observation,
        error: Option<&str>,
    ) -> Option<(EndpointState, EndpointState)> {
        let previous = info.state;

        if observation == Observation::CallFailed {
            info.consecutive_failures = info.consecutive_failures.saturating_add(1);
            info.last_failure = Some(Instant::now());
            info.last_failure_at = Some(Utc::now());
            info.last_error = error.map(str::to_string);
        }

        info.state = transition(
            previous,
            observation,
            info.consecutive_failures,
            self.config.failure_threshold,
        );
        if info.state == EndpointState::Healthy {
            info.consecutive_failures = 0;
        }

        (previous != info.state).then_some((previous, info.state))
    }

    fn emit_state_change(
        &self,
        index: usize,
        previous: EndpointState,
        new: EndpointState,
        observation: Observation,
    ) {
        let Some(endpoint) = self.endpoints.get(index) else {
            return;
        };

        match new {
            EndpointState::Healthy => info!(
                "Endpoint {} recovered ({} → healthy, {:?})",
                endpoint,
                previous.as_str(),
                observation
            ),
            _ => warn!(
                "Endpoint {} is now {} (was {})",
                endpoint,
                new.as_str(),
                previous.as_str()
            ),
        }

        metrics::update_endpoint_state(&endpoint.name, new);

        let _ = self.event_tx.send(HealthEvent {
            endpoint: endpoint.name.clone(),
            previous_state: previous,
            new_state: new,
            observation,
            timestamp: Instant::now(),
        });
    }
}
