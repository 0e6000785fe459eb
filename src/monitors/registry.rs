//! Endpoint registry and reachability state machine
//!
//! ```text
//! reachable:
//!   status == Down                 → Up, emit BecameUp
//!   otherwise                      → Up, no transition
//!   (failure counter always reset to 0)
//!
//! unreachable:
//!   counter += 1
//!   counter >= threshold, not Down → Down, emit BecameDown
//!   otherwise                      → no transition
//! ```
//!
//! A transition leaves a pending alert on the endpoint. It stays there until a
//! dispatch succeeds, so an alert held back by quiet hours, the cooldown or a
//! transport failure is retried on a later cycle. A recovery that happens
//! before the outage alert went out cancels the pending alert instead.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::inventory::InventoryEntry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum EndpointStatus {
    #[default]
    Unknown,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transition {
    BecameDown,
    BecameUp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub address: String,
    pub display_name: String,
    pub consecutive_failures: u32,
    pub status: EndpointStatus,
    pub last_failure: Option<DateTime<Local>>,
    pub last_alert: Option<DateTime<Local>>,
    /// Transition whose alert has not been delivered yet
    pub pending_alert: Option<Transition>,
}

impl Endpoint {
    fn new(address: &str, display_name: &str) -> Self {
        Self {
            address: address.to_string(),
            display_name: display_name.to_string(),
            consecutive_failures: 0,
            status: EndpointStatus::Unknown,
            last_failure: None,
            last_alert: None,
            pending_alert: None,
        }
    }

    /// `name (address)`, the way endpoints appear in log lines and alerts
    pub fn label(&self) -> String {
        format!("{} ({})", self.display_name, self.address)
    }
}

/// Owned store of per-endpoint state, keyed by address
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    failure_threshold: u32,
    endpoints: HashMap<String, Endpoint>,
}

impl EndpointRegistry {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            endpoints: HashMap::new(),
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Add endpoints seen for the first time and refresh display names
    ///
    /// Endpoints missing from the snapshot are kept so their cooldown is not
    /// forgotten. Returns how many endpoints were added.
    pub fn reconcile(&mut self, snapshot: &[InventoryEntry]) -> usize {
        let mut added = 0;
        for entry in snapshot {
            match self.endpoints.get_mut(&entry.address) {
                Some(endpoint) => {
                    if endpoint.display_name != entry.name {
                        endpoint.display_name = entry.name.clone();
                    }
                }
                None => {
                    self.endpoints.insert(
                        entry.address.clone(),
                        Endpoint::new(&entry.address, &entry.name),
                    );
                    added += 1;
                }
            }
        }
        added
    }

    /// Feed one probe result into the state machine
    pub fn observe(
        &mut self,
        address: &str,
        display_name: &str,
        reachable: bool,
        now: DateTime<Local>,
    ) -> Option<Transition> {
        let threshold = self.failure_threshold;
        let endpoint = self
            .endpoints
            .entry(address.to_string())
            .or_insert_with(|| Endpoint::new(address, display_name));

        let transition = if reachable {
            endpoint.consecutive_failures = 0;
            let previous = std::mem::replace(&mut endpoint.status, EndpointStatus::Up);
            (previous == EndpointStatus::Down).then_some(Transition::BecameUp)
        } else {
            endpoint.consecutive_failures = endpoint.consecutive_failures.saturating_add(1);
            endpoint.last_failure = Some(now);
            if endpoint.consecutive_failures >= threshold
                && endpoint.status != EndpointStatus::Down
            {
                endpoint.status = EndpointStatus::Down;
                Some(Transition::BecameDown)
            } else {
                None
            }
        };

        if let Some(transition) = transition {
            endpoint.pending_alert = match (endpoint.pending_alert, transition) {
                (Some(Transition::BecameDown), Transition::BecameUp) => None,
                _ => Some(transition),
            };
        }

        transition
    }

    /// Remember a delivered alert: sets the last alert time, clears the pending alert
    pub fn record_alert(&mut self, address: &str, now: DateTime<Local>) -> bool {
        match self.endpoints.get_mut(address) {
            Some(endpoint) => {
                endpoint.last_alert = Some(now);
                endpoint.pending_alert = None;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, address: &str) -> Option<&Endpoint> {
        self.endpoints.get(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
