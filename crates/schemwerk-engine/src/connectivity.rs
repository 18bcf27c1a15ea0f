// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reachability of the remote endpoint.
//
// A probe is a bounded health check against the configured remote. The
// monitor remembers the last observed state so transitions (lost / restored)
// are logged once instead of on every job.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::remote::RemoteAnalyzer;

/// What the router knows about the remote endpoint for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// The health check succeeded within the probe timeout.
    Reachable,
    /// The health check failed or timed out.
    Unreachable,
    /// No probe was made (no remote configured, or the decision did not need it).
    NotProbed,
}

/// Tracks remote reachability across jobs.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    last: Arc<Mutex<Reachability>>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Reachability::NotProbed)),
        }
    }

    /// Probe `remote`, treating a timeout as unreachable.
    pub async fn probe(&self, remote: &dyn RemoteAnalyzer, timeout: Duration) -> Reachability {
        let state = match tokio::time::timeout(timeout, remote.health()).await {
            Ok(Ok(())) => Reachability::Reachable,
            Ok(Err(err)) => {
                debug!(endpoint = remote.endpoint(), error = %err, "Remote health check failed");
                Reachability::Unreachable
            }
            Err(_) => {
                debug!(
                    endpoint = remote.endpoint(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Remote health check timed out"
                );
                Reachability::Unreachable
            }
        };
        self.record(remote.endpoint(), state);
        state
    }

    /// Last probed state, `NotProbed` before the first probe.
    pub fn last(&self) -> Reachability {
        self.last
            .lock()
            .map(|s| *s)
            .unwrap_or(Reachability::NotProbed)
    }

    fn record(&self, endpoint: &str, new_state: Reachability) {
        if let Ok(mut state) = self.last.lock() {
            let old = *state;
            *state = new_state;
            match (old, new_state) {
                (Reachability::Unreachable, Reachability::Reachable) => {
                    info!(endpoint, "remote endpoint reachable again");
                }
                (Reachability::Reachable | Reachability::NotProbed, Reachability::Unreachable) => {
                    warn!(endpoint, "remote endpoint unreachable");
                }
                _ => {}
            }
        }
    }
}
