// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-job progress notifications.
//
// Listeners subscribe by job id and receive `ProgressEvent`s on an unbounded
// channel. A listener that goes away (dropped receiver or explicit
// unsubscribe) is removed on the next publish; publishing never blocks and
// never fails.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use schemwerk_core::{JobId, ProgressEvent, ProgressKind};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

/// Registry of progress listeners keyed by job id.
#[derive(Debug, Clone, Default)]
pub struct ProgressHub {
    listeners: Arc<Mutex<HashMap<JobId, UnboundedSender<ProgressEvent>>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for events of `job_id`. A second subscription replaces the first.
    pub fn subscribe(&self, job_id: &JobId) -> UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = unbounded_channel();
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.insert(job_id.clone(), tx);
        }
        rx
    }

    pub fn unsubscribe(&self, job_id: &JobId) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.remove(job_id);
        }
    }

    /// Deliver `event` to its job's listener, if any.
    pub fn publish(&self, event: ProgressEvent) {
        let Ok(mut listeners) = self.listeners.lock() else {
            warn!("progress registry poisoned; dropping event");
            return;
        };
        let job_id = event.job_id.clone();
        let terminal = event.kind.is_terminal();

        if let Some(tx) = listeners.get(&job_id) {
            if tx.send(event).is_err() {
                debug!(job_id = %job_id, "Progress listener gone; removing");
                listeners.remove(&job_id);
                return;
            }
            if terminal {
                listeners.remove(&job_id);
            }
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }
}

/// Reporter for one running job.
///
/// Fractions are clamped to `[0, 1]` and never move backwards. Exactly one
/// terminal event is sent: by [`complete`](Self::complete),
/// [`fail`](Self::fail), or on drop if neither was called.
#[derive(Debug)]
pub struct JobProgress {
    hub: ProgressHub,
    job_id: JobId,
    fraction: f32,
    finished: bool,
}

impl JobProgress {
    pub fn new(hub: ProgressHub, job_id: JobId) -> Self {
        Self {
            hub,
            job_id,
            fraction: 0.0,
            finished: false,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Report intermediate progress.
    pub fn advance(&mut self, fraction: f32, status: impl Into<String>) {
        if self.finished {
            return;
        }
        self.emit(fraction, status.into(), ProgressKind::Running);
    }

    pub fn complete(&mut self, status: impl Into<String>) {
        self.finish(1.0, status.into(), ProgressKind::Completed);
    }

    /// Terminal failure; the fraction stays where it was.
    pub fn fail(&mut self, status: impl Into<String>) {
        self.finish(self.fraction, status.into(), ProgressKind::Failed);
    }

    fn finish(&mut self, fraction: f32, status: String, kind: ProgressKind) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.emit(fraction, status, kind);
    }

    fn emit(&mut self, fraction: f32, status: String, kind: ProgressKind) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.fraction = self.fraction.max(fraction);
        self.hub.publish(ProgressEvent {
            job_id: self.job_id.clone(),
            fraction: self.fraction,
            status,
            kind,
        });
    }
}

impl Drop for JobProgress {
    fn drop(&mut self) {
        if !self.finished {
            self.fail("job abandoned");
        }
    }
}
