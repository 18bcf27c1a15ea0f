// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local device capability, used by the router to tell whether the machine can
// comfortably run the whole pipeline on its own.

use schemwerk_core::PipelineConfig;
use sysinfo::System;
use tracing::debug;

/// CPU and memory available to the local pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapability {
    pub cores: usize,
    pub memory_mb: u64,
}

impl DeviceCapability {
    pub fn new(cores: usize, memory_mb: u64) -> Self {
        Self { cores, memory_mb }
    }

    /// Probe the current machine.
    ///
    /// Falls back to a single core when parallelism cannot be queried.
    pub fn detect() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let mut system = System::new();
        system.refresh_memory();
        let memory_mb = system.total_memory() / (1024 * 1024);

        debug!(cores, memory_mb, "Device capability detected");
        Self { cores, memory_mb }
    }

    /// Below either configured minimum.
    pub fn is_limited(&self, config: &PipelineConfig) -> bool {
        self.cores < config.min_local_cores || self.memory_mb < config.min_local_memory_mb
    }
}
