// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Schemwerk Engine — runs analysis jobs. Decides per job whether the drawing
// is analysed locally, by a remote endpoint, or by both (hybrid), falls back
// to local processing when the remote side fails, and reports progress to
// subscribed listeners.

pub mod connectivity;
pub mod decision;
pub mod device;
pub mod merge;
pub mod pipeline;
pub mod progress;
pub mod remote;
pub mod router;

pub use connectivity::{ConnectivityMonitor, Reachability};
pub use device::DeviceCapability;
pub use pipeline::{LocalOutput, LocalPipeline, StageOutcome};
pub use progress::{JobProgress, ProgressHub};
pub use remote::{HttpRemoteAnalyzer, RemoteAnalyzer};
pub use router::{AnalysisRequest, ProcessingRouter};
