// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Processing mode router.
//
// Every job goes through one transition out of `Deciding`:
//
//   Deciding ─► Local
//            ─► Remote ──(error / timeout)──► FallbackLocal
//            ─► Hybrid ──(remote error)─────► FallbackLocal
//
// Remote work gets exactly one attempt per job, bounded by `remote_timeout`.

use std::sync::Arc;

use chrono::Utc;
use schemwerk_core::error::{PipelineError, Result};
use schemwerk_core::{
    AnalysisPayload, AnalysisResult, DecisionReason, JobId, PipelineConfig, ProcessingDecision,
    ProcessingLocation, RouterState, Stage, StageReport, StageStatus,
};
use schemwerk_vision::{PixelBuffer, TextRecognizer};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::connectivity::{ConnectivityMonitor, Reachability};
use crate::decision::{DecisionContext, decide};
use crate::device::DeviceCapability;
use crate::merge::merge_payloads;
use crate::pipeline::{LocalOutput, LocalPipeline};
use crate::progress::{JobProgress, ProgressHub};
use crate::remote::RemoteAnalyzer;

/// One analysis job as submitted by a caller.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub job_id: JobId,
    /// Encoded image bytes (PNG, JPEG, TIFF, ...).
    pub image: Vec<u8>,
    /// Force a processing location.
    pub location_override: Option<ProcessingLocation>,
    /// Never send the image off this machine (unless overridden).
    pub prefer_privacy: bool,
}

impl AnalysisRequest {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            job_id: JobId::generate(),
            image,
            location_override: None,
            prefer_privacy: false,
        }
    }

    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = job_id;
        self
    }

    pub fn with_location(mut self, location: ProcessingLocation) -> Self {
        self.location_override = Some(location);
        self
    }

    pub fn with_privacy(mut self, prefer_privacy: bool) -> Self {
        self.prefer_privacy = prefer_privacy;
        self
    }
}

/// Payload and stage reports of whichever side produced the result.
struct Execution {
    executed: RouterState,
    payload: AnalysisPayload,
    stages: Vec<StageReport>,
    remote_error: Option<String>,
}

/// Decides where each job runs and runs it there.
pub struct ProcessingRouter {
    config: Arc<PipelineConfig>,
    local: LocalPipeline,
    remote: Option<Arc<dyn RemoteAnalyzer>>,
    device: DeviceCapability,
    connectivity: ConnectivityMonitor,
    progress: ProgressHub,
}

impl ProcessingRouter {
    /// Router without a remote endpoint; device capability is probed.
    pub fn new(config: PipelineConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let config = Arc::new(config);
        Self {
            local: LocalPipeline::new(Arc::clone(&config), recognizer),
            config,
            remote: None,
            device: DeviceCapability::detect(),
            connectivity: ConnectivityMonitor::new(),
            progress: ProgressHub::new(),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteAnalyzer>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_device(mut self, device: DeviceCapability) -> Self {
        self.device = device;
        self
    }

    pub fn with_progress(mut self, hub: ProgressHub) -> Self {
        self.progress = hub;
        self
    }

    pub fn progress(&self) -> &ProgressHub {
        &self.progress
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one job to completion.
    ///
    /// Fails only for undecodable input, or when the remote side failed and
    /// the local fallback failed too. Every other problem is recorded in the
    /// result's stage reports and decision.
    #[instrument(skip_all, fields(job_id = %request.job_id, bytes = request.image.len()))]
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        let mut progress = JobProgress::new(self.progress.clone(), request.job_id.clone());

        let buffer = match PixelBuffer::decode(&request.image) {
            Ok(buffer) => Arc::new(buffer),
            Err(err) => {
                warn!(error = %err, "Rejecting undecodable input");
                progress.fail(err.to_string());
                return Err(err);
            }
        };
        let input_sha256 = hex::encode(Sha256::digest(&request.image));
        progress.advance(0.05, "decoded");

        let (location, reason) = self.route(&request).await;
        let decided_at = Utc::now();
        info!(?location, ?reason, "Processing location decided");
        progress.advance(0.1, format!("routing: {location:?}"));

        let execution = match self.execute(location, &request, &buffer, &mut progress).await {
            Ok(execution) => execution,
            Err(err) => {
                progress.fail(err.to_string());
                return Err(err);
            }
        };

        let result = AnalysisResult {
            job_id: request.job_id.clone(),
            input_sha256,
            image_width: buffer.width(),
            image_height: buffer.height(),
            text_lines: execution.payload.text_lines,
            regions: execution.payload.regions,
            lines: execution.payload.lines,
            components: execution.payload.components,
            decision: ProcessingDecision {
                location,
                reason,
                executed: execution.executed,
                remote_error: execution.remote_error,
                decided_at,
            },
            stages: execution.stages,
        };

        info!(
            executed = ?result.decision.executed,
            components = result.components.len(),
            "Job complete"
        );
        progress.complete("complete");
        Ok(result)
    }

    /// Evaluate the decision table, probing the remote only when needed.
    async fn route(&self, request: &AnalysisRequest) -> (ProcessingLocation, DecisionReason) {
        let mut ctx = DecisionContext {
            location_override: request.location_override,
            prefer_privacy: request.prefer_privacy,
            remote_configured: self.remote.is_some(),
            reachability: Reachability::NotProbed,
            input_bytes: request.image.len() as u64,
            size_threshold_bytes: self.config.size_threshold_bytes,
            limited_device: self.device.is_limited(&self.config),
        };

        if ctx.needs_probe() {
            if let Some(remote) = &self.remote {
                ctx.reachability = self
                    .connectivity
                    .probe(remote.as_ref(), self.config.probe_timeout())
                    .await;
            }
        }

        decide(&ctx)
    }

    async fn execute(
        &self,
        location: ProcessingLocation,
        request: &AnalysisRequest,
        buffer: &Arc<PixelBuffer>,
        progress: &mut JobProgress,
    ) -> Result<Execution> {
        match location {
            ProcessingLocation::Local => {
                let local = self.local.run(Arc::clone(buffer), progress).await?;
                Ok(Execution {
                    executed: RouterState::Local,
                    payload: local.payload,
                    stages: local.stages,
                    remote_error: None,
                })
            }

            ProcessingLocation::Remote => match self.call_remote(request).await {
                Ok(payload) => Ok(Execution {
                    executed: RouterState::Remote,
                    payload,
                    stages: vec![remote_report(None)],
                    remote_error: None,
                }),
                Err(remote_err) => {
                    warn!(error = %remote_err, "Remote processing failed; falling back to local");
                    progress.advance(0.1, "remote failed, running locally");
                    let local = self
                        .local
                        .run(Arc::clone(buffer), progress)
                        .await
                        .map_err(|local_err| PipelineError::FallbackFailed {
                            remote: remote_err.to_string(),
                            local: local_err.to_string(),
                        })?;
                    Ok(fallback(local, &remote_err))
                }
            },

            ProcessingLocation::Hybrid => {
                let (local, remote) = tokio::join!(
                    self.local.run(Arc::clone(buffer), progress),
                    self.call_remote(request),
                );
                match (local, remote) {
                    (Ok(local), Ok(remote_payload)) => {
                        let mut stages = local.stages;
                        stages.push(remote_report(None));
                        Ok(Execution {
                            executed: RouterState::Hybrid,
                            payload: merge_payloads(local.payload, remote_payload, &self.config),
                            stages,
                            remote_error: None,
                        })
                    }
                    (Ok(local), Err(remote_err)) => {
                        warn!(error = %remote_err, "Remote half of hybrid job failed; using local result");
                        Ok(fallback(local, &remote_err))
                    }
                    (Err(local_err), Ok(remote_payload)) => {
                        warn!(error = %local_err, "Local half of hybrid job failed; using remote result");
                        Ok(Execution {
                            executed: RouterState::Remote,
                            payload: remote_payload,
                            stages: vec![remote_report(None)],
                            remote_error: None,
                        })
                    }
                    (Err(local_err), Err(remote_err)) => Err(PipelineError::FallbackFailed {
                        remote: remote_err.to_string(),
                        local: local_err.to_string(),
                    }),
                }
            }
        }
    }

    /// One bounded remote attempt.
    async fn call_remote(&self, request: &AnalysisRequest) -> Result<AnalysisPayload> {
        let Some(remote) = &self.remote else {
            return Err(PipelineError::RemoteUnavailable(
                "no remote endpoint configured".into(),
            ));
        };
        let timeout = self.config.remote_timeout();
        match tokio::time::timeout(timeout, remote.analyze(&request.job_id, &request.image)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::RemoteTimeout(timeout)),
        }
    }
}

fn remote_report(error: Option<String>) -> StageReport {
    StageReport {
        stage: Stage::Remote,
        status: if error.is_some() {
            StageStatus::Failed
        } else {
            StageStatus::Complete
        },
        detail: error,
    }
}

fn fallback(local: LocalOutput, remote_err: &PipelineError) -> Execution {
    let mut stages = local.stages;
    stages.push(remote_report(Some(remote_err.to_string())));
    Execution {
        executed: RouterState::FallbackLocal,
        payload: local.payload,
        stages,
        remote_error: Some(remote_err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use schemwerk_core::{BoundingBox, ComponentCandidate, EquipmentKind, ProgressKind};
    use schemwerk_vision::{RecognizedLine, RecognizedShape, StaticRecognizer};

    // -- Fixtures -------------------------------------------------------------

    fn png_bytes() -> Vec<u8> {
        let mut img = GrayImage::from_pixel(160, 120, Luma([255]));
        // Tag bubble around the recognised label.
        for y in 14..=40u32 {
            for x in 14..=86u32 {
                if y <= 15 || y >= 39 || x <= 15 || x >= 85 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        for x in 10..150 {
            img.put_pixel(x, 100, Luma([0]));
            img.put_pixel(x, 101, Luma([0]));
        }
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn recognizer() -> Arc<StaticRecognizer> {
        Arc::new(StaticRecognizer::new(vec![RecognizedLine {
            text: "CONV_07".into(),
            shape: RecognizedShape::Box(BoundingBox::new(20, 20, 60, 14)),
            confidence: 90.0,
            baseline: None,
        }]))
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            remote_timeout_ms: 100,
            probe_timeout_ms: 100,
            ..Default::default()
        }
    }

    enum Behaviour {
        Succeed(Vec<ComponentCandidate>),
        Fail,
        Hang,
    }

    struct FakeRemote {
        healthy: bool,
        behaviour: Behaviour,
        health_calls: AtomicUsize,
        analyze_calls: AtomicUsize,
    }

    impl FakeRemote {
        fn new(healthy: bool, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                healthy,
                behaviour,
                health_calls: AtomicUsize::new(0),
                analyze_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RemoteAnalyzer for FakeRemote {
        fn endpoint(&self) -> &str {
            "fake"
        }

        async fn health(&self) -> Result<()> {
            self.health_calls.fetch_add(1, Ordering::SeqCst);
            if self.healthy {
                Ok(())
            } else {
                Err(PipelineError::RemoteUnavailable("down".into()))
            }
        }

        async fn analyze(&self, _job_id: &JobId, _image: &[u8]) -> Result<AnalysisPayload> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Succeed(components) => Ok(AnalysisPayload {
                    components: components.clone(),
                    ..Default::default()
                }),
                Behaviour::Fail => Err(PipelineError::RemoteProtocol("bad gateway".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(AnalysisPayload::default())
                }
            }
        }
    }

    fn remote_pump() -> ComponentCandidate {
        ComponentCandidate {
            id: "pump-1".into(),
            kind: EquipmentKind::Pump,
            identifier: "101".into(),
            tag: "P-101".into(),
            source_text: "P-101".into(),
            bbox: BoundingBox::new(100, 20, 40, 12),
            nearby: Vec::new(),
            confidence: 0.97,
        }
    }

    fn strong_device() -> DeviceCapability {
        DeviceCapability::new(8, 16_384)
    }

    fn weak_device() -> DeviceCapability {
        DeviceCapability::new(1, 512)
    }

    // -- Tests ----------------------------------------------------------------

    #[tokio::test]
    async fn undecodable_input_fails_immediately() {
        let remote = FakeRemote::new(true, Behaviour::Succeed(Vec::new()));
        let router = ProcessingRouter::new(small_config(), recognizer())
            .with_remote(remote.clone())
            .with_device(strong_device());
        let job = JobId::new("garbage");
        let mut rx = router.progress().subscribe(&job);

        let err = router
            .analyze(AnalysisRequest::new(b"not an image".to_vec()).with_job_id(job))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert_eq!(remote.health_calls.load(Ordering::SeqCst), 0);
        let last = rx.recv().await.expect("terminal event");
        assert_eq!(last.kind, ProgressKind::Failed);
    }

    #[tokio::test]
    async fn local_run_tags_conveyor() {
        let router = ProcessingRouter::new(small_config(), recognizer()).with_device(strong_device());
        let result = router.analyze(AnalysisRequest::new(png_bytes())).await.unwrap();

        assert_eq!(result.decision.executed, RouterState::Local);
        assert_eq!(result.decision.reason, DecisionReason::NetworkUnreachable);
        assert_eq!(result.components.len(), 1);
        assert_eq!(result.components[0].kind, EquipmentKind::Conveyor);
        assert_eq!(result.components[0].identifier, "07");
        assert_eq!((result.image_width, result.image_height), (160, 120));
        assert_eq!(result.input_sha256.len(), 64);
    }

    #[tokio::test]
    async fn privacy_stays_local_without_probing() {
        let remote = FakeRemote::new(true, Behaviour::Succeed(vec![remote_pump()]));
        let router = ProcessingRouter::new(
            PipelineConfig {
                size_threshold_bytes: 1,
                ..small_config()
            },
            recognizer(),
        )
        .with_remote(remote.clone())
        .with_device(weak_device());

        let result = router
            .analyze(AnalysisRequest::new(png_bytes()).with_privacy(true))
            .await
            .unwrap();

        assert_eq!(result.decision.location, ProcessingLocation::Local);
        assert_eq!(result.decision.reason, DecisionReason::PrivacyPreferred);
        assert_eq!(result.decision.executed, RouterState::Local);
        assert_eq!(remote.health_calls.load(Ordering::SeqCst), 0);
        assert_eq!(remote.analyze_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_remote_routes_local() {
        let remote = FakeRemote::new(false, Behaviour::Succeed(vec![remote_pump()]));
        let router = ProcessingRouter::new(small_config(), recognizer())
            .with_remote(remote.clone())
            .with_device(weak_device());

        let result = router.analyze(AnalysisRequest::new(png_bytes())).await.unwrap();

        assert_eq!(result.decision.reason, DecisionReason::NetworkUnreachable);
        assert_eq!(result.decision.executed, RouterState::Local);
        assert_eq!(remote.analyze_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn large_input_on_limited_device_goes_remote() {
        let remote = FakeRemote::new(true, Behaviour::Succeed(vec![remote_pump()]));
        let router = ProcessingRouter::new(
            PipelineConfig {
                size_threshold_bytes: 10,
                ..small_config()
            },
            recognizer(),
        )
        .with_remote(remote.clone())
        .with_device(weak_device());

        let result = router.analyze(AnalysisRequest::new(png_bytes())).await.unwrap();

        assert_eq!(result.decision.reason, DecisionReason::LargeInputLimitedDevice);
        assert_eq!(result.decision.executed, RouterState::Remote);
        assert_eq!(result.components, vec![remote_pump()]);
    }

    #[tokio::test]
    async fn remote_timeout_falls_back_to_local() {
        let remote = FakeRemote::new(true, Behaviour::Hang);
        let router = ProcessingRouter::new(small_config(), recognizer())
            .with_remote(remote.clone())
            .with_device(strong_device());

        let result = router
            .analyze(AnalysisRequest::new(png_bytes()).with_location(ProcessingLocation::Remote))
            .await
            .unwrap();

        assert_eq!(result.decision.location, ProcessingLocation::Remote);
        assert_eq!(result.decision.executed, RouterState::FallbackLocal);
        let error = result.decision.remote_error.as_deref().expect("remote error recorded");
        assert!(error.contains("timed out"), "{error}");
        assert_eq!(result.components[0].identifier, "07");
        assert_eq!(remote.analyze_calls.load(Ordering::SeqCst), 1, "no retry");
    }

    #[tokio::test]
    async fn remote_error_falls_back_to_local() {
        let remote = FakeRemote::new(true, Behaviour::Fail);
        let router = ProcessingRouter::new(small_config(), recognizer())
            .with_remote(remote.clone())
            .with_device(strong_device());

        let result = router
            .analyze(AnalysisRequest::new(png_bytes()).with_location(ProcessingLocation::Remote))
            .await
            .unwrap();

        assert_eq!(result.decision.executed, RouterState::FallbackLocal);
        let remote_stage = result
            .stages
            .iter()
            .find(|r| r.stage == Stage::Remote)
            .expect("remote stage");
        assert_eq!(remote_stage.status, StageStatus::Failed);
    }

    #[tokio::test]
    async fn hybrid_merges_remote_candidates() {
        let remote = FakeRemote::new(true, Behaviour::Succeed(vec![remote_pump()]));
        let router = ProcessingRouter::new(small_config(), recognizer())
            .with_remote(remote.clone())
            .with_device(weak_device());

        let result = router.analyze(AnalysisRequest::new(png_bytes())).await.unwrap();

        assert_eq!(result.decision.reason, DecisionReason::LimitedDevice);
        assert_eq!(result.decision.executed, RouterState::Hybrid);
        let kinds: Vec<_> = result.components.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, [EquipmentKind::Conveyor, EquipmentKind::Pump]);
        assert_eq!(result.components[0].nearby, ["pump-1"]);
    }

    #[tokio::test]
    async fn hybrid_remote_failure_uses_local_pass() {
        let remote = FakeRemote::new(true, Behaviour::Fail);
        let router = ProcessingRouter::new(small_config(), recognizer())
            .with_remote(remote.clone())
            .with_device(weak_device());

        let result = router.analyze(AnalysisRequest::new(png_bytes())).await.unwrap();

        assert_eq!(result.decision.location, ProcessingLocation::Hybrid);
        assert_eq!(result.decision.executed, RouterState::FallbackLocal);
        assert_eq!(result.components.len(), 1);
    }

    #[tokio::test]
    async fn repeated_jobs_are_idempotent() {
        let router = ProcessingRouter::new(small_config(), recognizer()).with_device(strong_device());
        let job = JobId::new("same");

        let first = router
            .analyze(AnalysisRequest::new(png_bytes()).with_job_id(job.clone()))
            .await
            .unwrap();
        let mut second = router
            .analyze(AnalysisRequest::new(png_bytes()).with_job_id(job))
            .await
            .unwrap();

        assert!(second.decision.decided_at >= first.decision.decided_at);
        second.decision.decided_at = first.decision.decided_at;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn progress_is_monotone_with_single_terminal_event() {
        let router = ProcessingRouter::new(small_config(), recognizer()).with_device(strong_device());
        let job = JobId::new("watched");
        let mut rx = router.progress().subscribe(&job);

        router
            .analyze(AnalysisRequest::new(png_bytes()).with_job_id(job))
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.windows(2).all(|w| w[0].fraction <= w[1].fraction));
        assert_eq!(events.iter().filter(|e| e.kind.is_terminal()).count(), 1);
        assert_eq!(events.last().map(|e| e.kind), Some(ProgressKind::Completed));
        assert_eq!(router.progress().listener_count(), 0);
    }
}
