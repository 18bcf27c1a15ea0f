// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Schemwerk.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all Schemwerk operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    // -- Input errors --
    #[error("invalid input image: {0}")]
    InvalidInput(String),

    // -- Recognition errors --
    #[error("text recognition engine unavailable: {0}")]
    RecognitionUnavailable(String),

    #[error("text recognition failed: {0}")]
    Recognition(String),

    // -- Remote processing --
    #[error("remote processing unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("remote processing timed out after {0:?}")]
    RemoteTimeout(Duration),

    #[error("remote endpoint returned an unexpected response: {0}")]
    RemoteProtocol(String),

    #[error("remote processing failed ({remote}) and local fallback failed ({local})")]
    FallbackFailed { remote: String, local: String },

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How a failure affects the job that hit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The job cannot produce a result.
    Fatal,
    /// The job continues with less output (e.g. no text).
    Degraded,
    /// Recovered by running the pipeline locally.
    Recoverable,
}

impl PipelineError {
    /// Classify this error according to its effect on a running job.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidInput(_) => ErrorSeverity::Fatal,
            Self::FallbackFailed { .. } => ErrorSeverity::Fatal,
            Self::Config(_) => ErrorSeverity::Fatal,
            Self::Io(_) => ErrorSeverity::Fatal,

            Self::RecognitionUnavailable(_) => ErrorSeverity::Degraded,
            Self::Recognition(_) => ErrorSeverity::Degraded,

            Self::RemoteUnavailable(_) => ErrorSeverity::Recoverable,
            Self::RemoteTimeout(_) => ErrorSeverity::Recoverable,
            Self::RemoteProtocol(_) => ErrorSeverity::Recoverable,
            Self::Serialization(_) => ErrorSeverity::Recoverable,
        }
    }

    /// Whether the error aborts the job.
    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_is_fatal() {
        let err = PipelineError::InvalidInput("truncated PNG".into());
        assert_eq!(err.severity(), ErrorSeverity::Fatal);
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_recognizer_degrades() {
        let err = PipelineError::RecognitionUnavailable("models missing".into());
        assert_eq!(err.severity(), ErrorSeverity::Degraded);
        assert!(!err.is_fatal());
    }

    #[test]
    fn remote_failures_are_recoverable() {
        let timeout = PipelineError::RemoteTimeout(Duration::from_secs(30));
        assert_eq!(timeout.severity(), ErrorSeverity::Recoverable);
        let down = PipelineError::RemoteUnavailable("connection refused".into());
        assert_eq!(down.severity(), ErrorSeverity::Recoverable);
    }

    #[test]
    fn double_failure_is_fatal() {
        let err = PipelineError::FallbackFailed {
            remote: "timed out".into(),
            local: "decode".into(),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("timed out"));
    }
}
