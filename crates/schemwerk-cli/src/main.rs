// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Schemwerk — engineering drawing analysis from the command line.
//
// Entry point. Initialises logging, loads configuration, builds the router and
// prints the analysis result as JSON on stdout. Logs and progress go to stderr.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use schemwerk_core::{AnalysisResult, JobId, PipelineError, ProcessingLocation};
use schemwerk_engine::{AnalysisRequest, HttpRemoteAnalyzer, ProcessingRouter};
use tracing::{error, info};

use services::config_dir::load_config;
use services::recognizer::build_recognizer;

#[derive(Parser, Debug)]
#[command(name = "schemwerk")]
#[command(version, about = "Analyse engineering drawings: layout, text, line-work and equipment tags")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse one drawing and print the result as JSON.
    Analyze(AnalyzeArgs),
}

#[derive(clap::Args, Debug)]
struct AnalyzeArgs {
    /// Drawing to analyse (PNG, JPEG, TIFF, BMP, ...).
    image: PathBuf,

    /// JSON configuration file.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Force a processing location: local, remote or hybrid.
    #[arg(long)]
    mode: Option<ProcessingLocation>,

    /// Never send the drawing off this machine.
    #[arg(long)]
    prefer_privacy: bool,

    /// Base URL of the remote analysis service.
    #[arg(long, env = "SCHEMWERK_REMOTE_URL")]
    remote_url: Option<String>,

    /// Directory holding the text detection and recognition models.
    #[arg(long = "models")]
    model_dir: Option<PathBuf>,

    /// Job id to use instead of a generated one.
    #[arg(long)]
    job_id: Option<String>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Analyze(args) => analyze(args).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Analysis failed");
            ExitCode::FAILURE
        }
    }
}

async fn analyze(args: AnalyzeArgs) -> Result<(), PipelineError> {
    let config = load_config(args.config.as_deref())?;
    let image = tokio::fs::read(&args.image).await?;
    info!(path = %args.image.display(), bytes = image.len(), "Drawing loaded");

    let recognizer = build_recognizer(args.model_dir.as_deref());
    let mut router = ProcessingRouter::new(config, recognizer);
    if let Some(url) = &args.remote_url {
        info!(%url, "Remote analysis endpoint configured");
        router = router.with_remote(Arc::new(HttpRemoteAnalyzer::new(url.as_str())));
    }

    let job_id = args.job_id.map(JobId::new).unwrap_or_else(JobId::generate);
    let mut request = AnalysisRequest::new(image)
        .with_job_id(job_id.clone())
        .with_privacy(args.prefer_privacy);
    if let Some(mode) = args.mode {
        request = request.with_location(mode);
    }

    let mut events = router.progress().subscribe(&job_id);
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(
                job_id = %event.job_id,
                percent = (event.fraction * 100.0).round(),
                status = %event.status,
                "Progress"
            );
        }
    });

    let result = router.analyze(request).await;
    // The hub releases the listener on the terminal event, which ends the loop.
    let _ = reporter.await;

    let result = result?;
    summarize(&result);
    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{json}");
    Ok(())
}

fn summarize(result: &AnalysisResult) {
    info!(
        job_id = %result.job_id,
        location = ?result.decision.location,
        reason = ?result.decision.reason,
        text_lines = result.text_lines.len(),
        regions = result.regions.len(),
        tables = result.tables().count(),
        lines = result.lines.len(),
        components = result.components.len(),
        "Analysis complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_arguments_parse() {
        let cli = Cli::try_parse_from([
            "schemwerk",
            "analyze",
            "drawing.png",
            "--mode",
            "hybrid",
            "--prefer-privacy",
            "--models",
            "/opt/models",
            "--pretty",
        ])
        .expect("arguments parse");
        let Command::Analyze(args) = cli.command;
        assert_eq!(args.image, PathBuf::from("drawing.png"));
        assert_eq!(args.mode, Some(ProcessingLocation::Hybrid));
        assert!(args.prefer_privacy);
        assert_eq!(args.model_dir, Some(PathBuf::from("/opt/models")));
        assert!(args.pretty);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let parsed = Cli::try_parse_from(["schemwerk", "analyze", "x.png", "--mode", "cloud"]);
        assert!(parsed.is_err());
    }
}
