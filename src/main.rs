// src/main.rs
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use updown::analysis::{JsonSource, RecordingReport};
use updown::args::Cli;
use updown::{PipelineConfig, UpDownPipeline};

// 入口函数
fn main() {
    env_logger::init();
    if let Err(e) = run() {
        log::error!("Error: {e:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };

    let recording_path = cli.recording.display();
    let file = File::open(&cli.recording)
        .with_context(|| format!("Failed to open recording: {recording_path}"))?;
    let mut pipeline = UpDownPipeline::new(JsonSource::new(BufReader::new(file)), config)
        .context("Rejected configuration")?;
    let Some(report) = pipeline
        .pump_once()
        .with_context(|| format!("Failed to read recording: {recording_path}"))?
    else {
        bail!("{recording_path} holds no recording");
    };

    let failed = report.detection.failures().len();
    if failed > 0 {
        log::warn!("{failed} of {} channels failed", report.detection.channels.len());
    }
    let output = render_report(&report, pipeline.analyzer().config().detection.show_plots);
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &output).context("Failed to write report")?;
    writeln!(stdout)?;
    Ok(())
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open config: {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse config: {}", path.display()))
}

fn render_report(report: &RecordingReport, with_diagnostics: bool) -> Value {
    let log_mua: Vec<Value> = report
        .log_mua
        .iter()
        .map(|outcome| match outcome {
            Ok(signal) => json!(signal),
            Err(err) => json!({ "error": err.to_string() }),
        })
        .collect();
    let state_matrix = match report.detection.state_matrix() {
        Ok(matrix) => json!(matrix.outer_iter().map(|row| row.to_vec()).collect::<Vec<_>>()),
        Err(err) => {
            log::warn!("state matrix unavailable: {err}");
            Value::Null
        }
    };
    let channels: Vec<Value> = report
        .detection
        .channels
        .iter()
        .enumerate()
        .map(|(index, outcome)| match outcome {
            Ok(detection) => {
                let mut entry = json!({
                    "channel": index,
                    "threshold": detection.threshold,
                    "states": detection.states,
                    "up_to_down": detection.transitions.up_to_down,
                    "down_to_up": detection.transitions.down_to_up,
                    "events": detection.transitions.events(),
                    "profiles": detection.profiles,
                });
                if with_diagnostics {
                    entry["diagnostics"] = json!({
                        "noise": detection.noise,
                        "non_gaussian_tail": detection.noise.non_gaussian_tail(),
                    });
                }
                entry
            }
            Err(err) => json!({ "channel": index, "error": err.to_string() }),
        })
        .collect();
    json!({
        "log_mua": log_mua,
        "state_matrix": state_matrix,
        "channels": channels,
    })
}
