//! JSON output formatting

use gridtrack_core::{RunSummary, Stage};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct RunReport<'a> {
    status: &'a str,
    recording: String,
    output_dir: String,
    initial_stage: Stage,
    extraction_ran: bool,
    tracking_ran: bool,
    detections: usize,
    time_bins: usize,
    identities: usize,
    processing_time_seconds: f64,
}

/// Print one run's outcome as JSON
pub fn print_run_report(recording: &Path, output_dir: &Path, summary: &RunSummary) {
    let report = RunReport {
        status: "success",
        recording: recording.display().to_string(),
        output_dir: output_dir.display().to_string(),
        initial_stage: summary.initial_stage,
        extraction_ran: summary.extraction_ran,
        tracking_ran: summary.tracking_ran,
        detections: summary.detections,
        time_bins: summary.time_bins,
        identities: summary.identities,
        processing_time_seconds: summary.elapsed_secs,
    };
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing run report: {}", e),
    }
}
