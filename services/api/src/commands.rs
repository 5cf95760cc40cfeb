use crate::infra::build_pipeline;
use clap::Args;
use resident_import::config::AppConfig;
use resident_import::error::AppError;
use resident_import::telemetry;
use resident_import::workflows::residents::{
    ImportJob, ImportJobHandler, PreviewValidator, UploadedFile,
};
use serde::Serialize;
use std::path::PathBuf;

const CLI_ACTOR: &str = "cli";

#[derive(Args, Debug)]
pub(crate) struct ImportFileArgs {
    /// Path to the resident CSV file
    pub(crate) file: PathBuf,
}

pub(crate) async fn run_preview(args: ImportFileArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let report = PreviewValidator::new(config.import.max_rows).preview_path(&args.file)?;
    println!(
        "Previewed {}: {} rows, {} valid, {} invalid",
        args.file.display(),
        report.total_rows,
        report.valid_count,
        report.invalid_count
    );
    print_json(&report);
    Ok(())
}

pub(crate) async fn run_import(args: ImportFileArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let pipeline = build_pipeline(&config).await?;
    let job = ImportJob::new(
        UploadedFile::persistent(args.file),
        Some(CLI_ACTOR.to_string()),
    );
    let job_id = job.id.clone();

    let outcome = pipeline.worker.handle(job).await;
    pipeline.queue.shutdown().await;

    println!(
        "Import {job_id}: {} processed, {} failed",
        outcome.processed, outcome.failed
    );
    if let Some(reason) = &outcome.halted {
        println!("  Stopped early: {reason}");
    }
    print_json(&outcome);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("JSON output unavailable: {err}"),
    }
}
