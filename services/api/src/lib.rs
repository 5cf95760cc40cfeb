mod cli;
mod commands;
mod infra;
mod routes;
mod server;

use resident_import::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
