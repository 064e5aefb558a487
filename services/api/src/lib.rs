mod cli;
mod infra;
mod routes;
mod server;

use afp_claims::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
