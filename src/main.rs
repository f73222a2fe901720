use clap::Parser;
use tracing_subscriber::EnvFilter;

use sfbulk::cli::{self, Cli};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sfbulk=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(err) = cli::run(cli).await {
        eprintln!("error: {}", err);
        if let Some(job_id) = err.job_id() {
            eprintln!("job id: {} (inspect with `sfbulk status --job-id {}`)", job_id, job_id);
        }
        std::process::exit(1);
    }
}
