use clap::Parser;
use kiln_cli::Cli;
use kiln_fetcher::SourceError;
use kiln_sync::{ErrorCategory, SyncError};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();
    match kiln_cli::run(cli, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let category = match err.downcast_ref::<SyncError>() {
                Some(sync) => Some(sync.category()),
                None => err
                    .downcast_ref::<SourceError>()
                    .filter(|source| source.is_configuration())
                    .map(|_| ErrorCategory::Configuration),
            };
            tracing::error!(category = category.map(|c| c.as_str()), "{err:#}");
            match category {
                Some(ErrorCategory::Configuration) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}
