use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod cli;
mod error;
mod git;
mod pipeline;
mod registry;
mod settings;
mod validation;

use settings::{Environment, HttpPolicy};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Timeout in seconds for catalog and git provider requests (0 disables it).
    /// Overrides REPORTER_HTTP_TIMEOUT_SECS.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect IMAGE_URI in its registry and report it to the platform catalog
    #[command(visible_alias = "report")]
    ReportImage,
    /// Fetch the configured commit from the git provider and print it as JSON
    CommitContext,
    /// Validate the configuration without contacting any service
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let env = Environment::from_process();

    match cli.command {
        Commands::ReportImage => {
            let policy = HttpPolicy::resolve(&env, cli.timeout_secs)?;
            cli::report::report_image(&env, policy).await?;
        }
        Commands::CommitContext => {
            let policy = HttpPolicy::resolve(&env, cli.timeout_secs)?;
            cli::commit_context::print_commit_context(&env, policy).await?;
        }
        Commands::CheckConfig => {
            cli::check_config::check_config(&env, cli.timeout_secs);
        }
    }

    Ok(())
}
