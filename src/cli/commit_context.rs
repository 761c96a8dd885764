use anyhow::{Context, Result};

use crate::pipeline::{CommitSource, ProviderCommitSource};
use crate::settings::{Environment, HttpPolicy};

/// Look up the configured commit on the git provider and print it as JSON
pub async fn print_commit_context(env: &Environment, policy: HttpPolicy) -> Result<()> {
    let http = policy.client()?;
    let source = ProviderCommitSource::from_env(env, &http)
        .context("Invalid git provider configuration")?;

    let context = source
        .commit_context()
        .await
        .with_context(|| format!("Failed to fetch commit details from the {}", source.describe()))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&context).context("Failed to serialize commit context")?
    );
    Ok(())
}
