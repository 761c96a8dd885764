use anyhow::{Context, Result};

use crate::catalog::GraphQlCatalogClient;
use crate::pipeline::{ReportPlan, ReportingPipeline};
use crate::registry::{OciRegistryFactory, StsRoleAssumer};
use crate::settings::{Environment, HttpPolicy};

/// Inspect `IMAGE_URI` and write its binary and registry records to the catalog
pub async fn report_image(env: &Environment, policy: HttpPolicy) -> Result<()> {
    let http = policy.client()?;

    let plan = ReportPlan::prepare(env, &http).context("Invalid report-image configuration")?;
    let image = plan.settings.image_uri.clone();
    let catalog = GraphQlCatalogClient::new(
        http,
        plan.settings.graphql_endpoint(),
        plan.settings.cf_api_key.clone(),
    );

    let outcome = ReportingPipeline::new(&StsRoleAssumer, &OciRegistryFactory, &catalog)
        .run(plan)
        .await
        .with_context(|| format!("Failed to report image {}", image))?;

    println!(
        "✓ Reported {} ({}, {} bytes) as image binary {}",
        image, outcome.manifest.repo_digest, outcome.manifest.total_size_bytes, outcome.binary_id
    );
    Ok(())
}
