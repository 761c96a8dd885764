//! Platform image catalog: the two records written for every reported image.

pub mod graphql;

pub use graphql::GraphQlCatalogClient;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ReporterError;
use crate::git::CommitContext;
use crate::registry::ImageManifest;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BinaryAuthor {
    pub username: Option<String>,
}

/// `ImageBinaryInput` as expected by `createImageBinary`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBinaryInput {
    /// Config digest of the image
    pub id: String,
    pub created: Option<String>,
    pub image_name: String,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub commit_msg: Option<String>,
    #[serde(rename = "commitURL")]
    pub commit_url: Option<String>,
    pub size: i64,
    pub os: Option<String>,
    pub architecture: Option<String>,
    pub workflow_name: Option<String>,
    pub author: BinaryAuthor,
}

impl ImageBinaryInput {
    pub fn new(
        image_name: &str,
        manifest: &ImageManifest,
        commit: CommitContext,
        workflow_name: Option<String>,
    ) -> Self {
        Self {
            id: manifest.config_digest.clone(),
            created: manifest.created_timestamp.clone(),
            image_name: image_name.to_string(),
            branch: commit.branch,
            commit: commit.commit_sha,
            commit_msg: commit.commit_message,
            commit_url: commit.commit_url,
            size: manifest.total_size_bytes,
            os: manifest.os.clone(),
            architecture: manifest.architecture.clone(),
            workflow_name,
            author: BinaryAuthor {
                username: commit.author_username,
            },
        }
    }
}

/// `ImageRegistryInput` as expected by `createImageRegistry`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRegistryInput {
    pub binary_id: String,
    pub image_name: String,
    pub repo_digest: String,
    pub created: Option<String>,
}

impl ImageRegistryInput {
    pub fn new(binary_id: String, image_name: &str, manifest: &ImageManifest) -> Self {
        Self {
            binary_id,
            image_name: image_name.to_string(),
            repo_digest: manifest.repo_digest.clone(),
            created: manifest.created_timestamp.clone(),
        }
    }
}

/// Write side of the platform catalog.
///
/// The two calls are independent requests; nothing rolls back a binary
/// record when the registry record fails.
#[async_trait]
pub trait CatalogReporter: Send + Sync {
    /// Create the binary record and return the id the platform assigned to it
    async fn report_image_binary(&self, binary: &ImageBinaryInput) -> Result<String, ReporterError>;

    async fn report_image_registry(&self, registry: &ImageRegistryInput) -> Result<(), ReporterError>;
}
