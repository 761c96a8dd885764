pub mod credentials;
pub mod inspector;
pub mod providers;

pub use credentials::{
    select_credentials, CredentialVariant, ResolvedCredentials, RoleAssumer, StsRoleAssumer,
};
pub use inspector::{inspect, ImageManifest};
pub use providers::{OciRegistryFactory, RegistryFactory};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ReporterError;

/// Registry flavours a client can be built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryBackend {
    Dockerhub,
    Standard,
    Ecr,
    Gcr,
}

impl RegistryBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryBackend::Dockerhub => "dockerhub",
            RegistryBackend::Standard => "standard",
            RegistryBackend::Ecr => "ecr",
            RegistryBackend::Gcr => "gcr",
        }
    }
}

impl std::fmt::Display for RegistryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digest and size of a blob referenced by a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobDescriptor {
    pub digest: String,
    pub media_type: String,
    pub size: i64,
}

/// Image manifest as returned by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteManifest {
    /// Digest of the manifest itself
    pub digest: String,
    /// Repository the manifest was pulled from, with the registry host when
    /// the image reference had to be qualified
    pub repository: String,
    pub config: BlobDescriptor,
    pub layers: Vec<BlobDescriptor>,
}

/// The parts of the image config blob the catalog cares about
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ImageConfig {
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
}

/// Read access to a container registry
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Which backend this client talks to
    fn backend(&self) -> RegistryBackend;

    /// Fetch the manifest for `image` (e.g. "registry.io/org/app:1.0")
    async fn fetch_manifest(&self, image: &str) -> Result<RemoteManifest, ReporterError>;

    /// Fetch and parse the config blob referenced by `manifest`
    async fn fetch_config(
        &self,
        image: &str,
        manifest: &RemoteManifest,
    ) -> Result<ImageConfig, ReporterError>;
}
