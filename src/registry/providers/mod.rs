pub mod ecr;
pub mod oci;

pub use oci::OciRegistryClient;

use async_trait::async_trait;
use tracing::info;

use crate::error::ReporterError;
use crate::registry::{RegistryBackend, RegistryClient, ResolvedCredentials};

const DOCKERHUB_HOST: &str = "docker.io";
const GCR_HOST: &str = "gcr.io";
/// Username GCR expects when the password is a service account key file
const GCR_KEYFILE_USERNAME: &str = "_json_key";

/// Builds the registry client matching a set of resolved credentials
#[async_trait]
pub trait RegistryFactory: Send + Sync {
    async fn build(
        &self,
        credentials: ResolvedCredentials,
    ) -> Result<Box<dyn RegistryClient>, ReporterError>;
}

/// Factory producing [`OciRegistryClient`]s for every backend
pub struct OciRegistryFactory;

#[async_trait]
impl RegistryFactory for OciRegistryFactory {
    async fn build(
        &self,
        credentials: ResolvedCredentials,
    ) -> Result<Box<dyn RegistryClient>, ReporterError> {
        let client = match credentials {
            ResolvedCredentials::Dockerhub { username, password } => OciRegistryClient::new(
                RegistryBackend::Dockerhub,
                DOCKERHUB_HOST,
                username,
                password,
                false,
            ),
            ResolvedCredentials::Standard {
                host,
                username,
                password,
                insecure,
            } => OciRegistryClient::new(RegistryBackend::Standard, host, username, password, insecure),
            ResolvedCredentials::Ecr {
                region,
                access_key_id,
                secret_access_key,
                session_token,
            } => {
                let login = ecr::authorize(
                    &region,
                    &access_key_id,
                    &secret_access_key,
                    session_token.as_deref(),
                )
                .await?;
                OciRegistryClient::new(
                    RegistryBackend::Ecr,
                    login.host,
                    login.username,
                    login.password,
                    false,
                )
            }
            ResolvedCredentials::Gcr { keyfile_path } => {
                let keyfile = tokio::fs::read_to_string(&keyfile_path).await.map_err(|e| {
                    ReporterError::ReadFile {
                        path: keyfile_path.display().to_string(),
                        error: e,
                    }
                })?;
                OciRegistryClient::new(
                    RegistryBackend::Gcr,
                    GCR_HOST,
                    GCR_KEYFILE_USERNAME,
                    keyfile,
                    false,
                )
            }
        };

        info!(
            "Using {} registry client for {}",
            client.backend(),
            client.host()
        );
        Ok(Box::new(client))
    }
}
