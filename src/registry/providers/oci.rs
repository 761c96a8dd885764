use async_trait::async_trait;
use oci_distribution::{
    client::{ClientConfig, ClientProtocol},
    errors::OciDistributionError,
    manifest::{OciDescriptor, OciImageManifest},
    secrets::RegistryAuth,
    Client, Reference,
};
use tracing::debug;

use crate::error::ReporterError;
use crate::registry::inspector::repository_of;
use crate::registry::{BlobDescriptor, ImageConfig, RegistryBackend, RegistryClient, RemoteManifest};

/// Registry client speaking the OCI distribution API.
///
/// All backends end up here; they differ only in host and authentication.
pub struct OciRegistryClient {
    backend: RegistryBackend,
    host: String,
    auth: RegistryAuth,
    client: Client,
}

impl OciRegistryClient {
    /// Create a client authenticating with `username`/`password` against `host`.
    /// `insecure` switches that host (and only that host) to plain HTTP.
    pub fn new(
        backend: RegistryBackend,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        insecure: bool,
    ) -> Self {
        let host = host.into();
        let protocol = if insecure {
            ClientProtocol::HttpsExcept(vec![host.clone()])
        } else {
            ClientProtocol::Https
        };
        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });

        Self {
            backend,
            host,
            auth: RegistryAuth::Basic(username.into(), password.into()),
            client,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn reference(&self, image: &str) -> Result<Reference, ReporterError> {
        let qualified = qualify_image(image, &self.host);
        Reference::try_from(qualified.as_str())
            .map_err(|e| ReporterError::InvalidReference(format!("{}: {}", image, e)))
    }

    fn classify_error(&self, err: OciDistributionError, operation: &str, image: &str) -> ReporterError {
        let error_string = err.to_string();

        if error_string.contains("404") || error_string.contains("not found") {
            ReporterError::network(operation, format!("image not found: {}", image))
        } else if error_string.contains("401")
            || error_string.contains("403")
            || error_string.contains("unauthorized")
        {
            ReporterError::network(
                operation,
                format!("{} registry rejected the credentials for {}", self.backend, image),
            )
        } else {
            ReporterError::network(operation, error_string)
        }
    }
}

/// Prefix `image` with `host` unless its first path segment already names a
/// registry (contains '.' or ':' or is "localhost").
pub(crate) fn qualify_image(image: &str, host: &str) -> String {
    if host == "docker.io" {
        return image.to_string();
    }

    let names_registry = match image.split_once('/') {
        Some((first, _)) => first.contains('.') || first.contains(':') || first == "localhost",
        None => false,
    };

    if names_registry {
        image.to_string()
    } else {
        format!("{}/{}", host, image)
    }
}

fn blob(descriptor: &OciDescriptor) -> BlobDescriptor {
    BlobDescriptor {
        digest: descriptor.digest.clone(),
        media_type: descriptor.media_type.clone(),
        size: descriptor.size,
    }
}

fn remote_manifest(manifest: &OciImageManifest, digest: String, repository: String) -> RemoteManifest {
    RemoteManifest {
        digest,
        repository,
        config: blob(&manifest.config),
        layers: manifest.layers.iter().map(blob).collect(),
    }
}

#[async_trait]
impl RegistryClient for OciRegistryClient {
    fn backend(&self) -> RegistryBackend {
        self.backend
    }

    async fn fetch_manifest(&self, image: &str) -> Result<RemoteManifest, ReporterError> {
        let qualified = qualify_image(image, &self.host);
        let reference = self.reference(image)?;
        debug!("Fetching manifest for {}", reference.whole());

        let (manifest, digest) = self
            .client
            .pull_image_manifest(&reference, &self.auth)
            .await
            .map_err(|e| self.classify_error(e, "manifest fetch", image))?;

        Ok(remote_manifest(
            &manifest,
            digest,
            repository_of(&qualified).to_string(),
        ))
    }

    async fn fetch_config(
        &self,
        image: &str,
        manifest: &RemoteManifest,
    ) -> Result<ImageConfig, ReporterError> {
        let reference = self.reference(image)?;
        debug!("Fetching config blob {}", manifest.config.digest);

        let descriptor = OciDescriptor {
            media_type: manifest.config.media_type.clone(),
            digest: manifest.config.digest.clone(),
            size: manifest.config.size,
            ..Default::default()
        };

        let mut raw: Vec<u8> = Vec::new();
        self.client
            .pull_blob(&reference, &descriptor, &mut raw)
            .await
            .map_err(|e| self.classify_error(e, "config fetch", image))?;

        serde_json::from_slice(&raw).map_err(|e| {
            ReporterError::invalid_response("config fetch", format!("invalid image config: {}", e))
        })
    }
}
