use serde::Serialize;
use tracing::info;

use crate::error::ReporterError;
use crate::registry::{BlobDescriptor, RegistryClient};

/// Image metadata derived from a manifest and its config blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub config_digest: String,
    /// `<repository>@<manifest digest>`
    pub repo_digest: String,
    /// Config blob size plus the size of every layer
    pub total_size_bytes: i64,
    pub created_timestamp: Option<String>,
    pub os: Option<String>,
    pub architecture: Option<String>,
}

/// Config blob size plus the declared size of every layer.
///
/// Repeated layer digests are counted each time they appear.
pub fn total_size(config: &BlobDescriptor, layers: &[BlobDescriptor]) -> i64 {
    config.size + layers.iter().map(|layer| layer.size).sum::<i64>()
}

/// Drop the tag or digest from an image reference
pub(crate) fn repository_of(image: &str) -> &str {
    if let Some((repository, _)) = image.split_once('@') {
        return repository;
    }
    match image.rsplit_once(':') {
        Some((repository, tag)) if !tag.contains('/') => repository,
        _ => image,
    }
}

/// Fetch the manifest and config of `image` and derive its catalog metadata.
///
/// Failures from either fetch are returned as-is.
pub async fn inspect(
    client: &dyn RegistryClient,
    image: &str,
) -> Result<ImageManifest, ReporterError> {
    let manifest = client.fetch_manifest(image).await?;
    let config = client.fetch_config(image, &manifest).await?;

    let total_size_bytes = total_size(&manifest.config, &manifest.layers);
    info!(
        "Inspected {} via {}: {} layers, {} bytes",
        image,
        client.backend(),
        manifest.layers.len(),
        total_size_bytes
    );

    Ok(ImageManifest {
        config_digest: manifest.config.digest.clone(),
        repo_digest: format!("{}@{}", manifest.repository, manifest.digest),
        total_size_bytes,
        created_timestamp: config.created,
        os: config.os,
        architecture: config.architecture,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::registry::{ImageConfig, RegistryBackend, RemoteManifest};
    use async_trait::async_trait;
    use std::sync::Mutex;

    pub(crate) fn descriptor(digest: &str, size: i64) -> BlobDescriptor {
        BlobDescriptor {
            digest: digest.to_string(),
            media_type: "application/vnd.oci.image.layer.v1.tar+gzip".to_string(),
            size,
        }
    }

    /// Registry client serving one canned manifest and recording requests
    pub(crate) struct FakeRegistry {
        pub backend: RegistryBackend,
        pub manifest: Option<RemoteManifest>,
        pub config: ImageConfig,
        pub requests: Mutex<Vec<String>>,
    }

    impl FakeRegistry {
        pub(crate) fn new(backend: RegistryBackend) -> Self {
            Self {
                backend,
                manifest: Some(RemoteManifest {
                    digest: "sha256:manifest".to_string(),
                    repository: String::new(),
                    config: descriptor("sha256:config", 500),
                    layers: vec![
                        descriptor("sha256:a", 100),
                        descriptor("sha256:b", 250),
                        descriptor("sha256:c", 1150),
                    ],
                }),
                config: ImageConfig {
                    created: Some("2024-05-01T10:00:00Z".to_string()),
                    os: Some("linux".to_string()),
                    architecture: Some("amd64".to_string()),
                },
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        fn backend(&self) -> RegistryBackend {
            self.backend
        }

        async fn fetch_manifest(&self, image: &str) -> Result<RemoteManifest, ReporterError> {
            self.requests.lock().unwrap().push(format!("manifest {}", image));
            self.manifest
                .clone()
                .map(|manifest| RemoteManifest {
                    repository: repository_of(image).to_string(),
                    ..manifest
                })
                .ok_or_else(|| ReporterError::network("manifest fetch", "connection reset"))
        }

        async fn fetch_config(
            &self,
            image: &str,
            manifest: &RemoteManifest,
        ) -> Result<ImageConfig, ReporterError> {
            self.requests
                .lock()
                .unwrap()
                .push(format!("config {} {}", image, manifest.config.digest));
            Ok(self.config.clone())
        }
    }

    #[test]
    fn test_total_size_sums_config_and_layers() {
        let layers = [
            descriptor("sha256:a", 100),
            descriptor("sha256:b", 250),
            descriptor("sha256:c", 1150),
        ];
        assert_eq!(total_size(&descriptor("sha256:config", 500), &layers), 2000);
    }

    #[test]
    fn test_total_size_counts_repeated_layers() {
        let layers = [descriptor("sha256:a", 100), descriptor("sha256:a", 100)];
        assert_eq!(total_size(&descriptor("sha256:config", 10), &layers), 210);
        assert_eq!(total_size(&descriptor("sha256:config", 10), &[]), 10);
    }

    #[test]
    fn test_repository_of() {
        assert_eq!(repository_of("img:tag"), "img");
        assert_eq!(repository_of("localhost:5000/app:1"), "localhost:5000/app");
        assert_eq!(repository_of("localhost:5000/app"), "localhost:5000/app");
        assert_eq!(repository_of("app@sha256:abc"), "app");
        assert_eq!(repository_of("app"), "app");
    }

    #[tokio::test]
    async fn test_inspect_fetches_manifest_then_config() {
        let registry = FakeRegistry::new(RegistryBackend::Dockerhub);

        let manifest = inspect(&registry, "img:tag").await.unwrap();

        assert_eq!(
            *registry.requests.lock().unwrap(),
            vec!["manifest img:tag", "config img:tag sha256:config"]
        );
        assert_eq!(
            manifest,
            ImageManifest {
                config_digest: "sha256:config".to_string(),
                repo_digest: "img@sha256:manifest".to_string(),
                total_size_bytes: 2000,
                created_timestamp: Some("2024-05-01T10:00:00Z".to_string()),
                os: Some("linux".to_string()),
                architecture: Some("amd64".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_inspect_propagates_manifest_failure() {
        let mut registry = FakeRegistry::new(RegistryBackend::Standard);
        registry.manifest = None;

        let err = inspect(&registry, "img:tag").await.unwrap_err();

        assert!(matches!(err, ReporterError::Network { .. }));
        assert_eq!(registry.requests.lock().unwrap().len(), 1);
    }
}
