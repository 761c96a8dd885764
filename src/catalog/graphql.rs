use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{CatalogReporter, ImageBinaryInput, ImageRegistryInput};
use crate::error::ReporterError;

const CREATE_IMAGE_BINARY: &str = r#"mutation($imageBinary: ImageBinaryInput!) {
    createImageBinary(imageBinary: $imageBinary) {
        id
        imageName
        branch
        commit
        commitMsg
        commitURL
        workflowName
    }
}"#;

const CREATE_IMAGE_REGISTRY: &str = r#"mutation($imageRegistry: ImageRegistryInput!) {
    createImageRegistry(imageRegistry: $imageRegistry) {
        binaryId
        imageName
        repoDigest
    }
}"#;

#[derive(Serialize)]
struct GraphQlRequest<'a, V: Serialize> {
    query: &'a str,
    variables: V,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BinaryVariables<'a> {
    image_binary: &'a ImageBinaryInput,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistryVariables<'a> {
    image_registry: &'a ImageRegistryInput,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateImageBinaryData {
    create_image_binary: CreatedBinary,
}

#[derive(Deserialize)]
struct CreatedBinary {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateImageRegistryData {
    create_image_registry: serde_json::Value,
}

/// Catalog reporter posting mutations to the platform GraphQL endpoint
pub struct GraphQlCatalogClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GraphQlCatalogClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    async fn execute<V: Serialize, T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: V,
    ) -> Result<T, ReporterError> {
        let response = self
            .http
            .post(&self.endpoint)
            // The platform expects the bare API key, no scheme
            .header("Authorization", &self.api_key)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await
            .map_err(|e| ReporterError::network(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ReporterError::network(
                operation,
                format!("HTTP {}: {}", status, body),
            ));
        }

        let body: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| ReporterError::invalid_response(operation, e.to_string()))?;

        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(ReporterError::network(operation, messages.join("; ")));
        }

        body.data
            .ok_or_else(|| ReporterError::invalid_response(operation, "response has no data"))
    }
}

#[async_trait]
impl CatalogReporter for GraphQlCatalogClient {
    async fn report_image_binary(&self, binary: &ImageBinaryInput) -> Result<String, ReporterError> {
        debug!(
            "binaryQuery payload: {}",
            serde_json::to_string(binary).unwrap_or_default()
        );

        let data: CreateImageBinaryData = self
            .execute(
                "createImageBinary",
                CREATE_IMAGE_BINARY,
                BinaryVariables {
                    image_binary: binary,
                },
            )
            .await?;

        info!("Created image binary {}", data.create_image_binary.id);
        Ok(data.create_image_binary.id)
    }

    async fn report_image_registry(&self, registry: &ImageRegistryInput) -> Result<(), ReporterError> {
        debug!(
            "registryQuery payload: {}",
            serde_json::to_string(registry).unwrap_or_default()
        );

        let data: CreateImageRegistryData = self
            .execute(
                "createImageRegistry",
                CREATE_IMAGE_REGISTRY,
                RegistryVariables {
                    image_registry: registry,
                },
            )
            .await?;

        debug!("registryQuery response: {}", data.create_image_registry);
        info!(
            "Created image registry record {} for binary {}",
            registry.repo_digest, registry.binary_id
        );
        Ok(())
    }
}
