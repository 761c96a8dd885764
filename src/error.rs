use thiserror::Error;

use crate::validation::ValidationError;

/// Every failure a reporting run can end with.
///
/// None of these are recovered locally: the command layer wraps them in
/// `anyhow` context, prints the chain to stderr and exits with status 1.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("{} is required parameter. Add this parameter in your workflow to continue.", .0.join(", "))]
    MissingRequiredInput(Vec<&'static str>),

    #[error(
        "Registry credentials is required parameter. Add one from following registry parameters in your workflow to continue:\n \
         - Docker credentials: DOCKER_USERNAME, DOCKER_PASSWORD\n \
         - Standard registry credentials: USERNAME, PASSWORD, DOMAIN\n \
         - AWS assumed role: AWS_ROLE, AWS_REGION\n \
         - GCR credentials: GCR_KEY_FILE_PATH\n \
         - AWS registry credentials: AWS_ACCESS_KEY, AWS_SECRET_KEY, AWS_REGION"
    )]
    NoCredentials,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Provider {kind} is not supported")]
    UnsupportedProvider { kind: String },

    #[error("Network error during {operation}: {message}")]
    Network { operation: String, message: String },

    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    #[error("Unexpected response from {operation}: {message}")]
    InvalidResponse { operation: String, message: String },

    #[error("Failed to read {path}: {error}")]
    ReadFile {
        path: String,
        error: std::io::Error,
    },
}

impl ReporterError {
    pub fn missing(name: &'static str) -> Self {
        Self::MissingRequiredInput(vec![name])
    }

    pub fn network(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Network {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_response(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
