use aws_config::BehaviorVersion;
use aws_sdk_ecr::Client as EcrClient;
use base64::Engine;
use tracing::info;

use crate::error::ReporterError;

/// Extract a clean error message from an AWS SDK error's Debug output
///
/// The AWS SDK errors have verbose Debug output, but we can extract just the
/// meaningful message by parsing for the `message: Some("...")` pattern.
pub(crate) fn format_sdk_error<E: std::fmt::Debug>(err: &E) -> String {
    let debug_str = format!("{:?}", err);

    // Pattern: message: Some("actual error message")
    if let Some(start) = debug_str.find("message: Some(\"") {
        let start = start + 15;
        if let Some(end) = debug_str[start..].find("\")") {
            return debug_str[start..start + end].to_string();
        }
    }

    if debug_str.chars().count() > 200 {
        format!("{}...", debug_str.chars().take(200).collect::<String>())
    } else {
        debug_str
    }
}

/// Registry login obtained from ECR
pub struct EcrAuthorization {
    /// Registry host without scheme (e.g. "123456789012.dkr.ecr.eu-west-1.amazonaws.com")
    pub host: String,
    pub username: String,
    pub password: String,
}

/// Exchange AWS credentials for an ECR registry login
pub async fn authorize(
    region: &str,
    access_key_id: &str,
    secret_access_key: &str,
    session_token: Option<&str>,
) -> Result<EcrAuthorization, ReporterError> {
    let creds = aws_sdk_ecr::config::Credentials::new(
        access_key_id,
        secret_access_key,
        session_token.map(str::to_string),
        None,
        "image-reporter",
    );
    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .credentials_provider(creds)
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await;
    let client = EcrClient::new(&aws_config);

    let response = client
        .get_authorization_token()
        .send()
        .await
        .map_err(|e| ReporterError::network("ECR GetAuthorizationToken", format_sdk_error(&e)))?;

    let auth_data = response.authorization_data().first().ok_or_else(|| {
        ReporterError::invalid_response(
            "ECR GetAuthorizationToken",
            "no authorization data returned",
        )
    })?;

    let token = auth_data.authorization_token().ok_or_else(|| {
        ReporterError::invalid_response("ECR GetAuthorizationToken", "no authorization token")
    })?;
    let endpoint = auth_data.proxy_endpoint().ok_or_else(|| {
        ReporterError::invalid_response("ECR GetAuthorizationToken", "no proxy endpoint")
    })?;

    let (username, password) = decode_authorization_token(token)?;
    let host = registry_host(endpoint);
    info!("Authorized against ECR registry {}", host);

    Ok(EcrAuthorization {
        host,
        username,
        password,
    })
}

/// Decode the base64 token (format is "AWS:password")
fn decode_authorization_token(token: &str) -> Result<(String, String), ReporterError> {
    let invalid = |message: &str| {
        ReporterError::invalid_response("ECR GetAuthorizationToken", message.to_string())
    };

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(token)
        .map_err(|_| invalid("token is not valid base64"))?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid("token is not valid UTF-8"))?;

    match decoded.split_once(':') {
        Some((username, password)) => Ok((username.to_string(), password.to_string())),
        None => Err(invalid("invalid token format")),
    }
}

/// Strip scheme and path from a proxy endpoint
fn registry_host(endpoint: &str) -> String {
    endpoint
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or(endpoint)
        .to_string()
}
