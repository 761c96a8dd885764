use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use tracing::{debug, info};

use crate::error::ReporterError;
use crate::registry::providers::ecr::format_sdk_error;
use crate::settings::Environment;

/// Registry credentials found in the environment.
///
/// Exactly one variant is picked per run by [`select_credentials`].
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialVariant {
    Dockerhub {
        username: String,
        password: String,
    },
    Standard {
        host: String,
        username: String,
        password: String,
        insecure: bool,
    },
    EcrAssumedRole {
        role_arn: String,
        region: String,
    },
    Gcr {
        keyfile_path: PathBuf,
    },
    EcrStatic {
        access_key: String,
        secret_key: String,
        region: String,
    },
}

impl CredentialVariant {
    pub fn kind(&self) -> &'static str {
        match self {
            CredentialVariant::Dockerhub { .. } => "dockerhub",
            CredentialVariant::Standard { .. } => "standard",
            CredentialVariant::EcrAssumedRole { .. } => "ecr-assumed-role",
            CredentialVariant::Gcr { .. } => "gcr",
            CredentialVariant::EcrStatic { .. } => "ecr-static",
        }
    }
}

impl fmt::Debug for CredentialVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialVariant::Dockerhub { username, .. } => f
                .debug_struct("Dockerhub")
                .field("username", username)
                .finish_non_exhaustive(),
            CredentialVariant::Standard {
                host,
                username,
                insecure,
                ..
            } => f
                .debug_struct("Standard")
                .field("host", host)
                .field("username", username)
                .field("insecure", insecure)
                .finish_non_exhaustive(),
            CredentialVariant::EcrAssumedRole { role_arn, region } => f
                .debug_struct("EcrAssumedRole")
                .field("role_arn", role_arn)
                .field("region", region)
                .finish(),
            CredentialVariant::Gcr { keyfile_path } => f
                .debug_struct("Gcr")
                .field("keyfile_path", keyfile_path)
                .finish(),
            CredentialVariant::EcrStatic { region, .. } => f
                .debug_struct("EcrStatic")
                .field("region", region)
                .finish_non_exhaustive(),
        }
    }
}

type Candidate = fn(&Environment) -> Option<CredentialVariant>;

/// Candidate sources, earliest wins. Operators may have several credential
/// sets present at once and rely on this exact order.
const PRECEDENCE: [Candidate; 5] = [
    dockerhub,
    standard,
    ecr_assumed_role,
    gcr,
    ecr_static,
];

fn dockerhub(env: &Environment) -> Option<CredentialVariant> {
    Some(CredentialVariant::Dockerhub {
        username: env.present("DOCKER_USERNAME")?.to_string(),
        password: env.present("DOCKER_PASSWORD")?.to_string(),
    })
}

fn standard(env: &Environment) -> Option<CredentialVariant> {
    Some(CredentialVariant::Standard {
        username: env.present("USERNAME")?.to_string(),
        password: env.present("PASSWORD")?.to_string(),
        host: env.present("DOMAIN")?.to_string(),
        insecure: env.get("INSECURE") == Some("true"),
    })
}

fn ecr_assumed_role(env: &Environment) -> Option<CredentialVariant> {
    Some(CredentialVariant::EcrAssumedRole {
        role_arn: env.present("AWS_ROLE")?.to_string(),
        region: env.present("AWS_REGION")?.to_string(),
    })
}

fn gcr(env: &Environment) -> Option<CredentialVariant> {
    Some(CredentialVariant::Gcr {
        keyfile_path: PathBuf::from(env.present("GCR_KEY_FILE_PATH")?),
    })
}

fn ecr_static(env: &Environment) -> Option<CredentialVariant> {
    Some(CredentialVariant::EcrStatic {
        access_key: env.present("AWS_ACCESS_KEY")?.to_string(),
        secret_key: env.present("AWS_SECRET_KEY")?.to_string(),
        region: env.present("AWS_REGION")?.to_string(),
    })
}

/// Pick the registry credentials to use, without any network access.
///
/// A candidate is satisfied when all of its fields are set and none of them
/// equals `cf-not-exist`. Evaluation stops at the first satisfied candidate.
pub fn select_credentials(env: &Environment) -> Result<CredentialVariant, ReporterError> {
    let variant = PRECEDENCE
        .iter()
        .find_map(|candidate| candidate(env))
        .ok_or(ReporterError::NoCredentials)?;

    debug!("Selected {} registry credentials", variant.kind());
    Ok(variant)
}

/// Temporary keys returned by an STS role assumption
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// Credentials ready to hand to a registry client.
///
/// Both ECR variants collapse into [`ResolvedCredentials::Ecr`]; the assumed
/// role one carries the STS session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCredentials {
    Dockerhub {
        username: String,
        password: String,
    },
    Standard {
        host: String,
        username: String,
        password: String,
        insecure: bool,
    },
    Ecr {
        region: String,
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    },
    Gcr {
        keyfile_path: PathBuf,
    },
}

/// Exchanges a role ARN for temporary AWS credentials
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(
        &self,
        role_arn: &str,
        region: &str,
    ) -> Result<SessionCredentials, ReporterError>;
}

/// [`RoleAssumer`] backed by AWS STS, using the default credential chain
pub struct StsRoleAssumer;

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(
        &self,
        role_arn: &str,
        region: &str,
    ) -> Result<SessionCredentials, ReporterError> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        let client = aws_sdk_sts::Client::new(&aws_config);

        let session_name = format!("image-reporter-{}", chrono::Utc::now().timestamp_millis());
        let response = client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(&session_name)
            .send()
            .await
            .map_err(|e| ReporterError::network("STS AssumeRole", format_sdk_error(&e)))?;

        let credentials = response.credentials().ok_or_else(|| {
            ReporterError::invalid_response("STS AssumeRole", "no credentials returned")
        })?;

        Ok(SessionCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
        })
    }
}

/// Perform the effectful part of credential resolution.
///
/// Only [`CredentialVariant::EcrAssumedRole`] touches the network: it calls
/// `assumer` exactly once and is not retried.
pub async fn resolve(
    variant: CredentialVariant,
    assumer: &dyn RoleAssumer,
) -> Result<ResolvedCredentials, ReporterError> {
    let resolved = match variant {
        CredentialVariant::Dockerhub { username, password } => {
            ResolvedCredentials::Dockerhub { username, password }
        }
        CredentialVariant::Standard {
            host,
            username,
            password,
            insecure,
        } => ResolvedCredentials::Standard {
            host,
            username,
            password,
            insecure,
        },
        CredentialVariant::EcrAssumedRole { role_arn, region } => {
            info!("Retrieving credentials for ECR {} using STS token", region);
            let session = assumer.assume_role(&role_arn, &region).await?;
            ResolvedCredentials::Ecr {
                region,
                access_key_id: session.access_key_id,
                secret_access_key: session.secret_access_key,
                session_token: Some(session.session_token),
            }
        }
        CredentialVariant::Gcr { keyfile_path } => ResolvedCredentials::Gcr { keyfile_path },
        CredentialVariant::EcrStatic {
            access_key,
            secret_key,
            region,
        } => ResolvedCredentials::Ecr {
            region,
            access_key_id: access_key,
            secret_access_key: secret_key,
            session_token: None,
        },
    };

    Ok(resolved)
}
