use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ReporterError;
use crate::validation::{ValidationError, Violation};

/// Platform convention for "this field was intentionally left unset".
pub const CF_NOT_EXIST: &str = "cf-not-exist";

/// Snapshot of the process environment, taken once at startup.
///
/// Every component reads its inputs from this snapshot instead of calling
/// `std::env::var` itself, so validation and credential selection are pure
/// functions of one value.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Snapshot the process environment. Variables whose name or value is
    /// not valid UTF-8 are skipped; none of them can be a reporter input.
    pub fn from_process() -> Self {
        Self::from_pairs(std::env::vars_os().filter_map(|(key, value)| {
            match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (Ok(key), Err(_)) => {
                    tracing::debug!("Ignoring {}: value is not valid UTF-8", key);
                    None
                }
                (Err(_), _) => None,
            }
        }))
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Trimmed value of `key`; empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Like [`Environment::get`], but also treats [`CF_NOT_EXIST`] as unset.
    pub fn present(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| *v != CF_NOT_EXIST)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

const HTTP_TIMEOUT_ENV: &str = "REPORTER_HTTP_TIMEOUT_SECS";

/// Timeout policy for outbound HTTP calls (GraphQL and git providers).
///
/// `None` keeps the historical behaviour of waiting indefinitely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpPolicy {
    pub timeout: Option<Duration>,
}

impl HttpPolicy {
    /// Build the policy, preferring an explicit CLI value over the environment.
    pub fn resolve(env: &Environment, override_secs: Option<u64>) -> Result<Self, ValidationError> {
        if let Some(secs) = override_secs {
            return Ok(Self::with_timeout_secs(secs));
        }

        match env.get(HTTP_TIMEOUT_ENV) {
            None => Ok(Self::default()),
            Some(raw) => raw
                .parse::<u64>()
                .map(Self::with_timeout_secs)
                .map_err(|_| {
                    ValidationError::single(Violation::new(
                        HTTP_TIMEOUT_ENV,
                        format!("must be a whole number of seconds, got '{}'", raw),
                    ))
                }),
        }
    }

    fn with_timeout_secs(secs: u64) -> Self {
        Self {
            timeout: (secs > 0).then(|| Duration::from_secs(secs)),
        }
    }

    pub fn client(&self) -> Result<reqwest::Client, ReporterError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| ReporterError::network("HTTP client setup", e))
    }
}

/// Inputs of the `report-image` command that are not credentials.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub image_uri: String,
    pub cf_host: String,
    pub cf_api_key: String,
    pub workflow_name: Option<String>,
}

impl ReportSettings {
    /// Collect the required reporting inputs, naming every missing one.
    pub fn from_env(env: &Environment) -> Result<Self, ReporterError> {
        let mut missing = Vec::new();
        let mut required = |key: &'static str| match env.get(key) {
            Some(value) => value.to_string(),
            None => {
                missing.push(key);
                String::new()
            }
        };

        let image_uri = required("IMAGE_URI");
        let cf_api_key = required("CF_API_KEY");
        let cf_host = required("CF_HOST");

        if !missing.is_empty() {
            return Err(ReporterError::MissingRequiredInput(missing));
        }

        Ok(Self {
            image_uri,
            cf_host: cf_host.trim_end_matches('/').to_string(),
            cf_api_key,
            workflow_name: env.get("WORKFLOW_NAME").map(str::to_string),
        })
    }

    pub fn graphql_endpoint(&self) -> String {
        format!("{}/2.0/api/graphql", self.cf_host)
    }
}
