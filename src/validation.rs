//! Declarative validation of the git-provider configuration.
//!
//! The schema has a base part that always applies and a GitHub-only part that
//! is activated by `GIT_PROVIDER=github`. Every rule is evaluated against the
//! whole environment snapshot and all violations are reported together.

use std::fmt;

use thiserror::Error;

use crate::settings::Environment;

fn default_cf_host() -> String {
    "https://g.codefresh.io".to_string()
}

fn default_github_api_host() -> String {
    "https://api.github.com".to_string()
}

fn default_github_api_path_prefix() -> String {
    "/".to_string()
}

fn default_gitlab_host() -> String {
    "https://gitlab.com".to_string()
}

fn default_commits_by_user_limit() -> f64 {
    5.0
}

/// Name of the provider that activates the conditional GitHub schema.
const GITHUB: &str = "github";

/// A single broken rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: &'static str,
    pub message: String,
}

impl Violation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" {}", self.field, self.message)
    }
}

fn render(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|violation| format!("\n - {}", violation))
        .collect()
}

/// Aggregate of every violated constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid configuration{}", render(.violations))]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    pub fn single(violation: Violation) -> Self {
        Self {
            violations: vec![violation],
        }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    #[cfg(test)]
    pub fn fields(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.field).collect()
    }
}

/// How the GitHub client authenticates. Exactly one of the two inputs is
/// accepted, so the exclusive-or lives in the type.
#[derive(Clone, PartialEq, Eq)]
pub enum GithubAuth {
    /// `GITHUB_TOKEN`
    Token(String),
    /// `GITHUB_CONTEXT`: name of a platform git integration holding the token
    Context(String),
}

impl fmt::Debug for GithubAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GithubAuth::Token(_) => f.write_str("Token(<redacted>)"),
            GithubAuth::Context(name) => f.debug_tuple("Context").field(name).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubSettings {
    pub api_host: String,
    pub api_path_prefix: String,
    pub auth: GithubAuth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitlabSettings {
    pub host: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitbucketSettings {
    pub username: Option<String>,
    pub app_password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitbucketServerSettings {
    pub host: Option<String>,
    pub token: Option<String>,
}

/// Validated git-provider configuration. Only constructed by [`validate`].
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Raw `GIT_PROVIDER` value; mapped to an implementation by `git::select`
    pub provider: String,
    pub cf_runtime: Option<String>,
    pub cf_host: String,
    pub cf_api_key: String,
    pub image_name: String,
    pub image_digest: String,
    pub repo: String,
    pub branch: String,
    /// Commit to describe; the branch head is used when unset
    pub revision: Option<String>,
    /// Any positive number; zero and negatives fall back to the default
    pub commits_by_user_limit: f64,
    /// Present exactly when `provider == "github"`
    pub github: Option<GithubSettings>,
    pub gitlab: GitlabSettings,
    pub bitbucket: BitbucketSettings,
    pub bitbucket_server: BitbucketServerSettings,
}

/// Collects violations while the rules run.
struct Checker<'a> {
    env: &'a Environment,
    violations: Vec<Violation>,
}

impl<'a> Checker<'a> {
    fn required(&mut self, field: &'static str) -> Option<&'a str> {
        let value = self.env.get(field);
        if value.is_none() {
            self.violations.push(Violation::new(field, "is required"));
        }
        value
    }

    fn absolute_uri(&mut self, field: &'static str) -> Option<&'a str> {
        let value = self.env.get(field)?;
        match url::Url::parse(value) {
            Ok(parsed) if parsed.has_host() => Some(value),
            _ => {
                self.violations
                    .push(Violation::new(field, "must be a valid uri"));
                None
            }
        }
    }

    fn relative_uri(&mut self, field: &'static str) -> Option<&'a str> {
        let value = self.env.get(field)?;
        match url::Url::parse(value) {
            Err(url::ParseError::RelativeUrlWithoutBase) => Some(value),
            _ => {
                self.violations
                    .push(Violation::new(field, "must be a valid relative uri"));
                None
            }
        }
    }

    fn number(&mut self, field: &'static str) -> Option<f64> {
        let value = self.env.get(field)?;
        match value.parse::<f64>() {
            Ok(n) if n.is_finite() => Some(n),
            _ => {
                self.violations
                    .push(Violation::new(field, "must be a number"));
                None
            }
        }
    }

    fn exactly_one(&mut self, first: &'static str, second: &'static str) {
        match (self.env.contains(first), self.env.contains(second)) {
            (true, false) | (false, true) => {}
            (true, true) => self.violations.push(Violation::new(
                first,
                format!("conflict with forbidden peer \"{}\"", second),
            )),
            (false, false) => self.violations.push(Violation::new(
                first,
                format!("must contain exactly one of [{}, {}]", first, second),
            )),
        }
    }

    fn optional(&self, field: &str) -> Option<String> {
        self.env.get(field).map(str::to_string)
    }
}

/// Validate the provider configuration held in `env`.
///
/// `GIT_PROVIDER` is only checked to be a non-empty string here; whether the
/// value names a supported provider is decided by `git::select`.
pub fn validate(env: &Environment) -> Result<ProviderConfig, ValidationError> {
    let mut check = Checker {
        env,
        violations: Vec::new(),
    };

    let provider = check.required("GIT_PROVIDER");
    let cf_host = check.absolute_uri("CF_HOST_URL");
    let cf_api_key = check.required("CF_API_KEY");
    let image_name = check.required("IMAGE_NAME");
    let image_digest = check.required("IMAGE_SHA");
    let repo = check.required("REPO");
    let branch = check.required("BRANCH");
    let commits_by_user_limit = check.number("CF_COMMITS_BY_USER_LIMIT");

    let github = if provider == Some(GITHUB) {
        let api_host = check.absolute_uri("GITHUB_API_HOST_URL");
        let api_path_prefix = check.relative_uri("GITHUB_API_PATH_PREFIX");
        check.exactly_one("GITHUB_CONTEXT", "GITHUB_TOKEN");

        let auth = match (env.get("GITHUB_TOKEN"), env.get("GITHUB_CONTEXT")) {
            (Some(token), None) => Some(GithubAuth::Token(token.to_string())),
            (None, Some(context)) => Some(GithubAuth::Context(context.to_string())),
            _ => None,
        };

        auth.map(|auth| GithubSettings {
            api_host: api_host
                .map(|h| h.trim_end_matches('/').to_string())
                .unwrap_or_else(default_github_api_host),
            api_path_prefix: api_path_prefix
                .map(str::to_string)
                .unwrap_or_else(default_github_api_path_prefix),
            auth,
        })
    } else {
        None
    };

    let (Some(provider), Some(cf_api_key), Some(image_name), Some(image_digest), Some(repo), Some(branch)) =
        (provider, cf_api_key, image_name, image_digest, repo, branch)
    else {
        return Err(ValidationError {
            violations: check.violations,
        });
    };

    if !check.violations.is_empty() {
        return Err(ValidationError {
            violations: check.violations,
        });
    }

    Ok(ProviderConfig {
        provider: provider.to_string(),
        cf_runtime: check.optional("CF_RUNTIME"),
        cf_host: cf_host
            .map(|h| h.trim_end_matches('/').to_string())
            .unwrap_or_else(default_cf_host),
        cf_api_key: cf_api_key.to_string(),
        image_name: image_name.to_string(),
        image_digest: image_digest.to_string(),
        repo: repo.to_string(),
        branch: branch.to_string(),
        revision: check.optional("GIT_REVISION"),
        commits_by_user_limit: commits_by_user_limit
            .filter(|limit| *limit > 0.0)
            .unwrap_or_else(default_commits_by_user_limit),
        github,
        gitlab: GitlabSettings {
            host: check
                .optional("GITLAB_HOST_URL")
                .map(|h| h.trim_end_matches('/').to_string())
                .unwrap_or_else(default_gitlab_host),
            token: check.optional("GITLAB_TOKEN"),
        },
        bitbucket: BitbucketSettings {
            username: check.optional("BITBUCKET_USERNAME"),
            app_password: check.optional("BITBUCKET_APP_PASSWORD"),
        },
        bitbucket_server: BitbucketServerSettings {
            host: check
                .optional("BITBUCKET_SERVER_HOST_URL")
                .map(|h| h.trim_end_matches('/').to_string()),
            token: check.optional("BITBUCKET_SERVER_TOKEN"),
        },
    })
}
