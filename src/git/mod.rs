//! Source-control providers and the commit context they describe.

pub mod bitbucket;
pub mod bitbucket_server;
pub mod github;
pub mod gitlab;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ReporterError;
use crate::settings::Environment;
use crate::validation::ProviderConfig;

pub use bitbucket::BitbucketClient;
pub use bitbucket_server::BitbucketServerClient;
pub use github::GithubClient;
pub use gitlab::GitlabClient;

/// Supported source-control providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Github,
    Bitbucket,
    BitbucketServer,
    Gitlab,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Github,
        ProviderKind::Bitbucket,
        ProviderKind::BitbucketServer,
        ProviderKind::Gitlab,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Github => "github",
            ProviderKind::Bitbucket => "bitbucket",
            ProviderKind::BitbucketServer => "bitbucket-server",
            ProviderKind::Gitlab => "gitlab",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ReporterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ReporterError::UnsupportedProvider {
                kind: s.to_string(),
            })
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source-control details attached to an image record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
    pub commit_url: Option<String>,
    pub author_username: Option<String>,
}

impl CommitContext {
    /// Commit context handed over by the CI platform through `GIT_*` variables
    pub fn from_env(env: &Environment) -> Self {
        let owned = |key: &str| env.get(key).map(str::to_string);
        Self {
            repo: None,
            branch: owned("GIT_BRANCH"),
            commit_sha: owned("GIT_REVISION"),
            commit_message: owned("GIT_COMMIT_MESSAGE"),
            commit_url: owned("GIT_COMMIT_URL"),
            author_username: owned("GIT_SENDER_LOGIN"),
        }
    }
}

/// A selected provider implementation.
///
/// The only operation is [`GitProvider::fetch_commit_context`].
pub enum GitProvider {
    Github(GithubClient),
    Bitbucket(BitbucketClient),
    BitbucketServer(BitbucketServerClient),
    Gitlab(GitlabClient),
}

impl GitProvider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            GitProvider::Github(_) => ProviderKind::Github,
            GitProvider::Bitbucket(_) => ProviderKind::Bitbucket,
            GitProvider::BitbucketServer(_) => ProviderKind::BitbucketServer,
            GitProvider::Gitlab(_) => ProviderKind::Gitlab,
        }
    }

    /// Describe `commit` (or the head of `branch` when `None`) in `repo`
    pub async fn fetch_commit_context(
        &self,
        repo: &str,
        branch: &str,
        commit: Option<&str>,
    ) -> Result<CommitContext, ReporterError> {
        let reference = commit.unwrap_or(branch);
        tracing::info!(
            "Fetching commit {} of {} from {}",
            reference,
            repo,
            self.kind()
        );

        let mut context = match self {
            GitProvider::Github(client) => client.fetch_commit(repo, reference).await?,
            GitProvider::Bitbucket(client) => client.fetch_commit(repo, reference).await?,
            GitProvider::BitbucketServer(client) => client.fetch_commit(repo, reference).await?,
            GitProvider::Gitlab(client) => client.fetch_commit(repo, reference).await?,
        };
        context.repo = Some(repo.to_string());
        context.branch = Some(branch.to_string());
        Ok(context)
    }
}

/// Map a provider name to its implementation.
///
/// Pure: builds the client handle but performs no I/O. Any name outside
/// [`ProviderKind::ALL`] fails, even if it passed configuration validation.
pub fn select(
    kind: &str,
    config: &ProviderConfig,
    http: &reqwest::Client,
) -> Result<GitProvider, ReporterError> {
    let provider = match kind.parse::<ProviderKind>()? {
        ProviderKind::Github => {
            let settings = config
                .github
                .clone()
                .ok_or_else(|| ReporterError::missing("GITHUB_TOKEN"))?;
            GitProvider::Github(GithubClient::new(
                http.clone(),
                settings,
                &config.cf_host,
                &config.cf_api_key,
            ))
        }
        ProviderKind::Bitbucket => {
            GitProvider::Bitbucket(BitbucketClient::new(http.clone(), config.bitbucket.clone()))
        }
        ProviderKind::BitbucketServer => GitProvider::BitbucketServer(BitbucketServerClient::new(
            http.clone(),
            config.bitbucket_server.clone(),
        )),
        ProviderKind::Gitlab => {
            GitProvider::Gitlab(GitlabClient::new(http.clone(), config.gitlab.clone()))
        }
    };
    Ok(provider)
}

/// Send `request` and decode a JSON body, turning non-2xx into network errors
pub(crate) async fn get_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    operation: &str,
) -> Result<T, ReporterError> {
    let response = request
        .send()
        .await
        .map_err(|e| ReporterError::network(operation, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ReporterError::network(
            operation,
            format!("HTTP {}: {}", status, body),
        ));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ReporterError::invalid_response(operation, e.to_string()))
}
