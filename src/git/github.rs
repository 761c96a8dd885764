use serde::Deserialize;
use tracing::debug;

use crate::error::ReporterError;
use crate::git::{get_json, CommitContext};
use crate::validation::{GithubAuth, GithubSettings};

const USER_AGENT: &str = concat!("image-reporter/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct GithubCommit {
    sha: String,
    html_url: Option<String>,
    commit: GithubCommitDetails,
    author: Option<GithubUser>,
}

#[derive(Debug, Deserialize)]
struct GithubCommitDetails {
    message: Option<String>,
    author: Option<GithubCommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct GithubCommitAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
}

/// Git integration stored on the platform, as returned by the contexts API
#[derive(Debug, Deserialize)]
struct PlatformContext {
    spec: PlatformContextSpec,
}

#[derive(Debug, Deserialize)]
struct PlatformContextSpec {
    data: PlatformContextData,
}

#[derive(Debug, Deserialize)]
struct PlatformContextData {
    auth: PlatformContextAuth,
}

#[derive(Debug, Deserialize)]
struct PlatformContextAuth {
    password: String,
}

/// GitHub (and GitHub Enterprise) REST client
pub struct GithubClient {
    http: reqwest::Client,
    settings: GithubSettings,
    cf_host: String,
    cf_api_key: String,
}

impl GithubClient {
    pub fn new(
        http: reqwest::Client,
        settings: GithubSettings,
        cf_host: &str,
        cf_api_key: &str,
    ) -> Self {
        Self {
            http,
            settings,
            cf_host: cf_host.trim_end_matches('/').to_string(),
            cf_api_key: cf_api_key.to_string(),
        }
    }

    /// `{api_host}{prefix}` where the prefix always starts and ends with '/'
    fn api_base(&self) -> String {
        let prefix = self.settings.api_path_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}/", self.settings.api_host)
        } else {
            format!("{}/{}/", self.settings.api_host, prefix)
        }
    }

    async fn token(&self) -> Result<String, ReporterError> {
        match &self.settings.auth {
            GithubAuth::Token(token) => Ok(token.clone()),
            GithubAuth::Context(name) => {
                debug!("Reading GitHub token from platform context '{}'", name);
                let url = format!(
                    "{}/api/contexts/{}",
                    self.cf_host,
                    urlencoding::encode(name)
                );
                let context: PlatformContext = get_json(
                    self.http
                        .get(url)
                        .query(&[("decrypt", "true")])
                        .header("Authorization", &self.cf_api_key),
                    "platform context lookup",
                )
                .await?;
                Ok(context.spec.data.auth.password)
            }
        }
    }

    pub async fn fetch_commit(
        &self,
        repo: &str,
        reference: &str,
    ) -> Result<CommitContext, ReporterError> {
        let token = self.token().await?;
        let url = format!(
            "{}repos/{}/commits/{}",
            self.api_base(),
            repo,
            urlencoding::encode(reference)
        );

        let commit: GithubCommit = get_json(
            self.http
                .get(url)
                .header("Authorization", format!("token {}", token))
                .header("Accept", "application/vnd.github+json")
                .header("User-Agent", USER_AGENT),
            "GitHub commit lookup",
        )
        .await?;

        let author_username = commit
            .author
            .map(|user| user.login)
            .or_else(|| commit.commit.author.and_then(|author| author.name));

        Ok(CommitContext {
            repo: None,
            branch: None,
            commit_sha: Some(commit.sha),
            commit_message: commit.commit.message,
            commit_url: commit.html_url,
            author_username,
        })
    }
}
