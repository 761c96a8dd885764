use serde::Deserialize;

use crate::error::ReporterError;
use crate::git::{get_json, CommitContext};
use crate::validation::GitlabSettings;

#[derive(Debug, Deserialize)]
struct GitlabCommit {
    id: String,
    message: Option<String>,
    web_url: Option<String>,
    author_name: Option<String>,
}

pub struct GitlabClient {
    http: reqwest::Client,
    settings: GitlabSettings,
}

impl GitlabClient {
    pub fn new(http: reqwest::Client, settings: GitlabSettings) -> Self {
        Self { http, settings }
    }

    pub async fn fetch_commit(
        &self,
        repo: &str,
        reference: &str,
    ) -> Result<CommitContext, ReporterError> {
        // Project paths go in as a single url-encoded segment ("group%2Fproject")
        let url = format!(
            "{}/api/v4/projects/{}/repository/commits/{}",
            self.settings.host.trim_end_matches('/'),
            urlencoding::encode(repo),
            urlencoding::encode(reference)
        );

        let mut request = self.http.get(url);
        if let Some(token) = &self.settings.token {
            request = request.header("PRIVATE-TOKEN", token);
        }

        let commit: GitlabCommit = get_json(request, "GitLab commit lookup").await?;

        Ok(CommitContext {
            repo: None,
            branch: None,
            commit_sha: Some(commit.id),
            commit_message: commit.message,
            commit_url: commit.web_url,
            author_username: commit.author_name,
        })
    }
}
