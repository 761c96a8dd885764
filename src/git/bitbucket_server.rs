use serde::Deserialize;

use crate::error::ReporterError;
use crate::git::{get_json, CommitContext};
use crate::validation::BitbucketServerSettings;

#[derive(Debug, Deserialize)]
struct ServerCommit {
    id: String,
    message: Option<String>,
    author: Option<ServerAuthor>,
}

#[derive(Debug, Deserialize)]
struct ServerAuthor {
    name: Option<String>,
}

/// Self-hosted Bitbucket (Data Center / Server) REST client
pub struct BitbucketServerClient {
    http: reqwest::Client,
    settings: BitbucketServerSettings,
}

impl BitbucketServerClient {
    pub fn new(http: reqwest::Client, settings: BitbucketServerSettings) -> Self {
        Self { http, settings }
    }

    pub async fn fetch_commit(
        &self,
        repo: &str,
        reference: &str,
    ) -> Result<CommitContext, ReporterError> {
        let host = self
            .settings
            .host
            .as_deref()
            .map(|host| host.trim_end_matches('/'))
            .ok_or_else(|| ReporterError::missing("BITBUCKET_SERVER_HOST_URL"))?;

        let (project, slug) = repo.split_once('/').ok_or_else(|| {
            ReporterError::InvalidReference(format!(
                "{}: expected PROJECT/repository for Bitbucket Server",
                repo
            ))
        })?;

        let url = format!(
            "{}/rest/api/1.0/projects/{}/repos/{}/commits/{}",
            host,
            project,
            slug,
            urlencoding::encode(reference)
        );

        let mut request = self.http.get(url);
        if let Some(token) = &self.settings.token {
            request = request.bearer_auth(token);
        }

        let commit: ServerCommit = get_json(request, "Bitbucket Server commit lookup").await?;

        Ok(CommitContext {
            repo: None,
            branch: None,
            commit_url: Some(format!(
                "{}/projects/{}/repos/{}/commits/{}",
                host, project, slug, commit.id
            )),
            commit_sha: Some(commit.id),
            commit_message: commit.message,
            author_username: commit.author.and_then(|author| author.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_commit_builds_browse_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/1.0/projects/PLAT/repos/app/commits/main"))
            .and(header("authorization", "Bearer bbs-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "0a1b2c",
                "message": "Release 2.1",
                "author": { "name": "jdoe", "emailAddress": "jdoe@acme.io" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = BitbucketServerClient::new(
            reqwest::Client::new(),
            BitbucketServerSettings {
                host: Some(server.uri()),
                token: Some("bbs-token".to_string()),
            },
        );
        let context = client.fetch_commit("PLAT/app", "main").await.unwrap();

        assert_eq!(context.commit_sha.as_deref(), Some("0a1b2c"));
        assert_eq!(context.author_username.as_deref(), Some("jdoe"));
        assert_eq!(
            context.commit_url,
            Some(format!("{}/projects/PLAT/repos/app/commits/0a1b2c", server.uri()))
        );
    }

    #[tokio::test]
    async fn test_missing_host_is_required_input() {
        let client = BitbucketServerClient::new(
            reqwest::Client::new(),
            BitbucketServerSettings {
                host: None,
                token: None,
            },
        );
        let err = client.fetch_commit("PLAT/app", "main").await.unwrap_err();

        assert!(matches!(
            err,
            ReporterError::MissingRequiredInput(ref names) if names == &vec!["BITBUCKET_SERVER_HOST_URL"]
        ));
    }

    #[tokio::test]
    async fn test_repo_without_project_is_rejected() {
        let client = BitbucketServerClient::new(
            reqwest::Client::new(),
            BitbucketServerSettings {
                host: Some("https://bitbucket.acme.internal".to_string()),
                token: None,
            },
        );
        let err = client.fetch_commit("app", "main").await.unwrap_err();

        assert!(matches!(err, ReporterError::InvalidReference(_)));
    }
}
