use serde::Deserialize;

use crate::error::ReporterError;
use crate::git::{get_json, CommitContext};
use crate::validation::BitbucketSettings;

const BITBUCKET_API: &str = "https://api.bitbucket.org";

#[derive(Debug, Deserialize)]
struct BitbucketCommit {
    hash: String,
    message: Option<String>,
    links: Option<BitbucketLinks>,
    author: Option<BitbucketAuthor>,
}

#[derive(Debug, Deserialize)]
struct BitbucketLinks {
    html: Option<BitbucketLink>,
}

#[derive(Debug, Deserialize)]
struct BitbucketLink {
    href: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketAuthor {
    /// "Name <email>" as recorded in the commit
    raw: Option<String>,
    user: Option<BitbucketUser>,
}

#[derive(Debug, Deserialize)]
struct BitbucketUser {
    nickname: Option<String>,
    display_name: Option<String>,
}

impl BitbucketAuthor {
    fn username(self) -> Option<String> {
        self.user
            .and_then(|user| user.nickname.or(user.display_name))
            .or(self.raw)
    }
}

/// Bitbucket Cloud REST client
pub struct BitbucketClient {
    http: reqwest::Client,
    settings: BitbucketSettings,
    api_base: String,
}

impl BitbucketClient {
    pub fn new(http: reqwest::Client, settings: BitbucketSettings) -> Self {
        Self {
            http,
            settings,
            api_base: BITBUCKET_API.to_string(),
        }
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub async fn fetch_commit(
        &self,
        repo: &str,
        reference: &str,
    ) -> Result<CommitContext, ReporterError> {
        let url = format!(
            "{}/2.0/repositories/{}/commit/{}",
            self.api_base,
            repo,
            urlencoding::encode(reference)
        );

        let mut request = self.http.get(url);
        if let Some(username) = &self.settings.username {
            request = request.basic_auth(username, self.settings.app_password.as_ref());
        }

        let commit: BitbucketCommit = get_json(request, "Bitbucket commit lookup").await?;

        Ok(CommitContext {
            repo: None,
            branch: None,
            commit_sha: Some(commit.hash),
            commit_message: commit.message,
            commit_url: commit.links.and_then(|l| l.html).map(|l| l.href),
            author_username: commit.author.and_then(BitbucketAuthor::username),
        })
    }
}
