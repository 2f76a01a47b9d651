//! [`RepositoryProvider`] backed by GitHub and GitHub Pages

use std::time::Duration;

use async_trait::async_trait;
use pagewright_core::config::ProviderConfig;
use pagewright_core::git::PushCredentials;
use pagewright_core::provider::{RemoteRepository, RepositoryProvider};
use pagewright_core::Secrets;
use tracing::debug;

use crate::{GitHubClient, Result};

/// Username GitHub accepts for token-authenticated HTTPS pushes
const TOKEN_USERNAME: &str = "x-access-token";

pub struct GitHubProvider {
    client: GitHubClient,
    http: reqwest::Client,
}

impl std::fmt::Debug for GitHubProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubProvider")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl GitHubProvider {
    pub fn new(client: GitHubClient, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("pagewright")
            .build()?;
        Ok(Self { client, http })
    }

    /// Build a provider from configuration and the GitHub token in `secrets`
    pub async fn connect(config: &ProviderConfig, secrets: &Secrets) -> Result<Self> {
        let client = GitHubClient::from_secrets(secrets, config.owner.clone()).await?;
        if config.owner.is_some() {
            // a configured owner skips the login lookup, so the token is unchecked so far
            client.verify_credentials().await?;
        }
        Self::new(client, config.timeout)
    }
}

fn repository_url(owner: &str, name: &str) -> String {
    format!("https://github.com/{}/{}", owner, name)
}

fn remote_url(owner: &str, name: &str) -> String {
    format!("https://github.com/{}/{}.git", owner, name)
}

fn pages_url(owner: &str, name: &str) -> String {
    format!("https://{}.github.io/{}/", owner.to_lowercase(), name)
}

#[async_trait]
impl RepositoryProvider for GitHubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn create_repository(
        &self,
        name: &str,
        description: &str,
    ) -> pagewright_core::Result<RemoteRepository> {
        self.client
            .create_repo(name, description)
            .await
            .map_err(|e| pagewright_core::Error::RepositoryCreation(e.to_string()))?;

        Ok(RemoteRepository {
            name: name.to_string(),
            repository_url: self.repository_url(name),
            remote_url: self.remote_url(name),
        })
    }

    async fn enable_pages(&self, name: &str, branch: &str) -> pagewright_core::Result<String> {
        let reported = self
            .client
            .enable_pages(name, branch)
            .await
            .map_err(|e| pagewright_core::Error::Publish(e.to_string()))?;

        Ok(reported.unwrap_or_else(|| self.pages_url(name)))
    }

    async fn is_live(&self, url: &str) -> bool {
        match self.http.get(url).send().await {
            Ok(response) => {
                debug!(url, status = response.status().as_u16(), "Checked pages URL");
                response.status() == reqwest::StatusCode::OK
            }
            Err(e) => {
                debug!(url, error = %e, "Pages URL not reachable yet");
                false
            }
        }
    }

    fn repository_url(&self, name: &str) -> String {
        repository_url(self.client.owner(), name)
    }

    fn remote_url(&self, name: &str) -> String {
        remote_url(self.client.owner(), name)
    }

    fn pages_url(&self, name: &str) -> String {
        pages_url(self.client.owner(), name)
    }

    fn credentials(&self) -> Option<PushCredentials> {
        Some(PushCredentials {
            username: TOKEN_USERNAME.to_string(),
            token: self.client.token().to_string(),
        })
    }
}
