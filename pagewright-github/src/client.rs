//! GitHub API client using octocrab

use crate::{Error, Result};
use octocrab::Octocrab;
use pagewright_core::Secrets;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

/// GitHub API client acting on behalf of one account
pub struct GitHubClient {
    client: Octocrab,
    owner: String,
    token: String,
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
    auto_init: bool,
}

impl GitHubClient {
    /// Create a client from a personal access token
    ///
    /// When `owner` is `None` the login of the token's user is used.
    pub async fn new(token: impl Into<String>, owner: Option<String>) -> Result<Self> {
        Self::build(token.into(), owner, None).await
    }

    async fn build(token: String, owner: Option<String>, base_uri: Option<&str>) -> Result<Self> {
        let mut builder = Octocrab::builder().personal_token(token.clone());
        if let Some(base_uri) = base_uri {
            builder = builder
                .base_uri(base_uri)
                .map_err(|e| Error::Other(format!("Invalid GitHub API URL '{}': {}", base_uri, e)))?;
        }
        let client = builder
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create GitHub client: {}", e)))?;

        let owner = match owner {
            Some(owner) => owner,
            None => current_login(&client).await?,
        };

        info!(owner = %owner, "Created GitHub client");

        Ok(Self {
            client,
            owner,
            token,
        })
    }

    /// Create a client with the token from secrets
    ///
    /// Token is loaded from (in priority order):
    /// 1. GITHUB_TOKEN environment variable
    /// 2. ~/.config/pagewright/secrets.toml
    pub async fn from_secrets(secrets: &Secrets, owner: Option<String>) -> Result<Self> {
        let token = secrets.github_token().ok_or_else(|| {
            Error::Auth(
                "GitHub token not found. Set GITHUB_TOKEN environment variable \
                 or add token to ~/.config/pagewright/secrets.toml"
                    .to_string(),
            )
        })?;

        Self::new(token, owner).await
    }

    /// Get the account owning created repositories
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Get the token, for authenticating git pushes
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Check the token by fetching the authenticated user
    pub async fn verify_credentials(&self) -> Result<String> {
        let login = current_login(&self.client).await?;
        info!(login = %login, "GitHub connection successful");
        Ok(login)
    }

    /// Create a public, empty repository for the authenticated user
    pub async fn create_repo(&self, name: &str, description: &str) -> Result<()> {
        debug!(repo = name, "Creating GitHub repository");

        let body = CreateRepoRequest {
            name,
            description,
            private: false,
            auto_init: false,
        };

        self.client
            .post::<_, serde_json::Value>("/user/repos", Some(&body))
            .await
            .map_err(|e| {
                let text = error_text(&e);
                if text.contains("already exists") {
                    Error::RepoExists(format!("{}/{}", self.owner, name))
                } else {
                    Error::Api(e)
                }
            })?;

        info!(owner = %self.owner, repo = name, "Created GitHub repository");
        Ok(())
    }

    /// Turn on Pages for `branch` at the repository root
    ///
    /// Returns the site URL GitHub reports, or `None` when Pages was
    /// already enabled.
    pub async fn enable_pages(&self, name: &str, branch: &str) -> Result<Option<String>> {
        let route = format!("/repos/{}/{}/pages", self.owner, name);
        let body = json!({
            "source": {
                "branch": branch,
                "path": "/",
            }
        });

        match self
            .client
            .post::<_, serde_json::Value>(route, Some(&body))
            .await
        {
            Ok(response) => {
                let url = response
                    .get("html_url")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                info!(repo = name, url = ?url, "Enabled GitHub Pages");
                Ok(url)
            }
            Err(e) if error_text(&e).contains("already enabled") => {
                debug!(repo = name, "GitHub Pages already enabled");
                Ok(None)
            }
            Err(e) => Err(Error::Api(e)),
        }
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

async fn current_login(client: &Octocrab) -> Result<String> {
    let user = client.current().user().await.map_err(|e| match e {
        octocrab::Error::GitHub { ref source, .. } if source.message.contains("Bad credentials") => {
            Error::Auth("Invalid GitHub token".to_string())
        }
        other => Error::Api(other),
    })?;
    Ok(user.login)
}

/// Flatten a GitHub error body into one searchable string
fn error_text(err: &octocrab::Error) -> String {
    match err {
        octocrab::Error::GitHub { source, .. } => {
            let mut text = source.message.clone();
            for detail in source.errors.iter().flatten() {
                text.push_str("; ");
                match detail.get("message").and_then(|m| m.as_str()) {
                    Some(message) => text.push_str(message),
                    None => text.push_str(&detail.to_string()),
                }
            }
            text
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer every request with the same status and JSON body
    async fn fixed_api(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_explicit_owner_skips_login_lookup() {
        let api = fixed_api("500 Internal Server Error", r#"{"message": "boom"}"#).await;
        let client = GitHubClient::build("t0ken".to_string(), Some("octo".to_string()), Some(&api))
            .await
            .unwrap();
        assert_eq!(client.owner(), "octo");
        assert_eq!(client.token(), "t0ken");
    }

    #[tokio::test]
    async fn test_bad_token_fails_verification() {
        let api = fixed_api(
            "401 Unauthorized",
            r#"{"message": "Bad credentials", "documentation_url": "https://docs.github.com/rest"}"#,
        )
        .await;
        let client = GitHubClient::build("expired".to_string(), Some("octo".to_string()), Some(&api))
            .await
            .unwrap();

        let err = client.verify_credentials().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)), "unexpected error: {}", err);

        // without an owner the same lookup happens at construction
        let err = GitHubClient::build("expired".to_string(), None, Some(&api))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)), "unexpected error: {}", err);
    }
}
