//! Site content generation via a chat-completions model

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;
use crate::task::{Attachment, FileSet, GeneratedFile};
use crate::{Error, Result};

const SYSTEM_PROMPT: &str = "You are a code generator that outputs only JSON file lists.";

/// Everything the generator is told about one task round
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub repo_name: String,
    pub brief: String,
    pub attachments: Vec<Attachment>,
    pub checks: Vec<String>,
    pub round: u32,
}

/// Produces the files of a static web app from a task description
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<FileSet>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    path: String,
    content: String,
}

/// Generator backed by an OpenAI-compatible chat completions endpoint
#[derive(Clone)]
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for ChatCompletionsGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsGenerator")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsGenerator {
    pub fn from_config(config: &GeneratorConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            api_key,
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_secs(2),
        })
    }

    /// Override the pause between failed attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn request_once(&self, prompt: &str) -> Result<FileSet> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
        };

        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Generation(format!("LLM request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "LLM API error {}: {}",
                status.as_u16(),
                truncate(&text, 300)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("Malformed LLM response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Generation("LLM response has no choices".to_string()))?;

        parse_file_list(&content)
    }
}

#[async_trait]
impl ContentGenerator for ChatCompletionsGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<FileSet> {
        info!(repo = %request.repo_name, round = request.round, "Generating app");
        let prompt = build_prompt(request);
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.request_once(&prompt).await {
                Ok(files) => {
                    info!(repo = %request.repo_name, files = files.len(), attempt, "Generated files");
                    return Ok(files);
                }
                Err(e) => {
                    warn!(repo = %request.repo_name, attempt, error = %e, "Generation attempt failed");
                    last_error = Some(e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Generation("No generation attempts were made".to_string())))
    }
}

/// Prompt asking for a JSON array of `{path, content}` objects
pub fn build_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::new();

    if request.round <= 1 {
        prompt.push_str(&format!(
            "You are a code generator. Generate a minimal static web app for {} based on the following brief:\n",
            request.repo_name
        ));
    } else {
        prompt.push_str(&format!(
            "You are a code generator. This is round {} for {}: revise the existing static web app according to the following brief. \
             Return every file that must change, with its complete new content:\n",
            request.round, request.repo_name
        ));
    }
    prompt.push_str(&request.brief);
    prompt.push_str("\n\n");

    if !request.checks.is_empty() {
        prompt.push_str("The app will be evaluated against these checks:\n");
        for check in &request.checks {
            prompt.push_str(&format!("- {}\n", check));
        }
        prompt.push('\n');
    }

    if !request.attachments.is_empty() {
        prompt.push_str("Attachments:\n");
        for attachment in &request.attachments {
            prompt.push_str(&format!(
                "- {}: {}\n",
                attachment.name,
                truncate(&attachment.url, 2000)
            ));
        }
        prompt.push('\n');
    }

    prompt.push_str(
        r#"Output **only a JSON array of files** with `path` and `content`. Example:

[
  {"path": "index.html", "content": "<html>...</html>"},
  {"path": "script.js", "content": "console.log('Hello')"},
  {"path": "styles.css", "content": "body { font-family: sans-serif; }"}
]

Return only valid JSON. Do not add any extra text.
"#,
    );

    prompt
}

/// Parse the model's reply into a file set
///
/// Accepts the bare JSON array or one wrapped in a markdown code fence.
pub fn parse_file_list(content: &str) -> Result<FileSet> {
    let json = strip_code_fence(content);

    let raw: Vec<RawFile> = serde_json::from_str(json)
        .map_err(|e| Error::Generation(format!("LLM did not return a valid JSON file list: {}", e)))?;

    if raw.is_empty() {
        return Err(Error::Generation("LLM returned no files".to_string()));
    }

    let mut files = FileSet::default();
    for file in raw {
        let path = file.path.trim();
        if path.is_empty() {
            return Err(Error::Generation("LLM returned a file without a path".to_string()));
        }
        files.push(GeneratedFile::new(path, file.content));
    }

    debug!(files = files.len(), "Parsed generated file list");
    Ok(files)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // drop the info string (e.g. "json") on the opening fence line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };

    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(round: u32) -> GenerationRequest {
        GenerationRequest {
            repo_name: "T1-1".to_string(),
            brief: "a counter app".to_string(),
            attachments: vec![Attachment {
                name: "sample.csv".to_string(),
                url: "data:text/csv;base64,YSxiCjEsMgo=".to_string(),
            }],
            checks: vec!["Page has a button".to_string()],
            round,
        }
    }

    #[test]
    fn test_parse_bare_array() {
        let files =
            parse_file_list(r#"[{"path": "index.html", "content": "<h1>Hi</h1>"}]"#).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files.files()[0].path, "index.html");
        assert_eq!(files.files()[0].content, b"<h1>Hi</h1>".to_vec());
    }

    #[test]
    fn test_parse_fenced_array() {
        let reply = "```json\n[{\"path\": \"a.js\", \"content\": \"x\"}, {\"path\": \"b.css\", \"content\": \"y\"}]\n```\n";
        let files = parse_file_list(reply).unwrap();
        assert_eq!(files.paths(), vec!["a.js", "b.css"]);
    }

    #[test]
    fn test_parse_rejects_malformed_output() {
        assert!(matches!(
            parse_file_list("Sure! Here is your app."),
            Err(Error::Generation(_))
        ));
        assert!(matches!(
            parse_file_list(r#"{"path": "a", "content": "b"}"#),
            Err(Error::Generation(_))
        ));
        assert!(matches!(parse_file_list("[]"), Err(Error::Generation(_))));
        assert!(matches!(
            parse_file_list(r#"[{"path": " ", "content": "b"}]"#),
            Err(Error::Generation(_))
        ));
    }

    #[test]
    fn test_prompt_for_first_round() {
        let prompt = build_prompt(&request(1));
        assert!(prompt.contains("Generate a minimal static web app for T1-1"));
        assert!(prompt.contains("a counter app"));
        assert!(prompt.contains("- Page has a button"));
        assert!(prompt.contains("- sample.csv: data:text/csv"));
        assert!(prompt.contains("JSON array of files"));
    }

    #[test]
    fn test_prompt_for_revision_round() {
        let prompt = build_prompt(&request(2));
        assert!(prompt.contains("round 2"));
        assert!(prompt.contains("revise the existing static web app"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_generation_error() {
        let config = GeneratorConfig {
            api_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            max_attempts: 2,
            connect_timeout: Duration::from_millis(200),
            timeout: Duration::from_millis(500),
            ..GeneratorConfig::default()
        };
        let generator = ChatCompletionsGenerator::from_config(&config, None)
            .unwrap()
            .with_retry_delay(Duration::ZERO);

        let err = generator.generate(&request(1)).await.unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }
}
