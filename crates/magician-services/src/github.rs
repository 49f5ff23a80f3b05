//! GitHub review platform client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use magician_core::{BuildState, ReviewTarget};

use crate::error::{ServiceError, ServiceResult};
use crate::traits::ReviewPlatform;

/// GitHub connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub token: String,
    pub retry: RetryConfig,
}

impl GithubConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            owner: "GoogleCloudPlatform".to_string(),
            repo: "magic-modules".to_string(),
            token: token.into(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Exponential backoff for transient API failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub retry_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 5_000,
            max_backoff_ms: 60_000,
            retry_status_codes: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let ms = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    state: &'a str,
    target_url: &'a str,
    context: &'a str,
}

pub struct GithubClient {
    config: GithubConfig,
    http: reqwest::Client,
}

impl GithubClient {
    pub fn new(config: GithubConfig) -> ServiceResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("magician/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, http })
    }

    pub fn comments_url(&self, number: &str) -> String {
        format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.config.api_url, self.config.owner, self.config.repo, number
        )
    }

    pub fn statuses_url(&self, sha: &str) -> String {
        format!(
            "{}/repos/{}/{}/statuses/{}",
            self.config.api_url, self.config.owner, self.config.repo, sha
        )
    }

    async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> ServiceResult<()> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            let result = self
                .http
                .post(url)
                .bearer_auth(&self.config.token)
                .header("Accept", "application/json")
                .json(body)
                .send()
                .await;

            let retryable = match result {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    let err = ServiceError::Api {
                        service: "GitHub".to_string(),
                        status,
                        body,
                    };
                    if !retry.retry_status_codes.contains(&status) {
                        return Err(err);
                    }
                    err
                }
                Err(e) => ServiceError::Http(e),
            };

            if attempt >= retry.max_retries {
                return Err(retryable);
            }
            let backoff = retry.backoff(attempt);
            warn!(url, attempt = attempt + 1, error = %retryable, ?backoff, "retrying GitHub request");
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl ReviewPlatform for GithubClient {
    async fn post_report(&self, target: &ReviewTarget, text: &str) -> ServiceResult<()> {
        self.post_json(&self.comments_url(&target.number), &CommentBody { body: text })
            .await?;
        info!(pr = %target.number, "posted comment");
        Ok(())
    }

    async fn post_status(
        &self,
        target: &ReviewTarget,
        check: &str,
        state: BuildState,
        target_url: &str,
    ) -> ServiceResult<()> {
        let body = StatusBody {
            state: state.as_str(),
            target_url,
            context: check,
        };
        self.post_json(&self.statuses_url(&target.commit_sha), &body)
            .await?;
        info!(pr = %target.number, sha = %target.commit_sha, state = state.as_str(), "posted build status");
        Ok(())
    }
}
