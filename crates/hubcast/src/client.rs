//! HTTP client for the hub API.

use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::error::{HubError, Result};
use crate::types::{
    AcknowledgeRequest, AcknowledgeResponse, AgentActivityInfo, AgentActivityResponse, ApiResponse,
    Message, MessageBatch, PostMessageRequest,
};

const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7910";
const RETRY_BACKOFFS_MS: [u64; 3] = [200, 400, 800];

/// Options for creating a hub client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The API token for authentication.
    pub token: String,
    /// The base URL for the hub (defaults to http://127.0.0.1:7910).
    pub base_url: Option<String>,
}

impl ClientOptions {
    /// Create new client options with the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: None,
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// HTTP client for the hub's message, poll and catch-up surfaces.
#[derive(Debug, Clone)]
pub struct HubClient {
    client: Client,
    token: String,
    base_url: String,
}

impl HubClient {
    /// Create a new hub client with the given options.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            token: options.token,
            base_url: options
                .base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    /// Get the API token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make a request to the API, retrying 5xx responses on a fixed backoff
    /// ladder.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<impl Serialize>,
        query: Option<&[(&str, &str)]>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        for (attempt, backoff) in RETRY_BACKOFFS_MS.iter().enumerate() {
            let mut request = self.build_request(method.clone(), &url);

            if let Some(ref q) = query {
                request = request.query(q);
            }

            if let Some(ref b) = body {
                request = request.json(b);
            }

            let response = request.send().await?;
            let status = response.status().as_u16();

            if (500..=599).contains(&status) && attempt < RETRY_BACKOFFS_MS.len() {
                tokio::time::sleep(Duration::from_millis(*backoff)).await;
                continue;
            }

            let json: ApiResponse<T> = response.json().await?;

            if !json.ok {
                let error = json.error.unwrap_or_else(|| crate::types::ApiErrorInfo {
                    code: "unknown_error".to_string(),
                    message: "Unknown error".to_string(),
                });
                return Err(HubError::api(error.code, error.message, status));
            }

            return json
                .data
                .ok_or_else(|| HubError::InvalidResponse("Response missing data field".to_string()));
        }

        Err(HubError::InvalidResponse(
            "Max retries exceeded".to_string(),
        ))
    }

    fn build_request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("X-SDK-Version", SDK_VERSION)
    }

    // === Write path ===

    /// Persist a message; the hub fans it out to live viewers before replying.
    pub async fn post_message(
        &self,
        workspace_id: &str,
        request: &PostMessageRequest,
    ) -> Result<Message> {
        self.request(
            Method::POST,
            &format!(
                "/v1/workspaces/{}/messages",
                urlencoding::encode(workspace_id)
            ),
            Some(request),
            None,
        )
        .await
    }

    // === Catch-up surface ===

    /// List messages strictly after `after_id`, ascending. Pure read; calling
    /// twice with the same cursor returns the same result.
    pub async fn list_since(
        &self,
        workspace_id: &str,
        after_id: i64,
        limit: Option<usize>,
    ) -> Result<MessageBatch> {
        let after = after_id.to_string();
        let limit_str = limit.map(|l| l.to_string());
        let mut query: Vec<(&str, &str)> = vec![("after_id", after.as_str())];
        if let Some(ref l) = limit_str {
            query.push(("limit", l.as_str()));
        }

        self.request(
            Method::GET,
            &format!(
                "/v1/workspaces/{}/messages",
                urlencoding::encode(workspace_id)
            ),
            None::<()>,
            Some(&query),
        )
        .await
    }

    // === Poll surface ===

    /// Messages with no seen-mark for `consumer`, excluding the consumer's
    /// own messages, ascending.
    pub async fn list_unseen(&self, workspace_id: &str, consumer: &str) -> Result<Vec<Message>> {
        self.request(
            Method::GET,
            &format!(
                "/v1/workspaces/{}/messages/unseen",
                urlencoding::encode(workspace_id)
            ),
            None::<()>,
            Some(&[("consumer", consumer)]),
        )
        .await
    }

    /// Idempotent acknowledgment; re-acknowledging already-seen ids succeeds.
    pub async fn acknowledge(
        &self,
        workspace_id: &str,
        message_ids: &[i64],
        consumer: &str,
    ) -> Result<AcknowledgeResponse> {
        self.request(
            Method::POST,
            &format!(
                "/v1/workspaces/{}/messages/acknowledge",
                urlencoding::encode(workspace_id)
            ),
            Some(&AcknowledgeRequest {
                message_ids: message_ids.to_vec(),
                consumer: consumer.to_string(),
            }),
            None,
        )
        .await
    }

    /// Last poll-surface activity for the workspace's agent side, if any.
    pub async fn agent_activity(&self, workspace_id: &str) -> Result<Option<AgentActivityInfo>> {
        let response: AgentActivityResponse = self
            .request(
                Method::GET,
                &format!(
                    "/v1/workspaces/{}/agent-activity",
                    urlencoding::encode(workspace_id)
                ),
                None::<()>,
                None,
            )
            .await?;
        Ok(response.activity)
    }
}
