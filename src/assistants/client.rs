//! Assistants API client.
//!
//! Thin reqwest wrapper around the `/assistants` and `/threads` endpoints of
//! the Assistants v2 API.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::AssistantBackend;
use super::events::{RunEventStream, decode_run_events};
use super::types::{
    Assistant, CreateAssistantRequest, CreateMessageRequest, CreateRunRequest,
    SubmitToolOutputsRequest, Thread, ThreadMessage, ToolOutput,
};
use crate::config::OpenAiConfig;
use crate::error::RelayError;

const ASSISTANTS_BETA: &str = "assistants=v2";

/// Assistants API client
#[derive(Clone)]
pub struct AssistantsClient {
    api_key: SecretString,
    base_url: String,
    organization: Option<String>,
    project: Option<String>,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for AssistantsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug_struct = f.debug_struct("AssistantsClient");
        debug_struct.field("base_url", &self.base_url);
        // never show the actual values
        if self.organization.is_some() {
            debug_struct.field("has_organization", &true);
        }
        if self.project.is_some() {
            debug_struct.field("has_project", &true);
        }
        debug_struct.finish()
    }
}

impl AssistantsClient {
    /// Creates a new client with configuration and HTTP client
    pub fn new(config: OpenAiConfig, http_client: reqwest::Client) -> Self {
        Self {
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            organization: config.organization,
            project: config.project,
            http_client,
        }
    }

    /// Creates a new client, building the HTTP client from the configuration
    pub fn from_config(config: OpenAiConfig) -> Result<Self, RelayError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| RelayError::ConfigurationError(format!("HTTP client: {e}")))?;
        Ok(Self::new(config, http_client))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_headers(&self, stream: bool) -> Result<HeaderMap, RelayError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", self.api_key.expose_secret());
        let mut auth = HeaderValue::from_str(&bearer)
            .map_err(|e| RelayError::ConfigurationError(format!("Invalid API key: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("OpenAI-Beta", HeaderValue::from_static(ASSISTANTS_BETA));
        if stream {
            headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        }
        if let Some(org) = &self.organization {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(org).map_err(|e| {
                    RelayError::ConfigurationError(format!("Invalid organization: {e}"))
                })?,
            );
        }
        if let Some(project) = &self.project {
            headers.insert(
                "OpenAI-Project",
                HeaderValue::from_str(project)
                    .map_err(|e| RelayError::ConfigurationError(format!("Invalid project: {e}")))?,
            );
        }
        Ok(headers)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        stream: bool,
    ) -> Result<reqwest::Response, RelayError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, stream, "assistants request");
        let response = self
            .http_client
            .post(&url)
            .headers(self.build_headers(stream)?)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, RelayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(path, body, false).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            RelayError::ParseError(format!("Failed to parse response from {path}: {e}"))
        })
    }

    async fn post_stream<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<RunEventStream, RelayError> {
        let response = self.send(path, body, true).await?;
        let bytes = response.bytes_stream().map(|chunk| chunk.map_err(RelayError::from));
        Ok(decode_run_events(bytes))
    }
}

/// Turn a non-success response into an `ApiError`, keeping the remote message.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RelayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let details = serde_json::from_str::<serde_json::Value>(&text).ok();
    let message = details
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.to_string()
            } else {
                text.clone()
            }
        });

    Err(RelayError::ApiError {
        code: status.as_u16(),
        message,
        details,
    })
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[async_trait]
impl AssistantBackend for AssistantsClient {
    async fn create_assistant(
        &self,
        request: &CreateAssistantRequest,
    ) -> Result<Assistant, RelayError> {
        self.post_json("/assistants", request).await
    }

    async fn create_thread(&self) -> Result<Thread, RelayError> {
        self.post_json("/threads", &serde_json::json!({})).await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<ThreadMessage, RelayError> {
        let path = format!("/threads/{}/messages", segment(thread_id));
        self.post_json(&path, &CreateMessageRequest::user(content))
            .await
    }

    async fn stream_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<RunEventStream, RelayError> {
        let path = format!("/threads/{}/runs", segment(thread_id));
        let body = CreateRunRequest {
            assistant_id: assistant_id.to_string(),
            stream: true,
        };
        self.post_stream(&path, &body).await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        tool_outputs: Vec<ToolOutput>,
    ) -> Result<RunEventStream, RelayError> {
        let path = format!(
            "/threads/{}/runs/{}/submit_tool_outputs",
            segment(thread_id),
            segment(run_id)
        );
        let body = SubmitToolOutputsRequest {
            tool_outputs,
            stream: true,
        };
        self.post_stream(&path, &body).await
    }
}
