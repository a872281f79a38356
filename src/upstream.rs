use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;

// ─── Request Types ──────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Fixed sampling settings attached to every upstream call of one endpoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Body of a `chat/completions` call. Messages are kept as raw JSON so the
/// relay can forward caller turns without reshaping them.
#[derive(Serialize, Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Value>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Value>, params: GenerationParams) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        }
    }

    pub fn from_turns(
        model: impl Into<String>,
        turns: &[ConversationTurn],
        params: GenerationParams,
    ) -> Result<Self, serde_json::Error> {
        let messages = turns
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(model, messages, params))
    }
}

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("error sending request to {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("upstream body could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),
}

// ─── Client ─────────────────────────────────────────────────────────────────

/// An OpenAI-compatible completion endpoint.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one completion request and return the upstream JSON body as-is.
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, UpstreamError>;
}

pub struct OpenRouterClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, UpstreamError> {
        tracing::debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            messages = request.messages.len(),
            "sending completion request"
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        resp.json::<Value>().await.map_err(UpstreamError::Decode)
    }
}

/// Run `client.complete`, failing with [`UpstreamError::Timeout`] once `limit`
/// elapses. Dropping the returned future cancels the in-flight call.
pub async fn complete_within(
    client: &dyn CompletionClient,
    request: &CompletionRequest,
    limit: Duration,
) -> Result<Value, UpstreamError> {
    tokio::time::timeout(limit, client.complete(request))
        .await
        .map_err(|_| UpstreamError::Timeout(limit))?
}

/// Pull `choices[0].message.content` out of a completion envelope.
/// Blank content counts as missing.
pub fn completion_text(response: &Value) -> Option<&str> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PARAMS: GenerationParams = GenerationParams {
        temperature: 0.4,
        max_tokens: 1500,
    };

    #[test]
    fn request_serializes_to_openai_shape() {
        let turns = [
            ConversationTurn::system("be brief"),
            ConversationTurn::user("hello"),
        ];
        let req = CompletionRequest::from_turns("gpt-3.5-turbo", &turns, PARAMS).unwrap();
        let body = serde_json::to_value(&req).unwrap();

        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["max_tokens"], 1500);
        assert_eq!(
            body["messages"],
            json!([
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "hello" }
            ])
        );
        assert!((body["temperature"].as_f64().unwrap() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn raw_messages_are_forwarded_untouched() {
        let messages = vec![json!({ "role": "user", "content": "hi", "name": "extra" })];
        let req = CompletionRequest::new("m", messages.clone(), PARAMS);
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["messages"], Value::Array(messages));
    }

    #[test]
    fn completion_text_reads_first_choice() {
        let envelope = json!({
            "choices": [
                { "message": { "role": "assistant", "content": "first" } },
                { "message": { "role": "assistant", "content": "second" } }
            ]
        });
        assert_eq!(completion_text(&envelope), Some("first"));
    }

    #[test]
    fn completion_text_rejects_missing_or_blank() {
        assert_eq!(completion_text(&json!({})), None);
        assert_eq!(completion_text(&json!({ "choices": [] })), None);
        assert_eq!(
            completion_text(&json!({ "choices": [{ "message": { "content": null } }] })),
            None
        );
        assert_eq!(
            completion_text(&json!({ "choices": [{ "message": { "content": "  \n" } }] })),
            None
        );
    }

    struct Sleepy;

    #[async_trait]
    impl CompletionClient for Sleepy {
        async fn complete(&self, _request: &CompletionRequest) -> Result<Value, UpstreamError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let req = CompletionRequest::new("m", Vec::new(), PARAMS);
        let err = complete_within(&Sleepy, &req, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout(_)));
    }
}
