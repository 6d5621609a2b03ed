/// LLM Client — the single point of entry for chat completion and embedding calls.
///
/// ARCHITECTURAL RULE: No other module may call the provider API directly.
/// Services depend on the `ChatModel` / `EmbeddingModel` traits; `LlmClient`
/// is the production implementation of both.
///
/// Speaks the OpenAI-compatible `/chat/completions` and `/embeddings` endpoints.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LlmConfig;

const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT_SECS: u64 = 120;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Embedding count mismatch: sent {sent}, received {received}")]
    EmbeddingCount { sent: usize, received: usize },
}

/// Chat completion seam. Services hold an `Arc<dyn ChatModel>`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Sends one system + user turn and returns the assistant text.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;
}

/// Embedding seam. Services hold an `Arc<dyn EmbeddingModel>`.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embeds every input, preserving input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// The LLM client shared by all services.
/// Wraps the provider API with retry logic.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    temperature: f32,
    embedding_model: String,
    retry_base_delay: Duration,
}

/// Delay before retry number `attempt` (1-based): base, 2×base, 4×base...
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * (1 << attempt.saturating_sub(1))
}

impl LlmClient {
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()?,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            temperature: config.temperature,
            embedding_model: config.embedding_model.clone(),
            retry_base_delay: RETRY_BASE_DELAY,
        })
    }

    #[cfg(test)]
    fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// POSTs a JSON body to `{base_url}/{path}`.
    /// Retries on 429 (rate limit), 5xx and transport errors with exponential backoff.
    async fn post_with_retry<B, T>(&self, path: &str, body: &B) -> Result<T, LlmError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_url, path);
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = backoff_delay(self.retry_base_delay, attempt);
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: provider_message(body),
                });
            }

            return Ok(response.json::<T>().await?);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.chat_model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response: ChatResponse = self.post_with_retry("chat/completions", &request).await?;

        if let Some(usage) = &response.usage {
            debug!(
                "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyContent)
    }

    fn model_name(&self) -> &str {
        &self.chat_model
    }
}

#[async_trait]
impl EmbeddingModel for LlmClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let response: EmbeddingResponse = self.post_with_retry("embeddings", &request).await?;

        order_embeddings(response.data, texts.len())
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }
}

/// Extracts the provider's error message, falling back to the raw body.
fn provider_message(body: String) -> String {
    serde_json::from_str::<ProviderError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

/// Puts embeddings back into request order and checks nothing went missing.
fn order_embeddings(mut data: Vec<EmbeddingData>, sent: usize) -> Result<Vec<Vec<f32>>, LlmError> {
    if data.len() != sent {
        return Err(LlmError::EmbeddingCount {
            sent,
            received: data.len(),
        });
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[cfg(test)]
pub mod testing {
    //! Deterministic stand-ins for the provider, shared by tests across modules.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Returns canned replies in order; repeats the last one when exhausted.
    pub struct ScriptedChat {
        replies: Mutex<Vec<Result<String, String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedChat {
        pub fn replying(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                replies: Mutex::new(vec![Err("provider down".to_string())]),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies.first().cloned().unwrap_or(Err("no reply".to_string()))
            };
            reply.map_err(|message| LlmError::Api {
                status: 503,
                message,
            })
        }

        fn model_name(&self) -> &str {
            "scripted-chat"
        }
    }

    /// Maps known texts to fixed vectors; unknown texts get `fallback`.
    pub struct FixedEmbeddings {
        pub vectors: HashMap<String, Vec<f32>>,
        pub fallback: Option<Vec<f32>>,
    }

    impl FixedEmbeddings {
        pub fn new(fallback: Option<Vec<f32>>) -> Self {
            Self {
                vectors: HashMap::new(),
                fallback,
            }
        }

        pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
            self.vectors.insert(text.to_string(), vector);
            self
        }
    }

    #[async_trait]
    impl EmbeddingModel for FixedEmbeddings {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            texts
                .iter()
                .map(|t| {
                    self.vectors
                        .get(t)
                        .cloned()
                        .or_else(|| self.fallback.clone())
                        .ok_or(LlmError::EmptyContent)
                })
                .collect()
        }

        fn model_name(&self) -> &str {
            "fixed-embeddings"
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> LlmClient {
        let mut config = crate::config::Config::for_tests().llm;
        config.base_url = format!("{}/", server.uri());
        LlmClient::new("test-key".to_string(), &config)
            .unwrap()
            .with_retry_base_delay(Duration::from_millis(5))
    }

    fn chat_reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        }))
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.unwrap().len()
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_complete_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(chat_reply("Xin chào"))
            .mount(&server)
            .await;

        let reply = client(&server).complete("system", "hi").await.unwrap();
        assert_eq!(reply, "Xin chào");
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn test_complete_gives_up_after_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client(&server).complete("system", "hi").await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 429, .. }));
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"error": {"message": "invalid api key"}})),
            )
            .mount(&server)
            .await;

        let err = client(&server).complete("system", "hi").await.unwrap_err();
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid api key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(request_count(&server).await, 1);
    }

    #[tokio::test]
    async fn test_complete_without_choices_is_empty_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client(&server).complete("system", "hi").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
    }

    #[tokio::test]
    async fn test_embed_orders_by_index_and_checks_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [2.0]},
                    {"index": 0, "embedding": [1.0]}
                ]
            })))
            .mount(&server)
            .await;

        let llm = client(&server);
        let two = vec!["a".to_string(), "b".to_string()];
        assert_eq!(llm.embed(&two).await.unwrap(), vec![vec![1.0], vec![2.0]]);

        let three = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert!(matches!(
            llm.embed(&three).await,
            Err(LlmError::EmbeddingCount { sent: 3, received: 2 })
        ));
        assert!(llm.embed(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_provider_message_parses_error_body() {
        let body = r#"{"error": {"message": "invalid api key", "type": "auth"}}"#;
        assert_eq!(provider_message(body.to_string()), "invalid api key");
    }

    #[test]
    fn test_provider_message_falls_back_to_raw_body() {
        assert_eq!(provider_message("bad gateway".to_string()), "bad gateway");
    }

    #[test]
    fn test_order_embeddings_sorts_by_index() {
        let data = vec![
            EmbeddingData {
                index: 1,
                embedding: vec![2.0],
            },
            EmbeddingData {
                index: 0,
                embedding: vec![1.0],
            },
        ];
        assert_eq!(order_embeddings(data, 2).unwrap(), vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_order_embeddings_rejects_missing_items() {
        let data = vec![EmbeddingData {
            index: 0,
            embedding: vec![1.0],
        }];
        assert!(matches!(
            order_embeddings(data, 2),
            Err(LlmError::EmbeddingCount { sent: 2, received: 1 })
        ));
    }

    #[test]
    fn test_chat_response_deserializes() {
        let raw = r#"{
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Xin chào"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Xin chào"));
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 12);
    }
}
