use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EffectiveOptions, FailureCounter, Model, PostOptions, QueryResult, Usage};
use crate::config::{Config, ConfigError};
use crate::error::ModelError;
use crate::retry::{self, RateLimiter, RetryOutcome, Throttle};

pub const ENDPOINT_ENV: &str = "OPENAI_API_ENDPOINT";
pub const AUTH_HEADERS_ENV: &str = "OPENAI_AUTH_HEADERS";

const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Provider {
    pub order: Vec<String>,
}

/// Request body for a chat-completions endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// Sends one chat request. Separated from [`LiveModel`] so retry and
/// accounting can run against scripted transports.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ModelError>;
}

/// HTTP transport for an OpenAI-compatible endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: HashMap<String, String>,
}

impl HttpTransport {
    pub fn new(endpoint: &str, headers: HashMap<String, String>) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            headers,
        })
    }

    /// Endpoint and auth headers from `OPENAI_API_ENDPOINT` / `OPENAI_AUTH_HEADERS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint =
            std::env::var(ENDPOINT_ENV).map_err(|_| ConfigError::MissingEnv(ENDPOINT_ENV))?;
        let headers = match std::env::var(AUTH_HEADERS_ENV) {
            Ok(raw) if !raw.trim().is_empty() => parse_headers(&raw)?,
            _ => HashMap::new(),
        };
        Self::new(&endpoint, headers).map_err(|e| ConfigError::Unreadable {
            what: "endpoint",
            path: endpoint.clone(),
            reason: e.to_string(),
        })
    }
}

pub fn parse_headers(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    serde_json::from_str(raw).map_err(|_| ConfigError::BadHeaders(AUTH_HEADERS_ENV))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ModelError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ModelError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| ModelError::Decode(e.to_string()))
    }
}

/// A model backed by a live endpoint, with bounded retry and throttling.
pub struct LiveModel<T> {
    transport: T,
    model_name: String,
    system_prompt: String,
    defaults: PostOptions,
    nr_attempts: u32,
    limiter: RateLimiter,
    counter: Mutex<FailureCounter>,
}

impl<T: Transport> LiveModel<T> {
    pub fn new(transport: T, config: &Config, system_prompt: impl Into<String>) -> Self {
        Self {
            transport,
            model_name: config.model_name.clone(),
            system_prompt: system_prompt.into(),
            defaults: PostOptions {
                max_tokens: Some(config.max_tokens),
                temperature: Some(config.temperature),
                ..PostOptions::default()
            },
            nr_attempts: config.nr_attempts,
            limiter: RateLimiter::new(Throttle::from_config(config)),
            counter: Mutex::new(FailureCounter::default()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.limiter = RateLimiter::new(throttle);
        self
    }

    fn request(&self, prompt: &str, options: &PostOptions) -> ChatRequest {
        let effective = EffectiveOptions::resolve(self, options);
        ChatRequest {
            model: self.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: self.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: effective.max_tokens,
            temperature: effective.temperature,
            top_p: effective.top_p,
            provider: options
                .provider_order
                .clone()
                .map(|order| Provider { order }),
        }
    }

    fn record(&self, retries: u32, failed: bool) {
        let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        counter.nr_retries += retries;
        if failed {
            counter.nr_failures += 1;
        }
    }
}

#[async_trait]
impl<T: Transport> Model for LiveModel<T> {
    async fn query(&self, prompt: &str, options: &PostOptions) -> Result<QueryResult, ModelError> {
        let request = self.request(prompt, options);
        let outcome = retry::with_retry(self.nr_attempts, self.limiter.throttle(), |attempt| {
            let request = &request;
            async move {
                self.limiter.acquire().await;
                tracing::debug!(model = %self.model_name, attempt, "sending query");
                self.transport.send(request).await
            }
        })
        .await;

        match outcome {
            RetryOutcome::Success { value, retries } => {
                self.record(retries, false);
                let choices = value.choices.into_iter().map(|c| c.message.content);
                Ok(QueryResult::new(choices, value.usage.unwrap_or_default()))
            }
            RetryOutcome::Exhausted { attempts, last } => {
                self.record(attempts - 1, true);
                tracing::warn!(model = %self.model_name, attempts, error = %last, "query failed");
                Err(ModelError::Exhausted {
                    attempts,
                    last: Box::new(last),
                })
            }
            RetryOutcome::Aborted { retries, error } => {
                self.record(retries, true);
                Err(error)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn temperature(&self) -> f64 {
        self.defaults.temperature.unwrap_or_default()
    }

    fn max_tokens(&self) -> u32 {
        self.defaults.max_tokens.unwrap_or_default()
    }

    fn failure_counter(&self) -> FailureCounter {
        *self.counter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fingerprint_context(&self) -> &str {
        &self.system_prompt
    }
}
