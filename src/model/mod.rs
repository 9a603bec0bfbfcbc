//! Model abstraction: one query contract with three implementations.
//!
//! - [`live::LiveModel`] talks to an OpenAI-compatible chat-completions endpoint.
//! - [`caching::CachingModel`] wraps any model and persists results per fingerprint.
//! - [`replay::ReplayModel`] answers from the prompt records of an earlier run.

pub mod caching;
pub mod live;
pub mod replay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

pub const DEFAULT_TOP_P: f64 = 1.0;

/// Token accounting reported by the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Completions returned for one prompt. Order is the order of the
/// endpoint's choices with repeated texts removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub completions: Vec<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl QueryResult {
    pub fn new(choices: impl IntoIterator<Item = String>, usage: Usage) -> Self {
        let mut completions: Vec<String> = Vec::new();
        for choice in choices {
            if !completions.contains(&choice) {
                completions.push(choice);
            }
        }
        Self { completions, usage }
    }
}

/// Per-request overrides of the model's sampling parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Provider routing preference, forwarded as `provider.order`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_order: Option<Vec<String>>,
}

/// Sampling parameters actually sent for a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveOptions {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl EffectiveOptions {
    pub fn resolve(model: &dyn Model, options: &PostOptions) -> Self {
        Self {
            max_tokens: options.max_tokens.unwrap_or_else(|| model.max_tokens()),
            temperature: options.temperature.unwrap_or_else(|| model.temperature()),
            top_p: options.top_p.unwrap_or(DEFAULT_TOP_P),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureCounter {
    pub nr_retries: u32,
    pub nr_failures: u32,
}

/// A model that can be queried for completions of a prompt.
#[async_trait]
pub trait Model: Send + Sync {
    async fn query(&self, prompt: &str, options: &PostOptions) -> Result<QueryResult, ModelError>;

    fn model_name(&self) -> &str;

    fn temperature(&self) -> f64;

    fn max_tokens(&self) -> u32;

    fn failure_counter(&self) -> FailureCounter;

    /// Request context sent with every prompt besides the prompt itself,
    /// e.g. a system prompt. Part of the cache key.
    fn fingerprint_context(&self) -> &str {
        ""
    }
}

#[async_trait]
impl<M: Model + ?Sized> Model for Box<M> {
    async fn query(&self, prompt: &str, options: &PostOptions) -> Result<QueryResult, ModelError> {
        (**self).query(prompt, options).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn temperature(&self) -> f64 {
        (**self).temperature()
    }

    fn max_tokens(&self) -> u32 {
        (**self).max_tokens()
    }

    fn failure_counter(&self) -> FailureCounter {
        (**self).failure_counter()
    }

    fn fingerprint_context(&self) -> &str {
        (**self).fingerprint_context()
    }
}
