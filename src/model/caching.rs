use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{EffectiveOptions, FailureCounter, Model, PostOptions, QueryResult};
use crate::error::ModelError;

/// Fields that determine a cached answer.
#[derive(Serialize)]
struct FingerprintInput<'a> {
    model: &'a str,
    system_prompt: &'a str,
    prompt: &'a str,
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
}

/// Cache key for a prompt sent to `model` with `options`.
pub fn fingerprint(model: &dyn Model, prompt: &str, options: &PostOptions) -> String {
    let effective = EffectiveOptions::resolve(model, options);
    let input = FingerprintInput {
        model: model.model_name(),
        system_prompt: model.fingerprint_context(),
        prompt,
        temperature: effective.temperature,
        max_tokens: effective.max_tokens,
        top_p: effective.top_p,
    };
    let canonical = serde_json::to_vec(&input).unwrap_or_else(|_| prompt.as_bytes().to_vec());
    hex::encode(Sha256::digest(&canonical))
}

/// One stored answer. Prompt and options are kept for inspection only.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    fingerprint: String,
    model: String,
    prompt: String,
    options: PostOptions,
    result: QueryResult,
}

/// Wraps a model and stores each successful answer in `<dir>/<fp[..2]>/<fp>.json`.
pub struct CachingModel<M> {
    inner: M,
    dir: PathBuf,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<M: Model> CachingModel<M> {
    pub fn new(inner: M, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: dir.into(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, fingerprint: &str) -> PathBuf {
        let shard = fingerprint.get(..2).unwrap_or("xx");
        self.dir.join(shard).join(format!("{fingerprint}.json"))
    }

    fn lookup(&self, fingerprint: &str) -> Option<QueryResult> {
        let path = self.entry_path(fingerprint);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(_) => return None,
        };
        match serde_json::from_str::<CacheEntry>(&data) {
            Ok(entry) if entry.fingerprint == fingerprint => Some(entry.result),
            Ok(_) => {
                tracing::warn!(path = %path.display(), "cache entry has wrong fingerprint, ignoring");
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt cache entry, ignoring");
                None
            }
        }
    }

    /// Write through a temp file in the same directory, then rename, so a
    /// reader never sees a partial entry.
    fn store(&self, entry: &CacheEntry) -> std::io::Result<()> {
        let path = self.entry_path(&entry.fingerprint);
        let parent = path.parent().unwrap_or(&self.dir);
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut tmp, entry)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, fingerprint: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.slots().entry(fingerprint.to_string()).or_default().clone()
    }

    /// Drop the slot once no other query holds or waits on it.
    fn release(&self, fingerprint: &str, slot: Arc<tokio::sync::Mutex<()>>) {
        let mut slots = self.slots();
        drop(slot);
        if slots.get(fingerprint).is_some_and(|s| Arc::strong_count(s) == 1) {
            slots.remove(fingerprint);
        }
    }

    async fn lookup_or_query(
        &self,
        fp: &str,
        prompt: &str,
        options: &PostOptions,
    ) -> Result<QueryResult, ModelError> {
        if let Some(result) = self.lookup(fp) {
            tracing::debug!(fingerprint = %fp, "cache hit");
            return Ok(result);
        }

        tracing::debug!(fingerprint = %fp, "cache miss");
        let result = self.inner.query(prompt, options).await?;
        let entry = CacheEntry {
            fingerprint: fp.to_string(),
            model: self.inner.model_name().to_string(),
            prompt: prompt.to_string(),
            options: options.clone(),
            result,
        };
        if let Err(e) = self.store(&entry) {
            tracing::warn!(fingerprint = %entry.fingerprint, error = %e, "failed to write cache entry");
        }
        Ok(entry.result)
    }
}

#[async_trait]
impl<M: Model> Model for CachingModel<M> {
    async fn query(&self, prompt: &str, options: &PostOptions) -> Result<QueryResult, ModelError> {
        let fp = fingerprint(&self.inner, prompt, options);
        let slot = self.slot(&fp);
        let result = {
            let _guard = slot.lock().await;
            self.lookup_or_query(&fp, prompt, options).await
        };
        self.release(&fp, slot);
        result
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn temperature(&self) -> f64 {
        self.inner.temperature()
    }

    fn max_tokens(&self) -> u32 {
        self.inner.max_tokens()
    }

    fn failure_counter(&self) -> FailureCounter {
        self.inner.failure_counter()
    }

    fn fingerprint_context(&self) -> &str {
        self.inner.fingerprint_context()
    }
}
