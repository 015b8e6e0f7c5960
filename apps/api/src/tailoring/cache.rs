//! Rewrite Cache — content-addressed store of rewritten bullet text.
//!
//! Keys are SHA-256 digests of (normalized bullet text, job digest, language), so
//! they are stable across restarts and backends. Only successful rewrites are
//! ever stored; the orchestrator owns that rule.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::llm_client::TokenUsage;
use crate::models::job::JobSpec;

const FIELD_SEPARATOR: u8 = 0x1f;
const REDIS_KEY_PREFIX: &str = "tailor:rewrite:";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Collapses runs of whitespace and trims, so formatting-only edits share a key.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hex SHA-256 of the parts of a job that shape a rewrite.
pub fn job_digest(job: &JobSpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(&job.description).as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(normalize_text(job.title.as_deref().unwrap_or_default()).as_bytes());
    hasher.update([FIELD_SEPARATOR]);

    let mut skills: Vec<String> = job
        .required_skills
        .iter()
        .map(|s| normalize_text(s).to_lowercase())
        .collect();
    skills.sort();
    skills.dedup();
    hasher.update(skills.join("\u{1e}").as_bytes());

    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(bullet_text: &str, job_digest: &str, language: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_text(bullet_text).as_bytes());
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(job_digest.as_bytes());
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(language.trim().to_lowercase().as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub usage: TokenUsage,
}

impl CacheEntry {
    pub fn new(text: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            text: text.into(),
            created_at: Utc::now(),
            usage,
        }
    }
}

/// Read-through store used by the rewrite orchestrator. Implementations synchronize
/// internally; duplicate writes for the same key are last-writer-wins.
#[async_trait]
pub trait RewriteCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;
    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError>;
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory backend
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryRewriteCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl InMemoryRewriteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RewriteCache for InMemoryRewriteCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(key.clone(), entry);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Redis backend
// ────────────────────────────────────────────────────────────────────────────

/// JSON values under `tailor:rewrite:<key>`, optionally expiring.
#[derive(Clone)]
pub struct RedisRewriteCache {
    client: redis::Client,
    ttl: Option<Duration>,
}

impl RedisRewriteCache {
    pub fn new(client: redis::Client, ttl: Option<Duration>) -> Self {
        Self { client, ttl }
    }

    fn redis_key(key: &CacheKey) -> String {
        format!("{REDIS_KEY_PREFIX}{}", key.as_str())
    }
}

#[async_trait]
impl RewriteCache for RedisRewriteCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(Self::redis_key(key)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        let json = serde_json::to_string(&entry)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(Self::redis_key(key)).arg(json);
        if let Some(ttl) = self.ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        cmd.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}
