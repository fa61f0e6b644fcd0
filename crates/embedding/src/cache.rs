use dashmap::DashMap;
use fxhash::hash64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::EmbeddingError;
use crate::provider::EmbeddingProvider;
use crate::types::TextEmbedding;

/// Cache key: hash of the input text plus the provider identity, so the same
/// sentence embedded by two different models never collides.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct CacheKey {
    text_hash: u64,
    identity: String,
}

struct CacheEntry {
    embedding: TextEmbedding,
    inserted_at: Instant,
}

/// Concurrent TTL cache for text embeddings.
///
/// Entries expire `ttl` after insertion (a zero TTL disables expiry). When
/// the cache is full, inserts evict expired entries first and otherwise drop
/// an arbitrary entry to stay under capacity.
pub struct EmbeddingCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(text: &str, identity: &str) -> CacheKey {
        CacheKey {
            text_hash: hash64(text.as_bytes()),
            identity: identity.to_string(),
        }
    }

    fn expired(&self, entry: &CacheEntry) -> bool {
        !self.ttl.is_zero() && entry.inserted_at.elapsed() > self.ttl
    }

    pub fn get(&self, text: &str, identity: &str) -> Option<TextEmbedding> {
        let key = Self::key(text, identity);
        let hit = match self.entries.get(&key) {
            Some(entry) if !self.expired(&entry) => Some(entry.embedding.clone()),
            Some(_) => {
                drop(self.entries.remove(&key));
                None
            }
            None => None,
        };
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    pub fn insert(&self, text: &str, identity: &str, embedding: TextEmbedding) {
        if self.entries.len() >= self.capacity {
            self.evict_one();
        }
        self.entries.insert(
            Self::key(text, identity),
            CacheEntry {
                embedding,
                inserted_at: Instant::now(),
            },
        );
    }

    fn evict_one(&self) {
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|e| self.expired(e.value()))
            .map(|e| e.key().clone())
            .collect();
        if expired.is_empty() {
            if let Some(key) = self.entries.iter().next().map(|e| e.key().clone()) {
                self.entries.remove(&key);
            }
        } else {
            for key in expired {
                self.entries.remove(&key);
            }
        }
    }

    /// Drops every expired entry. Expiry is otherwise lazy, so long-idle
    /// caches can call this to release memory eagerly.
    pub fn purge_expired(&self) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.retain(|_, entry| !self.expired(entry));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// (hits, misses) counters since construction.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

/// Embeds `texts` through `provider`, serving repeats from `cache`.
///
/// Misses are sent to the provider as one batch; when the batch call fails,
/// each miss is retried individually so that one poisoned input degrades only
/// itself. Returns one result slot per input, in order, plus how many inputs
/// were served from the cache. The count is local to this call; the cache's
/// global hit/miss counters also move for other concurrent callers, so they
/// cannot attribute hits to a batch.
pub async fn embed_texts_cached(
    provider: &Arc<dyn EmbeddingProvider>,
    cache: &EmbeddingCache,
    texts: &[String],
) -> (Vec<Result<TextEmbedding, EmbeddingError>>, usize) {
    let identity = provider.identity();
    let mut results: Vec<Option<Result<TextEmbedding, EmbeddingError>>> = vec![None; texts.len()];
    let mut cache_hits = 0usize;
    let mut miss_indices = Vec::new();
    let mut miss_texts = Vec::new();

    for (i, text) in texts.iter().enumerate() {
        if let Some(hit) = cache.get(text, &identity) {
            results[i] = Some(Ok(hit));
            cache_hits += 1;
        } else {
            miss_indices.push(i);
            miss_texts.push(text.clone());
        }
    }

    if !miss_texts.is_empty() {
        match provider.encode_texts(&miss_texts).await {
            Ok(embeddings) if embeddings.len() == miss_texts.len() => {
                for ((i, text), embedding) in
                    miss_indices.iter().zip(miss_texts.iter()).zip(embeddings)
                {
                    cache.insert(text, &identity, embedding.clone());
                    results[*i] = Some(Ok(embedding));
                }
            }
            Ok(embeddings) => {
                let err = EmbeddingError::InvalidResponse(format!(
                    "provider returned {} embeddings for {} inputs",
                    embeddings.len(),
                    miss_texts.len()
                ));
                for i in &miss_indices {
                    results[*i] = Some(Err(err.clone()));
                }
            }
            Err(batch_err) => {
                tracing::warn!(error = %batch_err, "batch embed failed, retrying per item");
                for (i, text) in miss_indices.iter().zip(miss_texts.iter()) {
                    match provider.encode_texts(std::slice::from_ref(text)).await {
                        Ok(mut single) if !single.is_empty() => {
                            let embedding = single.remove(0);
                            cache.insert(text, &identity, embedding.clone());
                            results[*i] = Some(Ok(embedding));
                        }
                        Ok(_) => {
                            results[*i] = Some(Err(EmbeddingError::InvalidResponse(
                                "provider returned no embedding".into(),
                            )));
                        }
                        Err(e) => {
                            results[*i] = Some(Err(e));
                        }
                    }
                }
            }
        }
    }

    let results = results
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(EmbeddingError::Provider("missing result slot".into()))
            })
        })
        .collect();
    (results, cache_hits)
}
