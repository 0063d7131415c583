//! Bounded embedding cache with TTL expiry
//!
//! Avoids redundant embedding computation for repeated text. Eviction is
//! insertion-order (oldest first), with a hit refreshing the key to the
//! most-recent position, which approximates LRU closely enough for this
//! workload.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

const TEXT_PREFIX_LEN: usize = 32;

/// A cached embedding with its insertion time.
#[derive(Debug, Clone)]
struct CacheEntry {
    embedding: Vec<f32>,
    inserted_at: Instant,
    /// First characters of the source text, kept for debugging.
    #[allow(dead_code)]
    text_prefix: String,
}

/// A text whose embedding was found in the cache, with its position in the
/// original input list.
#[derive(Debug, Clone)]
pub struct CachedText {
    pub text: String,
    pub embedding: Vec<f32>,
    pub index: usize,
}

/// A text that still needs embedding, with its position in the original
/// input list.
#[derive(Debug, Clone)]
pub struct UncachedText {
    pub text: String,
    pub index: usize,
}

/// Partition of a batch into cached and uncached texts.
#[derive(Debug, Clone, Default)]
pub struct SplitBatch {
    pub cached: Vec<CachedText>,
    pub uncached: Vec<UncachedText>,
}

/// Bounded text-to-embedding cache with TTL expiry.
///
/// Expired entries are evicted lazily on read, not proactively.
pub struct EmbeddingCache {
    entries: HashMap<String, CacheEntry>,
    /// Keys ordered oldest-first; a hit moves the key to the back.
    order: Vec<String>,
    max_size: usize,
    ttl: Duration,
}

impl EmbeddingCache {
    /// Create a cache holding at most `max_size` entries, each valid for `ttl`.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            max_size: max_size.max(1),
            ttl,
        }
    }

    /// Cache key: rolling content hash combined with text length.
    ///
    /// Not cryptographic; collisions between different texts are an accepted
    /// limitation of this cache.
    fn key(text: &str) -> String {
        let mut hash: u64 = 0;
        for byte in text.bytes() {
            hash = hash.wrapping_mul(31).wrapping_add(byte as u64);
        }
        format!("{:x}:{}", hash, text.len())
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }

    /// Look up the embedding for a text.
    ///
    /// Returns `None` if absent or expired; an expired entry is removed on
    /// the spot. A hit refreshes the entry to most-recent position.
    pub fn get(&mut self, text: &str) -> Option<Vec<f32>> {
        let key = Self::key(text);

        let expired = match self.entries.get(&key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };

        if expired {
            self.remove(&key);
            return None;
        }

        self.touch(&key);
        self.entries.get(&key).map(|e| e.embedding.clone())
    }

    /// Store an embedding for a text.
    ///
    /// When at capacity and the key is new, the oldest-position entry is
    /// evicted first. The vector is copied defensively.
    pub fn set(&mut self, text: &str, embedding: &[f32]) {
        let key = Self::key(text);

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            if let Some(oldest) = self.order.first().cloned() {
                self.remove(&oldest);
            }
        }

        if self.entries.contains_key(&key) {
            self.touch(&key);
        } else {
            self.order.push(key.clone());
        }

        self.entries.insert(
            key,
            CacheEntry {
                embedding: embedding.to_vec(),
                inserted_at: Instant::now(),
                text_prefix: text.chars().take(TEXT_PREFIX_LEN).collect(),
            },
        );
    }

    /// Whether a live entry exists for this text.
    pub fn has(&mut self, text: &str) -> bool {
        self.get(text).is_some()
    }

    /// Number of entries currently held (including not-yet-expired ones).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Look up many texts at once, position for position.
    pub fn get_batch(&mut self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        texts.iter().map(|t| self.get(t)).collect()
    }

    /// Store many embeddings at once.
    pub fn set_batch(&mut self, texts: &[String], embeddings: &[Vec<f32>]) -> Result<()> {
        if texts.len() != embeddings.len() {
            return Err(Error::invalid_input(format!(
                "set_batch length mismatch: {} texts, {} embeddings",
                texts.len(),
                embeddings.len()
            )));
        }
        for (text, embedding) in texts.iter().zip(embeddings.iter()) {
            self.set(text, embedding);
        }
        Ok(())
    }

    /// Partition texts into already-cached and still-uncached, preserving
    /// original indices so callers can embed only the uncached subset and
    /// reassemble results in input order.
    pub fn split_by_cached(&mut self, texts: &[String]) -> SplitBatch {
        let mut split = SplitBatch::default();
        for (index, text) in texts.iter().enumerate() {
            match self.get(text) {
                Some(embedding) => split.cached.push(CachedText {
                    text: text.clone(),
                    embedding,
                    index,
                }),
                None => split.uncached.push(UncachedText {
                    text: text.clone(),
                    index,
                }),
            }
        }
        split
    }
}
