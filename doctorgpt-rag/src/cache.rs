use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};

use crate::synthesis::Answer;

/// In-process answer cache keyed by persona and question.
///
/// Capacity-bounded with least-recently-used eviction. Lookups and
/// insertions take a short internal lock, so the cache can be shared
/// across request handlers behind an `Arc`.
pub struct AnswerCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    capacity: usize,
    tick: u64,
    entries: HashMap<String, CacheEntry>,
}

struct CacheEntry {
    answer: Answer,
    last_used: u64,
}

impl AnswerCache {
    /// Creates a cache holding at most `capacity` answers.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                capacity: capacity.max(1),
                tick: 0,
                entries: HashMap::new(),
            }),
        }
    }

    /// Cache key: hex-encoded SHA-256 of `{persona}|{question}`.
    pub fn key(persona: &str, question: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(persona.as_bytes());
        hasher.update(b"|");
        hasher.update(question.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns the cached answer for the pair, refreshing its recency.
    pub fn get(&self, persona: &str, question: &str) -> Option<Answer> {
        let key = Self::key(persona, question);
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner.entries.get_mut(&key)?;
        entry.last_used = tick;
        Some(entry.answer.clone())
    }

    /// Stores an answer, evicting the least recently used entry when the
    /// cache is full.
    pub fn put(&self, persona: &str, question: &str, answer: Answer) {
        let key = Self::key(persona, question);
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;
        if !inner.entries.contains_key(&key) && inner.entries.len() >= inner.capacity {
            // Linear scan over at most `capacity` entries.
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
            }
        }
        inner.entries.insert(
            key,
            CacheEntry {
                answer,
                last_used: tick,
            },
        );
    }

    /// Number of cached answers.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
