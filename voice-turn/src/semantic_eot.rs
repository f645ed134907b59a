//! Cached, bounded-latency end-of-turn classifier over the current transcript.
//!
//! Fuses an ordered heuristic rule ladder with an optional LLM backend. The
//! trailing-punctuation/decimal-exception boundary check is the same shape
//! used elsewhere in this codebase for sentence segmentation, extended here
//! with filler/joiner/short-utterance rules specific to live turn detection
//! rather than post-hoc TTS sentence splitting.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;

const FILLERS: &[&str] = &["uh", "um", "hmm", "well", "like", "you know", "typа", "э"];
const JOINERS: &[&str] = &[
    "and", "or", "but", "so", "because", "if", "when", "that", "to", "for", "with", "и", "или",
    "но", "потому", "если", "когда", "что", "чтобы", "для", "с",
];
const TRAILING_SOFT_PUNCT: &[char] = &[',', ':', ';', '-', '–', '—'];
const TERMINAL_PUNCT: &[char] = &['.', '!', '?', '…'];

const CACHE_TTL: Duration = Duration::from_secs(12);
const CACHE_CAPACITY: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EotStatus {
    Complete,
    Incomplete,
    Uncertain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EotVerdict {
    pub status: EotStatus,
    pub recommended_delay_ms: f64,
    pub confidence: f32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SemanticEotConfig {
    pub enabled: bool,
    pub use_llm: bool,
    pub min_delay_ms: f64,
    pub max_delay_ms: f64,
    pub timeout_ms: u64,
}

impl Default for SemanticEotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            use_llm: false,
            min_delay_ms: 250.0,
            max_delay_ms: 900.0,
            timeout_ms: 180,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SemanticEotError {
    #[error("backend timed out")]
    Timeout,
    #[error("backend returned unparsable response: {0}")]
    BadResponse(String),
}

/// Optional LLM-backed classifier, consulted only when the heuristic alone
/// returns `uncertain`. A test double stands in when no real backend is wired.
#[async_trait]
pub trait SemanticEotBackend: Send + Sync {
    async fn classify(&self, transcript: &str) -> Result<EotVerdict, SemanticEotError>;
}

fn clamp_delay(delay_ms: f64, config: &SemanticEotConfig) -> f64 {
    delay_ms.clamp(config.min_delay_ms, config.max_delay_ms)
}

fn normalize_last_token(text: &str) -> Option<String> {
    text.split_whitespace()
        .last()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
}

fn ends_with_any_char(text: &str, set: &[char]) -> bool {
    text.trim_end()
        .chars()
        .last()
        .map(|c| set.contains(&c))
        .unwrap_or(false)
}

fn ends_with_filler(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    FILLERS.iter().any(|f| lower.ends_with(f))
}

fn last_token_is_joiner(text: &str) -> bool {
    normalize_last_token(text)
        .map(|t| JOINERS.contains(&t.as_str()))
        .unwrap_or(false)
}

fn looks_shape_incomplete(text: &str) -> bool {
    match normalize_last_token(text) {
        Some(t) => t.chars().count() <= 3,
        None => true,
    }
}

/// Applies the ordered heuristic rule ladder (first match wins) to a transcript.
pub fn classify_heuristic(
    text: &str,
    is_first_user_turn: bool,
    config: &SemanticEotConfig,
) -> EotVerdict {
    let trimmed = text.trim();
    let word_count = trimmed.split_whitespace().count();

    let (status, delay, confidence, reason): (EotStatus, f64, f32, &'static str) =
        if trimmed.is_empty() {
            (EotStatus::Incomplete, config.max_delay_ms, 0.9, "empty transcript")
        } else if ends_with_filler(trimmed) {
            (
                EotStatus::Incomplete,
                config.max_delay_ms - 60.0,
                0.8,
                "trailing filler word",
            )
        } else if last_token_is_joiner(trimmed) {
            (
                EotStatus::Incomplete,
                config.max_delay_ms - 80.0,
                0.8,
                "last token is a joining word",
            )
        } else if ends_with_any_char(trimmed, TRAILING_SOFT_PUNCT) {
            (
                EotStatus::Incomplete,
                config.max_delay_ms - 120.0,
                0.7,
                "trailing soft punctuation",
            )
        } else if ends_with_any_char(trimmed, TERMINAL_PUNCT) && word_count >= 3 {
            (EotStatus::Complete, config.min_delay_ms, 0.9, "terminal punctuation")
        } else if word_count <= 2 {
            if is_first_user_turn {
                (
                    EotStatus::Uncertain,
                    config.min_delay_ms + 80.0,
                    0.5,
                    "short utterance on first user turn",
                )
            } else {
                (
                    EotStatus::Incomplete,
                    config.max_delay_ms - 140.0,
                    0.6,
                    "short utterance",
                )
            }
        } else if looks_shape_incomplete(trimmed) {
            (
                EotStatus::Uncertain,
                config.min_delay_ms + 0.4 * (config.max_delay_ms - config.min_delay_ms),
                0.5,
                "shape looks incomplete",
            )
        } else {
            (EotStatus::Complete, config.min_delay_ms + 40.0, 0.7, "default complete")
        };

    EotVerdict {
        status,
        recommended_delay_ms: clamp_delay(delay, config),
        confidence,
        reason: reason.to_string(),
    }
}

struct CacheEntry {
    verdict: EotVerdict,
    inserted_at: Instant,
}

/// A small LRU cache keyed on loosely-normalized transcript text, bounded to
/// 120 entries with a 12s time-to-live.
struct EotCache {
    order: VecDeque<String>,
    entries: HashMap<String, CacheEntry>,
}

impl EotCache {
    fn new() -> Self {
        Self {
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    fn key(text: &str) -> String {
        text.trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn get(&mut self, text: &str) -> Option<EotVerdict> {
        let key = Self::key(text);
        let expired = match self.entries.get(&key) {
            Some(entry) => entry.inserted_at.elapsed() > CACHE_TTL,
            None => return None,
        };
        if expired {
            self.entries.remove(&key);
            self.order.retain(|k| k != &key);
            return None;
        }
        // touch for LRU
        self.order.retain(|k| k != &key);
        self.order.push_back(key.clone());
        self.entries.get(&key).map(|e| e.verdict.clone())
    }

    fn put(&mut self, text: &str, verdict: EotVerdict) {
        let key = Self::key(text);
        if !self.entries.contains_key(&key) && self.order.len() >= CACHE_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.retain(|k| k != &key);
        self.order.push_back(key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                verdict,
                inserted_at: Instant::now(),
            },
        );
    }
}

/// The semantic end-of-turn detector: heuristic plus optional cached LLM fallback.
pub struct SemanticEot {
    config: SemanticEotConfig,
    cache: EotCache,
    backend: Option<Box<dyn SemanticEotBackend>>,
}

impl SemanticEot {
    pub fn new(config: SemanticEotConfig, backend: Option<Box<dyn SemanticEotBackend>>) -> Self {
        Self {
            config,
            cache: EotCache::new(),
            backend,
        }
    }

    /// Classifies a transcript, consulting the cache and (if configured and
    /// the heuristic alone is uncertain) the LLM backend under a deadline.
    pub async fn classify(&mut self, text: &str, is_first_user_turn: bool) -> EotVerdict {
        if let Some(cached) = self.cache.get(text) {
            return cached;
        }

        let heuristic = classify_heuristic(text, is_first_user_turn, &self.config);

        let verdict = if let Some(backend) =
            self.backend.as_ref().filter(|_| self.config.use_llm && heuristic.status == EotStatus::Uncertain)
        {
            let timeout = Duration::from_millis(self.config.timeout_ms.min(200));
            match tokio::time::timeout(timeout, backend.classify(text)).await {
                Ok(Ok(mut llm_verdict)) => {
                    if llm_verdict.status == EotStatus::Incomplete
                        && llm_verdict.recommended_delay_ms < heuristic.recommended_delay_ms
                    {
                        // Monotone safety: the LLM may never shorten an incomplete delay.
                        llm_verdict.recommended_delay_ms = heuristic.recommended_delay_ms;
                    }
                    llm_verdict.recommended_delay_ms =
                        clamp_delay(llm_verdict.recommended_delay_ms, &self.config);
                    llm_verdict
                }
                _ => heuristic,
            }
        } else {
            heuristic
        };

        self.cache.put(text, verdict.clone());
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SemanticEotConfig {
        SemanticEotConfig::default()
    }

    #[test]
    fn empty_transcript_is_incomplete_max_delay() {
        let v = classify_heuristic("", false, &cfg());
        assert_eq!(v.status, EotStatus::Incomplete);
        assert_eq!(v.recommended_delay_ms, 900.0);
    }

    #[test]
    fn trailing_filler_is_incomplete() {
        let v = classify_heuristic("I think, um", false, &cfg());
        assert_eq!(v.status, EotStatus::Incomplete);
        assert_eq!(v.recommended_delay_ms, 840.0);
    }

    #[test]
    fn trailing_joiner_matches_literal_scenario() {
        let v = classify_heuristic("I need help with pricing and", false, &cfg());
        assert_eq!(v.status, EotStatus::Incomplete);
        assert_eq!(v.recommended_delay_ms, 820.0);
    }

    #[test]
    fn trailing_soft_punctuation_is_incomplete() {
        let v = classify_heuristic("let me think,", false, &cfg());
        assert_eq!(v.status, EotStatus::Incomplete);
        assert_eq!(v.recommended_delay_ms, 780.0);
    }

    #[test]
    fn terminal_punctuation_with_enough_words_is_complete() {
        let v = classify_heuristic("I need help with pricing and taxes.", false, &cfg());
        assert_eq!(v.status, EotStatus::Complete);
        assert_eq!(v.recommended_delay_ms, 250.0);
    }

    #[test]
    fn short_utterance_on_first_turn_is_uncertain() {
        let v = classify_heuristic("hi there", true, &cfg());
        assert_eq!(v.status, EotStatus::Uncertain);
        assert_eq!(v.recommended_delay_ms, 330.0);
    }

    #[test]
    fn short_utterance_not_first_turn_is_incomplete() {
        let v = classify_heuristic("ok yes", false, &cfg());
        assert_eq!(v.status, EotStatus::Incomplete);
        assert_eq!(v.recommended_delay_ms, 760.0);
    }

    #[test]
    fn delays_are_clamped() {
        let config = SemanticEotConfig {
            min_delay_ms: 250.0,
            max_delay_ms: 900.0,
            ..cfg()
        };
        let v = classify_heuristic("", false, &config);
        assert!(v.recommended_delay_ms <= config.max_delay_ms);
        assert!(v.recommended_delay_ms >= config.min_delay_ms);
    }

    struct FixedBackend(EotVerdict);

    #[async_trait]
    impl SemanticEotBackend for FixedBackend {
        async fn classify(&self, _transcript: &str) -> Result<EotVerdict, SemanticEotError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn llm_backend_cannot_shorten_incomplete_delay() {
        let config = SemanticEotConfig {
            use_llm: true,
            ..cfg()
        };
        let backend = FixedBackend(EotVerdict {
            status: EotStatus::Incomplete,
            recommended_delay_ms: 100.0,
            confidence: 0.9,
            reason: "llm says short".into(),
        });
        let mut eot = SemanticEot::new(config, Some(Box::new(backend)));
        // "I need to go" -> last token "go" is short -> heuristic Uncertain at 510ms,
        // so the LLM backend is consulted; its Incomplete@100ms must be raised to 510ms.
        let verdict = eot.classify("I need to go", false).await;
        assert_eq!(verdict.status, EotStatus::Incomplete);
        assert_eq!(verdict.recommended_delay_ms, 510.0);
    }

    #[tokio::test]
    async fn cache_returns_same_verdict_for_loosely_equal_text() {
        let mut eot = SemanticEot::new(cfg(), None);
        let first = eot.classify("Hello there", false).await;
        let second = eot.classify("  hello   there  ", false).await;
        assert_eq!(first.recommended_delay_ms, second.recommended_delay_ms);
        assert_eq!(first.status, second.status);
    }
}
