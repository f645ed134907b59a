//! Rolling windows of recent assistant output and inbound transcript text,
//! used to suppress the user's turn manager reacting to the assistant's own
//! voice leaking back through an open microphone.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(12);

#[derive(Debug, Clone)]
struct Entry {
    text: String,
    normalized: String,
    tokens: HashSet<String>,
    at: Instant,
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn token_set(normalized: &str) -> HashSet<String> {
    normalized.split_whitespace().map(|s| s.to_string()).collect()
}

fn make_entry(text: &str) -> Entry {
    let normalized = normalize(text);
    let tokens = token_set(&normalized);
    Entry {
        text: text.to_string(),
        normalized,
        tokens,
        at: Instant::now(),
    }
}

/// A bounded window of recently emitted assistant text, used by
/// `is_likely_bot_echo` to recognize the assistant's own speech reflected
/// back through the microphone.
#[derive(Debug, Default)]
pub struct RecentBotOutputs {
    entries: VecDeque<Entry>,
    window: Duration,
}

impl RecentBotOutputs {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            window: DEFAULT_WINDOW,
        }
    }

    pub fn push(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.entries.push_back(make_entry(text));
        self.evict_expired();
    }

    fn evict_expired(&mut self) {
        let window = self.window;
        while let Some(front) = self.entries.front() {
            if front.at.elapsed() > window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// True if `text` closely matches something the assistant recently said:
    /// exact loose-normalized match, substring containment either way, or
    /// majority token overlap.
    pub fn is_likely_bot_echo(&self, text: &str) -> bool {
        let candidate = normalize(text);
        if candidate.is_empty() {
            return false;
        }
        let candidate_tokens = token_set(&candidate);
        self.entries.iter().any(|entry| {
            if entry.normalized == candidate {
                return true;
            }
            if entry.normalized.contains(&candidate) || candidate.contains(&entry.normalized) {
                return true;
            }
            if entry.tokens.is_empty() || candidate_tokens.is_empty() {
                return false;
            }
            let overlap = entry.tokens.intersection(&candidate_tokens).count();
            let smaller = entry.tokens.len().min(candidate_tokens.len());
            smaller > 0 && (overlap as f64 / smaller as f64) >= 0.7
        })
    }
}

/// A bounded window of recent inbound (user) transcripts, used for
/// de-duplicating repeated `stt.final` deliveries within the window.
#[derive(Debug, Default)]
pub struct InboundHistory {
    entries: VecDeque<Entry>,
    window: Duration,
}

impl InboundHistory {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            window: Duration::from_secs(15),
        }
    }

    pub fn push(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.entries.push_back(make_entry(text));
        self.evict_expired();
    }

    fn evict_expired(&mut self) {
        let window = self.window;
        while let Some(front) = self.entries.front() {
            if front.at.elapsed() > window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn is_duplicate(&self, text: &str) -> bool {
        let candidate = normalize(text);
        !candidate.is_empty() && self.entries.iter().any(|e| e.normalized == candidate)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
