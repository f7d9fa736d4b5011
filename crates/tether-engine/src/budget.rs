//! Context budget monitoring: a deterministic token estimator plus
//! per-session running totals with warning thresholds.
//!
//! The estimator is a heuristic, not a tokenizer. It only has to be monotonic
//! in content size and stable for the same input; both are load-bearing for
//! the threshold logic and its tests.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;

use tether_core::ids::SessionId;

/// Fixed context window of the assistant service.
pub const MAX_CONTEXT_TOKENS: u32 = 200_000;

const INFO_THRESHOLD: f64 = 0.50;
const WARNING_THRESHOLD: f64 = 0.80;
const CRITICAL_THRESHOLD: f64 = 0.95;

// Word-cost shape: every word costs one token, every 8 characters of word
// length cost one more. Long words therefore dominate the char/4 floor.
const WORD_LEN_DIVISOR: f64 = 8.0;
const NON_ASCII_SURCHARGE: f64 = 1.0;
const URL_TOKENS: f64 = 6.0;
const EMAIL_TOKENS: f64 = 4.0;

// Punctuation costs a quarter token per mark, capped at a tenth of the
// structural estimate. The cap binds exactly when punctuation density is
// high, where it becomes the 10% multiplicative bump; expressing it as a
// min of two monotone terms keeps the whole estimate monotonic under
// append, which a hard density threshold would not.
const PUNCT_CHAR_TOKENS: f64 = 0.25;
const PUNCT_BUMP: f64 = 0.10;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)>\]]+").expect("url pattern"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+\.[A-Za-z0-9.-]+").expect("email pattern"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("tag pattern"));
static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s").expect("header pattern"));

/// Estimate token count for a piece of text.
///
/// Base = max(chars/4, per-word cost). Non-ASCII characters carry a
/// surcharge. Structural content (fenced code, inline code, brace blocks,
/// tag blocks, markdown headers) raises the estimate multiplicatively; URLs
/// and email addresses add fixed per-occurrence costs; punctuation adds a
/// per-mark cost that tops out as a 10% bump at high density. Rounded up.
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }

    let chars = text.chars().count() as f64;
    let char_estimate = chars / 4.0;

    let word_estimate: f64 = text
        .split_whitespace()
        .map(|w| 1.0 + w.chars().count() as f64 / WORD_LEN_DIVISOR)
        .sum();

    let mut estimate = char_estimate.max(word_estimate);

    let non_ascii = text.chars().filter(|c| !c.is_ascii()).count() as f64;
    estimate += non_ascii * NON_ASCII_SURCHARGE;

    let mut structure = 1.0;
    if text.contains("```") {
        structure += 0.10;
    }
    if text.contains('`') && !text.contains("```") {
        structure += 0.05;
    }
    if text.contains('{') && text.contains('}') {
        structure += 0.05;
    }
    if TAG_RE.is_match(text) {
        structure += 0.05;
    }
    if HEADER_RE.is_match(text) {
        structure += 0.05;
    }
    estimate *= structure;

    let punct = text.chars().filter(|c| c.is_ascii_punctuation()).count() as f64;
    estimate += (punct * PUNCT_CHAR_TOKENS).min(estimate * PUNCT_BUMP);

    estimate += URL_RE.find_iter(text).count() as f64 * URL_TOKENS;
    estimate += EMAIL_RE.find_iter(text).count() as f64 * EMAIL_TOKENS;

    estimate.ceil() as u32
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarningLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Clone, Debug)]
pub struct ContextWarning {
    pub level: WarningLevel,
    pub usage: f64,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Per-session running totals, mutated only by the monitor.
#[derive(Clone, Debug)]
pub struct ContextStats {
    pub estimated_tokens: u64,
    pub max_tokens: u32,
    pub message_count: u32,
    pub user_turn_count: u32,
    pub last_update: DateTime<Utc>,
}

impl ContextStats {
    fn new(max_tokens: u32) -> Self {
        Self {
            estimated_tokens: 0,
            max_tokens,
            message_count: 0,
            user_turn_count: 0,
            last_update: Utc::now(),
        }
    }

    pub fn usage(&self) -> f64 {
        self.estimated_tokens as f64 / self.max_tokens as f64
    }
}

/// Tracks context consumption across sessions. Warnings are evaluated on
/// every call; rate-limiting user-visible output is the caller's concern.
pub struct ContextBudget {
    stats: DashMap<SessionId, ContextStats>,
    max_tokens: u32,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBudget {
    pub fn new() -> Self {
        Self::with_max_tokens(MAX_CONTEXT_TOKENS)
    }

    pub fn with_max_tokens(max_tokens: u32) -> Self {
        Self {
            stats: DashMap::new(),
            max_tokens,
        }
    }

    /// Record a message against a session's budget and report the threshold
    /// crossed, if any.
    pub fn track_message(
        &self,
        session_id: &SessionId,
        text: &str,
        role: Role,
    ) -> Option<ContextWarning> {
        let tokens = estimate_tokens(text) as u64;
        let mut entry = self
            .stats
            .entry(session_id.clone())
            .or_insert_with(|| ContextStats::new(self.max_tokens));
        entry.estimated_tokens += tokens;
        entry.message_count += 1;
        if role == Role::User {
            entry.user_turn_count += 1;
        }
        entry.last_update = Utc::now();

        warning_for(entry.usage())
    }

    pub fn stats(&self, session_id: &SessionId) -> Option<ContextStats> {
        self.stats.get(session_id).map(|s| s.clone())
    }

    /// Explicit reset, the only permitted decrease in a session's usage.
    pub fn reset(&self, session_id: &SessionId) {
        self.stats.remove(session_id);
    }

    /// Drop stats not updated within `max_age`. Memory-bound housekeeping,
    /// independent of snapshot retention.
    pub fn cleanup_old(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::days(365));
        let before = self.stats.len();
        self.stats.retain(|_, s| s.last_update >= cutoff);
        before - self.stats.len()
    }
}

fn warning_for(usage: f64) -> Option<ContextWarning> {
    let percent = (usage * 100.0).round() as u32;
    if usage >= CRITICAL_THRESHOLD {
        Some(ContextWarning {
            level: WarningLevel::Critical,
            usage,
            message: format!("Context window nearly exhausted ({percent}% used)"),
            suggestion: Some(
                "Start a new session now; responses may degrade or fail beyond this point".into(),
            ),
        })
    } else if usage >= WARNING_THRESHOLD {
        Some(ContextWarning {
            level: WarningLevel::Warning,
            usage,
            message: format!("Context window is {percent}% used"),
            suggestion: Some("Consider wrapping up this conversation or starting a new session".into()),
        })
    } else if usage >= INFO_THRESHOLD {
        Some(ContextWarning {
            level: WarningLevel::Info,
            usage,
            message: format!("Context window is {percent}% used"),
            suggestion: None,
        })
    } else {
        None
    }
}
