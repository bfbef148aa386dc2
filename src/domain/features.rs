//! Pairwise feature extraction.
//!
//! Turns two candidate events into a fixed-order numeric vector. Pure and
//! deterministic: replays and stress runs depend on identical output for
//! identical input.

use super::event::TransactionEvent;
use chrono::Datelike;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Amount log delta, date delta in days, ID ratio, ID token-sort ratio, ID
/// partial ratio, exact-amount flag, same-weekday flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; 7]);

impl FeatureVector {
    pub fn amount_log_delta(&self) -> f64 {
        self.0[0]
    }

    pub fn date_delta_days(&self) -> f64 {
        self.0[1]
    }

    pub fn id_similarity_ratio(&self) -> f64 {
        self.0[2]
    }

    pub fn id_token_sort_ratio(&self) -> f64 {
        self.0[3]
    }

    pub fn id_partial_ratio(&self) -> f64 {
        self.0[4]
    }

    pub fn exact_amount(&self) -> bool {
        self.0[5] == 1.0
    }

    pub fn same_weekday(&self) -> bool {
        self.0[6] == 1.0
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Computes the feature vector for the pair `(a, b)`.
pub fn extract(a: &TransactionEvent, b: &TransactionEvent) -> FeatureVector {
    let amount_delta = (a.amount - b.amount).abs();
    let amount_log_delta = amount_delta.to_f64().unwrap_or(f64::MAX).ln_1p();
    let date_delta_days = (a.value_date - b.value_date).num_days().unsigned_abs() as f64;

    FeatureVector([
        amount_log_delta,
        date_delta_days,
        ratio(&a.id, &b.id),
        token_sort_ratio(&a.id, &b.id),
        partial_ratio(&a.id, &b.id),
        flag(amount_delta.is_zero()),
        flag(a.value_date.weekday() == b.value_date.weekday()),
    ])
}

fn flag(condition: bool) -> f64 {
    if condition { 1.0 } else { 0.0 }
}

/// Normalised edit similarity, 0-100.
pub fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// Similarity after splitting on non-alphanumerics and sorting the tokens.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<String> = s
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();
    tokens.sort();
    tokens.join(" ")
}

/// Best similarity of the shorter string against any equal-length window
/// of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };

    if short.is_empty() {
        return if long.is_empty() { 100.0 } else { 0.0 };
    }
    if short.len() == long.len() {
        return ratio(a, b);
    }

    let needle: String = short.iter().collect();
    long.windows(short.len())
        .map(|window| {
            let candidate: String = window.iter().collect();
            ratio(&needle, &candidate)
        })
        .fold(0.0, f64::max)
}
