#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reconcile_engine::domain::event::{EventRecord, SourceSystem};
use reconcile_engine::domain::features::FeatureVector;
use reconcile_engine::domain::ports::MatchScorer;
use reconcile_engine::error::ScoringError;
use reconcile_engine::infrastructure::scoring::HeuristicMatchScorer;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const HEADER: [&str; 5] = ["txn_ref_id", "value_date", "amount", "currency", "counterparty"];

pub fn record(id: &str, source: SourceSystem, amount: Decimal, day: u32) -> EventRecord {
    EventRecord {
        txn_ref_id: id.to_string(),
        source_system: Some(source),
        amount: Some(amount),
        currency: Some("USD".to_string()),
        value_date: NaiveDate::from_ymd_opt(2024, 5, day),
        ..Default::default()
    }
}

/// Heuristic scorer that can be switched off, counting every invocation.
#[derive(Default)]
pub struct SwitchableScorer {
    down: AtomicBool,
    calls: AtomicUsize,
    inner: HeuristicMatchScorer,
}

impl SwitchableScorer {
    pub fn down() -> Self {
        let scorer = Self::default();
        scorer.set_down(true);
        scorer
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MatchScorer for SwitchableScorer {
    async fn predict_probability(&self, features: &FeatureVector) -> Result<f64, ScoringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(ScoringError::Unavailable("model offline".to_string()));
        }
        Ok(self.inner.probability(features))
    }
}

/// A mixed stream: counterpart pairs (some jittered), orphans on both sides,
/// the odd repeated id and the odd record without an amount.
pub fn random_stream(seed: u64, pairs: usize) -> Vec<EventRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut events = Vec::with_capacity(pairs * 2);

    for i in 0..pairs {
        let id = format!("TXN-{i:05}");
        let day = rng.gen_range(1..=28);
        let cents: i64 = rng.gen_range(100..10_000_000);
        let amount = Decimal::new(cents, 2);

        let a = record(&id, SourceSystem::SourceA, amount, day);
        match rng.gen_range(0..10) {
            0 => events.push(a),
            1 => events.push(record(&id, SourceSystem::SourceB, amount, day)),
            2 => {
                events.push(a.clone());
                events.push(a);
            }
            3 => {
                let mut broken = a;
                broken.amount = None;
                events.push(broken);
            }
            _ => {
                let jitter = Decimal::new(rng.gen_range(0..4), 2);
                let b_day = (day + rng.gen_range(0..2)).min(28);
                events.push(a);
                events.push(record(&id, SourceSystem::SourceB, amount + jitter, b_day));
            }
        }
    }
    events
}

/// Writes a pair of source files; B holds the counterpart of every A row
/// except every `orphan_every`-th one.
pub fn generate_source_files(
    dir: &Path,
    rows: usize,
    orphan_every: usize,
) -> Result<(PathBuf, PathBuf), Error> {
    let a_path = dir.join("source_a.csv");
    let b_path = dir.join("source_b.csv");
    let mut a = csv::Writer::from_writer(File::create(&a_path)?);
    let mut b = csv::Writer::from_writer(File::create(&b_path)?);
    a.write_record(HEADER)?;
    b.write_record(HEADER)?;

    let mut rng = StdRng::seed_from_u64(rows as u64);
    for i in 1..=rows {
        let id = format!("INV-{i:06}");
        let date = format!("2024-05-{:02}", rng.gen_range(1..=28));
        let amount = Decimal::new(rng.gen_range(100..5_000_000), 2).to_string();
        a.write_record([id.as_str(), date.as_str(), amount.as_str(), "USD", "ACME"])?;
        if orphan_every == 0 || i % orphan_every != 0 {
            b.write_record([id.as_str(), date.as_str(), amount.as_str(), "USD", "ACME"])?;
        }
    }
    a.flush()?;
    b.flush()?;
    Ok((a_path, b_path))
}
