//! Loot Simulator
//!
//! Opens a catalog many times against in-memory collaborators and reports
//! observed frequencies, refunds and reveal timing as JSON.
//!
//! Usage:
//!   loot-sim --entries "a=50,b=30,c=20" --opens 100000 --seed 7
//!   loot-sim --entries "sword=5,shield,potion" --failure-rate 0.1 --layout ring
//!   loot-sim --config loot.yaml --entries "a,b,c" -v

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use log::{debug, info};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;

use rf_lootbox::{
    CatalogId, CatalogSource, CatalogStore, DeliveryError, DeliveryLog, InMemoryTokenLedger,
    LootConfig, OpeningSession, RarityTier, RequesterId, RevealLayout, RevealScheduler,
    RewardDelivery, RewardEntry, RewardPayload, SessionContext, SessionOutcome, TOTAL_WEIGHT,
};

const CATALOG: &str = "sim";

#[derive(Parser)]
#[command(name = "loot-sim", about = "Batch lootbox opening simulator")]
struct Cli {
    /// Catalog entries as `id=weight` (manual) or `id` (automatic), comma separated
    #[arg(short, long)]
    entries: String,

    /// Number of openings
    #[arg(short = 'n', long, default_value_t = 10_000)]
    opens: u64,

    /// Master seed
    #[arg(short, long, default_value_t = 1)]
    seed: u64,

    /// Engine config file (.yaml, .yml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reveal layout
    #[arg(short, long, value_enum, default_value_t = LayoutArg::Linear)]
    layout: LayoutArg,

    /// Probability that a delivery is rejected
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    Linear,
    Ring,
    Cascade,
    Single,
    TripleRow,
}

impl From<LayoutArg> for RevealLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Linear => RevealLayout::Linear,
            LayoutArg::Ring => RevealLayout::Ring,
            LayoutArg::Cascade => RevealLayout::Cascade,
            LayoutArg::Single => RevealLayout::Single,
            LayoutArg::TripleRow => RevealLayout::TripleRow,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FLAKY DELIVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Rejects a seeded fraction of deliveries, records the rest
struct FlakyDelivery {
    inner: DeliveryLog,
    failure_rate: f64,
    rng: Mutex<ChaCha8Rng>,
}

impl RewardDelivery for FlakyDelivery {
    fn deliver(
        &self,
        requester: &RequesterId,
        payload: &RewardPayload,
    ) -> Result<(), DeliveryError> {
        if self.failure_rate > 0.0 && self.rng.lock().random_bool(self.failure_rate) {
            return Err(DeliveryError::InventoryFull(requester.clone()));
        }
        self.inner.deliver(requester, payload)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPORT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct EntryReport {
    weight: f64,
    expected: f64,
    observed: u64,
    observed_percent: f64,
}

#[derive(Serialize)]
struct SimReport {
    opens: u64,
    layout: RevealLayout,
    delivered: u64,
    failed: u64,
    tokens_consumed: u64,
    tokens_refunded: u64,
    catalog_opened: u64,
    /// Chi-square statistic of delivered winners against configured weights
    chi_square: f64,
    degrees_of_freedom: usize,
    reveal_ticks_per_open: u32,
    entries: BTreeMap<String, EntryReport>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if !(0.0..=1.0).contains(&cli.failure_rate) {
        bail!("--failure-rate must be within [0, 1], got {}", cli.failure_rate);
    }

    let mut config = match &cli.config {
        Some(path) => LootConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LootConfig::default(),
    };
    config.seed.get_or_insert(cli.seed);

    let report = run(&cli, &config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn parse_entries(list: &str) -> Result<Vec<(String, Option<f64>)>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| match item.split_once('=') {
            Some((id, weight)) => {
                let weight: f64 = weight
                    .trim()
                    .parse()
                    .with_context(|| format!("bad weight for entry '{}'", id))?;
                Ok((id.trim().to_string(), Some(weight)))
            }
            None => Ok((item.to_string(), None)),
        })
        .collect()
}

fn run(cli: &Cli, config: &LootConfig) -> Result<SimReport> {
    let catalog_id = CatalogId::from(CATALOG);
    let store = Arc::new(CatalogStore::new(&config.capabilities));
    store.create(catalog_id.clone());
    for (id, weight) in parse_entries(&cli.entries)? {
        let payload = RewardPayload::item(id.as_str(), 1);
        let entry = RewardEntry::new(id.as_str(), RarityTier::Common, payload);
        store
            .add_entry(&catalog_id, entry, weight)
            .with_context(|| format!("adding entry '{}'", id))?;
    }
    let catalog = store
        .snapshot(&catalog_id)
        .context("catalog vanished after creation")?;
    if catalog.is_empty() {
        bail!("no entries given");
    }
    info!(
        "catalog {} with {} entries, total weight {:.4}",
        catalog_id,
        catalog.len(),
        catalog.total_weight()
    );

    let master_seed = config.seed.unwrap_or(cli.seed);
    let ledger = Arc::new(InMemoryTokenLedger::new());
    let delivery = Arc::new(FlakyDelivery {
        inner: DeliveryLog::new(),
        failure_rate: cli.failure_rate,
        rng: Mutex::new(ChaCha8Rng::seed_from_u64(master_seed ^ 0xDE11_7E57)),
    });
    let ctx = SessionContext::new(
        ledger.clone(),
        store.clone(),
        delivery.clone(),
        config.capabilities.clone(),
    );
    let layout = RevealLayout::from(cli.layout);
    let reveal = config.reveal_for(layout);

    let outcomes: Vec<SessionOutcome> = (0..cli.opens)
        .into_par_iter()
        .filter_map(|i| {
            let requester = RequesterId::new(format!("sim-{}", i));
            ledger.grant(&requester, &catalog_id, 1);
            let session = OpeningSession::new(
                ctx.clone(),
                requester,
                catalog_id.clone(),
                reveal.clone(),
                master_seed.wrapping_add(i),
            );
            if session.start().is_ok() {
                while !session.state().is_terminal() {
                    if let Err(err) = session.advance() {
                        debug!("{}: {}", session.id(), err);
                    }
                }
            }
            session.outcome()
        })
        .collect();

    let mut observed: BTreeMap<String, u64> = BTreeMap::new();
    let mut failed = 0;
    for outcome in &outcomes {
        match outcome {
            SessionOutcome::Delivered { entry_id, .. } => {
                *observed.entry(entry_id.clone()).or_insert(0) += 1
            }
            SessionOutcome::Failed { .. } => failed += 1,
        }
    }
    let delivered: u64 = observed.values().sum();

    let mut chi_square = 0.0;
    let mut entries = BTreeMap::new();
    for entry in catalog.entries() {
        let count = observed.get(&entry.id).copied().unwrap_or(0);
        let expected = delivered as f64 * entry.weight() / catalog.total_weight();
        if expected > 0.0 {
            chi_square += (count as f64 - expected).powi(2) / expected;
        }
        entries.insert(
            entry.id.clone(),
            EntryReport {
                weight: entry.weight(),
                expected,
                observed: count,
                observed_percent: if delivered > 0 {
                    count as f64 / delivered as f64 * TOTAL_WEIGHT
                } else {
                    0.0
                },
            },
        );
    }

    let reveal_ticks = RevealScheduler::new(reveal.easing)
        .plan(reveal.step_count, reveal.total_duration_ticks)
        .map(|delays| delays.iter().sum())
        .unwrap_or(0);

    Ok(SimReport {
        opens: cli.opens,
        layout,
        delivered,
        failed,
        tokens_consumed: ledger.consumed(),
        tokens_refunded: ledger.refunded(),
        catalog_opened: store.opened(&catalog_id),
        chi_square,
        degrees_of_freedom: catalog.len().saturating_sub(1),
        reveal_ticks_per_open: reveal_ticks,
        entries,
    })
}
