//! Screener engine module.
//!
//! The orchestrator for a screening run: fetch each instrument's daily
//! series, derive its indicators, apply the filter and collect the passing
//! rows in input order.

use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stockscreen_common::util::normalize_symbols;
use thiserror::Error;
use tracing::{debug, info};

use crate::data::{fetch_daily_series, DataProvider, DateRange, FetchOutcome, FetchPolicy};
use crate::indicators::{IndicatorEngine, IndicatorSet};

use super::criteria::ScreenCriteria;
use super::filter::{Criterion, FilterOutcome, ScreeningFilter};

// ============================================================================
// Errors
// ============================================================================

/// Run-level failures. Per-instrument problems are skips, never errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScreenError {
    #[error("universe is empty")]
    EmptyUniverse,

    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("invalid date range {start}..{end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}

// ============================================================================
// Results
// ============================================================================

/// An instrument that passed every enabled criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenResult {
    /// Instrument symbol (e.g., "2330.TW")
    pub symbol: String,
    /// Timestamp of the latest candle
    pub as_of: DateTime<Utc>,
    /// Indicator values the decision was based on
    pub indicators: IndicatorSet,
}

/// Why an instrument was not evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Fetch failed, timed out or returned nothing usable
    DataUnavailable { reason: String },
    /// Series shorter than the longest window the criteria need
    InsufficientHistory { required: usize, actual: usize },
    /// The run was cancelled before this instrument started
    Cancelled,
}

/// A skipped instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skip {
    pub symbol: String,
    pub reason: SkipReason,
}

/// Instruments eliminated by one criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCount {
    pub criterion: Criterion,
    pub count: usize,
}

/// Result of a screening run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenReport {
    /// Run ID (timestamp-based)
    pub id: String,
    /// Passing instruments, in universe order
    pub results: Vec<ScreenResult>,
    /// Instruments not evaluated, in universe order
    pub skipped: Vec<Skip>,
    /// Evaluated instruments by first failing criterion
    pub rejections: Vec<RejectionCount>,
    /// Instruments in the normalized universe
    pub total_scanned: usize,
    /// Criteria used
    pub criteria_summary: String,
    /// Daily data range requested
    pub date_range: DateRange,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time
    pub completed_at: DateTime<Utc>,
    /// Duration in seconds
    pub duration_secs: f64,
}

impl ScreenReport {
    /// Instruments rejected by `criterion`.
    pub fn rejected_by(&self, criterion: Criterion) -> usize {
        self.rejections
            .iter()
            .find(|r| r.criterion == criterion)
            .map_or(0, |r| r.count)
    }

    /// Symbols that passed, in order.
    pub fn symbols(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.symbol.as_str()).collect()
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        let rejected: usize = self.rejections.iter().map(|r| r.count).sum();
        format!(
            "Screened {} stocks in {:.1}s: {} passed ({:.1}%), {} rejected, {} skipped",
            self.total_scanned,
            self.duration_secs,
            self.results.len(),
            if self.total_scanned > 0 {
                (self.results.len() as f64 / self.total_scanned as f64) * 100.0
            } else {
                0.0
            },
            rejected,
            self.skipped.len()
        )
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Stops a run from starting further instruments.
///
/// The flag is cleared when the owning engine starts its next run.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Screener Engine
// ============================================================================

enum Evaluation {
    Passed(ScreenResult),
    Rejected(Criterion),
    Skipped(SkipReason),
}

/// The screening orchestrator.
///
/// Instruments are independent: each one is fetched, annotated and filtered
/// on its own, up to `concurrency` at a time. Results come back in universe
/// order regardless of completion order.
pub struct ScreenerEngine<P: DataProvider + ?Sized> {
    provider: Arc<P>,
    policy: FetchPolicy,
    concurrency: usize,
    cancel: CancelHandle,
}

impl<P: DataProvider + ?Sized> ScreenerEngine<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            policy: FetchPolicy::default(),
            concurrency: 4,
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Handle for stopping the run between instruments.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Screen `universe` and return only the passing rows, in input order.
    pub async fn screen(
        &self,
        universe: &[String],
        range: DateRange,
        criteria: &ScreenCriteria,
    ) -> Result<Vec<ScreenResult>, ScreenError> {
        Ok(self.run(universe, range, criteria).await?.results)
    }

    /// Screen `universe` and return the full report.
    pub async fn run(
        &self,
        universe: &[String],
        range: DateRange,
        criteria: &ScreenCriteria,
    ) -> Result<ScreenReport, ScreenError> {
        criteria.validate()?;
        if !range.is_valid() {
            return Err(ScreenError::InvalidDateRange {
                start: range.start,
                end: range.end,
            });
        }
        let symbols = normalize_symbols(universe);
        if symbols.is_empty() {
            return Err(ScreenError::EmptyUniverse);
        }

        self.cancel.reset();
        let started_at = Utc::now();
        let id = format!("scan_{}", started_at.format("%Y%m%d_%H%M%S"));
        let total_scanned = symbols.len();
        let required = criteria.required_history();

        info!(
            scan_id = %id,
            provider = self.provider.name(),
            instruments = total_scanned,
            range = %range,
            required_history = required,
            "Starting screening run"
        );

        let indicator_engine =
            IndicatorEngine::new(criteria.price_change_window, criteria.volume_change_window);
        let filter = ScreeningFilter::new(criteria.clone());

        let evaluations: Vec<(String, Evaluation)> = stream::iter(symbols)
            .map(|symbol| {
                let indicator_engine = &indicator_engine;
                let filter = &filter;
                async move {
                    let evaluation = self
                        .evaluate(&symbol, range, indicator_engine, filter, required)
                        .await;
                    (symbol, evaluation)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut results = Vec::new();
        let mut skipped = Vec::new();
        let mut rejected: BTreeMap<Criterion, usize> = BTreeMap::new();

        for (symbol, evaluation) in evaluations {
            match evaluation {
                Evaluation::Passed(result) => results.push(result),
                Evaluation::Rejected(criterion) => *rejected.entry(criterion).or_default() += 1,
                Evaluation::Skipped(reason) => skipped.push(Skip { symbol, reason }),
            }
        }

        let completed_at = Utc::now();
        let report = ScreenReport {
            id,
            results,
            skipped,
            rejections: rejected
                .into_iter()
                .map(|(criterion, count)| RejectionCount { criterion, count })
                .collect(),
            total_scanned,
            criteria_summary: criteria.summary(),
            date_range: range,
            started_at,
            completed_at,
            duration_secs: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
        };

        info!(scan_id = %report.id, "{}", report.summary());
        Ok(report)
    }

    async fn evaluate(
        &self,
        symbol: &str,
        range: DateRange,
        indicator_engine: &IndicatorEngine,
        filter: &ScreeningFilter,
        required: usize,
    ) -> Evaluation {
        if self.cancel.is_cancelled() {
            debug!(symbol, "Run cancelled, not starting");
            return Evaluation::Skipped(SkipReason::Cancelled);
        }

        let series =
            match fetch_daily_series(self.provider.as_ref(), symbol, range, &self.policy).await {
                FetchOutcome::Available(series) => series,
                FetchOutcome::Unavailable(reason) => {
                    debug!(symbol, reason = %reason, "Skipping: data unavailable");
                    return Evaluation::Skipped(SkipReason::DataUnavailable { reason });
                }
            };

        if series.len() < required {
            debug!(symbol, required, actual = series.len(), "Skipping: insufficient history");
            return Evaluation::Skipped(SkipReason::InsufficientHistory {
                required,
                actual: series.len(),
            });
        }

        let (Some(indicators), Some(as_of)) =
            (indicator_engine.compute(&series), series.last_timestamp())
        else {
            return Evaluation::Skipped(SkipReason::DataUnavailable {
                reason: "empty series".to_string(),
            });
        };

        match filter.evaluate(&indicators) {
            FilterOutcome::Pass => {
                debug!(symbol, close = indicators.close, "Passed");
                Evaluation::Passed(ScreenResult {
                    symbol: symbol.to_string(),
                    as_of,
                    indicators,
                })
            }
            FilterOutcome::Fail(criterion) => {
                debug!(symbol, criterion = ?criterion, "Rejected");
                Evaluation::Rejected(criterion)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
