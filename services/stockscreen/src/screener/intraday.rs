//! Intraday trend scan.
//!
//! Takes the day's institutional net-buyer ranking, fetches intraday candles
//! for the top candidates and classifies each one's trend. Rows keep the
//! ranking order.

use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::data::{
    fetch_intraday_series, fetch_net_buyers, DataProvider, FetchOutcome, FetchPolicy,
    RankedCandidate, Timeframe,
};
use crate::trend::{TrendClassifier, TrendDirection, TrendResult};

use super::engine::{CancelHandle, Skip, SkipReason};

/// One classified candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRow {
    /// 1-based position in the net-buyer ranking
    pub rank: usize,
    pub symbol: String,
    pub name: String,
    /// Net buy volume in lots
    pub net_volume: f64,
    pub trend: TrendResult,
}

/// Result of a trend scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendScanReport {
    /// Ranking date
    pub date: NaiveDate,
    pub timeframe: Timeframe,
    /// Candidates taken from the ranking
    pub candidates: usize,
    /// Classified candidates, in ranking order
    pub rows: Vec<TrendRow>,
    /// Candidates without usable intraday data
    pub skipped: Vec<Skip>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl TrendScanReport {
    /// Rows with the given direction.
    pub fn with_direction(&self, direction: TrendDirection) -> Vec<&TrendRow> {
        self.rows
            .iter()
            .filter(|r| r.trend.direction == direction)
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "Trend scan {} ({}): {} candidates, {} up, {} down, {} ranging, {} skipped",
            self.date,
            self.timeframe,
            self.candidates,
            self.with_direction(TrendDirection::Up).len(),
            self.with_direction(TrendDirection::Down).len(),
            self.with_direction(TrendDirection::Ranging).len(),
            self.skipped.len()
        )
    }
}

enum Classified {
    Row(TrendRow),
    Skipped(Skip),
}

/// Classifies the top net buyers of a day.
pub struct TrendScanner<P: DataProvider + ?Sized> {
    provider: Arc<P>,
    classifier: TrendClassifier,
    policy: FetchPolicy,
    concurrency: usize,
    top_n: usize,
    cancel: CancelHandle,
}

impl<P: DataProvider + ?Sized> TrendScanner<P> {
    pub fn new(provider: Arc<P>, classifier: TrendClassifier) -> Self {
        Self {
            provider,
            classifier,
            policy: FetchPolicy::default(),
            concurrency: 4,
            top_n: 20,
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

    /// Limit the candidates taken from the ranking.
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Scan the ranking for `date`. No ranking yields an empty report.
    pub async fn scan(
        &self,
        date: NaiveDate,
        lookback_days: u32,
        timeframe: Timeframe,
    ) -> TrendScanReport {
        self.cancel.reset();
        let started_at = Utc::now();
        let ranking = fetch_net_buyers(self.provider.as_ref(), date, &self.policy).await;
        let candidates: Vec<(usize, RankedCandidate)> = ranking
            .into_iter()
            .take(self.top_n)
            .enumerate()
            .map(|(i, c)| (i + 1, c))
            .collect();

        info!(
            date = %date,
            timeframe = %timeframe,
            candidates = candidates.len(),
            "Starting trend scan"
        );

        let total = candidates.len();
        let classified: Vec<Classified> = stream::iter(candidates)
            .map(|(rank, candidate)| self.classify_candidate(rank, candidate, lookback_days, timeframe))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut rows = Vec::new();
        let mut skipped = Vec::new();
        for item in classified {
            match item {
                Classified::Row(row) => rows.push(row),
                Classified::Skipped(skip) => skipped.push(skip),
            }
        }

        let report = TrendScanReport {
            date,
            timeframe,
            candidates: total,
            rows,
            skipped,
            started_at,
            completed_at: Utc::now(),
        };
        info!("{}", report.summary());
        report
    }

    async fn classify_candidate(
        &self,
        rank: usize,
        candidate: RankedCandidate,
        lookback_days: u32,
        timeframe: Timeframe,
    ) -> Classified {
        if self.cancel.is_cancelled() {
            return Classified::Skipped(Skip {
                symbol: candidate.symbol,
                reason: SkipReason::Cancelled,
            });
        }

        let outcome = fetch_intraday_series(
            self.provider.as_ref(),
            &candidate.symbol,
            timeframe,
            lookback_days,
            &self.policy,
        )
        .await;

        match outcome {
            FetchOutcome::Available(series) => {
                let trend = self.classifier.classify(&series);
                debug!(
                    symbol = %candidate.symbol,
                    direction = ?trend.direction,
                    strength = trend.strength,
                    r2 = trend.r2,
                    "Classified"
                );
                Classified::Row(TrendRow {
                    rank,
                    symbol: candidate.symbol,
                    name: candidate.name,
                    net_volume: candidate.net_volume,
                    trend,
                })
            }
            FetchOutcome::Unavailable(reason) => {
                debug!(symbol = %candidate.symbol, reason = %reason, "Skipping: no intraday data");
                Classified::Skipped(Skip {
                    symbol: candidate.symbol,
                    reason: SkipReason::DataUnavailable { reason },
                })
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
