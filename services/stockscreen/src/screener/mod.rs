//! Stock screener module.
//!
//! Two passes share the same data layer:
//!
//! - **Daily screen**: moving averages, price change and volume change
//!   checked against [`ScreenCriteria`] for every instrument in a universe
//! - **Trend scan**: regression trend labels for the day's top
//!   institutional net buyers, on intraday candles
//!
//! # Filter Order
//!
//! 1. **Price**: latest close at or above the floor
//! 2. **Liquidity**: 20-day average volume (lots) at or above the floor
//! 3. **Momentum**: price change over the lookback
//! 4. **Participation**: average volume change between adjacent windows
//! 5. **Trend**: close at or above each required moving average
//!
//! # Usage
//!
//! ```ignore
//! use stockscreen::screener::{ScreenCriteria, ScreenerEngine};
//!
//! let engine = ScreenerEngine::new(provider);
//! let report = engine.run(&universe, range, &ScreenCriteria::default()).await?;
//! println!("{}", report.summary());
//! ```

mod criteria;
mod engine;
mod filter;
mod intraday;

pub use criteria::{LookbackPeriod, ScreenCriteria};
pub use engine::{
    CancelHandle, RejectionCount, ScreenError, ScreenReport, ScreenResult, ScreenerEngine, Skip,
    SkipReason,
};
pub use filter::{Criterion, FilterOutcome, ScreeningFilter};
pub use intraday::{TrendRow, TrendScanReport, TrendScanner};
