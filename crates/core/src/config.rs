use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::instrument::InstrumentSpec;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub account: AccountConfig,
    pub session: SessionConfig,
    pub strategy: StrategyConfig,
    pub runtime: RuntimeConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub initial_balance: Decimal,
    /// Percent of balance risked per trade (1.0 = 1%).
    pub risk_pct: Decimal,
    /// Fixed brokerage per round trip (entry + exit orders).
    pub transaction_cost: Decimal,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            initial_balance: Decimal::from(100_000),
            risk_pct: Decimal::ONE,
            transaction_cost: Decimal::from(40),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub market_open: NaiveTime,
    /// Minutes after open that define the opening range.
    pub range_minutes: u32,
    /// Last wall time at which new entries are taken.
    pub entry_end: NaiveTime,
    /// End-of-day forced liquidation threshold.
    pub square_off: NaiveTime,
    /// Exchange timezone as minutes east of UTC (IST = +330).
    pub utc_offset_minutes: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            market_open: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            range_minutes: 15,
            entry_end: NaiveTime::from_hms_opt(11, 15, 0).unwrap(),
            square_off: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            utc_offset_minutes: 330,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Reject ranges wider than this percent of their midpoint.
    pub max_range_pct: Decimal,
    /// Spread take-profit as a percent of net debit.
    pub profit_target_pct: Decimal,
    /// Lots actually traded per spread, regardless of what the risk budget
    /// would allow.
    pub lots_per_spread: u32,
    pub instruments: Vec<InstrumentSpec>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            max_range_pct: Decimal::ONE,
            profit_target_pct: Decimal::from(15),
            lots_per_spread: 1,
            instruments: vec![InstrumentSpec::nifty(), InstrumentSpec::banknifty()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Slow-path interval: hot-reload sync, EOD check, entry scanning.
    pub analysis_interval_secs: u64,
    pub max_open_positions: usize,
    /// Consumer sleep when the tick queue is empty.
    pub idle_sleep_ms: u64,
    /// Back-off after an unexpected loop failure.
    pub error_backoff_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            analysis_interval_secs: 30,
            max_open_positions: 4,
            idle_sleep_ms: 100,
            error_backoff_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub positions_file: String,
    pub trade_log_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            positions_file: "paper_positions_scalper.json".to_string(),
            trade_log_file: "trade_log.csv".to_string(),
        }
    }
}
