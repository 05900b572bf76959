//! Tradable underlyings and their contract parameters.
//!
//! These used to be scattered module constants; holding them as config-owned
//! data lets tests build instruments the engine has never heard of.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One index/underlying the strategy is allowed to trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Short name used as the cache key (e.g. "NIFTY").
    pub underlying: String,
    /// Feed symbol of the reference index (e.g. "NSE:NIFTY50-INDEX").
    pub feed_symbol: String,
    /// Contract lot size; quantities are always multiples of this.
    pub lot_size: u32,
    /// Distance between adjacent strikes, in index points.
    pub spread_width: Decimal,
    /// Opening ranges narrower than this are rejected as noise.
    pub min_range_points: Decimal,
}

impl InstrumentSpec {
    pub fn nifty() -> Self {
        Self {
            underlying: "NIFTY".to_string(),
            feed_symbol: "NSE:NIFTY50-INDEX".to_string(),
            lot_size: 65,
            spread_width: Decimal::from(50),
            min_range_points: Decimal::from(30),
        }
    }

    pub fn banknifty() -> Self {
        Self {
            underlying: "BANKNIFTY".to_string(),
            feed_symbol: "NSE:NIFTYBANK-INDEX".to_string(),
            lot_size: 30,
            spread_width: Decimal::from(100),
            min_range_points: Decimal::from(80),
        }
    }
}
