//! Consumed collaborator interfaces.
//!
//! The authenticated broker and the instrument-resolution service live
//! outside this workspace; the engine only sees these traits.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::events::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Call/put, in the exchange's CE/PE convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "CE"),
            Self::Put => write!(f, "PE"),
        }
    }
}

/// One leg of an order to place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTicket {
    pub symbol: String,
    pub quantity: u32,
    /// `None` places a market order.
    pub limit_price: Option<Decimal>,
}

/// Broker acknowledgement of a placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub filled_at: DateTime<Utc>,
}

/// A resolved option contract with its current pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionLeg {
    pub symbol: String,
    /// Last traded premium.
    pub premium: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
}

/// The authenticated broker connection (historical bars, quotes, orders).
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Fetch OHLC bars for `symbol` at the given resolution (e.g. "5" for
    /// five-minute bars), inclusive of both dates.
    async fn fetch_bars(
        &self,
        symbol: &str,
        resolution: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>>;

    /// Fetch last traded prices for a batch of symbols.
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>>;

    /// Place a single-leg market order.
    async fn place_market_order(
        &self,
        symbol: &str,
        quantity: u32,
        side: OrderSide,
    ) -> Result<OrderAck>;

    /// Place both legs of a spread as one multi-leg order.
    async fn place_spread_order(&self, buy: &OrderTicket, sell: &OrderTicket) -> Result<OrderAck>;
}

/// Maps (underlying, option type, strike offset) to a tradable contract.
/// Offset 0 is at-the-money; positive offsets step out-of-the-money.
#[async_trait]
pub trait InstrumentResolver: Send + Sync {
    async fn resolve(
        &self,
        underlying: &str,
        option_type: OptionType,
        strike_offset: i32,
    ) -> Result<OptionLeg>;
}
