//! CSV-driven market replay: a tick producer plus broker/resolver stand-ins
//! so the whole agent runs offline against recorded sessions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use csv::Reader;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use orb_core::error::{EngineError, Result};
use orb_core::events::{Bar, Tick};
use orb_core::traits::{
    BrokerClient, InstrumentResolver, OptionLeg, OptionType, OrderAck, OrderSide, OrderTicket,
};

#[derive(Debug, Deserialize)]
struct TickRow {
    timestamp: DateTime<Utc>,
    symbol: String,
    price: Decimal,
}

/// Replays recorded ticks into the loop's channel in file order.
pub struct ReplayFeed {
    ticks: Vec<Tick>,
}

impl ReplayFeed {
    /// Loads ticks from a CSV with columns `timestamp,symbol,price`.
    ///
    /// # Errors
    /// Fails on unreadable files or malformed rows.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = Reader::from_path(path.as_ref())
            .map_err(|e| EngineError::persistence(e.to_string()))?;
        let mut ticks = Vec::new();
        for row in reader.deserialize() {
            let row: TickRow = row.map_err(|e| EngineError::persistence(e.to_string()))?;
            ticks.push(Tick {
                symbol: row.symbol,
                price: row.price,
                timestamp: row.timestamp,
            });
        }
        info!(count = ticks.len(), "Loaded replay ticks");
        Ok(Self { ticks })
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Sends every tick, then drops the sender so the consumer sees the feed
    /// end. Stops early if the consumer goes away.
    pub async fn stream(self, tx: mpsc::Sender<Tick>) {
        for tick in self.ticks {
            if tx.send(tick).await.is_err() {
                debug!("Tick consumer gone, stopping replay");
                break;
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct BarRow {
    symbol: String,
    timestamp: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

/// Broker stand-in backed by recorded bars and static quotes. Orders are
/// acknowledged immediately with a synthetic id.
#[derive(Default)]
pub struct ReplayBroker {
    bars: HashMap<String, Vec<Bar>>,
    quotes: Mutex<HashMap<String, Decimal>>,
    next_order: AtomicU64,
}

impl ReplayBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads bars from a CSV with columns
    /// `symbol,timestamp,open,high,low,close,volume`.
    ///
    /// # Errors
    /// Fails on unreadable files or malformed rows.
    pub fn load_bars_csv(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mut reader = Reader::from_path(path.as_ref())
            .map_err(|e| EngineError::persistence(e.to_string()))?;
        let mut count = 0usize;
        for row in reader.deserialize() {
            let row: BarRow = row.map_err(|e| EngineError::persistence(e.to_string()))?;
            self.bars.entry(row.symbol).or_default().push(Bar {
                timestamp: row.timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
            count += 1;
        }
        info!(count, "Loaded replay bars");
        Ok(())
    }

    /// Fixed last-traded price served by `fetch_quotes`, e.g. for square-off
    /// valuation of option legs.
    pub fn set_quote(&self, symbol: &str, price: Decimal) {
        self.quotes.lock().unwrap().insert(symbol.to_string(), price);
    }

    fn next_order_id(&self) -> String {
        format!("REPLAY-{}", self.next_order.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl BrokerClient for ReplayBroker {
    async fn fetch_bars(
        &self,
        symbol: &str,
        _resolution: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>> {
        let Some(bars) = self.bars.get(symbol) else {
            return Ok(Vec::new());
        };
        Ok(bars
            .iter()
            .filter(|bar| {
                let day = bar.timestamp.date_naive();
                day >= from && day <= to
            })
            .cloned()
            .collect())
    }

    async fn fetch_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>> {
        let quotes = self.quotes.lock().unwrap();
        Ok(symbols
            .iter()
            .filter_map(|sym| quotes.get(sym).map(|price| (sym.clone(), *price)))
            .collect())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        quantity: u32,
        side: OrderSide,
    ) -> Result<OrderAck> {
        let order_id = self.next_order_id();
        info!(order_id = %order_id, symbol, quantity, ?side, "Replay market order filled");
        Ok(OrderAck {
            order_id,
            filled_at: Utc::now(),
        })
    }

    async fn place_spread_order(&self, buy: &OrderTicket, sell: &OrderTicket) -> Result<OrderAck> {
        let order_id = self.next_order_id();
        info!(
            order_id = %order_id,
            buy = %buy.symbol,
            sell = %sell.symbol,
            quantity = buy.quantity,
            "Replay spread order filled"
        );
        Ok(OrderAck {
            order_id,
            filled_at: Utc::now(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChainRow {
    underlying: String,
    option_type: String,
    strike_offset: i32,
    symbol: String,
    premium: Decimal,
    bid: Decimal,
    ask: Decimal,
}

/// Option-chain lookup backed by a recorded snapshot.
#[derive(Default)]
pub struct ReplayResolver {
    legs: HashMap<(String, String, i32), OptionLeg>,
}

impl ReplayResolver {
    /// Loads the chain from a CSV with columns
    /// `underlying,option_type,strike_offset,symbol,premium,bid,ask`
    /// (option type in CE/PE convention).
    ///
    /// # Errors
    /// Fails on unreadable files or malformed rows.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = Reader::from_path(path.as_ref())
            .map_err(|e| EngineError::persistence(e.to_string()))?;
        let mut legs = HashMap::new();
        for row in reader.deserialize() {
            let row: ChainRow = row.map_err(|e| EngineError::persistence(e.to_string()))?;
            legs.insert(
                (row.underlying, row.option_type, row.strike_offset),
                OptionLeg {
                    symbol: row.symbol,
                    premium: row.premium,
                    bid: row.bid,
                    ask: row.ask,
                },
            );
        }
        info!(count = legs.len(), "Loaded replay option chain");
        Ok(Self { legs })
    }
}

#[async_trait]
impl InstrumentResolver for ReplayResolver {
    async fn resolve(
        &self,
        underlying: &str,
        option_type: OptionType,
        strike_offset: i32,
    ) -> Result<OptionLeg> {
        self.legs
            .get(&(
                underlying.to_string(),
                option_type.to_string(),
                strike_offset,
            ))
            .cloned()
            .ok_or_else(|| {
                EngineError::external(format!(
                    "no contract in chain for {underlying} {option_type} offset {strike_offset}"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn ticks_stream_in_file_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ticks.csv");
        std::fs::write(
            &path,
            "timestamp,symbol,price\n\
             2026-08-28T03:46:00Z,NSE:NIFTY50-INDEX,25100\n\
             2026-08-28T03:47:00Z,NSE:NIFTY50-INDEX,25110.5\n",
        )
        .unwrap();

        let feed = ReplayFeed::from_csv(&path).unwrap();
        assert_eq!(feed.len(), 2);

        let (tx, mut rx) = mpsc::channel(8);
        feed.stream(tx).await;
        assert_eq!(rx.recv().await.unwrap().price, dec!(25100));
        assert_eq!(rx.recv().await.unwrap().price, dec!(25110.5));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn bars_are_filtered_by_symbol_and_date() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bars.csv");
        std::fs::write(
            &path,
            "symbol,timestamp,open,high,low,close,volume\n\
             NSE:NIFTY50-INDEX,2026-08-28T03:45:00Z,25090,25110,25080,25105,1000\n\
             NSE:NIFTY50-INDEX,2026-08-27T03:45:00Z,25000,25010,24990,25005,900\n\
             NSE:NIFTYBANK-INDEX,2026-08-28T03:45:00Z,56000,56100,55900,56050,500\n",
        )
        .unwrap();

        let mut broker = ReplayBroker::new();
        broker.load_bars_csv(&path).unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();
        let bars = broker
            .fetch_bars("NSE:NIFTY50-INDEX", "5", day, day)
            .await
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].high, dec!(25110));
    }

    #[tokio::test]
    async fn quotes_return_only_known_symbols() {
        let broker = ReplayBroker::new();
        broker.set_quote("A", dec!(101.5));

        let quotes = broker
            .fetch_quotes(&["A".to_string(), "B".to_string()])
            .await
            .unwrap();
        assert_eq!(quotes.get("A"), Some(&dec!(101.5)));
        assert!(!quotes.contains_key("B"));
    }

    #[tokio::test]
    async fn chain_resolution_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain.csv");
        std::fs::write(
            &path,
            "underlying,option_type,strike_offset,symbol,premium,bid,ask\n\
             NIFTY,CE,0,NSE:NIFTY25SEP25150CE,110.5,110,111\n\
             NIFTY,CE,1,NSE:NIFTY25SEP25200CE,84,83.5,84.5\n",
        )
        .unwrap();

        let resolver = ReplayResolver::from_csv(&path).unwrap();
        let atm = resolver.resolve("NIFTY", OptionType::Call, 0).await.unwrap();
        assert_eq!(atm.symbol, "NSE:NIFTY25SEP25150CE");
        assert_eq!(atm.premium, dec!(110.5));

        let err = resolver.resolve("NIFTY", OptionType::Put, 0).await.unwrap_err();
        assert!(matches!(err, EngineError::ExternalService(_)));
    }
}
