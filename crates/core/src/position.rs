//! Position records shared between the engine, the persisted store, and the
//! external dashboard writer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Directional bias of a position. Spreads carry the bias of their long leg
/// (a bullish call spread is `Long`, a bearish put spread is `Short`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    Stop,
    Target,
    EndOfDay,
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "STOP-LOSS"),
            Self::Target => write!(f, "TAKE-PROFIT"),
            Self::EndOfDay => write!(f, "EOD_SQUARE_OFF"),
            Self::Manual => write!(f, "MANUAL"),
        }
    }
}

/// Prices on the traded instrument itself. Realized P&L is always settled
/// against these, regardless of which feed triggered the exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementPrices {
    pub entry: Decimal,
    pub stop: Decimal,
    pub target: Decimal,
}

/// Prices on the reference feed (e.g. the underlying index) that drive the
/// exit decision. For non-derivative instruments these equal the settlement
/// prices. `target: None` means the take-profit is not trigger-driven
/// (spreads exit on premium expansion instead).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerPrices {
    /// Feed symbol whose ticks drive the exit decision (the traded symbol
    /// itself in the degenerate case).
    pub symbol: String,
    pub entry: Decimal,
    pub stop: Decimal,
    pub target: Option<Decimal>,
}

/// Spread-only economics: the short leg and the premium structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadLegs {
    pub sell_symbol: String,
    pub buy_premium: Decimal,
    pub sell_premium: Decimal,
    /// `buy_premium - sell_premium`; what one unit of the spread cost.
    pub net_debit: Decimal,
    /// `spread_width - net_debit`; the theoretical payoff ceiling.
    pub max_profit: Decimal,
    /// Absolute premium gain at which we take profit.
    pub profit_target: Decimal,
    pub spread_width: Decimal,
}

/// Single-leg vs two-leg variant. The store serializes this inline so the
/// dashboard can branch on the `kind` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PositionKind {
    Single,
    Spread(SpreadLegs),
}

/// An open position, keyed in the account by its (buy-leg) symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub symbol: String,
    pub quantity: u32,
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub settlement: SettlementPrices,
    pub trigger: TriggerPrices,
    #[serde(flatten)]
    pub kind: PositionKind,
}

impl Position {
    pub fn is_spread(&self) -> bool {
        matches!(self.kind, PositionKind::Spread(_))
    }

    pub fn spread(&self) -> Option<&SpreadLegs> {
        match &self.kind {
            PositionKind::Spread(legs) => Some(legs),
            PositionKind::Single => None,
        }
    }

    /// Capital held against this position. For spreads the settlement entry
    /// is the net debit, so the same formula covers both kinds.
    pub fn used_margin(&self) -> Decimal {
        self.settlement.entry * Decimal::from(self.quantity)
    }

    /// Direction label for the store and trade log
    /// (`LONG`, `SHORT`, `SPREAD_LONG`, `SPREAD_SHORT`).
    pub fn direction_label(&self) -> &'static str {
        match (&self.kind, self.direction) {
            (PositionKind::Single, Direction::Long) => "LONG",
            (PositionKind::Single, Direction::Short) => "SHORT",
            (PositionKind::Spread(_), Direction::Long) => "SPREAD_LONG",
            (PositionKind::Spread(_), Direction::Short) => "SPREAD_SHORT",
        }
    }

    /// Human-readable name for log lines; spreads show both legs.
    pub fn display_symbol(&self) -> String {
        match &self.kind {
            PositionKind::Spread(legs) => {
                format!("SPREAD: {} / {}", self.symbol, legs.sell_symbol)
            }
            PositionKind::Single => self.symbol.clone(),
        }
    }
}

/// A settled trade, appended to the account's in-memory log and the CSV
/// trade log. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trade_id: i64,
    pub symbol: String,
    pub status: String,
    pub reason: ExitReason,
    pub direction: String,
    pub quantity: u32,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub pnl: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn single(symbol: &str) -> Position {
        Position {
            id: 1,
            symbol: symbol.to_string(),
            quantity: 100,
            direction: Direction::Long,
            entry_time: Utc::now(),
            settlement: SettlementPrices {
                entry: dec!(150),
                stop: dec!(140),
                target: dec!(190),
            },
            trigger: TriggerPrices {
                symbol: symbol.to_string(),
                entry: dec!(150),
                stop: dec!(135),
                target: Some(dec!(180)),
            },
            kind: PositionKind::Single,
        }
    }

    fn spread(symbol: &str) -> Position {
        Position {
            id: 2,
            symbol: symbol.to_string(),
            quantity: 65,
            direction: Direction::Long,
            entry_time: Utc::now(),
            settlement: SettlementPrices {
                entry: dec!(26.5),
                stop: dec!(0),
                target: dec!(30.48),
            },
            trigger: TriggerPrices {
                symbol: "NSE:NIFTY50-INDEX".to_string(),
                entry: dec!(25135),
                stop: dec!(25080),
                target: None,
            },
            kind: PositionKind::Spread(SpreadLegs {
                sell_symbol: "NSE:NIFTY25SEP25200CE".to_string(),
                buy_premium: dec!(110.5),
                sell_premium: dec!(84.0),
                net_debit: dec!(26.5),
                max_profit: dec!(23.5),
                profit_target: dec!(3.98),
                spread_width: dec!(50),
            }),
        }
    }

    #[test]
    fn used_margin_is_settlement_entry_times_quantity() {
        assert_eq!(single("NSE:RELIANCE-EQ").used_margin(), dec!(15000));
        assert_eq!(spread("NSE:NIFTY25SEP25150CE").used_margin(), dec!(1722.5));
    }

    #[test]
    fn direction_labels_cover_spread_variants() {
        assert_eq!(single("A").direction_label(), "LONG");
        assert_eq!(spread("B").direction_label(), "SPREAD_LONG");
    }

    #[test]
    fn position_serde_round_trip_preserves_kind_and_timestamps() {
        let pos = spread("NSE:NIFTY25SEP25150CE");
        let json = serde_json::to_string(&pos).unwrap();
        assert!(json.contains("\"kind\":\"spread\""));
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pos);
        assert_eq!(back.entry_time, pos.entry_time);
    }
}
