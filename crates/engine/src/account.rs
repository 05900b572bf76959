//! Paper trading account — the position lifecycle state machine.
//!
//! Owns the in-memory position map and balance. Exits are decided on the
//! trigger (reference-feed) prices but settled at the instrument's own
//! settlement prices; see the dual-price fields on `Position`.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use orb_core::config::AccountConfig;
use orb_core::error::{EngineError, Result};
use orb_core::position::{
    ClosedTrade, Direction, ExitReason, Position, PositionKind, SettlementPrices, SpreadLegs,
    TriggerPrices,
};

use crate::store::{diff_merge, SharedStore};
use crate::trade_log::TradeLog;

pub struct PaperAccount<S: SharedStore> {
    initial_balance: Decimal,
    balance: Decimal,
    positions: HashMap<String, Position>,
    closed: Vec<ClosedTrade>,
    store: S,
    trade_log: TradeLog,
    transaction_cost: Decimal,
    next_id: i64,
}

impl<S: SharedStore> PaperAccount<S> {
    /// Creates the account, restoring any active positions from the store.
    pub fn new(config: &AccountConfig, mut store: S, trade_log: TradeLog) -> Self {
        let positions = match store.load() {
            Ok(positions) => {
                if !positions.is_empty() {
                    info!(count = positions.len(), "Restored active positions from store");
                }
                positions
            }
            Err(e) => {
                error!(error = %e, "Failed to load position store, starting empty");
                HashMap::new()
            }
        };

        info!(balance = %config.initial_balance, "Paper account initialized");

        Self {
            initial_balance: config.initial_balance,
            balance: config.initial_balance,
            positions,
            closed: Vec::new(),
            store,
            trade_log,
            transaction_cost: config.transaction_cost,
            next_id: Utc::now().timestamp_millis(),
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn initial_balance(&self) -> Decimal {
        self.initial_balance
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed
    }

    /// Settlement-entry cost of all open positions.
    pub fn used_margin(&self) -> Decimal {
        self.positions.values().map(Position::used_margin).sum()
    }

    pub fn available_balance(&self) -> Decimal {
        self.balance - self.used_margin()
    }

    /// Opens a single-leg position. The degenerate (equity) case passes the
    /// same prices as trigger and settlement.
    pub fn open_single(
        &mut self,
        symbol: &str,
        quantity: u32,
        direction: Direction,
        settlement: SettlementPrices,
        trigger: TriggerPrices,
    ) -> Result<()> {
        let cost = settlement.entry * Decimal::from(quantity);
        self.admit(symbol, quantity, cost)?;

        let position = Position {
            id: self.next_trade_id(),
            symbol: symbol.to_string(),
            quantity,
            direction,
            entry_time: Utc::now(),
            settlement,
            trigger,
            kind: PositionKind::Single,
        };

        info!(
            symbol,
            quantity,
            direction = %direction,
            entry = %position.settlement.entry,
            stop = %position.settlement.stop,
            target = %position.settlement.target,
            trigger_stop = %position.trigger.stop,
            "Position opened"
        );

        self.insert_and_persist(position);
        Ok(())
    }

    /// Opens a two-leg debit spread keyed by its buy-leg symbol. The
    /// settlement bracket is premium-based (entry = net debit, stop = 0 for
    /// full-debit loss, target = net debit + profit target); the trigger
    /// stop is the breakout invalidation level on the underlying.
    pub fn open_spread(
        &mut self,
        buy_symbol: &str,
        quantity: u32,
        direction: Direction,
        legs: SpreadLegs,
        trigger: TriggerPrices,
    ) -> Result<()> {
        let cost = legs.net_debit * Decimal::from(quantity);
        self.admit(buy_symbol, quantity, cost)?;

        let position = Position {
            id: self.next_trade_id(),
            symbol: buy_symbol.to_string(),
            quantity,
            direction,
            entry_time: Utc::now(),
            settlement: SettlementPrices {
                entry: legs.net_debit,
                stop: Decimal::ZERO,
                target: legs.net_debit + legs.profit_target,
            },
            trigger,
            kind: PositionKind::Spread(legs),
        };

        let legs = position.spread().unwrap();
        info!(
            buy = buy_symbol,
            sell = legs.sell_symbol,
            quantity,
            net_debit = %legs.net_debit,
            cost = %cost,
            max_profit = %legs.max_profit,
            target = %position.settlement.target,
            trigger_stop = %position.trigger.stop,
            "Spread position opened"
        );

        self.insert_and_persist(position);
        Ok(())
    }

    fn admit(&self, symbol: &str, quantity: u32, cost: Decimal) -> Result<()> {
        if quantity == 0 {
            return Err(EngineError::validation("quantity must be positive"));
        }
        if self.positions.contains_key(symbol) {
            warn!(symbol, "Already holding a position, new order ignored");
            return Err(EngineError::DuplicatePosition {
                symbol: symbol.to_string(),
            });
        }

        let available = self.available_balance();
        if cost > available {
            error!(symbol, cost = %cost, available = %available, "Order rejected: exceeds available balance");
            return Err(EngineError::InsufficientMargin {
                required: cost,
                available,
            });
        }
        Ok(())
    }

    fn insert_and_persist(&mut self, position: Position) {
        self.positions.insert(position.symbol.clone(), position);
        self.persist();
    }

    fn next_trade_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Checks the trigger-feed high/low against the position's trigger
    /// bracket. No-op when the symbol is not active, so redelivered ticks
    /// after a close are harmless. On a hit the position is closed at its
    /// *settlement* stop/target price.
    pub fn evaluate_exit(
        &mut self,
        symbol: &str,
        trigger_high: Decimal,
        trigger_low: Decimal,
    ) -> Option<ExitReason> {
        let (direction, trigger, settlement) = {
            let pos = self.positions.get(symbol)?;
            (pos.direction, pos.trigger.clone(), pos.settlement.clone())
        };

        match direction {
            Direction::Long => {
                if trigger_low <= trigger.stop {
                    self.close(symbol, ExitReason::Stop, settlement.stop);
                    return Some(ExitReason::Stop);
                }
                if let Some(target) = trigger.target {
                    if trigger_high >= target {
                        self.close(symbol, ExitReason::Target, settlement.target);
                        return Some(ExitReason::Target);
                    }
                }
            }
            Direction::Short => {
                if trigger_high >= trigger.stop {
                    self.close(symbol, ExitReason::Stop, settlement.stop);
                    return Some(ExitReason::Stop);
                }
                if let Some(target) = trigger.target {
                    if trigger_low <= target {
                        self.close(symbol, ExitReason::Target, settlement.target);
                        return Some(ExitReason::Target);
                    }
                }
            }
        }
        None
    }

    /// Closes a position at the given settlement price, settles P&L, logs
    /// the trade, and persists the shrunken map. No-op when absent.
    pub fn close(
        &mut self,
        symbol: &str,
        reason: ExitReason,
        settlement_exit: Decimal,
    ) -> Option<ClosedTrade> {
        let pos = self.positions.remove(symbol)?;

        let qty = Decimal::from(pos.quantity);
        let gross = match (&pos.kind, pos.direction) {
            // A debit spread profits when its premium expands past the debit.
            (PositionKind::Spread(_), _) => (settlement_exit - pos.settlement.entry) * qty,
            (PositionKind::Single, Direction::Long) => {
                (settlement_exit - pos.settlement.entry) * qty
            }
            (PositionKind::Single, Direction::Short) => {
                (pos.settlement.entry - settlement_exit) * qty
            }
        };
        let net = gross - self.transaction_cost;
        self.balance += net;

        let trade = ClosedTrade {
            trade_id: pos.id,
            symbol: pos.display_symbol(),
            status: "CLOSED".to_string(),
            reason,
            direction: pos.direction_label().to_string(),
            quantity: pos.quantity,
            entry_price: pos.settlement.entry,
            exit_price: settlement_exit,
            entry_time: pos.entry_time,
            exit_time: Utc::now(),
            stop_loss: pos.settlement.stop,
            take_profit: pos.settlement.target,
            pnl: net,
        };

        info!(
            symbol = %trade.symbol,
            reason = %reason,
            exit = %settlement_exit,
            pnl = %net,
            balance = %self.balance,
            "Position closed"
        );

        if let Err(e) = self.trade_log.append(&trade) {
            error!(error = %e, "Failed to write trade log row");
        }
        self.closed.push(trade.clone());
        self.persist();

        Some(trade)
    }

    /// Forced liquidation of every open position, e.g. at end of day.
    /// Spread exits are valued as buy LTP minus sell LTP; a missing quote
    /// falls back to the entry price (P&L = transaction cost only).
    pub fn close_all(&mut self, reason: ExitReason, prices: &HashMap<String, Decimal>) {
        let symbols: Vec<String> = self.positions.keys().cloned().collect();
        if symbols.is_empty() {
            info!("No positions to close");
            return;
        }

        info!(reason = %reason, count = symbols.len(), "Closing all positions");
        for symbol in symbols {
            let Some(pos) = self.positions.get(&symbol) else {
                continue;
            };

            let ltp = match pos.spread() {
                Some(legs) => {
                    let buy = prices.get(&symbol).copied().unwrap_or(Decimal::ZERO);
                    let sell = prices
                        .get(&legs.sell_symbol)
                        .copied()
                        .unwrap_or(Decimal::ZERO);
                    if buy > Decimal::ZERO && sell > Decimal::ZERO {
                        buy - sell
                    } else {
                        Decimal::ZERO
                    }
                }
                None => prices.get(&symbol).copied().unwrap_or(Decimal::ZERO),
            };

            let exit = if ltp > Decimal::ZERO {
                ltp
            } else {
                warn!(symbol = %symbol, "No quote available, closing at entry price");
                pos.settlement.entry
            };

            self.close(&symbol, reason, exit);
        }
    }

    /// Optimistic hot reload against the shared store: adopt externally
    /// opened positions, drop externally closed ones. Positions present on
    /// both sides stay as memory has them.
    pub fn sync(&mut self) -> Result<()> {
        if !self.store.modified_externally()? {
            return Ok(());
        }

        let disk = self.store.load()?;
        let report = diff_merge(&mut self.positions, disk);

        for symbol in &report.adopted {
            info!(symbol = %symbol, "Hot reload: adopted externally opened position");
        }
        for symbol in &report.dropped {
            info!(symbol = %symbol, "Hot reload: position closed externally, dropped");
        }
        if !report.is_empty() {
            info!(
                adopted = report.adopted.len(),
                dropped = report.dropped.len(),
                total = self.positions.len(),
                "Hot reload complete"
            );
        }
        Ok(())
    }

    fn persist(&mut self) {
        // In-memory state stays authoritative on failure; the next mutation
        // retries the write.
        if let Err(e) = self.store.save(&self.positions) {
            error!(error = %e, "Failed to save position store");
        }
    }

    /// Logs a realized-performance summary over the closed-trade log.
    pub fn summary(&self) {
        info!(
            initial = %self.initial_balance,
            balance = %self.balance,
            realized_pnl = %(self.balance - self.initial_balance),
            used_margin = %self.used_margin(),
            available = %self.available_balance(),
            open_positions = self.positions.len(),
            "Account summary"
        );

        if self.closed.is_empty() {
            info!("No closed trades yet");
            return;
        }

        let wins: Vec<&ClosedTrade> = self.closed.iter().filter(|t| t.pnl > Decimal::ZERO).collect();
        let losses: Vec<&ClosedTrade> =
            self.closed.iter().filter(|t| t.pnl <= Decimal::ZERO).collect();
        let total = Decimal::from(self.closed.len());
        let win_rate = Decimal::from(wins.len()) * Decimal::from(100) / total;
        let total_profit: Decimal = wins.iter().map(|t| t.pnl).sum();
        let total_loss: Decimal = losses.iter().map(|t| -t.pnl).sum();

        if total_loss > Decimal::ZERO {
            info!(
                trades = self.closed.len(),
                wins = wins.len(),
                losses = losses.len(),
                win_rate = %win_rate.round_dp(2),
                profit_factor = %(total_profit / total_loss).round_dp(2),
                "Trade statistics"
            );
        } else {
            info!(
                trades = self.closed.len(),
                wins = wins.len(),
                losses = losses.len(),
                win_rate = %win_rate.round_dp(2),
                "Trade statistics (no losing trades)"
            );
        }
    }
}
