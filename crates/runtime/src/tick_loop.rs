//! Single-consumer tick processing loop.
//!
//! The producer (live feed or replay) pushes ticks into a channel; this loop
//! is the only task touching the account, detector, and last-price table, so
//! none of them need locks. Exit evaluation runs on every tick. Store sync,
//! the end-of-day check, and entry scanning run on a wall-clock throttle, so
//! a slow broker call delays subsequent exit checks by at most one cycle's
//! work.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Duration, Instant};
use tracing::{error, info, warn};

use orb_core::config::RuntimeConfig;
use orb_core::error::Result;
use orb_core::events::Tick;
use orb_core::instrument::InstrumentSpec;
use orb_core::position::ExitReason;
use orb_core::session::SessionClock;
use orb_core::traits::{BrokerClient, InstrumentResolver};
use orb_engine::{PaperAccount, SharedStore};
use orb_strategy::{BreakoutDetector, SpreadExecutor};

pub struct TickLoop<S: SharedStore> {
    config: RuntimeConfig,
    clock: SessionClock,
    instruments: Vec<InstrumentSpec>,
    account: PaperAccount<S>,
    detector: BreakoutDetector,
    executor: SpreadExecutor,
    broker: Arc<dyn BrokerClient>,
    resolver: Arc<dyn InstrumentResolver>,
    ticks: mpsc::Receiver<Tick>,
    shutdown: watch::Receiver<bool>,
    last_prices: HashMap<String, Decimal>,
    last_tick_time: Option<DateTime<Utc>>,
}

impl<S: SharedStore> TickLoop<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RuntimeConfig,
        clock: SessionClock,
        instruments: Vec<InstrumentSpec>,
        account: PaperAccount<S>,
        detector: BreakoutDetector,
        executor: SpreadExecutor,
        broker: Arc<dyn BrokerClient>,
        resolver: Arc<dyn InstrumentResolver>,
        ticks: mpsc::Receiver<Tick>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            clock,
            instruments,
            account,
            detector,
            executor,
            broker,
            resolver,
            ticks,
            shutdown,
            last_prices: HashMap::new(),
            last_tick_time: None,
        }
    }

    /// Runs until square-off, feed end, or the stop signal. Returns the
    /// account so callers can inspect the final state. A stop signal does
    /// not liquidate; open positions are resumed from the store on restart.
    pub async fn run(mut self) -> PaperAccount<S> {
        info!(
            interval_secs = self.config.analysis_interval_secs,
            max_open = self.config.max_open_positions,
            "Tick loop started"
        );

        let interval = Duration::from_secs(self.config.analysis_interval_secs);
        let idle = Duration::from_millis(self.config.idle_sleep_ms);
        let mut next_analysis = Instant::now();

        loop {
            let mut feed_ended = false;
            loop {
                match self.ticks.try_recv() {
                    Ok(tick) => self.on_tick(&tick),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        feed_ended = true;
                        break;
                    }
                }
            }

            if feed_ended {
                info!("Tick feed ended");
                // Last slow-path pass so a replay that runs past square-off
                // still liquidates.
                if let Err(e) = self.analysis_cycle().await {
                    error!(error = %e, "Final analysis cycle failed");
                }
                break;
            }

            if *self.shutdown.borrow() {
                info!("Stop signal received, leaving open positions for restart");
                break;
            }

            if Instant::now() >= next_analysis {
                next_analysis = Instant::now() + interval;
                match self.analysis_cycle().await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => {
                        error!(error = %e, "Analysis cycle failed, backing off");
                        sleep(Duration::from_secs(self.config.error_backoff_secs)).await;
                    }
                }
            }

            sleep(idle).await;
        }

        self.account.summary();
        self.account
    }

    /// Fast path: pure in-memory comparison, no I/O.
    fn on_tick(&mut self, tick: &Tick) {
        self.last_prices.insert(tick.symbol.clone(), tick.price);
        self.last_tick_time = Some(tick.timestamp);

        let driven: Vec<String> = self
            .account
            .positions()
            .values()
            .filter(|pos| pos.trigger.symbol == tick.symbol)
            .map(|pos| pos.symbol.clone())
            .collect();
        for symbol in driven {
            self.account.evaluate_exit(&symbol, tick.price, tick.price);
        }
    }

    /// Slow path. Returns `true` when the day is over and the loop should
    /// stop. Session time comes from the feed, so replays square off on
    /// historical time rather than the host clock; before the first tick
    /// only the store sync runs.
    async fn analysis_cycle(&mut self) -> Result<bool> {
        self.account.sync()?;

        let Some(now) = self.last_tick_time else {
            return Ok(false);
        };
        if self.clock.past_square_off(now) {
            let quotes = self.exit_quotes().await;
            self.account.close_all(ExitReason::EndOfDay, &quotes);
            info!("Square-off complete, stopping for the day");
            return Ok(true);
        }

        self.check_spread_targets().await;

        if self.clock.in_entry_window(now)
            && self.account.positions().len() < self.config.max_open_positions
        {
            self.scan_entries(now).await;
        }

        Ok(false)
    }

    /// Spread take-profits are premium-based (trigger target is `None`), so
    /// the spread's current value has to be quoted rather than derived from
    /// index ticks.
    async fn check_spread_targets(&mut self) {
        let spreads: Vec<(String, String, Decimal)> = self
            .account
            .positions()
            .values()
            .filter_map(|pos| {
                pos.spread()
                    .map(|legs| (pos.symbol.clone(), legs.sell_symbol.clone(), pos.settlement.target))
            })
            .collect();
        if spreads.is_empty() {
            return;
        }

        let mut symbols = Vec::with_capacity(spreads.len() * 2);
        for (buy, sell, _) in &spreads {
            symbols.push(buy.clone());
            symbols.push(sell.clone());
        }
        let quotes = match self.broker.fetch_quotes(&symbols).await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(error = %e, "Quote fetch failed, skipping premium check");
                return;
            }
        };

        for (buy, sell, target) in spreads {
            let (Some(buy_ltp), Some(sell_ltp)) = (quotes.get(&buy), quotes.get(&sell)) else {
                continue;
            };
            if *buy_ltp <= Decimal::ZERO || *sell_ltp <= Decimal::ZERO {
                continue;
            }
            let value = *buy_ltp - *sell_ltp;
            if value >= target {
                self.account.close(&buy, ExitReason::Target, value);
            }
        }
    }

    async fn scan_entries(&mut self, now: DateTime<Utc>) {
        let instruments = self.instruments.clone();
        for spec in &instruments {
            if self.account.positions().len() >= self.config.max_open_positions {
                break;
            }

            if let Err(e) = self.detector.range(self.broker.as_ref(), spec, now).await {
                if e.is_transient() {
                    warn!(underlying = %spec.underlying, error = %e, "Range fetch failed, retrying next cycle");
                } else {
                    warn!(underlying = %spec.underlying, error = %e, "No opening range today");
                }
                continue;
            }

            let Some(price) = self.last_prices.get(&spec.feed_symbol).copied() else {
                continue;
            };
            let Some(signal) = self.detector.signal(spec, now, price) else {
                continue;
            };

            match self
                .executor
                .try_enter(
                    self.broker.as_ref(),
                    self.resolver.as_ref(),
                    &mut self.account,
                    spec,
                    &signal,
                )
                .await
            {
                Ok(()) => self.detector.mark_consumed(&spec.underlying),
                Err(e) if e.is_transient() => {
                    warn!(underlying = %spec.underlying, error = %e, "Entry failed, retrying next cycle");
                }
                Err(e) => {
                    // Admission rejects and bad pricing burn the day's signal.
                    warn!(underlying = %spec.underlying, error = %e, "Entry rejected, signal consumed");
                    self.detector.mark_consumed(&spec.underlying);
                }
            }
        }
    }

    /// Best-effort quotes for forced liquidation; a failed fetch falls back
    /// to entry-price closes inside the account.
    async fn exit_quotes(&self) -> HashMap<String, Decimal> {
        let mut symbols: Vec<String> = Vec::new();
        for pos in self.account.positions().values() {
            symbols.push(pos.symbol.clone());
            if let Some(legs) = pos.spread() {
                symbols.push(legs.sell_symbol.clone());
            }
        }
        if symbols.is_empty() {
            return HashMap::new();
        }

        match self.broker.fetch_quotes(&symbols).await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(error = %e, "Quote fetch failed, positions will close at entry price");
                HashMap::new()
            }
        }
    }
}
