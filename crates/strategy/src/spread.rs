//! Turns a breakout candidate into a recorded two-leg debit spread.

use rust_decimal::Decimal;
use tracing::{info, warn};

use orb_core::config::{AccountConfig, StrategyConfig};
use orb_core::error::{EngineError, Result};
use orb_core::instrument::InstrumentSpec;
use orb_core::position::{Direction, SpreadLegs, TriggerPrices};
use orb_core::traits::{BrokerClient, InstrumentResolver, OptionType, OrderTicket};
use orb_engine::{PaperAccount, SharedStore};

use crate::breakout::BreakoutSignal;
use crate::risk::size_index_trade;

pub struct SpreadExecutor {
    risk_pct: Decimal,
    /// Take-profit as a percent of net debit.
    profit_target_pct: Decimal,
    /// Hard cap on lots per spread, below whatever the risk budget allows.
    lots_per_spread: u32,
}

impl SpreadExecutor {
    pub fn new(account: &AccountConfig, strategy: &StrategyConfig) -> Self {
        Self {
            risk_pct: account.risk_pct,
            profit_target_pct: strategy.profit_target_pct,
            lots_per_spread: strategy.lots_per_spread,
        }
    }

    /// Resolves both legs, prices and sizes the spread, places the paper
    /// order, and records the position. Buys at-the-money and sells one
    /// strike out-of-the-money in the signal's direction.
    ///
    /// # Errors
    /// Resolver/broker failures, `InvalidSpread` on non-positive debit, and
    /// any admission rejection from sizing or the account.
    pub async fn try_enter<S: SharedStore>(
        &self,
        broker: &dyn BrokerClient,
        resolver: &dyn InstrumentResolver,
        account: &mut PaperAccount<S>,
        spec: &InstrumentSpec,
        signal: &BreakoutSignal,
    ) -> Result<()> {
        let option_type = match signal.direction {
            Direction::Long => OptionType::Call,
            Direction::Short => OptionType::Put,
        };

        let buy = resolver.resolve(&spec.underlying, option_type, 0).await?;
        let sell = resolver.resolve(&spec.underlying, option_type, 1).await?;

        let net_debit = buy.premium - sell.premium;
        if net_debit <= Decimal::ZERO {
            warn!(
                buy = %buy.symbol,
                sell = %sell.symbol,
                net_debit = %net_debit,
                "Spread priced at a credit, skipping"
            );
            return Err(EngineError::InvalidSpread { net_debit });
        }

        let max_profit = spec.spread_width - net_debit;
        let profit_target = net_debit * self.profit_target_pct / Decimal::ONE_HUNDRED;

        // The whole debit is at risk if the spread expires worthless.
        let lots = size_index_trade(account.balance(), self.risk_pct, net_debit, spec.lot_size)?
            .min(self.lots_per_spread);
        let quantity = lots * spec.lot_size;

        info!(
            underlying = %spec.underlying,
            direction = %signal.direction,
            buy = %buy.symbol,
            sell = %sell.symbol,
            net_debit = %net_debit,
            lots,
            quantity,
            "Entering spread"
        );

        let ack = broker
            .place_spread_order(
                &OrderTicket {
                    symbol: buy.symbol.clone(),
                    quantity,
                    limit_price: None,
                },
                &OrderTicket {
                    symbol: sell.symbol.clone(),
                    quantity,
                    limit_price: None,
                },
            )
            .await?;
        info!(order_id = %ack.order_id, "Spread order filled");

        account.open_spread(
            &buy.symbol,
            quantity,
            signal.direction,
            SpreadLegs {
                sell_symbol: sell.symbol,
                buy_premium: buy.premium,
                sell_premium: sell.premium,
                net_debit,
                max_profit,
                profit_target,
                spread_width: spec.spread_width,
            },
            TriggerPrices {
                symbol: spec.feed_symbol.clone(),
                entry: signal.entry,
                stop: signal.stop,
                target: None,
            },
        )
    }
}
