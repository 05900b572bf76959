//! Admission-control sizing. Pure functions so rejection paths are trivially
//! testable.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use orb_core::error::{EngineError, Result};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Sizes a derivative trade by stop distance: how many lots can lose
/// `stop_distance` points each before the risk budget is spent.
///
/// # Errors
/// `InvalidStop` when the distance is not positive, `RiskExceeded` when even
/// one lot overshoots the budget.
pub fn size_index_trade(
    balance: Decimal,
    risk_pct: Decimal,
    stop_distance: Decimal,
    lot_size: u32,
) -> Result<u32> {
    if stop_distance <= Decimal::ZERO {
        return Err(EngineError::invalid_stop(
            "stop distance must be positive",
        ));
    }

    let budget = balance * risk_pct / HUNDRED;
    let risk_per_lot = stop_distance * Decimal::from(lot_size);
    let lots = (budget / risk_per_lot).floor();

    match lots.to_u32() {
        Some(lots) if lots >= 1 => Ok(lots),
        _ => Err(EngineError::RiskExceeded {
            risk_per_unit: risk_per_lot,
            budget,
        }),
    }
}

/// Sizes a direct (per-share) trade by entry/stop distance, capped by the
/// capital actually available for the notional.
///
/// # Errors
/// `InvalidStop` when entry equals stop, `RiskExceeded` when the budget does
/// not cover a single share, `InsufficientCapital` when the balance cannot
/// carry even one share at the entry price.
pub fn size_equity_trade(
    balance: Decimal,
    risk_pct: Decimal,
    entry: Decimal,
    stop: Decimal,
) -> Result<u32> {
    let risk_per_unit = (entry - stop).abs();
    if risk_per_unit == Decimal::ZERO {
        return Err(EngineError::invalid_stop("entry and stop must differ"));
    }

    let budget = balance * risk_pct / HUNDRED;
    let size = (budget / risk_per_unit).floor();
    let Some(mut size) = size.to_u32().filter(|s| *s >= 1) else {
        return Err(EngineError::RiskExceeded {
            risk_per_unit,
            budget,
        });
    };

    // Risk budget may allow more notional than the account holds.
    if entry * Decimal::from(size) > balance {
        size = (balance / entry).floor().to_u32().unwrap_or(0);
        if size < 1 {
            return Err(EngineError::InsufficientCapital {
                required: entry,
                available: balance,
            });
        }
    }

    Ok(size)
}
