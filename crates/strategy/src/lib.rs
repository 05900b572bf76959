pub mod breakout;
pub mod risk;
pub mod spread;

pub use breakout::{BreakoutDetector, BreakoutSignal, OpeningRange};
pub use risk::{size_equity_trade, size_index_trade};
pub use spread::SpreadExecutor;
