pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod instrument;
pub mod position;
pub mod session;
pub mod traits;

pub use config::{
    AccountConfig, AppConfig, RuntimeConfig, SessionConfig, StoreConfig, StrategyConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{EngineError, Result};
pub use events::{Bar, Tick};
pub use instrument::InstrumentSpec;
pub use position::{
    ClosedTrade, Direction, ExitReason, Position, PositionKind, SettlementPrices, SpreadLegs,
    TriggerPrices,
};
pub use session::SessionClock;
pub use traits::{
    BrokerClient, InstrumentResolver, OptionLeg, OptionType, OrderAck, OrderSide, OrderTicket,
};
