pub mod account;
pub mod store;
pub mod trade_log;

pub use account::PaperAccount;
pub use store::{diff_merge, JsonFileStore, SharedStore, SyncReport};
pub use trade_log::TradeLog;
