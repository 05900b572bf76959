pub mod replay;

pub use replay::{ReplayBroker, ReplayFeed, ReplayResolver};
