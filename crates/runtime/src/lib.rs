pub mod tick_loop;

pub use tick_loop::TickLoop;
