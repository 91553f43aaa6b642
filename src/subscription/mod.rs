pub mod state;
pub mod watchdog;

pub use watchdog::Watchdog;
