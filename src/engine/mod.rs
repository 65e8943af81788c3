pub mod backtest;
pub mod grader;
pub mod scheduler;

pub use backtest::{replay, BacktestSummary, Backtester};
pub use grader::{Grader, RollingStats};
pub use scheduler::Scheduler;
