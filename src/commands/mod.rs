pub mod backtest;
pub mod count;
pub mod optimize;
