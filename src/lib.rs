pub mod backtester;
pub mod commands;
pub mod config;
pub mod error;
pub mod indicators;
pub mod market_data;
pub mod models;
pub mod optimizer;
pub mod optimizer_status;
pub mod param_grid;
pub mod performance;
pub mod report;
pub mod signals;
