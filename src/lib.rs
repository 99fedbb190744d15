pub mod capture;
pub mod classify;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod export;
pub mod job;
pub mod pipeline;
pub mod report;
pub mod save;
pub mod scan;
pub mod units;
pub mod util;
