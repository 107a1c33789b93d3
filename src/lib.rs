pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod output;
pub mod partition;
pub mod pipeline;
pub mod pool;
pub mod transfer;
