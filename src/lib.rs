//! Batch distribution of native coin, ERC-20 tokens and ERC-721 tokens
//! through a disperse contract.

pub mod aggregate;
pub mod approval;
pub mod asset_mode;
pub mod balance;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod engine;
pub mod errors;
pub mod ethers_client;
pub mod executor;
pub mod generation;
pub mod gui;
pub mod operation_log;
pub mod recipients;
pub mod types;
pub mod user_settings;
pub mod utils;
pub mod wallet;

#[cfg(test)]
mod testing;
