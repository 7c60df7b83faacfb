//! scrip-evm: adapter for evm-family treasuries
//!
//! message hashing and eip-191 signing with the ots secp256k1 key, batch
//! id location against the treasury contract, withdrawal submission, and
//! an event-log usage scanner batched per (treasury, root id) pair

pub mod adapter;
pub mod batch;
pub mod contract;
pub mod scanner;

pub use adapter::EvmAdapter;
pub use batch::{locate_batch, BatchSource, SCAN_CEILING};
