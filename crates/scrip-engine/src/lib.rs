//! scrip-engine: composition root for withdrawal key redemption
//!
//! validate proof -> check nullifier -> sign -> submit -> update ledger,
//! in that order. chain specifics live behind [`adapter::ChainAdapter`];
//! the implementations are in scrip-evm and scrip-solana

pub mod adapter;
pub mod issuance;
pub mod redeem;

pub use adapter::{ChainAdapter, ChainReceipt, KeyUsage, NetworkSwitcher, UsageStatus};
pub use issuance::{verify_issued_keys, IssuanceClient, RequestSigner, WithdrawalRequestItem};
pub use redeem::{RedeemOptions, Redeemer};
