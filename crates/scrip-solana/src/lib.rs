//! scrip-solana: adapter for the solana treasury program
//!
//! keccak message hashing signed with the ots ed25519 key, verified
//! on-chain by an ed25519-program instruction placed directly before the
//! withdraw instruction. double-spend state is a nullifier pda per
//! (batch, tree index), so the usage scanner is an account-existence
//! check rather than a log query

pub mod adapter;
pub mod batch;
pub mod ed25519;
pub mod instruction;
pub mod scanner;

pub use adapter::SolanaAdapter;
pub use batch::{select_batch, BatchAccount, SCAN_CEILING};
