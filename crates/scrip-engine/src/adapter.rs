//! chain adapter and scanner seams

use async_trait::async_trait;

use scrip_core::{OtsKey, Result};

/// normalized submission outcome
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainReceipt {
    pub tx_hash: String,
    /// the authoritative on-chain batch id the adapter actually used,
    /// which may differ from the key's cached hint
    pub merkle_root_id: u64,
}

/// authoritative usage verdict for one key
///
/// `Unavailable` is distinct from `Unused` on purpose: an unreachable rpc
/// must never be reported as "safe to spend"
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UsageStatus {
    Unused,
    Used,
    Unavailable { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyUsage {
    pub key_index: u32,
    pub tree_index: u64,
    pub status: UsageStatus,
}

/// chain-family-specific message hashing, signing and submission
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// chain this adapter is configured for
    fn chain_id(&self) -> u64;

    /// confirm the connected endpoint serves the chain the key requires;
    /// a mismatch is `NetworkMismatch`, handled by the orchestrator's
    /// switch-and-retry-once flow
    async fn verify_network(&self, key: &OtsKey) -> Result<()>;

    /// authoritative usage check against live chain state; one soft verdict
    /// per key, never a method-level error for a single unreachable key
    async fn check_keys(&self, keys: &[OtsKey]) -> Vec<KeyUsage>;

    /// derive the message, sign with the ots private key, submit the
    /// withdrawal and wait (bounded) for confirmation
    async fn redeem(&self, key: &OtsKey, recipient: &str) -> Result<ChainReceipt>;
}

/// wallet-layer hook asked to move the connection to another chain when
/// the orchestrator hits a `NetworkMismatch`
#[async_trait]
pub trait NetworkSwitcher: Send + Sync {
    async fn switch_to(&self, chain_id: u64) -> Result<()>;
}
