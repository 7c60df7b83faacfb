//! error taxonomy for engine operations
//!
//! every operation returns this single tagged type; cryptographic and
//! structural kinds are final, network kinds may be retried by the caller

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RedeemError>;

#[derive(Debug, Error)]
pub enum RedeemError {
    #[error("key already redeemed on-chain (tree index {tree_index})")]
    KeyAlreadyUsed { tree_index: u64 },

    #[error("merkle batch {root_id} is deactivated on-chain")]
    MerkleRootInactive { root_id: u64 },

    #[error("no on-chain merkle batch matches root {root}")]
    MerkleRootNotFound { root: String },

    #[error("merkle proof does not recompute to the claimed root; key is corrupted")]
    InvalidProof,

    #[error("treasury balance insufficient for this denomination; the issuer must replenish it")]
    InsufficientTreasuryFunds,

    #[error("signature rejected by the destination verifier: {0}")]
    InvalidSignature(String),

    #[error("invalid public key material: {0}")]
    InvalidPublicKey(String),

    #[error("connected to chain {actual}, key requires chain {expected}")]
    NetworkMismatch { expected: u64, actual: u64 },

    /// solana reports this for a duplicate submit of an already-landed
    /// transaction; the adapter maps it to success before it reaches callers
    #[error("transaction already processed")]
    TransactionAlreadyProcessed,

    #[error("usage verification unavailable: {0}")]
    VerificationUnavailable(String),

    #[error("decryption failed: wrong password or corrupted file")]
    DecryptionFailed,

    #[error("unknown key bundle version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown key bundle cipher {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("treasury misconfigured: {0}")]
    Misconfigured(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("issuance service error: {0}")]
    Issuance(String),

    #[error("malformed input: {0}")]
    Malformed(String),
}

impl RedeemError {
    /// whether the caller may retry after the underlying condition clears
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RedeemError::Rpc(_)
                | RedeemError::VerificationUnavailable(_)
                | RedeemError::Issuance(_)
                | RedeemError::NetworkMismatch { .. }
        )
    }
}
