//! evm chain adapter
//!
//! builds the exact message the treasury contract rebuilds on-chain,
//! signs it with the ots secp256k1 key under the eip-191 personal-message
//! convention, and submits the withdrawal

use std::time::Duration;

use alloy::{
    primitives::{keccak256, Address, Bytes, B256, U256},
    providers::{DynProvider, Provider},
    signers::{local::PrivateKeySigner, Signer},
};
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use scrip_core::{ChainEntry, MerkleBatch, OtsKey, RedeemError, Result};
use scrip_engine::{ChainAdapter, ChainReceipt, KeyUsage};

use crate::batch::{locate_batch, BatchSource};
use crate::contract::IOtsTreasury;
use crate::scanner;

const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(90);

pub struct EvmAdapter {
    provider: DynProvider,
    chain_id: u64,
    confirm_timeout: Duration,
}

impl EvmAdapter {
    /// the provider comes from the wallet/connection layer and already
    /// carries the submitting wallet; the chain entry comes from the
    /// explicit registry
    pub fn new(provider: DynProvider, chain: &ChainEntry) -> Self {
        Self {
            provider,
            chain_id: chain.chain_id,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
        }
    }

    pub fn with_confirm_timeout(mut self, confirm_timeout: Duration) -> Self {
        self.confirm_timeout = confirm_timeout;
        self
    }

    fn signer_for(key: &OtsKey) -> Result<PrivateKeySigner> {
        let signer = PrivateKeySigner::from_bytes(&B256::from(key.private_key))
            .map_err(|e| RedeemError::InvalidPublicKey(format!("bad private key: {e}")))?;
        let claimed: Address = key
            .public_address
            .parse()
            .map_err(|e| RedeemError::InvalidPublicKey(format!("bad address: {e}")))?;
        if signer.address() != claimed {
            return Err(RedeemError::InvalidPublicKey(
                "private key does not derive the claimed address".into(),
            ));
        }
        Ok(signer)
    }

    fn token_of(key: &OtsKey) -> Result<Address> {
        match &key.token_address {
            Some(addr) => addr
                .parse()
                .map_err(|e| RedeemError::Malformed(format!("bad token address: {e}"))),
            // zero-address sentinel for the native asset
            None => Ok(Address::ZERO),
        }
    }
}

/// keccak256(recipient ‖ token ‖ amount ‖ chain id), packed exactly as the
/// contract's abi.encodePacked
pub fn withdrawal_message(
    recipient: Address,
    token: Address,
    amount: U256,
    chain_id: u64,
) -> B256 {
    let mut packed = Vec::with_capacity(20 + 20 + 32 + 32);
    packed.extend_from_slice(recipient.as_slice());
    packed.extend_from_slice(token.as_slice());
    packed.extend_from_slice(&amount.to_be_bytes::<32>());
    packed.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    keccak256(&packed)
}

/// map an execution failure onto the error taxonomy; unrecognized revert
/// reasons pass through verbatim
pub fn map_execution_error(message: &str, tree_index: u64) -> RedeemError {
    let lower = message.to_lowercase();
    if lower.contains("key already used") || lower.contains("nullifier") {
        RedeemError::KeyAlreadyUsed { tree_index }
    } else if lower.contains("root inactive") {
        RedeemError::MerkleRootInactive { root_id: 0 }
    } else if lower.contains("insufficient treasury balance") {
        RedeemError::InsufficientTreasuryFunds
    } else if lower.contains("invalid signature") {
        RedeemError::InvalidSignature(message.to_string())
    } else {
        RedeemError::Rpc(message.to_string())
    }
}

struct EvmBatchSource {
    treasury: IOtsTreasury::IOtsTreasuryInstance<(), DynProvider>,
}

#[async_trait]
impl BatchSource for EvmBatchSource {
    async fn next_id(&self) -> Result<Option<u64>> {
        let next = self
            .treasury
            .nextRootId()
            .call()
            .await
            .map_err(|e| RedeemError::Rpc(e.to_string()))?;
        Ok(u64::try_from(next.next).ok())
    }

    async fn fetch(&self, id: u64) -> Result<Option<MerkleBatch>> {
        let entry = self
            .treasury
            .merkleRoots(U256::from(id))
            .call()
            .await
            .map_err(|e| RedeemError::Rpc(e.to_string()))?;
        // mapping default means the id was never published
        if entry.rootHash == B256::ZERO {
            return Ok(None);
        }
        Ok(Some(MerkleBatch {
            on_chain_id: id,
            root_hash: entry.rootHash.0,
            token_address: Some(format!("{:#x}", entry.token)),
            denomination_base_units: u128::try_from(entry.denomination)
                .map_err(|_| RedeemError::Malformed("denomination exceeds u128".into()))?,
            is_active: entry.active,
            total_keys: u64::try_from(entry.totalKeys).unwrap_or(u64::MAX),
            used_keys: u64::try_from(entry.usedKeys).unwrap_or(u64::MAX),
        }))
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn verify_network(&self, key: &OtsKey) -> Result<()> {
        let actual = self
            .provider
            .get_chain_id()
            .await
            .map_err(|e| RedeemError::Rpc(e.to_string()))?;
        if actual != key.chain_id {
            return Err(RedeemError::NetworkMismatch {
                expected: key.chain_id,
                actual,
            });
        }
        Ok(())
    }

    async fn check_keys(&self, keys: &[OtsKey]) -> Vec<KeyUsage> {
        scanner::scan_usage(&self.provider, keys).await
    }

    async fn redeem(&self, key: &OtsKey, recipient: &str) -> Result<ChainReceipt> {
        let treasury_address: Address = key
            .treasury_address
            .parse()
            .map_err(|e| RedeemError::Malformed(format!("bad treasury address: {e}")))?;
        let recipient: Address = recipient
            .parse()
            .map_err(|e| RedeemError::Malformed(format!("bad recipient: {e}")))?;
        let token = Self::token_of(key)?;
        let amount = U256::from(key.denomination_base_units);

        let treasury = IOtsTreasury::new(treasury_address, self.provider.clone());
        let batch = locate_batch(&EvmBatchSource { treasury }, key).await?;

        let message = withdrawal_message(recipient, token, amount, key.chain_id);
        let signer = Self::signer_for(key)?;
        let signature = signer
            .sign_message(message.as_slice())
            .await
            .map_err(|e| RedeemError::InvalidSignature(e.to_string()))?;
        debug!(tree_index = key.tree_index, root_id = batch.on_chain_id, "message signed");

        let proof: Vec<B256> = key.merkle_proof.iter().map(|h| B256::from(*h)).collect();
        let treasury = IOtsTreasury::new(treasury_address, self.provider.clone());
        let pending = treasury
            .withdraw(
                token,
                recipient,
                amount,
                U256::from(batch.on_chain_id),
                Bytes::from(signature.as_bytes().to_vec()),
                proof,
                U256::from(key.tree_index),
            )
            .send()
            .await
            .map_err(|e| map_execution_error(&e.to_string(), key.tree_index))?;

        let tx_hash = *pending.tx_hash();
        info!(%tx_hash, "withdrawal submitted");

        let receipt = match timeout(self.confirm_timeout, pending.get_receipt()).await {
            Ok(result) => result.map_err(|e| RedeemError::Rpc(e.to_string()))?,
            Err(_) => {
                // the tx can land after the wait gives up; check once by
                // hash before declaring failure
                warn!(%tx_hash, "confirmation wait timed out, re-querying");
                self.provider
                    .get_transaction_receipt(tx_hash)
                    .await
                    .map_err(|e| RedeemError::Rpc(e.to_string()))?
                    .ok_or_else(|| {
                        RedeemError::Rpc(format!("confirmation timed out for {tx_hash}"))
                    })?
            }
        };

        if !receipt.status() {
            return Err(map_execution_error("execution reverted", key.tree_index));
        }

        Ok(ChainReceipt {
            tx_hash: format!("{:#x}", receipt.transaction_hash),
            merkle_root_id: batch.on_chain_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_changes_with_every_field() {
        let recipient: Address = "0x00000000000000000000000000000000000000f1".parse().unwrap();
        let token: Address = "0x00000000000000000000000000000000000000f2".parse().unwrap();
        let amount = U256::from(100u64);

        let base = withdrawal_message(recipient, token, amount, 8453);
        assert_ne!(base, withdrawal_message(token, token, amount, 8453));
        assert_ne!(base, withdrawal_message(recipient, recipient, amount, 8453));
        assert_ne!(
            base,
            withdrawal_message(recipient, token, U256::from(101u64), 8453)
        );
        assert_ne!(base, withdrawal_message(recipient, token, amount, 1));
        // deterministic
        assert_eq!(base, withdrawal_message(recipient, token, amount, 8453));
    }

    #[test]
    fn packed_message_matches_reference_layout() {
        // keccak over the raw 104-byte concatenation, no abi padding of
        // the addresses
        let recipient = Address::repeat_byte(0x11);
        let token = Address::repeat_byte(0x22);
        let amount = U256::from(7u64);
        let mut packed = Vec::new();
        packed.extend_from_slice(&[0x11u8; 20]);
        packed.extend_from_slice(&[0x22u8; 20]);
        packed.extend_from_slice(&amount.to_be_bytes::<32>());
        packed.extend_from_slice(&U256::from(8453u64).to_be_bytes::<32>());
        assert_eq!(packed.len(), 104);
        assert_eq!(
            withdrawal_message(recipient, token, amount, 8453),
            keccak256(&packed)
        );
    }

    #[test]
    fn revert_reasons_map_to_kinds() {
        assert!(matches!(
            map_execution_error("execution reverted: key already used", 3),
            RedeemError::KeyAlreadyUsed { tree_index: 3 }
        ));
        assert!(matches!(
            map_execution_error("execution reverted: root inactive", 3),
            RedeemError::MerkleRootInactive { .. }
        ));
        assert!(matches!(
            map_execution_error("execution reverted: insufficient treasury balance", 3),
            RedeemError::InsufficientTreasuryFunds
        ));
        assert!(matches!(
            map_execution_error("execution reverted: invalid signature", 3),
            RedeemError::InvalidSignature(_)
        ));
        // unknown reasons pass through instead of being swallowed
        assert!(matches!(
            map_execution_error("execution reverted: paused", 3),
            RedeemError::Rpc(msg) if msg.contains("paused")
        ));
    }

    #[test]
    fn native_asset_uses_zero_address_sentinel() {
        let key = OtsKey {
            key_index: 0,
            tree_index: 0,
            chain_name: "base".into(),
            chain_id: 8453,
            token_symbol: "ETH".into(),
            token_address: None,
            treasury_address: "0x00000000000000000000000000000000000000aa".into(),
            denomination: "0.1".into(),
            denomination_base_units: 100,
            merkle_root: [0u8; 32],
            merkle_root_id: 0,
            merkle_proof: vec![],
            private_key: [9u8; 32],
            public_address: "0x1111111111111111111111111111111111111111".into(),
            is_used: false,
        };
        assert_eq!(EvmAdapter::token_of(&key).unwrap(), Address::ZERO);
    }

    #[test]
    fn signer_integrity_check_catches_mismatched_address() {
        let key = OtsKey {
            key_index: 0,
            tree_index: 0,
            chain_name: "base".into(),
            chain_id: 8453,
            token_symbol: "ETH".into(),
            token_address: None,
            treasury_address: "0x00000000000000000000000000000000000000aa".into(),
            denomination: "0.1".into(),
            denomination_base_units: 100,
            merkle_root: [0u8; 32],
            merkle_root_id: 0,
            merkle_proof: vec![],
            // a valid secp256k1 scalar that does not derive the address below
            private_key: [9u8; 32],
            public_address: "0x1111111111111111111111111111111111111111".into(),
            is_used: false,
        };
        assert!(matches!(
            EvmAdapter::signer_for(&key),
            Err(RedeemError::InvalidPublicKey(_))
        ));
    }
}
