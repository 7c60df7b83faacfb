//! redemption orchestrator
//!
//! the ledger is touched only after a terminal result: a caller dropping
//! the future mid-flight leaves no partially-updated deposit behind

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use scrip_core::{
    unix_now, ChainRegistry, DepositStatus, OtsKey, RedeemError, Result, Withdrawal,
};
use scrip_ledger::{DepositPatch, Ledger};

use crate::adapter::{ChainAdapter, KeyUsage, NetworkSwitcher, UsageStatus};

#[derive(Clone, Copy, Debug, Default)]
pub struct RedeemOptions {
    /// proceed even when the usage scan could not reach the chain; the
    /// caller explicitly accepts the double-spend risk
    pub acknowledge_unverified: bool,
}

pub struct Redeemer {
    ledger: Arc<Ledger>,
    registry: ChainRegistry,
    adapters: HashMap<u64, Arc<dyn ChainAdapter>>,
    switcher: Option<Arc<dyn NetworkSwitcher>>,
}

impl Redeemer {
    pub fn new(ledger: Arc<Ledger>, registry: ChainRegistry) -> Self {
        Self {
            ledger,
            registry,
            adapters: HashMap::new(),
            switcher: None,
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.insert(adapter.chain_id(), adapter);
        self
    }

    pub fn with_network_switcher(mut self, switcher: Arc<dyn NetworkSwitcher>) -> Self {
        self.switcher = Some(switcher);
        self
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    fn adapter_for(&self, chain_id: u64) -> Result<&Arc<dyn ChainAdapter>> {
        self.adapters
            .get(&chain_id)
            .ok_or_else(|| RedeemError::Malformed(format!("no adapter for chain {chain_id}")))
    }

    /// redeem one key: validate proof, check usage, sign+submit, record
    pub async fn redeem(
        &self,
        owner: &str,
        deposit_tx_hash: &str,
        key: &OtsKey,
        recipient: &str,
        opts: RedeemOptions,
    ) -> Result<Withdrawal> {
        let adapter = self.adapter_for(key.chain_id)?;

        // 1. local proof check; a corrupted key must never reach a signer
        let identity = key.leaf_identity()?;
        let root = scrip_merkle::compute_root(&identity, &key.merkle_proof, key.tree_index)
            .map_err(|e| RedeemError::Malformed(e.to_string()))?;
        if root != key.merkle_root {
            warn!(tree_index = key.tree_index, "proof mismatch, aborting");
            return Err(RedeemError::InvalidProof);
        }

        // 2. network check, with one switch-and-retry via the wallet hook
        if let Err(err) = adapter.verify_network(key).await {
            match (&err, &self.switcher) {
                (RedeemError::NetworkMismatch { expected, .. }, Some(switcher)) => {
                    info!(expected, "switching network and retrying once");
                    switcher.switch_to(*expected).await?;
                    adapter.verify_network(key).await?;
                }
                _ => return Err(err),
            }
        }

        // 3. authoritative usage check strictly before any signature
        let usage = adapter.check_keys(std::slice::from_ref(key)).await;
        match usage.first().map(|u| &u.status) {
            Some(UsageStatus::Used) => {
                self.ledger
                    .mark_key_used(owner, deposit_tx_hash, key.tree_index)?;
                return Err(RedeemError::KeyAlreadyUsed {
                    tree_index: key.tree_index,
                });
            }
            Some(UsageStatus::Unavailable { reason }) if !opts.acknowledge_unverified => {
                return Err(RedeemError::VerificationUnavailable(reason.clone()));
            }
            Some(UsageStatus::Unavailable { reason }) => {
                warn!(reason, "proceeding with unverified key on caller's acknowledgment");
            }
            _ => {}
        }

        // 4. sign and submit; the chain's own nullifier check is the final
        //    authority on races with other sessions
        let receipt = match adapter.redeem(key, recipient).await {
            Ok(receipt) => receipt,
            Err(RedeemError::KeyAlreadyUsed { tree_index }) => {
                self.ledger.mark_key_used(owner, deposit_tx_hash, tree_index)?;
                return Err(RedeemError::KeyAlreadyUsed { tree_index });
            }
            Err(other) => return Err(other),
        };

        // 5. terminal success: record the withdrawal
        let withdrawal = Withdrawal {
            tx_hash: receipt.tx_hash.clone(),
            timestamp: unix_now(),
            recipient_address: recipient.into(),
            key_index: key.key_index,
            chain_name: key.chain_name.clone(),
        };
        self.ledger
            .mark_key_used(owner, deposit_tx_hash, key.tree_index)?;
        let updated = self.ledger.update_status(
            owner,
            deposit_tx_hash,
            DepositStatus::Withdrawn,
            DepositPatch {
                withdrawal: Some(withdrawal.clone()),
                ..Default::default()
            },
        )?;
        if updated.is_none() {
            // the withdrawal is on-chain regardless; surface it anyway
            warn!(deposit_tx_hash, "withdrawal confirmed for unknown deposit");
        }
        info!(
            tx_hash = %withdrawal.tx_hash,
            root_id = receipt.merkle_root_id,
            "redemption complete"
        );
        Ok(withdrawal)
    }

    /// usage check across chains; keys on chains without an adapter come
    /// back `Unavailable` rather than silently unused
    pub async fn check_usage(&self, keys: &[OtsKey]) -> Vec<KeyUsage> {
        let mut by_chain: HashMap<u64, Vec<OtsKey>> = HashMap::new();
        for key in keys {
            by_chain.entry(key.chain_id).or_default().push(key.clone());
        }

        let mut results = Vec::with_capacity(keys.len());
        for (chain_id, chain_keys) in by_chain {
            match self.adapters.get(&chain_id) {
                Some(adapter) => {
                    debug!(chain_id, keys = chain_keys.len(), "scanning chain");
                    results.extend(adapter.check_keys(&chain_keys).await);
                }
                None => {
                    results.extend(chain_keys.iter().map(|k| KeyUsage {
                        key_index: k.key_index,
                        tree_index: k.tree_index,
                        status: UsageStatus::Unavailable {
                            reason: format!("no adapter for chain {chain_id}"),
                        },
                    }));
                }
            }
        }
        results
    }
}
