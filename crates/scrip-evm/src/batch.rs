//! merkle batch location
//!
//! the key's cached batch id is only a hint: ids shift between issuance
//! and redemption. the strategy is a fixed order: verify the cached id,
//! then probe ascending ids bounded by the contract's counter, failing
//! that an explicit not-found. matching on root hash alone is unsafe
//! because denominations can collide, so the denomination is compared too

use async_trait::async_trait;
use tracing::{debug, warn};

use scrip_core::{MerkleBatch, OtsKey, RedeemError, Result};

/// hard ceiling on the linear probe when the contract exposes no usable
/// next-id counter. a treasury with more batches than this cannot be
/// located past the cap; the counter path avoids the limit
pub const SCAN_CEILING: u64 = 50;

/// read access to on-chain batches, separated from the rpc plumbing so
/// every branch of the strategy is testable deterministically
#[async_trait]
pub trait BatchSource: Send + Sync {
    /// the contract's next-id counter, if it exposes one
    async fn next_id(&self) -> Result<Option<u64>>;
    /// batch properties for an id; `None` for an unpublished id
    async fn fetch(&self, id: u64) -> Result<Option<MerkleBatch>>;
}

fn matches_key(key: &OtsKey, batch: &MerkleBatch) -> bool {
    batch.root_hash == key.merkle_root
        && batch.denomination_base_units == key.denomination_base_units
}

/// locate the authoritative batch id for a key
pub async fn locate_batch(source: &dyn BatchSource, key: &OtsKey) -> Result<MerkleBatch> {
    // cached hint first
    let mut inactive_match = None;
    if let Some(batch) = source.fetch(key.merkle_root_id).await? {
        if matches_key(key, &batch) {
            if batch.is_active {
                debug!(root_id = batch.on_chain_id, "cached batch id verified");
                return Ok(batch);
            }
            inactive_match = Some(batch.on_chain_id);
        }
    }

    // ascending probe
    let limit = match source.next_id().await {
        Ok(Some(next)) => next.min(SCAN_CEILING),
        Ok(None) | Err(_) => SCAN_CEILING,
    };
    for id in 0..limit {
        if id == key.merkle_root_id {
            continue;
        }
        let Some(batch) = source.fetch(id).await? else {
            continue;
        };
        if matches_key(key, &batch) {
            if batch.is_active {
                if id != key.merkle_root_id {
                    warn!(
                        cached = key.merkle_root_id,
                        actual = id,
                        "cached batch id was stale"
                    );
                }
                return Ok(batch);
            }
            inactive_match = Some(id);
        }
    }

    match inactive_match {
        Some(root_id) => Err(RedeemError::MerkleRootInactive { root_id }),
        None => Err(RedeemError::MerkleRootNotFound {
            root: hex::encode(key.merkle_root),
        }),
    }
}
