//! merkle batch accounts
//!
//! each published batch is a pda keyed by its id. the key's cached id is
//! a hint only, so selection verifies the cached entry first and falls
//! back to the fetched candidate list in ascending order. a matching but
//! deactivated batch is reported as inactive rather than missing

use borsh::{BorshDeserialize, BorshSerialize};

use scrip_core::{OtsKey, RedeemError, Result};

/// how many batch pdas the adapter fetches when the cached id fails;
/// ids past the cap are unreachable by the fallback
pub const SCAN_CEILING: u64 = 50;

/// anchor account discriminator length
const ACCOUNT_TAG_LEN: usize = 8;

#[derive(BorshDeserialize, BorshSerialize, Clone, Debug, PartialEq, Eq)]
pub struct BatchAccount {
    pub root_hash: [u8; 32],
    /// all-zero for the native asset
    pub token_mint: [u8; 32],
    pub denomination: u64,
    pub is_active: bool,
    pub total_keys: u32,
    pub used_keys: u32,
}

/// decode a batch account, skipping the discriminator
pub fn parse_batch(data: &[u8]) -> Result<BatchAccount> {
    if data.len() <= ACCOUNT_TAG_LEN {
        return Err(RedeemError::Malformed("batch account too short".into()));
    }
    BatchAccount::try_from_slice(&data[ACCOUNT_TAG_LEN..])
        .map_err(|e| RedeemError::Malformed(format!("bad batch account: {e}")))
}

fn matches_key(key: &OtsKey, batch: &BatchAccount) -> bool {
    batch.root_hash == key.merkle_root
        && u128::from(batch.denomination) == key.denomination_base_units
}

/// pick the authoritative batch id for a key from fetched candidates
pub fn select_batch<'a>(
    key: &OtsKey,
    candidates: &'a [(u64, BatchAccount)],
) -> Result<(u64, &'a BatchAccount)> {
    let mut inactive_match = None;

    if let Some((id, batch)) = candidates.iter().find(|(id, _)| *id == key.merkle_root_id) {
        if matches_key(key, batch) {
            if batch.is_active {
                return Ok((*id, batch));
            }
            inactive_match = Some(*id);
        }
    }

    let mut ordered: Vec<&(u64, BatchAccount)> = candidates.iter().collect();
    ordered.sort_by_key(|(id, _)| *id);
    for (id, batch) in ordered {
        if *id == key.merkle_root_id || !matches_key(key, batch) {
            continue;
        }
        if batch.is_active {
            return Ok((*id, batch));
        }
        inactive_match.get_or_insert(*id);
    }

    match inactive_match {
        Some(root_id) => Err(RedeemError::MerkleRootInactive { root_id }),
        None => Err(RedeemError::MerkleRootNotFound {
            root: key.merkle_root.iter().map(|b| format!("{b:02x}")).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(root: [u8; 32], denom: u64, active: bool) -> BatchAccount {
        BatchAccount {
            root_hash: root,
            token_mint: [0u8; 32],
            denomination: denom,
            is_active: active,
            total_keys: 16,
            used_keys: 0,
        }
    }

    fn key_with(root: [u8; 32], cached_id: u64, denom: u128) -> OtsKey {
        OtsKey {
            key_index: 0,
            tree_index: 3,
            chain_name: "solana".into(),
            chain_id: 900,
            token_symbol: "SOL".into(),
            token_address: None,
            treasury_address: "11111111111111111111111111111111".into(),
            denomination: "0.1".into(),
            denomination_base_units: denom,
            merkle_root: root,
            merkle_root_id: cached_id,
            merkle_proof: vec![],
            private_key: [9u8; 32],
            public_address: "11111111111111111111111111111111".into(),
            is_used: false,
        }
    }

    #[test]
    fn cached_id_wins_when_it_still_matches() {
        let root = [5u8; 32];
        let candidates = vec![
            (2, batch(root, 100, true)),
            (8, batch(root, 100, true)),
        ];
        let (id, _) = select_batch(&key_with(root, 8, 100), &candidates).unwrap();
        assert_eq!(id, 8);
    }

    #[test]
    fn stale_cached_id_resolved_from_candidates() {
        let root = [5u8; 32];
        let candidates = vec![
            (8, batch([6u8; 32], 100, true)),
            (11, batch(root, 100, true)),
        ];
        let (id, _) = select_batch(&key_with(root, 8, 100), &candidates).unwrap();
        assert_eq!(id, 11);
    }

    #[test]
    fn denomination_must_match_too() {
        let root = [5u8; 32];
        let candidates = vec![
            (2, batch(root, 999, true)),
            (7, batch(root, 100, true)),
        ];
        let (id, _) = select_batch(&key_with(root, 0, 100), &candidates).unwrap();
        assert_eq!(id, 7);
    }

    #[test]
    fn deactivated_batch_reported_inactive() {
        let root = [5u8; 32];
        let candidates = vec![(4, batch(root, 100, false))];
        let err = select_batch(&key_with(root, 4, 100), &candidates).unwrap_err();
        assert!(matches!(err, RedeemError::MerkleRootInactive { root_id: 4 }));
    }

    #[test]
    fn unknown_root_is_not_found() {
        let candidates = vec![(0, batch([1u8; 32], 100, true))];
        let err = select_batch(&key_with([9u8; 32], 3, 100), &candidates).unwrap_err();
        assert!(matches!(err, RedeemError::MerkleRootNotFound { .. }));
    }

    #[test]
    fn parse_skips_account_tag() {
        let inner = batch([5u8; 32], 100, true);
        let mut data = vec![0xAAu8; 8];
        data.extend_from_slice(&borsh::to_vec(&inner).unwrap());
        assert_eq!(parse_batch(&data).unwrap(), inner);
        assert!(parse_batch(&data[..4]).is_err());
    }
}
