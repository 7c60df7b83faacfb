//! merkle proof verification for withdrawal key leaves
//!
//! recomputes a batch root from a leaf identity, sibling path and tree
//! index using the treasury contracts' convention:
//! leaf = keccak256(raw identity bytes), parent = keccak256(left || right),
//! operand order decided by index parity at each level, index halved after
//! each step. the verifier never fails on a root mismatch, only on
//! malformed input; comparison is the caller's job

use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

pub type Hash = [u8; 32];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("empty leaf identity")]
    EmptyLeaf,

    #[error("leaf identity must be 20 or 32 bytes, got {0}")]
    BadLeafLength(usize),
}

pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// keccak256(left || right)
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Keccak::v256();
    hasher.update(left);
    hasher.update(right);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// recompute the root for a (leaf identity, proof path, tree index) triple
///
/// the identity is hashed raw and unpadded: a 20-byte evm address or a
/// 32-byte solana public key. an even index puts the running hash on the
/// left of the concatenation, an odd index on the right
pub fn compute_root(
    leaf_identity: &[u8],
    proof: &[Hash],
    tree_index: u64,
) -> Result<Hash, MerkleError> {
    if leaf_identity.is_empty() {
        return Err(MerkleError::EmptyLeaf);
    }
    if leaf_identity.len() != 20 && leaf_identity.len() != 32 {
        return Err(MerkleError::BadLeafLength(leaf_identity.len()));
    }

    let mut node = keccak256(leaf_identity);
    let mut index = tree_index;
    for sibling in proof {
        node = if index % 2 == 0 {
            hash_pair(&node, sibling)
        } else {
            hash_pair(sibling, &node)
        };
        index /= 2;
    }
    Ok(node)
}

/// convenience wrapper: true iff the recomputed root equals the claimed one
pub fn verify(
    leaf_identity: &[u8],
    proof: &[Hash],
    tree_index: u64,
    expected_root: &Hash,
) -> Result<bool, MerkleError> {
    Ok(compute_root(leaf_identity, proof, tree_index)? == *expected_root)
}
