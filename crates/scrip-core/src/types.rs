//! canonical records for deposits, keys, batches and withdrawals

use serde::{Deserialize, Serialize};

use crate::error::{RedeemError, Result};

/// chain family a key redeems on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Solana,
}

/// deposit lifecycle
///
/// pending -> confirmed -> keys_requested -> keys_received -> withdrawn,
/// with failed absorbing from pending
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    Pending,
    Confirmed,
    KeysRequested,
    KeysReceived,
    Withdrawn,
    Failed,
}

impl DepositStatus {
    /// legal forward transitions; staying in place is always allowed so a
    /// patch-only update does not need a separate entry point
    pub fn can_advance_to(self, next: DepositStatus) -> bool {
        use DepositStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Failed)
                | (Confirmed, KeysRequested)
                | (KeysRequested, KeysReceived)
                | (KeysReceived, Withdrawn)
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositMetadata {
    pub token: String,
    #[serde(default)]
    pub token_address: Option<String>,
    #[serde(default)]
    pub cross_chain: bool,
    #[serde(default)]
    pub target_chain: Option<String>,
}

/// a deposit observed on-chain; never deleted, only appended to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: String,
    pub deposit_tx_hash: String,
    pub amount: String,
    pub depositor_address: String,
    pub chain_id: u64,
    pub created_at: u64,
    pub status: DepositStatus,
    pub metadata: DepositMetadata,
    #[serde(default)]
    pub keys: Vec<OtsKey>,
    #[serde(default)]
    pub withdrawals: Vec<Withdrawal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// one redeemable merkle leaf
///
/// `tree_index` is the leaf position used for proof verification and
/// nullifier derivation; `key_index` is display ordering only
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OtsKey {
    pub key_index: u32,
    pub tree_index: u64,
    pub chain_name: String,
    pub chain_id: u64,
    pub token_symbol: String,
    #[serde(default)]
    pub token_address: Option<String>,
    pub treasury_address: String,
    /// decimal display amount, e.g. "0.1"
    pub denomination: String,
    pub denomination_base_units: u128,
    #[serde(with = "hex")]
    pub merkle_root: [u8; 32],
    /// on-chain batch id hint; may be stale, adapters reconfirm it
    pub merkle_root_id: u64,
    #[serde(with = "hex_hashes")]
    pub merkle_proof: Vec<[u8; 32]>,
    #[serde(with = "hex")]
    pub private_key: [u8; 32],
    /// evm-style 0x hex or solana base58
    pub public_address: String,
    /// locally observed flag; on-chain truth overrides a cached false
    #[serde(default)]
    pub is_used: bool,
}

impl OtsKey {
    /// raw identity bytes hashed into the merkle leaf: 20-byte evm address
    /// or 32-byte solana public key, unpadded
    pub fn leaf_identity(&self) -> Result<Vec<u8>> {
        if let Some(stripped) = self.public_address.strip_prefix("0x") {
            let bytes = hex::decode(stripped)
                .map_err(|e| RedeemError::InvalidPublicKey(format!("bad hex address: {e}")))?;
            if bytes.len() != 20 {
                return Err(RedeemError::InvalidPublicKey(format!(
                    "evm address must be 20 bytes, got {}",
                    bytes.len()
                )));
            }
            Ok(bytes)
        } else {
            let bytes = bs58::decode(&self.public_address)
                .into_vec()
                .map_err(|e| RedeemError::InvalidPublicKey(format!("bad base58 address: {e}")))?;
            if bytes.len() != 32 {
                return Err(RedeemError::InvalidPublicKey(format!(
                    "solana public key must be 32 bytes, got {}",
                    bytes.len()
                )));
            }
            Ok(bytes)
        }
    }

    pub fn family(&self) -> ChainFamily {
        if self.public_address.starts_with("0x") {
            ChainFamily::Evm
        } else {
            ChainFamily::Solana
        }
    }
}

/// on-chain merkle batch commitment, read-only from the engine's side
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleBatch {
    pub on_chain_id: u64,
    #[serde(with = "hex")]
    pub root_hash: [u8; 32],
    #[serde(default)]
    pub token_address: Option<String>,
    pub denomination_base_units: u128,
    pub is_active: bool,
    pub total_keys: u64,
    pub used_keys: u64,
}

/// appended to a deposit on success; immutable once created
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub tx_hash: String,
    pub timestamp: u64,
    pub recipient_address: String,
    pub key_index: u32,
    pub chain_name: String,
}

/// hex-encoded list serde helper for proof paths
mod hex_hashes {
    use serde::{ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[[u8; 32]], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(v.len()))?;
        for h in v {
            seq.serialize_element(&hex::encode(h))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<[u8; 32]>, D::Error> {
        let raw = Vec::<String>::deserialize(d)?;
        raw.iter()
            .map(|s| {
                let bytes = hex::decode(s.trim_start_matches("0x"))
                    .map_err(serde::de::Error::custom)?;
                bytes
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("proof element must be 32 bytes"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> OtsKey {
        OtsKey {
            key_index: 0,
            tree_index: 3,
            chain_name: "base".into(),
            chain_id: 8453,
            token_symbol: "ETH".into(),
            token_address: None,
            treasury_address: "0x00000000000000000000000000000000000000aa".into(),
            denomination: "0.1".into(),
            denomination_base_units: 100_000_000_000_000_000,
            merkle_root: [7u8; 32],
            merkle_root_id: 2,
            merkle_proof: vec![[1u8; 32], [2u8; 32]],
            private_key: [9u8; 32],
            public_address: "0x1111111111111111111111111111111111111111".into(),
            is_used: false,
        }
    }

    #[test]
    fn status_machine_forward_only() {
        use DepositStatus::*;
        assert!(Pending.can_advance_to(Confirmed));
        assert!(Pending.can_advance_to(Failed));
        assert!(Confirmed.can_advance_to(KeysRequested));
        assert!(KeysRequested.can_advance_to(KeysReceived));
        assert!(KeysReceived.can_advance_to(Withdrawn));
        assert!(Withdrawn.can_advance_to(Withdrawn));

        assert!(!Confirmed.can_advance_to(Pending));
        assert!(!Confirmed.can_advance_to(Failed));
        assert!(!Withdrawn.can_advance_to(KeysReceived));
        assert!(!KeysReceived.can_advance_to(Failed));
    }

    #[test]
    fn evm_leaf_identity_is_20_bytes() {
        let key = sample_key();
        let identity = key.leaf_identity().unwrap();
        assert_eq!(identity.len(), 20);
        assert_eq!(key.family(), ChainFamily::Evm);
    }

    #[test]
    fn solana_leaf_identity_is_32_bytes() {
        let mut key = sample_key();
        key.public_address = bs58::encode([5u8; 32]).into_string();
        let identity = key.leaf_identity().unwrap();
        assert_eq!(identity, vec![5u8; 32]);
        assert_eq!(key.family(), ChainFamily::Solana);
    }

    #[test]
    fn truncated_address_rejected() {
        let mut key = sample_key();
        key.public_address = "0x1111".into();
        assert!(matches!(
            key.leaf_identity(),
            Err(RedeemError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn key_serde_round_trip() {
        let key = sample_key();
        let json = serde_json::to_string(&key).unwrap();
        let back: OtsKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
        // byte fields travel as hex strings
        assert!(json.contains(&hex::encode([7u8; 32])));
    }
}
