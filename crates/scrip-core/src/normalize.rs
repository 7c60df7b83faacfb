//! boundary normalization for duck-typed payloads
//!
//! the issuance service and older exported files mix snake_case and
//! camelCase spellings of the same field; everything funnels through the
//! raw records here exactly once, and the rest of the engine only ever
//! sees the canonical types

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{RedeemError, Result};
use crate::types::OtsKey;

/// a key as received from the issuance service or an imported file
#[derive(Clone, Debug, Deserialize)]
pub struct RawOtsKey {
    #[serde(alias = "keyIndex")]
    pub key_index: u32,
    #[serde(alias = "treeIndex")]
    pub tree_index: u64,
    #[serde(alias = "chainName")]
    pub chain_name: String,
    #[serde(alias = "chainId")]
    pub chain_id: u64,
    #[serde(alias = "tokenSymbol")]
    pub token_symbol: String,
    #[serde(default, alias = "tokenAddress")]
    pub token_address: Option<String>,
    #[serde(alias = "treasuryAddress")]
    pub treasury_address: String,
    #[serde(deserialize_with = "string_or_number")]
    pub denomination: String,
    #[serde(
        alias = "denominationBaseUnits",
        deserialize_with = "u128_string_or_number"
    )]
    pub denomination_base_units: u128,
    #[serde(alias = "merkleRoot")]
    pub merkle_root: String,
    #[serde(alias = "merkleRootId")]
    pub merkle_root_id: u64,
    #[serde(alias = "merkleProof")]
    pub merkle_proof: Vec<String>,
    #[serde(alias = "privateKey")]
    pub private_key: String,
    #[serde(alias = "publicAddress")]
    pub public_address: String,
    #[serde(default, alias = "isUsed")]
    pub is_used: bool,
}

/// issuance service response envelope
#[derive(Clone, Debug, Deserialize)]
pub struct RawIssuanceResponse {
    #[serde(alias = "requestId")]
    pub request_id: String,
    #[serde(default, alias = "depositId")]
    pub deposit_id: Option<String>,
    pub keys: Vec<RawOtsKey>,
}

impl RawOtsKey {
    pub fn normalize(self) -> Result<OtsKey> {
        let merkle_root = decode_hash(&self.merkle_root, "merkle_root")?;
        let private_key = decode_hash(&self.private_key, "private_key")?;
        let merkle_proof = self
            .merkle_proof
            .iter()
            .map(|h| decode_hash(h, "merkle_proof"))
            .collect::<Result<Vec<_>>>()?;

        let key = OtsKey {
            key_index: self.key_index,
            tree_index: self.tree_index,
            chain_name: self.chain_name,
            chain_id: self.chain_id,
            token_symbol: self.token_symbol,
            token_address: self.token_address,
            treasury_address: self.treasury_address,
            denomination: self.denomination,
            denomination_base_units: self.denomination_base_units,
            merkle_root,
            merkle_root_id: self.merkle_root_id,
            merkle_proof,
            private_key,
            public_address: self.public_address,
            is_used: self.is_used,
        };
        // fail early on addresses the adapters could not parse later
        key.leaf_identity()?;
        Ok(key)
    }
}

fn decode_hash(value: &str, field: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| RedeemError::Malformed(format!("{field}: bad hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| RedeemError::Malformed(format!("{field}: expected 32 bytes")))
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn u128_string_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u128, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        Value::Number(n) => n
            .as_u128()
            .ok_or_else(|| serde::de::Error::custom("amount out of range")),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMEL: &str = r#"{
        "keyIndex": 1,
        "treeIndex": 3,
        "chainName": "base",
        "chainId": 8453,
        "tokenSymbol": "USDC",
        "tokenAddress": "0x00000000000000000000000000000000000000cc",
        "treasuryAddress": "0x00000000000000000000000000000000000000aa",
        "denomination": 100,
        "denominationBaseUnits": "100000000",
        "merkleRoot": "0x0101010101010101010101010101010101010101010101010101010101010101",
        "merkleRootId": 2,
        "merkleProof": ["0202020202020202020202020202020202020202020202020202020202020202"],
        "privateKey": "0303030303030303030303030303030303030303030303030303030303030303",
        "publicAddress": "0x1111111111111111111111111111111111111111",
        "isUsed": false
    }"#;

    const SNAKE: &str = r#"{
        "key_index": 1,
        "tree_index": 3,
        "chain_name": "base",
        "chain_id": 8453,
        "token_symbol": "USDC",
        "token_address": "0x00000000000000000000000000000000000000cc",
        "treasury_address": "0x00000000000000000000000000000000000000aa",
        "denomination": "100",
        "denomination_base_units": 100000000,
        "merkle_root": "0101010101010101010101010101010101010101010101010101010101010101",
        "merkle_root_id": 2,
        "merkle_proof": ["0202020202020202020202020202020202020202020202020202020202020202"],
        "private_key": "0303030303030303030303030303030303030303030303030303030303030303",
        "public_address": "0x1111111111111111111111111111111111111111"
    }"#;

    #[test]
    fn both_spellings_normalize_identically() {
        let camel: RawOtsKey = serde_json::from_str(CAMEL).unwrap();
        let snake: RawOtsKey = serde_json::from_str(SNAKE).unwrap();
        let a = camel.normalize().unwrap();
        let b = snake.normalize().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.denomination, "100");
        assert_eq!(a.denomination_base_units, 100_000_000);
        assert_eq!(a.merkle_root, [1u8; 32]);
        assert_eq!(a.merkle_proof, vec![[2u8; 32]]);
    }

    #[test]
    fn short_root_rejected() {
        let mut raw: RawOtsKey = serde_json::from_str(CAMEL).unwrap();
        raw.merkle_root = "0xdead".into();
        assert!(matches!(
            raw.normalize(),
            Err(RedeemError::Malformed(_))
        ));
    }
}
