//! nullifier-pda usage scanner
//!
//! spent state lives in per-leaf nullifier accounts, so the scan is a
//! batched account-existence query. an rpc failure marks the affected
//! chunk `Unavailable`, never `Unused`

use std::str::FromStr;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, warn};

use scrip_core::OtsKey;
use scrip_engine::{KeyUsage, UsageStatus};

use crate::instruction::nullifier_pda;

/// getMultipleAccounts accepts at most 100 keys per request
const CHUNK: usize = 100;

pub async fn scan_usage(rpc: &RpcClient, keys: &[OtsKey]) -> Vec<KeyUsage> {
    let mut results = Vec::with_capacity(keys.len());

    for chunk in keys.chunks(CHUNK) {
        let mut pdas = Vec::with_capacity(chunk.len());
        let mut resolved: Vec<&OtsKey> = Vec::with_capacity(chunk.len());
        for key in chunk {
            match Pubkey::from_str(&key.treasury_address) {
                Ok(program_id) => {
                    pdas.push(nullifier_pda(&program_id, key.merkle_root_id, key.tree_index));
                    resolved.push(key);
                }
                Err(e) => results.push(unavailable(key, &format!("bad program id: {e}"))),
            }
        }
        if resolved.is_empty() {
            continue;
        }

        match rpc.get_multiple_accounts(&pdas).await {
            Ok(accounts) => {
                debug!(checked = resolved.len(), "nullifier accounts fetched");
                for (key, account) in resolved.iter().zip(accounts) {
                    results.push(KeyUsage {
                        key_index: key.key_index,
                        tree_index: key.tree_index,
                        // an existing account is a planted nullifier
                        status: if account.is_some() {
                            UsageStatus::Used
                        } else {
                            UsageStatus::Unused
                        },
                    });
                }
            }
            Err(e) => {
                warn!(error = %e, "nullifier query failed");
                results.extend(
                    resolved
                        .iter()
                        .map(|key| unavailable(key, &format!("nullifier query failed: {e}"))),
                );
            }
        }
    }
    results
}

fn unavailable(key: &OtsKey, reason: &str) -> KeyUsage {
    KeyUsage {
        key_index: key.key_index,
        tree_index: key.tree_index,
        status: UsageStatus::Unavailable {
            reason: reason.to_string(),
        },
    }
}
