//! event-log usage scanner
//!
//! keys sharing a (treasury, root id) pair are folded into a single
//! eth_getLogs round trip on the withdrawal event, indexed by batch id.
//! an rpc failure marks every key of the affected group `Unavailable`,
//! never `Unused`

use std::collections::HashMap;

use alloy::{
    primitives::{Address, U256},
    providers::{DynProvider, Provider},
    rpc::types::Filter,
    sol_types::SolEvent,
};
use tracing::{debug, warn};

use scrip_core::OtsKey;
use scrip_engine::{KeyUsage, UsageStatus};

use crate::contract::IOtsTreasury;

/// full-history filter for one (treasury, batch) pair; without the
/// genesis from_block, eth_getLogs defaults to the latest block and every
/// historical withdrawal becomes invisible
fn withdrawal_filter(address: Address, root_id: u64) -> Filter {
    Filter::new()
        .address(address)
        .event_signature(IOtsTreasury::Withdrawn::SIGNATURE_HASH)
        .topic1(U256::from(root_id))
        .from_block(0)
}

/// one scan group: all keys against the same treasury and batch id
pub fn group_by_batch(keys: &[OtsKey]) -> HashMap<(String, u64), Vec<&OtsKey>> {
    let mut groups: HashMap<(String, u64), Vec<&OtsKey>> = HashMap::new();
    for key in keys {
        groups
            .entry((key.treasury_address.to_lowercase(), key.merkle_root_id))
            .or_default()
            .push(key);
    }
    groups
}

pub async fn scan_usage(provider: &DynProvider, keys: &[OtsKey]) -> Vec<KeyUsage> {
    let mut results = Vec::with_capacity(keys.len());

    for ((treasury, root_id), group) in group_by_batch(keys) {
        let address: Address = match treasury.parse() {
            Ok(a) => a,
            Err(e) => {
                results.extend(unavailable(&group, &format!("bad treasury address: {e}")));
                continue;
            }
        };

        let filter = withdrawal_filter(address, root_id);

        match provider.get_logs(&filter).await {
            Ok(logs) => {
                // spent tree indexes for this batch, from the indexed topic
                let spent: std::collections::HashSet<u64> = logs
                    .iter()
                    .filter_map(|log| log.topics().get(2))
                    .map(|topic| {
                        u64::try_from(U256::from_be_slice(topic.as_slice()))
                            .unwrap_or(u64::MAX)
                    })
                    .collect();
                debug!(root_id, spent = spent.len(), "withdrawal logs fetched");

                results.extend(group.iter().map(|key| KeyUsage {
                    key_index: key.key_index,
                    tree_index: key.tree_index,
                    status: if spent.contains(&key.tree_index) {
                        UsageStatus::Used
                    } else {
                        UsageStatus::Unused
                    },
                }));
            }
            Err(e) => {
                warn!(root_id, error = %e, "log query failed");
                results.extend(unavailable(&group, &format!("log query failed: {e}")));
            }
        }
    }
    results
}

fn unavailable(group: &[&OtsKey], reason: &str) -> Vec<KeyUsage> {
    group
        .iter()
        .map(|key| KeyUsage {
            key_index: key.key_index,
            tree_index: key.tree_index,
            status: UsageStatus::Unavailable {
                reason: reason.to_string(),
            },
        })
        .collect()
}
