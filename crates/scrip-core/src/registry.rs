//! explicit chain registry
//!
//! adapters and scanners receive this value at construction; it is
//! refreshed by replacing it wholesale, never read from global state

use serde::{Deserialize, Serialize};

use crate::types::ChainFamily;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub name: String,
    pub family: ChainFamily,
    pub chain_id: u64,
    pub rpc_url: String,
    /// treasury contract (evm) or program id (solana)
    pub treasury_address: String,
    pub native_symbol: String,
    pub decimals: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainRegistry {
    chains: Vec<ChainEntry>,
}

impl ChainRegistry {
    pub fn new(chains: Vec<ChainEntry>) -> Self {
        Self { chains }
    }

    pub fn by_name(&self, name: &str) -> Option<&ChainEntry> {
        self.chains.iter().find(|c| c.name == name)
    }

    pub fn by_id(&self, chain_id: u64) -> Option<&ChainEntry> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    pub fn chains(&self) -> &[ChainEntry] {
        &self.chains
    }

    /// replace the whole catalog, e.g. after re-fetching it from the
    /// wallet/connection layer
    pub fn refresh(&mut self, chains: Vec<ChainEntry>) {
        self.chains = chains;
    }
}
