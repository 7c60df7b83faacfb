//! local deposit ledger backed by sled
//!
//! the full deposit collection for an owner lives under one namespaced
//! key (`deposits:<owner>`), json-serialized; every mutation rewrites the
//! collection. reads and writes are synchronous, no network io. the store
//! is single-writer: mutations serialize behind a mutex so interleaved
//! read-modify-write cycles cannot lose updates

use std::path::Path;
use std::sync::Mutex;

use rand::RngCore;
use tracing::{debug, info, warn};

use scrip_core::{
    unix_now, Deposit, DepositMetadata, DepositStatus, OtsKey, RedeemError, Result, Withdrawal,
};

/// fields merged into a deposit by [`Ledger::update_status`]
#[derive(Clone, Debug, Default)]
pub struct DepositPatch {
    /// keys handed out by the issuance service; replaces nothing, appends
    pub keys: Option<Vec<OtsKey>>,
    /// a completed withdrawal; immutable once attached
    pub withdrawal: Option<Withdrawal>,
    pub confirmed_at: Option<u64>,
    pub failed_reason: Option<String>,
    pub request_id: Option<String>,
}

pub struct Ledger {
    db: sled::Db,
    write_lock: Mutex<()>,
}

impl Ledger {
    pub fn open(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "opening ledger");
        let db = sled::open(path).map_err(|e| RedeemError::Storage(e.to_string()))?;
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn storage_key(owner: &str) -> String {
        format!("deposits:{}", owner.to_lowercase())
    }

    fn load(&self, owner: &str) -> Result<Vec<Deposit>> {
        match self
            .db
            .get(Self::storage_key(owner).as_bytes())
            .map_err(|e| RedeemError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| RedeemError::Storage(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    fn persist(&self, owner: &str, deposits: &[Deposit]) -> Result<()> {
        let bytes =
            serde_json::to_vec(deposits).map_err(|e| RedeemError::Storage(e.to_string()))?;
        self.db
            .insert(Self::storage_key(owner).as_bytes(), bytes)
            .map_err(|e| RedeemError::Storage(e.to_string()))?;
        self.db
            .flush()
            .map_err(|e| RedeemError::Storage(e.to_string()))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| RedeemError::Storage("ledger lock poisoned".into()))
    }

    pub fn add_deposit(
        &self,
        tx_hash: &str,
        amount: &str,
        owner: &str,
        chain_id: u64,
        metadata: DepositMetadata,
    ) -> Result<Deposit> {
        let _guard = self.lock()?;
        let mut deposits = self.load(owner)?;

        let mut id_bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut id_bytes);
        let deposit = Deposit {
            id: format!("dep-{}", hex::encode(id_bytes)),
            deposit_tx_hash: tx_hash.into(),
            amount: amount.into(),
            depositor_address: owner.into(),
            chain_id,
            created_at: unix_now(),
            status: DepositStatus::Pending,
            metadata,
            keys: Vec::new(),
            withdrawals: Vec::new(),
            confirmed_at: None,
            failed_reason: None,
            request_id: None,
        };

        deposits.push(deposit.clone());
        self.persist(owner, &deposits)?;
        debug!(tx_hash, owner, "deposit recorded");
        Ok(deposit)
    }

    /// advance a deposit's status and merge the patch
    ///
    /// an unknown tx hash is a no-op returning `None` with no persistence
    /// write; callers must check the result
    pub fn update_status(
        &self,
        owner: &str,
        tx_hash: &str,
        status: DepositStatus,
        patch: DepositPatch,
    ) -> Result<Option<Deposit>> {
        let _guard = self.lock()?;
        let mut deposits = self.load(owner)?;

        let Some(deposit) = deposits.iter_mut().find(|d| d.deposit_tx_hash == tx_hash) else {
            warn!(tx_hash, "update_status for unknown deposit");
            return Ok(None);
        };

        if !deposit.status.can_advance_to(status) {
            return Err(RedeemError::Malformed(format!(
                "illegal status transition {:?} -> {:?}",
                deposit.status, status
            )));
        }
        deposit.status = status;

        if let Some(keys) = patch.keys {
            deposit.keys.extend(keys);
        }
        if let Some(withdrawal) = patch.withdrawal {
            deposit.withdrawals.push(withdrawal);
        }
        if let Some(at) = patch.confirmed_at {
            deposit.confirmed_at = Some(at);
        }
        if let Some(reason) = patch.failed_reason {
            deposit.failed_reason = Some(reason);
        }
        if let Some(request_id) = patch.request_id {
            deposit.request_id = Some(request_id);
        }

        let updated = deposit.clone();
        self.persist(owner, &deposits)?;
        debug!(tx_hash, status = ?updated.status, "deposit updated");
        Ok(Some(updated))
    }

    /// all deposits for an owner, newest first
    pub fn deposits_for_owner(&self, owner: &str) -> Result<Vec<Deposit>> {
        let mut deposits = self.load(owner)?;
        deposits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deposits)
    }

    /// flag a key as redeemed; false -> true only, on-chain truth wins over
    /// any cached false. returns whether anything changed
    pub fn mark_key_used(&self, owner: &str, tx_hash: &str, tree_index: u64) -> Result<bool> {
        let _guard = self.lock()?;
        let mut deposits = self.load(owner)?;

        let Some(deposit) = deposits.iter_mut().find(|d| d.deposit_tx_hash == tx_hash) else {
            return Ok(false);
        };
        let Some(key) = deposit.keys.iter_mut().find(|k| k.tree_index == tree_index) else {
            return Ok(false);
        };
        if key.is_used {
            return Ok(false);
        }
        key.is_used = true;

        self.persist(owner, &deposits)?;
        debug!(tx_hash, tree_index, "key flagged used");
        Ok(true)
    }
}
