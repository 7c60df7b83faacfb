//! solana chain adapter
//!
//! rebuilds the keccak digest the treasury program recomputes, signs it
//! with the ots ed25519 key and submits [ed25519 verify, withdraw] as one
//! transaction. a duplicate submit of a landed transaction surfaces from
//! the rpc as "already been processed" and is mapped back to success

use std::str::FromStr;
use std::time::Duration;

use ed25519_dalek::{Signer as _, SigningKey};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::Transaction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use scrip_core::{ChainEntry, OtsKey, RedeemError, Result};
use scrip_engine::{ChainAdapter, ChainReceipt, KeyUsage};
use scrip_merkle::keccak256;

use crate::batch::{parse_batch, select_batch, BatchAccount, SCAN_CEILING};
use crate::ed25519::verify_instruction;
use crate::instruction::{
    batch_pda, nullifier_pda, treasury_pda, withdraw_native, withdraw_spl, WithdrawArgs,
};
use crate::scanner;

const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(90);
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct SolanaAdapter {
    rpc: RpcClient,
    /// fee payer and nullifier rent funder
    payer: Keypair,
    chain_id: u64,
    confirm_timeout: Duration,
}

impl SolanaAdapter {
    pub fn new(rpc: RpcClient, payer: Keypair, chain: &ChainEntry) -> Self {
        Self {
            rpc,
            payer,
            chain_id: chain.chain_id,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
        }
    }

    pub fn with_confirm_timeout(mut self, confirm_timeout: Duration) -> Self {
        self.confirm_timeout = confirm_timeout;
        self
    }

    fn signing_key_for(key: &OtsKey) -> Result<SigningKey> {
        let signing = SigningKey::from_bytes(&key.private_key);
        let claimed = Pubkey::from_str(&key.public_address)
            .map_err(|e| RedeemError::InvalidPublicKey(format!("bad address: {e}")))?;
        if signing.verifying_key().to_bytes() != claimed.to_bytes() {
            return Err(RedeemError::InvalidPublicKey(
                "private key does not derive the claimed address".into(),
            ));
        }
        Ok(signing)
    }

    async fn fetch_candidates(&self, program_id: &Pubkey) -> Result<Vec<(u64, BatchAccount)>> {
        let ids: Vec<u64> = (0..SCAN_CEILING).collect();
        let pdas: Vec<Pubkey> = ids.iter().map(|id| batch_pda(program_id, *id)).collect();
        let accounts = self
            .rpc
            .get_multiple_accounts(&pdas)
            .await
            .map_err(|e| RedeemError::Rpc(e.to_string()))?;

        let mut candidates = Vec::new();
        for (id, account) in ids.into_iter().zip(accounts) {
            let Some(account) = account else { continue };
            match parse_batch(&account.data) {
                Ok(batch) => candidates.push((id, batch)),
                Err(e) => warn!(id, error = %e, "skipping undecodable batch account"),
            }
        }
        Ok(candidates)
    }

    async fn query_status(&self, signature: &Signature, tree_index: u64) -> Result<Option<()>> {
        let response = self
            .rpc
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| RedeemError::Rpc(e.to_string()))?;
        match response.value.into_iter().flatten().next() {
            Some(status) => {
                if let Some(err) = status.err {
                    return Err(map_send_error(&err.to_string(), tree_index));
                }
                if status.satisfies_commitment(CommitmentConfig::confirmed()) {
                    Ok(Some(()))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    async fn await_confirmation(&self, signature: &Signature, tree_index: u64) -> Result<()> {
        let poll = async {
            loop {
                if self.query_status(signature, tree_index).await?.is_some() {
                    return Ok(());
                }
                sleep(STATUS_POLL_INTERVAL).await;
            }
        };
        match timeout(self.confirm_timeout, poll).await {
            Ok(result) => result,
            Err(_) => {
                // the tx can land after the wait gives up; check once more
                warn!(%signature, "confirmation wait timed out, re-querying");
                match self.query_status(signature, tree_index).await? {
                    Some(()) => Ok(()),
                    None => Err(RedeemError::Rpc(format!(
                        "confirmation timed out for {signature}"
                    ))),
                }
            }
        }
    }
}

/// keccak256(recipient ‖ mint ‖ amount le ‖ chain tag); the zero mint is
/// the native-asset sentinel
pub fn withdrawal_message(
    recipient: &Pubkey,
    mint: Option<&Pubkey>,
    amount: u64,
    chain_id: u64,
) -> [u8; 32] {
    let mut packed = Vec::with_capacity(32 + 32 + 8 + 16);
    packed.extend_from_slice(recipient.as_ref());
    match mint {
        Some(mint) => packed.extend_from_slice(mint.as_ref()),
        None => packed.extend_from_slice(&[0u8; 32]),
    }
    packed.extend_from_slice(&amount.to_le_bytes());
    packed.extend_from_slice(format!("solana-{chain_id}").as_bytes());
    keccak256(&packed)
}

/// map a submission or execution failure onto the error taxonomy;
/// unrecognized errors pass through verbatim
pub fn map_send_error(message: &str, tree_index: u64) -> RedeemError {
    let lower = message.to_lowercase();
    if lower.contains("already been processed") {
        RedeemError::TransactionAlreadyProcessed
    } else if lower.contains("nullifier") || lower.contains("already in use") {
        // the nullifier pda already exists, someone planted it first
        RedeemError::KeyAlreadyUsed { tree_index }
    } else if lower.contains("batchinactive") || lower.contains("root inactive") {
        RedeemError::MerkleRootInactive { root_id: 0 }
    } else if lower.contains("insufficient") {
        RedeemError::InsufficientTreasuryFunds
    } else if lower.contains("ed25519") || lower.contains("invalid signature") {
        RedeemError::InvalidSignature(message.to_string())
    } else {
        RedeemError::Rpc(message.to_string())
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn verify_network(&self, key: &OtsKey) -> Result<()> {
        // one endpoint per registry entry; a differing id means the key
        // belongs to another entry and the orchestrator must switch
        if self.chain_id != key.chain_id {
            return Err(RedeemError::NetworkMismatch {
                expected: key.chain_id,
                actual: self.chain_id,
            });
        }
        Ok(())
    }

    async fn check_keys(&self, keys: &[OtsKey]) -> Vec<KeyUsage> {
        scanner::scan_usage(&self.rpc, keys).await
    }

    async fn redeem(&self, key: &OtsKey, recipient: &str) -> Result<ChainReceipt> {
        let program_id = Pubkey::from_str(&key.treasury_address)
            .map_err(|e| RedeemError::Malformed(format!("bad program id: {e}")))?;
        let recipient = Pubkey::from_str(recipient)
            .map_err(|e| RedeemError::Malformed(format!("bad recipient: {e}")))?;
        let amount = u64::try_from(key.denomination_base_units)
            .map_err(|_| RedeemError::Malformed("denomination exceeds u64".into()))?;
        let mint = match &key.token_address {
            Some(addr) => Some(
                Pubkey::from_str(addr)
                    .map_err(|e| RedeemError::Malformed(format!("bad mint: {e}")))?,
            ),
            None => None,
        };
        let signing = Self::signing_key_for(key)?;

        let candidates = self.fetch_candidates(&program_id).await?;
        let (root_id, _) = select_batch(key, &candidates)?;

        // planted nullifier means the leaf is spent, no point submitting
        let nullifier = nullifier_pda(&program_id, root_id, key.tree_index);
        let existing = self
            .rpc
            .get_multiple_accounts(&[nullifier])
            .await
            .map_err(|e| RedeemError::Rpc(e.to_string()))?;
        if existing.first().map(Option::is_some).unwrap_or(false) {
            return Err(RedeemError::KeyAlreadyUsed {
                tree_index: key.tree_index,
            });
        }

        let message = withdrawal_message(&recipient, mint.as_ref(), amount, key.chain_id);
        let signature = signing.sign(&message);
        debug!(tree_index = key.tree_index, root_id, "message signed");

        let args = WithdrawArgs {
            amount,
            root_id,
            tree_index: key.tree_index,
            proof: key.merkle_proof.clone(),
            signature: signature.to_bytes(),
            public_key: signing.verifying_key().to_bytes(),
        };
        let verify = verify_instruction(
            &signing.verifying_key().to_bytes(),
            &signature.to_bytes(),
            &message,
        );

        let payer = self.payer.pubkey();
        let mut instructions: Vec<Instruction> = Vec::with_capacity(3);
        match mint {
            None => {
                instructions.push(verify);
                instructions.push(withdraw_native(&program_id, &payer, &recipient, args));
            }
            Some(mint) => {
                let treasury = treasury_pda(&program_id);
                let treasury_token = get_associated_token_address(&treasury, &mint);
                let funded = self
                    .rpc
                    .get_multiple_accounts(&[treasury_token])
                    .await
                    .map_err(|e| RedeemError::Rpc(e.to_string()))?;
                if !funded.first().map(Option::is_some).unwrap_or(false) {
                    return Err(RedeemError::Misconfigured(format!(
                        "treasury has no token account for mint {mint}"
                    )));
                }
                let recipient_token = get_associated_token_address(&recipient, &mint);
                instructions.push(create_associated_token_account_idempotent(
                    &payer,
                    &recipient,
                    &mint,
                    &spl_token::id(),
                ));
                // verify must sit directly before withdraw, the program
                // inspects its predecessor via the instructions sysvar
                instructions.push(verify);
                instructions.push(withdraw_spl(
                    &program_id,
                    &payer,
                    &recipient,
                    &mint,
                    &recipient_token,
                    &treasury_token,
                    args,
                ));
            }
        }

        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| RedeemError::Rpc(e.to_string()))?;
        let tx = Transaction::new_signed_with_payer(
            &instructions,
            Some(&payer),
            &[&self.payer],
            blockhash,
        );

        let tx_signature = match self.rpc.send_transaction(&tx).await {
            Ok(sig) => sig,
            Err(e) => match map_send_error(&e.to_string(), key.tree_index) {
                // a duplicate of a landed tx; recover its signature
                RedeemError::TransactionAlreadyProcessed => tx.signatures[0],
                other => return Err(other),
            },
        };
        info!(%tx_signature, "withdrawal submitted");

        self.await_confirmation(&tx_signature, key.tree_index).await?;

        Ok(ChainReceipt {
            tx_hash: tx_signature.to_string(),
            merkle_root_id: root_id,
        })
    }
}
