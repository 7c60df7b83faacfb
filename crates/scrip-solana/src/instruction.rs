//! treasury program instruction builders
//!
//! the program is anchor-based: methods are dispatched on an 8-byte
//! discriminator and arguments are borsh-encoded behind it. pdas are
//! derived from fixed seed prefixes plus little-endian ids

use borsh::BorshSerialize;
use sha2::{Digest, Sha256};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program, sysvar,
};

pub const BATCH_SEED: &[u8] = b"batch";
pub const NULLIFIER_SEED: &[u8] = b"nullifier";
pub const TREASURY_SEED: &[u8] = b"treasury";

/// first 8 bytes of sha256("global:<name>")
pub fn discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{name}").as_bytes());
    let mut tag = [0u8; 8];
    tag.copy_from_slice(&digest[..8]);
    tag
}

/// arguments shared by the native and spl withdraw methods
#[derive(BorshSerialize, Clone, Debug)]
pub struct WithdrawArgs {
    pub amount: u64,
    pub root_id: u64,
    pub tree_index: u64,
    pub proof: Vec<[u8; 32]>,
    pub signature: [u8; 64],
    pub public_key: [u8; 32],
}

pub fn treasury_pda(program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[TREASURY_SEED], program_id).0
}

pub fn batch_pda(program_id: &Pubkey, root_id: u64) -> Pubkey {
    Pubkey::find_program_address(&[BATCH_SEED, &root_id.to_le_bytes()], program_id).0
}

/// the nullifier account whose existence marks (batch, leaf) as spent
pub fn nullifier_pda(program_id: &Pubkey, root_id: u64, tree_index: u64) -> Pubkey {
    Pubkey::find_program_address(
        &[
            NULLIFIER_SEED,
            &root_id.to_le_bytes(),
            &tree_index.to_le_bytes(),
        ],
        program_id,
    )
    .0
}

fn encode(name: &str, args: &WithdrawArgs) -> Vec<u8> {
    let mut data = discriminator(name).to_vec();
    // borsh of a borsh-derive struct cannot fail
    data.extend_from_slice(&borsh::to_vec(args).unwrap_or_default());
    data
}

/// withdraw the native asset to `recipient`; `payer` funds the nullifier
/// account creation
pub fn withdraw_native(
    program_id: &Pubkey,
    payer: &Pubkey,
    recipient: &Pubkey,
    args: WithdrawArgs,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(treasury_pda(program_id), false),
            AccountMeta::new_readonly(batch_pda(program_id, args.root_id), false),
            AccountMeta::new(nullifier_pda(program_id, args.root_id, args.tree_index), false),
            AccountMeta::new(*recipient, false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(sysvar::instructions::id(), false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: encode("withdraw", &args),
    }
}

/// withdraw an spl token; the recipient and treasury associated token
/// accounts are passed in so the caller controls their creation
#[allow(clippy::too_many_arguments)]
pub fn withdraw_spl(
    program_id: &Pubkey,
    payer: &Pubkey,
    recipient: &Pubkey,
    mint: &Pubkey,
    recipient_token: &Pubkey,
    treasury_token: &Pubkey,
    args: WithdrawArgs,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(treasury_pda(program_id), false),
            AccountMeta::new_readonly(batch_pda(program_id, args.root_id), false),
            AccountMeta::new(nullifier_pda(program_id, args.root_id, args.tree_index), false),
            AccountMeta::new_readonly(*recipient, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(*recipient_token, false),
            AccountMeta::new(*treasury_token, false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(sysvar::instructions::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: encode("withdraw_spl", &args),
    }
}
