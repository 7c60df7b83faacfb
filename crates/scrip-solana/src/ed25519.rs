//! ed25519-program verify instruction
//!
//! the treasury program does not verify the ots signature itself; it
//! reads the instructions sysvar and requires a successful ed25519
//! precompile check in the instruction placed directly before the
//! withdraw. all offsets point into this instruction's own data, so the
//! instruction-index fields carry the self-referential `u16::MAX`

use solana_sdk::{ed25519_program, instruction::Instruction};

const HEADER_LEN: usize = 2; // count + padding
const OFFSETS_LEN: usize = 14;
const SELF_REFERENCE: u16 = u16::MAX;

/// build a single-signature verify instruction with pubkey, signature
/// and message embedded after the offsets table
pub fn verify_instruction(
    public_key: &[u8; 32],
    signature: &[u8; 64],
    message: &[u8],
) -> Instruction {
    let pubkey_offset = (HEADER_LEN + OFFSETS_LEN) as u16;
    let signature_offset = pubkey_offset + 32;
    let message_offset = signature_offset + 64;

    let mut data = Vec::with_capacity(message_offset as usize + message.len());
    data.push(1u8); // one signature
    data.push(0u8); // padding
    data.extend_from_slice(&signature_offset.to_le_bytes());
    data.extend_from_slice(&SELF_REFERENCE.to_le_bytes());
    data.extend_from_slice(&pubkey_offset.to_le_bytes());
    data.extend_from_slice(&SELF_REFERENCE.to_le_bytes());
    data.extend_from_slice(&message_offset.to_le_bytes());
    data.extend_from_slice(&(message.len() as u16).to_le_bytes());
    data.extend_from_slice(&SELF_REFERENCE.to_le_bytes());
    data.extend_from_slice(public_key);
    data.extend_from_slice(signature);
    data.extend_from_slice(message);

    Instruction {
        program_id: ed25519_program::id(),
        accounts: vec![],
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(data: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([data[at], data[at + 1]])
    }

    #[test]
    fn offsets_table_matches_embedded_payload() {
        let public_key = [7u8; 32];
        let signature = [9u8; 64];
        let message = b"withdrawal digest";
        let ix = verify_instruction(&public_key, &signature, message);

        assert_eq!(ix.program_id, ed25519_program::id());
        assert!(ix.accounts.is_empty());
        assert_eq!(ix.data[0], 1);

        let sig_offset = u16_at(&ix.data, 2) as usize;
        let pk_offset = u16_at(&ix.data, 6) as usize;
        let msg_offset = u16_at(&ix.data, 10) as usize;
        let msg_len = u16_at(&ix.data, 12) as usize;

        assert_eq!(&ix.data[pk_offset..pk_offset + 32], &public_key);
        assert_eq!(&ix.data[sig_offset..sig_offset + 64], &signature);
        assert_eq!(&ix.data[msg_offset..msg_offset + msg_len], message);
        assert_eq!(ix.data.len(), msg_offset + msg_len);
    }

    #[test]
    fn all_index_fields_are_self_referential() {
        let ix = verify_instruction(&[0u8; 32], &[0u8; 64], b"m");
        for at in [4usize, 8, 14] {
            assert_eq!(u16_at(&ix.data, at), u16::MAX);
        }
    }
}
