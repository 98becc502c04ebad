//! System-program transfer workload.

use super::{SignError, SignedTransaction, TransactionSigner};
use crate::blockhash::Blockhash;
use crate::keypair::Keypair;

/// The system program's address (all zeros).
pub const SYSTEM_PROGRAM_ID: [u8; 32] = [0u8; 32];

/// Largest serialized transaction a node will accept.
const PACKET_DATA_SIZE: usize = 1232;

/// System program instruction index for `Transfer`.
const SYSTEM_TRANSFER: u32 = 2;

/// Generates single-instruction lamport transfers from a fixed payer.
///
/// Everything except the blockhash is fixed at construction, so the message
/// is kept as a prebuilt prefix (header and account keys) and suffix
/// (instructions); signing just splices the blockhash in between.
pub struct TransferWorkload {
    keypair: Keypair,
    destination: [u8; 32],
    lamports: u64,
    message_prefix: Vec<u8>,
    message_suffix: Vec<u8>,
}

impl TransferWorkload {
    /// Create a workload transferring 1 lamport from the payer to itself.
    pub fn new(keypair: Keypair) -> Self {
        let payer = keypair.pubkey();
        Self::build(keypair, payer, 1)
    }

    /// Set the transfer destination.
    pub fn with_destination(self, destination: [u8; 32]) -> Self {
        Self::build(self.keypair, destination, self.lamports)
    }

    /// Set the transfer amount.
    pub fn with_lamports(self, lamports: u64) -> Self {
        Self::build(self.keypair, self.destination, lamports)
    }

    pub fn payer(&self) -> [u8; 32] {
        self.keypair.pubkey()
    }

    pub fn destination(&self) -> [u8; 32] {
        self.destination
    }

    pub fn lamports(&self) -> u64 {
        self.lamports
    }

    fn build(keypair: Keypair, destination: [u8; 32], lamports: u64) -> Self {
        let payer = keypair.pubkey();

        // Account keys: writable signer first, then writable non-signers, then
        // read-only non-signers. A self-transfer has no separate destination.
        let mut keys = vec![payer];
        let destination_index = if destination == payer {
            0u8
        } else {
            keys.push(destination);
            1u8
        };
        keys.push(SYSTEM_PROGRAM_ID);
        let program_index = (keys.len() - 1) as u8;

        // Header: 1 required signature, 0 read-only signed, 1 read-only unsigned.
        let mut prefix = vec![1u8, 0, 1];
        encode_len(&mut prefix, keys.len());
        for key in &keys {
            prefix.extend_from_slice(key);
        }

        let mut data = Vec::with_capacity(12);
        data.extend_from_slice(&SYSTEM_TRANSFER.to_le_bytes());
        data.extend_from_slice(&lamports.to_le_bytes());

        let mut suffix = Vec::new();
        encode_len(&mut suffix, 1);
        suffix.push(program_index);
        encode_len(&mut suffix, 2);
        suffix.extend_from_slice(&[0, destination_index]);
        encode_len(&mut suffix, data.len());
        suffix.extend_from_slice(&data);

        Self {
            keypair,
            destination,
            lamports,
            message_prefix: prefix,
            message_suffix: suffix,
        }
    }

    /// Serialize the message for `blockhash`.
    pub fn message(&self, blockhash: &Blockhash) -> Vec<u8> {
        let mut message = Vec::with_capacity(
            self.message_prefix.len() + Blockhash::LEN + self.message_suffix.len(),
        );
        message.extend_from_slice(&self.message_prefix);
        message.extend_from_slice(blockhash.as_bytes());
        message.extend_from_slice(&self.message_suffix);
        message
    }
}

impl TransactionSigner for TransferWorkload {
    fn sign(&self, blockhash: &Blockhash) -> Result<SignedTransaction, SignError> {
        let message = self.message(blockhash);
        let signature = self.keypair.sign(&message);

        let mut wire = Vec::with_capacity(1 + 64 + message.len());
        encode_len(&mut wire, 1);
        wire.extend_from_slice(&signature);
        wire.extend_from_slice(&message);

        if wire.len() > PACKET_DATA_SIZE {
            return Err(SignError::TooLarge(wire.len()));
        }

        let encoded = bs58::encode(&wire).into_string();
        Ok(SignedTransaction::new(encoded, signature, *blockhash))
    }
}

/// Append `len` in compact-u16 form (7 bits per byte, little-endian).
fn encode_len(buf: &mut Vec<u8>, len: usize) {
    let mut rem = len as u16;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            buf.push(byte);
            break;
        }
        byte |= 0x80;
        buf.push(byte);
    }
}
