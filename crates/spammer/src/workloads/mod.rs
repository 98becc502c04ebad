//! Transaction builders.
//!
//! A [`TransactionSigner`] turns a recent blockhash into one ready-to-submit
//! transaction. Implementations are CPU-bound and are invoked from the
//! signing pool, never directly on the async runtime.

mod transfer;

pub use transfer::{TransferWorkload, SYSTEM_PROGRAM_ID};

use crate::blockhash::Blockhash;

/// Builds and signs transactions against a given blockhash.
///
/// Implementations must be pure apart from reading their own immutable key
/// material and template: the pool calls them concurrently from many threads.
pub trait TransactionSigner: Send + Sync {
    /// Build one signed transaction embedding `blockhash`.
    fn sign(&self, blockhash: &Blockhash) -> Result<SignedTransaction, SignError>;
}

/// An encoded, signed transaction ready for `sendTransaction`.
#[derive(Clone, Debug)]
pub struct SignedTransaction {
    encoded: String,
    signature: [u8; 64],
    blockhash: Blockhash,
}

impl SignedTransaction {
    pub fn new(encoded: String, signature: [u8; 64], blockhash: Blockhash) -> Self {
        Self {
            encoded,
            signature,
            blockhash,
        }
    }

    /// Wire form (base58).
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// The fee payer's signature, which is also the transaction id.
    pub fn signature(&self) -> &[u8; 64] {
        &self.signature
    }

    /// Base58 transaction id.
    pub fn id(&self) -> String {
        bs58::encode(self.signature).into_string()
    }

    /// Blockhash this transaction was built against.
    pub fn blockhash(&self) -> Blockhash {
        self.blockhash
    }
}

/// Signing failures. Callers treat these as transient.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("Transaction too large: {0} bytes")]
    TooLarge(usize),

    #[error("Signer failed: {0}")]
    Signer(String),
}
