//! Signing key material.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use std::fmt;
use std::path::{Path, PathBuf};

/// An ed25519 keypair in the 64-byte `secret || public` layout used by
/// Solana wallets and CLI keypair files.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    /// Create a keypair from a 32-byte seed (for tests).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parse the 64-byte `secret || public` layout, checking that both halves agree.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeypairError> {
        let array: &[u8; 64] = bytes
            .try_into()
            .map_err(|_| KeypairError::InvalidLength(bytes.len()))?;
        let signing_key =
            SigningKey::from_keypair_bytes(array).map_err(|_| KeypairError::Mismatch)?;
        Ok(Self { signing_key })
    }

    /// Parse a base58-encoded 64-byte keypair.
    pub fn from_base58(s: &str) -> Result<Self, KeypairError> {
        let bytes = bs58::decode(s.trim()).into_vec()?;
        Self::from_bytes(&bytes)
    }

    /// Load a JSON keypair file (an array of 64 integers).
    pub fn read_json_file(path: &Path) -> Result<Self, KeypairError> {
        let contents = std::fs::read_to_string(path).map_err(|source| KeypairError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let bytes: Vec<u8> = serde_json::from_str(&contents)?;
        Self::from_bytes(&bytes)
    }

    /// The 64-byte `secret || public` form.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.signing_key.to_keypair_bytes()
    }

    /// Public key bytes.
    pub fn pubkey(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &bs58::encode(self.pubkey()).into_string())
            .finish_non_exhaustive()
    }
}

/// Errors loading key material.
#[derive(Debug, thiserror::Error)]
pub enum KeypairError {
    #[error("Keypair must be 64 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Public half of keypair does not match secret half")]
    Mismatch,

    #[error("Invalid base58: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("Invalid keypair file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read keypair file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No key material configured (use --private-key or --keypair)")]
    Missing,
}
