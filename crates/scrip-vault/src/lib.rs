//! password-based key bundle vault
//!
//! exports one or many withdrawal keys as an opaque `.enc` artifact:
//! pbkdf2-hmac-sha256 stretches the password, aes-256-gcm authenticates
//! the payload. the artifact records salt, nonce, algorithm, iteration
//! count and a version so old exports stay importable and unknown formats
//! are rejected instead of guessed at

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info};

use scrip_core::{OtsKey, RedeemError, Result};

pub const BUNDLE_VERSION: u32 = 1;
pub const PBKDF2_ITERATIONS: u32 = 310_000;
pub const ALGORITHM: &str = "aes-256-gcm";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// plaintext payload wrapped by the artifact
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyBundle {
    pub deposit_id: String,
    #[serde(default)]
    pub request_id: Option<String>,
    pub keys: Vec<OtsKey>,
}

/// the exportable artifact; byte fields travel base64-encoded
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedKeyBundle {
    pub version: u32,
    pub kdf_salt: String,
    pub iv: String,
    pub ciphertext: String,
    pub algorithm: String,
    pub iterations: u32,
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

pub fn encrypt(bundle: &KeyBundle, password: &str) -> Result<EncryptedKeyBundle> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut nonce);

    let key = derive_key(password, &salt, PBKDF2_ITERATIONS);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| RedeemError::Malformed(format!("cipher init: {e}")))?;

    let plaintext = serde_json::to_vec(bundle)
        .map_err(|e| RedeemError::Malformed(format!("bundle serialization: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|e| RedeemError::Malformed(format!("encryption: {e}")))?;

    debug!(keys = bundle.keys.len(), "encrypted key bundle");

    Ok(EncryptedKeyBundle {
        version: BUNDLE_VERSION,
        kdf_salt: B64.encode(salt),
        iv: B64.encode(nonce),
        ciphertext: B64.encode(ciphertext),
        algorithm: ALGORITHM.into(),
        iterations: PBKDF2_ITERATIONS,
    })
}

/// decrypt an exported artifact
///
/// a wrong password, a tampered ciphertext and an undeserializable
/// plaintext all collapse to [`RedeemError::DecryptionFailed`]; partial
/// data never escapes
pub fn decrypt(artifact: &EncryptedKeyBundle, password: &str) -> Result<KeyBundle> {
    if artifact.version != BUNDLE_VERSION {
        return Err(RedeemError::UnsupportedVersion(artifact.version));
    }
    if artifact.algorithm != ALGORITHM {
        return Err(RedeemError::UnsupportedAlgorithm(artifact.algorithm.clone()));
    }

    let salt = B64
        .decode(&artifact.kdf_salt)
        .map_err(|_| RedeemError::DecryptionFailed)?;
    let nonce = B64
        .decode(&artifact.iv)
        .map_err(|_| RedeemError::DecryptionFailed)?;
    let ciphertext = B64
        .decode(&artifact.ciphertext)
        .map_err(|_| RedeemError::DecryptionFailed)?;
    if nonce.len() != NONCE_LEN {
        return Err(RedeemError::DecryptionFailed);
    }

    let key = derive_key(password, &salt, artifact.iterations);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| RedeemError::DecryptionFailed)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| RedeemError::DecryptionFailed)?;

    serde_json::from_slice(&plaintext).map_err(|_| RedeemError::DecryptionFailed)
}

/// write the artifact to a flat text file; convention: `.enc` extension
pub fn export_to_file(path: &std::path::Path, bundle: &KeyBundle, password: &str) -> Result<()> {
    let artifact = encrypt(bundle, password)?;
    let text = serde_json::to_string_pretty(&artifact)
        .map_err(|e| RedeemError::Storage(e.to_string()))?;
    std::fs::write(path, text).map_err(|e| RedeemError::Storage(e.to_string()))?;
    info!(path = %path.display(), keys = bundle.keys.len(), "exported key bundle");
    Ok(())
}

pub fn import_from_file(path: &std::path::Path, password: &str) -> Result<KeyBundle> {
    let text = std::fs::read_to_string(path).map_err(|e| RedeemError::Storage(e.to_string()))?;
    let artifact: EncryptedKeyBundle =
        serde_json::from_str(&text).map_err(|_| RedeemError::DecryptionFailed)?;
    let bundle = decrypt(&artifact, password)?;
    info!(path = %path.display(), keys = bundle.keys.len(), "imported key bundle");
    Ok(bundle)
}
