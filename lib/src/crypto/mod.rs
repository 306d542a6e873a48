//! Key material and the sealed "tunnel" used to address a single recipient.
//!
//! Every tunnel is a one-shot HPKE base-mode seal (X25519, HKDF-SHA256,
//! AES-128-GCM) to the recipient's public key. Nothing here authenticates the
//! sender: the relay can read what it forwards, network observers cannot.
pub mod keys;
pub mod rng;
pub mod tunnel;

pub use keys::{KeyPair, PublicKey, SecretKey};
pub use tunnel::SealedTunnel;

type Kem = hpke::kem::X25519HkdfSha256;
type Kdf = hpke::kdf::HkdfSha256;
type Aead = hpke::aead::AesGcm128;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid secret key")]
    InvalidSecretKey,
    #[error("could not seal tunnel to recipient")]
    EncryptFailed,
    #[error("could not open tunnel")]
    DecryptFailed,
}
