use base64ct::{Base64, Encoding};
use hpke::{Deserializable, Kem as KemTrait, OpModeR, OpModeS, Serializable};
use serde::{Deserialize, Serialize};

use super::{rng::get_rng, Aead, CryptoError, Kdf, Kem, PublicKey, SecretKey};
use crate::constants::{TUNNEL_INFO, X25519_KEY_LENGTH};

type EncappedKey = <Kem as KemTrait>::EncappedKey;

/// Ciphertext addressed to exactly one recipient, as it appears in the
/// `payload.tunnel` field of an envelope.
///
/// The inner string is the standard (padded) base64 encoding of the
/// encapsulated key followed by the AEAD ciphertext. A value received from
/// the network is not checked until [`SealedTunnel::open`] is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedTunnel(String);

impl SealedTunnel {
    /// Wraps a blob as received on the wire.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encrypts `plaintext` so that only the holder of the secret half of
    /// `recipient` can read it. Each call uses a fresh ephemeral key.
    pub fn seal(plaintext: &[u8], recipient: &PublicKey) -> Result<Self, CryptoError> {
        let recipient = recipient.to_hpke()?;

        let (encapped_key, ciphertext) = hpke::single_shot_seal::<Aead, Kdf, Kem, _>(
            &OpModeS::Base,
            &recipient,
            TUNNEL_INFO,
            plaintext,
            &[],
            &mut get_rng(),
        )
        .map_err(|_| CryptoError::EncryptFailed)?;

        let mut bytes = encapped_key.to_bytes().to_vec();
        bytes.extend_from_slice(&ciphertext);

        Ok(Self(Base64::encode_string(&bytes)))
    }

    /// Decrypts a tunnel sealed to the public half of `secret`.
    ///
    /// Anything that isn't a tunnel for this key (bad base64, truncated
    /// blob, other recipient, tampered ciphertext) is [`CryptoError::DecryptFailed`].
    pub fn open(&self, secret: &SecretKey) -> Result<Vec<u8>, CryptoError> {
        let bytes = Base64::decode_vec(self.0.trim()).map_err(|_| CryptoError::DecryptFailed)?;

        if bytes.len() <= X25519_KEY_LENGTH {
            return Err(CryptoError::DecryptFailed);
        }

        let (encapped_key, ciphertext) = bytes.split_at(X25519_KEY_LENGTH);
        let encapped_key =
            EncappedKey::from_bytes(encapped_key).map_err(|_| CryptoError::DecryptFailed)?;

        hpke::single_shot_open::<Aead, Kdf, Kem>(
            &OpModeR::Base,
            secret.as_hpke(),
            &encapped_key,
            TUNNEL_INFO,
            ciphertext,
            &[],
        )
        .map_err(|_| CryptoError::DecryptFailed)
    }
}
