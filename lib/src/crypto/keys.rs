use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use base64ct::{Base64UrlUnpadded, Encoding};
use hpke::{Deserializable, Kem as KemTrait, Serializable};
use serde::{Deserialize, Serialize};

use super::{rng::get_rng, CryptoError, Kem};
use crate::constants::{PUBLIC_KEY_PREFIX, SECRET_KEY_PREFIX, X25519_KEY_LENGTH};

type HpkePublicKey = <Kem as KemTrait>::PublicKey;
type HpkePrivateKey = <Kem as KemTrait>::PrivateKey;

/// An X25519 public key other parties seal tunnels to.
///
/// Its textual form is `x25519:` followed by the unpadded URL-safe base64
/// encoding of the 32 key bytes. That is what travels in join and key
/// broadcast payloads.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey([u8; X25519_KEY_LENGTH]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; X25519_KEY_LENGTH] {
        &self.0
    }

    pub(crate) fn to_hpke(self) -> Result<HpkePublicKey, CryptoError> {
        HpkePublicKey::from_bytes(&self.0)
            .map_err(|_| CryptoError::InvalidPublicKey("not an x25519 point".to_string()))
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = s.strip_prefix(PUBLIC_KEY_PREFIX).ok_or_else(|| {
            CryptoError::InvalidPublicKey(format!("missing `{PUBLIC_KEY_PREFIX}` prefix"))
        })?;

        let bytes = Base64UrlUnpadded::decode_vec(encoded)
            .map_err(|_| CryptoError::InvalidPublicKey("key is not base64".to_string()))?;

        let bytes: [u8; X25519_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey(format!("key is not {X25519_KEY_LENGTH} bytes long"))
        })?;

        let key = Self(bytes);
        key.to_hpke()?;

        Ok(key)
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{PUBLIC_KEY_PREFIX}{}",
            Base64UrlUnpadded::encode_string(&self.0)
        )
    }
}

impl Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl TryFrom<String> for PublicKey {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PublicKey> for String {
    fn from(value: PublicKey) -> Self {
        value.to_string()
    }
}

/// The private half of a [`KeyPair`]. Never leaves the process except
/// through [`SecretKey::to_file_contents`].
pub struct SecretKey(HpkePrivateKey);

impl SecretKey {
    pub(crate) fn as_hpke(&self) -> &HpkePrivateKey {
        &self.0
    }

    /// Single line representation written to the key file.
    pub fn to_file_contents(&self) -> String {
        format!(
            "{SECRET_KEY_PREFIX}{}\n",
            Base64UrlUnpadded::encode_string(&self.0.to_bytes())
        )
    }

    pub fn from_file_contents(contents: &str) -> Result<Self, CryptoError> {
        let encoded = contents
            .trim()
            .strip_prefix(SECRET_KEY_PREFIX)
            .ok_or(CryptoError::InvalidSecretKey)?;

        let bytes =
            Base64UrlUnpadded::decode_vec(encoded).map_err(|_| CryptoError::InvalidSecretKey)?;

        HpkePrivateKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidSecretKey)
    }
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

#[derive(Debug)]
pub struct KeyPair {
    public: PublicKey,
    secret: SecretKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let (secret, public) = Kem::gen_keypair(&mut get_rng());

        let mut public_bytes = [0u8; X25519_KEY_LENGTH];
        public_bytes.copy_from_slice(&public.to_bytes());

        Self {
            public: PublicKey(public_bytes),
            secret: SecretKey(secret),
        }
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_text_roundtrip() {
        let pair = KeyPair::generate();
        let text = pair.public().to_string();

        assert!(text.starts_with(PUBLIC_KEY_PREFIX));
        assert_eq!(
            text.parse::<PublicKey>().expect("own output parses"),
            *pair.public()
        );
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(
            KeyPair::generate().public(),
            KeyPair::generate().public(),
            "two generated identities should never share a public key"
        );
    }

    #[test]
    fn rejects_malformed_public_keys() {
        let valid = KeyPair::generate().public().to_string();
        let body = valid
            .strip_prefix(PUBLIC_KEY_PREFIX)
            .expect("prefix is present");

        for candidate in [
            String::new(),
            body.to_string(),
            format!("age1{body}"),
            format!("{PUBLIC_KEY_PREFIX}not*base64"),
            format!("{PUBLIC_KEY_PREFIX}{}", &body[..body.len() - 4]),
            format!("{valid}AAAA"),
        ] {
            assert!(
                matches!(
                    candidate.parse::<PublicKey>(),
                    Err(CryptoError::InvalidPublicKey(_))
                ),
                "{candidate:?} should not parse"
            );
        }
    }

    #[test]
    fn public_key_serializes_as_string() {
        let key = *KeyPair::generate().public();
        let json = serde_json::to_string(&key).expect("serializes");

        assert_eq!(json, format!("\"{key}\""));
        assert_eq!(
            serde_json::from_str::<PublicKey>(&json).expect("deserializes"),
            key
        );
        assert!(serde_json::from_str::<PublicKey>("\"x25519:nope\"").is_err());
    }

    #[test]
    fn secret_key_file_contents() {
        let pair = KeyPair::generate();
        let contents = pair.secret().to_file_contents();

        assert!(contents.starts_with(SECRET_KEY_PREFIX));
        assert!(contents.ends_with('\n'));
        assert!(
            !contents.contains(&pair.public().to_string()),
            "the key file holds the secret, not the public key"
        );

        SecretKey::from_file_contents(&contents).expect("own output parses");
        assert_eq!(
            SecretKey::from_file_contents("x25519:AAAA").unwrap_err(),
            CryptoError::InvalidSecretKey
        );
    }

    #[test]
    fn secret_key_debug_is_redacted() {
        let pair = KeyPair::generate();
        assert_eq!(format!("{:?}", pair.secret()), "SecretKey(..)");
    }
}
