//! Values both ends of a session have to agree on.

pub const LOCALHOST_DOMAIN: &str = "127.0.0.1";

/// Port the live relay listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 50002;

/// HPKE `info` parameter bound into every tunnel.
pub const TUNNEL_INFO: &[u8] = b"stagelink tunnel v1";

pub const PUBLIC_KEY_PREFIX: &str = "x25519:";
pub const SECRET_KEY_PREFIX: &str = "x25519-secret:";

/// Length in bytes of an X25519 public key, secret key and encapsulated key.
pub const X25519_KEY_LENGTH: usize = 32;
