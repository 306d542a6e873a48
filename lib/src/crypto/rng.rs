use rand_core::{CryptoRng, OsRng, RngCore};

/// The randomness source for key generation and HPKE encapsulation.
#[inline]
pub fn get_rng() -> impl RngCore + CryptoRng {
    OsRng
}
