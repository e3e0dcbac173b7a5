//! Login state values binding an authorization redirect to its callback.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};

/// 128 bits of entropy.
const STATE_BYTES: usize = 16;

/// Source of login state values. Swappable so tests can pin the value.
pub type StateGenerator = fn() -> String;

/// Generate an unpredictable state value, base64url encoded without padding.
///
/// # Panics
/// Panics when the operating system entropy source fails.
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}
