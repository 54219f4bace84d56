//! The per-subscription shared secret echoed back in every notification.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};

use crate::secrets::{self, SecretError};

/// Random bytes behind a client state (256 bits).
const CLIENT_STATE_BYTES: usize = 32;

/// A locally generated secret that authenticates inbound callbacks.
///
/// Never logged: `Debug` is redacted and the type is not `Serialize`.
pub struct ClientState(SecretString);

impl ClientState {
    /// Generates a fresh random client state.
    pub fn generate() -> Result<Self, SecretError> {
        let bytes = secrets::random_bytes::<CLIENT_STATE_BYTES>()?;
        Ok(Self(SecretString::from(URL_SAFE_NO_PAD.encode(bytes))))
    }

    /// Wraps a value loaded from the record store.
    pub fn from_stored(value: String) -> Self {
        Self(SecretString::from(value))
    }

    /// The raw value, for the subscription request and the record store only.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Constant-time comparison against a value received in a notification.
    pub fn matches(&self, candidate: &str) -> bool {
        let expected = self.expose().as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Clone for ClientState {
    fn clone(&self) -> Self {
        Self::from_stored(self.expose().to_string())
    }
}

impl std::fmt::Debug for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ClientState(<redacted>)")
    }
}
