//! The authentication collaborator boundary.
//!
//! NTLM/NTLMv2 challenge-response verification and message signing are
//! external concerns; the engine only mints the challenge, hands the
//! client's evidence to the [`Authenticator`], and applies the returned
//! verdict and signing key.

use rand::RngCore;

use crate::config::UserConfig;

/// The outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    /// Session key material for signing; empty disables signing for the
    /// session.
    pub signing_key: Vec<u8>,
}

/// External NTLM verification and signing oracle.
pub trait Authenticator: Send + Sync {
    /// Verifies a SESSION_SETUP against the connection's challenge.
    ///
    /// `case_insensitive` carries the LM response slot, `case_sensitive`
    /// the NTLM/NTLMv2 response slot.
    fn verify_ntlm(
        &self,
        user: &UserConfig,
        challenge: &[u8; 8],
        case_insensitive: &[u8],
        case_sensitive: &[u8],
    ) -> Option<AuthOutcome>;

    /// Computes the 8-byte security signature over the given buffers with
    /// the session's key and sequence number.
    fn sign(&self, signing_key: &[u8], sequence: u32, buffers: &[&[u8]]) -> [u8; 8];
}

/// Mints the 8-byte negotiate challenge nonce.
pub fn fresh_challenge() -> [u8; 8] {
    let mut challenge = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut challenge);
    challenge
}

/// An authenticator that accepts any response and never signs.
///
/// For guest-style deployments and tests; production wires a real NTLM
/// oracle here.
#[derive(Debug, Default)]
pub struct AcceptAllAuthenticator;

impl Authenticator for AcceptAllAuthenticator {
    fn verify_ntlm(
        &self,
        _user: &UserConfig,
        _challenge: &[u8; 8],
        _case_insensitive: &[u8],
        _case_sensitive: &[u8],
    ) -> Option<AuthOutcome> {
        Some(AuthOutcome {
            signing_key: Vec::new(),
        })
    }

    fn sign(&self, _signing_key: &[u8], _sequence: u32, _buffers: &[&[u8]]) -> [u8; 8] {
        [0; 8]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenges_vary() {
        assert_ne!(fresh_challenge(), fresh_challenge());
    }
}
