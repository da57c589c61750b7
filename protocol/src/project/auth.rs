//! Owner authentication.
//!
//! A project declares an auth public key; whoever can sign with the
//! matching private key is the owner. The scheme is a plain detached
//! signature over a domain-separated digest of the challenge message,
//! hex-encoded for transport. Servers use it to gate project updates,
//! and backers use it to check that a status message really came from the
//! party that published the project file.

use thiserror::Error;

use super::descriptor::Project;
use crate::config::SIGNATURE_LENGTH;
use crate::crypto::{domain_separated_hash, signatures, SignatureError};
use crate::ports::KeyProvider;

/// Domain tag for owner-auth digests. Signing any other protocol message
/// can never produce bytes that verify here.
const OWNER_AUTH_CONTEXT: &str = "beacon.project.owner-auth.v1";

/// Errors while producing an owner signature.
#[derive(Debug, Error)]
pub enum OwnerAuthError {
    /// The key provider holds no key matching the project's auth key.
    #[error("the project's auth key is not available in this wallet")]
    AuthKeyUnavailable,
}

fn owner_auth_digest(message: &str) -> [u8; 32] {
    domain_separated_hash(OWNER_AUTH_CONTEXT, message.as_bytes())
}

impl Project {
    /// Sign `message` as the project owner.
    ///
    /// The signing key is located through the key provider: first by the
    /// declared public key, then by the recorded derivation index (the
    /// path a seed-restored wallet needs when the key fell outside its
    /// lookahead window). Returns the hex-encoded detached signature.
    pub fn sign_as_owner(
        &self,
        keys: &dyn KeyProvider,
        message: &str,
    ) -> Result<String, OwnerAuthError> {
        let keypair = keys
            .find_key_by_pubkey(self.auth_key())
            .or_else(|| {
                keys.auth_key_by_index(self.auth_key_index())
                    .filter(|kp| kp.public_key() == *self.auth_key())
            })
            .ok_or(OwnerAuthError::AuthKeyUnavailable)?;
        let signature = signatures::sign(&keypair, &owner_auth_digest(message));
        Ok(hex::encode(signature.as_bytes()))
    }

    /// Verify an owner signature over `message` against the declared auth
    /// key.
    pub fn authenticate_owner(
        &self,
        message: &str,
        signature_hex: &str,
    ) -> Result<(), SignatureError> {
        let bytes =
            hex::decode(signature_hex).map_err(|_| SignatureError::InvalidSignatureBytes)?;
        let sig: [u8; SIGNATURE_LENGTH] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidSignatureBytes)?;
        signatures::verify_raw(self.auth_key().as_bytes(), &owner_auth_digest(message), &sig)
    }
}
