//! # Detached Signatures
//!
//! Thin signing and verification helpers over the key types, used by the
//! project owner-auth flow and anywhere a signature travels as raw bytes.
//!
//! We intentionally do not distinguish between "invalid signature" and
//! "wrong public key" in the fallible paths. Both are just a failure;
//! a detailed error oracle helps nobody but an attacker.

use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};
use thiserror::Error;

use super::keys::{BeaconKeypair, BeaconPublicKey, BeaconSignature};
use crate::config::{PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

/// Errors during signature operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,

    #[error("invalid signature bytes: expected {SIGNATURE_LENGTH} bytes")]
    InvalidSignatureBytes,

    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Sign a message with the given keypair.
pub fn sign(keypair: &BeaconKeypair, message: &[u8]) -> BeaconSignature {
    keypair.sign(message)
}

/// Verify a signature against a public key and message.
pub fn verify(public_key: &BeaconPublicKey, message: &[u8], signature: &BeaconSignature) -> bool {
    public_key.verify(message, signature)
}

/// Verify a signature from raw byte components.
///
/// The "I got these bytes off the wire and need to check them" variant:
/// parses the key and signature, then verifies. Used by owner
/// authentication, where both halves arrive hex-encoded.
pub fn verify_raw(
    public_key_bytes: &[u8; PUBLIC_KEY_LENGTH],
    message: &[u8],
    signature_bytes: &[u8; SIGNATURE_LENGTH],
) -> Result<(), SignatureError> {
    let verifying_key =
        VerifyingKey::from_bytes(public_key_bytes).map_err(|_| SignatureError::InvalidPublicKey)?;
    let signature = DalekSignature::from_bytes(signature_bytes);
    verifying_key
        .verify(message, &signature)
        .map_err(|_| SignatureError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let kp = BeaconKeypair::generate();
        let msg = b"prove you own this project";
        let sig = sign(&kp, msg);
        assert!(verify(&kp.public_key(), msg, &sig));
    }

    #[test]
    fn verify_raw_roundtrip() {
        let kp = BeaconKeypair::generate();
        let msg = b"raw bytes path";
        let sig = sign(&kp, msg);
        let mut sig_arr = [0u8; SIGNATURE_LENGTH];
        sig_arr.copy_from_slice(sig.as_bytes());
        assert!(verify_raw(kp.public_key().as_bytes(), msg, &sig_arr).is_ok());
    }

    #[test]
    fn verify_raw_rejects_wrong_message() {
        let kp = BeaconKeypair::generate();
        let sig = sign(&kp, b"one message");
        let mut sig_arr = [0u8; SIGNATURE_LENGTH];
        sig_arr.copy_from_slice(sig.as_bytes());
        let err = verify_raw(kp.public_key().as_bytes(), b"another message", &sig_arr)
            .expect_err("must fail");
        assert!(matches!(err, SignatureError::VerificationFailed));
    }

    #[test]
    fn verify_raw_rejects_invalid_pubkey() {
        // All zeros is the identity point, rejected at parse time.
        let err = verify_raw(&[0u8; 32], b"msg", &[0u8; 64]).expect_err("must fail");
        assert!(matches!(
            err,
            SignatureError::InvalidPublicKey | SignatureError::VerificationFailed
        ));
    }
}
