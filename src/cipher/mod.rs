// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Session payload encryption: ECDH + XChaCha20-Poly1305.
//!
//! Both parties derive the same symmetric key from their own private key
//! and the other side's public key:
//!
//! 1. secp256k1 ECDH over the exchanged public keys
//! 2. SHA-256 over the shared point's x-coordinate
//! 3. HKDF-SHA256 expand with a session-specific info label
//!
//! Ciphertext layout is `nonce (24 bytes) || AEAD output`, base64-encoded
//! at the message layer. These functions have no network or storage side
//! effects; key persistence lives in [`KeyManager`].
//!
//! [`KeyManager`]: key_manager::KeyManager

pub mod key_manager;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::XChaCha20Poly1305;
use hkdf::Hkdf;
use k256::ecdh::diffie_hellman;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::{EncodedPoint, PublicKey, SecretKey};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::WalletError;

pub use key_manager::KeyManager;

/// HKDF info parameter; domain-separates session keys from any other use
/// of the same key agreement.
const SESSION_HKDF_INFO: &[u8] = b"wallet-session-encryption-v1";

const NONCE_LEN: usize = 24;

/// Derived symmetric key for one established session.
pub type SharedSecret = [u8; 32];

/// Generate a fresh secp256k1 keypair.
pub fn generate_keypair() -> SecretKey {
    SecretKey::random(&mut rand::thread_rng())
}

/// Export a public key as hex of its uncompressed SEC1 point.
pub fn export_public_key_hex(key: &PublicKey) -> String {
    hex::encode(key.to_encoded_point(false).as_bytes())
}

/// Parse a hex-encoded SEC1 public key (compressed or uncompressed,
/// optional `0x` prefix), validating it is a point on the curve.
pub fn import_public_key_hex(hex_str: &str) -> Result<PublicKey, WalletError> {
    let cleaned = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(cleaned)
        .map_err(|e| WalletError::InvalidRequest(format!("invalid public key hex: {e}")))?;
    let point = EncodedPoint::from_bytes(&bytes)
        .map_err(|e| WalletError::InvalidRequest(format!("invalid public key encoding: {e}")))?;
    let key = PublicKey::from_encoded_point(&point);
    if key.is_some().into() {
        Ok(key.unwrap())
    } else {
        Err(WalletError::InvalidRequest(
            "public key is not a valid curve point".to_string(),
        ))
    }
}

/// Export a secret key as hex for the persisted session blob.
pub fn export_secret_key_hex(key: &SecretKey) -> String {
    hex::encode(key.to_bytes())
}

pub fn import_secret_key_hex(hex_str: &str) -> Result<SecretKey, WalletError> {
    let bytes = hex::decode(hex_str.strip_prefix("0x").unwrap_or(hex_str))
        .map_err(|e| WalletError::InvalidRequest(format!("invalid secret key hex: {e}")))?;
    SecretKey::from_slice(&bytes)
        .map_err(|e| WalletError::InvalidRequest(format!("invalid secret key: {e}")))
}

/// Deterministically derive the symmetric session key from one side's
/// private key and the other side's public key. Symmetric in its inputs:
/// both parties arrive at the same key.
pub fn derive_shared_secret(own: &SecretKey, peer: &PublicKey) -> Result<SharedSecret, WalletError> {
    let ecdh = diffie_hellman(own.to_nonzero_scalar(), peer.as_affine());
    let digest = Sha256::digest(ecdh.raw_secret_bytes());

    let hkdf = Hkdf::<Sha256>::new(None, &digest);
    let mut secret = [0u8; 32];
    hkdf.expand(SESSION_HKDF_INFO, &mut secret)
        .map_err(|_| WalletError::Decryption)?;
    Ok(secret)
}

/// Encrypt a payload, prepending a fresh random 24-byte nonce.
pub fn encrypt(secret: &SharedSecret, plaintext: &[u8]) -> Result<Vec<u8>, WalletError> {
    let cipher = XChaCha20Poly1305::new_from_slice(secret).map_err(|_| WalletError::Decryption)?;
    let nonce_bytes: [u8; NONCE_LEN] = rand::thread_rng().gen();
    let nonce = chacha20poly1305::XNonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| WalletError::Decryption)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a `nonce || ciphertext` blob. Fails with
/// [`WalletError::Decryption`] on a truncated blob, authentication-tag
/// mismatch, or a key that does not match the sender's.
pub fn decrypt(secret: &SharedSecret, blob: &[u8]) -> Result<Vec<u8>, WalletError> {
    if blob.len() <= NONCE_LEN {
        return Err(WalletError::Decryption);
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new_from_slice(secret).map_err(|_| WalletError::Decryption)?;
    let nonce = chacha20poly1305::XNonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| WalletError::Decryption)
}
