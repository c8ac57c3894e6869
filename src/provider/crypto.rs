// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Payload sealing used by the MinIO admin API for bodies that carry
//! credentials.
//!
//! A sealed payload is `salt (32) | cipher id (1) | nonce (8) | fragments`.
//! The key is derived from the admin secret key with Argon2id. Plaintext is
//! cut into fragments of at most 16 KiB; each is sealed under the nonce
//! extended with a little-endian sequence number, and the last one is marked
//! final in its associated data so truncation is detected.

use crate::error::{ProvisionError, Result};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::ChaCha20Poly1305;
use rand::rngs::OsRng;
use rand::RngCore;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 8;
const TAG_LEN: usize = 16;
const FRAGMENT_LEN: usize = 16 * 1024;
const HEADER_LEN: usize = SALT_LEN + 1 + NONCE_LEN;
const FINAL_FLAG: u8 = 0x80;

const AES_256_GCM: u8 = 0x00;
const CHACHA20_POLY1305: u8 = 0x01;

const OPERATION: &str = "SealPayload";

enum Sealer {
    Aes(Box<Aes256Gcm>),
    ChaCha(Box<ChaCha20Poly1305>),
}

impl Sealer {
    fn new(id: u8, key: &[u8]) -> Result<Self> {
        match id {
            AES_256_GCM => Aes256Gcm::new_from_slice(key)
                .map(|c| Sealer::Aes(Box::new(c)))
                .map_err(|e| ProvisionError::provider(OPERATION, e)),
            CHACHA20_POLY1305 => ChaCha20Poly1305::new_from_slice(key)
                .map(|c| Sealer::ChaCha(Box::new(c)))
                .map_err(|e| ProvisionError::provider(OPERATION, e)),
            other => Err(ProvisionError::provider(
                OPERATION,
                format!("unsupported cipher id {other:#04x}"),
            )),
        }
    }

    fn seal(&self, nonce: &[u8; 12], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload { msg, aad };
        match self {
            Sealer::Aes(c) => c.encrypt(Nonce::from_slice(nonce), payload),
            Sealer::ChaCha(c) => c.encrypt(Nonce::from_slice(nonce), payload),
        }
        .map_err(|_| ProvisionError::provider(OPERATION, "encryption failed"))
    }

    fn open(&self, nonce: &[u8; 12], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload { msg, aad };
        match self {
            Sealer::Aes(c) => c.decrypt(Nonce::from_slice(nonce), payload),
            Sealer::ChaCha(c) => c.decrypt(Nonce::from_slice(nonce), payload),
        }
        .map_err(|_| ProvisionError::provider(OPERATION, "payload failed authentication"))
    }
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let params =
        Params::new(64 * 1024, 1, 4, Some(32)).map_err(|e| ProvisionError::provider(OPERATION, e))?;
    let mut key = [0u8; 32];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| ProvisionError::provider(OPERATION, e))?;
    Ok(key)
}

/// Authenticates the (empty) caller associated data under sequence number 0;
/// the leading byte is flipped to [`FINAL_FLAG`] for the last fragment.
fn associated_data(sealer: &Sealer, nonce: &mut [u8; 12]) -> Result<Vec<u8>> {
    nonce[NONCE_LEN..].copy_from_slice(&0u32.to_le_bytes());
    let tag = sealer.seal(nonce, &[], &[])?;
    let mut aad = Vec::with_capacity(1 + TAG_LEN);
    aad.push(0);
    aad.extend_from_slice(&tag);
    Ok(aad)
}

pub fn encrypt(password: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    let mut base = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut base);

    let sealer = Sealer::new(AES_256_GCM, &derive_key(password, &salt)?)?;
    let mut nonce = [0u8; 12];
    nonce[..NONCE_LEN].copy_from_slice(&base);
    let mut aad = associated_data(&sealer, &mut nonce)?;

    let fragments: Vec<&[u8]> = if plaintext.is_empty() {
        vec![plaintext]
    } else {
        plaintext.chunks(FRAGMENT_LEN).collect()
    };

    let mut out = Vec::with_capacity(HEADER_LEN + plaintext.len() + fragments.len() * TAG_LEN);
    out.extend_from_slice(&salt);
    out.push(AES_256_GCM);
    out.extend_from_slice(&base);

    let last = fragments.len() - 1;
    for (i, fragment) in fragments.into_iter().enumerate() {
        nonce[NONCE_LEN..].copy_from_slice(&(i as u32 + 1).to_le_bytes());
        if i == last {
            aad[0] = FINAL_FLAG;
        }
        out.extend(sealer.seal(&nonce, fragment, &aad)?);
    }

    Ok(out)
}

pub fn decrypt(password: &str, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < HEADER_LEN + TAG_LEN {
        return Err(ProvisionError::provider(OPERATION, "sealed payload too short"));
    }
    let (salt, rest) = sealed.split_at(SALT_LEN);
    let (id, rest) = rest.split_at(1);
    let (base, body) = rest.split_at(NONCE_LEN);

    let sealer = Sealer::new(id[0], &derive_key(password, salt)?)?;
    let mut nonce = [0u8; 12];
    nonce[..NONCE_LEN].copy_from_slice(base);
    let mut aad = associated_data(&sealer, &mut nonce)?;

    let fragments: Vec<&[u8]> = body.chunks(FRAGMENT_LEN + TAG_LEN).collect();
    let last = fragments.len() - 1;
    let mut out = Vec::with_capacity(body.len());
    for (i, fragment) in fragments.into_iter().enumerate() {
        nonce[NONCE_LEN..].copy_from_slice(&(i as u32 + 1).to_le_bytes());
        if i == last {
            aad[0] = FINAL_FLAG;
        }
        out.extend(sealer.open(&nonce, fragment, &aad)?);
    }

    Ok(out)
}
