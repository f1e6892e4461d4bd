//! Opaque identifiers for Patrol.
//!
//! Numeric primary keys never leave the process in the clear. Every id that
//! crosses the API boundary is sealed into a token scoped to its entity type:
//!
//!   token = base64url( version || nonce(24) || XChaCha20-Poly1305(tag || id_le) )
//!
//! Each entity type gets its own key, derived from one master secret with
//! BLAKE3's key-derivation mode. The version byte and entity tag are bound as
//! associated data, so a token minted for one entity type fails verification
//! under any other.
//!
//! Encoding uses a fresh random nonce per call: the same id yields a different
//! token every time, and every token decodes back to the same id.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const TOKEN_VERSION: u8 = 1;
const NONCE_LEN: usize = 24;
/// Entity tag (1 byte) + little-endian u64 id.
const PLAINTEXT_LEN: usize = 9;
const MAC_LEN: usize = 16;
const TOKEN_BYTES: usize = 1 + NONCE_LEN + PLAINTEXT_LEN + MAC_LEN;

// ── Entity types ──────────────────────────────────────────────────────────────

/// The scope a token is minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum EntityType {
    User = 1,
    Order = 2,
    Assignment = 3,
    Message = 4,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [Self::User, Self::Order, Self::Assignment, Self::Message];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Order => "order",
            Self::Assignment => "assignment",
            Self::Message => "message",
        }
    }

    /// BLAKE3 derive_key context. Changing these invalidates every issued token.
    fn key_context(self) -> &'static str {
        match self {
            Self::User => "patrol 2024 opaque-id user",
            Self::Order => "patrol 2024 opaque-id order",
            Self::Assignment => "patrol 2024 opaque-id assignment",
            Self::Message => "patrol 2024 opaque-id message",
        }
    }

    fn index(self) -> usize {
        (self as u8 - 1) as usize
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Secret ────────────────────────────────────────────────────────────────────

/// Master secret for the codec. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CodecSecret([u8; 32]);

impl CodecSecret {
    /// Generate a fresh random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a hex-encoded 32-byte secret, as stored in the config file.
    pub fn from_hex(hex_str: &str) -> Result<Self, CodecError> {
        let bytes = Zeroizing::new(
            hex::decode(hex_str.trim()).map_err(|_| CodecError::InvalidSecret("not valid hex"))?,
        );
        if bytes.len() != 32 {
            return Err(CodecError::InvalidSecret("secret must be 32 bytes"));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0))
    }
}

impl fmt::Debug for CodecSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CodecSecret(<redacted>)")
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Seals and opens opaque identifiers. Built once at startup and shared.
#[derive(Clone)]
pub struct IdCodec {
    ciphers: [XChaCha20Poly1305; 4],
}

impl IdCodec {
    pub fn new(secret: &CodecSecret) -> Self {
        let cipher_for = |entity: EntityType| {
            let key = Zeroizing::new(blake3::derive_key(entity.key_context(), &secret.0));
            XChaCha20Poly1305::new(Key::from_slice(&key[..]))
        };
        Self {
            ciphers: EntityType::ALL.map(cipher_for),
        }
    }

    /// Seal `id` into a token scoped to `entity`.
    pub fn encode(&self, entity: EntityType, id: u64) -> Result<String, CodecError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut plaintext = Zeroizing::new([0u8; PLAINTEXT_LEN]);
        plaintext[0] = entity.tag();
        plaintext[1..].copy_from_slice(&id.to_le_bytes());

        let sealed = self.ciphers[entity.index()]
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext[..],
                    aad: &associated_data(entity),
                },
            )
            .map_err(|_| CodecError::Seal)?;

        let mut raw = Vec::with_capacity(TOKEN_BYTES);
        raw.push(TOKEN_VERSION);
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&sealed);
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Open a token, requiring it to have been minted for `expected`.
    pub fn decode(&self, token: &str, expected: EntityType) -> Result<u64, CodecError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim().as_bytes())
            .map_err(|_| CodecError::InvalidIdentifier("malformed"))?;
        if raw.len() != TOKEN_BYTES {
            return Err(CodecError::InvalidIdentifier("malformed"));
        }
        if raw[0] != TOKEN_VERSION {
            return Err(CodecError::InvalidIdentifier("unknown version"));
        }

        let (nonce, sealed) = raw[1..].split_at(NONCE_LEN);
        let plaintext = Zeroizing::new(
            self.ciphers[expected.index()]
                .decrypt(
                    XNonce::from_slice(nonce),
                    Payload {
                        msg: sealed,
                        aad: &associated_data(expected),
                    },
                )
                .map_err(|_| CodecError::InvalidIdentifier("integrity check failed"))?,
        );

        if plaintext.len() != PLAINTEXT_LEN || plaintext[0] != expected.tag() {
            return Err(CodecError::InvalidIdentifier("entity type mismatch"));
        }
        let mut id = [0u8; 8];
        id.copy_from_slice(&plaintext[1..]);
        Ok(u64::from_le_bytes(id))
    }
}

impl fmt::Debug for IdCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdCodec { .. }")
    }
}

fn associated_data(entity: EntityType) -> [u8; 2] {
    [TOKEN_VERSION, entity.tag()]
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid identifier ({0})")]
    InvalidIdentifier(&'static str),

    #[error("invalid codec secret: {0}")]
    InvalidSecret(&'static str),

    #[error("failed to seal identifier")]
    Seal,
}

impl CodecError {
    pub fn is_invalid_identifier(&self) -> bool {
        matches!(self, Self::InvalidIdentifier(_))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
