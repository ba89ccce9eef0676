// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Secure-side operation descriptors
//!
//! These are the validated, secure-owned copies the boundary hands to a
//! driver. Buffer addresses in them have already been checked for the
//! direction the driver uses them in; key descriptors have already been
//! checked for an allowed storage class.

use q_common::types::{Addr, Span};

// =============================================================================
// Keys
// =============================================================================

/// Storage class of a key descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum KeyEncoding {
    /// Material in caller-readable memory
    Plaintext = 0x02,
    /// Material held by the key store, referenced by id
    KeyStore = 0x04,
    /// Output slot in caller-writable memory
    BlankPlaintext = 0x08,
    /// Output slot in the key store
    BlankKeyStore = 0x10,
    /// Material in hardware-security-module memory
    PlaintextHsm = 0x20,
}

impl KeyEncoding {
    /// Decode a wire value
    #[must_use]
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x02 => Some(Self::Plaintext),
            0x04 => Some(Self::KeyStore),
            0x08 => Some(Self::BlankPlaintext),
            0x10 => Some(Self::BlankKeyStore),
            0x20 => Some(Self::PlaintextHsm),
            _ => None,
        }
    }

    /// Encoding a blank output key takes once the driver has filled it
    #[must_use]
    pub const fn filled(&self) -> Self {
        match self {
            Self::BlankPlaintext => Self::Plaintext,
            Self::BlankKeyStore => Self::KeyStore,
            other => *other,
        }
    }
}

/// Key descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoKey {
    /// Storage class
    pub encoding: KeyEncoding,
    /// Material location for plaintext classes
    pub material: Addr,
    /// Key store identifier for key store classes
    pub key_id: u32,
    /// Material length in bytes
    pub length: u32,
}

impl CryptoKey {
    /// Plaintext key with material at `material`
    #[must_use]
    pub const fn plaintext(material: Addr, length: u32) -> Self {
        Self {
            encoding: KeyEncoding::Plaintext,
            material,
            key_id: 0,
            length,
        }
    }

    /// Material range for plaintext classes
    #[must_use]
    pub const fn material_span(&self) -> Span {
        Span::new(self.material, self.length)
    }
}

// =============================================================================
// Operation Metadata
// =============================================================================

/// Direction of a cipher operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherDirection {
    /// Encrypt
    Encrypt,
    /// Decrypt
    Decrypt,
}

/// Direction of a MAC operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacDirection {
    /// Produce a tag
    Sign,
    /// Check a tag
    Verify,
}

/// Operation kind reported in completion records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OperationType {
    /// One-step encryption
    OneStepEncrypt = 1,
    /// One-step decryption
    OneStepDecrypt = 2,
    /// Segmented encryption step
    SegmentedEncrypt = 3,
    /// Segmented decryption step
    SegmentedDecrypt = 4,
    /// Final segmented encryption step
    FinalizeEncrypt = 5,
    /// Final segmented decryption step
    FinalizeDecrypt = 6,
    /// Segmented additional authenticated data
    SegmentedAad = 7,
    /// One-step MAC generation
    OneStepSign = 8,
    /// One-step MAC verification
    OneStepVerify = 9,
    /// Segmented MAC generation step
    SegmentedSign = 10,
    /// Segmented MAC verification step
    SegmentedVerify = 11,
    /// Final MAC generation step
    FinalizeSign = 12,
    /// Final MAC verification step
    FinalizeVerify = 13,
    /// One-step hash
    HashData = 14,
    /// One-step HMAC
    Hmac = 15,
    /// Segmented hash step
    HashSegment = 16,
    /// Final hash step
    HashFinalize = 17,
    /// Final HMAC step
    HmacFinalize = 18,
    /// Public key generation
    GeneratePublicKey = 19,
    /// Shared secret computation
    ComputeSharedSecret = 20,
    /// Entropy key generation
    GenerateKey = 21,
    /// Random byte generation
    GetRandomBytes = 22,
}

impl OperationType {
    /// Wire value
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        *self as u32
    }
}

// =============================================================================
// AES
// =============================================================================

/// AES-ECB operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesEcbOperation {
    /// Key for one-step operations; segmented operations use the setup key
    pub key: Option<CryptoKey>,
    /// Input buffer
    pub input: Addr,
    /// Output buffer
    pub output: Addr,
    /// Length of both buffers in bytes
    pub length: u32,
}

/// AES-CCM one-step operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesCcmOneStep {
    /// Key
    pub key: CryptoKey,
    /// Additional authenticated data
    pub aad: Span,
    /// Input buffer
    pub input: Addr,
    /// Output buffer
    pub output: Addr,
    /// Length of input and output in bytes
    pub length: u32,
    /// Nonce
    pub nonce: Span,
    /// Tag: written on encrypt, read on decrypt
    pub mac: Span,
}

/// AES-CCM segmented payload step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesCcmSegment {
    /// Input buffer
    pub input: Addr,
    /// Output buffer
    pub output: Addr,
    /// Length of input and output in bytes
    pub length: u32,
}

/// AES-CCM segmented finalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesCcmFinalize {
    /// Trailing payload, may be empty
    pub segment: AesCcmSegment,
    /// Tag: written on encrypt, read on decrypt
    pub mac: Span,
}

/// AES-CMAC operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesCmacOperation {
    /// Message buffer
    pub input: Addr,
    /// Message length in bytes
    pub length: u32,
    /// Tag: written on sign, read on verify; unused for segmented add-data
    pub mac: Span,
}

// =============================================================================
// SHA-2
// =============================================================================

/// SHA-2 variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HashType {
    /// SHA-224
    Sha224 = 0,
    /// SHA-256
    Sha256 = 1,
    /// SHA-384
    Sha384 = 2,
    /// SHA-512
    Sha512 = 3,
}

impl HashType {
    /// Decode a wire value
    #[must_use]
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Sha224),
            1 => Some(Self::Sha256),
            2 => Some(Self::Sha384),
            3 => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Digest size in bytes
    #[must_use]
    pub const fn digest_len(&self) -> u32 {
        match self {
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

// =============================================================================
// ECDH
// =============================================================================

/// Curve supported by the ECDH engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EcdhCurve {
    /// NIST P-256
    NistP256 = 1,
    /// Curve25519
    Curve25519 = 2,
}

impl EcdhCurve {
    /// Decode a wire value
    #[must_use]
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::NistP256),
            2 => Some(Self::Curve25519),
            _ => None,
        }
    }
}

/// ECDH public key generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcdhGeneratePublicKey {
    /// Curve
    pub curve: EcdhCurve,
    /// Input private key
    pub private_key: CryptoKey,
    /// Output public key
    pub public_key: CryptoKey,
}

/// ECDH shared secret computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcdhComputeSharedSecret {
    /// Curve
    pub curve: EcdhCurve,
    /// Own private key
    pub private_key: CryptoKey,
    /// Peer public key
    pub their_public_key: CryptoKey,
    /// Output shared secret
    pub shared_secret: CryptoKey,
}
