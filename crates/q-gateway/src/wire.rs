// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Wire layouts
//!
//! Every structure that crosses the boundary is a sequence of little-endian
//! 32-bit words. Addresses are bus addresses in the caller's domain; they are
//! only meaningful after the validator has accepted them.
//!
//! Three groups of layouts live here:
//!
//! - **Message vectors**: what a boundary call carries in its input and
//!   output vectors
//! - **Caller structures**: descriptors, keys, parameters and configuration
//!   left in non-secure memory and referenced by address
//! - **Completion record**: the 20-byte record the dispatcher writes back

use q_common::types::{Addr, OpaqueHandle};
use q_common::{Error, Result};

/// Largest wire structure, in bytes
pub const MAX_WIRE_SIZE: usize = 64;

/// Field stored as one 32-bit word
pub trait WireField: Sized {
    /// Decode from a word
    fn from_word(word: u32) -> Self;
    /// Encode into a word
    fn to_word(&self) -> u32;
}

impl WireField for u32 {
    fn from_word(word: u32) -> Self {
        word
    }
    fn to_word(&self) -> u32 {
        *self
    }
}

impl WireField for i32 {
    fn from_word(word: u32) -> Self {
        i32::from_le_bytes(word.to_le_bytes())
    }
    fn to_word(&self) -> u32 {
        u32::from_le_bytes(self.to_le_bytes())
    }
}

impl WireField for Addr {
    fn from_word(word: u32) -> Self {
        Addr(word)
    }
    fn to_word(&self) -> u32 {
        self.0
    }
}

impl WireField for OpaqueHandle {
    fn from_word(word: u32) -> Self {
        OpaqueHandle::from_raw(word)
    }
    fn to_word(&self) -> u32 {
        self.raw()
    }
}

/// Fixed-size structure exchanged across the boundary
pub trait WireStruct: Sized {
    /// Encoded size in bytes
    const SIZE: usize;

    /// Decode from exactly [`Self::SIZE`] bytes
    ///
    /// # Errors
    /// Returns [`Error::InvalidMessageSize`] if `bytes` has the wrong length.
    fn decode(bytes: &[u8]) -> Result<Self>;

    /// Encode into the first [`Self::SIZE`] bytes of `out`
    ///
    /// # Errors
    /// Returns [`Error::InvalidMessageSize`] if `out` is too short.
    fn encode(&self, out: &mut [u8]) -> Result<()>;
}

/// Declare a wire structure of word-sized fields
macro_rules! wire_struct {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                pub $field:ident: $ty:ty,
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $ty,
            )+
        }

        impl WireStruct for $name {
            const SIZE: usize = 4 * [$(stringify!($field)),+].len();

            fn decode(bytes: &[u8]) -> Result<Self> {
                if bytes.len() != Self::SIZE {
                    return Err(Error::InvalidMessageSize);
                }
                let mut words = bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]));
                Ok(Self {
                    $(
                        $field: <$ty as WireField>::from_word(words.next().unwrap_or(0)),
                    )+
                })
            }

            fn encode(&self, out: &mut [u8]) -> Result<()> {
                if out.len() < Self::SIZE {
                    return Err(Error::InvalidMessageSize);
                }
                let mut slots = out[..Self::SIZE].chunks_exact_mut(4);
                $(
                    if let Some(slot) = slots.next() {
                        slot.copy_from_slice(&WireField::to_word(&self.$field).to_le_bytes());
                    }
                )+
                Ok(())
            }
        }
    };
}

// =============================================================================
// Message Vectors
// =============================================================================

wire_struct! {
    /// CONSTRUCT input
    pub struct ConstructMsg {
        /// Caller's driver configuration
        pub config: Addr,
        /// Caller's open parameters, or null for defaults
        pub params: Addr,
    }
}

wire_struct! {
    /// OPEN input
    pub struct OpenMsg {
        /// Static instance index
        pub index: u32,
        /// Caller's open parameters, or null for defaults
        pub params: Addr,
    }
}

wire_struct! {
    /// Input naming only an instance (CLOSE, CANCEL_OPERATION, RESET)
    pub struct HandleMsg {
        /// Instance
        pub handle: OpaqueHandle,
    }
}

wire_struct! {
    /// REGISTER_CALLBACK input
    pub struct RegisterCallbackMsg {
        /// Instance
        pub handle: OpaqueHandle,
        /// Completion record in caller memory
        pub record: Addr,
    }
}

wire_struct! {
    /// REGISTER_CALLBACK input for services with two completion kinds
    pub struct DualRegisterCallbackMsg {
        /// Instance
        pub handle: OpaqueHandle,
        /// Record for the first completion kind
        pub primary: Addr,
        /// Record for the second completion kind
        pub secondary: Addr,
    }
}

wire_struct! {
    /// Input referencing an operation descriptor in caller memory
    pub struct OperationMsg {
        /// Instance
        pub handle: OpaqueHandle,
        /// Descriptor
        pub operation: Addr,
    }
}

wire_struct! {
    /// Input referencing a key structure in caller memory
    pub struct KeyMsg {
        /// Instance
        pub handle: OpaqueHandle,
        /// Key structure
        pub key: Addr,
    }
}

wire_struct! {
    /// Input carrying one caller buffer
    pub struct BufferMsg {
        /// Instance
        pub handle: OpaqueHandle,
        /// Buffer
        pub buffer: Addr,
        /// Buffer length in bytes
        pub length: u32,
    }
}

wire_struct! {
    /// AES-CCM SET_LENGTHS input
    pub struct SetLengthsMsg {
        /// Instance
        pub handle: OpaqueHandle,
        /// Total AAD length
        pub aad_len: u32,
        /// Total payload length
        pub input_len: u32,
        /// Tag length
        pub mac_len: u32,
    }
}

wire_struct! {
    /// SHA-2 HASH_DATA input
    pub struct HashDataMsg {
        /// Instance
        pub handle: OpaqueHandle,
        /// Message
        pub data: Addr,
        /// Message length
        pub length: u32,
        /// Digest destination
        pub digest: Addr,
    }
}

wire_struct! {
    /// SHA-2 HMAC input
    pub struct HmacMsg {
        /// Instance
        pub handle: OpaqueHandle,
        /// Key structure
        pub key: Addr,
        /// Message
        pub data: Addr,
        /// Message length
        pub length: u32,
        /// MAC destination
        pub mac: Addr,
    }
}

wire_struct! {
    /// SHA-2 FINALIZE and FINALIZE_HMAC input
    pub struct DigestMsg {
        /// Instance
        pub handle: OpaqueHandle,
        /// Digest destination
        pub digest: Addr,
    }
}

wire_struct! {
    /// SHA-2 SET_HASH_TYPE input
    pub struct SetHashTypeMsg {
        /// Instance
        pub handle: OpaqueHandle,
        /// Hash variant
        pub hash_type: u32,
    }
}

wire_struct! {
    /// CONSTRUCT and OPEN output
    pub struct HandleReply {
        /// New instance, or null if the driver refused
        pub handle: OpaqueHandle,
    }
}

wire_struct! {
    /// Output carrying a driver status
    pub struct StatusReply {
        /// Driver status, forwarded unchanged
        pub status: i32,
    }
}

// =============================================================================
// Caller Structures
// =============================================================================

wire_struct! {
    /// Driver configuration
    pub struct ConfigWire {
        /// Caller storage for the driver object
        pub object: Addr,
        /// Hardware attributes
        pub hw_attrs: Addr,
    }
}

wire_struct! {
    /// Hardware attributes
    pub struct HwAttrsWire {
        /// Engine interrupt priority
        pub int_priority: u32,
    }
}

wire_struct! {
    /// Open parameters
    pub struct ParamsWire {
        /// Requested return behavior
        pub return_behavior: u32,
        /// Caller callback function, replaced at the boundary
        pub callback: u32,
        /// Blocking timeout in ticks
        pub timeout: u32,
        /// Service-specific parameter word
        pub custom: u32,
    }
}

wire_struct! {
    /// Key reference
    pub struct KeyWire {
        /// Storage class
        pub encoding: u32,
        /// Plaintext material
        pub material: Addr,
        /// Key store identifier
        pub key_id: u32,
        /// Material length
        pub length: u32,
    }
}

/// Offset of the key store identifier within [`KeyWire`]
pub const KEY_WIRE_KEY_ID_OFFSET: u32 = 8;

wire_struct! {
    /// AES-ECB operation descriptor
    pub struct EcbOperationWire {
        /// Key structure (one-step only)
        pub key: Addr,
        /// Input buffer
        pub input: Addr,
        /// Output buffer
        pub output: Addr,
        /// Length of both buffers
        pub length: u32,
    }
}

wire_struct! {
    /// AES-CCM one-step descriptor
    pub struct CcmOneStepWire {
        /// Key structure
        pub key: Addr,
        /// Additional authenticated data
        pub aad: Addr,
        /// AAD length
        pub aad_len: u32,
        /// Input buffer
        pub input: Addr,
        /// Output buffer
        pub output: Addr,
        /// Payload length
        pub input_len: u32,
        /// Nonce
        pub nonce: Addr,
        /// Nonce length
        pub nonce_len: u32,
        /// Tag buffer
        pub mac: Addr,
        /// Tag length
        pub mac_len: u32,
    }
}

wire_struct! {
    /// AES-CCM segmented payload descriptor
    pub struct CcmSegmentWire {
        /// Input buffer
        pub input: Addr,
        /// Output buffer
        pub output: Addr,
        /// Length of both buffers
        pub length: u32,
    }
}

wire_struct! {
    /// AES-CCM finalize descriptor
    pub struct CcmFinalizeWire {
        /// Trailing input, may be empty
        pub input: Addr,
        /// Trailing output
        pub output: Addr,
        /// Trailing length
        pub length: u32,
        /// Tag buffer
        pub mac: Addr,
        /// Tag length
        pub mac_len: u32,
    }
}

wire_struct! {
    /// AES-CMAC descriptor
    pub struct CmacOperationWire {
        /// Key structure (one-step only)
        pub key: Addr,
        /// Message
        pub input: Addr,
        /// Message length
        pub length: u32,
        /// Tag buffer (one-step and finalize only)
        pub mac: Addr,
        /// Tag length
        pub mac_len: u32,
    }
}

wire_struct! {
    /// ECDH public key generation descriptor
    pub struct EcdhGenPublicWire {
        /// Curve identifier
        pub curve: u32,
        /// Private key structure
        pub private_key: Addr,
        /// Blank public key structure
        pub public_key: Addr,
    }
}

wire_struct! {
    /// ECDH shared secret descriptor
    pub struct EcdhSharedSecretWire {
        /// Curve identifier
        pub curve: u32,
        /// Private key structure
        pub private_key: Addr,
        /// Peer public key structure
        pub their_public_key: Addr,
        /// Blank shared secret structure
        pub shared_secret: Addr,
    }
}

// =============================================================================
// Completion Record
// =============================================================================

wire_struct! {
    /// Completion record written into caller memory
    pub struct CallbackRecordWire {
        /// Instance the operation ran on
        pub handle: OpaqueHandle,
        /// Final driver status
        pub return_value: i32,
        /// Caller's descriptor address for the operation, or null
        pub operation: Addr,
        /// Operation kind
        pub operation_type: u32,
        /// Service-specific word (TRNG: bytes produced)
        pub aux: u32,
    }
}
