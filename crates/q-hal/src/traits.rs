// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Crypto driver contract
//!
//! The boundary layer talks to hardware crypto engines only through these
//! traits. Every operation returns a signed driver status (`0` on success);
//! the boundary forwards that status to the caller unchanged.
//!
//! # Completion model
//!
//! A driver object opened with [`ReturnBehavior::Polling`] finishes every
//! operation inside the call. Any other behavior makes data operations
//! return immediately with success; the result is reported later through
//! [`CryptoDriver::take_completion`], which models the engine interrupt.
//! Each engine runs at most one operation at a time and rejects a second
//! submission with `DRIVER_STATUS_RESOURCE_UNAVAILABLE`.

use q_common::types::{Addr, ReturnBehavior, Span};

use crate::error::HalResult;
use crate::ops::{
    AesCcmFinalize, AesCcmOneStep, AesCcmSegment, AesCmacOperation, AesEcbOperation,
    CipherDirection, CryptoKey, EcdhComputeSharedSecret, EcdhGeneratePublicKey, HashType,
    MacDirection, OperationType,
};

/// Signed driver status
pub type DriverStatus = i32;

/// Byte-addressable view of the shared bus
pub trait AddressSpace {
    /// Read `buf.len()` bytes starting at `addr`
    ///
    /// # Errors
    /// Returns `HalError::BusFault` if any byte is not backed by memory.
    fn read(&self, addr: Addr, buf: &mut [u8]) -> HalResult<()>;

    /// Write `data` starting at `addr`
    ///
    /// # Errors
    /// Returns `HalError::BusFault` if any byte is not backed by memory.
    fn write(&mut self, addr: Addr, data: &[u8]) -> HalResult<()>;

    /// Read a little-endian word
    ///
    /// # Errors
    /// Returns `HalError::BusFault` if the word is not backed by memory.
    fn read_u32(&self, addr: Addr) -> HalResult<u32> {
        let mut word = [0u8; 4];
        self.read(addr, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    /// Write a little-endian word
    ///
    /// # Errors
    /// Returns `HalError::BusFault` if the word is not backed by memory.
    fn write_u32(&mut self, addr: Addr, value: u32) -> HalResult<()> {
        self.write(addr, &value.to_le_bytes())
    }
}

/// Identity of a driver instance: slot index plus slot generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId {
    /// Slot index within the service
    pub index: u8,
    /// Generation of the slot when the instance was created
    pub generation: u16,
}

/// Hardware attributes of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HwAttrs {
    /// Engine interrupt priority
    pub int_priority: u8,
}

/// Open parameters after boundary normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverParams {
    /// Effective return behavior
    pub return_behavior: ReturnBehavior,
    /// Blocking timeout in ticks
    pub timeout: u32,
    /// Service-specific parameter word
    pub custom: u32,
}

/// Completion raised by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwCompletion {
    /// Instance the operation was submitted on
    pub instance: InstanceId,
    /// Final driver status
    pub status: DriverStatus,
    /// Operation kind
    pub operation_type: OperationType,
    /// Output key with its updated encoding, for key-producing operations
    pub output_key: Option<CryptoKey>,
    /// Service-specific auxiliary word (TRNG: bytes produced)
    pub aux: u32,
}

/// Lifecycle shared by all crypto engines
pub trait CryptoDriver {
    /// Per-instance driver state
    type Object: Default;

    /// Bytes of caller storage an instance object occupies
    const OBJECT_SIZE: u32;

    /// Initialise `object` for instance `id`
    fn construct(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        hw_attrs: &HwAttrs,
        params: &DriverParams,
    ) -> DriverStatus;

    /// Close the instance; an operation already on the engine still completes
    fn close(&mut self, id: InstanceId, object: &mut Self::Object);

    /// Cancel the instance's in-flight operation, if any
    ///
    /// A canceled operation completes with `DRIVER_STATUS_CANCELED`.
    /// Canceling when nothing is in flight succeeds and has no effect.
    fn cancel_operation(&mut self, id: InstanceId, object: &mut Self::Object) -> DriverStatus;

    /// Next pending completion, finishing the engine's operation if needed
    fn take_completion(&mut self, mem: &mut dyn AddressSpace) -> Option<HwCompletion>;
}

/// AES-ECB engine
pub trait AesEcbDriver: CryptoDriver {
    /// Encrypt or decrypt whole blocks with the key in `op`
    fn one_step(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        direction: CipherDirection,
        op: &AesEcbOperation,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Start a segmented operation
    fn setup(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        direction: CipherDirection,
        key: &CryptoKey,
    ) -> DriverStatus;

    /// Process a segment
    fn add_data(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        op: &AesEcbOperation,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Process the last segment and end the operation
    fn finalize(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        op: &AesEcbOperation,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;
}

/// AES-CCM engine
pub trait AesCcmDriver: CryptoDriver {
    /// Authenticated encryption or decryption in one call
    fn one_step(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        direction: CipherDirection,
        op: &AesCcmOneStep,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Start a segmented operation
    fn setup(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        direction: CipherDirection,
        key: &CryptoKey,
    ) -> DriverStatus;

    /// Declare total AAD, payload and tag lengths
    fn set_lengths(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        aad_len: u32,
        input_len: u32,
        mac_len: u32,
    ) -> DriverStatus;

    /// Load the nonce
    fn set_nonce(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        nonce: Span,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Absorb AAD
    fn add_aad(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        aad: Span,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Process a payload segment
    fn add_data(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        segment: &AesCcmSegment,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Process the last segment and produce or check the tag
    fn finalize(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        direction: CipherDirection,
        op: &AesCcmFinalize,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;
}

/// AES-CMAC engine
pub trait AesCmacDriver: CryptoDriver {
    /// Direction of the segmented operation opened by `setup`, if any
    fn direction(&self, object: &Self::Object) -> Option<MacDirection>;

    /// Sign or verify in one call
    fn one_step(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        direction: MacDirection,
        op: &AesCmacOperation,
        key: &CryptoKey,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Start a segmented operation
    fn setup(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        direction: MacDirection,
        key: &CryptoKey,
    ) -> DriverStatus;

    /// Absorb a segment
    fn add_data(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        op: &AesCmacOperation,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Absorb the last segment and produce or check the tag
    fn finalize(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        op: &AesCmacOperation,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;
}

/// SHA-2 engine
pub trait Sha2Driver: CryptoDriver {
    /// Current hash variant of an instance
    fn hash_type(&self, object: &Self::Object) -> HashType;

    /// Select the hash variant
    fn set_hash_type(&mut self, id: InstanceId, object: &mut Self::Object, hash_type: HashType) -> DriverStatus;

    /// Hash `data` into `digest`
    fn hash_data(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        data: Span,
        digest: Addr,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// HMAC `data` under `key` into `mac`
    fn hmac(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        key: &CryptoKey,
        data: Span,
        mac: Addr,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Start a segmented HMAC
    fn setup_hmac(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        key: &CryptoKey,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Absorb a segment
    fn add_data(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        data: Span,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Finish a segmented hash into `digest`
    fn finalize(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        digest: Addr,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Finish a segmented HMAC into `mac`
    fn finalize_hmac(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        mac: Addr,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Discard any segmented state
    fn reset(&mut self, id: InstanceId, object: &mut Self::Object);
}

/// ECDH engine
///
/// Key-producing operations update the encoding of their output key in
/// place when they finish inside the call.
pub trait EcdhDriver: CryptoDriver {
    /// Derive the public key for a private key
    fn generate_public_key(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        op: &mut EcdhGeneratePublicKey,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Derive a shared secret
    fn compute_shared_secret(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        op: &mut EcdhComputeSharedSecret,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;
}

/// Random number engine
pub trait TrngDriver: CryptoDriver {
    /// Fill a blank key with entropy
    fn generate_key(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        key: &mut CryptoKey,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;

    /// Fill `out` with random bytes
    fn get_random_bytes(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        out: Span,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus;
}
