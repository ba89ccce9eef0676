// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Copy-in / copy-out engine
//!
//! Caller structures are fetched into secure memory only after the validator
//! has accepted their range, and every address inside them is checked for
//! the direction the driver will use it in. Data buffers stay where they are
//! (validated, not copied); descriptors and key references are always copied.
//!
//! Secure-origin callers are trusted: their structures are fetched without
//! validation and their return behavior is taken as given.
//!
//! Copy-out is limited to results: handles and statuses through the
//! transport, and the updated encoding of an output key written back into
//! the caller's key structure.

use q_common::constants::MAX_KEY_SIZE;
use q_common::types::{Addr, ClientOrigin, ReturnBehavior, Span};
use q_common::{Error, Result};
use q_hal::attribution::AccessKind;
use q_hal::ops::{CryptoKey, KeyEncoding};
use q_hal::traits::{AddressSpace, DriverParams, HwAttrs};

use crate::validator::BoundaryValidator;
use crate::wire::{ConfigWire, HwAttrsWire, KeyWire, ParamsWire, WireStruct, KEY_WIRE_KEY_ID_OFFSET, MAX_WIRE_SIZE};

/// Default blocking timeout: wait forever
pub const WAIT_FOREVER: u32 = u32::MAX;

// =============================================================================
// Return Behavior Normalization
// =============================================================================

/// Return behavior asked for by the caller and the one actually used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSelection {
    /// Behavior in the caller's parameters
    pub requested: ReturnBehavior,
    /// Behavior the driver instance runs with
    pub effective: ReturnBehavior,
}

/// Choose the behavior a driver instance runs with
///
/// The secure side can neither block inside a boundary call nor call back
/// into non-secure code directly, so a non-secure caller asking for blocking
/// or callback behavior gets callback behavior with the completion
/// dispatcher as the callback; the non-secure runtime then blocks or calls
/// the application itself. Polling is kept as is.
///
/// Secure callers have no completion path and are limited to polling.
///
/// # Errors
/// Returns [`Error::UnsupportedReturnBehavior`] for a secure caller asking
/// for anything but polling.
pub const fn normalize_mode(requested: ReturnBehavior, origin: ClientOrigin) -> Result<ModeSelection> {
    let effective = match (origin, requested) {
        (_, ReturnBehavior::Polling) => ReturnBehavior::Polling,
        (ClientOrigin::NonSecure, ReturnBehavior::Blocking | ReturnBehavior::Callback) => ReturnBehavior::Callback,
        (ClientOrigin::Secure, _) => return Err(Error::UnsupportedReturnBehavior),
    };
    Ok(ModeSelection { requested, effective })
}

/// Open parameters after copy-in and normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecureParams {
    /// Requested and effective behavior
    pub mode: ModeSelection,
    /// Blocking timeout in ticks
    pub timeout: u32,
    /// Service-specific parameter word
    pub custom: u32,
}

impl SecureParams {
    /// Parameters handed to the driver
    #[must_use]
    pub const fn driver_params(&self) -> DriverParams {
        DriverParams {
            return_behavior: self.mode.effective,
            timeout: self.timeout,
            custom: self.custom,
        }
    }
}

// =============================================================================
// Structure Fetch
// =============================================================================

/// Caller-facing view used by every copy routine
pub struct CopyContext<'a> {
    /// Bus
    pub mem: &'a mut dyn AddressSpace,
    /// Validator for non-secure callers
    pub validator: &'a BoundaryValidator,
    /// Origin of the current call
    pub origin: ClientOrigin,
}

impl CopyContext<'_> {
    /// Check `span` for reading when the caller is non-secure
    ///
    /// # Errors
    /// As [`BoundaryValidator::check_readable`].
    pub fn readable(&self, span: Span) -> Result<()> {
        if self.origin.is_non_secure() {
            self.validator.check_readable(span)?;
        }
        Ok(())
    }

    /// Check `span` for writing when the caller is non-secure
    ///
    /// # Errors
    /// As [`BoundaryValidator::check_writable`].
    pub fn writable(&self, span: Span) -> Result<()> {
        if self.origin.is_non_secure() {
            self.validator.check_writable(span)?;
        }
        Ok(())
    }

    /// Validate and copy the structure at `addr`
    ///
    /// # Errors
    /// - validator errors for non-secure callers
    /// - [`Error::MemoryFault`] if the bus read fails
    pub fn fetch<T: WireStruct>(&self, addr: Addr, kind: AccessKind) -> Result<T> {
        if self.origin.is_non_secure() {
            self.validator.check_struct(addr, T::SIZE, kind)?;
        }
        let mut bytes = [0u8; MAX_WIRE_SIZE];
        let staged = bytes.get_mut(..T::SIZE).ok_or(Error::InternalError)?;
        self.mem.read(addr, staged)?;
        T::decode(staged)
    }
}

// =============================================================================
// Configuration and Parameters
// =============================================================================

/// Copy a driver configuration at construct time
///
/// The caller's object storage must be writable for `object_size` bytes even
/// though the secure side keeps its own object: the caller is not allowed to
/// name memory it does not own.
///
/// # Errors
/// Validator errors, [`Error::InvalidParameter`] for an out-of-range
/// priority, or [`Error::MemoryFault`].
pub fn copy_config(cx: &CopyContext<'_>, config: Addr, object_size: u32) -> Result<HwAttrs> {
    let wire: ConfigWire = cx.fetch(config, AccessKind::Read)?;
    cx.writable(Span::new(wire.object, object_size))?;
    let attrs: HwAttrsWire = cx.fetch(wire.hw_attrs, AccessKind::Read)?;
    let int_priority = u8::try_from(attrs.int_priority).map_err(|_| Error::InvalidParameter)?;
    Ok(HwAttrs { int_priority })
}

/// Copy open parameters and normalize the return behavior
///
/// A null address selects the defaults: blocking, wait forever.
///
/// # Errors
/// Validator errors, [`Error::InvalidParameter`] for an unknown behavior,
/// [`Error::UnsupportedReturnBehavior`] from [`normalize_mode`].
pub fn copy_params(cx: &CopyContext<'_>, params: Addr) -> Result<SecureParams> {
    let wire = if params.is_null() {
        ParamsWire {
            return_behavior: ReturnBehavior::Blocking as u32,
            callback: 0,
            timeout: WAIT_FOREVER,
            custom: 0,
        }
    } else {
        cx.fetch::<ParamsWire>(params, AccessKind::Read)?
    };
    let requested = ReturnBehavior::from_u32(wire.return_behavior).ok_or(Error::InvalidParameter)?;
    // The caller's callback pointer is discarded; the dispatcher takes its place
    let mode = normalize_mode(requested, cx.origin)?;
    Ok(SecureParams {
        mode,
        timeout: wire.timeout,
        custom: wire.custom,
    })
}

// =============================================================================
// Keys
// =============================================================================

fn decode_key(wire: &KeyWire) -> Result<CryptoKey> {
    let encoding = KeyEncoding::from_u32(wire.encoding).ok_or(Error::InvalidKeyEncoding)?;
    Ok(CryptoKey {
        encoding,
        material: wire.material,
        key_id: wire.key_id,
        length: wire.length,
    })
}

/// Copy a key the driver will consume
///
/// Non-secure callers may pass plaintext keys in their own memory or key
/// store references. A plaintext key in HSM memory names secure material
/// and is refused.
///
/// # Errors
/// Validator errors or [`Error::InvalidKeyEncoding`].
pub fn copy_input_key(cx: &CopyContext<'_>, key: Addr) -> Result<CryptoKey> {
    let wire: KeyWire = cx.fetch(key, AccessKind::Read)?;
    let key = decode_key(&wire)?;
    match key.encoding {
        KeyEncoding::Plaintext => {
            if key.length as usize > MAX_KEY_SIZE {
                return Err(Error::InvalidParameter);
            }
            cx.readable(key.material_span())?;
        }
        KeyEncoding::KeyStore => {}
        KeyEncoding::PlaintextHsm if !cx.origin.is_non_secure() => {}
        _ => return Err(Error::InvalidKeyEncoding),
    }
    Ok(key)
}

/// Copy a blank key the driver will fill
///
/// The key structure itself must be writable because its encoding is
/// written back once the key is produced.
///
/// # Errors
/// Validator errors or [`Error::InvalidKeyEncoding`].
pub fn copy_output_key(cx: &CopyContext<'_>, key: Addr) -> Result<CryptoKey> {
    let wire: KeyWire = cx.fetch(key, AccessKind::ReadWrite)?;
    let key = decode_key(&wire)?;
    match key.encoding {
        KeyEncoding::BlankPlaintext => cx.writable(key.material_span())?,
        KeyEncoding::BlankKeyStore => {}
        _ => return Err(Error::InvalidKeyEncoding),
    }
    Ok(key)
}

/// Write the encoding and key store id of a produced key back to the caller
///
/// # Errors
/// Returns [`Error::MemoryFault`] if the bus write fails.
pub fn write_back_key(mem: &mut dyn AddressSpace, addr: Addr, key: &CryptoKey) -> Result<()> {
    mem.write_u32(addr, key.encoding as u32)?;
    let key_id = addr.checked_add(KEY_WIRE_KEY_ID_OFFSET).ok_or(Error::AddressOverflow)?;
    mem.write_u32(key_id, key.key_id)?;
    Ok(())
}
