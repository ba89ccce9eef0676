// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Common types for the secure crypto gateway
//!
//! Service identifiers, caller origin, return behaviors, opaque handles and
//! bus addresses shared by the driver contract and the boundary layer.

use core::fmt;

use crate::constants::{
    HANDLE_GENERATION_MASK, HANDLE_GENERATION_SHIFT, HANDLE_INDEX_MASK, HANDLE_TAG_MASK,
    HANDLE_TAG_SHIFT, NULL_HANDLE,
};

// =============================================================================
// Service Identifiers
// =============================================================================

/// Crypto service hosted behind the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ServiceId {
    /// AES in CCM mode
    AesCcm = 0,
    /// AES in ECB mode
    AesEcb = 1,
    /// AES-CMAC
    AesCmac = 2,
    /// SHA-2 family hashes and HMAC
    Sha2 = 3,
    /// Elliptic-curve Diffie-Hellman
    Ecdh = 4,
    /// True random number generator
    Trng = 5,
}

impl ServiceId {
    /// All services, in dispatch order
    pub const ALL: [Self; 6] = [
        Self::AesCcm,
        Self::AesEcb,
        Self::AesCmac,
        Self::Sha2,
        Self::Ecdh,
        Self::Trng,
    ];

    /// Tag stored in the top byte of every handle issued by this service
    #[must_use]
    pub const fn handle_tag(&self) -> u8 {
        0xC1 + *self as u8
    }

    /// Short name used in log entries
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AesCcm => "aesccm",
            Self::AesEcb => "aesecb",
            Self::AesCmac => "aescmac",
            Self::Sha2 => "sha2",
            Self::Ecdh => "ecdh",
            Self::Trng => "trng",
        }
    }

    /// Dense index for per-service tables
    #[must_use]
    pub const fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Caller Origin
// =============================================================================

/// Execution domain a boundary call originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientOrigin {
    /// Trusted caller inside the secure domain
    Secure,
    /// Untrusted caller in the non-secure domain
    NonSecure,
}

impl ClientOrigin {
    /// Classify a transport client identifier (negative means non-secure)
    #[must_use]
    pub const fn from_client_id(client_id: i32) -> Self {
        if client_id < 0 {
            Self::NonSecure
        } else {
            Self::Secure
        }
    }

    /// Check if the caller is untrusted
    #[must_use]
    pub const fn is_non_secure(&self) -> bool {
        matches!(self, Self::NonSecure)
    }
}

// =============================================================================
// Return Behavior
// =============================================================================

/// How a caller wants an operation to report its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum ReturnBehavior {
    /// Return immediately; result delivered through a registered callback
    Callback = 1,
    /// Block the caller until the result is available
    Blocking = 2,
    /// Spin inside the call until the hardware finishes
    Polling = 4,
}

impl ReturnBehavior {
    /// Decode a wire value
    #[must_use]
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Callback),
            2 => Some(Self::Blocking),
            4 => Some(Self::Polling),
            _ => None,
        }
    }

    /// Check if the result arrives after the call returns
    #[must_use]
    pub const fn is_async(&self) -> bool {
        !matches!(self, Self::Polling)
    }
}

// =============================================================================
// Opaque Handles
// =============================================================================

/// Handle given to non-secure callers in place of any secure address
///
/// Layout: bits 31..24 service tag, bits 23..8 slot generation, bits 7..0
/// slot index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpaqueHandle(u32);

impl OpaqueHandle {
    /// The null handle
    pub const NULL: Self = Self(NULL_HANDLE);

    /// Wrap a raw handle value
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Compose a handle from its fields
    #[must_use]
    pub const fn compose(tag: u8, generation: u16, index: u8) -> Self {
        Self(
            ((tag as u32) << HANDLE_TAG_SHIFT)
                | ((generation as u32) << HANDLE_GENERATION_SHIFT)
                | index as u32,
        )
    }

    /// Raw handle value
    #[must_use]
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Service tag field
    #[must_use]
    pub const fn tag(&self) -> u8 {
        ((self.0 & HANDLE_TAG_MASK) >> HANDLE_TAG_SHIFT) as u8
    }

    /// Slot generation field
    #[must_use]
    pub const fn generation(&self) -> u16 {
        ((self.0 & HANDLE_GENERATION_MASK) >> HANDLE_GENERATION_SHIFT) as u16
    }

    /// Slot index field
    #[must_use]
    pub const fn index(&self) -> u8 {
        (self.0 & HANDLE_INDEX_MASK) as u8
    }

    /// Check for the null handle
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == NULL_HANDLE
    }
}

impl fmt::Debug for OpaqueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueHandle({:#010x})", self.0)
    }
}

// =============================================================================
// Bus Addresses
// =============================================================================

/// Physical address on the shared bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Addr(pub u32);

impl Addr {
    /// Address zero
    pub const NULL: Self = Self(0);

    /// Check for address zero
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Address `offset` bytes further on, or `None` on wrap
    #[must_use]
    pub const fn checked_add(&self, offset: u32) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::LowerHex for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Contiguous byte range on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Span {
    /// First byte
    pub addr: Addr,
    /// Length in bytes
    pub len: u32,
}

impl Span {
    /// Empty span
    pub const EMPTY: Self = Self::new(Addr::NULL, 0);

    /// Create a span
    #[must_use]
    pub const fn new(addr: Addr, len: u32) -> Self {
        Self { addr, len }
    }

    /// Check for a zero-length span
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inclusive last address, `None` for empty or wrapping spans
    #[must_use]
    pub const fn last(&self) -> Option<Addr> {
        if self.len == 0 {
            return None;
        }
        self.addr.checked_add(self.len - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_fields_round_trip() {
        let handle = OpaqueHandle::compose(0xC2, 0x1234, 5);
        assert_eq!(handle.tag(), 0xC2);
        assert_eq!(handle.generation(), 0x1234);
        assert_eq!(handle.index(), 5);
        assert!(!handle.is_null());
    }

    #[test]
    fn test_client_origin() {
        assert_eq!(ClientOrigin::from_client_id(-1), ClientOrigin::NonSecure);
        assert_eq!(ClientOrigin::from_client_id(0), ClientOrigin::Secure);
        assert_eq!(ClientOrigin::from_client_id(42), ClientOrigin::Secure);
    }

    #[test]
    fn test_return_behavior_decode() {
        assert_eq!(ReturnBehavior::from_u32(4), Some(ReturnBehavior::Polling));
        assert_eq!(ReturnBehavior::from_u32(3), None);
        assert!(ReturnBehavior::Blocking.is_async());
    }

    #[test]
    fn test_span_last_detects_wrap() {
        assert_eq!(Span::new(Addr(0x100), 0x10).last(), Some(Addr(0x10F)));
        assert_eq!(Span::new(Addr(0xFFFF_FFF0), 0x20).last(), None);
        assert_eq!(Span::EMPTY.last(), None);
    }

    #[test]
    fn test_service_tags_are_distinct_and_non_zero() {
        for (i, a) in ServiceId::ALL.iter().enumerate() {
            assert_ne!(a.handle_tag(), 0);
            for b in &ServiceId::ALL[i + 1..] {
                assert_ne!(a.handle_tag(), b.handle_tag());
            }
        }
    }
}
