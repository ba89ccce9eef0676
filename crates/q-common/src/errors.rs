// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Error types for the secure crypto gateway
//!
//! This module defines the unified error type used on the secure side of the
//! boundary. Errors are `Copy`, carry no payload and never allocate. Every
//! variant maps onto exactly one PSA status code through [`Error::psa_status`],
//! which is the only form in which an error crosses the boundary.
//!
//! Driver failures are deliberately absent: a driver's own status code is
//! forwarded to the caller unchanged and is never converted into an `Error`.

use core::fmt;

use crate::constants::{
    PSA_ERROR_CONNECTION_REFUSED, PSA_ERROR_GENERIC_ERROR, PSA_ERROR_INSUFFICIENT_MEMORY,
    PSA_ERROR_PROGRAMMER_ERROR,
};

/// Result type alias for gateway operations
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the secure side of the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Boundary Contract Errors (0x01xx)
    // =========================================================================
    /// Input or output vector size does not match the message type
    InvalidMessageSize,
    /// Message type tag is not known to the service
    UnknownMessageType,
    /// Handle does not name a live instance of this service
    InvalidHandle,
    /// Enumerated field or index out of range
    InvalidParameter,
    /// Key descriptor has a storage class not allowed in this position
    InvalidKeyEncoding,
    /// Caller may not read the referenced range
    ReadAccessDenied,
    /// Caller may not write the referenced range
    WriteAccessDenied,
    /// Address plus length wraps the address space
    AddressOverflow,
    /// Request is only valid from a non-secure caller
    NonSecureOnly,
    /// Return behavior has no completion path for this caller
    UnsupportedReturnBehavior,
    /// Asynchronous work submitted before a callback record was registered
    CallbackNotRegistered,
    /// Previous completion record has not been consumed yet
    CompletionPending,

    // =========================================================================
    // Resource Errors (0x02xx)
    // =========================================================================
    /// No free slot in the dynamic instance pool
    ResourceExhausted,
    /// Completion doorbell queue is full
    QueueFull,

    // =========================================================================
    // Platform Errors (0x03xx)
    // =========================================================================
    /// Bus access to a validated address failed
    MemoryFault,
    /// Hardware reported an unexpected condition
    HardwareError,
    /// Provisioned configuration is inconsistent
    InvalidConfig,
    /// No service is registered for the requested service identifier
    ServiceUnavailable,

    // =========================================================================
    // General Errors (0xFFxx)
    // =========================================================================
    /// Internal error (should not happen)
    InternalError,
}

impl Error {
    /// Get the numeric error code
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::InvalidMessageSize => 0x0101,
            Self::UnknownMessageType => 0x0102,
            Self::InvalidHandle => 0x0103,
            Self::InvalidParameter => 0x0104,
            Self::InvalidKeyEncoding => 0x0105,
            Self::ReadAccessDenied => 0x0106,
            Self::WriteAccessDenied => 0x0107,
            Self::AddressOverflow => 0x0108,
            Self::NonSecureOnly => 0x0109,
            Self::UnsupportedReturnBehavior => 0x010A,
            Self::CallbackNotRegistered => 0x010B,
            Self::CompletionPending => 0x010C,

            Self::ResourceExhausted => 0x0201,
            Self::QueueFull => 0x0202,

            Self::MemoryFault => 0x0301,
            Self::HardwareError => 0x0302,
            Self::InvalidConfig => 0x0303,
            Self::ServiceUnavailable => 0x0304,

            Self::InternalError => 0xFF01,
        }
    }

    /// Get a human-readable description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidMessageSize => "Message vector size mismatch",
            Self::UnknownMessageType => "Unknown message type",
            Self::InvalidHandle => "Invalid handle",
            Self::InvalidParameter => "Invalid parameter",
            Self::InvalidKeyEncoding => "Key encoding not allowed",
            Self::ReadAccessDenied => "Read access denied",
            Self::WriteAccessDenied => "Write access denied",
            Self::AddressOverflow => "Address range overflow",
            Self::NonSecureOnly => "Request restricted to non-secure callers",
            Self::UnsupportedReturnBehavior => "Return behavior not supported",
            Self::CallbackNotRegistered => "No callback record registered",
            Self::CompletionPending => "Completion record not yet consumed",
            Self::ResourceExhausted => "Instance pool exhausted",
            Self::QueueFull => "Completion queue full",
            Self::MemoryFault => "Memory access fault",
            Self::HardwareError => "Hardware error",
            Self::InvalidConfig => "Invalid configuration",
            Self::ServiceUnavailable => "Service unavailable",
            Self::InternalError => "Internal error",
        }
    }

    /// Check if this error means the caller broke the boundary contract
    #[must_use]
    pub const fn is_programmer_error(&self) -> bool {
        (self.code() & 0xFF00) == 0x0100
    }

    /// Check if this is an access-control error raised by the validator
    #[must_use]
    pub const fn is_security_error(&self) -> bool {
        matches!(
            self,
            Self::ReadAccessDenied
                | Self::WriteAccessDenied
                | Self::AddressOverflow
                | Self::InvalidKeyEncoding
                | Self::InvalidHandle
        )
    }

    /// PSA status code reported to the caller for this error
    #[must_use]
    pub const fn psa_status(&self) -> i32 {
        if self.is_programmer_error() {
            return PSA_ERROR_PROGRAMMER_ERROR;
        }
        match self {
            Self::ResourceExhausted | Self::QueueFull => PSA_ERROR_INSUFFICIENT_MEMORY,
            Self::ServiceUnavailable => PSA_ERROR_CONNECTION_REFUSED,
            _ => PSA_ERROR_GENERIC_ERROR,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_errors_map_to_programmer_error() {
        for err in [
            Error::InvalidMessageSize,
            Error::UnknownMessageType,
            Error::InvalidHandle,
            Error::ReadAccessDenied,
            Error::WriteAccessDenied,
            Error::NonSecureOnly,
            Error::CallbackNotRegistered,
            Error::CompletionPending,
        ] {
            assert!(err.is_programmer_error());
            assert_eq!(err.psa_status(), PSA_ERROR_PROGRAMMER_ERROR);
        }
    }

    #[test]
    fn test_pool_exhaustion_maps_to_insufficient_memory() {
        assert!(!Error::ResourceExhausted.is_programmer_error());
        assert_eq!(Error::ResourceExhausted.psa_status(), PSA_ERROR_INSUFFICIENT_MEMORY);
    }

    #[test]
    fn test_platform_errors_are_generic() {
        assert_eq!(Error::MemoryFault.psa_status(), PSA_ERROR_GENERIC_ERROR);
        assert_eq!(Error::ServiceUnavailable.psa_status(), PSA_ERROR_CONNECTION_REFUSED);
    }
}
