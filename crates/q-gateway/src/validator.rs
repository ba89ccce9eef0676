// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Boundary validator
//!
//! Every address a non-secure caller hands across the boundary goes through
//! exactly one of [`BoundaryValidator::check_readable`] or
//! [`BoundaryValidator::check_writable`] before the secure side touches it.
//! A rejection is a caller programming error; the call is aborted before
//! any copy, instance change or driver invocation.

use q_common::types::{Addr, Span};
use q_common::{Error, Result};
use q_hal::attribution::{AccessKind, AttributionMap};

/// Pointer-range checks against the security attribution map
#[derive(Debug, Clone)]
pub struct BoundaryValidator {
    map: AttributionMap,
}

impl BoundaryValidator {
    /// Validator over `map`
    #[must_use]
    pub const fn new(map: AttributionMap) -> Self {
        Self { map }
    }

    fn check(&self, span: Span, kind: AccessKind) -> Result<()> {
        if span.is_empty() {
            return Ok(());
        }
        let last = span.last().ok_or(Error::AddressOverflow)?;
        if self.map.has_unpriv_nonsecure_access(span.addr.0, last.0, kind) {
            return Ok(());
        }
        Err(match kind {
            AccessKind::Read => Error::ReadAccessDenied,
            AccessKind::ReadWrite => Error::WriteAccessDenied,
        })
    }

    /// Check the caller may read every byte of `span`
    ///
    /// # Errors
    /// - [`Error::AddressOverflow`] if the range wraps
    /// - [`Error::ReadAccessDenied`] otherwise
    pub fn check_readable(&self, span: Span) -> Result<()> {
        self.check(span, AccessKind::Read)
    }

    /// Check the caller may read and write every byte of `span`
    ///
    /// # Errors
    /// - [`Error::AddressOverflow`] if the range wraps
    /// - [`Error::WriteAccessDenied`] otherwise
    pub fn check_writable(&self, span: Span) -> Result<()> {
        self.check(span, AccessKind::ReadWrite)
    }

    /// Check a fixed-size structure at `addr`
    ///
    /// # Errors
    /// As [`Self::check_readable`] or [`Self::check_writable`].
    pub fn check_struct(&self, addr: Addr, size: usize, kind: AccessKind) -> Result<()> {
        let len = u32::try_from(size).map_err(|_| Error::AddressOverflow)?;
        self.check(Span::new(addr, len), kind)
    }
}
