// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Simulated bus memory
//!
//! A single contiguous RAM window. Accesses outside the window raise a bus
//! fault, as an access to an unmapped address does on target.

use q_common::types::Addr;

use crate::error::{HalError, HalResult};
use crate::traits::AddressSpace;

/// RAM window of `N` bytes starting at `base`
pub struct SimMemory<const N: usize> {
    base: u32,
    bytes: [u8; N],
}

impl<const N: usize> SimMemory<N> {
    /// Zero-filled window at `base`
    #[must_use]
    pub const fn new(base: u32) -> Self {
        Self { base, bytes: [0u8; N] }
    }

    /// First address of the window
    #[must_use]
    pub const fn base(&self) -> Addr {
        Addr(self.base)
    }

    fn offset(&self, addr: Addr, len: usize) -> HalResult<usize> {
        let start = addr.0.checked_sub(self.base).ok_or(HalError::BusFault)? as usize;
        let end = start.checked_add(len).ok_or(HalError::BusFault)?;
        if end > N {
            return Err(HalError::BusFault);
        }
        Ok(start)
    }

    /// Borrow `len` bytes at `addr`
    ///
    /// # Errors
    /// Returns [`HalError::BusFault`] if the range leaves the window.
    pub fn bytes(&self, addr: Addr, len: usize) -> HalResult<&[u8]> {
        let start = self.offset(addr, len)?;
        Ok(&self.bytes[start..start + len])
    }
}

impl<const N: usize> AddressSpace for SimMemory<N> {
    fn read(&self, addr: Addr, buf: &mut [u8]) -> HalResult<()> {
        buf.copy_from_slice(self.bytes(addr, buf.len())?);
        Ok(())
    }

    fn write(&mut self, addr: Addr, data: &[u8]) -> HalResult<()> {
        let start = self.offset(addr, data.len())?;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}
