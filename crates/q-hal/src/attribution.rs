// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Security attribution map
//!
//! Model of the ARMv8-M Security Attribution Unit together with the
//! non-secure MPU's unprivileged permissions. It answers the question the
//! CMSE address-range check answers on target: may an unprivileged
//! non-secure caller read (or read and write) every byte of a range?
//!
//! # Rules
//!
//! - Regions are 32-byte granular: base aligned, limit inclusive and ending
//!   in `0x1F`
//! - Regions never overlap
//! - Memory outside every region is Secure
//! - A range is accessible only if its first and last byte fall in the same
//!   Non-Secure region and that region grants the requested permission

use crate::error::{HalError, HalResult};

/// Number of attribution regions (SAU implementation limit)
pub const MAX_ATTRIBUTION_REGIONS: usize = 8;

/// Region granularity in bytes
pub const REGION_GRANULE: u32 = 32;

/// Security state of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityAttribute {
    /// Secure-only memory
    Secure,
    /// Memory owned by the non-secure domain
    NonSecure,
    /// Secure memory holding gateway entry veneers
    NonSecureCallable,
}

/// Unprivileged access granted by the non-secure MPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UnprivilegedAccess {
    /// No access
    None,
    /// Read only
    ReadOnly,
    /// Read and write
    ReadWrite,
}

/// Access being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Caller must be able to read
    Read,
    /// Caller must be able to read and write
    ReadWrite,
}

impl AccessKind {
    const fn required(&self) -> UnprivilegedAccess {
        match self {
            Self::Read => UnprivilegedAccess::ReadOnly,
            Self::ReadWrite => UnprivilegedAccess::ReadWrite,
        }
    }
}

/// One attribution region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributionRegion {
    /// First byte (32-byte aligned)
    pub base: u32,
    /// Last byte, inclusive
    pub limit: u32,
    /// Security state
    pub security: SecurityAttribute,
    /// Unprivileged permission
    pub access: UnprivilegedAccess,
}

impl AttributionRegion {
    /// Region of `size` bytes starting at `base`
    ///
    /// # Errors
    /// Returns [`HalError::InvalidRegion`] for a zero or wrapping size.
    pub const fn new(
        base: u32,
        size: u32,
        security: SecurityAttribute,
        access: UnprivilegedAccess,
    ) -> HalResult<Self> {
        if size == 0 {
            return Err(HalError::InvalidRegion);
        }
        let Some(limit) = base.checked_add(size - 1) else {
            return Err(HalError::InvalidRegion);
        };
        Ok(Self {
            base,
            limit,
            security,
            access,
        })
    }

    /// Non-secure region with the given unprivileged access
    ///
    /// # Errors
    /// Returns [`HalError::InvalidRegion`] for a zero or wrapping size.
    pub const fn non_secure(base: u32, size: u32, access: UnprivilegedAccess) -> HalResult<Self> {
        Self::new(base, size, SecurityAttribute::NonSecure, access)
    }

    fn validate(&self) -> HalResult<()> {
        if self.base % REGION_GRANULE != 0 {
            return Err(HalError::InvalidRegion);
        }
        if self.limit % REGION_GRANULE != REGION_GRANULE - 1 {
            return Err(HalError::InvalidRegion);
        }
        if self.base > self.limit {
            return Err(HalError::InvalidRegion);
        }
        Ok(())
    }

    /// Check if `addr` falls in the region
    #[must_use]
    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr <= self.limit
    }

    const fn overlaps(&self, other: &Self) -> bool {
        self.base <= other.limit && other.base <= self.limit
    }
}

/// Attribution map
#[derive(Debug, Clone)]
pub struct AttributionMap {
    regions: [Option<AttributionRegion>; MAX_ATTRIBUTION_REGIONS],
}

impl AttributionMap {
    /// Map with no regions: everything is Secure
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: [None; MAX_ATTRIBUTION_REGIONS],
        }
    }

    /// Install a region in the first free slot, returning the region number
    ///
    /// # Errors
    /// - [`HalError::InvalidRegion`] for misaligned bounds
    /// - [`HalError::RegionOverlap`] if it intersects an installed region
    /// - [`HalError::RegionTableFull`] if all slots are used
    pub fn add_region(&mut self, region: AttributionRegion) -> HalResult<usize> {
        region.validate()?;
        if self.regions.iter().flatten().any(|r| r.overlaps(&region)) {
            return Err(HalError::RegionOverlap);
        }
        let slot = self
            .regions
            .iter()
            .position(Option::is_none)
            .ok_or(HalError::RegionTableFull)?;
        self.regions[slot] = Some(region);
        Ok(slot)
    }

    /// Region number and region containing `addr`
    #[must_use]
    pub fn region_of(&self, addr: u32) -> Option<(usize, &AttributionRegion)> {
        self.regions
            .iter()
            .enumerate()
            .find_map(|(n, r)| r.as_ref().filter(|r| r.contains(addr)).map(|r| (n, r)))
    }

    /// Check unprivileged non-secure access to `first..=last`
    #[must_use]
    pub fn has_unpriv_nonsecure_access(&self, first: u32, last: u32, kind: AccessKind) -> bool {
        if last < first {
            return false;
        }
        let (Some((start_region, region)), Some((end_region, _))) =
            (self.region_of(first), self.region_of(last))
        else {
            return false;
        };
        start_region == end_region
            && region.security == SecurityAttribute::NonSecure
            && region.access >= kind.required()
    }
}

impl Default for AttributionMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> AttributionMap {
        let mut map = AttributionMap::new();
        let rw = AttributionRegion::non_secure(0x2000_0000, 0x1000, UnprivilegedAccess::ReadWrite);
        let ro = AttributionRegion::non_secure(0x2000_1000, 0x1000, UnprivilegedAccess::ReadOnly);
        let sec = AttributionRegion::new(
            0x3000_0000,
            0x1000,
            SecurityAttribute::Secure,
            UnprivilegedAccess::ReadWrite,
        );
        for region in [rw, ro, sec] {
            assert!(region.and_then(|r| map.add_region(r)).is_ok());
        }
        map
    }

    #[test]
    fn test_range_inside_rw_region() {
        let map = map();
        assert!(map.has_unpriv_nonsecure_access(0x2000_0010, 0x2000_001F, AccessKind::ReadWrite));
        assert!(map.has_unpriv_nonsecure_access(0x2000_0010, 0x2000_001F, AccessKind::Read));
    }

    #[test]
    fn test_read_only_region_rejects_write() {
        let map = map();
        assert!(map.has_unpriv_nonsecure_access(0x2000_1000, 0x2000_10FF, AccessKind::Read));
        assert!(!map.has_unpriv_nonsecure_access(0x2000_1000, 0x2000_10FF, AccessKind::ReadWrite));
    }

    #[test]
    fn test_range_spanning_regions_rejected() {
        let map = map();
        assert!(!map.has_unpriv_nonsecure_access(0x2000_0FF0, 0x2000_100F, AccessKind::Read));
    }

    #[test]
    fn test_secure_and_unmapped_rejected() {
        let map = map();
        assert!(!map.has_unpriv_nonsecure_access(0x3000_0000, 0x3000_000F, AccessKind::Read));
        assert!(!map.has_unpriv_nonsecure_access(0x1000_0000, 0x1000_000F, AccessKind::Read));
    }

    #[test]
    fn test_misaligned_and_overlapping_regions_rejected() {
        let mut map = map();
        let misaligned = AttributionRegion::non_secure(0x4000_0004, 0x100, UnprivilegedAccess::ReadWrite);
        assert_eq!(misaligned.and_then(|r| map.add_region(r)), Err(HalError::InvalidRegion));
        let overlapping = AttributionRegion::non_secure(0x2000_0800, 0x1000, UnprivilegedAccess::ReadWrite);
        assert_eq!(overlapping.and_then(|r| map.add_region(r)), Err(HalError::RegionOverlap));
    }
}
