// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! HAL error types

use core::fmt;

/// HAL error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// Address not backed by any memory
    BusFault,
    /// Attribution region parameters are malformed
    InvalidRegion,
    /// Attribution region overlaps an existing region
    RegionOverlap,
    /// No free attribution region slot
    RegionTableFull,
    /// Invalid parameter
    InvalidParameter,
    /// Hardware busy
    Busy,
}

impl HalError {
    /// Get the numeric error code
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::BusFault => 0x0801,
            Self::InvalidRegion => 0x0802,
            Self::RegionOverlap => 0x0803,
            Self::RegionTableFull => 0x0804,
            Self::InvalidParameter => 0x0805,
            Self::Busy => 0x0806,
        }
    }

    /// Get a human-readable description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::BusFault => "Bus fault",
            Self::InvalidRegion => "Invalid attribution region",
            Self::RegionOverlap => "Attribution regions overlap",
            Self::RegionTableFull => "Attribution region table full",
            Self::InvalidParameter => "Invalid parameter",
            Self::Busy => "Hardware busy",
        }
    }
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:04X}] {}", self.code(), self.description())
    }
}

/// HAL result type
pub type HalResult<T> = core::result::Result<T, HalError>;

impl From<HalError> for q_common::Error {
    fn from(err: HalError) -> Self {
        match err {
            HalError::BusFault => Self::MemoryFault,
            HalError::InvalidRegion | HalError::RegionOverlap | HalError::RegionTableFull => {
                Self::InvalidConfig
            }
            HalError::InvalidParameter => Self::InvalidParameter,
            HalError::Busy => Self::HardwareError,
        }
    }
}
