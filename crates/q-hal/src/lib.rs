// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Hardware Abstraction Layer for the Qbitel crypto gateway
//!
//! This crate defines what the secure boundary needs from the platform:
//!
//! - **Driver contract**: traits for the AES-CCM, AES-ECB, AES-CMAC, SHA-2,
//!   ECDH and TRNG engines (`traits` module)
//! - **Operation descriptors**: the secure-side copies handed to drivers
//!   (`ops` module)
//! - **Security attribution**: a model of the SAU and non-secure MPU used to
//!   check caller pointers (`attribution` module)
//! - **Host simulation**: software engines and a flat bus (`sim` module,
//!   feature `sim`)
//!
//! # Security
//!
//! - Drivers only ever see descriptors the boundary has validated and copied
//! - Key material read by the simulation backend is zeroized on drop

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attribution;
pub mod error;
pub mod ops;
pub mod traits;

#[cfg(feature = "sim")]
pub mod sim;

// Re-export main traits
pub use attribution::{AccessKind, AttributionMap, AttributionRegion, SecurityAttribute, UnprivilegedAccess};
pub use error::{HalError, HalResult};
pub use traits::*;

/// Platform identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Host simulation backend
    Simulation,
    /// Bare-metal TrustZone-M target
    TrustZoneM,
    /// Unknown platform
    Unknown,
}

impl Platform {
    /// Get the current platform
    #[must_use]
    pub const fn current() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(feature = "sim")] {
                Self::Simulation
            } else if #[cfg(all(target_arch = "arm", target_os = "none"))] {
                Self::TrustZoneM
            } else {
                Self::Unknown
            }
        }
    }

    /// Check if TrustZone is available
    #[must_use]
    pub const fn has_trustzone(&self) -> bool {
        matches!(self, Self::TrustZoneM)
    }

    /// Check if the crypto engines are software models
    #[must_use]
    pub const fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulation)
    }

    /// Get the base of non-secure RAM for this platform
    #[must_use]
    pub const fn ns_ram_base(&self) -> u32 {
        match self {
            Self::Simulation | Self::TrustZoneM => 0x2000_0000,
            Self::Unknown => 0x0000_0000,
        }
    }
}
