// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Gateway configuration
//!
//! Instance capacities are provisioned at build time. There is no runtime
//! reconfiguration: a gateway is created from a validated [`GatewayConfig`]
//! and keeps it for its lifetime.

use crate::constants::{MAX_POOL_SIZE, MAX_STATIC_INSTANCES};
use crate::errors::{Error, Result};
use crate::log::LogLevel;
use crate::types::ServiceId;

/// Capacity and hardware attributes for one service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Statically provisioned instances, opened by index
    pub static_count: u8,
    /// Dynamic pool slots, filled by construct
    pub pool_size: u8,
    /// Interrupt priority given to statically provisioned instances
    pub int_priority: u8,
}

impl ServiceConfig {
    /// One static instance and a pool of two
    pub const DEFAULT: Self = Self::new(1, 2);

    /// Create a service configuration with the lowest interrupt priority
    #[must_use]
    pub const fn new(static_count: u8, pool_size: u8) -> Self {
        Self {
            static_count,
            pool_size,
            int_priority: 0xFF,
        }
    }

    /// Total addressable instances
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.static_count as usize + self.pool_size as usize
    }

    /// Check capacities against the compile-time limits
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if either capacity exceeds its limit.
    pub const fn validate(&self) -> Result<()> {
        if self.static_count as usize > MAX_STATIC_INSTANCES || self.pool_size as usize > MAX_POOL_SIZE {
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Configuration of the whole gateway
#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    /// AES-CCM service
    pub aes_ccm: ServiceConfig,
    /// AES-ECB service
    pub aes_ecb: ServiceConfig,
    /// AES-CMAC service
    pub aes_cmac: ServiceConfig,
    /// SHA-2 service
    pub sha2: ServiceConfig,
    /// ECDH service
    pub ecdh: ServiceConfig,
    /// TRNG service
    pub trng: ServiceConfig,
    /// Minimum level recorded in the gateway log
    pub log_level: LogLevel,
}

impl GatewayConfig {
    /// Default configuration for all services
    pub const DEFAULT: Self = Self {
        aes_ccm: ServiceConfig::DEFAULT,
        aes_ecb: ServiceConfig::DEFAULT,
        aes_cmac: ServiceConfig::DEFAULT,
        sha2: ServiceConfig::DEFAULT,
        ecdh: ServiceConfig::DEFAULT,
        trng: ServiceConfig::DEFAULT,
        log_level: LogLevel::Info,
    };

    /// Configuration of one service
    #[must_use]
    pub const fn service(&self, service: ServiceId) -> ServiceConfig {
        match service {
            ServiceId::AesCcm => self.aes_ccm,
            ServiceId::AesEcb => self.aes_ecb,
            ServiceId::AesCmac => self.aes_cmac,
            ServiceId::Sha2 => self.sha2,
            ServiceId::Ecdh => self.ecdh,
            ServiceId::Trng => self.trng,
        }
    }

    /// Validate every service configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if any service exceeds its limits.
    pub fn validate(&self) -> Result<()> {
        ServiceId::ALL
            .iter()
            .try_for_each(|service| self.service(*service).validate())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GatewayConfig::DEFAULT.validate().is_ok());
        assert_eq!(ServiceConfig::DEFAULT.capacity(), 3);
    }

    #[test]
    fn test_oversized_pool_rejected() {
        let mut config = GatewayConfig::DEFAULT;
        config.sha2 = ServiceConfig::new(1, (MAX_POOL_SIZE + 1) as u8);
        assert_eq!(config.validate(), Err(Error::InvalidConfig));
    }
}
