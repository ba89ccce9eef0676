// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Host simulation backend
//!
//! Software engines implementing the driver contract on top of RustCrypto,
//! plus a flat bus memory. They let the boundary run end to end on a host:
//! known-answer vectors, deferred completions, cancellation and engine
//! contention all behave as the hardware contract describes.
//!
//! # Limits
//!
//! - Buffers moved in one operation are capped at [`SIM_MAX_DATA`] bytes
//!   (hash input is streamed and has no cap)
//! - There is no key store: key-store keys fail with
//!   `DRIVER_STATUS_KEYSTORE_ERROR`
//! - AES-CCM uses 128-bit keys, 12 or 13 byte nonces and 4, 8 or 16 byte tags
//! - Segmented AES-CCM releases its payload at finalization

mod aesccm;
mod aescmac;
mod aesecb;
mod ecdh;
mod engine;
mod memory;
mod sha2;
mod trng;

pub use aesccm::{CcmState, SimAesCcm};
pub use aescmac::{CmacObjectState, SimAesCmac};
pub use aesecb::{EcbState, SimAesEcb};
pub use ecdh::{EcdhState, SimEcdh};
pub use engine::{SimEngine, SimObject, SIM_MAX_DATA};
pub use memory::SimMemory;
pub use sha2::{Sha2State, SimSha2};
pub use trng::{SimTrng, TrngState};

use crate::traits::DriverParams;

/// Per-instance state of a simulated driver
pub trait SimState: Default {
    /// State of a freshly constructed instance
    fn from_params(_params: &DriverParams) -> Self {
        Self::default()
    }

    /// Abandon any segmented operation after a cancel
    fn abort(&mut self) {
        *self = Self::default();
    }
}

/// Lifecycle half of the driver contract, identical for every simulated engine
macro_rules! sim_lifecycle {
    ($driver:ty, $state:ty, $object_size:expr) => {
        impl $crate::traits::CryptoDriver for $driver {
            type Object = $crate::sim::SimObject<$state>;

            const OBJECT_SIZE: u32 = $object_size;

            fn construct(
                &mut self,
                _id: $crate::traits::InstanceId,
                object: &mut Self::Object,
                _hw_attrs: &$crate::traits::HwAttrs,
                params: &$crate::traits::DriverParams,
            ) -> $crate::traits::DriverStatus {
                if object.open {
                    return q_common::constants::DRIVER_STATUS_ERROR;
                }
                object.open = true;
                object.behavior = params.return_behavior;
                object.state = <$state as $crate::sim::SimState>::from_params(params);
                q_common::constants::DRIVER_STATUS_SUCCESS
            }

            fn close(&mut self, _id: $crate::traits::InstanceId, object: &mut Self::Object) {
                *object = Self::Object::default();
            }

            fn cancel_operation(
                &mut self,
                id: $crate::traits::InstanceId,
                object: &mut Self::Object,
            ) -> $crate::traits::DriverStatus {
                $crate::sim::SimState::abort(&mut object.state);
                self.engine.cancel(id)
            }

            fn take_completion(
                &mut self,
                mem: &mut dyn $crate::traits::AddressSpace,
            ) -> Option<$crate::traits::HwCompletion> {
                self.engine.take_completion(mem)
            }
        }
    };
}

pub(crate) use sim_lifecycle;
