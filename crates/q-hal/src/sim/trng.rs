// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Simulated TRNG
//!
//! A ChaCha20 stream seeded at construction stands in for the entropy
//! source, so test runs are reproducible.

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};
use zeroize::Zeroize;

use q_common::constants::{DRIVER_STATUS_ERROR, DRIVER_STATUS_KEYSTORE_ERROR, DRIVER_STATUS_SUCCESS};
use q_common::types::Span;

use super::engine::{Outcome, SimEngine, SIM_MAX_DATA};
use super::{sim_lifecycle, SimObject, SimState};
use crate::ops::{CryptoKey, KeyEncoding, OperationType};
use crate::traits::{AddressSpace, DriverStatus, InstanceId, TrngDriver};

/// TRNG instances carry no state between operations
#[derive(Default)]
pub struct TrngState;

impl SimState for TrngState {}

/// Simulated TRNG
pub struct SimTrng {
    engine: SimEngine,
    rng: ChaCha20Rng,
}

impl SimTrng {
    /// TRNG producing the stream for `seed`
    #[must_use]
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            engine: SimEngine::new(),
            rng: ChaCha20Rng::from_seed(seed),
        }
    }

    fn random(&mut self, operation_type: OperationType, out: Span) -> Result<Outcome, DriverStatus> {
        let len = out.len as usize;
        if len == 0 || len > SIM_MAX_DATA {
            return Err(DRIVER_STATUS_ERROR);
        }
        let mut bytes = [0u8; SIM_MAX_DATA];
        self.rng.fill_bytes(&mut bytes[..len]);
        let outcome = Outcome::new(operation_type).write(out.addr, &bytes[..len]);
        bytes.zeroize();
        Ok(outcome?.with_aux(out.len))
    }
}

impl Default for SimTrng {
    fn default() -> Self {
        Self::new([0x5A; 32])
    }
}

sim_lifecycle!(SimTrng, TrngState, 32);

impl TrngDriver for SimTrng {
    fn generate_key(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        key: &mut CryptoKey,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let operation_type = OperationType::GenerateKey;
        let result = match key.encoding {
            KeyEncoding::BlankPlaintext => self
                .random(operation_type, key.material_span())
                .map(|outcome| {
                    outcome.with_output_key(CryptoKey {
                        encoding: KeyEncoding::Plaintext,
                        ..*key
                    })
                }),
            KeyEncoding::BlankKeyStore => Err(DRIVER_STATUS_KEYSTORE_ERROR),
            _ => Err(DRIVER_STATUS_ERROR),
        };
        let outcome = Outcome::from_result(operation_type, result);
        let produced = outcome.output_key();
        let status = self.engine.submit(id, object.behavior, outcome, mem);
        if status == DRIVER_STATUS_SUCCESS && !object.behavior.is_async() {
            if let Some(filled) = produced {
                *key = filled;
            }
        }
        status
    }

    fn get_random_bytes(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        out: Span,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let operation_type = OperationType::GetRandomBytes;
        let result = self.random(operation_type, out);
        let outcome = Outcome::from_result(operation_type, result);
        submit(&mut self.engine, id, object, outcome, mem)
    }
}

fn submit(
    engine: &mut SimEngine,
    id: InstanceId,
    object: &SimObject<TrngState>,
    outcome: Outcome,
    mem: &mut dyn AddressSpace,
) -> DriverStatus {
    engine.submit(id, object.behavior, outcome, mem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = SimTrng::new([1; 32]);
        let mut b = SimTrng::new([1; 32]);
        let (mut x, mut y) = ([0u8; 16], [0u8; 16]);
        a.rng.fill_bytes(&mut x);
        b.rng.fill_bytes(&mut y);
        assert_eq!(x, y);
        assert_ne!(x, [0u8; 16]);
    }

    #[test]
    fn test_oversized_request_rejected() {
        let mut trng = SimTrng::default();
        let out = Span::new(q_common::types::Addr(0x2000_0000), SIM_MAX_DATA as u32 + 1);
        assert_eq!(trng.random(OperationType::GetRandomBytes, out).err(), Some(DRIVER_STATUS_ERROR));
    }
}
