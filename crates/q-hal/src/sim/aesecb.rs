// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Simulated AES-ECB engine

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block};

use q_common::constants::{AES_BLOCK_SIZE, DRIVER_STATUS_ERROR};
use q_common::types::Span;

use super::engine::{read_span, KeyMaterial, Outcome, SimEngine, SIM_MAX_DATA};
use super::{sim_lifecycle, SimObject, SimState};
use crate::ops::{AesEcbOperation, CipherDirection, CryptoKey, OperationType};
use crate::traits::{AddressSpace, AesEcbDriver, DriverStatus, InstanceId};

/// AES block cipher keyed at one of the three standard sizes
pub(crate) enum AesCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl AesCipher {
    pub(crate) fn new(key: &[u8]) -> Result<Self, DriverStatus> {
        match key.len() {
            16 => Aes128::new_from_slice(key).map(Self::Aes128),
            24 => Aes192::new_from_slice(key).map(Self::Aes192),
            32 => Aes256::new_from_slice(key).map(Self::Aes256),
            _ => return Err(DRIVER_STATUS_ERROR),
        }
        .map_err(|_| DRIVER_STATUS_ERROR)
    }

    /// Transform whole blocks in place
    pub(crate) fn apply(&self, direction: CipherDirection, data: &mut [u8]) -> Result<(), DriverStatus> {
        if data.len() % AES_BLOCK_SIZE != 0 {
            return Err(DRIVER_STATUS_ERROR);
        }
        for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            let block = Block::from_mut_slice(chunk);
            match (self, direction) {
                (Self::Aes128(c), CipherDirection::Encrypt) => c.encrypt_block(block),
                (Self::Aes128(c), CipherDirection::Decrypt) => c.decrypt_block(block),
                (Self::Aes192(c), CipherDirection::Encrypt) => c.encrypt_block(block),
                (Self::Aes192(c), CipherDirection::Decrypt) => c.decrypt_block(block),
                (Self::Aes256(c), CipherDirection::Encrypt) => c.encrypt_block(block),
                (Self::Aes256(c), CipherDirection::Decrypt) => c.decrypt_block(block),
            }
        }
        Ok(())
    }
}

/// Segmented operation in progress
#[derive(Default)]
pub struct EcbState {
    segmented: Option<(CryptoKey, CipherDirection)>,
}

impl SimState for EcbState {}

/// Simulated AES-ECB engine
#[derive(Default)]
pub struct SimAesEcb {
    engine: SimEngine,
}

impl SimAesEcb {
    /// Idle engine
    #[must_use]
    pub const fn new() -> Self {
        Self {
            engine: SimEngine::new(),
        }
    }

    /// Engine state, for inspection
    #[must_use]
    pub const fn engine(&self) -> &SimEngine {
        &self.engine
    }

    fn submit(
        &mut self,
        id: InstanceId,
        object: &SimObject<EcbState>,
        operation_type: OperationType,
        result: Result<Outcome, DriverStatus>,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        let outcome = Outcome::from_result(operation_type, result);
        self.engine.submit(id, object.behavior, outcome, mem)
    }
}

sim_lifecycle!(SimAesEcb, EcbState, 64);

fn crypt(
    operation_type: OperationType,
    key: &CryptoKey,
    direction: CipherDirection,
    op: &AesEcbOperation,
    mem: &dyn AddressSpace,
) -> Result<Outcome, DriverStatus> {
    let material = KeyMaterial::read(key, mem)?;
    let cipher = AesCipher::new(material.as_slice())?;
    let mut data = read_span::<SIM_MAX_DATA>(mem, Span::new(op.input, op.length))?;
    cipher.apply(direction, &mut data)?;
    Outcome::new(operation_type).write(op.output, &data)
}

impl AesEcbDriver for SimAesEcb {
    fn one_step(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        direction: CipherDirection,
        op: &AesEcbOperation,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let operation_type = match direction {
            CipherDirection::Encrypt => OperationType::OneStepEncrypt,
            CipherDirection::Decrypt => OperationType::OneStepDecrypt,
        };
        let result = op
            .key
            .ok_or(DRIVER_STATUS_ERROR)
            .and_then(|key| crypt(operation_type, &key, direction, op, &*mem));
        self.submit(id, object, operation_type, result, mem)
    }

    fn setup(
        &mut self,
        _id: InstanceId,
        object: &mut Self::Object,
        direction: CipherDirection,
        key: &CryptoKey,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        object.state.segmented = Some((*key, direction));
        q_common::constants::DRIVER_STATUS_SUCCESS
    }

    fn add_data(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        op: &AesEcbOperation,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let Some((key, direction)) = object.state.segmented else {
            return DRIVER_STATUS_ERROR;
        };
        let operation_type = match direction {
            CipherDirection::Encrypt => OperationType::SegmentedEncrypt,
            CipherDirection::Decrypt => OperationType::SegmentedDecrypt,
        };
        let result = crypt(operation_type, &key, direction, op, &*mem);
        self.submit(id, object, operation_type, result, mem)
    }

    fn finalize(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        op: &AesEcbOperation,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let Some((key, direction)) = object.state.segmented.take() else {
            return DRIVER_STATUS_ERROR;
        };
        let operation_type = match direction {
            CipherDirection::Encrypt => OperationType::FinalizeEncrypt,
            CipherDirection::Decrypt => OperationType::FinalizeDecrypt,
        };
        let result = if op.length == 0 {
            Ok(Outcome::new(operation_type))
        } else {
            crypt(operation_type, &key, direction, op, &*mem)
        };
        self.submit(id, object, operation_type, result, mem)
    }
}
