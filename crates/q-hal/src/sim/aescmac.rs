// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Simulated AES-CMAC engine

use aes::{Aes128, Aes256};
use cmac::{Cmac, Mac};

use q_common::constants::{
    AES_BLOCK_SIZE, DRIVER_STATUS_ERROR, DRIVER_STATUS_MAC_INVALID, DRIVER_STATUS_SUCCESS,
};
use q_common::types::Span;

use super::engine::{for_each_chunk, KeyMaterial, Outcome, SimEngine};
use super::{sim_lifecycle, SimObject, SimState};
use crate::ops::{AesCmacOperation, CryptoKey, MacDirection, OperationType};
use crate::traits::{AddressSpace, AesCmacDriver, DriverStatus, InstanceId};

/// Running CMAC computation
enum CmacContext {
    Aes128(Cmac<Aes128>),
    Aes256(Cmac<Aes256>),
}

impl CmacContext {
    fn new(key: &[u8]) -> Result<Self, DriverStatus> {
        match key.len() {
            16 => <Cmac<Aes128> as Mac>::new_from_slice(key).map(Self::Aes128),
            32 => <Cmac<Aes256> as Mac>::new_from_slice(key).map(Self::Aes256),
            _ => return Err(DRIVER_STATUS_ERROR),
        }
        .map_err(|_| DRIVER_STATUS_ERROR)
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Aes128(mac) => mac.update(data),
            Self::Aes256(mac) => mac.update(data),
        }
    }

    fn absorb(&mut self, mem: &dyn AddressSpace, span: Span) -> Result<(), DriverStatus> {
        for_each_chunk(mem, span, |chunk| self.update(chunk))
    }

    /// Produce the tag, or check the leftmost `tag.len()` bytes against it
    fn finish(
        self,
        operation_type: OperationType,
        direction: MacDirection,
        mac: Span,
        mem: &dyn AddressSpace,
    ) -> Result<Outcome, DriverStatus> {
        let tag_len = mac.len as usize;
        if tag_len == 0 || tag_len > AES_BLOCK_SIZE {
            return Err(DRIVER_STATUS_ERROR);
        }
        match direction {
            MacDirection::Sign => {
                let tag = match self {
                    Self::Aes128(mac) => mac.finalize().into_bytes(),
                    Self::Aes256(mac) => mac.finalize().into_bytes(),
                };
                Outcome::new(operation_type).write(mac.addr, &tag[..tag_len])
            }
            MacDirection::Verify => {
                let mut expected = [0u8; AES_BLOCK_SIZE];
                mem.read(mac.addr, &mut expected[..tag_len])
                    .map_err(|_| DRIVER_STATUS_ERROR)?;
                let verified = match self {
                    Self::Aes128(mac) => mac.verify_truncated_left(&expected[..tag_len]),
                    Self::Aes256(mac) => mac.verify_truncated_left(&expected[..tag_len]),
                };
                verified
                    .map(|()| Outcome::new(operation_type))
                    .map_err(|_| DRIVER_STATUS_MAC_INVALID)
            }
        }
    }
}

/// Segmented operation state
#[derive(Default)]
pub struct CmacObjectState {
    pending_key: Option<(CryptoKey, MacDirection)>,
    segmented: Option<(CmacContext, MacDirection)>,
}

impl SimState for CmacObjectState {}

/// Simulated AES-CMAC engine
#[derive(Default)]
pub struct SimAesCmac {
    engine: SimEngine,
}

impl SimAesCmac {
    /// Idle engine
    #[must_use]
    pub const fn new() -> Self {
        Self {
            engine: SimEngine::new(),
        }
    }

    fn submit(
        &mut self,
        id: InstanceId,
        object: &SimObject<CmacObjectState>,
        operation_type: OperationType,
        result: Result<Outcome, DriverStatus>,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        let outcome = Outcome::from_result(operation_type, result);
        self.engine.submit(id, object.behavior, outcome, mem)
    }
}

sim_lifecycle!(SimAesCmac, CmacObjectState, 64);

impl AesCmacDriver for SimAesCmac {
    fn direction(&self, object: &Self::Object) -> Option<MacDirection> {
        object.state.pending_key.map(|(_, direction)| direction)
    }

    fn one_step(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        direction: MacDirection,
        op: &AesCmacOperation,
        key: &CryptoKey,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let operation_type = match direction {
            MacDirection::Sign => OperationType::OneStepSign,
            MacDirection::Verify => OperationType::OneStepVerify,
        };
        let result = KeyMaterial::read(key, &*mem)
            .and_then(|material| CmacContext::new(material.as_slice()))
            .and_then(|mut context| {
                context.absorb(&*mem, Span::new(op.input, op.length))?;
                context.finish(operation_type, direction, op.mac, &*mem)
            });
        self.submit(id, object, operation_type, result, mem)
    }

    fn setup(
        &mut self,
        _id: InstanceId,
        object: &mut Self::Object,
        direction: MacDirection,
        key: &CryptoKey,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        // Material is read when the first segment arrives
        object.state.segmented = None;
        object.state.pending_key = Some((*key, direction));
        DRIVER_STATUS_SUCCESS
    }

    fn add_data(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        op: &AesCmacOperation,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let result = object.state.context(&*mem).and_then(|(context, direction)| {
            let operation_type = match direction {
                MacDirection::Sign => OperationType::SegmentedSign,
                MacDirection::Verify => OperationType::SegmentedVerify,
            };
            context
                .absorb(&*mem, Span::new(op.input, op.length))
                .map(|()| Outcome::new(operation_type))
        });
        let operation_type = object.state.segmented_type();
        self.submit(id, object, operation_type, result, mem)
    }

    fn finalize(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        op: &AesCmacOperation,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let operation_type = match object.state.pending_key {
            Some((_, MacDirection::Verify)) => OperationType::FinalizeVerify,
            _ => OperationType::FinalizeSign,
        };
        let result = object
            .state
            .context(&*mem)
            .and_then(|(context, _)| context.absorb(&*mem, Span::new(op.input, op.length)))
            .and_then(|()| {
                let (context, direction) = object.state.segmented.take().ok_or(DRIVER_STATUS_ERROR)?;
                context.finish(operation_type, direction, op.mac, &*mem)
            });
        object.state = CmacObjectState::default();
        self.submit(id, object, operation_type, result, mem)
    }
}

impl CmacObjectState {
    /// Running context, keyed on first use
    fn context(&mut self, mem: &dyn AddressSpace) -> Result<(&mut CmacContext, MacDirection), DriverStatus> {
        if self.segmented.is_none() {
            let (key, direction) = self.pending_key.ok_or(DRIVER_STATUS_ERROR)?;
            let material = KeyMaterial::read(&key, mem)?;
            self.segmented = Some((CmacContext::new(material.as_slice())?, direction));
        }
        self.segmented
            .as_mut()
            .map(|(context, direction)| (context, *direction))
            .ok_or(DRIVER_STATUS_ERROR)
    }

    fn segmented_type(&self) -> OperationType {
        match self.pending_key {
            Some((_, MacDirection::Verify)) => OperationType::SegmentedVerify,
            _ => OperationType::SegmentedSign,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimMemory;
    use q_common::types::Addr;

    // RFC 4493 example 2
    const KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f,
        0x3c,
    ];
    const MSG: [u8; 16] = [
        0x6b, 0xc1, 0xbe, 0xe2, 0x2e, 0x40, 0x9f, 0x96, 0xe9, 0x3d, 0x7e, 0x11, 0x73, 0x93, 0x17,
        0x2a,
    ];
    const TAG: [u8; 16] = [
        0x07, 0x0a, 0x16, 0xb4, 0x6b, 0x77, 0x7a, 0x9c, 0xf1, 0x2a, 0x75, 0x9d, 0x49, 0x0c, 0x35,
        0x6c,
    ];

    #[test]
    fn test_rfc4493_verify() {
        let mut mem = SimMemory::<64>::new(0x2000_0000);
        assert!(mem.write(Addr(0x2000_0000), &TAG).is_ok());
        let context = CmacContext::new(&KEY);
        let outcome = context.and_then(|mut c| {
            c.update(&MSG);
            c.finish(
                OperationType::OneStepVerify,
                MacDirection::Verify,
                Span::new(Addr(0x2000_0000), 16),
                &mem,
            )
        });
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_wrong_tag_rejected() {
        let mut mem = SimMemory::<64>::new(0x2000_0000);
        assert!(mem.write(Addr(0x2000_0000), &[0u8; 16]).is_ok());
        let outcome = CmacContext::new(&KEY).and_then(|mut c| {
            c.update(&MSG);
            c.finish(
                OperationType::OneStepVerify,
                MacDirection::Verify,
                Span::new(Addr(0x2000_0000), 8),
                &mem,
            )
        });
        assert_eq!(outcome.err(), Some(DRIVER_STATUS_MAC_INVALID));
    }
}
