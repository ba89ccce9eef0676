// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Simulated AES-CCM engine

use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{AeadInPlace, KeyInit};
use ccm::consts::{U12, U13, U16, U4, U8};
use ccm::Ccm;
use heapless::Vec;
use zeroize::Zeroize;

use q_common::constants::{DRIVER_STATUS_ERROR, DRIVER_STATUS_MAC_INVALID, DRIVER_STATUS_SUCCESS};
use q_common::types::{Addr, Span};

use super::engine::{read_span, KeyMaterial, Outcome, SimEngine, SIM_MAX_DATA};
use super::{sim_lifecycle, SimObject, SimState};
use crate::ops::{
    AesCcmFinalize, AesCcmOneStep, AesCcmSegment, CipherDirection, CryptoKey, OperationType,
};
use crate::traits::{AddressSpace, AesCcmDriver, DriverStatus, InstanceId};

/// Longest CCM nonce
const MAX_NONCE_LEN: usize = 13;

/// Payload segments a segmented operation may hold before finalization
const MAX_SEGMENTS: usize = 4;

/// Expand `$body` with `$cipher` bound to the CCM type for the given sizes
macro_rules! with_ccm {
    ($mac_len:expr, $nonce_len:expr, $cipher:ident => $body:expr) => {
        match ($mac_len, $nonce_len) {
            (4, 12) => {
                type $cipher = Ccm<Aes128, U4, U12>;
                $body
            }
            (8, 12) => {
                type $cipher = Ccm<Aes128, U8, U12>;
                $body
            }
            (16, 12) => {
                type $cipher = Ccm<Aes128, U16, U12>;
                $body
            }
            (4, 13) => {
                type $cipher = Ccm<Aes128, U4, U13>;
                $body
            }
            (8, 13) => {
                type $cipher = Ccm<Aes128, U8, U13>;
                $body
            }
            (16, 13) => {
                type $cipher = Ccm<Aes128, U16, U13>;
                $body
            }
            _ => Err(DRIVER_STATUS_ERROR),
        }
    };
}

fn seal(key: &[u8], nonce: &[u8], aad: &[u8], data: &mut [u8], mac: &mut [u8]) -> Result<(), DriverStatus> {
    with_ccm!(mac.len(), nonce.len(), C => {
        let cipher = C::new_from_slice(key).map_err(|_| DRIVER_STATUS_ERROR)?;
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, data)
            .map_err(|_| DRIVER_STATUS_ERROR)?;
        mac.copy_from_slice(&tag);
        Ok(())
    })
}

fn open(key: &[u8], nonce: &[u8], aad: &[u8], data: &mut [u8], mac: &[u8]) -> Result<(), DriverStatus> {
    with_ccm!(mac.len(), nonce.len(), C => {
        let cipher = C::new_from_slice(key).map_err(|_| DRIVER_STATUS_ERROR)?;
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(nonce),
                aad,
                data,
                GenericArray::from_slice(mac),
            )
            .map_err(|_| DRIVER_STATUS_MAC_INVALID)
    })
}

/// Run CCM over buffered inputs and queue the resulting writes
fn process(
    operation_type: OperationType,
    key: &CryptoKey,
    direction: CipherDirection,
    nonce: &[u8],
    aad: &[u8],
    data: &mut [u8],
    outputs: &[(Addr, u32)],
    mac: Span,
    mem: &dyn AddressSpace,
) -> Result<Outcome, DriverStatus> {
    let material = KeyMaterial::read(key, mem)?;
    let mut tag: Vec<u8, 16> = Vec::new();
    tag.resize(mac.len as usize, 0).map_err(|()| DRIVER_STATUS_ERROR)?;
    match direction {
        CipherDirection::Encrypt => seal(material.as_slice(), nonce, aad, data, &mut tag)?,
        CipherDirection::Decrypt => {
            mem.read(mac.addr, &mut tag).map_err(|_| DRIVER_STATUS_ERROR)?;
            open(material.as_slice(), nonce, aad, data, &tag)?;
        }
    }

    let mut outcome = Outcome::new(operation_type);
    let mut offset = 0usize;
    for (addr, len) in outputs {
        let end = offset + *len as usize;
        outcome = outcome.write(*addr, data.get(offset..end).ok_or(DRIVER_STATUS_ERROR)?)?;
        offset = end;
    }
    if direction == CipherDirection::Encrypt {
        outcome = outcome.write(mac.addr, &tag)?;
    }
    data.zeroize();
    Ok(outcome)
}

/// Segmented operation in progress
struct Segmented {
    key: CryptoKey,
    direction: CipherDirection,
    aad_len: u32,
    input_len: u32,
    mac_len: u32,
    nonce: Vec<u8, MAX_NONCE_LEN>,
    aad: Vec<u8, SIM_MAX_DATA>,
    input: Vec<u8, SIM_MAX_DATA>,
    outputs: Vec<(Addr, u32), MAX_SEGMENTS>,
}

impl Drop for Segmented {
    fn drop(&mut self) {
        self.input.as_mut_slice().zeroize();
        self.aad.as_mut_slice().zeroize();
    }
}

impl Segmented {
    fn append(&mut self, segment: &AesCcmSegment, mem: &dyn AddressSpace) -> Result<(), DriverStatus> {
        if segment.length == 0 {
            return Ok(());
        }
        let bytes = read_span::<SIM_MAX_DATA>(mem, Span::new(segment.input, segment.length))?;
        self.input.extend_from_slice(&bytes).map_err(|()| DRIVER_STATUS_ERROR)?;
        self.outputs
            .push((segment.output, segment.length))
            .map_err(|_| DRIVER_STATUS_ERROR)
    }
}

/// Segmented operation state
#[derive(Default)]
pub struct CcmState {
    segmented: Option<Segmented>,
}

impl SimState for CcmState {}

/// Simulated AES-CCM engine
#[derive(Default)]
pub struct SimAesCcm {
    engine: SimEngine,
}

impl SimAesCcm {
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
        object: &SimObject<CcmState>,
        operation_type: OperationType,
        result: Result<Outcome, DriverStatus>,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        let outcome = Outcome::from_result(operation_type, result);
        self.engine.submit(id, object.behavior, outcome, mem)
    }
}

sim_lifecycle!(SimAesCcm, CcmState, 96);

fn one_step_outcome(
    operation_type: OperationType,
    direction: CipherDirection,
    op: &AesCcmOneStep,
    mem: &dyn AddressSpace,
) -> Result<Outcome, DriverStatus> {
    let nonce = read_span::<MAX_NONCE_LEN>(mem, op.nonce)?;
    let aad = read_span::<SIM_MAX_DATA>(mem, op.aad)?;
    let mut data = read_span::<SIM_MAX_DATA>(mem, Span::new(op.input, op.length))?;
    process(
        operation_type,
        &op.key,
        direction,
        &nonce,
        &aad,
        &mut data,
        &[(op.output, op.length)],
        op.mac,
        mem,
    )
}

impl AesCcmDriver for SimAesCcm {
    fn one_step(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        direction: CipherDirection,
        op: &AesCcmOneStep,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let operation_type = match direction {
            CipherDirection::Encrypt => OperationType::OneStepEncrypt,
            CipherDirection::Decrypt => OperationType::OneStepDecrypt,
        };
        let result = one_step_outcome(operation_type, direction, op, &*mem);
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
        object.state.segmented = Some(Segmented {
            key: *key,
            direction,
            aad_len: 0,
            input_len: 0,
            mac_len: 0,
            nonce: Vec::new(),
            aad: Vec::new(),
            input: Vec::new(),
            outputs: Vec::new(),
        });
        DRIVER_STATUS_SUCCESS
    }

    fn set_lengths(
        &mut self,
        _id: InstanceId,
        object: &mut Self::Object,
        aad_len: u32,
        input_len: u32,
        mac_len: u32,
    ) -> DriverStatus {
        let Some(segmented) = object.state.segmented.as_mut() else {
            return DRIVER_STATUS_ERROR;
        };
        if aad_len as usize > SIM_MAX_DATA || input_len as usize > SIM_MAX_DATA {
            return DRIVER_STATUS_ERROR;
        }
        segmented.aad_len = aad_len;
        segmented.input_len = input_len;
        segmented.mac_len = mac_len;
        DRIVER_STATUS_SUCCESS
    }

    fn set_nonce(
        &mut self,
        _id: InstanceId,
        object: &mut Self::Object,
        nonce: Span,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        let Some(segmented) = object.state.segmented.as_mut() else {
            return DRIVER_STATUS_ERROR;
        };
        match read_span::<MAX_NONCE_LEN>(&*mem, nonce) {
            Ok(bytes) => {
                segmented.nonce = bytes;
                DRIVER_STATUS_SUCCESS
            }
            Err(status) => status,
        }
    }

    fn add_aad(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        aad: Span,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let operation_type = OperationType::SegmentedAad;
        let result = match object.state.segmented.as_mut() {
            Some(segmented) => read_span::<SIM_MAX_DATA>(&*mem, aad).and_then(|bytes| {
                segmented
                    .aad
                    .extend_from_slice(&bytes)
                    .map(|()| Outcome::new(operation_type))
                    .map_err(|()| DRIVER_STATUS_ERROR)
            }),
            None => Err(DRIVER_STATUS_ERROR),
        };
        self.submit(id, object, operation_type, result, mem)
    }

    fn add_data(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        segment: &AesCcmSegment,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let Some(segmented) = object.state.segmented.as_mut() else {
            return DRIVER_STATUS_ERROR;
        };
        let operation_type = match segmented.direction {
            CipherDirection::Encrypt => OperationType::SegmentedEncrypt,
            CipherDirection::Decrypt => OperationType::SegmentedDecrypt,
        };
        let result = segmented
            .append(segment, &*mem)
            .map(|()| Outcome::new(operation_type));
        self.submit(id, object, operation_type, result, mem)
    }

    fn finalize(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        direction: CipherDirection,
        op: &AesCcmFinalize,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let operation_type = match direction {
            CipherDirection::Encrypt => OperationType::FinalizeEncrypt,
            CipherDirection::Decrypt => OperationType::FinalizeDecrypt,
        };
        let result = match object.state.segmented.take() {
            Some(mut segmented) if segmented.direction == direction => segmented
                .append(&op.segment, &*mem)
                .and_then(|()| {
                    let declared_mac = segmented.mac_len == 0 || segmented.mac_len == op.mac.len;
                    let declared_aad = segmented.aad_len == 0 || segmented.aad_len as usize == segmented.aad.len();
                    let declared_input =
                        segmented.input_len == 0 || segmented.input_len as usize == segmented.input.len();
                    if declared_mac && declared_aad && declared_input {
                        Ok(())
                    } else {
                        Err(DRIVER_STATUS_ERROR)
                    }
                })
                .and_then(|()| {
                    let mut data = segmented.input.clone();
                    process(
                        operation_type,
                        &segmented.key,
                        direction,
                        &segmented.nonce,
                        &segmented.aad,
                        &mut data,
                        &segmented.outputs,
                        op.mac,
                        &*mem,
                    )
                }),
            _ => Err(DRIVER_STATUS_ERROR),
        };
        self.submit(id, object, operation_type, result, mem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_then_open() {
        let key = [0x40u8; 16];
        let nonce = [0x10u8; 13];
        let aad = [1u8, 2, 3];
        let mut data = *b"ccm payload";
        let mut mac = [0u8; 8];
        assert!(seal(&key, &nonce, &aad, &mut data, &mut mac).is_ok());
        assert_ne!(&data, b"ccm payload");
        assert!(open(&key, &nonce, &aad, &mut data, &mac).is_ok());
        assert_eq!(&data, b"ccm payload");
    }

    #[test]
    fn test_tampered_tag_reports_mac_invalid() {
        let key = [0x40u8; 16];
        let nonce = [0x10u8; 12];
        let mut data = [7u8; 20];
        let mut mac = [0u8; 16];
        assert!(seal(&key, &nonce, &[], &mut data, &mut mac).is_ok());
        mac[0] ^= 1;
        assert_eq!(open(&key, &nonce, &[], &mut data, &mac), Err(DRIVER_STATUS_MAC_INVALID));
    }

    #[test]
    fn test_unsupported_sizes_rejected() {
        let mut data = [0u8; 4];
        let mut mac = [0u8; 6];
        assert_eq!(seal(&[0u8; 16], &[0u8; 13], &[], &mut data, &mut mac), Err(DRIVER_STATUS_ERROR));
    }
}
