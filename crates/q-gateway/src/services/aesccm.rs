// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! AES-CCM service
//!
//! The tag buffer is written by encryption and only read by decryption, so
//! it is validated for writing or reading accordingly.

use q_common::types::{Addr, ServiceId, Span};
use q_common::{Error, Result, ServiceConfig};
use q_hal::attribution::AccessKind;
use q_hal::ops::{AesCcmFinalize, AesCcmOneStep, AesCcmSegment, CipherDirection};
use q_hal::traits::{AesCcmDriver, DriverStatus};

use crate::copy::{copy_input_key, CopyContext};
use crate::service::{reply_status, BoundaryContext, PendingOp, Scratch, ServiceCore, ServiceOperations};
use crate::transport::Message;
use crate::wire::{
    BufferMsg, CcmFinalizeWire, CcmOneStepWire, CcmSegmentWire, KeyMsg, OperationMsg, SetLengthsMsg, StatusReply,
    WireStruct,
};

/// AES-CCM message tags
pub mod tag {
    /// Authenticated encryption in one call
    pub const ONE_STEP_ENCRYPT: u32 = 0x10;
    /// Authenticated decryption in one call
    pub const ONE_STEP_DECRYPT: u32 = 0x11;
    /// Start a segmented encryption
    pub const SETUP_ENCRYPT: u32 = 0x12;
    /// Start a segmented decryption
    pub const SETUP_DECRYPT: u32 = 0x13;
    /// Declare AAD, payload and tag lengths
    pub const SET_LENGTHS: u32 = 0x14;
    /// Load the nonce
    pub const SET_NONCE: u32 = 0x15;
    /// Absorb AAD
    pub const ADD_AAD: u32 = 0x16;
    /// Process a payload segment
    pub const ADD_DATA: u32 = 0x17;
    /// Finish an encryption and write the tag
    pub const FINALIZE_ENCRYPT: u32 = 0x18;
    /// Finish a decryption and check the tag
    pub const FINALIZE_DECRYPT: u32 = 0x19;
}

fn check_mac(cx: &CopyContext<'_>, mac: Span, direction: CipherDirection) -> Result<()> {
    match direction {
        CipherDirection::Encrypt => cx.writable(mac),
        CipherDirection::Decrypt => cx.readable(mac),
    }
}

fn copy_segment(cx: &CopyContext<'_>, input: Addr, output: Addr, length: u32) -> Result<AesCcmSegment> {
    cx.readable(Span::new(input, length))?;
    cx.writable(Span::new(output, length))?;
    Ok(AesCcmSegment { input, output, length })
}

fn copy_one_step(cx: &CopyContext<'_>, addr: Addr, direction: CipherDirection) -> Result<AesCcmOneStep> {
    let wire: CcmOneStepWire = cx.fetch(addr, AccessKind::Read)?;
    let key = copy_input_key(cx, wire.key)?;
    let aad = Span::new(wire.aad, wire.aad_len);
    let nonce = Span::new(wire.nonce, wire.nonce_len);
    let mac = Span::new(wire.mac, wire.mac_len);
    cx.readable(aad)?;
    cx.readable(nonce)?;
    let segment = copy_segment(cx, wire.input, wire.output, wire.input_len)?;
    check_mac(cx, mac, direction)?;
    Ok(AesCcmOneStep {
        key,
        aad,
        input: segment.input,
        output: segment.output,
        length: segment.length,
        nonce,
        mac,
    })
}

/// Descriptor staged for the driver
enum Staged {
    OneStep(AesCcmOneStep),
    Segment(AesCcmSegment),
    Finalize(AesCcmFinalize),
}

/// AES-CCM boundary service
pub struct AesCcmService<D: AesCcmDriver> {
    core: ServiceCore<D>,
    scratch: Scratch<Staged>,
}

impl<D: AesCcmDriver> AesCcmService<D> {
    /// Service over `driver`
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `config` exceeds the limits.
    pub fn new(driver: D, config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            core: ServiceCore::new(ServiceId::AesCcm, driver, config, 1)?,
            scratch: Scratch::new(),
        })
    }

    fn one_step(
        &mut self,
        cx: &mut BoundaryContext<'_>,
        msg: &Message<'_>,
        direction: CipherDirection,
    ) -> Result<DriverStatus> {
        let input: OperationMsg = msg.read_input(StatusReply::SIZE)?;
        let Staged::OneStep(op) = self
            .scratch
            .stage(Staged::OneStep(copy_one_step(&cx.copy(), input.operation, direction)?))
        else {
            return Err(Error::InternalError);
        };
        self.core.submit(cx, input.handle, PendingOp::new(input.operation), |driver, id, object, mem| {
            driver.one_step(id, object, direction, op, mem)
        })
    }

    fn setup(
        &mut self,
        cx: &mut BoundaryContext<'_>,
        msg: &Message<'_>,
        direction: CipherDirection,
    ) -> Result<DriverStatus> {
        let input: KeyMsg = msg.read_input(StatusReply::SIZE)?;
        let key = copy_input_key(&cx.copy(), input.key)?;
        self.core
            .control(cx, input.handle, |driver, id, object, _| driver.setup(id, object, direction, &key))
    }

    fn set_lengths(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: SetLengthsMsg = msg.read_input(StatusReply::SIZE)?;
        self.core.control(cx, input.handle, |driver, id, object, _| {
            driver.set_lengths(id, object, input.aad_len, input.input_len, input.mac_len)
        })
    }

    fn set_nonce(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: BufferMsg = msg.read_input(StatusReply::SIZE)?;
        let nonce = Span::new(input.buffer, input.length);
        cx.readable(nonce)?;
        self.core.control(cx, input.handle, |driver, id, object, mem| {
            driver.set_nonce(id, object, nonce, mem)
        })
    }

    fn add_aad(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: BufferMsg = msg.read_input(StatusReply::SIZE)?;
        let aad = Span::new(input.buffer, input.length);
        cx.readable(aad)?;
        self.core.submit(cx, input.handle, PendingOp::new(input.buffer), |driver, id, object, mem| {
            driver.add_aad(id, object, aad, mem)
        })
    }

    fn add_data(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: OperationMsg = msg.read_input(StatusReply::SIZE)?;
        let wire: CcmSegmentWire = cx.copy().fetch(input.operation, AccessKind::Read)?;
        let segment = copy_segment(&cx.copy(), wire.input, wire.output, wire.length)?;
        let Staged::Segment(segment) = self.scratch.stage(Staged::Segment(segment)) else {
            return Err(Error::InternalError);
        };
        self.core.submit(cx, input.handle, PendingOp::new(input.operation), |driver, id, object, mem| {
            driver.add_data(id, object, segment, mem)
        })
    }

    fn finalize(
        &mut self,
        cx: &mut BoundaryContext<'_>,
        msg: &Message<'_>,
        direction: CipherDirection,
    ) -> Result<DriverStatus> {
        let input: OperationMsg = msg.read_input(StatusReply::SIZE)?;
        let copy = cx.copy();
        let wire: CcmFinalizeWire = copy.fetch(input.operation, AccessKind::Read)?;
        let segment = copy_segment(&copy, wire.input, wire.output, wire.length)?;
        let mac = Span::new(wire.mac, wire.mac_len);
        check_mac(&copy, mac, direction)?;
        let Staged::Finalize(op) = self.scratch.stage(Staged::Finalize(AesCcmFinalize { segment, mac })) else {
            return Err(Error::InternalError);
        };
        self.core.submit(cx, input.handle, PendingOp::new(input.operation), |driver, id, object, mem| {
            driver.finalize(id, object, direction, op, mem)
        })
    }
}

impl<D: AesCcmDriver> ServiceOperations for AesCcmService<D> {
    type Driver = D;

    fn core(&self) -> &ServiceCore<D> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ServiceCore<D> {
        &mut self.core
    }

    fn handle_operation(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()> {
        let status = match msg.msg_type() {
            tag::ONE_STEP_ENCRYPT => self.one_step(cx, msg, CipherDirection::Encrypt)?,
            tag::ONE_STEP_DECRYPT => self.one_step(cx, msg, CipherDirection::Decrypt)?,
            tag::SETUP_ENCRYPT => self.setup(cx, msg, CipherDirection::Encrypt)?,
            tag::SETUP_DECRYPT => self.setup(cx, msg, CipherDirection::Decrypt)?,
            tag::SET_LENGTHS => self.set_lengths(cx, msg)?,
            tag::SET_NONCE => self.set_nonce(cx, msg)?,
            tag::ADD_AAD => self.add_aad(cx, msg)?,
            tag::ADD_DATA => self.add_data(cx, msg)?,
            tag::FINALIZE_ENCRYPT => self.finalize(cx, msg, CipherDirection::Encrypt)?,
            tag::FINALIZE_DECRYPT => self.finalize(cx, msg, CipherDirection::Decrypt)?,
            _ => return Err(Error::UnknownMessageType),
        };
        reply_status(msg, status)
    }
}
