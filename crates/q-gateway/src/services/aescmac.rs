// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! AES-CMAC service
//!
//! The tag buffer is only named by one-step operations and finalize. Its
//! direction follows the operation: written when signing, read when
//! verifying. For finalize the direction is the one the driver holds from
//! setup.

use q_common::types::{OpaqueHandle, ServiceId, Span};
use q_common::{Error, Result, ServiceConfig};
use q_hal::attribution::AccessKind;
use q_hal::ops::{AesCmacOperation, CryptoKey, MacDirection};
use q_hal::traits::{AesCmacDriver, DriverStatus};

use crate::copy::{copy_input_key, CopyContext};
use crate::service::{reply_status, BoundaryContext, PendingOp, Scratch, ServiceCore, ServiceOperations};
use crate::transport::Message;
use crate::wire::{CmacOperationWire, KeyMsg, OperationMsg, StatusReply, WireStruct};

/// AES-CMAC message tags
pub mod tag {
    /// Sign in one call
    pub const ONE_STEP_SIGN: u32 = 0x10;
    /// Verify in one call
    pub const ONE_STEP_VERIFY: u32 = 0x11;
    /// Start a segmented signature
    pub const SETUP_SIGN: u32 = 0x12;
    /// Start a segmented verification
    pub const SETUP_VERIFY: u32 = 0x13;
    /// Absorb a segment
    pub const ADD_DATA: u32 = 0x14;
    /// Absorb the last segment and sign or verify
    pub const FINALIZE: u32 = 0x15;
}

/// Copy a CMAC descriptor, checking the tag only when `mac` is given
fn copy_operation(
    cx: &CopyContext<'_>,
    wire: &CmacOperationWire,
    mac: Option<MacDirection>,
) -> Result<AesCmacOperation> {
    cx.readable(Span::new(wire.input, wire.length))?;
    let tag = Span::new(wire.mac, wire.mac_len);
    match mac {
        Some(MacDirection::Sign) => cx.writable(tag)?,
        Some(MacDirection::Verify) => cx.readable(tag)?,
        None => {}
    }
    Ok(AesCmacOperation {
        input: wire.input,
        length: wire.length,
        mac: if mac.is_some() { tag } else { Span::EMPTY },
    })
}

/// AES-CMAC boundary service
pub struct AesCmacService<D: AesCmacDriver> {
    core: ServiceCore<D>,
    scratch: Scratch<(AesCmacOperation, Option<CryptoKey>)>,
}

impl<D: AesCmacDriver> AesCmacService<D> {
    /// Service over `driver`
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `config` exceeds the limits.
    pub fn new(driver: D, config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            core: ServiceCore::new(ServiceId::AesCmac, driver, config, 1)?,
            scratch: Scratch::new(),
        })
    }

    /// Direction of the segmented operation open on `handle`
    ///
    /// # Errors
    /// Returns [`Error::InvalidHandle`] if `handle` does not resolve.
    pub fn direction(&self, handle: OpaqueHandle) -> Result<Option<MacDirection>> {
        let instance = self.core.instance(handle)?;
        Ok(self.core.driver().direction(&instance.object))
    }

    fn one_step(
        &mut self,
        cx: &mut BoundaryContext<'_>,
        msg: &Message<'_>,
        direction: MacDirection,
    ) -> Result<DriverStatus> {
        let input: OperationMsg = msg.read_input(StatusReply::SIZE)?;
        let copy = cx.copy();
        let wire: CmacOperationWire = copy.fetch(input.operation, AccessKind::Read)?;
        let key = copy_input_key(&copy, wire.key)?;
        let op = copy_operation(&copy, &wire, Some(direction))?;
        let (op, key) = self.scratch.stage((op, Some(key)));
        let key = key.as_ref().ok_or(Error::InternalError)?;
        self.core.submit(cx, input.handle, PendingOp::new(input.operation), |driver, id, object, mem| {
            driver.one_step(id, object, direction, op, key, mem)
        })
    }

    fn setup(
        &mut self,
        cx: &mut BoundaryContext<'_>,
        msg: &Message<'_>,
        direction: MacDirection,
    ) -> Result<DriverStatus> {
        let input: KeyMsg = msg.read_input(StatusReply::SIZE)?;
        let key = copy_input_key(&cx.copy(), input.key)?;
        self.core
            .control(cx, input.handle, |driver, id, object, _| driver.setup(id, object, direction, &key))
    }

    fn segment(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>, last: bool) -> Result<DriverStatus> {
        let input: OperationMsg = msg.read_input(StatusReply::SIZE)?;
        let mac = if last {
            // Without a setup the driver refuses; hold the tag to the stricter check
            Some(self.direction(input.handle)?.unwrap_or(MacDirection::Sign))
        } else {
            None
        };
        let copy = cx.copy();
        let wire: CmacOperationWire = copy.fetch(input.operation, AccessKind::Read)?;
        let op = copy_operation(&copy, &wire, mac)?;
        let (op, _) = self.scratch.stage((op, None));
        self.core.submit(cx, input.handle, PendingOp::new(input.operation), |driver, id, object, mem| {
            if last {
                driver.finalize(id, object, op, mem)
            } else {
                driver.add_data(id, object, op, mem)
            }
        })
    }
}

impl<D: AesCmacDriver> ServiceOperations for AesCmacService<D> {
    type Driver = D;

    fn core(&self) -> &ServiceCore<D> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ServiceCore<D> {
        &mut self.core
    }

    fn handle_operation(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()> {
        let status = match msg.msg_type() {
            tag::ONE_STEP_SIGN => self.one_step(cx, msg, MacDirection::Sign)?,
            tag::ONE_STEP_VERIFY => self.one_step(cx, msg, MacDirection::Verify)?,
            tag::SETUP_SIGN => self.setup(cx, msg, MacDirection::Sign)?,
            tag::SETUP_VERIFY => self.setup(cx, msg, MacDirection::Verify)?,
            tag::ADD_DATA => self.segment(cx, msg, false)?,
            tag::FINALIZE => self.segment(cx, msg, true)?,
            _ => return Err(Error::UnknownMessageType),
        };
        reply_status(msg, status)
    }
}
