// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! SHA-2 service
//!
//! Digest and HMAC outputs are validated for the digest length of the hash
//! variant the instance is currently set to.

use q_common::constants::DRIVER_STATUS_SUCCESS;
use q_common::types::{Addr, OpaqueHandle, ServiceId, Span};
use q_common::{Error, Result, ServiceConfig};
use q_hal::ops::HashType;
use q_hal::traits::{DriverStatus, Sha2Driver};

use crate::copy::copy_input_key;
use crate::service::{reply_status, BoundaryContext, PendingOp, ServiceCore, ServiceOperations};
use crate::transport::Message;
use crate::wire::{BufferMsg, DigestMsg, HandleMsg, HashDataMsg, HmacMsg, KeyMsg, SetHashTypeMsg, StatusReply, WireStruct};

/// SHA-2 message tags
pub mod tag {
    /// Hash a buffer in one call
    pub const HASH_DATA: u32 = 0x10;
    /// HMAC a buffer in one call
    pub const HMAC: u32 = 0x11;
    /// Select the hash variant
    pub const SET_HASH_TYPE: u32 = 0x12;
    /// Start a segmented HMAC
    pub const SETUP_HMAC: u32 = 0x13;
    /// Absorb a segment
    pub const ADD_DATA: u32 = 0x14;
    /// Finish a segmented hash
    pub const FINALIZE: u32 = 0x15;
    /// Finish a segmented HMAC
    pub const FINALIZE_HMAC: u32 = 0x16;
    /// Discard segmented state
    pub const RESET: u32 = 0x17;
}

/// SHA-2 boundary service
pub struct Sha2Service<D: Sha2Driver> {
    core: ServiceCore<D>,
}

impl<D: Sha2Driver> Sha2Service<D> {
    /// Service over `driver`
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `config` exceeds the limits.
    pub fn new(driver: D, config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            core: ServiceCore::new(ServiceId::Sha2, driver, config, 1)?,
        })
    }

    /// Hash variant an instance is set to
    ///
    /// # Errors
    /// Returns [`Error::InvalidHandle`] if `handle` does not resolve.
    pub fn hash_type(&self, handle: OpaqueHandle) -> Result<HashType> {
        let instance = self.core.instance(handle)?;
        Ok(self.core.driver().hash_type(&instance.object))
    }

    fn digest_span(&self, handle: OpaqueHandle, digest: Addr) -> Result<Span> {
        Ok(Span::new(digest, self.hash_type(handle)?.digest_len()))
    }

    fn hash_data(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: HashDataMsg = msg.read_input(StatusReply::SIZE)?;
        let data = Span::new(input.data, input.length);
        cx.readable(data)?;
        cx.writable(self.digest_span(input.handle, input.digest)?)?;
        self.core.submit(cx, input.handle, PendingOp::new(input.digest), |driver, id, object, mem| {
            driver.hash_data(id, object, data, input.digest, mem)
        })
    }

    fn hmac(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: HmacMsg = msg.read_input(StatusReply::SIZE)?;
        let key = copy_input_key(&cx.copy(), input.key)?;
        let data = Span::new(input.data, input.length);
        cx.readable(data)?;
        cx.writable(self.digest_span(input.handle, input.mac)?)?;
        self.core.submit(cx, input.handle, PendingOp::new(input.mac), |driver, id, object, mem| {
            driver.hmac(id, object, &key, data, input.mac, mem)
        })
    }

    fn set_hash_type(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: SetHashTypeMsg = msg.read_input(StatusReply::SIZE)?;
        let hash_type = HashType::from_u32(input.hash_type).ok_or(Error::InvalidParameter)?;
        self.core.control(cx, input.handle, |driver, id, object, _| {
            driver.set_hash_type(id, object, hash_type)
        })
    }

    fn setup_hmac(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: KeyMsg = msg.read_input(StatusReply::SIZE)?;
        let key = copy_input_key(&cx.copy(), input.key)?;
        self.core.control(cx, input.handle, |driver, id, object, mem| {
            driver.setup_hmac(id, object, &key, mem)
        })
    }

    fn add_data(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: BufferMsg = msg.read_input(StatusReply::SIZE)?;
        let data = Span::new(input.buffer, input.length);
        cx.readable(data)?;
        self.core.submit(cx, input.handle, PendingOp::new(input.buffer), |driver, id, object, mem| {
            driver.add_data(id, object, data, mem)
        })
    }

    fn finalize(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>, hmac: bool) -> Result<DriverStatus> {
        let input: DigestMsg = msg.read_input(StatusReply::SIZE)?;
        cx.writable(self.digest_span(input.handle, input.digest)?)?;
        self.core.submit(cx, input.handle, PendingOp::new(input.digest), |driver, id, object, mem| {
            if hmac {
                driver.finalize_hmac(id, object, input.digest, mem)
            } else {
                driver.finalize(id, object, input.digest, mem)
            }
        })
    }

    fn reset(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: HandleMsg = msg.read_input(StatusReply::SIZE)?;
        self.core.control(cx, input.handle, |driver, id, object, _| {
            driver.reset(id, object);
            DRIVER_STATUS_SUCCESS
        })
    }
}

impl<D: Sha2Driver> ServiceOperations for Sha2Service<D> {
    type Driver = D;

    fn core(&self) -> &ServiceCore<D> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ServiceCore<D> {
        &mut self.core
    }

    fn handle_operation(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()> {
        let status = match msg.msg_type() {
            tag::HASH_DATA => self.hash_data(cx, msg)?,
            tag::HMAC => self.hmac(cx, msg)?,
            tag::SET_HASH_TYPE => self.set_hash_type(cx, msg)?,
            tag::SETUP_HMAC => self.setup_hmac(cx, msg)?,
            tag::ADD_DATA => self.add_data(cx, msg)?,
            tag::FINALIZE => self.finalize(cx, msg, false)?,
            tag::FINALIZE_HMAC => self.finalize(cx, msg, true)?,
            tag::RESET => self.reset(cx, msg)?,
            _ => return Err(Error::UnknownMessageType),
        };
        reply_status(msg, status)
    }
}
