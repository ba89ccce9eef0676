// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! TRNG service
//!
//! Key generation and raw random bytes complete through separate records,
//! so an instance registers two: [`KEY_RECORD`] and [`BYTES_RECORD`].

use q_common::constants::DRIVER_STATUS_SUCCESS;
use q_common::types::{ServiceId, Span};
use q_common::{Error, Result, ServiceConfig};
use q_hal::ops::CryptoKey;
use q_hal::traits::{DriverStatus, TrngDriver};

use crate::copy::{copy_output_key, write_back_key};
use crate::service::{reply_status, BoundaryContext, PendingOp, Scratch, ServiceCore, ServiceOperations};
use crate::transport::Message;
use crate::wire::{BufferMsg, KeyMsg, StatusReply, WireStruct};

/// TRNG message tags
pub mod tag {
    /// Fill a blank key with entropy
    pub const GENERATE_KEY: u32 = 0x10;
    /// Fill a buffer with random bytes
    pub const GET_RANDOM_BYTES: u32 = 0x11;
}

/// Record kind reporting key generation
pub const KEY_RECORD: u8 = 0;
/// Record kind reporting random bytes
pub const BYTES_RECORD: u8 = 1;

/// TRNG boundary service
pub struct TrngService<D: TrngDriver> {
    core: ServiceCore<D>,
    scratch: Scratch<CryptoKey>,
}

impl<D: TrngDriver> TrngService<D> {
    /// Service over `driver`
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `config` exceeds the limits.
    pub fn new(driver: D, config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            core: ServiceCore::new(ServiceId::Trng, driver, config, 2)?,
            scratch: Scratch::new(),
        })
    }

    fn generate_key(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: KeyMsg = msg.read_input(StatusReply::SIZE)?;
        let key = self.scratch.stage(copy_output_key(&cx.copy(), input.key)?);
        let pending = PendingOp::new(input.key)
            .with_kind(KEY_RECORD)
            .with_key_writeback(input.key);
        let status = self.core.submit(cx, input.handle, pending, |driver, id, object, mem| {
            driver.generate_key(id, object, key, mem)
        })?;
        let produced = *key;
        if status == DRIVER_STATUS_SUCCESS && !self.core.is_async(input.handle) {
            write_back_key(&mut *cx.mem, input.key, &produced)?;
        }
        Ok(status)
    }

    fn get_random_bytes(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: BufferMsg = msg.read_input(StatusReply::SIZE)?;
        let out = Span::new(input.buffer, input.length);
        cx.writable(out)?;
        let pending = PendingOp::new(input.buffer).with_kind(BYTES_RECORD);
        self.core.submit(cx, input.handle, pending, |driver, id, object, mem| {
            driver.get_random_bytes(id, object, out, mem)
        })
    }
}

impl<D: TrngDriver> ServiceOperations for TrngService<D> {
    type Driver = D;

    fn core(&self) -> &ServiceCore<D> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ServiceCore<D> {
        &mut self.core
    }

    fn handle_operation(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()> {
        let status = match msg.msg_type() {
            tag::GENERATE_KEY => self.generate_key(cx, msg)?,
            tag::GET_RANDOM_BYTES => self.get_random_bytes(cx, msg)?,
            _ => return Err(Error::UnknownMessageType),
        };
        reply_status(msg, status)
    }
}
