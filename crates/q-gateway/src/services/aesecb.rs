// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! AES-ECB service

use q_common::types::{Addr, ServiceId, Span};
use q_common::{Error, Result, ServiceConfig};
use q_hal::attribution::AccessKind;
use q_hal::ops::{AesEcbOperation, CipherDirection};
use q_hal::traits::{AesEcbDriver, DriverStatus};

use crate::copy::{copy_input_key, CopyContext};
use crate::service::{reply_status, BoundaryContext, PendingOp, Scratch, ServiceCore, ServiceOperations};
use crate::transport::Message;
use crate::wire::{EcbOperationWire, KeyMsg, OperationMsg, StatusReply, WireStruct};

/// AES-ECB message tags
pub mod tag {
    /// Encrypt whole blocks in one call
    pub const ONE_STEP_ENCRYPT: u32 = 0x10;
    /// Decrypt whole blocks in one call
    pub const ONE_STEP_DECRYPT: u32 = 0x11;
    /// Start a segmented encryption
    pub const SETUP_ENCRYPT: u32 = 0x12;
    /// Start a segmented decryption
    pub const SETUP_DECRYPT: u32 = 0x13;
    /// Process a segment
    pub const ADD_DATA: u32 = 0x14;
    /// Process the last segment
    pub const FINALIZE: u32 = 0x15;
}

/// Copy an ECB descriptor; the key is only read for one-step operations
fn copy_operation(cx: &CopyContext<'_>, addr: Addr, with_key: bool) -> Result<AesEcbOperation> {
    let wire: EcbOperationWire = cx.fetch(addr, AccessKind::Read)?;
    let key = if with_key {
        Some(copy_input_key(cx, wire.key)?)
    } else {
        None
    };
    cx.readable(Span::new(wire.input, wire.length))?;
    cx.writable(Span::new(wire.output, wire.length))?;
    Ok(AesEcbOperation {
        key,
        input: wire.input,
        output: wire.output,
        length: wire.length,
    })
}

/// AES-ECB boundary service
pub struct AesEcbService<D: AesEcbDriver> {
    core: ServiceCore<D>,
    scratch: Scratch<AesEcbOperation>,
}

impl<D: AesEcbDriver> AesEcbService<D> {
    /// Service over `driver`
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `config` exceeds the limits.
    pub fn new(driver: D, config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            core: ServiceCore::new(ServiceId::AesEcb, driver, config, 1)?,
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
        let op = self.scratch.stage(copy_operation(&cx.copy(), input.operation, true)?);
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

    fn segment(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>, last: bool) -> Result<DriverStatus> {
        let input: OperationMsg = msg.read_input(StatusReply::SIZE)?;
        let op = self.scratch.stage(copy_operation(&cx.copy(), input.operation, false)?);
        self.core.submit(cx, input.handle, PendingOp::new(input.operation), |driver, id, object, mem| {
            if last {
                driver.finalize(id, object, op, mem)
            } else {
                driver.add_data(id, object, op, mem)
            }
        })
    }
}

impl<D: AesEcbDriver> ServiceOperations for AesEcbService<D> {
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
            tag::ADD_DATA => self.segment(cx, msg, false)?,
            tag::FINALIZE => self.segment(cx, msg, true)?,
            _ => return Err(Error::UnknownMessageType),
        };
        reply_status(msg, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::OperationState;
    use crate::service::{tag as lifecycle, CryptoService};
    use crate::testing::{Harness, NS, NS_CLIENT, SECURE};
    use crate::wire::ConstructMsg;
    use q_common::constants::{DRIVER_STATUS_SUCCESS, MAX_STATIC_INSTANCES};
    use q_common::types::{OpaqueHandle, ReturnBehavior};
    use q_hal::ops::KeyEncoding;
    use q_hal::sim::SimAesEcb;

    const KEY: u32 = NS + 0x100;
    const KEY_STRUCT: u32 = NS + 0x120;
    const INPUT: u32 = NS + 0x140;
    const OUTPUT: u32 = NS + 0x160;
    const OP: u32 = NS + 0x180;

    const FIPS_ZERO_BLOCK: [u8; 16] = [
        0x66, 0xe9, 0x4b, 0xd4, 0xef, 0x8a, 0x2c, 0x3b, 0x88, 0x4c, 0xfa, 0x59, 0xca, 0x34, 0x2b, 0x2e,
    ];

    fn service() -> AesEcbService<SimAesEcb> {
        AesEcbService::new(SimAesEcb::new(), ServiceConfig::new(1, 2)).unwrap()
    }

    fn open_polling(h: &mut Harness, svc: &mut AesEcbService<SimAesEcb>) -> OpaqueHandle {
        let (config, params) = h.put_open_args(NS + 0x400, ReturnBehavior::Polling as u32);
        h.handle(svc, lifecycle::CONSTRUCT, NS_CLIENT, &ConstructMsg { config, params })
            .unwrap()
    }

    fn put_operation(h: &mut Harness, output: u32) {
        h.put_key(KEY_STRUCT, KeyEncoding::Plaintext, KEY, 16);
        h.put_struct(
            OP,
            &EcbOperationWire {
                key: Addr(KEY_STRUCT),
                input: Addr(INPUT),
                output: Addr(output),
                length: 16,
            },
        );
    }

    #[test]
    fn test_one_step_encrypt_known_answer() {
        let mut h = Harness::new();
        let mut svc = service();
        let handle = open_polling(&mut h, &mut svc);
        put_operation(&mut h, OUTPUT);

        let msg = OperationMsg {
            handle,
            operation: Addr(OP),
        };
        let status = h.status(&mut svc, tag::ONE_STEP_ENCRYPT, NS_CLIENT, &msg);
        assert_eq!(status, Ok(DRIVER_STATUS_SUCCESS));
        assert_eq!(h.get(OUTPUT, 16), &FIPS_ZERO_BLOCK);
        assert_eq!(svc.state(handle), Some(OperationState::ImmediateReturn));
    }

    #[test]
    fn test_secure_output_rejected_before_driver() {
        let mut h = Harness::new();
        let mut svc = service();
        let handle = open_polling(&mut h, &mut svc);
        put_operation(&mut h, SECURE);

        let msg = OperationMsg {
            handle,
            operation: Addr(OP),
        };
        assert_eq!(
            h.status(&mut svc, tag::ONE_STEP_ENCRYPT, NS_CLIENT, &msg),
            Err(Error::WriteAccessDenied)
        );
        assert_eq!(svc.state(handle), Some(OperationState::Idle));
        assert_eq!(h.get(SECURE, 16), &[0u8; 16]);
    }

    #[test]
    fn test_segmented_round_trip() {
        let mut h = Harness::new();
        let mut svc = service();
        let handle = open_polling(&mut h, &mut svc);
        put_operation(&mut h, OUTPUT);

        let key = KeyMsg {
            handle,
            key: Addr(KEY_STRUCT),
        };
        let segment = OperationMsg {
            handle,
            operation: Addr(OP),
        };
        assert_eq!(h.status(&mut svc, tag::SETUP_ENCRYPT, NS_CLIENT, &key), Ok(0));
        assert_eq!(h.status(&mut svc, tag::FINALIZE, NS_CLIENT, &segment), Ok(0));
        assert_eq!(h.get(OUTPUT, 16), &FIPS_ZERO_BLOCK);
    }

    #[test]
    fn test_unknown_tag_and_short_output() {
        let mut h = Harness::new();
        let mut svc = service();
        let handle = open_polling(&mut h, &mut svc);
        let msg = OperationMsg {
            handle,
            operation: Addr(OP),
        };
        assert_eq!(h.status(&mut svc, 0x3F, NS_CLIENT, &msg), Err(Error::UnknownMessageType));
        let mut short = [0u8; 2];
        assert_eq!(
            h.call(&mut svc, tag::ONE_STEP_ENCRYPT, NS_CLIENT, &msg, &mut short),
            Err(Error::InvalidMessageSize)
        );
    }

    #[test]
    fn test_static_count_bounded() {
        assert!(AesEcbService::new(SimAesEcb::new(), ServiceConfig::new(MAX_STATIC_INSTANCES as u8 + 1, 0)).is_err());
    }
}
