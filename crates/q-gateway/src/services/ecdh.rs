// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! ECDH service
//!
//! Both operations produce a key into a blank caller key structure. Its
//! updated encoding is written back when the driver finishes: inside the
//! call for polling instances, from the completion otherwise.

use q_common::constants::DRIVER_STATUS_SUCCESS;
use q_common::types::{Addr, OpaqueHandle, ServiceId};
use q_common::{Error, Result, ServiceConfig};
use q_hal::attribution::AccessKind;
use q_hal::ops::{CryptoKey, EcdhComputeSharedSecret, EcdhCurve, EcdhGeneratePublicKey};
use q_hal::traits::{DriverStatus, EcdhDriver};

use crate::copy::{copy_input_key, copy_output_key, write_back_key};
use crate::service::{reply_status, BoundaryContext, PendingOp, Scratch, ServiceCore, ServiceOperations};
use crate::transport::Message;
use crate::wire::{EcdhGenPublicWire, EcdhSharedSecretWire, OperationMsg, StatusReply, WireStruct};

/// ECDH message tags
pub mod tag {
    /// Derive a public key
    pub const GENERATE_PUBLIC_KEY: u32 = 0x10;
    /// Derive a shared secret
    pub const COMPUTE_SHARED_SECRET: u32 = 0x11;
}

enum Staged {
    PublicKey(EcdhGeneratePublicKey),
    SharedSecret(EcdhComputeSharedSecret),
}

/// ECDH boundary service
pub struct EcdhService<D: EcdhDriver> {
    core: ServiceCore<D>,
    scratch: Scratch<Staged>,
}

impl<D: EcdhDriver> EcdhService<D> {
    /// Service over `driver`
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `config` exceeds the limits.
    pub fn new(driver: D, config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            core: ServiceCore::new(ServiceId::Ecdh, driver, config, 1)?,
            scratch: Scratch::new(),
        })
    }

    /// Copy a key produced inside the call back to the caller
    fn finish(
        &self,
        cx: &mut BoundaryContext<'_>,
        handle: OpaqueHandle,
        status: DriverStatus,
        key_addr: Addr,
        key: &CryptoKey,
    ) -> Result<DriverStatus> {
        if status == DRIVER_STATUS_SUCCESS && !self.core.is_async(handle) {
            write_back_key(&mut *cx.mem, key_addr, key)?;
        }
        Ok(status)
    }

    fn generate_public_key(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: OperationMsg = msg.read_input(StatusReply::SIZE)?;
        let copy = cx.copy();
        let wire: EcdhGenPublicWire = copy.fetch(input.operation, AccessKind::Read)?;
        let curve = EcdhCurve::from_u32(wire.curve).ok_or(Error::InvalidParameter)?;
        let op = EcdhGeneratePublicKey {
            curve,
            private_key: copy_input_key(&copy, wire.private_key)?,
            public_key: copy_output_key(&copy, wire.public_key)?,
        };
        let Staged::PublicKey(op) = self.scratch.stage(Staged::PublicKey(op)) else {
            return Err(Error::InternalError);
        };
        let pending = PendingOp::new(input.operation).with_key_writeback(wire.public_key);
        let status = self.core.submit(cx, input.handle, pending, |driver, id, object, mem| {
            driver.generate_public_key(id, object, op, mem)
        })?;
        let produced = op.public_key;
        self.finish(cx, input.handle, status, wire.public_key, &produced)
    }

    fn compute_shared_secret(&mut self, cx: &mut BoundaryContext<'_>, msg: &Message<'_>) -> Result<DriverStatus> {
        let input: OperationMsg = msg.read_input(StatusReply::SIZE)?;
        let copy = cx.copy();
        let wire: EcdhSharedSecretWire = copy.fetch(input.operation, AccessKind::Read)?;
        let curve = EcdhCurve::from_u32(wire.curve).ok_or(Error::InvalidParameter)?;
        let op = EcdhComputeSharedSecret {
            curve,
            private_key: copy_input_key(&copy, wire.private_key)?,
            their_public_key: copy_input_key(&copy, wire.their_public_key)?,
            shared_secret: copy_output_key(&copy, wire.shared_secret)?,
        };
        let Staged::SharedSecret(op) = self.scratch.stage(Staged::SharedSecret(op)) else {
            return Err(Error::InternalError);
        };
        let pending = PendingOp::new(input.operation).with_key_writeback(wire.shared_secret);
        let status = self.core.submit(cx, input.handle, pending, |driver, id, object, mem| {
            driver.compute_shared_secret(id, object, op, mem)
        })?;
        let produced = op.shared_secret;
        self.finish(cx, input.handle, status, wire.shared_secret, &produced)
    }
}

impl<D: EcdhDriver> ServiceOperations for EcdhService<D> {
    type Driver = D;

    fn core(&self) -> &ServiceCore<D> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ServiceCore<D> {
        &mut self.core
    }

    fn handle_operation(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()> {
        let status = match msg.msg_type() {
            tag::GENERATE_PUBLIC_KEY => self.generate_public_key(cx, msg)?,
            tag::COMPUTE_SHARED_SECRET => self.compute_shared_secret(cx, msg)?,
            _ => return Err(Error::UnknownMessageType),
        };
        reply_status(msg, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tag as lifecycle;
    use crate::testing::{Harness, NS, NS_CLIENT};
    use crate::wire::{ConstructMsg, KeyWire};
    use q_common::types::ReturnBehavior;
    use q_hal::ops::KeyEncoding;
    use q_hal::sim::SimEcdh;

    const ALICE: u32 = NS + 0x100;
    const BOB: u32 = NS + 0x120;
    const ALICE_KEY: u32 = NS + 0x140;
    const BOB_KEY: u32 = NS + 0x150;
    const ALICE_PUB: u32 = NS + 0x180;
    const ALICE_PUB_KEY: u32 = NS + 0x1D0;
    const BOB_PUB: u32 = NS + 0x200;
    const BOB_PUB_KEY: u32 = NS + 0x250;
    const SECRET_A: u32 = NS + 0x280;
    const SECRET_A_KEY: u32 = NS + 0x2A0;
    const SECRET_B: u32 = NS + 0x2C0;
    const SECRET_B_KEY: u32 = NS + 0x2E0;
    const OP: u32 = NS + 0x300;

    fn setup() -> (Harness, EcdhService<SimEcdh>, OpaqueHandle) {
        let mut h = Harness::new();
        let mut svc = EcdhService::new(SimEcdh::new(), ServiceConfig::new(0, 1)).unwrap();
        let (config, params) = h.put_open_args(NS + 0x400, ReturnBehavior::Polling as u32);
        let handle = h
            .handle(&mut svc, lifecycle::CONSTRUCT, NS_CLIENT, &ConstructMsg { config, params })
            .unwrap();
        let mut alice = [0u8; 32];
        alice[31] = 7;
        let mut bob = [0u8; 32];
        bob[31] = 11;
        h.put(ALICE, &alice);
        h.put(BOB, &bob);
        h.put_key(ALICE_KEY, KeyEncoding::Plaintext, ALICE, 32);
        h.put_key(BOB_KEY, KeyEncoding::Plaintext, BOB, 32);
        (h, svc, handle)
    }

    fn public_key(h: &mut Harness, svc: &mut EcdhService<SimEcdh>, handle: OpaqueHandle, private: u32, out: u32, out_key: u32) {
        h.put_key(out_key, KeyEncoding::BlankPlaintext, out, 65);
        h.put_struct(
            OP,
            &EcdhGenPublicWire {
                curve: EcdhCurve::NistP256 as u32,
                private_key: Addr(private),
                public_key: Addr(out_key),
            },
        );
        let msg = OperationMsg {
            handle,
            operation: Addr(OP),
        };
        assert_eq!(h.status(svc, tag::GENERATE_PUBLIC_KEY, NS_CLIENT, &msg), Ok(0));
    }

    fn shared(h: &mut Harness, svc: &mut EcdhService<SimEcdh>, handle: OpaqueHandle, private: u32, peer: u32, out: u32, out_key: u32) {
        h.put_key(out_key, KeyEncoding::BlankPlaintext, out, 32);
        h.put_struct(
            OP,
            &EcdhSharedSecretWire {
                curve: EcdhCurve::NistP256 as u32,
                private_key: Addr(private),
                their_public_key: Addr(peer),
                shared_secret: Addr(out_key),
            },
        );
        let msg = OperationMsg {
            handle,
            operation: Addr(OP),
        };
        assert_eq!(h.status(svc, tag::COMPUTE_SHARED_SECRET, NS_CLIENT, &msg), Ok(0));
    }

    #[test]
    fn test_public_key_encoding_written_back() {
        let (mut h, mut svc, handle) = setup();
        public_key(&mut h, &mut svc, handle, ALICE_KEY, ALICE_PUB, ALICE_PUB_KEY);
        let key = KeyWire::decode(h.get(ALICE_PUB_KEY, KeyWire::SIZE)).unwrap();
        assert_eq!(key.encoding, KeyEncoding::Plaintext as u32);
        assert_eq!(h.get(ALICE_PUB, 1), &[0x04]);
    }

    #[test]
    fn test_shared_secret_agrees() {
        let (mut h, mut svc, handle) = setup();
        public_key(&mut h, &mut svc, handle, ALICE_KEY, ALICE_PUB, ALICE_PUB_KEY);
        public_key(&mut h, &mut svc, handle, BOB_KEY, BOB_PUB, BOB_PUB_KEY);
        shared(&mut h, &mut svc, handle, ALICE_KEY, BOB_PUB_KEY, SECRET_A, SECRET_A_KEY);
        shared(&mut h, &mut svc, handle, BOB_KEY, ALICE_PUB_KEY, SECRET_B, SECRET_B_KEY);
        let mut a = [0u8; 32];
        a.copy_from_slice(h.get(SECRET_A, 32));
        assert_eq!(h.get(SECRET_B, 32), &a);
        assert_ne!(a, [0u8; 32]);
    }

    #[test]
    fn test_unknown_curve_rejected() {
        let (mut h, mut svc, handle) = setup();
        h.put_key(ALICE_PUB_KEY, KeyEncoding::BlankPlaintext, ALICE_PUB, 65);
        h.put_struct(
            OP,
            &EcdhGenPublicWire {
                curve: 0x99,
                private_key: Addr(ALICE_KEY),
                public_key: Addr(ALICE_PUB_KEY),
            },
        );
        let msg = OperationMsg {
            handle,
            operation: Addr(OP),
        };
        assert_eq!(
            h.status(&mut svc, tag::GENERATE_PUBLIC_KEY, NS_CLIENT, &msg),
            Err(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_filled_output_key_rejected() {
        let (mut h, mut svc, handle) = setup();
        h.put_struct(
            OP,
            &EcdhGenPublicWire {
                curve: EcdhCurve::NistP256 as u32,
                private_key: Addr(ALICE_KEY),
                public_key: Addr(BOB_KEY),
            },
        );
        let msg = OperationMsg {
            handle,
            operation: Addr(OP),
        };
        assert_eq!(
            h.status(&mut svc, tag::GENERATE_PUBLIC_KEY, NS_CLIENT, &msg),
            Err(Error::InvalidKeyEncoding)
        );
    }
}
