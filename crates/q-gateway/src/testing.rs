// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Unit test harness shared by the service modules

use q_common::log::{LogBuffer, LogLevel};
use q_common::types::{Addr, ClientOrigin, OpaqueHandle};
use q_common::Result;
use q_hal::attribution::{AttributionMap, AttributionRegion, UnprivilegedAccess};
use q_hal::ops::KeyEncoding;
use q_hal::sim::SimMemory;
use q_hal::traits::AddressSpace;

use crate::completion::CompletionChannel;
use crate::service::{BoundaryContext, CryptoService};
use crate::transport::Message;
use crate::validator::BoundaryValidator;
use crate::wire::{ConfigWire, HandleReply, HwAttrsWire, KeyWire, ParamsWire, WireStruct, MAX_WIRE_SIZE};

/// Start of non-secure RAM
pub const NS: u32 = 0x2000_0000;
/// Non-secure RAM the caller may only read, the top of the window
pub const NS_READ_ONLY: u32 = NS + 0xC00;
/// Start of secure RAM, just past the non-secure window
pub const SECURE: u32 = 0x2000_1000;
/// Non-secure caller
pub const NS_CLIENT: i32 = -1;
/// Secure caller
pub const S_CLIENT: i32 = 1;

pub struct Harness {
    pub mem: SimMemory<0x2000>,
    pub validator: BoundaryValidator,
    pub doorbells: CompletionChannel,
    pub log: LogBuffer,
    sequence: u32,
}

impl Harness {
    pub fn new() -> Self {
        let mut map = AttributionMap::new();
        map.add_region(AttributionRegion::non_secure(NS, NS_READ_ONLY - NS, UnprivilegedAccess::ReadWrite).unwrap())
            .unwrap();
        map.add_region(
            AttributionRegion::non_secure(NS_READ_ONLY, SECURE - NS_READ_ONLY, UnprivilegedAccess::ReadOnly).unwrap(),
        )
        .unwrap();
        Self {
            mem: SimMemory::new(NS),
            validator: BoundaryValidator::new(map),
            doorbells: CompletionChannel::new(),
            log: LogBuffer::new(LogLevel::Debug),
            sequence: 0,
        }
    }

    pub fn put(&mut self, addr: u32, bytes: &[u8]) {
        self.mem.write(Addr(addr), bytes).unwrap();
    }

    pub fn put_struct<T: WireStruct>(&mut self, addr: u32, value: &T) {
        let mut bytes = [0u8; MAX_WIRE_SIZE];
        value.encode(&mut bytes[..T::SIZE]).unwrap();
        self.put(addr, &bytes[..T::SIZE]);
    }

    pub fn get(&self, addr: u32, len: usize) -> &[u8] {
        self.mem.bytes(Addr(addr), len).unwrap()
    }

    /// Plaintext key structure at `addr` naming `len` bytes at `material`
    pub fn put_key(&mut self, addr: u32, encoding: KeyEncoding, material: u32, len: u32) {
        self.put_struct(
            addr,
            &KeyWire {
                encoding: encoding as u32,
                material: Addr(material),
                key_id: 0,
                length: len,
            },
        );
    }

    /// Config and params for `behavior` at `addr`, returns (config, params)
    pub fn put_open_args(&mut self, addr: u32, behavior: u32) -> (Addr, Addr) {
        self.put_struct(
            addr,
            &ConfigWire {
                object: Addr(addr + 0x40),
                hw_attrs: Addr(addr + 0x10),
            },
        );
        self.put_struct(addr + 0x10, &HwAttrsWire { int_priority: 3 });
        self.put_struct(
            addr + 0x20,
            &ParamsWire {
                return_behavior: behavior,
                callback: 0,
                timeout: u32::MAX,
                custom: 0,
            },
        );
        (Addr(addr), Addr(addr + 0x20))
    }

    pub fn call<T: WireStruct>(
        &mut self,
        service: &mut dyn CryptoService,
        msg_type: u32,
        client_id: i32,
        input: &T,
        output: &mut [u8],
    ) -> Result<()> {
        let mut bytes = [0u8; MAX_WIRE_SIZE];
        input.encode(&mut bytes[..T::SIZE]).unwrap();
        self.sequence += 1;
        let mut msg = Message::new(msg_type, client_id, &bytes[..T::SIZE], output);
        let mut cx = BoundaryContext {
            mem: &mut self.mem,
            validator: &self.validator,
            doorbells: &mut self.doorbells,
            log: &mut self.log,
            sequence: self.sequence,
            origin: ClientOrigin::from_client_id(client_id),
        };
        service.handle_message(&mut cx, &mut msg)
    }

    /// Call expecting a status reply, returns the driver status
    pub fn status<T: WireStruct>(
        &mut self,
        service: &mut dyn CryptoService,
        msg_type: u32,
        client_id: i32,
        input: &T,
    ) -> Result<i32> {
        let mut out = [0u8; 4];
        self.call(service, msg_type, client_id, input, &mut out)?;
        Ok(i32::from_le_bytes(out))
    }

    /// Call expecting a handle reply
    pub fn handle<T: WireStruct>(
        &mut self,
        service: &mut dyn CryptoService,
        msg_type: u32,
        client_id: i32,
        input: &T,
    ) -> Result<OpaqueHandle> {
        let mut out = [0u8; 4];
        self.call(service, msg_type, client_id, input, &mut out)?;
        Ok(HandleReply::decode(&out)?.handle)
    }

    pub fn interrupt(&mut self, service: &mut dyn CryptoService) -> usize {
        let mut cx = BoundaryContext {
            mem: &mut self.mem,
            validator: &self.validator,
            doorbells: &mut self.doorbells,
            log: &mut self.log,
            sequence: self.sequence,
            origin: ClientOrigin::Secure,
        };
        service.service_interrupt(&mut cx)
    }
}
