// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Non-secure runtime
//!
//! The client half of the boundary. It marshals calls into messages, keeps
//! the per-instance state the secure side must not hold (requested return
//! behavior, application callback, completion records) and turns completion
//! records back into the behavior the application asked for:
//!
//! - **Polling**: the call returns the driver status directly
//! - **Blocking**: the call waits for the completion record and returns its
//!   status
//! - **Callback**: the call returns at once; [`NsClient::process_doorbells`]
//!   later runs the application callback with the completion
//!
//! Caller memory (argument blocks, instance storage and records) comes from
//! an arena in non-secure RAM.

use heapless::Vec;

use q_common::constants::{
    CALLBACK_RECORD_SIZE, DRIVER_STATUS_CANCELED, DRIVER_STATUS_SUCCESS, MAX_INSTANCES, MAX_SERVICES, PSA_SUCCESS,
};
use q_common::types::{Addr, OpaqueHandle, ReturnBehavior, ServiceId};
use q_common::Error;
use q_hal::traits::AddressSpace;

use crate::completion::CompletionRecord;
use crate::copy::WAIT_FOREVER;
use crate::gateway::Gateway;
use crate::service::tag;
use crate::services::trng;
use crate::transport::Message;
use crate::wire::{
    ConfigWire, ConstructMsg, DualRegisterCallbackMsg, HandleMsg, HandleReply, HwAttrsWire, OpenMsg, ParamsWire,
    RegisterCallbackMsg, StatusReply, WireStruct, MAX_WIRE_SIZE,
};

/// Caller storage reserved for a driver object
pub const OBJECT_STORAGE: u32 = 128;

/// Interrupt passes a blocking call waits before canceling
pub const MAX_BLOCKING_POLLS: u32 = 64;

const ARGS_SIZE: u32 = 64;
const INSTANCE_BLOCK: u32 = OBJECT_STORAGE + 2 * CALLBACK_RECORD_SIZE;
const MAX_CLIENT_INSTANCES: usize = MAX_SERVICES * MAX_INSTANCES;

/// Application callback run for a completed operation
pub type NsCallback = fn(&NsCompletion);

/// Errors seen by a non-secure client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsError {
    /// The secure side rejected the call with this PSA status
    Rejected(i32),
    /// The client could not issue the call
    Client(Error),
}

impl From<Error> for NsError {
    fn from(err: Error) -> Self {
        Self::Client(err)
    }
}

/// Result of a client call
pub type NsResult<T> = core::result::Result<T, NsError>;

/// Open parameters as the application sees them
#[derive(Debug, Clone, Copy)]
pub struct NsParams {
    /// Requested return behavior
    pub return_behavior: ReturnBehavior,
    /// Callback for [`ReturnBehavior::Callback`]
    pub callback: Option<NsCallback>,
    /// Blocking timeout, in interrupt passes; [`WAIT_FOREVER`] caps at
    /// [`MAX_BLOCKING_POLLS`]
    pub timeout: u32,
    /// Service-specific word (SHA-2: initial hash type)
    pub custom: u32,
}

impl NsParams {
    /// Parameters for `return_behavior` with no callback
    #[must_use]
    pub const fn new(return_behavior: ReturnBehavior) -> Self {
        Self {
            return_behavior,
            callback: None,
            timeout: WAIT_FOREVER,
            custom: 0,
        }
    }

    /// Callback behavior running `callback`
    #[must_use]
    pub const fn callback(callback: NsCallback) -> Self {
        Self {
            return_behavior: ReturnBehavior::Callback,
            callback: Some(callback),
            timeout: WAIT_FOREVER,
            custom: 0,
        }
    }
}

impl Default for NsParams {
    fn default() -> Self {
        Self::new(ReturnBehavior::Blocking)
    }
}

/// Completion of an asynchronous operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NsCompletion {
    /// Service that ran the operation
    pub service: ServiceId,
    /// Instance
    pub handle: OpaqueHandle,
    /// Driver status
    pub status: i32,
    /// Descriptor the operation was submitted with
    pub operation: Addr,
    /// Operation kind
    pub operation_type: u32,
    /// Service-specific word
    pub aux: u32,
}

struct NsInstance {
    service: ServiceId,
    handle: OpaqueHandle,
    params: NsParams,
    block: Addr,
    in_flight: [bool; 2],
    completed: [Option<NsCompletion>; 2],
}

impl NsInstance {
    fn record(&self, kind: u8) -> Addr {
        Addr(self.block.0 + OBJECT_STORAGE + u32::from(kind) * CALLBACK_RECORD_SIZE)
    }
}

/// Bump arena over a non-secure RAM window, with recycled instance blocks
///
/// At most `MAX_CLIENT_INSTANCES` blocks are handed out at once.
struct Arena {
    next: u32,
    end: u32,
    live: usize,
    free_blocks: Vec<Addr, MAX_CLIENT_INSTANCES>,
}

impl Arena {
    fn alloc(&mut self, len: u32) -> NsResult<Addr> {
        let start = (self.next + 3) & !3;
        let end = start.checked_add(len).ok_or(Error::AddressOverflow)?;
        if end > self.end {
            return Err(Error::ResourceExhausted.into());
        }
        self.next = end;
        Ok(Addr(start))
    }

    fn alloc_block(&mut self) -> NsResult<Addr> {
        if self.live == MAX_CLIENT_INSTANCES {
            return Err(Error::ResourceExhausted.into());
        }
        let block = match self.free_blocks.pop() {
            Some(block) => block,
            None => self.alloc(INSTANCE_BLOCK)?,
        };
        self.live += 1;
        Ok(block)
    }

    fn free_block(&mut self, block: Addr) {
        self.live = self.live.saturating_sub(1);
        // Live and free blocks together never exceed the list capacity
        let _ = self.free_blocks.push(block);
    }
}

/// Non-secure client bound to a gateway
pub struct NsClient<'g, 's, M: AddressSpace> {
    gateway: &'g mut Gateway<'s, M>,
    client_id: i32,
    arena: Arena,
    args: Addr,
    instances: Vec<NsInstance, MAX_CLIENT_INSTANCES>,
}

impl<'g, 's, M: AddressSpace> NsClient<'g, 's, M> {
    /// Client `client_id` (negative) using `len` bytes of non-secure RAM at
    /// `base` for its own structures
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] for a non-negative client id, or
    /// [`Error::ResourceExhausted`] if the window is too small.
    pub fn new(gateway: &'g mut Gateway<'s, M>, client_id: i32, base: Addr, len: u32) -> NsResult<Self> {
        if client_id >= 0 {
            return Err(Error::InvalidParameter.into());
        }
        let end = base.0.checked_add(len).ok_or(Error::AddressOverflow)?;
        let mut arena = Arena {
            next: base.0,
            end,
            live: 0,
            free_blocks: Vec::new(),
        };
        let args = arena.alloc(ARGS_SIZE)?;
        Ok(Self {
            gateway,
            client_id,
            arena,
            args,
            instances: Vec::new(),
        })
    }

    /// Gateway the client talks to
    pub fn gateway(&mut self) -> &mut Gateway<'s, M> {
        self.gateway
    }

    /// Non-secure memory
    pub fn memory(&mut self) -> &mut M {
        self.gateway.memory_mut()
    }

    /// Reserve `len` bytes of caller memory for application buffers
    ///
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] when the window is used up.
    pub fn alloc(&mut self, len: u32) -> NsResult<Addr> {
        self.arena.alloc(len)
    }

    /// Write a caller structure into non-secure memory
    ///
    /// # Errors
    /// Returns [`Error::MemoryFault`] if the bus write fails.
    pub fn put<T: WireStruct>(&mut self, addr: Addr, value: &T) -> NsResult<()> {
        let mut bytes = [0u8; MAX_WIRE_SIZE];
        let staged = bytes.get_mut(..T::SIZE).ok_or(Error::InternalError)?;
        value.encode(staged)?;
        self.gateway.memory_mut().write(addr, staged).map_err(Error::from)?;
        Ok(())
    }

    fn call<T: WireStruct>(&mut self, service: ServiceId, msg_type: u32, input: &T, output: &mut [u8]) -> NsResult<()> {
        let mut bytes = [0u8; MAX_WIRE_SIZE];
        let staged = bytes.get_mut(..T::SIZE).ok_or(Error::InternalError)?;
        input.encode(staged)?;
        let mut msg = Message::new(msg_type, self.client_id, staged, output);
        match self.gateway.call(service, &mut msg) {
            PSA_SUCCESS => Ok(()),
            status => Err(NsError::Rejected(status)),
        }
    }

    fn call_status<T: WireStruct>(&mut self, service: ServiceId, msg_type: u32, input: &T) -> NsResult<i32> {
        let mut out = [0u8; StatusReply::SIZE];
        self.call(service, msg_type, input, &mut out)?;
        Ok(StatusReply::decode(&out)?.status)
    }

    fn call_handle<T: WireStruct>(&mut self, service: ServiceId, msg_type: u32, input: &T) -> NsResult<OpaqueHandle> {
        let mut out = [0u8; HandleReply::SIZE];
        self.call(service, msg_type, input, &mut out)?;
        Ok(HandleReply::decode(&out)?.handle)
    }

    fn find(&self, service: ServiceId, handle: OpaqueHandle) -> Option<usize> {
        self.instances
            .iter()
            .position(|instance| instance.service == service && instance.handle == handle)
    }

    fn write_params(&mut self, params: &NsParams) -> NsResult<Addr> {
        let addr = Addr(self.args.0 + 16);
        self.put(
            addr,
            &ParamsWire {
                return_behavior: params.return_behavior as u32,
                // The secure side substitutes its own dispatcher
                callback: 0,
                timeout: params.timeout,
                custom: params.custom,
            },
        )?;
        Ok(addr)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Create an instance from the dynamic pool
    ///
    /// Returns [`OpaqueHandle::NULL`] if the driver refused the instance.
    ///
    /// # Errors
    /// [`NsError::Rejected`] with the PSA status of a refused call.
    pub fn construct(&mut self, service: ServiceId, params: &NsParams, int_priority: u8) -> NsResult<OpaqueHandle> {
        let block = self.arena.alloc_block()?;
        let config = self.args;
        let hw_attrs = Addr(self.args.0 + 8);
        self.put(config, &ConfigWire { object: block, hw_attrs })?;
        self.put(
            hw_attrs,
            &HwAttrsWire {
                int_priority: u32::from(int_priority),
            },
        )?;
        let params_addr = self.write_params(params)?;
        let result = self.call_handle(
            service,
            tag::CONSTRUCT,
            &ConstructMsg {
                config,
                params: params_addr,
            },
        );
        self.adopt(service, result, params, block)
    }

    /// Open provisioned instance `index`
    ///
    /// Returns [`OpaqueHandle::NULL`] if the instance is already open or the
    /// driver refused it.
    ///
    /// # Errors
    /// [`NsError::Rejected`] with the PSA status of a refused call.
    pub fn open(&mut self, service: ServiceId, index: u32, params: &NsParams) -> NsResult<OpaqueHandle> {
        let block = self.arena.alloc_block()?;
        let params_addr = self.write_params(params)?;
        let result = self.call_handle(
            service,
            tag::OPEN,
            &OpenMsg {
                index,
                params: params_addr,
            },
        );
        self.adopt(service, result, params, block)
    }

    fn adopt(
        &mut self,
        service: ServiceId,
        result: NsResult<OpaqueHandle>,
        params: &NsParams,
        block: Addr,
    ) -> NsResult<OpaqueHandle> {
        let handle = match result {
            Ok(handle) if !handle.is_null() => handle,
            other => {
                self.arena.free_block(block);
                return other;
            }
        };
        let instance = NsInstance {
            service,
            handle,
            params: *params,
            block,
            in_flight: [false; 2],
            completed: [None; 2],
        };
        let registration = if params.return_behavior.is_async() {
            self.register(&instance)
        } else {
            Ok(())
        };
        let tracked = registration.and_then(|()| {
            self.instances
                .push(instance)
                .map_err(|_| NsError::Client(Error::ResourceExhausted))
        });
        if let Err(err) = tracked {
            // Best effort: the instance is unusable without its records
            let _ = self.call(service, tag::CLOSE, &HandleMsg { handle }, &mut []);
            self.arena.free_block(block);
            return Err(err);
        }
        Ok(handle)
    }

    fn register(&mut self, instance: &NsInstance) -> NsResult<()> {
        let handle = instance.handle;
        if instance.service == ServiceId::Trng {
            let msg = DualRegisterCallbackMsg {
                handle,
                primary: instance.record(trng::KEY_RECORD),
                secondary: instance.record(trng::BYTES_RECORD),
            };
            self.call(instance.service, tag::REGISTER_CALLBACK, &msg, &mut [])
        } else {
            let msg = RegisterCallbackMsg {
                handle,
                record: instance.record(0),
            };
            self.call(instance.service, tag::REGISTER_CALLBACK, &msg, &mut [])
        }
    }

    /// Close an instance
    ///
    /// A completion still in flight for it is dropped by the secure side.
    ///
    /// # Errors
    /// [`NsError::Rejected`] with the PSA status of a refused call.
    pub fn close(&mut self, service: ServiceId, handle: OpaqueHandle) -> NsResult<()> {
        self.call(service, tag::CLOSE, &HandleMsg { handle }, &mut [])?;
        if let Some(position) = self.find(service, handle) {
            let instance = self.instances.swap_remove(position);
            self.arena.free_block(instance.block);
        }
        Ok(())
    }

    /// Cancel the in-flight operation of an instance
    ///
    /// # Errors
    /// [`NsError::Rejected`] with the PSA status of a refused call.
    pub fn cancel(&mut self, service: ServiceId, handle: OpaqueHandle) -> NsResult<i32> {
        self.call_status(service, tag::CANCEL_OPERATION, &HandleMsg { handle })
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Issue operation `msg_type` on `handle`
    ///
    /// Returns the driver status: directly for polling and callback
    /// instances, from the completion record for blocking ones.
    ///
    /// # Errors
    /// - [`NsError::Rejected`] with the PSA status of a refused call
    /// - [`Error::CompletionPending`] if the instance still has an
    ///   asynchronous operation outstanding
    pub fn submit<T: WireStruct>(
        &mut self,
        service: ServiceId,
        handle: OpaqueHandle,
        msg_type: u32,
        input: &T,
    ) -> NsResult<i32> {
        let kind = record_kind(service, msg_type);
        let position = self.find(service, handle).ok_or(Error::InvalidHandle)?;
        let params = self.instances[position].params;
        let asynchronous = params.return_behavior.is_async();
        if asynchronous && self.instances[position].in_flight.iter().any(|busy| *busy) {
            return Err(Error::CompletionPending.into());
        }

        let status = self.call_status(service, msg_type, input)?;
        if !asynchronous || status != DRIVER_STATUS_SUCCESS || is_synchronous(service, msg_type) {
            return Ok(status);
        }
        if let Some(instance) = self.instances.get_mut(position) {
            instance.in_flight[usize::from(kind)] = true;
            instance.completed[usize::from(kind)] = None;
        }
        if params.return_behavior == ReturnBehavior::Callback {
            return Ok(status);
        }
        self.wait(service, handle, kind, params.timeout)
    }

    fn wait(&mut self, service: ServiceId, handle: OpaqueHandle, kind: u8, timeout: u32) -> NsResult<i32> {
        let passes = timeout.min(MAX_BLOCKING_POLLS).max(1);
        for _ in 0..passes {
            self.gateway.service_interrupts();
            self.process_doorbells();
            if let Some(done) = self.take_completion(service, handle, kind) {
                return Ok(done.status);
            }
        }
        // Timed out: the canceled completion still has to arrive
        self.cancel(service, handle)?;
        self.gateway.service_interrupts();
        self.process_doorbells();
        Ok(self
            .take_completion(service, handle, kind)
            .map_or(DRIVER_STATUS_CANCELED, |done| done.status))
    }

    fn take_completion(&mut self, service: ServiceId, handle: OpaqueHandle, kind: u8) -> Option<NsCompletion> {
        let position = self.find(service, handle)?;
        self.instances.get_mut(position)?.completed[usize::from(kind)].take()
    }

    /// Drain the doorbell queue: read each record, release it and run the
    /// callback or wake the blocked call it belongs to
    ///
    /// Returns the number of completions handled.
    pub fn process_doorbells(&mut self) -> usize {
        let mut handled = 0;
        while let Some(doorbell) = self.gateway.take_doorbell() {
            let Ok(record) = CompletionRecord::read(self.gateway.memory(), doorbell.record) else {
                continue;
            };
            if self.gateway.acknowledge(&doorbell).is_err() {
                continue;
            }
            let Some(position) = self.find(doorbell.service, record.handle) else {
                continue;
            };
            let completion = NsCompletion {
                service: doorbell.service,
                handle: record.handle,
                status: record.return_value,
                operation: record.operation,
                operation_type: record.operation_type,
                aux: record.aux,
            };
            let Some(instance) = self.instances.get_mut(position) else {
                continue;
            };
            let kind = usize::from(doorbell.kind).min(1);
            instance.in_flight[kind] = false;
            match (instance.params.return_behavior, instance.params.callback) {
                (ReturnBehavior::Callback, Some(callback)) => callback(&completion),
                (ReturnBehavior::Callback, None) => {}
                _ => instance.completed[kind] = Some(completion),
            }
            handled += 1;
        }
        handled
    }
}

/// Completion record an operation reports through
fn record_kind(service: ServiceId, msg_type: u32) -> u8 {
    if service == ServiceId::Trng && msg_type == trng::tag::GET_RANDOM_BYTES {
        trng::BYTES_RECORD
    } else {
        trng::KEY_RECORD
    }
}

/// Operations the drivers always finish inside the call
fn is_synchronous(service: ServiceId, msg_type: u32) -> bool {
    use crate::services::{aesccm, aescmac, aesecb, sha2};
    match service {
        ServiceId::AesEcb => matches!(msg_type, aesecb::tag::SETUP_ENCRYPT | aesecb::tag::SETUP_DECRYPT),
        ServiceId::AesCcm => matches!(
            msg_type,
            aesccm::tag::SETUP_ENCRYPT | aesccm::tag::SETUP_DECRYPT | aesccm::tag::SET_LENGTHS | aesccm::tag::SET_NONCE
        ),
        ServiceId::AesCmac => matches!(msg_type, aescmac::tag::SETUP_SIGN | aescmac::tag::SETUP_VERIFY),
        ServiceId::Sha2 => matches!(
            msg_type,
            sha2::tag::SET_HASH_TYPE | sha2::tag::SETUP_HMAC | sha2::tag::RESET
        ),
        ServiceId::Ecdh | ServiceId::Trng => false,
    }
}
