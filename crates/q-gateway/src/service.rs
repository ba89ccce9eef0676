// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Service core
//!
//! Everything the six crypto services have in common: the instance arena,
//! the callback registry, the lifecycle messages (construct, open,
//! register-callback, close, cancel), submission of operations to the
//! driver and delivery of their completions.
//!
//! A concrete service only decodes its own operation messages, copies the
//! descriptors in and picks the driver entry point; see [`ServiceOperations`].

use q_common::constants::{CALLBACK_RECORD_SIZE, DRIVER_STATUS_SUCCESS};
use q_common::log::LogBuffer;
use q_common::types::{Addr, ClientOrigin, OpaqueHandle, ServiceId, Span};
use q_common::{log_debug, log_info, log_warn, Error, Result, ServiceConfig};
use q_hal::traits::{AddressSpace, CryptoDriver, DriverStatus, HwAttrs, HwCompletion, InstanceId};

use crate::completion::{deliver, CallbackRegistry, CompletionChannel, CompletionRecord, Doorbell, OperationState};
use crate::copy::{copy_config, copy_params, write_back_key, CopyContext, ModeSelection, SecureParams};
use crate::handle::HandleTable;
use crate::transport::Message;
use crate::validator::BoundaryValidator;
use crate::wire::{
    ConstructMsg, DualRegisterCallbackMsg, HandleMsg, HandleReply, OpenMsg, RegisterCallbackMsg, StatusReply,
    WireStruct,
};

/// Lifecycle message tags shared by every service
pub mod tag {
    /// Create an instance in the dynamic pool
    pub const CONSTRUCT: u32 = 0;
    /// Open a provisioned instance by index
    pub const OPEN: u32 = 1;
    /// Register completion records
    pub const REGISTER_CALLBACK: u32 = 2;
    /// Close an instance
    pub const CLOSE: u32 = 3;
    /// Cancel the in-flight operation
    pub const CANCEL_OPERATION: u32 = 4;
    /// First service-specific operation tag
    pub const OPERATION_BASE: u32 = 0x10;
}

// =============================================================================
// Boundary Context
// =============================================================================

/// Gateway state lent to a service for one call or one interrupt pass
pub struct BoundaryContext<'a> {
    /// Bus
    pub mem: &'a mut dyn AddressSpace,
    /// Validator for non-secure pointers
    pub validator: &'a BoundaryValidator,
    /// Doorbell queue
    pub doorbells: &'a mut CompletionChannel,
    /// Event log
    pub log: &'a mut LogBuffer,
    /// Sequence number of the current call
    pub sequence: u32,
    /// Origin of the current call
    pub origin: ClientOrigin,
}

impl BoundaryContext<'_> {
    /// View used by the copy routines
    pub fn copy(&mut self) -> CopyContext<'_> {
        CopyContext {
            mem: &mut *self.mem,
            validator: self.validator,
            origin: self.origin,
        }
    }

    /// Check `span` for reading when the caller is non-secure
    ///
    /// # Errors
    /// As [`BoundaryValidator::check_readable`].
    pub fn readable(&self, span: Span) -> Result<()> {
        if self.origin.is_non_secure() {
            self.validator.check_readable(span)?;
        }
        Ok(())
    }

    /// Check `span` for writing when the caller is non-secure
    ///
    /// # Errors
    /// As [`BoundaryValidator::check_writable`].
    pub fn writable(&self, span: Span) -> Result<()> {
        if self.origin.is_non_secure() {
            self.validator.check_writable(span)?;
        }
        Ok(())
    }
}

// =============================================================================
// Instances
// =============================================================================

/// Asynchronous operation waiting for its completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOp {
    /// Caller's descriptor address, reported in the record
    pub operation: Addr,
    /// Caller key structure to receive the produced key's encoding
    pub key_writeback: Option<Addr>,
    /// Completion record kind
    pub kind: u8,
}

impl PendingOp {
    /// Operation reported through record kind 0
    #[must_use]
    pub const fn new(operation: Addr) -> Self {
        Self {
            operation,
            key_writeback: None,
            kind: 0,
        }
    }

    /// Report through record `kind`
    #[must_use]
    pub const fn with_kind(mut self, kind: u8) -> Self {
        self.kind = kind;
        self
    }

    /// Copy the produced key's encoding back to `key`
    #[must_use]
    pub const fn with_key_writeback(mut self, key: Addr) -> Self {
        self.key_writeback = Some(key);
        self
    }
}

/// One open driver instance
pub struct Instance<O> {
    /// Driver object, owned by the secure side
    pub object: O,
    /// Hardware attributes copied at open
    pub hw_attrs: HwAttrs,
    /// Requested and effective return behavior
    pub mode: ModeSelection,
    /// Current operation state
    pub state: OperationState,
    pending: Option<PendingOp>,
}

impl<O> Instance<O> {
    fn new(object: O, hw_attrs: HwAttrs, mode: ModeSelection) -> Self {
        Self {
            object,
            hw_attrs,
            mode,
            state: OperationState::Idle,
            pending: None,
        }
    }
}

/// Secure copy of the descriptor being marshalled, one per service
pub struct Scratch<T> {
    slot: Option<T>,
}

impl<T> Scratch<T> {
    /// Empty scratch slot
    #[must_use]
    pub const fn new() -> Self {
        Self { slot: None }
    }

    /// Replace the staged descriptor
    pub fn stage(&mut self, value: T) -> &mut T {
        self.slot.insert(value)
    }

    /// Staged descriptor
    #[must_use]
    pub const fn staged(&self) -> Option<&T> {
        self.slot.as_ref()
    }
}

impl<T> Default for Scratch<T> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Service Core
// =============================================================================

/// State and lifecycle handling shared by all services
pub struct ServiceCore<D: CryptoDriver> {
    id: ServiceId,
    config: ServiceConfig,
    driver: D,
    table: HandleTable<Instance<D::Object>>,
    callbacks: CallbackRegistry,
}

impl<D: CryptoDriver> ServiceCore<D> {
    /// Core for service `id` with `record_kinds` completion records per
    /// instance
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `config` exceeds the limits.
    pub fn new(id: ServiceId, driver: D, config: ServiceConfig, record_kinds: u8) -> Result<Self> {
        Ok(Self {
            id,
            config,
            driver,
            table: HandleTable::new(id, &config)?,
            callbacks: CallbackRegistry::new(record_kinds),
        })
    }

    /// Service identifier
    #[must_use]
    pub const fn id(&self) -> ServiceId {
        self.id
    }

    /// Driver
    #[must_use]
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    /// Instance arena
    #[must_use]
    pub const fn table(&self) -> &HandleTable<Instance<D::Object>> {
        &self.table
    }

    /// Live instance named by `handle`
    ///
    /// # Errors
    /// Returns [`Error::InvalidHandle`] if the handle does not resolve.
    pub fn instance(&self, handle: OpaqueHandle) -> Result<&Instance<D::Object>> {
        let id = self.table.resolve(handle)?;
        self.table.get(id).ok_or(Error::InvalidHandle)
    }

    /// Requested and effective behavior of an instance
    #[must_use]
    pub fn mode(&self, handle: OpaqueHandle) -> Option<ModeSelection> {
        self.instance(handle).ok().map(|instance| instance.mode)
    }

    /// Operation state of an instance
    #[must_use]
    pub fn state(&self, handle: OpaqueHandle) -> Option<OperationState> {
        self.instance(handle).ok().map(|instance| instance.state)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Handle a lifecycle message
    ///
    /// # Errors
    /// Returns [`Error::UnknownMessageType`] for a non-lifecycle tag, or the
    /// error of the handler.
    pub fn handle_lifecycle(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()> {
        match msg.msg_type() {
            tag::CONSTRUCT => self.construct(cx, msg),
            tag::OPEN => self.open(cx, msg),
            tag::REGISTER_CALLBACK => self.register_callback(cx, msg),
            tag::CLOSE => self.close(cx, msg),
            tag::CANCEL_OPERATION => self.cancel(cx, msg),
            _ => Err(Error::UnknownMessageType),
        }
    }

    fn construct(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()> {
        let input: ConstructMsg = msg.read_input(HandleReply::SIZE)?;
        let copy = cx.copy();
        let hw_attrs = copy_config(&copy, input.config, D::OBJECT_SIZE)?;
        let params = copy_params(&copy, input.params)?;
        let id = self.table.reserve_pool().map_err(|err| {
            log_warn!(cx.log, cx.sequence, self.id, "construct: pool of {} exhausted", self.config.pool_size);
            err
        })?;
        self.start_instance(cx, msg, id, hw_attrs, &params)
    }

    fn open(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()> {
        let input: OpenMsg = msg.read_input(HandleReply::SIZE)?;
        let params = copy_params(&cx.copy(), input.params)?;
        let id = match self.table.reserve_static(input.index) {
            Ok(id) => id,
            Err(Error::ResourceExhausted) => {
                log_warn!(cx.log, cx.sequence, self.id, "open: index {} already open", input.index);
                return msg.write_reply(&HandleReply { handle: OpaqueHandle::NULL });
            }
            Err(err) => return Err(err),
        };
        let hw_attrs = HwAttrs {
            int_priority: self.config.int_priority,
        };
        self.start_instance(cx, msg, id, hw_attrs, &params)
    }

    fn start_instance(
        &mut self,
        cx: &mut BoundaryContext<'_>,
        msg: &mut Message<'_>,
        id: InstanceId,
        hw_attrs: HwAttrs,
        params: &SecureParams,
    ) -> Result<()> {
        let mut object = D::Object::default();
        let status = self.driver.construct(id, &mut object, &hw_attrs, &params.driver_params());
        if status != DRIVER_STATUS_SUCCESS {
            // The reserved slot was never filled, so it stays free
            log_warn!(cx.log, cx.sequence, self.id, "driver refused slot {}: status {}", id.index, status);
            return msg.write_reply(&HandleReply { handle: OpaqueHandle::NULL });
        }
        let handle = self.table.fill(id, Instance::new(object, hw_attrs, params.mode))?;
        log_info!(
            cx.log,
            cx.sequence,
            self.id,
            "opened {:?} mode {:?}->{:?}",
            handle,
            params.mode.requested,
            params.mode.effective
        );
        msg.write_reply(&HandleReply { handle })
    }

    fn register_callback(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()> {
        if !cx.origin.is_non_secure() {
            return Err(Error::NonSecureOnly);
        }
        let mut records = [Addr::NULL; 2];
        let (handle, records) = if self.callbacks.kinds() == 1 {
            let input: RegisterCallbackMsg = msg.read_input(0)?;
            records[0] = input.record;
            (input.handle, &records[..1])
        } else {
            let input: DualRegisterCallbackMsg = msg.read_input(0)?;
            records = [input.primary, input.secondary];
            (input.handle, &records[..])
        };
        for record in records {
            cx.writable(Span::new(*record, CALLBACK_RECORD_SIZE))?;
        }
        let id = self.table.resolve(handle)?;
        self.callbacks.register(id.index, records)?;
        log_debug!(cx.log, cx.sequence, self.id, "callback registered for {:?}", handle);
        Ok(())
    }

    fn close(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()> {
        let input: HandleMsg = msg.read_input(0)?;
        let id = self.table.resolve(input.handle)?;
        let instance = self.table.get_mut(id).ok_or(Error::InvalidHandle)?;
        if instance.pending.is_some() {
            log_warn!(cx.log, cx.sequence, self.id, "closing {:?} with an operation in flight", input.handle);
        }
        self.driver.close(id, &mut instance.object);
        self.callbacks.clear(id.index);
        self.table.release(input.handle);
        log_info!(cx.log, cx.sequence, self.id, "closed {:?}", input.handle);
        Ok(())
    }

    fn cancel(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()> {
        if !cx.origin.is_non_secure() {
            return Err(Error::NonSecureOnly);
        }
        let input: HandleMsg = msg.read_input(StatusReply::SIZE)?;
        let id = self.table.resolve(input.handle)?;
        let instance = self.table.get_mut(id).ok_or(Error::InvalidHandle)?;
        let status = self.driver.cancel_operation(id, &mut instance.object);
        log_debug!(cx.log, cx.sequence, self.id, "cancel {:?}: status {}", input.handle, status);
        msg.write_reply(&StatusReply { status })
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Run a driver entry point that may complete asynchronously
    ///
    /// Instances running with callback behavior must have the record for
    /// `pending.kind` registered and free, and no earlier operation waiting
    /// for its completion, before anything is submitted. A canceled
    /// operation still owns the instance until its completion is delivered.
    ///
    /// # Errors
    /// - [`Error::InvalidHandle`] if `handle` does not resolve
    /// - [`Error::CallbackNotRegistered`] or [`Error::CompletionPending`] for
    ///   asynchronous instances without a usable record
    /// - [`Error::CompletionPending`] while an earlier asynchronous operation
    ///   is undelivered
    pub fn submit<F>(
        &mut self,
        cx: &mut BoundaryContext<'_>,
        handle: OpaqueHandle,
        pending: PendingOp,
        operation: F,
    ) -> Result<DriverStatus>
    where
        F: FnOnce(&mut D, InstanceId, &mut D::Object, &mut dyn AddressSpace) -> DriverStatus,
    {
        let id = self.table.resolve(handle)?;
        let instance = self.table.get_mut(id).ok_or(Error::InvalidHandle)?;
        let is_async = instance.mode.effective.is_async();
        if is_async {
            if self.callbacks.record(id.index, pending.kind).is_none() {
                return Err(Error::CallbackNotRegistered);
            }
            if self.callbacks.is_posted(id.index, pending.kind) {
                return Err(Error::CompletionPending);
            }
            if instance.pending.is_some() {
                log_warn!(cx.log, cx.sequence, self.id, "submit {:?}: completion still outstanding", handle);
                return Err(Error::CompletionPending);
            }
        }

        instance.state = OperationState::Dispatched;
        let status = operation(&mut self.driver, id, &mut instance.object, &mut *cx.mem);
        if is_async && status == DRIVER_STATUS_SUCCESS {
            instance.state = OperationState::AwaitingHardware;
            instance.pending = Some(pending);
        } else {
            instance.state = OperationState::ImmediateReturn;
        }
        log_debug!(cx.log, cx.sequence, self.id, "submit {:?}: status {}", handle, status);
        Ok(status)
    }

    /// Run a driver entry point that always finishes inside the call
    ///
    /// # Errors
    /// Returns [`Error::InvalidHandle`] if `handle` does not resolve.
    pub fn control<F>(&mut self, cx: &mut BoundaryContext<'_>, handle: OpaqueHandle, operation: F) -> Result<DriverStatus>
    where
        F: FnOnce(&mut D, InstanceId, &mut D::Object, &mut dyn AddressSpace) -> DriverStatus,
    {
        let id = self.table.resolve(handle)?;
        let instance = self.table.get_mut(id).ok_or(Error::InvalidHandle)?;
        let status = operation(&mut self.driver, id, &mut instance.object, &mut *cx.mem);
        log_debug!(cx.log, cx.sequence, self.id, "control {:?}: status {}", handle, status);
        Ok(status)
    }

    /// Whether an instance completes through its callback records
    #[must_use]
    pub fn is_async(&self, handle: OpaqueHandle) -> bool {
        self.mode(handle).is_some_and(|mode| mode.effective.is_async())
    }

    // -------------------------------------------------------------------------
    // Completions
    // -------------------------------------------------------------------------

    /// Drain the driver's completions into caller records
    pub fn service_interrupt(&mut self, cx: &mut BoundaryContext<'_>) -> usize {
        let mut delivered = 0;
        while let Some(completion) = self.driver.take_completion(&mut *cx.mem) {
            match self.complete(cx, &completion) {
                Ok(()) => delivered += 1,
                Err(err) => log_warn!(
                    cx.log,
                    cx.sequence,
                    self.id,
                    "dropped completion for slot {} gen {}: {}",
                    completion.instance.index,
                    completion.instance.generation,
                    err
                ),
            }
        }
        delivered
    }

    fn complete(&mut self, cx: &mut BoundaryContext<'_>, completion: &HwCompletion) -> Result<()> {
        // Fails once the instance has been closed or its slot reused
        let handle = self.table.handle_for(completion.instance)?;
        let instance = self.table.get_mut(completion.instance).ok_or(Error::InvalidHandle)?;
        let pending = instance.pending.take().ok_or(Error::InternalError)?;
        instance.state = OperationState::Idle;

        if let (Some(key), Some(addr)) = (completion.output_key, pending.key_writeback) {
            write_back_key(&mut *cx.mem, addr, &key)?;
        }
        let record = CompletionRecord {
            handle,
            return_value: completion.status,
            operation: pending.operation,
            operation_type: completion.operation_type.as_u32(),
            aux: completion.aux,
        };
        deliver(
            &mut *cx.mem,
            &mut self.callbacks,
            cx.doorbells,
            self.id,
            completion.instance.index,
            pending.kind,
            &record,
        )?;
        instance.state = OperationState::Posted;
        Ok(())
    }

    /// Release a posted record after the non-secure side has read it
    pub fn acknowledge(&mut self, doorbell: &Doorbell) -> bool {
        let Ok(id) = self.table.resolve(doorbell.handle) else {
            return false;
        };
        if !self.callbacks.consume(id.index, doorbell.kind, doorbell.record) {
            return false;
        }
        if let Some(instance) = self.table.get_mut(id) {
            if instance.state == OperationState::Posted {
                instance.state = OperationState::Consumed;
            }
        }
        true
    }
}

// =============================================================================
// Service Interface
// =============================================================================

/// Per-service half of a crypto service
pub trait ServiceOperations {
    /// Driver the service forwards to
    type Driver: CryptoDriver;

    /// Shared core
    fn core(&self) -> &ServiceCore<Self::Driver>;

    /// Shared core, mutably
    fn core_mut(&mut self) -> &mut ServiceCore<Self::Driver>;

    /// Handle a service-specific operation message
    ///
    /// # Errors
    /// Returns [`Error::UnknownMessageType`] for a tag the service does not
    /// define, or the error of the handler.
    fn handle_operation(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()>;
}

/// Entry points the gateway uses to drive a service
pub trait CryptoService {
    /// Service identifier
    fn id(&self) -> ServiceId;

    /// Decode and handle one boundary message, writing its output vector
    ///
    /// # Errors
    /// Any boundary error; driver failures are reported in the output
    /// vector, not here.
    fn handle_message(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()>;

    /// Deliver pending engine completions, returning how many were posted
    fn service_interrupt(&mut self, cx: &mut BoundaryContext<'_>) -> usize;

    /// Release a posted record
    fn acknowledge(&mut self, doorbell: &Doorbell) -> bool;

    /// Requested and effective behavior of an instance
    fn mode(&self, handle: OpaqueHandle) -> Option<ModeSelection>;

    /// Operation state of an instance
    fn state(&self, handle: OpaqueHandle) -> Option<OperationState>;
}

impl<S: ServiceOperations> CryptoService for S {
    fn id(&self) -> ServiceId {
        self.core().id()
    }

    fn handle_message(&mut self, cx: &mut BoundaryContext<'_>, msg: &mut Message<'_>) -> Result<()> {
        if msg.msg_type() < tag::OPERATION_BASE {
            self.core_mut().handle_lifecycle(cx, msg)
        } else {
            self.handle_operation(cx, msg)
        }
    }

    fn service_interrupt(&mut self, cx: &mut BoundaryContext<'_>) -> usize {
        self.core_mut().service_interrupt(cx)
    }

    fn acknowledge(&mut self, doorbell: &Doorbell) -> bool {
        self.core_mut().acknowledge(doorbell)
    }

    fn mode(&self, handle: OpaqueHandle) -> Option<ModeSelection> {
        self.core().mode(handle)
    }

    fn state(&self, handle: OpaqueHandle) -> Option<OperationState> {
        self.core().state(handle)
    }
}

/// Write a driver status as the output vector of an operation
///
/// # Errors
/// Returns [`Error::InvalidMessageSize`] if the output vector is too short.
pub fn reply_status(msg: &mut Message<'_>, status: DriverStatus) -> Result<()> {
    msg.write_reply(&StatusReply { status })
}
