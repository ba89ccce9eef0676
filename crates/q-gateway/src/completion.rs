// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Completion dispatcher
//!
//! Asynchronous operations finish on the engine interrupt, after the
//! boundary call that submitted them has returned. The dispatcher turns each
//! engine completion into:
//!
//! 1. a write of the caller's registered completion record, and
//! 2. one [`Doorbell`] pushed into a bounded queue the non-secure side drains.
//!
//! A record that has been posted stays untouched until the non-secure side
//! acknowledges its doorbell. Completions without a record, or for an
//! instance that has since been closed, are dropped.

use heapless::Deque;

use q_common::constants::{CALLBACK_RECORD_SIZE, DOORBELL_QUEUE_DEPTH, MAX_INSTANCES, MAX_RECORDS_PER_INSTANCE};
use q_common::types::{Addr, OpaqueHandle, ServiceId};
use q_common::{Error, Result};
use q_hal::traits::AddressSpace;

use crate::wire::{CallbackRecordWire, WireStruct};

/// Lifecycle of the current operation on one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Nothing submitted since open
    Idle,
    /// Handed to the driver, result not yet known
    Dispatched,
    /// Finished inside the boundary call (polling, or immediate failure)
    ImmediateReturn,
    /// Accepted by the engine, waiting for the interrupt
    AwaitingHardware,
    /// Record written and doorbell queued
    Posted,
    /// Doorbell acknowledged by the non-secure side
    Consumed,
}

/// Completion written into a caller record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionRecord {
    /// Instance the operation ran on
    pub handle: OpaqueHandle,
    /// Final driver status
    pub return_value: i32,
    /// Caller's descriptor address, or null
    pub operation: Addr,
    /// Operation kind
    pub operation_type: u32,
    /// Service-specific word
    pub aux: u32,
}

impl CompletionRecord {
    /// Wire form
    #[must_use]
    pub const fn to_wire(&self) -> CallbackRecordWire {
        CallbackRecordWire {
            handle: self.handle,
            return_value: self.return_value,
            operation: self.operation,
            operation_type: self.operation_type,
            aux: self.aux,
        }
    }

    /// Decode a record read back from caller memory
    #[must_use]
    pub const fn from_wire(wire: &CallbackRecordWire) -> Self {
        Self {
            handle: wire.handle,
            return_value: wire.return_value,
            operation: wire.operation,
            operation_type: wire.operation_type,
            aux: wire.aux,
        }
    }

    /// Write the record at `addr`
    ///
    /// # Errors
    /// Returns [`Error::MemoryFault`] if the bus write fails.
    pub fn write(&self, mem: &mut dyn AddressSpace, addr: Addr) -> Result<()> {
        let mut bytes = [0u8; CALLBACK_RECORD_SIZE as usize];
        self.to_wire().encode(&mut bytes)?;
        mem.write(addr, &bytes)?;
        Ok(())
    }

    /// Read the record at `addr`
    ///
    /// # Errors
    /// Returns [`Error::MemoryFault`] if the bus read fails.
    pub fn read(mem: &dyn AddressSpace, addr: Addr) -> Result<Self> {
        let mut bytes = [0u8; CALLBACK_RECORD_SIZE as usize];
        mem.read(addr, &mut bytes)?;
        CallbackRecordWire::decode(&bytes).map(|wire| Self::from_wire(&wire))
    }
}

/// Notification that a record has been written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Doorbell {
    /// Service that wrote the record
    pub service: ServiceId,
    /// Instance the record belongs to
    pub handle: OpaqueHandle,
    /// Record address in caller memory
    pub record: Addr,
    /// Which of the instance's records was written
    pub kind: u8,
}

// =============================================================================
// Callback Registry
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordSlot {
    record: Addr,
    posted: bool,
}

/// Registered records of one service, indexed by instance slot
pub struct CallbackRegistry {
    kinds: u8,
    slots: [[Option<RecordSlot>; MAX_RECORDS_PER_INSTANCE]; MAX_INSTANCES],
}

impl CallbackRegistry {
    /// Registry where each instance registers `kinds` records
    #[must_use]
    pub const fn new(kinds: u8) -> Self {
        Self {
            kinds,
            slots: [[None; MAX_RECORDS_PER_INSTANCE]; MAX_INSTANCES],
        }
    }

    /// Records per instance
    #[must_use]
    pub const fn kinds(&self) -> u8 {
        self.kinds
    }

    fn entry(&self, index: u8, kind: u8) -> Option<&Option<RecordSlot>> {
        if kind >= self.kinds {
            return None;
        }
        self.slots.get(index as usize)?.get(kind as usize)
    }

    fn entry_mut(&mut self, index: u8, kind: u8) -> Option<&mut Option<RecordSlot>> {
        if kind >= self.kinds {
            return None;
        }
        self.slots.get_mut(index as usize)?.get_mut(kind as usize)
    }

    /// Check if any record of slot `index` is posted and unconsumed
    #[must_use]
    pub fn any_posted(&self, index: u8) -> bool {
        (0..self.kinds).any(|kind| self.is_posted(index, kind))
    }

    /// Install the records of slot `index`, replacing earlier ones
    ///
    /// # Errors
    /// Returns [`Error::CompletionPending`] if a replaced record is still
    /// posted.
    pub fn register(&mut self, index: u8, records: &[Addr]) -> Result<()> {
        if records.len() != self.kinds as usize {
            return Err(Error::InvalidMessageSize);
        }
        if self.any_posted(index) {
            return Err(Error::CompletionPending);
        }
        for (kind, record) in (0u8..).zip(records) {
            let entry = self.entry_mut(index, kind).ok_or(Error::InternalError)?;
            *entry = Some(RecordSlot {
                record: *record,
                posted: false,
            });
        }
        Ok(())
    }

    /// Drop every record of slot `index`
    pub fn clear(&mut self, index: u8) {
        if let Some(records) = self.slots.get_mut(index as usize) {
            *records = [None; MAX_RECORDS_PER_INSTANCE];
        }
    }

    /// Record of kind `kind` for slot `index`
    #[must_use]
    pub fn record(&self, index: u8, kind: u8) -> Option<Addr> {
        self.entry(index, kind).copied().flatten().map(|slot| slot.record)
    }

    /// Check if record `kind` of slot `index` is posted and unconsumed
    #[must_use]
    pub fn is_posted(&self, index: u8, kind: u8) -> bool {
        self.entry(index, kind)
            .copied()
            .flatten()
            .is_some_and(|slot| slot.posted)
    }

    fn set_posted(&mut self, index: u8, kind: u8, posted: bool) {
        if let Some(Some(slot)) = self.entry_mut(index, kind) {
            slot.posted = posted;
        }
    }

    /// Release a posted record once its doorbell is acknowledged
    ///
    /// Returns `false` if `record` is no longer the registered record.
    pub fn consume(&mut self, index: u8, kind: u8, record: Addr) -> bool {
        if self.record(index, kind) != Some(record) {
            return false;
        }
        self.set_posted(index, kind, false);
        true
    }
}

// =============================================================================
// Doorbell Channel
// =============================================================================

/// Bounded queue of doorbells drained by the non-secure side
pub struct CompletionChannel {
    queue: Deque<Doorbell, DOORBELL_QUEUE_DEPTH>,
    posted: u32,
}

impl CompletionChannel {
    /// Empty channel
    #[must_use]
    pub const fn new() -> Self {
        Self {
            queue: Deque::new(),
            posted: 0,
        }
    }

    /// Queued doorbells
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if no doorbell is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Doorbells posted since creation
    #[must_use]
    pub const fn posted(&self) -> u32 {
        self.posted
    }

    fn post(&mut self, doorbell: Doorbell) -> Result<()> {
        self.queue.push_back(doorbell).map_err(|_| Error::QueueFull)?;
        self.posted = self.posted.wrapping_add(1);
        Ok(())
    }

    /// Take the oldest doorbell
    pub fn take(&mut self) -> Option<Doorbell> {
        self.queue.pop_front()
    }
}

impl Default for CompletionChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `completion` into record `kind` of slot `index` and ring the doorbell
///
/// # Errors
/// - [`Error::CallbackNotRegistered`] if the slot has no such record
/// - [`Error::CompletionPending`] if the record is still posted
/// - [`Error::QueueFull`] if the doorbell cannot be queued
/// - [`Error::MemoryFault`] if the record write fails
pub fn deliver(
    mem: &mut dyn AddressSpace,
    registry: &mut CallbackRegistry,
    channel: &mut CompletionChannel,
    service: ServiceId,
    index: u8,
    kind: u8,
    completion: &CompletionRecord,
) -> Result<()> {
    let record = registry.record(index, kind).ok_or(Error::CallbackNotRegistered)?;
    if registry.is_posted(index, kind) {
        return Err(Error::CompletionPending);
    }
    if channel.queue.is_full() {
        return Err(Error::QueueFull);
    }
    completion.write(mem, record)?;
    channel.post(Doorbell {
        service,
        handle: completion.handle,
        record,
        kind,
    })?;
    registry.set_posted(index, kind, true);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use q_hal::sim::SimMemory;

    const RECORD: Addr = Addr(0x2000_0100);

    fn completion() -> CompletionRecord {
        CompletionRecord {
            handle: OpaqueHandle::compose(0xC2, 1, 2),
            return_value: 0,
            operation: Addr(0x2000_0200),
            operation_type: 1,
            aux: 0,
        }
    }

    #[test]
    fn test_deliver_writes_record_and_posts_once() {
        let mut mem = SimMemory::<1024>::new(0x2000_0000);
        let mut registry = CallbackRegistry::new(1);
        let mut channel = CompletionChannel::new();
        registry.register(2, &[RECORD]).unwrap();

        deliver(&mut mem, &mut registry, &mut channel, ServiceId::AesEcb, 2, 0, &completion()).unwrap();
        assert_eq!(channel.len(), 1);
        assert_eq!(CompletionRecord::read(&mem, RECORD), Ok(completion()));

        // Posted records are not rewritten
        let second = deliver(&mut mem, &mut registry, &mut channel, ServiceId::AesEcb, 2, 0, &completion());
        assert_eq!(second, Err(Error::CompletionPending));
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn test_consume_frees_record() {
        let mut mem = SimMemory::<1024>::new(0x2000_0000);
        let mut registry = CallbackRegistry::new(1);
        let mut channel = CompletionChannel::new();
        registry.register(0, &[RECORD]).unwrap();
        deliver(&mut mem, &mut registry, &mut channel, ServiceId::Sha2, 0, 0, &completion()).unwrap();

        let doorbell = channel.take().unwrap();
        assert!(registry.consume(0, doorbell.kind, doorbell.record));
        assert!(!registry.is_posted(0, 0));
        assert!(deliver(&mut mem, &mut registry, &mut channel, ServiceId::Sha2, 0, 0, &completion()).is_ok());
    }

    #[test]
    fn test_unregistered_completion_rejected() {
        let mut mem = SimMemory::<1024>::new(0x2000_0000);
        let mut registry = CallbackRegistry::new(1);
        let mut channel = CompletionChannel::new();
        let result = deliver(&mut mem, &mut registry, &mut channel, ServiceId::Sha2, 1, 0, &completion());
        assert_eq!(result, Err(Error::CallbackNotRegistered));
        assert!(channel.is_empty());
    }

    #[test]
    fn test_two_record_kinds() {
        let mut registry = CallbackRegistry::new(2);
        registry.register(0, &[Addr(0x2000_0000), Addr(0x2000_0020)]).unwrap();
        assert_eq!(registry.record(0, 1), Some(Addr(0x2000_0020)));
        assert_eq!(registry.record(0, 2), None);
        assert_eq!(registry.register(0, &[Addr(0x2000_0000)]), Err(Error::InvalidMessageSize));
    }

    #[test]
    fn test_clear_drops_records() {
        let mut registry = CallbackRegistry::new(1);
        registry.register(3, &[RECORD]).unwrap();
        registry.clear(3);
        assert_eq!(registry.record(3, 0), None);
    }
}
