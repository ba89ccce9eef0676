// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Simulated crypto engine
//!
//! Each simulated driver owns one [`SimEngine`]. Results are computed when
//! an operation is submitted, but nothing becomes visible on the bus until
//! the operation completes: immediately for polling instances, or when the
//! caller services the interrupt with [`SimEngine::take_completion`].

use heapless::{Deque, Vec};
use zeroize::{Zeroize, ZeroizeOnDrop};

use q_common::constants::{
    DRIVER_STATUS_CANCELED, DRIVER_STATUS_ERROR, DRIVER_STATUS_KEYSTORE_ERROR,
    DRIVER_STATUS_RESOURCE_UNAVAILABLE, DRIVER_STATUS_SUCCESS, MAX_KEY_SIZE,
};
use q_common::types::{Addr, ReturnBehavior, Span};

use crate::ops::{CryptoKey, KeyEncoding, OperationType};
use crate::traits::{AddressSpace, DriverStatus, HwCompletion, InstanceId};

/// Largest single buffer a simulated engine moves in one write
pub const SIM_MAX_DATA: usize = 256;

/// Bus writes one operation may defer
const MAX_DEFERRED_WRITES: usize = 6;

/// Canceled completions awaiting delivery
const COMPLETION_QUEUE_DEPTH: usize = 4;

// =============================================================================
// Driver Objects
// =============================================================================

/// Object shared by all simulated drivers
pub struct SimObject<S> {
    pub(crate) open: bool,
    pub(crate) behavior: ReturnBehavior,
    pub(crate) state: S,
}

impl<S: Default> Default for SimObject<S> {
    fn default() -> Self {
        Self {
            open: false,
            behavior: ReturnBehavior::Polling,
            state: S::default(),
        }
    }
}

impl<S> SimObject<S> {
    /// Check if the object has been constructed and not closed
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// Return behavior the object was constructed with
    #[must_use]
    pub const fn behavior(&self) -> ReturnBehavior {
        self.behavior
    }
}

// =============================================================================
// Key Material
// =============================================================================

/// Plaintext key material copied off the bus
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct KeyMaterial {
    bytes: [u8; MAX_KEY_SIZE],
    len: usize,
}

impl KeyMaterial {
    /// Read the material of a plaintext key
    pub(crate) fn read(key: &CryptoKey, mem: &dyn AddressSpace) -> Result<Self, DriverStatus> {
        if key.encoding != KeyEncoding::Plaintext {
            return Err(DRIVER_STATUS_KEYSTORE_ERROR);
        }
        let len = key.length as usize;
        if len == 0 || len > MAX_KEY_SIZE {
            return Err(DRIVER_STATUS_ERROR);
        }
        let mut material = Self {
            bytes: [0u8; MAX_KEY_SIZE],
            len,
        };
        mem.read(key.material, &mut material.bytes[..len])
            .map_err(|_| DRIVER_STATUS_ERROR)?;
        Ok(material)
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Read a span into a bounded buffer
pub(crate) fn read_span<const N: usize>(
    mem: &dyn AddressSpace,
    span: Span,
) -> Result<Vec<u8, N>, DriverStatus> {
    let mut buf: Vec<u8, N> = Vec::new();
    buf.resize(span.len as usize, 0).map_err(|()| DRIVER_STATUS_ERROR)?;
    mem.read(span.addr, &mut buf).map_err(|_| DRIVER_STATUS_ERROR)?;
    Ok(buf)
}

/// Stream a span through `sink` in small chunks
pub(crate) fn for_each_chunk(
    mem: &dyn AddressSpace,
    span: Span,
    mut sink: impl FnMut(&[u8]),
) -> Result<(), DriverStatus> {
    let mut chunk = [0u8; 64];
    let mut offset = 0u32;
    while offset < span.len {
        let n = (span.len - offset).min(chunk.len() as u32);
        let addr = span.addr.checked_add(offset).ok_or(DRIVER_STATUS_ERROR)?;
        mem.read(addr, &mut chunk[..n as usize])
            .map_err(|_| DRIVER_STATUS_ERROR)?;
        sink(&chunk[..n as usize]);
        offset += n;
    }
    Ok(())
}

// =============================================================================
// Outcomes
// =============================================================================

/// Bus write deferred until completion
struct DeferredWrite {
    addr: Addr,
    data: Vec<u8, SIM_MAX_DATA>,
}

impl Drop for DeferredWrite {
    fn drop(&mut self) {
        self.data.as_mut_slice().zeroize();
    }
}

/// Result of an operation, not yet visible on the bus
pub(crate) struct Outcome {
    status: DriverStatus,
    operation_type: OperationType,
    writes: Vec<DeferredWrite, MAX_DEFERRED_WRITES>,
    output_key: Option<CryptoKey>,
    aux: u32,
}

impl Outcome {
    pub(crate) fn new(operation_type: OperationType) -> Self {
        Self {
            status: DRIVER_STATUS_SUCCESS,
            operation_type,
            writes: Vec::new(),
            output_key: None,
            aux: 0,
        }
    }

    pub(crate) fn failed(operation_type: OperationType, status: DriverStatus) -> Self {
        let mut outcome = Self::new(operation_type);
        outcome.status = status;
        outcome
    }

    /// Collapse a computation result into an outcome
    pub(crate) fn from_result(
        operation_type: OperationType,
        result: Result<Self, DriverStatus>,
    ) -> Self {
        result.unwrap_or_else(|status| Self::failed(operation_type, status))
    }

    pub(crate) fn write(mut self, addr: Addr, data: &[u8]) -> Result<Self, DriverStatus> {
        let data = Vec::from_slice(data).map_err(|()| DRIVER_STATUS_ERROR)?;
        self.writes
            .push(DeferredWrite { addr, data })
            .map_err(|_| DRIVER_STATUS_ERROR)?;
        Ok(self)
    }

    pub(crate) fn with_output_key(mut self, key: CryptoKey) -> Self {
        self.output_key = Some(key);
        self
    }

    pub(crate) fn with_aux(mut self, aux: u32) -> Self {
        self.aux = aux;
        self
    }

    pub(crate) const fn status(&self) -> DriverStatus {
        self.status
    }

    pub(crate) const fn output_key(&self) -> Option<CryptoKey> {
        self.output_key
    }

    /// Make the results visible and return the final status
    fn commit(&self, mem: &mut dyn AddressSpace) -> DriverStatus {
        if self.status != DRIVER_STATUS_SUCCESS {
            return self.status;
        }
        for write in &self.writes {
            if mem.write(write.addr, &write.data).is_err() {
                return DRIVER_STATUS_ERROR;
            }
        }
        DRIVER_STATUS_SUCCESS
    }

    fn into_completion(self, instance: InstanceId, status: DriverStatus) -> HwCompletion {
        HwCompletion {
            instance,
            status,
            operation_type: self.operation_type,
            output_key: if status == DRIVER_STATUS_SUCCESS { self.output_key } else { None },
            aux: self.aux,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Single-operation engine with an interrupt-driven completion path
pub struct SimEngine {
    pending: Option<(InstanceId, Outcome)>,
    completions: Deque<HwCompletion, COMPLETION_QUEUE_DEPTH>,
}

impl SimEngine {
    /// Idle engine
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: None,
            completions: Deque::new(),
        }
    }

    /// Check if an operation is in flight
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Instance whose operation is in flight
    #[must_use]
    pub fn in_flight(&self) -> Option<InstanceId> {
        self.pending.as_ref().map(|(id, _)| *id)
    }

    /// Gate run before computing an operation
    pub(crate) fn admit(&self, open: bool) -> Result<(), DriverStatus> {
        if !open {
            return Err(DRIVER_STATUS_ERROR);
        }
        if self.is_busy() {
            return Err(DRIVER_STATUS_RESOURCE_UNAVAILABLE);
        }
        Ok(())
    }

    /// Finish `outcome` now (polling) or park it until the interrupt
    pub(crate) fn submit(
        &mut self,
        id: InstanceId,
        behavior: ReturnBehavior,
        outcome: Outcome,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if !behavior.is_async() {
            return outcome.commit(mem);
        }
        if self.is_busy() {
            return DRIVER_STATUS_RESOURCE_UNAVAILABLE;
        }
        self.pending = Some((id, outcome));
        DRIVER_STATUS_SUCCESS
    }

    /// Drop the operation of `id`, reporting it as canceled
    pub(crate) fn cancel(&mut self, id: InstanceId) -> DriverStatus {
        if self.in_flight() != Some(id) {
            return DRIVER_STATUS_SUCCESS;
        }
        if self.completions.is_full() {
            return DRIVER_STATUS_RESOURCE_UNAVAILABLE;
        }
        if let Some((instance, outcome)) = self.pending.take() {
            let completion = outcome.into_completion(instance, DRIVER_STATUS_CANCELED);
            // Capacity checked above
            let _ = self.completions.push_back(completion);
        }
        DRIVER_STATUS_SUCCESS
    }

    /// Deliver the next completion
    pub(crate) fn take_completion(&mut self, mem: &mut dyn AddressSpace) -> Option<HwCompletion> {
        if let Some(completion) = self.completions.pop_front() {
            return Some(completion);
        }
        let (instance, outcome) = self.pending.take()?;
        let status = outcome.commit(mem);
        Some(outcome.into_completion(instance, status))
    }
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new()
    }
}
