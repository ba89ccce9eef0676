// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Boundary gateway
//!
//! The secure side's single entry point. A boundary call names a service and
//! carries a [`Message`]; the gateway routes it to the registered service,
//! lends it the bus, the validator, the doorbell queue and the log, and turns
//! the outcome into a PSA status.
//!
//! The engine interrupt path goes through [`Gateway::service_interrupts`],
//! which lets every service deliver its completions. The non-secure side
//! then drains doorbells with [`Gateway::take_doorbell`] and releases each
//! record with [`Gateway::acknowledge`].

use heapless::Vec;

use q_common::constants::{MAX_SERVICES, PSA_ERROR_CONNECTION_REFUSED, PSA_SUCCESS};
use q_common::log::{LogBuffer, LogSource};
use q_common::types::{ClientOrigin, OpaqueHandle, ServiceId};
use q_common::{log_debug, log_error, log_warn, Error, GatewayConfig, Result};
use q_hal::attribution::AttributionMap;
use q_hal::traits::AddressSpace;

use crate::completion::{CompletionChannel, Doorbell, OperationState};
use crate::copy::ModeSelection;
use crate::service::{BoundaryContext, CryptoService};
use crate::transport::Message;
use crate::validator::BoundaryValidator;

/// Secure-side dispatcher for every registered crypto service
pub struct Gateway<'s, M: AddressSpace> {
    mem: M,
    validator: BoundaryValidator,
    doorbells: CompletionChannel,
    log: LogBuffer,
    sequence: u32,
    services: Vec<&'s mut dyn CryptoService, MAX_SERVICES>,
}

impl<'s, M: AddressSpace> Gateway<'s, M> {
    /// Gateway over bus `mem` with the non-secure regions in `map`
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `config` exceeds the limits.
    pub fn new(mem: M, map: AttributionMap, config: &GatewayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            mem,
            validator: BoundaryValidator::new(map),
            doorbells: CompletionChannel::new(),
            log: LogBuffer::new(config.log_level),
            sequence: 0,
            services: Vec::new(),
        })
    }

    /// Make `service` reachable through [`Self::call`]
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if a service with the same id is
    /// already registered.
    pub fn register(&mut self, service: &'s mut dyn CryptoService) -> Result<()> {
        let id = service.id();
        if self.services.iter().any(|registered| registered.id() == id) {
            return Err(Error::InvalidConfig);
        }
        self.services.push(service).map_err(|_| Error::InvalidConfig)?;
        log_debug!(self.log, self.sequence, LogSource::Gateway, "registered {}", id.name());
        Ok(())
    }

    /// Handle one boundary call and return its PSA status
    ///
    /// Driver outcomes are carried in the message's output vector; the
    /// returned status only reports whether the boundary accepted the call.
    pub fn call(&mut self, service: ServiceId, msg: &mut Message<'_>) -> i32 {
        self.sequence = self.sequence.wrapping_add(1);
        let sequence = self.sequence;
        let Some(target) = self.services.iter_mut().find(|registered| registered.id() == service) else {
            log_warn!(self.log, sequence, LogSource::Gateway, "no service {}", service.name());
            return PSA_ERROR_CONNECTION_REFUSED;
        };
        let mut cx = BoundaryContext {
            mem: &mut self.mem,
            validator: &self.validator,
            doorbells: &mut self.doorbells,
            log: &mut self.log,
            sequence,
            origin: msg.origin(),
        };
        match target.handle_message(&mut cx, msg) {
            Ok(()) => PSA_SUCCESS,
            Err(err) => {
                if err.is_programmer_error() {
                    log_warn!(self.log, sequence, service, "msg {:#x} from {}: {}", msg.msg_type(), msg.client_id(), err);
                } else {
                    log_error!(self.log, sequence, service, "msg {:#x} from {}: {}", msg.msg_type(), msg.client_id(), err);
                }
                err.psa_status()
            }
        }
    }

    /// Engine interrupt: deliver every pending completion
    ///
    /// Returns the number of records written.
    pub fn service_interrupts(&mut self) -> usize {
        let mut cx = BoundaryContext {
            mem: &mut self.mem,
            validator: &self.validator,
            doorbells: &mut self.doorbells,
            log: &mut self.log,
            sequence: self.sequence,
            origin: ClientOrigin::Secure,
        };
        self.services
            .iter_mut()
            .map(|service| service.service_interrupt(&mut cx))
            .sum()
    }

    /// Next doorbell for the non-secure side
    pub fn take_doorbell(&mut self) -> Option<Doorbell> {
        self.doorbells.take()
    }

    /// Doorbells waiting to be taken
    #[must_use]
    pub fn pending_doorbells(&self) -> usize {
        self.doorbells.len()
    }

    /// Doorbells posted since the gateway started
    #[must_use]
    pub const fn posted_doorbells(&self) -> u32 {
        self.doorbells.posted()
    }

    /// Release the record named by `doorbell` once it has been read
    ///
    /// # Errors
    /// - [`Error::ServiceUnavailable`] for an unregistered service
    /// - [`Error::InvalidHandle`] if the record was not posted for that
    ///   instance, or the instance has since been closed
    pub fn acknowledge(&mut self, doorbell: &Doorbell) -> Result<()> {
        let service = self
            .services
            .iter_mut()
            .find(|registered| registered.id() == doorbell.service)
            .ok_or(Error::ServiceUnavailable)?;
        if service.acknowledge(doorbell) {
            Ok(())
        } else {
            Err(Error::InvalidHandle)
        }
    }

    /// Requested and effective return behavior of an instance
    #[must_use]
    pub fn mode(&self, service: ServiceId, handle: OpaqueHandle) -> Option<ModeSelection> {
        self.service(service)?.mode(handle)
    }

    /// Operation state of an instance
    #[must_use]
    pub fn state(&self, service: ServiceId, handle: OpaqueHandle) -> Option<OperationState> {
        self.service(service)?.state(handle)
    }

    fn service(&self, id: ServiceId) -> Option<&dyn CryptoService> {
        self.services
            .iter()
            .find(|registered| registered.id() == id)
            .map(|registered| &**registered)
    }

    /// Bus
    #[must_use]
    pub const fn memory(&self) -> &M {
        &self.mem
    }

    /// Bus, mutably
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    /// Boundary validator
    #[must_use]
    pub const fn validator(&self) -> &BoundaryValidator {
        &self.validator
    }

    /// Event log
    #[must_use]
    pub const fn log(&self) -> &LogBuffer {
        &self.log
    }

    /// Sequence number of the last call
    #[must_use]
    pub const fn sequence(&self) -> u32 {
        self.sequence
    }
}
