// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Secure/non-secure crypto service boundary
//!
//! This crate is the marshalling layer that lets untrusted (non-secure) code
//! drive the hardware crypto engines owned by the secure domain. It provides:
//!
//! - **Handle table**: opaque `{tag, generation, index}` handles resolved
//!   through a per-service arena of static and pooled instances
//! - **Boundary validator**: every caller pointer is checked against the
//!   security attribution map before it is read or written
//! - **Copy engine**: descriptors and keys are copied into secure memory and
//!   normalized before a driver sees them
//! - **Completion dispatcher**: asynchronous results are written into
//!   caller-owned records and announced through a bounded doorbell queue
//! - **Service dispatch**: one message handler per service (AES-CCM, AES-ECB,
//!   AES-CMAC, SHA-2, ECDH, TRNG)
//! - **Non-secure runtime**: the client side that marshals calls, waits on
//!   blocking operations and runs application callbacks
//!
//! # Security
//!
//! - A validation failure aborts the call before any instance state changes
//!   or any driver is invoked
//! - Handles never encode a secure address; stale generations are rejected
//! - A completion for a closed instance is dropped, never written
//!
//! # Example
//!
//! ```ignore
//! let mut ecb = AesEcbService::new(SimAesEcb::new(), config.aes_ecb)?;
//! let mut gateway = Gateway::new(memory, attribution_map, &config)?;
//! gateway.register(&mut ecb)?;
//! let status = gateway.call(ServiceId::AesEcb, &mut message);
//! ```

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(feature = "std")]
extern crate std;

pub mod completion;
pub mod copy;
pub mod gateway;
pub mod handle;
pub mod nonsecure;
pub mod service;
pub mod services;
pub mod transport;
pub mod validator;
pub mod wire;

#[cfg(test)]
mod testing;

pub use completion::{CompletionRecord, Doorbell, OperationState};
pub use copy::{normalize_mode, ModeSelection};
pub use gateway::Gateway;
pub use handle::HandleTable;
pub use nonsecure::{NsClient, NsCompletion, NsParams};
pub use service::{BoundaryContext, CryptoService};
pub use services::{AesCcmService, AesCmacService, AesEcbService, EcdhService, Sha2Service, TrngService};
pub use transport::Message;
pub use validator::BoundaryValidator;
