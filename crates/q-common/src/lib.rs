// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Qbitel EdgeOS crypto gateway common library
//!
//! Types, status codes, error definitions, configuration and logging shared
//! by the driver contract (`q-hal`) and the secure/non-secure boundary
//! (`q-gateway`).
//!
//! # Features
//!
//! - `std`: Enable standard library support (disabled by default for embedded)
//! - `defmt`: Derive `defmt::Format` on the shared types
//!
//! # Security
//!
//! No heap allocations are performed. Handles are opaque values that never
//! encode a secure address.

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(feature = "std")]
extern crate std;

pub mod config;
pub mod constants;
pub mod errors;
pub mod log;
pub mod types;

pub use config::{GatewayConfig, ServiceConfig};
pub use errors::{Error, Result};
pub use log::{LogBuffer, LogLevel, LogSource};
pub use types::*;
