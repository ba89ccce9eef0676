// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Crypto services
//!
//! One service per engine. Each decodes its operation messages, copies the
//! descriptors into its scratch slot with direction-correct validation and
//! forwards to the driver through the shared [`ServiceCore`].
//!
//! Operation tags start at [`tag::OPERATION_BASE`]; lifecycle tags below it
//! are handled by the core.
//!
//! [`ServiceCore`]: crate::service::ServiceCore
//! [`tag::OPERATION_BASE`]: crate::service::tag::OPERATION_BASE

pub mod aesccm;
pub mod aescmac;
pub mod aesecb;
pub mod ecdh;
pub mod sha2;
pub mod trng;

pub use aesccm::AesCcmService;
pub use aescmac::AesCmacService;
pub use aesecb::AesEcbService;
pub use ecdh::EcdhService;
pub use sha2::Sha2Service;
pub use trng::TrngService;
