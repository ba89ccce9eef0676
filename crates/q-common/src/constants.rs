// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Boundary-wide constants
//!
//! Status codes returned across the secure/non-secure boundary, handle
//! encoding masks and compile-time capacity limits.

// =============================================================================
// PSA Status Codes
// =============================================================================

/// Call completed
pub const PSA_SUCCESS: i32 = 0;
/// Caller violated the boundary contract
pub const PSA_ERROR_PROGRAMMER_ERROR: i32 = -129;
/// Connection refused by the partition
pub const PSA_ERROR_CONNECTION_REFUSED: i32 = -130;
/// Unspecified internal failure
pub const PSA_ERROR_GENERIC_ERROR: i32 = -132;
/// Caller is not allowed to perform the request
pub const PSA_ERROR_NOT_PERMITTED: i32 = -133;
/// Request is not supported
pub const PSA_ERROR_NOT_SUPPORTED: i32 = -134;
/// Invalid argument
pub const PSA_ERROR_INVALID_ARGUMENT: i32 = -135;
/// Handle does not name a live instance
pub const PSA_ERROR_INVALID_HANDLE: i32 = -136;
/// Instance pool or queue exhausted
pub const PSA_ERROR_INSUFFICIENT_MEMORY: i32 = -141;

// =============================================================================
// Driver Status Codes
// =============================================================================

/// Driver operation succeeded
pub const DRIVER_STATUS_SUCCESS: i32 = 0;
/// Generic driver failure
pub const DRIVER_STATUS_ERROR: i32 = -1;
/// Hardware engine busy with another operation
pub const DRIVER_STATUS_RESOURCE_UNAVAILABLE: i32 = -2;
/// Operation was canceled before it completed
pub const DRIVER_STATUS_CANCELED: i32 = -3;
/// MAC verification failed
pub const DRIVER_STATUS_MAC_INVALID: i32 = -4;
/// Key store lookup failed
pub const DRIVER_STATUS_KEYSTORE_ERROR: i32 = -5;

// =============================================================================
// Handle Encoding
// =============================================================================

/// Shift of the service tag within an opaque handle
pub const HANDLE_TAG_SHIFT: u32 = 24;
/// Mask of the service tag
pub const HANDLE_TAG_MASK: u32 = 0xFF00_0000;
/// Shift of the slot generation
pub const HANDLE_GENERATION_SHIFT: u32 = 8;
/// Mask of the slot generation
pub const HANDLE_GENERATION_MASK: u32 = 0x00FF_FF00;
/// Mask of the slot index
pub const HANDLE_INDEX_MASK: u32 = 0x0000_00FF;
/// Handle value meaning "no instance"
pub const NULL_HANDLE: u32 = 0;

// =============================================================================
// Capacity Limits
// =============================================================================

/// Maximum statically provisioned instances per service
pub const MAX_STATIC_INSTANCES: usize = 4;
/// Maximum dynamic pool slots per service
pub const MAX_POOL_SIZE: usize = 4;
/// Maximum instances per service (static + pool)
pub const MAX_INSTANCES: usize = MAX_STATIC_INSTANCES + MAX_POOL_SIZE;
/// Number of services hosted by one gateway
pub const MAX_SERVICES: usize = 6;
/// Callback records one instance may register (TRNG registers two)
pub const MAX_RECORDS_PER_INSTANCE: usize = 2;
/// Depth of the completion doorbell queue shared by all services
///
/// A record posts at most once until consumed, so the queue holds one entry
/// for every record that could ever be registered.
pub const DOORBELL_QUEUE_DEPTH: usize = MAX_SERVICES * MAX_INSTANCES * MAX_RECORDS_PER_INSTANCE;
/// Size of the completion record written into non-secure memory
pub const CALLBACK_RECORD_SIZE: u32 = 20;

// =============================================================================
// Key Sizes
// =============================================================================

/// AES-128 key size in bytes
pub const AES_128_KEY_SIZE: usize = 16;
/// AES-192 key size in bytes
pub const AES_192_KEY_SIZE: usize = 24;
/// AES-256 key size in bytes
pub const AES_256_KEY_SIZE: usize = 32;
/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;
/// Largest plaintext key the boundary accepts (an HMAC-SHA-512 block)
pub const MAX_KEY_SIZE: usize = 128;
