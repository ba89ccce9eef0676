// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! End-to-end tests for q-gateway
//!
//! Every service is registered behind one gateway over simulated engines,
//! and calls go through the same message path a non-secure client uses.

#![cfg(test)]

use q_common::constants::*;
use q_common::types::{Addr, OpaqueHandle, ReturnBehavior, ServiceId};
use q_common::GatewayConfig;
use q_gateway::service::tag as lifecycle;
use q_gateway::wire::*;
use q_gateway::{
    AesCcmService, AesCmacService, AesEcbService, EcdhService, Gateway, Message, Sha2Service, TrngService,
};
use q_hal::attribution::{AttributionMap, AttributionRegion, UnprivilegedAccess};
use q_hal::ops::KeyEncoding;
use q_hal::sim::{SimAesCcm, SimAesCmac, SimAesEcb, SimEcdh, SimMemory, SimSha2, SimTrng};
use q_hal::traits::AddressSpace;

type Mem = SimMemory<0x4000>;

/// Non-secure RAM: 0x2000_0000..0x2000_3000
const NS: u32 = 0x2000_0000;
/// First secure address after the non-secure window
const SECURE: u32 = 0x2000_3000;
const NS_CLIENT: i32 = -7;
const S_CLIENT: i32 = 3;

const ARGS: u32 = NS + 0x800;
const RECORD: u32 = NS + 0x900;
const KEY: u32 = NS + 0xA00;
const KEY_STRUCT: u32 = NS + 0xA40;
const INPUT: u32 = NS + 0xB00;
const OUTPUT: u32 = NS + 0xC00;
const OP: u32 = NS + 0xD00;

/// FIPS-197 style vector: AES-128 of the zero block under the zero key
const ZERO_BLOCK_CIPHERTEXT: [u8; 16] = [
    0x66, 0xe9, 0x4b, 0xd4, 0xef, 0x8a, 0x2c, 0x3b, 0x88, 0x4c, 0xfa, 0x59, 0xca, 0x34, 0x2b, 0x2e,
];

/// SHA-256("abc")
const SHA256_ABC: [u8; 32] = [
    0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae, 0x22, 0x23, 0xb0, 0x03,
    0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61, 0xf2, 0x00, 0x15, 0xad,
];

// =============================================================================
// Fixture
// =============================================================================

fn attribution() -> AttributionMap {
    let mut map = AttributionMap::new();
    map.add_region(AttributionRegion::non_secure(NS, SECURE - NS, UnprivilegedAccess::ReadWrite).unwrap())
        .unwrap();
    map
}

/// Run `test` against a gateway with every service registered
fn with_gateway(config: &GatewayConfig, test: impl FnOnce(&mut Gateway<'_, Mem>)) {
    let mut ecb = AesEcbService::new(SimAesEcb::new(), config.aes_ecb).unwrap();
    let mut ccm = AesCcmService::new(SimAesCcm::new(), config.aes_ccm).unwrap();
    let mut cmac = AesCmacService::new(SimAesCmac::new(), config.aes_cmac).unwrap();
    let mut sha2 = Sha2Service::new(SimSha2::new(), config.sha2).unwrap();
    let mut ecdh = EcdhService::new(SimEcdh::new(), config.ecdh).unwrap();
    let mut trng = TrngService::new(SimTrng::default(), config.trng).unwrap();

    let mut gateway = Gateway::new(Mem::new(NS), attribution(), config).unwrap();
    gateway.register(&mut ecb).unwrap();
    gateway.register(&mut ccm).unwrap();
    gateway.register(&mut cmac).unwrap();
    gateway.register(&mut sha2).unwrap();
    gateway.register(&mut ecdh).unwrap();
    gateway.register(&mut trng).unwrap();
    test(&mut gateway);
}

fn put_bytes(gw: &mut Gateway<'_, Mem>, addr: u32, bytes: &[u8]) {
    gw.memory_mut().write(Addr(addr), bytes).unwrap();
}

fn put<T: WireStruct>(gw: &mut Gateway<'_, Mem>, addr: u32, value: &T) {
    let mut bytes = [0u8; MAX_WIRE_SIZE];
    value.encode(&mut bytes[..T::SIZE]).unwrap();
    put_bytes(gw, addr, &bytes[..T::SIZE]);
}

fn get(gw: &Gateway<'_, Mem>, addr: u32, len: usize) -> Vec<u8> {
    gw.memory().bytes(Addr(addr), len).unwrap().to_vec()
}

fn call<T: WireStruct>(
    gw: &mut Gateway<'_, Mem>,
    service: ServiceId,
    msg_type: u32,
    client_id: i32,
    input: &T,
    output: &mut [u8],
) -> i32 {
    let mut bytes = [0u8; MAX_WIRE_SIZE];
    input.encode(&mut bytes[..T::SIZE]).unwrap();
    let mut msg = Message::new(msg_type, client_id, &bytes[..T::SIZE], output);
    gw.call(service, &mut msg)
}

/// Call expecting a status reply: (PSA status, driver status)
fn status<T: WireStruct>(gw: &mut Gateway<'_, Mem>, service: ServiceId, msg_type: u32, client_id: i32, input: &T) -> (i32, i32) {
    let mut out = [0u8; StatusReply::SIZE];
    let psa = call(gw, service, msg_type, client_id, input, &mut out);
    (psa, i32::from_le_bytes(out))
}

/// Construct from the pool: (PSA status, handle)
fn construct_as(gw: &mut Gateway<'_, Mem>, service: ServiceId, client_id: i32, behavior: ReturnBehavior, custom: u32) -> (i32, OpaqueHandle) {
    put(
        gw,
        ARGS,
        &ConfigWire {
            object: Addr(ARGS + 0x40),
            hw_attrs: Addr(ARGS + 0x10),
        },
    );
    put(gw, ARGS + 0x10, &HwAttrsWire { int_priority: 2 });
    put(
        gw,
        ARGS + 0x20,
        &ParamsWire {
            return_behavior: behavior as u32,
            callback: 0,
            timeout: 0,
            custom,
        },
    );
    let msg = ConstructMsg {
        config: Addr(ARGS),
        params: Addr(ARGS + 0x20),
    };
    let mut out = [0u8; HandleReply::SIZE];
    let psa = call(gw, service, lifecycle::CONSTRUCT, client_id, &msg, &mut out);
    (psa, HandleReply::decode(&out).unwrap().handle)
}

fn construct(gw: &mut Gateway<'_, Mem>, service: ServiceId, behavior: ReturnBehavior) -> OpaqueHandle {
    let (psa, handle) = construct_as(gw, service, NS_CLIENT, behavior, 0);
    assert_eq!(psa, PSA_SUCCESS);
    assert!(!handle.is_null());
    handle
}

fn register_record(gw: &mut Gateway<'_, Mem>, service: ServiceId, handle: OpaqueHandle, record: u32) -> i32 {
    let msg = RegisterCallbackMsg {
        handle,
        record: Addr(record),
    };
    call(gw, service, lifecycle::REGISTER_CALLBACK, NS_CLIENT, &msg, &mut [])
}

fn close(gw: &mut Gateway<'_, Mem>, service: ServiceId, handle: OpaqueHandle) -> i32 {
    call(gw, service, lifecycle::CLOSE, NS_CLIENT, &HandleMsg { handle }, &mut [])
}

/// Zero key plus a one-block ECB descriptor from INPUT to `output`
fn stage_ecb(gw: &mut Gateway<'_, Mem>, output: u32) -> OperationMsg {
    put_bytes(gw, KEY, &[0u8; 16]);
    put(
        gw,
        KEY_STRUCT,
        &KeyWire {
            encoding: KeyEncoding::Plaintext as u32,
            material: Addr(KEY),
            key_id: 0,
            length: 16,
        },
    );
    put_bytes(gw, INPUT, &[0u8; 16]);
    put(
        gw,
        OP,
        &EcbOperationWire {
            key: Addr(KEY_STRUCT),
            input: Addr(INPUT),
            output: Addr(output),
            length: 16,
        },
    );
    OperationMsg {
        handle: OpaqueHandle::NULL,
        operation: Addr(OP),
    }
}

fn ecb_encrypt(gw: &mut Gateway<'_, Mem>, handle: OpaqueHandle, output: u32) -> (i32, i32) {
    let msg = OperationMsg {
        handle,
        ..stage_ecb(gw, output)
    };
    status(gw, ServiceId::AesEcb, q_gateway::services::aesecb::tag::ONE_STEP_ENCRYPT, NS_CLIENT, &msg)
}

// =============================================================================
// Dispatch
// =============================================================================

mod dispatch_tests {
    use super::*;

    #[test]
    fn test_ecb_known_answer_through_gateway() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = construct(gw, ServiceId::AesEcb, ReturnBehavior::Polling);
            assert_eq!(ecb_encrypt(gw, handle, OUTPUT), (PSA_SUCCESS, DRIVER_STATUS_SUCCESS));
            assert_eq!(get(gw, OUTPUT, 16), ZERO_BLOCK_CIPHERTEXT);
        });
    }

    #[test]
    fn test_unknown_tag_rejected() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = construct(gw, ServiceId::AesEcb, ReturnBehavior::Polling);
            let msg = OperationMsg {
                handle,
                operation: Addr(OP),
            };
            assert_eq!(status(gw, ServiceId::AesEcb, 0x7F, NS_CLIENT, &msg).0, PSA_ERROR_PROGRAMMER_ERROR);
        });
    }

    #[test]
    fn test_output_size_mismatch_rejected() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = construct(gw, ServiceId::AesEcb, ReturnBehavior::Polling);
            let msg = OperationMsg {
                handle,
                ..stage_ecb(gw, OUTPUT)
            };
            let mut short = [0u8; 2];
            let psa = call(
                gw,
                ServiceId::AesEcb,
                q_gateway::services::aesecb::tag::ONE_STEP_ENCRYPT,
                NS_CLIENT,
                &msg,
                &mut short,
            );
            assert_eq!(psa, PSA_ERROR_PROGRAMMER_ERROR);
            assert_eq!(get(gw, OUTPUT, 16), [0u8; 16]);
        });
    }

    #[test]
    fn test_handle_of_other_service_rejected() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = construct(gw, ServiceId::Sha2, ReturnBehavior::Polling);
            assert_eq!(ecb_encrypt(gw, handle, OUTPUT).0, PSA_ERROR_PROGRAMMER_ERROR);
        });
    }

    #[test]
    fn test_sha256_through_gateway() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let (psa, handle) = construct_as(gw, ServiceId::Sha2, NS_CLIENT, ReturnBehavior::Polling, 1);
            assert_eq!(psa, PSA_SUCCESS);
            put_bytes(gw, INPUT, b"abc");
            let msg = HashDataMsg {
                handle,
                data: Addr(INPUT),
                length: 3,
                digest: Addr(OUTPUT),
            };
            let result = status(gw, ServiceId::Sha2, q_gateway::services::sha2::tag::HASH_DATA, NS_CLIENT, &msg);
            assert_eq!(result, (PSA_SUCCESS, DRIVER_STATUS_SUCCESS));
            assert_eq!(get(gw, OUTPUT, 32), SHA256_ABC);
        });
    }
}

// =============================================================================
// Handles
// =============================================================================

mod handle_tests {
    use super::*;
    use q_common::ServiceConfig;

    fn small_pool() -> GatewayConfig {
        GatewayConfig {
            sha2: ServiceConfig::new(1, 2),
            ..GatewayConfig::DEFAULT
        }
    }

    #[test]
    fn test_pool_exhaustion_reports_insufficient_memory() {
        with_gateway(&small_pool(), |gw| {
            let first = construct(gw, ServiceId::Sha2, ReturnBehavior::Polling);
            let second = construct(gw, ServiceId::Sha2, ReturnBehavior::Polling);
            assert_ne!(first, second);
            let (psa, handle) = construct_as(gw, ServiceId::Sha2, NS_CLIENT, ReturnBehavior::Polling, 0);
            assert_eq!(psa, PSA_ERROR_INSUFFICIENT_MEMORY);
            assert!(handle.is_null());
        });
    }

    #[test]
    fn test_closed_slot_reused_with_new_generation() {
        with_gateway(&small_pool(), |gw| {
            let first = construct(gw, ServiceId::Sha2, ReturnBehavior::Polling);
            let _second = construct(gw, ServiceId::Sha2, ReturnBehavior::Polling);
            assert_eq!(close(gw, ServiceId::Sha2, first), PSA_SUCCESS);

            let reused = construct(gw, ServiceId::Sha2, ReturnBehavior::Polling);
            assert_ne!(reused, first);
            assert_eq!(close(gw, ServiceId::Sha2, first), PSA_ERROR_PROGRAMMER_ERROR);
            assert_eq!(close(gw, ServiceId::Sha2, reused), PSA_SUCCESS);
        });
    }

    #[test]
    fn test_handle_stable_across_operations() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = construct(gw, ServiceId::AesEcb, ReturnBehavior::Polling);
            for _ in 0..3 {
                assert_eq!(ecb_encrypt(gw, handle, OUTPUT), (PSA_SUCCESS, DRIVER_STATUS_SUCCESS));
            }
            assert_eq!(gw.mode(ServiceId::AesEcb, handle).map(|m| m.effective), Some(ReturnBehavior::Polling));
        });
    }

    #[test]
    fn test_static_instance_opens_once() {
        with_gateway(&small_pool(), |gw| {
            let msg = OpenMsg {
                index: 0,
                params: Addr::NULL,
            };
            let mut out = [0u8; HandleReply::SIZE];
            assert_eq!(call(gw, ServiceId::Sha2, lifecycle::OPEN, NS_CLIENT, &msg, &mut out), PSA_SUCCESS);
            let handle = HandleReply::decode(&out).unwrap().handle;
            assert!(!handle.is_null());

            let mut again = [0u8; HandleReply::SIZE];
            assert_eq!(call(gw, ServiceId::Sha2, lifecycle::OPEN, NS_CLIENT, &msg, &mut again), PSA_SUCCESS);
            assert!(HandleReply::decode(&again).unwrap().handle.is_null());

            let beyond = OpenMsg {
                index: 1,
                params: Addr::NULL,
            };
            assert_eq!(
                call(gw, ServiceId::Sha2, lifecycle::OPEN, NS_CLIENT, &beyond, &mut again),
                PSA_ERROR_PROGRAMMER_ERROR
            );
        });
    }
}

// =============================================================================
// Boundary
// =============================================================================

mod boundary_tests {
    use super::*;
    use q_gateway::OperationState;

    #[test]
    fn test_secure_output_rejected_without_state_change() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = construct(gw, ServiceId::AesEcb, ReturnBehavior::Polling);
            assert_eq!(ecb_encrypt(gw, handle, SECURE), (PSA_ERROR_PROGRAMMER_ERROR, 0));
            assert_eq!(gw.state(ServiceId::AesEcb, handle), Some(OperationState::Idle));
        });
    }

    #[test]
    fn test_range_crossing_into_secure_rejected() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = construct(gw, ServiceId::AesEcb, ReturnBehavior::Polling);
            assert_eq!(ecb_encrypt(gw, handle, SECURE - 8).0, PSA_ERROR_PROGRAMMER_ERROR);
            assert_eq!(gw.state(ServiceId::AesEcb, handle), Some(OperationState::Idle));
        });
    }

    #[test]
    fn test_secure_caller_may_touch_secure_memory() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let (psa, handle) = construct_as(gw, ServiceId::AesEcb, S_CLIENT, ReturnBehavior::Polling, 0);
            assert_eq!(psa, PSA_SUCCESS);
            let msg = OperationMsg {
                handle,
                ..stage_ecb(gw, SECURE)
            };
            let result = status(gw, ServiceId::AesEcb, q_gateway::services::aesecb::tag::ONE_STEP_ENCRYPT, S_CLIENT, &msg);
            assert_eq!(result, (PSA_SUCCESS, DRIVER_STATUS_SUCCESS));
            assert_eq!(get(gw, SECURE, 16), ZERO_BLOCK_CIPHERTEXT);
        });
    }

    #[test]
    fn test_secure_caller_limited_to_polling() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let (psa, handle) = construct_as(gw, ServiceId::AesEcb, S_CLIENT, ReturnBehavior::Blocking, 0);
            assert_eq!(psa, PSA_ERROR_PROGRAMMER_ERROR);
            assert!(handle.is_null());
        });
    }

    #[test]
    fn test_secure_cancel_rejected() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let (_, handle) = construct_as(gw, ServiceId::AesEcb, S_CLIENT, ReturnBehavior::Polling, 0);
            let psa = status(gw, ServiceId::AesEcb, lifecycle::CANCEL_OPERATION, S_CLIENT, &HandleMsg { handle }).0;
            assert_eq!(psa, PSA_ERROR_PROGRAMMER_ERROR);
        });
    }

    #[test]
    fn test_nonsecure_blocking_runs_as_callback() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let blocking = construct(gw, ServiceId::AesEcb, ReturnBehavior::Blocking);
            let mode = gw.mode(ServiceId::AesEcb, blocking).unwrap();
            assert_eq!(mode.requested, ReturnBehavior::Blocking);
            assert_eq!(mode.effective, ReturnBehavior::Callback);

            let polling = construct(gw, ServiceId::AesEcb, ReturnBehavior::Polling);
            assert_eq!(gw.mode(ServiceId::AesEcb, polling).unwrap().effective, ReturnBehavior::Polling);
        });
    }
}

// =============================================================================
// Completions
// =============================================================================

mod completion_tests {
    use super::*;
    use q_gateway::{CompletionRecord, OperationState};

    fn async_ecb(gw: &mut Gateway<'_, Mem>) -> OpaqueHandle {
        let handle = construct(gw, ServiceId::AesEcb, ReturnBehavior::Callback);
        assert_eq!(register_record(gw, ServiceId::AesEcb, handle, RECORD), PSA_SUCCESS);
        handle
    }

    #[test]
    fn test_one_doorbell_per_operation() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = async_ecb(gw);
            assert_eq!(ecb_encrypt(gw, handle, OUTPUT), (PSA_SUCCESS, DRIVER_STATUS_SUCCESS));
            assert_eq!(gw.state(ServiceId::AesEcb, handle), Some(OperationState::AwaitingHardware));
            assert_eq!(get(gw, OUTPUT, 16), [0u8; 16]);
            assert_eq!(gw.pending_doorbells(), 0);

            assert_eq!(gw.service_interrupts(), 1);
            assert_eq!(gw.service_interrupts(), 0);
            assert_eq!(gw.pending_doorbells(), 1);
            assert_eq!(gw.state(ServiceId::AesEcb, handle), Some(OperationState::Posted));
            assert_eq!(gw.posted_doorbells(), 1);

            let doorbell = gw.take_doorbell().unwrap();
            assert_eq!(doorbell.record, Addr(RECORD));
            let record = CompletionRecord::read(gw.memory(), doorbell.record).unwrap();
            assert_eq!(record.handle, handle);
            assert_eq!(record.return_value, DRIVER_STATUS_SUCCESS);
            assert_eq!(record.operation, Addr(OP));
            assert_eq!(get(gw, OUTPUT, 16), ZERO_BLOCK_CIPHERTEXT);

            assert_eq!(gw.acknowledge(&doorbell), Ok(()));
            assert_eq!(gw.state(ServiceId::AesEcb, handle), Some(OperationState::Consumed));
            assert!(gw.acknowledge(&doorbell).is_err());
        });
    }

    #[test]
    fn test_unconsumed_record_blocks_next_submit() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = async_ecb(gw);
            ecb_encrypt(gw, handle, OUTPUT);
            gw.service_interrupts();
            assert_eq!(ecb_encrypt(gw, handle, OUTPUT).0, PSA_ERROR_PROGRAMMER_ERROR);

            let doorbell = gw.take_doorbell().unwrap();
            gw.acknowledge(&doorbell).unwrap();
            assert_eq!(ecb_encrypt(gw, handle, OUTPUT), (PSA_SUCCESS, DRIVER_STATUS_SUCCESS));
        });
    }

    #[test]
    fn test_submit_without_record_rejected() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = construct(gw, ServiceId::AesEcb, ReturnBehavior::Callback);
            assert_eq!(ecb_encrypt(gw, handle, OUTPUT).0, PSA_ERROR_PROGRAMMER_ERROR);
            assert_eq!(gw.state(ServiceId::AesEcb, handle), Some(OperationState::Idle));
        });
    }

    #[test]
    fn test_close_before_completion_writes_no_record() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = async_ecb(gw);
            ecb_encrypt(gw, handle, OUTPUT);
            assert_eq!(close(gw, ServiceId::AesEcb, handle), PSA_SUCCESS);

            assert_eq!(gw.service_interrupts(), 0);
            assert_eq!(gw.pending_doorbells(), 0);
            assert_eq!(get(gw, RECORD, CALLBACK_RECORD_SIZE as usize), [0u8; 20]);
        });
    }

    #[test]
    fn test_cancel_before_completion_posts_canceled() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = async_ecb(gw);
            ecb_encrypt(gw, handle, OUTPUT);
            let cancel = status(gw, ServiceId::AesEcb, lifecycle::CANCEL_OPERATION, NS_CLIENT, &HandleMsg { handle });
            assert_eq!(cancel, (PSA_SUCCESS, DRIVER_STATUS_SUCCESS));

            assert_eq!(gw.service_interrupts(), 1);
            let doorbell = gw.take_doorbell().unwrap();
            let record = CompletionRecord::read(gw.memory(), doorbell.record).unwrap();
            assert_eq!(record.return_value, DRIVER_STATUS_CANCELED);
            assert_eq!(get(gw, OUTPUT, 16), [0u8; 16]);
        });
    }

    #[test]
    fn test_resubmit_waits_for_canceled_completion() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = async_ecb(gw);
            ecb_encrypt(gw, handle, OUTPUT);
            let cancel = status(gw, ServiceId::AesEcb, lifecycle::CANCEL_OPERATION, NS_CLIENT, &HandleMsg { handle });
            assert_eq!(cancel, (PSA_SUCCESS, DRIVER_STATUS_SUCCESS));
            assert_eq!(ecb_encrypt(gw, handle, OUTPUT).0, PSA_ERROR_PROGRAMMER_ERROR);

            assert_eq!(gw.service_interrupts(), 1);
            let doorbell = gw.take_doorbell().unwrap();
            let record = CompletionRecord::read(gw.memory(), doorbell.record).unwrap();
            assert_eq!(record.return_value, DRIVER_STATUS_CANCELED);
            gw.acknowledge(&doorbell).unwrap();

            assert_eq!(ecb_encrypt(gw, handle, OUTPUT), (PSA_SUCCESS, DRIVER_STATUS_SUCCESS));
            assert_eq!(gw.service_interrupts(), 1);
            let doorbell = gw.take_doorbell().unwrap();
            let record = CompletionRecord::read(gw.memory(), doorbell.record).unwrap();
            assert_eq!(record.return_value, DRIVER_STATUS_SUCCESS);
            assert_eq!(get(gw, OUTPUT, 16), ZERO_BLOCK_CIPHERTEXT);
        });
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = async_ecb(gw);
            ecb_encrypt(gw, handle, OUTPUT);
            gw.service_interrupts();
            let cancel = status(gw, ServiceId::AesEcb, lifecycle::CANCEL_OPERATION, NS_CLIENT, &HandleMsg { handle });
            assert_eq!(cancel, (PSA_SUCCESS, DRIVER_STATUS_SUCCESS));
            assert_eq!(gw.service_interrupts(), 0);
            assert_eq!(gw.pending_doorbells(), 1);

            let doorbell = gw.take_doorbell().unwrap();
            let record = CompletionRecord::read(gw.memory(), doorbell.record).unwrap();
            assert_eq!(record.return_value, DRIVER_STATUS_SUCCESS);
        });
    }

    #[test]
    fn test_record_in_secure_memory_rejected() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let handle = construct(gw, ServiceId::AesEcb, ReturnBehavior::Callback);
            assert_eq!(register_record(gw, ServiceId::AesEcb, handle, SECURE), PSA_ERROR_PROGRAMMER_ERROR);
        });
    }
}

// =============================================================================
// Non-Secure Runtime
// =============================================================================

mod nonsecure_tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};
    use q_common::Error;
    use q_gateway::nonsecure::NsError;
    use q_gateway::{NsClient, NsCompletion, NsParams};

    const ARENA: u32 = NS + 0x1000;
    const ARENA_LEN: u32 = 0x2000;

    fn client<'g, 's>(gw: &'g mut Gateway<'s, Mem>) -> NsClient<'g, 's, Mem> {
        NsClient::new(gw, NS_CLIENT, Addr(ARENA), ARENA_LEN).unwrap()
    }

    fn ecb_op(ns: &mut NsClient<'_, '_, Mem>, handle: OpaqueHandle) -> OperationMsg {
        OperationMsg {
            handle,
            ..stage_ecb(ns.gateway(), OUTPUT)
        }
    }

    #[test]
    fn test_blocking_call_returns_completed_result() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let mut ns = client(gw);
            let handle = ns.construct(ServiceId::AesEcb, &NsParams::default(), 2).unwrap();
            let msg = ecb_op(&mut ns, handle);
            let status = ns.submit(ServiceId::AesEcb, handle, q_gateway::services::aesecb::tag::ONE_STEP_ENCRYPT, &msg);
            assert_eq!(status, Ok(DRIVER_STATUS_SUCCESS));
            assert_eq!(get(ns.gateway(), OUTPUT, 16), ZERO_BLOCK_CIPHERTEXT);
            assert_eq!(ns.gateway().pending_doorbells(), 0);
            assert_eq!(ns.close(ServiceId::AesEcb, handle), Ok(()));
        });
    }

    static COMPLETIONS: AtomicU32 = AtomicU32::new(0);

    fn on_done(completion: &NsCompletion) {
        assert_eq!(completion.service, ServiceId::AesEcb);
        assert_eq!(completion.status, DRIVER_STATUS_SUCCESS);
        COMPLETIONS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_callback_runs_after_interrupt() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let mut ns = client(gw);
            let handle = ns.construct(ServiceId::AesEcb, &NsParams::callback(on_done), 2).unwrap();
            let msg = ecb_op(&mut ns, handle);
            let tag = q_gateway::services::aesecb::tag::ONE_STEP_ENCRYPT;
            assert_eq!(ns.submit(ServiceId::AesEcb, handle, tag, &msg), Ok(DRIVER_STATUS_SUCCESS));
            assert_eq!(
                ns.submit(ServiceId::AesEcb, handle, tag, &msg),
                Err(NsError::Client(Error::CompletionPending))
            );

            let before = COMPLETIONS.load(Ordering::SeqCst);
            assert_eq!(ns.process_doorbells(), 0);
            ns.gateway().service_interrupts();
            assert_eq!(ns.process_doorbells(), 1);
            assert_eq!(COMPLETIONS.load(Ordering::SeqCst), before + 1);

            assert_eq!(ns.submit(ServiceId::AesEcb, handle, tag, &msg), Ok(DRIVER_STATUS_SUCCESS));
        });
    }

    #[test]
    fn test_polling_hash() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let mut ns = client(gw);
            let params = NsParams {
                custom: 1,
                ..NsParams::new(ReturnBehavior::Polling)
            };
            let handle = ns.construct(ServiceId::Sha2, &params, 2).unwrap();
            let data = ns.alloc(3).unwrap();
            let digest = ns.alloc(32).unwrap();
            ns.memory().write(data, b"abc").unwrap();
            let msg = HashDataMsg {
                handle,
                data,
                length: 3,
                digest,
            };
            let status = ns.submit(ServiceId::Sha2, handle, q_gateway::services::sha2::tag::HASH_DATA, &msg);
            assert_eq!(status, Ok(DRIVER_STATUS_SUCCESS));
            assert_eq!(get(ns.gateway(), digest.0, 32), SHA256_ABC);
        });
    }

    #[test]
    fn test_blocking_random_bytes_use_second_record() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            let mut ns = client(gw);
            let handle = ns.construct(ServiceId::Trng, &NsParams::default(), 2).unwrap();
            let buffer = ns.alloc(48).unwrap();
            let msg = BufferMsg {
                handle,
                buffer,
                length: 48,
            };
            let tag = q_gateway::services::trng::tag::GET_RANDOM_BYTES;
            assert_eq!(ns.submit(ServiceId::Trng, handle, tag, &msg), Ok(DRIVER_STATUS_SUCCESS));
            assert_ne!(get(ns.gateway(), buffer.0, 48), [0u8; 48]);
        });
    }

    #[test]
    fn test_rejected_call_reports_psa_status() {
        let config = GatewayConfig {
            sha2: q_common::ServiceConfig::new(0, 1),
            ..GatewayConfig::DEFAULT
        };
        with_gateway(&config, |gw| {
            let mut ns = client(gw);
            let params = NsParams::new(ReturnBehavior::Polling);
            let first = ns.construct(ServiceId::Sha2, &params, 2).unwrap();
            assert_eq!(
                ns.construct(ServiceId::Sha2, &params, 2),
                Err(NsError::Rejected(PSA_ERROR_INSUFFICIENT_MEMORY))
            );
            ns.close(ServiceId::Sha2, first).unwrap();
            assert!(ns.construct(ServiceId::Sha2, &params, 2).is_ok());
        });
    }

    #[test]
    fn test_secure_client_id_refused() {
        with_gateway(&GatewayConfig::DEFAULT, |gw| {
            assert!(matches!(
                NsClient::new(gw, S_CLIENT, Addr(ARENA), ARENA_LEN),
                Err(NsError::Client(Error::InvalidParameter))
            ));
        });
    }
}
