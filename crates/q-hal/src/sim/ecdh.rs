// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Simulated ECDH engine (NIST P-256)
//!
//! Public keys are written as uncompressed SEC1 points (65 bytes); shared
//! secrets as the 32-byte x-coordinate.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};

use q_common::constants::{DRIVER_STATUS_ERROR, DRIVER_STATUS_KEYSTORE_ERROR, DRIVER_STATUS_SUCCESS};

use super::engine::{read_span, KeyMaterial, Outcome, SimEngine};
use super::{sim_lifecycle, SimObject, SimState};
use crate::ops::{
    CryptoKey, EcdhComputeSharedSecret, EcdhCurve, EcdhGeneratePublicKey, KeyEncoding,
    OperationType,
};
use crate::traits::{AddressSpace, DriverStatus, EcdhDriver, InstanceId};

/// Uncompressed SEC1 point length for P-256
const P256_PUBLIC_KEY_LEN: usize = 65;

/// Shared secret length for P-256
const P256_SHARED_SECRET_LEN: usize = 32;

/// ECDH instances carry no state between operations
#[derive(Default)]
pub struct EcdhState;

impl SimState for EcdhState {}

/// Simulated ECDH engine
#[derive(Default)]
pub struct SimEcdh {
    engine: SimEngine,
}

impl SimEcdh {
    /// Idle engine
    #[must_use]
    pub const fn new() -> Self {
        Self {
            engine: SimEngine::new(),
        }
    }

    /// Submit a key-producing outcome and mirror the output key in place
    fn submit_with_key(
        &mut self,
        id: InstanceId,
        object: &SimObject<EcdhState>,
        operation_type: OperationType,
        result: Result<Outcome, DriverStatus>,
        output: &mut CryptoKey,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        let outcome = Outcome::from_result(operation_type, result);
        let produced = outcome.output_key();
        let status = self.engine.submit(id, object.behavior, outcome, mem);
        if status == DRIVER_STATUS_SUCCESS && !object.behavior.is_async() {
            if let Some(key) = produced {
                *output = key;
            }
        }
        status
    }
}

sim_lifecycle!(SimEcdh, EcdhState, 32);

fn secret_key(curve: EcdhCurve, key: &CryptoKey, mem: &dyn AddressSpace) -> Result<SecretKey, DriverStatus> {
    if curve != EcdhCurve::NistP256 {
        return Err(DRIVER_STATUS_ERROR);
    }
    let material = KeyMaterial::read(key, mem)?;
    SecretKey::from_slice(material.as_slice()).map_err(|_| DRIVER_STATUS_ERROR)
}

/// Queue `bytes` into a blank plaintext output key
fn fill_output(
    operation_type: OperationType,
    output: &CryptoKey,
    bytes: &[u8],
) -> Result<Outcome, DriverStatus> {
    match output.encoding {
        KeyEncoding::BlankPlaintext => {}
        KeyEncoding::BlankKeyStore => return Err(DRIVER_STATUS_KEYSTORE_ERROR),
        _ => return Err(DRIVER_STATUS_ERROR),
    }
    if (output.length as usize) < bytes.len() {
        return Err(DRIVER_STATUS_ERROR);
    }
    let filled = CryptoKey {
        encoding: output.encoding.filled(),
        length: bytes.len() as u32,
        ..*output
    };
    Ok(Outcome::new(operation_type)
        .write(output.material, bytes)?
        .with_output_key(filled))
}

fn public_key(op: &EcdhGeneratePublicKey, mem: &dyn AddressSpace) -> Result<Outcome, DriverStatus> {
    let secret = secret_key(op.curve, &op.private_key, mem)?;
    let point = secret.public_key().to_encoded_point(false);
    fill_output(OperationType::GeneratePublicKey, &op.public_key, point.as_bytes())
}

fn shared_secret(op: &EcdhComputeSharedSecret, mem: &dyn AddressSpace) -> Result<Outcome, DriverStatus> {
    let secret = secret_key(op.curve, &op.private_key, mem)?;
    if op.their_public_key.encoding != KeyEncoding::Plaintext
        || op.their_public_key.length as usize != P256_PUBLIC_KEY_LEN
    {
        return Err(DRIVER_STATUS_ERROR);
    }
    let peer = read_span::<P256_PUBLIC_KEY_LEN>(mem, op.their_public_key.material_span())?;
    let peer = PublicKey::from_sec1_bytes(&peer).map_err(|_| DRIVER_STATUS_ERROR)?;
    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
    let bytes = shared.raw_secret_bytes();
    fill_output(
        OperationType::ComputeSharedSecret,
        &op.shared_secret,
        &bytes[..P256_SHARED_SECRET_LEN],
    )
}

impl EcdhDriver for SimEcdh {
    fn generate_public_key(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        op: &mut EcdhGeneratePublicKey,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let result = public_key(op, &*mem);
        self.submit_with_key(id, object, OperationType::GeneratePublicKey, result, &mut op.public_key, mem)
    }

    fn compute_shared_secret(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        op: &mut EcdhComputeSharedSecret,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let result = shared_secret(op, &*mem);
        self.submit_with_key(
            id,
            object,
            OperationType::ComputeSharedSecret,
            result,
            &mut op.shared_secret,
            mem,
        )
    }
}
