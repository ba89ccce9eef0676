// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Simulated SHA-2 engine

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use q_common::constants::{DRIVER_STATUS_ERROR, DRIVER_STATUS_SUCCESS};
use q_common::types::{Addr, Span};

use super::engine::{for_each_chunk, KeyMaterial, Outcome, SimEngine};
use super::{sim_lifecycle, SimObject, SimState};
use crate::ops::{CryptoKey, HashType, OperationType};
use crate::traits::{AddressSpace, DriverParams, DriverStatus, InstanceId, Sha2Driver};

fn copy_digest(out: &mut [u8; 64], digest: &[u8]) -> usize {
    out[..digest.len()].copy_from_slice(digest);
    digest.len()
}

/// Running hash
enum Hasher {
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Hasher {
    fn new(hash_type: HashType) -> Self {
        match hash_type {
            HashType::Sha224 => Self::Sha224(Sha224::new()),
            HashType::Sha256 => Self::Sha256(Sha256::new()),
            HashType::Sha384 => Self::Sha384(Sha384::new()),
            HashType::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha224(h) => Digest::update(h, data),
            Self::Sha256(h) => Digest::update(h, data),
            Self::Sha384(h) => Digest::update(h, data),
            Self::Sha512(h) => Digest::update(h, data),
        }
    }

    fn finish(self, out: &mut [u8; 64]) -> usize {
        match self {
            Self::Sha224(h) => copy_digest(out, &h.finalize()),
            Self::Sha256(h) => copy_digest(out, &h.finalize()),
            Self::Sha384(h) => copy_digest(out, &h.finalize()),
            Self::Sha512(h) => copy_digest(out, &h.finalize()),
        }
    }
}

/// Running HMAC
enum Keyed {
    Sha224(Hmac<Sha224>),
    Sha256(Hmac<Sha256>),
    Sha384(Hmac<Sha384>),
    Sha512(Hmac<Sha512>),
}

impl Keyed {
    fn new(hash_type: HashType, key: &[u8]) -> Result<Self, DriverStatus> {
        match hash_type {
            HashType::Sha224 => <Hmac<Sha224> as Mac>::new_from_slice(key).map(Self::Sha224),
            HashType::Sha256 => <Hmac<Sha256> as Mac>::new_from_slice(key).map(Self::Sha256),
            HashType::Sha384 => <Hmac<Sha384> as Mac>::new_from_slice(key).map(Self::Sha384),
            HashType::Sha512 => <Hmac<Sha512> as Mac>::new_from_slice(key).map(Self::Sha512),
        }
        .map_err(|_| DRIVER_STATUS_ERROR)
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha224(m) => Mac::update(m, data),
            Self::Sha256(m) => Mac::update(m, data),
            Self::Sha384(m) => Mac::update(m, data),
            Self::Sha512(m) => Mac::update(m, data),
        }
    }

    fn finish(self, out: &mut [u8; 64]) -> usize {
        match self {
            Self::Sha224(m) => copy_digest(out, &m.finalize().into_bytes()),
            Self::Sha256(m) => copy_digest(out, &m.finalize().into_bytes()),
            Self::Sha384(m) => copy_digest(out, &m.finalize().into_bytes()),
            Self::Sha512(m) => copy_digest(out, &m.finalize().into_bytes()),
        }
    }
}

enum Segmented {
    Hash(Hasher),
    Hmac(Keyed),
}

/// Hash selection and segmented state of one instance
pub struct Sha2State {
    hash_type: HashType,
    segmented: Option<Segmented>,
}

impl Default for Sha2State {
    fn default() -> Self {
        Self {
            hash_type: HashType::Sha256,
            segmented: None,
        }
    }
}

impl SimState for Sha2State {
    fn from_params(params: &DriverParams) -> Self {
        Self {
            hash_type: HashType::from_u32(params.custom).unwrap_or(HashType::Sha256),
            segmented: None,
        }
    }

    fn abort(&mut self) {
        self.segmented = None;
    }
}

/// Simulated SHA-2 engine
#[derive(Default)]
pub struct SimSha2 {
    engine: SimEngine,
}

impl SimSha2 {
    /// Idle engine
    #[must_use]
    pub const fn new() -> Self {
        Self {
            engine: SimEngine::new(),
        }
    }

    fn submit(
        &mut self,
        id: InstanceId,
        object: &SimObject<Sha2State>,
        operation_type: OperationType,
        result: Result<Outcome, DriverStatus>,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        let outcome = Outcome::from_result(operation_type, result);
        self.engine.submit(id, object.behavior, outcome, mem)
    }
}

sim_lifecycle!(SimSha2, Sha2State, 96);

fn emit(operation_type: OperationType, out: Addr, digest: &[u8]) -> Result<Outcome, DriverStatus> {
    Outcome::new(operation_type).write(out, digest)
}

impl Sha2Driver for SimSha2 {
    fn hash_type(&self, object: &Self::Object) -> HashType {
        object.state.hash_type
    }

    fn set_hash_type(&mut self, _id: InstanceId, object: &mut Self::Object, hash_type: HashType) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        object.state.hash_type = hash_type;
        object.state.segmented = None;
        DRIVER_STATUS_SUCCESS
    }

    fn hash_data(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        data: Span,
        digest: Addr,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let operation_type = OperationType::HashData;
        let mut hasher = Hasher::new(object.state.hash_type);
        let mut out = [0u8; 64];
        let result = for_each_chunk(&*mem, data, |chunk| hasher.update(chunk)).and_then(|()| {
            let len = hasher.finish(&mut out);
            emit(operation_type, digest, &out[..len])
        });
        self.submit(id, object, operation_type, result, mem)
    }

    fn hmac(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        key: &CryptoKey,
        data: Span,
        mac: Addr,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let operation_type = OperationType::Hmac;
        let hash_type = object.state.hash_type;
        let mut out = [0u8; 64];
        let result = KeyMaterial::read(key, &*mem)
            .and_then(|material| Keyed::new(hash_type, material.as_slice()))
            .and_then(|mut keyed| {
                for_each_chunk(&*mem, data, |chunk| keyed.update(chunk))?;
                let len = keyed.finish(&mut out);
                emit(operation_type, mac, &out[..len])
            });
        self.submit(id, object, operation_type, result, mem)
    }

    fn setup_hmac(
        &mut self,
        _id: InstanceId,
        object: &mut Self::Object,
        key: &CryptoKey,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        match KeyMaterial::read(key, &*mem).and_then(|m| Keyed::new(object.state.hash_type, m.as_slice())) {
            Ok(keyed) => {
                object.state.segmented = Some(Segmented::Hmac(keyed));
                DRIVER_STATUS_SUCCESS
            }
            Err(status) => status,
        }
    }

    fn add_data(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        data: Span,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let operation_type = OperationType::HashSegment;
        let hash_type = object.state.hash_type;
        let segmented = object
            .state
            .segmented
            .get_or_insert_with(|| Segmented::Hash(Hasher::new(hash_type)));
        let result = for_each_chunk(&*mem, data, |chunk| match &mut *segmented {
            Segmented::Hash(h) => h.update(chunk),
            Segmented::Hmac(m) => m.update(chunk),
        })
        .map(|()| Outcome::new(operation_type));
        self.submit(id, object, operation_type, result, mem)
    }

    fn finalize(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        digest: Addr,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let operation_type = OperationType::HashFinalize;
        let mut out = [0u8; 64];
        let result = match object.state.segmented.take() {
            Some(Segmented::Hash(hasher)) => {
                let len = hasher.finish(&mut out);
                emit(operation_type, digest, &out[..len])
            }
            // Nothing absorbed yet: digest of the empty message
            None => {
                let len = Hasher::new(object.state.hash_type).finish(&mut out);
                emit(operation_type, digest, &out[..len])
            }
            Some(Segmented::Hmac(_)) => Err(DRIVER_STATUS_ERROR),
        };
        self.submit(id, object, operation_type, result, mem)
    }

    fn finalize_hmac(
        &mut self,
        id: InstanceId,
        object: &mut Self::Object,
        mac: Addr,
        mem: &mut dyn AddressSpace,
    ) -> DriverStatus {
        if let Err(status) = self.engine.admit(object.open) {
            return status;
        }
        let operation_type = OperationType::HmacFinalize;
        let mut out = [0u8; 64];
        let result = match object.state.segmented.take() {
            Some(Segmented::Hmac(keyed)) => {
                let len = keyed.finish(&mut out);
                emit(operation_type, mac, &out[..len])
            }
            _ => Err(DRIVER_STATUS_ERROR),
        };
        self.submit(id, object, operation_type, result, mem)
    }

    fn reset(&mut self, _id: InstanceId, object: &mut Self::Object) {
        object.state.segmented = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_abc() {
        let mut hasher = Hasher::new(HashType::Sha256);
        hasher.update(b"abc");
        let mut out = [0u8; 64];
        assert_eq!(hasher.finish(&mut out), 32);
        assert_eq!(out[..4], [0xba, 0x78, 0x16, 0xbf]);
        assert_eq!(out[28..32], [0xf2, 0x00, 0x15, 0xad]);
    }

    #[test]
    fn test_digest_lengths_follow_hash_type() {
        for hash_type in [HashType::Sha224, HashType::Sha256, HashType::Sha384, HashType::Sha512] {
            let mut out = [0u8; 64];
            assert_eq!(Hasher::new(hash_type).finish(&mut out), hash_type.digest_len() as usize);
        }
    }
}
