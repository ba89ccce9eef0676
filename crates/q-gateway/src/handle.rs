// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Capability/handle table
//!
//! Each service keeps its instances in a fixed arena: the first
//! `static_count` slots are provisioned instances opened by index, the next
//! `pool_size` slots form the dynamic pool filled by construct. A handle is
//! `{service tag, slot generation, slot index}`; it is only ever resolved by
//! looking the slot up, never by computing an address from it.
//!
//! Releasing a slot bumps its generation, so every handle issued for the
//! previous occupant stops resolving and a completion still in flight for it
//! can be recognised as stale.

use q_common::config::ServiceConfig;
use q_common::constants::MAX_INSTANCES;
use q_common::types::{OpaqueHandle, ServiceId};
use q_common::{Error, Result};
use q_hal::traits::InstanceId;

/// Kind of slot an instance lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Provisioned at build time, opened by index
    Static,
    /// Dynamic pool slot
    Pool,
}

struct Slot<T> {
    generation: u16,
    entry: Option<T>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            generation: 0,
            entry: None,
        }
    }
}

/// Arena of instances for one service
pub struct HandleTable<T> {
    service: ServiceId,
    static_count: u8,
    pool_size: u8,
    slots: [Slot<T>; MAX_INSTANCES],
}

impl<T> HandleTable<T> {
    /// Empty table sized by `config`
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `config` exceeds the limits.
    pub fn new(service: ServiceId, config: &ServiceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            service,
            static_count: config.static_count,
            pool_size: config.pool_size,
            slots: core::array::from_fn(|_| Slot::default()),
        })
    }

    /// Service owning the table
    #[must_use]
    pub const fn service(&self) -> ServiceId {
        self.service
    }

    /// Number of provisioned instances
    #[must_use]
    pub const fn static_count(&self) -> u8 {
        self.static_count
    }

    /// Number of pool slots
    #[must_use]
    pub const fn pool_size(&self) -> u8 {
        self.pool_size
    }

    /// Addressable slots
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.static_count as usize + self.pool_size as usize
    }

    /// Kind of slot `index`, if addressable
    #[must_use]
    pub const fn slot_kind(&self, index: u8) -> Option<SlotKind> {
        if index < self.static_count {
            Some(SlotKind::Static)
        } else if (index as usize) < self.capacity() {
            Some(SlotKind::Pool)
        } else {
            None
        }
    }

    /// Pool slots currently holding an instance
    #[must_use]
    pub fn pool_in_use(&self) -> usize {
        self.slots[self.static_count as usize..self.capacity()]
            .iter()
            .filter(|slot| slot.entry.is_some())
            .count()
    }

    fn slot(&self, index: u8) -> Option<&Slot<T>> {
        self.slot_kind(index)?;
        self.slots.get(index as usize)
    }

    fn slot_mut(&mut self, index: u8) -> Option<&mut Slot<T>> {
        self.slot_kind(index)?;
        self.slots.get_mut(index as usize)
    }

    /// Resolve a caller handle to a live instance
    ///
    /// # Errors
    /// Returns [`Error::InvalidHandle`] for a foreign tag, an index outside
    /// both ranges, an empty slot or a stale generation.
    pub fn resolve(&self, handle: OpaqueHandle) -> Result<InstanceId> {
        if handle.is_null() || handle.tag() != self.service.handle_tag() {
            return Err(Error::InvalidHandle);
        }
        let index = handle.index();
        let slot = self.slot(index).ok_or(Error::InvalidHandle)?;
        if slot.entry.is_none() || slot.generation != handle.generation() {
            return Err(Error::InvalidHandle);
        }
        Ok(InstanceId {
            index,
            generation: slot.generation,
        })
    }

    /// Handle naming a live instance, for completion reporting
    ///
    /// # Errors
    /// Returns [`Error::InvalidHandle`] if the slot was released or reused.
    pub fn handle_for(&self, id: InstanceId) -> Result<OpaqueHandle> {
        let slot = self.slot(id.index).ok_or(Error::InvalidHandle)?;
        if slot.entry.is_none() || slot.generation != id.generation {
            return Err(Error::InvalidHandle);
        }
        Ok(OpaqueHandle::compose(self.service.handle_tag(), id.generation, id.index))
    }

    /// Instance behind `id`
    #[must_use]
    pub fn get(&self, id: InstanceId) -> Option<&T> {
        self.slot(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    /// Mutable instance behind `id`
    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut T> {
        self.slot_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Identity the next occupant of static slot `index` will have
    ///
    /// # Errors
    /// - [`Error::InvalidParameter`] if `index` is not a static slot
    /// - [`Error::ResourceExhausted`] if the instance is already open
    pub fn reserve_static(&self, index: u32) -> Result<InstanceId> {
        let index = u8::try_from(index).map_err(|_| Error::InvalidParameter)?;
        if self.slot_kind(index) != Some(SlotKind::Static) {
            return Err(Error::InvalidParameter);
        }
        let slot = &self.slots[index as usize];
        if slot.entry.is_some() {
            return Err(Error::ResourceExhausted);
        }
        Ok(InstanceId {
            index,
            generation: slot.generation,
        })
    }

    /// Identity the next pool occupant will have
    ///
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] if every pool slot is in use.
    pub fn reserve_pool(&self) -> Result<InstanceId> {
        (self.static_count..self.capacity() as u8)
            .find(|index| self.slots[*index as usize].entry.is_none())
            .map(|index| InstanceId {
                index,
                generation: self.slots[index as usize].generation,
            })
            .ok_or(Error::ResourceExhausted)
    }

    /// Store `entry` in a slot previously reserved as `id`
    ///
    /// # Errors
    /// Returns [`Error::InternalError`] if the reservation no longer holds.
    pub fn fill(&mut self, id: InstanceId, entry: T) -> Result<OpaqueHandle> {
        let tag = self.service.handle_tag();
        let slot = self.slot_mut(id.index).ok_or(Error::InternalError)?;
        if slot.entry.is_some() || slot.generation != id.generation {
            return Err(Error::InternalError);
        }
        slot.entry = Some(entry);
        Ok(OpaqueHandle::compose(tag, id.generation, id.index))
    }

    /// Scan the pool for a free slot and store `entry` there
    ///
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] if every pool slot is in use.
    pub fn allocate(&mut self, entry: T) -> Result<OpaqueHandle> {
        let id = self.reserve_pool()?;
        self.fill(id, entry)
    }

    /// Empty the slot named by `handle` and retire its generation
    ///
    /// Pool slots become available to [`Self::allocate`]; static slots can
    /// only be filled again through an open by index. Releasing a handle that
    /// no longer resolves does nothing.
    pub fn release(&mut self, handle: OpaqueHandle) -> Option<T> {
        let id = self.resolve(handle).ok()?;
        let slot = self.slot_mut(id.index)?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.entry.take()
    }

    /// Live instances with their identities
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (InstanceId, &mut T)> + '_ {
        let capacity = self.capacity();
        self.slots[..capacity]
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                let generation = slot.generation;
                slot.entry.as_mut().map(|entry| {
                    (
                        InstanceId {
                            index: index as u8,
                            generation,
                        },
                        entry,
                    )
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> HandleTable<u32> {
        HandleTable::new(ServiceId::Sha2, &ServiceConfig::new(1, 2)).unwrap()
    }

    #[test]
    fn test_pool_handles_start_after_static_range() {
        let mut table = table();
        let handle = table.allocate(7);
        assert_eq!(handle.map(|h| h.index()), Ok(1));
        assert_eq!(handle.map(|h| h.tag()), Ok(ServiceId::Sha2.handle_tag()));
    }

    #[test]
    fn test_resolve_is_stable_until_release() {
        let mut table = table();
        let handle = table.allocate(7).unwrap();
        let first = table.resolve(handle);
        assert!(first.is_ok());
        assert_eq!(table.resolve(handle), first);
        assert_eq!(table.release(handle), Some(7));
        assert_eq!(table.resolve(handle), Err(Error::InvalidHandle));
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut table = table();
        assert!(table.allocate(1).is_ok());
        assert!(table.allocate(2).is_ok());
        assert_eq!(table.allocate(3), Err(Error::ResourceExhausted));
        assert_eq!(table.pool_in_use(), 2);
    }

    #[test]
    fn test_slot_reuse_keeps_index_and_changes_generation() {
        let mut table = table();
        let first = table.allocate(1).unwrap();
        assert!(table.release(first).is_some());
        let second = table.allocate(2).unwrap();
        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
        assert_eq!(table.resolve(first), Err(Error::InvalidHandle));
    }

    #[test]
    fn test_double_release_is_noop() {
        let mut table = table();
        let handle = table.allocate(1).unwrap();
        assert!(table.release(handle).is_some());
        assert!(table.release(handle).is_none());
        assert_eq!(table.pool_in_use(), 0);
    }

    #[test]
    fn test_foreign_and_out_of_range_handles_rejected() {
        let table = table();
        let foreign = OpaqueHandle::compose(ServiceId::Ecdh.handle_tag(), 0, 1);
        let beyond = OpaqueHandle::compose(ServiceId::Sha2.handle_tag(), 0, 200);
        assert_eq!(table.resolve(foreign), Err(Error::InvalidHandle));
        assert_eq!(table.resolve(beyond), Err(Error::InvalidHandle));
        assert_eq!(table.resolve(OpaqueHandle::NULL), Err(Error::InvalidHandle));
    }

    #[test]
    fn test_reverse_lookup_fails_after_release() {
        let mut table = table();
        let handle = table.allocate(1).unwrap();
        let id = table.resolve(handle).unwrap();
        assert_eq!(table.handle_for(id), Ok(handle));
        table.release(handle);
        assert_eq!(table.handle_for(id), Err(Error::InvalidHandle));
    }

    #[test]
    fn test_static_reservation() {
        let mut table = table();
        let id = table.reserve_static(0);
        assert!(id.is_ok());
        assert!(id.and_then(|id| table.fill(id, 9)).is_ok());
        assert_eq!(table.reserve_static(0), Err(Error::ResourceExhausted));
        assert_eq!(table.reserve_static(1), Err(Error::InvalidParameter));
    }
}
