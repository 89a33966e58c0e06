// Copyright (c) 2018-2022 The MobileCoin Foundation

use super::{RawHandle, Side};
use crate::{
    call::callee_result,
    common::{catch_panic, McError},
    error::BridgeError,
};
use core::{
    ffi::c_void,
    marker::PhantomData,
    ptr::NonNull,
    sync::atomic::{AtomicU64, Ordering},
};
use mc_common::logger::global_log;
use mc_util_ffi::{FfiOptMutPtr, FfiOptOwnedPtr, FfiOwnedPtr};
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Mutex, MutexGuard},
};

/// Releases an object through the allocator of the side that created it.
pub type Destructor = unsafe extern "C" fn(object: *mut c_void);

/// Counters for leak detection.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RegistryStats {
    /// Objects registered so far.
    pub created: u64,
    /// Objects whose destructor ran.
    pub destroyed: u64,
    /// Objects handed back to their owner without running the destructor.
    pub released: u64,
    /// Objects currently registered.
    pub live: u64,
}

struct Entry {
    address: NonNull<c_void>,
    destructor: Destructor,
    holder: Side,
    loans: u32,
}

// The registry only stores the address; it never dereferences it.
unsafe impl Send for Entry {}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

struct Slots {
    entries: Vec<Slot>,
    free: Vec<u32>,
}

/// The arena of generation-tagged slots for one opaque type.
///
/// A slot records where the object lives, how to destroy it, and which side
/// currently holds destruction responsibility. Removing an object bumps the
/// slot's generation, so every `RawHandle` that named it becomes detectably
/// stale instead of dangling. The registry is a capability, not a container:
/// it never keeps an object alive on its own.
pub struct HandleRegistry<T> {
    type_name: &'static str,
    owner: Side,
    slots: Mutex<Slots>,
    created: AtomicU64,
    destroyed: AtomicU64,
    released: AtomicU64,
    _phantom: PhantomData<fn() -> T>,
}

unsafe extern "C" fn drop_host_object<T>(object: *mut c_void) {
    let result = catch_unwind(AssertUnwindSafe(|| {
        drop(FfiOwnedPtr::from_raw(object as *mut T));
    }));
    if result.is_err() {
        global_log::error!("destructor of {} panicked", core::any::type_name::<T>());
    }
}

impl<T> HandleRegistry<T> {
    pub const fn new(type_name: &'static str, owner: Side) -> Self {
        Self {
            type_name,
            owner,
            slots: Mutex::new(Slots {
                entries: Vec::new(),
                free: Vec::new(),
            }),
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
            released: AtomicU64::new(0),
            _phantom: PhantomData,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The side whose allocator creates and destroys objects of this type.
    pub fn owner(&self) -> Side {
        self.owner
    }

    /// Move `value` to the host heap and register it, held by the host.
    pub fn create(&self, value: T) -> Result<RawHandle, BridgeError> {
        self.expect_owner(Side::Host)?;
        let object = FfiOwnedPtr::try_new(value)?;
        let raw = self.insert(object.as_raw() as *mut c_void, drop_host_object::<T>)?;
        // The slot owns the allocation now.
        let _ = object.into_raw();
        Ok(raw)
    }

    /// Register an object the foreign side already constructed, held by the
    /// host.
    ///
    /// On failure the object is destroyed before the error is returned.
    ///
    /// # Safety
    ///
    /// `object` must be null or a live object that `destructor` releases, and
    /// nothing else may destroy it.
    pub unsafe fn adopt(
        &self,
        object: *mut T,
        destructor: Destructor,
    ) -> Result<RawHandle, BridgeError> {
        if object.is_null() {
            return Err(BridgeError::AllocationFailure(format!(
                "no {} object to adopt",
                self.type_name
            )));
        }
        let result = self
            .expect_owner(Side::Foreign)
            .and_then(|_| self.insert(object as *mut c_void, destructor));
        if result.is_err() {
            destructor(object as *mut c_void);
        }
        result
    }

    /// Run a foreign constructor and register its result.
    ///
    /// The constructor reports failure through the error slot it is given. If
    /// it raised an error but still returned an object, the object is
    /// destroyed before the error is returned.
    ///
    /// # Safety
    ///
    /// See [`HandleRegistry::adopt`]; `ctor` must return null or an object
    /// `destructor` releases.
    pub unsafe fn construct_foreign(
        &self,
        destructor: Destructor,
        ctor: impl FnOnce(FfiOptMutPtr<FfiOptOwnedPtr<McError>>) -> *mut T,
    ) -> Result<RawHandle, BridgeError> {
        self.expect_owner(Side::Foreign)?;
        let mut error = FfiOptOwnedPtr::<McError>::null();
        let object = catch_panic(|| Ok(ctor(FfiOptMutPtr::from(&mut error))))?;
        let object = match callee_result(error, object) {
            Ok(object) => object,
            Err(err) => {
                if !object.is_null() {
                    destructor(object as *mut c_void);
                }
                return Err(err);
            }
        };
        if object.is_null() {
            return Err(BridgeError::AllocationFailure(format!(
                "foreign constructor of {} returned null",
                self.type_name
            )));
        }
        self.adopt(object, destructor)
    }

    /// Remove the object and run its destructor, exactly once.
    ///
    /// `by` must be the side currently holding the object, and the object
    /// must not be lent to an active call.
    pub fn destroy(&self, raw: RawHandle, by: Side) -> Result<(), BridgeError> {
        let entry = self.remove(raw, by)?;
        global_log::trace!("destroying {} {}", self.type_name, raw);
        // Outside the lock: destructors may call back into the bridge.
        unsafe { (entry.destructor)(entry.address.as_ptr()) };
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Remove the object without running its destructor, giving its address
    /// back to the caller, who becomes responsible for it.
    pub fn release(&self, raw: RawHandle, by: Side) -> Result<NonNull<T>, BridgeError> {
        let entry = self.remove(raw, by)?;
        global_log::trace!("releasing {} {}", self.type_name, raw);
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(entry.address.cast())
    }

    /// The address of a live object.
    pub fn resolve(&self, raw: RawHandle) -> Result<NonNull<T>, BridgeError> {
        let mut slots = self.lock();
        Ok(self.lookup(&mut slots, raw)?.address.cast())
    }

    /// The address of an object named by a by-reference identifier.
    ///
    /// With `check`, the object must be lent to an active call or held by the
    /// foreign side; a host-held object nobody lent is a use past the call.
    pub fn resolve_ref(&self, raw: RawHandle, check: bool) -> Result<NonNull<T>, BridgeError> {
        let mut slots = self.lock();
        let entry = self.lookup(&mut slots, raw)?;
        if check && entry.loans == 0 && entry.holder == Side::Host {
            return Err(BridgeError::LifetimeViolation(format!(
                "reference to {} {} used outside the call it was lent to",
                self.type_name, raw
            )));
        }
        Ok(entry.address.cast())
    }

    /// Record that the object is lent to an active call.
    pub fn lend(&self, raw: RawHandle) -> Result<(), BridgeError> {
        let mut slots = self.lock();
        let entry = self.lookup(&mut slots, raw)?;
        entry.loans = entry.loans.checked_add(1).ok_or_else(|| {
            BridgeError::ContractViolation(format!("too many loans of {} {}", self.type_name, raw))
        })?;
        Ok(())
    }

    pub fn end_loan(&self, raw: RawHandle) -> Result<(), BridgeError> {
        let mut slots = self.lock();
        let entry = self.lookup(&mut slots, raw)?;
        entry.loans = entry.loans.checked_sub(1).ok_or_else(|| {
            BridgeError::LifetimeViolation(format!(
                "loan of {} {} ended twice",
                self.type_name, raw
            ))
        })?;
        Ok(())
    }

    /// Move destruction responsibility from `from` to `to`.
    pub fn transfer(&self, raw: RawHandle, from: Side, to: Side) -> Result<(), BridgeError> {
        let mut slots = self.lock();
        let type_name = self.type_name;
        let entry = self.lookup(&mut slots, raw)?;
        if entry.holder != from {
            return Err(BridgeError::LifetimeViolation(format!(
                "{} {} is held by the {} side, not the {} side",
                type_name, raw, entry.holder, from
            )));
        }
        if entry.loans > 0 {
            return Err(BridgeError::LifetimeViolation(format!(
                "{} {} is lent to an active call",
                type_name, raw
            )));
        }
        entry.holder = to;
        Ok(())
    }

    pub fn holder(&self, raw: RawHandle) -> Result<Side, BridgeError> {
        let mut slots = self.lock();
        Ok(self.lookup(&mut slots, raw)?.holder)
    }

    pub fn stats(&self) -> RegistryStats {
        let created = self.created.load(Ordering::SeqCst);
        let destroyed = self.destroyed.load(Ordering::SeqCst);
        let released = self.released.load(Ordering::SeqCst);
        RegistryStats {
            created,
            destroyed,
            released,
            live: created.saturating_sub(destroyed + released),
        }
    }

    fn expect_owner(&self, side: Side) -> Result<(), BridgeError> {
        if self.owner == side {
            Ok(())
        } else {
            Err(BridgeError::ContractViolation(format!(
                "{} is owned by the {} side, not the {} side",
                self.type_name, self.owner, side
            )))
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // Slot bookkeeping is never left half-updated, so a poisoned lock is
        // still consistent.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, address: *mut c_void, destructor: Destructor) -> Result<RawHandle, BridgeError> {
        let address = NonNull::new(address).ok_or_else(|| {
            BridgeError::AllocationFailure(format!("null {} object", self.type_name))
        })?;
        let entry = Entry {
            address,
            destructor,
            holder: Side::Host,
            loans: 0,
        };

        let mut slots = self.lock();
        let raw = if let Some(index) = slots.free.pop() {
            let slot = &mut slots.entries[index as usize];
            slot.entry = Some(entry);
            RawHandle::new(index, slot.generation)
        } else {
            let index = u32::try_from(slots.entries.len()).map_err(|_| {
                BridgeError::AllocationFailure(format!("{} registry is full", self.type_name))
            })?;
            slots.entries.try_reserve(1)?;
            // The free list can hold every index, so removal never allocates.
            let spare = slots.entries.len() + 1 - slots.free.len();
            slots.free.try_reserve(spare)?;
            slots.entries.push(Slot {
                generation: 1,
                entry: Some(entry),
            });
            RawHandle::new(index, 1)
        };
        drop(slots);

        self.created.fetch_add(1, Ordering::SeqCst);
        global_log::trace!("registered {} {}", self.type_name, raw);
        Ok(raw)
    }

    fn remove(&self, raw: RawHandle, by: Side) -> Result<Entry, BridgeError> {
        let mut slots = self.lock();
        let type_name = self.type_name;
        let entry = self.lookup(&mut slots, raw)?;
        if entry.holder != by {
            return Err(BridgeError::LifetimeViolation(format!(
                "the {} side cannot destroy {} {} held by the {} side",
                by, type_name, raw, entry.holder
            )));
        }
        if entry.loans > 0 {
            return Err(BridgeError::LifetimeViolation(format!(
                "{} {} destroyed while lent to an active call",
                type_name, raw
            )));
        }

        let slot = &mut slots.entries[raw.index as usize];
        let entry = slot.entry.take().ok_or_else(|| self.stale(raw))?;
        slot.generation = slot.generation.wrapping_add(1);
        // A slot whose generation would wrap is retired rather than reused.
        if slot.generation != u32::MAX {
            slots.free.push(raw.index);
        }
        Ok(entry)
    }

    fn lookup<'s>(&self, slots: &'s mut Slots, raw: RawHandle) -> Result<&'s mut Entry, BridgeError> {
        if raw.is_null() {
            return Err(BridgeError::LifetimeViolation(format!(
                "null {} handle",
                self.type_name
            )));
        }
        match slots.entries.get_mut(raw.index as usize) {
            Some(Slot {
                generation,
                entry: Some(entry),
            }) if *generation == raw.generation => Ok(entry),
            _ => Err(self.stale(raw)),
        }
    }

    fn stale(&self, raw: RawHandle) -> BridgeError {
        BridgeError::LifetimeViolation(format!(
            "stale {} handle {}: its object was already destroyed",
            self.type_name, raw
        ))
    }
}
