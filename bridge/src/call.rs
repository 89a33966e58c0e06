// Copyright (c) 2018-2022 The MobileCoin Foundation

//! The host → foreign direction of the call bridge.
//!
//! A bridged call runs inside [`invoke`], which hands the body a
//! [`CallFrame`]. Everything the body passes to the foreign side goes through
//! the frame: handles are lent for the frame's lifetime, views borrow data
//! that outlives the frame, and ownership transfers are recorded so a failed
//! call can be rolled back. The frame's lifetime cannot escape `invoke`, so
//! no view or lent handle outlives the call that produced it.
//!
//! The foreign → host direction is the `extern "C"` functions built on
//! [`ffi_boundary_with_error`](crate::common::ffi_boundary_with_error).

use crate::{
    common::{catch_panic, McError, McSlice, McStr},
    config::BridgeConfig,
    error::{abort_on_violation, BridgeError},
    handle::{HandleRef, Opaque, OpaqueHandle, RawHandle, Side},
    layout::SharedField,
    signature::{CallDescriptor, ContractTable},
};
use core::{cell::RefCell, ffi::c_void, fmt, marker::PhantomData, mem, mem::ManuallyDrop};
use mc_common::logger::global_log;
use mc_util_ffi::{FfiOptMutPtr, FfiOptOwnedPtr};
use std::panic::{catch_unwind, AssertUnwindSafe};

struct Loan {
    raw: RawHandle,
    end: fn(RawHandle) -> Result<(), BridgeError>,
}

fn end_loan<T: Opaque>(raw: RawHandle) -> Result<(), BridgeError> {
    T::registry().end_loan(raw)
}

/// The scope of one bridged call.
///
/// `'env` is the caller's environment: anything borrowed for `'env` outlives
/// the call. `'frame` is the call itself.
pub struct CallFrame<'frame, 'env: 'frame> {
    loans: RefCell<Vec<Loan>>,
    rollbacks: RefCell<Vec<Box<dyn FnOnce() + 'env>>>,
    _frame: PhantomData<&'frame mut &'frame ()>,
    _env: PhantomData<&'env mut &'env ()>,
}

impl<'frame, 'env> CallFrame<'frame, 'env> {
    /// Lend `handle` to the call by reference.
    ///
    /// When reference checking is enabled, the registry counts the loan until
    /// the frame closes, and the object cannot be destroyed or transferred
    /// in the meantime.
    pub fn lend<T: Opaque>(
        &'frame self,
        handle: &'env OpaqueHandle<T>,
    ) -> Result<HandleRef<'frame, T>, BridgeError> {
        let raw = handle.raw();
        if BridgeConfig::current().ref_check.enabled() {
            let mut loans = self.loans.borrow_mut();
            loans.try_reserve(1)?;
            T::registry().lend(raw)?;
            loans.push(Loan {
                raw,
                end: end_loan::<T>,
            });
        }
        // The handle is borrowed for 'env, which outlives the frame.
        Ok(unsafe { HandleRef::from_raw(raw) })
    }

    pub fn borrow_slice<T>(&'frame self, data: &'env [T]) -> McSlice<'frame, T> {
        McSlice::borrow(data)
    }

    pub fn borrow_str(&'frame self, text: &'env str) -> McStr<'frame> {
        McStr::borrow(text)
    }

    /// Bytes passed where the callee expects text. They are not validated
    /// here; the receiving side's materialization does that.
    pub fn borrow_text(&'frame self, bytes: &'env [u8]) -> McStr<'frame> {
        McStr::from_bytes(bytes)
    }

    /// Prepare `value` to be passed to the foreign side by ownership.
    ///
    /// Destruction responsibility for every handle inside moves to the
    /// foreign side. If the result is never passed on, dropping it hands the
    /// handles back and destroys them on the host.
    pub fn transfer<S: SharedField>(&'frame self, value: S) -> Result<Transferred<S>, BridgeError> {
        value.release_to(Side::Foreign)?;
        Ok(Transferred {
            value: ManuallyDrop::new(value),
        })
    }

    /// Register an action that undoes part of the call if it fails.
    /// Rollbacks run in reverse order of registration.
    pub fn on_failure(&'frame self, rollback: impl FnOnce() + 'env) {
        self.rollbacks.borrow_mut().push(Box::new(rollback));
    }

    /// Call a foreign function that reports failure through an error slot.
    ///
    /// A raised error is the callee's: see [`BridgeError::from_callee`].
    pub fn call_foreign<R>(
        &'frame self,
        f: impl FnOnce(FfiOptMutPtr<FfiOptOwnedPtr<McError>>) -> R,
    ) -> Result<R, BridgeError> {
        let mut error = FfiOptOwnedPtr::<McError>::null();
        let result = f(FfiOptMutPtr::from(&mut error));
        callee_result(error, result)
    }

    /// End every loan, then run the rollbacks if the call failed.
    fn close<R>(&self, result: Result<R, BridgeError>) -> Result<R, BridgeError> {
        let mut loan_error = None;
        let loans = mem::take(&mut *self.loans.borrow_mut());
        for loan in loans.into_iter().rev() {
            if let Err(err) = (loan.end)(loan.raw) {
                loan_error.get_or_insert(err);
            }
        }

        let rollbacks = mem::take(&mut *self.rollbacks.borrow_mut());
        let result = match result {
            Ok(value) => Ok(value),
            Err(err) => {
                for rollback in rollbacks.into_iter().rev() {
                    if catch_unwind(AssertUnwindSafe(rollback)).is_err() {
                        global_log::error!("rollback panicked after: {}", err);
                    }
                }
                Err(err)
            }
        };

        match loan_error {
            Some(err) => Err(err),
            None => result,
        }
    }
}

/// Run one bridged call.
///
/// The descriptor is checked against the installed contract table first (if
/// verification is enabled and a table is installed); a mismatch aborts the
/// process before anything runs. Panics in `body` become
/// `BridgeError::Panic`, and fatal errors abort after the frame is closed.
pub fn invoke<'env, R>(
    descriptor: &CallDescriptor,
    body: impl for<'frame> FnOnce(&'frame CallFrame<'frame, 'env>) -> Result<R, BridgeError>,
) -> Result<R, BridgeError> {
    let config = BridgeConfig::current();
    if config.verify_contracts {
        if let Some(table) = ContractTable::installed() {
            if let Err(err) = table.verify(descriptor) {
                abort_on_violation(&err);
            }
        }
    }
    if config.trace_calls {
        global_log::trace!("calling {}", descriptor);
    }

    let frame = CallFrame {
        loans: RefCell::new(Vec::new()),
        rollbacks: RefCell::new(Vec::new()),
        _frame: PhantomData,
        _env: PhantomData,
    };
    let result = catch_panic(|| body(&frame));
    let result = frame.close(result);

    if let Err(err) = &result {
        if err.is_fatal() {
            abort_on_violation(err);
        }
        if config.trace_calls {
            global_log::trace!("{} failed: {}", descriptor.symbol_name(), err);
        }
    }
    result
}

/// A value whose handles are held by the foreign side, on its way there.
///
/// Layout-identical to `S`, so it is passed by value as the argument of an
/// `extern "C"` function. Passing it moves it to the callee.
#[repr(transparent)]
pub struct Transferred<S: SharedField> {
    value: ManuallyDrop<S>,
}

impl<S: SharedField> Transferred<S> {
    pub fn get(&self) -> &S {
        &self.value
    }

    /// Take the value back on the host.
    pub fn reclaim(self) -> Result<S, BridgeError> {
        let mut this = ManuallyDrop::new(self);
        this.value.release_to(Side::Host)?;
        Ok(unsafe { ManuallyDrop::take(&mut this.value) })
    }
}

impl<S: SharedField> Drop for Transferred<S> {
    fn drop(&mut self) {
        match self.value.release_to(Side::Host) {
            Ok(()) => unsafe { ManuallyDrop::drop(&mut self.value) },
            Err(err) => abort_on_violation(&err),
        }
    }
}

impl<S: SharedField + fmt::Debug> fmt::Debug for Transferred<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Transferred").field(&*self.value).finish()
    }
}

/// What a foreign callee left in its error slot, if anything.
pub(crate) fn callee_result<R>(error: FfiOptOwnedPtr<McError>, result: R) -> Result<R, BridgeError> {
    match error.into_option() {
        Some(error) => Err(BridgeError::from_callee(
            error.error_code,
            error.description_lossy(),
        )),
        None => Ok(result),
    }
}

/// A foreign-side error slot, as every bridged function receives it.
pub type OutError<'a> = FfiOptMutPtr<'a, FfiOptOwnedPtr<McError>>;

/// A callback valid for one call: a function pointer and the context it is
/// called with.
#[repr(C)]
pub struct McCallback<'a, A> {
    call: Option<unsafe extern "C" fn(context: *mut c_void, arg: A, out_error: OutError)>,
    context: *mut c_void,
    _phantom: PhantomData<&'a mut c_void>,
}

impl<'a, A> McCallback<'a, A> {
    /// A callback whose context is `context`, cast to `*mut c_void`.
    pub fn new<C>(
        call: unsafe extern "C" fn(context: *mut c_void, arg: A, out_error: OutError),
        context: &'a mut C,
    ) -> Self {
        Self {
            call: Some(call),
            context: context as *mut C as *mut c_void,
            _phantom: PhantomData,
        }
    }

    pub fn invoke(&mut self, arg: A) -> Result<(), BridgeError> {
        let call = self.call.ok_or_else(|| {
            BridgeError::InvalidInput("callback has no function pointer".into())
        })?;
        let mut error = FfiOptOwnedPtr::<McError>::null();
        unsafe { call(self.context, arg, FfiOptMutPtr::from(&mut error)) };
        callee_result(error, ())
    }
}

/// A callback the host keeps after the call that handed it over. Its context
/// is released exactly once, when this value is dropped.
#[repr(C)]
pub struct RetainedCallback<A> {
    call: Option<unsafe extern "C" fn(context: *mut c_void, arg: A, out_error: OutError)>,
    context: *mut c_void,
    release: Option<unsafe extern "C" fn(context: *mut c_void)>,
}

impl<A> RetainedCallback<A> {
    pub fn invoke(&mut self, arg: A) -> Result<(), BridgeError> {
        let call = self.call.ok_or_else(|| {
            BridgeError::InvalidInput("callback has no function pointer".into())
        })?;
        let mut error = FfiOptOwnedPtr::<McError>::null();
        unsafe { call(self.context, arg, FfiOptMutPtr::from(&mut error)) };
        callee_result(error, ())
    }
}

impl<A> Drop for RetainedCallback<A> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            unsafe { release(self.context) };
        }
    }
}
