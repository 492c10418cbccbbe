//! Lambda: a function pointer plus a flat array of captured values.
//!
//! Captures are copied into the flat array at construction (retained,
//! so the closure owns its share of each). Invocation shares the same
//! `(this, argc, argv)` calling convention as class methods, so a
//! lambda and a bound method look identical to a caller.

use crate::header::{ObjHeader, builtin_class};
use crate::memory::{raw_alloc, raw_free};
use crate::refcell::RefCellObj;
use crate::runtime::Runtime;
use crate::value::{Tag, Value, fresh_header, sprig_release, sprig_retain};

/// `extern "C" fn(this, argc, argv) -> Value`, the shape every lambda
/// body and every class method conforms to.
pub type SprigFn = unsafe extern "C" fn(this: Value, argc: u32, argv: *const Value) -> Value;

#[repr(C)]
pub struct Lambda {
    pub header: ObjHeader,
    pub func: SprigFn,
    pub n_captures: u32,
    pub captures: *mut Value,
}

/// `new(fn, captures[])`: retains each capture and stores them in a
/// freshly allocated flat array alongside the lambda object.
pub fn new_lambda(runtime: &mut Runtime, func: SprigFn, captures: &[Value]) -> Value {
    unsafe {
        let n = captures.len();
        let data = if n == 0 {
            std::ptr::null_mut()
        } else {
            raw_alloc(runtime, n * std::mem::size_of::<Value>()) as *mut Value
        };
        for (i, &c) in captures.iter().enumerate() {
            sprig_retain(c);
            data.add(i).write(c);
        }
        let ptr = raw_alloc(runtime, std::mem::size_of::<Lambda>()) as *mut Lambda;
        ptr.write(Lambda { header: fresh_header(builtin_class::LAMBDA), func, n_captures: n as u32, captures: data });
        Value::from_ptr(Tag::Lambda, ptr.cast())
    }
}

/// Call the stored function, passing the lambda itself as `this` so the
/// body can index its own captures.
pub fn invoke(lambda_value: Value, argc: u32, argv: *const Value) -> Value {
    let lambda: *const Lambda = lambda_value.as_ptr().cast();
    let func = unsafe { (*lambda).func };
    unsafe { func(lambda_value, argc, argv) }
}

pub fn get_capture(l: *const Lambda, i: usize) -> Value {
    unsafe {
        debug_assert!(i < (*l).n_captures as usize);
        *(*l).captures.add(i)
    }
}

pub fn set_capture(runtime: *mut Runtime, l: *mut Lambda, i: usize, v: Value) {
    unsafe {
        debug_assert!(i < (*l).n_captures as usize);
        let slot = (*l).captures.add(i);
        sprig_release(runtime, *slot);
        sprig_retain(v);
        *slot = v;
    }
}

/// Read a capture that is itself a ref-cell, dereferencing it.
pub fn get_capture_ref(l: *const Lambda, i: usize) -> Value {
    let cell: *const RefCellObj = get_capture(l, i).as_ptr().cast();
    crate::refcell::get(cell)
}

/// Write through a capture that is itself a ref-cell.
pub fn set_capture_ref(runtime: *mut Runtime, l: *const Lambda, i: usize, v: Value) {
    let cell: *mut RefCellObj = get_capture(l, i).as_ptr().cast();
    crate::refcell::set(runtime, cell, v);
}

/// Release every captured value, then free the lambda.
///
/// # Safety
/// `l` must be a live `Lambda` allocated by `runtime`.
pub(crate) unsafe fn free_lambda(runtime: &mut Runtime, l: *mut Lambda) {
    unsafe {
        let n = (*l).n_captures as usize;
        let runtime_ptr: *mut Runtime = runtime;
        for i in 0..n {
            sprig_release(runtime_ptr, *(*l).captures.add(i));
        }
        if n > 0 {
            raw_free(runtime, (*l).captures.cast(), n * std::mem::size_of::<Value>());
        }
        raw_free(runtime, l.cast(), std::mem::size_of::<Lambda>());
    }
}

// --- C ABI ---

/// # Safety
/// `runtime` must be live; `captures` must point to at least
/// `captures_len` readable [`Value`]s (or be null with `captures_len == 0`).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_new_lambda(
    runtime: *mut Runtime,
    func: SprigFn,
    captures: *const Value,
    captures_len: usize,
) -> Value {
    let slice = if captures_len == 0 { &[] } else { unsafe { std::slice::from_raw_parts(captures, captures_len) } };
    unsafe { new_lambda(&mut *runtime, func, slice) }
}

/// # Safety
/// `l` must carry a `Lambda` heap pointer; `i` must be in range.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_lambda_get_capture(l: Value, i: usize) -> Value {
    get_capture(l.as_ptr().cast(), i)
}

/// # Safety
/// `runtime` and `l` must be live; `i` must be in range.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_lambda_set_capture(runtime: *mut Runtime, l: Value, i: usize, v: Value) {
    set_capture(runtime, l.as_ptr().cast(), i, v)
}

/// # Safety
/// `l` must carry a `Lambda` heap pointer whose capture `i` is itself a
/// ref-cell.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_lambda_get_capture_ref(l: Value, i: usize) -> Value {
    get_capture_ref(l.as_ptr().cast(), i)
}

/// # Safety
/// `runtime` and `l` must be live; capture `i` must be a ref-cell.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_lambda_set_capture_ref(runtime: *mut Runtime, l: Value, i: usize, v: Value) {
    set_capture_ref(runtime, l.as_ptr().cast(), i, v)
}

/// # Safety
/// `l` must carry a `Lambda` heap pointer; `argv` must point to at
/// least `argc` readable [`Value`]s.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_lambda_invoke(l: Value, argc: u32, argv: *const Value) -> Value {
    invoke(l, argc, argv)
}
