//! Growable, ordered array of [`Value`]s.
//!
//! A contiguous buffer rather than a linked structure, so indexed
//! access stays O(1); capacity doubles on overflow for amortized
//! push cost.

use crate::error::{ErrorKind, fatal};
use crate::header::{ObjHeader, builtin_class};
use crate::memory::{raw_alloc, raw_free, raw_realloc};
use crate::runtime::Runtime;
use crate::value::{Tag, Value, fresh_header, sprig_release, sprig_retain};

const MIN_LENGTH_ROUND: usize = 8;

#[repr(C)]
pub struct Array {
    pub header: ObjHeader,
    pub len: u32,
    pub cap: u32,
    pub data: *mut Value,
}

fn alloc_data(runtime: &mut Runtime, cap: usize) -> *mut Value {
    if cap == 0 {
        return std::ptr::null_mut();
    }
    unsafe { raw_alloc(runtime, cap * std::mem::size_of::<Value>()) as *mut Value }
}

/// `new(capacity)`: empty array with the requested backing capacity.
pub fn new_array(runtime: &mut Runtime, capacity: usize) -> Value {
    unsafe {
        let data = alloc_data(runtime, capacity);
        let ptr = raw_alloc(runtime, std::mem::size_of::<Array>()) as *mut Array;
        ptr.write(Array {
            header: fresh_header(builtin_class::ARRAY),
            len: 0,
            cap: capacity as u32,
            data,
        });
        Value::from_ptr(Tag::Array, ptr.cast())
    }
}

/// `new-with-length(n)`: length `n`, capacity rounded up to the next
/// multiple of [`MIN_LENGTH_ROUND`], slots default-initialized to null.
pub fn new_array_with_length(runtime: &mut Runtime, n: usize) -> Value {
    let cap = n.div_ceil(MIN_LENGTH_ROUND).max(1) * MIN_LENGTH_ROUND;
    unsafe {
        let data = alloc_data(runtime, cap);
        for i in 0..n {
            data.add(i).write(Value::null());
        }
        let ptr = raw_alloc(runtime, std::mem::size_of::<Array>()) as *mut Array;
        ptr.write(Array { header: fresh_header(builtin_class::ARRAY), len: n as u32, cap: cap as u32, data });
        Value::from_ptr(Tag::Array, ptr.cast())
    }
}

pub fn length(a: *const Array) -> usize {
    unsafe { (*a).len as usize }
}

/// Bounds-checked read. Aborts fatally (`BoundsError`) if `i >= length`.
pub fn get(a: *const Array, i: usize) -> Value {
    unsafe {
        if i >= (*a).len as usize {
            fatal(ErrorKind::BoundsError, &format!("array get: index {i} >= length {}", (*a).len));
        }
        *(*a).data.add(i)
    }
}

/// Bounds-checked write: releases the old slot contents, retains the
/// new value.
pub fn set(runtime: *mut Runtime, a: *mut Array, i: usize, v: Value) {
    unsafe {
        if i >= (*a).len as usize {
            fatal(ErrorKind::BoundsError, &format!("array set: index {i} >= length {}", (*a).len));
        }
        let slot = (*a).data.add(i);
        sprig_release(runtime, *slot);
        sprig_retain(v);
        *slot = v;
    }
}

/// Append `v`, doubling capacity first if the array is full.
pub fn push(runtime: &mut Runtime, a: *mut Array, v: Value) {
    unsafe {
        let len = (*a).len as usize;
        let cap = (*a).cap as usize;
        if len == cap {
            let new_cap = (cap * 2).max(1);
            let new_data = if cap == 0 {
                alloc_data(runtime, new_cap)
            } else {
                raw_realloc(
                    runtime,
                    (*a).data.cast(),
                    cap * std::mem::size_of::<Value>(),
                    new_cap * std::mem::size_of::<Value>(),
                ) as *mut Value
            };
            (*a).data = new_data;
            (*a).cap = new_cap as u32;
        }
        sprig_retain(v);
        (*a).data.add(len).write(v);
        (*a).len = (len + 1) as u32;
    }
}

/// Release every owned slot and free the backing storage.
///
/// # Safety
/// `a` must be a live `Array` allocated by `runtime`.
pub(crate) unsafe fn free_array(runtime: &mut Runtime, a: *mut Array) {
    unsafe {
        let len = (*a).len as usize;
        let cap = (*a).cap as usize;
        let runtime_ptr: *mut Runtime = runtime;
        for i in 0..len {
            sprig_release(runtime_ptr, *(*a).data.add(i));
        }
        if cap > 0 {
            raw_free(runtime, (*a).data.cast(), cap * std::mem::size_of::<Value>());
        }
        raw_free(runtime, a.cast(), std::mem::size_of::<Array>());
    }
}

// --- C ABI ---

/// # Safety
/// `runtime` must be a live runtime pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_new_array(runtime: *mut Runtime, capacity: usize) -> Value {
    unsafe { new_array(&mut *runtime, capacity) }
}

/// # Safety
/// `runtime` must be a live runtime pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_new_array_len(runtime: *mut Runtime, n: usize) -> Value {
    unsafe { new_array_with_length(&mut *runtime, n) }
}

/// # Safety
/// `a` must carry an `Array` heap pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_array_length(a: Value) -> usize {
    length(a.as_ptr().cast())
}

/// # Safety
/// `a` must carry an `Array` heap pointer; `i` is bounds-checked and
/// aborts fatally if out of range.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_array_get(a: Value, i: usize) -> Value {
    get(a.as_ptr().cast(), i)
}

/// # Safety
/// `runtime` and `a` must be live; `i` is bounds-checked.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_array_set(runtime: *mut Runtime, a: Value, i: usize, v: Value) {
    set(runtime, a.as_ptr().cast(), i, v)
}

/// # Safety
/// `runtime` and `a` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_array_push(runtime: *mut Runtime, a: Value, v: Value) {
    unsafe { push(&mut *runtime, a.as_ptr().cast(), v) }
}
