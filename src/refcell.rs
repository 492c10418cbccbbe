//! Ref-cell: a single-slot mutable indirection, used by the emitter to
//! model captured mutable bindings shared between several lambdas.
//!
//! This is the one-slot special case of a capture array, useful on its
//! own as a way to break reference cycles with a weak-capable
//! indirection instead of a direct strong pointer.

use crate::header::{ObjHeader, builtin_class};
use crate::memory::{raw_alloc, raw_free};
use crate::runtime::Runtime;
use crate::value::{Tag, Value, fresh_header, sprig_release, sprig_retain};

#[repr(C)]
pub struct RefCellObj {
    pub header: ObjHeader,
    pub value: Value,
}

/// `new(v)`: retains `v` and stores it.
pub fn new_ref_cell(runtime: &mut Runtime, v: Value) -> Value {
    unsafe {
        sprig_retain(v);
        let ptr = raw_alloc(runtime, std::mem::size_of::<RefCellObj>()) as *mut RefCellObj;
        ptr.write(RefCellObj { header: fresh_header(builtin_class::REF_CELL), value: v });
        Value::from_ptr(Tag::RefCell, ptr.cast())
    }
}

/// `get()`: returns the inner value without an implicit retain — the
/// ABI convention is that callers retain as needed.
pub fn get(cell: *const RefCellObj) -> Value {
    unsafe { (*cell).value }
}

/// `set(v)`: releases the old value, retains and stores the new one.
pub fn set(runtime: *mut Runtime, cell: *mut RefCellObj, v: Value) {
    unsafe {
        sprig_release(runtime, (*cell).value);
        sprig_retain(v);
        (*cell).value = v;
    }
}

/// Release the inner value, then free the cell.
///
/// # Safety
/// `cell` must be a live `RefCellObj` allocated by `runtime`.
pub(crate) unsafe fn free_refcell(runtime: &mut Runtime, cell: *mut RefCellObj) {
    unsafe {
        sprig_release(runtime as *mut Runtime, (*cell).value);
        raw_free(runtime, cell.cast(), std::mem::size_of::<RefCellObj>());
    }
}

// --- C ABI ---

/// # Safety
/// `runtime` must be a live runtime pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_new_ref_cell(runtime: *mut Runtime, v: Value) -> Value {
    unsafe { new_ref_cell(&mut *runtime, v) }
}

/// # Safety
/// `cell` must carry a `RefCell` heap pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_refcell_get(cell: Value) -> Value {
    get(cell.as_ptr().cast())
}

/// # Safety
/// `runtime` and `cell` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_refcell_set(runtime: *mut Runtime, cell: Value, v: Value) {
    set(runtime, cell.as_ptr().cast(), v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_round_trip() {
        let mut r = Runtime::new();
        let cell_val = new_ref_cell(&mut r, Value::i32(0));
        let cell: *mut RefCellObj = cell_val.as_ptr().cast();
        assert_eq!(get(cell).as_i32(), 0);
        set(&mut r as *mut Runtime, cell, Value::i32(7));
        assert_eq!(get(cell).as_i32(), 7);
        unsafe { crate::memory::finalize_and_free(&mut r, cell_val) };
    }

    #[test]
    fn shared_mutation_through_two_observers() {
        // Two "lambdas" (here, plain pointers standing in for closures)
        // observe the same cell.
        let mut r = Runtime::new();
        let cell_val = new_ref_cell(&mut r, Value::i32(0));
        let cell: *mut RefCellObj = cell_val.as_ptr().cast();
        let observer_a = cell;
        let observer_b = cell;
        set(&mut r as *mut Runtime, observer_a, Value::i32(7));
        assert_eq!(get(observer_b).as_i32(), 7);
        unsafe { crate::memory::finalize_and_free(&mut r, cell_val) };
    }
}
