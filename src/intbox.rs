//! Integer box pool: a pre-allocated range of boxed 64-bit integers,
//! marked immortal, amortizing the allocations emitted code makes when
//! boxing small integers.
//!
//! Pre-allocate once at runtime construction, then reuse by index on
//! every subsequent box of a value in range — no per-box allocation or
//! free for the common small-integer case.

use crate::header::{ObjHeader, builtin_class};
use crate::memory::{raw_alloc, raw_free};
use crate::runtime::Runtime;
use crate::value::{Tag, Value, fresh_header, mark_immortal};

/// Number of pre-allocated boxes.
pub const POOL_SIZE: i64 = 1024;
/// The pool covers `[-POOL_SIZE/2, POOL_SIZE/2)`, a small range around zero.
pub const POOL_LOW: i64 = -(POOL_SIZE / 2);
pub const POOL_HIGH: i64 = POOL_SIZE / 2; // exclusive

#[repr(C)]
pub struct BoxedI64 {
    pub header: ObjHeader,
    pub value: i64,
}

pub struct IntBoxPool {
    boxes: Vec<*mut BoxedI64>,
}

impl IntBoxPool {
    /// An unpopulated pool, used only as a placeholder while a [`Runtime`]
    /// is under construction (see `Runtime::new`): a chicken-and-egg
    /// problem, since populating the real pool needs a `&mut Runtime`
    /// that doesn't exist yet.
    pub(crate) fn empty() -> Self {
        IntBoxPool { boxes: Vec::new() }
    }

    /// Pre-allocate the pool. Every entry is marked immortal.
    pub fn new(runtime: &mut Runtime) -> Self {
        let mut boxes = Vec::with_capacity(POOL_SIZE as usize);
        for n in POOL_LOW..POOL_HIGH {
            unsafe {
                let ptr = raw_alloc(runtime, std::mem::size_of::<BoxedI64>()) as *mut BoxedI64;
                ptr.write(BoxedI64 { header: fresh_header(builtin_class::BOX_I64), value: n });
                let value = Value::from_ptr(Tag::BoxI64, ptr.cast());
                mark_immortal(value);
                boxes.push(ptr);
            }
        }
        IntBoxPool { boxes }
    }
}

#[cfg(test)]
pub(crate) fn pool_len(pool: &IntBoxPool) -> usize {
    pool.boxes.len()
}

/// Box `n`. Returns a cached, immortal value if `n` falls inside the
/// pool's range; otherwise allocates a fresh, mortal box.
pub fn box_i64(runtime: &mut Runtime, n: i64) -> Value {
    if (POOL_LOW..POOL_HIGH).contains(&n) {
        let idx = (n - POOL_LOW) as usize;
        let ptr = runtime.int_pool.boxes[idx];
        return Value::from_ptr(Tag::BoxI64, ptr.cast());
    }
    unsafe {
        let ptr = raw_alloc(runtime, std::mem::size_of::<BoxedI64>()) as *mut BoxedI64;
        ptr.write(BoxedI64 { header: fresh_header(builtin_class::BOX_I64), value: n });
        Value::from_ptr(Tag::BoxI64, ptr.cast())
    }
}

pub fn unbox_i64(v: &Value) -> i64 {
    debug_assert_eq!(v.tag, Tag::BoxI64);
    unsafe { (*(v.payload.ptr as *const BoxedI64)).value }
}

/// Free a boxed integer. Only reachable for out-of-pool (mortal) boxes —
/// pooled boxes are immortal and `sprig_release` never calls this for
/// them.
///
/// # Safety
/// `ptr` must be a live, mortal `BoxedI64` allocated by `runtime`.
pub(crate) unsafe fn free_box(runtime: &mut Runtime, ptr: *mut BoxedI64) {
    unsafe { raw_free(runtime, ptr.cast(), std::mem::size_of::<BoxedI64>()) };
}

/// Free every pooled box at teardown.
///
/// # Safety
/// Must only be called once, during [`Runtime`] teardown.
pub(crate) unsafe fn teardown(runtime: &mut Runtime) {
    let boxes = std::mem::take(&mut runtime.int_pool.boxes);
    for ptr in boxes {
        unsafe { raw_free(runtime, ptr.cast(), std::mem::size_of::<BoxedI64>()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_range_boxing_is_cached() {
        let mut r = Runtime::new();
        let a = box_i64(&mut r, 5);
        let b = box_i64(&mut r, 5);
        unsafe {
            assert_eq!(a.payload.ptr, b.payload.ptr);
        }
        assert_eq!(a.header().refcount.get(), crate::header::NO_GC);
    }

    #[test]
    fn out_of_range_boxing_allocates_fresh() {
        let mut r = Runtime::new();
        let big = POOL_HIGH + 1000;
        let a = box_i64(&mut r, big);
        assert_eq!(unbox_i64(&a), big);
        assert_ne!(a.header().refcount.get(), crate::header::NO_GC);
        unsafe {
            crate::memory::finalize_and_free(&mut r, a);
        }
    }
}
