//! Thin, accounted wrapper over the platform allocator.
//!
//! Every heap allocation made by this runtime goes through one of the
//! functions here, so the live allocation count can be compared against
//! zero at teardown and a leak reported if it isn't. The counter lives
//! on the `Runtime` struct itself, not behind a global or a cross-thread
//! registry.

use crate::runtime::Runtime;
use crate::value::{Tag, Value};

/// Allocate `size` bytes, tracked against `runtime`'s live allocation
/// counter. Aborts the process on allocation failure — an OOM here is
/// not a recoverable domain error.
///
/// # Safety
/// `size` must be nonzero.
pub(crate) unsafe fn raw_alloc(runtime: &mut Runtime, size: usize) -> *mut u8 {
    let ptr = unsafe { libc::malloc(size) as *mut u8 };
    if ptr.is_null() {
        oom(size);
    }
    runtime.alloc_count += 1;
    ptr
}

/// Allocate `size` zero-initialized bytes (the `zero-alloc` primitive).
///
/// # Safety
/// `size` must be nonzero.
pub(crate) unsafe fn raw_zalloc(runtime: &mut Runtime, size: usize) -> *mut u8 {
    let ptr = unsafe { libc::calloc(1, size) as *mut u8 };
    if ptr.is_null() {
        oom(size);
    }
    runtime.alloc_count += 1;
    ptr
}

/// Grow or shrink a previous allocation in place where possible.
///
/// # Safety
/// `ptr` must have been returned by [`raw_alloc`]/[`raw_zalloc`]/
/// [`raw_realloc`] on this runtime, and not yet freed.
pub(crate) unsafe fn raw_realloc(
    runtime: &mut Runtime,
    ptr: *mut u8,
    _old_size: usize,
    new_size: usize,
) -> *mut u8 {
    let new_ptr = unsafe { libc::realloc(ptr.cast(), new_size) as *mut u8 };
    if new_ptr.is_null() {
        oom(new_size);
    }
    let _ = runtime;
    new_ptr
}

/// Free a previous allocation, decrementing the live allocation counter.
///
/// # Safety
/// `ptr` must have been returned by one of the allocation functions
/// above on this runtime, not yet freed.
pub(crate) unsafe fn raw_free(runtime: &mut Runtime, ptr: *mut u8, _size: usize) {
    unsafe { libc::free(ptr.cast()) };
    runtime.alloc_count -= 1;
}

#[cold]
fn oom(size: usize) -> ! {
    eprintln!("sprig-runtime: fatal: allocator returned null for a {size}-byte request");
    std::process::abort();
}

/// Dispatch a mortal heap object's refcount-zero finalization: release
/// owned children, then free the object's storage.
///
/// Fails fatally (`UnknownTag`) if the tag is not one of the recognized
/// pointer-carrying tags.
///
/// # Safety
/// `value` must carry a heap pointer to a live object allocated by
/// `runtime`, with its refcount already observed to be exactly 1 (about
/// to become 0).
pub(crate) unsafe fn finalize_and_free(runtime: &mut Runtime, value: Value) {
    let ptr = value.as_ptr();
    unsafe {
        match value.tag {
            Tag::Str => crate::string::free_string(runtime, ptr.cast()),
            Tag::BoxI64 | Tag::BoxU64 | Tag::BoxF64 => {
                crate::intbox::free_box(runtime, ptr.cast())
            }
            Tag::Array => crate::array::free_array(runtime, ptr.cast()),
            Tag::Map => crate::map::free_map(runtime, ptr.cast()),
            Tag::RefCell => crate::refcell::free_refcell(runtime, ptr.cast()),
            Tag::Lambda => crate::lambda::free_lambda(runtime, ptr.cast()),
            Tag::UnionObj => crate::union_obj::free_union(runtime, ptr.cast()),
            Tag::ClassObj | Tag::ClassMeta => crate::class::free_class_object(runtime, ptr.cast()),
            Tag::Symbol => panic!("release: symbols are immortal and should never reach free"),
            Tag::Null | Tag::Bool | Tag::I32 | Tag::F32 | Tag::Char | Tag::SmallUnion => {
                panic!("release: unknown tag reached finalize_and_free")
            }
        }
    }
}
