//! Object header: the common prefix of every heap-allocated object.
//!
//! Every heap object begins with an [`ObjHeader`]. The memory manager,
//! the retain/release contract, and dynamic dispatch all read this
//! header without knowing the rest of the object's layout.

use std::cell::Cell;

/// Sentinel refcount marking an object as immortal: outside normal
/// reference counting, retain/release on it are no-ops. Used for
/// interned symbols and pooled integer boxes.
pub const NO_GC: i64 = i64::MIN;

/// Dense integer id of a registered class. Id 0 is always the root
/// class ("Object"). Non-class heap objects (strings, arrays, ...) use
/// a fixed reserved id below any user-defined class.
pub type ClassId = u32;

/// Reserved class ids for runtime-native object kinds, distinguished
/// from user-defined classes registered through [`crate::class`].
pub mod builtin_class {
    use super::ClassId;

    pub const OBJECT: ClassId = 0;
    pub const STRING: ClassId = 1;
    pub const SYMBOL: ClassId = 2;
    pub const BOX_I64: ClassId = 3;
    pub const BOX_U64: ClassId = 4;
    pub const BOX_F64: ClassId = 5;
    pub const ARRAY: ClassId = 6;
    pub const MAP: ClassId = 7;
    pub const REF_CELL: ClassId = 8;
    pub const LAMBDA: ClassId = 9;
    pub const UNION: ClassId = 10;

    /// First id available for classes registered via `define-class`.
    pub const FIRST_USER_CLASS: ClassId = 11;
}

/// Common header present as the first field of every heap object.
///
/// `refcount` is a plain (non-atomic) `Cell`: the runtime is strictly
/// single-threaded, so no synchronization is needed or performed.
#[repr(C)]
pub struct ObjHeader {
    pub refcount: Cell<i64>,
    pub class_id: ClassId,
}

impl ObjHeader {
    #[inline]
    pub fn is_immortal(&self) -> bool {
        self.refcount.get() == NO_GC
    }
}
