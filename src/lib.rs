//! Core runtime for the Sprig language: a tagged-value ABI, manual
//! reference counting, and the heap object kinds emitted code allocates
//! (strings, symbols, boxed integers, arrays, ref-cells, lambdas, tagged
//! unions, class instances, and ordered maps).
//!
//! This crate is linked into a Sprig program as a static library; it has
//! no `main` of its own and no opinion about how a program's compiled
//! code is produced (that's the front end and codegen's job, not this
//! runtime's).

pub mod arithmetic;
pub mod array;
pub mod class;
pub mod error;
pub mod header;
pub mod intbox;
pub mod lambda;
pub mod map;
pub mod memory;
pub mod program;
pub mod refcell;
pub mod runtime;
pub mod string;
pub mod symbol;
pub mod union_obj;
pub mod value;

pub use arithmetic::{Op as ArithOp, update as arith_update};
pub use array::{Array, get as array_get, length as array_length, new_array, new_array_with_length, push as array_push, set as array_set};
pub use class::{
    ClassMeta, ClassObject, Finalizer, MethodDescriptor, define_class, define_class_methods,
    get_field as class_get_field, init_object, invoke as class_invoke, set_field as class_set_field,
    set_finalizer,
};
pub use error::ErrorKind;
pub use header::{ClassId, NO_GC, ObjHeader, builtin_class};
pub use intbox::{BoxedI64, box_i64, unbox_i64};
pub use lambda::{
    Lambda, SprigFn, get_capture, get_capture_ref, invoke as lambda_invoke, new_lambda, set_capture,
    set_capture_ref,
};
pub use map::{
    KeyType, Map, SMALL_MODE_CAPACITY, entries_in_order, is_large as map_is_large, len as map_len, map_get,
    map_remove, map_set, new_map,
};
pub use program::{MainFn, Program, run_main};
pub use refcell::{RefCellObj, get as refcell_get, new_ref_cell, set as refcell_set};
pub use runtime::{Runtime, sprig_free_runtime, sprig_new_runtime};
pub use string::{SprigString, new_string_from_bytes, string_cmp, string_concat, string_eq, string_hash, string_length, string_slice, to_utf8_bytes};
pub use symbol::intern as symbol_intern;
pub use union_obj::{UnionObj, discriminant as union_discriminant, field_count as union_field_count, get as union_get, new_union};
pub use value::{Payload, Tag, Value, sprig_release, sprig_retain};
