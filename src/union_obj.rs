//! Tagged union objects: a discriminant plus a fixed-size payload array.
//!
//! Implemented as a heap object with its own header rather than a
//! payload carried inline in `Value`, since this runtime's ABI has no
//! native enum payload — every composite lives behind a pointer-carrying
//! tag.

use crate::error::{ErrorKind, fatal};
use crate::header::{ObjHeader, builtin_class};
use crate::memory::{raw_alloc, raw_free};
use crate::runtime::Runtime;
use crate::value::{Tag, Value, fresh_header, sprig_release, sprig_retain};

#[repr(C)]
pub struct UnionObj {
    pub header: ObjHeader,
    pub discriminant: u32,
    pub n_fields: u32,
    pub fields: *mut Value,
}

/// `new(discriminant, fields[])`: retains each field value.
///
/// The object header's `class_id` is set to [`builtin_class::UNION`],
/// not the string class id.
pub fn new_union(runtime: &mut Runtime, discriminant: u32, fields: &[Value]) -> Value {
    unsafe {
        let n = fields.len();
        let data = if n == 0 {
            std::ptr::null_mut()
        } else {
            raw_alloc(runtime, n * std::mem::size_of::<Value>()) as *mut Value
        };
        for (i, &f) in fields.iter().enumerate() {
            sprig_retain(f);
            data.add(i).write(f);
        }
        let ptr = raw_alloc(runtime, std::mem::size_of::<UnionObj>()) as *mut UnionObj;
        ptr.write(UnionObj {
            header: fresh_header(builtin_class::UNION),
            discriminant,
            n_fields: n as u32,
            fields: data,
        });
        Value::from_ptr(Tag::UnionObj, ptr.cast())
    }
}

pub fn discriminant(u: *const UnionObj) -> u32 {
    unsafe { (*u).discriminant }
}

pub fn field_count(u: *const UnionObj) -> usize {
    unsafe { (*u).n_fields as usize }
}

/// Bounds-checked field read, returning a retained copy of the payload.
/// Aborts fatally (`BoundsError`) if `i >= field_count`.
pub fn get(u: *const UnionObj, i: usize) -> Value {
    unsafe {
        if i >= (*u).n_fields as usize {
            fatal(ErrorKind::BoundsError, &format!("union field {i} >= count {}", (*u).n_fields));
        }
        let v = *(*u).fields.add(i);
        sprig_retain(v);
        v
    }
}

/// Release every field, then free the union object.
///
/// # Safety
/// `u` must be a live `UnionObj` allocated by `runtime`.
pub(crate) unsafe fn free_union(runtime: &mut Runtime, u: *mut UnionObj) {
    unsafe {
        let n = (*u).n_fields as usize;
        let runtime_ptr: *mut Runtime = runtime;
        for i in 0..n {
            sprig_release(runtime_ptr, *(*u).fields.add(i));
        }
        if n > 0 {
            raw_free(runtime, (*u).fields.cast(), n * std::mem::size_of::<Value>());
        }
        raw_free(runtime, u.cast(), std::mem::size_of::<UnionObj>());
    }
}

// --- C ABI ---

/// # Safety
/// `runtime` must be live; `fields` must point to at least `fields_len`
/// readable [`Value`]s (or be null with `fields_len == 0`).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_new_union_object(
    runtime: *mut Runtime,
    discriminant_tag: u32,
    fields: *const Value,
    fields_len: usize,
) -> Value {
    let slice = if fields_len == 0 { &[] } else { unsafe { std::slice::from_raw_parts(fields, fields_len) } };
    unsafe { new_union(&mut *runtime, discriminant_tag, slice) }
}

/// # Safety
/// `u` must carry a `UnionObj` heap pointer; `i` is bounds-checked and
/// aborts fatally if out of range.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_union_get(u: Value, i: usize) -> Value {
    get(u.as_ptr().cast(), i)
}

/// `tag-of(value)`: the inline discriminant for a payload-less
/// `Tag::SmallUnion` immediate (e.g. the `None` a map lookup returns),
/// or the heap discriminant for a `Tag::UnionObj`.
///
/// # Safety
/// `u` must carry either `Tag::SmallUnion` or a `UnionObj` heap pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_union_discriminant(u: Value) -> u32 {
    if u.tag == Tag::SmallUnion {
        return u.small_union_discriminant();
    }
    discriminant(u.as_ptr().cast())
}

/// Wrap an optional value as the tagged-union result the spec's
/// recoverable-lookup operations return: a payload-less `None`
/// (encoded inline, `Tag::SmallUnion` discriminant 0) or a heap
/// `Some(value)` (discriminant 1, one field). Used by map lookups.
pub(crate) fn option_to_value(runtime: &mut Runtime, opt: Option<Value>) -> Value {
    match opt {
        None => Value::small_union(0),
        Some(v) => new_union(runtime, 1, &[v]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_and_fields_round_trip() {
        let mut r = Runtime::new();
        let fields = [Value::i32(1), Value::i32(2)];
        let v = new_union(&mut r, 3, &fields);
        let u: *const UnionObj = v.as_ptr().cast();
        assert_eq!(discriminant(u), 3);
        assert_eq!(field_count(u), 2);
        assert_eq!(get(u, 1).as_i32(), 2);
        unsafe { crate::memory::finalize_and_free(&mut r, v) };
    }

    #[test]
    fn header_class_id_is_union_not_string() {
        let mut r = Runtime::new();
        let v = new_union(&mut r, 0, &[]);
        assert_eq!(v.header().class_id, builtin_class::UNION);
        unsafe { crate::memory::finalize_and_free(&mut r, v) };
    }

    #[test]
    #[should_panic]
    fn field_out_of_bounds_is_fatal() {
        let mut r = Runtime::new();
        let v = new_union(&mut r, 0, &[]);
        let u: *const UnionObj = v.as_ptr().cast();
        let _ = get(u, 0);
    }
}
