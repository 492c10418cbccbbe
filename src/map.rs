//! Ordered hash map.
//!
//! Small maps (fewer than [`SMALL_MODE_CAPACITY`] entries, or any map
//! whose keys are all booleans) keep only a doubly linked list in
//! insertion order and look keys up by a linear scan. The `set` that
//! brings a non-boolean-keyed map's count to [`SMALL_MODE_CAPACITY`]
//! promotes it once, permanently, to large mode: the same linked list
//! (insertion order is never disturbed) plus a chained hash-bucket index
//! for O(1) average lookup. Buckets are grown and rehashed once the
//! load factor passes 0.75.
//!
//! `remove` reads the stored value only after the node has been located
//! (never from a stale reference); `set` bumps the entry count on a
//! fresh insert only; `remove` decrements it on removal only; promotion
//! walks the order list all the way to `NULL` rather than stopping at a
//! remembered "last" pointer; large maps rehash once their load factor
//! exceeds 0.75.

use std::cell::Cell;

use crate::header::{ObjHeader, builtin_class};
use crate::memory::{raw_alloc, raw_free};
use crate::runtime::Runtime;
use crate::value::{Tag, Value, fresh_header, sprig_release, sprig_retain};

/// A `set` that brings a non-boolean-keyed small map's count to this
/// many entries promotes it to large mode immediately (so small mode
/// holds at most `SMALL_MODE_CAPACITY - 1` entries in practice).
pub const SMALL_MODE_CAPACITY: usize = 8;

const INITIAL_BUCKET_COUNT: usize = 16;
const MAX_LOAD_FACTOR: f64 = 0.75;

/// The key type fixed at a map's construction: booleans, 32-bit
/// integers, characters, and strings are hashable; every other value
/// kind (pointer-identity heap objects, floats, unit, inline union
/// discriminants) cannot be a map key. Every key later passed to
/// `map_set`/`map_get`/`map_remove` must carry this tag.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KeyType {
    Bool,
    I32,
    Char,
    Str,
}

impl KeyType {
    /// `None` for value kinds that cannot be used as a map key.
    pub fn from_tag(tag: Tag) -> Option<Self> {
        match tag {
            Tag::Bool => Some(KeyType::Bool),
            Tag::I32 => Some(KeyType::I32),
            Tag::Char => Some(KeyType::Char),
            Tag::Str => Some(KeyType::Str),
            _ => None,
        }
    }

    fn matches(self, tag: Tag) -> bool {
        KeyType::from_tag(tag) == Some(self)
    }
}

struct MapNode {
    key: Value,
    value: Value,
    hash: u64,
    order_prev: *mut MapNode,
    order_next: *mut MapNode,
    bucket_next: *mut MapNode,
}

#[repr(C)]
pub struct Map {
    pub header: ObjHeader,
    head: *mut MapNode,
    tail: *mut MapNode,
    len: u32,
    key_type: KeyType,
    is_large: Cell<bool>,
    buckets: Cell<*mut *mut MapNode>,
    bucket_count: Cell<u32>,
}

/// A fresh, empty map fixed to `key_type`. Boolean-keyed maps never
/// promote (there are only two possible keys, so a bucket index buys
/// nothing). A non-boolean map constructed with
/// `init_size >= SMALL_MODE_CAPACITY` starts directly in large mode
/// with buckets sized to hold it, so it never passes through small
/// mode at all.
pub fn new_map(runtime: &mut Runtime, key_type: KeyType, init_size: usize) -> Value {
    unsafe {
        let ptr = raw_alloc(runtime, std::mem::size_of::<Map>()) as *mut Map;
        ptr.write(Map {
            header: fresh_header(builtin_class::MAP),
            head: std::ptr::null_mut(),
            tail: std::ptr::null_mut(),
            len: 0,
            key_type,
            is_large: Cell::new(false),
            buckets: Cell::new(std::ptr::null_mut()),
            bucket_count: Cell::new(0),
        });
        let value = Value::from_ptr(Tag::Map, ptr.cast());
        if key_type != KeyType::Bool && init_size >= SMALL_MODE_CAPACITY {
            let initial_buckets = INITIAL_BUCKET_COUNT.max(init_size.next_power_of_two());
            (*ptr).is_large.set(true);
            rebuild_buckets(runtime, ptr, initial_buckets);
        }
        value
    }
}

pub fn len(m: *const Map) -> usize {
    unsafe { (*m).len as usize }
}

pub fn is_large(m: *const Map) -> bool {
    unsafe { (*m).is_large.get() }
}

/// Structural key equality. Strings compare by content; every other
/// heap kind (and symbols, which are interned) compares by pointer
/// identity; primitives compare by value.
fn key_eq(runtime: &Runtime, a: Value, b: Value) -> bool {
    if a.tag != b.tag {
        return false;
    }
    match a.tag {
        Tag::Null => true,
        Tag::Bool => a.as_bool() == b.as_bool(),
        Tag::I32 => a.as_i32() == b.as_i32(),
        Tag::F32 => a.as_f32().to_bits() == b.as_f32().to_bits(),
        Tag::Char => a.as_char() == b.as_char(),
        Tag::SmallUnion => a.small_union_discriminant() == b.small_union_discriminant(),
        Tag::Str => crate::string::string_eq(runtime, a.as_ptr().cast(), b.as_ptr().cast()),
        _ => unsafe { a.payload.ptr == b.payload.ptr },
    }
}

/// Structural key hash, consistent with [`key_eq`].
fn key_hash(runtime: &Runtime, key: Value) -> u64 {
    match key.tag {
        Tag::Null => 0,
        Tag::Bool => key.as_bool() as u64,
        Tag::I32 => key.as_i32() as u64,
        Tag::F32 => key.as_f32().to_bits() as u64,
        Tag::Char => key.as_char() as u64,
        Tag::SmallUnion => key.small_union_discriminant() as u64,
        Tag::Str => crate::string::string_hash(runtime, key.as_ptr().cast()),
        _ => unsafe { key.payload.ptr as u64 },
    }
}

unsafe fn find_in_chain(mut node: *mut MapNode, runtime: &Runtime, key: Value, hash: u64) -> *mut MapNode {
    unsafe {
        while !node.is_null() {
            if (*node).hash == hash && key_eq(runtime, (*node).key, key) {
                return node;
            }
            node = (*node).bucket_next;
        }
    }
    std::ptr::null_mut()
}

fn find_node(runtime: &Runtime, m: *const Map, key: Value) -> *mut MapNode {
    unsafe {
        let h = key_hash(runtime, key);
        if (*m).is_large.get() {
            let buckets = (*m).buckets.get();
            let count = (*m).bucket_count.get() as u64;
            let idx = (h % count) as usize;
            find_in_chain(*buckets.add(idx), runtime, key, h)
        } else {
            let mut node = (*m).head;
            while !node.is_null() {
                if (*node).hash == h && key_eq(runtime, (*node).key, key) {
                    return node;
                }
                node = (*node).order_next;
            }
            std::ptr::null_mut()
        }
    }
}

/// Rebuild the bucket index from the order list, which is always
/// walked all the way to `NULL`.
fn rebuild_buckets(runtime: &mut Runtime, m: *mut Map, new_bucket_count: usize) {
    unsafe {
        let old_buckets = (*m).buckets.get();
        let old_count = (*m).bucket_count.get() as usize;
        if !old_buckets.is_null() {
            raw_free(runtime, old_buckets.cast(), old_count * std::mem::size_of::<*mut MapNode>());
        }
        let bytes = new_bucket_count * std::mem::size_of::<*mut MapNode>();
        let buckets = crate::memory::raw_zalloc(runtime, bytes) as *mut *mut MapNode;
        (*m).buckets.set(buckets);
        (*m).bucket_count.set(new_bucket_count as u32);

        let mut node = (*m).head;
        while !node.is_null() {
            let idx = ((*node).hash % new_bucket_count as u64) as usize;
            (*node).bucket_next = *buckets.add(idx);
            *buckets.add(idx) = node;
            node = (*node).order_next;
        }
    }
}

fn promote_to_large(runtime: &mut Runtime, m: *mut Map) {
    unsafe {
        (*m).is_large.set(true);
    }
    rebuild_buckets(runtime, m, INITIAL_BUCKET_COUNT);
}

fn maybe_rehash(runtime: &mut Runtime, m: *mut Map) {
    unsafe {
        let count = (*m).bucket_count.get() as usize;
        if count == 0 {
            return;
        }
        let load = (*m).len as f64 / count as f64;
        if load > MAX_LOAD_FACTOR {
            rebuild_buckets(runtime, m, count * 2);
        }
    }
}

fn append_order(m: *mut Map, node: *mut MapNode) {
    unsafe {
        (*node).order_prev = (*m).tail;
        (*node).order_next = std::ptr::null_mut();
        if (*m).tail.is_null() {
            (*m).head = node;
        } else {
            (*(*m).tail).order_next = node;
        }
        (*m).tail = node;
    }
}

fn unlink_order(m: *mut Map, node: *mut MapNode) {
    unsafe {
        if (*node).order_prev.is_null() {
            (*m).head = (*node).order_next;
        } else {
            (*(*node).order_prev).order_next = (*node).order_next;
        }
        if (*node).order_next.is_null() {
            (*m).tail = (*node).order_prev;
        } else {
            (*(*node).order_next).order_prev = (*node).order_prev;
        }
    }
}

fn unlink_bucket(m: *mut Map, node: *mut MapNode) {
    unsafe {
        if !(*m).is_large.get() {
            return;
        }
        let buckets = (*m).buckets.get();
        let count = (*m).bucket_count.get() as u64;
        let idx = ((*node).hash % count) as usize;
        let mut cur = *buckets.add(idx);
        if cur == node {
            *buckets.add(idx) = (*node).bucket_next;
            return;
        }
        while !cur.is_null() {
            if (*cur).bucket_next == node {
                (*cur).bucket_next = (*node).bucket_next;
                return;
            }
            cur = (*cur).bucket_next;
        }
    }
}

/// Insert or update `key -> value`, retaining both on a fresh insert and
/// retaining only the new value on an update (the old value is
/// released). The entry count is incremented on insert and never
/// touched on update.
pub fn map_set(runtime: &mut Runtime, m: *mut Map, key: Value, value: Value) {
    unsafe {
        if !(*m).key_type.matches(key.tag) {
            panic!("map_set: key tag {:?} does not match map's key type {:?}", key.tag, (*m).key_type);
        }
        let existing = find_node(runtime, m, key);
        if !existing.is_null() {
            sprig_release(runtime as *mut Runtime, (*existing).value);
            sprig_retain(value);
            (*existing).value = value;
            return;
        }

        let h = key_hash(runtime, key);
        sprig_retain(key);
        sprig_retain(value);
        let node = raw_alloc(runtime, std::mem::size_of::<MapNode>()) as *mut MapNode;
        node.write(MapNode {
            key,
            value,
            hash: h,
            order_prev: std::ptr::null_mut(),
            order_next: std::ptr::null_mut(),
            bucket_next: std::ptr::null_mut(),
        });
        append_order(m, node);
        (*m).len += 1;

        if (*m).is_large.get() {
            let buckets = (*m).buckets.get();
            let count = (*m).bucket_count.get() as u64;
            let idx = (h % count) as usize;
            (*node).bucket_next = *buckets.add(idx);
            *buckets.add(idx) = node;
            maybe_rehash(runtime, m);
        } else if (*m).key_type != KeyType::Bool && (*m).len as usize >= SMALL_MODE_CAPACITY {
            promote_to_large(runtime, m);
        }
    }
}

/// Look up `key`. Returns the stored value with no implicit retain
/// (same convention as [`crate::refcell::get`]), or `None` on a miss.
pub fn map_get(runtime: &Runtime, m: *const Map, key: Value) -> Option<Value> {
    let node = find_node(runtime, m, key);
    if node.is_null() {
        None
    } else {
        Some(unsafe { (*node).value })
    }
}

/// Remove `key`, returning its value to the caller (ownership transfers:
/// the caller must release it). The stored key is released here; the
/// value is read only after the node has been located. The entry count
/// is decremented on removal and never touched otherwise.
pub fn map_remove(runtime: &mut Runtime, m: *mut Map, key: Value) -> Option<Value> {
    let node = find_node(runtime, m, key);
    if node.is_null() {
        return None;
    }
    unsafe {
        let value = (*node).value;
        let stored_key = (*node).key;
        unlink_bucket(m, node);
        unlink_order(m, node);
        (*m).len -= 1;
        sprig_release(runtime as *mut Runtime, stored_key);
        raw_free(runtime, node.cast(), std::mem::size_of::<MapNode>());
        Some(value)
    }
}

/// Keys and values in insertion order, for iteration and testing.
pub fn entries_in_order(m: *const Map) -> Vec<(Value, Value)> {
    let mut out = Vec::new();
    unsafe {
        let mut node = (*m).head;
        while !node.is_null() {
            out.push(((*node).key, (*node).value));
            node = (*node).order_next;
        }
    }
    out
}

/// Release every stored key and value, free the bucket index (if any)
/// and every node, then free the map itself.
///
/// # Safety
/// `m` must be a live `Map` allocated by `runtime`.
pub(crate) unsafe fn free_map(runtime: &mut Runtime, m: *mut Map) {
    unsafe {
        let runtime_ptr: *mut Runtime = runtime;
        let mut node = (*m).head;
        while !node.is_null() {
            let next = (*node).order_next;
            sprig_release(runtime_ptr, (*node).key);
            sprig_release(runtime_ptr, (*node).value);
            raw_free(runtime, node.cast(), std::mem::size_of::<MapNode>());
            node = next;
        }
        let buckets = (*m).buckets.get();
        if !buckets.is_null() {
            raw_free(runtime, buckets.cast(), (*m).bucket_count.get() as usize * std::mem::size_of::<*mut MapNode>());
        }
        raw_free(runtime, m.cast(), std::mem::size_of::<Map>());
    }
}

// --- C ABI ---

impl KeyType {
    fn from_u32(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(KeyType::Bool),
            1 => Some(KeyType::I32),
            2 => Some(KeyType::Char),
            3 => Some(KeyType::Str),
            _ => None,
        }
    }
}

/// # Safety
/// `runtime` must be a live runtime pointer. Aborts fatally if
/// `key_type` doesn't name one of the hashable key kinds.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_new_map(runtime: *mut Runtime, key_type: u32, init_size: usize) -> Value {
    let Some(kt) = KeyType::from_u32(key_type) else {
        crate::error::fatal(crate::error::ErrorKind::UnknownTag, &format!("new_map: unhashable key type tag {key_type}"));
    };
    unsafe { new_map(&mut *runtime, kt, init_size) }
}

/// # Safety
/// `runtime` and `m` must be live; `key`'s tag must match the map's key
/// type.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_map_set(runtime: *mut Runtime, m: Value, key: Value, value: Value) {
    unsafe { map_set(&mut *runtime, m.as_ptr().cast(), key, value) }
}

/// Returns the spec's `Some(value)`/`None` tagged-union result: a heap
/// union object with discriminant 1 and one field on a hit, or the
/// inline payload-less discriminant-0 variant on a miss.
///
/// # Safety
/// `runtime` and `m` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_map_get(runtime: *mut Runtime, m: Value, key: Value) -> Value {
    unsafe {
        let found = map_get(&*runtime, m.as_ptr().cast(), key);
        crate::union_obj::option_to_value(&mut *runtime, found)
    }
}

/// Same `Some`/`None` encoding as [`sprig_map_get`]. The removed value's
/// ownership (transferred out of the map by `map_remove`) is consumed
/// by this call: on a hit it ends up owned by the returned `Some`
/// union's single field, not held twice.
///
/// # Safety
/// `runtime` and `m` must be live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_map_remove(runtime: *mut Runtime, m: Value, key: Value) -> Value {
    unsafe {
        match map_remove(&mut *runtime, m.as_ptr().cast(), key) {
            None => Value::small_union(0),
            Some(value) => {
                let wrapped = crate::union_obj::new_union(&mut *runtime, 1, &[value]);
                sprig_release(runtime, value);
                wrapped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove_round_trip() {
        let mut r = Runtime::new();
        let v = new_map(&mut r, KeyType::I32, 0);
        let m: *mut Map = v.as_ptr().cast();
        map_set(&mut r, m, Value::i32(1), Value::i32(100));
        assert_eq!(map_get(&r, m, Value::i32(1)).unwrap().as_i32(), 100);
        assert_eq!(len(m), 1);
        let removed = map_remove(&mut r, m, Value::i32(1)).unwrap();
        assert_eq!(removed.as_i32(), 100);
        assert_eq!(len(m), 0);
        assert!(map_get(&r, m, Value::i32(1)).is_none());
        unsafe { crate::memory::finalize_and_free(&mut r, v) };
    }

    #[test]
    fn update_does_not_change_length() {
        let mut r = Runtime::new();
        let v = new_map(&mut r, KeyType::I32, 0);
        let m: *mut Map = v.as_ptr().cast();
        map_set(&mut r, m, Value::i32(1), Value::i32(1));
        map_set(&mut r, m, Value::i32(1), Value::i32(2));
        assert_eq!(len(m), 1);
        assert_eq!(map_get(&r, m, Value::i32(1)).unwrap().as_i32(), 2);
        unsafe { crate::memory::finalize_and_free(&mut r, v) };
    }

    #[test]
    fn promotes_to_large_mode_on_reaching_eight_entries() {
        let mut r = Runtime::new();
        let v = new_map(&mut r, KeyType::I32, 0);
        let m: *mut Map = v.as_ptr().cast();
        for i in 0..7 {
            map_set(&mut r, m, Value::i32(i), Value::i32(i * 10));
        }
        assert!(!is_large(m));
        map_set(&mut r, m, Value::i32(7), Value::i32(70));
        assert!(is_large(m));
        for i in 0..8 {
            assert_eq!(map_get(&r, m, Value::i32(i)).unwrap().as_i32(), i * 10);
        }
        for i in 0..8 {
            map_remove(&mut r, m, Value::i32(i));
        }
        assert_eq!(len(m), 0);
        unsafe { crate::memory::finalize_and_free(&mut r, v) };
    }

    #[test]
    fn insertion_order_is_preserved_across_promotion() {
        let mut r = Runtime::new();
        let v = new_map(&mut r, KeyType::I32, 0);
        let m: *mut Map = v.as_ptr().cast();
        for i in 0..12 {
            map_set(&mut r, m, Value::i32(i), Value::null());
        }
        let keys: Vec<i32> = entries_in_order(m).iter().map(|(k, _)| k.as_i32()).collect();
        assert_eq!(keys, (0..12).collect::<Vec<_>>());
        unsafe { crate::memory::finalize_and_free(&mut r, v) };
    }

    #[test]
    fn bool_keyed_map_never_promotes() {
        let mut r = Runtime::new();
        let v = new_map(&mut r, KeyType::Bool, 0);
        let m: *mut Map = v.as_ptr().cast();
        map_set(&mut r, m, Value::bool(true), Value::i32(1));
        map_set(&mut r, m, Value::bool(false), Value::i32(2));
        assert!(!is_large(m));
        unsafe { crate::memory::finalize_and_free(&mut r, v) };
    }

    #[test]
    fn initial_size_at_least_eight_starts_large() {
        let mut r = Runtime::new();
        let v = new_map(&mut r, KeyType::I32, 16);
        let m: *mut Map = v.as_ptr().cast();
        assert!(is_large(m));
        map_set(&mut r, m, Value::i32(1), Value::i32(100));
        assert!(is_large(m));
        assert_eq!(map_get(&r, m, Value::i32(1)).unwrap().as_i32(), 100);
        unsafe { crate::memory::finalize_and_free(&mut r, v) };
    }

    #[test]
    #[should_panic]
    fn key_tag_mismatch_is_fatal() {
        let mut r = Runtime::new();
        let v = new_map(&mut r, KeyType::I32, 0);
        let m: *mut Map = v.as_ptr().cast();
        map_set(&mut r, m, Value::bool(true), Value::i32(1));
    }

    #[test]
    fn insert_and_remove_all_returns_to_allocation_baseline() {
        let mut r = Runtime::new();
        let before = r.alloc_count;
        let v = new_map(&mut r, KeyType::I32, 0);
        let m: *mut Map = v.as_ptr().cast();
        for i in 0..100 {
            map_set(&mut r, m, Value::i32(i), Value::i32(i));
        }
        for i in 0..100 {
            map_remove(&mut r, m, Value::i32(i));
        }
        unsafe { crate::memory::finalize_and_free(&mut r, v) };
        assert_eq!(r.alloc_count, before);
    }
}
