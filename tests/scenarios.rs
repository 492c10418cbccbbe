//! End-to-end scenarios exercising more than one module at once.

use sprig_runtime::{
    ArithOp, NO_GC, ObjHeader, Runtime, Tag, Value, arith_update, entries_in_order, get_capture_ref,
    lambda_invoke, KeyType, map_get, map_is_large, map_len, map_remove, map_set, new_lambda, new_map,
    new_ref_cell, new_string_from_bytes, refcell_get, set_capture_ref, sprig_release, string_concat,
    string_length, symbol_intern, to_utf8_bytes,
};

/// Extract the raw heap pointer from a heap-tagged [`Value`], for casting
/// to the concrete object type a given module operates on. `payload.ptr`
/// is a public field; this just localizes the `unsafe` union read.
fn ptr_of(v: Value) -> *mut ObjHeader {
    unsafe { v.payload.ptr }
}

fn is_immortal(v: Value) -> bool {
    unsafe { (*ptr_of(v)).refcount.get() == NO_GC }
}

/// "héllo" (0x68 0xC3 0xA9 0x6C 0x6C 0x6F as UTF-8) must decode to a
/// wide string of 5 code units, since 'é' doesn't fit in a byte.
#[test]
fn string_widening_scenario() {
    let mut r = Runtime::new();
    let v = new_string_from_bytes(&mut r, &[0x68, 0xC3, 0xA9, 0x6C, 0x6C, 0x6F]);
    assert_eq!(string_length(ptr_of(v).cast()), 5);
    let roundtrip = to_utf8_bytes(ptr_of(v).cast());
    assert_eq!(roundtrip, vec![0x68, 0xC3, 0xA9, 0x6C, 0x6C, 0x6F]);
    unsafe { sprig_release(&mut r, v) };
}

/// Concatenating a narrow ASCII string with a wide string must widen the
/// whole result, not just the wide half.
#[test]
fn narrow_plus_wide_concatenation_scenario() {
    let mut r = Runtime::new();
    let narrow = new_string_from_bytes(&mut r, b"foo-");
    let wide = new_string_from_bytes(&mut r, &[0x68, 0xC3, 0xA9, 0x6C, 0x6C, 0x6F]);
    let cat = string_concat(&mut r, ptr_of(narrow).cast(), ptr_of(wide).cast());
    assert_eq!(string_length(ptr_of(cat).cast()), 9);
    assert_eq!(to_utf8_bytes(ptr_of(cat).cast()), b"foo-h\xC3\xA9llo".to_vec());
    unsafe {
        sprig_release(&mut r, narrow);
        sprig_release(&mut r, wide);
        sprig_release(&mut r, cat);
    }
}

/// Interning the same bytes twice must return the same symbol, and that
/// symbol must be immortal.
#[test]
fn symbol_interning_identity_scenario() {
    let mut r = Runtime::new();
    let a = symbol_intern(&mut r, b"hello-world");
    let b = symbol_intern(&mut r, b"hello-world");
    assert_eq!(ptr_of(a), ptr_of(b));
    assert!(is_immortal(a));
}

/// Inserting the pairs `(1,"a"),(2,"b"),...,(8,"h")` promotes the map
/// from small to large mode on the 8th `set` (spec.md §8 scenario 4);
/// every key must remain reachable by `get`, and `remove` must return
/// each value exactly once.
#[test]
fn map_promotion_at_eight_entries_scenario() {
    let mut r = Runtime::new();
    let v = new_map(&mut r, KeyType::I32, 0);
    let m = ptr_of(v);
    for i in 0..7 {
        map_set(&mut r, m.cast(), Value::i32(i), Value::i32(i * 100));
    }
    assert!(!map_is_large(m.cast()));
    map_set(&mut r, m.cast(), Value::i32(7), Value::i32(700));
    assert!(map_is_large(m.cast()));
    assert_eq!(map_len(m.cast()), 8);

    for i in 0..8 {
        assert_eq!(map_get(&r, m.cast(), Value::i32(i)).unwrap().as_i32(), i * 100);
    }
    for i in 0..8 {
        let removed = map_remove(&mut r, m.cast(), Value::i32(i)).unwrap();
        assert_eq!(removed.as_i32(), i * 100);
    }
    assert_eq!(map_len(m.cast()), 0);
    unsafe { sprig_release(&mut r, v) };
}

/// Literal reproduction of spec.md §8 scenario 4: insert `(1,"a")` through
/// `(8,"h")`, `get(5)` returns `Some("e")`, `remove(5)` returns `Some("e")`
/// and iteration afterwards yields `1,2,3,4,6,7,8`.
#[test]
fn map_literal_insert_get_remove_scenario() {
    let mut r = Runtime::new();
    let letters: [&[u8]; 8] = [b"a", b"b", b"c", b"d", b"e", b"f", b"g", b"h"];
    let v = new_map(&mut r, KeyType::I32, 0);
    let m = ptr_of(v);
    let mut values = Vec::new();
    for (i, letter) in letters.iter().enumerate() {
        let s = new_string_from_bytes(&mut r, letter);
        map_set(&mut r, m.cast(), Value::i32(i as i32 + 1), s);
        values.push(s);
    }
    assert!(map_is_large(m.cast()));

    let found = map_get(&r, m.cast(), Value::i32(5)).unwrap();
    assert_eq!(to_utf8_bytes(ptr_of(found).cast()), b"e");

    let removed = map_remove(&mut r, m.cast(), Value::i32(5)).unwrap();
    assert_eq!(to_utf8_bytes(ptr_of(removed).cast()), b"e");

    let remaining_keys: Vec<i32> = entries_in_order(m.cast()).iter().map(|(k, _)| k.as_i32()).collect();
    assert_eq!(remaining_keys, vec![1, 2, 3, 4, 6, 7, 8]);

    unsafe {
        // `removed` and `values[4]` are the same pointer but distinct owned
        // shares: one from `map_set`'s retain (transferred out by
        // `map_remove` into `removed`), one from this string's original
        // construction (still held by `values[4]`). Both must be released.
        sprig_release(&mut r, removed);
        for s in values {
            sprig_release(&mut r, s);
        }
        sprig_release(&mut r, v);
    }
}

/// Two lambdas that both capture the same ref-cell observe each other's
/// writes through it.
#[test]
fn ref_cell_shared_mutation_via_two_lambdas_scenario() {
    unsafe extern "C" fn identity(this: Value, _argc: u32, _argv: *const Value) -> Value {
        this
    }

    let mut r = Runtime::new();
    let cell = new_ref_cell(&mut r, Value::i32(0));

    let lambda_a = new_lambda(&mut r, identity, &[cell]);
    let lambda_b = new_lambda(&mut r, identity, &[cell]);

    lambda_invoke(lambda_a, 0, std::ptr::null());
    lambda_invoke(lambda_b, 0, std::ptr::null());

    let a_ptr = ptr_of(lambda_a);
    let b_ptr = ptr_of(lambda_b);
    set_capture_ref(&mut r as *mut Runtime, a_ptr.cast(), 0, Value::i32(41));
    assert_eq!(get_capture_ref(b_ptr.cast(), 0).as_i32(), 41);
    assert_eq!(refcell_get(ptr_of(cell).cast()).as_i32(), 41);

    unsafe {
        sprig_release(&mut r, lambda_a);
        sprig_release(&mut r, lambda_b);
        sprig_release(&mut r, cell);
    }
}

/// A map constructed with initial size 16 (so it starts in large mode),
/// with 100 entries inserted then all removed, must bring the
/// runtime's live allocation count back to exactly its starting value —
/// the load-bearing property behind `LeakDetected` at teardown.
#[test]
fn map_insert_then_remove_all_returns_to_baseline_scenario() {
    let mut r = Runtime::new();
    let before = r.alloc_count;
    let v = new_map(&mut r, KeyType::I32, 16);
    assert!(map_is_large(ptr_of(v).cast()));
    let m = ptr_of(v);
    for i in 0..100 {
        map_set(&mut r, m.cast(), Value::i32(i), Value::i32(i));
    }
    let order: Vec<i32> = entries_in_order(m.cast()).iter().map(|(k, _)| k.as_i32()).collect();
    assert_eq!(order, (0..100).collect::<Vec<_>>());
    for i in 0..100 {
        map_remove(&mut r, m.cast(), Value::i32(i));
    }
    unsafe { sprig_release(&mut r, v) };
    assert_eq!(r.alloc_count, before);
}

/// Arithmetic `update` through a ref-cell target.
#[test]
fn arithmetic_update_through_ref_cell_scenario() {
    let mut r = Runtime::new();
    let cell = new_ref_cell(&mut r, Value::i32(10));
    let mut target = cell;
    arith_update(&mut r as *mut Runtime, ArithOp::Add, &mut target, Value::i32(32));
    assert_eq!(refcell_get(ptr_of(cell).cast()).as_i32(), 42);
    unsafe { sprig_release(&mut r, cell) };
}

#[test]
fn every_heap_tag_is_distinct_from_the_non_heap_boundary() {
    assert!(!Tag::SmallUnion.is_heap());
    assert!(Tag::Str.is_heap());
}
