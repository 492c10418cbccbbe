//! Class registry and dynamic dispatch.
//!
//! A class is a name, an optional finalizer, and a method table. Method
//! lookup is a linear scan over that table; with the small method
//! counts real classes carry, a flat scan outperforms the bookkeeping a
//! hash table would add.
//!
//! Id 0 is always the root class, "Object"; ids below
//! [`builtin_class::FIRST_USER_CLASS`] are reserved for the runtime's own
//! heap kinds and never registered here.

use crate::error::{ErrorKind, fatal};
use crate::header::{ClassId, ObjHeader, builtin_class};
use crate::lambda::SprigFn;
use crate::memory::{raw_alloc, raw_free};
use crate::runtime::Runtime;
use crate::value::{Tag, Value, fresh_header, mark_immortal, sprig_release, sprig_retain};

/// Called in place of a normal method body when a class instance with a
/// custom finalizer reaches refcount zero.
pub type Finalizer = unsafe extern "C" fn(this: Value);

struct Method {
    name: Vec<u8>,
    arity: u32,
    func: SprigFn,
}

struct ClassDescriptor {
    name: Vec<u8>,
    finalizer: Option<Finalizer>,
    methods: Vec<Method>,
}

pub struct ClassRegistry {
    classes: Vec<ClassDescriptor>,
}

impl ClassRegistry {
    /// Seeds slots 0..[`builtin_class::FIRST_USER_CLASS`]: id 0 is the
    /// real "Object" class, ids 1..10 are placeholders reserved for the
    /// runtime's own heap kinds (string, symbol, array, map, ...), which
    /// are never looked up by name and never dispatch through `invoke`.
    /// Reserving them here keeps [`define_class`]'s first assigned id at
    /// `FIRST_USER_CLASS`, so the builtin-id space and the user-class id
    /// space never collide.
    pub fn new() -> Self {
        let mut classes = vec![ClassDescriptor { name: b"Object".to_vec(), finalizer: None, methods: Vec::new() }];
        while (classes.len() as ClassId) < builtin_class::FIRST_USER_CLASS {
            classes.push(ClassDescriptor { name: b"<builtin>".to_vec(), finalizer: None, methods: Vec::new() });
        }
        ClassRegistry { classes }
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A first-class handle onto a registered class, returned by
/// [`define_class`] so emitted code can hold and pass around "the class"
/// itself (e.g. to later call [`define_class_methods`] against it).
#[repr(C)]
pub struct ClassMeta {
    pub header: ObjHeader,
    pub class_id: ClassId,
}

/// An instance of a user-defined class: a flat array of field values
/// alongside the common header, exactly like [`crate::array::Array`]
/// but addressed by field index rather than a growable length.
#[repr(C)]
pub struct ClassObject {
    pub header: ObjHeader,
    pub n_fields: u32,
    pub fields: *mut Value,
}

/// Register a new class named `name`, returning an immortal
/// [`ClassMeta`] handle. Class ids are dense and stable: once assigned,
/// an id is never reused or renumbered.
pub fn define_class(runtime: &mut Runtime, name: &[u8]) -> Value {
    let id = runtime.classes.classes.len() as ClassId;
    runtime.classes.classes.push(ClassDescriptor { name: name.to_vec(), finalizer: None, methods: Vec::new() });
    unsafe {
        let ptr = raw_alloc(runtime, std::mem::size_of::<ClassMeta>()) as *mut ClassMeta;
        ptr.write(ClassMeta { header: fresh_header(builtin_class::OBJECT), class_id: id });
        let value = Value::from_ptr(Tag::ClassMeta, ptr.cast());
        mark_immortal(value);
        value
    }
}

/// Attach a finalizer to a registered class, called instead of the
/// default field-release teardown when an instance's refcount hits zero.
pub fn set_finalizer(runtime: &mut Runtime, class_id: ClassId, finalizer: Finalizer) {
    runtime.classes.classes[class_id as usize].finalizer = Some(finalizer);
}

/// Append methods to a class's method table. Later registrations shadow
/// earlier ones of the same name during lookup (the scan finds the
/// first match, so define methods in override-last order).
pub fn define_class_methods(runtime: &mut Runtime, class_id: ClassId, methods: &[(&[u8], u32, SprigFn)]) {
    let table = &mut runtime.classes.classes[class_id as usize].methods;
    for &(name, arity, func) in methods {
        table.push(Method { name: name.to_vec(), arity, func });
    }
}

/// Allocate a fresh instance of `class_id` with the given field values,
/// each retained.
pub fn init_object(runtime: &mut Runtime, class_id: ClassId, fields: &[Value]) -> Value {
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
        let ptr = raw_alloc(runtime, std::mem::size_of::<ClassObject>()) as *mut ClassObject;
        ptr.write(ClassObject { header: fresh_header(class_id), n_fields: n as u32, fields: data });
        Value::from_ptr(Tag::ClassObj, ptr.cast())
    }
}

pub fn get_field(obj: *const ClassObject, i: usize) -> Value {
    unsafe {
        debug_assert!(i < (*obj).n_fields as usize);
        *(*obj).fields.add(i)
    }
}

pub fn set_field(runtime: *mut Runtime, obj: *mut ClassObject, i: usize, v: Value) {
    unsafe {
        debug_assert!(i < (*obj).n_fields as usize);
        let slot = (*obj).fields.add(i);
        sprig_release(runtime, *slot);
        sprig_retain(v);
        *slot = v;
    }
}

/// Dynamic dispatch: scan `this`'s class's method table for `name`
/// (searching the class itself only — there is no superclass chain in
/// this runtime) and invoke it with `this` prepended to the call.
///
/// Aborts fatally (`InvokeOnPrimitive`) if `this` is not a heap value,
/// or (`MissingMethod`) if no method named `name` is registered.
pub fn invoke(runtime: &Runtime, this: Value, name: &[u8], argc: u32, argv: *const Value) -> Value {
    if !this.is_heap() {
        fatal(ErrorKind::InvokeOnPrimitive, "invoke: receiver is not a heap value");
    }
    let class_id = this.header().class_id;
    let Some(descriptor) = runtime.classes.classes.get(class_id as usize) else {
        fatal(ErrorKind::UnknownTag, &format!("invoke: unregistered class id {class_id}"));
    };
    for m in &descriptor.methods {
        if m.name == name {
            return unsafe { (m.func)(this, argc, argv) };
        }
    }
    fatal(
        ErrorKind::MissingMethod,
        &format!("invoke: class {:?} has no method named {:?}", String::from_utf8_lossy(&descriptor.name), String::from_utf8_lossy(name)),
    );
}

/// Free a class instance ([`Tag::ClassObj`]) or a class handle
/// ([`Tag::ClassMeta`]). Instances run their class's finalizer (if any)
/// in place of releasing fields; handles are immortal in ordinary
/// operation and only reach here if that invariant is violated.
///
/// # Safety
/// `ptr` must be a live object of the matching tag, allocated by
/// `runtime`.
pub(crate) unsafe fn free_class_object(runtime: &mut Runtime, ptr: *mut ObjHeader) {
    unsafe {
        let header = &*ptr;
        if header.class_id < builtin_class::FIRST_USER_CLASS
            && header.class_id != builtin_class::OBJECT
        {
            fatal(ErrorKind::UnknownTag, "free_class_object: header carries a non-class builtin id");
        }
        // A ClassMeta and a ClassObject share the header layout but not
        // the tail; the tag (recovered from context by the caller) tells
        // finalize_and_free which one this is, but both are freed the
        // same way here since neither owns more than header + optional
        // fields array. ClassMeta has no fields array.
        let finalizer = runtime.classes.classes.get(header.class_id as usize).and_then(|d| d.finalizer);
        let obj: *mut ClassObject = ptr.cast();
        // Heuristic is unnecessary: ClassMeta is always immortal and
        // never reaches this function in practice; treat any arrival
        // here as a ClassObject.
        if let Some(f) = finalizer {
            f(Value::from_ptr(Tag::ClassObj, ptr));
        }
        let n = (*obj).n_fields as usize;
        let runtime_ptr: *mut Runtime = runtime;
        for i in 0..n {
            sprig_release(runtime_ptr, *(*obj).fields.add(i));
        }
        if n > 0 {
            raw_free(runtime, (*obj).fields.cast(), n * std::mem::size_of::<Value>());
        }
        raw_free(runtime, ptr.cast(), std::mem::size_of::<ClassObject>());
    }
}

// --- C ABI ---

/// One entry of the `methods` array passed to [`sprig_define_class_methods`]:
/// a name (as a byte span), the method's declared arity, and its function
/// pointer.
#[repr(C)]
pub struct MethodDescriptor {
    pub name: *const u8,
    pub name_len: usize,
    pub arity: u32,
    pub func: SprigFn,
}

/// # Safety
/// `runtime` must be live; `name` must point to at least `name_len`
/// readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_define_class(runtime: *mut Runtime, name: *const u8, name_len: usize) -> Value {
    let slice = if name_len == 0 { &[] } else { unsafe { std::slice::from_raw_parts(name, name_len) } };
    unsafe { define_class(&mut *runtime, slice) }
}

/// # Safety
/// `runtime` must be live; `class_id` must have been returned by
/// [`sprig_define_class`]; `methods` must point to at least
/// `methods_len` readable [`MethodDescriptor`]s, each with a valid
/// `name`/`name_len`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_define_class_methods(
    runtime: *mut Runtime,
    class_id: ClassId,
    methods: *const MethodDescriptor,
    methods_len: usize,
) {
    unsafe {
        let rt = &mut *runtime;
        for i in 0..methods_len {
            let d = &*methods.add(i);
            let name = if d.name_len == 0 { &[] } else { std::slice::from_raw_parts(d.name, d.name_len) };
            define_class_methods(rt, class_id, &[(name, d.arity, d.func)]);
        }
    }
}

/// # Safety
/// `runtime` must be live; `fields` must point to at least `fields_len`
/// readable [`Value`]s (or be null with `fields_len == 0`).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_init_object(
    runtime: *mut Runtime,
    class_id: ClassId,
    fields: *const Value,
    fields_len: usize,
) -> Value {
    let slice = if fields_len == 0 { &[] } else { unsafe { std::slice::from_raw_parts(fields, fields_len) } };
    unsafe { init_object(&mut *runtime, class_id, slice) }
}

/// # Safety
/// `runtime` must be live; `name` must point to at least `name_len`
/// readable bytes; `argv` must point to at least `argc` readable
/// [`Value`]s.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_invoke_by_name(
    runtime: *mut Runtime,
    this: Value,
    name: *const u8,
    name_len: usize,
    argc: u32,
    argv: *const Value,
) -> Value {
    let slice = if name_len == 0 { &[] } else { unsafe { std::slice::from_raw_parts(name, name_len) } };
    invoke(unsafe { &*runtime }, this, slice, argc, argv)
}
