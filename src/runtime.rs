//! The `Runtime` handle: per-runtime state threaded explicitly through
//! every public entry point, with no process-global or thread-local
//! state anywhere in this crate. Concurrency and cross-runtime sharing
//! are both out of scope, but holding every allocator, symbol table,
//! and class registry behind one handle keeps embedding more than one
//! logical program in the same process straightforward regardless.

use crate::class::ClassRegistry;
use crate::error::leak_detected;
use crate::intbox::IntBoxPool;
use crate::symbol::SymbolTable;

/// Derive a process-lifetime hash seed from wall-clock time, per spec.md
/// §3 ("PRNG seed (seeded from wall-clock time)"). Falls back to a fixed
/// constant if the clock is unavailable (e.g. pre-epoch system time),
/// which only ever happens on a misconfigured host.
fn seed_from_wall_clock() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as u64 ^ 0x9E37_79B9_7F4A_7C15,
        Err(_) => 0x9E37_79B9_7F4A_7C15,
    }
}

/// All state private to one instance of this runtime. Every module in
/// this crate takes a `&Runtime`/`&mut Runtime` (or the raw
/// `*mut Runtime` the C ABI trades in) rather than reaching for a
/// `static`.
pub struct Runtime {
    /// Live allocation count, incremented by every `raw_alloc`/
    /// `raw_zalloc` and decremented by every `raw_free`. Compared
    /// against zero at teardown to catch leaks.
    pub alloc_count: i64,
    pub(crate) seed: u64,
    pub(crate) symbols: SymbolTable,
    pub(crate) int_pool: IntBoxPool,
    pub(crate) classes: ClassRegistry,
}

impl Runtime {
    /// Construct a fresh runtime. The integer box pool's 1024 entries
    /// are pre-allocated and marked immortal as part of this call.
    pub fn new() -> Runtime {
        let mut runtime = Runtime {
            alloc_count: 0,
            seed: seed_from_wall_clock(),
            symbols: SymbolTable::new(),
            int_pool: IntBoxPool::empty(),
            classes: ClassRegistry::new(),
        };
        // The pool needs a `&mut Runtime` to allocate through — build it
        // against the runtime we just constructed, then install it.
        runtime.int_pool = IntBoxPool::new(&mut runtime);
        runtime
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Construct a runtime for an embedder, returning an owning pointer.
///
/// # Safety
/// The returned pointer must eventually be passed to
/// [`sprig_free_runtime`] exactly once, and to no other freeing function.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_new_runtime() -> *mut Runtime {
    Box::into_raw(Box::new(Runtime::new()))
}

/// Tear down a runtime: free the symbol table and integer box pool, then
/// verify the live allocation count has returned to exactly zero.
///
/// Aborts fatally (`LeakDetected`) if it hasn't — every allocation this
/// runtime made should have a matching release by the time its owner
/// calls this.
///
/// # Safety
/// `runtime` must be a pointer obtained from [`sprig_new_runtime`], not
/// already freed. It must not be used after this call returns.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_free_runtime(runtime: *mut Runtime) {
    unsafe {
        let mut owned = Box::from_raw(runtime);
        crate::symbol::teardown(&mut owned);
        crate::intbox::teardown(&mut owned);
        if owned.alloc_count != 0 {
            leak_detected(owned.alloc_count);
        }
    }
}
