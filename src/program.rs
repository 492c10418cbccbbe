//! Program entry point.
//!
//! An emitted Sprig program hands the runtime a [`Program`] describing
//! where (if anywhere) its `main` function lives; [`run_main`] is the
//! one function CLI/startup glue (out of scope for this crate, per
//! spec.md §1) needs to call to hand control to generated code.

use crate::runtime::Runtime;
use crate::value::Value;

/// A program's `main`, called as `(runtime, this, argc, argv)` rather
/// than the `(this, argc, argv)` shape of [`crate::lambda::SprigFn`] /
/// class methods, since `main` has no receiver but does need the
/// runtime handle to construct its first values.
pub type MainFn = unsafe extern "C" fn(runtime: *mut Runtime, this: Value, argc: u32, argv: *const Value) -> Value;

/// Describes one compiled program: just an optional entry point. A
/// program with no `main` (a library with no executable entry) is
/// valid; running it returns null.
#[repr(C)]
pub struct Program {
    pub main_fun: Option<MainFn>,
}

/// `run-main(program)`: calls `program.main_fun(runtime, null-this, 0, null)`
/// if present, else returns null.
///
/// # Safety
/// `runtime` must be a live runtime pointer; `program` must point to a
/// live [`Program`].
pub unsafe fn run_main(runtime: *mut Runtime, program: *const Program) -> Value {
    unsafe {
        match (*program).main_fun {
            Some(f) => f(runtime, Value::null(), 0, std::ptr::null()),
            None => Value::null(),
        }
    }
}

/// # Safety
/// `runtime` must be a live runtime pointer; `program` must point to a
/// live [`Program`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_run_main(runtime: *mut Runtime, program: *const Program) -> Value {
    unsafe { run_main(runtime, program) }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn main_returns_42(_runtime: *mut Runtime, _this: Value, _argc: u32, _argv: *const Value) -> Value {
        Value::i32(42)
    }

    #[test]
    fn program_with_main_runs_it() {
        let mut r = Runtime::new();
        let program = Program { main_fun: Some(main_returns_42) };
        let result = unsafe { run_main(&mut r as *mut Runtime, &program) };
        assert_eq!(result.as_i32(), 42);
    }

    #[test]
    fn program_without_main_returns_null() {
        let mut r = Runtime::new();
        let program = Program { main_fun: None };
        let result = unsafe { run_main(&mut r as *mut Runtime, &program) };
        assert_eq!(result.tag, crate::value::Tag::Null);
    }
}
