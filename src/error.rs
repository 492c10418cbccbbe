//! Error kinds and the fatal-abort policy.
//!
//! This runtime never unwinds across its ABI boundary. Programmer
//! errors reachable only from miscompiled emitted code abort the
//! process immediately; recoverable domain signals (a container lookup
//! miss) are modeled as `Option`/tagged-union results at the call site
//! instead of going through this module at all.

use std::fmt;

/// The fixed set of error kinds this runtime can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadUtf8,
    BoundsError,
    UnknownTag,
    MissingMethod,
    InvokeOnPrimitive,
    ArithUnsupported,
    TooLong,
    LeakDetected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::BadUtf8 => "bad UTF-8 sequence",
            ErrorKind::BoundsError => "index out of bounds",
            ErrorKind::UnknownTag => "unknown heap tag",
            ErrorKind::MissingMethod => "no method with that name on receiver's class",
            ErrorKind::InvokeOnPrimitive => "dynamic dispatch on a non-heap value",
            ErrorKind::ArithUnsupported => "arithmetic operator unsupported for operand type",
            ErrorKind::TooLong => "string builder exceeded the maximum code-unit count",
            ErrorKind::LeakDetected => "runtime teardown detected a memory leak",
        };
        f.write_str(s)
    }
}

/// Abort the process with a diagnostic, for a programmer error reachable
/// only from miscompiled code.
///
/// # Panics
/// Always. This function never returns.
pub(crate) fn fatal(kind: ErrorKind, detail: &str) -> ! {
    eprintln!("sprig-runtime: fatal: {kind}: {detail}");
    panic!("sprig-runtime fatal error: {kind}: {detail}");
}

/// Report a detected leak and exit the process with status 1 — distinct
/// from [`fatal`]'s panic, since this is reported at clean teardown
/// rather than mid-operation abort.
pub(crate) fn leak_detected(live_count: i64) -> ! {
    eprintln!("sprig-runtime: {}: {live_count} allocations still live at teardown", ErrorKind::LeakDetected);
    std::process::exit(1);
}
