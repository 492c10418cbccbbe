//! In-place arithmetic update over a fixed set of integer and float
//! operators.
//!
//! A single `update(op, target, rhs)` applies `op` to `(*target, rhs)`
//! and writes the result back into `target` in place, including
//! through a ref-cell indirection so a mutably-captured variable can be
//! updated without the caller unwrapping it first.

use crate::error::{ErrorKind, fatal};
use crate::refcell::RefCellObj;
use crate::runtime::Runtime;
use crate::value::{Tag, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitOr,
    BitXor,
    BitAnd,
}

/// Apply `op` to `(*target, rhs)` and write the result back into
/// `target`. If `target` holds a ref-cell, the update is applied to the
/// cell's contents and written back through it.
///
/// Aborts fatally (`ArithUnsupported`) if the operand types don't match
/// an i32/i32 or f32/f32 pair, if `op` isn't defined for f32 (only
/// `Add`/`Sub`/`Mul`/`Div` are), on division or remainder by zero, or on
/// a shift amount outside `[0, 31]`.
pub fn update(runtime: *mut Runtime, op: Op, target: *mut Value, rhs: Value) {
    unsafe {
        if (*target).tag == Tag::RefCell {
            let cell: *mut RefCellObj = (*target).as_ptr().cast();
            let current = crate::refcell::get(cell);
            let result = apply(op, current, rhs);
            crate::refcell::set(runtime, cell, result);
            return;
        }
        *target = apply(op, *target, rhs);
    }
}

fn apply(op: Op, left: Value, right: Value) -> Value {
    match (left.tag, right.tag) {
        (Tag::I32, Tag::I32) => Value::i32(apply_i32(op, left.as_i32(), right.as_i32())),
        (Tag::F32, Tag::F32) => Value::f32(apply_f32(op, left.as_f32(), right.as_f32())),
        _ => fatal(
            ErrorKind::ArithUnsupported,
            &format!("arithmetic update: unsupported operand tags {:?}/{:?}", left.tag, right.tag),
        ),
    }
}

fn apply_i32(op: Op, a: i32, b: i32) -> i32 {
    match op {
        Op::Add => a.wrapping_add(b),
        Op::Sub => a.wrapping_sub(b),
        Op::Mul => a.wrapping_mul(b),
        Op::Div => {
            if b == 0 {
                fatal(ErrorKind::ArithUnsupported, "integer division by zero");
            }
            a.wrapping_div(b)
        }
        Op::Rem => {
            if b == 0 {
                fatal(ErrorKind::ArithUnsupported, "integer remainder by zero");
            }
            a.wrapping_rem(b)
        }
        Op::Shl | Op::Shr => {
            if !(0..32).contains(&b) {
                fatal(ErrorKind::ArithUnsupported, &format!("shift amount {b} outside [0, 31]"));
            }
            if op == Op::Shl { a.wrapping_shl(b as u32) } else { a.wrapping_shr(b as u32) }
        }
        Op::BitOr => a | b,
        Op::BitXor => a ^ b,
        Op::BitAnd => a & b,
    }
}

fn apply_f32(op: Op, a: f32, b: f32) -> f32 {
    match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => a / b,
        _ => fatal(ErrorKind::ArithUnsupported, &format!("{op:?} is not defined for f32 operands")),
    }
}

impl Op {
    fn from_u32(code: u32) -> Option<Self> {
        match code {
            0 => Some(Op::Add),
            1 => Some(Op::Sub),
            2 => Some(Op::Mul),
            3 => Some(Op::Div),
            4 => Some(Op::Rem),
            5 => Some(Op::Shl),
            6 => Some(Op::Shr),
            7 => Some(Op::BitOr),
            8 => Some(Op::BitXor),
            9 => Some(Op::BitAnd),
            _ => None,
        }
    }
}

// --- C ABI ---

/// `update(op, &left, right)`: `op` is one of the [`Op`] discriminants
/// above, by ordinal (0 = `Add` .. 9 = `BitAnd`). Aborts fatally on an
/// unrecognized code.
///
/// # Safety
/// `target` must point to a live, initialized [`Value`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_arith_update(runtime: *mut Runtime, op: u32, target: *mut Value, rhs: Value) {
    let Some(op) = Op::from_u32(op) else {
        fatal(ErrorKind::ArithUnsupported, &format!("arith_update: unrecognized op code {op}"));
    };
    update(runtime, op, target, rhs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i32_ops_update_in_place() {
        let mut target = Value::i32(10);
        update(std::ptr::null_mut(), Op::Add, &mut target, Value::i32(5));
        assert_eq!(target.as_i32(), 15);
        update(std::ptr::null_mut(), Op::Shl, &mut target, Value::i32(1));
        assert_eq!(target.as_i32(), 30);
    }

    #[test]
    fn f32_ops_update_in_place() {
        let mut target = Value::f32(2.0);
        update(std::ptr::null_mut(), Op::Mul, &mut target, Value::f32(3.0));
        assert_eq!(target.as_f32(), 6.0);
    }

    #[test]
    #[should_panic]
    fn div_by_zero_is_fatal() {
        let mut target = Value::i32(1);
        update(std::ptr::null_mut(), Op::Div, &mut target, Value::i32(0));
    }

    #[test]
    #[should_panic]
    fn shift_out_of_range_is_fatal() {
        let mut target = Value::i32(1);
        update(std::ptr::null_mut(), Op::Shl, &mut target, Value::i32(32));
    }

    #[test]
    #[should_panic]
    fn bitwise_op_on_float_is_fatal() {
        let mut target = Value::f32(1.0);
        update(std::ptr::null_mut(), Op::BitOr, &mut target, Value::f32(1.0));
    }

    #[test]
    fn update_through_ref_cell_writes_back_through_the_cell() {
        let mut r = Runtime::new();
        let cell_val = crate::refcell::new_ref_cell(&mut r, Value::i32(10));
        let cell: *mut RefCellObj = cell_val.as_ptr().cast();
        let mut target = cell_val;
        update(&mut r as *mut Runtime, Op::Add, &mut target, Value::i32(5));
        assert_eq!(crate::refcell::get(cell).as_i32(), 15);
        unsafe { crate::memory::finalize_and_free(&mut r, cell_val) };
    }
}
