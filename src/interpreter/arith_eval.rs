//! Arithmetic evaluation.
//!
//! Integer-only evaluation of [`ArithExpr`] against the variable store:
//! names read through [`Variables`] and default to 0 when unset (or when
//! their value isn't a number), assignments and increments write back.
//! Division by zero is the one hard error.

use crate::ast::{ArithBinaryOp, ArithExpr, ArithUnaryOp};
use crate::interpreter::errors::ShellError;
use crate::interpreter::state::ShellState;

fn read_var(state: &ShellState, name: &str) -> i64 {
    state
        .vars
        .value(name)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

fn truthy(n: i64) -> i64 {
    (n != 0) as i64
}

pub fn eval(state: &mut ShellState, expr: &ArithExpr) -> Result<i64, ShellError> {
    match expr {
        ArithExpr::Number(n) => Ok(*n),
        ArithExpr::Var(name) => Ok(read_var(state, name)),

        ArithExpr::Unary(op, operand) => {
            let v = eval(state, operand)?;
            Ok(match op {
                ArithUnaryOp::Neg => v.wrapping_neg(),
                ArithUnaryOp::Plus => v,
                ArithUnaryOp::Not => (v == 0) as i64,
                ArithUnaryOp::BitNot => !v,
            })
        }

        ArithExpr::Binary(op, lhs, rhs) => {
            // Logical operators short-circuit; everything else is strict.
            match op {
                ArithBinaryOp::LogAnd => {
                    let l = eval(state, lhs)?;
                    if l == 0 {
                        return Ok(0);
                    }
                    return Ok(truthy(eval(state, rhs)?));
                }
                ArithBinaryOp::LogOr => {
                    let l = eval(state, lhs)?;
                    if l != 0 {
                        return Ok(1);
                    }
                    return Ok(truthy(eval(state, rhs)?));
                }
                _ => {}
            }
            let l = eval(state, lhs)?;
            let r = eval(state, rhs)?;
            apply_binary(*op, l, r)
        }

        ArithExpr::Assign { name, op, value } => {
            let rhs = eval(state, value)?;
            let result = match op {
                Some(op) => apply_binary(*op, read_var(state, name), rhs)?,
                None => rhs,
            };
            if !state.vars.set(name, result.to_string()) {
                return Err(ShellError::expansion(
                    format!("{}: readonly variable", name),
                    1,
                ));
            }
            Ok(result)
        }

        ArithExpr::PreIncr { name, delta } => {
            let new = read_var(state, name).wrapping_add(*delta);
            if !state.vars.set(name, new.to_string()) {
                return Err(ShellError::expansion(
                    format!("{}: readonly variable", name),
                    1,
                ));
            }
            Ok(new)
        }

        ArithExpr::PostIncr { name, delta } => {
            let old = read_var(state, name);
            let new = old.wrapping_add(*delta);
            if !state.vars.set(name, new.to_string()) {
                return Err(ShellError::expansion(
                    format!("{}: readonly variable", name),
                    1,
                ));
            }
            Ok(old)
        }

        ArithExpr::Ternary {
            cond,
            then,
            otherwise,
        } => {
            if eval(state, cond)? != 0 {
                eval(state, then)
            } else {
                eval(state, otherwise)
            }
        }
    }
}

fn apply_binary(op: ArithBinaryOp, l: i64, r: i64) -> Result<i64, ShellError> {
    use ArithBinaryOp::*;
    Ok(match op {
        Add => l.wrapping_add(r),
        Sub => l.wrapping_sub(r),
        Mul => l.wrapping_mul(r),
        Div => {
            if r == 0 {
                return Err(ShellError::expansion("division by 0", 1));
            }
            l.wrapping_div(r)
        }
        Mod => {
            if r == 0 {
                return Err(ShellError::expansion("division by 0", 1));
            }
            l.wrapping_rem(r)
        }
        Pow => {
            if r < 0 {
                return Err(ShellError::expansion("exponent less than 0", 1));
            }
            let mut acc: i64 = 1;
            for _ in 0..r {
                acc = acc.wrapping_mul(l);
            }
            acc
        }
        Shl => l.wrapping_shl(r as u32),
        Shr => l.wrapping_shr(r as u32),
        Lt => (l < r) as i64,
        Le => (l <= r) as i64,
        Gt => (l > r) as i64,
        Ge => (l >= r) as i64,
        Eq => (l == r) as i64,
        Ne => (l != r) as i64,
        BitAnd => l & r,
        BitXor => l ^ r,
        BitOr => l | r,
        LogAnd | LogOr => unreachable!("short-circuited above"),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::arith::parse;

    fn run(state: &mut ShellState, text: &str) -> Result<i64, ShellError> {
        eval(state, &parse(text).unwrap())
    }

    #[test]
    fn basic_arithmetic_and_precedence() {
        let mut state = ShellState::default();
        assert_eq!(run(&mut state, "2+3*4").unwrap(), 14);
        assert_eq!(run(&mut state, "(2+3)*4").unwrap(), 20);
        assert_eq!(run(&mut state, "2**10").unwrap(), 1024);
        assert_eq!(run(&mut state, "7%3").unwrap(), 1);
        assert_eq!(run(&mut state, "-5+2").unwrap(), -3);
    }

    #[test]
    fn unset_variables_read_as_zero() {
        let mut state = ShellState::default();
        assert_eq!(run(&mut state, "nope+1").unwrap(), 1);
    }

    #[test]
    fn variables_read_and_write() {
        let mut state = ShellState::default();
        state.vars.set("x", "5");
        assert_eq!(run(&mut state, "x*2").unwrap(), 10);
        assert_eq!(run(&mut state, "x=7").unwrap(), 7);
        assert_eq!(state.vars.value("x"), Some("7"));
        assert_eq!(run(&mut state, "x+=3").unwrap(), 10);
        assert_eq!(state.vars.value("x"), Some("10"));
    }

    #[test]
    fn increments_write_back() {
        let mut state = ShellState::default();
        state.vars.set("i", "1");
        assert_eq!(run(&mut state, "i++").unwrap(), 1);
        assert_eq!(state.vars.value("i"), Some("2"));
        assert_eq!(run(&mut state, "++i").unwrap(), 3);
        assert_eq!(run(&mut state, "i--").unwrap(), 3);
        assert_eq!(state.vars.value("i"), Some("2"));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut state = ShellState::default();
        assert!(run(&mut state, "1/0").is_err());
        assert!(run(&mut state, "1%0").is_err());
    }

    #[test]
    fn comparisons_and_logic() {
        let mut state = ShellState::default();
        assert_eq!(run(&mut state, "3<5").unwrap(), 1);
        assert_eq!(run(&mut state, "5<=4").unwrap(), 0);
        assert_eq!(run(&mut state, "1&&2").unwrap(), 1);
        assert_eq!(run(&mut state, "0||0").unwrap(), 0);
        assert_eq!(run(&mut state, "!0").unwrap(), 1);
    }

    #[test]
    fn logical_and_short_circuits_assignments() {
        let mut state = ShellState::default();
        assert_eq!(run(&mut state, "0 && (x=5)").unwrap(), 0);
        assert!(!state.vars.is_set("x"));
    }

    #[test]
    fn ternary_selects_branch() {
        let mut state = ShellState::default();
        assert_eq!(run(&mut state, "1 ? 10 : 20").unwrap(), 10);
        assert_eq!(run(&mut state, "0 ? 10 : 20").unwrap(), 20);
    }

    #[test]
    fn bitwise_operators() {
        let mut state = ShellState::default();
        assert_eq!(run(&mut state, "6&3").unwrap(), 2);
        assert_eq!(run(&mut state, "6|3").unwrap(), 7);
        assert_eq!(run(&mut state, "6^3").unwrap(), 5);
        assert_eq!(run(&mut state, "1<<4").unwrap(), 16);
        assert_eq!(run(&mut state, "~0").unwrap(), -1);
    }

    #[test]
    fn readonly_assignment_fails() {
        let mut state = ShellState::default();
        state.vars.set("ro", "1");
        state.vars.set_readonly("ro");
        assert!(run(&mut state, "ro=2").is_err());
    }
}
