use std::sync::Arc;

use crate::error::Exception;
use crate::location::Location;
use crate::value::Value;

// ── Broadcasting numeric operations ─────────────────────────────────────
//
// Unary numeric operations map elementwise over lists to any depth; binary
// operations additionally pair a scalar with every element of a list, or
// two lists elementwise.

pub(crate) fn unary_num_op(
    name: &str,
    arg: &Value,
    f: fn(f64) -> f64,
    reject_nan: bool,
    loc: &Location,
) -> Result<Value, Exception> {
    match arg {
        Value::Num(n) => {
            let r = f(*n);
            if reject_nan && r.is_nan() {
                return Err(Exception::at(loc.clone(), format!("{}: domain error", name)));
            }
            Ok(Value::Num(r))
        }
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(unary_num_op(name, item, f, reject_nan, loc)?);
            }
            Ok(Value::List(Arc::new(out)))
        }
        _ => Err(Exception::at(loc.clone(), format!("{}: not a number", name))),
    }
}

pub(crate) fn binary_num_op(
    name: &str,
    left: &Value,
    right: &Value,
    f: fn(f64, f64) -> f64,
    loc: &Location,
) -> Result<Value, Exception> {
    match (left, right) {
        (Value::Num(a), Value::Num(b)) => Ok(Value::Num(f(*a, *b))),
        (Value::Num(_), Value::List(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(binary_num_op(name, left, item, f, loc)?);
            }
            Ok(Value::List(Arc::new(out)))
        }
        (Value::List(items), Value::Num(_)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(binary_num_op(name, item, right, f, loc)?);
            }
            Ok(Value::List(Arc::new(out)))
        }
        (Value::List(a), Value::List(b)) => {
            if a.len() != b.len() {
                return Err(Exception::at(
                    loc.clone(),
                    format!("{}: mismatched list lengths", name),
                ));
            }
            let mut out = Vec::with_capacity(a.len());
            for (x, y) in a.iter().zip(b.iter()) {
                out.push(binary_num_op(name, x, y, f, loc)?);
            }
            Ok(Value::List(Arc::new(out)))
        }
        _ => Err(Exception::at(loc.clone(), format!("{}: not a number", name))),
    }
}

/// Reduce a list with a broadcasting binary operation, starting from the
/// given identity.  Used by `max` and `min`.
pub(crate) fn reduce_num_op(
    name: &str,
    identity: f64,
    arg: &Value,
    f: fn(f64, f64) -> f64,
    loc: &Location,
) -> Result<Value, Exception> {
    let Value::List(items) = arg else {
        return Err(Exception::at(loc.clone(), format!("{}: not a list", name)));
    };
    let mut acc = Value::Num(identity);
    for item in items.iter() {
        acc = binary_num_op(name, &acc, item, f, loc)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;
    use crate::token::Token;

    fn loc() -> Location {
        Location::new(Script::new("test", ""), Token::default())
    }

    fn list(items: &[f64]) -> Value {
        Value::List(Arc::new(items.iter().map(|&n| Value::Num(n)).collect()))
    }

    #[test]
    fn unary_broadcasts_over_lists() {
        let r = unary_num_op("sqrt", &list(&[4.0, 9.0, 16.0]), f64::sqrt, true, &loc()).unwrap();
        assert_eq!(r, list(&[2.0, 3.0, 4.0]));
    }

    #[test]
    fn unary_rejects_nan_results_when_asked() {
        let err = unary_num_op("sqrt", &Value::Num(-1.0), f64::sqrt, true, &loc()).unwrap_err();
        assert!(err.message.contains("sqrt: domain error"));
    }

    #[test]
    fn binary_pairs_scalar_with_list() {
        let r = binary_num_op("+", &Value::Num(10.0), &list(&[1.0, 2.0]), |a, b| a + b, &loc())
            .unwrap();
        assert_eq!(r, list(&[11.0, 12.0]));
    }

    #[test]
    fn binary_rejects_mismatched_lengths() {
        let err = binary_num_op("+", &list(&[1.0]), &list(&[1.0, 2.0]), |a, b| a + b, &loc())
            .unwrap_err();
        assert!(err.message.contains("mismatched list lengths"));
    }

    #[test]
    fn reduce_uses_identity_for_empty_list() {
        let r = reduce_num_op("max", f64::NEG_INFINITY, &list(&[]), f64::max, &loc()).unwrap();
        assert_eq!(r, Value::Num(f64::NEG_INFINITY));
    }
}
