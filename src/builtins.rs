use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::arith::{reduce_num_op, unary_num_op};
use crate::atom::Atom;
use crate::error::Exception;
use crate::eval::Evaluator;
use crate::location::Location;
use crate::meaning::Metafunction;
use crate::value::{Function, Record, Shape, Value};

/// An entry of the builtin namespace: either an ordinary value bound to a
/// name, or a metafunction handled during analysis.
pub(crate) enum Builtin {
    Value(Value),
    Meta(Metafunction),
}

pub(crate) type Namespace = HashMap<Atom, Builtin>;

static NAMESPACE: OnceLock<Namespace> = OnceLock::new();

pub(crate) fn builtin_namespace() -> &'static Namespace {
    NAMESPACE.get_or_init(build_namespace)
}

fn build_namespace() -> Namespace {
    let mut ns = Namespace::new();
    let value = |ns: &mut Namespace, name: &str, v: Value| {
        ns.insert(Atom::intern(name), Builtin::Value(v));
    };
    let function = |name: &'static str, nargs: usize, call: crate::value::BuiltinFn| {
        Value::Function(Arc::new(Function::Builtin { name, nargs, call }))
    };

    value(&mut ns, "pi", Value::Num(std::f64::consts::PI));
    value(&mut ns, "tau", Value::Num(std::f64::consts::TAU));
    value(&mut ns, "inf", Value::Num(f64::INFINITY));
    value(&mut ns, "null", Value::Null);
    value(&mut ns, "true", Value::Bool(true));
    value(&mut ns, "false", Value::Bool(false));
    value(&mut ns, "sqrt", function("sqrt", 1, builtin_sqrt));
    value(&mut ns, "abs", function("abs", 1, builtin_abs));
    value(&mut ns, "max", function("max", 1, builtin_max));
    value(&mut ns, "min", function("min", 1, builtin_min));
    value(&mut ns, "norm", function("norm", 1, builtin_norm));
    value(&mut ns, "len", function("len", 1, builtin_len));
    value(&mut ns, "file", function("file", 1, builtin_file));
    value(&mut ns, "shape2d", function("shape2d", 1, builtin_shape2d));
    ns.insert(Atom::intern("echo"), Builtin::Meta(Metafunction::Echo));
    ns
}

fn builtin_sqrt(_: &mut Evaluator, args: &[Value], loc: &Location) -> Result<Value, Exception> {
    unary_num_op("sqrt", &args[0], f64::sqrt, true, loc)
}

fn builtin_abs(_: &mut Evaluator, args: &[Value], loc: &Location) -> Result<Value, Exception> {
    unary_num_op("abs", &args[0], f64::abs, true, loc)
}

fn builtin_max(_: &mut Evaluator, args: &[Value], loc: &Location) -> Result<Value, Exception> {
    reduce_num_op("max", f64::NEG_INFINITY, &args[0], f64::max, loc)
}

fn builtin_min(_: &mut Evaluator, args: &[Value], loc: &Location) -> Result<Value, Exception> {
    reduce_num_op("min", f64::INFINITY, &args[0], f64::min, loc)
}

fn builtin_norm(_: &mut Evaluator, args: &[Value], loc: &Location) -> Result<Value, Exception> {
    let Value::List(items) = &args[0] else {
        return Err(Exception::at(loc.clone(), "norm: not a list"));
    };
    let mut sum = 0.0;
    for item in items.iter() {
        let x = match item {
            Value::Num(n) => *n,
            _ => f64::NAN,
        };
        sum += x * x;
    }
    if sum.is_nan() {
        return Err(Exception::at(loc.clone(), "norm: domain error"));
    }
    Ok(Value::Num(sum.sqrt()))
}

fn builtin_len(_: &mut Evaluator, args: &[Value], loc: &Location) -> Result<Value, Exception> {
    let Value::List(items) = &args[0] else {
        return Err(Exception::at(loc.clone(), "len: not a list"));
    };
    Ok(Value::Num(items.len() as f64))
}

/// Load, parse, analyze, and evaluate another script.  The path is
/// resolved relative to the calling script's directory.
fn builtin_file(ev: &mut Evaluator, args: &[Value], loc: &Location) -> Result<Value, Exception> {
    let Value::Str(path) = &args[0] else {
        return Err(Exception::at(loc.clone(), "file: not a string"));
    };
    let resolved: PathBuf = match Path::new(&loc.script().name).parent() {
        Some(dir) => dir.join(path.as_ref()),
        None => PathBuf::from(path.as_ref()),
    };
    let script = ev.system.load_script(&resolved, loc)?;
    ev.eval_script(script)
        .map_err(|e| e.with_context(loc.clone()))
}

/// Wrap a record as a 2D shape.  A module argument is accepted too, its
/// fields forced into a record, so `shape2d {dist = ...}` works whether
/// the braces were classified as record or module.
fn builtin_shape2d(ev: &mut Evaluator, args: &[Value], loc: &Location) -> Result<Value, Exception> {
    let record = match &args[0] {
        Value::Record(record) => record.clone(),
        Value::Module(module) => {
            let mut record = Record::new();
            for &(name, slot) in &module.dictionary {
                record.insert(name, ev.force_module_slot(&module.slots, slot, loc)?);
            }
            Arc::new(record)
        }
        _ => return Err(Exception::at(loc.clone(), "shape2d: not a record")),
    };
    Ok(Value::Shape(Arc::new(Shape {
        record,
        dimensions: 2,
    })))
}
