use std::io::Write;
use std::sync::Arc;

use crate::analyzer::analyze_program;
use crate::arith::binary_num_op;
use crate::error::Exception;
use crate::frame::Frame;
use crate::location::Location;
use crate::meaning::{Op, OpKind};
use crate::parser::parse_program;
use crate::script::Script;
use crate::system::System;
use crate::trace::trace_log;
use crate::value::{Function, Module, Nonlocals, SlotArray, Value};

/// The tree-walking evaluator.  Evaluation is straight recursive descent
/// over the operation graph; the only state beyond the frame stack is the
/// `System` that supplies the console and script loading.
pub struct Evaluator<'s> {
    pub(crate) system: &'s mut dyn System,
}

impl<'s> Evaluator<'s> {
    pub fn new(system: &'s mut dyn System) -> Evaluator<'s> {
        Evaluator { system }
    }

    /// Load, parse, analyze, and evaluate a whole script.  Also the
    /// implementation of the `file` builtin.
    pub fn eval_script(&mut self, script: Arc<Script>) -> Result<Value, Exception> {
        let program = parse_program(script)?;
        let (op, nslots) = analyze_program(&program)?;
        trace_log!("eval", "evaluating program in a {}-slot frame", nslots);
        let mut frame = Frame::new(nslots);
        self.eval(&op, &mut frame)
    }

    pub(crate) fn eval(&mut self, op: &Op, f: &mut Frame) -> Result<Value, Exception> {
        match &op.kind {
            OpKind::Constant(v) => Ok(v.clone()),

            // Arguments are eager, so an arg slot never holds a thunk.
            OpKind::ArgRef(k) => Ok(f.slots[*k].clone()),
            OpKind::LetRef(k) => match &f.slots[*k] {
                Value::Forcing => Err(Exception::at(
                    op.source.location(),
                    "illegal recursive reference",
                )),
                v => Ok(v.clone()),
            },
            OpKind::NonlocalRef(k) => match &f.nonlocals {
                Nonlocals::Captured(values) => Ok(values[*k].clone()),
                _ => unreachable!("nonlocal reference outside a closure frame"),
            },
            OpKind::ModuleRef(k) => {
                let Nonlocals::Module(slots) = f.nonlocals.clone() else {
                    unreachable!("module reference outside a module frame")
                };
                self.force_module_slot(&slots, *k, &op.source.location())
            }
            OpKind::NonlocalFunctionRef(k) => match &f.nonlocals {
                Nonlocals::Module(slots) => match slots.get(*k) {
                    Value::Lambda(lambda) => Ok(Value::Function(Arc::new(Function::Closure {
                        lambda,
                        nonlocals: Nonlocals::Module(slots.clone()),
                    }))),
                    _ => unreachable!("recursive function slot holds a non-lambda"),
                },
                _ => unreachable!("module reference outside a module frame"),
            },

            OpKind::Not(arg) => {
                let v = self.bool_operand(arg, f, "!")?;
                Ok(Value::Bool(!v))
            }
            OpKind::Positive(arg) => {
                let v = self.eval(arg, f)?;
                crate::arith::unary_num_op("+", &v, |n| n, false, &op.source.location())
            }
            OpKind::Negative(arg) => {
                let v = self.eval(arg, f)?;
                crate::arith::unary_num_op("-", &v, |n| -n, false, &op.source.location())
            }

            OpKind::Add(l, r) => self.numeric_binop(op, l, r, f, "+", |a, b| a + b),
            OpKind::Subtract(l, r) => self.numeric_binop(op, l, r, f, "-", |a, b| a - b),
            OpKind::Multiply(l, r) => self.numeric_binop(op, l, r, f, "*", |a, b| a * b),
            OpKind::Divide(l, r) => self.numeric_binop(op, l, r, f, "/", |a, b| a / b),
            OpKind::Power(l, r) => self.numeric_binop(op, l, r, f, "^", f64::powf),

            OpKind::Equal(l, r) => {
                let a = self.eval(l, f)?;
                let b = self.eval(r, f)?;
                Ok(Value::Bool(a == b))
            }
            OpKind::NotEqual(l, r) => {
                let a = self.eval(l, f)?;
                let b = self.eval(r, f)?;
                Ok(Value::Bool(a != b))
            }
            OpKind::Less(l, r) => self.comparison(op, l, r, f, "<", |a, b| a < b),
            OpKind::LessOrEqual(l, r) => self.comparison(op, l, r, f, "<=", |a, b| a <= b),
            OpKind::Greater(l, r) => self.comparison(op, l, r, f, ">", |a, b| a > b),
            OpKind::GreaterOrEqual(l, r) => self.comparison(op, l, r, f, ">=", |a, b| a >= b),

            // Short-circuit: the right operand is evaluated only if needed.
            OpKind::And(l, r) => {
                if !self.bool_operand(l, f, "&&")? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.bool_operand(r, f, "&&")?))
            }
            OpKind::Or(l, r) => {
                if self.bool_operand(l, f, "||")? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.bool_operand(r, f, "||")?))
            }

            OpKind::If {
                condition,
                then_expr,
            } => {
                if self.bool_operand(condition, f, "if")? {
                    self.eval(then_expr, f)
                } else {
                    Ok(Value::Null)
                }
            }
            OpKind::IfElse {
                condition,
                then_expr,
                else_expr,
            } => {
                if self.bool_operand(condition, f, "if")? {
                    self.eval(then_expr, f)
                } else {
                    self.eval(else_expr, f)
                }
            }

            OpKind::Let {
                first_slot,
                values,
                body,
            } => {
                self.bind_let_slots(*first_slot, values, f)?;
                self.eval(body, f)
            }
            OpKind::Block(ops) => self.block(ops, f),

            OpKind::List(ops) => {
                let mut items = Vec::new();
                for item in ops {
                    self.eval_items(item, f, &mut items)?;
                }
                Ok(Value::List(Arc::new(items)))
            }

            // Generator forms materialize a list in value context.
            OpKind::Sequence(_)
            | OpKind::For { .. }
            | OpKind::RangeGen { .. }
            | OpKind::Spread(_) => {
                let mut out = Vec::new();
                self.eval_items(op, f, &mut out)?;
                Ok(Value::List(Arc::new(out)))
            }

            OpKind::Record(fields) => {
                let mut record = crate::value::Record::new();
                for (name, field_op) in fields {
                    record.insert(*name, self.eval(field_op, f)?);
                }
                Ok(Value::Record(Arc::new(record)))
            }

            OpKind::Module {
                dictionary,
                slots,
                elements,
                frame_nslots,
            } => {
                let slot_array = SlotArray::new(slots.clone(), *frame_nslots);
                let mut element_values = Vec::new();
                let mut mframe = Frame::for_module(&slot_array);
                for e in elements {
                    self.eval_items(e, &mut mframe, &mut element_values)?;
                }
                Ok(Value::Module(Arc::new(Module {
                    dictionary: dictionary.clone(),
                    slots: slot_array,
                    elements: element_values,
                })))
            }

            OpKind::LambdaExpr { lambda, nonlocals } => {
                // Capture expressions are evaluated now, in the enclosing
                // frame; the closure never references the frame itself.
                let mut captured = Vec::with_capacity(nonlocals.len());
                for expr in nonlocals {
                    captured.push(self.eval(expr, f)?);
                }
                Ok(Value::Function(Arc::new(Function::Closure {
                    lambda: lambda.clone(),
                    nonlocals: Nonlocals::Captured(Arc::new(captured)),
                })))
            }

            OpKind::Call { func, argv } => {
                let func_value = self.eval(func, f)?;
                let mut args = Vec::with_capacity(argv.len());
                for a in argv {
                    args.push(self.eval(a, f)?);
                }
                self.call_function(&func_value, args, &op.source.location())
            }

            OpKind::Dot { arg, field } => {
                let value = self.eval(arg, f)?;
                let loc = op.source.location();
                match &value {
                    Value::Record(record) => record.get(*field).cloned().ok_or_else(|| {
                        Exception::at(loc, format!("{}: field not found", field))
                    }),
                    Value::Shape(shape) => shape.record.get(*field).cloned().ok_or_else(|| {
                        Exception::at(loc, format!("{}: field not found", field))
                    }),
                    Value::Module(module) => match module.slot_of(*field) {
                        Some(slot) => self.force_module_slot(&module.slots, slot, &loc),
                        None => Err(Exception::at(loc, format!("{}: field not found", field))),
                    },
                    _ => Err(Exception::at(loc, "not a record")),
                }
            }

            OpKind::At { arg, index } => {
                let value = self.eval(arg, f)?;
                let index_value = self.eval(index, f)?;
                let loc = op.source.location();
                let Value::List(items) = &value else {
                    return Err(Exception::at(loc, "not a list"));
                };
                let Value::Num(n) = index_value else {
                    return Err(Exception::at(loc, "index is not a number"));
                };
                if n.fract() != 0.0 || n < 0.0 || n >= items.len() as f64 {
                    return Err(Exception::at(loc, "index out of range"));
                }
                Ok(items[n as usize].clone())
            }

            OpKind::Echo(argv) => {
                let mut line = String::from("ECHO: ");
                for (i, a) in argv.iter().enumerate() {
                    if i > 0 {
                        line.push(',');
                    }
                    let v = self.eval(a, f)?;
                    line.push_str(&v.to_string());
                }
                line.push('\n');
                self.system
                    .console()
                    .write_all(line.as_bytes())
                    .map_err(|e| Exception::new(format!("console write failed: {}", e)))?;
                Ok(Value::Null)
            }
        }
    }

    /// Generator-aware evaluation: operations that produce element
    /// sequences splice them into `out`, anything else contributes its
    /// single value.
    fn eval_items(
        &mut self,
        op: &Op,
        f: &mut Frame,
        out: &mut Vec<Value>,
    ) -> Result<(), Exception> {
        match &op.kind {
            // A comma sequence splices; a bracket list is itself one value
            // and only its body is generator-aware.
            OpKind::Sequence(ops) => {
                for item in ops {
                    self.eval_items(item, f, out)?;
                }
                Ok(())
            }
            OpKind::Spread(inner) => {
                let v = self.eval(inner, f)?;
                match v {
                    Value::List(items) => {
                        out.extend(items.iter().cloned());
                        Ok(())
                    }
                    _ => Err(Exception::at(inner.source.location(), "not a list")),
                }
            }
            OpKind::RangeGen {
                first,
                last,
                step,
                exclusive,
            } => {
                let loc = op.source.location();
                let first = self.num_value(first, f)?;
                let last = self.num_value(last, f)?;
                let step = match step {
                    Some(s) => self.num_value(s, f)?,
                    None => 1.0,
                };
                if !first.is_finite() || !last.is_finite() || !step.is_finite() || step == 0.0 {
                    return Err(Exception::at(loc, "range: domain error"));
                }
                let mut v = first;
                loop {
                    let in_range = if step > 0.0 {
                        if *exclusive { v < last } else { v <= last }
                    } else if *exclusive {
                        v > last
                    } else {
                        v >= last
                    };
                    if !in_range {
                        break;
                    }
                    out.push(Value::Num(v));
                    v += step;
                }
                Ok(())
            }
            OpKind::For { slot, list, body } => {
                let list_value = self.eval(list, f)?;
                let Value::List(items) = list_value else {
                    return Err(Exception::at(list.source.location(), "for: not a list"));
                };
                for item in items.iter() {
                    f.slots[*slot] = item.clone();
                    self.eval_items(body, f, out)?;
                }
                Ok(())
            }
            OpKind::If {
                condition,
                then_expr,
            } => {
                if self.bool_operand(condition, f, "if")? {
                    self.eval_items(then_expr, f, out)?;
                }
                Ok(())
            }
            OpKind::IfElse {
                condition,
                then_expr,
                else_expr,
            } => {
                if self.bool_operand(condition, f, "if")? {
                    self.eval_items(then_expr, f, out)
                } else {
                    self.eval_items(else_expr, f, out)
                }
            }
            OpKind::Let {
                first_slot,
                values,
                body,
            } => {
                self.bind_let_slots(*first_slot, values, f)?;
                self.eval_items(body, f, out)
            }
            OpKind::Block(ops) => match ops.split_last() {
                Some((last, rest)) => {
                    for o in rest {
                        self.eval(o, f)?;
                    }
                    self.eval_items(last, f, out)
                }
                None => Ok(()),
            },
            _ => {
                out.push(self.eval(op, f)?);
                Ok(())
            }
        }
    }

    /// Semicolon sequencing: execute every statement, last value wins.
    fn block(&mut self, ops: &[Arc<Op>], f: &mut Frame) -> Result<Value, Exception> {
        match ops.split_last() {
            Some((last, rest)) => {
                for op in rest {
                    self.eval(op, f)?;
                }
                self.eval(last, f)
            }
            None => Ok(Value::Null),
        }
    }

    /// Let bindings are SSA-like: every slot starts as the `Forcing`
    /// sentinel, then each right-hand side is evaluated in binding order.
    /// A reference to a slot still holding the sentinel is an illegal
    /// recursive reference.
    fn bind_let_slots(
        &mut self,
        first_slot: usize,
        values: &[Value],
        f: &mut Frame,
    ) -> Result<(), Exception> {
        for i in 0..values.len() {
            f.slots[first_slot + i] = Value::Forcing;
        }
        for (i, v) in values.iter().enumerate() {
            let Value::Thunk(thunk) = v else {
                unreachable!("let binding is always analyzed to a thunk")
            };
            let expr = thunk.expr.clone();
            let value = self.eval(&expr, f)?;
            f.slots[first_slot + i] = value;
        }
        Ok(())
    }

    /// Force a module slot: `Unforced (thunk) → Forcing → Forced` exactly
    /// once per slot array; re-entry while forcing is fatal.  Recursive
    /// function slots are re-closed over the slot array on every read.
    pub(crate) fn force_module_slot(
        &mut self,
        slots: &Arc<SlotArray>,
        k: usize,
        loc: &Location,
    ) -> Result<Value, Exception> {
        match slots.get(k) {
            Value::Thunk(thunk) => {
                slots.set(k, Value::Forcing);
                let mut frame = Frame::for_module(slots);
                let value = self.eval(&thunk.expr, &mut frame)?;
                slots.set(k, value.clone());
                Ok(value)
            }
            Value::Forcing => Err(Exception::at(loc.clone(), "illegal recursive reference")),
            Value::Lambda(lambda) => Ok(Value::Function(Arc::new(Function::Closure {
                lambda,
                nonlocals: Nonlocals::Module(slots.clone()),
            }))),
            v => Ok(v),
        }
    }

    pub(crate) fn call_function(
        &mut self,
        func: &Value,
        args: Vec<Value>,
        loc: &Location,
    ) -> Result<Value, Exception> {
        let Value::Function(function) = func else {
            return Err(Exception::at(loc.clone(), "not callable"));
        };
        match &**function {
            Function::Builtin { name, nargs, call } => {
                if args.len() != *nargs {
                    return Err(Exception::at(
                        loc.clone(),
                        format!("{}: wrong number of arguments", name),
                    ));
                }
                call(self, &args, loc)
            }
            Function::Closure { lambda, nonlocals } => {
                if args.len() != lambda.nargs {
                    return Err(Exception::at(loc.clone(), "wrong number of arguments"));
                }
                let mut frame = Frame::for_call(args, lambda.nslots, nonlocals.clone());
                self.eval(&lambda.body, &mut frame)
                    .map_err(|e| e.with_context(loc.clone()))
            }
        }
    }

    // ── Operand helpers ─────────────────────────────────────────────────

    fn bool_operand(&mut self, op: &Op, f: &mut Frame, what: &str) -> Result<bool, Exception> {
        match self.eval(op, f)? {
            Value::Bool(b) => Ok(b),
            v => Err(Exception::at(
                op.source.location(),
                format!("{}: {} is not a boolean", what, v),
            )),
        }
    }

    fn num_value(&mut self, op: &Op, f: &mut Frame) -> Result<f64, Exception> {
        match self.eval(op, f)? {
            Value::Num(n) => Ok(n),
            v => Err(Exception::at(
                op.source.location(),
                format!("{} is not a number", v),
            )),
        }
    }

    fn numeric_binop(
        &mut self,
        op: &Op,
        l: &Arc<Op>,
        r: &Arc<Op>,
        f: &mut Frame,
        name: &str,
        func: fn(f64, f64) -> f64,
    ) -> Result<Value, Exception> {
        let a = self.eval(l, f)?;
        let b = self.eval(r, f)?;
        binary_num_op(name, &a, &b, func, &op.source.location())
    }

    fn comparison(
        &mut self,
        op: &Op,
        l: &Arc<Op>,
        r: &Arc<Op>,
        f: &mut Frame,
        name: &str,
        func: fn(f64, f64) -> bool,
    ) -> Result<Value, Exception> {
        let a = self.eval(l, f)?;
        let b = self.eval(r, f)?;
        match (&a, &b) {
            (Value::Num(x), Value::Num(y)) => Ok(Value::Bool(func(*x, *y))),
            _ => Err(Exception::at(
                op.source.location(),
                format!("{}: not a number", name),
            )),
        }
    }
}
