use std::fmt;
use std::sync::{Arc, Mutex};

use crate::atom::Atom;
use crate::meaning::{Lambda, Op};

/// The runtime value model: a tagged sum, conceptually immutable.  Lists,
/// records, and modules are shared by reference and never mutate after
/// construction; the one exception is a module's slot array, whose thunk
/// slots are replaced in place the first time they are forced.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(Arc<str>),
    List(Arc<Vec<Value>>),
    Record(Arc<Record>),
    Module(Arc<Module>),
    Function(Arc<Function>),
    /// A function expression result that has not yet been closed over a
    /// frame.  Appears only inside module slot arrays, for recursive
    /// function fields; `Module::get` closes it on every read.
    Lambda(Arc<Lambda>),
    /// An unevaluated operation stored in a slot for lazy forcing.
    Thunk(Arc<Thunk>),
    /// Sentinel occupying a slot while its thunk is being forced (or, for
    /// `let` slots, until the binding's right-hand side has been evaluated).
    /// Reading it means an illegal recursive reference.
    Forcing,
    /// An opaque shape wrapper around a record of shape fields.
    Shape(Arc<Shape>),
}

#[derive(Debug)]
pub struct Thunk {
    pub(crate) expr: Arc<Op>,
}

#[derive(Debug)]
pub struct Shape {
    pub record: Arc<Record>,
    pub dimensions: u32,
}

/// An insertion-ordered mapping from atom to value.
#[derive(Debug, Default)]
pub struct Record {
    fields: Vec<(Atom, Value)>,
}

impl Record {
    pub fn new() -> Record {
        Record { fields: Vec::new() }
    }

    pub fn insert(&mut self, name: Atom, value: Value) {
        self.fields.push((name, value));
    }

    pub fn get(&self, name: Atom) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Atom, Value)> {
        self.fields.iter()
    }
}

/// A module's slot array: one slot per field, holding a `Thunk` (plain
/// field), a `Lambda` (recursive function field), the `Forcing` sentinel,
/// or the forced value.  `frame_nslots` is the frame size needed to force
/// a field thunk.
#[derive(Debug)]
pub struct SlotArray {
    pub(crate) slots: Mutex<Vec<Value>>,
    pub(crate) frame_nslots: usize,
}

impl SlotArray {
    pub(crate) fn new(slots: Vec<Value>, frame_nslots: usize) -> Arc<SlotArray> {
        Arc::new(SlotArray {
            slots: Mutex::new(slots),
            frame_nslots,
        })
    }

    pub(crate) fn get(&self, i: usize) -> Value {
        self.slots.lock().unwrap()[i].clone()
    }

    pub(crate) fn set(&self, i: usize, value: Value) {
        self.slots.lock().unwrap()[i] = value;
    }
}

/// A module value: an insertion-ordered field dictionary mapping names to
/// slots, the slot array itself, and the list of element values produced
/// by the module's non-definition statements.
#[derive(Debug)]
pub struct Module {
    pub(crate) dictionary: Vec<(Atom, usize)>,
    pub(crate) slots: Arc<SlotArray>,
    pub(crate) elements: Vec<Value>,
}

impl Module {
    /// The values produced by the module's non-definition statements.
    pub fn elements(&self) -> &[Value] {
        &self.elements
    }

    pub(crate) fn slot_of(&self, name: Atom) -> Option<usize> {
        self.dictionary
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, slot)| *slot)
    }

    /// Read a slot, re-closing recursive function fields over this module's
    /// own slot array.  Keeps ownership a DAG: the slot holds only the
    /// lambda, never a closure back into the slot array.
    pub(crate) fn get(&self, i: usize) -> Value {
        match self.slots.get(i) {
            Value::Lambda(lambda) => Value::Function(Arc::new(Function::Closure {
                lambda,
                nonlocals: Nonlocals::Module(self.slots.clone()),
            })),
            v => v,
        }
    }
}

/// The non-local environment a frame evaluates under.
#[derive(Debug, Clone)]
pub enum Nonlocals {
    None,
    /// Captures of an ordinary closure, evaluated at closure creation.
    Captured(Arc<Vec<Value>>),
    /// The owning module's slot array, for module field forcing and
    /// recursive function fields.
    Module(Arc<SlotArray>),
}

pub type BuiltinFn = fn(
    &mut crate::eval::Evaluator<'_>,
    &[Value],
    &crate::location::Location,
) -> Result<Value, crate::error::Exception>;

/// A function value: a native builtin or a closure pairing a lambda with
/// its captured non-locals.
pub enum Function {
    Builtin {
        name: &'static str,
        nargs: usize,
        call: BuiltinFn,
    },
    Closure {
        lambda: Arc<Lambda>,
        nonlocals: Nonlocals,
    },
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Builtin { name, nargs, .. } => {
                write!(f, "Builtin({}, nargs={})", name, nargs)
            }
            Function::Closure { lambda, .. } => {
                write!(f, "Closure(nargs={}, nslots={})", lambda.nargs, lambda.nslots)
            }
        }
    }
}

impl Value {
    pub fn string(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(name, v)| b.get(*name) == Some(v))
            }
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Shape(a), Value::Shape(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn write_num(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        write!(f, "nan")
    } else if n.is_infinite() {
        write!(f, "{}inf", if n < 0.0 { "-" } else { "" })
    } else if n == n.trunc() && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Num(n) => write_num(f, *n),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Record(record) => {
                write!(f, "{{")?;
                for (i, (name, value)) in record.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}={}", name, value)?;
                }
                write!(f, "}}")
            }
            Value::Module(module) => {
                write!(f, "{{")?;
                for (i, (name, slot)) in module.dictionary.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}={}", name, module.get(*slot))?;
                }
                write!(f, "}}")
            }
            Value::Function(_) | Value::Lambda(_) => write!(f, "<function>"),
            Value::Thunk(_) | Value::Forcing => write!(f, "<thunk>"),
            Value::Shape(shape) => {
                write!(f, "shape{}d{}", shape.dimensions, Value::Record(shape.record.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_print_like_source() {
        assert_eq!(Value::Num(7.0).to_string(), "7");
        assert_eq!(Value::Num(2.5).to_string(), "2.5");
        assert_eq!(Value::Num(f64::INFINITY).to_string(), "inf");
        assert_eq!(Value::Num(f64::NEG_INFINITY).to_string(), "-inf");
        assert_eq!(Value::Num(f64::NAN).to_string(), "nan");
    }

    #[test]
    fn strings_print_quoted() {
        assert_eq!(Value::string("hi").to_string(), "\"hi\"");
    }

    #[test]
    fn lists_print_bracketed() {
        let v = Value::List(Arc::new(vec![Value::Num(1.0), Value::Num(2.0)]));
        assert_eq!(v.to_string(), "[1,2]");
    }

    #[test]
    fn records_preserve_insertion_order() {
        let mut r = Record::new();
        r.insert(Atom::intern("zz"), Value::Num(1.0));
        r.insert(Atom::intern("aa"), Value::Num(2.0));
        assert_eq!(Value::Record(Arc::new(r)).to_string(), "{zz=1,aa=2}");
    }

    #[test]
    fn record_equality_ignores_field_order() {
        let mut a = Record::new();
        a.insert(Atom::intern("x"), Value::Num(1.0));
        a.insert(Atom::intern("y"), Value::Num(2.0));
        let mut b = Record::new();
        b.insert(Atom::intern("y"), Value::Num(2.0));
        b.insert(Atom::intern("x"), Value::Num(1.0));
        assert_eq!(Value::Record(Arc::new(a)), Value::Record(Arc::new(b)));
    }

    #[test]
    fn nan_is_not_equal_to_itself() {
        assert_ne!(Value::Num(f64::NAN), Value::Num(f64::NAN));
    }
}
