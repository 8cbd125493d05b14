use std::sync::Arc;

use crate::atom::Atom;
use crate::phrase::Phrase;
use crate::value::Value;

/// The analyzer's output.  A closed sum of two families: operations
/// (anything executable, constants included) and metafunctions, which are
/// callable only at analysis time and are not values.
pub(crate) enum Meaning {
    Operation(Arc<Op>),
    Metafunction(Metafunction),
}

/// Names whose behavior is realized during analysis.  Calling one lowers
/// the call phrase to a custom operation; mentioning one where a value is
/// required is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Metafunction {
    Echo,
}

impl Metafunction {
    /// Lower a call to this metafunction into its custom operation.
    pub(crate) fn call(&self, source: &Arc<Phrase>, argv: Vec<Arc<Op>>) -> Arc<Op> {
        match self {
            Metafunction::Echo => Op::new(source.clone(), OpKind::Echo(argv)),
        }
    }
}

/// One node of the operation graph: the resolved, executable form of a
/// phrase.  Every node keeps a back-pointer to the phrase it was lowered
/// from, so runtime errors can report exact source spans.
#[derive(Debug)]
pub(crate) struct Op {
    pub source: Arc<Phrase>,
    pub kind: OpKind,
}

impl Op {
    pub(crate) fn new(source: Arc<Phrase>, kind: OpKind) -> Arc<Op> {
        Arc::new(Op { source, kind })
    }

    pub(crate) fn is_constant(&self) -> bool {
        matches!(self.kind, OpKind::Constant(_))
    }
}

/// The body of a function expression, shared between the `LambdaExpr`
/// operation that creates closures and the `Lambda` values stored in
/// module slot arrays for recursive function fields.  Holds only the
/// operation graph, never a captured environment.
#[derive(Debug)]
pub struct Lambda {
    pub(crate) body: Arc<Op>,
    pub(crate) nargs: usize,
    pub(crate) nslots: usize,
}

#[derive(Debug)]
pub(crate) enum OpKind {
    /// A literal value known at analysis time.
    Constant(Value),

    // Variable references, resolved to slot numbers during analysis.
    /// A function parameter of the current frame.
    ArgRef(usize),
    /// A `let` or `for` binding of the current frame.
    LetRef(usize),
    /// A captured free variable of the current closure.
    NonlocalRef(usize),
    /// A recursive module function, re-closed over the slot array on read.
    NonlocalFunctionRef(usize),
    /// A module field, forced on first read.
    ModuleRef(usize),

    Not(Arc<Op>),
    Positive(Arc<Op>),
    Negative(Arc<Op>),
    Spread(Arc<Op>),

    Add(Arc<Op>, Arc<Op>),
    Subtract(Arc<Op>, Arc<Op>),
    Multiply(Arc<Op>, Arc<Op>),
    Divide(Arc<Op>, Arc<Op>),
    Power(Arc<Op>, Arc<Op>),
    Equal(Arc<Op>, Arc<Op>),
    NotEqual(Arc<Op>, Arc<Op>),
    Less(Arc<Op>, Arc<Op>),
    LessOrEqual(Arc<Op>, Arc<Op>),
    Greater(Arc<Op>, Arc<Op>),
    GreaterOrEqual(Arc<Op>, Arc<Op>),
    And(Arc<Op>, Arc<Op>),
    Or(Arc<Op>, Arc<Op>),

    If {
        condition: Arc<Op>,
        then_expr: Arc<Op>,
    },
    IfElse {
        condition: Arc<Op>,
        then_expr: Arc<Op>,
        else_expr: Arc<Op>,
    },
    Let {
        first_slot: usize,
        /// One thunk per binding, in slot order.
        values: Vec<Value>,
        body: Arc<Op>,
    },
    For {
        slot: usize,
        list: Arc<Op>,
        body: Arc<Op>,
    },
    RangeGen {
        first: Arc<Op>,
        last: Arc<Op>,
        step: Option<Arc<Op>>,
        exclusive: bool,
    },
    /// Comma sequence: a generator producing each element in order.
    Sequence(Vec<Arc<Op>>),
    /// Semicolon sequence: execute every statement, last value wins.
    Block(Vec<Arc<Op>>),
    List(Vec<Arc<Op>>),
    Record(Vec<(Atom, Arc<Op>)>),
    Module {
        dictionary: Vec<(Atom, usize)>,
        /// Initial slot values: a thunk per plain field, a lambda per
        /// recursive function field.
        slots: Vec<Value>,
        elements: Vec<Arc<Op>>,
        frame_nslots: usize,
    },
    LambdaExpr {
        lambda: Arc<Lambda>,
        /// Capture expressions, evaluated in the enclosing frame at
        /// closure-creation time.
        nonlocals: Vec<Arc<Op>>,
    },
    Call {
        func: Arc<Op>,
        argv: Vec<Arc<Op>>,
    },
    Dot {
        arg: Arc<Op>,
        field: Atom,
    },
    At {
        arg: Arc<Op>,
        index: Arc<Op>,
    },
    /// The lowered form of a call to the `echo` metafunction.
    Echo(Vec<Arc<Op>>),
}
