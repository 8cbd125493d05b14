use std::collections::HashMap;
use std::sync::Arc;

use crate::atom::Atom;
use crate::builtins::{Builtin, Namespace, builtin_namespace};
use crate::error::Exception;
use crate::meaning::{Lambda, Meaning, Op, OpKind};
use crate::phrase::Phrase;
use crate::token::TokenKind;
use crate::trace::trace_log;
use crate::value::{Thunk, Value};

/// A definition extracted from a phrase: `id = expr`, or the sugared
/// `f(params) = expr` which is rewritten to `f = params -> expr`.
struct Definition {
    name: Atom,
    name_phrase: Arc<Phrase>,
    definiens: Arc<Phrase>,
}

/// One node of the lexical scope chain used during analysis.  Each scope
/// owns the names it binds and tracks the current frame depth
/// (`frame_nslots`) and the high-water mark (`frame_maxslots`) that
/// becomes the frame size at the enclosing lambda or module boundary.
struct Scope {
    kind: ScopeKind,
    frame_nslots: usize,
    frame_maxslots: usize,
}

enum ScopeKind {
    /// Top of every chain: the immutable builtin namespace.
    Builtin,
    /// Module or record-brace scope: field names resolve to slots in the
    /// module's slot array.
    Module {
        map: HashMap<Atom, usize>,
        recursive: Vec<bool>,
    },
    /// Lambda scope: parameters, plus the capture table built on demand
    /// for free variables (non-recursive mode only).
    Args {
        params: HashMap<Atom, usize>,
        nonlocal_map: HashMap<Atom, usize>,
        nonlocal_exprs: Vec<Arc<Op>>,
        recursive: bool,
    },
    Let {
        bindings: HashMap<Atom, usize>,
    },
    For {
        name: Atom,
        slot: usize,
    },
}

pub(crate) struct Analyzer {
    namespace: &'static Namespace,
    scopes: Vec<Scope>,
}

/// Analyze a parsed program.  Returns the operation graph plus the number
/// of frame slots top-level evaluation requires.
pub(crate) fn analyze_program(program: &Arc<Phrase>) -> Result<(Arc<Op>, usize), Exception> {
    let mut analyzer = Analyzer {
        namespace: builtin_namespace(),
        scopes: vec![Scope {
            kind: ScopeKind::Builtin,
            frame_nslots: 0,
            frame_maxslots: 0,
        }],
    };
    let op = analyzer.program(program)?;
    let nslots = analyzer.scopes[0].frame_maxslots;
    trace_log!("analyze", "program analyzed, {} top-level slots", nslots);
    Ok((op, nslots))
}

/// Flatten a statement list: a semicolon phrase contributes each of its
/// items, anything else is a single statement, an empty phrase none.
fn statements(body: &Arc<Phrase>) -> Vec<Arc<Phrase>> {
    match &**body {
        Phrase::Empty(_) => vec![],
        Phrase::Semicolons { args } => args.iter().map(|a| a.expr.clone()).collect(),
        _ => vec![body.clone()],
    }
}

impl Analyzer {
    fn program(&mut self, program: &Arc<Phrase>) -> Result<Arc<Op>, Exception> {
        let body = match &**program {
            Phrase::Program { body, .. } => body,
            _ => program,
        };
        let stmts = statements(body);
        if stmts.is_empty() {
            return Ok(Op::new(program.clone(), OpKind::Constant(Value::Null)));
        }
        if stmts.iter().any(|st| matches!(&**st, Phrase::Definition { .. })) {
            return self.module(&stmts, program);
        }
        if stmts.len() == 1 {
            return self.analyze_op(&stmts[0]);
        }
        let ops = stmts
            .iter()
            .map(|st| self.analyze_op(st))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Op::new(program.clone(), OpKind::Block(ops)))
    }

    fn cur(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }

    // ── Lowering ────────────────────────────────────────────────────────

    fn analyze(&mut self, phrase: &Arc<Phrase>) -> Result<Meaning, Exception> {
        match &**phrase {
            Phrase::Empty(_) => Ok(Meaning::Operation(Op::new(
                phrase.clone(),
                OpKind::Sequence(vec![]),
            ))),
            Phrase::Numeral(loc) => {
                let n: f64 = loc
                    .range()
                    .parse()
                    .map_err(|_| Exception::at(loc.clone(), "bad numeral"))?;
                Ok(Meaning::Operation(Op::new(
                    phrase.clone(),
                    OpKind::Constant(Value::Num(n)),
                )))
            }
            Phrase::Str(loc) => {
                let text = loc.range();
                // The token includes the delimiting quotes.
                let inner = &text[1..text.len() - 1];
                Ok(Meaning::Operation(Op::new(
                    phrase.clone(),
                    OpKind::Constant(Value::string(inner)),
                )))
            }
            Phrase::Identifier { atom, .. } => self.lookup(*atom, phrase),
            Phrase::Unary { op, arg } => {
                let arg = self.analyze_op(arg)?;
                let kind = match op.kind {
                    TokenKind::Not => OpKind::Not(arg),
                    TokenKind::Plus => OpKind::Positive(arg),
                    TokenKind::Minus => OpKind::Negative(arg),
                    TokenKind::Ellipsis => OpKind::Spread(arg),
                    _ => unreachable!("unary operator {:?}", op.kind),
                };
                Ok(Meaning::Operation(Op::new(phrase.clone(), kind)))
            }
            Phrase::Binary { left, op, right } => self.binary(phrase, left, *op, right),
            Phrase::Comma { args } => {
                let ops = args
                    .iter()
                    .map(|a| self.analyze_op(&a.expr))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Meaning::Operation(Op::new(
                    phrase.clone(),
                    OpKind::Sequence(ops),
                )))
            }
            Phrase::Semicolons { args } => {
                let ops = args
                    .iter()
                    .map(|a| self.analyze_op(&a.expr))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Meaning::Operation(Op::new(phrase.clone(), OpKind::Block(ops))))
            }
            Phrase::Paren { body, .. } => match &**body {
                Phrase::Empty(_) => Ok(Meaning::Operation(Op::new(
                    phrase.clone(),
                    OpKind::Sequence(vec![]),
                ))),
                _ => self.analyze(body),
            },
            Phrase::Bracket { body, .. } => {
                let items = match &**body {
                    Phrase::Empty(_) => vec![],
                    Phrase::Comma { args } => args
                        .iter()
                        .map(|a| self.analyze_op(&a.expr))
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => vec![self.analyze_op(body)?],
                };
                Ok(Meaning::Operation(Op::new(phrase.clone(), OpKind::List(items))))
            }
            Phrase::Brace { body, .. } => self.brace(phrase, body),
            Phrase::Call { func, args, .. } => {
                let fm = self.analyze(func)?;
                match fm {
                    Meaning::Metafunction(meta) => {
                        let argv = self.analyze_args(args)?;
                        Ok(Meaning::Operation(meta.call(phrase, argv)))
                    }
                    Meaning::Operation(f_op) => {
                        let argv = self.analyze_args(args)?;
                        Ok(Meaning::Operation(Op::new(
                            phrase.clone(),
                            OpKind::Call { func: f_op, argv },
                        )))
                    }
                }
            }
            Phrase::Lambda { .. } => self.lambda(phrase, false),
            Phrase::Definition { .. } => {
                Err(Exception::at(phrase.location(), "not an operation"))
            }
            Phrase::If {
                condition,
                then_expr,
                else_expr,
                ..
            } => {
                let condition = self.analyze_op(condition)?;
                let then_expr = self.analyze_op(then_expr)?;
                let kind = match else_expr {
                    None => OpKind::If { condition, then_expr },
                    Some((_, e)) => OpKind::IfElse {
                        condition,
                        then_expr,
                        else_expr: self.analyze_op(e)?,
                    },
                };
                Ok(Meaning::Operation(Op::new(phrase.clone(), kind)))
            }
            Phrase::Let { .. } => self.let_phrase(phrase),
            Phrase::For { .. } => self.for_phrase(phrase),
            Phrase::Range { first, op, last, step } => {
                let first = self.analyze_op(first)?;
                let last = self.analyze_op(last)?;
                let step = match step {
                    Some((_, s)) => Some(self.analyze_op(s)?),
                    None => None,
                };
                Ok(Meaning::Operation(Op::new(
                    phrase.clone(),
                    OpKind::RangeGen {
                        first,
                        last,
                        step,
                        exclusive: op.kind == TokenKind::OpenRange,
                    },
                )))
            }
            Phrase::Program { body, .. } => self.analyze(body),
        }
    }

    pub(crate) fn analyze_op(&mut self, phrase: &Arc<Phrase>) -> Result<Arc<Op>, Exception> {
        match self.analyze(phrase)? {
            Meaning::Operation(op) => Ok(op),
            Meaning::Metafunction(_) => {
                Err(Exception::at(phrase.location(), "not an operation"))
            }
        }
    }

    fn binary(
        &mut self,
        phrase: &Arc<Phrase>,
        left: &Arc<Phrase>,
        op: crate::token::Token,
        right: &Arc<Phrase>,
    ) -> Result<Meaning, Exception> {
        if op.kind == TokenKind::Dot {
            let arg = self.analyze_op(left)?;
            return match &**right {
                Phrase::Identifier { atom, .. } => Ok(Meaning::Operation(Op::new(
                    phrase.clone(),
                    OpKind::Dot { arg, field: *atom },
                ))),
                Phrase::Bracket { body, .. } => match &**body {
                    Phrase::Empty(_) | Phrase::Comma { .. } => {
                        Err(Exception::at(phrase.location(), "not an expression"))
                    }
                    _ => {
                        let index = self.analyze_op(body)?;
                        Ok(Meaning::Operation(Op::new(
                            phrase.clone(),
                            OpKind::At { arg, index },
                        )))
                    }
                },
                _ => Err(Exception::at(
                    right.location(),
                    "invalid expression after '.'",
                )),
            };
        }
        if op.kind == TokenKind::Apostrophe {
            let arg = self.analyze_op(left)?;
            let index = self.analyze_op(right)?;
            return Ok(Meaning::Operation(Op::new(
                phrase.clone(),
                OpKind::At { arg, index },
            )));
        }
        if op.kind == TokenKind::Colon {
            return Err(Exception::at(phrase.location(), "not an operation"));
        }
        let l = self.analyze_op(left)?;
        let r = self.analyze_op(right)?;
        let kind = match op.kind {
            TokenKind::Or => OpKind::Or(l, r),
            TokenKind::And => OpKind::And(l, r),
            TokenKind::Equal => OpKind::Equal(l, r),
            TokenKind::NotEqual => OpKind::NotEqual(l, r),
            TokenKind::Less => OpKind::Less(l, r),
            TokenKind::LessOrEqual => OpKind::LessOrEqual(l, r),
            TokenKind::Greater => OpKind::Greater(l, r),
            TokenKind::GreaterOrEqual => OpKind::GreaterOrEqual(l, r),
            TokenKind::Plus => OpKind::Add(l, r),
            TokenKind::Minus => OpKind::Subtract(l, r),
            TokenKind::Times => OpKind::Multiply(l, r),
            TokenKind::Over => OpKind::Divide(l, r),
            TokenKind::Power => OpKind::Power(l, r),
            _ => unreachable!("binary operator {:?}", op.kind),
        };
        Ok(Meaning::Operation(Op::new(phrase.clone(), kind)))
    }

    /// The argument vector of a call: a parenthesized comma list is
    /// unpacked into one operation per element, anything else is a single
    /// argument.
    fn analyze_args(&mut self, args: &Arc<Phrase>) -> Result<Vec<Arc<Op>>, Exception> {
        match &**args {
            Phrase::Paren { body, .. } => match &**body {
                Phrase::Empty(_) => Ok(vec![]),
                Phrase::Comma { args } => args
                    .iter()
                    .map(|a| self.analyze_op(&a.expr))
                    .collect(),
                _ => Ok(vec![self.analyze_op(body)?]),
            },
            _ => Ok(vec![self.analyze_op(args)?]),
        }
    }

    fn analyze_def(&mut self, phrase: &Arc<Phrase>) -> Result<Option<Definition>, Exception> {
        let (left, equate, right) = match &**phrase {
            Phrase::Definition { left, equate, right } => (left, *equate, right),
            _ => return Ok(None),
        };
        match &**left {
            Phrase::Identifier { atom, .. } => Ok(Some(Definition {
                name: *atom,
                name_phrase: left.clone(),
                definiens: right.clone(),
            })),
            Phrase::Call { func, args, .. } => match &**func {
                Phrase::Identifier { atom, .. } => Ok(Some(Definition {
                    name: *atom,
                    name_phrase: func.clone(),
                    definiens: Arc::new(Phrase::Lambda {
                        left: args.clone(),
                        arrow: equate,
                        body: right.clone(),
                    }),
                })),
                _ => Err(Exception::at(func.location(), "not an identifier")),
            },
            _ => Err(Exception::at(left.location(), "invalid definiendum")),
        }
    }

    /// Classify a brace: comma-separated definitions form a record (fields
    /// analyzed in the enclosing scope, no mutual reference); everything
    /// else forms a module.
    fn brace(&mut self, phrase: &Arc<Phrase>, body: &Arc<Phrase>) -> Result<Meaning, Exception> {
        match &**body {
            Phrase::Empty(_) => Ok(Meaning::Operation(Op::new(
                phrase.clone(),
                OpKind::Record(vec![]),
            ))),
            Phrase::Comma { args }
                if args
                    .iter()
                    .any(|a| matches!(&*a.expr, Phrase::Definition { .. })) =>
            {
                let mut fields: Vec<(Atom, Arc<Op>)> = Vec::new();
                for a in args {
                    let def = self
                        .analyze_def(&a.expr)?
                        .ok_or_else(|| Exception::at(a.expr.location(), "not a definition"))?;
                    if fields.iter().any(|(name, _)| *name == def.name) {
                        return Err(Exception::at(
                            def.name_phrase.location(),
                            format!("{}: multiply defined", def.name),
                        ));
                    }
                    let op = self.analyze_op(&def.definiens)?;
                    fields.push((def.name, op));
                }
                Ok(Meaning::Operation(Op::new(phrase.clone(), OpKind::Record(fields))))
            }
            _ => {
                let stmts = statements(body);
                Ok(Meaning::Operation(self.module(&stmts, phrase)?))
            }
        }
    }

    /// Module analysis, also used for whole programs with definitions.
    /// Phase 1 builds the field dictionary and element list; phase 2
    /// analyzes every definiens and element in the module scope.
    fn module(
        &mut self,
        stmts: &[Arc<Phrase>],
        source: &Arc<Phrase>,
    ) -> Result<Arc<Op>, Exception> {
        let mut dictionary: Vec<(Atom, usize)> = Vec::new();
        let mut map: HashMap<Atom, usize> = HashMap::new();
        let mut recursive: Vec<bool> = Vec::new();
        let mut definientia: Vec<Arc<Phrase>> = Vec::new();
        let mut element_phrases: Vec<Arc<Phrase>> = Vec::new();

        for st in stmts {
            match self.analyze_def(st)? {
                Some(def) => {
                    if map.contains_key(&def.name) {
                        return Err(Exception::at(
                            def.name_phrase.location(),
                            format!("{}: multiply defined", def.name),
                        ));
                    }
                    let slot = definientia.len();
                    map.insert(def.name, slot);
                    dictionary.push((def.name, slot));
                    // A definiens that is a lambda is a recursive function
                    // field: its body may refer to any module field.
                    recursive.push(matches!(&*def.definiens, Phrase::Lambda { .. }));
                    definientia.push(def.definiens);
                }
                None => element_phrases.push(st.clone()),
            }
        }

        self.scopes.push(Scope {
            kind: ScopeKind::Module {
                map,
                recursive: recursive.clone(),
            },
            frame_nslots: 0,
            frame_maxslots: 0,
        });

        let mut slots: Vec<Value> = Vec::with_capacity(definientia.len());
        for (i, definiens) in definientia.iter().enumerate() {
            if recursive[i] {
                let meaning = self.lambda(definiens, true)?;
                let Meaning::Operation(op) = meaning else {
                    unreachable!("lambda analysis yields an operation")
                };
                let OpKind::LambdaExpr { lambda, .. } = &op.kind else {
                    unreachable!("lambda analysis yields a lambda expression")
                };
                slots.push(Value::Lambda(lambda.clone()));
            } else {
                let op = self.analyze_op(definiens)?;
                slots.push(Value::Thunk(Arc::new(Thunk { expr: op })));
            }
        }
        let elements = element_phrases
            .iter()
            .map(|e| self.analyze_op(e))
            .collect::<Result<Vec<_>, _>>()?;

        let scope = self.scopes.pop().expect("module scope");
        Ok(Op::new(
            source.clone(),
            OpKind::Module {
                dictionary,
                slots,
                elements,
                frame_nslots: scope.frame_maxslots,
            },
        ))
    }

    fn lambda(&mut self, phrase: &Arc<Phrase>, recursive: bool) -> Result<Meaning, Exception> {
        let (left, body) = match &**phrase {
            Phrase::Lambda { left, body, .. } => (left, body),
            _ => unreachable!("lambda analysis on a non-lambda phrase"),
        };

        // Phase 1: the parameter dictionary.
        let mut params: HashMap<Atom, usize> = HashMap::new();
        let add_param = |p: &Arc<Phrase>, params: &mut HashMap<Atom, usize>| {
            match &**p {
                Phrase::Identifier { atom, .. } => {
                    let slot = params.len();
                    params.insert(*atom, slot);
                    Ok(())
                }
                _ => Err(Exception::at(p.location(), "not a parameter")),
            }
        };
        match &**left {
            Phrase::Identifier { .. } => add_param(left, &mut params)?,
            Phrase::Paren { body: pbody, .. } => match &**pbody {
                Phrase::Empty(_) => {}
                Phrase::Comma { args } => {
                    for a in args {
                        add_param(&a.expr, &mut params)?;
                    }
                }
                _ => add_param(pbody, &mut params)?,
            },
            _ => return Err(Exception::at(left.location(), "not a parameter")),
        }
        let nargs = params.len();

        // Phase 2: analyze the body in a fresh frame.
        self.scopes.push(Scope {
            kind: ScopeKind::Args {
                params,
                nonlocal_map: HashMap::new(),
                nonlocal_exprs: Vec::new(),
                recursive,
            },
            frame_nslots: nargs,
            frame_maxslots: nargs,
        });
        let body_op = self.analyze_op(body)?;
        let scope = self.scopes.pop().expect("lambda scope");
        let ScopeKind::Args { nonlocal_exprs, .. } = scope.kind else {
            unreachable!("popped scope is the lambda scope")
        };

        Ok(Meaning::Operation(Op::new(
            phrase.clone(),
            OpKind::LambdaExpr {
                lambda: Arc::new(Lambda {
                    body: body_op,
                    nargs,
                    nslots: scope.frame_maxslots,
                }),
                nonlocals: nonlocal_exprs,
            },
        )))
    }

    fn let_phrase(&mut self, phrase: &Arc<Phrase>) -> Result<Meaning, Exception> {
        let (args, body) = match &**phrase {
            Phrase::Let { args, body, .. } => (args, body),
            _ => unreachable!("let analysis on a non-let phrase"),
        };
        let items = match &**args {
            Phrase::Paren { body, .. } => match &**body {
                Phrase::Empty(_) => vec![],
                Phrase::Comma { args } => args.iter().map(|a| a.expr.clone()).collect(),
                _ => vec![body.clone()],
            },
            _ => unreachable!("parser guarantees a paren argument"),
        };

        // Phase 1: assign slots before analyzing any right-hand side, so
        // every binding is in scope in every definiens.
        let first_slot = self.cur().frame_nslots;
        let mut bindings: HashMap<Atom, usize> = HashMap::new();
        let mut definientia: Vec<Arc<Phrase>> = Vec::new();
        for item in &items {
            let def = self
                .analyze_def(item)?
                .ok_or_else(|| Exception::at(item.location(), "not a definition"))?;
            if bindings.contains_key(&def.name) {
                return Err(Exception::at(
                    def.name_phrase.location(),
                    format!("{}: multiply defined", def.name),
                ));
            }
            bindings.insert(def.name, first_slot + definientia.len());
            definientia.push(def.definiens);
        }
        let n = definientia.len();

        let parent = self.cur();
        let frame_nslots = parent.frame_nslots + n;
        let frame_maxslots = parent.frame_maxslots.max(frame_nslots);
        self.scopes.push(Scope {
            kind: ScopeKind::Let { bindings },
            frame_nslots,
            frame_maxslots,
        });

        // Phase 2: analyze the definientia in binding order, then the body.
        let mut values: Vec<Value> = Vec::with_capacity(n);
        for definiens in &definientia {
            let expr = self.analyze_op(definiens)?;
            values.push(Value::Thunk(Arc::new(Thunk { expr })));
        }
        let body_op = self.analyze_op(body)?;

        let scope = self.scopes.pop().expect("let scope");
        let parent = self.cur();
        parent.frame_maxslots = parent.frame_maxslots.max(scope.frame_maxslots);

        Ok(Meaning::Operation(Op::new(
            phrase.clone(),
            OpKind::Let {
                first_slot,
                values,
                body: body_op,
            },
        )))
    }

    fn for_phrase(&mut self, phrase: &Arc<Phrase>) -> Result<Meaning, Exception> {
        let (args, body) = match &**phrase {
            Phrase::For { args, body, .. } => (args, body),
            _ => unreachable!("for analysis on a non-for phrase"),
        };
        let item = match &**args {
            Phrase::Paren { body, .. } => match &**body {
                Phrase::Comma { .. } | Phrase::Empty(_) => {
                    return Err(Exception::at(args.location(), "for: malformed argument"));
                }
                _ => body.clone(),
            },
            _ => unreachable!("parser guarantees a paren argument"),
        };
        let (left, right) = match &*item {
            Phrase::Definition { left, right, .. } => (left, right),
            _ => return Err(Exception::at(item.location(), "for: not a definition")),
        };
        let name = match &**left {
            Phrase::Identifier { atom, .. } => *atom,
            _ => return Err(Exception::at(left.location(), "for: not an identifier")),
        };

        // The iterated list is analyzed outside the loop variable's scope.
        let list = self.analyze_op(right)?;

        let parent = self.cur();
        let slot = parent.frame_nslots;
        let frame_nslots = parent.frame_nslots + 1;
        let frame_maxslots = parent.frame_maxslots.max(frame_nslots);
        self.scopes.push(Scope {
            kind: ScopeKind::For { name, slot },
            frame_nslots,
            frame_maxslots,
        });
        let body_op = self.analyze_op(body)?;
        let scope = self.scopes.pop().expect("for scope");
        let parent = self.cur();
        parent.frame_maxslots = parent.frame_maxslots.max(scope.frame_maxslots);

        Ok(Meaning::Operation(Op::new(
            phrase.clone(),
            OpKind::For {
                slot,
                list,
                body: body_op,
            },
        )))
    }

    // ── Name resolution ─────────────────────────────────────────────────

    fn lookup(&mut self, atom: Atom, id: &Arc<Phrase>) -> Result<Meaning, Exception> {
        self.lookup_from(self.scopes.len() - 1, atom, id)
    }

    fn lookup_from(
        &mut self,
        idx: usize,
        atom: Atom,
        id: &Arc<Phrase>,
    ) -> Result<Meaning, Exception> {
        enum Probe {
            Found(OpKind),
            Descend,
            /// The name is not a module field; resolution continues in the
            /// parent, but a module's own frame cannot address enclosing
            /// frame slots, so only constants may cross this boundary.
            ModuleMiss,
            /// The name is free in a lambda scope; resolution continues in
            /// the parent and the result decides inlining vs capture.
            ArgMiss {
                recursive: bool,
            },
        }

        let probe = match &self.scopes[idx].kind {
            ScopeKind::Builtin => {
                return match self.namespace.get(&atom) {
                    Some(Builtin::Value(v)) => Ok(Meaning::Operation(Op::new(
                        id.clone(),
                        OpKind::Constant(v.clone()),
                    ))),
                    Some(Builtin::Meta(meta)) => Ok(Meaning::Metafunction(*meta)),
                    None => Err(Exception::at(
                        id.location(),
                        format!("{}: not defined", atom),
                    )),
                };
            }
            ScopeKind::Module { map, recursive } => match map.get(&atom) {
                Some(&slot) if recursive[slot] => Probe::Found(OpKind::NonlocalFunctionRef(slot)),
                Some(&slot) => Probe::Found(OpKind::ModuleRef(slot)),
                None => Probe::ModuleMiss,
            },
            ScopeKind::Let { bindings } => match bindings.get(&atom) {
                Some(&slot) => Probe::Found(OpKind::LetRef(slot)),
                None => Probe::Descend,
            },
            ScopeKind::For { name, slot } => {
                if *name == atom {
                    Probe::Found(OpKind::LetRef(*slot))
                } else {
                    Probe::Descend
                }
            }
            ScopeKind::Args {
                params,
                nonlocal_map,
                recursive,
                ..
            } => {
                if let Some(&slot) = params.get(&atom) {
                    Probe::Found(OpKind::ArgRef(slot))
                } else if !*recursive && let Some(&slot) = nonlocal_map.get(&atom) {
                    Probe::Found(OpKind::NonlocalRef(slot))
                } else {
                    Probe::ArgMiss {
                        recursive: *recursive,
                    }
                }
            }
        };

        match probe {
            Probe::Found(kind) => Ok(Meaning::Operation(Op::new(id.clone(), kind))),
            Probe::Descend => self.lookup_from(idx - 1, atom, id),
            Probe::ModuleMiss => {
                let meaning = self.lookup_from(idx - 1, atom, id)?;
                match &meaning {
                    Meaning::Metafunction(_) => Ok(meaning),
                    Meaning::Operation(op) if op.is_constant() => Ok(meaning),
                    Meaning::Operation(_) => Err(Exception::at(
                        id.location(),
                        format!("{}: not accessible from a module", atom),
                    )),
                }
            }
            Probe::ArgMiss { recursive } => {
                let meaning = self.lookup_from(idx - 1, atom, id)?;
                if recursive {
                    // Recursive mode: the module scope below answers with
                    // field references; anything else passes through
                    // untransformed (no capture table in this mode).
                    return Ok(meaning);
                }
                match meaning {
                    Meaning::Metafunction(_) => Ok(meaning),
                    Meaning::Operation(op) if op.is_constant() => Ok(Meaning::Operation(op)),
                    Meaning::Operation(op) => {
                        let ScopeKind::Args {
                            nonlocal_map,
                            nonlocal_exprs,
                            ..
                        } = &mut self.scopes[idx].kind
                        else {
                            unreachable!("arg miss in a non-lambda scope")
                        };
                        let slot = nonlocal_exprs.len();
                        nonlocal_map.insert(atom, slot);
                        nonlocal_exprs.push(op);
                        Ok(Meaning::Operation(Op::new(
                            id.clone(),
                            OpKind::NonlocalRef(slot),
                        )))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::script::Script;

    fn analyze(source: &str) -> (Arc<Op>, usize) {
        let program = parse_program(Script::new("test", source)).expect("parse");
        analyze_program(&program).expect("analyze")
    }

    fn analyze_err(source: &str) -> Exception {
        let program = parse_program(Script::new("test", source)).expect("parse");
        analyze_program(&program).unwrap_err()
    }

    #[test]
    fn numeral_becomes_constant() {
        let (op, nslots) = analyze("42");
        assert!(matches!(op.kind, OpKind::Constant(Value::Num(n)) if n == 42.0));
        assert_eq!(nslots, 0);
    }

    #[test]
    fn builtin_constant_is_inlined() {
        let (op, _) = analyze("pi");
        assert!(matches!(op.kind, OpKind::Constant(Value::Num(_))));
    }

    #[test]
    fn undefined_name_reports_error() {
        let err = analyze_err("nosuch");
        assert!(err.message.contains("nosuch: not defined"), "{}", err.message);
    }

    #[test]
    fn let_assigns_consecutive_slots() {
        let (op, nslots) = analyze("let (x = 3, y = 4) x + y");
        assert_eq!(nslots, 2);
        let OpKind::Let { first_slot, values, body } = &op.kind else {
            panic!("not a let: {:?}", op.kind)
        };
        assert_eq!(*first_slot, 0);
        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|v| matches!(v, Value::Thunk(_))));
        let OpKind::Add(l, r) = &body.kind else {
            panic!("not an add: {:?}", body.kind)
        };
        assert!(matches!(l.kind, OpKind::LetRef(0)));
        assert!(matches!(r.kind, OpKind::LetRef(1)));
    }

    #[test]
    fn sibling_lets_reuse_slots() {
        let (_, nslots) = analyze("(let (a = 1) a) + (let (b = 2, c = 3) b + c)");
        assert_eq!(nslots, 2);
    }

    #[test]
    fn nested_lets_stack_slots() {
        let (_, nslots) = analyze("let (a = 1) let (b = a) b");
        assert_eq!(nslots, 2);
    }

    #[test]
    fn lambda_parameters_become_arg_refs() {
        let (op, _) = analyze("x -> x * x");
        let OpKind::LambdaExpr { lambda, nonlocals } = &op.kind else {
            panic!("not a lambda: {:?}", op.kind)
        };
        assert_eq!(lambda.nargs, 1);
        assert_eq!(lambda.nslots, 1);
        assert!(nonlocals.is_empty());
        let OpKind::Multiply(l, r) = &lambda.body.kind else {
            panic!("not a multiply: {:?}", lambda.body.kind)
        };
        assert!(matches!(l.kind, OpKind::ArgRef(0)));
        assert!(matches!(r.kind, OpKind::ArgRef(0)));
    }

    #[test]
    fn free_variable_is_captured_once() {
        let (op, _) = analyze("let (a = 1) (x -> x + a + a)");
        let OpKind::Let { body, .. } = &op.kind else {
            panic!("not a let: {:?}", op.kind)
        };
        let OpKind::LambdaExpr { nonlocals, lambda } = &body.kind else {
            panic!("not a lambda: {:?}", body.kind)
        };
        // Two uses of `a`, one capture slot.
        assert_eq!(nonlocals.len(), 1);
        assert!(matches!(nonlocals[0].kind, OpKind::LetRef(0)));
        let OpKind::Add(sum, r) = &lambda.body.kind else {
            panic!("not an add: {:?}", lambda.body.kind)
        };
        assert!(matches!(r.kind, OpKind::NonlocalRef(0)));
        let OpKind::Add(_, mid) = &sum.kind else {
            panic!("not an add: {:?}", sum.kind)
        };
        assert!(matches!(mid.kind, OpKind::NonlocalRef(0)));
    }

    #[test]
    fn builtin_constant_is_inlined_into_lambda() {
        let (op, _) = analyze("x -> x * pi");
        let OpKind::LambdaExpr { nonlocals, .. } = &op.kind else {
            panic!("not a lambda: {:?}", op.kind)
        };
        assert!(nonlocals.is_empty());
    }

    #[test]
    fn module_classifies_fields_and_recursion() {
        let (op, _) = analyze("{a = 1; f(x) = f(x); 99}");
        let OpKind::Module { dictionary, slots, elements, .. } = &op.kind else {
            panic!("not a module: {:?}", op.kind)
        };
        assert_eq!(dictionary.len(), 2);
        assert!(matches!(slots[0], Value::Thunk(_)));
        assert!(matches!(slots[1], Value::Lambda(_)));
        assert_eq!(elements.len(), 1);
    }

    #[test]
    fn duplicate_definition_is_an_error() {
        let err = analyze_err("{a = 1; a = 2}");
        assert!(err.message.contains("a: multiply defined"), "{}", err.message);
    }

    #[test]
    fn duplicate_let_binding_is_an_error() {
        let err = analyze_err("let (x = 1, x = 2) x");
        assert!(err.message.contains("x: multiply defined"), "{}", err.message);
    }

    #[test]
    fn non_identifier_parameter_is_an_error() {
        let err = analyze_err("(x, 1) -> x");
        assert!(err.message.contains("not a parameter"), "{}", err.message);
    }

    #[test]
    fn definition_outside_binding_context() {
        let err = analyze_err("[a = 1]");
        assert!(err.message.contains("not an operation"), "{}", err.message);
    }

    #[test]
    fn comma_braces_of_definitions_form_a_record() {
        let (op, _) = analyze("{a = 1, b = 2}");
        let OpKind::Record(fields) = &op.kind else {
            panic!("not a record: {:?}", op.kind)
        };
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn record_field_cannot_reference_sibling() {
        let err = analyze_err("{a = 1, b = a}");
        assert!(err.message.contains("a: not defined"), "{}", err.message);
    }

    #[test]
    fn module_cannot_reference_enclosing_frame_slots() {
        let err = analyze_err("let (n = 1) {f(x) = f(x) + n}");
        assert!(
            err.message.contains("n: not accessible from a module"),
            "{}",
            err.message
        );
    }

    #[test]
    fn echo_alone_is_not_an_operation() {
        let err = analyze_err("echo");
        assert!(err.message.contains("not an operation"), "{}", err.message);
    }

    #[test]
    fn for_over_malformed_argument() {
        let err = analyze_err("for (1) 2");
        assert!(err.message.contains("for: not a definition"), "{}", err.message);
    }
}
