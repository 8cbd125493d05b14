use std::sync::Arc;

use crate::atom::Atom;
use crate::location::Location;
use crate::script::Script;
use crate::token::Token;

/// One element of a comma or semicolon list: the phrase plus the separator
/// token that followed it (`Missing` for the last element when the list has
/// no trailing separator).
#[derive(Debug, Clone)]
pub struct ListArg {
    pub expr: Arc<Phrase>,
    pub separator: Token,
}

/// The concrete syntax tree.  One variant per grammar production; every
/// variant retains its originating tokens so diagnostics and source
/// reconstruction can recover exact spans.  Phrases are immutable once
/// built and shared via `Arc`, because sub-phrases are referenced from the
/// operation graph the analyzer derives from them.
#[derive(Debug)]
pub enum Phrase {
    Empty(Location),
    Numeral(Location),
    Str(Location),
    Identifier { loc: Location, atom: Atom },
    Unary { op: Token, arg: Arc<Phrase> },
    Binary { left: Arc<Phrase>, op: Token, right: Arc<Phrase> },
    Comma { args: Vec<ListArg> },
    Semicolons { args: Vec<ListArg> },
    Paren { lparen: Token, body: Arc<Phrase>, rparen: Token },
    Bracket { lbracket: Token, body: Arc<Phrase>, rbracket: Token },
    Brace { lbrace: Token, body: Arc<Phrase>, rbrace: Token },
    /// Function application.  `op` is the `<<` or `>>` token when the call
    /// was written with an explicit call operator, `None` for juxtaposition.
    Call { func: Arc<Phrase>, args: Arc<Phrase>, op: Option<Token> },
    Lambda { left: Arc<Phrase>, arrow: Token, body: Arc<Phrase> },
    Definition { left: Arc<Phrase>, equate: Token, right: Arc<Phrase> },
    If {
        if_tok: Token,
        condition: Arc<Phrase>,
        then_expr: Arc<Phrase>,
        else_expr: Option<(Token, Arc<Phrase>)>,
    },
    Let { let_tok: Token, args: Arc<Phrase>, body: Arc<Phrase> },
    For { for_tok: Token, args: Arc<Phrase>, body: Arc<Phrase> },
    Range {
        first: Arc<Phrase>,
        op: Token,
        last: Arc<Phrase>,
        step: Option<(Token, Arc<Phrase>)>,
    },
    Program { body: Arc<Phrase>, end: Token, script: Arc<Script> },
}

impl Phrase {
    /// The source span covering the whole phrase.
    pub fn location(&self) -> Location {
        match self {
            Phrase::Empty(loc)
            | Phrase::Numeral(loc)
            | Phrase::Str(loc) => loc.clone(),
            Phrase::Identifier { loc, .. } => loc.clone(),
            Phrase::Unary { op, arg } => arg.location().starting_at(*op),
            Phrase::Binary { left, right, .. } => left.location().span_to(&right.location()),
            Phrase::Comma { args } | Phrase::Semicolons { args } => {
                let first = args.first().expect("nonempty list phrase").expr.location();
                let last = &args[args.len() - 1];
                let end = if last.separator.kind == crate::token::TokenKind::Missing {
                    last.expr.location()
                } else {
                    last.expr.location().ending_at(last.separator)
                };
                first.span_to(&end)
            }
            Phrase::Paren { lparen, body, rparen } => {
                body.location().starting_at(*lparen).ending_at(*rparen)
            }
            Phrase::Bracket { lbracket, body, rbracket } => {
                body.location().starting_at(*lbracket).ending_at(*rbracket)
            }
            Phrase::Brace { lbrace, body, rbrace } => {
                body.location().starting_at(*lbrace).ending_at(*rbrace)
            }
            // `x >> f` puts the argument before the function, so merge the
            // two spans rather than assuming source order.
            Phrase::Call { func, args, .. } => func.location().merge(&args.location()),
            Phrase::Lambda { left, body, .. } => left.location().span_to(&body.location()),
            Phrase::Definition { left, right, .. } => left.location().span_to(&right.location()),
            Phrase::If { if_tok, then_expr, else_expr, .. } => {
                let end = match else_expr {
                    Some((_, e)) => e.location(),
                    None => then_expr.location(),
                };
                end.starting_at(*if_tok)
            }
            Phrase::Let { let_tok, body, .. } => body.location().starting_at(*let_tok),
            Phrase::For { for_tok, body, .. } => body.location().starting_at(*for_tok),
            Phrase::Range { first, last, step, .. } => {
                let end = match step {
                    Some((_, s)) => s.location(),
                    None => last.location(),
                };
                first.location().span_to(&end)
            }
            Phrase::Program { body, end, script } => {
                Location::new(script.clone(), *end)
                    .starting_at(body.location().token())
            }
        }
    }
}
