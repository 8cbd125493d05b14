use std::sync::Arc;

use crate::atom::Atom;
use crate::error::Exception;
use crate::location::Location;
use crate::phrase::{ListArg, Phrase};
use crate::scanner::Scanner;
use crate::script::Script;
use crate::token::{Token, TokenKind};
use crate::trace::trace_log;

/// Hand-coded recursive-descent parser.  Each method corresponds to one
/// precedence tier of the grammar.  There is no error recovery: the first
/// unexpected token raises an `Exception` and aborts the parse.
pub struct Parser {
    scanner: Scanner,
}

fn is_list_end_token(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::End | TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace
    )
}

fn is_semicolon_end_token(kind: TokenKind) -> bool {
    kind == TokenKind::Comma || is_list_end_token(kind)
}

impl Parser {
    pub fn new(scanner: Scanner) -> Parser {
        Parser { scanner }
    }

    fn location(&self, tok: Token) -> Location {
        self.scanner.location(tok)
    }

    /// program : commas EOF
    pub fn parse_program(&mut self) -> Result<Arc<Phrase>, Exception> {
        trace_log!("parse", "parse_program: {}", self.scanner.script.name);
        let body = self.parse_commas()?;
        let tok = self.scanner.get_token()?;
        if tok.kind != TokenKind::End {
            return Err(Exception::at(
                self.location(tok),
                "syntax error in program",
            ));
        }
        Ok(Arc::new(Phrase::Program {
            body,
            end: tok,
            script: self.scanner.script.clone(),
        }))
    }

    /// commas : empty | list | list `,`
    /// list : semicolons | list `,` semicolons
    fn parse_commas(&mut self) -> Result<Arc<Phrase>, Exception> {
        let tok = self.scanner.get_token()?;
        self.scanner.push_token(tok);
        if is_list_end_token(tok.kind) {
            let mut begin = tok;
            begin.last = begin.first;
            return Ok(Arc::new(Phrase::Empty(self.location(begin))));
        }
        let mut args: Vec<ListArg> = Vec::new();
        loop {
            let semis = self.parse_semicolons()?;
            let tok = self.scanner.get_token()?;
            if tok.kind == TokenKind::Comma {
                args.push(ListArg { expr: semis, separator: tok });
                let next = self.scanner.get_token()?;
                self.scanner.push_token(next);
                if is_list_end_token(next.kind) {
                    return Ok(Arc::new(Phrase::Comma { args }));
                }
            } else if is_list_end_token(tok.kind) {
                self.scanner.push_token(tok);
                if args.is_empty() {
                    return Ok(semis);
                }
                args.push(ListArg { expr: semis, separator: Token::default() });
                return Ok(Arc::new(Phrase::Comma { args }));
            } else {
                return Err(Exception::at(
                    self.location(tok),
                    "syntax error in comma phrase",
                ));
            }
        }
    }

    /// semicolons : semis | semis ';'
    /// semis : item | semis ';' item
    fn parse_semicolons(&mut self) -> Result<Arc<Phrase>, Exception> {
        let mut args: Vec<ListArg> = Vec::new();
        loop {
            let item = self.parse_item()?;
            let tok = self.scanner.get_token()?;
            if tok.kind == TokenKind::Semicolon {
                args.push(ListArg { expr: item, separator: tok });
                let next = self.scanner.get_token()?;
                self.scanner.push_token(next);
                if is_semicolon_end_token(next.kind) {
                    return Ok(Arc::new(Phrase::Semicolons { args }));
                }
            } else if is_semicolon_end_token(tok.kind) {
                self.scanner.push_token(tok);
                if args.is_empty() {
                    return Ok(item);
                }
                args.push(ListArg { expr: item, separator: Token::default() });
                return Ok(Arc::new(Phrase::Semicolons { args }));
            } else {
                return Err(Exception::at(
                    self.location(tok),
                    "syntax error in semicolon phrase",
                ));
            }
        }
    }

    /// Low precedence right associative operators.
    ///
    /// item : disjunction
    ///  | ... item
    ///  | postfix = item | postfix : item
    ///  | primary -> item
    ///  | disjunction << item
    ///  | 'if' primary item ('else' item)?
    ///  | 'for' parens item
    fn parse_item(&mut self) -> Result<Arc<Phrase>, Exception> {
        let tok = self.scanner.get_token()?;
        match tok.kind {
            TokenKind::Ellipsis => {
                let arg = self.parse_item()?;
                return Ok(Arc::new(Phrase::Unary { op: tok, arg }));
            }
            TokenKind::If => {
                let condition = self.parse_required_primary("condition following 'if'")?;
                let then_expr = self.parse_item()?;
                let tok2 = self.scanner.get_token()?;
                if tok2.kind != TokenKind::Else {
                    self.scanner.push_token(tok2);
                    return Ok(Arc::new(Phrase::If {
                        if_tok: tok,
                        condition,
                        then_expr,
                        else_expr: None,
                    }));
                }
                let else_expr = self.parse_item()?;
                return Ok(Arc::new(Phrase::If {
                    if_tok: tok,
                    condition,
                    then_expr,
                    else_expr: Some((tok2, else_expr)),
                }));
            }
            TokenKind::For => {
                let args = self.parse_required_primary("argument following 'for'")?;
                if !matches!(*args, Phrase::Paren { .. }) {
                    return Err(Exception::at(args.location(), "for: malformed argument"));
                }
                let body = self.parse_item()?;
                return Ok(Arc::new(Phrase::For { for_tok: tok, args, body }));
            }
            _ => self.scanner.push_token(tok),
        }

        let left = self.parse_disjunction()?;
        let tok = self.scanner.get_token()?;
        match tok.kind {
            TokenKind::Equate => Ok(Arc::new(Phrase::Definition {
                left,
                equate: tok,
                right: self.parse_item()?,
            })),
            TokenKind::Colon => Ok(Arc::new(Phrase::Binary {
                left,
                op: tok,
                right: self.parse_item()?,
            })),
            TokenKind::RightArrow => Ok(Arc::new(Phrase::Lambda {
                left,
                arrow: tok,
                body: self.parse_item()?,
            })),
            TokenKind::LeftCall => Ok(Arc::new(Phrase::Call {
                func: left,
                args: self.parse_item()?,
                op: Some(tok),
            })),
            _ => {
                self.scanner.push_token(tok);
                Ok(left)
            }
        }
    }

    /// disjunction : conjunction
    ///  | disjunction || conjunction
    ///  | disjunction >> conjunction
    fn parse_disjunction(&mut self) -> Result<Arc<Phrase>, Exception> {
        let mut left = self.parse_conjunction()?;
        loop {
            let tok = self.scanner.get_token()?;
            match tok.kind {
                TokenKind::Or => {
                    left = Arc::new(Phrase::Binary {
                        left,
                        op: tok,
                        right: self.parse_conjunction()?,
                    });
                }
                TokenKind::RightCall => {
                    left = Arc::new(Phrase::Call {
                        func: self.parse_conjunction()?,
                        args: left,
                        op: Some(tok),
                    });
                }
                _ => {
                    self.scanner.push_token(tok);
                    return Ok(left);
                }
            }
        }
    }

    /// conjunction : relation | conjunction && relation
    fn parse_conjunction(&mut self) -> Result<Arc<Phrase>, Exception> {
        let mut left = self.parse_relation()?;
        loop {
            let tok = self.scanner.get_token()?;
            if tok.kind == TokenKind::And {
                left = Arc::new(Phrase::Binary {
                    left,
                    op: tok,
                    right: self.parse_relation()?,
                });
            } else {
                self.scanner.push_token(tok);
                return Ok(left);
            }
        }
    }

    /// relation : range ((== | != | < | <= | > | >=) range)?
    fn parse_relation(&mut self) -> Result<Arc<Phrase>, Exception> {
        let left = self.parse_range()?;
        let tok = self.scanner.get_token()?;
        match tok.kind {
            TokenKind::Equal
            | TokenKind::NotEqual
            | TokenKind::Less
            | TokenKind::LessOrEqual
            | TokenKind::Greater
            | TokenKind::GreaterOrEqual => Ok(Arc::new(Phrase::Binary {
                left,
                op: tok,
                right: self.parse_range()?,
            })),
            _ => {
                self.scanner.push_token(tok);
                Ok(left)
            }
        }
    }

    /// range : sum ((.. | ..<) sum ('by' sum)?)?
    fn parse_range(&mut self) -> Result<Arc<Phrase>, Exception> {
        let left = self.parse_sum()?;
        let tok = self.scanner.get_token()?;
        match tok.kind {
            TokenKind::Range | TokenKind::OpenRange => {
                let last = self.parse_sum()?;
                let tok2 = self.scanner.get_token()?;
                let step = if tok2.kind == TokenKind::By {
                    Some((tok2, self.parse_sum()?))
                } else {
                    self.scanner.push_token(tok2);
                    None
                };
                Ok(Arc::new(Phrase::Range { first: left, op: tok, last, step }))
            }
            _ => {
                self.scanner.push_token(tok);
                Ok(left)
            }
        }
    }

    /// sum : product | sum + product | sum - product
    fn parse_sum(&mut self) -> Result<Arc<Phrase>, Exception> {
        let mut left = self.parse_product()?;
        loop {
            let tok = self.scanner.get_token()?;
            match tok.kind {
                TokenKind::Plus | TokenKind::Minus => {
                    left = Arc::new(Phrase::Binary {
                        left,
                        op: tok,
                        right: self.parse_product()?,
                    });
                }
                _ => {
                    self.scanner.push_token(tok);
                    return Ok(left);
                }
            }
        }
    }

    /// product : unary | product * unary | product / unary
    fn parse_product(&mut self) -> Result<Arc<Phrase>, Exception> {
        let mut left = self.parse_unary()?;
        loop {
            let tok = self.scanner.get_token()?;
            match tok.kind {
                TokenKind::Times | TokenKind::Over => {
                    left = Arc::new(Phrase::Binary {
                        left,
                        op: tok,
                        right: self.parse_unary()?,
                    });
                }
                _ => {
                    self.scanner.push_token(tok);
                    return Ok(left);
                }
            }
        }
    }

    /// unary : postfix | - unary | + unary | ! unary
    fn parse_unary(&mut self) -> Result<Arc<Phrase>, Exception> {
        let tok = self.scanner.get_token()?;
        match tok.kind {
            TokenKind::Plus | TokenKind::Minus | TokenKind::Not => {
                let arg = self.parse_unary()?;
                Ok(Arc::new(Phrase::Unary { op: tok, arg }))
            }
            _ => {
                self.scanner.push_token(tok);
                self.parse_postfix()
            }
        }
    }

    /// postfix : primary
    ///  | postfix primary        (call by juxtaposition)
    ///  | postfix . primary
    ///  | postfix ' primary
    ///  | postfix ^ unary
    fn parse_postfix(&mut self) -> Result<Arc<Phrase>, Exception> {
        let mut postfix = self.parse_required_primary("expression")?;
        loop {
            let tok = self.scanner.get_token()?;
            match tok.kind {
                TokenKind::Power => {
                    return Ok(Arc::new(Phrase::Binary {
                        left: postfix,
                        op: tok,
                        right: self.parse_unary()?,
                    }));
                }
                TokenKind::Dot | TokenKind::Apostrophe => {
                    let what = if tok.kind == TokenKind::Dot {
                        "expression following '.'"
                    } else {
                        "expression following '''"
                    };
                    let right = self.parse_required_primary(what)?;
                    postfix = Arc::new(Phrase::Binary { left: postfix, op: tok, right });
                }
                _ => {
                    self.scanner.push_token(tok);
                    match self.parse_primary(None)? {
                        Some(primary) => {
                            postfix = Arc::new(Phrase::Call {
                                func: postfix,
                                args: primary,
                                op: None,
                            });
                        }
                        None => return Ok(postfix),
                    }
                }
            }
        }
    }

    fn parse_required_primary(&mut self, what: &str) -> Result<Arc<Phrase>, Exception> {
        Ok(self.parse_primary(Some(what))?.expect("required primary"))
    }

    fn parse_delimited(
        &mut self,
        open: Token,
        close: TokenKind,
    ) -> Result<(Arc<Phrase>, Token), Exception> {
        let body = self.parse_commas()?;
        let tok = self.scanner.get_token()?;
        if tok.kind == TokenKind::End {
            return Err(Exception::at(self.location(open), "unmatched delimiter"));
        }
        if tok.kind != close {
            return Err(Exception::at(
                self.location(tok),
                "syntax error in delimited phrase",
            ));
        }
        Ok((body, tok))
    }

    /// primary : numeral | identifier | string
    ///  | 'let' parens item
    ///  | ( commas ) | [ commas ] | { commas }
    ///
    /// With `what == None` we are parsing an optional primary and return
    /// `Ok(None)` when no primary is found; otherwise `what` names the
    /// expected construct for the error message.
    fn parse_primary(&mut self, what: Option<&str>) -> Result<Option<Arc<Phrase>>, Exception> {
        let tok = self.scanner.get_token()?;
        match tok.kind {
            TokenKind::Num => Ok(Some(Arc::new(Phrase::Numeral(self.location(tok))))),
            TokenKind::Ident => {
                let loc = self.location(tok);
                let atom = Atom::intern(loc.range());
                Ok(Some(Arc::new(Phrase::Identifier { loc, atom })))
            }
            TokenKind::Str => Ok(Some(Arc::new(Phrase::Str(self.location(tok))))),
            TokenKind::Let => {
                let args = self.parse_required_primary("argument following 'let'")?;
                if !matches!(*args, Phrase::Paren { .. }) {
                    return Err(Exception::at(args.location(), "let: malformed argument"));
                }
                let body = self.parse_item()?;
                Ok(Some(Arc::new(Phrase::Let { let_tok: tok, args, body })))
            }
            TokenKind::LParen => {
                let (body, rparen) = self.parse_delimited(tok, TokenKind::RParen)?;
                Ok(Some(Arc::new(Phrase::Paren { lparen: tok, body, rparen })))
            }
            TokenKind::LBracket => {
                let (body, rbracket) = self.parse_delimited(tok, TokenKind::RBracket)?;
                Ok(Some(Arc::new(Phrase::Bracket { lbracket: tok, body, rbracket })))
            }
            TokenKind::LBrace => {
                let (body, rbrace) = self.parse_delimited(tok, TokenKind::RBrace)?;
                Ok(Some(Arc::new(Phrase::Brace { lbrace: tok, body, rbrace })))
            }
            TokenKind::End => match what {
                Some(what) => Err(Exception::at(
                    self.location(tok),
                    format!("missing {}", what),
                )),
                None => {
                    self.scanner.push_token(tok);
                    Ok(None)
                }
            },
            _ => match what {
                Some(what) => Err(Exception::at(
                    self.location(tok),
                    format!("unexpected token when expecting {}", what),
                )),
                None => {
                    self.scanner.push_token(tok);
                    Ok(None)
                }
            },
        }
    }
}

/// Parse a script into a program phrase.
pub fn parse_program(script: Arc<Script>) -> Result<Arc<Phrase>, Exception> {
    Parser::new(Scanner::new(script)).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Arc<Phrase> {
        parse_program(Script::new("test", source)).expect("parse")
    }

    fn parse_err(source: &str) -> Exception {
        parse_program(Script::new("test", source)).unwrap_err()
    }

    fn program_body(phrase: &Arc<Phrase>) -> &Arc<Phrase> {
        match &**phrase {
            Phrase::Program { body, .. } => body,
            other => panic!("not a program: {:?}", other),
        }
    }

    #[test]
    fn precedence_of_sum_and_product() {
        let program = parse("1 + 2 * 3");
        let body = program_body(&program);
        // The root must be the `+`, with the `*` nested on the right.
        match &**body {
            Phrase::Binary { op, right, .. } => {
                assert_eq!(op.kind, TokenKind::Plus);
                assert!(matches!(&**right, Phrase::Binary { op, .. } if op.kind == TokenKind::Times));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn juxtaposition_is_application() {
        let program = parse("f x");
        match &**program_body(&program) {
            Phrase::Call { func, args, op } => {
                assert!(op.is_none());
                assert!(matches!(&**func, Phrase::Identifier { .. }));
                assert!(matches!(&**args, Phrase::Identifier { .. }));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn left_and_right_call() {
        for source in ["f << x", "x >> f"] {
            let program = parse(source);
            match &**program_body(&program) {
                Phrase::Call { func, args, op } => {
                    assert!(op.is_some());
                    assert_eq!(func.location().range(), "f");
                    assert_eq!(args.location().range(), "x");
                }
                other => panic!("unexpected tree for {:?}: {:?}", source, other),
            }
        }
    }

    #[test]
    fn lambda_binds_looser_than_disjunction() {
        let program = parse("x -> x + 1");
        assert!(matches!(&**program_body(&program), Phrase::Lambda { .. }));
    }

    #[test]
    fn if_else_parses() {
        let program = parse("if (a) b else c");
        match &**program_body(&program) {
            Phrase::If { else_expr, .. } => assert!(else_expr.is_some()),
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn range_with_step() {
        let program = parse("1 .. 9 by 2");
        match &**program_body(&program) {
            Phrase::Range { step, op, .. } => {
                assert_eq!(op.kind, TokenKind::Range);
                assert!(step.is_some());
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn power_is_right_associative() {
        let program = parse("2 ^ 3 ^ 2");
        match &**program_body(&program) {
            Phrase::Binary { op, right, .. } => {
                assert_eq!(op.kind, TokenKind::Power);
                assert!(matches!(&**right, Phrase::Binary { op, .. } if op.kind == TokenKind::Power));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn empty_parens_and_trailing_comma() {
        let program = parse("(  )");
        match &**program_body(&program) {
            Phrase::Paren { body, .. } => assert!(matches!(&**body, Phrase::Empty(_))),
            other => panic!("unexpected tree: {:?}", other),
        }
        let program = parse("[1, 2,]");
        match &**program_body(&program) {
            Phrase::Bracket { body, .. } => match &**body {
                Phrase::Comma { args } => assert_eq!(args.len(), 2),
                other => panic!("unexpected body: {:?}", other),
            },
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn let_requires_parens() {
        let err = parse_err("let x = 1");
        assert!(err.message.contains("let: malformed argument"), "{}", err.message);
    }

    #[test]
    fn for_requires_parens() {
        let err = parse_err("for i 1");
        assert!(err.message.contains("for: malformed argument"), "{}", err.message);
    }

    #[test]
    fn unmatched_delimiter_reports_open_token() {
        let err = parse_err("(1 + 2");
        assert!(err.message.contains("unmatched delimiter"), "{}", err.message);
    }

    #[test]
    fn missing_expression_reports_category() {
        let err = parse_err("1 +");
        assert!(err.message.contains("missing expression"), "{}", err.message);
    }

    #[test]
    fn definition_and_field_access() {
        let program = parse("{a = 1; b = a + 1}");
        match &**program_body(&program) {
            Phrase::Brace { body, .. } => match &**body {
                Phrase::Semicolons { args } => {
                    assert_eq!(args.len(), 2);
                    assert!(matches!(&*args[0].expr, Phrase::Definition { .. }));
                }
                other => panic!("unexpected body: {:?}", other),
            },
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn whole_program_span_reconstructs_source() {
        let source = "let (x = 3, y = 4) norm[x, y]";
        let program = parse(source);
        assert_eq!(program.location().range(), source);
    }
}
