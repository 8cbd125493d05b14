use std::fmt;

use crate::location::Location;

/// The one error type of the front end and evaluator.  Carries the message
/// and a chain of source locations: the site that raised, followed by each
/// enclosing call site added as the error unwinds the evaluation stack.
#[derive(Debug)]
pub struct Exception {
    pub message: String,
    trace: Vec<Location>,
}

impl Exception {
    pub(crate) fn new(message: impl Into<String>) -> Exception {
        Exception {
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub(crate) fn at(loc: Location, message: impl Into<String>) -> Exception {
        Exception {
            message: message.into(),
            trace: vec![loc],
        }
    }

    /// Append an enclosing context (e.g. a call site) to the chain.
    pub(crate) fn with_context(mut self, loc: Location) -> Exception {
        self.trace.push(loc);
        self
    }

    pub fn locations(&self) -> &[Location] {
        &self.trace
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for loc in &self.trace {
            write!(f, "\nat {}", loc)?;
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;
    use crate::token::{Token, TokenKind};

    #[test]
    fn display_includes_context_chain() {
        let script = Script::new("demo.curv", "f 1");
        let inner = Location::new(
            script.clone(),
            Token {
                kind: TokenKind::Ident,
                first_white: 0,
                first: 0,
                last: 1,
            },
        );
        let outer = Location::new(
            script,
            Token {
                kind: TokenKind::Phrase,
                first_white: 0,
                first: 0,
                last: 3,
            },
        );
        let exc = Exception::at(inner, "not callable").with_context(outer);
        let text = format!("{}", exc);
        assert!(text.starts_with("not callable"));
        assert!(text.contains("file demo.curv, line 1: f"));
        assert!(text.contains("file demo.curv, line 1: f 1"));
    }
}
