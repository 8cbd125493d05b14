use std::fmt;
use std::sync::Arc;

use crate::script::Script;
use crate::token::{Token, TokenKind};

/// A source range: a script plus a token span within it.  Compound spans
/// (covering a whole phrase) carry the `Phrase` token kind.
#[derive(Clone)]
pub struct Location {
    script: Arc<Script>,
    token: Token,
}

impl Location {
    pub(crate) fn new(script: Arc<Script>, token: Token) -> Location {
        Location { script, token }
    }

    pub(crate) fn script(&self) -> &Arc<Script> {
        &self.script
    }

    pub(crate) fn token(&self) -> Token {
        self.token
    }

    /// The source text covered by this location.
    pub fn range(&self) -> &str {
        &self.script.source[self.token.first as usize..self.token.last as usize]
    }

    /// 1-based line number of the start of the span.
    pub fn line(&self) -> usize {
        self.script.line_of(self.token.first as usize)
    }

    /// Extend the start of the span to the given token.
    pub(crate) fn starting_at(&self, tok: Token) -> Location {
        let mut loc = self.clone();
        if tok.kind != TokenKind::Missing {
            loc.token.first_white = tok.first_white;
            loc.token.first = tok.first;
            loc.token.kind = TokenKind::Phrase;
        }
        loc
    }

    /// Extend the end of the span to the given token.
    pub(crate) fn ending_at(&self, tok: Token) -> Location {
        let mut loc = self.clone();
        if tok.kind != TokenKind::Missing {
            loc.token.last = tok.last;
            loc.token.kind = TokenKind::Phrase;
        }
        loc
    }

    /// The span from the start of `self` to the end of `other`.
    pub(crate) fn span_to(&self, other: &Location) -> Location {
        self.ending_at(other.token)
    }

    /// The smallest span covering both locations, in either order.
    pub(crate) fn merge(&self, other: &Location) -> Location {
        let mut loc = self.clone();
        if other.token.first < loc.token.first {
            loc.token.first_white = other.token.first_white;
            loc.token.first = other.token.first;
        }
        if other.token.last > loc.token.last {
            loc.token.last = other.token.last;
        }
        loc.token.kind = TokenKind::Phrase;
        loc
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.script.name.is_empty() {
            write!(f, "file {}, ", self.script.name)?;
        }
        write!(f, "line {}", self.line())?;
        match self.token.kind {
            TokenKind::End => write!(f, ", at end of script"),
            _ => write!(f, ": {}", self.range()),
        }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Location({:?} {}..{})",
            self.token.kind, self.token.first, self.token.last
        )
    }
}
