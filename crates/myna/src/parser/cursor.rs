//! A one-token-lookahead stream over the lexer that enforces the offside
//! rule: every consumed token must start at or after the current offside
//! column unless the parser explicitly opts out.

use crate::diagnostics::Span;
use crate::lexer::{LexError, Lexer, Token};
use crate::messages;

#[derive(Debug, Clone)]
pub struct ParseErr {
    pub msg: String,
    pub span: Span,
}

impl From<LexError> for ParseErr {
    fn from(err: LexError) -> ParseErr {
        ParseErr {
            msg: err.msg,
            span: err.span,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseErr>;

pub struct TokenCursor {
    lexer: Lexer,
    lookahead: Option<Token>,
    current: Option<Token>,
    pub offside: usize,
    pub ignore_offside: bool,
}

impl TokenCursor {
    pub fn new(lexer: Lexer) -> TokenCursor {
        TokenCursor {
            lexer,
            lookahead: None,
            current: None,
            offside: 1,
            ignore_offside: false,
        }
    }

    pub fn next(&mut self) -> ParseResult<Token> {
        let token = match self.lookahead.take() {
            Some(token) => token,
            None => self.lexer.scan()?,
        };
        if !self.ignore_offside && token.offside() < self.offside {
            return Err(mismatched_indentation(&token));
        }
        self.current = Some(token.clone());
        Ok(token)
    }

    /// Peeks without applying the offside rule.
    pub fn peek(&mut self) -> ParseResult<&Token> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.lexer.scan()?);
        }
        Ok(self.lookahead.as_ref().expect("lookahead"))
    }

    pub fn peek_is_offside(&mut self) -> ParseResult<bool> {
        let offside = self.offside;
        let ignore = self.ignore_offside;
        let token = self.peek()?;
        Ok(!ignore && token.offside() < offside)
    }

    /// The last token returned by `next`.
    pub fn current(&self) -> &Token {
        self.current
            .as_ref()
            .expect("called current before the cursor started")
    }

    pub fn current_span(&self) -> Span {
        self.current().span
    }
}

pub fn mismatched_indentation(token: &Token) -> ParseErr {
    ParseErr {
        msg: messages::MISMATCHED_INDENTATION.to_string(),
        span: token.span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TokenKind;

    fn cursor(source: &str) -> TokenCursor {
        TokenCursor::new(Lexer::new("test.myn", source))
    }

    #[test]
    fn tokens_at_or_after_offside_are_accepted() {
        let mut cur = cursor("  alpha\n   beta");
        cur.offside = 2;
        assert_eq!(cur.next().unwrap().kind, TokenKind::Ident);
        assert_eq!(cur.next().unwrap().kind, TokenKind::Ident);
    }

    #[test]
    fn offside_violation_raises_mismatched_indentation() {
        let mut cur = cursor("  alpha\nbeta");
        cur.offside = 2;
        assert!(cur.next().is_ok());
        let err = cur.next().unwrap_err();
        assert_eq!(err.msg, messages::MISMATCHED_INDENTATION);
    }

    #[test]
    fn every_consumed_token_respects_the_offside_column() {
        let mut cur = cursor("  a\n  b\n   c\n  d");
        cur.offside = 2;
        for _ in 0..4 {
            let token = cur.next().expect("inside offside scope");
            assert!(token.offside() >= 2);
        }
    }

    #[test]
    fn ignore_offside_disables_the_check() {
        let mut cur = cursor("  alpha\nbeta");
        cur.offside = 2;
        cur.ignore_offside = true;
        assert!(cur.next().is_ok());
        assert!(cur.next().is_ok());
    }

    #[test]
    fn peek_does_not_consume() {
        let mut cur = cursor("alpha beta");
        assert_eq!(cur.peek().unwrap().text.as_deref(), Some("alpha"));
        assert_eq!(cur.next().unwrap().text.as_deref(), Some("alpha"));
        assert_eq!(cur.next().unwrap().text.as_deref(), Some("beta"));
    }
}
