//! Bounded, mutable navigation over a module's lexemes.

use crate::token::{EOF_LEXEME, INVALID_LEXEME, Lexeme, TokenKind};

/// Cursor used by the recursive-descent parser.
///
/// Reads never fail: any index outside the sequence yields the shared `EOF`
/// lexeme, and retreating before the first token yields the shared
/// `INVALID` lexeme. Callers treat both as ordinary terminal tokens.
pub struct ParserCursor<'a> {
    tokens: &'a mut [Lexeme],
    pos: usize,
}

impl<'a> ParserCursor<'a> {
    pub fn new(tokens: &'a mut [Lexeme]) -> Self {
        ParserCursor { tokens, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Token `offset` places away from the current position.
    pub fn peek(&self, offset: isize) -> &Lexeme {
        let index = self.pos as isize + offset;
        if index < 0 {
            return &EOF_LEXEME;
        }
        self.tokens.get(index as usize).unwrap_or(&EOF_LEXEME)
    }

    pub fn peek_kind(&self, offset: isize) -> TokenKind {
        self.peek(offset).kind
    }

    pub fn current(&self) -> &Lexeme {
        self.peek(0)
    }

    /// Moves one token forward and returns the new current token.
    pub fn advance(&mut self) -> &Lexeme {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        self.peek(0)
    }

    pub fn advance_kind(&mut self) -> TokenKind {
        self.advance().kind
    }

    /// Moves one token back; at position 0 the position is kept and the
    /// `INVALID` sentinel is returned.
    pub fn retreat(&mut self) -> &Lexeme {
        if self.pos == 0 {
            return &INVALID_LEXEME;
        }
        self.pos -= 1;
        self.peek(0)
    }

    pub fn retreat_kind(&mut self) -> TokenKind {
        self.retreat().kind
    }

    pub fn at(&self, index: usize) -> &Lexeme {
        self.tokens.get(index).unwrap_or(&EOF_LEXEME)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.tokens.len());
    }

    pub fn accept(&self, kind: TokenKind) -> bool {
        self.peek_kind(0) == kind
    }

    pub fn accept_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.peek_kind(0))
    }

    /// Advances past the current token if it has kind `kind`.
    pub fn accept_and_advance(&mut self, kind: TokenKind) -> bool {
        if self.accept(kind) {
            self.advance();
            return true;
        }
        false
    }

    /// Overwrites the kind of the current token; the payload is untouched.
    pub fn retype(&mut self, kind: TokenKind) {
        if let Some(token) = self.tokens.get_mut(self.pos) {
            token.kind = kind;
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.peek_kind(0).is_sentinel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::span::ModuleId;

    fn lexemes(source: &str) -> Vec<Lexeme> {
        tokenize(ModuleId::INVALID, source).expect("tokenize")
    }

    #[test]
    fn out_of_range_reads_return_eof() {
        let mut tokens = lexemes("a b c");
        let mut cursor = ParserCursor::new(&mut tokens);
        assert_eq!(cursor.peek_kind(2), TokenKind::Iden);
        assert_eq!(cursor.peek_kind(3), TokenKind::Eof);
        assert_eq!(cursor.peek_kind(-1), TokenKind::Eof);
        assert_eq!(cursor.at(99).kind, TokenKind::Eof);

        cursor.set_position(2);
        for offset in 1..5 {
            assert_eq!(cursor.peek_kind(offset), TokenKind::Eof);
        }
        assert_eq!(cursor.advance_kind(), TokenKind::Eof);
        assert_eq!(cursor.advance_kind(), TokenKind::Eof);
        assert_eq!(cursor.position(), 3);
        assert!(!cursor.is_valid());
    }

    #[test]
    fn retreat_before_start_returns_invalid() {
        let mut tokens = lexemes("a b");
        let mut cursor = ParserCursor::new(&mut tokens);
        assert_eq!(cursor.retreat_kind(), TokenKind::Invalid);
        assert_eq!(cursor.position(), 0);
        cursor.advance();
        assert_eq!(cursor.retreat().data_str(), Some("a"));
    }

    #[test]
    fn empty_sequence_is_all_sentinels() {
        let mut tokens = Vec::new();
        let mut cursor = ParserCursor::new(&mut tokens);
        assert!(cursor.is_empty());
        assert!(!cursor.is_valid());
        assert_eq!(cursor.peek_kind(0), TokenKind::Eof);
        assert_eq!(cursor.advance_kind(), TokenKind::Eof);
        assert_eq!(cursor.retreat_kind(), TokenKind::Invalid);
    }

    #[test]
    fn accept_helpers() {
        let mut tokens = lexemes("let x;");
        let mut cursor = ParserCursor::new(&mut tokens);
        assert!(cursor.accept(TokenKind::Let));
        assert!(cursor.accept_any(&[TokenKind::Fn, TokenKind::Let]));
        assert!(!cursor.accept_and_advance(TokenKind::Iden));
        assert!(cursor.accept_and_advance(TokenKind::Let));
        assert!(cursor.accept(TokenKind::Iden));
    }

    #[test]
    fn retype_keeps_payload() {
        let mut tokens = lexemes("- x");
        {
            let mut cursor = ParserCursor::new(&mut tokens);
            cursor.retype(TokenKind::USub);
            cursor.advance();
            cursor.retype(TokenKind::Str);
            assert_eq!(cursor.current().data_str(), Some("x"));
        }
        assert_eq!(tokens[0].kind, TokenKind::USub);
        assert_eq!(tokens[1].kind, TokenKind::Str);
        assert_eq!(tokens[1].data_str(), Some("x"));
    }
}
