//! Tokenizer for Kestrel source text.
//!
//! Whitespace and comments are skipped rather than emitted; every lexeme's
//! location points at its first byte. The scan stops at the first lexical
//! error, which is returned as a [`Diagnostic`] for the caller to report.

use crate::diagnostic::Diagnostic;
use crate::span::{ModuleId, ModuleLoc};
use crate::token::{Lexeme, TokenKind};

/// Fixed spellings, longest first so that `>>=` wins over `>>` and `>`.
const OPERATORS: &[(&str, TokenKind)] = &[
    (">>=", TokenKind::RShiftAssn),
    ("<<=", TokenKind::LShiftAssn),
    ("...", TokenKind::Ellipsis),
    ("+=", TokenKind::AddAssn),
    ("-=", TokenKind::SubAssn),
    ("*=", TokenKind::MulAssn),
    ("/=", TokenKind::DivAssn),
    ("%=", TokenKind::ModAssn),
    ("&=", TokenKind::BAndAssn),
    ("|=", TokenKind::BOrAssn),
    ("~=", TokenKind::BNotAssn),
    ("^=", TokenKind::BXorAssn),
    ("==", TokenKind::Eq),
    ("<=", TokenKind::Le),
    (">=", TokenKind::Ge),
    ("!=", TokenKind::Ne),
    ("&&", TokenKind::LAnd),
    ("||", TokenKind::LOr),
    ("<<", TokenKind::LShift),
    (">>", TokenKind::RShift),
    ("++", TokenKind::XInc),
    ("--", TokenKind::XDec),
    ("=", TokenKind::Assn),
    ("+", TokenKind::Add),
    ("-", TokenKind::Sub),
    ("*", TokenKind::Mul),
    ("/", TokenKind::Div),
    ("%", TokenKind::Mod),
    ("<", TokenKind::Lt),
    (">", TokenKind::Gt),
    ("!", TokenKind::LNot),
    ("&", TokenKind::BAnd),
    ("|", TokenKind::BOr),
    ("~", TokenKind::BNot),
    ("^", TokenKind::BXor),
    (".", TokenKind::Dot),
    (":", TokenKind::Col),
    (";", TokenKind::Cols),
    (",", TokenKind::Comma),
    ("@", TokenKind::At),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    ("[", TokenKind::LBrack),
    ("]", TokenKind::RBrack),
];

/// Tokenizes one module's source.
///
/// The result never contains `INVALID` or `EOF`; the parser cursor supplies
/// those as sentinels.
pub fn tokenize(module: ModuleId, source: &str) -> Result<Vec<Lexeme>, Diagnostic> {
    let mut lexer = Lexer {
        module,
        source,
        bytes: source.as_bytes(),
        index: 0,
    };
    lexer.run()
}

struct Lexer<'src> {
    module: ModuleId,
    source: &'src str,
    bytes: &'src [u8],
    index: usize,
}

type LexResult<T> = Result<T, Diagnostic>;

impl<'src> Lexer<'src> {
    fn run(&mut self) -> LexResult<Vec<Lexeme>> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if is_whitespace(ch) {
                self.consume_char();
                continue;
            }
            if ch == b'/' && self.peek_next() == Some(b'/') {
                self.skip_line_comment();
                continue;
            }
            if ch == b'/' && self.peek_next() == Some(b'*') {
                self.skip_block_comment()?;
                continue;
            }

            let start = self.index;
            let token = match ch {
                b'"' | b'`' => self.lex_string(start)?,
                b'\'' => self.lex_char(start)?,
                b'0'..=b'9' => self.lex_number(start)?,
                b'@' if self.peek_next() == Some(b'[') => self.lex_attrs(start)?,
                _ if is_ident_start(ch) => self.lex_ident_or_keyword(start),
                _ => self.lex_operator(start)?,
            };
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn loc(&self, offset: usize) -> ModuleLoc {
        ModuleLoc::new(self.module, offset)
    }

    fn error<T>(&self, offset: usize, message: impl Into<String>) -> LexResult<T> {
        Err(Diagnostic::error(self.loc(offset), message))
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == b'\n' {
                break;
            }
            self.consume_char();
        }
    }

    fn skip_block_comment(&mut self) -> LexResult<()> {
        let start = self.index;
        self.consume_char(); // '/'
        self.consume_char(); // '*'
        while let Some(ch) = self.peek_char() {
            if ch == b'*' && self.peek_next() == Some(b'/') {
                self.consume_char();
                self.consume_char();
                return Ok(());
            }
            self.consume_char();
        }
        self.error(start, "unterminated block comment")
    }

    /// Strings open with `"` (escapes processed) or `` ` `` (raw).
    fn lex_string(&mut self, start: usize) -> LexResult<Lexeme> {
        let quote = self.bytes[start];
        let body = self.scan_quoted(start, quote)?;
        let text = if quote == b'`' {
            body.to_string()
        } else {
            unescape(body).or_else(|message| self.error(start, message))?
        };
        Ok(Lexeme::with_str(self.loc(start), TokenKind::Str, text))
    }

    fn lex_char(&mut self, start: usize) -> LexResult<Lexeme> {
        let body = self.scan_quoted(start, b'\'')?;
        let text = unescape(body).or_else(|message| self.error(start, message))?;
        if text.chars().count() != 1 {
            return self.error(
                start,
                "character literal must contain exactly one character",
            );
        }
        Ok(Lexeme::with_str(self.loc(start), TokenKind::Char, text))
    }

    /// Consumes a quoted literal and returns the raw text between quotes.
    fn scan_quoted(&mut self, start: usize, quote: u8) -> LexResult<&'src str> {
        self.consume_char(); // opening quote
        let content_start = self.index;
        while let Some(ch) = self.peek_char() {
            if ch == quote {
                let source = self.source;
                let content_end = self.index;
                self.consume_char(); // closing quote
                return Ok(&source[content_start..content_end]);
            }
            if ch == b'\\' && quote != b'`' {
                // Skip over escape sequence: backslash + next char (if any)
                self.consume_char();
            }
            self.consume_char();
        }
        let what = if quote == b'\'' { "character" } else { "string" };
        self.error(start, format!("unterminated {what} literal"))
    }

    fn lex_number(&mut self, start: usize) -> LexResult<Lexeme> {
        let radix = match (self.peek_char(), self.peek_next()) {
            (Some(b'0'), Some(b'x' | b'X')) => 16,
            (Some(b'0'), Some(b'o' | b'O')) => 8,
            (Some(b'0'), Some(b'b' | b'B')) => 2,
            _ => 10,
        };
        if radix != 10 {
            return self.lex_prefixed_int(start, radix);
        }

        self.consume_digits();
        let mut is_float = false;

        if self.peek_char() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.consume_char(); // '.'
            self.consume_digits();
        }
        if matches!(self.peek_char(), Some(b'e' | b'E')) {
            let digit_at = match self.peek_next() {
                Some(b'+' | b'-') => self.index + 2,
                _ => self.index + 1,
            };
            if self.bytes.get(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                while self.index < digit_at {
                    self.consume_char();
                }
                self.consume_digits();
            }
        }
        if self.peek_char().is_some_and(is_ident_continue) {
            return self.error(self.index, "invalid suffix in numeric literal");
        }

        let text: String = self.source[start..self.index]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if is_float {
            match text.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(Lexeme::flt(self.loc(start), value)),
                Ok(_) => self.error(start, "floating-point literal is out of range"),
                Err(_) => self.error(start, "malformed floating-point literal"),
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => Ok(Lexeme::int(self.loc(start), value)),
                Err(_) => self.error(start, "integer literal is out of range"),
            }
        }
    }

    fn lex_prefixed_int(&mut self, start: usize, radix: u32) -> LexResult<Lexeme> {
        self.consume_char(); // '0'
        self.consume_char(); // prefix letter
        let digits_start = self.index;
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.consume_char();
            } else {
                break;
            }
        }
        let digits: String = self.source[digits_start..self.index]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        if digits.is_empty() {
            return self.error(start, "missing digits after numeric prefix");
        }
        if let Some(bad) = digits.chars().find(|c| !c.is_digit(radix)) {
            return self.error(start, format!("invalid digit '{bad}' for base {radix} literal"));
        }
        match i64::from_str_radix(&digits, radix) {
            Ok(value) => Ok(Lexeme::int(self.loc(start), value)),
            Err(_) => self.error(start, "integer literal is out of range"),
        }
    }

    fn consume_digits(&mut self) {
        while let Some(ch) = self.peek_char() {
            if matches!(ch, b'0'..=b'9' | b'_') {
                self.consume_char();
            } else {
                break;
            }
        }
    }

    /// `@[ ... ]` becomes one `ATTRS` lexeme carrying the raw inner text.
    fn lex_attrs(&mut self, start: usize) -> LexResult<Lexeme> {
        self.consume_char(); // '@'
        self.consume_char(); // '['
        let content_start = self.index;
        let mut depth = 1usize;
        let mut quote: Option<u8> = None;
        while let Some(ch) = self.peek_char() {
            match (quote, ch) {
                (Some(_), b'\\') => self.consume_char(),
                (Some(q), _) if ch == q => quote = None,
                (Some(_), _) => {}
                (None, b'"' | b'\'') => quote = Some(ch),
                (None, b'[') => depth += 1,
                (None, b']') => {
                    depth -= 1;
                    if depth == 0 {
                        let source = self.source;
                        let text = source[content_start..self.index].trim();
                        self.consume_char(); // ']'
                        return Ok(Lexeme::with_str(self.loc(start), TokenKind::Attrs, text));
                    }
                }
                (None, _) => {}
            }
            self.consume_char();
        }
        self.error(start, "unterminated attribute list")
    }

    fn lex_ident_or_keyword(&mut self, start: usize) -> Lexeme {
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.consume_char();
            } else {
                break;
            }
        }

        let source = self.source;
        let text = &source[start..self.index];
        match TokenKind::keyword(text) {
            Some(kind) => Lexeme::new(self.loc(start), kind),
            None => Lexeme::with_str(self.loc(start), TokenKind::Iden, text),
        }
    }

    fn lex_operator(&mut self, start: usize) -> LexResult<Lexeme> {
        let source = self.source;
        let rest = &source[start..];
        for (spelling, kind) in OPERATORS {
            if rest.starts_with(spelling) {
                self.index += spelling.len();
                return Ok(Lexeme::new(self.loc(start), *kind));
            }
        }
        let found = rest.chars().next().unwrap_or('\0');
        self.error(start, format!("invalid character '{}'", found.escape_default()))
    }

    fn peek_char(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    fn consume_char(&mut self) {
        if self.index < self.bytes.len() {
            self.index += 1;
        }
    }
}

/// Removes backslash escapes from the body of a quoted literal.
fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let escaped = match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some('a') => '\x07',
            Some('b') => '\x08',
            Some('f') => '\x0c',
            Some('v') => '\x0b',
            Some('e') => '\x1b',
            Some(c @ ('\\' | '"' | '\'')) => c,
            Some(other) => return Err(format!("unknown escape sequence '\\{other}'")),
            None => return Err("dangling backslash in literal".to_string()),
        };
        out.push(escaped);
    }
    Ok(out)
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}
