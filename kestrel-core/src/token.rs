//! Token kinds and lexemes.
//!
//! The kind table is ordered in contiguous groups (data-carrying kinds,
//! keywords, operators, separators, sentinels). Classification predicates
//! are range tests over that order, so new kinds must be added inside the
//! group they belong to.

use std::fmt;

use crate::span::ModuleLoc;

macro_rules! token_kinds {
    ($($variant:ident => $name:literal, $spelling:literal;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum TokenKind {
            $($variant,)*
        }

        impl TokenKind {
            /// Every kind, in table order.
            pub const ALL: &'static [TokenKind] = &[$(TokenKind::$variant,)*];

            /// Upper-case table name, used by dumps.
            pub const fn name(self) -> &'static str {
                match self {
                    $(TokenKind::$variant => $name,)*
                }
            }

            /// Canonical spelling, used by diagnostics.
            pub const fn spelling(self) -> &'static str {
                match self {
                    $(TokenKind::$variant => $spelling,)*
                }
            }
        }
    };
}

token_kinds! {
    // data-carrying
    Int => "INT", "int";
    Flt => "FLT", "flt";
    Char => "CHAR", "char";
    Str => "STR", "str";
    Iden => "IDEN", "identifier";
    Attrs => "ATTRS", "attributes";

    // keywords
    Let => "LET", "let";
    Fn => "FN", "fn";
    If => "IF", "if";
    Elif => "ELIF", "elif";
    Else => "ELSE", "else";
    For => "FOR", "for";
    While => "WHILE", "while";
    Return => "RETURN", "return";
    Continue => "CONTINUE", "continue";
    Break => "BREAK", "break";
    Defer => "DEFER", "defer";
    Goto => "GOTO", "goto";
    Void => "VOID", "void";
    Any => "ANY", "any";
    True => "TRUE", "true";
    False => "FALSE", "false";
    Nil => "NIL", "nil";
    Or => "OR", "or";
    Static => "STATIC", "static";
    Const => "CONST", "const";
    Volatile => "VOLATILE", "volatile";
    Inline => "INLINE", "inline";
    Struct => "STRUCT", "struct";
    Union => "UNION", "union";
    Extern => "EXTERN", "extern";
    In => "IN", "in";

    // assignment and arithmetic
    Assn => "ASSN", "=";
    Add => "ADD", "+";
    Sub => "SUB", "-";
    Mul => "MUL", "*";
    Div => "DIV", "/";
    Mod => "MOD", "%";
    AddAssn => "ADD_ASSN", "+=";
    SubAssn => "SUB_ASSN", "-=";
    MulAssn => "MUL_ASSN", "*=";
    DivAssn => "DIV_ASSN", "/=";
    ModAssn => "MOD_ASSN", "%=";

    // increment and decrement
    XInc => "XINC", "++";
    IncX => "INCX", "++";
    XDec => "XDEC", "--";
    DecX => "DECX", "--";

    // unary, only produced by retyping
    UAdd => "UADD", "+";
    USub => "USUB", "-";
    UAnd => "UAND", "&";
    UMul => "UMUL", "*";

    // logic
    LAnd => "LAND", "&&";
    LOr => "LOR", "||";
    LNot => "LNOT", "!";

    // comparison
    Eq => "EQ", "==";
    Lt => "LT", "<";
    Gt => "GT", ">";
    Le => "LE", "<=";
    Ge => "GE", ">=";
    Ne => "NE", "!=";

    // bitwise
    BAnd => "BAND", "&";
    BOr => "BOR", "|";
    BNot => "BNOT", "~";
    BXor => "BXOR", "^";
    BAndAssn => "BAND_ASSN", "&=";
    BOrAssn => "BOR_ASSN", "|=";
    BNotAssn => "BNOT_ASSN", "~=";
    BXorAssn => "BXOR_ASSN", "^=";
    LShift => "LSHIFT", "<<";
    RShift => "RSHIFT", ">>";
    LShiftAssn => "LSHIFT_ASSN", "<<=";
    RShiftAssn => "RSHIFT_ASSN", ">>=";

    // structural; FNCALL, SUBS and SPEC are only produced by retyping
    FnCall => "FNCALL", "(";
    Subs => "SUBS", "[";
    Spec => "SPEC", "<";
    Dot => "DOT", ".";
    Ellipsis => "ELLIPSIS", "...";

    // separators
    Col => "COL", ":";
    Cols => "COLS", ";";
    Comma => "COMMA", ",";
    At => "AT", "@";
    LParen => "LPAREN", "(";
    RParen => "RPAREN", ")";
    LBrace => "LBRACE", "{";
    RBrace => "RBRACE", "}";
    LBrack => "LBRACK", "[";
    RBrack => "RBRACK", "]";

    // sentinels
    Invalid => "INVALID", "<invalid>";
    Eof => "EOF", "<eof>";
}

impl TokenKind {
    const fn between(self, lo: TokenKind, hi: TokenKind) -> bool {
        self as u8 >= lo as u8 && self as u8 <= hi as u8
    }

    /// Kinds that carry a payload.
    pub const fn is_data(self) -> bool {
        self.between(TokenKind::Int, TokenKind::Attrs)
    }

    pub const fn is_literal(self) -> bool {
        self.between(TokenKind::Int, TokenKind::Str)
    }

    pub const fn is_keyword(self) -> bool {
        self.between(TokenKind::Let, TokenKind::In)
    }

    pub const fn is_operator(self) -> bool {
        self.between(TokenKind::Assn, TokenKind::Ellipsis)
    }

    pub const fn is_separator(self) -> bool {
        self.between(TokenKind::Col, TokenKind::RBrack)
    }

    pub const fn is_comparison(self) -> bool {
        self.between(TokenKind::Eq, TokenKind::Ne)
    }

    pub const fn is_sentinel(self) -> bool {
        matches!(self, TokenKind::Invalid | TokenKind::Eof)
    }

    /// Kinds that may start a type.
    pub const fn is_type(self) -> bool {
        matches!(
            self,
            TokenKind::Iden
                | TokenKind::Void
                | TokenKind::Any
                | TokenKind::Fn
                | TokenKind::Struct
                | TokenKind::Union
                | TokenKind::Mul
                | TokenKind::BAnd
        )
    }

    pub const fn is_assign(self) -> bool {
        matches!(
            self,
            TokenKind::Assn
                | TokenKind::AddAssn
                | TokenKind::SubAssn
                | TokenKind::MulAssn
                | TokenKind::DivAssn
                | TokenKind::ModAssn
                | TokenKind::BAndAssn
                | TokenKind::BOrAssn
                | TokenKind::BNotAssn
                | TokenKind::BXorAssn
                | TokenKind::LShiftAssn
                | TokenKind::RShiftAssn
        )
    }

    pub const fn is_unary_prefix(self) -> bool {
        matches!(
            self,
            TokenKind::UAdd
                | TokenKind::USub
                | TokenKind::UAnd
                | TokenKind::UMul
                | TokenKind::IncX
                | TokenKind::DecX
                | TokenKind::LNot
                | TokenKind::BNot
        )
    }

    pub const fn is_unary_postfix(self) -> bool {
        matches!(self, TokenKind::XInc | TokenKind::XDec)
    }

    /// Looks a word up in the keyword range.
    pub fn keyword(text: &str) -> Option<TokenKind> {
        Self::ALL[TokenKind::Let as usize..=TokenKind::In as usize]
            .iter()
            .copied()
            .find(|kind| kind.spelling() == text)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of a data-carrying lexeme.
#[derive(Debug, Clone, PartialEq)]
pub enum LexData {
    None,
    Str(String),
    Int(i64),
    Flt(f64),
}

/// A located, classified unit of source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub loc: ModuleLoc,
    pub kind: TokenKind,
    pub data: LexData,
}

/// Returned by cursor reads past the end of the stream.
pub static EOF_LEXEME: Lexeme = Lexeme::sentinel(TokenKind::Eof);

/// Returned by cursor retreats before the start of the stream.
pub static INVALID_LEXEME: Lexeme = Lexeme::sentinel(TokenKind::Invalid);

impl Lexeme {
    pub fn new(loc: ModuleLoc, kind: TokenKind) -> Self {
        debug_assert!(!kind.is_data(), "{kind} requires a payload");
        Lexeme {
            loc,
            kind,
            data: LexData::None,
        }
    }

    const fn sentinel(kind: TokenKind) -> Self {
        Lexeme {
            loc: ModuleLoc::INVALID,
            kind,
            data: LexData::None,
        }
    }

    /// A lexeme with a string payload (`CHAR`, `STR`, `IDEN`, `ATTRS`).
    pub fn with_str(loc: ModuleLoc, kind: TokenKind, text: impl Into<String>) -> Self {
        debug_assert!(
            matches!(
                kind,
                TokenKind::Char | TokenKind::Str | TokenKind::Iden | TokenKind::Attrs
            ),
            "{kind} does not carry a string"
        );
        Lexeme {
            loc,
            kind,
            data: LexData::Str(text.into()),
        }
    }

    pub fn int(loc: ModuleLoc, value: i64) -> Self {
        Lexeme {
            loc,
            kind: TokenKind::Int,
            data: LexData::Int(value),
        }
    }

    pub fn flt(loc: ModuleLoc, value: f64) -> Self {
        Lexeme {
            loc,
            kind: TokenKind::Flt,
            data: LexData::Flt(value),
        }
    }

    pub fn contains_data(&self) -> bool {
        !matches!(self.data, LexData::None)
    }

    pub fn data_str(&self) -> Option<&str> {
        match &self.data {
            LexData::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Integer payload; a float payload is truncated.
    pub fn data_int(&self) -> Option<i64> {
        match self.data {
            LexData::Int(value) => Some(value),
            LexData::Flt(value) => Some(value as i64),
            _ => None,
        }
    }

    /// Float payload; an integer payload is widened.
    pub fn data_flt(&self) -> Option<f64> {
        match self.data {
            LexData::Flt(value) => Some(value),
            LexData::Int(value) => Some(value as f64),
            _ => None,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Source-like text for messages: the payload or the spelling.
    pub fn describe(&self) -> String {
        match &self.data {
            LexData::None => self.kind.spelling().to_string(),
            LexData::Str(text) => text.clone(),
            LexData::Int(value) => value.to_string(),
            LexData::Flt(value) => format!("{value:?}"),
        }
    }
}

impl fmt::Display for Lexeme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            LexData::None => f.write_str(self.kind.name()),
            LexData::Str(text) => write!(f, "{}({text:?})", self.kind.name()),
            LexData::Int(value) => write!(f, "{}({value})", self.kind.name()),
            LexData::Flt(value) => write!(f, "{}({value:?})", self.kind.name()),
        }
    }
}
