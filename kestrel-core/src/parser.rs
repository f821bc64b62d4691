//! Recursive-descent parser from lexemes to the arena tree.
//!
//! The parser never owns the lexemes: it walks them through a
//! [`ParserCursor`] and retypes tokens in place once the grammar settles what
//! they mean (`-` becomes `USUB`, `(` after a callee becomes `FNCALL`, ...).
//! The first syntax error stops the parse and is returned as a
//! [`Diagnostic`].

use tracing::trace;

use crate::ast::{Ast, Attrs, CondArm, Expr, SigKind, StmtId, StmtKind, WordKind};
use crate::cursor::ParserCursor;
use crate::diagnostic::Diagnostic;
use crate::span::{ModuleId, ModuleLoc};
use crate::token::{Lexeme, TokenKind};

/// Upper bound on tokens inspected when deciding whether `<` opens a
/// specialization.
const SPEC_LOOKAHEAD: isize = 32;

/// An `@import("name")` found while parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub name: String,
    pub loc: ModuleLoc,
    /// Filled in by the compiler once the import is loaded.
    pub resolved: Option<ModuleId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    pub root: StmtId,
    pub imports: Vec<ImportRequest>,
}

type ParseResult<T> = Result<T, Diagnostic>;

/// Parses a whole module into a top-level block allocated in `ast`.
pub fn parse(module: ModuleId, tokens: &mut [Lexeme], ast: &mut Ast) -> ParseResult<ParseOutput> {
    let mut parser = Parser {
        cursor: ParserCursor::new(tokens),
        ast,
        module,
        imports: Vec::new(),
        spec_depth: 0,
        split_shift: false,
    };
    let root = parser.parse_top_level()?;
    Ok(ParseOutput {
        root,
        imports: parser.imports,
    })
}

/// Splits raw `@[...]` text on top-level commas into `key -> value`.
///
/// `a, b=c, d="x, y"` yields `a -> ""`, `b -> "c"`, `d -> "x, y"`.
pub fn split_attrs(text: &str) -> Attrs {
    let mut attrs = Attrs::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut pieces = Vec::new();
    for (index, ch) in text.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if ch == '\\' => escaped = true,
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == ',' => {
                pieces.push(&text[start..index]);
                start = index + 1;
            }
            None => {}
        }
    }
    pieces.push(&text[start..]);

    for piece in pieces {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let (key, value) = match piece.split_once('=') {
            Some((key, value)) => (key.trim(), unquote(value.trim())),
            None => (piece, ""),
        };
        attrs.insert(key.to_string(), value.to_string());
    }
    attrs
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn binary_precedence(kind: TokenKind) -> Option<u8> {
    let prec = match kind {
        TokenKind::LOr => 1,
        TokenKind::LAnd => 2,
        TokenKind::BOr => 3,
        TokenKind::BXor => 4,
        TokenKind::BAnd => 5,
        TokenKind::Eq | TokenKind::Ne => 6,
        TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => 7,
        TokenKind::LShift | TokenKind::RShift => 8,
        TokenKind::Add | TokenKind::Sub => 9,
        TokenKind::Mul | TokenKind::Div | TokenKind::Mod => 10,
        _ => return None,
    };
    Some(prec)
}

/// Kind a token takes when it opens a prefix unary expression.
fn prefix_kind(kind: TokenKind) -> Option<TokenKind> {
    match kind {
        TokenKind::Add => Some(TokenKind::UAdd),
        TokenKind::Sub => Some(TokenKind::USub),
        TokenKind::BAnd => Some(TokenKind::UAnd),
        TokenKind::Mul => Some(TokenKind::UMul),
        TokenKind::XInc => Some(TokenKind::IncX),
        TokenKind::XDec => Some(TokenKind::DecX),
        TokenKind::LNot | TokenKind::BNot => Some(kind),
        _ => None,
    }
}

struct Parser<'t, 'a> {
    cursor: ParserCursor<'t>,
    ast: &'a mut Ast,
    module: ModuleId,
    imports: Vec<ImportRequest>,
    /// Specializations currently open.
    spec_depth: usize,
    /// The `>>` at the cursor has already closed one specialization.
    split_shift: bool,
}

impl Parser<'_, '_> {
    fn current(&self) -> Lexeme {
        self.cursor.current().clone()
    }

    fn kind(&self) -> TokenKind {
        self.cursor.peek_kind(0)
    }

    fn loc(&self) -> ModuleLoc {
        self.cursor.current().loc
    }

    /// Builds `expected <what>, found '<token>'` at the current token, or at
    /// the last token when the stream is exhausted.
    fn expected(&self, what: &str) -> Diagnostic {
        let current = self.cursor.current();
        if current.kind.is_sentinel() {
            let loc = if self.cursor.position() > 0 {
                self.cursor.at(self.cursor.len() - 1).loc
            } else {
                ModuleLoc::new(self.module, 0)
            };
            return Diagnostic::error(loc, format!("expected {what}, found end of input"));
        }
        Diagnostic::error(
            current.loc,
            format!("expected {what}, found '{}'", current.describe()),
        )
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Lexeme> {
        if !self.cursor.accept(kind) {
            return Err(self.expected(what));
        }
        let lexeme = self.current();
        self.cursor.advance();
        Ok(lexeme)
    }

    /// Statements end with `;` unless they close with a block.
    fn end_statement(&mut self) -> ParseResult<()> {
        if self.cursor.accept_and_advance(TokenKind::Cols) {
            return Ok(());
        }
        if self.cursor.peek_kind(-1) == TokenKind::RBrace || self.cursor.accept(TokenKind::RBrace) {
            return Ok(());
        }
        Err(self.expected("';'"))
    }

    fn loc_of(&self, id: StmtId) -> ModuleLoc {
        self.ast[id].loc
    }

    fn simple(&mut self) -> StmtId {
        let lexeme = self.current();
        self.cursor.advance();
        self.ast.create_simple(lexeme.loc, lexeme)
    }

    fn unary(&mut self, loc: ModuleLoc, operand: StmtId, oper: Lexeme) -> StmtId {
        self.ast.create_expr(loc, Expr::new(operand, Some(oper), None))
    }

    fn binary(&mut self, loc: ModuleLoc, lhs: StmtId, oper: Lexeme, rhs: StmtId) -> StmtId {
        self.ast.create_expr(loc, Expr::new(lhs, Some(oper), Some(rhs)))
    }

    fn parse_top_level(&mut self) -> ParseResult<StmtId> {
        let loc = ModuleLoc::new(self.module, 0);
        let mut stmts = Vec::new();
        while self.cursor.is_valid() {
            if self.cursor.accept_and_advance(TokenKind::Cols) {
                continue;
            }
            let attrs = self.parse_attrs();
            if !self.cursor.accept(TokenKind::Let) {
                return Err(self.expected("'let' declaration"));
            }
            let decl = self.parse_var_decl()?;
            if let Some(attrs) = attrs {
                self.ast.set_attrs(decl, attrs);
            }
            stmts.push(Some(decl));
        }
        trace!(module = %self.module, stmts = stmts.len(), "parsed top level");
        Ok(self.ast.create_block(loc, stmts, true))
    }

    fn parse_attrs(&mut self) -> Option<Attrs> {
        if !self.cursor.accept(TokenKind::Attrs) {
            return None;
        }
        let attrs = split_attrs(self.cursor.current().data_str().unwrap_or_default());
        self.cursor.advance();
        Some(attrs)
    }

    fn parse_var_decl(&mut self) -> ParseResult<StmtId> {
        let loc = self.expect(TokenKind::Let, "'let'")?.loc;
        let mut decls = vec![self.parse_var()?];
        while self.cursor.accept_and_advance(TokenKind::Comma) {
            decls.push(self.parse_var()?);
        }
        self.end_statement()?;
        Ok(self.ast.create_var_decl(loc, decls))
    }

    /// `name [: type] [= value]`
    fn parse_var(&mut self) -> ParseResult<StmtId> {
        let name = self.expect(TokenKind::Iden, "identifier")?;
        let ty = if self.cursor.accept_and_advance(TokenKind::Col) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let value = if self.cursor.accept_and_advance(TokenKind::Assn) {
            Some(self.parse_assign()?)
        } else {
            None
        };
        Ok(self.ast.create_var(name.loc, name, ty, value))
    }

    fn parse_type(&mut self) -> ParseResult<StmtId> {
        let loc = self.loc();
        let mut attrs = Attrs::new();
        while self.cursor.accept_any(&[TokenKind::Static, TokenKind::Const, TokenKind::Volatile]) {
            attrs.insert(self.kind().spelling().to_string(), String::new());
            self.cursor.advance();
        }
        let expr = self.parse_type_expr()?;
        let ty = self.ast.create_type(loc, expr);
        if !attrs.is_empty() {
            self.ast.set_attrs(ty, attrs);
        }
        Ok(ty)
    }

    fn parse_type_expr(&mut self) -> ParseResult<StmtId> {
        match self.kind() {
            TokenKind::Mul | TokenKind::BAnd => {
                let retyped = if self.kind() == TokenKind::Mul {
                    TokenKind::UMul
                } else {
                    TokenKind::UAnd
                };
                self.cursor.retype(retyped);
                let oper = self.current();
                self.cursor.advance();
                let pointee = self.parse_type_expr()?;
                Ok(self.unary(oper.loc, pointee, oper))
            }
            TokenKind::Fn => self.parse_fn_signature(),
            TokenKind::Struct | TokenKind::Union => self.parse_record(),
            TokenKind::Iden | TokenKind::Void | TokenKind::Any => {
                let mut ty = self.simple();
                loop {
                    match self.kind() {
                        TokenKind::Dot => {
                            let oper = self.current();
                            self.cursor.advance();
                            if !self.cursor.accept(TokenKind::Iden) {
                                return Err(self.expected("identifier"));
                            }
                            let member = self.simple();
                            ty = self.binary(oper.loc, ty, oper, member);
                        }
                        TokenKind::Lt => {
                            self.cursor.retype(TokenKind::Spec);
                            ty = self.parse_specialization(ty)?;
                        }
                        _ => return Ok(ty),
                    }
                }
            }
            _ => Err(self.expected("type")),
        }
    }

    /// `<T, U>` after `base`; the current token is already `SPEC`.
    fn parse_specialization(&mut self, base: StmtId) -> ParseResult<StmtId> {
        let oper = self.current();
        self.cursor.advance();
        self.spec_depth += 1;
        let mut args = Vec::new();
        if !self.cursor.accept(TokenKind::Gt) {
            loop {
                args.push(self.parse_type()?);
                if !self.cursor.accept_and_advance(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.close_specialization()?;
        self.spec_depth -= 1;
        let args = self.ast.create_call_args(oper.loc, args);
        Ok(self.binary(oper.loc, base, oper, args))
    }

    /// Consumes the closing `>`. Inside nested specializations a `>>` closes
    /// two levels: the inner one leaves it in place for the outer one.
    fn close_specialization(&mut self) -> ParseResult<()> {
        if self.split_shift {
            self.split_shift = false;
            self.cursor.advance();
            return Ok(());
        }
        if self.spec_depth > 1 && self.cursor.accept(TokenKind::RShift) {
            self.split_shift = true;
            return Ok(());
        }
        self.expect(TokenKind::Gt, "'>'")?;
        Ok(())
    }

    /// Whether the `<` at the cursor opens `<types...>(`.
    fn is_specialization(&self) -> bool {
        for offset in 1..SPEC_LOOKAHEAD {
            match self.cursor.peek_kind(offset) {
                TokenKind::Iden
                | TokenKind::Comma
                | TokenKind::Dot
                | TokenKind::Mul
                | TokenKind::BAnd
                | TokenKind::Void
                | TokenKind::Any => {}
                TokenKind::Gt => return self.cursor.peek_kind(offset + 1) == TokenKind::LParen,
                _ => return false,
            }
        }
        false
    }

    /// `fn(params) [: ret]`
    fn parse_fn_signature(&mut self) -> ParseResult<StmtId> {
        let loc = self.expect(TokenKind::Fn, "'fn'")?.loc;
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.cursor.accept(TokenKind::RParen) {
            loop {
                params.push(self.parse_var()?);
                if !self.cursor.accept_and_advance(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        let ret = if self.cursor.accept_and_advance(TokenKind::Col) {
            Some(self.parse_type()?)
        } else {
            None
        };
        Ok(self.ast.create_signature(loc, params, ret, SigKind::Func))
    }

    /// `struct { fields }` or `union { fields }`
    fn parse_record(&mut self) -> ParseResult<StmtId> {
        let loc = self.loc();
        let kind = if self.kind() == TokenKind::Struct {
            SigKind::Struct
        } else {
            SigKind::Union
        };
        self.cursor.advance();
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        while !self.cursor.accept(TokenKind::RBrace) {
            fields.push(self.parse_var()?);
            if !self.cursor.accept_any(&[TokenKind::Comma, TokenKind::Cols]) {
                break;
            }
            self.cursor.advance();
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(self.ast.create_signature(loc, fields, None, kind))
    }

    fn parse_block(&mut self) -> ParseResult<StmtId> {
        let loc = self.expect(TokenKind::LBrace, "'{'")?.loc;
        let mut stmts = Vec::new();
        loop {
            if self.cursor.accept_and_advance(TokenKind::RBrace) {
                break;
            }
            if !self.cursor.is_valid() {
                return Err(self.expected("'}'"));
            }
            if self.cursor.accept_and_advance(TokenKind::Cols) {
                continue;
            }
            stmts.push(Some(self.parse_statement()?));
        }
        Ok(self.ast.create_block(loc, stmts, false))
    }

    fn parse_statement(&mut self) -> ParseResult<StmtId> {
        let loc = self.loc();
        match self.kind() {
            TokenKind::Attrs => {
                let attrs = self.parse_attrs().unwrap_or_default();
                let stmt = self.parse_statement()?;
                self.ast.get_mut(stmt).attrs.extend(attrs);
                Ok(stmt)
            }
            TokenKind::Let => self.parse_var_decl(),
            TokenKind::If => self.parse_cond(false),
            TokenKind::For => self.parse_for(false),
            TokenKind::While => {
                self.cursor.advance();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(self.ast.create_for(loc, None, Some(cond), None, body, false))
            }
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Return => {
                self.cursor.advance();
                let arg = if self.cursor.accept_any(&[TokenKind::Cols, TokenKind::RBrace]) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.end_statement()?;
                Ok(self.ast.create_one_word(loc, arg, WordKind::Return))
            }
            TokenKind::Break | TokenKind::Continue => {
                let kind = if self.kind() == TokenKind::Break {
                    WordKind::Break
                } else {
                    WordKind::Continue
                };
                self.cursor.advance();
                self.end_statement()?;
                Ok(self.ast.create_one_word(loc, None, kind))
            }
            TokenKind::Defer => {
                self.cursor.advance();
                let arg = if self.cursor.accept(TokenKind::LBrace) {
                    self.parse_block()?
                } else {
                    self.parse_expr()?
                };
                self.end_statement()?;
                Ok(self.ast.create_one_word(loc, Some(arg), WordKind::Defer))
            }
            TokenKind::Goto => {
                self.cursor.advance();
                if !self.cursor.accept(TokenKind::Iden) {
                    return Err(self.expected("label"));
                }
                let label = self.simple();
                self.end_statement()?;
                Ok(self.ast.create_one_word(loc, Some(label), WordKind::Goto))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.end_statement()?;
                Ok(expr)
            }
        }
    }

    /// `if c {} elif c {} else if c {} else {}`; the cursor is on `if`.
    fn parse_cond(&mut self, is_inline: bool) -> ParseResult<StmtId> {
        let loc = self.expect(TokenKind::If, "'if'")?.loc;
        let mut arms = Vec::new();
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        arms.push(CondArm {
            cond: Some(cond),
            body,
        });
        loop {
            if self.cursor.accept_and_advance(TokenKind::Elif) {
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                arms.push(CondArm {
                    cond: Some(cond),
                    body,
                });
            } else if self.cursor.accept_and_advance(TokenKind::Else) {
                if self.cursor.accept_and_advance(TokenKind::If) {
                    let cond = self.parse_expr()?;
                    let body = self.parse_block()?;
                    arms.push(CondArm {
                        cond: Some(cond),
                        body,
                    });
                    continue;
                }
                let body = self.parse_block()?;
                arms.push(CondArm { cond: None, body });
                break;
            } else {
                break;
            }
        }
        Ok(self.ast.create_cond(loc, arms, is_inline))
    }

    /// `for {}`, `for cond {}` and `for [init]; [cond]; [incr] {}`.
    fn parse_for(&mut self, is_inline: bool) -> ParseResult<StmtId> {
        let loc = self.expect(TokenKind::For, "'for'")?.loc;
        if self.cursor.accept(TokenKind::LBrace) {
            let body = self.parse_block()?;
            return Ok(self.ast.create_for(loc, None, None, None, body, is_inline));
        }

        let init = if self.cursor.accept(TokenKind::Let) {
            // parse_var_decl consumes the `;`
            Some(self.parse_var_decl()?)
        } else if self.cursor.accept_and_advance(TokenKind::Cols) {
            None
        } else {
            let first = self.parse_expr()?;
            if !self.cursor.accept_and_advance(TokenKind::Cols) {
                let body = self.parse_block()?;
                return Ok(self.ast.create_for(loc, None, Some(first), None, body, is_inline));
            }
            Some(first)
        };

        let cond = if self.cursor.accept(TokenKind::Cols) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Cols, "';'")?;
        let incr = if self.cursor.accept(TokenKind::LBrace) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let body = self.parse_block()?;
        Ok(self.ast.create_for(loc, init, cond, incr, body, is_inline))
    }

    /// Comma level: `a, b, c` folds left, each node counting the commas
    /// folded so far.
    fn parse_expr(&mut self) -> ParseResult<StmtId> {
        let mut lhs = self.parse_assign()?;
        let mut commas = 0;
        while self.cursor.accept(TokenKind::Comma) {
            let oper = self.current();
            self.cursor.advance();
            let rhs = self.parse_assign()?;
            commas += 1;
            let mut expr = Expr::new(lhs, Some(oper), Some(rhs));
            expr.commas = commas;
            lhs = self.ast.create_expr(self.loc_of(lhs), expr);
        }
        Ok(lhs)
    }

    fn parse_assign(&mut self) -> ParseResult<StmtId> {
        let lhs = self.parse_binary(1)?;
        if !self.kind().is_assign() {
            return Ok(lhs);
        }
        let oper = self.current();
        self.cursor.advance();
        let rhs = self.parse_assign()?;
        Ok(self.binary(oper.loc, lhs, oper, rhs))
    }

    fn parse_binary(&mut self, min_prec: u8) -> ParseResult<StmtId> {
        let mut lhs = self.parse_unary()?;
        while let Some(prec) = binary_precedence(self.kind()) {
            if prec < min_prec {
                break;
            }
            let oper = self.current();
            self.cursor.advance();
            let rhs = self.parse_binary(prec + 1)?;
            lhs = self.binary(oper.loc, lhs, oper, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<StmtId> {
        let Some(kind) = prefix_kind(self.kind()) else {
            return self.parse_postfix();
        };
        self.cursor.retype(kind);
        let oper = self.current();
        self.cursor.advance();
        let operand = self.parse_unary()?;
        Ok(self.unary(oper.loc, operand, oper))
    }

    fn parse_postfix(&mut self) -> ParseResult<StmtId> {
        let mut lhs = self.parse_primary()?;
        loop {
            match self.kind() {
                TokenKind::LParen => lhs = self.parse_call(lhs, false)?,
                TokenKind::LBrack => {
                    self.cursor.retype(TokenKind::Subs);
                    let oper = self.current();
                    self.cursor.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBrack, "']'")?;
                    lhs = self.binary(oper.loc, lhs, oper, index);
                }
                TokenKind::Dot => {
                    let oper = self.current();
                    self.cursor.advance();
                    if !self.cursor.accept(TokenKind::Iden) {
                        return Err(self.expected("identifier"));
                    }
                    let member = self.simple();
                    lhs = self.binary(oper.loc, lhs, oper, member);
                }
                TokenKind::XInc | TokenKind::XDec => {
                    let oper = self.current();
                    self.cursor.advance();
                    lhs = self.unary(oper.loc, lhs, oper);
                }
                TokenKind::Lt if self.is_specialization() => {
                    self.cursor.retype(TokenKind::Spec);
                    lhs = self.parse_specialization(lhs)?;
                }
                _ => return Ok(lhs),
            }
        }
    }

    /// `callee(args) [or [name] { ... }]`; the cursor is on `(`.
    fn parse_call(&mut self, callee: StmtId, is_intrinsic: bool) -> ParseResult<StmtId> {
        self.cursor.retype(TokenKind::FnCall);
        let oper = self.current();
        self.cursor.advance();
        let mut args = Vec::new();
        if !self.cursor.accept(TokenKind::RParen) {
            loop {
                args.push(self.parse_assign()?);
                if !self.cursor.accept_and_advance(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        let args = self.ast.create_call_args(oper.loc, args);

        let mut expr = Expr::new(callee, Some(oper), Some(args));
        expr.is_intrinsic = is_intrinsic;
        if self.cursor.accept_and_advance(TokenKind::Or) {
            if self.cursor.accept(TokenKind::Iden) {
                expr.or_var = Some(self.current());
                self.cursor.advance();
            }
            expr.or_blk = Some(self.parse_block()?);
        }
        Ok(self.ast.create_expr(self.loc_of(callee), expr))
    }

    fn parse_primary(&mut self) -> ParseResult<StmtId> {
        match self.kind() {
            TokenKind::Int
            | TokenKind::Flt
            | TokenKind::Char
            | TokenKind::Str
            | TokenKind::Iden
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Nil
            | TokenKind::Void
            | TokenKind::Any => Ok(self.simple()),
            TokenKind::LParen => {
                self.cursor.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Fn => {
                let loc = self.loc();
                let sig = self.parse_fn_signature()?;
                if !self.cursor.accept(TokenKind::LBrace) {
                    return Ok(sig);
                }
                let body = self.parse_block()?;
                Ok(self.ast.create_fn_def(loc, sig, body))
            }
            TokenKind::Struct | TokenKind::Union => self.parse_record(),
            TokenKind::Inline => {
                self.cursor.advance();
                match self.kind() {
                    TokenKind::If => self.parse_cond(true),
                    TokenKind::For => self.parse_for(true),
                    _ => Err(self.expected("'if' or 'for' after 'inline'")),
                }
            }
            TokenKind::At => self.parse_intrinsic(),
            _ => Err(self.expected("expression")),
        }
    }

    /// `@name(args)`; `@import` additionally records an import request.
    fn parse_intrinsic(&mut self) -> ParseResult<StmtId> {
        let at = self.expect(TokenKind::At, "'@'")?;
        if !self.cursor.accept(TokenKind::Iden) {
            return Err(self.expected("intrinsic name"));
        }
        let name = self.current();
        let callee = self.simple();
        if !self.cursor.accept(TokenKind::LParen) {
            return Err(self.expected("'('"));
        }
        let call = self.parse_call(callee, true)?;
        self.ast.get_mut(call).loc = at.loc;

        if name.data_str() == Some("import") {
            let target = self.import_target(call);
            let Some(target) = target else {
                return Err(Diagnostic::error(
                    at.loc,
                    "@import expects a single string literal",
                ));
            };
            trace!(module = %self.module, import = %target, "found import");
            self.imports.push(ImportRequest {
                name: target,
                loc: at.loc,
                resolved: None,
            });
        }
        Ok(call)
    }

    fn import_target(&self, call: StmtId) -> Option<String> {
        let StmtKind::Expr(expr) = &self.ast[call].kind else {
            return None;
        };
        let StmtKind::CallArgs(args) = &self.ast[expr.rhs?].kind else {
            return None;
        };
        let [arg] = args.args.as_slice() else {
            return None;
        };
        match &self.ast[*arg].kind {
            StmtKind::Simple(simple) if simple.val.kind == TokenKind::Str => {
                simple.val.data_str().map(str::to_string)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Stmt;
    use crate::lexer::tokenize;
    use crate::span::SourceMap;

    struct Parsed {
        ast: Ast,
        output: ParseOutput,
        tokens: Vec<Lexeme>,
    }

    fn module_id() -> ModuleId {
        SourceMap::new().add_path("test.ks")
    }

    fn parse_source(source: &str) -> ParseResult<Parsed> {
        let module = module_id();
        let mut tokens = tokenize(module, source)?;
        let mut ast = Ast::new();
        let output = parse(module, &mut tokens, &mut ast)?;
        Ok(Parsed { ast, output, tokens })
    }

    fn parse_ok(source: &str) -> Parsed {
        parse_source(source).unwrap_or_else(|diag| panic!("{source}: {}", diag.message))
    }

    fn parse_err(source: &str) -> Diagnostic {
        match parse_source(source) {
            Ok(_) => panic!("{source}: expected a syntax error"),
            Err(diag) => diag,
        }
    }

    fn first_stmt(parsed: &Parsed) -> StmtId {
        match &parsed.ast[parsed.output.root].kind {
            StmtKind::Block(block) => block.stmts[0].expect("statement"),
            other => panic!("root is {other:?}"),
        }
    }

    /// Value of the first variable declared by the first statement.
    fn first_value(parsed: &Parsed) -> &Stmt {
        let StmtKind::VarDecl(decl) = &parsed.ast[first_stmt(parsed)].kind else {
            panic!("not a declaration");
        };
        let StmtKind::Var(var) = &parsed.ast[decl.decls[0]].kind else {
            panic!("not a variable");
        };
        &parsed.ast[var.value.expect("value")]
    }

    fn expr(stmt: &Stmt) -> &Expr {
        match &stmt.kind {
            StmtKind::Expr(expr) => expr,
            other => panic!("not an expression: {other:?}"),
        }
    }

    #[test]
    fn parses_typed_declaration() {
        let parsed = parse_ok("let x: i32 = 1 + 2;");
        let root = &parsed.ast[parsed.output.root];
        let StmtKind::Block(block) = &root.kind else {
            panic!("root is not a block");
        };
        assert!(block.is_top_level);
        assert_eq!(block.stmts.len(), 1);

        let StmtKind::VarDecl(decl) = &parsed.ast[first_stmt(&parsed)].kind else {
            panic!("not a declaration");
        };
        assert_eq!(decl.decls.len(), 1);
        let StmtKind::Var(var) = &parsed.ast[decl.decls[0]].kind else {
            panic!("not a variable");
        };
        assert_eq!(var.name(), "x");
        let ty = var.ty.expect("type");
        let StmtKind::Type(ty) = &parsed.ast[ty].kind else {
            panic!("not a type");
        };
        let StmtKind::Simple(name) = &parsed.ast[ty.expr].kind else {
            panic!("type is not simple");
        };
        assert_eq!(name.val.data_str(), Some("i32"));

        let value = expr(first_value(&parsed));
        assert_eq!(value.oper_kind(), Some(TokenKind::Add));
        let StmtKind::Simple(lhs) = &parsed.ast[value.lhs].kind else {
            panic!("lhs is not simple");
        };
        assert_eq!(lhs.val.data_int(), Some(1));
        let StmtKind::Simple(rhs) = &parsed.ast[value.rhs.expect("rhs")].kind else {
            panic!("rhs is not simple");
        };
        assert_eq!(rhs.val.data_int(), Some(2));
        assert_eq!(first_value(&parsed).loc.offset, 15);
        assert!(parsed.output.imports.is_empty());
    }

    #[test]
    fn binary_precedence_and_associativity() {
        let parsed = parse_ok("let y = 1 + 2 * 3 - 4;");
        let root = expr(first_value(&parsed));
        assert_eq!(root.oper_kind(), Some(TokenKind::Sub));
        let add = expr(&parsed.ast[root.lhs]);
        assert_eq!(add.oper_kind(), Some(TokenKind::Add));
        let mul = expr(&parsed.ast[add.rhs.expect("rhs")]);
        assert_eq!(mul.oper_kind(), Some(TokenKind::Mul));

        let parsed = parse_ok("let z = a || b && c == d;");
        let root = expr(first_value(&parsed));
        assert_eq!(root.oper_kind(), Some(TokenKind::LOr));
        let and = expr(&parsed.ast[root.rhs.expect("rhs")]);
        assert_eq!(and.oper_kind(), Some(TokenKind::LAnd));
    }

    #[test]
    fn assignment_is_right_associative() {
        let parsed = parse_ok("let f = fn() { a = b += 1; };");
        let dump = parsed.ast.dump(Some(parsed.output.root));
        assert!(dump.contains("Expr ASSN\n"), "{dump}");
        let assn = dump.find("Expr ASSN").expect("assign");
        let add_assn = dump.find("rhs: Expr ADD_ASSN").expect("compound assign");
        assert!(assn < add_assn, "{dump}");
    }

    #[test]
    fn prefix_operators_are_retyped_in_place() {
        let parsed = parse_ok("let n = -x * &y + ++z;");
        let kinds: Vec<TokenKind> = parsed.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Let,
                TokenKind::Iden,
                TokenKind::Assn,
                TokenKind::USub,
                TokenKind::Iden,
                TokenKind::Mul,
                TokenKind::UAnd,
                TokenKind::Iden,
                TokenKind::Add,
                TokenKind::IncX,
                TokenKind::Iden,
                TokenKind::Cols,
            ]
        );
    }

    #[test]
    fn calls_specializations_and_or_blocks() {
        let parsed = parse_ok("let r = make<i32, *u8>(a, b) or err { return err; };");
        let call = expr(first_value(&parsed));
        assert_eq!(call.oper_kind(), Some(TokenKind::FnCall));
        assert_eq!(call.or_var.as_ref().and_then(|v| v.data_str()), Some("err"));
        assert!(call.or_blk.is_some());
        let StmtKind::CallArgs(args) = &parsed.ast[call.rhs.expect("args")].kind else {
            panic!("call without arguments node");
        };
        assert_eq!(args.args.len(), 2);
        let spec = expr(&parsed.ast[call.lhs]);
        assert_eq!(spec.oper_kind(), Some(TokenKind::Spec));

        assert!(parsed.tokens.iter().any(|t| t.kind == TokenKind::Spec));
        assert!(parsed.tokens.iter().any(|t| t.kind == TokenKind::FnCall));
        assert!(!parsed.tokens.iter().any(|t| t.kind == TokenKind::Lt));
    }

    #[test]
    fn less_than_stays_a_comparison() {
        let parsed = parse_ok("let b = a < c;");
        assert_eq!(expr(first_value(&parsed)).oper_kind(), Some(TokenKind::Lt));
    }

    #[test]
    fn comma_expressions_fold_left() {
        let parsed = parse_ok("let f = fn() { a, b, c; };");
        let dump = parsed.ast.dump(Some(parsed.output.root));
        assert!(dump.contains("Expr COMMA commas=2"), "{dump}");
        assert!(dump.contains("lhs: Expr COMMA commas=1"), "{dump}");
    }

    #[test]
    fn records_imports_in_order() {
        let parsed = parse_ok(
            "let io = @import(\"std/io\");\nlet util = @import(\"./util\");",
        );
        let names: Vec<&str> = parsed.output.imports.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["std/io", "./util"]);
        assert_eq!(parsed.output.imports[0].loc.offset, 9);
        assert!(expr(first_value(&parsed)).is_intrinsic);
    }

    #[test]
    fn import_requires_one_string() {
        let diag = parse_err("let io = @import(name);");
        assert_eq!(diag.message, "@import expects a single string literal");
        assert_eq!(diag.loc.offset, 9);
    }

    #[test]
    fn control_flow_statements() {
        let source = "let main = fn(argc: i32): i32 {\n\
            if argc == 0 { return 1; } elif argc == 1 { x++; } else if argc { } else { }\n\
            for { break; }\n\
            for argc > 0 { argc -= 1; }\n\
            for let i = 0; i < 10; i++ { continue; }\n\
            while ready { defer close(f); goto done; }\n\
            return 0;\n\
        };";
        let parsed = parse_ok(source);
        let dump = parsed.ast.dump(Some(parsed.output.root));
        for needle in [
            "FnDef",
            "sig: Signature Func",
            "param: Var argc",
            "OneWord return",
            "OneWord break",
            "OneWord continue",
            "OneWord defer",
            "OneWord goto",
            "init: VarDecl",
            "incr: Expr XINC",
        ] {
            assert!(dump.contains(needle), "missing {needle}:\n{dump}");
        }

        assert_eq!(dump.matches("Cond\n").count(), 1, "{dump}");
        assert_eq!(dump.matches("if: ").count(), 3, "{dump}");
        assert_eq!(dump.lines().filter(|line| line.trim() == "else").count(), 1, "{dump}");
        assert_eq!(dump.matches("For\n").count(), 4, "{dump}");
    }

    #[test]
    fn attributes_attach_to_declarations() {
        let parsed = parse_ok("@[inline, abi=\"c, sysv\", section='text'] let f = fn() {};");
        let attrs = &parsed.ast[first_stmt(&parsed)].attrs;
        assert_eq!(attrs.get("inline").map(String::as_str), Some(""));
        assert_eq!(attrs.get("abi").map(String::as_str), Some("c, sysv"));
        assert_eq!(attrs.get("section").map(String::as_str), Some("text"));
    }

    #[test]
    fn type_qualifiers_and_pointers() {
        let parsed = parse_ok("let p: const *mem.Buf<u8>;");
        let dump = parsed.ast.dump(Some(parsed.output.root));
        assert!(dump.contains("type: Type @[const]"), "{dump}");
        assert!(dump.contains("Expr UMUL"), "{dump}");
        assert!(dump.contains("Expr SPEC"), "{dump}");
        assert!(dump.contains("Expr DOT"), "{dump}");
    }

    #[test]
    fn nested_specializations_close_on_shift() {
        let parsed = parse_ok("let v: Buf<Vec<u8>>;\nlet m: Map<str, List<Vec<i32>>>;");
        let dump = parsed.ast.dump(Some(parsed.output.root));
        assert_eq!(dump.matches("Expr SPEC").count(), 5, "{dump}");
        assert!(dump.contains("Var m"), "{dump}");

        let diag = parse_err("let v: Vec<u8>>;");
        assert_eq!(diag.message, "expected '>', found '>>'");
    }

    #[test]
    fn records_parse_as_signatures() {
        let parsed = parse_ok("let Point: type = struct { x: i32, y: i32 };");
        let StmtKind::Signature(sig) = &first_value(&parsed).kind else {
            panic!("struct is not a signature");
        };
        assert_eq!(sig.kind, SigKind::Struct);
        assert_eq!(sig.params.len(), 2);
    }

    #[test]
    fn syntax_errors_name_the_offending_token() {
        let diag = parse_err("let = 1;");
        assert_eq!(diag.message, "expected identifier, found '='");
        assert_eq!(diag.loc.offset, 4);

        let diag = parse_err("let x = 1");
        assert_eq!(diag.message, "expected ';', found end of input");
        assert_eq!(diag.loc.offset, 8);

        let diag = parse_err("x = 1;");
        assert_eq!(diag.message, "expected 'let' declaration, found 'x'");

        let diag = parse_err("let f = fn() { return 1;");
        assert_eq!(diag.message, "expected '}', found end of input");
    }

    #[test]
    fn splits_attribute_text() {
        let attrs = split_attrs(" a , b = c ,, d=\"x, y\" ");
        let pairs: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(pairs, vec![("a", ""), ("b", "c"), ("d", "x, y")]);
        assert!(split_attrs("").is_empty());
    }
}
