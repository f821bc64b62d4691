//! One source file moving through tokenize -> parse -> passes.

use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::ast::{Ast, StmtId};
use crate::context::Context;
use crate::error::CoreError;
use crate::lexer;
use crate::parser::{self, ImportRequest};
use crate::pass::PassManager;
use crate::span::ModuleId;
use crate::token::Lexeme;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Created,
    Tokenized,
    Parsed,
}

#[derive(Debug)]
pub struct Module {
    id: ModuleId,
    path: PathBuf,
    source: Arc<str>,
    tokens: Vec<Lexeme>,
    root: Option<StmtId>,
    imports: Vec<ImportRequest>,
    is_main: bool,
    state: ModuleState,
}

impl Module {
    pub fn new(id: ModuleId, path: PathBuf, source: Arc<str>, is_main: bool) -> Self {
        Module {
            id,
            path,
            source,
            tokens: Vec::new(),
            root: None,
            imports: Vec::new(),
            is_main,
            state: ModuleState::Created,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[Lexeme] {
        &self.tokens
    }

    pub fn root(&self) -> Option<StmtId> {
        self.root
    }

    pub fn imports(&self) -> &[ImportRequest] {
        &self.imports
    }

    pub fn imports_mut(&mut self) -> &mut [ImportRequest] {
        &mut self.imports
    }

    pub fn is_main(&self) -> bool {
        self.is_main
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Fills the lexeme sequence. Must be the first step, run once.
    pub fn tokenize(&mut self, ctx: &mut Context) -> Result<(), CoreError> {
        debug_assert_eq!(self.state, ModuleState::Created, "{} tokenized twice", self.path.display());
        match lexer::tokenize(self.id, &self.source) {
            Ok(tokens) => {
                debug!(module = %self.path.display(), tokens = tokens.len(), "tokenized");
                self.tokens = tokens;
                self.state = ModuleState::Tokenized;
                Ok(())
            }
            Err(diag) => {
                ctx.report(&diag);
                Err(CoreError::Lex {
                    path: self.path.clone(),
                })
            }
        }
    }

    /// Builds the tree into `ast` and records the module's imports.
    pub fn parse_tokens(&mut self, ctx: &mut Context, ast: &mut Ast) -> Result<(), CoreError> {
        debug_assert_eq!(self.state, ModuleState::Tokenized, "{} parsed out of order", self.path.display());
        match parser::parse(self.id, &mut self.tokens, ast) {
            Ok(output) => {
                debug!(
                    module = %self.path.display(),
                    imports = output.imports.len(),
                    "parsed"
                );
                self.root = Some(output.root);
                self.imports = output.imports;
                self.state = ModuleState::Parsed;
                Ok(())
            }
            Err(diag) => {
                ctx.report(&diag);
                Err(CoreError::Syntax {
                    path: self.path.clone(),
                })
            }
        }
    }

    /// Runs `passes` over this module's tree, keeping any root replacement.
    /// Passes registered in `peers` stay visible to lookups.
    pub fn execute_passes(
        &mut self,
        ctx: &mut Context,
        ast: &mut Ast,
        passes: &mut PassManager,
        peers: &[&PassManager],
    ) -> Result<(), CoreError> {
        debug_assert_eq!(self.state, ModuleState::Parsed, "{} has no tree yet", self.path.display());
        let mut root = self.root;
        let result = passes.run_with_peers(ctx, ast, &mut root, peers);
        self.root = root;
        result
    }

    /// One lexeme per line, prefixed with its byte offset.
    pub fn dump_tokens(&self) -> String {
        let mut out = String::new();
        for lexeme in &self.tokens {
            let _ = writeln!(out, "[{}] {}", lexeme.loc.offset, lexeme);
        }
        out
    }

    pub fn dump_tree(&self, ast: &Ast) -> String {
        ast.dump(self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fold::ConstFold;

    fn module(ctx: &mut Context, source: &str) -> Module {
        let id = ctx.sources.add_path("mod.ks");
        ctx.sources.set_text(id, Arc::from(source));
        Module::new(id, PathBuf::from("mod.ks"), Arc::from(source), false)
    }

    #[test]
    fn lifecycle_in_order() {
        let mut ctx = Context::default();
        let mut ast = Ast::new();
        let mut module = module(&mut ctx, "let x: i32 = 1 + 2;");
        assert_eq!(module.state(), ModuleState::Created);

        module.tokenize(&mut ctx).unwrap();
        assert_eq!(module.state(), ModuleState::Tokenized);
        assert_eq!(
            module.dump_tokens(),
            "[0] LET\n[4] IDEN(\"x\")\n[5] COL\n[7] IDEN(\"i32\")\n[11] ASSN\n\
             [13] INT(1)\n[15] ADD\n[17] INT(2)\n[18] COLS\n"
        );

        module.parse_tokens(&mut ctx, &mut ast).unwrap();
        assert_eq!(module.state(), ModuleState::Parsed);
        assert!(module.dump_tree(&ast).contains("value: Expr ADD"));

        let mut passes = PassManager::new();
        passes.add(&mut ctx, ConstFold::new());
        module.execute_passes(&mut ctx, &mut ast, &mut passes, &[]).unwrap();
        assert!(module.dump_tree(&ast).contains("value: Simple INT(3)"));
        assert!(module.imports().is_empty());
    }

    #[test]
    fn lexical_error_is_reported() {
        let mut ctx = Context::default();
        let mut module = module(&mut ctx, "let s = \"open;");
        let err = module.tokenize(&mut ctx).unwrap_err();
        assert!(matches!(err, CoreError::Lex { .. }));
        assert_eq!(ctx.diagnostics.error_count(), 1);
        assert!(ctx.diagnostics.emitted()[0].starts_with("mod.ks (1:8): Error: "));
    }

    #[test]
    fn syntax_error_is_reported() {
        let mut ctx = Context::default();
        let mut ast = Ast::new();
        let mut module = module(&mut ctx, "let x = ;");
        module.tokenize(&mut ctx).unwrap();
        let err = module.parse_tokens(&mut ctx, &mut ast).unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
        assert_eq!(
            ctx.diagnostics.emitted()[0],
            "mod.ks (1:8): Error: expected expression, found ';'\nlet x = ;\n        ^"
        );
    }
}
