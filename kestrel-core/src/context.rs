//! Compilation-wide state threaded through every stage.

use crate::diagnostic::{DEFAULT_MAX_ERRORS, Diagnostic, DiagnosticEngine};
use crate::pass::{Pass, PassId, PassIds};
use crate::span::{ModuleLoc, SourceMap};

/// Owns the module path table, the diagnostic engine and the pass
/// identities for one compilation run.
#[derive(Debug)]
pub struct Context {
    pub sources: SourceMap,
    pub diagnostics: DiagnosticEngine,
    pass_ids: PassIds,
}

impl Default for Context {
    fn default() -> Self {
        Context::new(DEFAULT_MAX_ERRORS)
    }
}

impl Context {
    pub fn new(max_errors: usize) -> Self {
        Context {
            sources: SourceMap::new(),
            diagnostics: DiagnosticEngine::new(max_errors),
            pass_ids: PassIds::default(),
        }
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.diagnostics = self.diagnostics.with_echo(echo);
        self
    }

    pub fn report(&mut self, diag: &Diagnostic) -> bool {
        self.diagnostics.report(&mut self.sources, diag)
    }

    pub fn error(&mut self, loc: ModuleLoc, message: impl Into<String>) -> bool {
        self.report(&Diagnostic::error(loc, message))
    }

    pub fn warning(&mut self, loc: ModuleLoc, message: impl Into<String>) -> bool {
        self.report(&Diagnostic::warning(loc, message))
    }

    /// Identity of pass type `P`, assigned on first request.
    pub fn pass_id<P: Pass>(&mut self) -> PassId {
        self.pass_ids.id_of::<P>()
    }

    /// Identity of `P` if it was ever assigned.
    pub fn existing_pass_id<P: Pass>(&self) -> Option<PassId> {
        self.pass_ids.get::<P>()
    }
}
