//! Lowering to the backend IR (placeholder).
//!
//! No backend exists yet. The pass only takes stock of the combined tree so
//! the whole-program pipeline has a stage to run; it never recurses below the
//! top-level block.

use crate::ast::{StmtId, StmtKind};
use crate::pass::{Pass, PassCx};

#[derive(Debug, Default)]
pub struct IrGen {
    declarations: usize,
}

impl IrGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level declarations that would be lowered.
    pub fn declarations(&self) -> usize {
        self.declarations
    }
}

impl Pass for IrGen {
    fn name(&self) -> &'static str {
        "irgen"
    }

    fn visit_block(&mut self, cx: &mut PassCx<'_>, id: StmtId, _slot: &mut Option<StmtId>) -> bool {
        if let StmtKind::Block(block) = &cx.ast[id].kind {
            self.declarations = block.stmts.iter().flatten().count();
        }
        true
    }
}
