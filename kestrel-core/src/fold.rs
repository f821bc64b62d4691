//! Integer constant folding.
//!
//! Runs post-order: children are folded before their parent is looked at,
//! so `1 + 2 * 3` collapses in one walk.

use crate::ast::{Ast, StmtId, StmtKind};
use crate::pass::{Pass, PassCx, dispatch, walk_children};
use crate::token::{Lexeme, TokenKind};

#[derive(Debug, Default)]
pub struct ConstFold {
    folded: usize,
}

impl ConstFold {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes replaced so far.
    pub fn folded(&self) -> usize {
        self.folded
    }
}

fn int_literal(ast: &Ast, id: StmtId) -> Option<i64> {
    match &ast[id].kind {
        StmtKind::Simple(simple) if simple.val.kind == TokenKind::Int => simple.val.data_int(),
        _ => None,
    }
}

fn fold_unary(oper: TokenKind, value: i64) -> Option<i64> {
    match oper {
        TokenKind::USub => Some(value.wrapping_neg()),
        TokenKind::UAdd => Some(value),
        TokenKind::BNot => Some(!value),
        _ => None,
    }
}

/// Shift amounts wrap modulo 64.
fn fold_binary(oper: TokenKind, lhs: i64, rhs: i64) -> Option<i64> {
    let value = match oper {
        TokenKind::Add => lhs.wrapping_add(rhs),
        TokenKind::Sub => lhs.wrapping_sub(rhs),
        TokenKind::Mul => lhs.wrapping_mul(rhs),
        TokenKind::Div => lhs.wrapping_div(rhs),
        TokenKind::Mod => lhs.wrapping_rem(rhs),
        TokenKind::BAnd => lhs & rhs,
        TokenKind::BOr => lhs | rhs,
        TokenKind::BXor => lhs ^ rhs,
        TokenKind::LShift => lhs.wrapping_shl(rhs as u32),
        TokenKind::RShift => lhs.wrapping_shr(rhs as u32),
        _ => return None,
    };
    Some(value)
}

impl Pass for ConstFold {
    fn name(&self) -> &'static str {
        "const-fold"
    }

    fn visit(&mut self, cx: &mut PassCx<'_>, slot: &mut Option<StmtId>) -> bool {
        let Some(id) = *slot else {
            return true;
        };
        if !walk_children(self, cx, id) {
            return false;
        }
        dispatch(self, cx, slot)
    }

    fn visit_expr(&mut self, cx: &mut PassCx<'_>, id: StmtId, slot: &mut Option<StmtId>) -> bool {
        let loc = cx.ast[id].loc;
        let StmtKind::Expr(expr) = &cx.ast[id].kind else {
            return true;
        };
        if expr.or_blk.is_some() || expr.is_intrinsic {
            return true;
        }
        let (lhs, rhs) = (expr.lhs, expr.rhs);
        let Some(oper) = expr.oper.clone() else {
            if rhs.is_none() {
                *slot = Some(lhs);
                self.folded += 1;
            }
            return true;
        };

        let Some(left) = int_literal(cx.ast, lhs) else {
            return true;
        };
        let value = match rhs {
            None => fold_unary(oper.kind, left),
            Some(rhs) => {
                let Some(right) = int_literal(cx.ast, rhs) else {
                    return true;
                };
                if right == 0 && matches!(oper.kind, TokenKind::Div | TokenKind::Mod) {
                    let what = if oper.kind == TokenKind::Div {
                        "division"
                    } else {
                        "modulo"
                    };
                    cx.error(oper.loc, format!("{what} by zero in constant expression"));
                    return false;
                }
                fold_binary(oper.kind, left, right)
            }
        };

        if let Some(value) = value {
            *slot = Some(cx.ast.create_simple(loc, Lexeme::int(loc, value)));
            self.folded += 1;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use crate::context::Context;
    use crate::error::CoreError;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::pass::PassManager;
    use crate::span::{ModuleId, ModuleLoc};
    use std::sync::Arc;

    struct Folded {
        ctx: Context,
        ast: Ast,
        root: Option<StmtId>,
        result: Result<(), CoreError>,
        folded: usize,
    }

    fn fold(source: &str) -> Folded {
        let mut ctx = Context::default();
        let module = ctx.sources.add_path("fold.ks");
        ctx.sources.set_text(module, Arc::from(source));
        let mut tokens = tokenize(module, source).expect("tokenize");
        let mut ast = Ast::new();
        let mut root = Some(parse(module, &mut tokens, &mut ast).expect("parse").root);

        let mut manager = PassManager::new();
        manager.add(&mut ctx, ConstFold::new());
        let result = manager.run(&mut ctx, &mut ast, &mut root);
        let folded = manager.get::<ConstFold>(&ctx).map_or(0, ConstFold::folded);
        Folded {
            ctx,
            ast,
            root,
            result,
            folded,
        }
    }

    #[test]
    fn folds_nested_arithmetic() {
        let folded = fold("let x = 1 + 2 * 3 - (8 >> 1);");
        assert!(folded.result.is_ok());
        assert_eq!(folded.folded, 4);
        let dump = folded.ast.dump(folded.root);
        assert!(dump.contains("value: Simple INT(3)"), "{dump}");
        assert!(!dump.contains("Expr"), "{dump}");
    }

    #[test]
    fn folds_unary_operators() {
        let folded = fold("let y = -(4 - 10), z = ~0;");
        let dump = folded.ast.dump(folded.root);
        assert!(dump.contains("value: Simple INT(6)"), "{dump}");
        assert!(dump.contains("value: Simple INT(-1)"), "{dump}");
    }

    #[test]
    fn leaves_non_constant_expressions() {
        let folded = fold("let w = a + 2 * 2;");
        let dump = folded.ast.dump(folded.root);
        assert!(dump.contains("value: Expr ADD"), "{dump}");
        assert!(dump.contains("rhs: Simple INT(4)"), "{dump}");
    }

    #[test]
    fn arithmetic_wraps() {
        let folded = fold("let big = 9223372036854775807 + 1;");
        let dump = folded.ast.dump(folded.root);
        assert!(dump.contains(&format!("INT({})", i64::MIN)), "{dump}");
    }

    #[test]
    fn division_by_zero_aborts() {
        let folded = fold("let q = 1 / 0;");
        assert!(matches!(folded.result, Err(CoreError::Pass { pass: "const-fold" })));
        let emitted = folded.ctx.diagnostics.emitted();
        assert_eq!(emitted.len(), 1);
        assert!(
            emitted[0].starts_with("fold.ks (1:10): Error: division by zero in constant expression"),
            "{}",
            emitted[0]
        );
    }

    #[test]
    fn operator_less_expression_collapses_to_lhs() {
        let mut ctx = Context::default();
        let mut ast = Ast::new();
        let loc = ModuleLoc::new(ModuleId::INVALID, 0);
        let one = ast.create_simple(loc, Lexeme::int(loc, 1));
        let wrapper = ast.create_expr(loc, Expr::new(one, None, None));
        let block = ast.create_block(loc, vec![Some(wrapper)], true);
        let mut root = Some(block);

        let mut manager = PassManager::new();
        manager.add(&mut ctx, ConstFold::new());
        manager.run(&mut ctx, &mut ast, &mut root).unwrap();
        assert_eq!(ast.children(block), vec![Some(one)]);
    }
}
