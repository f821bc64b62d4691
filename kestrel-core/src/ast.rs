//! Arena-allocated syntax tree.
//!
//! Every node of a compilation lives in one [`Ast`] arena and is referred to
//! by a [`StmtId`]. Nodes are built bottom-up through the `create_*`
//! factories, which only accept ids that are already allocated, so the tree
//! is acyclic by construction. Nothing is ever freed individually; the arena
//! is dropped as a whole with the compiler that owns it.

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::ops::Index;

use la_arena::{Arena, Idx};

use crate::span::ModuleLoc;
use crate::token::{Lexeme, TokenKind};

pub type StmtId = Idx<Stmt>;

/// Compiler directives attached through `@[...]`.
pub type Attrs = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StmtTag {
    Block,
    Type,
    Simple,
    CallArgs,
    Expr,
    Var,
    Signature,
    FnDef,
    VarDecl,
    Cond,
    For,
    OneWord,
}

impl StmtTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StmtTag::Block => "Block",
            StmtTag::Type => "Type",
            StmtTag::Simple => "Simple",
            StmtTag::CallArgs => "CallArgs",
            StmtTag::Expr => "Expr",
            StmtTag::Var => "Var",
            StmtTag::Signature => "Signature",
            StmtTag::FnDef => "FnDef",
            StmtTag::VarDecl => "VarDecl",
            StmtTag::Cond => "Cond",
            StmtTag::For => "For",
            StmtTag::OneWord => "OneWord",
        }
    }
}

impl fmt::Display for StmtTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub loc: ModuleLoc,
    pub attrs: Attrs,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block(Block),
    Type(Type),
    Simple(Simple),
    CallArgs(CallArgs),
    Expr(Expr),
    Var(Var),
    Signature(Signature),
    FnDef(FnDef),
    VarDecl(VarDecl),
    Cond(Cond),
    For(For),
    OneWord(OneWord),
}

/// Statement sequence. `None` entries are source-end markers or statements
/// elided by a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Option<StmtId>>,
    pub is_top_level: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub expr: StmtId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Simple {
    pub val: Lexeme,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallArgs {
    pub args: Vec<StmtId>,
}

/// Unary, binary, call and comma expressions.
///
/// Without an operator the node is a passthrough of `lhs`. Calls use the
/// `FNCALL` operator with a [`CallArgs`] rhs and may carry an `or` block
/// run with `or_var` bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub commas: usize,
    pub lhs: StmtId,
    pub oper: Option<Lexeme>,
    pub rhs: Option<StmtId>,
    pub or_blk: Option<StmtId>,
    pub or_var: Option<Lexeme>,
    pub is_intrinsic: bool,
}

impl Expr {
    pub fn new(lhs: StmtId, oper: Option<Lexeme>, rhs: Option<StmtId>) -> Self {
        Expr {
            commas: 0,
            lhs,
            oper,
            rhs,
            or_blk: None,
            or_var: None,
            is_intrinsic: false,
        }
    }

    pub fn oper_kind(&self) -> Option<TokenKind> {
        self.oper.as_ref().map(|op| op.kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub name: Lexeme,
    pub ty: Option<StmtId>,
    pub value: Option<StmtId>,
}

impl Var {
    pub fn name(&self) -> &str {
        self.name.data_str().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigKind {
    Struct,
    Union,
    Func,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<StmtId>,
    pub ret: Option<StmtId>,
    pub kind: SigKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    pub sig: StmtId,
    pub body: StmtId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub decls: Vec<StmtId>,
}

/// One `if`/`elif`/`else` arm; `else` has no condition.
#[derive(Debug, Clone, PartialEq)]
pub struct CondArm {
    pub cond: Option<StmtId>,
    pub body: StmtId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cond {
    pub arms: Vec<CondArm>,
    pub is_inline: bool,
}

/// `for init; cond; incr { }`. Missing parts make it a while or an endless
/// loop.
#[derive(Debug, Clone, PartialEq)]
pub struct For {
    pub init: Option<StmtId>,
    pub cond: Option<StmtId>,
    pub incr: Option<StmtId>,
    pub body: StmtId,
    pub is_inline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordKind {
    Return,
    Break,
    Continue,
    Defer,
    Goto,
}

impl WordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WordKind::Return => "return",
            WordKind::Break => "break",
            WordKind::Continue => "continue",
            WordKind::Defer => "defer",
            WordKind::Goto => "goto",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneWord {
    pub arg: Option<StmtId>,
    pub kind: WordKind,
}

impl Stmt {
    pub fn tag(&self) -> StmtTag {
        match &self.kind {
            StmtKind::Block(_) => StmtTag::Block,
            StmtKind::Type(_) => StmtTag::Type,
            StmtKind::Simple(_) => StmtTag::Simple,
            StmtKind::CallArgs(_) => StmtTag::CallArgs,
            StmtKind::Expr(_) => StmtTag::Expr,
            StmtKind::Var(_) => StmtTag::Var,
            StmtKind::Signature(_) => StmtTag::Signature,
            StmtKind::FnDef(_) => StmtTag::FnDef,
            StmtKind::VarDecl(_) => StmtTag::VarDecl,
            StmtKind::Cond(_) => StmtTag::Cond,
            StmtKind::For(_) => StmtTag::For,
            StmtKind::OneWord(_) => StmtTag::OneWord,
        }
    }
}

/// Owner of every node of a compilation.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Arena<Stmt>,
}

impl Index<StmtId> for Ast {
    type Output = Stmt;

    fn index(&self, id: StmtId) -> &Stmt {
        &self.nodes[id]
    }
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: StmtId) -> &Stmt {
        &self.nodes[id]
    }

    pub fn get_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.nodes[id]
    }

    fn alloc(&mut self, loc: ModuleLoc, kind: StmtKind) -> StmtId {
        self.nodes.alloc(Stmt {
            loc,
            attrs: Attrs::new(),
            kind,
        })
    }

    pub fn create_block(
        &mut self,
        loc: ModuleLoc,
        stmts: Vec<Option<StmtId>>,
        is_top_level: bool,
    ) -> StmtId {
        self.alloc(loc, StmtKind::Block(Block { stmts, is_top_level }))
    }

    pub fn create_type(&mut self, loc: ModuleLoc, expr: StmtId) -> StmtId {
        self.alloc(loc, StmtKind::Type(Type { expr }))
    }

    pub fn create_simple(&mut self, loc: ModuleLoc, val: Lexeme) -> StmtId {
        self.alloc(loc, StmtKind::Simple(Simple { val }))
    }

    pub fn create_call_args(&mut self, loc: ModuleLoc, args: Vec<StmtId>) -> StmtId {
        self.alloc(loc, StmtKind::CallArgs(CallArgs { args }))
    }

    pub fn create_expr(&mut self, loc: ModuleLoc, expr: Expr) -> StmtId {
        self.alloc(loc, StmtKind::Expr(expr))
    }

    pub fn create_var(
        &mut self,
        loc: ModuleLoc,
        name: Lexeme,
        ty: Option<StmtId>,
        value: Option<StmtId>,
    ) -> StmtId {
        self.alloc(loc, StmtKind::Var(Var { name, ty, value }))
    }

    pub fn create_signature(
        &mut self,
        loc: ModuleLoc,
        params: Vec<StmtId>,
        ret: Option<StmtId>,
        kind: SigKind,
    ) -> StmtId {
        self.alloc(loc, StmtKind::Signature(Signature { params, ret, kind }))
    }

    pub fn create_fn_def(&mut self, loc: ModuleLoc, sig: StmtId, body: StmtId) -> StmtId {
        self.alloc(loc, StmtKind::FnDef(FnDef { sig, body }))
    }

    pub fn create_var_decl(&mut self, loc: ModuleLoc, decls: Vec<StmtId>) -> StmtId {
        self.alloc(loc, StmtKind::VarDecl(VarDecl { decls }))
    }

    pub fn create_cond(&mut self, loc: ModuleLoc, arms: Vec<CondArm>, is_inline: bool) -> StmtId {
        self.alloc(loc, StmtKind::Cond(Cond { arms, is_inline }))
    }

    pub fn create_for(
        &mut self,
        loc: ModuleLoc,
        init: Option<StmtId>,
        cond: Option<StmtId>,
        incr: Option<StmtId>,
        body: StmtId,
        is_inline: bool,
    ) -> StmtId {
        self.alloc(
            loc,
            StmtKind::For(For {
                init,
                cond,
                incr,
                body,
                is_inline,
            }),
        )
    }

    pub fn create_one_word(&mut self, loc: ModuleLoc, arg: Option<StmtId>, kind: WordKind) -> StmtId {
        self.alloc(loc, StmtKind::OneWord(OneWord { arg, kind }))
    }

    pub fn set_attrs(&mut self, id: StmtId, attrs: Attrs) {
        self.nodes[id].attrs = attrs;
    }

    /// True when `id` is a `Type` wrapping the identifier `type`.
    pub fn is_meta_type(&self, id: StmtId) -> bool {
        let StmtKind::Type(ty) = &self[id].kind else {
            return false;
        };
        match &self[ty.expr].kind {
            StmtKind::Simple(simple) => {
                simple.val.kind == TokenKind::Iden && simple.val.data_str() == Some("type")
            }
            _ => false,
        }
    }

    /// Child slots of a node in a fixed order.
    ///
    /// Optional children always occupy their slot (as `None` when absent) so
    /// that slot indices stay stable for [`Ast::replace_child`].
    pub fn children(&self, id: StmtId) -> Vec<Option<StmtId>> {
        match &self[id].kind {
            StmtKind::Block(block) => block.stmts.clone(),
            StmtKind::Type(ty) => vec![Some(ty.expr)],
            StmtKind::Simple(_) => Vec::new(),
            StmtKind::CallArgs(call) => call.args.iter().copied().map(Some).collect(),
            StmtKind::Expr(expr) => vec![Some(expr.lhs), expr.rhs, expr.or_blk],
            StmtKind::Var(var) => vec![var.ty, var.value],
            StmtKind::Signature(sig) => {
                let mut slots: Vec<_> = sig.params.iter().copied().map(Some).collect();
                slots.push(sig.ret);
                slots
            }
            StmtKind::FnDef(def) => vec![Some(def.sig), Some(def.body)],
            StmtKind::VarDecl(decl) => decl.decls.iter().copied().map(Some).collect(),
            StmtKind::Cond(cond) => cond
                .arms
                .iter()
                .flat_map(|arm| [arm.cond, Some(arm.body)])
                .collect(),
            StmtKind::For(f) => vec![f.init, f.cond, f.incr, Some(f.body)],
            StmtKind::OneWord(word) => vec![word.arg],
        }
    }

    /// Stores `new` into child slot `index` of `id`.
    ///
    /// Required slots (and list entries other than block statements) cannot
    /// be emptied; storing `None` there is refused and `false` is returned.
    pub fn replace_child(&mut self, id: StmtId, index: usize, new: Option<StmtId>) -> bool {
        fn required(slot: &mut StmtId, new: Option<StmtId>) -> bool {
            match new {
                Some(new) => {
                    *slot = new;
                    true
                }
                None => false,
            }
        }
        fn optional(slot: &mut Option<StmtId>, new: Option<StmtId>) -> bool {
            *slot = new;
            true
        }

        match &mut self.nodes[id].kind {
            StmtKind::Block(block) => match block.stmts.get_mut(index) {
                Some(slot) => optional(slot, new),
                None => false,
            },
            StmtKind::Type(ty) if index == 0 => required(&mut ty.expr, new),
            StmtKind::CallArgs(call) => match call.args.get_mut(index) {
                Some(slot) => required(slot, new),
                None => false,
            },
            StmtKind::Expr(expr) => match index {
                0 => required(&mut expr.lhs, new),
                1 => optional(&mut expr.rhs, new),
                2 => optional(&mut expr.or_blk, new),
                _ => false,
            },
            StmtKind::Var(var) => match index {
                0 => optional(&mut var.ty, new),
                1 => optional(&mut var.value, new),
                _ => false,
            },
            StmtKind::Signature(sig) => {
                if index == sig.params.len() {
                    optional(&mut sig.ret, new)
                } else {
                    match sig.params.get_mut(index) {
                        Some(slot) => required(slot, new),
                        None => false,
                    }
                }
            }
            StmtKind::FnDef(def) => match index {
                0 => required(&mut def.sig, new),
                1 => required(&mut def.body, new),
                _ => false,
            },
            StmtKind::VarDecl(decl) => match decl.decls.get_mut(index) {
                Some(slot) => required(slot, new),
                None => false,
            },
            StmtKind::Cond(cond) => match cond.arms.get_mut(index / 2) {
                Some(arm) if index % 2 == 0 => optional(&mut arm.cond, new),
                Some(arm) => required(&mut arm.body, new),
                None => false,
            },
            StmtKind::For(f) => match index {
                0 => optional(&mut f.init, new),
                1 => optional(&mut f.cond, new),
                2 => optional(&mut f.incr, new),
                3 => required(&mut f.body, new),
                _ => false,
            },
            StmtKind::OneWord(word) if index == 0 => optional(&mut word.arg, new),
            _ => false,
        }
    }

    /// Renders the tree under `root` as an indented forest.
    pub fn dump(&self, root: Option<StmtId>) -> String {
        let mut out = String::new();
        self.dump_node(&mut out, root, 0, None);
        out
    }

    fn dump_node(&self, out: &mut String, id: Option<StmtId>, depth: usize, role: Option<&str>) {
        let _ = write!(out, "{:width$}", "", width = depth * 2);
        if let Some(role) = role {
            let _ = write!(out, "{role}: ");
        }
        let Some(id) = id else {
            out.push_str("<null>\n");
            return;
        };
        let stmt = &self[id];
        out.push_str(stmt.tag().as_str());
        match &stmt.kind {
            StmtKind::Block(block) if block.is_top_level => out.push_str(" [top]"),
            StmtKind::Simple(simple) => {
                let _ = write!(out, " {}", simple.val);
            }
            StmtKind::Expr(expr) => {
                if let Some(op) = &expr.oper {
                    let _ = write!(out, " {}", op.kind);
                }
                if expr.commas > 0 {
                    let _ = write!(out, " commas={}", expr.commas);
                }
                if expr.is_intrinsic {
                    out.push_str(" [intrinsic]");
                }
                if let Some(var) = &expr.or_var {
                    let _ = write!(out, " or-var={}", var.describe());
                }
            }
            StmtKind::Var(var) => {
                let _ = write!(out, " {}", var.name());
            }
            StmtKind::Signature(sig) => {
                let _ = write!(out, " {:?}", sig.kind);
            }
            StmtKind::Cond(cond) if cond.is_inline => out.push_str(" [inline]"),
            StmtKind::For(f) if f.is_inline => out.push_str(" [inline]"),
            StmtKind::OneWord(word) => {
                let _ = write!(out, " {}", word.kind.as_str());
            }
            _ => {}
        }
        if !stmt.attrs.is_empty() {
            let attrs: Vec<String> = stmt
                .attrs
                .iter()
                .map(|(k, v)| if v.is_empty() { k.clone() } else { format!("{k}={v}") })
                .collect();
            let _ = write!(out, " @[{}]", attrs.join(", "));
        }
        out.push('\n');

        let depth = depth + 1;
        match &stmt.kind {
            StmtKind::Block(block) => {
                for child in &block.stmts {
                    self.dump_node(out, *child, depth, None);
                }
            }
            StmtKind::Type(ty) => self.dump_node(out, Some(ty.expr), depth, None),
            StmtKind::Simple(_) => {}
            StmtKind::CallArgs(call) => {
                for arg in &call.args {
                    self.dump_node(out, Some(*arg), depth, None);
                }
            }
            StmtKind::Expr(expr) => {
                self.dump_node(out, Some(expr.lhs), depth, Some("lhs"));
                if expr.rhs.is_some() {
                    self.dump_node(out, expr.rhs, depth, Some("rhs"));
                }
                if expr.or_blk.is_some() {
                    self.dump_node(out, expr.or_blk, depth, Some("or"));
                }
            }
            StmtKind::Var(var) => {
                if var.ty.is_some() {
                    self.dump_node(out, var.ty, depth, Some("type"));
                }
                if var.value.is_some() {
                    self.dump_node(out, var.value, depth, Some("value"));
                }
            }
            StmtKind::Signature(sig) => {
                for param in &sig.params {
                    self.dump_node(out, Some(*param), depth, Some("param"));
                }
                if sig.ret.is_some() {
                    self.dump_node(out, sig.ret, depth, Some("ret"));
                }
            }
            StmtKind::FnDef(def) => {
                self.dump_node(out, Some(def.sig), depth, Some("sig"));
                self.dump_node(out, Some(def.body), depth, Some("body"));
            }
            StmtKind::VarDecl(decl) => {
                for var in &decl.decls {
                    self.dump_node(out, Some(*var), depth, None);
                }
            }
            StmtKind::Cond(cond) => {
                for arm in &cond.arms {
                    match arm.cond {
                        Some(_) => self.dump_node(out, arm.cond, depth, Some("if")),
                        None => {
                            let _ = writeln!(out, "{:width$}else", "", width = depth * 2);
                        }
                    }
                    self.dump_node(out, Some(arm.body), depth, Some("then"));
                }
            }
            StmtKind::For(f) => {
                for (role, part) in [("init", f.init), ("cond", f.cond), ("incr", f.incr)] {
                    if part.is_some() {
                        self.dump_node(out, part, depth, Some(role));
                    }
                }
                self.dump_node(out, Some(f.body), depth, Some("body"));
            }
            StmtKind::OneWord(word) => {
                if word.arg.is_some() {
                    self.dump_node(out, word.arg, depth, None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::ModuleId;

    fn loc(offset: usize) -> ModuleLoc {
        ModuleLoc::new(ModuleId::INVALID, offset)
    }

    fn iden(ast: &mut Ast, name: &str) -> StmtId {
        ast.create_simple(loc(0), Lexeme::with_str(loc(0), TokenKind::Iden, name))
    }

    #[test]
    fn builds_bottom_up_and_dumps() {
        let mut ast = Ast::new();
        let i32_name = iden(&mut ast, "i32");
        let ty = ast.create_type(loc(7), i32_name);
        let one = ast.create_simple(loc(13), Lexeme::int(loc(13), 1));
        let two = ast.create_simple(loc(17), Lexeme::int(loc(17), 2));
        let sum = ast.create_expr(
            loc(15),
            Expr::new(one, Some(Lexeme::new(loc(15), TokenKind::Add)), Some(two)),
        );
        let var = ast.create_var(loc(4), Lexeme::with_str(loc(4), TokenKind::Iden, "x"), Some(ty), Some(sum));
        let decl = ast.create_var_decl(loc(0), vec![var]);
        let mut attrs = Attrs::new();
        attrs.insert("inline".into(), String::new());
        ast.set_attrs(decl, attrs);
        let root = ast.create_block(loc(0), vec![Some(decl), None], true);

        assert_eq!(ast.len(), 8);
        assert_eq!(
            ast.dump(Some(root)),
            "Block [top]\n\
             \x20 VarDecl @[inline]\n\
             \x20   Var x\n\
             \x20     type: Type\n\
             \x20       Simple IDEN(\"i32\")\n\
             \x20     value: Expr ADD\n\
             \x20       lhs: Simple INT(1)\n\
             \x20       rhs: Simple INT(2)\n\
             \x20 <null>\n"
        );
        assert_eq!(ast.dump(Some(root)), ast.dump(Some(root)));
        assert_eq!(ast.dump(None), "<null>\n");
    }

    #[test]
    fn meta_type_requires_the_type_identifier() {
        let mut ast = Ast::new();
        let name = iden(&mut ast, "type");
        let meta = ast.create_type(loc(0), name);
        let other_name = iden(&mut ast, "i64");
        let plain = ast.create_type(loc(0), other_name);
        assert!(ast.is_meta_type(meta));
        assert!(!ast.is_meta_type(plain));
        assert!(!ast.is_meta_type(name));
    }

    #[test]
    fn children_and_replace_child_share_slot_order() {
        let mut ast = Ast::new();
        let a = iden(&mut ast, "a");
        let b = iden(&mut ast, "b");
        let c = iden(&mut ast, "c");
        let expr = ast.create_expr(loc(0), Expr::new(a, None, Some(b)));
        assert_eq!(ast.children(expr), vec![Some(a), Some(b), None]);

        assert!(ast.replace_child(expr, 1, Some(c)));
        assert!(ast.replace_child(expr, 1, None));
        assert!(!ast.replace_child(expr, 0, None));
        assert!(!ast.replace_child(expr, 7, Some(c)));
        assert_eq!(ast.children(expr), vec![Some(a), None, None]);

        let body = ast.create_block(loc(0), vec![Some(expr)], false);
        let arms = vec![
            CondArm { cond: Some(a), body },
            CondArm { cond: None, body },
        ];
        let cond = ast.create_cond(loc(0), arms, false);
        assert_eq!(ast.children(cond), vec![Some(a), Some(body), None, Some(body)]);
        assert!(ast.replace_child(cond, 0, None));
        assert!(!ast.replace_child(cond, 3, None));
        assert!(ast.replace_child(body, 0, None));
        assert_eq!(ast.children(body), vec![None]);
    }
}
