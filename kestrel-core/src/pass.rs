//! Tree passes and the short-circuiting pass manager.
//!
//! A [`Pass`] has one `visit_*` hook per node kind. Each hook receives the
//! node id and the slot that refers to it; writing a different id into the
//! slot replaces the node, writing `None` elides it. Returning `false` aborts
//! the whole pipeline.
//!
//! The framework never recurses on its own. A pass that wants to see
//! children calls [`walk_children`] from its hooks (or from `visit`), which
//! makes pre-order, post-order or no traversal a per-pass choice.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::ast::{Ast, StmtId, StmtTag};
use crate::context::Context;
use crate::error::CoreError;
use crate::span::ModuleLoc;

/// Identity shared by every instance of one pass type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(u32);

impl PassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Hands out [`PassId`]s in first-request order.
#[derive(Debug, Default)]
pub struct PassIds {
    ids: HashMap<TypeId, PassId>,
}

impl PassIds {
    pub fn id_of<P: Pass>(&mut self) -> PassId {
        let next = PassId(self.ids.len() as u32);
        *self.ids.entry(TypeId::of::<P>()).or_insert(next)
    }

    pub fn get<P: Pass>(&self) -> Option<PassId> {
        self.ids.get(&TypeId::of::<P>()).copied()
    }
}

pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What a pass sees while it runs.
pub struct PassCx<'a> {
    pub ctx: &'a mut Context,
    pub ast: &'a mut Ast,
    manager: &'a PassManager,
    peers: &'a [&'a PassManager],
}

impl PassCx<'_> {
    /// Another registered pass of type `P`, searched in the running manager
    /// first and then in its peers. The pass that is currently running is
    /// not visible to itself.
    pub fn lookup<P: Pass>(&self) -> Option<&P> {
        let ctx = &*self.ctx;
        self.manager
            .get::<P>(ctx)
            .or_else(|| self.peers.iter().find_map(|peer| peer.get::<P>(ctx)))
    }

    pub fn error(&mut self, loc: ModuleLoc, message: impl Into<String>) -> bool {
        self.ctx.error(loc, message)
    }

    pub fn warning(&mut self, loc: ModuleLoc, message: impl Into<String>) -> bool {
        self.ctx.warning(loc, message)
    }
}

pub trait Pass: AsAny {
    fn name(&self) -> &'static str;

    /// Entry point for one slot; dispatches on the node kind by default.
    fn visit(&mut self, cx: &mut PassCx<'_>, slot: &mut Option<StmtId>) -> bool {
        dispatch(self, cx, slot)
    }

    fn visit_block(&mut self, _cx: &mut PassCx<'_>, _id: StmtId, _slot: &mut Option<StmtId>) -> bool {
        true
    }

    fn visit_type(&mut self, _cx: &mut PassCx<'_>, _id: StmtId, _slot: &mut Option<StmtId>) -> bool {
        true
    }

    fn visit_simple(&mut self, _cx: &mut PassCx<'_>, _id: StmtId, _slot: &mut Option<StmtId>) -> bool {
        true
    }

    fn visit_call_args(
        &mut self,
        _cx: &mut PassCx<'_>,
        _id: StmtId,
        _slot: &mut Option<StmtId>,
    ) -> bool {
        true
    }

    fn visit_expr(&mut self, _cx: &mut PassCx<'_>, _id: StmtId, _slot: &mut Option<StmtId>) -> bool {
        true
    }

    fn visit_var(&mut self, _cx: &mut PassCx<'_>, _id: StmtId, _slot: &mut Option<StmtId>) -> bool {
        true
    }

    fn visit_signature(
        &mut self,
        _cx: &mut PassCx<'_>,
        _id: StmtId,
        _slot: &mut Option<StmtId>,
    ) -> bool {
        true
    }

    fn visit_fn_def(&mut self, _cx: &mut PassCx<'_>, _id: StmtId, _slot: &mut Option<StmtId>) -> bool {
        true
    }

    fn visit_var_decl(
        &mut self,
        _cx: &mut PassCx<'_>,
        _id: StmtId,
        _slot: &mut Option<StmtId>,
    ) -> bool {
        true
    }

    fn visit_cond(&mut self, _cx: &mut PassCx<'_>, _id: StmtId, _slot: &mut Option<StmtId>) -> bool {
        true
    }

    fn visit_for(&mut self, _cx: &mut PassCx<'_>, _id: StmtId, _slot: &mut Option<StmtId>) -> bool {
        true
    }

    fn visit_one_word(
        &mut self,
        _cx: &mut PassCx<'_>,
        _id: StmtId,
        _slot: &mut Option<StmtId>,
    ) -> bool {
        true
    }
}

/// Calls the hook matching the kind of the node in `slot`. Empty slots are
/// skipped.
pub fn dispatch<P: Pass + ?Sized>(
    pass: &mut P,
    cx: &mut PassCx<'_>,
    slot: &mut Option<StmtId>,
) -> bool {
    let Some(id) = *slot else {
        return true;
    };
    match cx.ast[id].tag() {
        StmtTag::Block => pass.visit_block(cx, id, slot),
        StmtTag::Type => pass.visit_type(cx, id, slot),
        StmtTag::Simple => pass.visit_simple(cx, id, slot),
        StmtTag::CallArgs => pass.visit_call_args(cx, id, slot),
        StmtTag::Expr => pass.visit_expr(cx, id, slot),
        StmtTag::Var => pass.visit_var(cx, id, slot),
        StmtTag::Signature => pass.visit_signature(cx, id, slot),
        StmtTag::FnDef => pass.visit_fn_def(cx, id, slot),
        StmtTag::VarDecl => pass.visit_var_decl(cx, id, slot),
        StmtTag::Cond => pass.visit_cond(cx, id, slot),
        StmtTag::For => pass.visit_for(cx, id, slot),
        StmtTag::OneWord => pass.visit_one_word(cx, id, slot),
    }
}

/// Runs `pass.visit` on every child slot of `id`, storing replacements back
/// into the parent.
pub fn walk_children<P: Pass + ?Sized>(pass: &mut P, cx: &mut PassCx<'_>, id: StmtId) -> bool {
    for (index, child) in cx.ast.children(id).into_iter().enumerate() {
        if child.is_none() {
            continue;
        }
        let mut slot = child;
        let keep_going = pass.visit(cx, &mut slot);
        if slot != child && !cx.ast.replace_child(id, index, slot) {
            warn!(
                pass = pass.name(),
                parent = ?cx.ast[id].tag(),
                index,
                "required child cannot be removed; keeping it"
            );
        }
        if !keep_going {
            return false;
        }
    }
    true
}

/// Ordered passes plus a by-type registry of the active instances.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Option<Box<dyn Pass>>>,
    lookup: HashMap<PassId, usize>,
}

impl fmt::Debug for PassManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassManager")
            .field("passes", &self.names())
            .finish()
    }
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Appends `pass` to the run order and makes it the registered instance
    /// of its type, replacing any earlier instance in the registry.
    pub fn add<P: Pass>(&mut self, ctx: &mut Context, pass: P) -> PassId {
        let id = ctx.pass_id::<P>();
        let name = pass.name();
        let index = self.passes.len();
        self.passes.push(Some(Box::new(pass)));
        if let Some(previous) = self.lookup.insert(id, index) {
            debug!(pass = name, previous, index, "registry entry replaced");
        }
        id
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().flatten().map(|pass| pass.name()).collect()
    }

    pub fn get<P: Pass>(&self, ctx: &Context) -> Option<&P> {
        let id = ctx.existing_pass_id::<P>()?;
        let pass = self.passes.get(*self.lookup.get(&id)?)?.as_deref()?;
        <dyn Pass as AsAny>::as_any(pass).downcast_ref::<P>()
    }

    pub fn get_mut<P: Pass>(&mut self, ctx: &Context) -> Option<&mut P> {
        let id = ctx.existing_pass_id::<P>()?;
        let pass = self.passes.get_mut(*self.lookup.get(&id)?)?.as_deref_mut()?;
        <dyn Pass as AsAny>::as_any_mut(pass).downcast_mut::<P>()
    }

    /// Runs every pass over `root` in order, stopping at the first one that
    /// returns `false`.
    pub fn run(
        &mut self,
        ctx: &mut Context,
        ast: &mut Ast,
        root: &mut Option<StmtId>,
    ) -> Result<(), CoreError> {
        self.run_with_peers(ctx, ast, root, &[])
    }

    /// Like [`PassManager::run`], with the passes registered in `peers`
    /// also reachable through [`PassCx::lookup`].
    pub fn run_with_peers(
        &mut self,
        ctx: &mut Context,
        ast: &mut Ast,
        root: &mut Option<StmtId>,
        peers: &[&PassManager],
    ) -> Result<(), CoreError> {
        for index in 0..self.passes.len() {
            let Some(mut pass) = self.passes[index].take() else {
                continue;
            };
            let name = pass.name();
            let keep_going = {
                let mut cx = PassCx {
                    ctx: &mut *ctx,
                    ast: &mut *ast,
                    manager: &*self,
                    peers,
                };
                pass.visit(&mut cx, root)
            };
            self.passes[index] = Some(pass);
            if !keep_going {
                debug!(pass = name, "pass aborted the pipeline");
                return Err(CoreError::Pass { pass: name });
            }
            debug!(pass = name, "pass finished");
        }
        Ok(())
    }
}
