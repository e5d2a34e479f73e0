// Heap and garbage collector.
//
// Two free-list arenas, one for expression nodes and one for environment
// frames. Collection is stop-the-world mark-sweep: mark walks an explicit
// worklist through pair fields, closure captures, and frame bindings with
// a per-slot mark bit, so cyclic closure/environment graphs terminate and
// get reclaimed; sweep returns unmarked slots to the free lists and clears
// the bits on survivors. The evaluator never triggers a collection;
// the driver collects between top-level forms.

use serde::Serialize;

use crate::env::EnvFrame;
use crate::expr::{Atom, Expr, Function, NativeFn};
use crate::types::{EnvId, ExprId, SymbolId};

enum Slot<T> {
    Occupied(T),
    Free { next: Option<u32> },
}

/// A GC root: anything still reachable by the host driver.
#[derive(Debug, Clone, Copy)]
pub enum Root {
    Expr(ExprId),
    Env(EnvId),
}

/// Per-collection report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GcReport {
    pub marked: usize,
    pub freed_exprs: usize,
    pub freed_envs: usize,
    pub live_before: usize,
    pub live_after: usize,
}

/// Memory usage snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct HeapStats {
    pub expr_slots: usize,
    pub expr_live: usize,
    pub env_slots: usize,
    pub env_live: usize,
    pub allocs_since_gc: usize,
}

pub struct Heap {
    exprs: Vec<Slot<Expr>>,
    expr_free: Option<u32>,
    expr_marks: Vec<bool>,
    envs: Vec<Slot<EnvFrame>>,
    env_free: Option<u32>,
    env_marks: Vec<bool>,
    allocs_since_gc: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            exprs: Vec::with_capacity(1024),
            expr_free: None,
            expr_marks: Vec::with_capacity(1024),
            envs: Vec::with_capacity(64),
            env_free: None,
            env_marks: Vec::with_capacity(64),
            allocs_since_gc: 0,
        }
    }

    pub fn alloc(&mut self, expr: Expr) -> ExprId {
        self.allocs_since_gc += 1;
        match self.expr_free {
            Some(idx) => {
                let slot = &mut self.exprs[idx as usize];
                let next = match slot {
                    Slot::Free { next } => *next,
                    Slot::Occupied(_) => panic!("corrupt expr free list"),
                };
                self.expr_free = next;
                *slot = Slot::Occupied(expr);
                self.expr_marks[idx as usize] = false;
                ExprId(idx)
            }
            None => {
                let idx = self.exprs.len() as u32;
                self.exprs.push(Slot::Occupied(expr));
                self.expr_marks.push(false);
                ExprId(idx)
            }
        }
    }

    pub fn new_env(&mut self, parent: Option<EnvId>) -> EnvId {
        self.allocs_since_gc += 1;
        let frame = EnvFrame::new(parent);
        match self.env_free {
            Some(idx) => {
                let slot = &mut self.envs[idx as usize];
                let next = match slot {
                    Slot::Free { next } => *next,
                    Slot::Occupied(_) => panic!("corrupt env free list"),
                };
                self.env_free = next;
                *slot = Slot::Occupied(frame);
                self.env_marks[idx as usize] = false;
                EnvId(idx)
            }
            None => {
                let idx = self.envs.len() as u32;
                self.envs.push(Slot::Occupied(frame));
                self.env_marks.push(false);
                EnvId(idx)
            }
        }
    }

    pub fn get(&self, id: ExprId) -> &Expr {
        match &self.exprs[id.0 as usize] {
            Slot::Occupied(expr) => expr,
            Slot::Free { .. } => panic!("access to freed expr node"),
        }
    }

    pub(crate) fn env(&self, id: EnvId) -> &EnvFrame {
        match &self.envs[id.0 as usize] {
            Slot::Occupied(frame) => frame,
            Slot::Free { .. } => panic!("access to freed env frame"),
        }
    }

    pub(crate) fn env_mut(&mut self, id: EnvId) -> &mut EnvFrame {
        match &mut self.envs[id.0 as usize] {
            Slot::Occupied(frame) => frame,
            Slot::Free { .. } => panic!("access to freed env frame"),
        }
    }

    // Constructors.

    pub fn void(&mut self) -> ExprId {
        self.alloc(Expr::Void)
    }

    pub fn nil(&mut self) -> ExprId {
        self.alloc(Expr::Atom(Atom::Nil))
    }

    pub fn boolean(&mut self, b: bool) -> ExprId {
        self.alloc(Expr::Atom(Atom::Boolean(b)))
    }

    pub fn integer(&mut self, n: i64) -> ExprId {
        self.alloc(Expr::Atom(Atom::Integer(n)))
    }

    pub fn real(&mut self, x: f64) -> ExprId {
        self.alloc(Expr::Atom(Atom::Real(x)))
    }

    pub fn symbol(&mut self, sym: SymbolId) -> ExprId {
        self.alloc(Expr::Atom(Atom::Symbol(sym)))
    }

    pub fn string(&mut self, s: impl Into<String>) -> ExprId {
        self.alloc(Expr::Atom(Atom::String(s.into())))
    }

    pub fn error(&mut self, msg: impl Into<String>) -> ExprId {
        self.alloc(Expr::Atom(Atom::Error(msg.into())))
    }

    pub fn native(&mut self, f: NativeFn) -> ExprId {
        self.alloc(Expr::Atom(Atom::Native(f)))
    }

    pub fn lambda(&mut self, params: ExprId, body: ExprId, env: EnvId) -> ExprId {
        self.alloc(Expr::Atom(Atom::Lambda(Function { params, body, env })))
    }

    pub fn macro_(&mut self, params: ExprId, body: ExprId, env: EnvId) -> ExprId {
        self.alloc(Expr::Atom(Atom::Macro(Function { params, body, env })))
    }

    pub fn cons(&mut self, car: ExprId, cdr: ExprId) -> ExprId {
        self.alloc(Expr::Pair(car, cdr))
    }

    /// Build a proper list from a slice of values.
    pub fn list_from(&mut self, items: &[ExprId]) -> ExprId {
        let mut tail = self.nil();
        for &item in items.iter().rev() {
            tail = self.cons(item, tail);
        }
        tail
    }

    // Accessors.

    pub fn pair(&self, id: ExprId) -> Option<(ExprId, ExprId)> {
        match self.get(id) {
            Expr::Pair(car, cdr) => Some((*car, *cdr)),
            _ => None,
        }
    }

    pub fn symbol_of(&self, id: ExprId) -> Option<SymbolId> {
        match self.get(id) {
            Expr::Atom(Atom::Symbol(sym)) => Some(*sym),
            _ => None,
        }
    }

    pub fn is_nil(&self, id: ExprId) -> bool {
        self.get(id).is_nil()
    }

    pub fn is_error(&self, id: ExprId) -> bool {
        self.get(id).is_error()
    }

    pub fn is_truthy(&self, id: ExprId) -> bool {
        self.get(id).is_truthy()
    }

    /// Mutate a pair's cdr in place. The only sanctioned structural
    /// mutation: list-append splicing onto a tail.
    pub fn set_cdr(&mut self, id: ExprId, cdr: ExprId) {
        match &mut self.exprs[id.0 as usize] {
            Slot::Occupied(Expr::Pair(_, tail)) => *tail = cdr,
            _ => panic!("set_cdr on non-pair"),
        }
    }

    // Collection.

    /// Mark everything reachable from the roots. Worklist-based: constant
    /// host stack regardless of list depth, and the mark bits terminate
    /// cycles.
    fn mark(&mut self, roots: &[Root]) -> usize {
        let mut work: Vec<Root> = roots.to_vec();
        let mut marked = 0;
        while let Some(item) = work.pop() {
            match item {
                Root::Expr(id) => {
                    let idx = id.0 as usize;
                    if self.expr_marks[idx] {
                        continue;
                    }
                    let expr = match &self.exprs[idx] {
                        Slot::Occupied(expr) => expr,
                        Slot::Free { .. } => continue,
                    };
                    self.expr_marks[idx] = true;
                    marked += 1;
                    match expr {
                        Expr::Pair(car, cdr) => {
                            work.push(Root::Expr(*car));
                            work.push(Root::Expr(*cdr));
                        }
                        Expr::Atom(Atom::Lambda(f)) | Expr::Atom(Atom::Macro(f)) => {
                            let Function { params, body, env } = *f;
                            work.push(Root::Expr(params));
                            work.push(Root::Expr(body));
                            work.push(Root::Env(env));
                        }
                        _ => {}
                    }
                }
                Root::Env(id) => {
                    let idx = id.0 as usize;
                    if self.env_marks[idx] {
                        continue;
                    }
                    let frame = match &self.envs[idx] {
                        Slot::Occupied(frame) => frame,
                        Slot::Free { .. } => continue,
                    };
                    self.env_marks[idx] = true;
                    marked += 1;
                    for &val in frame.bindings.values() {
                        work.push(Root::Expr(val));
                    }
                    if let Some(parent) = frame.parent {
                        work.push(Root::Env(parent));
                    }
                }
            }
        }
        marked
    }

    /// Free every unmarked slot and clear the bits on survivors.
    fn sweep(&mut self) -> (usize, usize) {
        let mut freed_exprs = 0;
        for idx in 0..self.exprs.len() {
            if matches!(self.exprs[idx], Slot::Occupied(_)) && !self.expr_marks[idx] {
                self.exprs[idx] = Slot::Free {
                    next: self.expr_free,
                };
                self.expr_free = Some(idx as u32);
                freed_exprs += 1;
            }
            self.expr_marks[idx] = false;
        }
        let mut freed_envs = 0;
        for idx in 0..self.envs.len() {
            if matches!(self.envs[idx], Slot::Occupied(_)) && !self.env_marks[idx] {
                self.envs[idx] = Slot::Free { next: self.env_free };
                self.env_free = Some(idx as u32);
                freed_envs += 1;
            }
            self.env_marks[idx] = false;
        }
        (freed_exprs, freed_envs)
    }

    /// Full stop-the-world collection. An empty root set is the teardown
    /// case: everything is reclaimed.
    pub fn collect(&mut self, roots: &[Root]) -> GcReport {
        let live_before = self.live_exprs() + self.live_envs();
        let marked = self.mark(roots);
        let (freed_exprs, freed_envs) = self.sweep();
        self.allocs_since_gc = 0;
        GcReport {
            marked,
            freed_exprs,
            freed_envs,
            live_before,
            live_after: live_before - freed_exprs - freed_envs,
        }
    }

    pub fn live_exprs(&self) -> usize {
        self.exprs
            .iter()
            .filter(|slot| matches!(slot, Slot::Occupied(_)))
            .count()
    }

    pub fn live_envs(&self) -> usize {
        self.envs
            .iter()
            .filter(|slot| matches!(slot, Slot::Occupied(_)))
            .count()
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            expr_slots: self.exprs.len(),
            expr_live: self.live_exprs(),
            env_slots: self.envs.len(),
            env_live: self.live_envs(),
            allocs_since_gc: self.allocs_since_gc,
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
