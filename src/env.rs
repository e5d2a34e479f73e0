// Environment frames.
//
// A frame maps symbols to values and links to an optional parent for
// lexical lookup. Frames are heap nodes: closures keep their defining
// frame alive, which is where reference cycles come from. The parent
// chain itself is always acyclic.

use std::collections::HashMap;

use crate::heap::Heap;
use crate::types::{EnvId, ExprId, SymbolId};

#[derive(Debug, Clone, Default)]
pub struct EnvFrame {
    pub(crate) bindings: HashMap<SymbolId, ExprId>,
    pub(crate) parent: Option<EnvId>,
}

impl EnvFrame {
    pub fn new(parent: Option<EnvId>) -> Self {
        Self {
            bindings: HashMap::new(),
            parent,
        }
    }
}

impl Heap {
    /// Insert or overwrite a binding in exactly this frame. Ancestors are
    /// never touched; this is what makes parameter and `let` bindings
    /// shadowing-safe.
    pub fn define(&mut self, env: EnvId, sym: SymbolId, val: ExprId) {
        self.env_mut(env).bindings.insert(sym, val);
    }

    /// Look a symbol up through the frame chain. `None` means the root was
    /// reached without a match; the evaluator turns that into an Error
    /// value, not a host error.
    pub fn lookup(&self, env: EnvId, sym: SymbolId) -> Option<ExprId> {
        let mut current = Some(env);
        while let Some(id) = current {
            let frame = self.env(id);
            if let Some(&val) = frame.bindings.get(&sym) {
                return Some(val);
            }
            current = frame.parent;
        }
        None
    }

    /// Snapshot of a single frame's bindings, for diagnostics.
    pub fn env_bindings(&self, env: EnvId) -> Vec<(SymbolId, ExprId)> {
        let mut out: Vec<_> = self
            .env(env)
            .bindings
            .iter()
            .map(|(&s, &v)| (s, v))
            .collect();
        out.sort_by_key(|(s, _)| s.0);
        out
    }
}
