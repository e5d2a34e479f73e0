// Expression data model.
//
// Every node lives in the heap and is referenced by ExprId. Nil is an
// ordinary atom value, never a missing reference; Pair fields always hold
// a valid id.

use crate::eval::Interpreter;
use crate::io::Io;
use crate::types::{EnvId, ExprId, SymbolId};

/// Native function signature. Arguments arrive pre-evaluated as a proper
/// list; only macros and special forms ever see unevaluated syntax.
pub type NativeFn = fn(&mut Interpreter, ExprId, EnvId, &mut Io) -> ExprId;

/// A lambda or macro: parameter list, body form list, and the environment
/// captured at the definition site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Function {
    pub params: ExprId,
    pub body: ExprId,
    pub env: EnvId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Nil,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Symbol(SymbolId),
    String(String),
    Error(String),
    Native(NativeFn),
    Lambda(Function),
    Macro(Function),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Void,
    Atom(Atom),
    Pair(ExprId, ExprId),
}

impl Expr {
    pub fn is_void(&self) -> bool {
        matches!(self, Expr::Void)
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Expr::Pair(_, _))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Expr::Atom(Atom::Nil))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Expr::Atom(Atom::Error(_)))
    }

    /// Truthiness policy: nil and boolean false are falsy, everything else
    /// (including zero, the empty string, and every pair) is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Expr::Atom(Atom::Nil) | Expr::Atom(Atom::Boolean(false)))
    }
}
