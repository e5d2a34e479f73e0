// lishp: a small Lisp with closures, macros, quasiquote and a tracing GC.
//
// The pipeline is tokenizer -> parser -> heap-allocated AST, evaluated by a
// trampoline loop against a chain of environment frames. Cons cells and
// environments live in a mark-sweep arena; collection runs between
// top-level forms, never inside the evaluator.

pub mod types;
pub mod symbol;
pub mod expr;
pub mod env;
pub mod heap;
pub mod io;
pub mod tokenizer;
pub mod parser;
pub mod expand;
pub mod printer;
pub mod eval;
pub mod builtins;
pub mod shell;
