// Evaluator.
//
// A single trampoline loop: tail positions (if branches, the last form of
// progn/let/cond/lambda bodies, macro expansions, quasiquote code)
// reassign (expr, env) and continue instead of recursing,
// so mutual tail recursion runs in constant host stack. Errors are
// first-class Error atoms carried as ordinary values; callees decide
// whether to propagate them, and the host never panics on bad programs.

use std::io::Write;

use log::debug;

use crate::builtins;
use crate::expand::expand;
use crate::expr::{Atom, Expr, Function, NativeFn};
use crate::heap::{Heap, Root};
use crate::io::Io;
use crate::parser::parse;
use crate::printer::Printer;
use crate::shell;
use crate::symbol::SymbolTable;
use crate::tokenizer::tokenize;
use crate::types::{EnvId, ExprId, SymbolId};

/// Driver flags for `eval_source`.
pub mod flags {
    pub const NONE: u8 = 0;
    /// Echo each non-void top-level value to `io.out`.
    pub const PRINT_RESULTS: u8 = 1;
    /// Echo values as JSON instead of s-expressions.
    pub const JSON_RESULTS: u8 = 1 << 1;
}

/// Collect between top-level forms once this many nodes piled up.
const GC_ALLOC_THRESHOLD: usize = 50_000;

/// Pre-interned symbols the evaluator dispatches on. `cons` and `append`
/// are not special forms themselves; the quasiquote expander needs their
/// names for the code it generates.
#[derive(Debug, Clone, Copy)]
pub struct SpecialForms {
    pub quote: SymbolId,
    pub quasiquote: SymbolId,
    pub unquote: SymbolId,
    pub unquote_splicing: SymbolId,
    pub define: SymbolId,
    pub lambda: SymbolId,
    pub macro_: SymbolId,
    pub if_: SymbolId,
    pub progn: SymbolId,
    pub let_: SymbolId,
    pub cond: SymbolId,
    pub and_: SymbolId,
    pub or_: SymbolId,
    pub cons: SymbolId,
    pub append: SymbolId,
}

impl SpecialForms {
    pub fn new(symbols: &mut SymbolTable) -> Self {
        Self {
            quote: symbols.intern("quote"),
            quasiquote: symbols.intern("quasiquote"),
            unquote: symbols.intern("unquote"),
            unquote_splicing: symbols.intern("unquote-splicing"),
            define: symbols.intern("define"),
            lambda: symbols.intern("lambda"),
            macro_: symbols.intern("macro"),
            if_: symbols.intern("if"),
            progn: symbols.intern("progn"),
            let_: symbols.intern("let"),
            cond: symbols.intern("cond"),
            and_: symbols.intern("and"),
            or_: symbols.intern("or"),
            cons: symbols.intern("cons"),
            append: symbols.intern("append"),
        }
    }
}

enum Callable {
    Native(NativeFn),
    Lambda(Function),
    Macro(Function),
}

fn callable(heap: &Heap, id: ExprId) -> Option<Callable> {
    match heap.get(id) {
        Expr::Atom(Atom::Native(f)) => Some(Callable::Native(*f)),
        Expr::Atom(Atom::Lambda(f)) => Some(Callable::Lambda(*f)),
        Expr::Atom(Atom::Macro(f)) => Some(Callable::Macro(*f)),
        _ => None,
    }
}

pub struct Interpreter {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub forms: SpecialForms,
    pub root: EnvId,
    /// Set by the `exit` native; the driver stops at the next form boundary.
    pub exit: Option<i32>,
    /// Set by the `gc` native; honored at the next form boundary.
    pub gc_requested: bool,
}

impl Interpreter {
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        let forms = SpecialForms::new(&mut symbols);
        let mut heap = Heap::new();
        let root = heap.new_env(None);
        let mut interp = Self {
            heap,
            symbols,
            forms,
            root,
            exit: None,
            gc_requested: false,
        };
        builtins::register(&mut interp);
        shell::register(&mut interp);
        interp.load_prelude();
        interp
    }

    fn load_prelude(&mut self) {
        let mut io = Io::sink();
        self.eval_source(include_str!("prelude.lisp"), &mut io, flags::NONE);
    }

    /// Bind `name` to a native in the root environment.
    pub fn define_native(&mut self, name: &str, f: NativeFn) {
        let sym = self.symbols.intern(name);
        let val = self.heap.native(f);
        self.heap.define(self.root, sym, val);
    }

    /// Tokenize, parse and evaluate a whole source text against the root
    /// environment. Top-level errors go to `io.err` and are non-fatal.
    /// Collection runs only here, between forms, where the full root set
    /// is known.
    pub fn eval_source(&mut self, source: &str, io: &mut Io, flags: u8) -> ExprId {
        let tokens = tokenize(source);
        let mut program = parse(&tokens, &mut self.heap, &mut self.symbols);
        let mut result = self.heap.void();
        while let Some((form, rest)) = self.heap.pair(program) {
            result = self.eval(form, self.root, io);
            if self.heap.is_error(result) {
                let shown = self.repr(result);
                let _ = writeln!(io.err, "{}", shown);
            } else if flags & self::flags::PRINT_RESULTS != 0 && !self.heap.get(result).is_void() {
                let shown = if flags & self::flags::JSON_RESULTS != 0 {
                    self.to_json(result).to_string()
                } else {
                    self.repr(result)
                };
                let _ = writeln!(io.out, "{}", shown);
            }
            if self.exit.is_some() {
                break;
            }
            program = rest;
            self.maybe_collect(program, result);
        }
        result
    }

    fn maybe_collect(&mut self, program: ExprId, result: ExprId) {
        if !self.gc_requested && self.heap.stats().allocs_since_gc < GC_ALLOC_THRESHOLD {
            return;
        }
        self.gc_requested = false;
        let report = self.heap.collect(&[
            Root::Env(self.root),
            Root::Expr(program),
            Root::Expr(result),
        ]);
        debug!(
            "gc: marked {}, freed {} exprs and {} envs, {} live",
            report.marked, report.freed_exprs, report.freed_envs, report.live_after
        );
    }

    /// Parse `source` and return the top-level forms as a JSON array,
    /// without evaluating anything. Backs the `--json` dump in the binary.
    pub fn ast_json(&mut self, source: &str) -> serde_json::Value {
        let tokens = tokenize(source);
        let mut program = parse(&tokens, &mut self.heap, &mut self.symbols);
        let mut forms = Vec::new();
        while let Some((form, rest)) = self.heap.pair(program) {
            forms.push(self.to_json(form));
            program = rest;
        }
        serde_json::Value::Array(forms)
    }

    /// Evaluate with all output discarded. The convenience entry point for
    /// tests and embedding.
    pub fn run(&mut self, source: &str) -> ExprId {
        let mut io = Io::sink();
        self.eval_source(source, &mut io, flags::NONE)
    }

    pub fn repr(&self, expr: ExprId) -> String {
        Printer::new(&self.heap, &self.symbols).print(expr)
    }

    pub fn display(&self, expr: ExprId) -> String {
        Printer::new(&self.heap, &self.symbols).princ(expr)
    }

    pub fn to_json(&self, expr: ExprId) -> serde_json::Value {
        Printer::new(&self.heap, &self.symbols).to_json(expr)
    }

    /// The trampoline.
    pub fn eval(&mut self, expr: ExprId, env: EnvId, io: &mut Io) -> ExprId {
        let mut expr = expr;
        let mut env = env;
        'trampoline: loop {
            if let Some(sym) = self.heap.symbol_of(expr) {
                return match self.heap.lookup(env, sym) {
                    Some(val) => val,
                    None => {
                        let msg = format!("unbound symbol '{}'", self.symbols.name(sym));
                        self.heap.error(msg)
                    }
                };
            }
            let Some((head, tail)) = self.heap.pair(expr) else {
                // Atoms and void are self-evaluating.
                return expr;
            };

            if let Some(sym) = self.heap.symbol_of(head) {
                let f = self.forms;

                if sym == f.quote {
                    return match self.heap.pair(tail) {
                        Some((arg, _)) => arg,
                        None => self.heap.nil(),
                    };
                }

                if sym == f.quasiquote {
                    let Some((template, _)) = self.heap.pair(tail) else {
                        return self.heap.error("quasiquote needs a template");
                    };
                    let code = expand(&mut self.heap, &f, template);
                    if self.heap.is_error(code) {
                        return code;
                    }
                    expr = code;
                    continue 'trampoline;
                }

                if sym == f.unquote || sym == f.unquote_splicing {
                    return self.heap.error("unquote outside quasiquote");
                }

                if sym == f.define {
                    let Some((name, rest)) = self.heap.pair(tail) else {
                        return self.heap.error("define needs a name");
                    };
                    let Some(name_sym) = self.heap.symbol_of(name) else {
                        return self.heap.error("define name must be a symbol");
                    };
                    let value_form = match self.heap.pair(rest) {
                        Some((v, _)) => v,
                        None => self.heap.nil(),
                    };
                    let value = self.eval(value_form, env, io);
                    if self.heap.is_error(value) {
                        return value;
                    }
                    self.heap.define(env, name_sym, value);
                    return self.heap.void();
                }

                if sym == f.lambda || sym == f.macro_ {
                    let Some((params, body)) = self.heap.pair(tail) else {
                        return self.heap.error("lambda needs a parameter list");
                    };
                    return if sym == f.lambda {
                        self.heap.lambda(params, body, env)
                    } else {
                        self.heap.macro_(params, body, env)
                    };
                }

                if sym == f.if_ {
                    let Some((test, rest)) = self.heap.pair(tail) else {
                        return self.heap.error("if needs a test");
                    };
                    let chosen = self.eval(test, env, io);
                    if self.heap.is_error(chosen) {
                        return chosen;
                    }
                    let Some((then_form, rest)) = self.heap.pair(rest) else {
                        return self.heap.error("if needs a consequent");
                    };
                    if self.heap.is_truthy(chosen) {
                        expr = then_form;
                    } else {
                        match self.heap.pair(rest) {
                            Some((alt, _)) => expr = alt,
                            None => return self.heap.nil(),
                        }
                    }
                    continue 'trampoline;
                }

                if sym == f.progn {
                    match self.eval_body(tail, env, io) {
                        Ok(next) => {
                            expr = next;
                            continue 'trampoline;
                        }
                        Err(val) => return val,
                    }
                }

                if sym == f.let_ {
                    let Some((bindings, body)) = self.heap.pair(tail) else {
                        return self.heap.error("let needs a binding list");
                    };
                    let frame = self.heap.new_env(Some(env));
                    let mut current = bindings;
                    while let Some((binding, rest)) = self.heap.pair(current) {
                        let Some((name, vrest)) = self.heap.pair(binding) else {
                            return self.heap.error("malformed let binding");
                        };
                        let Some(name_sym) = self.heap.symbol_of(name) else {
                            return self.heap.error("let binding name must be a symbol");
                        };
                        let value_form = match self.heap.pair(vrest) {
                            Some((v, _)) => v,
                            None => self.heap.nil(),
                        };
                        // Sequential: later bindings see earlier ones.
                        let value = self.eval(value_form, frame, io);
                        if self.heap.is_error(value) {
                            return value;
                        }
                        self.heap.define(frame, name_sym, value);
                        current = rest;
                    }
                    match self.eval_body(body, frame, io) {
                        Ok(next) => {
                            expr = next;
                            env = frame;
                            continue 'trampoline;
                        }
                        Err(val) => return val,
                    }
                }

                if sym == f.cond {
                    let mut clauses = tail;
                    while let Some((clause, rest)) = self.heap.pair(clauses) {
                        let Some((test, body)) = self.heap.pair(clause) else {
                            return self.heap.error("malformed cond clause");
                        };
                        let val = self.eval(test, env, io);
                        if self.heap.is_error(val) {
                            return val;
                        }
                        if self.heap.is_truthy(val) {
                            if self.heap.pair(body).is_none() {
                                return val;
                            }
                            match self.eval_body(body, env, io) {
                                Ok(next) => {
                                    expr = next;
                                    continue 'trampoline;
                                }
                                Err(v) => return v,
                            }
                        }
                        clauses = rest;
                    }
                    // Exhaustion is an error, never a silent nil.
                    return self.heap.error("cond: no matching clause");
                }

                // and/or coerce to booleans, so no tail position exists.
                if sym == f.and_ {
                    let mut operands = tail;
                    while let Some((form, rest)) = self.heap.pair(operands) {
                        let val = self.eval(form, env, io);
                        if self.heap.is_error(val) {
                            return val;
                        }
                        if !self.heap.is_truthy(val) {
                            return self.heap.boolean(false);
                        }
                        operands = rest;
                    }
                    return self.heap.boolean(true);
                }

                if sym == f.or_ {
                    let mut operands = tail;
                    while let Some((form, rest)) = self.heap.pair(operands) {
                        let val = self.eval(form, env, io);
                        if self.heap.is_error(val) {
                            return val;
                        }
                        if self.heap.is_truthy(val) {
                            return self.heap.boolean(true);
                        }
                        operands = rest;
                    }
                    return self.heap.boolean(false);
                }
            }

            // Application.
            let op = self.eval(head, env, io);
            if self.heap.is_error(op) {
                return op;
            }
            let Some(call) = callable(&self.heap, op) else {
                let shown = self.repr(op);
                return self.heap.error(format!("'{}' is not callable", shown));
            };
            match call {
                Callable::Native(nf) => {
                    let args = self.eval_list(tail, env, io);
                    return nf(self, args, env, io);
                }
                Callable::Lambda(func) => {
                    let args = self.eval_list(tail, env, io);
                    let frame = self.heap.new_env(Some(func.env));
                    if let Some(err) = self.bind_params(frame, func.params, args) {
                        return err;
                    }
                    match self.eval_body(func.body, frame, io) {
                        Ok(next) => {
                            expr = next;
                            env = frame;
                            continue 'trampoline;
                        }
                        Err(val) => return val,
                    }
                }
                Callable::Macro(func) => {
                    // Arguments are bound unevaluated; the body runs in the
                    // definition environment to produce the expansion, which
                    // then tail-continues in the caller's environment.
                    let frame = self.heap.new_env(Some(func.env));
                    if let Some(err) = self.bind_params(frame, func.params, tail) {
                        return err;
                    }
                    let mut expansion = self.heap.nil();
                    let mut body = func.body;
                    while let Some((form, rest)) = self.heap.pair(body) {
                        expansion = self.eval(form, frame, io);
                        if self.heap.is_error(expansion) {
                            return expansion;
                        }
                        body = rest;
                    }
                    expr = expansion;
                    continue 'trampoline;
                }
            }
        }
    }

    /// Evaluate every element of a list, left to right. Errors are ordinary
    /// values here: the callee decides whether to propagate or branch, which
    /// is what lets `error?` observe a failing subexpression.
    pub fn eval_list(&mut self, list: ExprId, env: EnvId, io: &mut Io) -> ExprId {
        let mut items = Vec::new();
        let mut current = list;
        while let Some((head, tail)) = self.heap.pair(current) {
            let val = self.eval(head, env, io);
            items.push(val);
            current = tail;
        }
        self.heap.list_from(&items)
    }

    /// Evaluate all but the last form of a body; the last form comes back
    /// as `Ok` for the trampoline. An empty body or an error comes back as
    /// `Err` with the value to return.
    fn eval_body(&mut self, body: ExprId, env: EnvId, io: &mut Io) -> Result<ExprId, ExprId> {
        let Some((mut current, mut rest)) = self.heap.pair(body) else {
            return Err(self.heap.nil());
        };
        while let Some((next_form, next_rest)) = self.heap.pair(rest) {
            let val = self.eval(current, env, io);
            if self.heap.is_error(val) {
                return Err(val);
            }
            current = next_form;
            rest = next_rest;
        }
        Ok(current)
    }

    /// Bind a parameter list against an argument list in `frame`. A
    /// parameter named `&name` swallows the remaining arguments as a list
    /// bound to `name`. Arity mismatches in either direction come back as
    /// Error values.
    fn bind_params(&mut self, frame: EnvId, params: ExprId, args: ExprId) -> Option<ExprId> {
        let mut params = params;
        let mut args = args;
        loop {
            let Some((param, prest)) = self.heap.pair(params) else {
                if self.heap.pair(args).is_some() {
                    return Some(self.heap.error("too many arguments"));
                }
                return None;
            };
            let Some(sym) = self.heap.symbol_of(param) else {
                return Some(self.heap.error("parameter is not a symbol"));
            };
            let name = self.symbols.name(sym).to_string();
            if let Some(rest_name) = name.strip_prefix('&') {
                let rest_sym = self.symbols.intern(rest_name);
                self.heap.define(frame, rest_sym, args);
                return None;
            }
            match self.heap.pair(args) {
                Some((arg, arest)) => {
                    self.heap.define(frame, sym, arg);
                    params = prest;
                    args = arest;
                }
                None => return Some(self.heap.error("too few arguments")),
            }
        }
    }

    /// Apply an already-evaluated callable to an already-evaluated argument
    /// list. Used by natives like `map` and `filter`.
    pub fn apply(&mut self, op: ExprId, args: ExprId, _env: EnvId, io: &mut Io) -> ExprId {
        match callable(&self.heap, op) {
            Some(Callable::Native(nf)) => nf(self, args, self.root, io),
            Some(Callable::Lambda(func)) => {
                let frame = self.heap.new_env(Some(func.env));
                if let Some(err) = self.bind_params(frame, func.params, args) {
                    return err;
                }
                match self.eval_body(func.body, frame, io) {
                    Ok(last) => self.eval(last, frame, io),
                    Err(val) => val,
                }
            }
            Some(Callable::Macro(_)) => self.heap.error("cannot apply a macro to values"),
            None => {
                let shown = self.repr(op);
                self.heap.error(format!("'{}' is not callable", shown))
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (Interpreter, ExprId) {
        let mut interp = Interpreter::new();
        let result = interp.run(source);
        (interp, result)
    }

    fn run_repr(source: &str) -> String {
        let (interp, result) = run(source);
        interp.repr(result)
    }

    #[test]
    fn test_self_evaluating_atoms() {
        assert_eq!(run_repr("42"), "42");
        assert_eq!(run_repr("2.5"), "2.5");
        assert_eq!(run_repr("\"hi\""), "\"hi\"");
        assert_eq!(run_repr("true"), "true");
        assert_eq!(run_repr("nil"), "nil");
    }

    #[test]
    fn test_quote_returns_syntax() {
        assert_eq!(run_repr("'(1 2 3)"), "(1 2 3)");
        assert_eq!(run_repr("'x"), "x");
    }

    #[test]
    fn test_define_binds_in_root() {
        assert_eq!(run_repr("(define x 5) (+ x 1)"), "6");
    }

    #[test]
    fn test_if_uses_truthiness_policy() {
        // Zero and the empty string are truthy; only nil and false are not.
        assert_eq!(run_repr("(if 0 'yes 'no)"), "yes");
        assert_eq!(run_repr("(if \"\" 'yes 'no)"), "yes");
        assert_eq!(run_repr("(if nil 'yes 'no)"), "no");
        assert_eq!(run_repr("(if false 'yes 'no)"), "no");
    }

    #[test]
    fn test_if_without_alternative() {
        assert_eq!(run_repr("(if false 1)"), "nil");
    }

    #[test]
    fn test_progn_returns_last() {
        assert_eq!(run_repr("(progn 1 2 3)"), "3");
        assert_eq!(run_repr("(progn)"), "nil");
    }

    #[test]
    fn test_let_binds_locally() {
        assert_eq!(run_repr("(define x 1) (let ((x 2)) x)"), "2");
        assert_eq!(run_repr("(define x 1) (let ((x 2)) x) x"), "1");
    }

    #[test]
    fn test_let_bindings_are_sequential() {
        assert_eq!(run_repr("(define x 1) (let ((x 2) (y x)) y)"), "2");
        assert_eq!(run_repr("(let ((a 1) (b (+ a 1)) (c (* b 3))) c)"), "6");
    }

    #[test]
    fn test_define_returns_void() {
        let (interp, result) = run("(define x 5)");
        assert!(interp.heap.get(result).is_void());
    }

    #[test]
    fn test_cond_picks_first_match() {
        assert_eq!(run_repr("(cond (false 1) (true 2) (true 3))"), "2");
    }

    #[test]
    fn test_cond_exhaustion_is_error() {
        let (interp, result) = run("(cond (false 1) (nil 2))");
        assert!(interp.heap.is_error(result));
    }

    #[test]
    fn test_and_or_coerce_and_short_circuit() {
        assert_eq!(run_repr("(and 1 2 3)"), "true");
        assert_eq!(run_repr("(and 1 nil never-evaluated)"), "false");
        assert_eq!(run_repr("(or nil false 7)"), "true");
        assert_eq!(run_repr("(or nil 7 never-evaluated)"), "true");
        assert_eq!(run_repr("(or nil false)"), "false");
        assert_eq!(run_repr("(and)"), "true");
        assert_eq!(run_repr("(or)"), "false");
    }

    #[test]
    fn test_closure_captures_definition_env() {
        let source = "
            (define make-adder (lambda (n) (lambda (x) (+ x n))))
            (define add2 (make-adder 2))
            (define n 100)
            (add2 3)";
        assert_eq!(run_repr(source), "5");
    }

    #[test]
    fn test_deep_tail_recursion() {
        let source = "
            (define loop (lambda (n) (if (= n 0) 'done (loop (- n 1)))))
            (loop 100000)";
        assert_eq!(run_repr(source), "done");
    }

    #[test]
    fn test_mutual_tail_recursion() {
        let source = "
            (define even? (lambda (n) (if (= n 0) true (odd? (- n 1)))))
            (define odd? (lambda (n) (if (= n 0) false (even? (- n 1)))))
            (even? 100000)";
        assert_eq!(run_repr(source), "true");
    }

    #[test]
    fn test_macro_receives_unevaluated_args() {
        let source = "
            (define unless (macro (test body) `(if ,test nil ,body)))
            (unless false 42)";
        assert_eq!(run_repr(source), "42");
    }

    #[test]
    fn test_macro_expansion_runs_in_caller_env() {
        let source = "
            (define m (macro () 'local))
            (define local 7)
            (m)";
        assert_eq!(run_repr(source), "7");
    }

    #[test]
    fn test_quasiquote_splicing() {
        assert_eq!(run_repr("(define xs '(2 3)) `(1 ,@xs 4)"), "(1 2 3 4)");
    }

    #[test]
    fn test_quasiquote_unquote() {
        assert_eq!(run_repr("(define x 5) `(a ,x)"), "(a 5)");
    }

    #[test]
    fn test_arity_mismatch_is_error() {
        let (interp, result) = run("((lambda (a b) a) 1)");
        assert!(interp.heap.is_error(result));
        let (interp, result) = run("((lambda (a) a) 1 2)");
        assert!(interp.heap.is_error(result));
    }

    #[test]
    fn test_rest_parameter() {
        assert_eq!(run_repr("((lambda (a &rest) rest) 1 2 3)"), "(2 3)");
        assert_eq!(run_repr("((lambda (a &rest) rest) 1)"), "nil");
    }

    #[test]
    fn test_unbound_symbol_is_error() {
        let (interp, result) = run("no-such-thing");
        assert!(interp.heap.is_error(result));
    }

    #[test]
    fn test_not_callable_is_error() {
        let (interp, result) = run("(1 2)");
        assert!(interp.heap.is_error(result));
    }

    #[test]
    fn test_error_in_argument_propagates() {
        let (interp, result) = run("(+ 1 (car nil) 2)");
        assert!(interp.heap.is_error(result));
    }

    #[test]
    fn test_toplevel_error_is_not_fatal() {
        // The bad form reports; the next one still runs.
        assert_eq!(run_repr("(car nil) (+ 1 2)"), "3");
    }
}
