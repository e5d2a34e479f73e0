// Builtin natives.
//
// Every native takes its arguments pre-evaluated as a proper list and
// returns a single value; failures are Error atoms. Registration binds
// each one in the root environment.

use std::fs;
use std::io::Write;

use crate::eval::Interpreter;
use crate::expr::{Atom, Expr};
use crate::heap::Heap;
use crate::io::Io;
use crate::types::{EnvId, ExprId};

pub fn register(interp: &mut Interpreter) {
    interp.define_native("+", native_add);
    interp.define_native("-", native_sub);
    interp.define_native("*", native_mul);
    interp.define_native("/", native_div);
    interp.define_native("=", native_eq);
    interp.define_native("<", native_lt);
    interp.define_native("<=", native_le);
    interp.define_native(">", native_gt);
    interp.define_native(">=", native_ge);
    interp.define_native("not", native_not);
    interp.define_native("str", native_str);
    interp.define_native("print", native_print);
    interp.define_native("println", native_println);
    interp.define_native("to-json", native_to_json);
    interp.define_native("car", native_car);
    interp.define_native("cdr", native_cdr);
    interp.define_native("cons", native_cons);
    interp.define_native("append", native_append);
    interp.define_native("list", native_list);
    interp.define_native("length", native_length);
    interp.define_native("map", native_map);
    interp.define_native("filter", native_filter);
    interp.define_native("read", native_read);
    interp.define_native("eval", native_eval);
    interp.define_native("read-file", native_read_file);
    interp.define_native("load", native_load);
    interp.define_native("error", native_error);
    interp.define_native("exit", native_exit);
    interp.define_native("null?", native_is_null);
    interp.define_native("number?", native_is_number);
    interp.define_native("string?", native_is_string);
    interp.define_native("error?", native_is_error);
    interp.define_native("pair?", native_is_pair);
    interp.define_native("gc", native_gc);
    interp.define_native("heap-stats", native_heap_stats);
    interp.define_native("env-dump", native_env_dump);
}

fn args_vec(heap: &Heap, list: ExprId) -> Vec<ExprId> {
    let mut out = Vec::new();
    let mut current = list;
    while let Some((head, tail)) = heap.pair(current) {
        out.push(head);
        current = tail;
    }
    out
}

// Numbers.

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Real(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Real(x) => x,
        }
    }
}

fn num(heap: &Heap, id: ExprId) -> Option<Num> {
    match heap.get(id) {
        Expr::Atom(Atom::Integer(n)) => Some(Num::Int(*n)),
        Expr::Atom(Atom::Real(x)) => Some(Num::Real(*x)),
        _ => None,
    }
}

fn number(heap: &mut Heap, n: Num) -> ExprId {
    match n {
        Num::Int(n) => heap.integer(n),
        Num::Real(x) => heap.real(x),
    }
}

fn numeric_args(interp: &mut Interpreter, args: ExprId, op: &str) -> Result<Vec<Num>, ExprId> {
    let items = args_vec(&interp.heap, args);
    let mut nums = Vec::with_capacity(items.len());
    for item in items {
        match num(&interp.heap, item) {
            Some(n) => nums.push(n),
            None => {
                // A failing subexpression propagates unchanged.
                if interp.heap.is_error(item) {
                    return Err(item);
                }
                let shown = interp.repr(item);
                return Err(interp
                    .heap
                    .error(format!("'{}' expects numbers, got {}", op, shown)));
            }
        }
    }
    Ok(nums)
}

fn native_add(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let nums = match numeric_args(interp, args, "+") {
        Ok(nums) => nums,
        Err(e) => return e,
    };
    let mut acc = Num::Int(0);
    for n in nums {
        acc = match (acc, n) {
            (Num::Int(a), Num::Int(b)) => Num::Int(a.wrapping_add(b)),
            (a, b) => Num::Real(a.as_f64() + b.as_f64()),
        };
    }
    number(&mut interp.heap, acc)
}

fn native_sub(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let nums = match numeric_args(interp, args, "-") {
        Ok(nums) => nums,
        Err(e) => return e,
    };
    let Some((&first, rest)) = nums.split_first() else {
        return interp.heap.error("'-' needs at least one argument");
    };
    if rest.is_empty() {
        let negated = match first {
            Num::Int(n) => Num::Int(n.wrapping_neg()),
            Num::Real(x) => Num::Real(-x),
        };
        return number(&mut interp.heap, negated);
    }
    let mut acc = first;
    for &n in rest {
        acc = match (acc, n) {
            (Num::Int(a), Num::Int(b)) => Num::Int(a.wrapping_sub(b)),
            (a, b) => Num::Real(a.as_f64() - b.as_f64()),
        };
    }
    number(&mut interp.heap, acc)
}

fn native_mul(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let nums = match numeric_args(interp, args, "*") {
        Ok(nums) => nums,
        Err(e) => return e,
    };
    let mut acc = Num::Int(1);
    for n in nums {
        acc = match (acc, n) {
            (Num::Int(a), Num::Int(b)) => Num::Int(a.wrapping_mul(b)),
            (a, b) => Num::Real(a.as_f64() * b.as_f64()),
        };
    }
    number(&mut interp.heap, acc)
}

fn native_div(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let nums = match numeric_args(interp, args, "/") {
        Ok(nums) => nums,
        Err(e) => return e,
    };
    let Some((&first, rest)) = nums.split_first() else {
        return interp.heap.error("'/' needs at least one argument");
    };
    if rest.is_empty() {
        return interp.heap.error("'/' needs at least two arguments");
    }
    let mut acc = first;
    for &n in rest {
        acc = match (acc, n) {
            (Num::Int(a), Num::Int(b)) => {
                if b == 0 {
                    return interp.heap.error("division by zero");
                }
                // i64::MIN / -1 overflows; wrap like the other ops.
                Num::Int(a.wrapping_div(b))
            }
            (a, b) => {
                if b.as_f64() == 0.0 {
                    return interp.heap.error("division by zero");
                }
                Num::Real(a.as_f64() / b.as_f64())
            }
        };
    }
    number(&mut interp.heap, acc)
}

// Comparison and equality.

/// Structural equality. Numbers compare by value across Integer/Real;
/// pairs compare element-wise.
fn equal(heap: &Heap, a: ExprId, b: ExprId) -> bool {
    if let (Some(x), Some(y)) = (num(heap, a), num(heap, b)) {
        return x.as_f64() == y.as_f64();
    }
    match (heap.get(a), heap.get(b)) {
        (Expr::Pair(ca, da), Expr::Pair(cb, db)) => {
            let (ca, da, cb, db) = (*ca, *da, *cb, *db);
            equal(heap, ca, cb) && equal(heap, da, db)
        }
        (x, y) => x == y,
    }
}

fn native_eq(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let items = args_vec(&interp.heap, args);
    for pair in items.windows(2) {
        if !equal(&interp.heap, pair[0], pair[1]) {
            return interp.heap.boolean(false);
        }
    }
    interp.heap.boolean(true)
}

fn compare(
    interp: &mut Interpreter,
    args: ExprId,
    op: &str,
    keep: fn(f64, f64) -> bool,
) -> ExprId {
    let nums = match numeric_args(interp, args, op) {
        Ok(nums) => nums,
        Err(e) => return e,
    };
    for pair in nums.windows(2) {
        if !keep(pair[0].as_f64(), pair[1].as_f64()) {
            return interp.heap.boolean(false);
        }
    }
    interp.heap.boolean(true)
}

fn native_lt(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    compare(interp, args, "<", |a, b| a < b)
}

fn native_le(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    compare(interp, args, "<=", |a, b| a <= b)
}

fn native_gt(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    compare(interp, args, ">", |a, b| a > b)
}

fn native_ge(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    compare(interp, args, ">=", |a, b| a >= b)
}

fn native_not(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    match interp.heap.pair(args) {
        Some((arg, _)) => {
            let truthy = interp.heap.is_truthy(arg);
            interp.heap.boolean(!truthy)
        }
        None => interp.heap.error("'not' needs an argument"),
    }
}

// Strings and output.

fn native_str(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let items = args_vec(&interp.heap, args);
    let mut out = String::new();
    for item in items {
        out.push_str(&interp.display(item));
    }
    interp.heap.string(out)
}

fn write_args(interp: &mut Interpreter, args: ExprId, io: &mut Io, newline: bool) -> ExprId {
    let items = args_vec(&interp.heap, args);
    let mut pieces = Vec::with_capacity(items.len());
    for item in items {
        pieces.push(interp.display(item));
    }
    let _ = write!(io.out, "{}", pieces.join(" "));
    if newline {
        let _ = writeln!(io.out);
    }
    let _ = io.out.flush();
    interp.heap.void()
}

fn native_print(interp: &mut Interpreter, args: ExprId, _env: EnvId, io: &mut Io) -> ExprId {
    write_args(interp, args, io, false)
}

fn native_println(interp: &mut Interpreter, args: ExprId, _env: EnvId, io: &mut Io) -> ExprId {
    write_args(interp, args, io, true)
}

fn native_to_json(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    match interp.heap.pair(args) {
        Some((arg, _)) => {
            let text = interp.to_json(arg).to_string();
            interp.heap.string(text)
        }
        None => interp.heap.error("'to-json' needs an argument"),
    }
}

// Lists.

fn native_car(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    match interp.heap.pair(args) {
        Some((arg, _)) => match interp.heap.pair(arg) {
            Some((car, _)) => car,
            None => interp.heap.error("'car' of a non-pair"),
        },
        None => interp.heap.error("'car' needs an argument"),
    }
}

fn native_cdr(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    match interp.heap.pair(args) {
        Some((arg, _)) => match interp.heap.pair(arg) {
            Some((_, cdr)) => cdr,
            None => interp.heap.error("'cdr' of a non-pair"),
        },
        None => interp.heap.error("'cdr' needs an argument"),
    }
}

fn native_cons(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let items = args_vec(&interp.heap, args);
    match items[..] {
        [car, cdr] => interp.heap.cons(car, cdr),
        _ => interp.heap.error("'cons' needs exactly two arguments"),
    }
}

/// Splicing append: each list's last cdr is redirected onto the next
/// argument. The one structural mutation in the system. Every argument is
/// validated before the first splice, so an error leaves the inputs
/// untouched.
fn native_append(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let items = args_vec(&interp.heap, args);
    let mut lists: Vec<(ExprId, ExprId)> = Vec::with_capacity(items.len());
    for item in items {
        if interp.heap.is_error(item) {
            return item;
        }
        if interp.heap.is_nil(item) {
            continue;
        }
        if interp.heap.pair(item).is_none() {
            let shown = interp.repr(item);
            return interp.heap.error(format!("'append' expects lists, got {}", shown));
        }
        // Walk to the last pair.
        let mut current = item;
        loop {
            match interp.heap.pair(current) {
                Some((_, next)) if interp.heap.pair(next).is_some() => current = next,
                Some((_, next)) if interp.heap.is_nil(next) => break,
                _ => {
                    let shown = interp.repr(item);
                    return interp
                        .heap
                        .error(format!("'append' expects proper lists, got {}", shown));
                }
            }
        }
        lists.push((item, current));
    }
    let mut result: Option<ExprId> = None;
    let mut previous_last: Option<ExprId> = None;
    for (list, last) in lists {
        if let Some(tail) = previous_last {
            interp.heap.set_cdr(tail, list);
        } else {
            result = Some(list);
        }
        previous_last = Some(last);
    }
    match result {
        Some(id) => id,
        None => interp.heap.nil(),
    }
}

fn native_list(_interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    args
}

fn native_length(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let Some((arg, _)) = interp.heap.pair(args) else {
        return interp.heap.error("'length' needs an argument");
    };
    if let Expr::Atom(Atom::String(s)) = interp.heap.get(arg) {
        let n = s.chars().count() as i64;
        return interp.heap.integer(n);
    }
    let mut count: i64 = 0;
    let mut current = arg;
    while let Some((_, tail)) = interp.heap.pair(current) {
        count += 1;
        current = tail;
    }
    if interp.heap.is_nil(current) {
        interp.heap.integer(count)
    } else {
        interp.heap.error("'length' of an improper list")
    }
}

fn native_map(interp: &mut Interpreter, args: ExprId, env: EnvId, io: &mut Io) -> ExprId {
    let items = args_vec(&interp.heap, args);
    let &[f, list] = &items[..] else {
        return interp.heap.error("'map' needs a function and a list");
    };
    let elements = args_vec(&interp.heap, list);
    let mut mapped = Vec::with_capacity(elements.len());
    for element in elements {
        let call_args = interp.heap.list_from(&[element]);
        let val = interp.apply(f, call_args, env, io);
        if interp.heap.is_error(val) {
            return val;
        }
        mapped.push(val);
    }
    interp.heap.list_from(&mapped)
}

fn native_filter(interp: &mut Interpreter, args: ExprId, env: EnvId, io: &mut Io) -> ExprId {
    let items = args_vec(&interp.heap, args);
    let &[f, list] = &items[..] else {
        return interp.heap.error("'filter' needs a function and a list");
    };
    let elements = args_vec(&interp.heap, list);
    let mut kept = Vec::new();
    for element in elements {
        let call_args = interp.heap.list_from(&[element]);
        let val = interp.apply(f, call_args, env, io);
        if interp.heap.is_error(val) {
            return val;
        }
        if interp.heap.is_truthy(val) {
            kept.push(element);
        }
    }
    interp.heap.list_from(&kept)
}

// Source handling.

/// Parse a source string into a single runnable form: the parsed
/// top-level forms wrapped in `progn`, so `(eval (read ...))` runs a
/// whole file.
fn native_read(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let Some((arg, _)) = interp.heap.pair(args) else {
        return interp.heap.error("'read' needs a string");
    };
    let Expr::Atom(Atom::String(source)) = interp.heap.get(arg) else {
        return interp.heap.error("'read' needs a string");
    };
    let tokens = crate::tokenizer::tokenize(&source.clone());
    let forms = crate::parser::parse(&tokens, &mut interp.heap, &mut interp.symbols);
    if let Some((first, _)) = interp.heap.pair(forms) {
        if interp.heap.is_error(first) {
            return first;
        }
    }
    let progn = interp.heap.symbol(interp.forms.progn);
    interp.heap.cons(progn, forms)
}

fn native_eval(interp: &mut Interpreter, args: ExprId, env: EnvId, io: &mut Io) -> ExprId {
    match interp.heap.pair(args) {
        Some((arg, _)) => interp.eval(arg, env, io),
        None => interp.heap.error("'eval' needs an argument"),
    }
}

fn native_read_file(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let Some((arg, _)) = interp.heap.pair(args) else {
        return interp.heap.error("'read-file' needs a path");
    };
    let Expr::Atom(Atom::String(path)) = interp.heap.get(arg) else {
        return interp.heap.error("'read-file' needs a path string");
    };
    match fs::read_to_string(path) {
        Ok(text) => interp.heap.string(text),
        Err(e) => {
            let path = path.clone();
            interp.heap.error(format!("cannot read '{}': {}", path, e))
        }
    }
}

/// Read a file and evaluate its forms against the root environment.
/// Unlike the top-level driver this never collects: a load may run deep
/// inside an evaluation whose frames are not rooted.
fn native_load(interp: &mut Interpreter, args: ExprId, _env: EnvId, io: &mut Io) -> ExprId {
    let Some((arg, _)) = interp.heap.pair(args) else {
        return interp.heap.error("'load' needs a path");
    };
    let Expr::Atom(Atom::String(path)) = interp.heap.get(arg) else {
        return interp.heap.error("'load' needs a path string");
    };
    let source = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            let path = path.clone();
            return interp.heap.error(format!("cannot load '{}': {}", path, e));
        }
    };
    let tokens = crate::tokenizer::tokenize(&source);
    let mut program = crate::parser::parse(&tokens, &mut interp.heap, &mut interp.symbols);
    let mut result = interp.heap.nil();
    while let Some((form, rest)) = interp.heap.pair(program) {
        result = interp.eval(form, interp.root, io);
        if interp.heap.is_error(result) {
            return result;
        }
        program = rest;
    }
    result
}

fn native_error(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let items = args_vec(&interp.heap, args);
    let mut msg = String::new();
    for item in items {
        msg.push_str(&interp.display(item));
    }
    interp.heap.error(msg)
}

fn native_exit(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let code = match interp.heap.pair(args) {
        Some((arg, _)) => match interp.heap.get(arg) {
            Expr::Atom(Atom::Integer(n)) => *n as i32,
            _ => 0,
        },
        None => 0,
    };
    interp.exit = Some(code);
    interp.heap.void()
}

// Predicates.

fn predicate(
    interp: &mut Interpreter,
    args: ExprId,
    name: &str,
    test: fn(&Expr) -> bool,
) -> ExprId {
    match interp.heap.pair(args) {
        Some((arg, _)) => {
            let holds = test(interp.heap.get(arg));
            interp.heap.boolean(holds)
        }
        None => interp.heap.error(format!("'{}' needs an argument", name)),
    }
}

fn native_is_null(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    predicate(interp, args, "null?", Expr::is_nil)
}

fn native_is_number(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    predicate(interp, args, "number?", |e| {
        matches!(e, Expr::Atom(Atom::Integer(_)) | Expr::Atom(Atom::Real(_)))
    })
}

fn native_is_string(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    predicate(interp, args, "string?", |e| {
        matches!(e, Expr::Atom(Atom::String(_)))
    })
}

fn native_is_error(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    predicate(interp, args, "error?", Expr::is_error)
}

fn native_is_pair(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    predicate(interp, args, "pair?", Expr::is_pair)
}

// Memory.

/// Request a collection. The actual collection runs at the next
/// top-level form boundary, where the driver knows the full root set.
fn native_gc(interp: &mut Interpreter, _args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    interp.gc_requested = true;
    interp.heap.void()
}

fn native_heap_stats(interp: &mut Interpreter, _args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let stats = interp.heap.stats();
    match serde_json::to_string(&stats) {
        Ok(text) => interp.heap.string(text),
        Err(e) => interp.heap.error(e.to_string()),
    }
}

/// JSON snapshot of the calling scope's own bindings (not ancestors).
fn native_env_dump(interp: &mut Interpreter, _args: ExprId, env: EnvId, _io: &mut Io) -> ExprId {
    let mut map = serde_json::Map::new();
    for (sym, val) in interp.heap.env_bindings(env) {
        let name = interp.symbols.name(sym).to_string();
        map.insert(name, interp.to_json(val));
    }
    let text = serde_json::Value::Object(map).to_string();
    interp.heap.string(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_repr(source: &str) -> String {
        let mut interp = Interpreter::new();
        let result = interp.run(source);
        interp.repr(result)
    }

    fn is_error(source: &str) -> bool {
        let mut interp = Interpreter::new();
        let result = interp.run(source);
        interp.heap.is_error(result)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run_repr("(+ 1 2 3)"), "6");
        assert_eq!(run_repr("(- 10 3 2)"), "5");
        assert_eq!(run_repr("(- 4)"), "-4");
        assert_eq!(run_repr("(* 2 3 4)"), "24");
        assert_eq!(run_repr("(/ 7 2)"), "3");
        assert_eq!(run_repr("(/ 7.0 2)"), "3.5");
    }

    #[test]
    fn test_extreme_integer_arithmetic_wraps() {
        // i64::MIN has no positive counterpart; negation and /-1 wrap
        // instead of aborting the host.
        assert_eq!(run_repr("(- -9223372036854775808)"), "-9223372036854775808");
        assert_eq!(
            run_repr("(/ -9223372036854775808 -1)"),
            "-9223372036854775808"
        );
    }

    #[test]
    fn test_integer_real_coercion() {
        assert_eq!(run_repr("(+ 1 2.5)"), "3.5");
        assert_eq!(run_repr("(= 2 2.0)"), "true");
    }

    #[test]
    fn test_division_by_zero_is_error() {
        assert!(is_error("(/ 1 0)"));
        assert!(is_error("(/ 1.0 0.0)"));
    }

    #[test]
    fn test_comparisons_chain() {
        assert_eq!(run_repr("(< 1 2 3)"), "true");
        assert_eq!(run_repr("(< 1 3 2)"), "false");
        assert_eq!(run_repr("(>= 3 3 2)"), "true");
    }

    #[test]
    fn test_equality_is_structural() {
        assert_eq!(run_repr("(= '(1 (2 3)) '(1 (2 3)))"), "true");
        assert_eq!(run_repr("(= '(1 2) '(1 3))"), "false");
        assert_eq!(run_repr("(= \"a\" \"a\")"), "true");
    }

    #[test]
    fn test_cons_car_cdr_laws() {
        assert_eq!(run_repr("(car (cons 1 2))"), "1");
        assert_eq!(run_repr("(cdr (cons 1 2))"), "2");
        assert_eq!(run_repr("(car '(1 2 3))"), "1");
        assert_eq!(run_repr("(cdr '(1 2 3))"), "(2 3)");
    }

    #[test]
    fn test_car_of_nil_is_error() {
        assert!(is_error("(car nil)"));
        assert!(is_error("(cdr nil)"));
    }

    #[test]
    fn test_list_and_length() {
        assert_eq!(run_repr("(list 1 2 3)"), "(1 2 3)");
        assert_eq!(run_repr("(length '(1 2 3))"), "3");
        assert_eq!(run_repr("(length nil)"), "0");
        assert_eq!(run_repr("(length \"hello\")"), "5");
    }

    #[test]
    fn test_append_splices() {
        assert_eq!(run_repr("(append '(1 2) '(3 4) '(5))"), "(1 2 3 4 5)");
        assert_eq!(run_repr("(append nil '(1))"), "(1)");
        assert_eq!(run_repr("(append)"), "nil");
    }

    #[test]
    fn test_append_rejects_bad_args_without_mutating() {
        assert!(is_error("(append '(1 2) 3)"));
        assert!(is_error("(append '(1 . 2) '(3))"));
        // A later bad argument must leave the earlier lists untouched.
        assert_eq!(
            run_repr("(define xs '(1 2)) (if (error? (append xs '(3) 4)) xs 'mutated)"),
            "(1 2)"
        );
    }

    #[test]
    fn test_error_arguments_reach_the_callee() {
        // Failing subexpressions are ordinary values; error? branches on
        // them and arithmetic passes the original through.
        assert_eq!(run_repr("(error? (car nil))"), "true");
        assert_eq!(run_repr("(if (error? (/ 1 0)) 'caught 'fine)"), "caught");
        assert_eq!(run_repr("(+ 1 (error \"boom\"))"), "(error \"boom\")");
    }

    #[test]
    fn test_map_and_filter() {
        assert_eq!(run_repr("(map (lambda (x) (* x x)) '(1 2 3))"), "(1 4 9)");
        assert_eq!(run_repr("(filter (lambda (x) (> x 1)) '(0 1 2 3))"), "(2 3)");
        assert_eq!(run_repr("(map not '(true false))"), "(false true)");
    }

    #[test]
    fn test_str_concatenates_display_forms() {
        assert_eq!(run_repr("(str \"n=\" 42)"), "\"n=42\"");
    }

    #[test]
    fn test_print_goes_to_out() {
        use crate::io::Io;
        let mut interp = Interpreter::new();
        let (mut io, out, _err) = Io::capture();
        interp.eval_source("(println \"a\" 1) (print 'b)", &mut io, 0);
        assert_eq!(out.contents(), "a 1\nb");
    }

    #[test]
    fn test_read_eval_round_trip() {
        assert_eq!(run_repr("(eval (read \"(+ 1 2) (+ 3 4)\"))"), "7");
    }

    #[test]
    fn test_to_json() {
        assert_eq!(run_repr("(to-json '(1 \"a\" nil))"), "\"[1,\\\"a\\\",null]\"");
    }

    #[test]
    fn test_error_native_builds_error() {
        assert!(is_error("(error \"boom \" 42)"));
        assert_eq!(run_repr("(error? (error \"boom\"))"), "true");
    }

    #[test]
    fn test_predicates() {
        assert_eq!(run_repr("(null? nil)"), "true");
        assert_eq!(run_repr("(null? '(1))"), "false");
        assert_eq!(run_repr("(number? 2.5)"), "true");
        assert_eq!(run_repr("(string? \"s\")"), "true");
        assert_eq!(run_repr("(pair? '(1))"), "true");
        assert_eq!(run_repr("(pair? nil)"), "false");
    }

    #[test]
    fn test_exit_stops_the_driver() {
        let mut interp = Interpreter::new();
        interp.run("(exit 3) (define after 1)");
        assert_eq!(interp.exit, Some(3));
        let after = interp.symbols.intern("after");
        assert_eq!(interp.heap.lookup(interp.root, after), None);
    }

    #[test]
    fn test_env_dump_shows_local_bindings() {
        let mut interp = Interpreter::new();
        let result = interp.run("(define probe (lambda (x) (env-dump))) (probe 7)");
        let text = interp.display(result);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value.get("x"), Some(&serde_json::json!(7)));
    }

    #[test]
    fn test_heap_stats_is_json() {
        let mut interp = Interpreter::new();
        let result = interp.run("(heap-stats)");
        let text = interp.display(result);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("expr_live").is_some());
    }
}
