// End-to-end tests driving whole programs through the interpreter.

use std::fs;

use lishp::eval::{flags, Interpreter};
use lishp::io::Io;

fn run_repr(source: &str) -> String {
    let mut interp = Interpreter::new();
    let result = interp.run(source);
    interp.repr(result)
}

#[test]
fn test_recursive_factorial() {
    let source = "
        (define fact (lambda (n) (if (<= n 1) 1 (* n (fact (- n 1))))))
        (fact 10)";
    assert_eq!(run_repr(source), "3628800");
}

#[test]
fn test_accumulator_tail_recursion() {
    let source = "
        (define sum-to
          (lambda (n acc)
            (if (= n 0) acc (sum-to (- n 1) (+ acc n)))))
        (sum-to 100000 0)";
    assert_eq!(run_repr(source), "5000050000");
}

#[test]
fn test_prelude_reduce_and_reverse() {
    assert_eq!(run_repr("(reduce + 0 '(1 2 3 4))"), "10");
    assert_eq!(run_repr("(reverse '(1 2 3))"), "(3 2 1)");
}

#[test]
fn test_higher_order_pipeline() {
    let source = "
        (reduce + 0 (map (lambda (x) (* x x)) (filter (lambda (x) (> x 0)) '(-2 1 2 3))))";
    assert_eq!(run_repr(source), "14");
}

#[test]
fn test_macro_that_defines() {
    // The expansion runs in the caller's environment, so the define lands
    // at top level.
    let source = "
        (define defvar (macro (name value) `(define ,name ,value)))
        (defvar answer 42)
        answer";
    assert_eq!(run_repr(source), "42");
}

#[test]
fn test_macro_with_rest_parameters() {
    let source = "
        (define when (macro (test &body) `(if ,test (progn ,@body) nil)))
        (when true 1 2 3)";
    assert_eq!(run_repr(source), "3");
}

#[test]
fn test_quasiquote_builds_code() {
    let source = "
        (define make-inc (lambda (n) (eval `(lambda (x) (+ x ,n)))))
        ((make-inc 5) 2)";
    assert_eq!(run_repr(source), "7");
}

#[test]
fn test_output_goes_to_out_channel() {
    let mut interp = Interpreter::new();
    let (mut io, out, err) = Io::capture();
    interp.eval_source("(println \"value:\" (+ 1 2))", &mut io, flags::NONE);
    assert_eq!(out.contents(), "value: 3\n");
    assert_eq!(err.contents(), "");
}

#[test]
fn test_toplevel_error_reports_and_continues() {
    let mut interp = Interpreter::new();
    let (mut io, _out, err) = Io::capture();
    let result = interp.eval_source("(no-such-function 1) (define x 2) x", &mut io, flags::NONE);
    assert_eq!(interp.repr(result), "2");
    assert!(err.contents().contains("unbound symbol"));
}

#[test]
fn test_json_results_flag() {
    let mut interp = Interpreter::new();
    let (mut io, out, _err) = Io::capture();
    interp.eval_source(
        "(list 1 \"a\" nil)",
        &mut io,
        flags::PRINT_RESULTS | flags::JSON_RESULTS,
    );
    assert_eq!(out.contents(), "[1,\"a\",null]\n");
}

#[test]
fn test_ast_json_dumps_without_evaluating() {
    let mut interp = Interpreter::new();
    let dump = interp.ast_json("(define marker 1) '(a \"b\" 2.5)");
    assert_eq!(
        dump,
        serde_json::json!([["define", "marker", 1], ["quote", ["a", "b", 2.5]]])
    );
    // Parse only: the define never ran.
    let looked_up = interp.run("marker");
    assert!(interp.heap.is_error(looked_up));
}

#[test]
fn test_exit_sets_code_and_stops() {
    let mut interp = Interpreter::new();
    let (mut io, out, _err) = Io::capture();
    interp.eval_source("(exit 7) (println \"unreached\")", &mut io, flags::NONE);
    assert_eq!(interp.exit, Some(7));
    assert_eq!(out.contents(), "");
}

#[test]
fn test_read_file_missing_is_error() {
    let mut interp = Interpreter::new();
    let result = interp.run("(read-file \"/no/such/file.lisp\")");
    assert!(interp.heap.is_error(result));
}

#[cfg(unix)]
#[test]
fn test_import_evaluates_a_file() {
    let path = std::env::temp_dir().join(format!("lishp_import_{}.lisp", std::process::id()));
    fs::write(&path, "(define imported 41)\n(+ imported 1)\n").unwrap();

    let mut interp = Interpreter::new();
    let source = format!("(import \"{}\")", path.display());
    let result = interp.run(&source);
    assert_eq!(interp.repr(result), "42");

    let _ = fs::remove_file(&path);
}

#[cfg(unix)]
#[test]
fn test_load_binds_into_root() {
    let path = std::env::temp_dir().join(format!("lishp_load_{}.lisp", std::process::id()));
    fs::write(&path, "(define loaded 9)\n").unwrap();

    let mut interp = Interpreter::new();
    let source = format!("(load \"{}\") loaded", path.display());
    let result = interp.run(&source);
    assert_eq!(interp.repr(result), "9");

    let _ = fs::remove_file(&path);
}
