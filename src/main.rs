// lishp - A Lisp Interpreter
//
// Runs a script when given a filename, otherwise starts an interactive
// REPL. `--json` dumps the parsed program as JSON instead of running it.

use std::fs;
use std::process::ExitCode;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use lishp::eval::{flags, Interpreter};
use lishp::io::Io;

const HELP: &str = "\
lishp - a Lisp interpreter

USAGE:
    lishp [OPTIONS] [FILE]

OPTIONS:
    --json       Dump the parsed program as JSON (requires FILE)
    --version    Print the version and exit
    -h, --help   Print this help
";

fn main() -> ExitCode {
    env_logger::init();

    let mut pargs = pico_args::Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{}", HELP);
        return ExitCode::SUCCESS;
    }
    if pargs.contains("--version") {
        println!("lishp {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    let json = pargs.contains("--json");
    let file: Option<String> = match pargs.opt_free_from_str() {
        Ok(file) => file,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    if json {
        let Some(path) = file else {
            eprintln!("error: --json needs a file to parse");
            return ExitCode::from(2);
        };
        return dump_ast(&path);
    }

    match file {
        Some(path) => run_file(&path, flags::NONE),
        None => repl(flags::PRINT_RESULTS),
    }
}

/// Parse the file and print its forms as a JSON array, never evaluating.
fn dump_ast(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", path, e);
            return ExitCode::from(2);
        }
    };
    let mut interp = Interpreter::new();
    println!("{}", interp.ast_json(&source));
    ExitCode::SUCCESS
}

fn run_file(path: &str, echo: u8) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", path, e);
            return ExitCode::from(2);
        }
    };
    let mut interp = Interpreter::new();
    let mut io = Io::stdio();
    let result = interp.eval_source(&source, &mut io, echo);
    if let Some(code) = interp.exit {
        return ExitCode::from(code.clamp(0, 255) as u8);
    }
    if interp.heap.is_error(result) {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn repl(echo: u8) -> ExitCode {
    println!("lishp {}", env!("CARGO_PKG_VERSION"));

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("error: cannot start line editor: {}", e);
            return ExitCode::from(2);
        }
    };
    let mut interp = Interpreter::new();
    let mut io = Io::stdio();
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "> " } else { "  " };
        match editor.readline(prompt) {
            Ok(line) => {
                pending.push_str(&line);
                pending.push('\n');
                if !is_balanced(&pending) {
                    continue;
                }
                let source = std::mem::take(&mut pending);
                if source.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(source.trim_end());
                interp.eval_source(&source, &mut io, echo);
                if let Some(code) = interp.exit {
                    return ExitCode::from(code.clamp(0, 255) as u8);
                }
            }
            Err(ReadlineError::Interrupted) => {
                pending.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

/// True once every opened paren is closed, ignoring strings and comments.
/// The REPL keeps reading lines until then.
fn is_balanced(source: &str) -> bool {
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut in_comment = false;
    let mut escaped = false;
    for c in source.chars() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ';' => in_comment = true,
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    depth <= 0 && !in_string
}

#[cfg(test)]
mod tests {
    use super::is_balanced;

    #[test]
    fn test_balanced_detection() {
        assert!(is_balanced("(+ 1 2)"));
        assert!(!is_balanced("(define f (lambda (x)"));
        assert!(is_balanced("(define f (lambda (x) x))"));
    }

    #[test]
    fn test_parens_in_strings_and_comments_ignored() {
        assert!(is_balanced("\"(((\""));
        assert!(is_balanced("(println \")\")"));
        assert!(is_balanced("(+ 1 2) ; unclosed ( in comment"));
        assert!(!is_balanced("\"unterminated"));
    }
}
