// Shell natives.
//
// `$` runs a pipeline of stages. A stage is a list of words (the `sh`
// macro quotes its arguments into one); a stage whose first word is the
// symbol `<<<` is a here-string feeding the next stage. Stage output is
// buffered as a string and piped into the next command; the final output
// comes back as a String atom with trailing newlines trimmed.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::eval::Interpreter;
use crate::io::Io;
use crate::types::{EnvId, ExprId};

pub fn register(interp: &mut Interpreter) {
    interp.define_native("$", native_pipeline);
    interp.define_native("exec", native_exec);
    interp.define_native("getenv", native_getenv);
}

/// Flatten the argument list into stages: a list of word lists passes
/// through as-is (the `pipe` helper produces one), a single word list is
/// one stage.
fn collect_stages(interp: &Interpreter, args: ExprId) -> Vec<ExprId> {
    let mut stages = Vec::new();
    let mut current = args;
    while let Some((arg, rest)) = interp.heap.pair(current) {
        let nested = interp
            .heap
            .pair(arg)
            .is_some_and(|(head, _)| interp.heap.pair(head).is_some());
        if nested {
            let mut inner = arg;
            while let Some((stage, tail)) = interp.heap.pair(inner) {
                stages.push(stage);
                inner = tail;
            }
        } else {
            stages.push(arg);
        }
        current = rest;
    }
    stages
}

fn stage_words(interp: &Interpreter, stage: ExprId) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = stage;
    while let Some((word, rest)) = interp.heap.pair(current) {
        words.push(interp.display(word));
        current = rest;
    }
    words
}

fn run_stage(words: &[String], input: Option<&str>, io: &mut Io) -> Result<String, String> {
    let (program, args) = words
        .split_first()
        .ok_or_else(|| "empty pipeline stage".to_string())?;
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| format!("cannot run '{}': {}", program, e))?;
    if let (Some(text), Some(stdin)) = (input, child.stdin.take().as_mut()) {
        let _ = stdin.write_all(text.as_bytes());
    }
    let output = child
        .wait_with_output()
        .map_err(|e| format!("'{}' failed: {}", program, e))?;
    let _ = io.err.write_all(&output.stderr);
    if !output.status.success() {
        return Err(format!("'{}' exited with {}", program, output.status));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn native_pipeline(interp: &mut Interpreter, args: ExprId, _env: EnvId, io: &mut Io) -> ExprId {
    let here = interp.symbols.intern("<<<");
    let stages = collect_stages(interp, args);
    let mut input: Option<String> = None;
    for stage in stages {
        // A here-string stage just becomes the next stage's stdin.
        if let Some((head, rest)) = interp.heap.pair(stage) {
            if interp.heap.symbol_of(head) == Some(here) {
                input = match interp.heap.pair(rest) {
                    Some((text, _)) => Some(interp.display(text)),
                    None => Some(String::new()),
                };
                continue;
            }
        }
        let words = stage_words(interp, stage);
        match run_stage(&words, input.as_deref(), io) {
            Ok(out) => input = Some(out),
            Err(msg) => return interp.heap.error(msg),
        }
    }
    let text = input.unwrap_or_default();
    let trimmed = text.trim_end_matches('\n').to_string();
    interp.heap.string(trimmed)
}

/// Run one command directly from its argv words and return its stdout.
/// The words arrive either as individual arguments or as a single word
/// list (the `sh` macro produces the latter). No shell is involved.
fn native_exec(interp: &mut Interpreter, args: ExprId, _env: EnvId, io: &mut Io) -> ExprId {
    let stage = match interp.heap.pair(args) {
        Some((first, rest)) if interp.heap.pair(first).is_some() && interp.heap.is_nil(rest) => {
            first
        }
        Some(_) => args,
        None => return interp.heap.error("'exec' needs a command"),
    };
    let words = stage_words(interp, stage);
    match run_stage(&words, None, io) {
        Ok(out) => {
            let trimmed = out.trim_end_matches('\n').to_string();
            interp.heap.string(trimmed)
        }
        Err(msg) => interp.heap.error(msg),
    }
}

fn native_getenv(interp: &mut Interpreter, args: ExprId, _env: EnvId, _io: &mut Io) -> ExprId {
    let Some((arg, _)) = interp.heap.pair(args) else {
        return interp.heap.error("'getenv' needs a variable name");
    };
    let name = interp.display(arg);
    match std::env::var(&name) {
        Ok(value) => interp.heap.string(value),
        Err(_) => interp.heap.nil(),
    }
}
