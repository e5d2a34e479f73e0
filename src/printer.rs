// Printer.
//
// Renders heap expressions back to text. `print` is the read-write form
// (strings quoted and escaped); `princ` is the display form (strings
// raw). Improper lists print with a dotted tail.

use serde_json::{json, Value};

use crate::expr::{Atom, Expr};
use crate::heap::Heap;
use crate::symbol::SymbolTable;
use crate::types::ExprId;

pub struct Printer<'a> {
    heap: &'a Heap,
    symbols: &'a SymbolTable,
}

impl<'a> Printer<'a> {
    pub fn new(heap: &'a Heap, symbols: &'a SymbolTable) -> Self {
        Self { heap, symbols }
    }

    /// Read-write representation.
    pub fn print(&self, expr: ExprId) -> String {
        let mut out = String::new();
        self.render(expr, true, &mut out);
        out
    }

    /// Display representation: strings without quotes.
    pub fn princ(&self, expr: ExprId) -> String {
        let mut out = String::new();
        self.render(expr, false, &mut out);
        out
    }

    fn render(&self, expr: ExprId, readably: bool, out: &mut String) {
        match self.heap.get(expr) {
            Expr::Void => out.push_str("#<void>"),
            Expr::Pair(_, _) => self.render_list(expr, readably, out),
            Expr::Atom(atom) => self.render_atom(atom, readably, out),
        }
    }

    fn render_atom(&self, atom: &Atom, readably: bool, out: &mut String) {
        match atom {
            Atom::Nil => out.push_str("nil"),
            Atom::Boolean(true) => out.push_str("true"),
            Atom::Boolean(false) => out.push_str("false"),
            Atom::Integer(n) => out.push_str(&n.to_string()),
            Atom::Real(x) => out.push_str(&format_real(*x)),
            Atom::Symbol(sym) => out.push_str(self.symbols.name(*sym)),
            Atom::String(s) => {
                if readably {
                    out.push('"');
                    for c in s.chars() {
                        match c {
                            '"' => out.push_str("\\\""),
                            '\n' => out.push_str("\\n"),
                            '\\' => out.push_str("\\\\"),
                            _ => out.push(c),
                        }
                    }
                    out.push('"');
                } else {
                    out.push_str(s);
                }
            }
            Atom::Error(msg) => {
                if readably {
                    // Re-reading this calls the error native and rebuilds
                    // the value.
                    out.push_str("(error \"");
                    for c in msg.chars() {
                        match c {
                            '"' => out.push_str("\\\""),
                            '\n' => out.push_str("\\n"),
                            '\\' => out.push_str("\\\\"),
                            _ => out.push(c),
                        }
                    }
                    out.push_str("\")");
                } else {
                    out.push_str("error: ");
                    out.push_str(msg);
                }
            }
            Atom::Native(_) => out.push_str("#<native>"),
            Atom::Lambda(_) => out.push_str("#<lambda>"),
            Atom::Macro(_) => out.push_str("#<macro>"),
        }
    }

    fn render_list(&self, list: ExprId, readably: bool, out: &mut String) {
        out.push('(');
        let mut current = list;
        let mut first = true;
        loop {
            match self.heap.pair(current) {
                Some((head, tail)) => {
                    if !first {
                        out.push(' ');
                    }
                    first = false;
                    self.render(head, readably, out);
                    current = tail;
                }
                None => {
                    if !self.heap.is_nil(current) {
                        out.push_str(" . ");
                        self.render(current, readably, out);
                    }
                    break;
                }
            }
        }
        out.push(')');
    }

    /// JSON view of an expression, for `to-json` and the --json dump.
    pub fn to_json(&self, expr: ExprId) -> Value {
        match self.heap.get(expr) {
            Expr::Void => Value::Null,
            Expr::Pair(_, _) => {
                let mut items = Vec::new();
                let mut current = expr;
                while let Some((head, tail)) = self.heap.pair(current) {
                    items.push(self.to_json(head));
                    current = tail;
                }
                if !self.heap.is_nil(current) {
                    items.push(self.to_json(current));
                }
                Value::Array(items)
            }
            Expr::Atom(atom) => match atom {
                Atom::Nil => Value::Null,
                Atom::Boolean(b) => json!(b),
                Atom::Integer(n) => json!(n),
                Atom::Real(x) => json!(x),
                Atom::Symbol(sym) => json!(self.symbols.name(*sym)),
                Atom::String(s) => json!(s),
                Atom::Error(msg) => json!({ "error": msg }),
                Atom::Native(_) => json!("#<native>"),
                Atom::Lambda(_) => json!("#<lambda>"),
                Atom::Macro(_) => json!("#<macro>"),
            },
        }
    }
}

fn format_real(x: f64) -> String {
    if x.is_finite() && x == x.trunc() {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}
