// Quasiquote expansion.
//
// A quasiquote template is compiled into ordinary code built from
// `quote`, `cons` and `append`; the evaluator then tail-runs that code.
// Expansion is flat: unquotes are resolved at the outermost quasiquote
// regardless of nesting depth.

use crate::eval::SpecialForms;
use crate::heap::Heap;
use crate::types::{ExprId, SymbolId};

/// Compile a template into the code that constructs it.
pub fn expand(heap: &mut Heap, forms: &SpecialForms, template: ExprId) -> ExprId {
    if let Some(payload) = tagged_payload(heap, forms.unquote, template) {
        return payload;
    }
    if tagged_payload(heap, forms.unquote_splicing, template).is_some() {
        return heap.error("unquote-splicing outside of a list");
    }
    if heap.pair(template).is_some() {
        expand_elements(heap, forms, template)
    } else {
        quote(heap, forms, template)
    }
}

/// Expand the elements of a list template, right to left. A plain element
/// contributes a `cons`, a spliced one an `append`.
fn expand_elements(heap: &mut Heap, forms: &SpecialForms, list: ExprId) -> ExprId {
    let Some((head, tail)) = heap.pair(list) else {
        // Dotted tail or nil terminator: quote it as-is.
        return if heap.is_nil(list) {
            list
        } else {
            quote(heap, forms, list)
        };
    };

    let rest = expand_elements(heap, forms, tail);
    if heap.is_error(rest) {
        return rest;
    }

    if let Some(payload) = tagged_payload(heap, forms.unquote_splicing, head) {
        let append = heap.symbol(forms.append);
        return heap.list_from(&[append, payload, rest]);
    }

    let element = expand(heap, forms, head);
    if heap.is_error(element) {
        return element;
    }
    let cons = heap.symbol(forms.cons);
    heap.list_from(&[cons, element, rest])
}

fn quote(heap: &mut Heap, forms: &SpecialForms, expr: ExprId) -> ExprId {
    let q = heap.symbol(forms.quote);
    heap.list_from(&[q, expr])
}

/// If `expr` is the two-element list (tag payload), return the payload.
fn tagged_payload(heap: &Heap, tag: SymbolId, expr: ExprId) -> Option<ExprId> {
    let (head, tail) = heap.pair(expr)?;
    if heap.symbol_of(head) != Some(tag) {
        return None;
    }
    let (payload, rest) = heap.pair(tail)?;
    if heap.is_nil(rest) {
        Some(payload)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::symbol::SymbolTable;
    use crate::tokenizer::tokenize;

    fn setup(source: &str) -> (Heap, SymbolTable, SpecialForms, ExprId) {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let forms = SpecialForms::new(&mut symbols);
        let tokens = tokenize(source);
        let program = parse(&tokens, &mut heap, &mut symbols);
        let (template, _) = heap.pair(program).expect("one form");
        (heap, symbols, forms, template)
    }

    fn head_symbol(heap: &Heap, expr: ExprId) -> Option<SymbolId> {
        let (head, _) = heap.pair(expr)?;
        heap.symbol_of(head)
    }

    #[test]
    fn test_atom_becomes_quote() {
        let (mut heap, _, forms, template) = setup("x");
        let code = expand(&mut heap, &forms, template);
        assert_eq!(head_symbol(&heap, code), Some(forms.quote));
    }

    #[test]
    fn test_unquote_passes_through() {
        let (mut heap, _, forms, template) = setup(",x");
        let code = expand(&mut heap, &forms, template);
        let x = heap.symbol_of(code);
        assert!(x.is_some());
        assert_ne!(head_symbol(&heap, code), Some(forms.quote));
    }

    #[test]
    fn test_list_becomes_cons_chain() {
        let (mut heap, _, forms, template) = setup("(a ,b)");
        let code = expand(&mut heap, &forms, template);
        // (cons (quote a) (cons b nil))
        assert_eq!(head_symbol(&heap, code), Some(forms.cons));
        let (_, tail) = heap.pair(code).unwrap();
        let (quoted_a, tail) = heap.pair(tail).unwrap();
        assert_eq!(head_symbol(&heap, quoted_a), Some(forms.quote));
        let (inner, _) = heap.pair(tail).unwrap();
        assert_eq!(head_symbol(&heap, inner), Some(forms.cons));
    }

    #[test]
    fn test_splice_becomes_append() {
        let (mut heap, _, forms, template) = setup("(,@xs c)");
        let code = expand(&mut heap, &forms, template);
        assert_eq!(head_symbol(&heap, code), Some(forms.append));
    }

    #[test]
    fn test_toplevel_splice_is_error() {
        let (mut heap, _, forms, template) = setup(",@xs");
        let code = expand(&mut heap, &forms, template);
        assert!(heap.is_error(code));
    }
}
