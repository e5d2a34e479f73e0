// Parser.
//
// Turns a token stream into a proper list of top-level forms (the last cdr
// is nil). Malformed input is embedded as an Error atom in place of the
// bad subtree: "missing-parenthesis" for an unterminated open,
// "unexpected-parenthesis" for a stray close.

use crate::heap::Heap;
use crate::symbol::SymbolTable;
use crate::tokenizer::{Token, TokenKind};
use crate::types::ExprId;

pub fn parse(tokens: &[Token], heap: &mut Heap, symbols: &mut SymbolTable) -> ExprId {
    Parser::new(tokens, heap, symbols).parse()
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: i32,
    heap: &'a mut Heap,
    symbols: &'a mut SymbolTable,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], heap: &'a mut Heap, symbols: &'a mut SymbolTable) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            heap,
            symbols,
        }
    }

    /// Parse the whole program. Stops at the first embedded error, which
    /// becomes the sole element of the returned list.
    pub fn parse(&mut self) -> ExprId {
        let mut forms = Vec::new();
        while let Some(expr) = self.parse_expr() {
            if self.heap.is_error(expr) {
                return self.heap.list_from(&[expr]);
            }
            forms.push(expr);
        }
        self.heap.list_from(&forms)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// One expression, or None at a clean end of input.
    fn parse_expr(&mut self) -> Option<ExprId> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::End => {
                if self.depth != 0 {
                    Some(self.heap.error("missing-parenthesis"))
                } else {
                    None
                }
            }
            TokenKind::LParen => {
                self.advance();
                self.depth += 1;
                Some(self.parse_list())
            }
            TokenKind::RParen => Some(self.heap.error("unexpected-parenthesis")),
            TokenKind::True => {
                self.advance();
                Some(self.heap.boolean(true))
            }
            TokenKind::False => {
                self.advance();
                Some(self.heap.boolean(false))
            }
            TokenKind::Nil => {
                self.advance();
                Some(self.heap.nil())
            }
            TokenKind::Number => {
                self.advance();
                Some(self.parse_number(&token.lexeme))
            }
            TokenKind::String => {
                self.advance();
                Some(self.heap.string(token.lexeme))
            }
            TokenKind::Symbol => {
                self.advance();
                let sym = self.symbols.intern(&token.lexeme);
                Some(self.heap.symbol(sym))
            }
            TokenKind::Quote
            | TokenKind::Quasiquote
            | TokenKind::Unquote
            | TokenKind::UnquoteSplicing => {
                self.advance();
                Some(self.parse_shorthand(&token.lexeme))
            }
        }
    }

    fn parse_number(&mut self, lexeme: &str) -> ExprId {
        if lexeme.contains('.') {
            match lexeme.parse::<f64>() {
                Ok(x) => self.heap.real(x),
                Err(_) => self.heap.error(format!("invalid number '{}'", lexeme)),
            }
        } else {
            match lexeme.parse::<i64>() {
                Ok(n) => self.heap.integer(n),
                Err(_) => self.heap.error(format!("invalid number '{}'", lexeme)),
            }
        }
    }

    /// `'x` and friends become two-element lists: (quote x), (unquote x), ...
    fn parse_shorthand(&mut self, name: &str) -> ExprId {
        let Some(inner) = self.parse_expr() else {
            return self.heap.error("missing-parenthesis");
        };
        if self.heap.is_error(inner) {
            return inner;
        }
        let sym = self.symbols.intern(name);
        let head = self.heap.symbol(sym);
        self.heap.list_from(&[head, inner])
    }

    fn parse_list(&mut self) -> ExprId {
        if self.matches(TokenKind::RParen) {
            self.depth -= 1;
            return self.heap.nil();
        }

        let Some(head) = self.parse_expr() else {
            return self.heap.error("missing-parenthesis");
        };
        if self.heap.is_error(head) {
            return head;
        }

        let tail = self.parse_list();
        if self.heap.is_error(tail) {
            return tail;
        }

        self.heap.cons(head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Atom, Expr};
    use crate::tokenizer::tokenize;

    fn parse_str(source: &str) -> (Heap, SymbolTable, ExprId) {
        let mut heap = Heap::new();
        let mut symbols = SymbolTable::new();
        let tokens = tokenize(source);
        let program = parse(&tokens, &mut heap, &mut symbols);
        (heap, symbols, program)
    }

    fn first_form(heap: &Heap, program: ExprId) -> ExprId {
        heap.pair(program).expect("non-empty program").0
    }

    #[test]
    fn test_parse_atom_forms() {
        let (heap, _, program) = parse_str("42 2.5 \"hi\" foo");
        let mut forms = Vec::new();
        let mut cur = program;
        while let Some((head, tail)) = heap.pair(cur) {
            forms.push(head);
            cur = tail;
        }
        assert_eq!(forms.len(), 4);
        assert_eq!(*heap.get(forms[0]), Expr::Atom(Atom::Integer(42)));
        assert_eq!(*heap.get(forms[1]), Expr::Atom(Atom::Real(2.5)));
        assert_eq!(*heap.get(forms[2]), Expr::Atom(Atom::String("hi".into())));
        assert!(matches!(heap.get(forms[3]), Expr::Atom(Atom::Symbol(_))));
    }

    #[test]
    fn test_parse_nested_list() {
        let (heap, _, program) = parse_str("(a (b c) d)");
        let form = first_form(&heap, program);
        let (_a, rest) = heap.pair(form).unwrap();
        let (bc, rest) = heap.pair(rest).unwrap();
        assert!(heap.pair(bc).is_some());
        let (_d, tail) = heap.pair(rest).unwrap();
        assert!(heap.is_nil(tail));
    }

    #[test]
    fn test_quote_shorthand() {
        let (heap, mut symbols, program) = parse_str("'x");
        let form = first_form(&heap, program);
        let (head, _) = heap.pair(form).unwrap();
        assert_eq!(heap.symbol_of(head), Some(symbols.intern("quote")));
    }

    #[test]
    fn test_missing_parenthesis() {
        let (heap, _, program) = parse_str("(+ 1 2");
        let form = first_form(&heap, program);
        assert_eq!(
            *heap.get(form),
            Expr::Atom(Atom::Error("missing-parenthesis".into()))
        );
    }

    #[test]
    fn test_unexpected_parenthesis() {
        let (heap, _, program) = parse_str(")");
        let form = first_form(&heap, program);
        assert_eq!(
            *heap.get(form),
            Expr::Atom(Atom::Error("unexpected-parenthesis".into()))
        );
    }

    #[test]
    fn test_empty_input_is_nil_program() {
        let (heap, _, program) = parse_str("   ; just a comment");
        assert!(heap.is_nil(program));
    }
}
