// Tokenizer.
//
// Splits source text into parens, literals, reader shorthands (' ` , ,@),
// rest-marker symbols (&name) and plain symbols. Line comments start
// with ';'. The stream always ends with an End token.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LParen,
    RParen,
    Quote,
    Quasiquote,
    Unquote,
    UnquoteSplicing,
    Number,
    String,
    Symbol,
    True,
    False,
    Nil,
    End,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
}

impl Token {
    fn new(kind: TokenKind, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
        }
    }
}

pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokenizer = Tokenizer::new(source);
    tokenizer.run();
    tokenizer.tokens
}

struct Tokenizer {
    chars: Vec<char>,
    index: usize,
    tokens: Vec<Token>,
}

impl Tokenizer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            index: 0,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.index + 1).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.index += 1;
        }
        c
    }

    fn push(&mut self, kind: TokenKind, lexeme: impl Into<String>) {
        self.tokens.push(Token::new(kind, lexeme));
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.index += 1;
            } else if c == ';' {
                while let Some(c) = self.next() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn run(&mut self) {
        loop {
            self.skip_whitespace();
            let Some(c) = self.next() else { break };
            match c {
                '(' => self.push(TokenKind::LParen, "("),
                ')' => self.push(TokenKind::RParen, ")"),
                '\'' => self.push(TokenKind::Quote, "quote"),
                '`' => self.push(TokenKind::Quasiquote, "quasiquote"),
                ',' => {
                    if self.peek() == Some('@') {
                        self.next();
                        self.push(TokenKind::UnquoteSplicing, "unquote-splicing");
                    } else {
                        self.push(TokenKind::Unquote, "unquote");
                    }
                }
                '"' => self.handle_string(),
                _ => {
                    if c.is_ascii_digit()
                        || (c == '-' && self.peek().is_some_and(|d| d.is_ascii_digit()))
                    {
                        self.handle_number(c);
                    } else {
                        self.handle_identifier(c);
                    }
                }
            }
        }
        self.push(TokenKind::End, "(end)");
    }

    fn handle_string(&mut self) {
        let mut text = String::new();
        loop {
            match self.next() {
                Some('"') | None => break,
                Some('\\') if self.peek() == Some('n') => {
                    self.next();
                    text.push('\n');
                }
                Some('\\') if self.peek() == Some('"') => {
                    self.next();
                    text.push('"');
                }
                Some('\\') if self.peek() == Some('\\') => {
                    self.next();
                    text.push('\\');
                }
                Some(c) => text.push(c),
            }
        }
        self.push(TokenKind::String, text);
    }

    fn handle_number(&mut self, first: char) {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.index += 1;
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.index += 1;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.index += 1;
                } else {
                    break;
                }
            }
        }
        self.push(TokenKind::Number, text);
    }

    fn handle_identifier(&mut self, first: char) {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | ';' | '"' | '\'' | '`' | ',') {
                break;
            }
            text.push(c);
            self.index += 1;
        }
        match text.as_str() {
            "true" => self.push(TokenKind::True, text),
            "false" => self.push(TokenKind::False, text),
            "nil" => self.push(TokenKind::Nil, text),
            _ => self.push(TokenKind::Symbol, text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_form() {
        assert_eq!(
            kinds("(+ 1 2)"),
            vec![
                TokenKind::LParen,
                TokenKind::Symbol,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::RParen,
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn test_reader_shorthands() {
        assert_eq!(
            kinds("'x `(a ,b ,@c)"),
            vec![
                TokenKind::Quote,
                TokenKind::Symbol,
                TokenKind::Quasiquote,
                TokenKind::LParen,
                TokenKind::Symbol,
                TokenKind::Unquote,
                TokenKind::Symbol,
                TokenKind::UnquoteSplicing,
                TokenKind::Symbol,
                TokenKind::RParen,
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("42 -7 3.25");
        assert_eq!(tokens[0].lexeme, "42");
        assert_eq!(tokens[1].lexeme, "-7");
        assert_eq!(tokens[2].lexeme, "3.25");
        assert!(tokens.iter().take(3).all(|t| t.kind == TokenKind::Number));
    }

    #[test]
    fn test_minus_is_a_symbol() {
        let tokens = tokenize("(- 5 2)");
        assert_eq!(tokens[1].kind, TokenKind::Symbol);
        assert_eq!(tokens[1].lexeme, "-");
    }

    #[test]
    fn test_string_unescapes_newline() {
        let tokens = tokenize("\"a\\nb\"");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, "a\nb");
    }

    #[test]
    fn test_string_unescapes_backslash() {
        let tokens = tokenize("\"a\\\\b\"");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, "a\\b");
    }

    #[test]
    fn test_comment_skipped() {
        assert_eq!(
            kinds("1 ; the rest is ignored (\n2"),
            vec![TokenKind::Number, TokenKind::Number, TokenKind::End]
        );
    }

    #[test]
    fn test_rest_marker_symbol() {
        let tokens = tokenize("(lambda (a &rest) rest)");
        assert_eq!(tokens[3].kind, TokenKind::Symbol);
        assert_eq!(tokens[3].lexeme, "&rest");
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            kinds("true false nil"),
            vec![
                TokenKind::True,
                TokenKind::False,
                TokenKind::Nil,
                TokenKind::End
            ]
        );
    }

    #[test]
    fn test_t_is_an_ordinary_symbol() {
        let tokens = tokenize("t");
        assert_eq!(tokens[0].kind, TokenKind::Symbol);
        assert_eq!(tokens[0].lexeme, "t");
    }
}
