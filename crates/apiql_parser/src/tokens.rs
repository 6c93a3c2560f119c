use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::errors::{ParseError, Result};
use crate::keywords::{Keyword, keyword_from_str};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub value: String,
    /// Quote character used, if any.
    pub quote: Option<char>,
    /// Keyword this word maps to. Always `None` for quoted words.
    pub keyword: Option<Keyword>,
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quote {
            Some(q) => write!(f, "{q}{}{q}", self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(Word),
    /// Unparsed numeric literal.
    Number(String),
    SingleQuotedString(String),
    /// Optimizer hint comment, e.g. `/*+ STRAIGHT_JOIN */`.
    ///
    /// Holds the trimmed comment body.
    Hint(String),
    /// ','
    Comma,
    /// '.'
    Period,
    /// ';'
    SemiColon,
    /// '('
    LeftParen,
    /// ')'
    RightParen,
    /// '='
    Eq,
    /// '=='
    DoubleEq,
    /// '!=' or '<>'
    Neq,
    /// '<'
    Lt,
    /// '<='
    LtEq,
    /// '>'
    Gt,
    /// '>='
    GtEq,
    /// '+'
    Plus,
    /// '-'
    Minus,
    /// '*'
    Mul,
    /// '/'
    Div,
    /// '%'
    Mod,
    /// '||'
    Concat,
    /// '@'
    At,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(w) => write!(f, "{w}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::SingleQuotedString(s) => write!(f, "'{s}'"),
            Self::Hint(h) => write!(f, "/*+ {h} */"),
            Self::Comma => write!(f, ","),
            Self::Period => write!(f, "."),
            Self::SemiColon => write!(f, ";"),
            Self::LeftParen => write!(f, "("),
            Self::RightParen => write!(f, ")"),
            Self::Eq => write!(f, "="),
            Self::DoubleEq => write!(f, "=="),
            Self::Neq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::LtEq => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtEq => write!(f, ">="),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Mul => write!(f, "*"),
            Self::Div => write!(f, "/"),
            Self::Mod => write!(f, "%"),
            Self::Concat => write!(f, "||"),
            Self::At => write!(f, "@"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenWithLocation {
    pub token: Token,
    /// Line number of the start of the token (1-based).
    pub line: usize,
    /// Column of the start of the token (1-based).
    pub col: usize,
}

impl TokenWithLocation {
    pub fn is_keyword(&self, other: Keyword) -> bool {
        self.keyword() == Some(other)
    }

    pub fn keyword(&self) -> Option<Keyword> {
        match &self.token {
            Token::Word(w) => w.keyword,
            _ => None,
        }
    }
}

#[derive(Debug)]
struct State<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    col: usize,
}

impl State<'_> {
    fn next(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Consume the next char if it matches.
    fn next_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.next();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, mut pred: impl FnMut(char) -> bool) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            s.push(c);
            self.next();
        }
        s
    }
}

#[derive(Debug)]
pub struct Tokenizer<'a> {
    state: State<'a>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(query: &'a str) -> Self {
        Tokenizer {
            state: State {
                chars: query.chars().peekable(),
                line: 1,
                col: 1,
            },
        }
    }

    /// Tokenize the query, dropping whitespace and regular comments.
    pub fn tokenize(&mut self) -> Result<Vec<TokenWithLocation>> {
        let mut toks = Vec::new();
        loop {
            let line = self.state.line;
            let col = self.state.col;
            match self.next_token()? {
                Some(Some(token)) => toks.push(TokenWithLocation { token, line, col }),
                Some(None) => continue,
                None => break,
            }
        }
        Ok(toks)
    }

    /// Returns `None` at end of input, `Some(None)` if something was consumed
    /// that doesn't produce a token (whitespace, comments).
    fn next_token(&mut self) -> Result<Option<Option<Token>>> {
        let line = self.state.line;
        let col = self.state.col;

        let c = match self.state.peek() {
            Some(c) => c,
            None => return Ok(None),
        };

        let tok = match c {
            c if c.is_whitespace() => {
                self.state.next();
                return Ok(Some(None));
            }
            '\'' => {
                self.state.next();
                let s = self.read_quoted('\'', line, col)?;
                Token::SingleQuotedString(s)
            }
            '"' | '`' => {
                self.state.next();
                let s = self.read_quoted(c, line, col)?;
                Token::Word(Word {
                    value: s,
                    quote: Some(c),
                    keyword: None,
                })
            }
            c if c.is_ascii_digit() => {
                let mut num = self.state.take_while(|c| c.is_ascii_digit());
                if self.state.peek() == Some('.') {
                    self.state.next();
                    num.push('.');
                    num.push_str(&self.state.take_while(|c| c.is_ascii_digit()));
                }
                Token::Number(num)
            }
            c if c.is_alphabetic() || c == '_' => {
                let value = self
                    .state
                    .take_while(|c| c.is_alphanumeric() || c == '_' || c == '$');
                let keyword = keyword_from_str(&value);
                Token::Word(Word {
                    value,
                    quote: None,
                    keyword,
                })
            }
            '-' => {
                self.state.next();
                if self.state.next_if('-') {
                    // Line comment.
                    self.state.take_while(|c| c != '\n');
                    return Ok(Some(None));
                }
                Token::Minus
            }
            '/' => {
                self.state.next();
                if self.state.next_if('*') {
                    let is_hint = self.state.next_if('+');
                    let body = self.read_block_comment(line, col)?;
                    if is_hint {
                        Token::Hint(body.trim().to_string())
                    } else {
                        return Ok(Some(None));
                    }
                } else {
                    Token::Div
                }
            }
            '=' => {
                self.state.next();
                if self.state.next_if('=') {
                    Token::DoubleEq
                } else {
                    Token::Eq
                }
            }
            '!' => {
                self.state.next();
                if self.state.next_if('=') {
                    Token::Neq
                } else {
                    return Err(ParseError::with_location("Expected '=' after '!'", line, col));
                }
            }
            '<' => {
                self.state.next();
                if self.state.next_if('=') {
                    Token::LtEq
                } else if self.state.next_if('>') {
                    Token::Neq
                } else {
                    Token::Lt
                }
            }
            '>' => {
                self.state.next();
                if self.state.next_if('=') {
                    Token::GtEq
                } else {
                    Token::Gt
                }
            }
            '|' => {
                self.state.next();
                if self.state.next_if('|') {
                    Token::Concat
                } else {
                    return Err(ParseError::with_location("Expected '|' after '|'", line, col));
                }
            }
            other => {
                self.state.next();
                match other {
                    ',' => Token::Comma,
                    '.' => Token::Period,
                    ';' => Token::SemiColon,
                    '(' => Token::LeftParen,
                    ')' => Token::RightParen,
                    '+' => Token::Plus,
                    '*' => Token::Mul,
                    '%' => Token::Mod,
                    '@' => Token::At,
                    other => {
                        return Err(ParseError::with_location(
                            format!("Unexpected character '{other}'"),
                            line,
                            col,
                        ));
                    }
                }
            }
        };

        Ok(Some(Some(tok)))
    }

    /// Read until the closing quote. A doubled quote char is an escaped quote.
    ///
    /// Assumes the opening quote has already been consumed.
    fn read_quoted(&mut self, quote: char, line: usize, col: usize) -> Result<String> {
        let mut s = String::new();
        loop {
            match self.state.next() {
                Some(c) if c == quote => {
                    if self.state.next_if(quote) {
                        s.push(quote);
                    } else {
                        return Ok(s);
                    }
                }
                Some(c) => s.push(c),
                None => {
                    return Err(ParseError::with_location(
                        format!("Unterminated quoted string, expected {quote}"),
                        line,
                        col,
                    ));
                }
            }
        }
    }

    fn read_block_comment(&mut self, line: usize, col: usize) -> Result<String> {
        let mut s = String::new();
        loop {
            match self.state.next() {
                Some('*') if self.state.peek() == Some('/') => {
                    self.state.next();
                    return Ok(s);
                }
                Some(c) => s.push(c),
                None => {
                    return Err(ParseError::with_location(
                        "Unterminated block comment",
                        line,
                        col,
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(s: &str) -> Vec<Token> {
        Tokenizer::new(s)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    fn word(s: &str) -> Token {
        Token::Word(Word {
            value: s.to_string(),
            quote: None,
            keyword: keyword_from_str(s),
        })
    }

    #[test]
    fn simple_select() {
        let got = tokens("SELECT a, 1.5 FROM t;");
        let expected = vec![
            word("SELECT"),
            word("a"),
            Token::Comma,
            Token::Number("1.5".to_string()),
            word("FROM"),
            word("t"),
            Token::SemiColon,
        ];
        assert_eq!(expected, got);
    }

    #[test]
    fn quoted_words_are_not_keywords() {
        let got = tokens("\"select\" `from`");
        let expected = vec![
            Token::Word(Word {
                value: "select".to_string(),
                quote: Some('"'),
                keyword: None,
            }),
            Token::Word(Word {
                value: "from".to_string(),
                quote: Some('`'),
                keyword: None,
            }),
        ];
        assert_eq!(expected, got);
    }

    #[test]
    fn escaped_single_quote() {
        let got = tokens("'it''s'");
        assert_eq!(vec![Token::SingleQuotedString("it's".to_string())], got);
    }

    #[test]
    fn comments_and_hints() {
        let got = tokens("SELECT /*+ STRAIGHT_JOIN */ -- trailing\n/* skipped */ 1");
        let expected = vec![
            word("SELECT"),
            Token::Hint("STRAIGHT_JOIN".to_string()),
            Token::Number("1".to_string()),
        ];
        assert_eq!(expected, got);
    }

    #[test]
    fn operators() {
        let got = tokens("a <> b != c <= d >= e == f || g @h");
        let expected = vec![
            word("a"),
            Token::Neq,
            word("b"),
            Token::Neq,
            word("c"),
            Token::LtEq,
            word("d"),
            Token::GtEq,
            word("e"),
            Token::DoubleEq,
            word("f"),
            Token::Concat,
            word("g"),
            Token::At,
            word("h"),
        ];
        assert_eq!(expected, got);
    }

    #[test]
    fn locations() {
        let toks = Tokenizer::new("SELECT\n  a").tokenize().unwrap();
        assert_eq!((1, 1), (toks[0].line, toks[0].col));
        assert_eq!((2, 3), (toks[1].line, toks[1].col));
    }

    #[test]
    fn unterminated_string() {
        let err = Tokenizer::new("SELECT 'abc").tokenize().unwrap_err();
        assert_eq!(Some((1, 8)), err.location);
    }
}
