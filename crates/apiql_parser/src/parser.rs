use crate::ast::{AstParseable, Ident, NodeId};
use crate::errors::{ParseError, Result};
use crate::keywords::Keyword;
use crate::statement::Statement;
use crate::tokens::{Token, TokenWithLocation, Tokenizer};

/// Parse a SQL string containing exactly one statement.
///
/// A single trailing semicolon is allowed.
pub fn parse_statement(sql: &str) -> Result<Statement> {
    let mut parser = Parser::with_sql_string(sql)?;
    let stmt = parser.parse_statement()?;
    parser.consume_token(&Token::SemiColon);
    if let Some(tok) = parser.peek() {
        return Err(parser.error_at(
            format!("Expected end of statement, found '{}'", tok.token),
            tok,
        ));
    }
    Ok(stmt)
}

/// Parse a SQL string into any number of semicolon separated statements.
pub fn parse(sql: &str) -> Result<Vec<Statement>> {
    let mut parser = Parser::with_sql_string(sql)?;
    parser.parse_statements()
}

#[derive(Debug)]
pub struct Parser {
    toks: Vec<TokenWithLocation>,
    /// Index of token we should process next.
    pub(crate) idx: usize,
    /// Next id to hand out to a table expression node.
    next_node_id: u32,
}

impl Parser {
    pub fn with_tokens(toks: Vec<TokenWithLocation>) -> Self {
        Parser {
            toks,
            idx: 0,
            next_node_id: 0,
        }
    }

    pub fn with_sql_string(sql: &str) -> Result<Self> {
        let toks = Tokenizer::new(sql).tokenize()?;
        Ok(Parser::with_tokens(toks))
    }

    pub fn parse_statements(&mut self) -> Result<Vec<Statement>> {
        let mut stmts = Vec::new();
        let mut expecting_delimiter = false;

        loop {
            while self.consume_token(&Token::SemiColon) {
                expecting_delimiter = false;
            }

            let tok = match self.peek() {
                Some(tok) => tok,
                None => break,
            };

            if expecting_delimiter {
                return Err(self.error_at(
                    format!("Expected end of statement, found '{}'", tok.token),
                    tok,
                ));
            }

            let stmt = self.parse_statement()?;
            stmts.push(stmt);
            expecting_delimiter = true;
        }

        Ok(stmts)
    }

    pub fn parse_statement(&mut self) -> Result<Statement> {
        Statement::parse(self)
    }

    /// Hand out a fresh id for a table expression node.
    ///
    /// Ids are unique within a single parser.
    pub fn next_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    /// Parse a single keyword.
    pub fn parse_keyword(&mut self, keyword: Keyword) -> bool {
        let idx = self.idx;
        if let Some(tok) = self.next() {
            if tok.is_keyword(keyword) {
                return true;
            }
        }

        // Keyword doesn't match. Reset index and return.
        self.idx = idx;
        false
    }

    /// Parse an exact sequence of keywords.
    ///
    /// If the sequence doesn't match, idx is not changed, and false is
    /// returned.
    pub fn parse_keyword_sequence(&mut self, keywords: &[Keyword]) -> bool {
        let idx = self.idx;
        for keyword in keywords {
            if let Some(tok) = self.next() {
                if tok.is_keyword(*keyword) {
                    continue;
                }
            }

            // Keyword doesn't match. Reset index and return.
            self.idx = idx;
            return false;
        }
        true
    }

    /// Parse any of the provided keywords, returning which keyword was
    /// parsed.
    pub fn parse_one_of_keywords(&mut self, keywords: &[Keyword]) -> Option<Keyword> {
        let idx = self.idx;
        let kw = self.next().and_then(|tok| tok.keyword());

        if let Some(kw) = kw {
            if keywords.contains(&kw) {
                return Some(kw);
            }
        }

        // No matches, reset index.
        self.idx = idx;
        None
    }

    pub fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        if self.parse_keyword(keyword) {
            return Ok(());
        }
        Err(self.expected(&format!("{keyword:?}")))
    }

    /// Consume the next token if it matches the expected token.
    pub fn consume_token(&mut self, expected: &Token) -> bool {
        let matches = matches!(self.peek(), Some(tok) if &tok.token == expected);
        if matches {
            self.idx += 1;
        }
        matches
    }

    pub fn expect_token(&mut self, expected: &Token) -> Result<()> {
        if self.consume_token(expected) {
            return Ok(());
        }
        Err(self.expected(&format!("'{expected}'")))
    }

    /// Parse a comma separated list of items using the provided function.
    pub fn parse_comma_separated<T>(
        &mut self,
        mut f: impl FnMut(&mut Parser) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut values = Vec::new();
        loop {
            values.push(f(self)?);
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }
        Ok(values)
    }

    /// Parse a comma separated list of items wrapped in parentheses.
    ///
    /// `()` produces an empty list.
    pub fn parse_parenthesized_comma_separated<T>(
        &mut self,
        f: impl FnMut(&mut Parser) -> Result<T>,
    ) -> Result<Vec<T>> {
        self.expect_token(&Token::LeftParen)?;
        if self.consume_token(&Token::RightParen) {
            return Ok(Vec::new());
        }
        let values = self.parse_comma_separated(f)?;
        self.expect_token(&Token::RightParen)?;
        Ok(values)
    }

    /// Parse an optional alias, either explicit with `AS` or implicit.
    ///
    /// Implicit aliases are not allowed to be any of the `reserved` keywords.
    pub fn parse_alias(&mut self, reserved: &[Keyword]) -> Result<Option<Ident>> {
        let has_as = self.parse_keyword(Keyword::AS);
        let tok = match self.peek() {
            Some(tok) => tok,
            None if has_as => return Err(self.expected("an alias after AS")),
            None => return Ok(None),
        };

        match &tok.token {
            Token::Word(w) => {
                if !has_as {
                    if let Some(kw) = w.keyword {
                        if reserved.contains(&kw) {
                            return Ok(None);
                        }
                    }
                }
                let ident = Ident::from_word(w);
                self.idx += 1;
                Ok(Some(ident))
            }
            _ if has_as => Err(self.expected("an alias after AS")),
            _ => Ok(None),
        }
    }

    /// Get the next token, advancing the parser.
    pub fn next(&mut self) -> Option<&TokenWithLocation> {
        let tok = self.toks.get(self.idx)?;
        self.idx += 1;
        Some(tok)
    }

    /// Get the next token without advancing.
    pub fn peek(&self) -> Option<&TokenWithLocation> {
        self.peek_nth(0)
    }

    /// Get the nth next token without advancing.
    pub fn peek_nth(&self, n: usize) -> Option<&TokenWithLocation> {
        self.toks.get(self.idx + n)
    }

    pub fn peek_keyword(&self) -> Option<Keyword> {
        self.peek().and_then(|tok| tok.keyword())
    }

    /// Build an error describing what was expected and what the next token
    /// actually is.
    pub fn expected(&self, what: &str) -> ParseError {
        match self.peek() {
            Some(tok) => self.error_at(format!("Expected {what}, found '{}'", tok.token), tok),
            None => ParseError::new(format!("Expected {what}, found end of statement")),
        }
    }

    pub fn error_at(&self, msg: impl Into<String>, tok: &TokenWithLocation) -> ParseError {
        ParseError::with_location(msg, tok.line, tok.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_sequence_resets_on_mismatch() {
        let mut parser = Parser::with_sql_string("LEFT OUTER JOIN").unwrap();
        assert!(!parser.parse_keyword_sequence(&[Keyword::LEFT, Keyword::JOIN]));
        assert_eq!(0, parser.idx);
        assert!(parser.parse_keyword_sequence(&[Keyword::LEFT, Keyword::OUTER, Keyword::JOIN]));
        assert!(parser.peek().is_none());
    }

    #[test]
    fn one_of_keywords() {
        let mut parser = Parser::with_sql_string("RIGHT JOIN").unwrap();
        assert_eq!(None, parser.parse_one_of_keywords(&[Keyword::LEFT]));
        assert_eq!(
            Some(Keyword::RIGHT),
            parser.parse_one_of_keywords(&[Keyword::LEFT, Keyword::RIGHT])
        );
    }

    #[test]
    fn alias_respects_reserved() {
        let mut parser = Parser::with_sql_string("LEFT").unwrap();
        assert_eq!(None, parser.parse_alias(&[Keyword::LEFT]).unwrap());

        let mut parser = Parser::with_sql_string("AS LEFT").unwrap();
        assert_eq!(
            Some(Ident::from_string("LEFT")),
            parser.parse_alias(&[Keyword::LEFT]).unwrap()
        );
    }

    #[test]
    fn node_ids_increase() {
        let mut parser = Parser::with_tokens(Vec::new());
        assert_eq!(NodeId(0), parser.next_node_id());
        assert_eq!(NodeId(1), parser.next_node_id());
    }

    #[test]
    fn multiple_statements() {
        let stmts = parse("BEGIN; COMMIT;; ROLLBACK").unwrap();
        assert_eq!(
            vec![Statement::Begin, Statement::Commit, Statement::Rollback],
            stmts
        );
    }

    #[test]
    fn trailing_garbage() {
        let err = parse_statement("COMMIT foo").unwrap_err();
        assert!(err.msg.contains("Expected end of statement"), "{err}");
    }
}
