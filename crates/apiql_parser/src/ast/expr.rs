use std::fmt;

use crate::errors::{ParseError, Result};
use crate::keywords::Keyword;
use crate::parser::Parser;
use crate::tokens::Token;

use super::{AstParseable, Ident, ObjectReference, QueryNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Plus, e.g. `+9`
    Plus,
    /// Minus, e.g. `-9`
    Minus,
    /// Not, e.g. `NOT(true)`
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    /// Plus, e.g. `a + b`
    Plus,
    /// Minus, e.g. `a - b`
    Minus,
    /// Multiply, e.g. `a * b`
    Multiply,
    /// Divide, e.g. `a / b`
    Divide,
    /// Modulo, e.g. `a % b`
    Modulo,
    /// String concat, e.g. `a || b`
    StringConcat,
    /// Greater than, e.g. `a > b`
    Gt,
    /// Less than, e.g. `a < b`
    Lt,
    /// Greater equal, e.g. `a >= b`
    GtEq,
    /// Less equal, e.g. `a <= b`
    LtEq,
    /// Equal, e.g. `a = b`
    Eq,
    /// Not equal, e.g. `a <> b`
    NotEq,
    /// And, e.g. `a AND b`
    And,
    /// Or, e.g. `a OR b`
    Or,
    /// XOR, e.g. `a XOR b`
    Xor,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::StringConcat => "||",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::GtEq => ">=",
            Self::LtEq => "<=",
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    /// Unparsed number literal.
    Number(String),
    /// String literal.
    SingleQuotedString(String),
    /// Boolean literal.
    Boolean(bool),
    /// Null literal
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::SingleQuotedString(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Null => write!(f, "NULL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionArg {
    /// `*`, only valid in aggregates like `count(*)`.
    Wildcard,
    Unnamed { arg: Expr },
    /// `name => arg`
    Named { name: Ident, arg: Expr },
}

impl AstParseable for FunctionArg {
    fn parse(parser: &mut Parser) -> Result<Self> {
        if parser.consume_token(&Token::Mul) {
            return Ok(FunctionArg::Wildcard);
        }

        let is_named = matches!(
            (parser.peek().map(|t| &t.token), parser.peek_nth(1).map(|t| &t.token), parser.peek_nth(2).map(|t| &t.token)),
            (Some(Token::Word(_)), Some(Token::Eq), Some(Token::Gt))
        );
        if is_named {
            let name = Ident::parse(parser)?;
            parser.expect_token(&Token::Eq)?;
            parser.expect_token(&Token::Gt)?;
            let arg = Expr::parse(parser)?;
            return Ok(FunctionArg::Named { name, arg });
        }

        Ok(FunctionArg::Unnamed {
            arg: Expr::parse(parser)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub reference: ObjectReference,
    pub distinct: bool,
    pub args: Vec<FunctionArg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Column or table identifier.
    Ident(Ident),
    /// Compound identifier.
    ///
    /// `table.col`
    CompoundIdent(Vec<Ident>),
    /// An expression literal,
    Literal(Literal),
    /// A binary expression.
    BinaryExpr {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// A unary expression.
    UnaryExpr {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    /// `<expr> IS [NOT] NULL`
    IsNull { expr: Box<Expr>, negated: bool },
    /// `<expr> IS [NOT] TRUE|FALSE`
    IsBool {
        expr: Box<Expr>,
        val: bool,
        negated: bool,
    },
    /// `<expr> [NOT] IN (<list>)`
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// `<expr> [NOT] IN (<subquery>)`
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<QueryNode>,
        negated: bool,
    },
    /// `<expr> [NOT] BETWEEN <low> AND <high>`
    Between {
        expr: Box<Expr>,
        negated: bool,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    /// `<expr> [NOT] LIKE <pattern>`
    Like {
        expr: Box<Expr>,
        negated: bool,
        pattern: Box<Expr>,
    },
    /// A function call.
    Function(Function),
    /// A parenthesized expression.
    Nested(Box<Expr>),
    /// `(a, b, ...)`
    Tuple(Vec<Expr>),
    /// A scalar subquery.
    Subquery(Box<QueryNode>),
    /// `[NOT] EXISTS (<subquery>)`
    Exists {
        subquery: Box<QueryNode>,
        negated: bool,
    },
}

impl AstParseable for Expr {
    fn parse(parser: &mut Parser) -> Result<Self> {
        Self::parse_subexpr(parser, 0)
    }
}

// Precdences, ordered low to high.
const PREC_OR: u8 = 10;
const PREC_XOR: u8 = 15;
const PREC_AND: u8 = 20;
const PREC_NOT: u8 = 30;
const PREC_IS: u8 = 40;
const PREC_COMPARISON: u8 = 50; // <=, =, etc
const PREC_CONTAINMENT: u8 = 60; // BETWEEN, IN, LIKE, etc
const PREC_EVERYTHING_ELSE: u8 = 70; // Anything without a specific precedence.
const PREC_ADD_SUB: u8 = 80;
const PREC_MUL_DIV_MOD: u8 = 90;
const PREC_UNARY: u8 = 100;

impl Expr {
    fn parse_subexpr(parser: &mut Parser, precendence: u8) -> Result<Self> {
        let mut expr = Expr::parse_prefix(parser)?;

        loop {
            let next_precedence = Self::get_infix_precedence(parser);
            if precendence >= next_precedence {
                break;
            }

            expr = Self::parse_infix(parser, expr, next_precedence)?;
        }

        Ok(expr)
    }

    fn parse_prefix(parser: &mut Parser) -> Result<Self> {
        let tok = match parser.next() {
            Some(tok) => tok.clone(),
            None => {
                return Err(ParseError::new(
                    "Expected prefix expression, found end of statement",
                ));
            }
        };

        let expr = match tok.token {
            Token::Word(w) => match w.keyword {
                Some(Keyword::TRUE) => Expr::Literal(Literal::Boolean(true)),
                Some(Keyword::FALSE) => Expr::Literal(Literal::Boolean(false)),
                Some(Keyword::NULL) => Expr::Literal(Literal::Null),
                Some(Keyword::NOT) => {
                    if parser.parse_keyword(Keyword::EXISTS) {
                        Expr::Exists {
                            subquery: Box::new(Self::parse_parenthesized_query(parser)?),
                            negated: true,
                        }
                    } else {
                        Expr::UnaryExpr {
                            op: UnaryOperator::Not,
                            expr: Box::new(Expr::parse_subexpr(parser, PREC_NOT)?),
                        }
                    }
                }
                Some(Keyword::EXISTS) => Expr::Exists {
                    subquery: Box::new(Self::parse_parenthesized_query(parser)?),
                    negated: false,
                },
                _ => {
                    let mut idents = vec![Ident::from_word(&w)];
                    while parser.consume_token(&Token::Period) {
                        idents.push(Ident::parse(parser)?);
                    }

                    if matches!(parser.peek().map(|t| &t.token), Some(Token::LeftParen)) {
                        Self::parse_function(parser, ObjectReference(idents))?
                    } else if idents.len() == 1 {
                        Expr::Ident(idents.remove(0))
                    } else {
                        Expr::CompoundIdent(idents)
                    }
                }
            },
            Token::SingleQuotedString(s) => Expr::Literal(Literal::SingleQuotedString(s)),
            Token::Number(s) => Expr::Literal(Literal::Number(s)),
            Token::Minus => Expr::UnaryExpr {
                op: UnaryOperator::Minus,
                expr: Box::new(Expr::parse_subexpr(parser, PREC_UNARY)?),
            },
            Token::Plus => Expr::UnaryExpr {
                op: UnaryOperator::Plus,
                expr: Box::new(Expr::parse_subexpr(parser, PREC_UNARY)?),
            },
            Token::LeftParen => {
                if matches!(parser.peek_keyword(), Some(Keyword::SELECT)) {
                    let subquery = QueryNode::parse(parser)?;
                    parser.expect_token(&Token::RightParen)?;
                    Expr::Subquery(Box::new(subquery))
                } else {
                    let mut exprs = parser.parse_comma_separated(Expr::parse)?;
                    parser.expect_token(&Token::RightParen)?;
                    if exprs.len() == 1 {
                        Expr::Nested(Box::new(exprs.remove(0)))
                    } else {
                        Expr::Tuple(exprs)
                    }
                }
            }
            other => {
                return Err(ParseError::with_location(
                    format!("Unexpected token '{other}'. Expected expression."),
                    tok.line,
                    tok.col,
                ));
            }
        };

        Ok(expr)
    }

    fn parse_function(parser: &mut Parser, reference: ObjectReference) -> Result<Self> {
        parser.expect_token(&Token::LeftParen)?;
        if parser.consume_token(&Token::RightParen) {
            return Ok(Expr::Function(Function {
                reference,
                distinct: false,
                args: Vec::new(),
            }));
        }
        let distinct = parser.parse_keyword(Keyword::DISTINCT);
        let args = parser.parse_comma_separated(FunctionArg::parse)?;
        parser.expect_token(&Token::RightParen)?;

        Ok(Expr::Function(Function {
            reference,
            distinct,
            args,
        }))
    }

    fn parse_parenthesized_query(parser: &mut Parser) -> Result<QueryNode> {
        parser.expect_token(&Token::LeftParen)?;
        let query = QueryNode::parse(parser)?;
        parser.expect_token(&Token::RightParen)?;
        Ok(query)
    }

    fn parse_infix(parser: &mut Parser, prefix: Expr, precendence: u8) -> Result<Self> {
        let tok = match parser.next() {
            Some(tok) => tok.clone(),
            None => {
                return Err(ParseError::new(
                    "Expected infix expression, found end of statement",
                ));
            }
        };

        let bin_op: Option<BinaryOperator> = match &tok.token {
            Token::DoubleEq => Some(BinaryOperator::Eq),
            Token::Eq => Some(BinaryOperator::Eq),
            Token::Neq => Some(BinaryOperator::NotEq),
            Token::Gt => Some(BinaryOperator::Gt),
            Token::GtEq => Some(BinaryOperator::GtEq),
            Token::Lt => Some(BinaryOperator::Lt),
            Token::LtEq => Some(BinaryOperator::LtEq),
            Token::Plus => Some(BinaryOperator::Plus),
            Token::Minus => Some(BinaryOperator::Minus),
            Token::Mul => Some(BinaryOperator::Multiply),
            Token::Div => Some(BinaryOperator::Divide),
            Token::Mod => Some(BinaryOperator::Modulo),
            Token::Concat => Some(BinaryOperator::StringConcat),
            Token::Word(w) => match w.keyword {
                Some(Keyword::AND) => Some(BinaryOperator::And),
                Some(Keyword::OR) => Some(BinaryOperator::Or),
                Some(Keyword::XOR) => Some(BinaryOperator::Xor),
                _ => None,
            },
            _ => None,
        };

        if let Some(op) = bin_op {
            return Ok(Expr::BinaryExpr {
                left: Box::new(prefix),
                op,
                right: Box::new(Expr::parse_subexpr(parser, precendence)?),
            });
        }

        match tok.keyword() {
            Some(Keyword::IS) => {
                let negated = parser.parse_keyword(Keyword::NOT);
                match parser.parse_one_of_keywords(&[Keyword::NULL, Keyword::TRUE, Keyword::FALSE])
                {
                    Some(Keyword::NULL) => Ok(Expr::IsNull {
                        expr: Box::new(prefix),
                        negated,
                    }),
                    Some(kw) => Ok(Expr::IsBool {
                        expr: Box::new(prefix),
                        val: kw == Keyword::TRUE,
                        negated,
                    }),
                    None => Err(parser.expected("NULL, TRUE, or FALSE after IS")),
                }
            }
            Some(Keyword::NOT) => {
                let kw = parser
                    .parse_one_of_keywords(&[Keyword::IN, Keyword::BETWEEN, Keyword::LIKE])
                    .ok_or_else(|| parser.expected("IN, BETWEEN, or LIKE after NOT"))?;
                Self::parse_containment(parser, prefix, kw, true)
            }
            Some(kw @ (Keyword::IN | Keyword::BETWEEN | Keyword::LIKE)) => {
                Self::parse_containment(parser, prefix, kw, false)
            }
            _ => Err(ParseError::with_location(
                format!("Unable to parse token '{}' as an expression", tok.token),
                tok.line,
                tok.col,
            )),
        }
    }

    /// Parse the remainder of an IN, BETWEEN, or LIKE expression.
    fn parse_containment(
        parser: &mut Parser,
        prefix: Expr,
        kw: Keyword,
        negated: bool,
    ) -> Result<Self> {
        match kw {
            Keyword::IN => {
                parser.expect_token(&Token::LeftParen)?;
                let expr = if matches!(parser.peek_keyword(), Some(Keyword::SELECT)) {
                    Expr::InSubquery {
                        expr: Box::new(prefix),
                        subquery: Box::new(QueryNode::parse(parser)?),
                        negated,
                    }
                } else {
                    Expr::InList {
                        expr: Box::new(prefix),
                        list: parser.parse_comma_separated(Expr::parse)?,
                        negated,
                    }
                };
                parser.expect_token(&Token::RightParen)?;
                Ok(expr)
            }
            Keyword::BETWEEN => {
                // Parse bounds above AND so the AND here isn't treated as a
                // conjunction.
                let low = Expr::parse_subexpr(parser, PREC_CONTAINMENT)?;
                parser.expect_keyword(Keyword::AND)?;
                let high = Expr::parse_subexpr(parser, PREC_CONTAINMENT)?;
                Ok(Expr::Between {
                    expr: Box::new(prefix),
                    negated,
                    low: Box::new(low),
                    high: Box::new(high),
                })
            }
            _ => Ok(Expr::Like {
                expr: Box::new(prefix),
                negated,
                pattern: Box::new(Expr::parse_subexpr(parser, PREC_CONTAINMENT)?),
            }),
        }
    }

    /// Get the relative precedence of the next operator.
    ///
    /// Returns zero if the next token isn't an infix operator.
    ///
    /// See <https://www.postgresql.org/docs/16/sql-syntax-lexical.html#SQL-PRECEDENCE>
    fn get_infix_precedence(parser: &Parser) -> u8 {
        let tok = match parser.peek() {
            Some(tok) => tok,
            None => return 0,
        };

        match &tok.token {
            Token::Word(w) => match w.keyword {
                Some(Keyword::OR) => PREC_OR,
                Some(Keyword::XOR) => PREC_XOR,
                Some(Keyword::AND) => PREC_AND,
                Some(Keyword::NOT) => {
                    // Precedence depends on keyword following it.
                    match parser.peek_nth(1).and_then(|t| t.keyword()) {
                        Some(Keyword::IN | Keyword::BETWEEN | Keyword::LIKE) => PREC_CONTAINMENT,
                        _ => 0,
                    }
                }
                Some(Keyword::IS) => PREC_IS,
                Some(Keyword::IN | Keyword::BETWEEN | Keyword::LIKE) => PREC_CONTAINMENT,
                _ => 0,
            },

            // Equalities
            Token::Eq
            | Token::DoubleEq
            | Token::Neq
            | Token::Lt
            | Token::LtEq
            | Token::Gt
            | Token::GtEq => PREC_COMPARISON,

            // Numeric operators
            Token::Plus | Token::Minus => PREC_ADD_SUB,
            Token::Mul | Token::Div | Token::Mod => PREC_MUL_DIV_MOD,

            // Concat
            Token::Concat => PREC_EVERYTHING_ELSE,

            _ => 0,
        }
    }

    /// Split an expression on top-level ANDs.
    ///
    /// `a = 1 AND (b = 2 AND c = 3)` returns all three comparisons.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::BinaryExpr {
                    left,
                    op: BinaryOperator::And,
                    right,
                } => {
                    stack.push(right);
                    stack.push(left);
                }
                Expr::Nested(inner) => stack.push(inner),
                other => out.push(other),
            }
        }
        out
    }

    /// Returns the column name this expression references, ignoring any
    /// qualifiers.
    pub fn column_name(&self) -> Option<&str> {
        match self {
            Expr::Ident(ident) => Some(ident.as_str()),
            Expr::CompoundIdent(idents) => idents.last().map(|ident| ident.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(ident) => write!(f, "{ident}"),
            Expr::CompoundIdent(idents) => {
                let parts: Vec<_> = idents.iter().map(|i| i.as_str()).collect();
                write!(f, "{}", parts.join("."))
            }
            Expr::Literal(lit) => write!(f, "{lit}"),
            Expr::BinaryExpr { left, op, right } => write!(f, "{left} {op} {right}"),
            Expr::UnaryExpr { op, expr } => match op {
                UnaryOperator::Plus => write!(f, "+{expr}"),
                UnaryOperator::Minus => write!(f, "-{expr}"),
                UnaryOperator::Not => write!(f, "NOT {expr}"),
            },
            Expr::IsNull { expr, negated } => {
                write!(f, "{expr} IS {}NULL", if *negated { "NOT " } else { "" })
            }
            Expr::IsBool { expr, val, negated } => write!(
                f,
                "{expr} IS {}{}",
                if *negated { "NOT " } else { "" },
                if *val { "TRUE" } else { "FALSE" }
            ),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let items: Vec<_> = list.iter().map(|e| e.to_string()).collect();
                write!(
                    f,
                    "{expr} {}IN ({})",
                    if *negated { "NOT " } else { "" },
                    items.join(", ")
                )
            }
            Expr::InSubquery { expr, negated, .. } => write!(
                f,
                "{expr} {}IN (<subquery>)",
                if *negated { "NOT " } else { "" }
            ),
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => write!(
                f,
                "{expr} {}BETWEEN {low} AND {high}",
                if *negated { "NOT " } else { "" }
            ),
            Expr::Like {
                expr,
                negated,
                pattern,
            } => write!(
                f,
                "{expr} {}LIKE {pattern}",
                if *negated { "NOT " } else { "" }
            ),
            Expr::Function(func) => {
                let args: Vec<_> = func
                    .args
                    .iter()
                    .map(|arg| match arg {
                        FunctionArg::Wildcard => "*".to_string(),
                        FunctionArg::Unnamed { arg } => arg.to_string(),
                        FunctionArg::Named { name, arg } => format!("{name} => {arg}"),
                    })
                    .collect();
                write!(
                    f,
                    "{}({}{})",
                    func.reference,
                    if func.distinct { "DISTINCT " } else { "" },
                    args.join(", ")
                )
            }
            Expr::Nested(expr) => write!(f, "({expr})"),
            Expr::Tuple(exprs) => {
                let items: Vec<_> = exprs.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", items.join(", "))
            }
            Expr::Subquery(_) => write!(f, "(<subquery>)"),
            Expr::Exists { negated, .. } => {
                write!(f, "{}EXISTS (<subquery>)", if *negated { "NOT " } else { "" })
            }
        }
    }
}
