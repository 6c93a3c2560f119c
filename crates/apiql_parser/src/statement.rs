use crate::ast::{
    AstParseable, CreateTable, Delete, Describe, DropTable, Exec, Insert, QueryNode, SetVariable,
    Show, Sleep, Update, Use,
};
use crate::errors::Result;
use crate::keywords::Keyword;
use crate::parser::Parser;

/// `EXPLAIN <statement>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainNode {
    pub body: Box<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// SELECT/UNION queries.
    Query(QueryNode),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Exec(Exec),
    Show(Show),
    Describe(Describe),
    Explain(ExplainNode),
    Use(Use),
    SetVariable(SetVariable),
    Sleep(Sleep),
    CreateTable(CreateTable),
    DropTable(DropTable),
    /// `BEGIN [WORK|TRANSACTION]`, `START TRANSACTION`
    Begin,
    /// `COMMIT [WORK|TRANSACTION]`
    Commit,
    /// `ROLLBACK [WORK|TRANSACTION]`
    Rollback,
}

impl AstParseable for Statement {
    fn parse(parser: &mut Parser) -> Result<Self> {
        if QueryNode::is_query_node_start(parser) {
            return Ok(Statement::Query(QueryNode::parse(parser)?));
        }

        let keyword = match parser.peek() {
            Some(tok) => match tok.keyword() {
                Some(kw) => kw,
                None => {
                    return Err(parser.error_at(
                        format!("Expected a keyword, got {}", tok.token),
                        tok,
                    ));
                }
            },
            None => return Err(parser.expected("a SQL statement")),
        };

        let stmt = match keyword {
            Keyword::INSERT => Statement::Insert(Insert::parse(parser)?),
            Keyword::UPDATE => Statement::Update(Update::parse(parser)?),
            Keyword::DELETE => Statement::Delete(Delete::parse(parser)?),
            Keyword::EXEC => Statement::Exec(Exec::parse(parser)?),
            Keyword::SHOW => Statement::Show(Show::parse(parser)?),
            Keyword::DESCRIBE => Statement::Describe(Describe::parse(parser)?),
            Keyword::USE => Statement::Use(Use::parse(parser)?),
            Keyword::SET => Statement::SetVariable(SetVariable::parse(parser)?),
            Keyword::SLEEP => Statement::Sleep(Sleep::parse(parser)?),
            Keyword::CREATE => Statement::CreateTable(CreateTable::parse(parser)?),
            Keyword::DROP => Statement::DropTable(DropTable::parse(parser)?),
            Keyword::EXPLAIN => {
                parser.expect_keyword(Keyword::EXPLAIN)?;
                let body = Statement::parse(parser)?;
                Statement::Explain(ExplainNode {
                    body: Box::new(body),
                })
            }
            Keyword::BEGIN => {
                parser.expect_keyword(Keyword::BEGIN)?;
                parser.parse_one_of_keywords(&[Keyword::WORK, Keyword::TRANSACTION]);
                Statement::Begin
            }
            Keyword::START => {
                parser.expect_keyword(Keyword::START)?;
                parser.expect_keyword(Keyword::TRANSACTION)?;
                Statement::Begin
            }
            Keyword::COMMIT => {
                parser.expect_keyword(Keyword::COMMIT)?;
                parser.parse_one_of_keywords(&[Keyword::WORK, Keyword::TRANSACTION]);
                Statement::Commit
            }
            Keyword::ROLLBACK => {
                parser.expect_keyword(Keyword::ROLLBACK)?;
                parser.parse_one_of_keywords(&[Keyword::WORK, Keyword::TRANSACTION]);
                Statement::Rollback
            }
            other => return Err(parser.expected(&format!("a SQL statement, not {other:?}"))),
        };

        Ok(stmt)
    }
}

impl Statement {
    /// Short name of the statement kind, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Query(_) => "SELECT",
            Self::Insert(_) => "INSERT",
            Self::Update(_) => "UPDATE",
            Self::Delete(_) => "DELETE",
            Self::Exec(_) => "EXEC",
            Self::Show(_) => "SHOW",
            Self::Describe(_) => "DESCRIBE",
            Self::Explain(_) => "EXPLAIN",
            Self::Use(_) => "USE",
            Self::SetVariable(_) => "SET",
            Self::Sleep(_) => "SLEEP",
            Self::CreateTable(_) => "CREATE TABLE",
            Self::DropTable(_) => "DROP TABLE",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
        }
    }
}
