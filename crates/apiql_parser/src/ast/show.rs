use std::fmt;

use crate::errors::Result;
use crate::keywords::Keyword;
use crate::parser::Parser;
use crate::tokens::Token;

use super::{AstParseable, ObjectReference};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowKind {
    Providers,
    Services,
    Resources,
    Methods,
    /// `SHOW <setting>`
    Variable(ObjectReference),
}

impl fmt::Display for ShowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Providers => write!(f, "PROVIDERS"),
            Self::Services => write!(f, "SERVICES"),
            Self::Resources => write!(f, "RESOURCES"),
            Self::Methods => write!(f, "METHODS"),
            Self::Variable(reference) => write!(f, "{reference}"),
        }
    }
}

/// `SHOW [EXTENDED] <kind> [IN <reference>] [LIKE '<pattern>']`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Show {
    pub extended: bool,
    pub kind: ShowKind,
    pub from: Option<ObjectReference>,
    pub like: Option<String>,
}

impl AstParseable for Show {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::SHOW)?;
        let extended = parser.parse_keyword(Keyword::EXTENDED);

        let kind = match parser.parse_one_of_keywords(&[
            Keyword::PROVIDERS,
            Keyword::SERVICES,
            Keyword::RESOURCES,
            Keyword::METHODS,
        ]) {
            Some(Keyword::PROVIDERS) => ShowKind::Providers,
            Some(Keyword::SERVICES) => ShowKind::Services,
            Some(Keyword::RESOURCES) => ShowKind::Resources,
            Some(_) => ShowKind::Methods,
            None => ShowKind::Variable(ObjectReference::parse(parser)?),
        };

        let from = if parser
            .parse_one_of_keywords(&[Keyword::IN, Keyword::FROM])
            .is_some()
        {
            Some(ObjectReference::parse(parser)?)
        } else {
            None
        };

        let like = if parser.parse_keyword(Keyword::LIKE) {
            match parser.next().map(|t| t.token.clone()) {
                Some(Token::SingleQuotedString(s)) => Some(s),
                _ => return Err(parser.expected("a quoted pattern after LIKE")),
            }
        } else {
            None
        };

        Ok(Show {
            extended,
            kind,
            from,
            like,
        })
    }
}

/// `DESCRIBE [EXTENDED] <reference>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Describe {
    pub extended: bool,
    pub reference: ObjectReference,
}

impl AstParseable for Describe {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::DESCRIBE)?;
        let extended = parser.parse_keyword(Keyword::EXTENDED);
        let reference = ObjectReference::parse(parser)?;
        Ok(Describe {
            extended,
            reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::testutil::parse_ast;
    use pretty_assertions::assert_eq;

    #[test]
    fn show_resources_in_like() {
        let show: Show = parse_ast("SHOW EXTENDED RESOURCES IN github.repos LIKE 'iss%'").unwrap();
        let expected = Show {
            extended: true,
            kind: ShowKind::Resources,
            from: Some(ObjectReference::from_strings(["github", "repos"])),
            like: Some("iss%".to_string()),
        };
        assert_eq!(expected, show);
    }

    #[test]
    fn show_variable() {
        let show: Show = parse_ast("SHOW application_name").unwrap();
        assert_eq!(
            ShowKind::Variable(ObjectReference::from_strings(["application_name"])),
            show.kind
        );
    }

    #[test]
    fn like_requires_string() {
        parse_ast::<Show>("SHOW PROVIDERS LIKE 5").unwrap_err();
    }

    #[test]
    fn describe_extended() {
        let describe: Describe = parse_ast("DESCRIBE EXTENDED github.repos.issues").unwrap();
        assert!(describe.extended);
        assert_eq!(
            ObjectReference::from_strings(["github", "repos", "issues"]),
            describe.reference
        );
    }
}
