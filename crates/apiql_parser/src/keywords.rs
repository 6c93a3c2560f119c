/// Try to get a keyword from a string, ignoring string casing.
pub fn keyword_from_str(s: &str) -> Option<Keyword> {
    let s = unicase::Ascii::new(s);
    let idx = match KEYWORD_STRINGS.binary_search(&s) {
        Ok(idx) => idx,
        Err(_) => return None,
    };
    Some(ALL_KEYWORDS[idx])
}

/// Generate an enum of keywords.
///
/// Keywords must be listed in (case-insensitive) sorted order since lookups
/// use a binary search.
macro_rules! define_keywords {
    ($($ident:ident),*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[allow(non_camel_case_types)]
        pub enum Keyword {
            $($ident),*
        }

        pub const ALL_KEYWORDS: &[Keyword] = &[
            $(Keyword::$ident),*
        ];

        pub const KEYWORD_STRINGS: &[unicase::Ascii<&'static str>] = &[
            $(unicase::Ascii::new(stringify!($ident)),)*
        ];
    };
}

#[rustfmt::skip]
define_keywords!(
    ALL,
    AND,
    ANTI,
    AS,
    ASC,
    BEGIN,
    BETWEEN,
    BY,
    COMMIT,
    CREATE,
    CROSS,
    DELETE,
    DESC,
    DESCRIBE,
    DISTINCT,
    DROP,
    EXCEPT,
    EXEC,
    EXISTS,
    EXPLAIN,
    EXTENDED,
    FALSE,
    FROM,
    FULL,
    GROUP,
    HAVING,
    IF,
    IN,
    INNER,
    INSERT,
    INTERSECT,
    INTO,
    IS,
    JOIN,
    LEFT,
    LIKE,
    LIMIT,
    METHODS,
    NATURAL,
    NOT,
    NULL,
    OFFSET,
    ON,
    OR,
    ORDER,
    OUTER,
    PROVIDERS,
    RESOURCES,
    RIGHT,
    ROLLBACK,
    SELECT,
    SEMI,
    SERVICES,
    SET,
    SHOW,
    SLEEP,
    START,
    STRAIGHT_JOIN,
    TABLE,
    TO,
    TRANSACTION,
    TRUE,
    UNION,
    UPDATE,
    USE,
    USING,
    VALUES,
    WHERE,
    WORK,
    XOR
);

/// Keywords that can't be used as an implicit table alias.
///
/// `SELECT * FROM my_table LEFT JOIN ...` should not alias `my_table` to
/// `LEFT`.
pub const RESERVED_FOR_TABLE_ALIAS: &[Keyword] = &[
    Keyword::CROSS,
    Keyword::EXCEPT,
    Keyword::FULL,
    Keyword::GROUP,
    Keyword::HAVING,
    Keyword::INNER,
    Keyword::INTERSECT,
    Keyword::JOIN,
    Keyword::LEFT,
    Keyword::LIMIT,
    Keyword::NATURAL,
    Keyword::OFFSET,
    Keyword::ON,
    Keyword::ORDER,
    Keyword::OUTER,
    Keyword::RIGHT,
    Keyword::SET,
    Keyword::STRAIGHT_JOIN,
    Keyword::UNION,
    Keyword::USING,
    Keyword::VALUES,
    Keyword::WHERE,
];

/// Keywords that can't be used as an implicit column alias.
pub const RESERVED_FOR_COLUMN_ALIAS: &[Keyword] = &[
    Keyword::EXCEPT,
    Keyword::FROM,
    Keyword::GROUP,
    Keyword::HAVING,
    Keyword::INTERSECT,
    Keyword::LIMIT,
    Keyword::OFFSET,
    Keyword::ORDER,
    Keyword::UNION,
    Keyword::WHERE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive() {
        // (input, expected)
        let tests = [
            ("select", Some(Keyword::SELECT)),
            ("SeLeCt", Some(Keyword::SELECT)),
            ("SELECT", Some(Keyword::SELECT)),
            ("NOSELECT", None),
            ("order", Some(Keyword::ORDER)),
            ("straight_join", Some(Keyword::STRAIGHT_JOIN)),
            ("xor", Some(Keyword::XOR)),
            ("all", Some(Keyword::ALL)),
        ];

        for (input, expected) in tests {
            let got = keyword_from_str(input);
            assert_eq!(expected, got);
        }
    }

    #[test]
    fn keywords_sorted() {
        for pair in KEYWORD_STRINGS.windows(2) {
            assert!(pair[0] < pair[1], "{} should sort before {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn every_keyword_resolves() {
        for (s, kw) in KEYWORD_STRINGS.iter().zip(ALL_KEYWORDS) {
            assert_eq!(Some(*kw), keyword_from_str(s));
        }
    }
}
