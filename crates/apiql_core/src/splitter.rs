//! Splitting of compound query text into individual statements.

/// Iterator over the statements of a compound query.
///
/// Splits on `;` characters that are not inside a double quoted literal. A
/// `"` toggles the quoted state unless it is preceded by a backslash. Single
/// quotes are not considered.
///
/// The final segment is always yielded, even when empty, so joining all
/// segments with `;` reproduces the input exactly. Unterminated quotes never
/// fail, everything after the opening quote just ends up in one segment.
#[derive(Debug, Clone)]
pub struct StatementSplitter<'a> {
    remaining: Option<&'a str>,
}

impl<'a> StatementSplitter<'a> {
    pub fn new(text: &'a str) -> Self {
        StatementSplitter {
            remaining: Some(text),
        }
    }
}

impl<'a> Iterator for StatementSplitter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let text = self.remaining?;

        let mut in_quote = false;
        let mut prev = None;
        for (idx, c) in text.char_indices() {
            match c {
                '"' if prev != Some('\\') => in_quote = !in_quote,
                ';' if !in_quote => {
                    self.remaining = Some(&text[idx + 1..]);
                    return Some(&text[..idx]);
                }
                _ => (),
            }
            prev = Some(c);
        }

        self.remaining = None;
        Some(text)
    }
}

/// Split compound query text into statement segments.
pub fn split_statements(text: &str) -> Vec<&str> {
    StatementSplitter::new(text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn basic_split() {
        // (input, expected)
        let tests: [(&str, Vec<&str>); 6] = [
            ("", vec![""]),
            ("SELECT 1", vec!["SELECT 1"]),
            ("SELECT 1;", vec!["SELECT 1", ""]),
            ("SELECT 1; SELECT 2;", vec!["SELECT 1", " SELECT 2", ""]),
            (";;", vec!["", "", ""]),
            ("a;b", vec!["a", "b"]),
        ];

        for (input, expected) in tests {
            assert_eq!(expected, split_statements(input), "{input}");
        }
    }

    #[test]
    fn double_quotes_protect_semicolons() {
        let got = split_statements(r#"SELECT '"a;b"';"#);
        assert_eq!(vec![r#"SELECT '"a;b"'"#, ""], got);
    }

    #[test]
    fn escaped_quotes_do_not_toggle() {
        let got = split_statements(r#"SELECT "a\";b"; SELECT 2"#);
        assert_eq!(vec![r#"SELECT "a\";b""#, " SELECT 2"], got);
    }

    #[test]
    fn single_quotes_are_not_considered() {
        let got = split_statements("SELECT 'a;b'");
        assert_eq!(vec!["SELECT 'a", "b'"], got);
    }

    #[test]
    fn unterminated_quote_keeps_remainder() {
        let got = split_statements(r#"SELECT 1; SELECT "abc; SELECT 3"#);
        assert_eq!(vec!["SELECT 1", r#" SELECT "abc; SELECT 3"#], got);
    }

    #[test]
    fn rejoin_reproduces_input() {
        let inputs = [
            "",
            ";",
            "BEGIN; UPDATE t SET x = 1; COMMIT;",
            r#"SELECT "x;y" FROM t; SELECT '\";'"#,
            "  ;  \n; SELECT 1 ; ",
            "SELECT 'ünïcödé;'; SELECT 2",
        ];

        for input in inputs {
            let segments = split_statements(input);
            assert_eq!(input, segments.join(";"));
        }
    }
}
