//! Rendering of statement outputs.

use std::fmt;
use std::io::{self, Write};

use serde_json::{Value, json};

use crate::config::OutputFormat;
use crate::exec::eval::value_to_string;
use crate::exec::{ExecutorOutput, QueryResult};

/// Receives the output of every statement of a query.
pub trait ResponseHandler {
    fn handle(&mut self, output: &ExecutorOutput) -> io::Result<()>;
}

/// Writes outputs as text tables or one json object per line.
#[derive(Debug)]
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        OutputWriter { writer, format }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_text(&mut self, output: &ExecutorOutput) -> io::Result<()> {
        match output.result() {
            Ok(result) => {
                for message in &result.messages {
                    writeln!(self.writer, "{message}")?;
                }
                if !result.columns.is_empty() {
                    write!(self.writer, "{}", TextTable(result))?;
                }
            }
            Err(err) => writeln!(self.writer, "ERROR: {err}")?,
        }
        Ok(())
    }

    fn write_json(&mut self, output: &ExecutorOutput) -> io::Result<()> {
        let value = match output.result() {
            Ok(result) => serde_json::to_value(result)?,
            Err(err) => json!({ "error": err.to_string() }),
        };
        serde_json::to_writer(&mut self.writer, &value)?;
        writeln!(self.writer)
    }
}

impl<W: Write> ResponseHandler for OutputWriter<W> {
    fn handle(&mut self, output: &ExecutorOutput) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => self.write_text(output)?,
            OutputFormat::Json => self.write_json(output)?,
        }
        self.writer.flush()
    }
}

/// Collects outputs in memory.
#[derive(Debug, Default)]
pub struct CollectingHandler {
    pub results: Vec<Result<QueryResult, String>>,
}

impl ResponseHandler for CollectingHandler {
    fn handle(&mut self, output: &ExecutorOutput) -> io::Result<()> {
        let result = match output.result() {
            Ok(result) => Ok(result.clone()),
            Err(err) => Err(err.to_string()),
        };
        self.results.push(result);
        Ok(())
    }
}

struct TextTable<'a>(&'a QueryResult);

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        other => value_to_string(other),
    }
}

impl fmt::Display for TextTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.0;
        let rows: Vec<Vec<String>> = result
            .rows
            .iter()
            .map(|row| row.iter().map(cell).collect())
            .collect();

        let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
        for row in &rows {
            for (width, value) in widths.iter_mut().zip(row) {
                *width = (*width).max(value.chars().count());
            }
        }

        let write_row = |f: &mut fmt::Formatter<'_>, values: &[String]| -> fmt::Result {
            let line: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(idx, width)| {
                    let value = values.get(idx).map(String::as_str).unwrap_or("");
                    format!(" {value:<width$} ")
                })
                .collect();
            writeln!(f, "{}", line.join("|").trim_end())
        };

        write_row(f, &result.columns)?;
        let separator: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        writeln!(f, "{}", separator.join("+"))?;
        for row in &rows {
            write_row(f, row)?;
        }

        match rows.len() {
            1 => writeln!(f, "(1 row)"),
            n => writeln!(f, "({n} rows)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExecutionError;
    use pretty_assertions::assert_eq;

    fn render(format: OutputFormat, outputs: &[ExecutorOutput]) -> String {
        let mut writer = OutputWriter::new(Vec::new(), format);
        for output in outputs {
            writer.handle(output).unwrap();
        }
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn text_table() {
        let output = ExecutorOutput::from(QueryResult::with_rows(
            vec!["number".to_string(), "title".to_string()],
            vec![
                vec![json!(1), json!("first issue")],
                vec![json!(12), Value::Null],
            ],
        ));
        let expected = [
            " number | title",
            "--------+-------------",
            " 1      | first issue",
            " 12     | NULL",
            "(2 rows)",
            "",
        ]
        .join("\n");
        assert_eq!(expected, render(OutputFormat::Text, &[output]));
    }

    #[test]
    fn text_messages_and_errors() {
        let outputs = [
            ExecutorOutput::ack("OK"),
            ExecutorOutput::error(ExecutionError::Cancelled),
        ];
        assert_eq!(
            "OK\nERROR: statement execution cancelled\n",
            render(OutputFormat::Text, &outputs)
        );
    }

    #[test]
    fn json_lines() {
        let outputs = [
            ExecutorOutput::ack("OK"),
            ExecutorOutput::error(ExecutionError::Cancelled),
        ];
        assert_eq!(
            "{\"columns\":[],\"rows\":[],\"messages\":[\"OK\"]}\n{\"error\":\"statement execution cancelled\"}\n",
            render(OutputFormat::Json, &outputs)
        );
    }
}
