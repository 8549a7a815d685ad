//! CLI utilities for opentick.
//!
//! The utilities present in this module can be used to build an interactive shell on
//! top of a [`Connection`](crate::Connection).
use std::io::{BufRead, Write};

use crate::Value;

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Exit command `.exit`, or end of input.
    Exit,
    /// A statement and the arguments to bind to its placeholders.
    Statement { sql: String, args: Vec<Value> },
}

/// Prompt user for a command.
///
/// A line of the form `sql | arg, arg` binds the literal arguments after the `|`.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, String>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ").map_err(|e| e.to_string())?;
    writer.flush().map_err(|e| e.to_string())?;

    let read = reader.read_line(&mut s).map_err(|e| e.to_string())?;
    if read == 0 {
        return Ok(Command::Exit);
    }

    match s.trim() {
        ".exit" => Ok(Command::Exit),
        s if s.starts_with('.') => Err(format!("unrecognized command '{}'", s)),
        s => {
            let (sql, args) = match s.split_once('|') {
                Some((sql, args)) => (sql.trim(), parse_args(args)?),
                None => (s, Vec::new()),
            };
            Ok(Command::Statement {
                sql: sql.to_string(),
                args,
            })
        }
    }
}

/// Parses a comma separated list of literals.
///
/// Integers, floats and `null` are recognized; anything else is a string, which may be
/// wrapped in single or double quotes to keep commas and surrounding spaces.
pub fn parse_args(input: &str) -> Result<Vec<Value>, String> {
    let mut args = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let value = match chars.peek() {
            None => break,
            Some(&(quote @ ('\'' | '"'))) => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => s.push(c),
                        None => return Err(format!("unterminated string '{s}'")),
                    }
                }
                while chars.next_if(|c| c.is_whitespace()).is_some() {}
                Value::Str(s)
            }
            Some(_) => {
                let mut raw = String::new();
                while let Some(c) = chars.next_if(|c| *c != ',') {
                    raw.push(c);
                }
                literal(raw.trim())
            }
        };
        args.push(value);

        match chars.next() {
            None => break,
            Some(',') => {}
            Some(c) => return Err(format!("expected ',' but found '{c}'")),
        }
    }

    Ok(args)
}

fn literal(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        Value::Null
    } else if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::Str(raw.to_string())
    }
}

/// Renders one result cell for display, leaving strings unquoted.
pub fn format_cell(cell: &Value) -> String {
    if cell.is_null() {
        "NULL".to_string()
    } else if let Some(s) = cell.as_str() {
        s.to_string()
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_prints_correctly() {
        let input = b".exit\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();

        let output = String::from_utf8(output).expect("not valid UTF-8");
        assert_eq!("> ", output);
    }

    #[test]
    fn prompt_handles_statements() {
        let input = b"select * from t\n";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output).unwrap();
        assert_eq!(
            Command::Statement {
                sql: "select * from t".into(),
                args: vec![]
            },
            res
        );
    }

    #[test]
    fn prompt_handles_arguments() {
        let input = b"select * from t where id=? and name=? | 5, 'a, b'\n";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output).unwrap();
        assert_eq!(
            Command::Statement {
                sql: "select * from t where id=? and name=?".into(),
                args: vec![Value::Int(5), Value::from("a, b")]
            },
            res
        );
    }

    #[test]
    fn end_of_input_exits() {
        let mut output = Vec::new();

        assert_eq!(prompt(&b""[..], &mut output).unwrap(), Command::Exit);
    }

    #[test]
    #[should_panic(expected = "unrecognized command '.something_wrong'")]
    fn prompt_unrecognized_command() {
        let input = b".something_wrong\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();
    }

    #[test]
    fn literals() {
        let args = parse_args(" 1, -2.5, null, abc , \"x y\"").unwrap();
        assert_eq!(
            args,
            vec![
                Value::Int(1),
                Value::Float(-2.5),
                Value::Null,
                Value::from("abc"),
                Value::from("x y"),
            ]
        );
    }

    #[test]
    fn empty_argument_list() {
        assert!(parse_args("   ").unwrap().is_empty());
    }

    #[test]
    fn unterminated_string() {
        assert!(parse_args("'abc").is_err());
    }

    #[test]
    fn junk_after_string() {
        assert!(parse_args("'abc' def").is_err());
    }

    #[test]
    fn cells_render_without_quotes() {
        let row = vec![Value::from("abc"), Value::Null, Value::Int(3), Value::Float(1.5)];
        let cells: Vec<String> = row.iter().map(format_cell).collect();

        assert_eq!(cells, vec!["abc", "NULL", "3", "1.5"]);
    }
}
