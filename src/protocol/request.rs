use std::collections::BTreeMap;

use crate::Value;

use super::{KEY_ARGS, KEY_PAYLOAD, KEY_TOKEN, KEY_VERB, Token, TransportError};

/// What a `run` command executes.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Raw SQL text.
    Sql(String),
    /// A handle returned by an earlier `prepare`.
    Handle(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Use {
        token: Token,
        database: String,
    },
    Prepare {
        token: Token,
        sql: String,
    },
    Run {
        token: Token,
        statement: Statement,
        args: Vec<Value>,
    },
}

impl Command {
    pub fn token(&self) -> Token {
        match self {
            Command::Use { token, .. } | Command::Prepare { token, .. } | Command::Run { token, .. } => {
                *token
            }
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::Use { .. } => "use",
            Command::Prepare { .. } => "prepare",
            Command::Run { .. } => "run",
        }
    }
}

impl From<&Command> for Value {
    fn from(command: &Command) -> Self {
        let mut doc = BTreeMap::new();
        // Tokens are allocated from zero upwards and never reach i64::MAX.
        doc.insert(KEY_TOKEN.to_string(), Value::Int(command.token() as i64));
        doc.insert(KEY_VERB.to_string(), Value::from(command.verb()));

        match command {
            Command::Use { database, .. } => {
                doc.insert(KEY_PAYLOAD.to_string(), Value::from(database.as_str()));
            }
            Command::Prepare { sql, .. } => {
                doc.insert(KEY_PAYLOAD.to_string(), Value::from(sql.as_str()));
            }
            Command::Run {
                statement, args, ..
            } => {
                let payload = match statement {
                    Statement::Sql(sql) => Value::from(sql.as_str()),
                    Statement::Handle(handle) => Value::Int(*handle),
                };
                doc.insert(KEY_PAYLOAD.to_string(), payload);
                doc.insert(KEY_ARGS.to_string(), Value::Seq(args.clone()));
            }
        }

        Value::Map(doc)
    }
}

impl TryFrom<Value> for Command {
    type Error = TransportError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Map(mut doc) = value else {
            return Err(TransportError::Malformed(format!(
                "command is not a document: {value}"
            )));
        };

        let token = super::response::take_token(&mut doc)?;
        let verb = match doc.remove(KEY_VERB) {
            Some(Value::Str(verb)) => verb,
            other => {
                return Err(TransportError::Malformed(format!(
                    "command verb must be a string, got {other:?}"
                )));
            }
        };
        let payload = doc.remove(KEY_PAYLOAD).unwrap_or(Value::Null);

        match (verb.as_str(), payload) {
            ("use", Value::Str(database)) => Ok(Command::Use { token, database }),
            ("prepare", Value::Str(sql)) => Ok(Command::Prepare { token, sql }),
            ("run", payload) => {
                let statement = match payload {
                    Value::Str(sql) => Statement::Sql(sql),
                    Value::Int(handle) => Statement::Handle(handle),
                    other => {
                        return Err(TransportError::Malformed(format!(
                            "run payload must be sql or a handle, got {other}"
                        )));
                    }
                };
                let args = match doc.remove(KEY_ARGS) {
                    Some(Value::Seq(args)) => args,
                    None | Some(Value::Null) => Vec::new(),
                    Some(other) => {
                        return Err(TransportError::Malformed(format!(
                            "run arguments must be a sequence, got {other}"
                        )));
                    }
                };
                Ok(Command::Run {
                    token,
                    statement,
                    args,
                })
            }
            (verb, payload) => Err(TransportError::Malformed(format!(
                "unsupported command '{verb}' with payload {payload}"
            ))),
        }
    }
}
