use std::collections::BTreeMap;

use crate::{Row, Value};

use super::{KEY_RESULT, KEY_TOKEN, Token, TransportError};

/// The result carried by a response, one variant per shape the server sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Reply to `prepare`.
    Handle(i64),
    Rows(Vec<Row>),
    /// Server-side error message.
    Error(String),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub token: Token,
    pub reply: Reply,
}

pub(crate) fn take_token(doc: &mut BTreeMap<String, Value>) -> Result<Token, TransportError> {
    match doc.remove(KEY_TOKEN) {
        Some(Value::Int(token)) => Token::try_from(token)
            .map_err(|_| TransportError::Malformed(format!("negative token {token}"))),
        other => Err(TransportError::Malformed(format!(
            "token must be an integer, got {other:?}"
        ))),
    }
}

impl TryFrom<Value> for Reply {
    type Error = TransportError;

    fn try_from(value: Value) -> Result<Self, TransportError> {
        match value {
            Value::Null => Ok(Reply::Null),
            Value::Int(handle) => Ok(Reply::Handle(handle)),
            Value::Str(message) => Ok(Reply::Error(message)),
            Value::Seq(rows) => rows
                .into_iter()
                .map(|row| match row {
                    Value::Seq(cells) => Ok(cells),
                    other => Err(TransportError::Malformed(format!(
                        "result row is not a sequence: {other}"
                    ))),
                })
                .collect::<Result<Vec<Row>, _>>()
                .map(Reply::Rows),
            other => Err(TransportError::Malformed(format!(
                "unsupported result {other}"
            ))),
        }
    }
}

impl From<&Reply> for Value {
    fn from(reply: &Reply) -> Self {
        match reply {
            Reply::Handle(handle) => Value::Int(*handle),
            Reply::Rows(rows) => Value::Seq(rows.iter().cloned().map(Value::Seq).collect()),
            Reply::Error(message) => Value::Str(message.clone()),
            Reply::Null => Value::Null,
        }
    }
}

impl TryFrom<Value> for Response {
    type Error = TransportError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Map(mut doc) = value else {
            return Err(TransportError::Malformed(format!(
                "response is not a document: {value}"
            )));
        };

        let token = take_token(&mut doc)?;
        let reply = doc.remove(KEY_RESULT).unwrap_or(Value::Null).try_into()?;
        Ok(Response { token, reply })
    }
}

impl From<&Response> for Value {
    fn from(response: &Response) -> Self {
        let mut doc = BTreeMap::new();
        doc.insert(KEY_TOKEN.to_string(), Value::Int(response.token as i64));
        doc.insert(KEY_RESULT.to_string(), Value::from(&response.reply));
        Value::Map(doc)
    }
}
