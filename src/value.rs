//! Document values exchanged with the server.
//!
//! Every command and response body is a [`Value`]. The enum is the tagged form of
//! the "generic document" the server speaks: nested maps, ordered sequences,
//! integers, floats, strings and null. Result rows are plain sequences of values.
//!
//! # Timestamps
//!
//! The server has no native time type. A point in time travels as the pair
//! `[seconds, nanoseconds]` since the Unix epoch; [`Value::from`] accepts a
//! [`SystemTime`] and [`Value::as_timestamp`] reads such a pair back.
use std::{
    collections::BTreeMap,
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use bincode::{
    Decode, Encode,
    de::Decoder,
    error::{AllowedEnumVariants, DecodeError},
};

/// One row of a result table.
pub type Row = Vec<Value>;

/// Deepest nesting of sequences and maps accepted when decoding.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Encode)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Interprets a `[seconds, nanoseconds]` pair as a point in time.
    pub fn as_timestamp(&self) -> Option<SystemTime> {
        let Value::Seq(parts) = self else {
            return None;
        };
        match parts.as_slice() {
            [Value::Int(secs), Value::Int(nanos)] if (0..1_000_000_000).contains(nanos) => {
                let nanos = Duration::from_nanos(*nanos as u64);
                if *secs >= 0 {
                    UNIX_EPOCH.checked_add(Duration::from_secs(*secs as u64) + nanos)
                } else {
                    UNIX_EPOCH
                        .checked_sub(Duration::from_secs(secs.unsigned_abs()))?
                        .checked_add(nanos)
                }
            }
            _ => None,
        }
    }
}

// Mirrors the derived encoding (u32 variant tag, u64 lengths) but bounds the
// nesting depth so hostile input cannot exhaust the stack.
impl<Context> Decode<Context> for Value {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        decode_nested(decoder, 0)
    }
}

fn decode_nested<D: Decoder>(decoder: &mut D, depth: usize) -> Result<Value, DecodeError> {
    let tag = u32::decode(decoder)?;
    match tag {
        0 => Ok(Value::Null),
        1 => Ok(Value::Int(i64::decode(decoder)?)),
        2 => Ok(Value::Float(f64::decode(decoder)?)),
        3 => Ok(Value::Str(String::decode(decoder)?)),
        4 | 5 if depth >= MAX_DEPTH => Err(DecodeError::Other("document nested too deeply")),
        4 => {
            let len = container_len(decoder)?;
            decoder.claim_container_read::<Value>(len)?;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                decoder.unclaim_bytes_read(size_of::<Value>());
                items.push(decode_nested(decoder, depth + 1)?);
            }
            Ok(Value::Seq(items))
        }
        5 => {
            let len = container_len(decoder)?;
            decoder.claim_container_read::<(String, Value)>(len)?;
            let mut entries = BTreeMap::new();
            for _ in 0..len {
                decoder.unclaim_bytes_read(size_of::<(String, Value)>());
                let key = String::decode(decoder)?;
                entries.insert(key, decode_nested(decoder, depth + 1)?);
            }
            Ok(Value::Map(entries))
        }
        found => Err(DecodeError::UnexpectedVariant {
            type_name: "Value",
            allowed: &AllowedEnumVariants::Range { min: 0, max: 5 },
            found,
        }),
    }
}

fn container_len<D: Decoder>(decoder: &mut D) -> Result<usize, DecodeError> {
    let len = u64::decode(decoder)?;
    usize::try_from(len).map_err(|_| DecodeError::OutsideUsizeRange(len))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, item)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key:?}: {item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Seq(value.into_iter().map(Into::into).collect())
    }
}

impl From<SystemTime> for Value {
    fn from(value: SystemTime) -> Self {
        let (secs, nanos) = match value.duration_since(UNIX_EPOCH) {
            Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
            Err(e) => {
                // Before the epoch: round seconds down so nanos stays positive.
                let d = e.duration();
                let secs = -(d.as_secs() as i64);
                match d.subsec_nanos() {
                    0 => (secs, 0),
                    n => (secs - 1, 1_000_000_000 - n),
                }
            }
        };
        Value::Seq(vec![Value::Int(secs), Value::Int(nanos.into())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(Value::from(5), Value::Int(5));
        assert_eq!(Value::from("abc"), Value::Str("abc".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(
            Value::from(vec![1, 2]),
            Value::Seq(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn timestamp_pair() {
        let at = UNIX_EPOCH + Duration::new(1_500_000_000, 250_000_000);
        let value = Value::from(at);

        assert_eq!(
            value,
            Value::Seq(vec![Value::Int(1_500_000_000), Value::Int(250_000_000)])
        );
        assert_eq!(value.as_timestamp(), Some(at));
    }

    #[test]
    fn timestamp_before_epoch() {
        let at = UNIX_EPOCH - Duration::new(1, 250_000_000);
        let value = Value::from(at);

        assert_eq!(
            value,
            Value::Seq(vec![Value::Int(-2), Value::Int(750_000_000)])
        );
        assert_eq!(value.as_timestamp(), Some(at));
    }

    #[test]
    fn non_timestamp_values() {
        assert_eq!(Value::Int(3).as_timestamp(), None);
        assert_eq!(Value::from(vec![1, 2, 3]).as_timestamp(), None);
        assert_eq!(
            Value::Seq(vec![Value::Int(1), Value::Int(2_000_000_000)]).as_timestamp(),
            None
        );
    }

    #[test]
    fn display() {
        let row = Value::Seq(vec![Value::Int(1), Value::Str("a".into()), Value::Null]);
        assert_eq!(row.to_string(), r#"[1, "a", null]"#);
    }
}
