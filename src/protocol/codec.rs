use std::io::{Read, Write};

use bincode::config::{Configuration, Fixint, Limit, LittleEndian};
use log::trace;

use crate::Value;

use super::TransportError;

const LENGTH_PREFIX: usize = size_of::<u32>();

/// Largest frame body accepted in either direction.
pub const MAX_FRAME: usize = 64 * 1024 * 1024;

fn config() -> Configuration<LittleEndian, Fixint, Limit<MAX_FRAME>> {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
        .with_limit::<MAX_FRAME>()
}

/// Serializes a document into one length-prefixed frame.
pub fn encode(document: &Value) -> Result<Vec<u8>, TransportError> {
    let body = bincode::encode_to_vec(document, config())?;
    if body.len() > MAX_FRAME {
        return Err(TransportError::FrameTooLarge(body.len()));
    }
    let len = body.len() as u32;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Reads the body of the next non-empty frame.
fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, TransportError> {
    loop {
        let mut head = [0; LENGTH_PREFIX];
        reader.read_exact(&mut head)?;

        let len = u32::from_le_bytes(head) as usize;
        if len == 0 {
            trace!("skipping empty frame");
            continue;
        }
        if len > MAX_FRAME {
            return Err(TransportError::FrameTooLarge(len));
        }

        let mut body = vec![0; len];
        reader.read_exact(&mut body)?;
        trace!("read frame of {len} bytes");
        return Ok(body);
    }
}

/// Reads the next frame and decodes its document.
pub fn decode<R: Read>(reader: &mut R) -> Result<Value, TransportError> {
    let body = read_frame(reader)?;
    let (document, read) = bincode::decode_from_slice(&body, config())?;
    if read != body.len() {
        return Err(TransportError::Malformed(format!(
            "frame declared {} bytes but document used {read}",
            body.len()
        )));
    }
    Ok(document)
}

pub(crate) fn write_document<W: Write>(
    writer: &mut W,
    document: &Value,
) -> Result<(), TransportError> {
    let frame = encode(document)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, io::Cursor};

    use super::*;

    #[test]
    fn length_prefix_excludes_itself() {
        let frame = encode(&Value::Str("abc".into())).unwrap();
        let len = u32::from_le_bytes(frame[..4].try_into().unwrap()) as usize;

        assert_eq!(len, frame.len() - 4);
    }

    #[test]
    fn nested_document() {
        let mut map = BTreeMap::new();
        map.insert("0".to_string(), Value::Int(-3));
        map.insert(
            "1".to_string(),
            Value::Seq(vec![
                Value::Seq(vec![Value::Float(1.5), Value::Null]),
                Value::Str("x".into()),
            ]),
        );
        let doc = Value::Map(map);

        let frame = encode(&doc).unwrap();
        assert_eq!(decode(&mut Cursor::new(frame)).unwrap(), doc);
    }

    #[test]
    fn skips_empty_frames() {
        let mut bytes = vec![0, 0, 0, 0, 0, 0, 0, 0];
        bytes.extend(encode(&Value::Int(9)).unwrap());

        assert_eq!(decode(&mut Cursor::new(bytes)).unwrap(), Value::Int(9));
    }

    #[test]
    fn consecutive_frames() {
        let mut bytes = encode(&Value::Int(1)).unwrap();
        bytes.extend(encode(&Value::Str("two".into())).unwrap());
        let mut reader = Cursor::new(bytes);

        assert_eq!(decode(&mut reader).unwrap(), Value::Int(1));
        assert_eq!(decode(&mut reader).unwrap(), Value::Str("two".into()));
    }

    #[test]
    fn truncated_body_is_io_error() {
        let mut frame = encode(&Value::Str("truncated".into())).unwrap();
        frame.truncate(frame.len() - 2);

        let err = decode(&mut Cursor::new(frame)).unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn trailing_bytes_are_malformed() {
        let mut frame = encode(&Value::Null).unwrap();
        let len = u32::from_le_bytes(frame[..4].try_into().unwrap()) + 1;
        frame[..4].copy_from_slice(&len.to_le_bytes());
        frame.push(0);

        let err = decode(&mut Cursor::new(frame)).unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    #[test]
    fn oversized_length_prefix() {
        let frame = (MAX_FRAME as u32 + 1).to_le_bytes().to_vec();

        let err = decode(&mut Cursor::new(frame)).unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge(len) if len == MAX_FRAME + 1));
    }

    #[test]
    fn huge_declared_sequence_is_rejected() {
        // Seq tag followed by a length of 2^61 and no items.
        let mut frame = vec![12, 0, 0, 0];
        frame.extend_from_slice(&4u32.to_le_bytes());
        frame.extend_from_slice(&(1u64 << 61).to_le_bytes());

        let err = decode(&mut Cursor::new(frame)).unwrap_err();
        assert!(matches!(err, TransportError::Deserialize(_)));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut doc = Value::Null;
        for _ in 0..=crate::value::MAX_DEPTH {
            doc = Value::Seq(vec![doc]);
        }

        let frame = encode(&doc).unwrap();
        let err = decode(&mut Cursor::new(frame)).unwrap_err();
        assert!(matches!(err, TransportError::Deserialize(_)));
    }

    #[test]
    fn nesting_at_the_limit_decodes() {
        let mut doc = Value::Null;
        for _ in 0..crate::value::MAX_DEPTH {
            doc = Value::Seq(vec![doc]);
        }

        let frame = encode(&doc).unwrap();
        assert_eq!(decode(&mut Cursor::new(frame)).unwrap(), doc);
    }

    #[test]
    fn garbage_body_fails_to_decode() {
        let frame = vec![4, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];

        let err = decode(&mut Cursor::new(frame)).unwrap_err();
        assert!(matches!(err, TransportError::Deserialize(_)));
    }
}
