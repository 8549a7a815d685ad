use std::io::{self, Read, Write};

use thiserror::Error;

use super::{
    Command, Response,
    codec::{decode, write_document},
};
use crate::Value;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("frame of {0} bytes exceeds the {max} byte limit", max = super::MAX_FRAME)]
    FrameTooLarge(usize),
}

pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn write_command(&mut self, command: &Command) -> Result<(), TransportError> {
        write_document(&mut self.stream, &Value::from(command))
    }

    pub fn write_response(&mut self, resp: &Response) -> Result<(), TransportError> {
        write_document(&mut self.stream, &Value::from(resp))
    }

    pub fn read_response(&mut self) -> Result<Response, TransportError> {
        decode(&mut self.stream)?.try_into()
    }

    pub fn read_command(&mut self) -> Result<Command, TransportError> {
        decode(&mut self.stream)?.try_into()
    }
}
