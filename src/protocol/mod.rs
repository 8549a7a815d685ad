//! Client-server communication protocol.
//!
//! This module defines the wire protocol spoken between opentick clients and servers:
//! the framing of messages on the byte stream, the positional document layout of
//! commands and responses, and a transport that reads and writes them.
//!
//! # Overview
//!
//! A single connection carries many requests at once. Every command is tagged with a
//! [`Token`] chosen by the client, and the server echoes that token in its response.
//! Responses may come back in any order; matching them to their requests is the job of
//! the client (see [`crate::QueryFuture`]).
//!
//! # Key Components
//!
//! - [`Command`]: A request from the client (`use`, `prepare` or `run`).
//! - [`Response`]: A server reply, carrying a tagged [`Reply`].
//! - [`ProtocolTransport`]: Reads and writes framed messages over any `Read + Write` stream.
//!
//! # Binary Format
//!
//! - Each frame begins with the body length as a 4-byte little-endian unsigned integer.
//!   The prefix does not count itself.
//! - The body is one [`Value`](crate::Value) document encoded with bincode.
//! - A frame of declared length zero carries nothing and is skipped by readers.
//!
//! Documents are maps keyed by stringified position rather than by field name:
//!
//! ```text
//! command:  {"0": token, "1": "use",     "2": database}
//!           {"0": token, "1": "prepare", "2": sql}
//!           {"0": token, "1": "run",     "2": sql | handle, "3": [args...]}
//! response: {"0": token, "1": handle | rows | error message | null}
//! ```
mod codec;
mod request;
mod response;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use codec::{MAX_FRAME, decode, encode};
pub use request::{Command, Statement};
pub use response::{Reply, Response};
pub use transport::{ProtocolTransport, TransportError};

/// Identifies one in-flight request on a connection.
pub type Token = u64;

/// Positional keys of a document.
pub(crate) const KEY_TOKEN: &str = "0";
pub(crate) const KEY_VERB: &str = "1";
pub(crate) const KEY_RESULT: &str = "1";
pub(crate) const KEY_PAYLOAD: &str = "2";
pub(crate) const KEY_ARGS: &str = "3";
