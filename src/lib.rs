pub mod cli;
mod client;
pub mod protocol;
mod value;

pub use client::{ClientError, Connection, QueryFuture, ShutdownHandle, connect};
pub use value::{Row, Value};
