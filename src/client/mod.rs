//! Multiplexed client connection.
//!
//! A [`Connection`] owns one TCP stream and lets several statements be outstanding on
//! it at once. Each request is numbered with a fresh [`Token`]; its result is claimed
//! through the [`QueryFuture`] returned when the request was sent. Responses are read
//! by a single background thread and may arrive in any order.
//!
//! # Example
//! ```no_run
//! use opentick::{Value, connect};
//!
//! let mut conn = connect("127.0.0.1", 1116, "test").unwrap();
//! let first = conn
//!     .execute_async("select * from bar where sec=?", &[Value::from(1)])
//!     .unwrap();
//! let second = conn
//!     .execute_async("select * from bar where sec=?", &[Value::from(2)])
//!     .unwrap();
//! let rows = first.get().unwrap();
//! let more = second.get().unwrap();
//! # let _ = (rows, more);
//! conn.close();
//! ```
//!
//! Sending takes `&mut Connection`, so requests are always written one after the
//! other. Futures may be waited on from any thread.
mod future;
mod receiver;
mod statement;

use std::{
    io,
    net::{Shutdown, TcpStream},
    sync::{Arc, mpsc},
};

use log::{debug, info};
use thiserror::Error;

use crate::{
    Row, Value,
    protocol::{Command, ProtocolTransport, Reply, Statement, Token, TransportError},
};

use future::{Shared, SharedDemux};
use receiver::ReceiverLoop;
use statement::PreparedCache;

pub use future::QueryFuture;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Error message returned by the server for one request.
    #[error("server error: {0}")]
    Server(String),

    /// The connection failed earlier; carries the original cause.
    #[error("connection lost: {0}")]
    Disconnected(String),

    #[error("unexpected reply to '{verb}': {reply}")]
    UnexpectedReply { verb: &'static str, reply: String },
}

impl From<io::Error> for ClientError {
    fn from(value: io::Error) -> Self {
        ClientError::Transport(TransportError::Io(value))
    }
}

/// Opens a connection and, if `db_name` is not empty, selects that database.
pub fn connect(host: &str, port: u16, db_name: &str) -> Result<Connection, ClientError> {
    let stream = TcpStream::connect((host, port))?;
    info!("connected to {host}:{port}");
    Connection::from_stream(stream, db_name)
}

pub struct Connection {
    transport: ProtocolTransport<TcpStream>,
    next_token: Token,
    prepared: PreparedCache,
    demux: SharedDemux,
    receiver: ReceiverLoop,
}

impl Connection {
    /// Sets up a connection on an already connected stream.
    pub fn from_stream(stream: TcpStream, db_name: &str) -> Result<Self, ClientError> {
        let (outbox, inbox) = mpsc::channel();
        let receiver = ReceiverLoop::spawn(stream.try_clone()?, outbox)?;

        // On failure `conn` is dropped, which closes the stream.
        let mut conn = Self {
            transport: ProtocolTransport::new(stream),
            next_token: 0,
            prepared: PreparedCache::default(),
            demux: Arc::new(Shared::new(inbox)),
            receiver,
        };

        if !db_name.is_empty() {
            let token = conn.allocate_token();
            conn.send(&Command::Use {
                token,
                database: db_name.to_string(),
            })?;
            conn.future(token).wait()?;
            info!("using database '{db_name}'");
        }

        Ok(conn)
    }

    /// Runs `sql` and waits for its rows.
    pub fn execute(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>, ClientError> {
        self.execute_async(sql, args)?.get()
    }

    /// Sends `sql` without waiting for its result.
    ///
    /// With arguments, the statement is prepared first. The first use of a given text
    /// waits for the `prepare` round-trip and caches the handle; later uses send the
    /// cached handle directly.
    pub fn execute_async(
        &mut self,
        sql: &str,
        args: &[Value],
    ) -> Result<QueryFuture, ClientError> {
        let statement = if args.is_empty() {
            Statement::Sql(sql.to_string())
        } else {
            let handle = match self.prepared.get(sql) {
                Some(handle) => handle,
                None => self.prepare(sql)?,
            };
            Statement::Handle(handle)
        };

        let token = self.allocate_token();
        self.send(&Command::Run {
            token,
            statement,
            args: args.to_vec(),
        })?;
        Ok(self.future(token))
    }

    /// Number of statements prepared on this connection.
    pub fn prepared_count(&self) -> usize {
        self.prepared.len()
    }

    /// Returns a handle that can shut the stream down from another thread,
    /// waking any blocked [`QueryFuture::get`].
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle, ClientError> {
        Ok(ShutdownHandle(self.transport.get_ref().try_clone()?))
    }

    /// Closes the stream. Futures still waiting observe an I/O error.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn prepare(&mut self, sql: &str) -> Result<i64, ClientError> {
        let token = self.allocate_token();
        self.send(&Command::Prepare {
            token,
            sql: sql.to_string(),
        })?;

        match self.future(token).wait()? {
            Some(Reply::Handle(handle)) => {
                debug!("prepared statement {handle}: {sql}");
                self.prepared.insert(sql, handle);
                Ok(handle)
            }
            other => Err(ClientError::UnexpectedReply {
                verb: "prepare",
                reply: format!("{other:?}"),
            }),
        }
    }

    fn allocate_token(&mut self) -> Token {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    fn send(&mut self, command: &Command) -> Result<(), ClientError> {
        debug!("sending {} with token {}", command.verb(), command.token());
        self.transport.write_command(command)?;
        Ok(())
    }

    fn future(&self, token: Token) -> QueryFuture {
        QueryFuture::new(token, Arc::clone(&self.demux))
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.transport.get_ref().shutdown(Shutdown::Both) {
            if e.kind() != io::ErrorKind::NotConnected {
                debug!("failed to shut down stream: {e}");
            }
        }
        self.receiver.join();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Shuts down the stream of a [`Connection`] from outside it.
#[derive(Debug)]
pub struct ShutdownHandle(TcpStream);

impl ShutdownHandle {
    pub fn shutdown(&self) -> io::Result<()> {
        self.0.shutdown(Shutdown::Both)
    }
}
