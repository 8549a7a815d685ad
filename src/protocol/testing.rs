//! Scripted in-process server for exercising the client over real sockets.
use std::{
    net::{SocketAddr, TcpListener, TcpStream},
    thread::{self, JoinHandle},
};

use crate::Value;

use super::{Command, ProtocolTransport, Reply, Response, Token};

pub(crate) type ServerTransport = ProtocolTransport<TcpStream>;

pub(crate) struct MockServer {
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Accepts a single connection and hands it to `script`.
    pub fn spawn<F>(script: F) -> Self
    where
        F: FnOnce(&mut ServerTransport) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut transport = ProtocolTransport::new(stream);
            script(&mut transport);
        });
        Self { addr, handle }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Waits for the script to finish, surfacing its assertion failures.
    pub fn join(self) {
        self.handle.join().expect("mock server script failed");
    }
}

pub(crate) fn reply(transport: &mut ServerTransport, token: Token, reply: Reply) {
    transport
        .write_response(&Response { token, reply })
        .unwrap();
}

pub(crate) fn expect_use(transport: &mut ServerTransport, database: &str) -> Token {
    match transport.read_command().unwrap() {
        Command::Use { token, database: db } => {
            assert_eq!(db, database);
            token
        }
        other => panic!("expected use, got {other:?}"),
    }
}

pub(crate) fn expect_prepare(transport: &mut ServerTransport, sql: &str) -> Token {
    match transport.read_command().unwrap() {
        Command::Prepare { token, sql: got } => {
            assert_eq!(got, sql);
            token
        }
        other => panic!("expected prepare, got {other:?}"),
    }
}

pub(crate) fn expect_run(transport: &mut ServerTransport) -> (Token, super::Statement, Vec<Value>) {
    match transport.read_command().unwrap() {
        Command::Run {
            token,
            statement,
            args,
        } => (token, statement, args),
        other => panic!("expected run, got {other:?}"),
    }
}

/// Blocks until the client hangs up.
pub(crate) fn wait_for_hangup(transport: &mut ServerTransport) {
    while transport.read_command().is_ok() {}
}
