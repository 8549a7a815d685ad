//! Demultiplexing of responses that share one stream.
//!
//! All futures of a connection drain the same delivery channel, fed by the
//! receiver loop. A future waiting for token `T` that reads the response for some
//! other token stashes it in the pending-result store, where the owner of that token
//! finds it later without touching the channel.
//!
//! The channel and the store sit behind a single mutex, so only one `get` drains
//! them at a time; any other caller blocks on the lock and then checks the store
//! before reading further. Dropping a future never waits on that mutex: when it is
//! held, the token is queued and folded in by whoever holds it.
use std::{
    collections::{HashMap, HashSet},
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, mpsc},
};

use log::trace;

use crate::{
    Row,
    protocol::{Reply, Response, Token, TransportError},
};

use super::ClientError;

/// What the receiver loop publishes: a decoded response or the error that ended it.
pub(crate) type Delivery = Result<Response, TransportError>;

pub(crate) type SharedDemux = Arc<Shared>;

#[derive(Debug)]
pub(crate) struct Shared {
    demux: Mutex<Demux>,
    /// Tokens dropped while `demux` was locked by a waiter.
    dropped: Mutex<Vec<Token>>,
}

impl Shared {
    pub fn new(inbox: mpsc::Receiver<Delivery>) -> Self {
        Self {
            demux: Mutex::new(Demux::new(inbox)),
            dropped: Mutex::new(Vec::new()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Demux> {
        let mut demux = self.demux.lock().unwrap_or_else(PoisonError::into_inner);
        demux.absorb(&self.dropped);
        demux
    }

    fn wait(&self, token: Token) -> Result<Option<Reply>, ClientError> {
        self.lock().wait(token, &self.dropped)
    }

    fn abandon(&self, token: Token) {
        match self.demux.try_lock() {
            Ok(mut demux) => demux.abandon(token),
            Err(TryLockError::Poisoned(e)) => e.into_inner().abandon(token),
            Err(TryLockError::WouldBlock) => {
                trace!("queueing dropped token {token}");
                self.dropped
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(token);
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct Demux {
    inbox: mpsc::Receiver<Delivery>,
    pending: HashMap<Token, Reply>,
    /// Tokens whose future was dropped before its response arrived.
    abandoned: HashSet<Token>,
    /// Set once the receiver loop has reported a fatal error.
    terminal: Option<String>,
}

impl Demux {
    pub fn new(inbox: mpsc::Receiver<Delivery>) -> Self {
        Self {
            inbox,
            pending: HashMap::new(),
            abandoned: HashSet::new(),
            terminal: None,
        }
    }

    /// Blocks until the reply for `token` is available.
    ///
    /// Returns `Ok(None)` when the channel closed without anything for `token`.
    pub fn wait(
        &mut self,
        token: Token,
        dropped: &Mutex<Vec<Token>>,
    ) -> Result<Option<Reply>, ClientError> {
        if let Some(reply) = self.pending.remove(&token) {
            trace!("token {token} claimed from pending store");
            return Ok(Some(reply));
        }
        if let Some(cause) = &self.terminal {
            return Err(ClientError::Disconnected(cause.clone()));
        }

        loop {
            let response = match self.inbox.recv() {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    self.terminal = Some(e.to_string());
                    return Err(e.into());
                }
                Err(mpsc::RecvError) => return Ok(None),
            };

            if response.token == token {
                return Ok(Some(response.reply));
            }
            self.absorb(dropped);
            if self.abandoned.remove(&response.token) {
                trace!("discarding response for abandoned token {}", response.token);
                continue;
            }
            trace!(
                "stashing response for token {} while waiting on {token}",
                response.token
            );
            self.pending.insert(response.token, response.reply);
        }
    }

    /// Forgets `token`: drops its stashed reply, or discards the reply when it arrives.
    pub fn abandon(&mut self, token: Token) {
        if self.pending.remove(&token).is_none() && self.terminal.is_none() {
            self.abandoned.insert(token);
        }
    }

    fn absorb(&mut self, dropped: &Mutex<Vec<Token>>) {
        let tokens = mem::take(&mut *dropped.lock().unwrap_or_else(PoisonError::into_inner));
        for token in tokens {
            self.abandon(token);
        }
    }

    #[cfg(test)]
    pub fn pending_tokens(&self) -> Vec<Token> {
        let mut tokens: Vec<Token> = self.pending.keys().copied().collect();
        tokens.sort_unstable();
        tokens
    }

    #[cfg(test)]
    pub fn abandoned_len(&self) -> usize {
        self.abandoned.len()
    }
}

/// Handle to the result of one request sent with
/// [`Connection::execute_async`](crate::Connection::execute_async).
///
/// Dropping a future without calling [`get`](QueryFuture::get) discards its result.
/// The drop does not block, even while another thread is waiting in `get`.
#[derive(Debug)]
#[must_use = "the result of a query is only observed through `get`"]
pub struct QueryFuture {
    token: Token,
    demux: SharedDemux,
    claimed: bool,
}

impl QueryFuture {
    pub(crate) fn new(token: Token, demux: SharedDemux) -> Self {
        Self {
            token,
            demux,
            claimed: false,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    /// Waits for the raw reply, turning server error messages into errors.
    pub(crate) fn wait(mut self) -> Result<Option<Reply>, ClientError> {
        self.claimed = true;
        let reply = self.demux.wait(self.token)?;
        match reply {
            Some(Reply::Error(message)) => Err(ClientError::Server(message)),
            reply => Ok(reply),
        }
    }

    /// Blocks until the result arrives and returns its rows.
    ///
    /// A server error message becomes [`ClientError::Server`]. Results that carry no
    /// table (null, a statement handle, or a closed channel) yield no rows.
    pub fn get(self) -> Result<Vec<Row>, ClientError> {
        match self.wait()? {
            Some(Reply::Rows(rows)) => Ok(rows),
            _ => Ok(Vec::new()),
        }
    }
}

impl Drop for QueryFuture {
    fn drop(&mut self) {
        if !self.claimed {
            self.demux.abandon(self.token);
        }
    }
}
