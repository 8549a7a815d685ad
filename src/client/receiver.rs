use std::{
    io,
    net::TcpStream,
    sync::mpsc,
    thread::{self, JoinHandle},
};

use log::{debug, trace, warn};

use crate::protocol::ProtocolTransport;

use super::future::Delivery;

/// Background reader that owns the read half of a connection.
///
/// Every decoded response is forwarded to the delivery channel. The first read or
/// decode failure is forwarded as well, after which the loop ends for good.
#[derive(Debug)]
pub(crate) struct ReceiverLoop {
    thread: Option<JoinHandle<()>>,
}

impl ReceiverLoop {
    pub fn spawn(stream: TcpStream, outbox: mpsc::Sender<Delivery>) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name("opentick-receiver".into())
            .spawn(move || run(stream, outbox))?;

        Ok(Self {
            thread: Some(thread),
        })
    }

    /// Waits for the loop to exit. The socket must already be shut down.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("receiver thread panicked");
            }
        }
    }
}

fn run(stream: TcpStream, outbox: mpsc::Sender<Delivery>) {
    let mut transport = ProtocolTransport::new(stream);

    loop {
        match transport.read_response() {
            Ok(response) => {
                trace!("received response for token {}", response.token);
                if outbox.send(Ok(response)).is_err() {
                    debug!("no futures left to deliver to, stopping receiver");
                    return;
                }
            }
            Err(e) => {
                debug!("receiver loop stopped: {e}");
                let _ = outbox.send(Err(e));
                return;
            }
        }
    }
}
