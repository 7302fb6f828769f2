//! In-process channels for participants running as threads of one process.
//!
//! A [`LocalNetwork`] is a rendezvous table. The first of two participants
//! to call [`LocalNetwork::connect`] creates both directions of the link and
//! parks the far ends under the peer's name; the second call picks them up.
//! Neither call blocks, so participants may connect in any order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::channel::Channel;
use crate::error::TransportError;
use crate::types::Message;

type Endpoints = (Sender<Message>, Receiver<Message>);

/// Rendezvous table for in-process channels.
///
/// Cloning shares the table.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    pending: Arc<Mutex<HashMap<(String, String), Endpoints>>>,
}

impl LocalNetwork {
    /// Create an empty, private network.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide network shared by engines that were not given one.
    pub fn global() -> &'static LocalNetwork {
        static GLOBAL: OnceLock<LocalNetwork> = OnceLock::new();
        GLOBAL.get_or_init(LocalNetwork::new)
    }

    /// Connect `local` to `remote`.
    ///
    /// `timeout` bounds each later [`Channel::recv`] on the returned channel
    /// until [`Channel::set_recv_timeout`] replaces it.
    pub fn connect(
        &self,
        local: &str,
        remote: &str,
        timeout: Duration,
    ) -> Result<LocalChannel, TransportError> {
        let mut pending = self.pending.lock().map_err(|_| TransportError::Poisoned)?;
        let key = (local.to_string(), remote.to_string());
        if let Some((tx, rx)) = pending.remove(&key) {
            tracing::debug!(local, remote, "joined local channel");
            return Ok(LocalChannel {
                peer: remote.to_string(),
                tx,
                rx,
                timeout: Some(timeout),
            });
        }

        let (to_remote, from_local) = unbounded();
        let (to_local, from_remote) = unbounded();
        pending.insert(
            (remote.to_string(), local.to_string()),
            (to_local, from_local),
        );
        tracing::debug!(local, remote, "opened local channel");
        Ok(LocalChannel {
            peer: remote.to_string(),
            tx: to_remote,
            rx: from_remote,
            timeout: Some(timeout),
        })
    }

    /// Number of half-open links waiting for their second participant.
    pub fn pending_links(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for LocalNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalNetwork")
            .field("pending_links", &self.pending_links())
            .finish()
    }
}

/// One participant's end of an in-process link.
#[derive(Debug)]
pub struct LocalChannel {
    peer: String,
    tx: Sender<Message>,
    rx: Receiver<Message>,
    timeout: Option<Duration>,
}

impl Channel for LocalChannel {
    fn peer(&self) -> &str {
        &self.peer
    }

    fn send(&mut self, message: Message) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .map_err(|_| TransportError::Disconnected {
                peer: self.peer.clone(),
            })
    }

    fn recv(&mut self) -> Result<Message, TransportError> {
        let Some(timeout) = self.timeout else {
            return self.rx.recv().map_err(|_| TransportError::Disconnected {
                peer: self.peer.clone(),
            });
        };
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => TransportError::Timeout {
                peer: self.peer.clone(),
            },
            RecvTimeoutError::Disconnected => TransportError::Disconnected {
                peer: self.peer.clone(),
            },
        })
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.timeout = timeout.filter(|t| !t.is_zero());
        Ok(())
    }
}
