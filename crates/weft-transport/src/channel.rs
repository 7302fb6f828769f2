//! The channel abstraction shared by all transports.

use std::time::Duration;

use crate::error::TransportError;
use crate::types::Message;

/// A bidirectional, ordered, reliable link to one peer participant.
///
/// `recv` blocks until a message arrives or the channel's receive timeout
/// elapses. Without a receive timeout it waits for as long as the peer
/// takes.
pub trait Channel: Send {
    /// Name of the participant on the other end.
    fn peer(&self) -> &str;

    /// Send a message to the peer.
    fn send(&mut self, message: Message) -> Result<(), TransportError>;

    /// Receive the next message from the peer.
    fn recv(&mut self) -> Result<Message, TransportError>;

    /// Bound later `recv` calls. `None` or a zero duration waits without
    /// limit.
    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn peer(&self) -> &str {
        (**self).peer()
    }

    fn send(&mut self, message: Message) -> Result<(), TransportError> {
        (**self).send(message)
    }

    fn recv(&mut self) -> Result<Message, TransportError> {
        (**self).recv()
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        (**self).set_recv_timeout(timeout)
    }
}
