//! TCP channels for participants running as separate processes.
//!
//! One side listens ([`TcpChannel::accept`]), the other dials
//! ([`TcpChannel::connect`]) and retries until its deadline, so the two
//! processes may start in either order. After the socket is up both sides
//! exchange the preamble and a [`Message::Hello`] naming themselves. The
//! connect timeout also bounds receives until
//! [`Channel::set_recv_timeout`] replaces it.

use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use crate::channel::Channel;
use crate::codec::{decode_message, decode_preamble, encode_message, encode_preamble};
use crate::error::TransportError;
use crate::types::Message;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One participant's end of a TCP link.
#[derive(Debug)]
pub struct TcpChannel {
    peer: String,
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl TcpChannel {
    /// Listen on `address` and accept one connection from `remote`.
    pub fn accept(
        local: &str,
        remote: &str,
        address: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(address)?;
        Self::accept_on(listener, local, remote, timeout)
    }

    /// Accept one connection from `remote` on an already-bound listener.
    pub fn accept_on(
        listener: TcpListener,
        local: &str,
        remote: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        listener.set_nonblocking(true)?;
        let deadline = Instant::now() + timeout;
        tracing::debug!(local, remote, addr = ?listener.local_addr().ok(), "waiting for peer");
        let stream = loop {
            match listener.accept() {
                Ok((stream, _)) => break stream,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::Timeout {
                            peer: remote.to_string(),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        };
        stream.set_nonblocking(false)?;
        Self::handshake(stream, local, remote, timeout)
    }

    /// Dial `address` until `remote` answers or `timeout` elapses.
    pub fn connect(
        local: &str,
        remote: &str,
        address: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let deadline = Instant::now() + timeout;
        let stream = loop {
            match TcpStream::connect(address) {
                Ok(stream) => break stream,
                Err(e) => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::ConnectFailed {
                            address: address.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        };
        Self::handshake(stream, local, remote, timeout)
    }

    fn handshake(
        stream: TcpStream,
        local: &str,
        remote: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        let mut channel = TcpChannel {
            peer: remote.to_string(),
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        };

        encode_preamble(&mut channel.writer)?;
        channel.send(Message::Hello {
            participant: local.to_string(),
        })?;

        decode_preamble(&mut channel.reader).map_err(|e| channel.classify(e))?;
        match channel.recv()? {
            Message::Hello { participant } if participant == remote => {
                tracing::info!(local, remote, "tcp channel established");
                Ok(channel)
            }
            Message::Hello { participant } => Err(TransportError::PeerMismatch {
                expected: remote.to_string(),
                found: participant,
            }),
            other => Err(TransportError::MalformedMessage {
                detail: format!("expected hello, got {}", other.kind()),
            }),
        }
    }

    fn classify(&self, err: TransportError) -> TransportError {
        match err {
            TransportError::Io(e) => match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => TransportError::Timeout {
                    peer: self.peer.clone(),
                },
                ErrorKind::UnexpectedEof
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe => TransportError::Disconnected {
                    peer: self.peer.clone(),
                },
                _ => TransportError::Io(e),
            },
            other => other,
        }
    }
}

impl Channel for TcpChannel {
    fn peer(&self) -> &str {
        &self.peer
    }

    fn send(&mut self, message: Message) -> Result<(), TransportError> {
        let result = encode_message(&mut self.writer, &message)
            .and_then(|()| self.writer.flush().map_err(TransportError::from));
        result.map_err(|e| self.classify(e))
    }

    fn recv(&mut self) -> Result<Message, TransportError> {
        decode_message(&mut self.reader).map_err(|e| self.classify(e))
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.reader
            .get_ref()
            .set_read_timeout(timeout.filter(|t| !t.is_zero()))?;
        Ok(())
    }
}
