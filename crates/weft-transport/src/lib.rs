//! Point-to-point message channels between coupling participants.
//!
//! Two participants of one coupling scheme talk over a [`Channel`]:
//! [`LocalChannel`] when both live in the same process (threads, tests,
//! bindings), [`TcpChannel`] when they run as separate processes.
//! Messages are [`Message`] values; the TCP channel serializes them with
//! the binary format in [`codec`].
//!
//! # Wire format
//!
//! ```text
//! Preamble (once per connection):
//!   magic          4 bytes   b"WEFT"
//!   format_version u8        currently 1
//!
//! Message:
//!   tag            u8        1 = Hello, 2 = Data, 3 = Goodbye
//!   Hello:   participant (len-prefixed str)
//!   Data:    window u32, iteration u32, converged u8 (0 none, 1 false, 2 true),
//!            field_count u32, then per field: name (len-prefixed str),
//!            value_count u32, values (f64 LE × value_count)
//!   Goodbye: (empty)
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod channel;
pub mod codec;
pub mod error;
pub mod local;
pub mod tcp;
pub mod types;

pub use channel::Channel;
pub use error::TransportError;
pub use local::{LocalChannel, LocalNetwork};
pub use tcp::TcpChannel;
pub use types::{DataFrame, FieldPayload, Message};

/// Magic bytes opening every connection.
pub const MAGIC: [u8; 4] = *b"WEFT";

/// Current wire format version.
pub const FORMAT_VERSION: u8 = 1;
