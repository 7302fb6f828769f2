//! Message types exchanged between participants.

/// One data field's values, keyed by the data name.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldPayload {
    /// Name of the data field.
    pub name: String,
    /// Flat vertex-major values.
    pub values: Vec<f64>,
}

/// The data sent at one coupling exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct DataFrame {
    /// Time window the values belong to (1-based; 0 for initial data).
    pub window: u32,
    /// Sub-iteration within the window (1-based).
    pub iteration: u32,
    /// Convergence verdict of the controlling participant, if this frame
    /// carries one.
    pub converged: Option<bool>,
    /// The exchanged fields.
    pub fields: Vec<FieldPayload>,
}

/// A message on a participant-to-participant channel.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Connection greeting carrying the sender's participant name.
    Hello {
        /// Name of the sending participant.
        participant: String,
    },
    /// Coupling data.
    Data(DataFrame),
    /// Sent during `finalize`; the peer answers with its own `Goodbye`.
    Goodbye,
}

impl Message {
    /// Short name of the message kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Data(_) => "data",
            Self::Goodbye => "goodbye",
        }
    }
}
