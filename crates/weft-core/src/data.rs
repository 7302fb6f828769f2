//! Data field kinds.

use std::fmt;

/// Whether a data field holds one value or one vector per vertex.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// One `f64` per vertex.
    Scalar,
    /// `dimensions` values per vertex.
    #[default]
    Vector,
}

impl DataKind {
    /// Number of values stored per vertex in a space of `dimensions`.
    pub fn width(self, dimensions: usize) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vector => dimensions,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => f.write_str("scalar"),
            Self::Vector => f.write_str("vector"),
        }
    }
}
