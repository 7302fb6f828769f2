//! Participant identity.

use std::fmt;

use crate::error::EngineError;

/// Identity of one simulation participant: name, process rank, and
/// process count.
///
/// Created at startup and immutable for the run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParticipantInfo {
    name: String,
    rank: u32,
    size: u32,
}

impl ParticipantInfo {
    /// Validate and build a participant identity.
    ///
    /// The name must be non-empty, `size` at least 1, and `rank < size`.
    pub fn new(name: impl Into<String>, rank: u32, size: u32) -> Result<Self, EngineError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EngineError::Config {
                reason: "participant name must not be empty".to_string(),
            });
        }
        if size == 0 {
            return Err(EngineError::Config {
                reason: "participant process count must be at least 1".to_string(),
            });
        }
        if rank >= size {
            return Err(EngineError::Config {
                reason: format!("process rank {rank} must be smaller than process count {size}"),
            });
        }
        Ok(Self { name, rank, size })
    }

    /// A single-process participant (`rank 0`, `size 1`).
    pub fn serial(name: impl Into<String>) -> Result<Self, EngineError> {
        Self::new(name, 0, 1)
    }

    /// The participant name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rank of this process within the participant.
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// Number of processes of this participant.
    pub fn size(&self) -> u32 {
        self.size
    }
}

impl fmt::Display for ParticipantInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}/{}]", self.name, self.rank, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_participant_is_rank_zero_of_one() {
        let p = ParticipantInfo::serial("SolverOne").unwrap();
        assert_eq!(p.name(), "SolverOne");
        assert_eq!(p.rank(), 0);
        assert_eq!(p.size(), 1);
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(ParticipantInfo::serial("  ").is_err());
    }

    #[test]
    fn rank_must_be_below_size() {
        assert!(ParticipantInfo::new("A", 1, 1).is_err());
        assert!(ParticipantInfo::new("A", 0, 0).is_err());
        assert!(ParticipantInfo::new("A", 3, 4).is_ok());
    }
}
