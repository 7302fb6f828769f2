//! Engine-issued actions and the [`ActionSet`] bit set.
//!
//! An action is a request from the coupling engine that the participant
//! perform one protocol step (write initial data, save or restore an
//! iteration checkpoint) and acknowledge it with `fulfilled_action`.

use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// The closed set of actions a coupling engine can require.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    /// Write initial values of the data sent in `initialize_data`.
    ///
    /// Only relevant between `initialize` and `initialize_data`.
    WriteInitialData,
    /// Snapshot the full mutable solver state so the window can be repeated.
    WriteIterationCheckpoint,
    /// The last sub-iteration was rejected: restore the snapshot taken at
    /// the matching [`Action::WriteIterationCheckpoint`].
    ReadIterationCheckpoint,
}

impl Action {
    /// All actions, in declaration order.
    pub const ALL: [Action; 3] = [
        Action::WriteInitialData,
        Action::WriteIterationCheckpoint,
        Action::ReadIterationCheckpoint,
    ];

    /// Stable kebab-case name used in logs and bindings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WriteInitialData => "write-initial-data",
            Self::WriteIterationCheckpoint => "write-iteration-checkpoint",
            Self::ReadIterationCheckpoint => "read-iteration-checkpoint",
        }
    }

    /// Whether this is one of the two iteration-checkpoint actions.
    pub fn is_checkpoint(self) -> bool {
        matches!(
            self,
            Self::WriteIterationCheckpoint | Self::ReadIterationCheckpoint
        )
    }

    fn bit(self) -> u8 {
        match self {
            Self::WriteInitialData => 1,
            Self::WriteIterationCheckpoint => 1 << 1,
            Self::ReadIterationCheckpoint => 1 << 2,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown action name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseActionError {
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ParseActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown action '{}'", self.input)
    }
}

impl Error for ParseActionError {}

impl FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ParseActionError {
                input: s.to_string(),
            })
    }
}

/// A small set of [`Action`]s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ActionSet(u8);

impl ActionSet {
    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Add an action. Returns `true` if it was not already present.
    pub fn insert(&mut self, action: Action) -> bool {
        let present = self.contains(action);
        self.0 |= action.bit();
        !present
    }

    /// Remove an action. Returns `true` if it was present.
    pub fn remove(&mut self, action: Action) -> bool {
        let present = self.contains(action);
        self.0 &= !action.bit();
        present
    }

    /// Whether the set contains `action`.
    pub fn contains(self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }

    /// Whether the set is empty.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Remove every action.
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Actions in `self` that are not in `other`.
    pub fn difference(self, other: ActionSet) -> ActionSet {
        ActionSet(self.0 & !other.0)
    }

    /// Iterate over the contained actions in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Action> {
        Action::ALL.into_iter().filter(move |a| self.contains(*a))
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut set = ActionSet::empty();
        for a in iter {
            set.insert(a);
        }
        set
    }
}

impl fmt::Display for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, a) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(a.as_str())?;
        }
        f.write_str("}")
    }
}
