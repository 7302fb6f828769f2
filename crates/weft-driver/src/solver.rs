//! The solver seam and the reference power-law solver.

use std::error::Error;
use std::fmt;

use crate::buffer::FieldBuffers;
use crate::role::Role;

// ── Trait ──────────────────────────────────────────────────────────

/// A participant's numerical model, as seen by a [`Session`](crate::Session).
///
/// The session owns the field buffers: read fields are filled from the
/// engine before `solve`, written fields are sent to the engine after.
/// Solver-internal state that must survive a rejected iteration is
/// captured by `checkpoint` and put back by `restore`.
pub trait Solver {
    /// Snapshot of the solver's mutable state.
    type State: Clone;

    /// Fill the written fields with their initial values.
    fn initial_data(&mut self, buffers: &mut FieldBuffers);

    /// Compute one step of length `dt`.
    fn solve(&mut self, dt: f64, buffers: &mut FieldBuffers) -> Result<(), SolverError>;

    /// Capture the current state.
    fn checkpoint(&self) -> Self::State;

    /// Return to a captured state.
    fn restore(&mut self, state: &Self::State);

    /// Step length the solver would like, if smaller than the engine's.
    fn preferred_dt(&self) -> Option<f64> {
        None
    }
}

/// Errors from a [`Solver`].
#[derive(Clone, Debug, PartialEq)]
pub enum SolverError {
    /// A field the solver needs is not in the buffer set.
    MissingField {
        /// Name of the field.
        name: String,
    },
    /// The solver produced NaN or an infinity.
    NonFinite {
        /// Name of the field that holds the value.
        field: String,
    },
    /// Any other failure.
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { name } => write!(f, "field '{name}' is missing"),
            Self::NonFinite { field } => write!(f, "non-finite value in field '{field}'"),
            Self::Failed { reason } => f.write_str(reason),
        }
    }
}

impl Error for SolverError {}

// ── PowerSolver ────────────────────────────────────────────────────

/// Counters carried through checkpoints by [`PowerSolver`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PowerState {
    /// Accepted and pending steps since the start.
    pub steps: u64,
    /// Simulated time.
    pub time: f64,
}

/// Reference solver: every written field becomes the first read field
/// raised element-wise to `exponent`.
///
/// With exponent 1 the read values are copied, with exponent 2 they are
/// squared. A role without read fields leaves its written fields at the
/// initial value.
#[derive(Clone, Debug)]
pub struct PowerSolver {
    exponent: i32,
    initial_value: f64,
    source: Option<String>,
    targets: Vec<String>,
    max_dt: Option<f64>,
    state: PowerState,
}

impl PowerSolver {
    /// Solver for the fields of `role`.
    pub fn for_role(role: &Role, exponent: i32, initial_value: f64) -> Self {
        Self {
            exponent,
            initial_value,
            source: role.reads.first().map(|f| f.name.clone()),
            targets: role.writes.iter().map(|f| f.name.clone()).collect(),
            max_dt: None,
            state: PowerState::default(),
        }
    }

    /// Limit every step to `dt`, forcing sub-cycling when the coupling
    /// window is longer.
    pub fn with_max_dt(mut self, dt: f64) -> Self {
        self.max_dt = Some(dt);
        self
    }

    /// Current counters.
    pub fn state(&self) -> PowerState {
        self.state
    }
}

impl Solver for PowerSolver {
    type State = PowerState;

    fn initial_data(&mut self, buffers: &mut FieldBuffers) {
        for name in &self.targets {
            if let Some(b) = buffers.get_mut(name) {
                b.fill(self.initial_value);
            }
        }
    }

    fn solve(&mut self, dt: f64, buffers: &mut FieldBuffers) -> Result<(), SolverError> {
        self.state.steps += 1;
        self.state.time += dt;
        let Some(source) = &self.source else {
            return Ok(());
        };
        let input = buffers
            .get(source)
            .ok_or_else(|| SolverError::MissingField {
                name: source.clone(),
            })?
            .values()
            .to_vec();
        for name in &self.targets {
            let out = buffers
                .get_mut(name)
                .ok_or_else(|| SolverError::MissingField { name: name.clone() })?;
            if out.len() != input.len() {
                return Err(SolverError::Failed {
                    reason: format!(
                        "'{name}' holds {} values but '{source}' holds {}",
                        out.len(),
                        input.len()
                    ),
                });
            }
            for (o, i) in out.values_mut().iter_mut().zip(&input) {
                *o = i.powi(self.exponent);
            }
            if out.values().iter().any(|v| !v.is_finite()) {
                return Err(SolverError::NonFinite { field: name.clone() });
            }
        }
        Ok(())
    }

    fn checkpoint(&self) -> PowerState {
        self.state
    }

    fn restore(&mut self, state: &PowerState) {
        self.state = *state;
    }

    fn preferred_dt(&self) -> Option<f64> {
        self.max_dt
    }
}
