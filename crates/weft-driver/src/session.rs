//! [`Session`]: the complete participant call sequence around a [`Solver`].

use std::path::{Path, PathBuf};

use weft_core::{Action, CouplingEngine, DataId, DataKind, Position, VertexId};

use crate::buffer::{FieldBuffer, FieldBuffers};
use crate::error::DriverError;
use crate::participant::{DataAccess, Participant};
use crate::role::{FieldSpec, Role};
use crate::solver::{Solver, SolverError};

/// Summary of a completed [`Session::run`].
#[derive(Clone, Debug, PartialEq)]
pub struct SessionReport {
    /// Successful `advance` calls, including rejected iterations.
    pub advances: u64,
    /// Time windows completed.
    pub windows: u32,
    /// Iteration checkpoints restored.
    pub restores: u32,
    /// Simulated time at the end of the run.
    pub time: f64,
    /// Field values after the last accepted step.
    pub buffers: FieldBuffers,
}

struct Handle {
    id: DataId,
    name: String,
    kind: DataKind,
}

struct Checkpoint<S> {
    solver: S,
    written: Vec<FieldBuffer>,
    time: f64,
}

/// Drives one participant from `configure` to `finalize`.
///
/// The sequence is: configure, register the role's mesh and data, set the
/// vertices, initialize, write initial data if required, initialize data,
/// then step until the engine ends the run. Each step fulfils a pending
/// write checkpoint by taking a snapshot, solves, writes, advances, reads,
/// and on a read checkpoint restores the snapshot taken at the last write
/// checkpoint. Repeated rejections restore the same snapshot.
#[derive(Clone, Debug)]
pub struct Session {
    role: Role,
    config_path: PathBuf,
    positions: Vec<Position>,
}

impl Session {
    /// Session for `role` with the given vertex positions.
    pub fn new(role: Role, config_path: impl Into<PathBuf>, positions: Vec<Position>) -> Self {
        Self {
            role,
            config_path: config_path.into(),
            positions,
        }
    }

    /// The role being played.
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// The configuration file passed to `configure`.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Run the coupled simulation to completion.
    pub fn run<E, S>(
        &self,
        participant: &mut Participant<E>,
        solver: &mut S,
    ) -> Result<SessionReport, DriverError>
    where
        E: CouplingEngine,
        S: Solver,
    {
        participant.configure(&self.config_path)?;
        let dims = participant.dimensions();
        let mesh = participant.register_mesh(&self.role.mesh)?;
        let ids = participant.set_vertices(mesh, &self.positions)?;

        let mut buffers = FieldBuffers::new();
        let mut register = |specs: &[FieldSpec],
                            access: DataAccess|
         -> Result<Vec<Handle>, DriverError> {
            specs
                .iter()
                .map(|f| {
                    let id = participant.register_data(&f.name, mesh, access)?;
                    let width = f.kind.width(dims);
                    buffers.insert(f.name.clone(), FieldBuffer::new(ids.len(), width));
                    Ok(Handle {
                        id,
                        name: f.name.clone(),
                        kind: f.kind,
                    })
                })
                .collect()
        };
        let writes = register(&self.role.writes, DataAccess::Write)?;
        let reads = register(&self.role.reads, DataAccess::Read)?;
        solver.initial_data(&mut buffers);

        let mut dt = participant.initialize()?;
        if participant.is_read_data_available()? {
            read_fields(participant, &reads, &ids, &mut buffers)?;
        }
        if participant.is_action_required(Action::WriteInitialData)? {
            write_fields(participant, &writes, &ids, &buffers)?;
            participant.fulfilled_action(Action::WriteInitialData)?;
        }
        participant.initialize_data()?;
        if participant.is_read_data_available()? {
            read_fields(participant, &reads, &ids, &mut buffers)?;
        }
        tracing::info!(
            participant = %participant.name(),
            vertices = ids.len(),
            dt,
            "entering time loop"
        );

        let mut time = 0.0;
        let mut windows = 0;
        let mut restores = 0;
        let mut checkpoint: Option<Checkpoint<S::State>> = None;
        while participant.is_coupling_ongoing()? {
            if participant.is_action_required(Action::WriteIterationCheckpoint)? {
                checkpoint = Some(Checkpoint {
                    solver: solver.checkpoint(),
                    written: snapshot(&writes, &buffers),
                    time,
                });
                participant.fulfilled_action(Action::WriteIterationCheckpoint)?;
            }

            let step = solver.preferred_dt().map_or(dt, |p| p.min(dt));
            solver.solve(step, &mut buffers)?;
            write_fields(participant, &writes, &ids, &buffers)?;
            dt = participant.advance(step)?;
            if participant.is_read_data_available()? {
                read_fields(participant, &reads, &ids, &mut buffers)?;
            }

            if participant.is_action_required(Action::ReadIterationCheckpoint)? {
                let snap = checkpoint.as_ref().ok_or_else(|| {
                    DriverError::Solver(SolverError::Failed {
                        reason: "iteration rejected before any checkpoint was taken".into(),
                    })
                })?;
                solver.restore(&snap.solver);
                for (handle, saved) in writes.iter().zip(&snap.written) {
                    if let Some(b) = buffers.get_mut(&handle.name) {
                        b.clone_from(saved);
                    }
                }
                time = snap.time;
                restores += 1;
                participant.fulfilled_action(Action::ReadIterationCheckpoint)?;
                tracing::debug!(participant = %participant.name(), restores, "iteration rejected");
            } else {
                time += step;
                if participant.is_time_window_complete()? {
                    windows += 1;
                    tracing::debug!(
                        participant = %participant.name(),
                        windows,
                        time,
                        "window complete"
                    );
                }
            }
        }

        participant.finalize()?;
        Ok(SessionReport {
            advances: participant.advances(),
            windows,
            restores,
            time,
            buffers,
        })
    }
}

fn snapshot(writes: &[Handle], buffers: &FieldBuffers) -> Vec<FieldBuffer> {
    writes
        .iter()
        .filter_map(|h| buffers.get(&h.name).cloned())
        .collect()
}

fn missing(name: &str) -> DriverError {
    DriverError::UnknownData {
        name: name.to_string(),
    }
}

fn write_fields<E: CouplingEngine>(
    participant: &mut Participant<E>,
    writes: &[Handle],
    ids: &[VertexId],
    buffers: &FieldBuffers,
) -> Result<(), DriverError> {
    for h in writes {
        let values = buffers.get(&h.name).ok_or_else(|| missing(&h.name))?.values();
        match h.kind {
            DataKind::Vector => participant.write_block_vector_data(h.id, ids, values)?,
            DataKind::Scalar => participant.write_block_scalar_data(h.id, ids, values)?,
        }
    }
    Ok(())
}

fn read_fields<E: CouplingEngine>(
    participant: &mut Participant<E>,
    reads: &[Handle],
    ids: &[VertexId],
    buffers: &mut FieldBuffers,
) -> Result<(), DriverError> {
    for h in reads {
        let out = buffers
            .get_mut(&h.name)
            .ok_or_else(|| missing(&h.name))?
            .values_mut();
        match h.kind {
            DataKind::Vector => participant.read_block_vector_data(h.id, ids, out)?,
            DataKind::Scalar => participant.read_block_scalar_data(h.id, ids, out)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::PowerSolver;
    use smallvec::smallvec;
    use weft_test_utils::{Call, ScriptedEngine};

    fn role() -> Role {
        Role {
            name: "SolverTwo".into(),
            mesh: "MeshTwo".into(),
            writes: vec![FieldSpec {
                name: "Velocities".into(),
                kind: DataKind::Vector,
            }],
            reads: vec![FieldSpec {
                name: "Forces".into(),
                kind: DataKind::Vector,
            }],
        }
    }

    fn engine() -> ScriptedEngine {
        ScriptedEngine::new(3)
            .with_mesh("MeshTwo")
            .with_data("Forces", "MeshTwo", DataKind::Vector)
            .with_data("Velocities", "MeshTwo", DataKind::Vector)
            .with_windows(5)
    }

    fn session() -> Session {
        Session::new(role(), "unused.toml", vec![smallvec![0.0, 0.0, 0.0]])
    }

    #[test]
    fn explicit_run_counts_windows() {
        let mut p = Participant::new("SolverTwo", engine());
        let mut s = PowerSolver::for_role(&role(), 2, 0.1);
        let report = session().run(&mut p, &mut s).unwrap();
        assert_eq!(report.windows, 5);
        assert_eq!(report.advances, 5);
        assert_eq!(report.restores, 0);
        assert!((report.time - 5.0).abs() < 1e-12);
        assert_eq!(p.state(), crate::ProtocolState::Terminated);
    }

    #[test]
    fn initial_data_written_before_initialize_data() {
        let mut p = Participant::new("SolverTwo", engine().requiring_initial_data());
        let mut s = PowerSolver::for_role(&role(), 2, 0.1);
        session().run(&mut p, &mut s).unwrap();
        let calls = p.engine().calls();
        let write = calls
            .iter()
            .position(|c| *c == Call::Write("Velocities".into()))
            .unwrap();
        let fulfil = calls
            .iter()
            .position(|c| *c == Call::FulfilledAction(Action::WriteInitialData))
            .unwrap();
        let init = calls.iter().position(|c| *c == Call::InitializeData).unwrap();
        assert!(write < fulfil && fulfil < init);
    }

    #[test]
    fn restores_the_same_snapshot_on_each_rejection() {
        let mut p = Participant::new("SolverTwo", engine().with_windows(3).with_checkpoints(2));
        let mut s = PowerSolver::for_role(&role(), 2, 0.1);
        let report = session().run(&mut p, &mut s).unwrap();
        assert_eq!(report.restores, 6);
        assert_eq!(report.advances, 9);
        assert_eq!(report.windows, 3);
        // Rejected iterations do not count towards time or solver steps.
        assert!((report.time - 3.0).abs() < 1e-12);
        assert_eq!(s.state().steps, 3);
    }

    /// Counts every solve and remembers each restored state.
    #[derive(Default)]
    struct Recorder {
        solves: u32,
        restored: Vec<u32>,
    }

    impl Solver for Recorder {
        type State = u32;

        fn initial_data(&mut self, _buffers: &mut FieldBuffers) {}

        fn solve(&mut self, _dt: f64, _buffers: &mut FieldBuffers) -> Result<(), SolverError> {
            self.solves += 1;
            Ok(())
        }

        fn checkpoint(&self) -> u32 {
            self.solves
        }

        fn restore(&mut self, state: &u32) {
            self.restored.push(*state);
            self.solves = *state;
        }
    }

    #[test]
    fn restore_hands_back_the_last_checkpoint() {
        let mut p = Participant::new("SolverTwo", engine().with_windows(4).with_checkpoints(3));
        let mut s = Recorder::default();
        let report = session().run(&mut p, &mut s).unwrap();
        assert_eq!(report.restores, 12);
        // One accepted solve per window: window w checkpoints at w solves,
        // and its three rejections all return there.
        let expected: Vec<u32> = (0..4).flat_map(|w| [w; 3]).collect();
        assert_eq!(s.restored, expected);
        assert_eq!(s.solves, 4);
    }

    #[test]
    fn solver_preferred_dt_subcycles() {
        let mut p = Participant::new("SolverTwo", engine().with_windows(1));
        let mut s = PowerSolver::for_role(&role(), 1, 0.0).with_max_dt(0.5);
        let report = session().run(&mut p, &mut s).unwrap();
        // The scripted engine completes a window on every advance.
        assert_eq!(report.advances, 1);
        assert!(p.engine().calls().contains(&Call::Advance(0.5)));
    }

    #[test]
    fn loopback_values_reach_the_solver() {
        let mut p = Participant::new(
            "SolverTwo",
            engine()
                .with_windows(1)
                .requiring_initial_data()
                .with_loopback("Velocities", "Forces"),
        );
        let mut s = PowerSolver::for_role(&role(), 2, 3.0);
        let report = session().run(&mut p, &mut s).unwrap();
        // Initial Velocities of 3 arrive as Forces, are squared into
        // Velocities, and loop back once more.
        assert_eq!(report.buffers.get("Forces").unwrap().values(), &[9.0; 3]);
        assert_eq!(report.buffers.get("Velocities").unwrap().values(), &[9.0; 3]);
    }

    #[test]
    fn unknown_mesh_fails_before_initialize() {
        let mut r = role();
        r.mesh = "MeshThree".into();
        let mut p = Participant::new("SolverTwo", engine());
        let mut s = PowerSolver::for_role(&r, 1, 0.0);
        let err = Session::new(r, "unused.toml", vec![smallvec![0.0; 3]])
            .run(&mut p, &mut s)
            .unwrap_err();
        assert_eq!(
            err,
            DriverError::UnknownMesh {
                name: "MeshThree".into()
            }
        );
        assert!(!p.engine().calls().contains(&Call::Initialize));
    }
}
