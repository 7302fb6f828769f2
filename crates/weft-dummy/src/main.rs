//! `solverdummy`: a stand-in participant for coupling runs.
//!
//! Looks up its role in the coupling configuration, places `--vertices`
//! points along the x axis, and drives a [`PowerSolver`] through the full
//! participant protocol. Final field values are printed to stdout, one
//! line per field; logs go to stderr.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use weft_core::{ParticipantInfo, Position};
use weft_driver::{DriverError, Participant, PowerSolver, RoleTable, Session};
use weft_engine::{CouplingConfig, LocalEngine};

/// Environment variable consulted before `RUST_LOG`.
const LOG_ENV: &str = "WEFT_LOG";

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "solverdummy",
    version,
    about = "Run one participant of a Weft coupling with a power-law solver"
)]
struct Cli {
    /// Coupling configuration file.
    config: PathBuf,

    /// Participant name, as declared in the configuration.
    participant: String,

    /// Mesh the participant provides; must match its configured mesh.
    mesh: String,

    /// Written fields become the first read field raised to this power.
    #[arg(long, default_value_t = 1)]
    exponent: i32,

    /// Value of written fields before the first solve.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    initial_value: f64,

    /// Number of mesh vertices.
    #[arg(long, default_value_t = 1)]
    vertices: usize,

    /// Rank of this process within the participant.
    #[arg(long, default_value_t = 0)]
    rank: u32,

    /// Number of processes of the participant.
    #[arg(long, default_value_t = 1)]
    size: u32,

    /// Log output format.
    #[arg(long, value_enum, env = "WEFT_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
    };

    // A second init (e.g. under a test harness) is harmless.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

fn positions(count: usize, dimensions: usize) -> Vec<Position> {
    (0..count)
        .map(|i| {
            let mut p = Position::from_elem(0.0, dimensions);
            p[0] = i as f64;
            p
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    // Everything below up to `LocalEngine::new` runs before the engine
    // sees a single call: a bad name or mesh never opens a channel.
    let roles = RoleTable::from_path(&cli.config)
        .with_context(|| format!("loading roles from {}", cli.config.display()))?;
    debug!(
        declared = ?roles.names().collect::<Vec<_>>(),
        "participants in configuration"
    );
    let role = roles.role(&cli.participant)?.clone();
    if role.mesh != cli.mesh {
        return Err(DriverError::UnknownMesh { name: cli.mesh })
            .with_context(|| format!("{} provides mesh {}", role.name, role.mesh));
    }
    if cli.vertices == 0 {
        anyhow::bail!("--vertices must be at least 1");
    }
    let config = CouplingConfig::from_path(&cli.config)
        .with_context(|| format!("validating {}", cli.config.display()))?;

    info!(
        participant = %role.name,
        mesh = %role.mesh,
        writes = role.writes.len(),
        reads = role.reads.len(),
        "starting solver dummy"
    );

    let info = ParticipantInfo::new(cli.participant.as_str(), cli.rank, cli.size)?;
    let mut participant = Participant::new(cli.participant.as_str(), LocalEngine::new(info));
    let mut solver = PowerSolver::for_role(&role, cli.exponent, cli.initial_value);
    let session = Session::new(
        role,
        &cli.config,
        positions(cli.vertices, config.dimensions),
    );
    let report = session.run(&mut participant, &mut solver)?;

    info!(
        windows = report.windows,
        advances = report.advances,
        restores = report.restores,
        time = report.time,
        fields = report.buffers.len(),
        "coupling finished"
    );
    for (name, buffer) in report.buffers.iter() {
        println!("{name}: {:?}", buffer.values());
    }
    Ok(())
}
