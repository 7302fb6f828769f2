//! Coupling configuration file, validation, and error types.
//!
//! [`CouplingConfig`] is deserialized from TOML and then checked by
//! [`validate()`](CouplingConfig::validate). Every check is fatal: a run
//! never starts from a configuration that failed validation.

use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use weft_core::{DataKind, EngineError};

// ── Defaults ──────────────────────────────────────────────────────

fn default_max_iterations() -> u32 {
    1
}

fn default_valid_digits() -> u32 {
    10
}

fn default_address() -> String {
    "127.0.0.1:47700".to_string()
}

fn default_timeout_ms() -> u64 {
    60_000
}

// ── Sections ──────────────────────────────────────────────────────

/// Value kind of a data field as written in the configuration file.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KindName {
    /// One value per vertex.
    Scalar,
    /// `dimensions` values per vertex.
    #[default]
    Vector,
}

impl From<KindName> for DataKind {
    fn from(k: KindName) -> Self {
        match k {
            KindName::Scalar => DataKind::Scalar,
            KindName::Vector => DataKind::Vector,
        }
    }
}

/// A `[[data]]` table.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// Data name, unique across the file.
    pub name: String,
    /// Scalar or vector. Default: vector.
    #[serde(default)]
    pub kind: KindName,
}

/// A `[[mesh]]` table.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MeshConfig {
    /// Mesh name, unique across the file.
    pub name: String,
    /// Data fields carried by the mesh.
    #[serde(default)]
    pub data: Vec<String>,
}

/// A `[[participant]]` table.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ParticipantConfig {
    /// Participant name, unique across the file.
    pub name: String,
    /// The mesh this participant provides.
    pub mesh: String,
    /// Data the participant writes.
    #[serde(default)]
    pub writes: Vec<String>,
    /// Data the participant reads.
    #[serde(default)]
    pub reads: Vec<String>,
}

/// Coupling scheme kind.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SchemeKind {
    /// First participant computes, then second; one pass per window.
    SerialExplicit,
    /// Both participants compute concurrently; one pass per window.
    ParallelExplicit,
    /// Serial, with sub-iterations until convergence.
    SerialImplicit,
    /// Parallel, with sub-iterations until convergence.
    ParallelImplicit,
}

impl SchemeKind {
    /// Whether the participants take turns within a window.
    pub fn is_serial(self) -> bool {
        matches!(self, Self::SerialExplicit | Self::SerialImplicit)
    }

    /// Whether windows are iterated until convergence.
    pub fn is_implicit(self) -> bool {
        matches!(self, Self::SerialImplicit | Self::ParallelImplicit)
    }
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SerialExplicit => "serial-explicit",
            Self::ParallelExplicit => "parallel-explicit",
            Self::SerialImplicit => "serial-implicit",
            Self::ParallelImplicit => "parallel-implicit",
        })
    }
}

/// A `[[coupling.exchange]]` table.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExchangeConfig {
    /// The exchanged data.
    pub data: String,
    /// Sending participant.
    pub from: String,
    /// Receiving participant.
    pub to: String,
    /// Whether the sender provides values in `initialize_data`.
    #[serde(default)]
    pub initialize: bool,
}

/// A `[[coupling.convergence]]` table.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConvergenceConfig {
    /// The measured data.
    pub data: String,
    /// Relative limit: converged when `|x - x_prev| <= limit * |x|`.
    pub limit: f64,
}

/// How the two participants of a coupling reach each other.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// TCP sockets; participants may be separate processes.
    #[default]
    Tcp,
    /// In-process channels; participants are threads of one process.
    Local,
}

/// The `[coupling.transport]` table.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Channel kind. Default: tcp.
    #[serde(default)]
    pub kind: TransportKind,
    /// Listen/dial address for TCP. Default: `127.0.0.1:47700`.
    #[serde(default = "default_address")]
    pub address: String,
    /// Participant that listens for TCP. Default: the first participant.
    #[serde(default)]
    pub acceptor: Option<String>,
    /// Connect and handshake timeout in milliseconds. Default: 60000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Longest wait for the peer during an exchange, in milliseconds.
    /// Default: 0, no limit.
    #[serde(default)]
    pub exchange_timeout_ms: u64,
}

impl TransportConfig {
    /// Bound on establishing the channel.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Bound on each receive once connected; `None` waits for as long as
    /// the peer takes.
    pub fn exchange_timeout(&self) -> Option<Duration> {
        (self.exchange_timeout_ms > 0).then(|| Duration::from_millis(self.exchange_timeout_ms))
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            address: default_address(),
            acceptor: None,
            timeout_ms: default_timeout_ms(),
            exchange_timeout_ms: 0,
        }
    }
}

/// A `[[coupling]]` table: one two-participant coupling scheme.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SchemeConfig {
    /// Scheme kind.
    pub scheme: SchemeKind,
    /// `[first, second]`.
    pub participants: [String; 2],
    /// Length of one coupling time window.
    pub time_window_size: f64,
    /// Number of windows to run.
    #[serde(default)]
    pub max_time_windows: Option<u32>,
    /// Simulated end time.
    #[serde(default)]
    pub max_time: Option<f64>,
    /// Sub-iteration cap per window (implicit schemes). Default: 1.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Time comparisons use a tolerance of `10^-valid_digits`. Default: 10.
    #[serde(default = "default_valid_digits")]
    pub valid_digits: u32,
    /// Exchanged data.
    #[serde(default)]
    pub exchange: Vec<ExchangeConfig>,
    /// Convergence measures (implicit schemes).
    #[serde(default)]
    pub convergence: Vec<ConvergenceConfig>,
    /// Channel settings.
    #[serde(default)]
    pub transport: TransportConfig,
}

impl SchemeConfig {
    /// Tolerance for time comparisons.
    pub fn eps(&self) -> f64 {
        10f64.powi(-(self.valid_digits as i32))
    }

    /// The other participant of this coupling, if `name` takes part.
    pub fn peer_of(&self, name: &str) -> Option<&str> {
        match &self.participants {
            [a, b] if a == name => Some(b.as_str()),
            [a, b] if b == name => Some(a.as_str()),
            _ => None,
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while loading or validating a [`CouplingConfig`].
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// The file could not be read.
    Io {
        /// Path that was read.
        path: String,
        /// Description of the I/O failure.
        reason: String,
    },
    /// The file is not valid TOML or does not match the schema.
    Parse {
        /// Parser message.
        reason: String,
    },
    /// `dimensions` is not 2 or 3.
    InvalidDimensions {
        /// The configured value.
        value: usize,
    },
    /// Two entries of the same kind share a name.
    DuplicateName {
        /// `"data"`, `"mesh"`, or `"participant"`.
        kind: &'static str,
        /// The repeated name.
        name: String,
    },
    /// A name refers to an undeclared entry.
    UnknownReference {
        /// `"data"`, `"mesh"`, or `"participant"`.
        kind: &'static str,
        /// The undeclared name.
        name: String,
        /// Where the reference appears.
        context: String,
    },
    /// Fewer than two participants are declared.
    TooFewParticipants {
        /// Number declared.
        count: usize,
    },
    /// A participant writes or reads data its mesh does not carry.
    NotOnMesh {
        /// The participant.
        participant: String,
        /// The data.
        data: String,
        /// The participant's mesh.
        mesh: String,
    },
    /// A participant appears in more than one coupling, or twice in one.
    InvalidParticipants {
        /// Description of the problem.
        reason: String,
    },
    /// `time_window_size` is NaN, infinite, zero, or negative.
    InvalidWindowSize {
        /// The configured value.
        value: f64,
    },
    /// Neither `max_time_windows` nor `max_time` is set, or one is not
    /// positive.
    InvalidEndCondition {
        /// Description of the problem.
        reason: String,
    },
    /// `max_iterations` is zero.
    ZeroIterations,
    /// `valid_digits` is outside `1..=16`.
    InvalidValidDigits {
        /// The configured value.
        value: u32,
    },
    /// An exchange is inconsistent with the participants' roles.
    InvalidExchange {
        /// The exchanged data.
        data: String,
        /// Description of the problem.
        reason: String,
    },
    /// A convergence measure is misplaced or has a bad limit.
    InvalidConvergence {
        /// The measured data.
        data: String,
        /// Description of the problem.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, reason } => write!(f, "cannot read '{path}': {reason}"),
            Self::Parse { reason } => write!(f, "invalid configuration file: {reason}"),
            Self::InvalidDimensions { value } => {
                write!(f, "dimensions must be 2 or 3, got {value}")
            }
            Self::DuplicateName { kind, name } => {
                write!(f, "{kind} '{name}' is declared more than once")
            }
            Self::UnknownReference {
                kind,
                name,
                context,
            } => write!(f, "{context} refers to undeclared {kind} '{name}'"),
            Self::TooFewParticipants { count } => {
                write!(f, "at least two participants are required, found {count}")
            }
            Self::NotOnMesh {
                participant,
                data,
                mesh,
            } => write!(
                f,
                "participant '{participant}' uses data '{data}' which mesh '{mesh}' does not carry"
            ),
            Self::InvalidParticipants { reason } => write!(f, "invalid coupling: {reason}"),
            Self::InvalidWindowSize { value } => {
                write!(f, "time_window_size must be finite and positive, got {value}")
            }
            Self::InvalidEndCondition { reason } => write!(f, "invalid end condition: {reason}"),
            Self::ZeroIterations => write!(f, "max_iterations must be at least 1"),
            Self::InvalidValidDigits { value } => {
                write!(f, "valid_digits must be within 1..=16, got {value}")
            }
            Self::InvalidExchange { data, reason } => {
                write!(f, "invalid exchange of '{data}': {reason}")
            }
            Self::InvalidConvergence { data, reason } => {
                write!(f, "invalid convergence measure on '{data}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        EngineError::Config {
            reason: e.to_string(),
        }
    }
}

// ── CouplingConfig ─────────────────────────────────────────────────

/// A complete coupling configuration file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CouplingConfig {
    /// Spatial dimension, 2 or 3.
    pub dimensions: usize,
    /// Data fields.
    #[serde(default)]
    pub data: Vec<DataConfig>,
    /// Meshes.
    #[serde(default)]
    pub mesh: Vec<MeshConfig>,
    /// Participants.
    #[serde(default)]
    pub participant: Vec<ParticipantConfig>,
    /// Coupling schemes.
    #[serde(default)]
    pub coupling: Vec<SchemeConfig>,
}

impl CouplingConfig {
    /// Read, parse, and validate a configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a `[[data]]` entry.
    pub fn data(&self, name: &str) -> Option<&DataConfig> {
        self.data.iter().find(|d| d.name == name)
    }

    /// Look up a `[[mesh]]` entry.
    pub fn mesh(&self, name: &str) -> Option<&MeshConfig> {
        self.mesh.iter().find(|m| m.name == name)
    }

    /// Look up a `[[participant]]` entry.
    pub fn participant(&self, name: &str) -> Option<&ParticipantConfig> {
        self.participant.iter().find(|p| p.name == name)
    }

    /// The coupling `name` takes part in, if any.
    pub fn coupling_of(&self, name: &str) -> Option<&SchemeConfig> {
        self.coupling
            .iter()
            .find(|c| c.participants.iter().any(|p| p == name))
    }

    /// Check all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=3).contains(&self.dimensions) {
            return Err(ConfigError::InvalidDimensions {
                value: self.dimensions,
            });
        }
        unique("data", self.data.iter().map(|d| d.name.as_str()))?;
        unique("mesh", self.mesh.iter().map(|m| m.name.as_str()))?;
        unique(
            "participant",
            self.participant.iter().map(|p| p.name.as_str()),
        )?;
        if self.participant.len() < 2 {
            return Err(ConfigError::TooFewParticipants {
                count: self.participant.len(),
            });
        }

        for mesh in &self.mesh {
            for data in &mesh.data {
                self.require_data(data, || format!("mesh '{}'", mesh.name))?;
            }
        }
        for p in &self.participant {
            let mesh = self
                .mesh(&p.mesh)
                .ok_or_else(|| ConfigError::UnknownReference {
                    kind: "mesh",
                    name: p.mesh.clone(),
                    context: format!("participant '{}'", p.name),
                })?;
            for data in p.writes.iter().chain(&p.reads) {
                self.require_data(data, || format!("participant '{}'", p.name))?;
                if !mesh.data.contains(data) {
                    return Err(ConfigError::NotOnMesh {
                        participant: p.name.clone(),
                        data: data.clone(),
                        mesh: mesh.name.clone(),
                    });
                }
            }
        }

        let mut coupled: HashSet<&str> = HashSet::new();
        for c in &self.coupling {
            self.validate_coupling(c)?;
            for name in &c.participants {
                if !coupled.insert(name.as_str()) {
                    return Err(ConfigError::InvalidParticipants {
                        reason: format!("participant '{name}' is in more than one coupling"),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_coupling(&self, c: &SchemeConfig) -> Result<(), ConfigError> {
        let [first, second] = &c.participants;
        for name in &c.participants {
            if self.participant(name).is_none() {
                return Err(ConfigError::UnknownReference {
                    kind: "participant",
                    name: name.clone(),
                    context: format!("{} coupling", c.scheme),
                });
            }
        }
        if first == second {
            return Err(ConfigError::InvalidParticipants {
                reason: format!("'{first}' cannot couple with itself"),
            });
        }

        if !c.time_window_size.is_finite() || c.time_window_size <= 0.0 {
            return Err(ConfigError::InvalidWindowSize {
                value: c.time_window_size,
            });
        }
        match (c.max_time_windows, c.max_time) {
            (None, None) => {
                return Err(ConfigError::InvalidEndCondition {
                    reason: "set max_time_windows or max_time".into(),
                })
            }
            (Some(0), _) => {
                return Err(ConfigError::InvalidEndCondition {
                    reason: "max_time_windows must be at least 1".into(),
                })
            }
            (_, Some(t)) if !t.is_finite() || t <= 0.0 => {
                return Err(ConfigError::InvalidEndCondition {
                    reason: format!("max_time must be finite and positive, got {t}"),
                })
            }
            _ => {}
        }
        if c.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if !(1..=16).contains(&c.valid_digits) {
            return Err(ConfigError::InvalidValidDigits {
                value: c.valid_digits,
            });
        }

        for ex in &c.exchange {
            let invalid = |reason: String| ConfigError::InvalidExchange {
                data: ex.data.clone(),
                reason,
            };
            self.require_data(&ex.data, || format!("{} coupling", c.scheme))?;
            if c.peer_of(&ex.from) != Some(ex.to.as_str()) {
                return Err(invalid(format!(
                    "'{}' -> '{}' is not between '{first}' and '{second}'",
                    ex.from, ex.to
                )));
            }
            // Both participants were checked to exist above.
            let from = self.participant(&ex.from);
            let to = self.participant(&ex.to);
            if !from.is_some_and(|p| p.writes.contains(&ex.data)) {
                return Err(invalid(format!("'{}' does not write it", ex.from)));
            }
            if !to.is_some_and(|p| p.reads.contains(&ex.data)) {
                return Err(invalid(format!("'{}' does not read it", ex.to)));
            }
            if ex.initialize && c.scheme.is_serial() && &ex.from != second {
                return Err(invalid(
                    "serial schemes only take initial data from the second participant".into(),
                ));
            }
        }

        if c.scheme.is_implicit() && c.convergence.is_empty() {
            return Err(ConfigError::InvalidConvergence {
                data: String::new(),
                reason: "implicit schemes need at least one convergence measure".into(),
            });
        }
        for m in &c.convergence {
            let invalid = |reason: &str| ConfigError::InvalidConvergence {
                data: m.data.clone(),
                reason: reason.to_string(),
            };
            if !c.scheme.is_implicit() {
                return Err(invalid("explicit schemes do not iterate"));
            }
            if !c.exchange.iter().any(|ex| ex.data == m.data) {
                return Err(invalid("data is not exchanged in this coupling"));
            }
            if !m.limit.is_finite() || m.limit <= 0.0 {
                return Err(invalid("limit must be finite and positive"));
            }
        }

        if let Some(acceptor) = &c.transport.acceptor {
            if c.peer_of(acceptor).is_none() {
                return Err(ConfigError::UnknownReference {
                    kind: "participant",
                    name: acceptor.clone(),
                    context: "transport acceptor".into(),
                });
            }
        }
        Ok(())
    }

    fn require_data(
        &self,
        name: &str,
        context: impl FnOnce() -> String,
    ) -> Result<(), ConfigError> {
        if self.data(name).is_some() {
            Ok(())
        } else {
            Err(ConfigError::UnknownReference {
                kind: "data",
                name: name.to_string(),
                context: context(),
            })
        }
    }
}

fn unique<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
dimensions = 3

[[data]]
name = "Forces"

[[data]]
name = "Velocities"

[[mesh]]
name = "MeshOne"
data = ["Forces", "Velocities"]

[[mesh]]
name = "MeshTwo"
data = ["Forces", "Velocities"]

[[participant]]
name = "SolverOne"
mesh = "MeshOne"
writes = ["Forces"]
reads = ["Velocities"]

[[participant]]
name = "SolverTwo"
mesh = "MeshTwo"
writes = ["Velocities"]
reads = ["Forces"]

[[coupling]]
scheme = "serial-explicit"
participants = ["SolverOne", "SolverTwo"]
time_window_size = 1.0
max_time_windows = 5

[[coupling.exchange]]
data = "Forces"
from = "SolverOne"
to = "SolverTwo"

[[coupling.exchange]]
data = "Velocities"
from = "SolverTwo"
to = "SolverOne"
"#;

    fn parse_err(text: &str) -> ConfigError {
        match CouplingConfig::from_toml_str(text) {
            Err(e) => e,
            Ok(_) => panic!("expected configuration error"),
        }
    }

    #[test]
    fn valid_config_parses_with_defaults() {
        let cfg = CouplingConfig::from_toml_str(VALID).unwrap();
        assert_eq!(cfg.dimensions, 3);
        assert_eq!(cfg.data("Forces").unwrap().kind, KindName::Vector);
        let c = cfg.coupling_of("SolverTwo").unwrap();
        assert_eq!(c.max_iterations, 1);
        assert_eq!(c.valid_digits, 10);
        assert_eq!(c.transport.kind, TransportKind::Tcp);
        assert_eq!(c.transport.address, "127.0.0.1:47700");
        assert_eq!(c.transport.connect_timeout(), Duration::from_secs(60));
        assert_eq!(c.transport.exchange_timeout(), None);
        assert_eq!(c.peer_of("SolverOne"), Some("SolverTwo"));
        assert_eq!(c.peer_of("SolverThree"), None);
        assert!((c.eps() - 1e-10).abs() < 1e-20);
    }

    #[test]
    fn from_path_reads_and_validates_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coupling.toml");
        let text = VALID.replace(
            "to = \"SolverOne\"\n",
            "to = \"SolverOne\"\n\n[coupling.transport]\nkind = \"local\"\nexchange_timeout_ms = 250\n",
        );
        std::fs::write(&path, &text).unwrap();
        let cfg = CouplingConfig::from_path(&path).unwrap();
        assert_eq!(cfg, CouplingConfig::from_toml_str(&text).unwrap());
        let transport = &cfg.coupling_of("SolverOne").unwrap().transport;
        assert_eq!(transport.kind, TransportKind::Local);
        assert_eq!(transport.exchange_timeout(), Some(Duration::from_millis(250)));

        std::fs::write(&path, VALID.replace("dimensions = 3", "dimensions = 1")).unwrap();
        assert_eq!(
            CouplingConfig::from_path(&path),
            Err(ConfigError::InvalidDimensions { value: 1 })
        );

        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            CouplingConfig::from_path(&missing),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn bad_dimensions_rejected() {
        let text = VALID.replace("dimensions = 3", "dimensions = 4");
        assert_eq!(parse_err(&text), ConfigError::InvalidDimensions { value: 4 });
    }

    #[test]
    fn toml_syntax_error_is_parse_error() {
        assert!(matches!(
            parse_err("dimensions = = 3"),
            ConfigError::Parse { .. }
        ));
    }

    #[test]
    fn unknown_scheme_is_parse_error() {
        let text = VALID.replace("serial-explicit", "multi");
        assert!(matches!(parse_err(&text), ConfigError::Parse { .. }));
    }

    #[test]
    fn duplicate_participant_rejected() {
        let text = VALID.replace("name = \"SolverTwo\"", "name = \"SolverOne\"");
        assert!(matches!(
            parse_err(&text),
            ConfigError::DuplicateName {
                kind: "participant",
                ..
            }
        ));
    }

    #[test]
    fn data_missing_from_mesh_rejected() {
        let text = VALID.replacen(
            "data = [\"Forces\", \"Velocities\"]",
            "data = [\"Forces\"]",
            1,
        );
        assert!(matches!(parse_err(&text), ConfigError::NotOnMesh { .. }));
    }

    #[test]
    fn zero_window_size_rejected() {
        let text = VALID.replace("time_window_size = 1.0", "time_window_size = 0.0");
        assert_eq!(
            parse_err(&text),
            ConfigError::InvalidWindowSize { value: 0.0 }
        );
    }

    #[test]
    fn missing_end_condition_rejected() {
        let text = VALID.replace("max_time_windows = 5", "");
        assert!(matches!(
            parse_err(&text),
            ConfigError::InvalidEndCondition { .. }
        ));
    }

    #[test]
    fn exchange_by_non_writer_rejected() {
        let text = VALID.replacen("from = \"SolverOne\"\nto = \"SolverTwo\"", "from = \"SolverTwo\"\nto = \"SolverOne\"", 1);
        assert!(matches!(
            parse_err(&text),
            ConfigError::InvalidExchange { .. }
        ));
    }

    #[test]
    fn serial_initial_data_from_first_rejected() {
        let text = VALID.replacen(
            "to = \"SolverTwo\"\n",
            "to = \"SolverTwo\"\ninitialize = true\n",
            1,
        );
        assert!(matches!(
            parse_err(&text),
            ConfigError::InvalidExchange { .. }
        ));
    }

    #[test]
    fn implicit_without_measure_rejected() {
        let text = VALID.replace("serial-explicit", "serial-implicit");
        assert!(matches!(
            parse_err(&text),
            ConfigError::InvalidConvergence { .. }
        ));
    }

    #[test]
    fn measure_on_explicit_rejected() {
        let text = format!("{VALID}\n[[coupling.convergence]]\ndata = \"Forces\"\nlimit = 1e-3\n");
        assert!(matches!(
            parse_err(&text),
            ConfigError::InvalidConvergence { .. }
        ));
    }

    #[test]
    fn implicit_with_measure_accepted() {
        let text = format!(
            "{}\n[[coupling.convergence]]\ndata = \"Forces\"\nlimit = 1e-3\n",
            VALID
                .replace("serial-explicit", "parallel-implicit")
                .replace("max_time_windows = 5", "max_time_windows = 5\nmax_iterations = 10")
        );
        let cfg = CouplingConfig::from_toml_str(&text).unwrap();
        assert!(cfg.coupling[0].scheme.is_implicit());
        assert!(!cfg.coupling[0].scheme.is_serial());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = CouplingConfig::from_path(Path::new("/nonexistent/weft.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        let engine: EngineError = err.into();
        assert!(matches!(engine, EngineError::Config { .. }));
    }
}
