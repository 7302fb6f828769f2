//! Two-participant coupling schemes.
//!
//! A [`CouplingScheme`] owns the coupling state of one participant: the
//! current time window, the time computed inside it, the sub-iteration
//! counter, and the set of actions the participant still has to perform.
//! Data crosses to the peer only when a window completes.
//!
//! # Exchange order
//!
//! ```text
//!                 first participant            second participant
//! serial          send, receive                (initialize: receive)
//!                                              send, receive if ongoing
//! parallel        send, receive                receive, send
//! ```
//!
//! In implicit schemes the second participant measures convergence and
//! ships the verdict with its data. A rejected iteration rolls time back
//! to the window start and requires [`Action::ReadIterationCheckpoint`];
//! an accepted one requires [`Action::WriteIterationCheckpoint`] for the
//! next window.

use std::time::Instant;

use weft_core::{Action, ActionSet, DataId, EngineError};
use weft_transport::{Channel, DataFrame, FieldPayload, Message, TransportError};

use crate::config::{SchemeConfig, SchemeKind};
use crate::mesh::MeshStore;
use crate::metrics::CouplingMetrics;

/// Position of the local participant in `participants = [first, second]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Role {
    First,
    Second,
}

#[derive(Debug)]
struct Exchange {
    data: DataId,
    name: String,
    initialize: bool,
}

#[derive(Debug)]
struct Measure {
    data: DataId,
    name: String,
    limit: f64,
    previous: Option<Vec<f64>>,
}

pub(crate) fn transport_error(e: TransportError) -> EngineError {
    EngineError::Transport {
        reason: e.to_string(),
    }
}

/// Coupling state of one participant.
pub(crate) struct CouplingScheme {
    kind: SchemeKind,
    role: Role,
    peer: String,
    window_size: f64,
    max_windows: Option<u32>,
    max_time: Option<f64>,
    max_iterations: u32,
    eps: f64,
    sends: Vec<Exchange>,
    receives: Vec<Exchange>,
    measures: Vec<Measure>,
    channel: Option<Box<dyn Channel>>,

    window: u32,
    window_start: f64,
    computed: f64,
    iteration: u32,
    required: ActionSet,
    initialized: bool,
    initial_data_pending: bool,
    initial_data_done: bool,
    read_available: bool,
    window_complete: bool,
    finalized: bool,
    metrics: CouplingMetrics,
}

impl CouplingScheme {
    pub(crate) fn new(
        config: &SchemeConfig,
        local: &str,
        store: &MeshStore,
    ) -> Result<Self, EngineError> {
        let peer = config
            .peer_of(local)
            .ok_or_else(|| EngineError::Config {
                reason: format!("'{local}' is not part of the {} coupling", config.scheme),
            })?
            .to_string();
        let role = if config.participants[0] == local {
            Role::First
        } else {
            Role::Second
        };
        let resolve = |name: &str| {
            store.field_by_name(name).ok_or_else(|| EngineError::Config {
                reason: format!("exchanged data '{name}' is not on the mesh of '{local}'"),
            })
        };

        let mut sends = Vec::new();
        let mut receives = Vec::new();
        for ex in &config.exchange {
            let entry = |data| Exchange {
                data,
                name: ex.data.clone(),
                initialize: ex.initialize,
            };
            if ex.from == local {
                sends.push(entry(resolve(&ex.data)?));
            } else if ex.to == local {
                receives.push(entry(resolve(&ex.data)?));
            }
        }
        let measures = config
            .convergence
            .iter()
            .map(|m| -> Result<Measure, EngineError> {
                Ok(Measure {
                    data: resolve(&m.data)?,
                    name: m.data.clone(),
                    limit: m.limit,
                    previous: None,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            kind: config.scheme,
            role,
            peer,
            window_size: config.time_window_size,
            max_windows: config.max_time_windows,
            max_time: config.max_time,
            max_iterations: config.max_iterations,
            eps: config.eps(),
            sends,
            receives,
            measures,
            channel: None,
            window: 1,
            window_start: 0.0,
            computed: 0.0,
            iteration: 1,
            required: ActionSet::empty(),
            initialized: false,
            initial_data_pending: false,
            initial_data_done: false,
            read_available: false,
            window_complete: false,
            finalized: false,
            metrics: CouplingMetrics::default(),
        })
    }

    // ── Queries ─────────────────────────────────────────────────

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn peer(&self) -> &str {
        &self.peer
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn metrics(&self) -> &CouplingMetrics {
        &self.metrics
    }

    pub(crate) fn window(&self) -> u32 {
        self.window
    }

    pub(crate) fn time(&self) -> f64 {
        self.window_start + self.computed
    }

    pub(crate) fn is_ongoing(&self) -> bool {
        let windows_left = self.max_windows.is_none_or(|m| self.window <= m);
        let time_left = self.max_time.is_none_or(|t| self.time() < t - self.eps);
        windows_left && time_left
    }

    pub(crate) fn is_action_required(&self, action: Action) -> bool {
        self.required.contains(action)
    }

    pub(crate) fn is_read_data_available(&self) -> bool {
        self.read_available
    }

    pub(crate) fn is_write_data_required(&self, dt: f64) -> bool {
        self.initialized
            && self.is_ongoing()
            && self.computed + dt >= self.window_length() - self.eps
    }

    pub(crate) fn is_time_window_complete(&self) -> bool {
        self.window_complete
    }

    fn window_length(&self) -> f64 {
        match self.max_time {
            Some(t) => self.window_size.min(t - self.window_start),
            None => self.window_size,
        }
    }

    fn next_dt(&self) -> f64 {
        if self.is_ongoing() {
            self.window_length() - self.computed
        } else {
            0.0
        }
    }

    fn has_initial_data(&self) -> bool {
        self.sends.iter().chain(&self.receives).any(|e| e.initialize)
    }

    // ── Protocol ────────────────────────────────────────────────

    pub(crate) fn initialize(
        &mut self,
        channel: Box<dyn Channel>,
        store: &mut MeshStore,
    ) -> Result<f64, EngineError> {
        if self.initialized {
            return Err(EngineError::protocol("initialize", "already initialized"));
        }
        self.channel = Some(channel);
        self.initialized = true;
        self.initial_data_pending = self.has_initial_data();
        if self.sends.iter().any(|e| e.initialize) {
            self.required.insert(Action::WriteInitialData);
        }
        if self.kind.is_implicit() && self.is_ongoing() {
            self.required.insert(Action::WriteIterationCheckpoint);
        }
        if self.kind.is_serial() && self.role == Role::Second && !self.initial_data_pending {
            self.receive(store, self.window)?;
            self.read_available = true;
        }
        tracing::info!(
            scheme = %self.kind,
            peer = %self.peer,
            role = ?self.role,
            required = %self.required,
            "coupling initialized"
        );
        Ok(self.next_dt())
    }

    pub(crate) fn initialize_data(&mut self, store: &mut MeshStore) -> Result<(), EngineError> {
        const OP: &str = "initialize_data";
        if !self.initialized {
            return Err(EngineError::protocol(OP, "initialize() has not been called"));
        }
        if self.initial_data_done {
            return Err(EngineError::protocol(OP, "already called"));
        }
        if self.required.contains(Action::WriteInitialData) {
            return Err(EngineError::protocol(
                OP,
                "write-initial-data is required but was not fulfilled",
            ));
        }
        self.initial_data_done = true;
        if !self.initial_data_pending {
            return Ok(());
        }

        let received = match (self.kind.is_serial(), self.role) {
            (true, Role::First) => self.receive(store, 0)?.1,
            (true, Role::Second) => {
                self.send(store, 0, true, None)?;
                self.receive(store, self.window)?.1
            }
            (false, Role::First) => {
                self.send(store, 0, true, None)?;
                self.receive(store, 0)?.1
            }
            (false, Role::Second) => {
                let received = self.receive(store, 0)?.1;
                self.send(store, 0, true, None)?;
                received
            }
        };
        self.read_available = received > 0;
        self.initial_data_pending = false;
        tracing::debug!(received, "initial data exchanged");
        Ok(())
    }

    pub(crate) fn fulfilled_action(&mut self, action: Action) -> Result<(), EngineError> {
        if !self.required.remove(action) {
            return Err(EngineError::protocol(
                "fulfilled_action",
                format!("{action} is not required"),
            ));
        }
        Ok(())
    }

    pub(crate) fn advance(&mut self, store: &mut MeshStore, dt: f64) -> Result<f64, EngineError> {
        const OP: &str = "advance";
        if !self.initialized {
            return Err(EngineError::protocol(OP, "initialize() has not been called"));
        }
        if self.finalized {
            return Err(EngineError::protocol(OP, "already finalized"));
        }
        if self.initial_data_pending {
            return Err(EngineError::protocol(
                OP,
                "initialize_data() must be called before the first advance()",
            ));
        }
        if !self.required.is_empty() {
            return Err(EngineError::protocol(
                OP,
                format!("required actions {} were not fulfilled", self.required),
            ));
        }
        if !self.is_ongoing() {
            return Err(EngineError::protocol(OP, "coupling has ended"));
        }
        if !dt.is_finite() || dt <= 0.0 {
            return Err(EngineError::protocol(
                OP,
                format!("time step must be finite and positive, got {dt}"),
            ));
        }
        let remaining = self.window_length() - self.computed;
        if dt > remaining + self.eps {
            return Err(EngineError::protocol(
                OP,
                format!("time step {dt} exceeds the remaining window {remaining}"),
            ));
        }

        self.metrics.advance_calls += 1;
        self.read_available = false;
        self.window_complete = false;
        self.computed += dt;
        if self.computed < self.window_length() - self.eps {
            return Ok(self.next_dt());
        }

        let start = Instant::now();
        let window = self.window;
        let implicit = self.kind.is_implicit();
        let (converged, mut received) = match (self.kind.is_serial(), self.role) {
            (_, Role::First) => {
                self.send(store, window, false, None)?;
                let (verdict, received) = self.receive(store, window)?;
                (verdict.unwrap_or(true), received)
            }
            (true, Role::Second) => {
                let converged = !implicit || self.measure(store);
                self.send(store, window, false, implicit.then_some(converged))?;
                (converged, 0)
            }
            (false, Role::Second) => {
                let (_, received) = self.receive(store, window)?;
                let converged = !implicit || self.measure(store);
                self.send(store, window, false, implicit.then_some(converged))?;
                (converged, received)
            }
        };

        self.metrics.total_iterations += 1;
        if converged {
            self.window_start += self.window_length();
            self.window += 1;
            self.iteration = 1;
            self.computed = 0.0;
            self.window_complete = true;
            self.metrics.completed_windows += 1;
            if implicit && self.is_ongoing() {
                self.required.insert(Action::WriteIterationCheckpoint);
            }
            tracing::info!(
                window,
                time = self.window_start,
                ongoing = self.is_ongoing(),
                "time window complete"
            );
        } else {
            self.iteration += 1;
            self.computed = 0.0;
            self.metrics.rejected_iterations += 1;
            self.required.insert(Action::ReadIterationCheckpoint);
            tracing::debug!(window, iteration = self.iteration, "iteration rejected");
        }

        if self.kind.is_serial() && self.role == Role::Second && self.is_ongoing() {
            received = self.receive(store, self.window)?.1;
        }
        self.read_available = received > 0;
        self.metrics.last_exchange_us = start.elapsed().as_micros() as u64;
        Ok(self.next_dt())
    }

    pub(crate) fn finalize(&mut self) -> Result<(), EngineError> {
        if self.finalized {
            return Err(EngineError::protocol("finalize", "already finalized"));
        }
        self.finalized = true;
        self.required.clear();
        let Some(mut channel) = self.channel.take() else {
            return Ok(());
        };
        if self.is_ongoing() {
            tracing::warn!(peer = %self.peer, window = self.window, "finalizing while coupling is ongoing");
        }
        match self.role {
            Role::First => {
                if say_goodbye(&mut *channel) {
                    await_goodbye(&mut *channel)?;
                }
            }
            Role::Second => {
                if await_goodbye(&mut *channel)? {
                    say_goodbye(&mut *channel);
                }
            }
        }
        tracing::info!(peer = %self.peer, "coupling finalized");
        Ok(())
    }

    // ── Exchange ────────────────────────────────────────────────

    fn channel(&mut self) -> Result<&mut Box<dyn Channel>, EngineError> {
        self.channel
            .as_mut()
            .ok_or_else(|| EngineError::protocol("advance", "no connection to the peer"))
    }

    /// Send the values of every sent field, or only the initialized ones.
    fn send(
        &mut self,
        store: &MeshStore,
        window: u32,
        initial: bool,
        converged: Option<bool>,
    ) -> Result<(), EngineError> {
        let fields: Vec<FieldPayload> = self
            .sends
            .iter()
            .filter(|e| !initial || e.initialize)
            .map(|e| FieldPayload {
                name: e.name.clone(),
                values: store.values(e.data).to_vec(),
            })
            .collect();
        self.metrics.fields_sent += fields.len() as u64;
        let frame = DataFrame {
            window,
            iteration: self.iteration,
            converged,
            fields,
        };
        self.channel()?
            .send(Message::Data(frame))
            .map_err(transport_error)
    }

    /// Receive the peer's frame for `window` and store its fields.
    ///
    /// Returns the peer's convergence verdict and the number of fields
    /// received.
    fn receive(
        &mut self,
        store: &mut MeshStore,
        window: u32,
    ) -> Result<(Option<bool>, usize), EngineError> {
        let iteration = self.iteration;
        let frame = match self.channel()?.recv().map_err(transport_error)? {
            Message::Data(frame) => frame,
            Message::Goodbye => {
                return Err(EngineError::Transport {
                    reason: format!("'{}' finalized while coupling was ongoing", self.peer),
                })
            }
            other => {
                return Err(EngineError::Transport {
                    reason: format!("unexpected {} message from '{}'", other.kind(), self.peer),
                })
            }
        };
        if frame.window != window || frame.iteration != iteration {
            return Err(EngineError::Transport {
                reason: format!(
                    "out of sequence: expected window {window} iteration {iteration}, got window {} iteration {}",
                    frame.window, frame.iteration
                ),
            });
        }
        let count = frame.fields.len();
        for field in frame.fields {
            let data = self
                .receives
                .iter()
                .find(|e| e.name == field.name)
                .map(|e| e.data)
                .ok_or_else(|| EngineError::Transport {
                    reason: format!("'{}' sent unexpected data '{}'", self.peer, field.name),
                })?;
            store.replace_values(data, field.values)?;
        }
        self.metrics.fields_received += count as u64;
        Ok((frame.converged, count))
    }

    /// Compare each measured field with its previous iterate.
    fn measure(&mut self, store: &MeshStore) -> bool {
        let mut converged = true;
        for m in &mut self.measures {
            let current = store.values(m.data);
            let ok = match &m.previous {
                Some(prev) if prev.len() == current.len() => {
                    let diff = l2(current.iter().zip(prev).map(|(a, b)| a - b));
                    let norm = l2(current.iter().copied());
                    tracing::debug!(data = %m.name, diff, norm, limit = m.limit, "convergence measure");
                    diff <= m.limit * norm
                }
                _ => false,
            };
            converged &= ok;
            m.previous = Some(current.to_vec());
        }
        if !converged && self.iteration >= self.max_iterations {
            tracing::debug!(
                window = self.window,
                iterations = self.iteration,
                "iteration limit reached, accepting window"
            );
            converged = true;
        }
        converged
    }
}

fn l2(values: impl Iterator<Item = f64>) -> f64 {
    values.map(|v| v * v).sum::<f64>().sqrt()
}

/// Send `Goodbye`. Returns `false` if the peer is already gone.
fn say_goodbye(channel: &mut dyn Channel) -> bool {
    match channel.send(Message::Goodbye) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(peer = channel.peer(), error = %e, "peer gone before goodbye");
            false
        }
    }
}

/// Wait for the peer's `Goodbye`, discarding data still in flight.
/// Returns `false` if the peer disconnected instead.
fn await_goodbye(channel: &mut dyn Channel) -> Result<bool, EngineError> {
    loop {
        match channel.recv() {
            Ok(Message::Goodbye) => return Ok(true),
            Ok(other) => {
                tracing::debug!(kind = other.kind(), "discarding message during finalize");
            }
            Err(TransportError::Disconnected { peer }) => {
                tracing::warn!(%peer, "peer disconnected before goodbye");
                return Ok(false);
            }
            Err(e) => return Err(transport_error(e)),
        }
    }
}
