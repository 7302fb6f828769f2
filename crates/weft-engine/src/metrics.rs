//! Coupling progress and communication counters.
//!
//! [`CouplingMetrics`] is updated by every `advance` and exchange and can be
//! read from [`LocalEngine::metrics`](crate::LocalEngine::metrics) at any
//! point of the run.

/// Counters for one participant's coupling run.
///
/// Durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CouplingMetrics {
    /// Number of successful `advance` calls.
    pub advance_calls: u64,
    /// Number of time windows that were accepted.
    pub completed_windows: u64,
    /// Number of sub-iterations run across all windows.
    pub total_iterations: u64,
    /// Number of sub-iterations that did not converge and were repeated.
    pub rejected_iterations: u64,
    /// Number of field payloads sent to the peer.
    pub fields_sent: u64,
    /// Number of field payloads received from the peer.
    pub fields_received: u64,
    /// Wall-clock time of the most recent exchange, including waiting on
    /// the peer.
    pub last_exchange_us: u64,
}

impl CouplingMetrics {
    /// Fraction of sub-iterations that were rejected, or 0 before any ran.
    pub fn rejection_rate(&self) -> f64 {
        if self.total_iterations == 0 {
            0.0
        } else {
            self.rejected_iterations as f64 / self.total_iterations as f64
        }
    }
}
