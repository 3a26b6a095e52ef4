//! Error types for the simulation kernel.

use silica_bitvec::BitVectorError;

/// Errors surfaced by the kernel or returned from process bodies.
///
/// [`SimError::Stop`] is a sentinel, not a defect: a process returns it to end
/// the simulation in an orderly way, and [`Simulation::run`] maps it to
/// [`RunOutcome::Finished`] after cleaning up tracing and cosimulation
/// resources.
///
/// [`Simulation::run`]: crate::Simulation::run
/// [`RunOutcome::Finished`]: crate::RunOutcome::Finished
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Orderly termination requested by a process.
    #[error("stop simulation")]
    Stop,

    /// A value violated a signal's declared domain.
    #[error(transparent)]
    Value(#[from] BitVectorError),

    /// Attempted write to a shadow signal.
    #[error("signal is a read-only shadow of another signal")]
    ReadOnlySignal,

    /// A second cosimulation port was attached to one simulation.
    #[error("only a single cosimulation port can be attached")]
    MultipleCosim,

    /// `run` was called again after the simulation finished.
    #[error("simulation has already finished")]
    AlreadyFinished,

    /// Cosimulation channel failure.
    #[error("cosimulation i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Construction errors for [`always_comb`] and [`always_seq`] blocks.
///
/// [`always_comb`]: crate::always_comb
/// [`always_seq`]: crate::always_seq
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlwaysError {
    /// A combinational block was declared without any input signals.
    #[error("combinational sensitivity list is empty")]
    EmptySensitivity,

    /// An output signal is already driven by another combinational block.
    #[error("signal `{0}` is already driven by another combinational block")]
    SignalAsOutput(String),

    /// A signal was declared as both input and output of one block.
    #[error("signal `{0}` appears as both input and output")]
    SignalAsInout(String),

    /// The first argument of a sequential block was not an edge token.
    #[error("sequential blocks require a posedge or negedge sensitivity")]
    NotAnEdge,
}

/// Errors raised while setting up VCD tracing.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// A trace is already active for this context.
    #[error("a trace is already active for this context")]
    MultipleTraces,

    /// The scope tree contains no signals, so there is nothing to trace.
    #[error("scope `{0}` contains no signals")]
    EmptyHierarchy(String),

    /// Trace file creation or backup failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
