//! The Silica hardware description language.
//!
//! Silica embeds an HDL in Rust: hardware is described as cooperative
//! `async` processes communicating over [`Signal`]s, simulated by a
//! discrete-event kernel with delta-cycle semantics, and observed through
//! VCD traces or a cosimulation channel to an external simulator.

#![forbid(unsafe_code)]

#[doc(inline)]
pub use silica_bitvec as bitvec;
#[doc(inline)]
pub use silica_sim as sim;

pub use silica_bitvec::{BitVector, BitVectorError};
pub use silica_sim::{
    AlwaysError, Context, CosimPort, Cosimulation, Process, ResetSignal, RunOutcome, Scope,
    ShadowSignal, SimError, Signal, SignalRef, SignalValue, Simulation, TraceError, TraceOptions,
    Trigger, all, always_comb, always_seq, any, trace_signals, trace_signals_with,
};
