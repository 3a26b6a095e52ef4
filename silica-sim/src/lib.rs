//! Delta-cycle simulation kernel for the Silica HDL.
//!
//! This crate contains the event-driven core of the Silica hardware
//! description language: [`Signal`]s with value/next separation, cooperative
//! processes suspended on signal events, edges, delays and joins, and the
//! two-phase [`Simulation`] scheduler that interleaves delta cycles with time
//! advances.
//!
//! Processes are plain `async` blocks. A process reads committed signal
//! values, computes, and writes pending values through [`Signal::set_next`];
//! the scheduler applies all pending writes at the delta boundary, so every
//! process observes a consistent pre-update state — writes within a delta are
//! never visible to reads in the same delta.
//!
//! # Example
//!
//! A clock generator and a process counting its rising edges:
//!
//! ```
//! use silica_sim::{Context, Process, SimError, Signal, Simulation};
//!
//! let ctx = Context::new();
//! let clk = Signal::new(&ctx, false);
//!
//! let clkgen = {
//!     let ctx = ctx.clone();
//!     let clk = clk.clone();
//!     Process::new(async move {
//!         loop {
//!             ctx.delay(10).await;
//!             clk.set_next(!clk.value())?;
//!         }
//!     })
//! };
//!
//! let counter = {
//!     let ctx = ctx.clone();
//!     let clk = clk.clone();
//!     Process::new(async move {
//!         for _ in 0..4 {
//!             clk.posedge().await;
//!         }
//!         assert_eq!(ctx.now(), 70);
//!         Err(SimError::Stop)
//!     })
//! };
//!
//! let mut sim = Simulation::new(&ctx, [clkgen, counter]);
//! sim.run(None).unwrap();
//! ```

#![forbid(unsafe_code)]

pub(crate) mod context;
pub(crate) mod cosim;
pub(crate) mod error;
pub(crate) mod process;
pub(crate) mod signal;
pub(crate) mod sim;
pub(crate) mod trace;
pub(crate) mod wait;

pub use silica_bitvec::{BitVector, BitVectorError};

pub use self::context::Context;
pub use self::cosim::{CosimPort, Cosimulation};
pub use self::error::{AlwaysError, SimError, TraceError};
pub use self::process::{Process, ResetSignal, always_comb, always_seq};
pub use self::signal::{ShadowSignal, Signal, SignalRef, SignalValue};
pub use self::sim::{RunOutcome, Simulation};
pub use self::trace::{Scope, TraceOptions, VcdValue, trace_signals, trace_signals_with};
pub use self::wait::{AllWait, AnyWait, Trigger, TriggerWait, all, any};
