//! Processes: the cooperative tasks a simulation runs.
//!
//! A [`Process`] wraps an `async` block whose await points are [`Trigger`]
//! waits and their combinators. Besides hand-written processes, two builder
//! functions cover the common hardware idioms:
//!
//! - [`always_comb`] — a combinational block re-run on any change of its
//!   declared inputs;
//! - [`always_seq`] — an edge-triggered register block with an optional
//!   synchronous or asynchronous reset.
//!
//! Rust has no runtime view of a closure's body, so the signals a block
//! reads and drives are declared explicitly at construction; the builders
//! validate the declaration (non-empty sensitivity, no input also driven, no
//! output driven twice) the way the original decorators did by inspection.

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::context::Context;
use crate::error::{AlwaysError, SimError};
use crate::signal::{AnySignal, Signal, SignalRef};
use crate::wait::{Trigger, any};

/// A simulation process: a cooperative task driven by the scheduler.
///
/// The wrapped future resolves to `Ok(())` when the process simply runs out
/// of work, or to an error; returning [`SimError::Stop`] asks the scheduler
/// to end the whole simulation in an orderly way.
pub struct Process {
    pub(crate) future: LocalBoxFuture<'static, Result<(), SimError>>,
}

impl Process {
    /// Wraps an `async` block as a simulation process.
    pub fn new(future: impl Future<Output = Result<(), SimError>> + 'static) -> Self {
        Self {
            future: future.boxed_local(),
        }
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process").finish_non_exhaustive()
    }
}

/// Builds a combinational block.
///
/// `inputs` are the signals the body reads (its sensitivity list), `outputs`
/// the signals it drives. The body runs once at simulation start and then
/// again after every delta in which any input changed.
///
/// # Errors
///
/// - [`AlwaysError::EmptySensitivity`] when `inputs` is empty;
/// - [`AlwaysError::SignalAsInout`] when a signal appears in both lists;
/// - [`AlwaysError::SignalAsOutput`] when an output is already driven by
///   another combinational block.
pub fn always_comb(
    inputs: impl IntoIterator<Item = SignalRef>,
    outputs: impl IntoIterator<Item = SignalRef>,
    mut body: impl FnMut() -> Result<(), SimError> + 'static,
) -> Result<Process, AlwaysError> {
    let inputs: Vec<SignalRef> = inputs.into_iter().collect();
    let outputs: Vec<SignalRef> = outputs.into_iter().collect();
    if inputs.is_empty() {
        return Err(AlwaysError::EmptySensitivity);
    }
    for output in &outputs {
        if inputs.iter().any(|input| input.id() == output.id()) {
            return Err(AlwaysError::SignalAsInout(output.debug_name()));
        }
    }
    for output in &outputs {
        if output.inner.mark_driven() {
            return Err(AlwaysError::SignalAsOutput(output.debug_name()));
        }
    }

    let sensitivity: Vec<Trigger> = inputs.into_iter().map(Trigger::Event).collect();
    Ok(Process::new(async move {
        body()?;
        loop {
            any(sensitivity.iter().cloned()).await;
            body()?;
        }
    }))
}

/// A reset line for [`always_seq`] blocks: a boolean signal carrying its
/// active level and whether it acts asynchronously.
#[derive(Debug, Clone)]
pub struct ResetSignal {
    signal: Signal<bool>,
    active: bool,
    is_async: bool,
}

impl ResetSignal {
    /// Creates a reset signal.
    ///
    /// `active` is the level at which the reset is asserted; `is_async`
    /// selects asynchronous behavior (the reset edge joins the block's
    /// sensitivity list).
    pub fn new(ctx: &Context, init: bool, active: bool, is_async: bool) -> Self {
        Self {
            signal: Signal::new(ctx, init),
            active,
            is_async,
        }
    }

    /// The underlying boolean signal, for driving the reset from a process.
    pub fn signal(&self) -> &Signal<bool> {
        &self.signal
    }

    /// Schedules a new reset level.
    pub fn set_next(&self, value: bool) -> Result<(), SimError> {
        self.signal.set_next(value)
    }

    /// The asserted level.
    pub fn active_level(&self) -> bool {
        self.active
    }

    /// Whether the reset acts asynchronously.
    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Whether the reset is currently asserted.
    pub fn is_asserted(&self) -> bool {
        self.signal.value() == self.active
    }

    /// The edge that asserts the reset.
    fn active_edge(&self) -> Trigger {
        if self.active {
            self.signal.posedge()
        } else {
            self.signal.negedge()
        }
    }
}

/// Builds an edge-triggered register block.
///
/// On every firing of `edge` (and, for an asynchronous reset, on the reset's
/// asserting edge) the block wakes: while the reset is asserted each register
/// in `regs` is restored to its initial value, otherwise `body` runs.
///
/// # Errors
///
/// [`AlwaysError::NotAnEdge`] when `edge` is not a posedge/negedge token.
pub fn always_seq(
    edge: Trigger,
    reset: Option<&ResetSignal>,
    regs: impl IntoIterator<Item = SignalRef>,
    mut body: impl FnMut() -> Result<(), SimError> + 'static,
) -> Result<Process, AlwaysError> {
    if !matches!(edge, Trigger::Posedge(_) | Trigger::Negedge(_)) {
        return Err(AlwaysError::NotAnEdge);
    }
    let regs: Vec<SignalRef> = regs.into_iter().collect();
    let reset = reset.cloned();

    let mut sensitivity = vec![edge];
    if let Some(reset) = &reset {
        if reset.is_async() {
            sensitivity.push(reset.active_edge());
        }
    }

    Ok(Process::new(async move {
        loop {
            any(sensitivity.iter().cloned()).await;
            match &reset {
                Some(reset) if reset.is_asserted() => {
                    for reg in &regs {
                        reg.inner.clone().reset_to_init()?;
                    }
                }
                _ => body()?,
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::{ResetSignal, always_comb, always_seq};
    use crate::context::Context;
    use crate::error::AlwaysError;
    use crate::signal::Signal;

    #[test]
    fn comb_requires_inputs() {
        let result = always_comb([], [], || Ok(()));
        assert_eq!(result.unwrap_err(), AlwaysError::EmptySensitivity);
    }

    #[test]
    fn comb_rejects_inout_signals() {
        let ctx = Context::new();
        let sig = Signal::new(&ctx, 0i64);
        let result = always_comb([sig.signal_ref()], [sig.signal_ref()], || Ok(()));
        assert!(matches!(result, Err(AlwaysError::SignalAsInout(_))));
    }

    #[test]
    fn comb_rejects_double_drivers() {
        let ctx = Context::new();
        let input = Signal::new(&ctx, 0i64);
        let output = Signal::new(&ctx, 0i64);
        let first = always_comb([input.signal_ref()], [output.signal_ref()], || Ok(()));
        assert!(first.is_ok());
        let second = always_comb([input.signal_ref()], [output.signal_ref()], || Ok(()));
        assert!(matches!(second, Err(AlwaysError::SignalAsOutput(_))));
    }

    #[test]
    fn seq_requires_an_edge() {
        let ctx = Context::new();
        let clk = Signal::new(&ctx, false);
        let reg = Signal::new(&ctx, 0i64);
        let result = always_seq(clk.event(), None, [reg.signal_ref()], || Ok(()));
        assert_eq!(result.unwrap_err(), AlwaysError::NotAnEdge);
        assert!(always_seq(clk.posedge(), None, [reg.signal_ref()], || Ok(())).is_ok());
    }

    #[test]
    fn reset_signal_levels() {
        let ctx = Context::new();
        let reset = ResetSignal::new(&ctx, false, false, true);
        assert!(reset.is_asserted());
        assert!(reset.is_async());
        assert!(!reset.active_level());
    }
}
