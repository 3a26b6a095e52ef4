//! The two-phase scheduler: delta cycles within a time step, time advances
//! between them.
//!
//! One outer iteration is a delta cycle: apply every pending signal update
//! (waking the affected tasks), then run every woken task to its next
//! suspension. When a delta leaves new pending updates behind, another delta
//! runs at the same time; otherwise time advances to the earliest future
//! event. All ordering is deterministic: tasks run FIFO, waiters wake in
//! registration order, and simultaneous future events fire in insertion
//! order.

use std::task::Poll;

use crate::context::{Context, FutureEvent};
use crate::cosim::CosimPort;
use crate::error::SimError;
use crate::process::Process;
use crate::signal::AnySignal;

/// How a bounded or stopped run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The simulation ended for good: a process requested a stop, or no
    /// future events remain. Tracing and cosimulation are shut down.
    Finished,
    /// The requested duration elapsed. Resources stay open and
    /// [`Simulation::run`] may be called again to resume.
    Suspended,
}

struct Task {
    future: futures::future::LocalBoxFuture<'static, Result<(), SimError>>,
    done: bool,
}

/// A simulation: a set of processes scheduled over one [`Context`].
///
/// # Example
///
/// ```
/// use silica_sim::{Context, Process, RunOutcome, SimError, Signal, Simulation};
///
/// let ctx = Context::new();
/// let sig = Signal::new(&ctx, false);
///
/// let driver = {
///     let ctx = ctx.clone();
///     let sig = sig.clone();
///     Process::new(async move {
///         ctx.delay(10).await;
///         sig.set_next(true)?;
///         Err(SimError::Stop)
///     })
/// };
///
/// let mut sim = Simulation::new(&ctx, [driver]);
/// assert_eq!(sim.run(None).unwrap(), RunOutcome::Finished);
/// assert_eq!(ctx.now(), 10);
/// ```
pub struct Simulation {
    ctx: Context,
    tasks: Vec<Task>,
    cosim: Option<Box<dyn CosimPort>>,
    finished: bool,
    quiet: bool,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("time", &self.ctx.now())
            .field("tasks", &self.tasks.len())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Creates a simulation from a set of processes.
    ///
    /// The kernel queues of the context are reset; shadow-signal drivers
    /// registered against the context are adopted ahead of the given
    /// processes. Every process starts queued, so the first delta at time 0
    /// runs each one to its first suspension.
    pub fn new(ctx: &Context, processes: impl IntoIterator<Item = Process>) -> Self {
        let kernel = ctx.kernel();
        kernel.reset();
        let mut sim = Self {
            ctx: ctx.clone(),
            tasks: Vec::new(),
            cosim: None,
            finished: false,
            quiet: false,
        };
        for driver in kernel.drain_drivers() {
            sim.add_task(driver);
        }
        for process in processes {
            sim.add_task(process);
        }
        sim
    }

    fn add_task(&mut self, process: Process) {
        let task = self.ctx.kernel().add_task_slot();
        debug_assert_eq!(task, self.tasks.len());
        self.tasks.push(Task {
            future: process.future,
            done: false,
        });
        self.ctx.kernel().wake(task);
    }

    /// Attaches the cosimulation port driving an external simulator.
    ///
    /// The port's waiter process joins the task set, and the scheduler calls
    /// [`CosimPort::get`]/[`CosimPort::put`] at every delta boundary.
    ///
    /// # Errors
    ///
    /// [`SimError::MultipleCosim`] when a port is already attached.
    pub fn attach_cosim(&mut self, port: impl CosimPort + 'static) -> Result<(), SimError> {
        if self.cosim.is_some() {
            return Err(SimError::MultipleCosim);
        }
        self.add_task(port.waiter());
        self.cosim = Some(Box::new(port));
        Ok(())
    }

    /// Suppresses the end-of-run log line.
    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    /// Runs the simulation, forever or for `duration` time units.
    ///
    /// Returns [`RunOutcome::Suspended`] when the duration elapsed — the
    /// simulation can then be resumed with another `run` call — and
    /// [`RunOutcome::Finished`] when a process requested a stop or no events
    /// remain.
    ///
    /// # Errors
    ///
    /// Any error a process returned (other than [`SimError::Stop`]) is
    /// propagated after tracing and cosimulation have been shut down;
    /// [`SimError::AlreadyFinished`] when called on a finished simulation.
    pub fn run(&mut self, duration: Option<u64>) -> Result<RunOutcome, SimError> {
        if self.finished {
            return Err(SimError::AlreadyFinished);
        }
        let kernel = self.ctx.kernel().clone();

        let max_time = duration.map(|duration| {
            let max_time = kernel.now() + duration;
            // The sentinel guarantees the future heap holds an event at the
            // suspension point, so the loop below reaches it.
            kernel.schedule(max_time, FutureEvent::Sentinel);
            max_time
        });

        let waker = futures::task::noop_waker();
        let mut poll_ctx = std::task::Context::from_waker(&waker);

        loop {
            // Phase 1: apply pending updates, waking the affected tasks.
            kernel.bump_delta();
            for signal in kernel.drain_siglist() {
                signal.update(&kernel);
            }

            // Phase 2: run every active task to its next suspension.
            while let Some(task_id) = kernel.pop_active() {
                let task = &mut self.tasks[task_id];
                if task.done {
                    continue;
                }
                kernel.set_current_task(task_id);
                match task.future.as_mut().poll(&mut poll_ctx) {
                    Poll::Pending => {}
                    Poll::Ready(Ok(())) => task.done = true,
                    Poll::Ready(Err(error)) => {
                        task.done = true;
                        kernel.record_stop(error);
                    }
                }
            }

            // Cosimulation boundary: exchange changes with the external
            // simulator; either side producing changes forces another delta
            // at the same time.
            if let Some(port) = &mut self.cosim {
                let external_change = match port.get(&self.ctx) {
                    Ok(change) => change,
                    Err(error) => return self.fail(error.into()),
                };
                if !kernel.siglist_is_empty() || external_change {
                    if let Err(error) = port.put(kernel.now()) {
                        return self.fail(error.into());
                    }
                    continue;
                }
            } else if !kernel.siglist_is_empty() {
                continue;
            }

            // The delta settled; stale any-of registrations were already
            // purged when their wait futures dropped. Now it is safe to stop
            // or suspend.
            if let Some(error) = kernel.take_stop() {
                return match error {
                    SimError::Stop => self.finish("stop requested"),
                    error => self.fail(error),
                };
            }

            if kernel.future_is_empty() {
                return self.finish("no more events");
            }

            if max_time == Some(kernel.now()) {
                kernel.flush_trace();
                if !self.quiet {
                    log::info!("simulation suspended at {}", kernel.now());
                }
                return Ok(RunOutcome::Suspended);
            }

            // Advance to the next event time and fire everything due.
            let time = kernel
                .next_event_time()
                .expect("future heap checked non-empty above");
            kernel.set_now(time);
            kernel.trace_timestamp(time);
            if let Some(port) = &mut self.cosim {
                if let Err(error) = port.put(time) {
                    return self.fail(error.into());
                }
            }
            while let Some(event) = kernel.pop_future_at(time) {
                match event {
                    FutureEvent::Wake { task, fired } => {
                        // A dead weak reference means the wait was dropped
                        // (e.g. an any-of resolved through a sibling).
                        if let Some(fired) = fired.upgrade() {
                            fired.set(true);
                            kernel.wake(task);
                        }
                    }
                    FutureEvent::Apply { signal, token } => signal.apply(&kernel, token),
                    FutureEvent::Sentinel => {}
                }
            }
        }
    }

    fn finish(&mut self, reason: &str) -> Result<RunOutcome, SimError> {
        self.finalize()?;
        if !self.quiet {
            log::info!("simulation finished at {}: {reason}", self.ctx.now());
        }
        Ok(RunOutcome::Finished)
    }

    fn fail(&mut self, error: SimError) -> Result<RunOutcome, SimError> {
        // Best-effort cleanup; the original error wins over teardown noise.
        if let Err(teardown) = self.finalize() {
            log::warn!("cleanup after simulation error failed: {teardown}");
        }
        Err(error)
    }

    fn finalize(&mut self) -> Result<(), SimError> {
        self.finished = true;
        self.ctx.kernel().close_trace();
        if let Some(mut port) = self.cosim.take() {
            port.finalize()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::{RunOutcome, Simulation};
    use crate::context::Context;
    use crate::error::SimError;
    use crate::process::Process;
    use crate::signal::Signal;

    #[test]
    fn finishes_when_no_events_remain() {
        let ctx = Context::new();
        let ticks = Rc::new(Cell::new(0u64));
        let process = {
            let ctx = ctx.clone();
            let ticks = ticks.clone();
            Process::new(async move {
                for _ in 0..3 {
                    ctx.delay(5).await;
                    ticks.set(ticks.get() + 1);
                }
                Ok(())
            })
        };
        let mut sim = Simulation::new(&ctx, [process]);
        sim.set_quiet(true);
        assert_eq!(sim.run(None).unwrap(), RunOutcome::Finished);
        assert_eq!(ticks.get(), 3);
        assert_eq!(ctx.now(), 15);
    }

    #[test]
    fn stop_request_finishes_cleanly() {
        let ctx = Context::new();
        let process = {
            let ctx = ctx.clone();
            Process::new(async move {
                ctx.delay(7).await;
                Err(SimError::Stop)
            })
        };
        let mut sim = Simulation::new(&ctx, [process]);
        sim.set_quiet(true);
        assert_eq!(sim.run(None).unwrap(), RunOutcome::Finished);
        assert!(matches!(
            sim.run(None).unwrap_err(),
            SimError::AlreadyFinished
        ));
    }

    #[test]
    fn bounded_runs_suspend_and_resume() {
        let ctx = Context::new();
        let clk = Signal::new(&ctx, false);
        let toggler = {
            let ctx = ctx.clone();
            let clk = clk.clone();
            Process::new(async move {
                loop {
                    ctx.delay(10).await;
                    clk.set_next(!clk.value())?;
                }
            })
        };
        let mut sim = Simulation::new(&ctx, [toggler]);
        sim.set_quiet(true);

        // Toggles at 10 and 20 leave the clock low when time 25 is reached.
        assert_eq!(sim.run(Some(25)).unwrap(), RunOutcome::Suspended);
        assert_eq!(ctx.now(), 25);
        assert!(!clk.value());

        // Resumed run: toggles at 30, 40 and 50.
        assert_eq!(sim.run(Some(25)).unwrap(), RunOutcome::Suspended);
        assert_eq!(ctx.now(), 50);
        assert!(clk.value());
    }

    #[test]
    fn process_errors_propagate_after_cleanup() {
        let ctx = Context::new();
        let sig = Signal::new(&ctx, silica_bitvec::BitVector::with_width(0, 4).unwrap());
        let process = {
            let ctx = ctx.clone();
            let sig = sig.clone();
            Process::new(async move {
                ctx.delay(1).await;
                sig.set_next(silica_bitvec::BitVector::new(99))?;
                Ok(())
            })
        };
        let mut sim = Simulation::new(&ctx, [process]);
        sim.set_quiet(true);
        assert!(matches!(sim.run(None), Err(SimError::Value(_))));
        assert!(matches!(
            sim.run(None).unwrap_err(),
            SimError::AlreadyFinished
        ));
    }

    #[test]
    fn simultaneous_future_events_fire_in_insertion_order() {
        let ctx = Context::new();
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        let make = |tag: &'static str| {
            let ctx = ctx.clone();
            let order = order.clone();
            Process::new(async move {
                ctx.delay(10).await;
                order.borrow_mut().push(tag);
                Ok(())
            })
        };
        let mut sim = Simulation::new(&ctx, [make("first"), make("second"), make("third")]);
        sim.set_quiet(true);
        sim.run(None).unwrap();
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }
}
