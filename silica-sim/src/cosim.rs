//! Cosimulation with an external simulator process.
//!
//! The scheduler only depends on the [`CosimPort`] contract: at every delta
//! boundary it calls [`CosimPort::get`] to pull externally produced changes,
//! and [`CosimPort::put`] whenever local changes are pending or time
//! advances. The port also contributes a waiter process so the scheduler
//! keeps running deltas while locally driven signals change.
//!
//! [`Cosimulation`] is the shipped implementation: a child process connected
//! through its stdin/stdout pipes with a line-oriented, lock-step framing.
//! Each [`CosimPort::put`] writes a block
//!
//! ```text
//! #<time>
//! <name> <hex-value>      (one line per changed signal)
//! .
//! ```
//!
//! and each [`CosimPort::get`] reads one block of the same shape back. The
//! exchange is lock-step: the child writes one block at startup and one in
//! reply to every block it receives, keeping each `get` paired with an
//! earlier child write. Teardown closes the child's stdin and waits for it
//! to exit.

use std::io;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use silica_bitvec::BitVector;

use crate::context::Context;
use crate::process::Process;
use crate::signal::Signal;
use crate::wait::{Trigger, any};

/// The scheduler-side contract of a cosimulation channel.
pub trait CosimPort {
    /// Pulls external signal changes into the simulation.
    ///
    /// Returns whether the external side reported any change; the scheduler
    /// then runs another delta at the current time.
    fn get(&mut self, ctx: &Context) -> io::Result<bool>;

    /// Pushes the current time and all locally changed signals to the
    /// external simulator.
    fn put(&mut self, time: u64) -> io::Result<()>;

    /// A process waiting on every locally driven signal, keeping the
    /// scheduler's delta loop coupled to local activity.
    fn waiter(&self) -> Process;

    /// Shuts the channel down; called once when the simulation finishes.
    fn finalize(&mut self) -> io::Result<()>;
}

/// A cosimulation channel to a child simulator over its stdin/stdout pipes.
pub struct Cosimulation {
    child: Child,
    /// `None` once finalized; dropping the writer closes the child's stdin.
    to_child: Option<BufWriter<ChildStdin>>,
    from_child: BufReader<ChildStdout>,
    /// Local signals mirrored toward the child, with the last value sent.
    to_signals: Vec<(String, Signal<BitVector>, Option<BitVector>)>,
    /// Signals driven by the child.
    from_signals: Vec<(String, Signal<BitVector>)>,
    finalized: bool,
}

impl std::fmt::Debug for Cosimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cosimulation")
            .field("child", &self.child.id())
            .field("to_signals", &self.to_signals.len())
            .field("from_signals", &self.from_signals.len())
            .finish_non_exhaustive()
    }
}

impl Cosimulation {
    /// Spawns the child simulator and wires the named signals to it.
    ///
    /// `to_signals` are driven locally and mirrored toward the child;
    /// `from_signals` are driven by the child.
    pub fn spawn(
        mut command: Command,
        to_signals: Vec<(String, Signal<BitVector>)>,
        from_signals: Vec<(String, Signal<BitVector>)>,
    ) -> io::Result<Self> {
        command.stdin(Stdio::piped()).stdout(Stdio::piped());
        let mut child = command.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("cosimulation child has no stdin pipe"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("cosimulation child has no stdout pipe"))?;
        Ok(Self {
            child,
            to_child: Some(BufWriter::new(stdin)),
            from_child: BufReader::new(stdout),
            to_signals: to_signals
                .into_iter()
                .map(|(name, signal)| (name, signal, None))
                .collect(),
            from_signals,
            finalized: false,
        })
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.from_child.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "cosimulation child closed its pipe",
            ));
        }
        Ok(line.trim().to_owned())
    }
}

impl CosimPort for Cosimulation {
    fn get(&mut self, _ctx: &Context) -> io::Result<bool> {
        let mut changed = false;
        loop {
            let line = self.read_line()?;
            if line == "." {
                return Ok(changed);
            }
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(name), Some(digits)) = (parts.next(), parts.next()) else {
                return Err(io::Error::other(format!(
                    "malformed cosimulation line `{line}`"
                )));
            };
            let value = BitVector::from_hex(digits).map_err(io::Error::other)?;
            let signal = self
                .from_signals
                .iter()
                .find(|(candidate, _)| candidate == name)
                .map(|(_, signal)| signal)
                .ok_or_else(|| {
                    io::Error::other(format!("unknown cosimulation signal `{name}`"))
                })?;
            signal.set_next(value).map_err(io::Error::other)?;
            changed = true;
        }
    }

    fn put(&mut self, time: u64) -> io::Result<()> {
        let to_child = self
            .to_child
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "cosimulation finalized"))?;
        writeln!(to_child, "#{time}")?;
        for (name, signal, last_sent) in &mut self.to_signals {
            let value = signal.value();
            if last_sent.as_ref() != Some(&value) {
                writeln!(to_child, "{name} {value:x}")?;
                *last_sent = Some(value);
            }
        }
        writeln!(to_child, ".")?;
        to_child.flush()
    }

    fn waiter(&self) -> Process {
        let sensitivity: Vec<Trigger> = self
            .to_signals
            .iter()
            .map(|(_, signal, _)| signal.event())
            .collect();
        Process::new(async move {
            loop {
                any(sensitivity.iter().cloned()).await;
            }
        })
    }

    fn finalize(&mut self) -> io::Result<()> {
        self.finalized = true;
        // Dropping the writer closes the child's stdin, which is its signal
        // to exit.
        if let Some(mut to_child) = self.to_child.take() {
            let _ = to_child.flush();
        }
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for Cosimulation {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::CosimPort;
    use crate::context::Context;
    use crate::error::SimError;
    use crate::process::Process;
    use crate::sim::{RunOutcome, Simulation};
    use crate::signal::Signal;
    use crate::wait::{Trigger, any};

    struct MockPort {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl CosimPort for MockPort {
        fn get(&mut self, _ctx: &Context) -> std::io::Result<bool> {
            self.log.borrow_mut().push("get".to_owned());
            Ok(false)
        }

        fn put(&mut self, time: u64) -> std::io::Result<()> {
            self.log.borrow_mut().push(format!("put {time}"));
            Ok(())
        }

        fn waiter(&self) -> Process {
            Process::new(async {
                any(Vec::<Trigger>::new()).await;
                Ok(())
            })
        }

        fn finalize(&mut self) -> std::io::Result<()> {
            self.log.borrow_mut().push("finalize".to_owned());
            Ok(())
        }
    }

    #[test]
    fn boundary_calls_follow_the_delta_protocol() {
        let ctx = Context::new();
        let sig = Signal::new(&ctx, false);
        let process = {
            let ctx = ctx.clone();
            let sig = sig.clone();
            Process::new(async move {
                ctx.delay(5).await;
                sig.set_next(true)?;
                ctx.delay(5).await;
                Err(SimError::Stop)
            })
        };

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut sim = Simulation::new(&ctx, [process]);
        sim.set_quiet(true);
        sim.attach_cosim(MockPort { log: log.clone() }).unwrap();
        assert!(matches!(
            sim.attach_cosim(MockPort { log: log.clone() }),
            Err(SimError::MultipleCosim)
        ));

        assert_eq!(sim.run(None).unwrap(), RunOutcome::Finished);
        assert_eq!(
            *log.borrow(),
            vec![
                // t=0 boundary, then the advance to t=5.
                "get", "put 5",
                // the write at t=5 forces a same-time delta...
                "get", "put 5",
                // ...which settles, and time advances to 10.
                "get", "put 10",
                // final boundary before the stop is honored.
                "get", "finalize",
            ],
        );
    }
}
