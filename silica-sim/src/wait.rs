//! Suspension points: wait tokens and the futures behind them.
//!
//! A process suspends by awaiting a [`Trigger`] (a signal event, an edge or a
//! time delay) or a combinator over several triggers: [`any`] resumes on the
//! first firing sensitivity, [`all`] once every sensitivity has fired.
//!
//! The first poll of a wait future registers it — into the signal's waiter
//! list or the future-event heap — and suspends. When the sensitivity fires,
//! the kernel marks the shared `fired` flag and re-enqueues the owning task;
//! the next poll observes the flag and resolves. Dropping an armed wait
//! future removes its registration, which is how stale entries left behind by
//! an [`any`] wait are purged.

use std::cell::Cell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task;
use std::task::Poll;

use crate::context::{Context, FutureEvent, Kernel};
use crate::signal::{AnySignal, SignalRef, WaitEntry, WaitList};

/// A single sensitivity: what a process can suspend on.
///
/// Obtained from [`Signal::event`], [`Signal::posedge`], [`Signal::negedge`]
/// or [`Context::delay`]; awaiting the token (directly, or through [`any`] /
/// [`all`]) suspends the process until the sensitivity fires.
///
/// [`Signal::event`]: crate::Signal::event
/// [`Signal::posedge`]: crate::Signal::posedge
/// [`Signal::negedge`]: crate::Signal::negedge
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Any committed value change of a signal.
    Event(SignalRef),
    /// A committed 0 → 1 transition.
    Posedge(SignalRef),
    /// A committed 1 → 0 transition.
    Negedge(SignalRef),
    /// A fixed number of time units from the moment of awaiting.
    Delay(Context, u64),
}

impl Trigger {
    fn kernel(&self) -> Rc<Kernel> {
        match self {
            Trigger::Event(sig) | Trigger::Posedge(sig) | Trigger::Negedge(sig) => {
                sig.inner.kernel()
            }
            Trigger::Delay(ctx, _) => ctx.kernel().clone(),
        }
    }
}

impl IntoFuture for Trigger {
    type Output = ();
    type IntoFuture = TriggerWait;

    fn into_future(self) -> TriggerWait {
        TriggerWait {
            trigger: self,
            state: WaitState::Idle,
        }
    }
}

enum WaitState {
    /// Not yet polled; no registration exists.
    Idle,
    /// Registered and waiting for the sensitivity to fire.
    Registered {
        id: u64,
        fired: Rc<Cell<bool>>,
        /// Whether the registration sits in a signal waiter list (and so
        /// must be removed if this future is dropped unfired).
        listed: bool,
    },
    /// Resolved.
    Done,
}

/// Future for a single [`Trigger`].
pub struct TriggerWait {
    trigger: Trigger,
    state: WaitState,
}

impl std::fmt::Debug for TriggerWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerWait")
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

impl TriggerWait {
    fn arm(&mut self) {
        let kernel = self.trigger.kernel();
        let task = kernel.current_task();
        let fired = Rc::new(Cell::new(false));
        let id = kernel.next_seq();
        let mut listed = false;

        match &self.trigger {
            Trigger::Event(sig) => {
                sig.inner.register(
                    WaitList::Event,
                    WaitEntry {
                        id,
                        task,
                        fired: fired.clone(),
                    },
                );
                listed = true;
            }
            Trigger::Posedge(sig) | Trigger::Negedge(sig) => {
                let rising = matches!(self.trigger, Trigger::Posedge(_));
                let list = if rising {
                    WaitList::Posedge
                } else {
                    WaitList::Negedge
                };
                if sig.inner.edge_held(kernel.delta(), rising, task) {
                    // The transition already committed in this delta and this
                    // task did not consume it: resume in the same delta
                    // instead of waiting for the next edge. The consumer
                    // itself falls through and waits for the next transition.
                    fired.set(true);
                    kernel.wake(task);
                } else {
                    sig.inner.register(
                        list,
                        WaitEntry {
                            id,
                            task,
                            fired: fired.clone(),
                        },
                    );
                    listed = true;
                }
            }
            Trigger::Delay(_, ticks) => {
                kernel.schedule(
                    kernel.now() + ticks,
                    FutureEvent::Wake {
                        task,
                        fired: Rc::downgrade(&fired),
                    },
                );
            }
        }

        self.state = WaitState::Registered { id, fired, listed };
    }
}

impl Future for TriggerWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut task::Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let ready = match &this.state {
            WaitState::Idle => {
                this.arm();
                return Poll::Pending;
            }
            WaitState::Registered { fired, .. } => fired.get(),
            WaitState::Done => true,
        };
        if ready {
            this.state = WaitState::Done;
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Drop for TriggerWait {
    fn drop(&mut self) {
        // An armed but unfired wait still sits in a waiter list; remove it so
        // a later firing cannot touch a dead registration. Delay events purge
        // themselves through the dead weak reference instead.
        if let WaitState::Registered {
            id, listed: true, ..
        } = &self.state
        {
            let id = *id;
            match &self.trigger {
                Trigger::Event(sig) => sig.inner.unregister(WaitList::Event, id),
                Trigger::Posedge(sig) => sig.inner.unregister(WaitList::Posedge, id),
                Trigger::Negedge(sig) => sig.inner.unregister(WaitList::Negedge, id),
                Trigger::Delay(..) => {}
            }
        }
    }
}

/// Waits until *any* of the given sensitivities fires.
///
/// The first firing sensitivity resolves the wait; the sibling registrations
/// are dropped at that moment. Even when several sensitivities fire in the
/// same delta, the wait resolves exactly once.
pub fn any(triggers: impl IntoIterator<Item = Trigger>) -> AnyWait {
    AnyWait {
        waits: triggers
            .into_iter()
            .map(IntoFuture::into_future)
            .collect(),
    }
}

/// Future returned by [`any`].
pub struct AnyWait {
    waits: Vec<TriggerWait>,
}

impl std::fmt::Debug for AnyWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyWait")
            .field("waits", &self.waits.len())
            .finish()
    }
}

impl Future for AnyWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        for index in 0..this.waits.len() {
            if Pin::new(&mut this.waits[index]).poll(cx).is_ready() {
                // Dropping the siblings purges their registrations.
                this.waits.clear();
                return Poll::Ready(());
            }
        }
        Poll::Pending
    }
}

/// Waits until *all* of the given sensitivities have fired at least once.
///
/// Each sensitivity is armed when the join is first polled; the join resolves
/// once the count of outstanding sensitivities reaches zero.
pub fn all(triggers: impl IntoIterator<Item = Trigger>) -> AllWait {
    let waits: Vec<_> = triggers
        .into_iter()
        .map(|trigger| Some(trigger.into_future()))
        .collect();
    let remaining = waits.len();
    AllWait { waits, remaining }
}

/// Future returned by [`all`].
pub struct AllWait {
    waits: Vec<Option<TriggerWait>>,
    remaining: usize,
}

impl std::fmt::Debug for AllWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllWait")
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl Future for AllWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        for slot in &mut this.waits {
            let ready = match slot {
                Some(wait) => Pin::new(wait).poll(cx).is_ready(),
                None => false,
            };
            if ready {
                *slot = None;
                this.remaining -= 1;
            }
        }
        if this.remaining == 0 {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}
