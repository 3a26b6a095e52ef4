//! Signals: the communication primitive between simulation processes.
//!
//! A [`Signal`] separates its committed value from its pending one. Processes
//! read the committed value at any point, write the pending one through
//! [`Signal::set_next`], and the scheduler commits all pending writes at the
//! delta boundary. No process ever observes a half-applied update.
//!
//! Three flavors exist:
//!
//! - plain signals, committed at the next delta boundary;
//! - delayed signals ([`Signal::with_delay`]), which commit after an inertial
//!   delay: a pending change is cancelled when a newer write lands inside the
//!   delay window;
//! - [`ShadowSignal`]s, read-only projections of a bit or slice of another
//!   signal, refreshed by an implicit driver process.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use silica_bitvec::{BitVector, BitVectorError};

use crate::context::{Context, FutureEvent, Kernel};
use crate::error::SimError;
use crate::process::Process;
use crate::trace::VcdValue;
use crate::wait::Trigger;

/// Data that can live in a [`Signal`].
///
/// The implementations for [`bool`], [`i64`] and [`BitVector`] cover the
/// usual HDL domains (single bits, plain integers, sized/bounded vectors).
/// Any other `Clone + PartialEq + Debug` type can be stored by accepting the
/// defaults, which declare an opaque domain: every value is accepted, there
/// is no edge semantics, and traces render the value through `Debug`.
pub trait SignalValue: Clone + PartialEq + fmt::Debug + 'static {
    /// Validates a candidate next value against the domain declared by the
    /// signal's initial value.
    fn check(declared: &Self, candidate: &Self) -> Result<(), SimError> {
        let _ = (declared, candidate);
        Ok(())
    }

    /// Declared width in bits; 0 for values without a fixed bit shape.
    fn width(declared: &Self) -> usize {
        let _ = declared;
        0
    }

    /// Logic level for edge detection; `Some` only for 1-bit valued data.
    fn level(&self) -> Option<bool> {
        None
    }

    /// Rendering for VCD trace lines.
    fn vcd_value(&self, width: usize) -> VcdValue {
        let _ = width;
        VcdValue::Str(format!("{self:?}"))
    }
}

impl SignalValue for bool {
    fn width(_declared: &Self) -> usize {
        1
    }

    fn level(&self) -> Option<bool> {
        Some(*self)
    }

    fn vcd_value(&self, _width: usize) -> VcdValue {
        VcdValue::Bit(*self)
    }
}

impl SignalValue for i64 {
    fn vcd_value(&self, _width: usize) -> VcdValue {
        VcdValue::Str(format!("{self:#x}"))
    }
}

impl SignalValue for BitVector {
    fn check(declared: &Self, candidate: &Self) -> Result<(), SimError> {
        declared.range_check(candidate.value())?;
        Ok(())
    }

    fn width(declared: &Self) -> usize {
        declared.width()
    }

    fn level(&self) -> Option<bool> {
        if *self == 0 {
            Some(false)
        } else if *self == 1 {
            Some(true)
        } else {
            None
        }
    }

    fn vcd_value(&self, width: usize) -> VcdValue {
        if width > 0 {
            VcdValue::Vector(self.to_bin(width))
        } else {
            VcdValue::Str(format!("{self:#x}"))
        }
    }
}

/// Which waiter list of a signal a registration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitList {
    Event,
    Posedge,
    Negedge,
}

/// A suspended task's registration in a waiter list.
pub(crate) struct WaitEntry {
    pub(crate) id: u64,
    pub(crate) task: usize,
    /// Shared with the owning wait future; set when the sensitivity fires.
    pub(crate) fired: Rc<Cell<bool>>,
}

/// Object-safe view of a signal used by the kernel, wait futures and tracer.
pub(crate) trait AnySignal {
    /// Applies the pending write at a delta boundary, waking affected tasks.
    fn update(self: Rc<Self>, kernel: &Kernel);
    /// Fires a scheduled inertial-delay record.
    fn apply(self: Rc<Self>, kernel: &Kernel, token: u64);
    fn register(&self, list: WaitList, entry: WaitEntry);
    fn unregister(&self, list: WaitList, id: u64);
    /// Forgets a pending-update enqueue (kernel reset path).
    fn clear_dirty(&self);
    /// Whether the matching edge already committed in delta `delta` without
    /// having woken `task` itself.
    ///
    /// A task the edge woke has consumed it: re-arming the same edge in the
    /// same delta must wait for the next transition, or every edge-triggered
    /// loop would re-fire forever within one delta.
    fn edge_held(&self, delta: u64, rising: bool, task: usize) -> bool;
    fn kernel(&self) -> Rc<Kernel>;
    fn id(&self) -> u64;
    fn debug_name(&self) -> String;
    fn set_name(&self, name: &str);
    /// Marks the signal as driven by a combinational block; returns whether
    /// it already was.
    fn mark_driven(&self) -> bool;
    /// Schedules a write of the signal's initial value (sequential reset).
    fn reset_to_init(self: Rc<Self>) -> Result<(), SimError>;
    fn vcd_width(&self) -> usize;
    fn vcd_current(&self) -> VcdValue;
    fn trace_code(&self) -> Option<String>;
    fn set_trace_code(&self, code: String);
}

/// A type-erased signal handle, used by process builders and scope trees.
#[derive(Clone)]
pub struct SignalRef {
    pub(crate) inner: Rc<dyn AnySignal>,
}

impl SignalRef {
    pub(crate) fn id(&self) -> u64 {
        self.inner.id()
    }

    pub(crate) fn debug_name(&self) -> String {
        self.inner.debug_name()
    }
}

impl fmt::Debug for SignalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignalRef({})", self.inner.debug_name())
    }
}

struct PendingApply<T> {
    token: u64,
    value: T,
    stamp: u64,
}

pub(crate) struct SignalInner<T: SignalValue> {
    kernel: Rc<Kernel>,
    id: u64,
    /// The initial value doubles as the domain declaration.
    init: T,
    val: RefCell<T>,
    next: RefCell<T>,
    /// Guards against duplicate siglist entries within one delta.
    dirty: Cell<bool>,
    driven: Cell<bool>,
    read_only: Cell<bool>,
    /// Inertial delay in time units; `None` for plain signals.
    delay: Cell<Option<u64>>,
    /// Last value handed to the inertial scheduler, for timestamp refresh.
    next_z: RefCell<T>,
    time_stamp: Cell<u64>,
    pending: RefCell<VecDeque<PendingApply<T>>>,
    event_waiters: RefCell<Vec<WaitEntry>>,
    posedge_waiters: RefCell<Vec<WaitEntry>>,
    negedge_waiters: RefCell<Vec<WaitEntry>>,
    /// `(delta, rising)` of the last committed 1-bit transition.
    last_edge: Cell<Option<(u64, bool)>>,
    /// Tasks the last transition woke from its edge list; they consumed the
    /// edge and must not see it as still pending.
    last_edge_tasks: RefCell<Vec<usize>>,
    name: RefCell<Option<String>>,
    code: RefCell<Option<String>>,
}

impl<T: SignalValue> SignalInner<T> {
    fn waiters(&self, list: WaitList) -> &RefCell<Vec<WaitEntry>> {
        match list {
            WaitList::Event => &self.event_waiters,
            WaitList::Posedge => &self.posedge_waiters,
            WaitList::Negedge => &self.negedge_waiters,
        }
    }

    /// Commits `next` as the new value: collects the affected waiters, writes
    /// the trace line and wakes the collected tasks in registration order.
    fn commit(&self, kernel: &Kernel, next: T) {
        let rising = {
            let val = self.val.borrow();
            match (val.level(), next.level()) {
                (Some(false), Some(true)) => Some(true),
                (Some(true), Some(false)) => Some(false),
                _ => None,
            }
        };
        let mut woken: Vec<WaitEntry> = self.event_waiters.borrow_mut().drain(..).collect();
        if let Some(rising) = rising {
            let edge_woken: Vec<WaitEntry> = if rising {
                self.posedge_waiters.borrow_mut().drain(..).collect()
            } else {
                self.negedge_waiters.borrow_mut().drain(..).collect()
            };
            // Remember who consumed this edge; everyone else still sees it
            // as pending for the rest of the delta (see `edge_held`).
            *self.last_edge_tasks.borrow_mut() =
                edge_woken.iter().map(|entry| entry.task).collect();
            self.last_edge.set(Some((kernel.delta(), rising)));
            woken.extend(edge_woken);
        }
        *self.val.borrow_mut() = next;
        if let Some(code) = self.code.borrow().as_deref() {
            let value = self.val.borrow().vcd_value(T::width(&self.init));
            kernel.trace_change(code, &value);
        }
        for entry in woken {
            entry.fired.set(true);
            kernel.wake(entry.task);
        }
    }
}

impl<T: SignalValue> AnySignal for SignalInner<T> {
    fn update(self: Rc<Self>, kernel: &Kernel) {
        self.dirty.set(false);
        if let Some(delay) = self.delay.get() {
            // Inertial path: never commit directly. Refresh the timestamp
            // when the pending value actually changed, then schedule the
            // apply record carrying that timestamp. A newer write inside the
            // delay window bumps the timestamp and invalidates the record.
            let next = self.next.borrow().clone();
            if next != *self.next_z.borrow() {
                self.time_stamp.set(kernel.now());
            }
            *self.next_z.borrow_mut() = next.clone();
            let token = kernel.next_seq();
            self.pending.borrow_mut().push_back(PendingApply {
                token,
                value: next,
                stamp: self.time_stamp.get(),
            });
            let signal = self.clone() as Rc<dyn AnySignal>;
            kernel.schedule(kernel.now() + delay, FutureEvent::Apply { signal, token });
            return;
        }
        let next = self.next.borrow().clone();
        if *self.val.borrow() == next {
            return;
        }
        self.commit(kernel, next);
    }

    fn apply(self: Rc<Self>, kernel: &Kernel, token: u64) {
        let Some(pending) = self.pending.borrow_mut().pop_front() else {
            return;
        };
        debug_assert_eq!(pending.token, token);
        if pending.stamp != self.time_stamp.get() {
            // Superseded by a newer write within the delay window.
            return;
        }
        if *self.val.borrow() == pending.value {
            return;
        }
        self.commit(kernel, pending.value);
    }

    fn register(&self, list: WaitList, entry: WaitEntry) {
        self.waiters(list).borrow_mut().push(entry);
    }

    fn unregister(&self, list: WaitList, id: u64) {
        self.waiters(list).borrow_mut().retain(|entry| entry.id != id);
    }

    fn clear_dirty(&self) {
        self.dirty.set(false);
    }

    fn edge_held(&self, delta: u64, rising: bool, task: usize) -> bool {
        self.last_edge.get() == Some((delta, rising))
            && !self.last_edge_tasks.borrow().contains(&task)
    }

    fn kernel(&self) -> Rc<Kernel> {
        self.kernel.clone()
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn debug_name(&self) -> String {
        match self.name.borrow().as_deref() {
            Some(name) => name.to_owned(),
            None => format!("sig{}", self.id),
        }
    }

    fn set_name(&self, name: &str) {
        let mut slot = self.name.borrow_mut();
        if slot.is_none() {
            *slot = Some(name.to_owned());
        }
    }

    fn mark_driven(&self) -> bool {
        self.driven.replace(true)
    }

    fn reset_to_init(self: Rc<Self>) -> Result<(), SimError> {
        *self.next.borrow_mut() = self.init.clone();
        if !self.dirty.replace(true) {
            let kernel = self.kernel.clone();
            kernel.push_signal(self);
        }
        Ok(())
    }

    fn vcd_width(&self) -> usize {
        T::width(&self.init)
    }

    fn vcd_current(&self) -> VcdValue {
        self.val.borrow().vcd_value(T::width(&self.init))
    }

    fn trace_code(&self) -> Option<String> {
        self.code.borrow().clone()
    }

    fn set_trace_code(&self, code: String) {
        *self.code.borrow_mut() = Some(code);
    }
}

/// A simulation signal holding a value of type `T`.
///
/// Handles are cheap to clone and share the same underlying state; this is
/// how several processes communicate over one signal.
///
/// # Example
///
/// ```
/// use silica_sim::{Context, Signal};
///
/// let ctx = Context::new();
/// let clk = Signal::new(&ctx, false);
/// assert!(!clk.value());
/// clk.set_next(true).unwrap();
/// // The committed value only changes at the next delta boundary.
/// assert!(!clk.value());
/// ```
pub struct Signal<T: SignalValue> {
    inner: Rc<SignalInner<T>>,
}

impl<T: SignalValue> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: SignalValue> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.inner.debug_name())
            .field("val", &*self.inner.val.borrow())
            .finish_non_exhaustive()
    }
}

impl<T: SignalValue> Signal<T> {
    /// Creates a signal with the given initial value.
    ///
    /// The initial value also declares the domain future writes are checked
    /// against: a bounded [`BitVector`] keeps its bounds, a sized one its
    /// width range.
    pub fn new(ctx: &Context, init: T) -> Self {
        Self::build(ctx.kernel().clone(), init, None)
    }

    /// Creates a signal with an inertial delay of `delay` time units.
    ///
    /// Writes commit `delay` units after the delta in which they were made,
    /// and only if no newer write superseded them in between: pulses shorter
    /// than the delay are absorbed.
    ///
    /// # Panics
    ///
    /// If `delay` is zero.
    pub fn with_delay(ctx: &Context, init: T, delay: u64) -> Self {
        assert!(delay > 0, "inertial delay must be at least one time unit");
        Self::build(ctx.kernel().clone(), init, Some(delay))
    }

    fn build(kernel: Rc<Kernel>, init: T, delay: Option<u64>) -> Self {
        let id = kernel.next_seq();
        let inner = Rc::new(SignalInner {
            kernel,
            id,
            init: init.clone(),
            val: RefCell::new(init.clone()),
            next: RefCell::new(init.clone()),
            dirty: Cell::new(false),
            driven: Cell::new(false),
            read_only: Cell::new(false),
            delay: Cell::new(delay),
            next_z: RefCell::new(init),
            time_stamp: Cell::new(0),
            pending: RefCell::new(VecDeque::new()),
            event_waiters: RefCell::new(Vec::new()),
            posedge_waiters: RefCell::new(Vec::new()),
            negedge_waiters: RefCell::new(Vec::new()),
            last_edge: Cell::new(None),
            last_edge_tasks: RefCell::new(Vec::new()),
            name: RefCell::new(None),
            code: RefCell::new(None),
        });
        Self { inner }
    }

    /// The committed value. Never fails and never observes pending writes.
    pub fn value(&self) -> T {
        self.inner.val.borrow().clone()
    }

    /// The pending next value (equal to [`Signal::value`] when no write is
    /// outstanding).
    pub fn next_value(&self) -> T {
        self.inner.next.borrow().clone()
    }

    /// The declared width in bits; 0 for non-bit domains.
    pub fn width(&self) -> usize {
        T::width(&self.inner.init)
    }

    /// Schedules `value` to become the signal's value at the next delta
    /// boundary (or after the inertial delay).
    ///
    /// The value is validated against the signal's declared domain; the
    /// committed value is untouched until the scheduler applies the update.
    pub fn set_next(&self, value: impl Into<T>) -> Result<(), SimError> {
        if self.inner.read_only.get() {
            return Err(SimError::ReadOnlySignal);
        }
        self.force_next(value.into())
    }

    /// Domain-checked write that ignores the read-only mark; shadow drivers
    /// go through here.
    pub(crate) fn force_next(&self, value: T) -> Result<(), SimError> {
        T::check(&self.inner.init, &value)?;
        *self.inner.next.borrow_mut() = value;
        if !self.inner.dirty.replace(true) {
            self.inner.kernel.push_signal(self.inner.clone());
        }
        Ok(())
    }

    /// A wait token that fires on any committed change of this signal.
    pub fn event(&self) -> Trigger {
        Trigger::Event(self.signal_ref())
    }

    /// A wait token for the rising edge.
    ///
    /// # Panics
    ///
    /// Edges are only defined for 1-bit signals; requesting one on a wider
    /// domain panics.
    pub fn posedge(&self) -> Trigger {
        self.assert_edge_capable("posedge");
        Trigger::Posedge(self.signal_ref())
    }

    /// A wait token for the falling edge.
    ///
    /// # Panics
    ///
    /// Edges are only defined for 1-bit signals; requesting one on a wider
    /// domain panics.
    pub fn negedge(&self) -> Trigger {
        self.assert_edge_capable("negedge");
        Trigger::Negedge(self.signal_ref())
    }

    fn assert_edge_capable(&self, what: &str) {
        let width = T::width(&self.inner.init);
        assert!(
            width == 1,
            "{what} is only defined for 1-bit signals, got width {width}",
        );
    }

    /// A type-erased handle for scope trees and process builders.
    pub fn signal_ref(&self) -> SignalRef {
        SignalRef {
            inner: self.inner.clone(),
        }
    }

    /// Adjusts the inertial delay of a delayed signal.
    ///
    /// # Panics
    ///
    /// If the signal was not created with [`Signal::with_delay`], or if
    /// `delay` is zero.
    pub fn set_delay(&self, delay: u64) {
        assert!(delay > 0, "inertial delay must be at least one time unit");
        assert!(
            self.inner.delay.get().is_some(),
            "set_delay requires a signal created with `with_delay`",
        );
        self.inner.delay.set(Some(delay));
    }
}

impl Signal<BitVector> {
    /// Reads bit `i` of the committed value.
    pub fn bit(&self, i: usize) -> Result<BitVector, BitVectorError> {
        self.inner.val.borrow().bit(i)
    }

    /// Reads bits `[low, high)` of the committed value.
    pub fn slice(&self, high: usize, low: usize) -> Result<BitVector, BitVectorError> {
        self.inner.val.borrow().slice(high, low)
    }

    /// The committed value as a `u64`, when it fits.
    pub fn to_u64(&self) -> Option<u64> {
        self.inner.val.borrow().to_u64()
    }

    /// A read-only view of bit `index`, kept in sync by an implicit driver.
    pub fn shadow_bit(&self, index: usize) -> Result<ShadowSignal, SimError> {
        self.shadow_with(move |bv| bv.bit(index))
    }

    /// A read-only view of bits `[low, high)`, kept in sync by an implicit
    /// driver.
    pub fn shadow_slice(&self, high: usize, low: usize) -> Result<ShadowSignal, SimError> {
        self.shadow_with(move |bv| bv.slice(high, low))
    }

    fn shadow_with(
        &self,
        project: impl Fn(&BitVector) -> Result<BitVector, BitVectorError> + 'static,
    ) -> Result<ShadowSignal, SimError> {
        let init = project(&self.inner.val.borrow())?;
        let shadow = Signal::build(self.inner.kernel.clone(), init, None);
        shadow.inner.read_only.set(true);
        let driver = {
            let source = self.clone();
            let target = shadow.clone();
            Process::new(async move {
                loop {
                    let value = project(&source.inner.val.borrow())?;
                    target.force_next(value)?;
                    source.event().await;
                }
            })
        };
        self.inner.kernel.push_driver(driver);
        Ok(ShadowSignal { sig: shadow })
    }
}

// Reads delegate to the committed value, so a signal handle compares and
// prints like the value it carries.

impl<T: SignalValue> PartialEq<T> for Signal<T> {
    fn eq(&self, other: &T) -> bool {
        *self.inner.val.borrow() == *other
    }
}

impl PartialEq<i64> for Signal<BitVector> {
    fn eq(&self, other: &i64) -> bool {
        *self.inner.val.borrow() == *other
    }
}

impl<T: SignalValue + fmt::Display> fmt::Display for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner.val.borrow(), f)
    }
}

impl<T: SignalValue> From<&Signal<T>> for SignalRef {
    fn from(signal: &Signal<T>) -> Self {
        signal.signal_ref()
    }
}

/// A read-only signal tracking a bit or slice of another signal.
///
/// The projection is refreshed by an implicit driver process after every
/// delta in which the source changed; user code can wait on it and read it
/// but never write it.
#[derive(Clone)]
pub struct ShadowSignal {
    sig: Signal<BitVector>,
}

impl ShadowSignal {
    /// The committed projection value.
    pub fn value(&self) -> BitVector {
        self.sig.value()
    }

    /// The committed projection as a `u64`, when it fits.
    pub fn to_u64(&self) -> Option<u64> {
        self.sig.to_u64()
    }

    /// The projection width in bits.
    pub fn width(&self) -> usize {
        self.sig.width()
    }

    /// A wait token that fires on any change of the projection.
    pub fn event(&self) -> Trigger {
        self.sig.event()
    }

    /// A wait token for the rising edge of a 1-bit projection.
    ///
    /// # Panics
    ///
    /// If the projection is wider than one bit.
    pub fn posedge(&self) -> Trigger {
        self.sig.posedge()
    }

    /// A wait token for the falling edge of a 1-bit projection.
    ///
    /// # Panics
    ///
    /// If the projection is wider than one bit.
    pub fn negedge(&self) -> Trigger {
        self.sig.negedge()
    }

    /// A type-erased handle for scope trees.
    pub fn signal_ref(&self) -> SignalRef {
        self.sig.signal_ref()
    }

    #[cfg(test)]
    pub(crate) fn as_signal(&self) -> &Signal<BitVector> {
        &self.sig
    }
}

impl From<&ShadowSignal> for SignalRef {
    fn from(shadow: &ShadowSignal) -> Self {
        shadow.signal_ref()
    }
}

impl fmt::Debug for ShadowSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowSignal")
            .field("name", &self.sig.inner.debug_name())
            .field("val", &*self.sig.inner.val.borrow())
            .finish_non_exhaustive()
    }
}
