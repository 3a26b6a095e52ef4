//! Kernel ordering guarantees: delta atomicity, FIFO wakeups, and shadow
//! signal maintenance.

use std::cell::RefCell;
use std::rc::Rc;

use silica_sim::{
    BitVector, Context, Process, RunOutcome, SimError, Signal, Simulation, always_seq,
};

/// A write within a delta is invisible to every read in the same delta, even
/// for a process that runs after the writer.
#[test]
fn delta_atomicity_hides_in_flight_writes() {
    let ctx = Context::new();
    let data = Signal::new(&ctx, 0i64);

    let writer = {
        let ctx = ctx.clone();
        let data = data.clone();
        Process::new(async move {
            ctx.delay(10).await;
            data.set_next(42)?;
            Ok(())
        })
    };

    let observer = {
        let ctx = ctx.clone();
        let data = data.clone();
        Process::new(async move {
            ctx.delay(10).await;
            // Runs in the same delta as the writer, after it.
            assert_eq!(data.value(), 0);
            data.event().await;
            assert_eq!(ctx.now(), 10);
            assert_eq!(data.value(), 42);
            Err(SimError::Stop)
        })
    };

    let mut sim = Simulation::new(&ctx, [writer, observer]);
    sim.set_quiet(true);
    assert_eq!(sim.run(None).unwrap(), RunOutcome::Finished);
}

/// Waiters on one signal wake in registration order, every time.
#[test]
fn waiters_wake_in_registration_order() {
    let ctx = Context::new();
    let sig = Signal::new(&ctx, false);
    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    let listener = |tag: &'static str| {
        let sig = sig.clone();
        let order = order.clone();
        Process::new(async move {
            loop {
                sig.event().await;
                order.borrow_mut().push(tag);
            }
        })
    };

    let driver = {
        let ctx = ctx.clone();
        let sig = sig.clone();
        Process::new(async move {
            for _ in 0..2 {
                ctx.delay(10).await;
                sig.set_next(!sig.value())?;
            }
            ctx.delay(10).await;
            Err(SimError::Stop)
        })
    };

    let mut sim = Simulation::new(&ctx, [listener("a"), listener("b"), driver]);
    sim.set_quiet(true);
    assert_eq!(sim.run(None).unwrap(), RunOutcome::Finished);
    assert_eq!(*order.borrow(), vec!["a", "b", "a", "b"]);
}

/// An edge-triggered register block runs once per clock edge: re-arming the
/// edge it just consumed waits for the next cycle instead of re-firing inside
/// the same delta, so simulated time keeps advancing.
#[test]
fn edge_triggered_register_advances_time() {
    let ctx = Context::new();
    let clk = Signal::new(&ctx, false);
    let count = Signal::new(&ctx, BitVector::with_width(0, 8).unwrap());

    let clkgen = {
        let ctx = ctx.clone();
        let clk = clk.clone();
        Process::new(async move {
            loop {
                ctx.delay(10).await;
                clk.set_next(!clk.value())?;
            }
        })
    };

    let dut = {
        let count = count.clone();
        always_seq(clk.posedge(), None, [count.signal_ref()], move || {
            count.set_next((count.value() + 1) % 256)?;
            Ok(())
        })
        .unwrap()
    };

    let mut sim = Simulation::new(&ctx, [clkgen, dut]);
    sim.set_quiet(true);
    assert_eq!(sim.run(Some(100)).unwrap(), RunOutcome::Suspended);
    assert_eq!(ctx.now(), 100);
    // One increment per rising edge: 10, 30, 50, 70 and 90.
    assert_eq!(count.value(), 5);
}

/// Shadow signals follow their source projection after every settlement.
#[test]
fn shadow_signals_track_their_source() {
    let ctx = Context::new();
    let source = Signal::new(&ctx, BitVector::with_width(0, 8).unwrap());
    let mid = source.shadow_slice(6, 2).unwrap();
    let lsb = source.shadow_bit(0).unwrap();
    assert_eq!(mid.width(), 4);
    assert_eq!(lsb.width(), 1);

    let seen: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
    let watcher = {
        let mid = mid.clone();
        let seen = seen.clone();
        Process::new(async move {
            loop {
                mid.event().await;
                seen.borrow_mut().push(mid.to_u64().unwrap());
            }
        })
    };

    let driver = {
        let ctx = ctx.clone();
        let source = source.clone();
        Process::new(async move {
            ctx.delay(10).await;
            source.set_next(BitVector::new(0b1011_0100))?;
            ctx.delay(10).await;
            source.set_next(BitVector::new(0b1011_0101))?;
            ctx.delay(10).await;
            Err(SimError::Stop)
        })
    };

    let mut sim = Simulation::new(&ctx, [watcher, driver]);
    sim.set_quiet(true);
    assert_eq!(sim.run(None).unwrap(), RunOutcome::Finished);

    assert_eq!(mid.value(), 0b1101);
    assert_eq!(lsb.value(), 1);
    // The slice changed once: the second source write only touched bit 0.
    assert_eq!(*seen.borrow(), vec![0b1101]);
}

/// A no-op write (`next` equal to `val`) commits nothing and wakes nobody.
#[test]
fn rewriting_the_current_value_is_silent() {
    let ctx = Context::new();
    let sig = Signal::new(&ctx, 7i64);
    let woken = Rc::new(std::cell::Cell::new(false));

    let watcher = {
        let sig = sig.clone();
        let woken = woken.clone();
        Process::new(async move {
            sig.event().await;
            woken.set(true);
            Ok(())
        })
    };

    let driver = {
        let ctx = ctx.clone();
        let sig = sig.clone();
        Process::new(async move {
            ctx.delay(5).await;
            sig.set_next(sig.value())?;
            ctx.delay(5).await;
            Err(SimError::Stop)
        })
    };

    let mut sim = Simulation::new(&ctx, [watcher, driver]);
    sim.set_quiet(true);
    assert_eq!(sim.run(None).unwrap(), RunOutcome::Finished);
    assert!(!woken.get());
}
