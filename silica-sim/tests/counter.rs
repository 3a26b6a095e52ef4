//! An 8-bit counter with enable and an asynchronous active-low reset,
//! clocked with period 20.

use rand::Rng;

use silica_sim::{
    BitVector, Context, Process, ResetSignal, RunOutcome, SimError, Signal, Simulation, always_seq,
};

const CYCLES: usize = 300;

#[test]
fn counter_counts_enabled_posedges_modulo_256() {
    let ctx = Context::new();
    let clk = Signal::new(&ctx, false);
    let enable = Signal::new(&ctx, false);
    // Active-low asynchronous reset, asserted from the start.
    let reset = ResetSignal::new(&ctx, false, false, true);
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
        let enable = enable.clone();
        always_seq(
            clk.posedge(),
            Some(&reset),
            [count.signal_ref()],
            move || {
                if enable.value() {
                    count.set_next((count.value() + 1) % 256)?;
                }
                Ok(())
            },
        )
        .unwrap()
    };

    let check = {
        let ctx = ctx.clone();
        let clk = clk.clone();
        let enable = enable.clone();
        let reset = reset.clone();
        let count = count.clone();
        Process::new(async move {
            // Hold the reset low for 30 time units, then release it. The
            // posedge at t=30 still sees enable deasserted, so the counter
            // provably stays at zero until the loop below takes over.
            ctx.delay(30).await;
            reset.set_next(true)?;

            let mut rng = rand::rng();
            let mut expected = 0i64;
            for _ in 0..CYCLES {
                clk.negedge().await;
                assert_eq!(count.value(), expected, "at t={}", ctx.now());
                let en = rng.random_bool(0.5);
                enable.set_next(en)?;
                clk.posedge().await;
                if en {
                    expected = (expected + 1) % 256;
                }
            }
            Err(SimError::Stop)
        })
    };

    let mut sim = Simulation::new(&ctx, [clkgen, dut, check]);
    sim.set_quiet(true);
    assert_eq!(sim.run(None).unwrap(), RunOutcome::Finished);
}

#[test]
fn reset_reasserts_asynchronously() {
    let ctx = Context::new();
    let clk = Signal::new(&ctx, false);
    let enable = Signal::new(&ctx, true);
    let reset = ResetSignal::new(&ctx, true, false, true);
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
        let enable = enable.clone();
        always_seq(
            clk.posedge(),
            Some(&reset),
            [count.signal_ref()],
            move || {
                if enable.value() {
                    count.set_next((count.value() + 1) % 256)?;
                }
                Ok(())
            },
        )
        .unwrap()
    };

    let check = {
        let ctx = ctx.clone();
        let reset = reset.clone();
        let count = count.clone();
        Process::new(async move {
            // Let a few enabled posedges accumulate.
            ctx.delay(45).await;
            assert_eq!(count.value(), 2);

            // Assert the reset between clock edges: the register block wakes
            // on the reset's own falling edge, without waiting for a clock.
            reset.set_next(false)?;
            count.event().await;
            assert_eq!(ctx.now(), 45);
            assert_eq!(count.value(), 0);
            Err(SimError::Stop)
        })
    };

    let mut sim = Simulation::new(&ctx, [clkgen, dut, check]);
    sim.set_quiet(true);
    assert_eq!(sim.run(None).unwrap(), RunOutcome::Finished);
}
