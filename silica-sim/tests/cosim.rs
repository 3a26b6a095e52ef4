//! End-to-end cosimulation against a child process speaking the line
//! protocol: the child sends one block at startup and answers every block it
//! receives.

#![cfg(unix)]

use std::process::Command;

use silica_sim::{
    BitVector, Context, Cosimulation, Process, RunOutcome, SimError, Signal, Simulation,
};

/// A minimal protocol peer: one eager block driving `dout`, then an empty
/// reply per received block.
const CHILD_SCRIPT: &str = r#"
echo 'dout 2a'
echo '.'
while read line; do
  if [ "$line" = "." ]; then
    echo '.'
  fi
done
"#;

#[test]
fn child_driven_signals_are_applied_at_delta_boundaries() {
    let ctx = Context::new();
    let din = Signal::new(&ctx, BitVector::with_width(0, 8).unwrap());
    let dout = Signal::new(&ctx, BitVector::with_width(0, 8).unwrap());

    let mut command = Command::new("sh");
    command.arg("-c").arg(CHILD_SCRIPT);
    let port = Cosimulation::spawn(
        command,
        vec![("din".to_owned(), din.clone())],
        vec![("dout".to_owned(), dout.clone())],
    )
    .unwrap();

    let driver = {
        let ctx = ctx.clone();
        let din = din.clone();
        Process::new(async move {
            ctx.delay(5).await;
            din.set_next(BitVector::new(0x2a))?;
            ctx.delay(5).await;
            Err(SimError::Stop)
        })
    };

    let mut sim = Simulation::new(&ctx, [driver]);
    sim.set_quiet(true);
    sim.attach_cosim(port).unwrap();
    assert_eq!(sim.run(None).unwrap(), RunOutcome::Finished);

    // The child's startup block landed in the first delta.
    assert_eq!(dout.value(), 0x2a);
    assert_eq!(din.value(), 0x2a);
}
