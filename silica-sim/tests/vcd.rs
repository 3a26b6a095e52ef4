//! VCD output: header invariants, short codes, change lines, and the
//! backup of a pre-existing trace file.

use std::fs;

use silica_sim::{
    BitVector, Context, Process, RunOutcome, Scope, SimError, Signal, Simulation, TraceOptions,
    trace_signals_with,
};

fn options(path: &std::path::Path) -> TraceOptions {
    TraceOptions {
        path: Some(path.to_path_buf()),
        ..TraceOptions::default()
    }
}

fn run_traced(dir: &std::path::Path) -> String {
    let path = dir.join("top.vcd");
    let ctx = Context::new();
    let clk = Signal::new(&ctx, false);
    let count = Signal::new(&ctx, BitVector::with_width(0, 4).unwrap());
    let tag = Signal::new(&ctx, BitVector::new(0));

    let scope = Scope::new("top")
        .signal("clk", &clk)
        .signal("count", &count)
        .signal("tag", &tag)
        // The same signal under a child scope keeps its first code.
        .child(Scope::new("inner").signal("clk", &clk));
    trace_signals_with(&ctx, scope, options(&path)).unwrap();

    let clkgen = {
        let ctx = ctx.clone();
        let clk = clk.clone();
        Process::new(async move {
            loop {
                ctx.delay(5).await;
                clk.set_next(!clk.value())?;
            }
        })
    };
    let counter = {
        let count = count.clone();
        let tag = tag.clone();
        let clk = clk.clone();
        Process::new(async move {
            loop {
                clk.posedge().await;
                count.set_next((count.value() + 1) % 16)?;
                tag.set_next(&tag.value() + 3)?;
            }
        })
    };
    let stopper = {
        let ctx = ctx.clone();
        Process::new(async move {
            ctx.delay(23).await;
            Err(SimError::Stop)
        })
    };

    let mut sim = Simulation::new(&ctx, [clkgen, counter, stopper]);
    sim.set_quiet(true);
    assert_eq!(sim.run(None).unwrap(), RunOutcome::Finished);

    fs::read_to_string(path).unwrap()
}

#[test]
fn header_and_change_lines_are_well_formed() {
    let dir = tempfile::tempdir().unwrap();
    let vcd = run_traced(dir.path());
    let lines: Vec<&str> = vcd.lines().collect();

    // Exactly one definitions terminator, with the scope depth back at zero.
    let enddefs: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| **line == "$enddefinitions $end")
        .map(|(index, _)| index)
        .collect();
    assert_eq!(enddefs.len(), 1);
    let mut depth = 0i32;
    for line in &lines[..enddefs[0]] {
        if line.starts_with("$scope ") {
            depth += 1;
        } else if line.starts_with("$upscope") {
            depth -= 1;
            assert!(depth >= 0);
        }
    }
    assert_eq!(depth, 0);

    // Codes are assigned in walk order; the aliased clock reuses `!`.
    assert_eq!(
        lines
            .iter()
            .filter(|line| **line == "$var reg 1 ! clk $end")
            .count(),
        2
    );
    assert!(lines.contains(&"$var reg 4 \" count $end"));
    assert!(lines.contains(&"$var real 1 # tag $end"));

    // The initial dump covers each signal once, in the per-domain formats.
    let dumpvars = lines.iter().position(|line| *line == "$dumpvars").unwrap();
    let dump_end = lines[dumpvars..].iter().position(|line| *line == "$end").unwrap() + dumpvars;
    let dump = lines[dumpvars + 1..dump_end].to_vec();
    assert_eq!(dump, vec!["0!", "b0000 \"", "s0x0 #"]);

    // Time advances before the changes at that time; a rising clock shows up
    // as a single-bit change line.
    let first_stamp = lines.iter().position(|line| *line == "#5").unwrap();
    assert!(lines[first_stamp + 1..].contains(&"1!"));
    assert!(lines.iter().filter(|line| **line == "#5").count() == 1);
    assert!(lines.contains(&"#10"));
    assert!(lines.contains(&"b0001 \""));
    assert!(lines.contains(&"s0x3 #"));
}

#[test]
fn existing_traces_are_backed_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("top.vcd");
    fs::write(&path, "previous run").unwrap();

    let ctx = Context::new();
    let clk = Signal::new(&ctx, false);
    trace_signals_with(&ctx, Scope::new("top").signal("clk", &clk), options(&path)).unwrap();

    let entries: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    let backup = entries
        .iter()
        .find(|name| name.starts_with("top.vcd.") && *name != "top.vcd")
        .expect("backup file should exist");
    assert_eq!(
        fs::read_to_string(dir.path().join(backup)).unwrap(),
        "previous run"
    );
    // The fresh trace replaced the original.
    assert!(fs::read_to_string(&path).unwrap().contains("$timescale"));
}
