//! VCD tracing of signal activity.
//!
//! Tracing consumes an explicitly built [`Scope`] tree: module instances with
//! a name, the signals they expose, and nested child scopes. Once
//! [`trace_signals`] has written the VCD header and the initial value dump,
//! every committed change of a traced signal appends a value-change line and
//! every time advance emits a `#<time>` stamp, until the simulation finishes
//! and closes the file.
//!
//! An existing trace file is preserved by renaming it to
//! `<name>.vcd.<mtime-secs>` before the new one is created.

use std::fs;
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::context::Context;
use crate::error::TraceError;
use crate::signal::{AnySignal, SignalRef};

/// A value-change rendering, chosen by the signal's domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcdValue {
    /// Single-bit change: `<bit><code>`.
    Bit(bool),
    /// Sized vector change in binary: `b<binary> <code>`.
    Vector(String),
    /// Free-form value (unsized or opaque domains): `s<text> <code>`.
    Str(String),
}

/// A node of the traced design hierarchy: one module instance.
///
/// # Example
///
/// ```
/// use silica_sim::{Context, Scope, Signal};
///
/// let ctx = Context::new();
/// let clk = Signal::new(&ctx, false);
/// let scope = Scope::new("top").signal("clk", &clk);
/// ```
#[derive(Debug)]
pub struct Scope {
    name: String,
    signals: Vec<(String, SignalRef)>,
    children: Vec<Scope>,
}

impl Scope {
    /// Creates a scope named after a module instance.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signals: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds a signal under this scope.
    pub fn signal(mut self, name: impl Into<String>, signal: impl Into<SignalRef>) -> Self {
        self.signals.push((name.into(), signal.into()));
        self
    }

    /// Nests a child instance under this scope.
    pub fn child(mut self, child: Scope) -> Self {
        self.children.push(child);
        self
    }

    fn signal_count(&self) -> usize {
        self.signals.len()
            + self
                .children
                .iter()
                .map(Scope::signal_count)
                .sum::<usize>()
    }
}

/// Options for [`trace_signals_with`].
#[derive(Debug, Clone)]
pub struct TraceOptions {
    /// The `$timescale` declaration.
    pub timescale: String,
    /// Overrides the default `<scope-name>.vcd` output path.
    pub path: Option<PathBuf>,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            timescale: "1ns".to_owned(),
            path: None,
        }
    }
}

/// Starts tracing the given scope tree into `<scope-name>.vcd`.
///
/// # Errors
///
/// - [`TraceError::MultipleTraces`] when the context already traces;
/// - [`TraceError::EmptyHierarchy`] when the tree holds no signals or the
///   top scope has no name;
/// - [`TraceError::Io`] for file creation or backup failures.
pub fn trace_signals(ctx: &Context, scope: Scope) -> Result<(), TraceError> {
    trace_signals_with(ctx, scope, TraceOptions::default())
}

/// [`trace_signals`] with explicit [`TraceOptions`].
pub fn trace_signals_with(
    ctx: &Context,
    scope: Scope,
    options: TraceOptions,
) -> Result<(), TraceError> {
    if ctx.kernel().has_tracer() {
        return Err(TraceError::MultipleTraces);
    }
    if scope.name.is_empty() || scope.signal_count() == 0 {
        return Err(TraceError::EmptyHierarchy(scope.name));
    }

    let path = options
        .path
        .unwrap_or_else(|| PathBuf::from(format!("{}.vcd", scope.name)));
    backup_existing(&path)?;

    let mut out = BufWriter::new(File::create(&path)?);
    write_header(&mut out, &options.timescale)?;

    let mut codes = CodeGen::default();
    let mut dumped = Vec::new();
    write_scope(&mut out, &scope, &mut codes, &mut dumped)?;
    writeln!(out)?;
    writeln!(out, "$enddefinitions $end")?;
    writeln!(out, "$dumpvars")?;
    for signal in &dumped {
        let code = signal
            .inner
            .trace_code()
            .unwrap_or_else(|| unreachable!("dumped signals were just coded"));
        change_line(&mut out, &code, &signal.inner.vcd_current())?;
    }
    writeln!(out, "$end")?;
    out.flush()?;

    let installed = ctx.kernel().install_tracer(VcdTracer { out, stamped: None });
    debug_assert!(installed, "tracer presence was checked above");
    Ok(())
}

/// Moves an existing trace aside, keyed by its modification time.
fn backup_existing(path: &std::path::Path) -> Result<(), TraceError> {
    if !path.exists() {
        return Ok(());
    }
    let mtime = fs::metadata(path)?
        .modified()?
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let backup = PathBuf::from(format!("{}.{mtime}", path.display()));
    fs::rename(path, backup)?;
    Ok(())
}

fn write_header(out: &mut impl Write, timescale: &str) -> io::Result<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    writeln!(out, "$date")?;
    writeln!(out, "    {now} seconds since epoch")?;
    writeln!(out, "$end")?;
    writeln!(out, "$version")?;
    writeln!(out, "    silica {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "$end")?;
    writeln!(out, "$timescale")?;
    writeln!(out, "    {timescale}")?;
    writeln!(out, "$end")?;
    writeln!(out)
}

fn write_scope(
    out: &mut impl Write,
    scope: &Scope,
    codes: &mut CodeGen,
    dumped: &mut Vec<SignalRef>,
) -> io::Result<()> {
    writeln!(out, "$scope module {} $end", scope.name)?;
    for (name, signal) in &scope.signals {
        signal.inner.set_name(name);
        // A signal visible in several scopes keeps its first code.
        let code = match signal.inner.trace_code() {
            Some(code) => code,
            None => {
                let code = codes.next_code();
                signal.inner.set_trace_code(code.clone());
                dumped.push(signal.clone());
                code
            }
        };
        let width = signal.inner.vcd_width();
        if width >= 1 {
            writeln!(out, "$var reg {width} {code} {name} $end")?;
        } else {
            writeln!(out, "$var real 1 {code} {name} $end")?;
        }
    }
    for child in &scope.children {
        write_scope(out, child, codes, dumped)?;
    }
    writeln!(out, "$upscope $end")
}

fn change_line(out: &mut impl Write, code: &str, value: &VcdValue) -> io::Result<()> {
    match value {
        VcdValue::Bit(bit) => writeln!(out, "{}{code}", u8::from(*bit)),
        VcdValue::Vector(bits) => writeln!(out, "b{bits} {code}"),
        VcdValue::Str(text) => writeln!(out, "s{text} {code}"),
    }
}

/// Short-code allocator: base-94 over the printable ASCII range 33..=126.
#[derive(Default)]
struct CodeGen {
    next: usize,
}

impl CodeGen {
    fn next_code(&mut self) -> String {
        let code = name_code(self.next);
        self.next += 1;
        code
    }
}

fn name_code(n: usize) -> String {
    const BASE: usize = 94;
    let digit = |value: usize| (33 + value as u8) as char;
    let (mut q, r) = (n / BASE, n % BASE);
    let mut code = String::new();
    code.push(digit(r));
    while q > 0 {
        let r = q % BASE;
        q /= BASE;
        code.insert(0, digit(r));
    }
    code
}

/// The live trace sink held by the kernel during a simulation.
pub(crate) struct VcdTracer {
    out: BufWriter<File>,
    /// Time of the last `#<t>` line, if any. Lets a change committed before
    /// the first time advance (a delta at t=0) stamp itself, and keeps a
    /// resumed run from stamping the same time twice.
    stamped: Option<u64>,
}

impl VcdTracer {
    pub(crate) fn change(&mut self, time: u64, code: &str, value: &VcdValue) {
        self.timestamp(time);
        if let Err(error) = change_line(&mut self.out, code, value) {
            log::warn!("vcd change write failed: {error}");
        }
    }

    pub(crate) fn timestamp(&mut self, time: u64) {
        if self.stamped == Some(time) {
            return;
        }
        self.stamped = Some(time);
        if let Err(error) = writeln!(self.out, "#{time}") {
            log::warn!("vcd timestamp write failed: {error}");
        }
    }

    pub(crate) fn flush(&mut self) {
        if let Err(error) = self.out.flush() {
            log::warn!("vcd flush failed: {error}");
        }
    }
}
