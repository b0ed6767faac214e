use std::{
    backtrace::BacktraceStatus,
    error::Error,
    fmt,
    io::{self, IsTerminal, Write as _},
};

use ariadne::{Color, Fmt};

use super::{as_incident, DiagnosticContributor};

#[derive(Debug, Clone, derive_setters::Setters)]
#[non_exhaustive]
/// How the trace below the diagnostic header is written
///
/// Start from [`RenderConfig::default`] and customize it with the provided setters. None of
/// these options touch the header itself, it is always written verbatim.
pub struct RenderConfig {
    /// Paint kind labels and `Caused by:` prefixes
    pub color: bool,
    /// Write the frames captured when a failure was created, if there are any
    pub backtrace: bool,
    /// Write the diagnostics of registered causes below their `Caused by:` line
    pub annotate_causes: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            color: false,
            backtrace: true,
            annotate_causes: true,
        }
    }
}

impl RenderConfig {
    /// The configuration used for the default error output
    ///
    /// Colors are only enabled if stderr is a terminal.
    pub fn for_stderr() -> Self {
        RenderConfig::default().color(io::stderr().is_terminal())
    }
}

/// Collect the diagnostic header of an incident
///
/// Calls the hook once on a fresh buffer and strips exactly one trailing line terminator.
pub fn diagnostic_header<I: DiagnosticContributor + ?Sized>(incident: &I) -> String {
    let mut header = String::new();
    incident.contribute_diagnostics(&mut header);

    if header.ends_with("\r\n") {
        header.truncate(header.len() - 2);
    } else if header.ends_with('\n') {
        header.pop();
    }

    header
}

fn write_label(
    out: &mut impl fmt::Write,
    label: &str,
    color: Color,
    config: &RenderConfig,
) -> fmt::Result {
    if config.color {
        write!(out, "{}", label.fg(color))
    } else {
        out.write_str(label)
    }
}

fn write_frames<I: DiagnosticContributor + ?Sized>(
    incident: &I,
    out: &mut impl fmt::Write,
    config: &RenderConfig,
) -> fmt::Result {
    if !config.backtrace {
        return Ok(());
    }

    if let Some(backtrace) = incident.backtrace() {
        if backtrace.status() == BacktraceStatus::Captured {
            let frames = backtrace.to_string();
            writeln!(out, "{}", frames.trim_end_matches('\n'))?;
        }
    }

    Ok(())
}

fn write_cause(
    cause: &(dyn Error + 'static),
    out: &mut impl fmt::Write,
    config: &RenderConfig,
) -> fmt::Result {
    write_label(out, "Caused by:", Color::Yellow, config)?;
    out.write_char(' ')?;

    let Some(incident) = as_incident(cause) else {
        return writeln!(out, "{cause}");
    };

    write_label(out, incident.kind(), Color::Red, config)?;
    writeln!(out, ": {incident}")?;

    if config.annotate_causes {
        for line in diagnostic_header(incident).lines() {
            writeln!(out, "\t{line}")?;
        }
    }

    write_frames(incident, out, config)
}

/// Write the standard trace of an incident
///
/// The incident comes first, followed by its causes from the outermost to the innermost one:
///
/// ```text
/// <kind>: <message>
/// <frames>
/// Caused by: <kind>: <message>
/// 	<diagnostics of the cause>
/// <frames of the cause>
/// Caused by: <message of a foreign error>
/// ```
pub fn write_trace<I: DiagnosticContributor + ?Sized>(
    incident: &I,
    out: &mut impl fmt::Write,
    config: &RenderConfig,
) -> fmt::Result {
    write_label(out, incident.kind(), Color::Red, config)?;
    writeln!(out, ": {incident}")?;
    write_frames(incident, out, config)?;

    let mut cause = incident.source();
    while let Some(current) = cause {
        write_cause(current, out, config)?;
        cause = current.source();
    }

    Ok(())
}

/// Write the diagnostic header on its own line, then the standard trace
///
/// An empty header is skipped, so an incident without diagnostics renders as its trace alone.
pub fn write_report<I: DiagnosticContributor + ?Sized>(
    incident: &I,
    out: &mut impl fmt::Write,
    config: &RenderConfig,
) -> fmt::Result {
    let header = diagnostic_header(incident);
    if !header.is_empty() {
        writeln!(out, "{header}")?;
    }

    write_trace(incident, out, config)
}

/// Render an incident into a new string
pub fn report_to_string<I: DiagnosticContributor + ?Sized>(
    incident: &I,
    config: &RenderConfig,
) -> String {
    let mut output = String::new();
    write_report(incident, &mut output, config).unwrap();
    output
}

/// Render an incident to the default error output
///
/// Write errors are ignored, there is no other place left to report them to.
pub fn eprint_report<I: DiagnosticContributor + ?Sized>(incident: &I) {
    let report = report_to_string(incident, &RenderConfig::for_stderr());
    let _ = io::stderr().lock().write_all(report.as_bytes());
}

/// Render an incident to a byte sink
pub fn print_report_to<I: DiagnosticContributor + ?Sized>(
    incident: &I,
    out: &mut impl io::Write,
) -> io::Result<()> {
    let report = report_to_string(incident, &RenderConfig::default());
    out.write_all(report.as_bytes())
}

/// Render an incident to a text writer
pub fn write_report_to<I: DiagnosticContributor + ?Sized>(
    incident: &I,
    out: &mut impl fmt::Write,
) -> fmt::Result {
    write_report(incident, out, &RenderConfig::default())
}

/// Emit an incident as a single `tracing` error event
///
/// The event carries the kind, the diagnostic header and the trace (without frames) as fields.
pub fn log_incident<I: DiagnosticContributor + ?Sized>(incident: &I) {
    let header = diagnostic_header(incident);
    let mut trace = String::new();
    write_trace(incident, &mut trace, &RenderConfig::default().backtrace(false)).unwrap();

    tracing::error!(
        kind = incident.kind(),
        header = %header,
        trace = %trace,
        "{}",
        incident
    );
}

/// Rendering methods available on every [`DiagnosticContributor`]
///
/// This trait is implemented for all incident kinds and cannot be implemented by hand, so every
/// kind renders the same way.
pub trait RenderIncident: DiagnosticContributor {
    /// See [`diagnostic_header`]
    fn diagnostic_header(&self) -> String;
    /// See [`eprint_report`]
    fn eprint_report(&self);
    /// See [`print_report_to`]
    fn print_report_to(&self, out: &mut dyn io::Write) -> io::Result<()>;
    /// See [`write_report_to`]
    fn write_report_to(&self, out: &mut dyn fmt::Write) -> fmt::Result;
    /// See [`report_to_string`], using [`RenderConfig::default`]
    fn report_string(&self) -> String;
}

impl<T: DiagnosticContributor + ?Sized> RenderIncident for T {
    fn diagnostic_header(&self) -> String {
        diagnostic_header(self)
    }

    fn eprint_report(&self) {
        eprint_report(self)
    }

    fn print_report_to(&self, mut out: &mut dyn io::Write) -> io::Result<()> {
        print_report_to(self, &mut out)
    }

    fn write_report_to(&self, mut out: &mut dyn fmt::Write) -> fmt::Result {
        write_report_to(self, &mut out)
    }

    fn report_string(&self) -> String {
        report_to_string(self, &RenderConfig::default())
    }
}
