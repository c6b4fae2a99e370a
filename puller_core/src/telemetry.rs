//! Operator-facing output: per-cycle telemetry lines and event reports.

use std::fmt;
use std::io::Write;

use puller_traits::FaultFlag;

use crate::error::AbortReason;
use crate::status::Completion;

/// One `timestamp,force,travel_mm` CSV record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryLine {
    /// Milliseconds since controller start.
    pub timestamp_ms: u64,
    pub force: f32,
    pub travel_mm: f32,
}

impl fmt::Display for TelemetryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{:.2},{:.2}", self.timestamp_ms, self.force, self.travel_mm)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RigReport {
    InvalidCommand(String),
    Fault(FaultFlag),
    Completed(Completion),
    Aborted(AbortReason),
}

impl fmt::Display for RigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RigReport::InvalidCommand(_) => f.write_str("Invalid command"),
            RigReport::Fault(flag) => write!(f, "{flag}"),
            RigReport::Completed(c) => write!(f, "{c}"),
            RigReport::Aborted(reason) => write!(f, "Stopped: {reason}"),
        }
    }
}

/// Sink for everything the controller tells the operator.
pub trait RigOutput {
    fn telemetry(&mut self, line: &TelemetryLine);
    fn report(&mut self, report: &RigReport);
}

/// Keeps everything in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingOutput {
    pub telemetry: Vec<TelemetryLine>,
    pub reports: Vec<RigReport>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalid_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r, RigReport::InvalidCommand(_)))
            .count()
    }

    pub fn completions(&self) -> Vec<Completion> {
        self.reports
            .iter()
            .filter_map(|r| match r {
                RigReport::Completed(c) => Some(*c),
                _ => None,
            })
            .collect()
    }
}

impl RigOutput for RecordingOutput {
    fn telemetry(&mut self, line: &TelemetryLine) {
        self.telemetry.push(*line);
    }

    fn report(&mut self, report: &RigReport) {
        self.reports.push(report.clone());
    }
}

/// Writes telemetry and reports as text lines. Write errors are logged and dropped.
pub struct WriterOutput<W: Write> {
    inner: W,
    telemetry: bool,
}

impl<W: Write> WriterOutput<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            telemetry: true,
        }
    }

    /// Suppress per-cycle telemetry; reports are still written.
    pub fn reports_only(mut self) -> Self {
        self.telemetry = false;
        self
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        if let Err(e) = self.inner.write_fmt(args).and_then(|()| self.inner.write_all(b"\n")) {
            tracing::warn!(error = %e, "output write failed");
        }
    }
}

impl<W: Write> RigOutput for WriterOutput<W> {
    fn telemetry(&mut self, line: &TelemetryLine) {
        if self.telemetry {
            self.line(format_args!("{line}"));
        }
    }

    fn report(&mut self, report: &RigReport) {
        self.line(format_args!("{report}"));
        let _ = self.inner.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_uses_two_decimals() {
        let t = TelemetryLine {
            timestamp_ms: 1234,
            force: 3.14159,
            travel_mm: -0.5,
        };
        assert_eq!(t.to_string(), "1234,3.14,-0.50");
    }

    #[test]
    fn writer_output_emits_lines() {
        let mut out = WriterOutput::new(Vec::new());
        out.report(&RigReport::InvalidCommand("fly".into()));
        out.report(&RigReport::Completed(Completion::Homed));
        out.report(&RigReport::Fault(FaultFlag::OpenLoadA));
        let text = String::from_utf8(out.into_inner()).unwrap();
        assert_eq!(text, "Invalid command\nHoming complete.\nOpen Load A\n");
    }
}
