//! Batch progress reporting.
//!
//! Progress goes to **stderr** so the per-document JSON lines on stdout stay
//! parseable by scripts.

use std::io::Write;

/// A single progress event for `janitor batch`.
#[derive(Clone, Debug)]
pub enum BatchProgressEvent {
    /// Walking the input directory. Total unknown.
    Scanning { root: String },
    /// `n` of `total` documents finished.
    Processing {
        n: u64,
        total: u64,
        path: String,
        method: String,
    },
}

pub trait BatchProgressReporter: Send + Sync {
    fn report(&self, event: BatchProgressEvent);
}

/// "batch  processing  12 / 1,340  invoices/2024-03.pdf (local_ocr)"
pub struct StderrProgress;

impl BatchProgressReporter for StderrProgress {
    fn report(&self, event: BatchProgressEvent) {
        let line = match &event {
            BatchProgressEvent::Scanning { root } => format!("batch  scanning {}...\n", root),
            BatchProgressEvent::Processing {
                n,
                total,
                path,
                method,
            } => format!(
                "batch  processing  {} / {}  {} ({})\n",
                format_number(*n),
                format_number(*total),
                path,
                method
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl BatchProgressReporter for JsonProgress {
    fn report(&self, event: BatchProgressEvent) {
        let obj = match &event {
            BatchProgressEvent::Scanning { root } => serde_json::json!({
                "event": "progress",
                "phase": "scanning",
                "root": root,
            }),
            BatchProgressEvent::Processing {
                n,
                total,
                path,
                method,
            } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "n": n,
                "total": total,
                "path": path,
                "method": method,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl BatchProgressReporter for NoProgress {
    fn report(&self, _event: BatchProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a terminal, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn BatchProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_groups_thousands() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(12_345), "12,345");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
